//! FHIR OperationOutcome construction for per-beneficiary failures.

use serde_json::{json, Value};

/// Issue detail codes written into error artifacts.
pub mod issue {
    /// The upstream service failed to return data for a beneficiary.
    pub const UPSTREAM_ERROR: &str = "upstream-error";
    /// The pipeline itself failed to serialize or write a resource.
    pub const INTERNAL_ERROR: &str = "internal-error";
}

/// Builder for the OperationOutcome documents appended to `-error.ndjson`
/// artifacts, one JSON object per failed beneficiary.
#[derive(Debug, Clone)]
pub struct OperationOutcome {
    severity: &'static str,
    code: &'static str,
    details_code: String,
    details_display: String,
}

impl OperationOutcome {
    /// An error-severity exception outcome, the shape every per-beneficiary
    /// failure is reported with.
    pub fn error(details_code: impl Into<String>, details_display: impl Into<String>) -> Self {
        Self {
            severity: "error",
            code: "exception",
            details_code: details_code.into(),
            details_display: details_display.into(),
        }
    }

    /// Render the outcome as a FHIR OperationOutcome JSON document.
    pub fn to_json(&self) -> Value {
        json!({
            "resourceType": "OperationOutcome",
            "issue": [{
                "severity": self.severity,
                "code": self.code,
                "details": {
                    "coding": [{
                        "code": self.details_code,
                        "display": self.details_display,
                    }],
                    "text": self.details_display,
                }
            }]
        })
    }
}

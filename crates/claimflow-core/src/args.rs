//! Queue entry payload: the arguments one worker needs to process one
//! beneficiary slice of a parent export job.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;

/// Resource types the pipeline exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    Coverage,
    ExplanationOfBenefit,
    Patient,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Coverage => "Coverage",
            Self::ExplanationOfBenefit => "ExplanationOfBenefit",
            Self::Patient => "Patient",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ResourceKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Coverage" => Ok(Self::Coverage),
            "ExplanationOfBenefit" => Ok(Self::ExplanationOfBenefit),
            "Patient" => Ok(Self::Patient),
            other => Err(CoreError::unsupported_resource_type(other)),
        }
    }
}

/// Service-date bounds applied to ExplanationOfBenefit fetches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimsWindow {
    #[serde(default)]
    pub lower_bound: Option<DateTime<Utc>>,
    #[serde(default)]
    pub upper_bound: Option<DateTime<Utc>>,
}

impl ClaimsWindow {
    pub fn is_unset(&self) -> bool {
        self.lower_bound.is_none() && self.upper_bound.is_none()
    }

    /// Bound the window at `upper` only. Used for payloads from enqueuers
    /// that predate explicit window bounds and carry a service date instead.
    pub fn upper_bounded(upper: Option<DateTime<Utc>>) -> Self {
        Self {
            lower_bound: None,
            upper_bound: upper,
        }
    }
}

/// Payload of one queue entry.
///
/// Decoding failures are permanent: a payload that does not decode will
/// never decode, so callers ack such entries instead of retrying them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobArgs {
    /// Parent export job id.
    pub job_id: i64,
    /// Owning tenant identifier.
    pub aco_id: Uuid,
    pub resource_type: ResourceKind,
    /// Beneficiaries in this slice, in output order.
    pub beneficiary_ids: Vec<String>,
    /// Base path of the upstream FHIR service. Required; an empty value
    /// marks the payload as corrupt.
    pub upstream_base_path: String,
    #[serde(default)]
    pub since: Option<DateTime<Utc>>,
    pub transaction_time: DateTime<Utc>,
    /// Legacy upper bound for the claims window, kept for payloads written
    /// by enqueuers that predate `claims_window`.
    #[serde(default)]
    pub service_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub claims_window: ClaimsWindow,
}

impl JobArgs {
    /// Decode a queue payload.
    pub fn decode(payload: &[u8]) -> Result<JobArgs, CoreError> {
        Ok(serde_json::from_slice(payload)?)
    }

    /// Encode for enqueueing.
    pub fn encode(&self) -> Result<Vec<u8>, CoreError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Effective claims window for ExplanationOfBenefit fetches: the explicit
    /// bounds when either is set, otherwise the legacy service date as the
    /// upper bound.
    pub fn effective_claims_window(&self) -> ClaimsWindow {
        if self.claims_window.is_unset() {
            ClaimsWindow::upper_bounded(self.service_date)
        } else {
            self.claims_window
        }
    }
}

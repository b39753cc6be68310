//! Response container framing for upstream fetches.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The upstream response container: a sequence of entries, each wrapping one
/// resource JSON value. Nothing beyond this framing is interpreted by the
/// pipeline; resources pass through opaquely onto NDJSON lines.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Bundle {
    #[serde(rename = "entry", default)]
    pub entries: Vec<BundleEntry>,
}

/// One bundle entry. The `resource` slot may be absent (for example on
/// search-result outcome entries) and such entries are skipped.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BundleEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<Value>,
}

impl Bundle {
    /// A bundle with no entries.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a bundle wrapping the given resources, one per entry.
    pub fn from_resources(resources: impl IntoIterator<Item = Value>) -> Self {
        Self {
            entries: resources
                .into_iter()
                .map(|resource| BundleEntry {
                    resource: Some(resource),
                })
                .collect(),
        }
    }

    /// Iterate over the present resources, skipping empty entries.
    pub fn resources(&self) -> impl Iterator<Item = &Value> {
        self.entries.iter().filter_map(|e| e.resource.as_ref())
    }
}

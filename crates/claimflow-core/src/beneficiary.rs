//! Beneficiary lookup record.

use serde::{Deserialize, Serialize};

/// A beneficiary row from the lookup table.
///
/// `upstream_id` may be absent; it is resolved on demand through the
/// upstream identity lookup and cached on the record for the remainder of
/// the entry being processed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Beneficiary {
    pub id: i64,
    /// Stable beneficiary identifier used to resolve the upstream id.
    pub mbi: String,
    #[serde(default)]
    pub upstream_id: Option<String>,
}

impl Beneficiary {
    pub fn new(id: i64, mbi: impl Into<String>) -> Self {
        Self {
            id,
            mbi: mbi.into(),
            upstream_id: None,
        }
    }

    /// Cache the resolved upstream identifier on this record.
    pub fn with_upstream_id(mut self, upstream_id: impl Into<String>) -> Self {
        self.upstream_id = Some(upstream_id.into());
        self
    }
}

//! The capability set the worker requires from the upstream service.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use claimflow_core::ClaimsWindow;

use crate::bundle::Bundle;
use crate::error::UpstreamError;

/// Fetches resource bundles for one beneficiary at a time, plus the identity
/// lookup that maps an MBI onto the upstream beneficiary id.
///
/// Timeouts are the implementation's responsibility; the worker imposes none
/// of its own. Implementations must be thread-safe (`Send + Sync`).
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    /// Fetches Coverage resources for one beneficiary.
    async fn get_coverage(
        &self,
        upstream_bene_id: &str,
        job_id: i64,
        cms_id: &str,
        since: Option<DateTime<Utc>>,
        transaction_time: DateTime<Utc>,
    ) -> Result<Bundle, UpstreamError>;

    /// Fetches Patient resources for one beneficiary.
    async fn get_patient(
        &self,
        upstream_bene_id: &str,
        job_id: i64,
        cms_id: &str,
        since: Option<DateTime<Utc>>,
        transaction_time: DateTime<Utc>,
    ) -> Result<Bundle, UpstreamError>;

    /// Fetches ExplanationOfBenefit resources for one beneficiary, bounded
    /// by the claims service-date window.
    #[allow(clippy::too_many_arguments)]
    async fn get_explanation_of_benefit(
        &self,
        upstream_bene_id: &str,
        job_id: i64,
        cms_id: &str,
        since: Option<DateTime<Utc>>,
        transaction_time: DateTime<Utc>,
        claims_window: ClaimsWindow,
    ) -> Result<Bundle, UpstreamError>;

    /// Resolves the upstream beneficiary id for an MBI.
    async fn lookup_upstream_id(&self, mbi: &str) -> Result<String, UpstreamError>;
}

/// Builds a client bound to one job's upstream base path.
///
/// The base path travels in each queue payload, so the worker constructs a
/// client per entry rather than holding a single one.
pub trait UpstreamClientFactory: Send + Sync {
    fn create(
        &self,
        base_path: &str,
    ) -> Result<std::sync::Arc<dyn UpstreamClient>, UpstreamError>;
}

// Compile-time tests that the seams are object-safe
#[cfg(test)]
fn _assert_client_object_safe(_: &dyn UpstreamClient) {}
#[cfg(test)]
fn _assert_factory_object_safe(_: &dyn UpstreamClientFactory) {}

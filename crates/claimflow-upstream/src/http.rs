//! HTTP binding of the upstream client contract.
//!
//! Issues FHIR search requests against the configured base path and decodes
//! the returned bundles. Everything the worker interprets is the bundle
//! framing; resource contents pass through untouched.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};

use claimflow_core::ClaimsWindow;

use crate::bundle::Bundle;
use crate::client::{UpstreamClient, UpstreamClientFactory};
use crate::error::UpstreamError;

const MBI_IDENTIFIER_SYSTEM: &str = "http://hl7.org/fhir/sid/us-mbi";

/// Builds [`HttpUpstreamClient`]s for a fixed host, one per job base path.
pub struct HttpUpstreamFactory {
    host: String,
}

impl HttpUpstreamFactory {
    /// `host` is scheme + authority, e.g. `https://claims.example.gov`.
    pub fn new(host: impl Into<String>) -> Self {
        let host: String = host.into();
        Self {
            host: host.trim_end_matches('/').to_string(),
        }
    }
}

impl UpstreamClientFactory for HttpUpstreamFactory {
    fn create(
        &self,
        base_path: &str,
    ) -> Result<std::sync::Arc<dyn UpstreamClient>, UpstreamError> {
        let base_url = format!("{}/{}", self.host, base_path.trim_matches('/'));
        Ok(std::sync::Arc::new(HttpUpstreamClient::new(&base_url)?))
    }
}

/// Upstream client backed by `reqwest`.
pub struct HttpUpstreamClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpUpstreamClient {
    /// Create a client for the given base URL, e.g. `https://host/v2/fhir`.
    pub fn new(base_url: &str) -> Result<Self, UpstreamError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(90))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn search_url(&self, resource_type: &str) -> String {
        format!("{}/{}", self.base_url, resource_type)
    }

    async fn fetch_bundle(
        &self,
        resource_type: &str,
        query: &[(String, String)],
        job_id: i64,
        cms_id: &str,
        transaction_time: DateTime<Utc>,
    ) -> Result<Bundle, UpstreamError> {
        let resp = self
            .http
            .get(self.search_url(resource_type))
            .query(query)
            .header("Accept", "application/fhir+json")
            .header("X-Export-Job", job_id.to_string())
            .header("X-Export-Tenant", cms_id)
            .header("X-Transaction-Time", format_instant(transaction_time))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(UpstreamError::status(status.as_u16(), message));
        }

        let body = resp.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

fn format_instant(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn since_query(since: Option<DateTime<Utc>>) -> Option<(String, String)> {
    since.map(|s| ("_lastUpdated".to_string(), format!("ge{}", format_instant(s))))
}

#[async_trait]
impl UpstreamClient for HttpUpstreamClient {
    async fn get_coverage(
        &self,
        upstream_bene_id: &str,
        job_id: i64,
        cms_id: &str,
        since: Option<DateTime<Utc>>,
        transaction_time: DateTime<Utc>,
    ) -> Result<Bundle, UpstreamError> {
        let mut query = vec![("beneficiary".to_string(), upstream_bene_id.to_string())];
        query.extend(since_query(since));
        self.fetch_bundle("Coverage", &query, job_id, cms_id, transaction_time)
            .await
    }

    async fn get_patient(
        &self,
        upstream_bene_id: &str,
        job_id: i64,
        cms_id: &str,
        since: Option<DateTime<Utc>>,
        transaction_time: DateTime<Utc>,
    ) -> Result<Bundle, UpstreamError> {
        let mut query = vec![("_id".to_string(), upstream_bene_id.to_string())];
        query.extend(since_query(since));
        self.fetch_bundle("Patient", &query, job_id, cms_id, transaction_time)
            .await
    }

    async fn get_explanation_of_benefit(
        &self,
        upstream_bene_id: &str,
        job_id: i64,
        cms_id: &str,
        since: Option<DateTime<Utc>>,
        transaction_time: DateTime<Utc>,
        claims_window: ClaimsWindow,
    ) -> Result<Bundle, UpstreamError> {
        let mut query = vec![("patient".to_string(), upstream_bene_id.to_string())];
        query.extend(since_query(since));
        if let Some(lower) = claims_window.lower_bound {
            query.push((
                "service-date".to_string(),
                format!("ge{}", format_instant(lower)),
            ));
        }
        if let Some(upper) = claims_window.upper_bound {
            query.push((
                "service-date".to_string(),
                format!("le{}", format_instant(upper)),
            ));
        }
        self.fetch_bundle(
            "ExplanationOfBenefit",
            &query,
            job_id,
            cms_id,
            transaction_time,
        )
        .await
    }

    async fn lookup_upstream_id(&self, mbi: &str) -> Result<String, UpstreamError> {
        let resp = self
            .http
            .get(self.search_url("Patient"))
            .query(&[(
                "identifier",
                format!("{MBI_IDENTIFIER_SYSTEM}|{mbi}"),
            )])
            .header("Accept", "application/fhir+json")
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(UpstreamError::status(status.as_u16(), message));
        }

        let body = resp.bytes().await?;
        let bundle: Bundle = serde_json::from_slice(&body)?;

        let result = bundle
            .resources()
            .find_map(|r| r.get("id").and_then(|id| id.as_str()))
            .map(|id| id.to_string())
            .ok_or_else(|| UpstreamError::identity_not_found(mbi));
        result
    }
}

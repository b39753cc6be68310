//! Upstream FHIR service contract for the claimflow pipeline.
//!
//! The worker only ever talks to the upstream service through the
//! [`UpstreamClient`] trait: one resource fetch per beneficiary plus the
//! MBI-to-upstream-id identity lookup. The wire protocol behind the trait is
//! deliberately out of scope for the worker; [`http::HttpUpstreamClient`]
//! provides the production binding.

pub mod bundle;
pub mod client;
pub mod error;
pub mod http;
pub mod outcome;

pub use bundle::{Bundle, BundleEntry};
pub use client::{UpstreamClient, UpstreamClientFactory};
pub use error::UpstreamError;
pub use http::{HttpUpstreamClient, HttpUpstreamFactory};
pub use outcome::OperationOutcome;

/// Type alias for a shareable UpstreamClient instance.
pub type DynUpstreamClient = std::sync::Arc<dyn UpstreamClient>;

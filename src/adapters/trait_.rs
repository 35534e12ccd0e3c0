//! Source adapter trait definition
//!
//! Defines the interface the engine depends on for every external provider,
//! and the classified error taxonomy the executor's retry policy keys on.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use thiserror::Error;

/// Classified failures at the adapter boundary.
///
/// The executor adds `Timeout` and `MappingError` on top of these; adapters
/// themselves only ever report what the provider told them.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AdapterError {
    /// Transport-level failure or an unexpected provider response
    #[error("provider unavailable: {details}")]
    Unavailable { details: String },
    /// Provider quota exhausted, optionally with a retry hint
    #[error("rate limited by provider")]
    RateLimited { retry_after_secs: Option<u64> },
    /// The source id no longer exists at the provider
    #[error("entity not found upstream")]
    NotFoundUpstream,
}

/// One named third-party provider.
///
/// Implementations fetch the raw payload for a provider-side identifier. The
/// payload is opaque to everything except the linker; adapters must not
/// normalize it.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    async fn fetch(&self, source_id: &str) -> Result<JsonValue, AdapterError>;
}

/// Map a provider HTTP response to a payload or a classified error.
pub(crate) async fn decode_response(
    source: &str,
    response: reqwest::Response,
) -> Result<JsonValue, AdapterError> {
    let status = response.status();

    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(AdapterError::NotFoundUpstream);
    }
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after_secs = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse().ok());
        return Err(AdapterError::RateLimited { retry_after_secs });
    }
    if !status.is_success() {
        return Err(AdapterError::Unavailable {
            details: format!("{source} returned status {status}"),
        });
    }

    response.json().await.map_err(|err| AdapterError::Unavailable {
        details: format!("{source} returned undecodable body: {err}"),
    })
}

pub(crate) fn transport_error(source: &str, err: reqwest::Error) -> AdapterError {
    AdapterError::Unavailable {
        details: format!("{source} request failed: {err}"),
    }
}

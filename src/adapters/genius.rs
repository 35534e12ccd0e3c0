//! Genius lyrics-database adapter
//!
//! Fetches artist records from the Genius API (`/artists/{id}`). Genius
//! wraps payloads in a `response` envelope; the adapter returns the body
//! unmodified and leaves unwrapping to the linker.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use url::Url;

use crate::adapters::trait_::{AdapterError, SourceAdapter, decode_response, transport_error};

pub struct GeniusAdapter {
    client: reqwest::Client,
    base: Url,
    token: Option<String>,
}

impl GeniusAdapter {
    pub fn new(base: &str, token: Option<String>) -> anyhow::Result<Self> {
        Ok(Self {
            client: reqwest::Client::new(),
            base: Url::parse(base)?,
            token,
        })
    }
}

#[async_trait]
impl SourceAdapter for GeniusAdapter {
    async fn fetch(&self, source_id: &str) -> Result<JsonValue, AdapterError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| AdapterError::Unavailable {
                details: "genius base URL cannot hold a path".to_string(),
            })?
            .pop_if_empty()
            .extend(["artists", source_id]);

        let mut request = self.client.get(url).query(&[("text_format", "plain")]);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|err| transport_error("genius", err))?;

        decode_response("genius", response).await
    }
}

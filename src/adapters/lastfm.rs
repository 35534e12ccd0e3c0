//! Last.fm listening-history adapter
//!
//! Fetches artist info from the Last.fm API (`artist.getinfo`). Last.fm is a
//! query-parameter API with a single endpoint; the artist name doubles as the
//! source id.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use url::Url;

use crate::adapters::trait_::{AdapterError, SourceAdapter, decode_response, transport_error};

pub struct LastfmAdapter {
    client: reqwest::Client,
    base: Url,
    api_key: Option<String>,
}

impl LastfmAdapter {
    pub fn new(base: &str, api_key: Option<String>) -> anyhow::Result<Self> {
        Ok(Self {
            client: reqwest::Client::new(),
            base: Url::parse(base)?,
            api_key,
        })
    }
}

#[async_trait]
impl SourceAdapter for LastfmAdapter {
    async fn fetch(&self, source_id: &str) -> Result<JsonValue, AdapterError> {
        let Some(api_key) = &self.api_key else {
            return Err(AdapterError::Unavailable {
                details: "lastfm api key not configured".to_string(),
            });
        };

        let mut url = self.base.clone();
        url.query_pairs_mut()
            .append_pair("method", "artist.getinfo")
            .append_pair("artist", source_id)
            .append_pair("autocorrect", "1")
            .append_pair("api_key", api_key)
            .append_pair("format", "json");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| transport_error("lastfm", err))?;

        let payload = decode_response("lastfm", response).await?;

        // Last.fm reports missing artists as a 200 with an error envelope.
        if let Some(code) = payload.get("error").and_then(JsonValue::as_i64) {
            let message = payload
                .get("message")
                .and_then(JsonValue::as_str)
                .unwrap_or("unknown error");
            return if code == 6 {
                Err(AdapterError::NotFoundUpstream)
            } else if code == 29 {
                Err(AdapterError::RateLimited {
                    retry_after_secs: None,
                })
            } else {
                Err(AdapterError::Unavailable {
                    details: format!("lastfm error {code}: {message}"),
                })
            };
        }

        Ok(payload)
    }
}

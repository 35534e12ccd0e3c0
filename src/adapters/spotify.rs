//! Spotify catalog adapter
//!
//! Fetches artist objects from the Spotify Web API (`/artists/{id}`).

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use url::Url;

use crate::adapters::trait_::{AdapterError, SourceAdapter, decode_response, transport_error};

pub struct SpotifyAdapter {
    client: reqwest::Client,
    base: Url,
    token: Option<String>,
}

impl SpotifyAdapter {
    pub fn new(base: &str, token: Option<String>) -> anyhow::Result<Self> {
        Ok(Self {
            client: reqwest::Client::new(),
            base: Url::parse(base)?,
            token,
        })
    }

    fn artist_url(&self, source_id: &str) -> Result<Url, AdapterError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| AdapterError::Unavailable {
                details: "spotify base URL cannot hold a path".to_string(),
            })?
            .pop_if_empty()
            .extend(["artists", source_id]);
        Ok(url)
    }
}

#[async_trait]
impl SourceAdapter for SpotifyAdapter {
    async fn fetch(&self, source_id: &str) -> Result<JsonValue, AdapterError> {
        let mut request = self.client.get(self.artist_url(source_id)?);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|err| transport_error("spotify", err))?;

        decode_response("spotify", response).await
    }
}

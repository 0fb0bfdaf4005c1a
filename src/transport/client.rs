//! HTTP Peer Client
//!
//! `HttpGetter` fetches one key from one peer with a plain GET against
//! `<base-url><group>/<key>`, both path segments percent-encoded.

use crate::domain::ports::{FetchRequest, FetchResponse, PeerGetter};
use crate::error::{Error, Result};
use crate::transport::codec;
use async_trait::async_trait;
use tracing::debug;

/// Client for a single peer
#[derive(Debug, Clone)]
pub struct HttpGetter {
    /// Peer address plus base path, e.g. `http://10.0.0.2:8001/_peercache/`
    base_url: String,
    client: reqwest::Client,
}

impl HttpGetter {
    /// Create a client for the peer reachable at `base_url`
    pub fn new(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into(),
            client,
        }
    }

    /// Full URL for `request`
    pub fn request_url(&self, request: &FetchRequest) -> String {
        format!(
            "{}{}/{}",
            self.base_url,
            urlencoding::encode(&request.group),
            urlencoding::encode(&request.key)
        )
    }
}

#[async_trait]
impl PeerGetter for HttpGetter {
    async fn get(&self, request: &FetchRequest) -> Result<FetchResponse> {
        let url = self.request_url(request);
        debug!(peer = %self.base_url, url = %url, "Fetching from peer");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::PeerRequest {
                peer: self.base_url.clone(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::PeerStatus {
                peer: self.base_url.clone(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(|e| Error::PeerRequest {
            peer: self.base_url.clone(),
            reason: format!("reading response body: {}", e),
        })?;

        codec::decode_response(&body)
    }

    fn peer_addr(&self) -> &str {
        &self.base_url
    }
}

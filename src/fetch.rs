//! Fetching source images over HTTP.
//!
//! [`SourceFetcher`] is the seam between the proxy and the network: it
//! returns the raw status, content type and body of a GET, and
//! [`FetchedSource::into_image_bytes`] decides whether that is something the
//! pipeline will accept (status 200 and an `image/*` content type).
//!
//! [`HttpFetcher`] is the production implementation on `reqwest`. Only the
//! body of an acceptable response is read; anything else comes back with an
//! empty body. The body is streamed chunk by chunk so an oversized source is
//! rejected as soon as it crosses `max_bytes`, without buffering the rest.

use crate::config::FetchConfig;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("fetch failed: {0}")]
    Transport(String),
    #[error("source exceeds {limit} bytes")]
    TooLarge { limit: u64 },
    #[error("source responded with status {0}")]
    Status(u16),
    #[error("source is not an image (content-type: {0:?})")]
    NotAnImage(String),
}

/// Raw outcome of a source GET.
#[derive(Debug, Clone)]
pub struct FetchedSource {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl FetchedSource {
    /// Accept the body only for status 200 with an `image/*` content type.
    pub fn into_image_bytes(self) -> Result<Bytes, FetchError> {
        if self.status != 200 {
            return Err(FetchError::Status(self.status));
        }
        match self.content_type {
            Some(ct) if is_image_content_type(&ct) => Ok(self.body),
            other => Err(FetchError::NotAnImage(other.unwrap_or_default())),
        }
    }
}

/// `true` for `image/<anything>`, ignoring case and parameters.
pub fn is_image_content_type(content_type: &str) -> bool {
    let essence = content_type.split(';').next().unwrap_or("").trim();
    essence
        .get(..6)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("image/"))
        && essence.len() > 6
}

#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedSource, FetchError>;
}

/// `reqwest`-backed fetcher with a request timeout and a body size limit.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    max_bytes: u64,
}

impl HttpFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            max_bytes: config.max_bytes,
        })
    }
}

#[async_trait]
impl SourceFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedSource, FetchError> {
        let transport = |e: reqwest::Error| FetchError::Transport(e.to_string());
        let mut response = self.client.get(url).send().await.map_err(transport)?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        // Rejected responses are never read
        let accepted = status == 200 && content_type.as_deref().is_some_and(is_image_content_type);
        if !accepted {
            return Ok(FetchedSource {
                status,
                content_type,
                body: Bytes::new(),
            });
        }

        let too_large = FetchError::TooLarge {
            limit: self.max_bytes,
        };
        if response
            .content_length()
            .is_some_and(|len| len > self.max_bytes)
        {
            return Err(too_large);
        }

        let mut body = BytesMut::new();
        while let Some(chunk) = response.chunk().await.map_err(transport)? {
            if body.len() as u64 + chunk.len() as u64 > self.max_bytes {
                return Err(too_large);
            }
            body.extend_from_slice(&chunk);
        }

        Ok(FetchedSource {
            status,
            content_type,
            body: body.freeze(),
        })
    }
}

//! The transform-and-cache pipeline for one request.
//!
//! ```text
//! TransformRequest ─► fingerprint ─► cache hit? ──yes──► cached bytes
//!                                        │
//!                                        no
//!                                        ▼
//!                    parse options ─► fetch ─► transform ─► cache put ─► bytes
//! ```
//!
//! Every stage after the cache lookup can fail; each failure is a
//! [`ProxyError`] and the caller serves the fallback image for all of them
//! alike. A failed cache write is logged and otherwise ignored.
//!
//! The transform is CPU-bound and runs on tokio's blocking pool, so a slow
//! encode never stalls other requests.

use crate::cache::CacheStore;
use crate::fetch::{FetchError, SourceFetcher};
use crate::imaging::{self, BackendError, ImageBackend, OptionsError, TransformOptions};
use crate::request::{RequestError, TransformRequest};
use bytes::Bytes;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProxyError {
    #[error(transparent)]
    Request(#[from] RequestError),
    #[error(transparent)]
    Options(#[from] OptionsError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Imaging(#[from] BackendError),
    #[error("transform task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// A rendered image ready to serve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub bytes: Bytes,
    pub mime: &'static str,
    /// Served from the cache without fetching.
    pub cached: bool,
}

/// Shared, cloneable handle to the pipeline's collaborators.
#[derive(Clone)]
pub struct ImageProxy {
    cache: Arc<CacheStore>,
    fetcher: Arc<dyn SourceFetcher>,
    backend: Arc<dyn ImageBackend>,
}

impl ImageProxy {
    pub fn new(
        cache: Arc<CacheStore>,
        fetcher: Arc<dyn SourceFetcher>,
        backend: Arc<dyn ImageBackend>,
    ) -> Self {
        Self {
            cache,
            fetcher,
            backend,
        }
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    /// Serve `request` from the cache, or fetch, transform and cache it.
    pub async fn render(&self, request: &TransformRequest) -> Result<Rendered, ProxyError> {
        let fingerprint = request.fingerprint();

        if let Some(bytes) = self.cache.get(&fingerprint).await {
            tracing::debug!(%fingerprint, "cache hit");
            return Ok(Rendered {
                mime: imaging::sniff_mime(&bytes),
                bytes,
                cached: true,
            });
        }
        tracing::debug!(%fingerprint, url = request.url(), "cache miss");

        let options = TransformOptions::from_request(request)?;
        let source = self
            .fetcher
            .fetch(request.url())
            .await?
            .into_image_bytes()?;

        let backend = Arc::clone(&self.backend);
        let encoded = tokio::task::spawn_blocking(move || {
            imaging::transform(backend.as_ref(), &source, &options)
        })
        .await??;

        let bytes = Bytes::from(encoded.bytes);
        if let Err(e) = self.cache.put(&fingerprint, bytes.clone()).await {
            tracing::warn!(%fingerprint, error = %e, "cache write failed");
        }

        Ok(Rendered {
            bytes,
            mime: encoded.mime,
            cached: false,
        })
    }
}

//! # Image Proxy
//!
//! An HTTP service that fetches a source image by URL, applies the requested
//! transform (resize, rotate, mirror, colour effects, re-encode) and serves
//! the result. Every distinct parameter set is rendered once per process;
//! repeats come straight from an on-disk cache.
//!
//! # Architecture: Transform-and-Cache Pipeline
//!
//! Each request flows through the same stages:
//!
//! ```text
//! 1. Canonicalize   route + body + query  →  TransformRequest + Fingerprint
//! 2. Cache lookup   Fingerprint           →  hit: cached bytes, done
//! 3. Fetch          url                   →  source bytes (image/* only)
//! 4. Transform      source + options      →  encoded output
//! 5. Store          Fingerprint + output  →  cache entry (atomic rename)
//! ```
//!
//! Any failure along the way is answered with the fallback JPEG, status 200.
//! The cause is logged, never sent to the client.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`request`] | Merges the three parameter sources, validates `url`, derives the fingerprint |
//! | [`imaging`] | Geometry resolution, the pixel pipeline and encoding behind the [`imaging::ImageBackend`] trait |
//! | [`fetch`] | Outbound source fetching behind the [`fetch::SourceFetcher`] trait |
//! | [`cache`] | Per-process directory of transformed images keyed by fingerprint |
//! | [`proxy`] | Orchestrates cache, fetch and transform for one request |
//! | [`fallback`] | The image served on any failure |
//! | [`server`] | Axum routes, body parsing and the middleware stack |
//! | [`config`] | TOML config loading, merging and validation |
//!
//! # Design Decisions
//!
//! ## Fingerprint Over Raw Parameters
//!
//! The cache key is a SHA-256 over the sorted, length-prefixed parameter set,
//! not over the URL text. Two requests that differ only in parameter order or
//! in which source (path, body, query) carried a value share one entry. The
//! fetched bytes are never hashed, so a source that changes upstream keeps
//! serving the old render until the process restarts.
//!
//! ## Pure-Rust Imaging
//!
//! The [`imaging`] module uses the `image` crate for decoding, Lanczos3
//! resampling and all encoders (AVIF via `ravif`). No ImageMagick or libvips
//! to install; the binary is self-contained.
//!
//! ## Traits at the I/O Seams
//!
//! [`fetch::SourceFetcher`] and [`imaging::ImageBackend`] are the only two
//! places the pipeline touches the outside world. Tests swap in a stub fetcher
//! and a recording mock backend, so the orchestration logic is exercised
//! without a network or real codecs.
//!
//! ## Process-Scoped Cache
//!
//! The cache directory is created at startup and removed on shutdown. There
//! is no eviction, no TTL and no sharing between processes. Concurrent
//! identical misses each render; the last atomic rename wins and both writers
//! produce the same bytes.

pub mod cache;
pub mod config;
pub mod fallback;
pub mod fetch;
pub mod imaging;
pub mod proxy;
pub mod request;
pub mod server;

#[cfg(test)]
pub(crate) mod test_helpers;

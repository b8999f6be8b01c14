//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait defines the two operations every backend must
//! support: identify (read intrinsic metadata without a full decode) and
//! transform (decode, apply a [`TransformPlan`], encode).
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend), built on the `image`
//! crate. Tests swap in a recording mock.

use super::params::TransformPlan;
use image::ImageFormat;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("failed to decode source image: {0}")]
    Decode(String),
    #[error("failed to encode output image: {0}")]
    Encode(String),
    #[error("unsupported output format: {0}")]
    UnsupportedFormat(String),
}

/// Intrinsic properties of a source image, read from its header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceMetadata {
    pub width: u32,
    pub height: u32,
    pub format: Option<ImageFormat>,
}

/// Trait for image processing backends.
///
/// Implementations must be deterministic: the same source bytes and plan
/// always produce the same output bytes.
pub trait ImageBackend: Send + Sync {
    /// Read source dimensions and format without decoding pixel data.
    fn identify(&self, source: &[u8]) -> Result<SourceMetadata, BackendError>;

    /// Decode `source`, apply `plan` in its fixed operation order, and encode.
    fn transform(&self, source: &[u8], plan: &TransformPlan) -> Result<Vec<u8>, BackendError>;
}

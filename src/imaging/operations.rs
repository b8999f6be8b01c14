//! High-level image operations.
//!
//! These functions combine calculations with backend execution: inspect the
//! source, resolve geometry, build a [`TransformPlan`], run the backend, and
//! label the result with a MIME type sniffed from the bytes actually produced.

use super::backend::{BackendError, ImageBackend};
use super::calculations::{passthrough_geometry, resolve_geometry};
use super::params::{TransformOptions, TransformPlan};

/// Result type for image operations.
pub type Result<T> = std::result::Result<T, BackendError>;

/// MIME type for bytes we cannot identify.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// An encoded output buffer and the MIME type of its actual contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoded {
    pub bytes: Vec<u8>,
    pub mime: &'static str,
}

/// Detect the MIME type from magic bytes.
pub fn sniff_mime(bytes: &[u8]) -> &'static str {
    image::guess_format(bytes)
        .map(|format| format.to_mime_type())
        .unwrap_or(OCTET_STREAM)
}

/// Plan a transform without executing it.
///
/// Geometry is resolved against the source's intrinsic size. If the source
/// cannot be identified, requested dimensions pass through unresolved and
/// the backend decides what to do with them.
pub fn plan_transform(
    backend: &(impl ImageBackend + ?Sized),
    source: &[u8],
    options: &TransformOptions,
) -> TransformPlan {
    let requested = (options.width, options.height);
    let geometry = match backend.identify(source) {
        Ok(meta) => resolve_geometry(requested, (meta.width, meta.height)),
        Err(e) => {
            tracing::debug!(error = %e, "source metadata unavailable, skipping geometry resolution");
            passthrough_geometry(requested)
        }
    };

    TransformPlan {
        width: geometry.width,
        height: geometry.height,
        fit: options.fit,
        background: options.background.unwrap_or_default(),
        flags: options.flags,
        rotate: options.rotate,
        format: options.format.clone(),
    }
}

/// Run the full transform pipeline on `source`.
pub fn transform(
    backend: &(impl ImageBackend + ?Sized),
    source: &[u8],
    options: &TransformOptions,
) -> Result<Encoded> {
    let plan = plan_transform(backend, source, options);
    let bytes = backend.transform(source, &plan)?;
    let mime = sniff_mime(&bytes);
    Ok(Encoded { bytes, mime })
}

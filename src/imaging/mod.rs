//! Image processing: pure Rust, statically linked.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Identify** | `ImageReader::into_dimensions` |
//! | **Resize** | Lanczos3, with cover crop / contain padding |
//! | **Flip, flop, rotate** | `image` transforms + `imageproc` free rotation |
//! | **Greyscale, negate, normalize** | `image` colour ops + `imageproc` percentile stretch |
//! | **Encode** | JPEG, PNG, WebP, GIF, TIFF, BMP, AVIF (rav1e) |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension math (unit testable)
//! - **Parameters**: Data structures describing image operations
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]
//! - **Effects**: Pixel operations not provided by the `image` crate
//! - **Operations**: High-level functions combining calculations + backend

pub mod backend;
mod calculations;
mod effects;
pub mod operations;
pub mod params;
pub mod rust_backend;

pub use backend::{BackendError, ImageBackend, SourceMetadata};
pub use calculations::{ResizePlan, ResolvedGeometry, plan_resize, resolve_geometry};
pub use operations::{Encoded, plan_transform, sniff_mime, transform};
pub use params::{Background, Fit, OptionsError, OutputFormat, TransformOptions, TransformPlan};
pub use rust_backend::RustBackend;

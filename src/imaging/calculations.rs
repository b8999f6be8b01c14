//! Pure calculation functions for image dimensions.
//!
//! All functions here are pure and testable without any I/O or images.
//!
//! Two steps live here:
//!
//! 1. [`resolve_geometry`] turns the *requested* width/height into the
//!    dimensions handed to the resize step, using the source's intrinsic size.
//! 2. [`plan_resize`] decides, for a given fit mode, what resize / crop / pad
//!    to perform on the decoded image.
//!
//! Both never enlarge: output dimensions stay within the source dimensions.

use super::params::Fit;

/// Dimensions handed to the resize step. `None` means "no constraint".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResolvedGeometry {
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// Resolve requested dimensions against the source's intrinsic size.
///
/// # Rules
/// 1. Both requested: keep the *requested* aspect ratio and clamp the
///    constraining axis to the source. If the request is relatively wider
///    than the source, width is clamped and height derived; otherwise height
///    is clamped and width derived.
/// 2. Width only: clamp to the source width.
/// 3. Height only: clamp to the source height.
/// 4. Neither: no constraint.
///
/// Non-positive or non-finite requests count as absent. Results are
/// truncated toward zero and a zero result is unset.
///
/// # Examples
/// ```
/// # use image_proxy::imaging::{resolve_geometry, ResolvedGeometry};
/// let resolved = resolve_geometry((Some(1600.0), None), (800, 600));
/// assert_eq!(resolved, ResolvedGeometry { width: Some(800), height: None });
/// ```
pub fn resolve_geometry(
    requested: (Option<f64>, Option<f64>),
    intrinsic: (u32, u32),
) -> ResolvedGeometry {
    let (req_w, req_h) = (positive(requested.0), positive(requested.1));
    let (src_w, src_h) = intrinsic;
    if src_w == 0 || src_h == 0 {
        return passthrough_geometry((req_w, req_h));
    }
    let (src_w, src_h) = (src_w as f64, src_h as f64);

    let (width, height) = match (req_w, req_h) {
        (Some(w), Some(h)) => {
            let original_ratio = src_h / src_w;
            let new_ratio = h / w;
            if new_ratio < original_ratio {
                // Target is relatively wider: width constrains
                let width = w.min(src_w);
                (Some(width), Some(width * new_ratio))
            } else {
                let height = h.min(src_h);
                (Some(height / new_ratio), Some(height))
            }
        }
        (Some(w), None) => (Some(w.min(src_w)), None),
        (None, Some(h)) => (None, Some(h.min(src_h))),
        (None, None) => (None, None),
    };

    ResolvedGeometry {
        width: width.and_then(to_pixels),
        height: height.and_then(to_pixels),
    }
}

/// Requested dimensions without source information: truncated, nothing else.
pub fn passthrough_geometry(requested: (Option<f64>, Option<f64>)) -> ResolvedGeometry {
    ResolvedGeometry {
        width: positive(requested.0).and_then(to_pixels),
        height: positive(requested.1).and_then(to_pixels),
    }
}

fn positive(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v > 0.0)
}

fn to_pixels(value: f64) -> Option<u32> {
    let truncated = value.trunc();
    if truncated >= 1.0 && truncated.is_finite() {
        Some(truncated.min(u32::MAX as f64) as u32)
    } else {
        None
    }
}

/// Resize work for one image, as decided by [`plan_resize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizePlan {
    /// Leave the image as it is.
    Keep,
    /// Resize to exactly these dimensions.
    Scale { width: u32, height: u32 },
    /// Resize to `width × height`, then centre-crop to `crop_width × crop_height`.
    Cover {
        width: u32,
        height: u32,
        crop_width: u32,
        crop_height: u32,
    },
    /// Resize to `width × height`, then centre on a `canvas_width × canvas_height`
    /// background.
    Contain {
        width: u32,
        height: u32,
        canvas_width: u32,
        canvas_height: u32,
    },
}

/// Plan the resize of a `source`-sized image to the requested box.
///
/// With one dimension given every fit mode scales proportionally. Scale
/// factors are capped at 1.0, and for `fill`, `cover` and `contain` the box
/// itself is clamped per axis to the source, so no output dimension ever
/// exceeds the source.
pub fn plan_resize(
    source: (u32, u32),
    width: Option<u32>,
    height: Option<u32>,
    fit: Fit,
) -> ResizePlan {
    let (src_w, src_h) = source;
    if src_w == 0 || src_h == 0 {
        return ResizePlan::Keep;
    }

    let (box_w, box_h) = match (width, height) {
        (None, None) => return ResizePlan::Keep,
        (Some(w), None) => return proportional(source, w as f64 / src_w as f64),
        (None, Some(h)) => return proportional(source, h as f64 / src_h as f64),
        (Some(w), Some(h)) => (w, h),
    };
    let scale_x = box_w as f64 / src_w as f64;
    let scale_y = box_h as f64 / src_h as f64;

    match fit {
        Fit::Inside => proportional(source, scale_x.min(scale_y)),
        Fit::Outside => proportional(source, scale_x.max(scale_y)),
        Fit::Fill => {
            let target = (box_w.min(src_w), box_h.min(src_h));
            if target == source {
                ResizePlan::Keep
            } else {
                ResizePlan::Scale {
                    width: target.0,
                    height: target.1,
                }
            }
        }
        Fit::Cover => {
            let (width, height) = scaled(source, scale_x.max(scale_y));
            let crop = (box_w.min(width), box_h.min(height));
            if crop == (width, height) {
                return exact_or_keep(source, (width, height));
            }
            ResizePlan::Cover {
                width,
                height,
                crop_width: crop.0,
                crop_height: crop.1,
            }
        }
        Fit::Contain => {
            let (width, height) = scaled(source, scale_x.min(scale_y));
            let canvas = (box_w.min(src_w).max(width), box_h.min(src_h).max(height));
            if canvas == (width, height) {
                return exact_or_keep(source, (width, height));
            }
            ResizePlan::Contain {
                width,
                height,
                canvas_width: canvas.0,
                canvas_height: canvas.1,
            }
        }
    }
}

fn proportional(source: (u32, u32), scale: f64) -> ResizePlan {
    exact_or_keep(source, scaled(source, scale))
}

fn exact_or_keep(source: (u32, u32), target: (u32, u32)) -> ResizePlan {
    if target == source {
        ResizePlan::Keep
    } else {
        ResizePlan::Scale {
            width: target.0,
            height: target.1,
        }
    }
}

/// Scale both axes by `scale`, capped at 1.0; never below one pixel.
fn scaled(source: (u32, u32), scale: f64) -> (u32, u32) {
    let scale = scale.min(1.0);
    let axis = |len: u32| ((len as f64 * scale).round() as u32).clamp(1, len);
    (axis(source.0), axis(source.1))
}

//! Pixel operations the `image` crate does not provide directly, built on
//! `imageproc` where it has the primitive.
//!
//! - [`rotate`]: any integer angle. Quarter turns are lossless; other angles
//!   resample bilinearly onto an expanded canvas filled with the background
//!   colour.
//! - [`normalize`]: stretch luminance so the 1st..99th percentile spans 0..255.
//! - [`flatten`]: composite alpha onto a solid colour (for JPEG output).

use super::params::Background;
use image::imageops;
use image::{DynamicImage, GrayAlphaImage, GrayImage, Rgba, RgbaImage, RgbImage};
use imageproc::geometric_transformations::{self, Interpolation};
use imageproc::stats;

/// Rotate clockwise by `degrees`.
pub fn rotate(img: DynamicImage, degrees: i32, background: Background) -> DynamicImage {
    match degrees.rem_euclid(360) {
        0 => img,
        90 => img.rotate90(),
        180 => img.rotate180(),
        270 => img.rotate270(),
        angle => DynamicImage::ImageRgba8(rotate_free(
            &img.to_rgba8(),
            f64::from(angle),
            background.rgba(),
        )),
    }
}

/// Rotate about the centre onto a canvas large enough for the whole result.
///
/// The source is centred on a square as wide as its diagonal, so no pixel is
/// lost during rotation, then the rotated bounding box is cropped out.
fn rotate_free(src: &RgbaImage, degrees: f64, fill: Rgba<u8>) -> RgbaImage {
    let (sin, cos) = degrees.to_radians().sin_cos();
    let (src_w, src_h) = (f64::from(src.width()), f64::from(src.height()));
    let dst_w = (src_w * cos.abs() + src_h * sin.abs()).round().max(1.0) as u32;
    let dst_h = (src_w * sin.abs() + src_h * cos.abs()).round().max(1.0) as u32;
    let side = src_w.hypot(src_h).ceil() as u32;
    let side = side.max(dst_w).max(dst_h);

    let mut canvas = RgbaImage::from_pixel(side, side, fill);
    imageops::replace(
        &mut canvas,
        src,
        i64::from((side - src.width()) / 2),
        i64::from((side - src.height()) / 2),
    );
    let rotated = geometric_transformations::rotate_about_center(
        &canvas,
        degrees.to_radians() as f32,
        Interpolation::Bilinear,
        fill,
    );
    imageops::crop_imm(
        &rotated,
        (side - dst_w) / 2,
        (side - dst_h) / 2,
        dst_w,
        dst_h,
    )
    .to_image()
}

/// Linear stretch from `[low, high]` to `[0, 255]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Stretch {
    low: u8,
    high: u8,
}

impl Stretch {
    /// 1st and 99th percentile of the luminance. `None` for flat images.
    fn from_luma(luma: &GrayImage) -> Option<Self> {
        if luma.width() == 0 || luma.height() == 0 {
            return None;
        }
        let low = stats::percentile(luma, 1);
        let high = stats::percentile(luma, 99);
        (high > low).then_some(Self { low, high })
    }

    fn apply(self, value: u8) -> u8 {
        let span = u32::from(self.high - self.low);
        let shifted = u32::from(value.saturating_sub(self.low));
        (shifted * 255 / span).min(255) as u8
    }
}

/// Contrast-stretch luminance across the full range. Alpha is untouched.
pub fn normalize(img: DynamicImage) -> DynamicImage {
    let has_alpha = img.color().has_alpha();
    let is_grey = matches!(
        img,
        DynamicImage::ImageLuma8(_)
            | DynamicImage::ImageLumaA8(_)
            | DynamicImage::ImageLuma16(_)
            | DynamicImage::ImageLumaA16(_)
    );

    if is_grey {
        let Some(stretch) = Stretch::from_luma(&img.to_luma8()) else {
            return img;
        };
        let mut grey: GrayAlphaImage = img.to_luma_alpha8();
        for p in grey.pixels_mut() {
            p[0] = stretch.apply(p[0]);
        }
        let out = DynamicImage::ImageLumaA8(grey);
        return if has_alpha {
            out
        } else {
            DynamicImage::ImageLuma8(out.to_luma8())
        };
    }

    let Some(stretch) = Stretch::from_luma(&img.to_luma8()) else {
        return img;
    };
    let mut rgba = img.to_rgba8();
    for p in rgba.pixels_mut() {
        for c in 0..3 {
            p[c] = stretch.apply(p[c]);
        }
    }
    let out = DynamicImage::ImageRgba8(rgba);
    if has_alpha {
        out
    } else {
        DynamicImage::ImageRgb8(out.to_rgb8())
    }
}

/// Composite onto an opaque `background`. Images without alpha are returned as-is.
pub fn flatten(img: DynamicImage, background: Background) -> DynamicImage {
    if !img.color().has_alpha() {
        return img;
    }
    let [br, bg, bb, _] = background.0;
    let rgba = img.to_rgba8();
    let blend = |c: u8, b: u8, a: u32| -> u8 {
        ((u32::from(c) * a + u32::from(b) * (255 - a) + 127) / 255) as u8
    };
    let rgb = RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let p = rgba.get_pixel(x, y);
        let a = u32::from(p[3]);
        image::Rgb([blend(p[0], br, a), blend(p[1], bg, a), blend(p[2], bb, a)])
    });
    DynamicImage::ImageRgb8(rgb)
}

//! Pure Rust image processing backend built on the `image` crate.
//!
//! Everything is statically linked into the binary.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Identify | `ImageReader::with_guessed_format` + `into_dimensions` |
//! | Decode (JPEG, PNG, TIFF, WebP, GIF, BMP) | `image` crate (pure Rust decoders) |
//! | Resize | `DynamicImage::resize_exact` with `Lanczos3` |
//! | Cover crop | `DynamicImage::crop_imm`, centred |
//! | Contain padding | `imageops::overlay` onto a background canvas |
//! | Flip / flop | `flipv` / `fliph` |
//! | Rotate | `rotate90/180/270`, or [`effects::rotate`] for other angles |
//! | Greyscale / negate | `grayscale` / `invert` |
//! | Normalize | [`effects::normalize`] |
//! | Encode → JPEG | `JpegEncoder`, quality 80, alpha flattened onto the background |
//! | Encode → AVIF | `AvifEncoder` (rav1e, speed 6) |
//! | Encode → others | `DynamicImage::write_to` |
//!
//! AVIF is encode-only: the `image` crate's `"avif"` feature does not
//! include a decoder, so AVIF sources fail at decode.

use super::backend::{BackendError, ImageBackend, SourceMetadata};
use super::calculations::{ResizePlan, plan_resize};
use super::effects;
use super::params::{Background, OutputFormat, TransformPlan};
use crate::request::Flags;
use image::codecs::avif::AvifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{ColorType, DynamicImage, GenericImageView, ImageReader, RgbaImage};
use std::io::Cursor;

const JPEG_QUALITY: u8 = 80;
const AVIF_QUALITY: u8 = 80;
const AVIF_SPEED: u8 = 6;

/// Pure Rust backend using the `image` crate ecosystem.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn reader(source: &[u8]) -> Result<ImageReader<Cursor<&[u8]>>, BackendError> {
    ImageReader::new(Cursor::new(source))
        .with_guessed_format()
        .map_err(|e| BackendError::Decode(e.to_string()))
}

/// Pick the output format: the requested one, else the source's own, else PNG.
fn output_format(requested: Option<&str>, source: &[u8]) -> Result<OutputFormat, BackendError> {
    match requested {
        Some(name) => OutputFormat::parse(name)
            .ok_or_else(|| BackendError::UnsupportedFormat(name.to_string())),
        None => Ok(image::guess_format(source)
            .ok()
            .and_then(OutputFormat::from_image_format)
            .unwrap_or(OutputFormat::Png)),
    }
}

fn apply_resize(img: DynamicImage, plan: &TransformPlan) -> DynamicImage {
    match plan_resize(img.dimensions(), plan.width, plan.height, plan.fit) {
        ResizePlan::Keep => img,
        ResizePlan::Scale { width, height } => img.resize_exact(width, height, FilterType::Lanczos3),
        ResizePlan::Cover {
            width,
            height,
            crop_width,
            crop_height,
        } => {
            let scaled = img.resize_exact(width, height, FilterType::Lanczos3);
            let x = (width - crop_width) / 2;
            let y = (height - crop_height) / 2;
            scaled.crop_imm(x, y, crop_width, crop_height)
        }
        ResizePlan::Contain {
            width,
            height,
            canvas_width,
            canvas_height,
        } => {
            let opaque = !img.color().has_alpha() && plan.background.0[3] == u8::MAX;
            let scaled = img.resize_exact(width, height, FilterType::Lanczos3).to_rgba8();
            let mut canvas =
                RgbaImage::from_pixel(canvas_width, canvas_height, plan.background.rgba());
            let x = (canvas_width - width) / 2;
            let y = (canvas_height - height) / 2;
            imageops::overlay(&mut canvas, &scaled, i64::from(x), i64::from(y));
            let padded = DynamicImage::ImageRgba8(canvas);
            if opaque {
                DynamicImage::ImageRgb8(padded.to_rgb8())
            } else {
                padded
            }
        }
    }
}

/// Apply the plan's operations in their fixed order.
fn apply_plan(img: DynamicImage, plan: &TransformPlan) -> DynamicImage {
    let mut img = apply_resize(img, plan);
    if plan.flags.contains(Flags::FLIP) {
        img = img.flipv();
    }
    if plan.flags.contains(Flags::FLOP) {
        img = img.fliph();
    }
    img = effects::rotate(img, plan.rotate, plan.background);
    if plan.flags.contains(Flags::GREYSCALE) {
        img = img.grayscale();
    }
    if plan.flags.contains(Flags::NEGATE) {
        img.invert();
    }
    if plan.flags.contains(Flags::NORMALIZE) {
        img = effects::normalize(img);
    }
    img
}

fn is_grey(color: ColorType) -> bool {
    matches!(
        color,
        ColorType::L8 | ColorType::L16 | ColorType::La8 | ColorType::La16
    )
}

/// Same channel layout, 8 bits per channel.
fn eight_bit(img: DynamicImage) -> DynamicImage {
    let color = img.color();
    match (is_grey(color), color.has_alpha()) {
        (true, false) => DynamicImage::ImageLuma8(img.to_luma8()),
        (true, true) => DynamicImage::ImageLumaA8(img.to_luma_alpha8()),
        (false, false) => DynamicImage::ImageRgb8(img.to_rgb8()),
        (false, true) => DynamicImage::ImageRgba8(img.to_rgba8()),
    }
}

/// Convert to a pixel layout the target encoder accepts.
fn prepare_for_encoding(
    img: DynamicImage,
    format: OutputFormat,
    background: Background,
) -> DynamicImage {
    match format {
        OutputFormat::Jpeg => {
            let grey = is_grey(img.color());
            let flat = effects::flatten(img, background);
            if grey {
                DynamicImage::ImageLuma8(flat.to_luma8())
            } else {
                DynamicImage::ImageRgb8(flat.to_rgb8())
            }
        }
        OutputFormat::Gif => DynamicImage::ImageRgba8(img.to_rgba8()),
        OutputFormat::WebP | OutputFormat::Avif | OutputFormat::Tiff => {
            if img.color().has_alpha() {
                DynamicImage::ImageRgba8(img.to_rgba8())
            } else {
                DynamicImage::ImageRgb8(img.to_rgb8())
            }
        }
        OutputFormat::Png | OutputFormat::Bmp => eight_bit(img),
    }
}

fn encode(img: &DynamicImage, format: OutputFormat) -> Result<Vec<u8>, BackendError> {
    let mut buf = Vec::new();
    let result = match format {
        OutputFormat::Jpeg => {
            img.write_with_encoder(JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY))
        }
        OutputFormat::Avif => img.write_with_encoder(AvifEncoder::new_with_speed_quality(
            &mut buf,
            AVIF_SPEED,
            AVIF_QUALITY,
        )),
        other => img.write_to(&mut Cursor::new(&mut buf), other.image_format()),
    };
    result.map_err(|e| BackendError::Encode(format!("{format:?}: {e}")))?;
    Ok(buf)
}

impl ImageBackend for RustBackend {
    fn identify(&self, source: &[u8]) -> Result<SourceMetadata, BackendError> {
        let reader = reader(source)?;
        let format = reader.format();
        let (width, height) = reader
            .into_dimensions()
            .map_err(|e| BackendError::Decode(format!("Failed to read dimensions: {e}")))?;
        Ok(SourceMetadata {
            width,
            height,
            format,
        })
    }

    fn transform(&self, source: &[u8], plan: &TransformPlan) -> Result<Vec<u8>, BackendError> {
        // Reject unknown formats before paying for a decode
        let format = output_format(plan.format.as_deref(), source)?;
        let img = reader(source)?
            .decode()
            .map_err(|e| BackendError::Decode(e.to_string()))?;
        let img = apply_plan(img, plan);
        let img = prepare_for_encoding(img, format, plan.background);
        encode(&img, format)
    }
}

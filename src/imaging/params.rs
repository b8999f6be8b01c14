//! Parameter types for image operations.
//!
//! These structs describe *what* to do, not *how* to do it. They sit between
//! the untyped [`TransformRequest`] mapping and the
//! [`backend`](super::backend), which does the actual pixel work.
//!
//! ## Types
//!
//! - [`Fit`]: How a width × height box relates to the source aspect ratio.
//! - [`Background`]: RGBA fill for letterboxing, rotation corners and JPEG flattening.
//! - [`OutputFormat`]: Encodable output formats, parsed from the `format` parameter.
//! - [`TransformOptions`]: Everything parsed out of a request, before geometry is resolved.
//! - [`TransformPlan`]: Resolved dimensions plus options; the backend's input.

use crate::request::{Flags, TransformRequest};
use image::ImageFormat;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OptionsError {
    #[error("unknown fit mode: {0}")]
    UnknownFit(String),
}

/// Resize policy when both width and height are given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Fit {
    /// Scale to cover the box, then centre-crop the overflow.
    #[default]
    Cover,
    /// Scale to fit inside the box, then pad with the background colour.
    Contain,
    /// Stretch to the box, ignoring aspect ratio.
    Fill,
    /// Scale to fit inside the box; no padding.
    Inside,
    /// Scale to cover the box; no cropping.
    Outside,
}

impl FromStr for Fit {
    type Err = OptionsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cover" => Ok(Fit::Cover),
            "contain" => Ok(Fit::Contain),
            "fill" => Ok(Fit::Fill),
            "inside" => Ok(Fit::Inside),
            "outside" => Ok(Fit::Outside),
            _ => Err(OptionsError::UnknownFit(s.to_string())),
        }
    }
}

/// RGBA background colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Background(pub [u8; 4]);

impl Background {
    pub const BLACK: Background = Background([0, 0, 0, 255]);

    /// Parse a hex colour: `rgb`, `rgba`, `rrggbb` or `rrggbbaa`, with or
    /// without a leading `#`.
    pub fn parse(raw: &str) -> Option<Self> {
        let hex = raw.trim().trim_start_matches('#');
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        let nibble = |i: usize| u8::from_str_radix(&hex[i..=i], 16).ok().map(|n| n * 17);
        let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
        match hex.len() {
            3 => Some(Self([nibble(0)?, nibble(1)?, nibble(2)?, 255])),
            4 => Some(Self([nibble(0)?, nibble(1)?, nibble(2)?, nibble(3)?])),
            6 => Some(Self([byte(0)?, byte(2)?, byte(4)?, 255])),
            8 => Some(Self([byte(0)?, byte(2)?, byte(4)?, byte(6)?])),
            _ => None,
        }
    }

    pub fn rgba(self) -> image::Rgba<u8> {
        image::Rgba(self.0)
    }
}

impl Default for Background {
    fn default() -> Self {
        Self::BLACK
    }
}

/// Output formats the backend can encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Jpeg,
    Png,
    WebP,
    Gif,
    Tiff,
    Avif,
    Bmp,
}

impl OutputFormat {
    /// Parse a `format` parameter value (case-insensitive).
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "webp" => Some(Self::WebP),
            "gif" => Some(Self::Gif),
            "tiff" | "tif" => Some(Self::Tiff),
            "avif" => Some(Self::Avif),
            "bmp" => Some(Self::Bmp),
            _ => None,
        }
    }

    /// Map a detected source format to an output format, if we can write it.
    pub fn from_image_format(format: ImageFormat) -> Option<Self> {
        match format {
            ImageFormat::Jpeg => Some(Self::Jpeg),
            ImageFormat::Png => Some(Self::Png),
            ImageFormat::WebP => Some(Self::WebP),
            ImageFormat::Gif => Some(Self::Gif),
            ImageFormat::Tiff => Some(Self::Tiff),
            ImageFormat::Avif => Some(Self::Avif),
            ImageFormat::Bmp => Some(Self::Bmp),
            _ => None,
        }
    }

    pub fn image_format(self) -> ImageFormat {
        match self {
            Self::Jpeg => ImageFormat::Jpeg,
            Self::Png => ImageFormat::Png,
            Self::WebP => ImageFormat::WebP,
            Self::Gif => ImageFormat::Gif,
            Self::Tiff => ImageFormat::Tiff,
            Self::Avif => ImageFormat::Avif,
            Self::Bmp => ImageFormat::Bmp,
        }
    }
}

/// Transform options parsed from a request, before the source is inspected.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformOptions {
    /// Requested width; `None` when absent, zero, negative or non-numeric.
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub fit: Fit,
    pub background: Option<Background>,
    pub flags: Flags,
    /// Clockwise rotation in degrees.
    pub rotate: i32,
    /// Raw `format` value; validated by the encoder.
    pub format: Option<String>,
}

impl TransformOptions {
    pub fn from_request(request: &TransformRequest) -> Result<Self, OptionsError> {
        let fit = match request.get("fit") {
            Some(raw) if !raw.is_empty() => raw.parse()?,
            _ => Fit::default(),
        };
        Ok(Self {
            width: request.get("width").and_then(parse_dimension),
            height: request.get("height").and_then(parse_dimension),
            fit,
            background: request.get("background").and_then(Background::parse),
            flags: request.flags(),
            rotate: request.get("rotate").map(parse_leading_int).unwrap_or(0),
            format: request
                .get("format")
                .filter(|f| !f.is_empty())
                .map(str::to_string),
        })
    }
}

/// Parse a requested dimension. Anything that is not a finite positive
/// number counts as "not requested".
pub fn parse_dimension(raw: &str) -> Option<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v > 0.0)
}

/// Parse the leading integer of a string (`"90deg"` → 90). Returns 0 when
/// there is none, and saturates on overflow.
pub fn parse_leading_int(raw: &str) -> i32 {
    let trimmed = raw.trim_start();
    let (negative, digits) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    let magnitude = digits
        .bytes()
        .take_while(u8::is_ascii_digit)
        .fold(0i64, |acc, d| {
            (acc * 10 + i64::from(d - b'0')).min(i64::from(i32::MAX) + 1)
        });
    let value = if negative { -magnitude } else { magnitude };
    value.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}

/// Everything the backend needs for one transform, after geometry resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformPlan {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fit: Fit,
    pub background: Background,
    pub flags: Flags,
    pub rotate: i32,
    pub format: Option<String>,
}

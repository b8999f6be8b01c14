//! The image served whenever a transform fails.
//!
//! Every pipeline error (missing url, bad source, undecodable bytes, unknown
//! format) produces the same response: this JPEG, with status 200. It is
//! loaded once at startup, from the configured file if there is one, else a
//! generated grey placeholder.

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageEncoder};
use std::io;
use std::path::Path;

const PLACEHOLDER_WIDTH: u32 = 320;
const PLACEHOLDER_HEIGHT: u32 = 240;
const PLACEHOLDER_GREY: u8 = 0xCC;

#[derive(Debug, Clone)]
pub struct FallbackImage {
    bytes: Bytes,
}

impl FallbackImage {
    /// Always served with this MIME type, whatever the file contains.
    pub const MIME: &'static str = "image/jpeg";

    /// Read `path` if given, else generate the placeholder.
    pub fn load(path: Option<&Path>) -> io::Result<Self> {
        match path {
            Some(path) => Ok(Self {
                bytes: Bytes::from(std::fs::read(path)?),
            }),
            None => Self::placeholder(),
        }
    }

    /// A flat grey JPEG.
    pub fn placeholder() -> io::Result<Self> {
        let pixels = vec![PLACEHOLDER_GREY; (PLACEHOLDER_WIDTH * PLACEHOLDER_HEIGHT * 3) as usize];
        let mut bytes = Vec::new();
        JpegEncoder::new(&mut bytes)
            .write_image(
                &pixels,
                PLACEHOLDER_WIDTH,
                PLACEHOLDER_HEIGHT,
                ExtendedColorType::Rgb8,
            )
            .map_err(io::Error::other)?;
        Ok(Self {
            bytes: Bytes::from(bytes),
        })
    }

    pub fn bytes(&self) -> Bytes {
        self.bytes.clone()
    }
}

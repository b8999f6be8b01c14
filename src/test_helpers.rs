//! Shared test utilities for the image-proxy test suite.
//!
//! Provides synthetic image generators and a [`StubFetcher`] that serves
//! canned responses and counts how often it was asked.
//!
//! # Usage
//!
//! ```ignore
//! use crate::test_helpers::*;
//!
//! let fetcher = Arc::new(StubFetcher::new().with_image("http://a/cat.png", png_bytes(64, 48)));
//! // ... render twice ...
//! assert_eq!(fetcher.calls(), 1);
//! ```

use crate::fetch::{FetchError, FetchedSource, SourceFetcher};
use async_trait::async_trait;
use bytes::Bytes;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};

// =========================================================================
// Synthetic images
// =========================================================================

fn encode(img: DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), format).unwrap();
    bytes
}

fn gradient(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    })
}

/// Opaque RGB gradient PNG.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    encode(DynamicImage::ImageRgb8(gradient(width, height)), ImageFormat::Png)
}

/// Gradient JPEG.
pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    encode(DynamicImage::ImageRgb8(gradient(width, height)), ImageFormat::Jpeg)
}

/// PNG whose left half is fully transparent.
pub fn rgba_png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = RgbaImage::from_fn(width, height, |x, _| {
        let alpha = if x < width / 2 { 0 } else { 255 };
        Rgba([200, 40, 40, alpha])
    });
    encode(DynamicImage::ImageRgba8(img), ImageFormat::Png)
}

// =========================================================================
// Stub fetcher
// =========================================================================

/// Fetcher serving canned responses by exact URL. Unknown URLs get a 404.
#[derive(Default)]
pub struct StubFetcher {
    responses: HashMap<String, FetchedSource>,
    calls: AtomicUsize,
}

impl StubFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `bytes` as `image/png` with status 200.
    pub fn with_image(self, url: &str, bytes: Vec<u8>) -> Self {
        self.with_response(url, 200, "image/png", bytes)
    }

    pub fn with_response(mut self, url: &str, status: u16, content_type: &str, body: Vec<u8>) -> Self {
        self.responses.insert(
            url.to_string(),
            FetchedSource {
                status,
                content_type: Some(content_type.to_string()),
                body: Bytes::from(body),
            },
        );
        self
    }

    /// Number of `fetch` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceFetcher for StubFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedSource, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .responses
            .get(url)
            .cloned()
            .unwrap_or_else(|| FetchedSource {
                status: 404,
                content_type: Some("text/plain".to_string()),
                body: Bytes::new(),
            }))
    }
}

//! Concurrent identical requests against one proxy.
//!
//! Misses on the same fingerprint race to render; each must still produce
//! the same bytes, and the cache must end up holding exactly those bytes.

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use image_proxy::cache::CacheStore;
use image_proxy::config::FetchConfig;
use image_proxy::fetch::HttpFetcher;
use image_proxy::imaging::RustBackend;
use image_proxy::proxy::ImageProxy;
use image_proxy::request::canonicalize;
use std::io::Cursor;
use std::sync::Arc;
use wiremock::matchers::path;
use wiremock::{Mock, MockServer, ResponseTemplate};

const CONCURRENT: usize = 8;

fn png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| Rgb([x as u8, y as u8, 200]));
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

fn query(url: &str) -> Vec<(String, String)> {
    [
        ("url", url),
        ("width", "64"),
        ("rotate", "30"),
        ("greyscale", ""),
        ("format", "png"),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn identical_requests_render_identical_bytes() {
    let origin = MockServer::start().await;
    Mock::given(path("/tile.png"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(png(200, 120), "image/png"))
        .mount(&origin)
        .await;
    let url = format!("{}/tile.png", origin.uri());

    let cache = Arc::new(CacheStore::create(None).unwrap());
    let proxy = ImageProxy::new(
        Arc::clone(&cache),
        Arc::new(HttpFetcher::new(&FetchConfig::default()).unwrap()),
        Arc::new(RustBackend::new()),
    );
    let request = canonicalize(Vec::new(), Vec::new(), query(&url)).unwrap();

    let handles: Vec<_> = (0..CONCURRENT)
        .map(|_| {
            let proxy = proxy.clone();
            let request = request.clone();
            tokio::spawn(async move { proxy.render(&request).await.unwrap() })
        })
        .collect();

    let mut outputs = Vec::new();
    for handle in handles {
        outputs.push(handle.await.unwrap());
    }

    let first = &outputs[0].bytes;
    assert!(outputs.iter().all(|r| &r.bytes == first));
    assert!(outputs.iter().all(|r| r.mime == "image/png"));

    let stored = std::fs::read(cache.entry_path(&request.fingerprint()).unwrap()).unwrap();
    assert_eq!(&stored[..], &first[..]);

    // Everything after the race is a hit
    let again = proxy.render(&request).await.unwrap();
    assert!(again.cached);
    assert_eq!(&again.bytes, first);

    let stats = cache.stats();
    assert_eq!(stats.total(), CONCURRENT as u64 + 1);
    assert!(stats.hits() >= 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn distinct_requests_do_not_interfere() {
    let origin = MockServer::start().await;
    Mock::given(path("/tile.png"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(png(200, 120), "image/png"))
        .mount(&origin)
        .await;
    let url = format!("{}/tile.png", origin.uri());

    let proxy = ImageProxy::new(
        Arc::new(CacheStore::create(None).unwrap()),
        Arc::new(HttpFetcher::new(&FetchConfig::default()).unwrap()),
        Arc::new(RustBackend::new()),
    );

    let handles: Vec<_> = (1..=CONCURRENT as u32)
        .map(|i| {
            let proxy = proxy.clone();
            let width = (i * 10).to_string();
            let pairs = vec![
                ("url".to_string(), url.clone()),
                ("width".to_string(), width),
                ("format".to_string(), "png".to_string()),
            ];
            tokio::spawn(async move {
                let request = canonicalize(Vec::new(), Vec::new(), pairs).unwrap();
                (i, proxy.render(&request).await.unwrap())
            })
        })
        .collect();

    for handle in handles {
        let (i, rendered) = handle.await.unwrap();
        let img = image::load_from_memory(&rendered.bytes).unwrap();
        assert_eq!(img.width(), i * 10);
    }
}

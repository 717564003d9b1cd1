#![allow(dead_code)]

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use img_migrate::fetch::{FetchError, FetchStrategy};
use img_migrate::{ImageAsset, MigrateError, ObjectStore, Result};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

pub fn gradient(width: u32, height: u32) -> DynamicImage {
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x * y) % 256) as u8])
    });
    DynamicImage::ImageRgb8(img)
}

pub fn encode(img: &DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, format).unwrap();
    buf.into_inner()
}

pub fn gradient_bmp(width: u32, height: u32) -> Vec<u8> {
    encode(&gradient(width, height), ImageFormat::Bmp)
}

/// Deterministic pseudo-random pixels; barely compressible.
pub fn noise_bmp(width: u32, height: u32) -> Vec<u8> {
    let mut state: u32 = 0x2545_f491;
    let img = RgbImage::from_fn(width, height, |_, _| {
        let mut next = || {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            (state >> 24) as u8
        };
        Rgb([next(), next(), next()])
    });
    encode(&DynamicImage::ImageRgb8(img), ImageFormat::Bmp)
}

pub const MOCK_BASE_URL: &str = "mem://store/";

/// In-memory object store with switchable failures.
#[derive(Default)]
pub struct MockStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    deleted: Mutex<Vec<String>>,
    signed: Mutex<Vec<String>>,
    pub fail_put: AtomicBool,
    pub fail_delete: AtomicBool,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn url_for(key: &str) -> String {
        format!("{}{}", MOCK_BASE_URL, key)
    }

    pub fn insert(&self, key: &str, bytes: Vec<u8>) -> String {
        self.objects.lock().unwrap().insert(key.to_string(), bytes);
        Self::url_for(key)
    }

    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.objects.lock().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    /// Keys a download URL was issued for, in order.
    pub fn signed(&self) -> Vec<String> {
        self.signed.lock().unwrap().clone()
    }
}

#[async_trait]
impl ObjectStore for MockStore {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn key_from_url(&self, url: &str) -> Option<String> {
        url.strip_prefix(MOCK_BASE_URL).map(str::to_string)
    }

    async fn put(&self, key: &str, bytes: Vec<u8>, _content_type: &str) -> Result<String> {
        if self.fail_put.load(Ordering::SeqCst) {
            return Err(MigrateError::Storage("bucket is read-only".to_string()));
        }
        Ok(self.insert(key, bytes))
    }

    async fn read_signed(&self, signed_url: &str) -> Result<Vec<u8>> {
        self.key_from_url(signed_url)
            .and_then(|key| self.object(&key))
            .ok_or_else(|| MigrateError::Storage(format!("no such object: {}", signed_url)))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(MigrateError::Storage("permission denied".to_string()));
        }
        self.objects.lock().unwrap().remove(key);
        self.deleted.lock().unwrap().push(key.to_string());
        Ok(())
    }

    async fn fresh_signed_url(&self, key: &str) -> Result<String> {
        self.signed.lock().unwrap().push(key.to_string());
        Ok(Self::url_for(key))
    }
}

/// Serves fixed bytes per URL and fails every other request.
#[derive(Default)]
pub struct ServedUrls {
    bodies: HashMap<String, Vec<u8>>,
}

impl ServedUrls {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, url: &str, bytes: Vec<u8>) -> Self {
        self.bodies.insert(url.to_string(), bytes);
        self
    }
}

#[async_trait]
impl FetchStrategy for ServedUrls {
    fn name(&self) -> &'static str {
        "served"
    }

    async fn fetch(&self, asset: &ImageAsset) -> std::result::Result<Vec<u8>, FetchError> {
        self.bodies
            .get(&asset.url)
            .cloned()
            .ok_or_else(|| FetchError::Http("404 Not Found".to_string()))
    }
}

/// Strategy that always fails.
pub struct AlwaysFails;

#[async_trait]
impl FetchStrategy for AlwaysFails {
    fn name(&self) -> &'static str {
        "always-fails"
    }

    async fn fetch(&self, _asset: &ImageAsset) -> std::result::Result<Vec<u8>, FetchError> {
        Err(FetchError::Http("connection reset".to_string()))
    }
}

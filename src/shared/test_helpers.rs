use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use tempfile::TempDir;

use crate::core::clock::ManualClock;
use crate::core::config::{StorageConfig, UploadPolicy};
use crate::features::images::services::ImageService;
use crate::features::images::stores::MemoryImageStore;
use crate::modules::imaging::{TranscodeError, TranscodedImage, Transcoder};
use crate::modules::storage::LocalStorage;

pub const MIB: usize = 1024 * 1024;

pub const TEST_BASE_URL: &str = "http://localhost:3000";

/// Fixed starting point for the manual clock
pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
}

/// A valid PNG with a simple gradient
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    });
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut out, ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

/// Stores the input unchanged and counts how often it ran
#[derive(Debug, Default)]
pub struct PassthroughTranscoder {
    pub calls: AtomicUsize,
}

impl Transcoder for PassthroughTranscoder {
    fn transcode(&self, data: &[u8]) -> Result<TranscodedImage, TranscodeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(TranscodedImage {
            bytes: data.to_vec(),
            width: 1,
            height: 1,
        })
    }

    fn extension(&self) -> &'static str {
        "jpg"
    }
}

/// Rejects everything as undecodable
#[derive(Debug, Default)]
pub struct FailingTranscoder;

impl Transcoder for FailingTranscoder {
    fn transcode(&self, _data: &[u8]) -> Result<TranscodedImage, TranscodeError> {
        Err(TranscodeError::UnknownFormat)
    }

    fn extension(&self) -> &'static str {
        "jpg"
    }
}

/// An image service over a fresh memory store, temp upload dir and manual clock
pub struct TestContext {
    pub service: Arc<ImageService>,
    pub store: Arc<MemoryImageStore>,
    pub storage: Arc<LocalStorage>,
    pub clock: Arc<ManualClock>,
    _dir: TempDir,
}

impl TestContext {
    pub async fn new(transcoder: Arc<dyn Transcoder>) -> Self {
        Self::with_policy(transcoder, UploadPolicy::default()).await
    }

    pub async fn with_policy(transcoder: Arc<dyn Transcoder>, policy: UploadPolicy) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig::new(dir.path().join("uploads"));
        let storage = Arc::new(LocalStorage::new(&config, TEST_BASE_URL).await.unwrap());
        let store = Arc::new(MemoryImageStore::new());
        let clock = Arc::new(ManualClock::new(start_time()));

        let service = Arc::new(ImageService::new(
            store.clone(),
            Arc::clone(&storage),
            transcoder,
            clock.clone(),
            policy,
        ));

        Self {
            service,
            store,
            storage,
            clock,
            _dir: dir,
        }
    }

    pub fn upload_dir(&self) -> &Path {
        self.storage.root()
    }

    /// Names of every file in the upload directory, temp files included
    pub async fn stored_files(&self) -> Vec<String> {
        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(self.upload_dir()).await.unwrap();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
        names.sort();
        names
    }
}

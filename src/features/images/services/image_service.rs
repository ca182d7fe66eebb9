use std::sync::Arc;

use chrono::{DateTime, SubsecRound, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::clock::Clock;
use crate::core::config::UploadPolicy;
use crate::core::error::{AppError, Result};
use crate::features::images::admission::{AdmissionError, IncomingUpload};
use crate::features::images::dtos::{GalleryImageDto, UploadResponseDto};
use crate::features::images::models::ImageRecord;
use crate::features::images::stores::ImageStore;
use crate::modules::imaging::{TranscodedImage, Transcoder};
use crate::modules::storage::{LocalStorage, Removal};

/// Totals from one retention sweep
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub records_removed: usize,
    pub files_removed: usize,
    pub files_missing: usize,
    pub files_failed: usize,
    /// Quota entries that fell out of the window
    pub admissions_pruned: u64,
}

/// Service for uploading, listing, deleting and expiring images
pub struct ImageService {
    store: Arc<dyn ImageStore>,
    storage: Arc<LocalStorage>,
    transcoder: Arc<dyn Transcoder>,
    clock: Arc<dyn Clock>,
    policy: UploadPolicy,
    /// Serialises the final quota check with the insert
    admission_lock: Mutex<()>,
}

fn storage_error(e: AppError) -> AdmissionError {
    AdmissionError::Storage(e.to_string())
}

impl ImageService {
    pub fn new(
        store: Arc<dyn ImageStore>,
        storage: Arc<LocalStorage>,
        transcoder: Arc<dyn Transcoder>,
        clock: Arc<dyn Clock>,
        policy: UploadPolicy,
    ) -> Self {
        Self {
            store,
            storage,
            transcoder,
            clock,
            policy,
            admission_lock: Mutex::new(()),
        }
    }

    pub fn policy(&self) -> &UploadPolicy {
        &self.policy
    }

    /// Current time at the precision the database keeps
    fn now(&self) -> DateTime<Utc> {
        self.clock.now().trunc_subsecs(6)
    }

    /// Admit an upload from `identity`
    ///
    /// Checks presence, size and the rolling quota before any decoding work,
    /// transcodes the image, writes the file and then records it. A file that
    /// was written but could not be recorded is removed again.
    pub async fn upload(
        &self,
        upload: Option<IncomingUpload>,
        identity: &str,
    ) -> std::result::Result<UploadResponseDto, AdmissionError> {
        let upload = upload
            .filter(|u| !u.data.is_empty())
            .ok_or(AdmissionError::NoFile)?;

        upload.check_size(self.policy.max_upload_bytes)?;

        self.ensure_quota(identity, self.now()).await?;

        let id = Uuid::new_v4();
        let transcoded = self.transcode(upload.data).await?;
        let stored_filename = format!("{}.{}", id, self.transcoder.extension());

        self.storage
            .put(&stored_filename, &transcoded.bytes)
            .await
            .map_err(storage_error)?;

        let record = ImageRecord::new(
            id,
            stored_filename,
            upload.original_filename,
            identity.to_string(),
            self.now(),
            self.policy.retention(),
        );

        if let Err(e) = self.persist(&record).await {
            self.discard_file(&record.stored_filename).await;
            return Err(e);
        }

        info!(
            "Image uploaded: id={}, file={}, uploader={}, size={}x{}",
            record.id,
            record.stored_filename,
            record.uploader_ip,
            transcoded.width,
            transcoded.height
        );

        Ok(UploadResponseDto {
            success: true,
            id: record.id,
            url: self.storage.public_url(&record.stored_filename),
            expires_at: record.expires_at,
        })
    }

    async fn ensure_quota(
        &self,
        identity: &str,
        now: DateTime<Utc>,
    ) -> std::result::Result<(), AdmissionError> {
        let since = now - self.policy.quota_window();
        let used = self
            .store
            .count_since(identity, since)
            .await
            .map_err(storage_error)?;

        if used >= i64::from(self.policy.daily_quota) {
            debug!(
                "Quota reached for {}: {} uploads since {}",
                identity, used, since
            );
            return Err(AdmissionError::QuotaExceeded {
                limit: self.policy.daily_quota,
            });
        }

        Ok(())
    }

    async fn transcode(
        &self,
        data: Vec<u8>,
    ) -> std::result::Result<TranscodedImage, AdmissionError> {
        let transcoder = Arc::clone(&self.transcoder);

        tokio::task::spawn_blocking(move || transcoder.transcode(&data))
            .await
            .map_err(|e| AdmissionError::ProcessingFailed(format!("transcoder task failed: {}", e)))?
            .map_err(|e| AdmissionError::ProcessingFailed(e.to_string()))
    }

    /// Re-check the quota and insert while holding the admission lock
    async fn persist(&self, record: &ImageRecord) -> std::result::Result<(), AdmissionError> {
        let _guard = self.admission_lock.lock().await;

        self.ensure_quota(&record.uploader_ip, record.uploaded_at)
            .await?;
        self.store.insert(record).await.map_err(storage_error)
    }

    async fn discard_file(&self, stored_filename: &str) {
        if let Err(e) = self.storage.remove(stored_filename).await {
            warn!("Failed to discard unrecorded file {}: {}", stored_filename, e);
        }
    }

    /// Every image that has not expired yet
    pub async fn list_gallery(&self) -> Result<Vec<GalleryImageDto>> {
        let records = self.store.list_active(self.now()).await?;

        Ok(records
            .into_iter()
            .map(|r| GalleryImageDto {
                id: r.id,
                url: self.storage.public_url(&r.stored_filename),
                filename: r.original_filename,
                uploaded_at: r.uploaded_at,
                expires_at: r.expires_at,
            })
            .collect())
    }

    /// Delete an image by id
    ///
    /// Returns `false` when nothing matched, including ids that are not
    /// UUIDs. A backing file that is already gone does not fail the delete.
    pub async fn delete_image(&self, id: &str) -> Result<bool> {
        let Ok(id) = Uuid::parse_str(id) else {
            debug!("Delete requested for malformed id {:?}", id);
            return Ok(false);
        };

        let Some(record) = self.store.delete_by_id(id).await? else {
            debug!("Delete requested for unknown image {}", id);
            return Ok(false);
        };

        match self.storage.remove(&record.stored_filename).await {
            Ok(Removal::Removed) => {}
            Ok(Removal::AlreadyGone) => {
                warn!(
                    "Image {} had no file on disk ({})",
                    record.id, record.stored_filename
                );
            }
            Err(e) => warn!("Failed to remove file for image {}: {}", record.id, e),
        }

        info!("Image deleted: id={}, file={}", record.id, record.stored_filename);

        Ok(true)
    }

    /// Remove every expired record and its file, then drop quota entries
    /// older than the quota window
    ///
    /// File failures are logged and counted; they never stop the sweep.
    pub async fn purge_expired(&self) -> Result<SweepReport> {
        let now = self.now();
        let expired = self.store.delete_expired(now).await?;
        let mut report = SweepReport {
            records_removed: expired.len(),
            ..SweepReport::default()
        };

        for record in &expired {
            match self.storage.remove(&record.stored_filename).await {
                Ok(Removal::Removed) => report.files_removed += 1,
                Ok(Removal::AlreadyGone) => {
                    debug!(
                        "Expired image {} file already gone ({})",
                        record.id, record.stored_filename
                    );
                    report.files_missing += 1;
                }
                Err(e) => {
                    warn!("Failed to remove expired image {}: {}", record.id, e);
                    report.files_failed += 1;
                }
            }
        }

        report.admissions_pruned = self
            .store
            .prune_admissions(now - self.policy.quota_window())
            .await?;

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeDelta;
    use std::sync::atomic::Ordering;

    use crate::shared::test_helpers::{
        FailingTranscoder, PassthroughTranscoder, TestContext, MIB,
    };

    fn upload_of(size: usize) -> Option<IncomingUpload> {
        Some(IncomingUpload::new(vec![7u8; size], "holiday.png"))
    }

    #[tokio::test]
    async fn test_ten_uploads_then_quota_exceeded() {
        let transcoder = Arc::new(PassthroughTranscoder::default());
        let ctx = TestContext::new(transcoder.clone()).await;

        for _ in 0..10 {
            ctx.service.upload(upload_of(MIB), "10.0.0.1").await.unwrap();
            ctx.clock.advance(TimeDelta::minutes(5));
        }

        let err = ctx
            .service
            .upload(upload_of(MIB), "10.0.0.1")
            .await
            .unwrap_err();
        assert!(matches!(err, AdmissionError::QuotaExceeded { limit: 10 }));
        assert_eq!(transcoder.calls.load(Ordering::SeqCst), 10);
        assert_eq!(ctx.store.len().await, 10);
        assert_eq!(ctx.stored_files().await.len(), 10);
    }

    #[tokio::test]
    async fn test_quota_is_per_identity() {
        let ctx = TestContext::new(Arc::new(PassthroughTranscoder::default())).await;

        for _ in 0..10 {
            ctx.service.upload(upload_of(16), "10.0.0.1").await.unwrap();
        }

        assert!(ctx.service.upload(upload_of(16), "10.0.0.2").await.is_ok());
    }

    #[tokio::test]
    async fn test_quota_window_rolls() {
        let ctx = TestContext::new(Arc::new(PassthroughTranscoder::default())).await;

        for _ in 0..10 {
            ctx.service.upload(upload_of(16), "10.0.0.1").await.unwrap();
        }
        ctx.clock.advance(TimeDelta::hours(23));
        assert!(ctx.service.upload(upload_of(16), "10.0.0.1").await.is_err());

        ctx.clock.advance(TimeDelta::hours(1) + TimeDelta::seconds(1));
        assert!(ctx.service.upload(upload_of(16), "10.0.0.1").await.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_uploads_never_exceed_quota() {
        let ctx = TestContext::new(Arc::new(PassthroughTranscoder::default())).await;

        let handles: Vec<_> = (0..25)
            .map(|_| {
                let service = Arc::clone(&ctx.service);
                tokio::spawn(async move { service.upload(upload_of(64), "10.0.0.9").await })
            })
            .collect();

        let mut accepted = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                accepted += 1;
            }
        }

        assert_eq!(accepted, 10);
        assert_eq!(ctx.store.len().await, 10);
        // rejected-at-insert uploads must not leave files behind
        assert_eq!(ctx.stored_files().await.len(), 10);
    }

    #[tokio::test]
    async fn test_oversized_upload_rejected_before_transcoding() {
        let transcoder = Arc::new(PassthroughTranscoder::default());
        let ctx = TestContext::new(transcoder.clone()).await;

        let err = ctx
            .service
            .upload(upload_of(6 * 1_000_000), "10.0.0.1")
            .await
            .unwrap_err();

        assert!(matches!(err, AdmissionError::TooLarge { .. }));
        assert_eq!(transcoder.calls.load(Ordering::SeqCst), 0);
        assert_eq!(ctx.store.len().await, 0);
        assert!(ctx.stored_files().await.is_empty());
    }

    #[tokio::test]
    async fn test_exactly_at_limit_is_accepted() {
        let ctx = TestContext::new(Arc::new(PassthroughTranscoder::default())).await;
        assert!(ctx
            .service
            .upload(upload_of(5 * MIB), "10.0.0.1")
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_missing_or_empty_file() {
        let ctx = TestContext::new(Arc::new(PassthroughTranscoder::default())).await;

        assert!(matches!(
            ctx.service.upload(None, "10.0.0.1").await,
            Err(AdmissionError::NoFile)
        ));
        assert!(matches!(
            ctx.service.upload(upload_of(0), "10.0.0.1").await,
            Err(AdmissionError::NoFile)
        ));
    }

    #[tokio::test]
    async fn test_processing_failure_leaves_nothing_behind() {
        let ctx = TestContext::new(Arc::new(FailingTranscoder)).await;

        let err = ctx
            .service
            .upload(upload_of(128), "10.0.0.1")
            .await
            .unwrap_err();

        assert!(matches!(err, AdmissionError::ProcessingFailed(_)));
        assert_eq!(ctx.store.len().await, 0);
        assert!(ctx.stored_files().await.is_empty());
    }

    #[tokio::test]
    async fn test_record_expiry_is_upload_plus_retention() {
        let ctx = TestContext::new(Arc::new(PassthroughTranscoder::default())).await;

        let uploaded = ctx.service.upload(upload_of(32), "10.0.0.1").await.unwrap();
        let gallery = ctx.service.list_gallery().await.unwrap();

        assert_eq!(gallery.len(), 1);
        assert_eq!(gallery[0].id, uploaded.id);
        assert_eq!(gallery[0].filename, "holiday.png");
        assert_eq!(
            gallery[0].expires_at - gallery[0].uploaded_at,
            TimeDelta::hours(24)
        );
        assert_eq!(
            uploaded.url,
            format!("http://localhost:3000/uploads/{}.jpg", uploaded.id)
        );
    }

    #[tokio::test]
    async fn test_gallery_before_and_after_sweep() {
        let ctx = TestContext::new(Arc::new(PassthroughTranscoder::default())).await;
        let uploaded = ctx.service.upload(upload_of(32), "10.0.0.1").await.unwrap();
        let file = format!("{}.jpg", uploaded.id);

        ctx.clock.advance(TimeDelta::hours(23));
        assert_eq!(ctx.service.purge_expired().await.unwrap().records_removed, 0);
        assert_eq!(ctx.service.list_gallery().await.unwrap().len(), 1);
        assert!(ctx.storage.exists(&file).await);

        ctx.clock.advance(TimeDelta::hours(2));
        let report = ctx.service.purge_expired().await.unwrap();
        assert_eq!(report.records_removed, 1);
        assert_eq!(report.files_removed, 1);
        assert!(ctx.service.list_gallery().await.unwrap().is_empty());
        assert!(!ctx.storage.exists(&file).await);

        // nothing left to do
        assert_eq!(ctx.service.purge_expired().await.unwrap(), SweepReport::default());
    }

    #[tokio::test]
    async fn test_sweep_tolerates_missing_files() {
        let ctx = TestContext::new(Arc::new(PassthroughTranscoder::default())).await;
        let first = ctx.service.upload(upload_of(32), "10.0.0.1").await.unwrap();
        ctx.service.upload(upload_of(32), "10.0.0.1").await.unwrap();

        ctx.storage
            .remove(&format!("{}.jpg", first.id))
            .await
            .unwrap();
        ctx.clock.advance(TimeDelta::hours(25));

        let report = ctx.service.purge_expired().await.unwrap();
        assert_eq!(report.records_removed, 2);
        assert_eq!(report.files_removed, 1);
        assert_eq!(report.files_missing, 1);
        assert_eq!(ctx.store.len().await, 0);
    }

    #[tokio::test]
    async fn test_delete_right_after_upload() {
        let ctx = TestContext::new(Arc::new(PassthroughTranscoder::default())).await;
        let uploaded = ctx.service.upload(upload_of(32), "10.0.0.1").await.unwrap();

        assert!(ctx
            .service
            .delete_image(&uploaded.id.to_string())
            .await
            .unwrap());
        assert!(ctx.service.list_gallery().await.unwrap().is_empty());
        assert!(ctx.stored_files().await.is_empty());

        // second delete and sweep both see nothing
        assert!(!ctx
            .service
            .delete_image(&uploaded.id.to_string())
            .await
            .unwrap());
        ctx.clock.advance(TimeDelta::hours(25));
        assert_eq!(ctx.service.purge_expired().await.unwrap().records_removed, 0);
    }

    #[tokio::test]
    async fn test_delete_unknown_id_leaves_store_alone() {
        let ctx = TestContext::new(Arc::new(PassthroughTranscoder::default())).await;
        ctx.service.upload(upload_of(32), "10.0.0.1").await.unwrap();

        assert!(!ctx
            .service
            .delete_image(&Uuid::new_v4().to_string())
            .await
            .unwrap());
        assert!(!ctx.service.delete_image("12345").await.unwrap());
        assert_eq!(ctx.store.len().await, 1);
        assert_eq!(ctx.stored_files().await.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_succeeds_when_file_already_gone() {
        let ctx = TestContext::new(Arc::new(PassthroughTranscoder::default())).await;
        let uploaded = ctx.service.upload(upload_of(32), "10.0.0.1").await.unwrap();
        ctx.storage
            .remove(&format!("{}.jpg", uploaded.id))
            .await
            .unwrap();

        assert!(ctx
            .service
            .delete_image(&uploaded.id.to_string())
            .await
            .unwrap());
        assert_eq!(ctx.store.len().await, 0);
    }

    #[tokio::test]
    async fn test_deleting_does_not_refund_quota() {
        let ctx = TestContext::new(Arc::new(PassthroughTranscoder::default())).await;

        for _ in 0..10 {
            let uploaded = ctx.service.upload(upload_of(16), "10.0.0.1").await.unwrap();
            assert!(ctx
                .service
                .delete_image(&uploaded.id.to_string())
                .await
                .unwrap());
        }
        assert!(ctx.service.list_gallery().await.unwrap().is_empty());

        let err = ctx
            .service
            .upload(upload_of(16), "10.0.0.1")
            .await
            .unwrap_err();
        assert!(matches!(err, AdmissionError::QuotaExceeded { limit: 10 }));
        assert!(ctx.stored_files().await.is_empty());
    }

    #[tokio::test]
    async fn test_short_retention_does_not_refund_quota() {
        let ctx = TestContext::with_policy(
            Arc::new(PassthroughTranscoder::default()),
            UploadPolicy {
                retention_hours: 1,
                ..UploadPolicy::default()
            },
        )
        .await;

        for _ in 0..10 {
            ctx.service.upload(upload_of(16), "10.0.0.1").await.unwrap();
        }

        ctx.clock.advance(TimeDelta::hours(2));
        let report = ctx.service.purge_expired().await.unwrap();
        assert_eq!(report.records_removed, 10);
        assert_eq!(report.admissions_pruned, 0);
        assert!(matches!(
            ctx.service.upload(upload_of(16), "10.0.0.1").await,
            Err(AdmissionError::QuotaExceeded { .. })
        ));

        // once the window has passed the sweep forgets them
        ctx.clock.advance(TimeDelta::hours(23));
        let report = ctx.service.purge_expired().await.unwrap();
        assert_eq!(report.admissions_pruned, 10);
        assert!(ctx.service.upload(upload_of(16), "10.0.0.1").await.is_ok());
    }

    struct RejectingStore;

    #[async_trait]
    impl ImageStore for RejectingStore {
        async fn insert(&self, _record: &ImageRecord) -> Result<()> {
            Err(AppError::Storage("database unavailable".to_string()))
        }

        async fn count_since(&self, _uploader_ip: &str, _since: DateTime<Utc>) -> Result<i64> {
            Ok(0)
        }

        async fn prune_admissions(&self, _before: DateTime<Utc>) -> Result<u64> {
            Ok(0)
        }

        async fn list_active(&self, _now: DateTime<Utc>) -> Result<Vec<ImageRecord>> {
            Ok(Vec::new())
        }

        async fn delete_by_id(&self, _id: Uuid) -> Result<Option<ImageRecord>> {
            Ok(None)
        }

        async fn delete_expired(&self, _now: DateTime<Utc>) -> Result<Vec<ImageRecord>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_failed_insert_removes_written_file() {
        let ctx = TestContext::new(Arc::new(PassthroughTranscoder::default())).await;
        let service = ImageService::new(
            Arc::new(RejectingStore),
            Arc::clone(&ctx.storage),
            Arc::new(PassthroughTranscoder::default()),
            ctx.clock.clone(),
            UploadPolicy::default(),
        );

        let err = service.upload(upload_of(32), "10.0.0.1").await.unwrap_err();

        assert!(matches!(err, AdmissionError::Storage(_)));
        assert!(ctx.stored_files().await.is_empty());
    }
}

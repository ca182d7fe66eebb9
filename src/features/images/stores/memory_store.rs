use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::ImageStore;
use crate::core::error::{AppError, Result};
use crate::features::images::models::ImageRecord;

#[derive(Debug)]
struct Admission {
    uploader_ip: String,
    uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Inner {
    records: Vec<ImageRecord>,
    admissions: Vec<Admission>,
}

/// Insertion-ordered records and admissions behind a single lock
#[derive(Debug, Default)]
pub struct MemoryImageStore {
    inner: Mutex<Inner>,
}

impl MemoryImageStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.inner.lock().await.records.len()
    }
}

#[async_trait]
impl ImageStore for MemoryImageStore {
    async fn insert(&self, record: &ImageRecord) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.records.iter().any(|r| r.id == record.id) {
            return Err(AppError::Conflict(format!(
                "Image {} already exists",
                record.id
            )));
        }
        inner.records.push(record.clone());
        inner.admissions.push(Admission {
            uploader_ip: record.uploader_ip.clone(),
            uploaded_at: record.uploaded_at,
        });
        Ok(())
    }

    async fn count_since(&self, uploader_ip: &str, since: DateTime<Utc>) -> Result<i64> {
        let inner = self.inner.lock().await;
        let count = inner
            .admissions
            .iter()
            .filter(|a| a.uploader_ip == uploader_ip && a.uploaded_at >= since)
            .count();
        Ok(count as i64)
    }

    async fn prune_admissions(&self, before: DateTime<Utc>) -> Result<u64> {
        let mut inner = self.inner.lock().await;
        let len = inner.admissions.len();
        inner.admissions.retain(|a| a.uploaded_at >= before);
        Ok((len - inner.admissions.len()) as u64)
    }

    async fn list_active(&self, now: DateTime<Utc>) -> Result<Vec<ImageRecord>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .records
            .iter()
            .filter(|r| !r.is_expired(now))
            .cloned()
            .collect())
    }

    async fn delete_by_id(&self, id: Uuid) -> Result<Option<ImageRecord>> {
        let mut inner = self.inner.lock().await;
        let Some(index) = inner.records.iter().position(|r| r.id == id) else {
            return Ok(None);
        };
        Ok(Some(inner.records.remove(index)))
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<Vec<ImageRecord>> {
        let mut inner = self.inner.lock().await;
        let (expired, live): (Vec<_>, Vec<_>) =
            inner.records.drain(..).partition(|r| r.is_expired(now));
        inner.records = live;
        Ok(expired)
    }
}

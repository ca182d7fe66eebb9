//! Image metadata persistence
//!
//! One trait, two backends: in-memory sequences for single-process
//! deployments and tests, and PostgreSQL. Besides the image records each
//! backend keeps a log of admissions, which the upload quota is counted from.

mod memory_store;
mod postgres_store;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::core::error::Result;
use crate::features::images::models::ImageRecord;

pub use memory_store::MemoryImageStore;
pub use postgres_store::PgImageStore;

#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Add a record and log the admission it represents.
    /// Fails with `Conflict` if the id is already present.
    async fn insert(&self, record: &ImageRecord) -> Result<()>;

    /// Admissions from `uploader_ip` at or after `since`.
    /// Deleting or expiring the image does not remove its admission.
    async fn count_since(&self, uploader_ip: &str, since: DateTime<Utc>) -> Result<i64>;

    /// Forget admissions made before `before`, returning how many were dropped
    async fn prune_admissions(&self, before: DateTime<Utc>) -> Result<u64>;

    /// Records whose expiry is still in the future
    async fn list_active(&self, now: DateTime<Utc>) -> Result<Vec<ImageRecord>>;

    /// Remove one record, returning it if it existed
    async fn delete_by_id(&self, id: Uuid) -> Result<Option<ImageRecord>>;

    /// Remove and return every record with `expires_at <= now`
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<Vec<ImageRecord>>;
}

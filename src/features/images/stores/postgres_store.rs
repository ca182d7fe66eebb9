use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::{debug, info};
use uuid::Uuid;

use super::ImageStore;
use crate::core::config::DatabaseConfig;
use crate::core::error::{AppError, Result};
use crate::features::images::models::ImageRecord;

/// `images` and `uploads` tables in PostgreSQL
pub struct PgImageStore {
    pool: PgPool,
}

impl PgImageStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool for `config` and bring the schema up to date
    pub async fn connect(config: &DatabaseConfig) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .max_lifetime(Duration::from_secs(config.max_lifetime_secs))
            .connect(&config.url)
            .await?;
        info!(
            "Database pool ready (max_connections={})",
            config.max_connections
        );

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| anyhow::anyhow!("Migration failed: {}", e))?;
        info!("Database migrations applied");

        Ok(Self::new(pool))
    }
}

#[async_trait]
impl ImageStore for PgImageStore {
    async fn insert(&self, record: &ImageRecord) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO images (id, stored_filename, original_filename, uploader_ip, uploaded_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(record.id)
        .bind(&record.stored_filename)
        .bind(&record.original_filename)
        .bind(&record.uploader_ip)
        .bind(record.uploaded_at)
        .bind(record.expires_at)
        .execute(&mut *tx)
        .await;

        match result {
            Ok(_) => {}
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                return Err(AppError::Conflict(format!(
                    "Image {} already exists",
                    record.id
                )));
            }
            Err(e) => return Err(AppError::Database(e)),
        }

        sqlx::query(
            r#"
            INSERT INTO uploads (image_id, uploader_ip, uploaded_at)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(record.id)
        .bind(&record.uploader_ip)
        .bind(record.uploaded_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(())
    }

    async fn count_since(&self, uploader_ip: &str, since: DateTime<Utc>) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM uploads
            WHERE uploader_ip = $1
              AND uploaded_at >= $2
            "#,
        )
        .bind(uploader_ip)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn prune_admissions(&self, before: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM uploads
            WHERE uploaded_at < $1
            "#,
        )
        .bind(before)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn list_active(&self, now: DateTime<Utc>) -> Result<Vec<ImageRecord>> {
        let records = sqlx::query_as::<_, ImageRecord>(
            r#"
            SELECT id, stored_filename, original_filename, uploader_ip, uploaded_at, expires_at
            FROM images
            WHERE expires_at > $1
            ORDER BY uploaded_at ASC, id ASC
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn delete_by_id(&self, id: Uuid) -> Result<Option<ImageRecord>> {
        let record = sqlx::query_as::<_, ImageRecord>(
            r#"
            DELETE FROM images
            WHERE id = $1
            RETURNING id, stored_filename, original_filename, uploader_ip, uploaded_at, expires_at
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<Vec<ImageRecord>> {
        let records = sqlx::query_as::<_, ImageRecord>(
            r#"
            DELETE FROM images
            WHERE expires_at <= $1
            RETURNING id, stored_filename, original_filename, uploader_ip, uploaded_at, expires_at
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        debug!("Deleted {} expired image rows", records.len());

        Ok(records)
    }
}

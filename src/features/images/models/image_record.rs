use chrono::{DateTime, TimeDelta, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// Metadata for one stored image
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct ImageRecord {
    pub id: Uuid,
    /// Name of the transcoded file inside the upload directory
    pub stored_filename: String,
    /// Filename as sent by the client
    pub original_filename: String,
    /// Uploader identity (client IP)
    pub uploader_ip: String,
    pub uploaded_at: DateTime<Utc>,
    /// Always `uploaded_at + retention`
    pub expires_at: DateTime<Utc>,
}

impl ImageRecord {
    pub fn new(
        id: Uuid,
        stored_filename: String,
        original_filename: String,
        uploader_ip: String,
        uploaded_at: DateTime<Utc>,
        retention: TimeDelta,
    ) -> Self {
        Self {
            id,
            stored_filename,
            original_filename,
            uploader_ip,
            uploaded_at,
            expires_at: uploaded_at + retention,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Upload form for OpenAPI documentation
/// Note: The handler reads the multipart stream directly.
#[derive(Debug, ToSchema)]
#[allow(dead_code)]
pub struct UploadImageForm {
    /// The image to upload (PNG, JPEG, GIF or WebP)
    #[schema(format = Binary, content_media_type = "application/octet-stream")]
    pub image: String,
}

/// Response for an accepted upload
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UploadResponseDto {
    /// Always `true`
    pub success: bool,
    pub id: Uuid,
    /// Public URL of the stored image
    pub url: String,
    /// When the image will be removed
    pub expires_at: DateTime<Utc>,
}

/// One entry of the public gallery
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GalleryImageDto {
    pub id: Uuid,
    pub url: String,
    /// Original filename as uploaded
    pub filename: String,
    pub uploaded_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct GalleryResponseDto {
    pub images: Vec<GalleryImageDto>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DeleteImageResponseDto {
    /// Whether an image was removed
    pub success: bool,
}

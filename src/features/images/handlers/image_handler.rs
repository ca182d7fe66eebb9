use axum::{
    extract::{multipart::MultipartError, Multipart, Path, State},
    http::{header::CONTENT_LENGTH, StatusCode},
    Json,
};
use std::sync::Arc;
use tracing::debug;

use crate::core::error::AppError;
use crate::core::extractor::ClientIdentity;
use crate::features::images::admission::{AdmissionError, IncomingUpload};
use crate::features::images::dtos::{
    DeleteImageResponseDto, GalleryResponseDto, UploadImageForm, UploadResponseDto,
};
use crate::features::images::services::ImageService;
use crate::shared::constants::UPLOAD_FIELD_NAME;
use crate::shared::types::FailureResponse;

fn multipart_error(e: MultipartError, limit: usize) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return AdmissionError::TooLarge { limit }.into();
    }
    debug!("Failed to read multipart data: {}", e);
    AppError::BadRequest(format!("Failed to read multipart data: {}", e.body_text()))
}

/// Read the `image` field, stopping one byte past `limit`
async fn read_image_field(
    multipart: &mut Multipart,
    limit: usize,
) -> Result<Option<IncomingUpload>, AppError> {
    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, limit))?
    {
        let field_name = field.name().unwrap_or("").to_string();
        if field_name != UPLOAD_FIELD_NAME {
            debug!("Ignoring unknown field: {}", field_name);
            continue;
        }

        let file_name = field.file_name().unwrap_or("unnamed").to_string();
        let declared_size = field
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<usize>().ok());

        let mut data = Vec::new();
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|e| multipart_error(e, limit))?
        {
            data.extend_from_slice(&chunk);
            if data.len() > limit {
                debug!("Upload exceeded {} bytes, stopped reading", limit);
                break;
            }
        }

        let mut upload = IncomingUpload::new(data, &file_name);
        upload.declared_size = declared_size;
        return Ok(Some(upload));
    }

    Ok(None)
}

/// Upload an image
///
/// Accepts multipart/form-data with an `image` field. The image is resized
/// to fit the configured bound, re-encoded as JPEG and kept for the
/// retention period.
#[utoipa::path(
    post,
    path = "/upload",
    tag = "images",
    request_body(
        content = UploadImageForm,
        content_type = "multipart/form-data",
        description = "Form with a single `image` file field",
    ),
    responses(
        (status = 200, description = "Image stored", body = UploadResponseDto),
        (status = 400, description = "No image provided or malformed form", body = FailureResponse),
        (status = 413, description = "Image too large", body = FailureResponse),
        (status = 422, description = "Image could not be decoded", body = FailureResponse),
        (status = 429, description = "Daily upload limit reached", body = FailureResponse)
    )
)]
pub async fn upload_image(
    identity: ClientIdentity,
    State(service): State<Arc<ImageService>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponseDto>, AppError> {
    let limit = service.policy().max_upload_bytes;
    let upload = read_image_field(&mut multipart, limit).await?;

    let response = service.upload(upload, identity.as_str()).await?;

    Ok(Json(response))
}

/// List every image that has not expired
#[utoipa::path(
    get,
    path = "/gallery",
    tag = "images",
    responses(
        (status = 200, description = "Current gallery", body = GalleryResponseDto)
    )
)]
pub async fn list_gallery(
    State(service): State<Arc<ImageService>>,
) -> Result<Json<GalleryResponseDto>, AppError> {
    let images = service.list_gallery().await?;

    Ok(Json(GalleryResponseDto { images }))
}

/// Delete an image by id
///
/// Unknown ids are not an error; the response just reports `success: false`.
#[utoipa::path(
    delete,
    path = "/delete/{id}",
    tag = "images",
    params(
        ("id" = String, Path, description = "Image id")
    ),
    responses(
        (status = 200, description = "Whether an image was removed", body = DeleteImageResponseDto)
    )
)]
pub async fn delete_image(
    State(service): State<Arc<ImageService>>,
    Path(id): Path<String>,
) -> Result<Json<DeleteImageResponseDto>, AppError> {
    let success = service.delete_image(&id).await?;

    Ok(Json(DeleteImageResponseDto { success }))
}

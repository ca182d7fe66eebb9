use std::path::Path;
use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Extension, Router,
};
use tower_http::services::ServeDir;

use crate::core::extractor::ForwardedForPolicy;
use crate::features::images::handlers::{delete_image, list_gallery, upload_image};
use crate::features::images::services::ImageService;
use crate::shared::constants::{MULTIPART_OVERHEAD_BYTES, UPLOADS_URL_PATH};

/// Create routes for the images feature
pub fn routes(image_service: Arc<ImageService>, forwarded_for: ForwardedForPolicy) -> Router {
    // Allow the ceiling plus framing; the handler enforces the exact limit
    let body_limit = image_service.policy().max_upload_bytes + MULTIPART_OVERHEAD_BYTES;

    Router::new()
        .route(
            "/upload",
            post(upload_image).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/gallery", get(list_gallery))
        .route("/delete/{id}", delete(delete_image))
        .layer(Extension(forwarded_for))
        .with_state(image_service)
}

/// Serve stored images under `/uploads` and the gallery UI from `static_dir`
pub fn static_routes(upload_dir: &Path, static_dir: &Path) -> Router {
    Router::new()
        .nest_service(UPLOADS_URL_PATH, ServeDir::new(upload_dir))
        .fallback_service(ServeDir::new(static_dir).append_index_html_on_directories(true))
}

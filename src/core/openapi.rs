use utoipa::{Modify, OpenApi};

use crate::features::images::{dtos as images_dtos, handlers as images_handlers};
use crate::shared::types::FailureResponse;

#[derive(OpenApi)]
#[openapi(
    paths(
        images_handlers::upload_image,
        images_handlers::list_gallery,
        images_handlers::delete_image,
    ),
    components(
        schemas(
            images_dtos::UploadImageForm,
            images_dtos::UploadResponseDto,
            images_dtos::GalleryImageDto,
            images_dtos::GalleryResponseDto,
            images_dtos::DeleteImageResponseDto,
            FailureResponse,
        )
    ),
    tags(
        (name = "images", description = "Image upload, gallery and deletion"),
    ),
    info(
        title = "Image Drop API",
        version = "0.1.0",
        description = "Upload, browse and delete short-lived images",
    )
)]
pub struct ApiDoc;

/// Modifier to override OpenAPI info from config
pub struct SwaggerInfoModifier {
    pub title: String,
    pub version: String,
    pub description: String,
}

impl Modify for SwaggerInfoModifier {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        openapi.info.title = self.title.clone();
        openapi.info.version = self.version.clone();
        openapi.info.description = Some(self.description.clone());
    }
}

mod image_dto;

pub use image_dto::{
    DeleteImageResponseDto, GalleryImageDto, GalleryResponseDto, UploadImageForm,
    UploadResponseDto,
};

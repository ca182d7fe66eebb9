mod image_record;

pub use image_record::ImageRecord;

/// Maximum accepted upload size in bytes (5 MiB)
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

/// Uploads allowed per identity within the rolling quota window
pub const DEFAULT_DAILY_UPLOAD_QUOTA: u32 = 10;

/// How long an accepted image is kept before the sweeper removes it
pub const DEFAULT_RETENTION_HOURS: i64 = 24;

/// Longest edge of a stored image, in pixels
pub const DEFAULT_MAX_IMAGE_DIMENSION: u32 = 2000;

pub const DEFAULT_JPEG_QUALITY: u8 = 80;

/// Sweep once an hour
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 3600;

/// Multipart field carrying the image
pub const UPLOAD_FIELD_NAME: &str = "image";

/// URL path the upload directory is served under
pub const UPLOADS_URL_PATH: &str = "/uploads";

/// Headroom on top of the upload ceiling for multipart framing
pub const MULTIPART_OVERHEAD_BYTES: usize = 1024 * 1024;

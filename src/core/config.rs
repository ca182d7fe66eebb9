use std::env;
use std::path::PathBuf;
use std::time::Duration;

use chrono::TimeDelta;
use validator::Validate;

use crate::shared::constants::{
    DEFAULT_DAILY_UPLOAD_QUOTA, DEFAULT_JPEG_QUALITY, DEFAULT_MAX_IMAGE_DIMENSION,
    DEFAULT_MAX_UPLOAD_BYTES, DEFAULT_RETENTION_HOURS, DEFAULT_SWEEP_INTERVAL_SECS,
};

#[derive(Debug, Clone)]
pub struct Config {
    pub app: AppConfig,
    pub store: StoreConfig,
    pub storage: StorageConfig,
    pub upload: UploadPolicy,
    pub sweeper: SweeperConfig,
    pub swagger: SwaggerConfig,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub cors_allowed_origins: Vec<String>,
    /// Base used to build public image links, e.g. `https://img.example.com`
    pub public_base_url: String,
    /// Directory holding the gallery UI
    pub static_dir: PathBuf,
    /// Take the uploader identity from `X-Forwarded-For` instead of the peer address
    pub trust_forwarded_for: bool,
}

/// Which backend holds image metadata
#[derive(Debug, Clone)]
pub enum StoreConfig {
    Memory,
    Postgres(DatabaseConfig),
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub max_lifetime_secs: u64,
}

/// Local directory for transcoded images
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub upload_dir: PathBuf,
    /// Where files are written before being renamed into `upload_dir`.
    /// Never served; must be on the same filesystem as `upload_dir`.
    pub staging_dir: PathBuf,
}

/// Admission and retention limits applied to every upload
#[derive(Debug, Clone, Validate)]
pub struct UploadPolicy {
    #[validate(range(min = 1, message = "MAX_UPLOAD_BYTES must be at least 1"))]
    pub max_upload_bytes: usize,
    #[validate(range(min = 1, message = "DAILY_UPLOAD_QUOTA must be at least 1"))]
    pub daily_quota: u32,
    #[validate(range(
        min = 1,
        max = 87600,
        message = "RETENTION_HOURS must be 1..=87600 (ten years)"
    ))]
    pub retention_hours: i64,
    #[validate(range(min = 1, max = 20000, message = "MAX_IMAGE_DIMENSION must be 1..=20000"))]
    pub max_dimension: u32,
    #[validate(range(min = 1, max = 100, message = "JPEG_QUALITY must be 1..=100"))]
    pub jpeg_quality: u8,
}

#[derive(Debug, Clone)]
pub struct SweeperConfig {
    pub interval: Duration,
}

#[derive(Debug, Clone)]
pub struct SwaggerConfig {
    pub title: String,
    pub version: String,
    pub description: String,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        // Load .env file if exists, ignore if not found (optional for production)
        if let Err(e) = dotenvy::dotenv() {
            if !e.to_string().contains("not found") {
                eprintln!("Warning: Error loading .env file: {}", e);
            }
        }

        Ok(Config {
            app: AppConfig::from_env()?,
            store: StoreConfig::from_env()?,
            storage: StorageConfig::from_env(),
            upload: UploadPolicy::from_env()?,
            sweeper: SweeperConfig::from_env()?,
            swagger: SwaggerConfig::from_env(),
        })
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T, String> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| format!("{} must be a valid number", key)),
        Err(_) => Ok(default),
    }
}

fn parse_bool(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

impl AppConfig {
    pub fn from_env() -> Result<Self, String> {
        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|e| format!("Invalid PORT: {}", e))?;

        // Parse CORS allowed origins from comma-separated string
        let cors_allowed_origins = env::var("CORS_ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "*".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let public_base_url = env::var("PUBLIC_BASE_URL")
            .unwrap_or_else(|_| format!("http://localhost:{}", port))
            .trim_end_matches('/')
            .to_string();

        let static_dir = env::var("STATIC_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("public"));

        let trust_forwarded_for = env::var("TRUST_FORWARDED_FOR")
            .map(|v| parse_bool(&v))
            .unwrap_or(false);

        Ok(Self {
            host,
            port,
            cors_allowed_origins,
            public_base_url,
            static_dir,
            trust_forwarded_for,
        })
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl StoreConfig {
    pub fn from_env() -> Result<Self, String> {
        let backend = env::var("STORE_BACKEND").unwrap_or_else(|_| "memory".to_string());

        match backend.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(StoreConfig::Memory),
            "postgres" | "postgresql" => Ok(StoreConfig::Postgres(DatabaseConfig::from_env()?)),
            other => Err(format!(
                "STORE_BACKEND must be 'memory' or 'postgres', got '{}'",
                other
            )),
        }
    }
}

impl DatabaseConfig {
    // Default values for database connection pool (conservative defaults for small-medium apps)
    const DEFAULT_MAX_CONNECTIONS: u32 = 10;
    const DEFAULT_MIN_CONNECTIONS: u32 = 1;
    const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 5;
    const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600; // 10 minutes
    const DEFAULT_MAX_LIFETIME_SECS: u64 = 1800; // 30 minutes

    pub fn from_env() -> Result<Self, String> {
        let url = env::var("DATABASE_URL")
            .map_err(|_| "DATABASE_URL must be set when STORE_BACKEND=postgres".to_string())?;

        Ok(Self {
            url,
            max_connections: parse_env("DB_MAX_CONNECTIONS", Self::DEFAULT_MAX_CONNECTIONS)?,
            min_connections: parse_env("DB_MIN_CONNECTIONS", Self::DEFAULT_MIN_CONNECTIONS)?,
            acquire_timeout_secs: parse_env(
                "DB_ACQUIRE_TIMEOUT_SECS",
                Self::DEFAULT_ACQUIRE_TIMEOUT_SECS,
            )?,
            idle_timeout_secs: parse_env("DB_IDLE_TIMEOUT_SECS", Self::DEFAULT_IDLE_TIMEOUT_SECS)?,
            max_lifetime_secs: parse_env("DB_MAX_LIFETIME_SECS", Self::DEFAULT_MAX_LIFETIME_SECS)?,
        })
    }
}

impl StorageConfig {
    /// Stage next to `upload_dir`, e.g. `uploads` stages in `uploads.staging`
    pub fn new(upload_dir: PathBuf) -> Self {
        // collecting components drops any trailing separator
        let upload_dir: PathBuf = upload_dir.components().collect();
        let mut staging = upload_dir.clone().into_os_string();
        staging.push(".staging");

        Self {
            upload_dir,
            staging_dir: PathBuf::from(staging),
        }
    }

    pub fn from_env() -> Self {
        let upload_dir = env::var("UPLOAD_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("uploads"));

        Self::new(upload_dir)
    }
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            daily_quota: DEFAULT_DAILY_UPLOAD_QUOTA,
            retention_hours: DEFAULT_RETENTION_HOURS,
            max_dimension: DEFAULT_MAX_IMAGE_DIMENSION,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

impl UploadPolicy {
    pub fn from_env() -> Result<Self, String> {
        let policy = Self {
            max_upload_bytes: parse_env("MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,
            daily_quota: parse_env("DAILY_UPLOAD_QUOTA", DEFAULT_DAILY_UPLOAD_QUOTA)?,
            retention_hours: parse_env("RETENTION_HOURS", DEFAULT_RETENTION_HOURS)?,
            max_dimension: parse_env("MAX_IMAGE_DIMENSION", DEFAULT_MAX_IMAGE_DIMENSION)?,
            jpeg_quality: parse_env("JPEG_QUALITY", DEFAULT_JPEG_QUALITY)?,
        };

        policy.validate().map_err(|e| e.to_string())?;

        Ok(policy)
    }

    pub fn retention(&self) -> TimeDelta {
        TimeDelta::hours(self.retention_hours)
    }

    /// The rolling window the daily quota is counted over
    pub fn quota_window(&self) -> TimeDelta {
        TimeDelta::hours(24)
    }
}

impl SweeperConfig {
    pub fn from_env() -> Result<Self, String> {
        let secs = parse_env("SWEEP_INTERVAL_SECS", DEFAULT_SWEEP_INTERVAL_SECS)?;
        if secs == 0 {
            return Err("SWEEP_INTERVAL_SECS must be greater than 0".to_string());
        }

        Ok(Self {
            interval: Duration::from_secs(secs),
        })
    }
}

impl SwaggerConfig {
    pub fn from_env() -> Self {
        let title = env::var("SWAGGER_TITLE").unwrap_or_else(|_| "Image Drop API".to_string());
        let version = env::var("SWAGGER_VERSION").unwrap_or_else(|_| "0.1.0".to_string());
        let description = env::var("SWAGGER_DESCRIPTION")
            .unwrap_or_else(|_| "Upload, browse and delete short-lived images".to_string());

        Self {
            title,
            version,
            description,
        }
    }
}

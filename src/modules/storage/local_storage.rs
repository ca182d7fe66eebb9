//! Local-directory file storage
//!
//! Stores transcoded images under a single directory and builds the public
//! URLs they are served from. Writes go to a temp file in a sibling staging
//! directory and are renamed into place, so nothing under the served
//! directory is ever partially written.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, info};
use uuid::Uuid;

use crate::core::config::StorageConfig;
use crate::core::error::AppError;
use crate::shared::constants::UPLOADS_URL_PATH;

/// Outcome of removing a stored file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    Removed,
    AlreadyGone,
}

pub struct LocalStorage {
    root: PathBuf,
    staging: PathBuf,
    public_base_url: String,
}

impl LocalStorage {
    /// Create the storage, making the upload and staging directories if needed
    pub async fn new(config: &StorageConfig, public_base_url: &str) -> Result<Self, AppError> {
        for dir in [&config.upload_dir, &config.staging_dir] {
            fs::create_dir_all(dir).await.map_err(|e| {
                AppError::Storage(format!(
                    "Failed to create directory '{}': {}",
                    dir.display(),
                    e
                ))
            })?;
        }

        info!(
            "Local storage initialized at {} (staging in {})",
            config.upload_dir.display(),
            config.staging_dir.display()
        );

        Ok(Self {
            root: config.upload_dir.clone(),
            staging: config.staging_dir.clone(),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Stored names are generated by us; anything with a path separator is refused
    fn path_for(&self, name: &str) -> Result<PathBuf, AppError> {
        if name.is_empty()
            || name.starts_with('.')
            || name.contains('/')
            || name.contains('\\')
        {
            return Err(AppError::BadRequest(format!(
                "Invalid stored filename: {}",
                name
            )));
        }
        Ok(self.root.join(name))
    }

    /// Write `data` under `name`, replacing nothing that is half-written
    pub async fn put(&self, name: &str, data: &[u8]) -> Result<(), AppError> {
        let target = self.path_for(name)?;
        let temp = self.staging.join(format!("{}.tmp", Uuid::new_v4()));

        if let Err(e) = fs::write(&temp, data).await {
            let _ = fs::remove_file(&temp).await;
            return Err(AppError::Storage(format!(
                "Failed to write {}: {}",
                temp.display(),
                e
            )));
        }

        if let Err(e) = fs::rename(&temp, &target).await {
            let _ = fs::remove_file(&temp).await;
            return Err(AppError::Storage(format!(
                "Failed to move {} into place: {}",
                target.display(),
                e
            )));
        }

        debug!("Stored file {} ({} bytes)", target.display(), data.len());
        Ok(())
    }

    /// Remove `name`. A file that is already gone is not an error.
    pub async fn remove(&self, name: &str) -> Result<Removal, AppError> {
        let path = self.path_for(name)?;

        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!("Removed file {}", path.display());
                Ok(Removal::Removed)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("File {} already removed", path.display());
                Ok(Removal::AlreadyGone)
            }
            Err(e) => Err(AppError::Storage(format!(
                "Failed to remove {}: {}",
                path.display(),
                e
            ))),
        }
    }

    #[cfg(test)]
    pub async fn exists(&self, name: &str) -> bool {
        match self.path_for(name) {
            Ok(path) => fs::try_exists(path).await.unwrap_or(false),
            Err(_) => false,
        }
    }

    /// Public URL a stored file is served at
    pub fn public_url(&self, name: &str) -> String {
        format!("{}{}/{}", self.public_base_url, UPLOADS_URL_PATH, name)
    }
}

use thiserror::Error;

/// Why an upload was not accepted
#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error("No image file provided")]
    NoFile,

    #[error("File too large. Maximum size is {limit} bytes")]
    TooLarge { limit: usize },

    #[error("Upload limit reached. At most {limit} images per 24 hours")]
    QuotaExceeded { limit: u32 },

    #[error("Could not process image: {0}")]
    ProcessingFailed(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

/// An image payload as received from the client
#[derive(Debug, Clone)]
pub struct IncomingUpload {
    /// Received bytes. May be cut off one byte past the size ceiling.
    pub data: Vec<u8>,
    pub original_filename: String,
    /// Size announced by the part's `Content-Length`, if any
    pub declared_size: Option<usize>,
}

impl IncomingUpload {
    pub fn new(data: Vec<u8>, original_filename: &str) -> Self {
        Self {
            data,
            original_filename: sanitize_filename(original_filename),
            declared_size: None,
        }
    }

    /// Reject if either the received or the declared size is over `limit`
    pub fn check_size(&self, limit: usize) -> Result<(), AdmissionError> {
        let declared_over = self.declared_size.is_some_and(|size| size > limit);
        if self.data.len() > limit || declared_over {
            return Err(AdmissionError::TooLarge { limit });
        }
        Ok(())
    }
}

const MAX_FILENAME_CHARS: usize = 255;

/// Keep only the last path component of a client-supplied filename
pub fn sanitize_filename(name: &str) -> String {
    let base = name
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or("")
        .trim();

    if base.is_empty() {
        return "unnamed".to_string();
    }

    base.chars()
        .filter(|c| !c.is_control())
        .take(MAX_FILENAME_CHARS)
        .collect()
}

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Body returned for every failed request
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct FailureResponse {
    /// Always `false`
    pub success: bool,
    /// Human-readable reason
    pub error: String,
}

impl FailureResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
        }
    }
}

//! Modules layer - Infrastructure components for external integrations
//!
//! Contains adapters for file storage and image transcoding.

pub mod imaging;
pub mod storage;

//! Storage module for image files
//!
//! Provides the local-directory store that holds transcoded images and
//! builds their public URLs.

mod local_storage;

pub use local_storage::{LocalStorage, Removal};

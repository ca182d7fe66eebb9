pub mod admission;
pub mod dtos;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod stores;
pub mod workers;

pub use routes::{routes, static_routes};
pub use services::ImageService;
pub use workers::RetentionSweeper;

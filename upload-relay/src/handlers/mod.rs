pub mod health;
pub mod upload;

pub use health::{api_test, health_check, metrics_endpoint, not_found};
pub use upload::upload_file;

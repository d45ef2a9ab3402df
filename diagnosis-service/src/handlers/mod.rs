pub mod chat;
pub mod diagnose;
pub mod health;
pub mod media;
pub mod models;

pub use chat::chat;
pub use diagnose::diagnose;
pub use health::{health_check, metrics_handler, readiness_check};
pub use media::{analyze_image, transcribe};
pub use models::list_models;

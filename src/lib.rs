pub mod browser;
pub mod config;
pub mod coordinator;
pub mod digest;
pub mod plugins;
pub mod relay;
pub mod scanner;
pub mod store;
pub mod url_match;
pub mod utils;
pub mod web;

// Re-export commonly used types
pub use config::AppConfig;
pub use coordinator::{Coordinator, Monitor, ScanOptions, run_cycle};
pub use store::{SeenKind, StateStore};
pub use utils::error::AppError;

pub type Result<T> = std::result::Result<T, AppError>;

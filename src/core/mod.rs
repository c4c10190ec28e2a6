pub mod config;
pub mod error;
pub mod task_tree;
pub mod types;

pub use config::{ConfigLoader, EngineConfig};
pub use error::AppError;
pub use types::*;

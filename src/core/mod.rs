pub mod config;
pub mod error;
pub mod pipeline;
pub mod types;

pub use config::{AmplifierConfig, ConfigLoader, ConfigValidator};
pub use error::{ActionError, AppError};
pub use types::*;

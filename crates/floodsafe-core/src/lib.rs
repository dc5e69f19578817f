pub mod config;
pub mod error;
pub mod types;

pub use config::FloodSafeConfig;
pub use error::{FloodSafeError, Result};
pub use types::*;

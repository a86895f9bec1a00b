pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::AppConfig;
pub use error::{PipewrightError, Result};
pub use traits::{CommandRunner, Stage};
pub use types::*;

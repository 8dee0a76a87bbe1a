pub mod config;
pub mod error;
pub mod logging;
pub mod resilient_http;
pub mod types;

pub use error::{CoreError, HttpErrorKind, Result};

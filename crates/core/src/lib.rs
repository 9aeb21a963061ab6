pub mod config;
pub mod error;
pub mod retry;
pub mod telemetry;

pub use config::{AddressKind, Settings};
pub use error::AppError;
pub use retry::{Backoff, with_timeout};

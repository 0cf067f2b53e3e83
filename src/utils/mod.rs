//! Shared utilities: logging setup and backoff helpers.

mod logging;
mod retry;

pub use logging::{setup_logging, setup_logging_with_writer};
pub use retry::BackoffSchedule;

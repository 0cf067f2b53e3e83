//! Configuration validation and environment-driven settings.
//!
//! Chain and contract documents come from the configuration store; the
//! `validate` impls here are the gate between stored documents and the
//! runtime. `IndexerSettings` collects the process-level tuning knobs.

mod chain_config;
mod contract_config;
mod error;
mod settings;

pub use error::ConfigError;
pub use settings::IndexerSettings;

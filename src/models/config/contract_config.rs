//! Contract configuration validation.
//!
//! Structural checks on contract documents; the semantic check that every
//! monitored topic hash resolves to exactly one ABI fragment happens when the
//! decoder compiles the fragment registry.

use crate::models::config::error::ConfigError;
use crate::models::ContractConfig;

fn is_topic_hash(s: &str) -> bool {
    let stripped = match s.strip_prefix("0x") {
        Some(rest) => rest,
        None => return false,
    };
    stripped.len() == 64 && stripped.chars().all(|c| c.is_ascii_hexdigit())
}

fn is_address(s: &str) -> bool {
    let stripped = match s.strip_prefix("0x") {
        Some(rest) => rest,
        None => return false,
    };
    stripped.len() == 40 && stripped.chars().all(|c| c.is_ascii_hexdigit())
}

impl ContractConfig {
    /// Validate the contract configuration
    ///
    /// Ensures that:
    /// - The address is a 20-byte hex string
    /// - At least one event topic is monitored, each a 32-byte hex hash
    /// - The ABI fragment list is non-empty
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_address(&self.address) {
            return Err(ConfigError::validation_error(format!(
                "Invalid contract address: {}",
                self.address
            )));
        }

        if self.events.is_empty() {
            return Err(ConfigError::validation_error(
                "Contract must monitor at least one event topic",
            ));
        }

        for topic in &self.events {
            if !is_topic_hash(topic) {
                return Err(ConfigError::validation_error(format!(
                    "Invalid event topic hash: {}",
                    topic
                )));
            }
        }

        if self.abi.is_empty() {
            return Err(ConfigError::validation_error(
                "Contract ABI fragment list must not be empty",
            ));
        }

        Ok(())
    }
}

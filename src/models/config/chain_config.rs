//! Chain configuration validation.
//!
//! Validates chain documents loaded from the configuration store before the
//! supervisor builds adapters from them.

use crate::models::config::error::ConfigError;
use crate::models::{ChainConfig, IngestStrategy};

impl ChainConfig {
    /// Validate the chain configuration
    ///
    /// Ensures that:
    /// - The chain id is positive and a name is present
    /// - The request endpoint is an HTTP(S) URL
    /// - A configured streaming endpoint is a WS(S) URL
    /// - The scan interval is not pathologically small
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chain_id <= 0 {
            return Err(ConfigError::validation_error(
                "chain_id must be a positive integer",
            ));
        }

        if self.name.trim().is_empty() {
            return Err(ConfigError::validation_error("Chain name must not be empty"));
        }

        if !self.rpc_url.starts_with("http://") && !self.rpc_url.starts_with("https://") {
            return Err(ConfigError::validation_error(
                "rpc_url must start with http:// or https://",
            ));
        }

        if let Some(stream_url) = self.stream_url.as_deref() {
            if !stream_url.is_empty()
                && !stream_url.starts_with("ws://")
                && !stream_url.starts_with("wss://")
            {
                return Err(ConfigError::validation_error(
                    "stream_url must start with ws:// or wss://",
                ));
            }
        }

        // Push without a streaming endpoint is allowed (runtime falls back to
        // pull) but an explicit pull strategy with a stream URL is fine too.
        if self.strategy == IngestStrategy::Push && !self.has_stream_url() {
            log::warn!(
                "Chain {} ({}) configured for push without stream_url; will fall back to pull",
                self.name,
                self.chain_id
            );
        }

        if self.scan_interval_ms < 100 {
            return Err(ConfigError::validation_error(
                "scan_interval_ms must be at least 100ms",
            ));
        }

        Ok(())
    }
}

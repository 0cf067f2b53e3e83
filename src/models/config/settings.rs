//! Environment-driven tuning knobs for the ingestion core.
//!
//! Every knob has a default matching production behavior; the corresponding
//! environment variable overrides it. Unparseable values fall back to the
//! default with a warning rather than aborting startup.

use log::warn;

/// Tuning parameters shared by listeners, the dispatcher and the supervisor.
#[derive(Debug, Clone)]
pub struct IndexerSettings {
    /// Pull tick period when the chain config does not specify one.
    pub scan_interval_ms: u64,
    /// Upper bound on the block window scanned per pull tick.
    pub blocks_per_scan: u64,
    /// Contracts queried in parallel per batch.
    pub contract_batch_size: usize,
    pub contract_batch_delay_ms: u64,
    /// Event names queried in parallel per contract batch.
    pub event_batch_size: usize,
    pub event_batch_delay_ms: u64,
    /// Block timestamps resolved per batch.
    pub block_batch_size: usize,
    pub block_batch_delay_ms: u64,
    /// Consecutive stream reconnect failures tolerated before `Exhausted`.
    pub max_reconnect_attempts: u32,
    /// Period of the listener-local contract snapshot refresh.
    pub contract_refresh_interval_ms: u64,
    /// Hard cap on the dispatcher queue; oldest events drop past it.
    pub queue_capacity: usize,
    /// Period of the supervisor's enabled-chain reload loop.
    pub chain_reload_interval_ms: u64,
    /// Timeout applied to every RPC request.
    pub rpc_timeout_ms: u64,
    /// Grace period granted to listeners on shutdown.
    pub shutdown_grace_ms: u64,
}

impl Default for IndexerSettings {
    fn default() -> Self {
        Self {
            scan_interval_ms: 5_000,
            blocks_per_scan: 50,
            contract_batch_size: 3,
            contract_batch_delay_ms: 500,
            event_batch_size: 2,
            event_batch_delay_ms: 300,
            block_batch_size: 5,
            block_batch_delay_ms: 200,
            max_reconnect_attempts: 5,
            contract_refresh_interval_ms: 30_000,
            queue_capacity: 100_000,
            chain_reload_interval_ms: 60_000,
            rpc_timeout_ms: 10_000,
            shutdown_grace_ms: 30_000,
        }
    }
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                warn!("Ignoring unparseable {}={:?}, using default", key, raw);
                default
            }
        },
        Err(_) => default,
    }
}

impl IndexerSettings {
    /// Builds settings from the process environment, applying defaults for
    /// anything unset.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            scan_interval_ms: env_parsed("SCAN_INTERVAL_MS", defaults.scan_interval_ms),
            blocks_per_scan: env_parsed("BLOCKS_PER_SCAN", defaults.blocks_per_scan),
            contract_batch_size: env_parsed("CONTRACT_BATCH_SIZE", defaults.contract_batch_size),
            contract_batch_delay_ms: env_parsed(
                "CONTRACT_BATCH_DELAY_MS",
                defaults.contract_batch_delay_ms,
            ),
            event_batch_size: env_parsed("EVENT_BATCH_SIZE", defaults.event_batch_size),
            event_batch_delay_ms: env_parsed(
                "EVENT_BATCH_DELAY_MS",
                defaults.event_batch_delay_ms,
            ),
            block_batch_size: env_parsed("BLOCK_BATCH_SIZE", defaults.block_batch_size),
            block_batch_delay_ms: env_parsed(
                "BLOCK_BATCH_DELAY_MS",
                defaults.block_batch_delay_ms,
            ),
            max_reconnect_attempts: env_parsed(
                "WEBSOCKET_RECONNECT_ATTEMPTS",
                defaults.max_reconnect_attempts,
            ),
            contract_refresh_interval_ms: env_parsed(
                "CONTRACT_REFRESH_INTERVAL",
                defaults.contract_refresh_interval_ms,
            ),
            queue_capacity: env_parsed("EVENT_QUEUE_CAPACITY", defaults.queue_capacity),
            chain_reload_interval_ms: env_parsed(
                "CHAIN_RELOAD_INTERVAL_MS",
                defaults.chain_reload_interval_ms,
            ),
            rpc_timeout_ms: env_parsed("RPC_TIMEOUT_MS", defaults.rpc_timeout_ms),
            shutdown_grace_ms: env_parsed("SHUTDOWN_GRACE_MS", defaults.shutdown_grace_ms),
        }
    }
}

//! chainfeed: a multi-chain EVM contract log indexer.
//!
//! Ingests smart-contract log events from many EVM-compatible networks via
//! push (streaming subscriptions) or pull (bounded range scans), decodes
//! them against per-contract event fragments, enriches transfers (value
//! scaling, whale flags, mint/burn classification), and persists
//! exactly-once-per-log records for downstream analytics.

pub mod api;
pub mod bootstrap;
pub mod models;
pub mod repositories;
pub mod services;
pub mod storage;
pub mod utils;

pub use models::{BlockchainEvent, ChainConfig, ContractConfig, IndexerSettings};
pub use services::blockchain::ChainAdapter;
pub use services::dispatcher::{EventDispatcher, EventHandler};
pub use services::listener::{ChainListener, ListenerContext, ListenerState};
pub use services::supervisor::Supervisor;

//! Domain models and data structures for the indexer.
//!
//! - `core`: chain, contract, event and runtime-fact documents
//! - `config`: validation of stored documents and environment settings

mod config;
mod core;

pub use config::{ConfigError, IndexerSettings};
pub use core::{
    are_same_address, normalize_address, ApprovalEvent, BlockchainEvent, ChainConfig, ChainType,
    ContractConfig, ContractData, ContractDataMetadata, ContractInfo, ContractMetadata,
    DecodedEvent, EventInfo, EventPayload, EventType, IngestStrategy, NativeCurrency,
    TransferEvent, TransferKind, ZERO_ADDRESS,
};

//! Event and contract-data stores.
//!
//! The event store is append-mostly: one document per decoded log, with a
//! unique index on `(chain_id, transaction_hash, log_index)` that turns
//! replays into no-ops. The contract data store holds mutable runtime facts
//! per `(chain_id, contract_address)`.

mod error;
mod memory;
mod postgres;

pub use error::StorageError;
pub use memory::{InMemoryContractDataStore, InMemoryEventStore};
pub use postgres::{
    create_pool, run_migrations, PostgresContractDataStore, PostgresEventStore,
};

use async_trait::async_trait;

use crate::models::{BlockchainEvent, ContractData};

/// Append-mostly sink for decoded events.
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn find_event(
        &self,
        chain_id: i64,
        transaction_hash: &str,
        log_index: u64,
    ) -> Result<Option<BlockchainEvent>, StorageError>;

    /// Inserts unless the unique key already exists. Returns `false` when
    /// the event was already present (silent replay skip).
    async fn insert_event(&self, event: &BlockchainEvent) -> Result<bool, StorageError>;

    async fn count_events(&self) -> Result<u64, StorageError>;
}

/// Store of per-contract runtime facts.
#[async_trait]
pub trait ContractDataStore: Send + Sync {
    async fn get(
        &self,
        chain_id: i64,
        contract_address: &str,
    ) -> Result<Option<ContractData>, StorageError>;

    /// Inserts or replaces the record.
    async fn save(&self, data: &ContractData) -> Result<(), StorageError>;
}

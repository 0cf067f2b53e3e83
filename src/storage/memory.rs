//! In-memory store implementations.
//!
//! Back the same traits as the Postgres stores for tests and store-less
//! development runs. All data is lost when the process exits.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::{
    models::{BlockchainEvent, ContractData},
    storage::{error::StorageError, ContractDataStore, EventStore},
};

type EventKey = (i64, String, u64);

/// In-memory event store with the same uniqueness semantics as the
/// persistent one.
#[derive(Default)]
pub struct InMemoryEventStore {
    events: Mutex<HashMap<EventKey, BlockchainEvent>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All stored events in `(block_number, log_index)` order; test helper.
    pub async fn all_events(&self) -> Vec<BlockchainEvent> {
        let mut events: Vec<BlockchainEvent> =
            self.events.lock().await.values().cloned().collect();
        events.sort_by_key(|e| (e.block_number, e.log_index));
        events
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn find_event(
        &self,
        chain_id: i64,
        transaction_hash: &str,
        log_index: u64,
    ) -> Result<Option<BlockchainEvent>, StorageError> {
        Ok(self
            .events
            .lock()
            .await
            .get(&(chain_id, transaction_hash.to_string(), log_index))
            .cloned())
    }

    async fn insert_event(&self, event: &BlockchainEvent) -> Result<bool, StorageError> {
        let key = (
            event.chain_id,
            event.transaction_hash.clone(),
            event.log_index,
        );
        let mut events = self.events.lock().await;
        if events.contains_key(&key) {
            return Ok(false);
        }
        events.insert(key, event.clone());
        Ok(true)
    }

    async fn count_events(&self) -> Result<u64, StorageError> {
        Ok(self.events.lock().await.len() as u64)
    }
}

/// In-memory contract data store.
#[derive(Default)]
pub struct InMemoryContractDataStore {
    records: Mutex<HashMap<(i64, String), ContractData>>,
}

impl InMemoryContractDataStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ContractDataStore for InMemoryContractDataStore {
    async fn get(
        &self,
        chain_id: i64,
        contract_address: &str,
    ) -> Result<Option<ContractData>, StorageError> {
        Ok(self
            .records
            .lock()
            .await
            .get(&(chain_id, contract_address.to_string()))
            .cloned())
    }

    async fn save(&self, data: &ContractData) -> Result<(), StorageError> {
        self.records
            .lock()
            .await
            .insert((data.chain_id, data.contract_address.clone()), data.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContractInfo, EventInfo, EventPayload, EventType};

    fn event(chain_id: i64, tx: &str, log_index: u64, block: u64) -> BlockchainEvent {
        BlockchainEvent {
            chain_id,
            transaction_hash: tx.into(),
            log_index,
            block_number: block,
            timestamp_ms: 0,
            event_type: EventType::ContractLog,
            contract_address: "0xaaaa".into(),
            data: EventPayload {
                topics: vec![],
                raw_data: "0x".into(),
                log_index,
                transaction_index: None,
                gas_used: None,
                tx_status: None,
                contract: ContractInfo {
                    name: "T".into(),
                    symbol: "T".into(),
                    contract_type: "erc20".into(),
                },
                event: EventInfo {
                    name: "Transfer".into(),
                    signature: "Transfer(address,address,uint256)".into(),
                    args: serde_json::Value::Null,
                },
            },
            processed: false,
            processed_at: None,
            processing_result: None,
        }
    }

    #[tokio::test]
    async fn duplicate_insert_is_a_noop() {
        let store = InMemoryEventStore::new();
        assert!(store.insert_event(&event(1, "0xtx1", 0, 95)).await.unwrap());
        assert!(!store.insert_event(&event(1, "0xtx1", 0, 95)).await.unwrap());
        assert_eq!(store.count_events().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn identity_is_the_full_triple() {
        let store = InMemoryEventStore::new();
        assert!(store.insert_event(&event(1, "0xtx1", 0, 95)).await.unwrap());
        assert!(store.insert_event(&event(1, "0xtx1", 1, 95)).await.unwrap());
        assert!(store.insert_event(&event(56, "0xtx1", 0, 95)).await.unwrap());
        assert_eq!(store.count_events().await.unwrap(), 3);

        let found = store.find_event(1, "0xtx1", 1).await.unwrap();
        assert!(found.is_some());
        assert!(store.find_event(1, "0xtx2", 0).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn all_events_orders_by_block_then_log_index() {
        let store = InMemoryEventStore::new();
        store.insert_event(&event(1, "0xb", 1, 96)).await.unwrap();
        store.insert_event(&event(1, "0xa", 0, 95)).await.unwrap();
        store.insert_event(&event(1, "0xb", 0, 96)).await.unwrap();

        let ordered: Vec<(u64, u64)> = store
            .all_events()
            .await
            .iter()
            .map(|e| (e.block_number, e.log_index))
            .collect();
        assert_eq!(ordered, vec![(95, 0), (96, 0), (96, 1)]);
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Rolling counters attached to a contract's runtime record.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ContractDataMetadata {
    #[serde(default)]
    pub transfer_count: u64,
    #[serde(default)]
    pub large_transfer_count: u64,
    #[serde(default)]
    pub last_transfer_timestamp: Option<i64>,
}

/// Cached runtime facts about a contract, keyed by
/// `(chain_id, contract_address)`. Created on the first observed event and
/// mutated by handlers; deactivation is logical, never destructive.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ContractData {
    pub chain_id: i64,
    pub contract_address: String,
    pub contract_type: String,
    /// `"{contract_type}_{chain_id}"`, used to group records per collection.
    pub collection_key: String,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub total_supply: Option<String>,
    pub owner: Option<String>,
    pub is_active: bool,
    pub last_updated: DateTime<Utc>,
    pub first_seen_block: Option<u64>,
    pub last_processed_block: Option<u64>,
    pub start_from_block: Option<u64>,
    #[serde(default)]
    pub metadata: ContractDataMetadata,
}

impl ContractData {
    pub fn collection_key_for(contract_type: &str, chain_id: i64) -> String {
        format!("{}_{}", contract_type, chain_id)
    }

    /// Advances `last_processed_block` without ever rewinding it.
    pub fn advance_last_processed_block(&mut self, block_number: u64) {
        self.last_processed_block = Some(
            self.last_processed_block
                .map_or(block_number, |current| current.max(block_number)),
        );
    }
}

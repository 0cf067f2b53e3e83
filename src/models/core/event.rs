use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use web3::types::U256;

/// The zero address, used to classify mints and burns.
pub const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

#[derive(Debug, Copy, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    ContractLog,
}

/// Static facts about the emitting contract, denormalized into the event
/// document for downstream consumers.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ContractInfo {
    pub name: String,
    pub symbol: String,
    pub contract_type: String,
}

/// The decoded event descriptor inside an event document.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EventInfo {
    pub name: String,
    pub signature: String,
    pub args: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EventPayload {
    pub topics: Vec<String>,
    pub raw_data: String,
    pub log_index: u64,
    pub transaction_index: Option<u64>,
    pub gas_used: Option<u64>,
    pub tx_status: Option<u64>,
    pub contract: ContractInfo,
    pub event: EventInfo,
}

/// A decoded, persistable log record. Identity is
/// `(chain_id, transaction_hash, log_index)`; the event store's unique index
/// on that triple makes re-ingestion a no-op.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BlockchainEvent {
    pub chain_id: i64,
    pub transaction_hash: String,
    pub log_index: u64,
    pub block_number: u64,
    pub timestamp_ms: i64,
    pub event_type: EventType,
    pub contract_address: String,
    pub data: EventPayload,
    pub processed: bool,
    pub processed_at: Option<DateTime<Utc>>,
    pub processing_result: Option<String>,
}

impl BlockchainEvent {
    /// Topic-0 of the underlying log, when present.
    pub fn topic0(&self) -> Option<&str> {
        self.data.topics.first().map(String::as_str)
    }
}

/// A decoded ERC-20 `Transfer(address,address,uint256)`.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferEvent {
    pub from: String,
    pub to: String,
    pub value_raw: U256,
    pub value_formatted: String,
    pub is_large_transfer: bool,
}

/// A decoded ERC-20 `Approval(address,address,uint256)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ApprovalEvent {
    pub owner: String,
    pub spender: String,
    pub value_raw: U256,
    pub value_formatted: String,
}

/// Tagged union of decoded event arguments. Events outside the built-in set
/// carry their arguments as a generic name → value map.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedEvent {
    Transfer(TransferEvent),
    Approval(ApprovalEvent),
    Raw { args: serde_json::Value },
}

impl DecodedEvent {
    /// Renders the decoded arguments as the JSON document persisted inside
    /// `EventInfo::args`.
    pub fn to_args_json(&self) -> serde_json::Value {
        match self {
            Self::Transfer(t) => serde_json::json!({
                "from": t.from,
                "to": t.to,
                "value": t.value_raw.to_string(),
                "value_formatted": t.value_formatted,
                "is_large_transfer": t.is_large_transfer,
            }),
            Self::Approval(a) => serde_json::json!({
                "owner": a.owner,
                "spender": a.spender,
                "value": a.value_raw.to_string(),
                "value_formatted": a.value_formatted,
            }),
            Self::Raw { args } => args.clone(),
        }
    }
}

/// Classification of a transfer by its endpoints.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferKind {
    Mint,
    Burn,
    Transfer,
}

impl TransferKind {
    /// Classifies by zero-address comparison. A transfer that is both (zero
    /// to zero) counts as a mint.
    pub fn classify(from: &str, to: &str) -> Self {
        if from.eq_ignore_ascii_case(ZERO_ADDRESS) {
            Self::Mint
        } else if to.eq_ignore_ascii_case(ZERO_ADDRESS) {
            Self::Burn
        } else {
            Self::Transfer
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mint => "mint",
            Self::Burn => "burn",
            Self::Transfer => "transfer",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_transfer_endpoints() {
        assert_eq!(TransferKind::classify(ZERO_ADDRESS, "0x03"), TransferKind::Mint);
        assert_eq!(TransferKind::classify("0x03", ZERO_ADDRESS), TransferKind::Burn);
        assert_eq!(TransferKind::classify("0x01", "0x02"), TransferKind::Transfer);
        assert_eq!(
            TransferKind::classify(ZERO_ADDRESS, ZERO_ADDRESS),
            TransferKind::Mint
        );
    }

    #[test]
    fn transfer_args_json_shape() {
        let decoded = DecodedEvent::Transfer(TransferEvent {
            from: "0x01".into(),
            to: "0x02".into(),
            value_raw: U256::from(1_000u64),
            value_formatted: "0.000001".into(),
            is_large_transfer: false,
        });
        let args = decoded.to_args_json();
        assert_eq!(args["from"], "0x01");
        assert_eq!(args["value"], "1000");
        assert_eq!(args["is_large_transfer"], false);
    }
}

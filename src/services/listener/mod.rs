//! Chain listeners: the two ingestion strategies.
//!
//! A listener ingests logs from exactly one chain via one strategy and owns
//! its in-memory contract snapshot. Push subscribes to the chain's streaming
//! endpoint; pull range-scans new blocks on a timer. Both produce identical
//! `BlockchainEvent` documents and enqueue them on the dispatcher.

mod error;
mod pull;
mod push;

pub use error::ListenerError;
pub use pull::PullListener;
pub use push::PushListener;

use std::{collections::HashMap, sync::Arc};
use tokio::sync::RwLock;
use tracing::{info, warn};
use web3::types::Log;

use crate::{
	models::{BlockchainEvent, ContractConfig, ContractInfo, EventInfo, EventPayload, EventType,
		IndexerSettings, IngestStrategy},
	repositories::ContractConfigRepositoryTrait,
	services::{
		blockchain::ReceiptInfo,
		decoder::{helpers::h256_to_string, DecodedLog, EventRegistry},
		dispatcher::EventDispatcher,
	},
	storage::ContractDataStore,
};

/// Lifecycle states of a listener.
#[derive(Debug, Copy, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ListenerState {
	Stopped,
	Starting,
	Running,
	Reconnecting,
	Failed,
}

impl std::fmt::Display for ListenerState {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Stopped => write!(f, "stopped"),
			Self::Starting => write!(f, "starting"),
			Self::Running => write!(f, "running"),
			Self::Reconnecting => write!(f, "reconnecting"),
			Self::Failed => write!(f, "failed"),
		}
	}
}

/// State holder that logs every transition.
pub(crate) struct StateCell {
	label: String,
	inner: RwLock<ListenerState>,
}

impl StateCell {
	pub(crate) fn new(label: impl Into<String>) -> Self {
		Self {
			label: label.into(),
			inner: RwLock::new(ListenerState::Stopped),
		}
	}

	pub(crate) async fn get(&self) -> ListenerState {
		*self.inner.read().await
	}

	pub(crate) async fn set(&self, next: ListenerState) {
		let mut state = self.inner.write().await;
		if *state != next {
			info!("Listener {}: {} -> {}", self.label, *state, next);
			*state = next;
		}
	}
}

/// Collaborators a listener needs besides its adapter.
#[derive(Clone)]
pub struct ListenerContext {
	pub dispatcher: Arc<EventDispatcher>,
	pub contracts: Arc<dyn ContractConfigRepositoryTrait>,
	pub contract_data: Arc<dyn ContractDataStore>,
	pub settings: IndexerSettings,
}

/// A contract config with its precompiled decode registry.
pub struct CompiledContract {
	pub config: ContractConfig,
	pub registry: EventRegistry,
}

/// Address → compiled contract map; the listener's owned snapshot.
pub type ContractSnapshot = HashMap<String, Arc<CompiledContract>>;

/// Loads the enabled contract set for a chain and compiles decode
/// registries. Contracts that fail validation or compilation are skipped
/// with a warning rather than poisoning the snapshot.
pub(crate) async fn load_contract_snapshot(
	contracts: &Arc<dyn ContractConfigRepositoryTrait>,
	chain_id: i64,
) -> Result<ContractSnapshot, ListenerError> {
	let configs = contracts.get_enabled_for_chain(chain_id).await?;

	let mut snapshot = ContractSnapshot::new();
	for config in configs {
		if let Err(e) = config.validate() {
			warn!(
				"Skipping invalid contract {} on chain {}: {}",
				config.address, chain_id, e
			);
			continue;
		}
		match EventRegistry::compile(&config) {
			Ok(registry) => {
				snapshot.insert(
					config.normalized_address(),
					Arc::new(CompiledContract { config, registry }),
				);
			}
			Err(e) => {
				warn!(
					"Skipping contract {} on chain {}: registry compile failed: {}",
					config.address, chain_id, e
				);
			}
		}
	}
	Ok(snapshot)
}

/// Assembles the event document both strategies produce.
pub(crate) fn build_event(
	chain_id: i64,
	contract: &CompiledContract,
	decoded: &DecodedLog,
	log: &Log,
	timestamp_ms: i64,
	receipt: Option<ReceiptInfo>,
) -> BlockchainEvent {
	let log_index = log.log_index.map(|i| i.as_u64()).unwrap_or(0);
	BlockchainEvent {
		chain_id,
		transaction_hash: log
			.transaction_hash
			.map(h256_to_string)
			.unwrap_or_else(|| "0x0".to_string()),
		log_index,
		block_number: log.block_number.map(|b| b.as_u64()).unwrap_or(0),
		timestamp_ms,
		event_type: EventType::ContractLog,
		contract_address: contract.config.normalized_address(),
		data: EventPayload {
			topics: log.topics.iter().map(|t| h256_to_string(*t)).collect(),
			raw_data: format!("0x{}", hex::encode(&log.data.0)),
			log_index,
			transaction_index: log.transaction_index.map(|i| i.as_u64()),
			gas_used: receipt.and_then(|r| r.gas_used),
			tx_status: receipt.and_then(|r| r.status),
			contract: ContractInfo {
				name: contract.config.name.clone(),
				symbol: contract.config.symbol.clone(),
				contract_type: contract.config.contract_type.clone(),
			},
			event: EventInfo {
				name: decoded.name.clone(),
				signature: decoded.signature.clone(),
				args: decoded.decoded.to_args_json(),
			},
		},
		processed: false,
		processed_at: None,
		processing_result: None,
	}
}

/// A listener of either strategy, as minted by the chain adapter.
pub enum ChainListener {
	Push(PushListener),
	Pull(PullListener),
}

impl ChainListener {
	pub fn strategy(&self) -> IngestStrategy {
		match self {
			Self::Push(_) => IngestStrategy::Push,
			Self::Pull(_) => IngestStrategy::Pull,
		}
	}

	pub async fn start(&self) -> Result<(), ListenerError> {
		match self {
			Self::Push(listener) => listener.start().await,
			Self::Pull(listener) => listener.start().await,
		}
	}

	pub async fn stop(&self) {
		match self {
			Self::Push(listener) => listener.stop().await,
			Self::Pull(listener) => listener.stop().await,
		}
	}

	pub async fn state(&self) -> ListenerState {
		match self {
			Self::Push(listener) => listener.state().await,
			Self::Pull(listener) => listener.state().await,
		}
	}

	pub async fn diagnostic(&self) -> Option<String> {
		match self {
			Self::Push(listener) => listener.diagnostic().await,
			Self::Pull(listener) => listener.diagnostic().await,
		}
	}
}

/// Settings helper: the pull tick period for a chain, preferring the chain's
/// own configuration.
pub(crate) fn scan_interval_ms(chain_interval: u64, settings: &IndexerSettings) -> u64 {
	if chain_interval > 0 {
		chain_interval
	} else {
		settings.scan_interval_ms
	}
}

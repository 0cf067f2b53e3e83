//! Reference handler for ERC-20 `Transfer` events.
//!
//! Enriches decoded transfers (value scaling, whale flag, mint/burn
//! classification), keeps the per-contract runtime record current, and
//! persists the event exactly once. Store hiccups are logged and swallowed;
//! only the unique index guards correctness.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};
use web3::types::U256;

use crate::{
	models::{
		BlockchainEvent, ContractData, ContractDataMetadata, EventType, TransferKind,
	},
	repositories::ContractConfigRepositoryTrait,
	services::{
		decoder::{
			helpers::{format_token_amount, h256_to_string, is_large_transfer},
			TRANSFER_TOPIC,
		},
		dispatcher::EventHandler,
	},
	storage::{ContractDataStore, EventStore},
};

pub struct TransferHandler {
	contracts: Arc<dyn ContractConfigRepositoryTrait>,
	events: Arc<dyn EventStore>,
	contract_data: Arc<dyn ContractDataStore>,
}

impl TransferHandler {
	pub fn new(
		contracts: Arc<dyn ContractConfigRepositoryTrait>,
		events: Arc<dyn EventStore>,
		contract_data: Arc<dyn ContractDataStore>,
	) -> Self {
		Self {
			contracts,
			events,
			contract_data,
		}
	}

	async fn update_contract_data(
		&self,
		event: &BlockchainEvent,
		decimals: u8,
		is_large: bool,
	) {
		let existing = match self
			.contract_data
			.get(event.chain_id, &event.contract_address)
			.await
		{
			Ok(existing) => existing,
			Err(e) => {
				warn!("Contract data lookup failed, skipping update: {}", e);
				return;
			}
		};

		let record = match existing {
			Some(mut record) => {
				record.advance_last_processed_block(event.block_number);
				if record.first_seen_block.is_none() {
					record.first_seen_block = Some(event.block_number);
				}
				record.metadata.transfer_count += 1;
				if is_large {
					record.metadata.large_transfer_count += 1;
				}
				record.metadata.last_transfer_timestamp = Some(event.timestamp_ms);
				record.last_updated = Utc::now();
				record
			}
			None => ContractData {
				chain_id: event.chain_id,
				contract_address: event.contract_address.clone(),
				contract_type: event.data.contract.contract_type.clone(),
				collection_key: ContractData::collection_key_for(
					&event.data.contract.contract_type,
					event.chain_id,
				),
				name: event.data.contract.name.clone(),
				symbol: event.data.contract.symbol.clone(),
				decimals,
				total_supply: None,
				owner: None,
				is_active: true,
				last_updated: Utc::now(),
				first_seen_block: Some(event.block_number),
				last_processed_block: Some(event.block_number),
				start_from_block: Some(event.block_number),
				metadata: ContractDataMetadata {
					transfer_count: 1,
					large_transfer_count: if is_large { 1 } else { 0 },
					last_transfer_timestamp: Some(event.timestamp_ms),
				},
			},
		};

		if let Err(e) = self.contract_data.save(&record).await {
			warn!("Contract data save failed: {}", e);
		}
	}

	async fn persist_event(
		&self,
		event: &BlockchainEvent,
		transfer_type: TransferKind,
		value_formatted: &str,
	) {
		let mut stored = event.clone();
		stored.processed = true;
		stored.processed_at = Some(Utc::now());
		stored.processing_result = Some(transfer_type.as_str().to_string());
		if let serde_json::Value::Object(args) = &mut stored.data.event.args {
			args.insert(
				"transfer_type".into(),
				serde_json::Value::String(transfer_type.as_str().to_string()),
			);
			let token_amount: f64 = value_formatted.replace(',', "").parse().unwrap_or(0.0);
			args.insert("token_amount".into(), serde_json::json!(token_amount));
		}

		match self.events.insert_event(&stored).await {
			Ok(true) => {}
			// Unique-key races lose silently; the first writer wins.
			Ok(false) => debug!(
				"Event {}:{}:{} inserted concurrently, skipping",
				event.chain_id, event.transaction_hash, event.log_index
			),
			Err(e) if e.is_duplicate() => {}
			Err(e) => warn!("Event insert failed (non-fatal): {}", e),
		}
	}
}

#[async_trait]
impl EventHandler for TransferHandler {
	fn name(&self) -> &str {
		"transfer"
	}

	fn can_handle(&self, event: &BlockchainEvent) -> bool {
		event.event_type == EventType::ContractLog
			&& event
				.topic0()
				.is_some_and(|t| t.eq_ignore_ascii_case(&h256_to_string(*TRANSFER_TOPIC)))
	}

	async fn handle(&self, event: &BlockchainEvent) -> Result<(), anyhow::Error> {
		let contract = match self
			.contracts
			.get(event.chain_id, &event.contract_address)
			.await?
		{
			Some(contract) => contract,
			None => return Ok(()),
		};

		let args = &event.data.event.args;
		let (from, to, value_raw) = match (
			args.get("from").and_then(|v| v.as_str()),
			args.get("to").and_then(|v| v.as_str()),
			args.get("value")
				.and_then(|v| v.as_str())
				.and_then(|v| U256::from_dec_str(v).ok()),
		) {
			(Some(from), Some(to), Some(value)) => (from.to_string(), to.to_string(), value),
			_ => return Ok(()),
		};

		// Replay guard: a log that is already persisted must not move
		// counters a second time.
		match self
			.events
			.find_event(event.chain_id, &event.transaction_hash, event.log_index)
			.await
		{
			Ok(Some(_)) => {
				debug!(
					"Event {}:{}:{} already persisted, skipping",
					event.chain_id, event.transaction_hash, event.log_index
				);
				return Ok(());
			}
			Ok(None) => {}
			Err(e) => {
				warn!("Event existence check failed, continuing: {}", e);
			}
		}

		let decimals = contract.metadata.decimals;
		let value_formatted = format_token_amount(value_raw, decimals);
		let is_large = is_large_transfer(value_raw, decimals, contract.metadata.is_stablecoin);
		let transfer_type = TransferKind::classify(&from, &to);

		if is_large {
			warn!(
				"LARGE TRANSFER: {} {} from {} to {} on chain {}",
				value_formatted, contract.symbol, from, to, event.chain_id
			);
		} else if contract.metadata.is_high_priority() {
			info!(
				"PRIORITY TRANSFER: {} {} from {} to {} on chain {}",
				value_formatted, contract.symbol, from, to, event.chain_id
			);
		} else {
			info!(
				"Transfer: {} {} from {} to {} on chain {}",
				value_formatted, contract.symbol, from, to, event.chain_id
			);
		}

		match transfer_type {
			TransferKind::Mint => info!(
				"MINT: {} {} minted to {}",
				value_formatted, contract.symbol, to
			),
			TransferKind::Burn => info!(
				"BURN: {} {} burned from {}",
				value_formatted, contract.symbol, from
			),
			TransferKind::Transfer => {}
		}

		self.update_contract_data(event, decimals, is_large).await;
		self.persist_event(event, transfer_type, &value_formatted).await;

		Ok(())
	}
}

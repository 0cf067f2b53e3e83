//! Chain adapter: one chain's transports and RPC surface.
//!
//! The adapter owns the request/response transport (always) and the
//! streaming transport (when a stream URL is configured). It verifies on
//! connect that the remote chain is the one configured, exposes the handful
//! of RPC calls the listeners need, and mints listeners for a requested
//! ingestion strategy.

use serde_json::json;
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};
use web3::types::Log;

use crate::{
	models::{ChainConfig, ChainType, IngestStrategy},
	services::{
		blockchain::{
			error::AdapterError,
			transports::{EvmRpcTransport, HttpTransportClient, StreamTransport, WsTransportClient},
		},
		listener::{ChainListener, ListenerContext, PullListener, PushListener},
	},
};

/// Receipt facts the indexer cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiptInfo {
	pub gas_used: Option<u64>,
	pub status: Option<u64>,
}

/// Transport bundle for a single chain.
pub struct ChainAdapter {
	config: Arc<ChainConfig>,
	rpc: Arc<dyn EvmRpcTransport>,
	stream: Option<Arc<dyn StreamTransport>>,
}

impl ChainAdapter {
	/// Builds an adapter with production transports from the chain config.
	pub fn new(config: Arc<ChainConfig>, rpc_timeout: Duration) -> Result<Self, AdapterError> {
		if config.chain_type != ChainType::Evm {
			return Err(AdapterError::strategy_unavailable(format!(
				"Unsupported chain type {:?} for chain {}",
				config.chain_type, config.chain_id
			)));
		}

		let rpc: Arc<dyn EvmRpcTransport> =
			Arc::new(HttpTransportClient::new(&config.rpc_url, rpc_timeout)?);

		let stream: Option<Arc<dyn StreamTransport>> = match config.stream_url.as_deref() {
			Some(url) if !url.is_empty() => {
				Some(Arc::new(WsTransportClient::new(url, rpc_timeout)))
			}
			_ => None,
		};

		Ok(Self {
			config,
			rpc,
			stream,
		})
	}

	/// Builds an adapter over caller-supplied transports (tests, pooling).
	pub fn new_with_transports(
		config: Arc<ChainConfig>,
		rpc: Arc<dyn EvmRpcTransport>,
		stream: Option<Arc<dyn StreamTransport>>,
	) -> Self {
		Self {
			config,
			rpc,
			stream,
		}
	}

	pub fn config(&self) -> &Arc<ChainConfig> {
		&self.config
	}

	pub fn rpc(&self) -> &Arc<dyn EvmRpcTransport> {
		&self.rpc
	}

	pub fn stream(&self) -> Option<&Arc<dyn StreamTransport>> {
		self.stream.as_ref()
	}

	/// Requests made through the request transport since the last call.
	pub fn take_request_count(&self) -> u64 {
		self.rpc.take_request_count()
	}

	/// Establishes transports and verifies the remote chain identity.
	///
	/// A chain id mismatch is fatal for this chain; a streaming connect
	/// failure is not (the push listener reconnects on its own schedule).
	pub async fn connect(&self) -> Result<(), AdapterError> {
		let response = self.rpc.send_raw_request("eth_chainId", None).await?;
		let advertised = parse_hex_u64_field(&response, "eth_chainId")? as i64;

		if advertised != self.config.chain_id {
			return Err(AdapterError::config_mismatch(format!(
				"Chain {} ({}) advertised id {}",
				self.config.name, self.config.chain_id, advertised
			)));
		}

		if let Some(stream) = &self.stream {
			if let Err(e) = stream.connect().await {
				warn!(
					"Chain {}: streaming transport connect failed ({}); push will retry",
					self.config.chain_id, e
				);
			}
		}

		info!(
			"Chain {} ({}) connected via {}",
			self.config.name, self.config.chain_id, self.config.rpc_url
		);
		Ok(())
	}

	/// Tears down both transports.
	pub async fn disconnect(&self) -> Result<(), AdapterError> {
		if let Some(stream) = &self.stream {
			stream.disconnect().await?;
		}
		Ok(())
	}

	/// Current head block number.
	pub async fn latest_block(&self) -> Result<u64, AdapterError> {
		let response = self.rpc.send_raw_request("eth_blockNumber", None).await?;
		parse_hex_u64_field(&response, "eth_blockNumber")
	}

	/// Timestamp (seconds) of a block, or `None` when the block is unknown.
	pub async fn block_timestamp(&self, block_number: u64) -> Result<Option<u64>, AdapterError> {
		let response = self
			.rpc
			.send_raw_request(
				"eth_getBlockByNumber",
				Some(json!([format!("0x{:x}", block_number), false])),
			)
			.await?;

		let result = response
			.get("result")
			.ok_or_else(|| missing_result("eth_getBlockByNumber"))?;
		if result.is_null() {
			return Ok(None);
		}

		let timestamp = result
			.get("timestamp")
			.and_then(|t| t.as_str())
			.and_then(parse_hex_u64);
		Ok(timestamp)
	}

	/// Filtered log query restricted to one address and one topic-0.
	pub async fn get_logs(
		&self,
		address: &str,
		topic0: &str,
		from_block: u64,
		to_block: u64,
	) -> Result<Vec<Log>, AdapterError> {
		let response = self
			.rpc
			.send_raw_request(
				"eth_getLogs",
				Some(json!([{
					"fromBlock": format!("0x{:x}", from_block),
					"toBlock": format!("0x{:x}", to_block),
					"address": address,
					"topics": [topic0],
				}])),
			)
			.await?;

		let result = response
			.get("result")
			.ok_or_else(|| missing_result("eth_getLogs"))?;
		serde_json::from_value(result.clone()).map_err(|e| {
			AdapterError::transient_rpc(format!("eth_getLogs: failed to parse logs: {}", e))
		})
	}

	/// Gas used and status for a transaction, or `None` when the receipt is
	/// not (yet) available.
	pub async fn transaction_receipt(
		&self,
		transaction_hash: &str,
	) -> Result<Option<ReceiptInfo>, AdapterError> {
		let response = self
			.rpc
			.send_raw_request("eth_getTransactionReceipt", Some(json!([transaction_hash])))
			.await?;

		let result = response
			.get("result")
			.ok_or_else(|| missing_result("eth_getTransactionReceipt"))?;
		if result.is_null() {
			return Ok(None);
		}

		Ok(Some(ReceiptInfo {
			gas_used: result
				.get("gasUsed")
				.and_then(|v| v.as_str())
				.and_then(parse_hex_u64),
			status: result
				.get("status")
				.and_then(|v| v.as_str())
				.and_then(parse_hex_u64),
		}))
	}

	/// Resolves a requested strategy against the transports actually
	/// available: `push` and `hybrid` need a streaming transport and
	/// degrade to pull without one, `pull` always works. The request
	/// transport is a construction invariant, so resolution never fails.
	pub fn resolve_strategy(
		&self,
		requested: IngestStrategy,
	) -> Result<IngestStrategy, AdapterError> {
		match requested {
			IngestStrategy::Pull => Ok(IngestStrategy::Pull),
			IngestStrategy::Push => {
				if self.stream.is_some() {
					Ok(IngestStrategy::Push)
				} else {
					warn!(
						"Chain {}: push requested without a streaming transport, falling back to pull",
						self.config.chain_id
					);
					Ok(IngestStrategy::Pull)
				}
			}
			IngestStrategy::Hybrid => {
				if self.stream.as_ref().is_some_and(|s| s.is_connected()) {
					Ok(IngestStrategy::Push)
				} else {
					Ok(IngestStrategy::Pull)
				}
			}
		}
	}

	/// Constructs a listener of the requested strategy over this adapter.
	pub fn make_listener(
		self: &Arc<Self>,
		strategy: IngestStrategy,
		ctx: ListenerContext,
	) -> Result<ChainListener, AdapterError> {
		match self.resolve_strategy(strategy)? {
			IngestStrategy::Push => Ok(ChainListener::Push(PushListener::new(self.clone(), ctx))),
			_ => Ok(ChainListener::Pull(PullListener::new(self.clone(), ctx))),
		}
	}
}

fn missing_result(method: &str) -> AdapterError {
	AdapterError::transient_rpc(format!("{}: missing 'result' field", method))
}

fn parse_hex_u64(hex_str: &str) -> Option<u64> {
	u64::from_str_radix(hex_str.trim_start_matches("0x"), 16).ok()
}

fn parse_hex_u64_field(
	response: &serde_json::Value,
	method: &str,
) -> Result<u64, AdapterError> {
	let hex_str = response
		.get("result")
		.and_then(|v| v.as_str())
		.ok_or_else(|| missing_result(method))?;
	parse_hex_u64(hex_str)
		.ok_or_else(|| AdapterError::transient_rpc(format!("{}: bad hex {:?}", method, hex_str)))
}

//! Pull listener: periodic bounded range scans.
//!
//! Each tick scans at most `blocks_per_scan` new blocks. Contracts are
//! queried in small parallel batches with delays between them, event topics
//! likewise within each contract, so the upstream rate limits are respected
//! by construction. Collected logs are sorted by `(block_number, log_index)`
//! before being enqueued, which is the ordering downstream handlers rely on.
//! The cursor only advances once the whole range has been enqueued; a failed
//! or interrupted tick retries the same window.

use futures::future::join_all;
use std::{
	collections::{HashMap, HashSet},
	sync::Arc,
	time::Duration,
};
use tokio::{
	sync::{watch, Mutex, RwLock},
	time::{interval, MissedTickBehavior},
};
use tracing::{debug, info, warn};
use web3::types::Log;

use crate::{
	models::{ContractData, ContractDataMetadata},
	services::{
		blockchain::{AdapterError, ChainAdapter, ReceiptInfo},
		decoder::helpers::h256_to_string,
		listener::{
			build_event, load_contract_snapshot, scan_interval_ms, CompiledContract,
			ContractSnapshot, ListenerContext, ListenerError, ListenerState, StateCell,
		},
	},
};

const RATE_REPORT_INTERVAL: Duration = Duration::from_secs(10);

struct PullShared {
	adapter: Arc<ChainAdapter>,
	ctx: ListenerContext,
	state: StateCell,
	cursor: Mutex<Option<u64>>,
	snapshot: RwLock<Arc<ContractSnapshot>>,
	shutdown_tx: watch::Sender<bool>,
	diagnostic: RwLock<Option<String>>,
}

/// Range-scanning listener for one chain.
pub struct PullListener {
	shared: Arc<PullShared>,
	task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl PullListener {
	pub fn new(adapter: Arc<ChainAdapter>, ctx: ListenerContext) -> Self {
		let chain_id = adapter.config().chain_id;
		let (shutdown_tx, _) = watch::channel(false);
		Self {
			shared: Arc::new(PullShared {
				adapter,
				ctx,
				state: StateCell::new(format!("{} (pull)", chain_id)),
				cursor: Mutex::new(None),
				snapshot: RwLock::new(Arc::new(ContractSnapshot::new())),
				shutdown_tx,
				diagnostic: RwLock::new(None),
			}),
			task: Mutex::new(None),
		}
	}

	/// The highest fully-drained block, if a scan has run.
	pub async fn cursor(&self) -> Option<u64> {
		*self.shared.cursor.lock().await
	}

	/// Overrides the cursor. Used when switching strategies (cursor = head
	/// at switch) and by operators forcing a rescan.
	pub async fn set_cursor(&self, block_number: u64) {
		*self.shared.cursor.lock().await = Some(block_number);
	}

	pub async fn state(&self) -> ListenerState {
		self.shared.state.get().await
	}

	pub async fn diagnostic(&self) -> Option<String> {
		self.shared.diagnostic.read().await.clone()
	}

	pub async fn start(&self) -> Result<(), ListenerError> {
		match self.shared.state.get().await {
			ListenerState::Stopped | ListenerState::Failed => {}
			state => {
				warn!(
					"Pull listener for chain {} already {}, ignoring start",
					self.shared.adapter.config().chain_id,
					state
				);
				return Ok(());
			}
		}

		self.shared.state.set(ListenerState::Starting).await;
		let _ = self.shared.shutdown_tx.send(false);

		let snapshot = match load_contract_snapshot(
			&self.shared.ctx.contracts,
			self.shared.adapter.config().chain_id,
		)
		.await
		{
			Ok(snapshot) => snapshot,
			Err(e) => {
				self.shared.state.set(ListenerState::Stopped).await;
				return Err(ListenerError::start_error(format!(
					"Initial contract snapshot failed: {}",
					e
				)));
			}
		};
		*self.shared.snapshot.write().await = Arc::new(snapshot);

		let shared = self.shared.clone();
		let handle = tokio::spawn(async move { run_pull_loop(shared).await });
		*self.task.lock().await = Some(handle);

		self.shared.state.set(ListenerState::Running).await;
		Ok(())
	}

	pub async fn stop(&self) {
		if self.shared.state.get().await == ListenerState::Stopped {
			warn!(
				"Pull listener for chain {} already stopped, ignoring stop",
				self.shared.adapter.config().chain_id
			);
			return;
		}

		let _ = self.shared.shutdown_tx.send(true);
		if let Some(handle) = self.task.lock().await.take() {
			let grace = Duration::from_millis(self.shared.ctx.settings.shutdown_grace_ms);
			let abort = handle.abort_handle();
			if tokio::time::timeout(grace, handle).await.is_err() {
				warn!(
					"Pull listener for chain {} did not stop within grace period",
					self.shared.adapter.config().chain_id
				);
				abort.abort();
			}
		}
		self.shared.state.set(ListenerState::Stopped).await;
	}

	/// Runs a single scan tick inline. Exposed for the integration tests,
	/// which drive ticks deterministically instead of waiting on timers.
	pub async fn run_tick_once(&self) -> Result<(), AdapterError> {
		self.shared.run_tick().await
	}

	/// Reloads the contract snapshot inline; same best-effort semantics as
	/// the periodic refresh.
	pub async fn refresh_contracts_once(&self) {
		self.shared.refresh_snapshot().await;
	}
}

async fn run_pull_loop(shared: Arc<PullShared>) {
	let chain = shared.adapter.config().clone();
	let mut shutdown_rx = shared.shutdown_tx.subscribe();

	let tick_ms = scan_interval_ms(chain.scan_interval_ms, &shared.ctx.settings);
	let mut scan = interval(Duration::from_millis(tick_ms));
	scan.set_missed_tick_behavior(MissedTickBehavior::Delay);

	let mut refresh = interval(Duration::from_millis(
		shared.ctx.settings.contract_refresh_interval_ms,
	));
	refresh.set_missed_tick_behavior(MissedTickBehavior::Delay);
	refresh.tick().await; // the first tick is immediate; the snapshot is fresh

	let mut rate = interval(RATE_REPORT_INTERVAL);
	rate.set_missed_tick_behavior(MissedTickBehavior::Delay);
	rate.tick().await;

	loop {
		tokio::select! {
			_ = shutdown_rx.changed() => {
				if *shutdown_rx.borrow() {
					break;
				}
			}
			_ = scan.tick() => {
				if let Err(e) = shared.run_tick().await {
					warn!(
						"Chain {}: scan tick failed, window will be retried: {}",
						chain.chain_id, e
					);
				}
			}
			_ = refresh.tick() => {
				shared.refresh_snapshot().await;
			}
			_ = rate.tick() => {
				let calls = shared.adapter.take_request_count();
				info!("Chain {}: {} upstream calls in the last 10s", chain.chain_id, calls);
			}
		}
	}

	shared.state.set(ListenerState::Stopped).await;
}

impl PullShared {
	fn is_stopping(&self) -> bool {
		*self.shutdown_tx.borrow()
	}

	async fn refresh_snapshot(&self) {
		let chain_id = self.adapter.config().chain_id;
		match load_contract_snapshot(&self.ctx.contracts, chain_id).await {
			Ok(snapshot) => {
				*self.snapshot.write().await = Arc::new(snapshot);
			}
			Err(e) => {
				warn!(
					"Chain {}: contract refresh failed, retrying next tick: {}",
					chain_id, e
				);
			}
		}
	}

	/// One scan tick over `[cursor+1, min(head, cursor+blocks_per_scan)]`.
	async fn run_tick(&self) -> Result<(), AdapterError> {
		let chain_id = self.adapter.config().chain_id;
		let settings = &self.ctx.settings;

		let head = self.adapter.latest_block().await?;

		let cursor = {
			let mut cursor = self.cursor.lock().await;
			match *cursor {
				Some(value) => value,
				None => {
					// First tick: start from the current head, no backfill.
					*cursor = Some(head);
					info!("Chain {}: cursor initialized at head {}", chain_id, head);
					return Ok(());
				}
			}
		};

		if head <= cursor {
			return Ok(());
		}

		let from = cursor + 1;
		let to = head.min(from + settings.blocks_per_scan - 1);
		let snapshot = self.snapshot.read().await.clone();

		// Stage 1: gather logs, contract batches in parallel, serial between
		// batches.
		let contracts: Vec<Arc<CompiledContract>> = snapshot.values().cloned().collect();
		let mut gathered: Vec<(Arc<CompiledContract>, Log)> = Vec::new();
		for (index, batch) in contracts.chunks(settings.contract_batch_size.max(1)).enumerate() {
			if index > 0 {
				tokio::time::sleep(Duration::from_millis(settings.contract_batch_delay_ms)).await;
			}
			if self.is_stopping() {
				return Ok(());
			}
			let results = join_all(batch.iter().map(|c| self.scan_contract(c, from, to))).await;
			for (contract, result) in batch.iter().zip(results) {
				match result {
					Ok(logs) => {
						gathered.extend(logs.into_iter().map(|l| (contract.clone(), l)));
					}
					Err(e) => return Err(e),
				}
			}
		}

		// The ordering invariant downstream handlers rely on.
		gathered.sort_by_key(|(_, log)| {
			(
				log.block_number.map(|b| b.as_u64()).unwrap_or(0),
				log.log_index.map(|i| i.as_u64()).unwrap_or(0),
			)
		});

		// Stage 2: resolve timestamps for the distinct block set.
		let timestamps = self.resolve_timestamps(&gathered).await?;

		// Stage 3: decode, fetch receipts once per transaction, enqueue.
		let mut receipts: HashMap<String, Option<ReceiptInfo>> = HashMap::new();
		for (contract, log) in &gathered {
			if self.is_stopping() {
				return Ok(());
			}

			let tx_hash = log
				.transaction_hash
				.map(h256_to_string)
				.unwrap_or_else(|| "0x0".to_string());
			let receipt = match receipts.get(&tx_hash) {
				Some(cached) => *cached,
				None => {
					let fetched = match self.adapter.transaction_receipt(&tx_hash).await {
						Ok(receipt) => receipt,
						Err(e) if e.is_transport_down() => return Err(e),
						Err(e) => {
							warn!("Chain {}: receipt fetch failed for {}: {}", chain_id, tx_hash, e);
							None
						}
					};
					receipts.insert(tx_hash.clone(), fetched);
					fetched
				}
			};

			let decoded = match contract.registry.decode_log(log, &contract.config.metadata) {
				Ok(decoded) => decoded,
				// Warned at construction; drop the single log.
				Err(_) => continue,
			};

			let block_number = log.block_number.map(|b| b.as_u64()).unwrap_or(0);
			let timestamp_ms = timestamps.get(&block_number).copied().unwrap_or(0) as i64 * 1000;

			let event = build_event(chain_id, contract, &decoded, log, timestamp_ms, receipt);
			self.ctx.dispatcher.dispatch_event(event).await;
		}

		// The whole range is enqueued; the cursor may advance.
		*self.cursor.lock().await = Some(to);

		let touched: HashSet<String> = gathered
			.iter()
			.map(|(c, _)| c.config.normalized_address())
			.collect();
		for address in &touched {
			if let Some(contract) = snapshot.get(address) {
				self.advance_contract_progress(contract, to).await;
			}
		}

		info!(
			"Chain {}: scanned blocks {}..={} ({} logs, head {})",
			chain_id,
			from,
			to,
			gathered.len(),
			head
		);
		Ok(())
	}

	/// Queries one contract's monitored topics over the window, event
	/// batches in parallel, serial between batches. Per-topic failures skip
	/// that slice; a downed transport aborts the tick.
	async fn scan_contract(
		&self,
		contract: &Arc<CompiledContract>,
		from: u64,
		to: u64,
	) -> Result<Vec<Log>, AdapterError> {
		let settings = &self.ctx.settings;
		let address = contract.config.normalized_address();
		let topics: Vec<String> = contract
			.registry
			.monitored()
			.map(|c| h256_to_string(c.topic))
			.collect();

		let mut logs = Vec::new();
		for (index, batch) in topics.chunks(settings.event_batch_size.max(1)).enumerate() {
			if index > 0 {
				tokio::time::sleep(Duration::from_millis(settings.event_batch_delay_ms)).await;
			}
			let results = join_all(
				batch
					.iter()
					.map(|topic| self.adapter.get_logs(&address, topic, from, to)),
			)
			.await;
			for (topic, result) in batch.iter().zip(results) {
				match result {
					Ok(slice) => logs.extend(slice),
					Err(e) if e.is_transport_down() => return Err(e),
					Err(e) => {
						warn!(
							"Skipping slice {} topic {} blocks {}..={}: {}",
							address, topic, from, to, e
						);
					}
				}
			}
		}
		Ok(logs)
	}

	/// Resolves timestamps for the distinct blocks in the gathered set,
	/// batched with delays. Missing timestamps default to 0.
	async fn resolve_timestamps(
		&self,
		gathered: &[(Arc<CompiledContract>, Log)],
	) -> Result<HashMap<u64, u64>, AdapterError> {
		let settings = &self.ctx.settings;
		let mut blocks: Vec<u64> = gathered
			.iter()
			.filter_map(|(_, log)| log.block_number.map(|b| b.as_u64()))
			.collect::<HashSet<u64>>()
			.into_iter()
			.collect();
		blocks.sort_unstable();

		let mut timestamps = HashMap::new();
		for (index, batch) in blocks.chunks(settings.block_batch_size.max(1)).enumerate() {
			if index > 0 {
				tokio::time::sleep(Duration::from_millis(settings.block_batch_delay_ms)).await;
			}
			let results = join_all(batch.iter().map(|b| self.adapter.block_timestamp(*b))).await;
			for (block, result) in batch.iter().zip(results) {
				match result {
					Ok(Some(timestamp)) => {
						timestamps.insert(*block, timestamp);
					}
					Ok(None) => {
						debug!("No timestamp for block {}, defaulting to 0", block);
					}
					Err(e) if e.is_transport_down() => return Err(e),
					Err(e) => {
						warn!("Timestamp fetch failed for block {}: {}", block, e);
					}
				}
			}
		}
		Ok(timestamps)
	}

	/// Records that every block up to `to` has been drained for a contract
	/// that produced events this tick.
	async fn advance_contract_progress(&self, contract: &Arc<CompiledContract>, to: u64) {
		let chain_id = self.adapter.config().chain_id;
		let address = contract.config.normalized_address();

		let record = match self.ctx.contract_data.get(chain_id, &address).await {
			Ok(Some(mut record)) => {
				record.advance_last_processed_block(to);
				record.last_updated = chrono::Utc::now();
				record
			}
			Ok(None) => ContractData {
				chain_id,
				contract_address: address.clone(),
				contract_type: contract.config.contract_type.clone(),
				collection_key: ContractData::collection_key_for(
					&contract.config.contract_type,
					chain_id,
				),
				name: contract.config.name.clone(),
				symbol: contract.config.symbol.clone(),
				decimals: contract.config.metadata.decimals,
				total_supply: None,
				owner: None,
				is_active: true,
				last_updated: chrono::Utc::now(),
				first_seen_block: None,
				last_processed_block: Some(to),
				start_from_block: None,
				metadata: ContractDataMetadata::default(),
			},
			Err(e) => {
				warn!("Contract data lookup failed for {}: {}", address, e);
				return;
			}
		};

		if let Err(e) = self.ctx.contract_data.save(&record).await {
			warn!("Contract data save failed for {}: {}", address, e);
		}
	}
}

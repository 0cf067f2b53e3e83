//! Push listener: streaming log subscriptions.
//!
//! Opens one logical subscription per (contract, monitored event) over the
//! chain's streaming transport and reacts to log notifications as they
//! arrive. A periodic refresh diffs the enabled contract set, opening and
//! closing subscriptions as contracts come and go. When the transport
//! drops, every subscription is torn down and the listener reconnects with
//! exponential backoff; once the attempt budget is spent it stops and
//! surfaces `Exhausted` through its diagnostic.

use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::{
	sync::{mpsc, watch, Mutex, RwLock},
	time::{interval, MissedTickBehavior},
};
use tracing::{debug, info, warn};
use web3::types::Log;

use crate::{
	services::{
		blockchain::{ChainAdapter, StreamTransport},
		decoder::helpers::{h160_to_string, h256_to_string},
		listener::{
			build_event, load_contract_snapshot, CompiledContract, ContractSnapshot,
			ListenerContext, ListenerError, ListenerState, StateCell,
		},
	},
	utils::BackoffSchedule,
};

const RATE_REPORT_INTERVAL: Duration = Duration::from_secs(10);
const MERGED_CHANNEL_CAPACITY: usize = 4_096;
const TIMESTAMP_CACHE_LIMIT: usize = 256;

struct PushShared {
	adapter: Arc<ChainAdapter>,
	ctx: ListenerContext,
	state: StateCell,
	shutdown_tx: watch::Sender<bool>,
	diagnostic: RwLock<Option<String>>,
}

/// Streaming listener for one chain.
pub struct PushListener {
	shared: Arc<PushShared>,
	task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl PushListener {
	pub fn new(adapter: Arc<ChainAdapter>, ctx: ListenerContext) -> Self {
		let chain_id = adapter.config().chain_id;
		let (shutdown_tx, _) = watch::channel(false);
		Self {
			shared: Arc::new(PushShared {
				adapter,
				ctx,
				state: StateCell::new(format!("{} (push)", chain_id)),
				shutdown_tx,
				diagnostic: RwLock::new(None),
			}),
			task: Mutex::new(None),
		}
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
					"Push listener for chain {} already {}, ignoring start",
					self.shared.adapter.config().chain_id,
					state
				);
				return Ok(());
			}
		}

		// The adapter only mints push listeners when a streaming transport
		// exists (push without one degrades to pull); this guards direct
		// construction.
		if self.shared.adapter.stream().is_none() {
			return Err(ListenerError::start_error(format!(
				"Chain {} has no streaming transport",
				self.shared.adapter.config().chain_id
			)));
		}

		self.shared.state.set(ListenerState::Starting).await;
		let _ = self.shared.shutdown_tx.send(false);
		*self.shared.diagnostic.write().await = None;

		let shared = self.shared.clone();
		let handle = tokio::spawn(async move { run_push_loop(shared).await });
		*self.task.lock().await = Some(handle);
		Ok(())
	}

	pub async fn stop(&self) {
		if self.shared.state.get().await == ListenerState::Stopped {
			warn!(
				"Push listener for chain {} already stopped, ignoring stop",
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
					"Push listener for chain {} did not stop within grace period",
					self.shared.adapter.config().chain_id
				);
				abort.abort();
			}
		}
		self.shared.state.set(ListenerState::Stopped).await;
	}
}

/// Open subscriptions keyed by (address, topic), each with a forwarder task
/// funneling its stream into the merged channel.
struct SubscriptionSet {
	active: HashMap<(String, String), (String, tokio::task::JoinHandle<()>)>,
}

impl SubscriptionSet {
	fn new() -> Self {
		Self {
			active: HashMap::new(),
		}
	}

	async fn open_for_contract(
		&mut self,
		stream: &Arc<dyn StreamTransport>,
		contract: &Arc<CompiledContract>,
		merged_tx: &mpsc::Sender<Log>,
	) {
		let address = contract.config.normalized_address();
		for compiled in contract.registry.monitored() {
			let topic = h256_to_string(compiled.topic);
			let key = (address.clone(), topic.clone());
			if self.active.contains_key(&key) {
				continue;
			}
			match stream.subscribe_logs(&address, &topic).await {
				Ok(subscription) => {
					let tx = merged_tx.clone();
					let mut rx = subscription.rx;
					let forwarder = tokio::spawn(async move {
						while let Some(log) = rx.recv().await {
							if tx.send(log).await.is_err() {
								break;
							}
						}
					});
					debug!(
						"Subscribed {} event {} (subscription {})",
						address, compiled.event.name, subscription.id
					);
					self.active.insert(key, (subscription.id, forwarder));
				}
				Err(e) => {
					warn!(
						"Subscribe failed for {} event {}: {}",
						address, compiled.event.name, e
					);
				}
			}
		}
	}

	async fn close_for_contract(&mut self, stream: &Arc<dyn StreamTransport>, address: &str) {
		let keys: Vec<(String, String)> = self
			.active
			.keys()
			.filter(|(a, _)| a == address)
			.cloned()
			.collect();
		for key in keys {
			if let Some((id, forwarder)) = self.active.remove(&key) {
				let _ = stream.unsubscribe(&id).await;
				forwarder.abort();
			}
		}
	}

	async fn close_all(&mut self, stream: &Arc<dyn StreamTransport>) {
		for (_, (id, forwarder)) in self.active.drain() {
			let _ = stream.unsubscribe(&id).await;
			forwarder.abort();
		}
	}
}

async fn run_push_loop(shared: Arc<PushShared>) {
	let chain_id = shared.adapter.config().chain_id;
	let settings = shared.ctx.settings.clone();
	let mut shutdown_rx = shared.shutdown_tx.subscribe();

	let Some(stream) = shared.adapter.stream().cloned() else {
		*shared.diagnostic.write().await = Some("No streaming transport".to_string());
		shared.state.set(ListenerState::Failed).await;
		return;
	};

	let mut backoff = BackoffSchedule::for_reconnect(settings.max_reconnect_attempts);
	let mut timestamp_cache: HashMap<u64, u64> = HashMap::new();

	'reconnect: loop {
		if *shutdown_rx.borrow() {
			break;
		}

		if !stream.is_connected() {
			if let Err(e) = stream.connect().await {
				warn!(
					"Chain {}: stream connect failed (attempt {}): {}",
					chain_id,
					backoff.attempts() + 1,
					e
				);
				shared.state.set(ListenerState::Reconnecting).await;
				match backoff.next_delay() {
					Some(delay) => {
						tokio::select! {
							_ = tokio::time::sleep(delay) => continue 'reconnect,
							_ = shutdown_rx.changed() => break 'reconnect,
						}
					}
					None => {
						let message = format!(
							"Reconnect budget exhausted after {} attempts",
							settings.max_reconnect_attempts
						);
						warn!("Chain {}: {}", chain_id, message);
						*shared.diagnostic.write().await = Some(message);
						shared.state.set(ListenerState::Failed).await;
						return;
					}
				}
			}
		}

		// Snapshot and subscriptions for this connection epoch.
		let mut snapshot: ContractSnapshot =
			match load_contract_snapshot(&shared.ctx.contracts, chain_id).await {
				Ok(snapshot) => snapshot,
				Err(e) => {
					warn!(
						"Chain {}: snapshot load failed, starting empty: {}",
						chain_id, e
					);
					ContractSnapshot::new()
				}
			};

		let (merged_tx, mut merged_rx) = mpsc::channel::<Log>(MERGED_CHANNEL_CAPACITY);
		let mut subscriptions = SubscriptionSet::new();
		for contract in snapshot.values() {
			subscriptions
				.open_for_contract(&stream, contract, &merged_tx)
				.await;
		}

		shared.state.set(ListenerState::Running).await;
		backoff.reset();

		let mut disconnects = stream.disconnects();
		let mut refresh = interval(Duration::from_millis(settings.contract_refresh_interval_ms));
		refresh.set_missed_tick_behavior(MissedTickBehavior::Delay);
		refresh.tick().await; // immediate first tick; snapshot is fresh
		let mut rate = interval(RATE_REPORT_INTERVAL);
		rate.set_missed_tick_behavior(MissedTickBehavior::Delay);
		rate.tick().await;

		loop {
			tokio::select! {
				maybe_log = merged_rx.recv() => {
					if let Some(log) = maybe_log {
						shared.handle_log(&snapshot, log, &mut timestamp_cache).await;
					}
				}
				_ = disconnects.recv() => {
					warn!("Chain {}: stream disconnected", chain_id);
					break;
				}
				_ = refresh.tick() => {
					refresh_subscriptions(
						&shared,
						&stream,
						&mut snapshot,
						&mut subscriptions,
						&merged_tx,
					)
					.await;
				}
				_ = rate.tick() => {
					let calls = shared.adapter.take_request_count();
					info!("Chain {}: {} upstream calls in the last 10s", chain_id, calls);
				}
				_ = shutdown_rx.changed() => {
					if *shutdown_rx.borrow() {
						subscriptions.close_all(&stream).await;
						shared.state.set(ListenerState::Stopped).await;
						return;
					}
				}
			}
		}

		// Transport dropped: tear down, back off, reconnect.
		shared.state.set(ListenerState::Reconnecting).await;
		subscriptions.close_all(&stream).await;
		match backoff.next_delay() {
			Some(delay) => {
				info!(
					"Chain {}: reconnecting in {:?} (attempt {})",
					chain_id,
					delay,
					backoff.attempts()
				);
				tokio::select! {
					_ = tokio::time::sleep(delay) => {}
					_ = shutdown_rx.changed() => break 'reconnect,
				}
			}
			None => {
				let message = format!(
					"Reconnect budget exhausted after {} attempts",
					settings.max_reconnect_attempts
				);
				warn!("Chain {}: {}", chain_id, message);
				*shared.diagnostic.write().await = Some(message);
				shared.state.set(ListenerState::Failed).await;
				return;
			}
		}
	}

	shared.state.set(ListenerState::Stopped).await;
}

async fn refresh_subscriptions(
	shared: &Arc<PushShared>,
	stream: &Arc<dyn StreamTransport>,
	snapshot: &mut ContractSnapshot,
	subscriptions: &mut SubscriptionSet,
	merged_tx: &mpsc::Sender<Log>,
) {
	let chain_id = shared.adapter.config().chain_id;
	let fresh = match load_contract_snapshot(&shared.ctx.contracts, chain_id).await {
		Ok(fresh) => fresh,
		Err(e) => {
			// Best-effort: keep the old snapshot, retry next tick.
			warn!("Chain {}: contract refresh failed: {}", chain_id, e);
			return;
		}
	};

	let removed: Vec<String> = snapshot
		.keys()
		.filter(|address| !fresh.contains_key(*address))
		.cloned()
		.collect();
	for address in removed {
		info!("Chain {}: contract {} disabled, closing subscriptions", chain_id, address);
		subscriptions.close_for_contract(stream, &address).await;
	}

	for (address, contract) in &fresh {
		if !snapshot.contains_key(address) {
			info!("Chain {}: contract {} enabled, opening subscriptions", chain_id, address);
			subscriptions
				.open_for_contract(stream, contract, merged_tx)
				.await;
		}
	}

	*snapshot = fresh;
}

impl PushShared {
	async fn handle_log(
		&self,
		snapshot: &ContractSnapshot,
		log: Log,
		timestamp_cache: &mut HashMap<u64, u64>,
	) {
		let chain_id = self.adapter.config().chain_id;
		let address = h160_to_string(log.address);

		let Some(contract) = snapshot.get(&address) else {
			debug!("Chain {}: log from unconfigured contract {}, dropping", chain_id, address);
			return;
		};

		let decoded = match contract.registry.decode_log(&log, &contract.config.metadata) {
			Ok(decoded) => decoded,
			// Warned at construction; drop the single log.
			Err(_) => return,
		};

		let block_number = log.block_number.map(|b| b.as_u64()).unwrap_or(0);
		let timestamp = match timestamp_cache.get(&block_number) {
			Some(cached) => *cached,
			None => {
				let fetched = match self.adapter.block_timestamp(block_number).await {
					Ok(Some(timestamp)) => timestamp,
					Ok(None) => 0,
					Err(e) => {
						warn!(
							"Chain {}: timestamp fetch failed for block {}: {}",
							chain_id, block_number, e
						);
						0
					}
				};
				if timestamp_cache.len() >= TIMESTAMP_CACHE_LIMIT {
					timestamp_cache.clear();
				}
				timestamp_cache.insert(block_number, fetched);
				fetched
			}
		};

		let event = build_event(
			chain_id,
			contract,
			&decoded,
			&log,
			timestamp as i64 * 1000,
			None,
		);
		self.ctx.dispatcher.dispatch_event(event).await;
	}
}

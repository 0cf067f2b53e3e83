//! Supervisor: lifecycle owner of the listener pool.
//!
//! Builds an adapter and a listener for every enabled chain, restarts and
//! strategy-switches individual chains on operator request, periodically
//! reconciles the running set against the configuration store, and exposes
//! the status snapshot the operator API serves. Chain configurations are
//! treated as immutable snapshots: a strategy switch swaps the whole
//! `Arc<ChainConfig>` rather than mutating shared state.

mod error;

pub use error::SupervisorError;

use serde::Serialize;
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::sync::{watch, RwLock};
use tracing::{error, info, warn};

use crate::{
	models::{ChainConfig, IngestStrategy},
	repositories::ChainConfigRepositoryTrait,
	services::{
		blockchain::ChainAdapter,
		listener::{ChainListener, ListenerContext, ListenerState},
	},
};

struct ChainRuntime {
	config: Arc<ChainConfig>,
	adapter: Arc<ChainAdapter>,
	listener: ChainListener,
}

/// Per-chain slice of the status snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct ChainStatusSnapshot {
	pub chain_id: i64,
	pub name: String,
	pub strategy: String,
	pub state: ListenerState,
	pub is_running: bool,
	pub latest_block: Option<u64>,
	pub diagnostic: Option<String>,
}

/// Status snapshot served by the operator API.
#[derive(Debug, Clone, Serialize)]
pub struct SupervisorStatus {
	pub enabled_chains: usize,
	pub chains: Vec<ChainStatusSnapshot>,
	pub queue_size: usize,
	pub handler_count: usize,
	pub dropped_events: u64,
}

pub struct Supervisor {
	chains: RwLock<HashMap<i64, ChainRuntime>>,
	chain_repo: Arc<dyn ChainConfigRepositoryTrait>,
	ctx: ListenerContext,
	shutdown_tx: watch::Sender<bool>,
}

impl Supervisor {
	pub fn new(chain_repo: Arc<dyn ChainConfigRepositoryTrait>, ctx: ListenerContext) -> Arc<Self> {
		let (shutdown_tx, _) = watch::channel(false);
		Arc::new(Self {
			chains: RwLock::new(HashMap::new()),
			chain_repo,
			ctx,
			shutdown_tx,
		})
	}

	/// Starts listeners for every enabled chain. Per-chain failures are
	/// isolated: one chain failing to start never blocks the others.
	pub async fn start_all(&self) -> Result<usize, SupervisorError> {
		let enabled = self
			.chain_repo
			.get_enabled()
			.await
			.map_err(|e| SupervisorError::config_error(e.to_string()))?;

		let mut started = 0;
		for config in enabled {
			let chain_id = config.chain_id;
			match self.start_chain(config).await {
				Ok(()) => started += 1,
				Err(e) => error!("Chain {} failed to start: {}", chain_id, e),
			}
		}
		info!("Supervisor started {} chain listener(s)", started);
		Ok(started)
	}

	/// Builds the adapter, verifies the connection, and starts a listener
	/// for one chain.
	pub async fn start_chain(&self, config: ChainConfig) -> Result<(), SupervisorError> {
		{
			let chains = self.chains.read().await;
			if chains.contains_key(&config.chain_id) {
				warn!("Chain {} already running, ignoring start", config.chain_id);
				return Ok(());
			}
		}

		config
			.validate()
			.map_err(|e| SupervisorError::config_error(e.to_string()))?;

		let config = Arc::new(config);
		let timeout = Duration::from_millis(self.ctx.settings.rpc_timeout_ms);
		let adapter = Arc::new(ChainAdapter::new(config.clone(), timeout)?);

		// A chain id mismatch is fatal for this chain: no listener, no retry.
		adapter.connect().await?;

		// Push/hybrid without a streaming endpoint degrade to pull.
		let listener = adapter.make_listener(config.effective_strategy(), self.ctx.clone())?;
		listener.start().await?;

		info!(
			"Chain {} ({}) listening via {}",
			config.name,
			config.chain_id,
			listener.strategy()
		);
		self.chains.write().await.insert(
			config.chain_id,
			ChainRuntime {
				config,
				adapter,
				listener,
			},
		);
		Ok(())
	}

	/// Starts a chain from an already-built runtime (tests and pooling).
	pub async fn adopt_chain(
		&self,
		config: Arc<ChainConfig>,
		adapter: Arc<ChainAdapter>,
	) -> Result<(), SupervisorError> {
		let listener = adapter.make_listener(config.effective_strategy(), self.ctx.clone())?;
		listener.start().await?;
		self.chains.write().await.insert(
			config.chain_id,
			ChainRuntime {
				config,
				adapter,
				listener,
			},
		);
		Ok(())
	}

	/// Stops one chain's listener and disconnects its adapter.
	pub async fn stop_chain(&self, chain_id: i64) -> Result<(), SupervisorError> {
		let runtime = self
			.chains
			.write()
			.await
			.remove(&chain_id)
			.ok_or_else(|| SupervisorError::chain_not_found(chain_id))?;

		runtime.listener.stop().await;
		if let Err(e) = runtime.adapter.disconnect().await {
			warn!("Chain {}: disconnect failed: {}", chain_id, e);
		}
		info!("Chain {} stopped", chain_id);
		Ok(())
	}

	/// Stops every chain. Per-component errors are logged, never blocking.
	pub async fn stop_all(&self) {
		let ids: Vec<i64> = self.chains.read().await.keys().copied().collect();
		for chain_id in ids {
			if let Err(e) = self.stop_chain(chain_id).await {
				warn!("Chain {}: stop failed: {}", chain_id, e);
			}
		}
	}

	/// Restarts one chain's listener, re-reading its configuration from the
	/// store so config edits take effect.
	pub async fn restart_listener(&self, chain_id: i64) -> Result<(), SupervisorError> {
		let stored = self
			.chain_repo
			.get(chain_id)
			.await
			.map_err(|e| SupervisorError::config_error(e.to_string()))?;

		let current = {
			let chains = self.chains.read().await;
			chains.get(&chain_id).map(|r| (*r.config).clone())
		};

		let config = stored
			.or(current)
			.ok_or_else(|| SupervisorError::chain_not_found(chain_id))?;

		let _ = self.stop_chain(chain_id).await;
		self.start_chain(config).await
	}

	/// Switches a chain's ingestion strategy: stop the current listener,
	/// swap an immutable config snapshot with the new strategy, start the
	/// replacement. A pull listener created here initializes its cursor at
	/// the head seen on its first tick, so nothing before the switch point
	/// is rescanned.
	pub async fn switch_strategy(
		&self,
		chain_id: i64,
		strategy: IngestStrategy,
	) -> Result<(), SupervisorError> {
		let runtime = self
			.chains
			.write()
			.await
			.remove(&chain_id)
			.ok_or_else(|| SupervisorError::chain_not_found(chain_id))?;

		runtime.listener.stop().await;

		let mut swapped = (*runtime.config).clone();
		swapped.strategy = strategy;
		let swapped = Arc::new(swapped);

		// The swapped snapshot keeps the chain's endpoints, so push without
		// a stream URL degrades to pull here too.
		let listener = match runtime
			.adapter
			.make_listener(swapped.effective_strategy(), self.ctx.clone())
		{
			Ok(listener) => listener,
			Err(e) => {
				// Keep the chain registered with its stopped listener so a
				// restart can recover it.
				self.chains.write().await.insert(chain_id, runtime);
				return Err(e.into());
			}
		};

		// A pull listener taking over starts at the head seen right now, so
		// the switchover window is neither rescanned nor skipped.
		if let ChainListener::Pull(pull) = &listener {
			match runtime.adapter.latest_block().await {
				Ok(head) => pull.set_cursor(head).await,
				Err(e) => warn!(
					"Chain {}: head fetch at switch failed, cursor set on first tick: {}",
					chain_id, e
				),
			}
		}

		listener.start().await?;

		info!(
			"Chain {} switched to {} (active: {})",
			chain_id,
			strategy,
			listener.strategy()
		);
		self.chains.write().await.insert(
			chain_id,
			ChainRuntime {
				config: swapped,
				adapter: runtime.adapter,
				listener,
			},
		);
		Ok(())
	}

	/// Whole-pool status snapshot.
	pub async fn status(&self) -> SupervisorStatus {
		let enabled_chains = self
			.chain_repo
			.get_enabled()
			.await
			.map(|chains| chains.len())
			.unwrap_or(0);

		let mut snapshots = Vec::new();
		{
			let chains = self.chains.read().await;
			for runtime in chains.values() {
				snapshots.push(chain_snapshot(runtime, None).await);
			}
		}
		snapshots.sort_by_key(|s| s.chain_id);

		SupervisorStatus {
			enabled_chains,
			chains: snapshots,
			queue_size: self.ctx.dispatcher.queue_size().await,
			handler_count: self.ctx.dispatcher.handler_count().await,
			dropped_events: self.ctx.dispatcher.dropped_count(),
		}
	}

	/// Per-chain status including the head block, fetched live.
	pub async fn chain_status(&self, chain_id: i64) -> Result<ChainStatusSnapshot, SupervisorError> {
		let chains = self.chains.read().await;
		let runtime = chains
			.get(&chain_id)
			.ok_or_else(|| SupervisorError::chain_not_found(chain_id))?;

		let latest_block = runtime.adapter.latest_block().await.ok();
		Ok(chain_snapshot(runtime, latest_block).await)
	}

	/// Spawns the periodic reload loop reconciling the running set against
	/// the configuration store.
	pub fn spawn_reload_loop(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
		let supervisor = self.clone();
		let mut shutdown_rx = self.shutdown_tx.subscribe();
		let period = Duration::from_millis(supervisor.ctx.settings.chain_reload_interval_ms);

		tokio::spawn(async move {
			let mut tick = tokio::time::interval(period);
			tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
			tick.tick().await; // skip the immediate first tick; start_all just ran
			loop {
				tokio::select! {
					_ = tick.tick() => supervisor.reconcile_chains().await,
					_ = shutdown_rx.changed() => {
						if *shutdown_rx.borrow() {
							break;
						}
					}
				}
			}
		})
	}

	/// One reconcile pass: start newly-enabled chains, stop disabled ones.
	/// Failures are logged and retried on the next pass.
	pub async fn reconcile_chains(&self) {
		let enabled = match self.chain_repo.get_enabled().await {
			Ok(enabled) => enabled,
			Err(e) => {
				warn!("Chain reload failed, retrying next tick: {}", e);
				return;
			}
		};

		let enabled_ids: std::collections::HashSet<i64> =
			enabled.iter().map(|c| c.chain_id).collect();
		let running_ids: Vec<i64> = self.chains.read().await.keys().copied().collect();

		for chain_id in &running_ids {
			if !enabled_ids.contains(chain_id) {
				info!("Chain {} disabled in config, stopping", chain_id);
				if let Err(e) = self.stop_chain(*chain_id).await {
					warn!("Chain {}: stop during reload failed: {}", chain_id, e);
				}
			}
		}

		for config in enabled {
			if !running_ids.contains(&config.chain_id) {
				let chain_id = config.chain_id;
				info!("Chain {} enabled in config, starting", chain_id);
				if let Err(e) = self.start_chain(config).await {
					warn!("Chain {}: start during reload failed: {}", chain_id, e);
				}
			}
		}
	}

	/// Orderly shutdown: stop the reload loop, stop all listeners, then
	/// disconnect adapters. Past the grace period remaining work is
	/// abandoned.
	pub async fn shutdown(&self) {
		let _ = self.shutdown_tx.send(true);
		let grace = Duration::from_millis(self.ctx.settings.shutdown_grace_ms);
		if tokio::time::timeout(grace, self.stop_all()).await.is_err() {
			warn!("Shutdown grace period elapsed; abandoning remaining listeners");
		}
		self.ctx.dispatcher.shutdown();
	}
}

async fn chain_snapshot(runtime: &ChainRuntime, latest_block: Option<u64>) -> ChainStatusSnapshot {
	let state = runtime.listener.state().await;
	ChainStatusSnapshot {
		chain_id: runtime.config.chain_id,
		name: runtime.config.name.clone(),
		strategy: runtime.listener.strategy().to_string(),
		state,
		is_running: matches!(
			state,
			ListenerState::Running | ListenerState::Starting | ListenerState::Reconnecting
		),
		latest_block,
		diagnostic: runtime.listener.diagnostic().await,
	}
}

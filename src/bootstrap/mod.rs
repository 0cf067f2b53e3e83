//! Bootstrap: explicit wiring of stores, repositories, dispatcher, handlers
//! and the supervisor.
//!
//! With `DATABASE_URL` set the Postgres stores are used and migrations run
//! at startup; otherwise everything falls back to the in-memory stores,
//! which is useful for local development and tests but persists nothing.
//! When the chain collection is empty, default chain rows are seeded from
//! the per-chain `*_RPC_URL` / `*_WS_URL` environment variables.

use std::{error::Error, sync::Arc};
use tracing::{info, warn};

use crate::{
	models::{ChainConfig, ChainType, IndexerSettings, IngestStrategy, NativeCurrency},
	repositories::{
		ChainConfigRepositoryTrait, ContractConfigRepositoryTrait, InMemoryChainConfigRepository,
		InMemoryContractConfigRepository, PostgresChainConfigRepository,
		PostgresContractConfigRepository,
	},
	services::{
		dispatcher::EventDispatcher, handlers::TransferHandler, listener::ListenerContext,
		supervisor::Supervisor,
	},
	storage::{
		create_pool, run_migrations, ContractDataStore, EventStore, InMemoryContractDataStore,
		InMemoryEventStore, PostgresContractDataStore, PostgresEventStore,
	},
};

/// Everything main (and the operator API) needs after initialization.
pub struct Services {
	pub supervisor: Arc<Supervisor>,
	pub dispatcher: Arc<EventDispatcher>,
	pub chains: Arc<dyn ChainConfigRepositoryTrait>,
	pub contracts: Arc<dyn ContractConfigRepositoryTrait>,
	pub events: Arc<dyn EventStore>,
}

struct Stores {
	chains: Arc<dyn ChainConfigRepositoryTrait>,
	contracts: Arc<dyn ContractConfigRepositoryTrait>,
	events: Arc<dyn EventStore>,
	contract_data: Arc<dyn ContractDataStore>,
}

async fn build_stores() -> Result<Stores, Box<dyn Error + Send + Sync>> {
	match std::env::var("DATABASE_URL") {
		Ok(url) => {
			let pool = create_pool(&url, 10).await?;
			run_migrations(&pool).await?;
			info!("Connected to configuration and event store");
			Ok(Stores {
				chains: Arc::new(PostgresChainConfigRepository::new(pool.clone())),
				contracts: Arc::new(PostgresContractConfigRepository::new(pool.clone())),
				events: Arc::new(PostgresEventStore::new(pool.clone())),
				contract_data: Arc::new(PostgresContractDataStore::new(pool)),
			})
		}
		Err(_) => {
			warn!("DATABASE_URL not set; using in-memory stores (nothing persists)");
			Ok(Stores {
				chains: Arc::new(InMemoryChainConfigRepository::new()),
				contracts: Arc::new(InMemoryContractConfigRepository::new()),
				events: Arc::new(InMemoryEventStore::new()),
				contract_data: Arc::new(InMemoryContractDataStore::new()),
			})
		}
	}
}

/// Known chains that can be seeded from environment endpoints.
const SEEDABLE_CHAINS: &[(&str, i64, &str, &str, u8)] = &[
	("Ethereum", 1, "ETHEREUM", "ETH", 18),
	("BNB Smart Chain", 56, "BSC", "BNB", 18),
	("Polygon", 137, "POLYGON", "POL", 18),
	("Arbitrum One", 42161, "ARBITRUM", "ETH", 18),
	("Base", 8453, "BASE", "ETH", 18),
];

/// Seeds default chain rows when the collection is empty. Only chains with
/// a `{PREFIX}_RPC_URL` in the environment are created; a `{PREFIX}_WS_URL`
/// upgrades the strategy to hybrid.
async fn seed_default_chains(
	chains: &Arc<dyn ChainConfigRepositoryTrait>,
) -> Result<(), Box<dyn Error + Send + Sync>> {
	if !chains.get_all().await?.is_empty() {
		return Ok(());
	}

	for (name, chain_id, prefix, symbol, decimals) in SEEDABLE_CHAINS {
		let Ok(rpc_url) = std::env::var(format!("{}_RPC_URL", prefix)) else {
			continue;
		};
		let stream_url = std::env::var(format!("{}_WS_URL", prefix)).ok();
		let strategy = if stream_url.is_some() {
			IngestStrategy::Hybrid
		} else {
			IngestStrategy::Pull
		};

		let config = ChainConfig {
			chain_id: *chain_id,
			name: (*name).to_string(),
			chain_type: ChainType::Evm,
			rpc_url,
			stream_url,
			strategy,
			scan_interval_ms: 5_000,
			enabled: true,
			native_currency: NativeCurrency {
				name: (*name).to_string(),
				symbol: (*symbol).to_string(),
				decimals: *decimals,
			},
			metadata: serde_json::Value::Null,
		};
		chains.upsert(&config).await?;
		info!("Seeded default config for chain {} ({})", name, chain_id);
	}
	Ok(())
}

/// Initializes stores, the dispatcher with its handlers, and the supervisor.
pub async fn initialize_services(
	settings: IndexerSettings,
) -> Result<Services, Box<dyn Error + Send + Sync>> {
	let stores = build_stores().await?;
	seed_default_chains(&stores.chains).await?;

	let dispatcher = EventDispatcher::new(settings.queue_capacity);
	dispatcher
		.register_handler(Arc::new(TransferHandler::new(
			stores.contracts.clone(),
			stores.events.clone(),
			stores.contract_data.clone(),
		)))
		.await;

	let ctx = ListenerContext {
		dispatcher: dispatcher.clone(),
		contracts: stores.contracts.clone(),
		contract_data: stores.contract_data.clone(),
		settings,
	};
	let supervisor = Supervisor::new(stores.chains.clone(), ctx);

	Ok(Services {
		supervisor,
		dispatcher,
		chains: stores.chains,
		contracts: stores.contracts,
		events: stores.events,
	})
}

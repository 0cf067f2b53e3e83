//! Shared test fixtures: programmable mock transports, in-memory stores and
//! document builders driving the ingestion pipeline without a network.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::{
	collections::HashMap,
	sync::{
		atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
		Arc, Mutex as StdMutex,
	},
	time::Duration,
};
use tokio::sync::{broadcast, mpsc, Mutex};
use web3::types::{Log, U256};

use chainfeed::{
	models::{
		ChainConfig, ChainType, ContractConfig, ContractMetadata, IndexerSettings,
		IngestStrategy, NativeCurrency,
	},
	repositories::InMemoryContractConfigRepository,
	services::{
		blockchain::{
			ChainAdapter, EvmRpcTransport, LogSubscription, StreamTransport, TransportError,
		},
		decoder::{helpers::h256_to_string, TRANSFER_TOPIC},
		dispatcher::{EventDispatcher, EventHandler},
		handlers::TransferHandler,
		listener::ListenerContext,
	},
	storage::{InMemoryContractDataStore, InMemoryEventStore},
	BlockchainEvent,
};

pub fn transfer_topic() -> String {
	h256_to_string(*TRANSFER_TOPIC)
}

/// A 20-byte address from a small integer, `0x0000..00NN`.
pub fn addr(n: u64) -> String {
	format!("0x{:040x}", n)
}

/// A 32-byte transaction hash from a small integer.
pub fn tx_hash(n: u64) -> String {
	format!("0x{:064x}", n)
}

fn pad_topic(address: &str) -> String {
	let stripped = address.strip_prefix("0x").unwrap_or(address);
	format!("0x{:0>64}", stripped)
}

/// Builds the JSON document upstream would return for one Transfer log.
pub fn transfer_log_json(
	contract_address: &str,
	block: u64,
	log_index: u64,
	tx: &str,
	from: &str,
	to: &str,
	value: U256,
) -> Value {
	let mut data = [0u8; 32];
	value.to_big_endian(&mut data);
	json!({
		"address": contract_address,
		"topics": [transfer_topic(), pad_topic(from), pad_topic(to)],
		"data": format!("0x{}", hex::encode(data)),
		"blockNumber": format!("0x{:x}", block),
		"blockHash": format!("0x{:064x}", block),
		"transactionHash": tx,
		"transactionIndex": "0x0",
		"logIndex": format!("0x{:x}", log_index),
		"removed": false,
	})
}

pub fn parse_log(doc: &Value) -> Log {
	serde_json::from_value(doc.clone()).expect("test log document must parse")
}

/// Deterministic block timestamp used by the mock RPC.
pub fn mock_timestamp(block: u64) -> u64 {
	1_600_000_000 + block
}

/// Programmable JSON-RPC transport.
pub struct MockRpc {
	chain_id: i64,
	head: AtomicU64,
	logs: StdMutex<Vec<Value>>,
	receipts: StdMutex<HashMap<String, Value>>,
	pub receipt_fetches: AtomicUsize,
	/// method -> true when the failure should look like a downed transport.
	fail_methods: StdMutex<HashMap<String, bool>>,
	request_count: AtomicU64,
}

impl MockRpc {
	pub fn new(chain_id: i64, head: u64) -> Arc<Self> {
		Arc::new(Self {
			chain_id,
			head: AtomicU64::new(head),
			logs: StdMutex::new(Vec::new()),
			receipts: StdMutex::new(HashMap::new()),
			receipt_fetches: AtomicUsize::new(0),
			fail_methods: StdMutex::new(HashMap::new()),
			request_count: AtomicU64::new(0),
		})
	}

	pub fn set_head(&self, head: u64) {
		self.head.store(head, Ordering::SeqCst);
	}

	pub fn push_log(&self, log: Value) {
		self.logs.lock().unwrap().push(log);
	}

	/// Makes a method answer with a connection error until cleared.
	pub fn fail_method(&self, method: &str) {
		self.fail_methods
			.lock()
			.unwrap()
			.insert(method.to_string(), true);
	}

	/// Makes a method answer with a retryable request error until cleared.
	pub fn fail_method_transient(&self, method: &str) {
		self.fail_methods
			.lock()
			.unwrap()
			.insert(method.to_string(), false);
	}

	pub fn clear_failures(&self) {
		self.fail_methods.lock().unwrap().clear();
	}
}

#[async_trait]
impl EvmRpcTransport for MockRpc {
	async fn send_raw_request(
		&self,
		method: &str,
		params: Option<Value>,
	) -> Result<Value, TransportError> {
		self.request_count.fetch_add(1, Ordering::Relaxed);

		if let Some(as_connection) = self.fail_methods.lock().unwrap().get(method) {
			return Err(if *as_connection {
				TransportError::connection(format!("{} unavailable", method))
			} else {
				TransportError::request(format!("{} flaking", method))
			});
		}

		match method {
			"eth_chainId" => Ok(json!({ "result": format!("0x{:x}", self.chain_id) })),
			"eth_blockNumber" => Ok(json!({
				"result": format!("0x{:x}", self.head.load(Ordering::SeqCst))
			})),
			"eth_getBlockByNumber" => {
				let block = params
					.as_ref()
					.and_then(|p| p.get(0))
					.and_then(|b| b.as_str())
					.and_then(|hex| u64::from_str_radix(hex.trim_start_matches("0x"), 16).ok())
					.unwrap_or(0);
				Ok(json!({
					"result": { "timestamp": format!("0x{:x}", mock_timestamp(block)) }
				}))
			}
			"eth_getLogs" => {
				let filter = params
					.as_ref()
					.and_then(|p| p.get(0))
					.cloned()
					.unwrap_or(Value::Null);
				let address = filter.get("address").and_then(|a| a.as_str()).unwrap_or("");
				let topic = filter
					.get("topics")
					.and_then(|t| t.get(0))
					.and_then(|t| t.as_str())
					.unwrap_or("");
				let from = filter
					.get("fromBlock")
					.and_then(|b| b.as_str())
					.and_then(|hex| u64::from_str_radix(hex.trim_start_matches("0x"), 16).ok())
					.unwrap_or(0);
				let to = filter
					.get("toBlock")
					.and_then(|b| b.as_str())
					.and_then(|hex| u64::from_str_radix(hex.trim_start_matches("0x"), 16).ok())
					.unwrap_or(u64::MAX);

				let matching: Vec<Value> = self
					.logs
					.lock()
					.unwrap()
					.iter()
					.filter(|log| {
						let log_address =
							log.get("address").and_then(|a| a.as_str()).unwrap_or("");
						let log_topic = log
							.get("topics")
							.and_then(|t| t.get(0))
							.and_then(|t| t.as_str())
							.unwrap_or("");
						let block = log
							.get("blockNumber")
							.and_then(|b| b.as_str())
							.and_then(|hex| {
								u64::from_str_radix(hex.trim_start_matches("0x"), 16).ok()
							})
							.unwrap_or(0);
						log_address.eq_ignore_ascii_case(address)
							&& log_topic.eq_ignore_ascii_case(topic)
							&& block >= from && block <= to
					})
					.cloned()
					.collect();
				Ok(json!({ "result": matching }))
			}
			"eth_getTransactionReceipt" => {
				self.receipt_fetches.fetch_add(1, Ordering::SeqCst);
				let tx = params
					.as_ref()
					.and_then(|p| p.get(0))
					.and_then(|t| t.as_str())
					.unwrap_or("");
				let receipt = self
					.receipts
					.lock()
					.unwrap()
					.get(tx)
					.cloned()
					.unwrap_or_else(|| json!({ "gasUsed": "0x5208", "status": "0x1" }));
				Ok(json!({ "result": receipt }))
			}
			other => Err(TransportError::request(format!("Unhandled method {}", other))),
		}
	}

	fn take_request_count(&self) -> u64 {
		self.request_count.swap(0, Ordering::Relaxed)
	}
}

/// Programmable streaming transport.
pub struct MockStream {
	connected: AtomicBool,
	/// Connect attempts to fail before succeeding.
	fail_connects: AtomicUsize,
	pub connect_attempts: AtomicUsize,
	subs: Mutex<HashMap<(String, String), mpsc::Sender<Log>>>,
	ids: Mutex<HashMap<String, (String, String)>>,
	next_id: AtomicUsize,
	disconnect_tx: broadcast::Sender<()>,
}

impl MockStream {
	pub fn new() -> Arc<Self> {
		let (disconnect_tx, _) = broadcast::channel(8);
		Arc::new(Self {
			connected: AtomicBool::new(false),
			fail_connects: AtomicUsize::new(0),
			connect_attempts: AtomicUsize::new(0),
			subs: Mutex::new(HashMap::new()),
			ids: Mutex::new(HashMap::new()),
			next_id: AtomicUsize::new(1),
			disconnect_tx,
		})
	}

	/// Arranges for the next `n` connect calls to fail.
	pub fn fail_next_connects(&self, n: usize) {
		self.fail_connects.store(n, Ordering::SeqCst);
	}

	/// Delivers a log to the matching (address, topic-0) subscription.
	pub async fn emit_log(&self, log: Log) -> bool {
		let address = format!("0x{}", hex::encode(log.address.as_bytes()));
		let topic = log
			.topics
			.first()
			.map(|t| h256_to_string(*t))
			.unwrap_or_default();
		let subs = self.subs.lock().await;
		match subs.get(&(address, topic)) {
			Some(tx) => tx.send(log).await.is_ok(),
			None => false,
		}
	}

	/// Simulates the connection dropping: subscriptions end and the
	/// disconnect broadcast fires.
	pub async fn break_connection(&self) {
		self.connected.store(false, Ordering::SeqCst);
		self.subs.lock().await.clear();
		self.ids.lock().await.clear();
		let _ = self.disconnect_tx.send(());
	}

	pub async fn subscription_count(&self) -> usize {
		self.subs.lock().await.len()
	}

	pub async fn has_subscription(&self, address: &str, topic: &str) -> bool {
		self.subs
			.lock()
			.await
			.contains_key(&(address.to_string(), topic.to_string()))
	}
}

#[async_trait]
impl StreamTransport for MockStream {
	async fn connect(&self) -> Result<(), TransportError> {
		self.connect_attempts.fetch_add(1, Ordering::SeqCst);
		let remaining = self.fail_connects.load(Ordering::SeqCst);
		if remaining > 0 {
			self.fail_connects.store(remaining - 1, Ordering::SeqCst);
			return Err(TransportError::connection("mock connect failure"));
		}
		self.connected.store(true, Ordering::SeqCst);
		Ok(())
	}

	async fn disconnect(&self) -> Result<(), TransportError> {
		self.connected.store(false, Ordering::SeqCst);
		self.subs.lock().await.clear();
		self.ids.lock().await.clear();
		Ok(())
	}

	fn is_connected(&self) -> bool {
		self.connected.load(Ordering::SeqCst)
	}

	async fn subscribe_logs(
		&self,
		address: &str,
		topic0: &str,
	) -> Result<LogSubscription, TransportError> {
		if !self.is_connected() {
			return Err(TransportError::connection("not connected"));
		}
		let id = format!("0xsub{}", self.next_id.fetch_add(1, Ordering::SeqCst));
		let (tx, rx) = mpsc::channel(64);
		self.subs
			.lock()
			.await
			.insert((address.to_string(), topic0.to_string()), tx);
		self.ids
			.lock()
			.await
			.insert(id.clone(), (address.to_string(), topic0.to_string()));
		Ok(LogSubscription { id, rx })
	}

	async fn unsubscribe(&self, subscription_id: &str) -> Result<(), TransportError> {
		if let Some(key) = self.ids.lock().await.remove(subscription_id) {
			self.subs.lock().await.remove(&key);
		}
		Ok(())
	}

	fn disconnects(&self) -> broadcast::Receiver<()> {
		self.disconnect_tx.subscribe()
	}
}

pub fn chain_config(chain_id: i64, strategy: IngestStrategy, with_stream: bool) -> ChainConfig {
	ChainConfig {
		chain_id,
		name: format!("testnet-{}", chain_id),
		chain_type: ChainType::Evm,
		rpc_url: "https://rpc.test.invalid".into(),
		stream_url: with_stream.then(|| "wss://stream.test.invalid".into()),
		strategy,
		scan_interval_ms: 5_000,
		enabled: true,
		native_currency: NativeCurrency {
			name: "Ether".into(),
			symbol: "ETH".into(),
			decimals: 18,
		},
		metadata: Value::Null,
	}
}

pub fn erc20_contract(
	chain_id: i64,
	address: &str,
	symbol: &str,
	decimals: u8,
	is_stablecoin: bool,
) -> ContractConfig {
	ContractConfig {
		chain_id,
		address: address.into(),
		name: format!("{} Token", symbol),
		symbol: symbol.into(),
		contract_type: "erc20".into(),
		events: vec![transfer_topic()],
		abi: vec!["Transfer(address indexed from, address indexed to, uint256 value)".into()],
		enabled: true,
		metadata: ContractMetadata {
			decimals,
			is_stablecoin,
			priority: None,
			extra: Default::default(),
		},
	}
}

/// Settings with every delay collapsed so tests run fast.
pub fn fast_settings() -> IndexerSettings {
	IndexerSettings {
		scan_interval_ms: 100,
		blocks_per_scan: 50,
		contract_batch_size: 3,
		contract_batch_delay_ms: 1,
		event_batch_size: 2,
		event_batch_delay_ms: 1,
		block_batch_size: 5,
		block_batch_delay_ms: 1,
		max_reconnect_attempts: 5,
		contract_refresh_interval_ms: 200,
		queue_capacity: 10_000,
		chain_reload_interval_ms: 60_000,
		rpc_timeout_ms: 1_000,
		shutdown_grace_ms: 2_000,
	}
}

/// Fully-wired pipeline over mock transports and in-memory stores.
pub struct Harness {
	pub rpc: Arc<MockRpc>,
	pub stream: Option<Arc<MockStream>>,
	pub adapter: Arc<ChainAdapter>,
	pub dispatcher: Arc<EventDispatcher>,
	pub contracts: Arc<InMemoryContractConfigRepository>,
	pub events: Arc<InMemoryEventStore>,
	pub contract_data: Arc<InMemoryContractDataStore>,
	pub ctx: ListenerContext,
}

pub async fn harness(
	chain: ChainConfig,
	contracts: Vec<ContractConfig>,
	head: u64,
	with_stream: bool,
) -> Harness {
	let rpc = MockRpc::new(chain.chain_id, head);
	let stream = with_stream.then(MockStream::new);

	let contract_repo =
		Arc::new(InMemoryContractConfigRepository::with_contracts(contracts).await);
	let events = Arc::new(InMemoryEventStore::new());
	let contract_data = Arc::new(InMemoryContractDataStore::new());
	let dispatcher = EventDispatcher::new(fast_settings().queue_capacity);

	dispatcher
		.register_handler(Arc::new(TransferHandler::new(
			contract_repo.clone(),
			events.clone(),
			contract_data.clone(),
		)))
		.await;

	let adapter = Arc::new(ChainAdapter::new_with_transports(
		Arc::new(chain),
		rpc.clone(),
		stream
			.clone()
			.map(|s| s as Arc<dyn StreamTransport>),
	));

	let ctx = ListenerContext {
		dispatcher: dispatcher.clone(),
		contracts: contract_repo.clone(),
		contract_data: contract_data.clone(),
		settings: fast_settings(),
	};

	Harness {
		rpc,
		stream,
		adapter,
		dispatcher,
		contracts: contract_repo,
		events,
		contract_data,
		ctx,
	}
}

/// Handler that records the arrival order of events.
pub struct RecordingHandler {
	pub seen: Arc<Mutex<Vec<(u64, u64, String)>>>,
}

impl RecordingHandler {
	pub fn new() -> (Arc<Self>, Arc<Mutex<Vec<(u64, u64, String)>>>) {
		let seen = Arc::new(Mutex::new(Vec::new()));
		(Arc::new(Self { seen: seen.clone() }), seen)
	}
}

#[async_trait]
impl EventHandler for RecordingHandler {
	fn name(&self) -> &str {
		"recording"
	}

	fn can_handle(&self, _event: &BlockchainEvent) -> bool {
		true
	}

	async fn handle(&self, event: &BlockchainEvent) -> Result<(), anyhow::Error> {
		self.seen.lock().await.push((
			event.block_number,
			event.log_index,
			event.transaction_hash.clone(),
		));
		Ok(())
	}
}

/// Polls an async condition until it holds or the budget elapses.
pub async fn wait_until<F, Fut>(mut condition: F, budget: Duration) -> bool
where
	F: FnMut() -> Fut,
	Fut: std::future::Future<Output = bool>,
{
	let deadline = tokio::time::Instant::now() + budget;
	loop {
		if condition().await {
			return true;
		}
		if tokio::time::Instant::now() >= deadline {
			return false;
		}
		tokio::time::sleep(Duration::from_millis(10)).await;
	}
}

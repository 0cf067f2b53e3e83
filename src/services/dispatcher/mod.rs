//! Event dispatcher: the in-process bus between listeners and handlers.
//!
//! `dispatch_event` is enqueue-only; a dedicated consumer task drains the
//! FIFO, so exactly one drain loop is ever active. For each event, every
//! handler whose `can_handle` returns true runs; eligible handlers run
//! concurrently and are joined before the next event pops, so handler
//! failures can never reorder the queue. The queue is bounded: past
//! capacity the oldest event is dropped with a warning, because listeners
//! must never stall their transports on a slow handler.

use async_trait::async_trait;
use futures::future::join_all;
use std::{
	collections::VecDeque,
	sync::atomic::{AtomicU64, Ordering},
	sync::Arc,
};
use tokio::sync::{watch, Mutex, Notify, RwLock};
use tracing::{debug, error, warn};

use crate::models::BlockchainEvent;

/// A consumer of dispatched events.
#[async_trait]
pub trait EventHandler: Send + Sync {
	/// Handler name used in logs.
	fn name(&self) -> &str;

	/// Whether this handler wants the event.
	fn can_handle(&self, event: &BlockchainEvent) -> bool;

	/// Processes one event. Failures are logged and swallowed by the
	/// dispatcher; they never stop the queue.
	async fn handle(&self, event: &BlockchainEvent) -> Result<(), anyhow::Error>;
}

/// Bounded FIFO dispatcher with a single consumer task.
pub struct EventDispatcher {
	queue: Mutex<VecDeque<BlockchainEvent>>,
	notify: Notify,
	handlers: RwLock<Vec<Arc<dyn EventHandler>>>,
	capacity: usize,
	dropped: AtomicU64,
	shutdown_tx: watch::Sender<bool>,
}

impl EventDispatcher {
	pub fn new(capacity: usize) -> Arc<Self> {
		let (shutdown_tx, _) = watch::channel(false);
		Arc::new(Self {
			queue: Mutex::new(VecDeque::new()),
			notify: Notify::new(),
			handlers: RwLock::new(Vec::new()),
			capacity,
			dropped: AtomicU64::new(0),
			shutdown_tx,
		})
	}

	/// Registers a handler; handlers run in registration order eligibility
	/// checks, concurrently for execution.
	pub async fn register_handler(&self, handler: Arc<dyn EventHandler>) {
		self.handlers.write().await.push(handler);
	}

	pub async fn handler_count(&self) -> usize {
		self.handlers.read().await.len()
	}

	pub async fn queue_size(&self) -> usize {
		self.queue.lock().await.len()
	}

	/// Empties the queue, returning how many events were discarded.
	pub async fn clear_queue(&self) -> usize {
		let mut queue = self.queue.lock().await;
		let discarded = queue.len();
		queue.clear();
		discarded
	}

	/// Events dropped so far by the overflow policy.
	pub fn dropped_count(&self) -> u64 {
		self.dropped.load(Ordering::Relaxed)
	}

	/// Enqueues an event. Never blocks on handler progress: when the queue
	/// is full the oldest event is dropped to make room.
	pub async fn dispatch_event(&self, event: BlockchainEvent) {
		{
			let mut queue = self.queue.lock().await;
			if queue.len() >= self.capacity {
				if let Some(dropped) = queue.pop_front() {
					let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
					warn!(
						"Event queue full ({}); dropped oldest event {}:{}:{} ({} dropped total)",
						self.capacity,
						dropped.chain_id,
						dropped.transaction_hash,
						dropped.log_index,
						total
					);
				}
			}
			queue.push_back(event);
		}
		self.notify.notify_one();
	}

	/// Spawns the consumer task.
	pub fn start(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
		let dispatcher = self.clone();
		tokio::spawn(async move { dispatcher.run().await })
	}

	/// The drain loop. Exactly one of these runs per dispatcher.
	pub async fn run(self: Arc<Self>) {
		let mut shutdown_rx = self.shutdown_tx.subscribe();
		loop {
			if *shutdown_rx.borrow() {
				break;
			}

			let event = { self.queue.lock().await.pop_front() };
			match event {
				Some(event) => self.process_event(&event).await,
				None => {
					tokio::select! {
						_ = self.notify.notified() => {}
						_ = shutdown_rx.changed() => {}
					}
				}
			}
		}
		debug!("Dispatcher drain loop stopped");
	}

	/// Drains every queued event inline. Used on shutdown and by tests that
	/// need deterministic completion instead of racing the consumer task.
	pub async fn drain_pending(&self) {
		loop {
			let event = { self.queue.lock().await.pop_front() };
			match event {
				Some(event) => self.process_event(&event).await,
				None => break,
			}
		}
	}

	/// Signals the consumer task to stop after the current event.
	pub fn shutdown(&self) {
		let _ = self.shutdown_tx.send(true);
	}

	async fn process_event(&self, event: &BlockchainEvent) {
		let eligible: Vec<Arc<dyn EventHandler>> = {
			self.handlers
				.read()
				.await
				.iter()
				.filter(|h| h.can_handle(event))
				.cloned()
				.collect()
		};

		if eligible.is_empty() {
			return;
		}

		let results = join_all(eligible.iter().map(|h| h.handle(event))).await;
		for (handler, result) in eligible.iter().zip(results) {
			if let Err(e) = result {
				error!(
					"Handler {} failed for event {}:{}:{}: {}",
					handler.name(),
					event.chain_id,
					event.transaction_hash,
					event.log_index,
					e
				);
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::models::{ContractInfo, EventInfo, EventPayload, EventType};
	use std::sync::atomic::AtomicUsize;

	fn test_event(tx: &str, log_index: u64) -> BlockchainEvent {
		BlockchainEvent {
			chain_id: 1,
			transaction_hash: tx.into(),
			log_index,
			block_number: 1,
			timestamp_ms: 0,
			event_type: EventType::ContractLog,
			contract_address: "0xaaaa".into(),
			data: EventPayload {
				topics: vec!["0xdead".into()],
				raw_data: "0x".into(),
				log_index,
				transaction_index: None,
				gas_used: None,
				tx_status: None,
				contract: ContractInfo {
					name: "T".into(),
					symbol: "T".into(),
					contract_type: "erc20".into(),
				},
				event: EventInfo {
					name: "Transfer".into(),
					signature: "Transfer(address,address,uint256)".into(),
					args: serde_json::Value::Null,
				},
			},
			processed: false,
			processed_at: None,
			processing_result: None,
		}
	}

	struct Recorder {
		name: String,
		seen: Arc<Mutex<Vec<String>>>,
		fail: bool,
	}

	#[async_trait]
	impl EventHandler for Recorder {
		fn name(&self) -> &str {
			&self.name
		}

		fn can_handle(&self, _event: &BlockchainEvent) -> bool {
			true
		}

		async fn handle(&self, event: &BlockchainEvent) -> Result<(), anyhow::Error> {
			self.seen.lock().await.push(event.transaction_hash.clone());
			if self.fail {
				anyhow::bail!("handler {} always fails", self.name);
			}
			Ok(())
		}
	}

	#[tokio::test]
	async fn drains_in_fifo_order() {
		let dispatcher = EventDispatcher::new(100);
		let seen = Arc::new(Mutex::new(Vec::new()));
		dispatcher
			.register_handler(Arc::new(Recorder {
				name: "rec".into(),
				seen: seen.clone(),
				fail: false,
			}))
			.await;

		for i in 0..5 {
			dispatcher.dispatch_event(test_event(&format!("0xtx{}", i), 0)).await;
		}
		dispatcher.drain_pending().await;

		let order = seen.lock().await.clone();
		assert_eq!(order, vec!["0xtx0", "0xtx1", "0xtx2", "0xtx3", "0xtx4"]);
		assert_eq!(dispatcher.queue_size().await, 0);
	}

	#[tokio::test]
	async fn failing_handler_does_not_stop_the_queue() {
		let dispatcher = EventDispatcher::new(100);
		let seen_a = Arc::new(Mutex::new(Vec::new()));
		let seen_b = Arc::new(Mutex::new(Vec::new()));
		dispatcher
			.register_handler(Arc::new(Recorder {
				name: "a".into(),
				seen: seen_a.clone(),
				fail: true,
			}))
			.await;
		dispatcher
			.register_handler(Arc::new(Recorder {
				name: "b".into(),
				seen: seen_b.clone(),
				fail: false,
			}))
			.await;

		dispatcher.dispatch_event(test_event("0xtx1", 0)).await;
		dispatcher.dispatch_event(test_event("0xtx2", 0)).await;
		dispatcher.drain_pending().await;

		assert_eq!(seen_a.lock().await.len(), 2);
		assert_eq!(seen_b.lock().await.len(), 2);
		assert_eq!(dispatcher.queue_size().await, 0);
		assert_eq!(dispatcher.handler_count().await, 2);
	}

	#[tokio::test]
	async fn overflow_drops_oldest_and_counts() {
		let dispatcher = EventDispatcher::new(3);
		for i in 0..5 {
			dispatcher.dispatch_event(test_event(&format!("0xtx{}", i), 0)).await;
		}

		assert_eq!(dispatcher.queue_size().await, 3);
		assert_eq!(dispatcher.dropped_count(), 2);

		// The two oldest were dropped; the newest three survive in order.
		let seen = Arc::new(Mutex::new(Vec::new()));
		dispatcher
			.register_handler(Arc::new(Recorder {
				name: "rec".into(),
				seen: seen.clone(),
				fail: false,
			}))
			.await;
		dispatcher.drain_pending().await;
		assert_eq!(
			seen.lock().await.clone(),
			vec!["0xtx2", "0xtx3", "0xtx4"]
		);
	}

	#[tokio::test]
	async fn clear_queue_reports_discarded() {
		let dispatcher = EventDispatcher::new(100);
		dispatcher.dispatch_event(test_event("0xtx1", 0)).await;
		dispatcher.dispatch_event(test_event("0xtx2", 0)).await;
		assert_eq!(dispatcher.clear_queue().await, 2);
		assert_eq!(dispatcher.queue_size().await, 0);
	}

	struct Selective;

	#[async_trait]
	impl EventHandler for Selective {
		fn name(&self) -> &str {
			"selective"
		}

		fn can_handle(&self, event: &BlockchainEvent) -> bool {
			event.transaction_hash == "0xwanted"
		}

		async fn handle(&self, _event: &BlockchainEvent) -> Result<(), anyhow::Error> {
			Ok(())
		}
	}

	#[tokio::test]
	async fn consumer_task_processes_dispatched_events() {
		let dispatcher = EventDispatcher::new(100);
		let counter = Arc::new(AtomicUsize::new(0));

		struct Counting(Arc<AtomicUsize>);

		#[async_trait]
		impl EventHandler for Counting {
			fn name(&self) -> &str {
				"counting"
			}
			fn can_handle(&self, _event: &BlockchainEvent) -> bool {
				true
			}
			async fn handle(&self, _event: &BlockchainEvent) -> Result<(), anyhow::Error> {
				self.0.fetch_add(1, Ordering::SeqCst);
				Ok(())
			}
		}

		dispatcher.register_handler(Arc::new(Counting(counter.clone()))).await;
		let consumer = dispatcher.start();

		dispatcher.dispatch_event(test_event("0xtx1", 0)).await;
		dispatcher.dispatch_event(test_event("0xtx2", 0)).await;

		// Wait for the consumer to catch up.
		for _ in 0..50 {
			if counter.load(Ordering::SeqCst) == 2 {
				break;
			}
			tokio::time::sleep(std::time::Duration::from_millis(10)).await;
		}
		assert_eq!(counter.load(Ordering::SeqCst), 2);

		dispatcher.shutdown();
		let _ = consumer.await;
	}

	#[tokio::test]
	async fn ineligible_handlers_are_skipped() {
		let dispatcher = EventDispatcher::new(100);
		dispatcher.register_handler(Arc::new(Selective)).await;
		dispatcher.dispatch_event(test_event("0xother", 0)).await;
		dispatcher.drain_pending().await;
		assert_eq!(dispatcher.queue_size().await, 0);
	}
}

//! WebSocket streaming transport.
//!
//! Maintains one connection per chain, multiplexing any number of
//! `eth_subscribe("logs", ...)` subscriptions over it. A router task owns
//! the read half: JSON-RPC responses resolve their pending request, and
//! subscription notifications are fanned out to per-subscription channels.
//! When the socket drops, every subscriber sees its stream end and a
//! disconnect broadcast fires so the listener can run its reconnect cycle.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::{
	collections::HashMap,
	sync::{
		atomic::{AtomicBool, AtomicU64, Ordering},
		Arc,
	},
	time::Duration,
};
use tokio::{
	net::TcpStream,
	sync::{broadcast, mpsc, oneshot, Mutex},
	time::timeout,
};
use tokio_tungstenite::{
	connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, warn};
use web3::types::Log;

use crate::services::blockchain::error::TransportError;

const SUBSCRIPTION_CHANNEL_CAPACITY: usize = 4_096;

/// One logical log subscription: its upstream id and the notification
/// stream. The stream ends when the subscription is closed or the transport
/// drops.
#[derive(Debug)]
pub struct LogSubscription {
	pub id: String,
	pub rx: mpsc::Receiver<Log>,
}

/// Streaming transport capable of log subscriptions.
#[async_trait]
pub trait StreamTransport: Send + Sync {
	async fn connect(&self) -> Result<(), TransportError>;
	async fn disconnect(&self) -> Result<(), TransportError>;
	fn is_connected(&self) -> bool;
	/// Opens a log subscription filtered to one contract address and one
	/// topic-0.
	async fn subscribe_logs(
		&self,
		address: &str,
		topic0: &str,
	) -> Result<LogSubscription, TransportError>;
	async fn unsubscribe(&self, subscription_id: &str) -> Result<(), TransportError>;
	/// A receiver that fires whenever the underlying connection drops.
	fn disconnects(&self) -> broadcast::Receiver<()>;
}

type WsSink = futures::stream::SplitSink<
	WebSocketStream<MaybeTlsStream<TcpStream>>,
	Message,
>;

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Value, TransportError>>>>>;
type SubscriptionMap = Arc<Mutex<HashMap<String, mpsc::Sender<Log>>>>;

/// WebSocket transport client for one chain's streaming endpoint.
pub struct WsTransportClient {
	url: String,
	writer: Mutex<Option<WsSink>>,
	router: Mutex<Option<tokio::task::JoinHandle<()>>>,
	subscriptions: SubscriptionMap,
	pending: PendingMap,
	request_id: AtomicU64,
	connected: Arc<AtomicBool>,
	disconnect_tx: broadcast::Sender<()>,
	request_timeout: Duration,
}

impl WsTransportClient {
	pub fn new(url: impl Into<String>, request_timeout: Duration) -> Self {
		let (disconnect_tx, _) = broadcast::channel(8);
		Self {
			url: url.into(),
			writer: Mutex::new(None),
			router: Mutex::new(None),
			subscriptions: Arc::new(Mutex::new(HashMap::new())),
			pending: Arc::new(Mutex::new(HashMap::new())),
			request_id: AtomicU64::new(1),
			connected: Arc::new(AtomicBool::new(false)),
			disconnect_tx,
			request_timeout,
		}
	}

	async fn request(&self, method: &str, params: Value) -> Result<Value, TransportError> {
		if !self.is_connected() {
			return Err(TransportError::connection("Stream transport not connected"));
		}

		let id = self.request_id.fetch_add(1, Ordering::Relaxed);
		let (tx, rx) = oneshot::channel();
		self.pending.lock().await.insert(id, tx);

		let body = json!({
			"jsonrpc": "2.0",
			"id": id,
			"method": method,
			"params": params,
		})
		.to_string();

		{
			let mut writer = self.writer.lock().await;
			let sink = writer
				.as_mut()
				.ok_or_else(|| TransportError::connection("Stream transport not connected"))?;
			if let Err(e) = sink.send(Message::Text(body.into())).await {
				self.pending.lock().await.remove(&id);
				return Err(TransportError::connection(format!(
					"{}: send failed: {}",
					method, e
				)));
			}
		}

		match timeout(self.request_timeout, rx).await {
			Ok(Ok(result)) => result,
			Ok(Err(_)) => Err(TransportError::connection(format!(
				"{}: connection dropped before response",
				method
			))),
			Err(_) => {
				self.pending.lock().await.remove(&id);
				Err(TransportError::timeout(format!("{}: no response", method)))
			}
		}
	}
}

#[async_trait]
impl StreamTransport for WsTransportClient {
	async fn connect(&self) -> Result<(), TransportError> {
		if self.is_connected() {
			return Ok(());
		}

		let (stream, _) = connect_async(&self.url)
			.await
			.map_err(|e| TransportError::connection(format!("{}: {}", self.url, e)))?;
		info!("Stream transport connected: {}", self.url);

		let (write, read) = stream.split();
		*self.writer.lock().await = Some(write);
		self.connected.store(true, Ordering::Relaxed);

		let handle = tokio::spawn(run_router(
			read,
			self.subscriptions.clone(),
			self.pending.clone(),
			self.connected.clone(),
			self.disconnect_tx.clone(),
		));
		*self.router.lock().await = Some(handle);

		Ok(())
	}

	async fn disconnect(&self) -> Result<(), TransportError> {
		self.connected.store(false, Ordering::Relaxed);

		if let Some(mut sink) = self.writer.lock().await.take() {
			let _ = sink.send(Message::Close(None)).await;
		}

		// Give the router a moment to drain, then cut it loose.
		if let Some(handle) = self.router.lock().await.take() {
			let abort = handle.abort_handle();
			if timeout(Duration::from_secs(2), handle).await.is_err() {
				debug!("Stream router did not drain in time");
				abort.abort();
			}
		}

		self.subscriptions.lock().await.clear();
		self.pending.lock().await.clear();
		Ok(())
	}

	fn is_connected(&self) -> bool {
		self.connected.load(Ordering::Relaxed)
	}

	async fn subscribe_logs(
		&self,
		address: &str,
		topic0: &str,
	) -> Result<LogSubscription, TransportError> {
		let response = self
			.request(
				"eth_subscribe",
				json!(["logs", { "address": address, "topics": [topic0] }]),
			)
			.await?;

		let subscription_id = response
			.get("result")
			.and_then(|v| v.as_str())
			.ok_or_else(|| {
				TransportError::response("eth_subscribe: missing subscription id".to_string())
			})?
			.to_string();

		let (tx, rx) = mpsc::channel(SUBSCRIPTION_CHANNEL_CAPACITY);
		self.subscriptions
			.lock()
			.await
			.insert(subscription_id.clone(), tx);

		debug!(
			"Opened log subscription {} for {} topic {}",
			subscription_id, address, topic0
		);
		Ok(LogSubscription {
			id: subscription_id,
			rx,
		})
	}

	async fn unsubscribe(&self, subscription_id: &str) -> Result<(), TransportError> {
		self.subscriptions.lock().await.remove(subscription_id);
		// Best-effort upstream teardown; the server also drops subscriptions
		// with the connection.
		if self.is_connected() {
			let _ = self
				.request("eth_unsubscribe", json!([subscription_id]))
				.await;
		}
		Ok(())
	}

	fn disconnects(&self) -> broadcast::Receiver<()> {
		self.disconnect_tx.subscribe()
	}
}

async fn run_router(
	mut read: futures::stream::SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>,
	subscriptions: SubscriptionMap,
	pending: PendingMap,
	connected: Arc<AtomicBool>,
	disconnect_tx: broadcast::Sender<()>,
) {
	while let Some(message) = read.next().await {
		match message {
			Ok(Message::Text(text)) => route_message(&text, &subscriptions, &pending).await,
			Ok(Message::Close(_)) => {
				info!("Stream closed by server");
				break;
			}
			Ok(_) => {} // ping/pong/binary handled by the protocol layer
			Err(e) => {
				warn!("Stream transport error: {}", e);
				break;
			}
		}
	}

	connected.store(false, Ordering::Relaxed);

	// Fail whatever was waiting on this connection and end every
	// subscription stream, then tell the listener.
	for (_, waiter) in pending.lock().await.drain() {
		let _ = waiter.send(Err(TransportError::Connection(
			"Connection dropped".to_string(),
		)));
	}
	subscriptions.lock().await.clear();
	let _ = disconnect_tx.send(());
}

async fn route_message(text: &str, subscriptions: &SubscriptionMap, pending: &PendingMap) {
	let value: Value = match serde_json::from_str(text) {
		Ok(v) => v,
		Err(e) => {
			warn!("Unparseable stream message: {}", e);
			return;
		}
	};

	// JSON-RPC response to one of our requests.
	if let Some(id) = value.get("id").and_then(|v| v.as_u64()) {
		if let Some(waiter) = pending.lock().await.remove(&id) {
			let result = match value.get("error") {
				Some(error) => Err(TransportError::response(format!(
					"JSON-RPC error: {}",
					error
				))),
				None => Ok(value),
			};
			let _ = waiter.send(result);
		}
		return;
	}

	// Subscription notification.
	if value.get("method").and_then(|m| m.as_str()) != Some("eth_subscription") {
		return;
	}
	let params = match value.get("params") {
		Some(p) => p,
		None => return,
	};
	let subscription_id = match params.get("subscription").and_then(|s| s.as_str()) {
		Some(id) => id,
		None => return,
	};
	let result = match params.get("result") {
		Some(r) => r.clone(),
		None => return,
	};

	// Skip reorged logs; this indexer processes each canonical log once.
	if result.get("removed").and_then(|r| r.as_bool()).unwrap_or(false) {
		return;
	}

	let log: Log = match serde_json::from_value(result) {
		Ok(log) => log,
		Err(e) => {
			warn!("Unparseable log notification: {}", e);
			return;
		}
	};

	let subscriptions = subscriptions.lock().await;
	if let Some(tx) = subscriptions.get(subscription_id) {
		if let Err(e) = tx.try_send(log) {
			warn!("Subscription {} backlogged, dropping log: {}", subscription_id, e);
		}
	}
}

//! HTTP JSON-RPC transport.
//!
//! Wraps `reqwest` in retry middleware for transient failures and counts
//! every outgoing request so listeners can report their upstream call rate.

use async_trait::async_trait;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde_json::{json, Value};
use std::{
	sync::atomic::{AtomicU64, Ordering},
	time::Duration,
};

use crate::services::blockchain::error::TransportError;

/// Request/response transport to an EVM JSON-RPC endpoint.
#[async_trait]
pub trait EvmRpcTransport: Send + Sync {
	/// Sends a raw JSON-RPC request and returns the full response document.
	async fn send_raw_request(
		&self,
		method: &str,
		params: Option<Value>,
	) -> Result<Value, TransportError>;

	/// Returns the number of requests made since the last call and resets
	/// the counter.
	fn take_request_count(&self) -> u64;
}

/// Production HTTP transport with retrying middleware.
pub struct HttpTransportClient {
	client: ClientWithMiddleware,
	url: String,
	request_id: AtomicU64,
	request_count: AtomicU64,
}

impl HttpTransportClient {
	pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
		let base = reqwest::Client::builder()
			.timeout(timeout)
			.build()
			.map_err(|e| TransportError::connection(format!("Failed to build client: {}", e)))?;

		let retry_policy = ExponentialBackoff::builder().build_with_max_retries(3);
		let client = ClientBuilder::new(base)
			.with(RetryTransientMiddleware::new_with_policy(retry_policy))
			.build();

		Ok(Self {
			client,
			url: url.into(),
			request_id: AtomicU64::new(1),
			request_count: AtomicU64::new(0),
		})
	}
}

#[async_trait]
impl EvmRpcTransport for HttpTransportClient {
	async fn send_raw_request(
		&self,
		method: &str,
		params: Option<Value>,
	) -> Result<Value, TransportError> {
		self.request_count.fetch_add(1, Ordering::Relaxed);
		let id = self.request_id.fetch_add(1, Ordering::Relaxed);

		let body = json!({
			"jsonrpc": "2.0",
			"id": id,
			"method": method,
			"params": params.unwrap_or_else(|| json!([])),
		});

		let response = self
			.client
			.post(&self.url)
			.json(&body)
			.send()
			.await
			.map_err(|e| {
				if e.is_connect() {
					TransportError::connection(format!("{}: {}", method, e))
				} else if e.is_timeout() {
					TransportError::timeout(format!("{}: {}", method, e))
				} else {
					TransportError::request(format!("{}: {}", method, e))
				}
			})?;

		if response.status().is_server_error() {
			return Err(TransportError::response(format!(
				"{}: upstream returned {}",
				method,
				response.status()
			)));
		}

		let document: Value = response
			.json()
			.await
			.map_err(|e| TransportError::response(format!("{}: invalid JSON: {}", method, e)))?;

		if let Some(error) = document.get("error") {
			return Err(TransportError::response(format!(
				"{}: JSON-RPC error: {}",
				method, error
			)));
		}

		Ok(document)
	}

	fn take_request_count(&self) -> u64 {
		self.request_count.swap(0, Ordering::Relaxed)
	}
}

/// Extension methods shared by the middleware error paths.
trait MiddlewareErrorExt {
	fn is_connect(&self) -> bool;
	fn is_timeout(&self) -> bool;
}

impl MiddlewareErrorExt for reqwest_middleware::Error {
	fn is_connect(&self) -> bool {
		match self {
			reqwest_middleware::Error::Reqwest(e) => e.is_connect(),
			reqwest_middleware::Error::Middleware(_) => false,
		}
	}

	fn is_timeout(&self) -> bool {
		match self {
			reqwest_middleware::Error::Reqwest(e) => e.is_timeout(),
			reqwest_middleware::Error::Middleware(_) => false,
		}
	}
}

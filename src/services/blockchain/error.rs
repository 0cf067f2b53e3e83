//! Transport and adapter error types.
//!
//! The taxonomy separates fatal conditions (a chain answering with the wrong
//! id) from retryable ones (network failures, timeouts) so listeners can
//! decide between skipping a slice, aborting a tick, or giving up on the
//! chain entirely.

use log::error;

/// Errors raised by the raw transports (HTTP JSON-RPC, WebSocket stream).
#[derive(Debug)]
pub enum TransportError {
	/// The endpoint cannot be reached or the connection dropped.
	Connection(String),
	/// A request could not be built or sent.
	Request(String),
	/// The request timed out.
	Timeout(String),
	/// The endpoint answered with an error or an unparseable body.
	Response(String),
}

impl TransportError {
	fn format_message(&self) -> String {
		match self {
			Self::Connection(msg) => format!("Connection error: {}", msg),
			Self::Request(msg) => format!("Request error: {}", msg),
			Self::Timeout(msg) => format!("Timeout: {}", msg),
			Self::Response(msg) => format!("Response error: {}", msg),
		}
	}

	pub fn connection(msg: impl Into<String>) -> Self {
		let error = Self::Connection(msg.into());
		error!("{}", error.format_message());
		error
	}

	pub fn request(msg: impl Into<String>) -> Self {
		let error = Self::Request(msg.into());
		error!("{}", error.format_message());
		error
	}

	pub fn timeout(msg: impl Into<String>) -> Self {
		let error = Self::Timeout(msg.into());
		error!("{}", error.format_message());
		error
	}

	pub fn response(msg: impl Into<String>) -> Self {
		let error = Self::Response(msg.into());
		error!("{}", error.format_message());
		error
	}

	/// Whether the transport itself is down, as opposed to a single request
	/// failing.
	pub fn is_connection(&self) -> bool {
		matches!(self, Self::Connection(_))
	}
}

impl std::fmt::Display for TransportError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.format_message())
	}
}

impl std::error::Error for TransportError {}

/// Errors raised by chain adapter operations.
#[derive(Debug)]
pub enum AdapterError {
	/// The chain answered with a different id than configured. Fatal for
	/// this chain; never auto-retried.
	ConfigMismatch(String),
	/// The request transport is absent or down.
	TransportUnavailable(String),
	/// No adapter implementation can serve this chain (unsupported chain
	/// type). Strategy requests themselves degrade rather than fail.
	StrategyUnavailable(String),
	/// A retryable RPC failure (network blip, timeout, 5xx).
	TransientRpc(String),
}

impl AdapterError {
	fn format_message(&self) -> String {
		match self {
			Self::ConfigMismatch(msg) => format!("Chain id mismatch: {}", msg),
			Self::TransportUnavailable(msg) => format!("Transport unavailable: {}", msg),
			Self::StrategyUnavailable(msg) => format!("Strategy unavailable: {}", msg),
			Self::TransientRpc(msg) => format!("Transient RPC error: {}", msg),
		}
	}

	pub fn config_mismatch(msg: impl Into<String>) -> Self {
		let error = Self::ConfigMismatch(msg.into());
		error!("{}", error.format_message());
		error
	}

	pub fn transport_unavailable(msg: impl Into<String>) -> Self {
		let error = Self::TransportUnavailable(msg.into());
		error!("{}", error.format_message());
		error
	}

	pub fn strategy_unavailable(msg: impl Into<String>) -> Self {
		let error = Self::StrategyUnavailable(msg.into());
		error!("{}", error.format_message());
		error
	}

	pub fn transient_rpc(msg: impl Into<String>) -> Self {
		let error = Self::TransientRpc(msg.into());
		error!("{}", error.format_message());
		error
	}

	/// Fatal errors stop the chain and are never retried.
	pub fn is_fatal(&self) -> bool {
		matches!(self, Self::ConfigMismatch(_))
	}

	/// Whether the underlying transport is down (aborts a pull tick rather
	/// than skipping one slice).
	pub fn is_transport_down(&self) -> bool {
		matches!(self, Self::TransportUnavailable(_))
	}
}

impl std::fmt::Display for AdapterError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.format_message())
	}
}

impl std::error::Error for AdapterError {}

impl From<TransportError> for AdapterError {
	fn from(err: TransportError) -> Self {
		match err {
			TransportError::Connection(msg) => Self::TransportUnavailable(msg),
			TransportError::Request(msg) | TransportError::Response(msg) => {
				Self::TransientRpc(msg)
			}
			TransportError::Timeout(msg) => Self::TransientRpc(msg),
		}
	}
}

//! Chain transport layer.
//!
//! - `ChainAdapter`: one chain's RPC surface and listener factory
//! - transports: HTTP JSON-RPC (request/response) and WebSocket (streaming)
//! - error taxonomy separating fatal, transport-down and transient failures

mod adapter;
mod error;
mod transports;

pub use adapter::{ChainAdapter, ReceiptInfo};
pub use error::{AdapterError, TransportError};
pub use transports::{
	EvmRpcTransport, HttpTransportClient, LogSubscription, StreamTransport, WsTransportClient,
};

//! Network transports: HTTP JSON-RPC and WebSocket streaming.

mod http;
mod ws;

pub use http::{EvmRpcTransport, HttpTransportClient};
pub use ws::{LogSubscription, StreamTransport, WsTransportClient};

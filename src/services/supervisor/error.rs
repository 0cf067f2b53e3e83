//! Supervisor error types.

use log::error;

use crate::services::{blockchain::AdapterError, listener::ListenerError};

#[derive(Debug)]
pub enum SupervisorError {
	ChainNotFound(i64),
	StartError(String),
	ConfigError(String),
}

impl SupervisorError {
	fn format_message(&self) -> String {
		match self {
			Self::ChainNotFound(id) => format!("Chain not found: {}", id),
			Self::StartError(msg) => format!("Start error: {}", msg),
			Self::ConfigError(msg) => format!("Config error: {}", msg),
		}
	}

	pub fn chain_not_found(chain_id: i64) -> Self {
		let error = Self::ChainNotFound(chain_id);
		error!("{}", error.format_message());
		error
	}

	pub fn start_error(msg: impl Into<String>) -> Self {
		let error = Self::StartError(msg.into());
		error!("{}", error.format_message());
		error
	}

	pub fn config_error(msg: impl Into<String>) -> Self {
		let error = Self::ConfigError(msg.into());
		error!("{}", error.format_message());
		error
	}
}

impl std::fmt::Display for SupervisorError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.format_message())
	}
}

impl std::error::Error for SupervisorError {}

impl From<AdapterError> for SupervisorError {
	fn from(err: AdapterError) -> Self {
		Self::StartError(err.to_string())
	}
}

impl From<ListenerError> for SupervisorError {
	fn from(err: ListenerError) -> Self {
		Self::StartError(err.to_string())
	}
}

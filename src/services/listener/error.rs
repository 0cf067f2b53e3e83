//! Listener error types.

use log::error;

use crate::repositories::RepositoryError;

#[derive(Debug)]
pub enum ListenerError {
	StartError(String),
	SnapshotError(String),
}

impl ListenerError {
	fn format_message(&self) -> String {
		match self {
			Self::StartError(msg) => format!("Start error: {}", msg),
			Self::SnapshotError(msg) => format!("Snapshot error: {}", msg),
		}
	}

	pub fn start_error(msg: impl Into<String>) -> Self {
		let error = Self::StartError(msg.into());
		error!("{}", error.format_message());
		error
	}

	pub fn snapshot_error(msg: impl Into<String>) -> Self {
		let error = Self::SnapshotError(msg.into());
		error!("{}", error.format_message());
		error
	}
}

impl std::fmt::Display for ListenerError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.format_message())
	}
}

impl std::error::Error for ListenerError {}

impl From<RepositoryError> for ListenerError {
	fn from(err: RepositoryError) -> Self {
		Self::SnapshotError(err.to_string())
	}
}

//! Decoder error types.

use log::{error, warn};

#[derive(Debug)]
pub enum DecoderError {
	/// An ABI fragment string could not be parsed.
	FragmentParse(String),
	/// Two fragments in one contract resolve to the same signature.
	AmbiguousAbi(String),
	/// A monitored topic hash has no matching fragment.
	UnknownTopic(String),
	/// A raw log failed to decode against its fragment.
	DecodeFailed(String),
}

impl DecoderError {
	fn format_message(&self) -> String {
		match self {
			Self::FragmentParse(msg) => format!("Fragment parse error: {}", msg),
			Self::AmbiguousAbi(msg) => format!("Ambiguous ABI: {}", msg),
			Self::UnknownTopic(msg) => format!("Unknown topic: {}", msg),
			Self::DecodeFailed(msg) => format!("Decode failed: {}", msg),
		}
	}

	pub fn fragment_parse(msg: impl Into<String>) -> Self {
		let error = Self::FragmentParse(msg.into());
		error!("{}", error.format_message());
		error
	}

	pub fn ambiguous_abi(msg: impl Into<String>) -> Self {
		let error = Self::AmbiguousAbi(msg.into());
		error!("{}", error.format_message());
		error
	}

	pub fn unknown_topic(msg: impl Into<String>) -> Self {
		let error = Self::UnknownTopic(msg.into());
		error!("{}", error.format_message());
		error
	}

	// Decode failures drop a single log; they warn rather than error.
	pub fn decode_failed(msg: impl Into<String>) -> Self {
		let error = Self::DecodeFailed(msg.into());
		warn!("{}", error.format_message());
		error
	}
}

impl std::fmt::Display for DecoderError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.format_message())
	}
}

impl std::error::Error for DecoderError {}

//! Logging setup for the indexer.
//!
//! Configures a `tracing_subscriber` stack with an `EnvFilter` (driven by
//! `RUST_LOG`, defaulting to `info`) and a compact stdout formatter. The
//! `log` facade is bridged automatically by `tracing`'s default features, so
//! modules using either macro family end up in the same stream.

use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

/// Initializes logging to stdout.
pub fn setup_logging() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
	setup_logging_with_writer(std::io::stdout)
}

/// Initializes logging with a custom writer (used by tests to capture
/// operator output).
pub fn setup_logging_with_writer<W>(
	writer: W,
) -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>>
where
	W: for<'writer> tracing_subscriber::fmt::MakeWriter<'writer> + Send + Sync + 'static,
{
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

	tracing_subscriber::registry()
		.with(filter)
		.with(
			fmt::layer().with_writer(writer).event_format(
				fmt::format()
					.with_level(true)
					.with_target(true)
					.with_thread_ids(false)
					.with_ansi(true)
					.compact(),
			),
		)
		.try_init()?;
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn setup_is_idempotent_enough_for_tests() {
		// A second subscriber registration fails; everything else is a bug.
		if let Err(e) = setup_logging() {
			assert!(
				e.to_string()
					.contains("a global default trace dispatcher has already been set"),
				"unexpected logging setup error: {}",
				e
			);
		}
	}
}

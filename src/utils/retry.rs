//! Exponential backoff helpers for transient failures.
//!
//! `BackoffSchedule` is the building block shared by the stream reconnect
//! loop and ad-hoc retries: a doubling delay from an initial value up to a
//! cap, with an attempt budget.

use std::time::Duration;

/// A doubling backoff schedule with a delay cap and an attempt budget.
#[derive(Clone, Debug)]
pub struct BackoffSchedule {
	initial_delay: Duration,
	max_delay: Duration,
	max_attempts: u32,
	attempt: u32,
}

impl BackoffSchedule {
	pub fn new(initial_delay: Duration, max_delay: Duration, max_attempts: u32) -> Self {
		Self {
			initial_delay,
			max_delay,
			max_attempts,
			attempt: 0,
		}
	}

	/// The schedule used by push-listener reconnection: 1s doubling to 32s.
	pub fn for_reconnect(max_attempts: u32) -> Self {
		Self::new(Duration::from_secs(1), Duration::from_secs(32), max_attempts)
	}

	/// Returns the next delay, or `None` once the attempt budget is spent.
	pub fn next_delay(&mut self) -> Option<Duration> {
		if self.attempt >= self.max_attempts {
			return None;
		}
		let millis = self.initial_delay.as_millis() as u64;
		let delay = Duration::from_millis(
			millis
				.saturating_mul(1u64 << self.attempt.min(32))
				.min(self.max_delay.as_millis() as u64),
		);
		self.attempt += 1;
		Some(delay)
	}

	/// Number of attempts consumed so far.
	pub fn attempts(&self) -> u32 {
		self.attempt
	}

	/// Resets the schedule after a successful attempt.
	pub fn reset(&mut self) {
		self.attempt = 0;
	}
}

//! In-process counters exposed through component accessors, independent of the `metrics`
//! feature.

// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic relaxed counter.
#[derive(Debug, Default)]
pub(crate) struct Counter(AtomicU64);
impl Counter {
	pub(crate) fn incr(&self) {
		self.0.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn get(&self) -> u64 {
		self.0.load(Ordering::Relaxed)
	}
}

/// Counters for callback and webhook handler dispatch.
#[derive(Debug, Default)]
pub struct DispatchMetrics {
	pub(crate) routed: Counter,
	pub(crate) unhandled: Counter,
	pub(crate) handler_failures: Counter,
}
impl DispatchMetrics {
	/// Events routed.
	pub fn routed(&self) -> u64 {
		self.routed.get()
	}

	/// Events no handler was registered for.
	pub fn unhandled(&self) -> u64 {
		self.unhandled.get()
	}

	/// Handler invocations that returned an error or panicked.
	pub fn handler_failures(&self) -> u64 {
		self.handler_failures.get()
	}
}

/// Counters for the calls a [`TokenManager`](crate::auth::TokenManager) makes to its source.
#[derive(Debug, Default)]
pub struct RefreshMetrics {
	pub(crate) acquisitions: Counter,
	pub(crate) refreshes: Counter,
	pub(crate) successes: Counter,
	pub(crate) failures: Counter,
	pub(crate) timeouts: Counter,
}
impl RefreshMetrics {
	/// Source calls of either kind.
	pub fn attempts(&self) -> u64 {
		self.acquisitions() + self.refreshes()
	}

	/// Acquisitions from scratch.
	pub fn acquisitions(&self) -> u64 {
		self.acquisitions.get()
	}

	/// Exchanges of a refresh token.
	pub fn refreshes(&self) -> u64 {
		self.refreshes.get()
	}

	/// Source calls that produced a token.
	pub fn successes(&self) -> u64 {
		self.successes.get()
	}

	/// Source calls that failed, including those cut off by a deadline.
	pub fn failures(&self) -> u64 {
		self.failures.get()
	}

	/// Source calls cut off by the caller's deadline.
	pub fn timeouts(&self) -> u64 {
		self.timeouts.get()
	}
}

//! Optional observability helpers for runtime calls.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit spans named `apigen_runtime.call` with the `component` and
//!   `stage` fields, plus debug/warn events for cache hits, throttle waits, retries, and isolated
//!   handler failures.
//! - Enable `metrics` to increment `apigen_runtime_call_total{component,outcome}` and
//!   `apigen_runtime_cache_total{result}`, and to publish the permitted rate through the
//!   `apigen_runtime_throttle_rate` gauge.

mod counters;
mod metrics;
mod tracing;

pub use counters::{DispatchMetrics, RefreshMetrics};
pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Runtime components that open spans and record outcomes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Component {
	/// [`RequestExecutor`](crate::executor::RequestExecutor) calls.
	Executor,
	/// Token acquisition and refresh.
	Token,
	/// Page fetches.
	Pagination,
	/// Inbound webhook deliveries and subscriptions.
	Webhook,
}
impl Component {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Component::Executor => "executor",
			Component::Token => "token",
			Component::Pagination => "pagination",
			Component::Webhook => "webhook",
		}
	}
}
impl Display for Component {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CallOutcome {
	/// Entry to a runtime operation.
	Attempt,
	/// Successful completion.
	Success,
	/// Served from the response cache.
	CacheHit,
	/// Failure propagated back to the caller.
	Failure,
}
impl CallOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			CallOutcome::Attempt => "attempt",
			CallOutcome::Success => "success",
			CallOutcome::CacheHit => "cache_hit",
			CallOutcome::Failure => "failure",
		}
	}
}
impl Display for CallOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

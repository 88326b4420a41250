// self
use crate::obs::{CallOutcome, Component};

/// Records a call outcome via the global metrics recorder (when enabled).
pub fn record_call_outcome(component: Component, outcome: CallOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"apigen_runtime_call_total",
			"component" => component.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (component, outcome);
	}
}

/// Records a cache lookup result.
pub fn record_cache_lookup(hit: bool) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"apigen_runtime_cache_total",
			"result" => if hit { "hit" } else { "miss" }
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = hit;
	}
}

/// Publishes the currently permitted request rate.
pub fn record_throttle_rate(rate: f64) {
	#[cfg(feature = "metrics")]
	{
		metrics::gauge!("apigen_runtime_throttle_rate").set(rate);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = rate;
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn recorders_noop_without_installed_recorder() {
		record_call_outcome(Component::Executor, CallOutcome::Failure);
		record_cache_lookup(true);
		record_throttle_rate(3.125);
	}
}

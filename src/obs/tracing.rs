// self
use crate::{_prelude::*, error::ErrorKind, obs::Component};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedCall<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedCall<F> = F;

/// A span builder used by runtime components.
#[derive(Clone, Debug)]
pub struct CallSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl CallSpan {
	/// Creates a new span tagged with the provided component + stage.
	pub fn new(component: Component, stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span =
				tracing::info_span!("apigen_runtime.call", component = component.as_str(), stage);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (component, stage);

			Self {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedCall<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

pub(crate) fn cache_hit(url: &Url) {
	#[cfg(feature = "tracing")]
	tracing::debug!(url = url.as_str(), "served response from cache");
	#[cfg(not(feature = "tracing"))]
	let _ = url;
}

pub(crate) fn throttle_wait(wait: Duration) {
	#[cfg(feature = "tracing")]
	tracing::debug!(wait_ms = wait.as_millis() as u64, "waiting for throttle slot");
	#[cfg(not(feature = "tracing"))]
	let _ = wait;
}

pub(crate) fn throttle_adjusted(from: f64, to: f64) {
	#[cfg(feature = "tracing")]
	tracing::debug!(from, to, "permitted rate adjusted");
	#[cfg(not(feature = "tracing"))]
	let _ = (from, to);
}

pub(crate) fn retry_scheduled(kind: ErrorKind, attempt: u32, delay: Duration) {
	#[cfg(feature = "tracing")]
	tracing::debug!(
		kind = kind.as_str(),
		attempt,
		delay_ms = delay.as_millis() as u64,
		"retrying after retryable outcome"
	);
	#[cfg(not(feature = "tracing"))]
	let _ = (kind, attempt, delay);
}

pub(crate) fn handler_failed(component: Component, label: &str, reason: &dyn Display) {
	#[cfg(feature = "tracing")]
	tracing::warn!(component = component.as_str(), label, %reason, "handler failed; isolated");
	#[cfg(not(feature = "tracing"))]
	let _ = (component, label, reason);
}

pub(crate) fn token_refresh_failed(reason: &dyn Display) {
	#[cfg(feature = "tracing")]
	tracing::warn!(%reason, "token refresh failed");
	#[cfg(not(feature = "tracing"))]
	let _ = reason;
}

pub(crate) fn webhook_rejected(reason: &dyn Display) {
	#[cfg(feature = "tracing")]
	tracing::debug!(%reason, "webhook delivery rejected");
	#[cfg(not(feature = "tracing"))]
	let _ = reason;
}

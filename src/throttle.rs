//! Adaptive client-side throttling: a token bucket whose refill rate follows AIMD feedback.
//!
//! Every `rate_increase_every` consecutive successes raise the permitted rate by
//! `rate_increase_step` (up to `max_rate`); each reported rate-limit failure halves it (never
//! below `rate_floor`). Other failures only reset the success streak.

// self
use crate::{_prelude::*, config::RuntimeConfig, error::ErrorKind, obs};

const EPSILON: f64 = 1e-9;

/// AIMD bounds and increments.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ThrottlePolicy {
	/// Rate ceiling in requests per second.
	pub max_rate: f64,
	/// Rate floor in requests per second.
	pub rate_floor: f64,
	/// Additive increase step.
	pub increase_step: f64,
	/// Consecutive successes that trigger one increase.
	pub increase_every: u32,
}
impl From<&RuntimeConfig> for ThrottlePolicy {
	fn from(config: &RuntimeConfig) -> Self {
		Self {
			max_rate: config.max_rate,
			rate_floor: config.rate_floor,
			increase_step: config.rate_increase_step,
			increase_every: config.rate_increase_every.max(1),
		}
	}
}

/// Snapshot of the controller's adaptive state.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ThrottleState {
	/// Currently permitted rate in requests per second.
	pub rate: f64,
	/// Successes reported since the last failure or increase.
	pub consecutive_successes: u32,
	/// Failures reported since the last success.
	pub consecutive_failures: u32,
	/// When the rate last changed.
	pub last_adjusted: Instant,
}

/// Final outcome of a logical call, fed back into the controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThrottleOutcome {
	/// The call succeeded.
	Success,
	/// The call failed with the given kind.
	Failure(ErrorKind),
}

/// No slot is available right now.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ThisError)]
#[error("No throttle slot is available; retry in {retry_in:?}.")]
pub struct WouldBlock {
	/// Time until the next slot refills.
	pub retry_in: Duration,
}

/// The next slot lies beyond the caller's deadline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ThisError)]
#[error("Next throttle slot is beyond the deadline.")]
pub struct AcquireTimeout;

#[derive(Debug)]
struct Bucket {
	tokens: f64,
	refilled_at: Instant,
}
impl Bucket {
	fn settle(&mut self, now: Instant, rate: f64) {
		let elapsed = now.saturating_duration_since(self.refilled_at).as_secs_f64();

		self.tokens = (self.tokens + elapsed * rate).min(capacity(rate));
		self.refilled_at = now;
	}
}

#[derive(Debug)]
struct Inner {
	state: ThrottleState,
	bucket: Bucket,
}

/// Shared per-client throttle.
#[derive(Debug)]
pub struct ThrottleController {
	policy: ThrottlePolicy,
	inner: Mutex<Inner>,
}
impl ThrottleController {
	/// Creates a controller starting at `policy.max_rate` with a full bucket.
	pub fn new(policy: ThrottlePolicy) -> Self {
		let now = Instant::now();
		let rate = policy.max_rate;

		Self {
			policy,
			inner: Mutex::new(Inner {
				state: ThrottleState {
					rate,
					consecutive_successes: 0,
					consecutive_failures: 0,
					last_adjusted: now,
				},
				bucket: Bucket { tokens: capacity(rate), refilled_at: now },
			}),
		}
	}

	/// Creates a controller from the runtime configuration.
	pub fn from_config(config: &RuntimeConfig) -> Self {
		Self::new(ThrottlePolicy::from(config))
	}

	/// Configured bounds.
	pub fn policy(&self) -> ThrottlePolicy {
		self.policy
	}

	/// Current adaptive state.
	pub fn state(&self) -> ThrottleState {
		self.inner.lock().state
	}

	/// Takes a slot if one is available right now.
	pub fn try_acquire(&self) -> Result<Permit<'_>, WouldBlock> {
		let mut inner = self.inner.lock();
		let rate = inner.state.rate;

		inner.bucket.settle(Instant::now(), rate);

		if inner.bucket.tokens + EPSILON >= 1. {
			inner.bucket.tokens -= 1.;

			return Ok(Permit { controller: self, consumed: false });
		}

		let missing = 1. - inner.bucket.tokens;

		Err(WouldBlock { retry_in: Duration::from_secs_f64(missing / rate) })
	}

	/// Waits for a slot, failing once the next slot would land after `deadline`.
	pub async fn acquire(&self, deadline: Option<Instant>) -> Result<Permit<'_>, AcquireTimeout> {
		loop {
			let retry_in = match self.try_acquire() {
				Ok(permit) => return Ok(permit),
				Err(WouldBlock { retry_in }) => retry_in,
			};
			let wake = Instant::now() + retry_in;

			if deadline.is_some_and(|deadline| wake > deadline) {
				return Err(AcquireTimeout);
			}

			obs::throttle_wait(retry_in);
			tokio::time::sleep_until(wake).await;
		}
	}

	/// Feeds the final outcome of a call into the AIMD loop.
	pub fn report(&self, outcome: ThrottleOutcome) {
		let now = Instant::now();
		let mut guard = self.inner.lock();
		let Inner { state, bucket } = &mut *guard;
		let before = state.rate;

		bucket.settle(now, before);

		match outcome {
			ThrottleOutcome::Success => {
				state.consecutive_failures = 0;
				state.consecutive_successes += 1;

				if state.consecutive_successes >= self.policy.increase_every {
					state.consecutive_successes = 0;
					state.rate = (state.rate + self.policy.increase_step).min(self.policy.max_rate);
				}
			},
			ThrottleOutcome::Failure(kind) => {
				state.consecutive_successes = 0;
				state.consecutive_failures = state.consecutive_failures.saturating_add(1);

				if kind == ErrorKind::RateLimitExceeded {
					state.rate = (state.rate / 2.).max(self.policy.rate_floor);
				}
			},
		}

		let after = state.rate;

		if after != before {
			state.last_adjusted = now;
			bucket.tokens = bucket.tokens.min(capacity(after));

			drop(guard);
			obs::throttle_adjusted(before, after);
			obs::record_throttle_rate(after);
		}
	}

	fn refund(&self) {
		let mut inner = self.inner.lock();
		let cap = capacity(inner.state.rate);

		inner.bucket.tokens = (inner.bucket.tokens + 1.).min(cap);
	}
}

/// One admitted slot.
///
/// The slot is spent by [`Permit::consume`]; dropping an unconsumed permit returns it to the
/// bucket so cancelled attempts do not eat into the budget.
#[derive(Debug)]
#[must_use]
pub struct Permit<'a> {
	controller: &'a ThrottleController,
	consumed: bool,
}
impl Permit<'_> {
	/// Marks the slot as spent; call immediately before sending.
	pub fn consume(mut self) {
		self.consumed = true;
	}
}
impl Drop for Permit<'_> {
	fn drop(&mut self) {
		if !self.consumed {
			self.controller.refund();
		}
	}
}

fn capacity(rate: f64) -> f64 {
	rate.max(1.)
}

//! Backoff-governed retries around one logical call.
//!
//! Outcomes are classified once by [`classify_status`] and [`classify_cause`]. Retryable
//! outcomes are retried with capped, jittered exponential backoff until the retry budget or the
//! caller's deadline runs out; non-idempotent calls are only retried when the failure is known
//! not to have reached the server's business logic.

// crates.io
use rand::Rng;
// self
use crate::{
	_prelude::*,
	config::RuntimeConfig,
	error::{AuthError, ErrorCause, ErrorEvent, ErrorKind, TransportError},
	http::{RequestDescriptor, ResponseEnvelope},
	obs,
};

/// Result of one attempt as seen by the retry loop.
pub type AttemptResult = Result<ResponseEnvelope, ErrorCause>;

/// How the retry loop should treat an outcome.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disposition {
	/// The call succeeded.
	Success,
	/// The call failed but may succeed if repeated.
	Retryable(ErrorKind),
	/// The call failed and repeating it will not help.
	Terminal(ErrorKind),
}
impl Disposition {
	/// Failure kind, if any.
	pub fn kind(self) -> Option<ErrorKind> {
		match self {
			Self::Success => None,
			Self::Retryable(kind) | Self::Terminal(kind) => Some(kind),
		}
	}
}

/// Classifies an HTTP status.
pub fn classify_status(status: u16) -> Disposition {
	match status {
		200..=399 => Disposition::Success,
		408 => Disposition::Retryable(ErrorKind::Timeout),
		429 => Disposition::Retryable(ErrorKind::RateLimitExceeded),
		500..=599 => Disposition::Retryable(ErrorKind::ServerError),
		401 | 403 => Disposition::Terminal(ErrorKind::AuthenticationFailed),
		404 | 410 => Disposition::Terminal(ErrorKind::NotFound),
		400 | 409 | 422 => Disposition::Terminal(ErrorKind::ValidationError),
		_ => Disposition::Terminal(ErrorKind::Unknown),
	}
}

/// Classifies a failure that produced no usable response.
pub fn classify_cause(cause: &ErrorCause) -> Disposition {
	match cause {
		ErrorCause::Status { status } => classify_status(*status),
		ErrorCause::Transport(e) => match e {
			TransportError::Connect { .. }
			| TransportError::Network { .. }
			| TransportError::Io(_) => Disposition::Retryable(ErrorKind::NetworkError),
			TransportError::Timeout { .. } => Disposition::Retryable(ErrorKind::Timeout),
			TransportError::Malformed { .. } => Disposition::Terminal(ErrorKind::Unknown),
		},
		ErrorCause::Auth(AuthError::Timeout) | ErrorCause::ThrottleTimeout =>
			Disposition::Terminal(ErrorKind::Timeout),
		ErrorCause::Auth(_) => Disposition::Terminal(ErrorKind::AuthenticationFailed),
	}
}

/// Backoff parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
	/// Retries allowed after the first attempt.
	pub max_retries: u32,
	/// Delay before the first retry, before jitter.
	pub base: Duration,
	/// Upper bound of the un-jittered delay.
	pub cap: Duration,
}
impl RetryPolicy {
	/// Un-jittered delay before retry number `retry` (zero-based): `min(cap, base * 2^retry)`.
	pub fn backoff(&self, retry: u32) -> Duration {
		let factor = 1_u32.checked_shl(retry).unwrap_or(u32::MAX);

		self.base.saturating_mul(factor).min(self.cap)
	}

	/// [`RetryPolicy::backoff`] scaled by a uniform factor in `[0.5, 1.5]`.
	pub fn jittered(&self, retry: u32) -> Duration {
		self.backoff(retry).mul_f64(rand::rng().random_range(0.5..=1.5))
	}

	/// Delay before retry number `retry`, raised to the server's hint (bounded by the cap).
	pub fn delay(&self, retry: u32, retry_after: Option<Duration>) -> Duration {
		let jittered = self.jittered(retry);

		match retry_after {
			Some(hint) => jittered.max(hint.min(self.cap)),
			None => jittered,
		}
	}
}
impl From<&RuntimeConfig> for RetryPolicy {
	fn from(config: &RuntimeConfig) -> Self {
		Self {
			max_retries: config.max_retries,
			base: config.backoff_base,
			cap: config.backoff_cap,
		}
	}
}

/// Runs attempts until success, a terminal outcome, or an exhausted budget.
#[derive(Clone, Debug)]
pub struct RetryExecutor {
	policy: RetryPolicy,
}
impl RetryExecutor {
	/// Creates an executor for `policy`.
	pub fn new(policy: RetryPolicy) -> Self {
		Self { policy }
	}

	/// Configured policy.
	pub fn policy(&self) -> RetryPolicy {
		self.policy
	}

	/// Drives `attempt` (called with the 1-based attempt number) under the retry policy.
	///
	/// Gives up with a [`ErrorKind::Timeout`] event when the next backoff sleep would end after
	/// `deadline`; the last attempt's cause and response stay attached.
	pub async fn run<F, Fut>(
		&self,
		descriptor: &RequestDescriptor,
		deadline: Option<Instant>,
		mut attempt: F,
	) -> Result<ResponseEnvelope, ErrorEvent>
	where
		F: FnMut(u32) -> Fut,
		Fut: Future<Output = AttemptResult>,
	{
		let mut attempts = 0;

		loop {
			attempts += 1;

			let (disposition, cause, response) = match attempt(attempts).await {
				Ok(envelope) => match classify_status(envelope.status) {
					Disposition::Success => return Ok(envelope),
					disposition =>
						(disposition, ErrorCause::Status { status: envelope.status }, Some(envelope)),
				},
				Err(cause) => (classify_cause(&cause), cause, None),
			};
			let side_effect_free = match &cause {
				ErrorCause::Status { status } => *status == 429,
				ErrorCause::Transport(e) => e.sent_nothing(),
				ErrorCause::Auth(_) | ErrorCause::ThrottleTimeout => true,
			};
			let retry_after = response.as_ref().and_then(ResponseEnvelope::retry_after);
			let (kind, retryable) = match disposition {
				Disposition::Retryable(kind) => (kind, true),
				Disposition::Terminal(kind) => (kind, false),
				Disposition::Success => (ErrorKind::Unknown, false),
			};
			let mut event = ErrorEvent::new(kind, descriptor.clone(), cause, attempts);

			event.response = response;

			if !retryable
				|| attempts > self.policy.max_retries
				|| (!descriptor.is_idempotent() && !side_effect_free)
			{
				return Err(event);
			}

			let delay = self.policy.delay(attempts - 1, retry_after);
			let wake = Instant::now() + delay;

			if deadline.is_some_and(|deadline| wake > deadline) {
				return Err(event.into_deadline_timeout());
			}

			obs::retry_scheduled(kind, attempts, delay);
			tokio::time::sleep_until(wake).await;
		}
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::{AtomicU32, Ordering};
	// self
	use super::*;
	use crate::http::Method;

	fn policy(max_retries: u32) -> RetryPolicy {
		RetryPolicy {
			max_retries,
			base: Duration::from_millis(100),
			cap: Duration::from_secs(1),
		}
	}

	fn descriptor(method: Method) -> RequestDescriptor {
		RequestDescriptor::builder(
			method,
			Url::parse("https://api.example.com/jobs").expect("Fixture URL should parse."),
		)
		.build()
	}

	#[test]
	fn statuses_map_to_the_fixed_taxonomy() {
		assert_eq!(classify_status(204), Disposition::Success);
		assert_eq!(classify_status(304), Disposition::Success);
		assert_eq!(classify_status(408), Disposition::Retryable(ErrorKind::Timeout));
		assert_eq!(classify_status(429), Disposition::Retryable(ErrorKind::RateLimitExceeded));
		assert_eq!(classify_status(503), Disposition::Retryable(ErrorKind::ServerError));
		assert_eq!(classify_status(401), Disposition::Terminal(ErrorKind::AuthenticationFailed));
		assert_eq!(classify_status(404), Disposition::Terminal(ErrorKind::NotFound));
		assert_eq!(classify_status(422), Disposition::Terminal(ErrorKind::ValidationError));
		assert_eq!(classify_status(418), Disposition::Terminal(ErrorKind::Unknown));
	}

	#[test]
	fn malformed_responses_are_terminal() {
		let cause = ErrorCause::Transport(TransportError::Malformed { message: "eof".into() });

		assert_eq!(classify_cause(&cause), Disposition::Terminal(ErrorKind::Unknown));
	}

	#[test]
	fn backoff_doubles_until_the_cap() {
		let policy = policy(3);

		assert_eq!(policy.backoff(0), Duration::from_millis(100));
		assert_eq!(policy.backoff(2), Duration::from_millis(400));
		assert_eq!(policy.backoff(10), Duration::from_secs(1));
		assert_eq!(policy.backoff(40), Duration::from_secs(1));
	}

	#[test]
	fn jitter_stays_within_half_of_the_backoff() {
		let policy = policy(3);

		for _ in 0..200 {
			let delay = policy.jittered(1);

			assert!(delay >= Duration::from_millis(100) && delay <= Duration::from_millis(300));
		}
	}

	#[test]
	fn retry_after_raises_delay_but_not_past_the_cap() {
		let policy = policy(3);

		assert!(policy.delay(0, Some(Duration::from_millis(700))) >= Duration::from_millis(700));
		assert!(policy.delay(0, Some(Duration::from_secs(30))) <= Duration::from_secs(1));
	}

	#[tokio::test(start_paused = true)]
	async fn exhausting_retries_reports_every_attempt() {
		let executor = RetryExecutor::new(policy(3));
		let calls = AtomicU32::new(0);
		let event = executor
			.run(&descriptor(Method::Get), None, |_| {
				calls.fetch_add(1, Ordering::SeqCst);

				async { Ok(ResponseEnvelope::new(503, Vec::new())) }
			})
			.await
			.expect_err("Persistent 503 should fail.");

		assert_eq!(event.kind, ErrorKind::ServerError);
		assert_eq!(event.attempts, 4);
		assert_eq!(event.status(), Some(503));
		assert_eq!(calls.load(Ordering::SeqCst), 4);
	}

	#[tokio::test(start_paused = true)]
	async fn terminal_statuses_are_not_retried() {
		let executor = RetryExecutor::new(policy(3));
		let event = executor
			.run(&descriptor(Method::Get), None, |_| async {
				Ok(ResponseEnvelope::new(404, Vec::new()))
			})
			.await
			.expect_err("404 should fail.");

		assert_eq!(event.kind, ErrorKind::NotFound);
		assert_eq!(event.attempts, 1);
	}

	#[tokio::test(start_paused = true)]
	async fn post_retries_only_side_effect_free_failures() {
		let executor = RetryExecutor::new(policy(3));
		let post = descriptor(Method::Post);
		let server_error = executor
			.run(&post, None, |_| async { Ok(ResponseEnvelope::new(500, Vec::new())) })
			.await
			.expect_err("POST 500 should fail.");

		assert_eq!(server_error.attempts, 1);

		let recovered = executor
			.run(&post, None, |attempt| async move {
				if attempt == 1 {
					let refused =
						std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");

					Err(ErrorCause::from(TransportError::connect(refused)))
				} else if attempt == 2 {
					Ok(ResponseEnvelope::new(429, Vec::new()))
				} else {
					Ok(ResponseEnvelope::new(201, Vec::new()))
				}
			})
			.await
			.expect("Refused connection and 429 should be retried.");

		assert_eq!(recovered.status, 201);
	}

	#[tokio::test(start_paused = true)]
	async fn deadline_bounds_backoff() {
		let executor = RetryExecutor::new(policy(5));
		let start = Instant::now();
		let event = executor
			.run(&descriptor(Method::Get), Some(start + Duration::from_millis(20)), |_| async {
				Ok(ResponseEnvelope::new(502, Vec::new()))
			})
			.await
			.expect_err("Deadline should stop retries.");

		assert_eq!(event.kind, ErrorKind::Timeout);
		assert_eq!(event.attempt_kind, ErrorKind::ServerError);
		assert_eq!(event.attempts, 1);
		assert_eq!(event.status(), Some(502));
		assert_eq!(Instant::now(), start);
	}
}

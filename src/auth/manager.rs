//! Token lifecycle with singleflight refreshes and cancellation-safe state transitions.
//!
//! Callers ask [`TokenManager::get_token`] for a bearer token. When the cached token is inside
//! the refresh margin (or missing) exactly one caller talks to the [`TokenSource`] while the
//! others wait on the singleflight lock and re-check state once they hold it, so they share
//! the fresh token instead of stampeding the provider.

// self
use crate::{
	_prelude::*,
	auth::{Token, TokenSource, TokenState},
	config::RuntimeConfig,
	error::AuthError,
	obs::{self, CallOutcome, CallSpan, Component},
};

pub use crate::obs::RefreshMetrics;

#[derive(Debug)]
struct Slot {
	state: TokenState,
	token: Option<Token>,
}

enum Plan {
	Ready(Token),
	Fail(AuthError),
	Fetch,
}

/// Owns the credential lifecycle for one client.
pub struct TokenManager {
	source: Arc<dyn TokenSource>,
	margin: Duration,
	slot: Mutex<Slot>,
	singleflight: AsyncMutex<()>,
	metrics: Arc<RefreshMetrics>,
}
impl TokenManager {
	/// Creates a manager that refreshes tokens `margin` before they expire.
	pub fn new(source: Arc<dyn TokenSource>, margin: Duration) -> Self {
		Self {
			source,
			margin,
			slot: Mutex::new(Slot { state: TokenState::NoToken, token: None }),
			singleflight: AsyncMutex::new(()),
			metrics: Default::default(),
		}
	}

	/// Creates a manager using the configured refresh margin.
	pub fn from_config(source: Arc<dyn TokenSource>, config: &RuntimeConfig) -> Self {
		Self::new(source, config.token_refresh_margin)
	}

	/// Counters for calls made to the token source.
	pub fn metrics(&self) -> Arc<RefreshMetrics> {
		self.metrics.clone()
	}

	/// Current lifecycle state; a valid token inside the refresh margin reads as
	/// [`TokenState::Expiring`].
	pub fn state(&self) -> TokenState {
		let slot = self.slot.lock();

		match (&slot.state, &slot.token) {
			(TokenState::Valid, Some(token)) if token.is_expiring(Instant::now(), self.margin) =>
				TokenState::Expiring,
			(state, _) => *state,
		}
	}

	/// Returns a usable token, acquiring or refreshing it when needed.
	///
	/// Waiting for the singleflight lock and the source call are both bounded by `deadline`.
	/// A refresh cancelled by the deadline or by dropping the future leaves the previous
	/// state in place.
	pub async fn get_token(&self, deadline: Option<Instant>) -> Result<Token, AuthError> {
		match self.plan(Instant::now()) {
			Plan::Ready(token) => return Ok(token),
			Plan::Fail(e) => return Err(e),
			Plan::Fetch => (),
		}

		let _singleflight = match deadline {
			Some(deadline) => tokio::time::timeout_at(deadline, self.singleflight.lock())
				.await
				.map_err(|_| AuthError::Timeout)?,
			None => self.singleflight.lock().await,
		};

		match self.plan(Instant::now()) {
			Plan::Ready(token) => return Ok(token),
			Plan::Fail(e) => return Err(e),
			Plan::Fetch => (),
		}

		let span = CallSpan::new(Component::Token, "get_token");

		obs::record_call_outcome(Component::Token, CallOutcome::Attempt);

		let result = span.instrument(self.fetch(deadline)).await;

		match &result {
			Ok(_) => obs::record_call_outcome(Component::Token, CallOutcome::Success),
			Err(_) => obs::record_call_outcome(Component::Token, CallOutcome::Failure),
		}

		result
	}

	/// Demotes a valid token to [`TokenState::Expiring`] after the API rejected it, so the next
	/// caller refreshes.
	pub fn mark_rejected(&self) {
		let mut slot = self.slot.lock();

		if slot.state == TokenState::Valid {
			slot.state = TokenState::Expiring;
		}
	}

	/// Drops the current credential and returns to [`TokenState::NoToken`]; the next call
	/// acquires from scratch.
	pub fn reauthenticate(&self) {
		let mut slot = self.slot.lock();

		slot.state = TokenState::NoToken;
		slot.token = None;
	}

	fn plan(&self, now: Instant) -> Plan {
		let slot = self.slot.lock();

		match (slot.state, &slot.token) {
			(TokenState::Invalid, _) => Plan::Fail(AuthError::Invalid),
			(TokenState::Valid, Some(token)) if !token.is_expiring(now, self.margin) =>
				Plan::Ready(token.clone()),
			_ => Plan::Fetch,
		}
	}

	async fn fetch(&self, deadline: Option<Instant>) -> Result<Token, AuthError> {
		let (prior, refresh_token) = {
			let mut slot = self.slot.lock();
			let prior = slot.state;
			let refresh_token = slot.token.as_ref().and_then(|token| token.refresh_token().cloned());

			if slot.token.is_some() {
				slot.state = TokenState::Refreshing;
			}

			(prior, refresh_token)
		};
		let mut restore = RestoreOnDrop { slot: &self.slot, prior, armed: true };

		let request = match &refresh_token {
			Some(refresh_token) => {
				self.metrics.refreshes.incr();

				self.source.refresh(refresh_token)
			},
			None => {
				self.metrics.acquisitions.incr();

				self.source.acquire()
			},
		};
		let outcome = match deadline {
			Some(deadline) => tokio::time::timeout_at(deadline, request).await,
			None => Ok(request.await),
		};
		let grant = match outcome {
			Ok(grant) => grant,
			Err(_) => {
				self.metrics.failures.incr();
				self.metrics.timeouts.incr();

				return Err(AuthError::Timeout);
			},
		};

		restore.armed = false;

		let mut slot = self.slot.lock();

		match grant {
			Ok(grant) => {
				let mut token = Token::issue(grant, Instant::now());

				token.keep_refresh_token(refresh_token);

				slot.state = TokenState::Valid;
				slot.token = Some(token.clone());

				self.metrics.successes.incr();

				Ok(token)
			},
			Err(e) => {
				obs::token_refresh_failed(&e);

				slot.state =
					if prior == TokenState::NoToken { TokenState::NoToken } else { TokenState::Invalid };
				slot.token = None;

				self.metrics.failures.incr();

				Err(e)
			},
		}
	}
}
impl Debug for TokenManager {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenManager")
			.field("state", &self.state())
			.field("margin", &self.margin)
			.finish()
	}
}

struct RestoreOnDrop<'a> {
	slot: &'a Mutex<Slot>,
	prior: TokenState,
	armed: bool,
}
impl Drop for RestoreOnDrop<'_> {
	fn drop(&mut self) {
		if self.armed {
			self.slot.lock().state = self.prior;
		}
	}
}

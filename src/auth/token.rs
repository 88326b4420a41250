// self
use crate::{_prelude::*, auth::Secret};

/// Lifecycle state of the managed credential.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TokenState {
	/// Nothing acquired yet, or re-authentication was requested.
	NoToken,
	/// Usable and outside the refresh margin.
	Valid,
	/// Inside the refresh margin or rejected upstream; the next caller refreshes.
	Expiring,
	/// A refresh is in flight.
	Refreshing,
	/// A refresh failed; callers fail fast until re-authentication.
	Invalid,
}
impl TokenState {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::NoToken => "no_token",
			Self::Valid => "valid",
			Self::Expiring => "expiring",
			Self::Refreshing => "refreshing",
			Self::Invalid => "invalid",
		}
	}
}
impl Display for TokenState {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Longest lifetime honoured from a grant; providers announcing more are treated as this.
pub const MAX_TOKEN_LIFETIME: Duration = Duration::from_secs(60 * 60 * 24 * 365 * 10);

/// Bearer credential handed to callers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token {
	access_token: Secret,
	refresh_token: Option<Secret>,
	expires_at: Instant,
	state: TokenState,
}
impl Token {
	pub(crate) fn issue(grant: TokenGrant, issued_at: Instant) -> Self {
		Self {
			access_token: grant.access_token,
			refresh_token: grant.refresh_token,
			expires_at: issued_at
				.checked_add(grant.expires_in.min(MAX_TOKEN_LIFETIME))
				.unwrap_or(issued_at),
			state: TokenState::Valid,
		}
	}

	/// Access token secret.
	pub fn access_token(&self) -> &Secret {
		&self.access_token
	}

	/// Refresh token, when the provider issued one.
	pub fn refresh_token(&self) -> Option<&Secret> {
		self.refresh_token.as_ref()
	}

	/// Expiry instant.
	pub fn expires_at(&self) -> Instant {
		self.expires_at
	}

	/// State the token was handed out in.
	pub fn state(&self) -> TokenState {
		self.state
	}

	/// `Authorization` header value.
	pub fn bearer(&self) -> String {
		format!("Bearer {}", self.access_token.expose())
	}

	/// Whether `now + margin` has reached the expiry.
	pub fn is_expiring(&self, now: Instant, margin: Duration) -> bool {
		self.expires_at.checked_duration_since(now).is_none_or(|left| left <= margin)
	}

	pub(crate) fn keep_refresh_token(&mut self, previous: Option<Secret>) {
		if self.refresh_token.is_none() {
			self.refresh_token = previous;
		}
	}
}

/// Credential minted by a [`TokenSource`](crate::auth::TokenSource).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenGrant {
	/// Access token secret.
	pub access_token: Secret,
	/// Optional refresh token.
	pub refresh_token: Option<Secret>,
	/// Lifetime relative to the moment the grant was received.
	pub expires_in: Duration,
}
impl TokenGrant {
	/// Creates a grant without a refresh token.
	pub fn new(access_token: impl Into<String>, expires_in: Duration) -> Self {
		Self { access_token: Secret::new(access_token), refresh_token: None, expires_in }
	}

	/// Attaches a refresh token.
	pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
		self.refresh_token = Some(Secret::new(refresh_token));

		self
	}
}

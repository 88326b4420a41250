//! Runtime configuration shared by every component of a generated client.
//!
//! Configuration is usually embedded by the code generator as JSON. Durations are
//! expressed in milliseconds (`backoffBaseMs`, `cacheTtlMs`, ...) and every key is
//! optional; missing keys fall back to [`RuntimeConfig::default`].

// self
use crate::{_prelude::*, auth::Secret, error::ConfigError};

/// Recognized runtime options.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RuntimeConfig {
	/// Ceiling of the permitted request rate, in requests per second.
	pub max_rate: f64,
	/// Floor of the permitted request rate, in requests per second.
	pub rate_floor: f64,
	/// Additive step applied on each increase.
	pub rate_increase_step: f64,
	/// Number of consecutive successes that triggers one increase.
	pub rate_increase_every: u32,
	/// Retries allowed after the first attempt.
	pub max_retries: u32,
	/// Base delay of the exponential backoff.
	#[serde(rename = "backoffBaseMs", with = "millis")]
	pub backoff_base: Duration,
	/// Upper bound of the exponential backoff before jitter.
	#[serde(rename = "backoffCapMs", with = "millis")]
	pub backoff_cap: Duration,
	/// Time-to-live of cached responses.
	#[serde(rename = "cacheTtlMs", with = "millis")]
	pub cache_ttl: Duration,
	/// Maximum number of cached responses.
	pub cache_capacity: usize,
	/// How long before expiry a token is refreshed proactively.
	#[serde(rename = "tokenRefreshMarginMs", with = "millis")]
	pub token_refresh_margin: Duration,
	/// Per-attempt timeout applied by the default transport.
	#[serde(rename = "requestTimeoutMs", with = "millis_opt")]
	pub request_timeout: Option<Duration>,
	/// Shared secret used to verify webhook signatures.
	pub webhook_secret: Option<Secret>,
}
impl RuntimeConfig {
	/// Parses and validates a JSON configuration document.
	pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
		let mut deserializer = serde_json::Deserializer::from_str(raw);
		let config: Self = serde_path_to_error::deserialize(&mut deserializer)?;

		config.validate()?;

		Ok(config)
	}

	/// Checks cross-field constraints.
	pub fn validate(&self) -> Result<(), ConfigError> {
		let rates_finite = self.max_rate.is_finite() && self.rate_floor.is_finite();

		if !rates_finite || self.rate_floor <= 0. || self.rate_floor > self.max_rate {
			return Err(ConfigError::InvalidRate {
				max_rate: self.max_rate,
				rate_floor: self.rate_floor,
			});
		}
		if !(self.rate_increase_step >= 0. && self.rate_increase_step.is_finite())
			|| self.rate_increase_every == 0
		{
			return Err(ConfigError::InvalidRateIncrease);
		}
		if self.backoff_base.is_zero() || self.backoff_base > self.backoff_cap {
			return Err(ConfigError::InvalidBackoff);
		}
		if self.cache_capacity == 0 {
			return Err(ConfigError::ZeroCacheCapacity);
		}
		if self.webhook_secret.as_ref().is_some_and(|secret| secret.expose().is_empty()) {
			return Err(ConfigError::EmptyWebhookSecret);
		}

		Ok(())
	}

	/// Overrides the rate ceiling.
	pub fn with_max_rate(mut self, max_rate: f64) -> Self {
		self.max_rate = max_rate;

		self
	}

	/// Overrides the rate floor.
	pub fn with_rate_floor(mut self, rate_floor: f64) -> Self {
		self.rate_floor = rate_floor;

		self
	}

	/// Overrides the additive-increase step and the success interval that triggers it.
	pub fn with_rate_increase(mut self, step: f64, every: u32) -> Self {
		self.rate_increase_step = step;
		self.rate_increase_every = every;

		self
	}

	/// Overrides the retry ceiling.
	pub fn with_max_retries(mut self, max_retries: u32) -> Self {
		self.max_retries = max_retries;

		self
	}

	/// Overrides the backoff base and cap.
	pub fn with_backoff(mut self, base: Duration, cap: Duration) -> Self {
		self.backoff_base = base;
		self.backoff_cap = cap;

		self
	}

	/// Overrides cache TTL and capacity.
	pub fn with_cache(mut self, ttl: Duration, capacity: usize) -> Self {
		self.cache_ttl = ttl;
		self.cache_capacity = capacity;

		self
	}

	/// Overrides the proactive token refresh margin.
	pub fn with_token_refresh_margin(mut self, margin: Duration) -> Self {
		self.token_refresh_margin = margin;

		self
	}

	/// Sets the per-attempt transport timeout.
	pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
		self.request_timeout = Some(timeout);

		self
	}

	/// Sets the webhook signing secret.
	pub fn with_webhook_secret(mut self, secret: impl Into<String>) -> Self {
		self.webhook_secret = Some(Secret::new(secret));

		self
	}
}
impl Default for RuntimeConfig {
	fn default() -> Self {
		Self {
			max_rate: 10.,
			rate_floor: 1.,
			rate_increase_step: 1.,
			rate_increase_every: 10,
			max_retries: 3,
			backoff_base: Duration::from_millis(100),
			backoff_cap: Duration::from_secs(10),
			cache_ttl: Duration::from_secs(300),
			cache_capacity: 1_024,
			token_refresh_margin: Duration::from_secs(60),
			request_timeout: None,
			webhook_secret: None,
		}
	}
}

mod millis {
	// crates.io
	use serde::{Deserialize, Deserializer, Serializer};
	// self
	use crate::_prelude::Duration;

	pub fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
	}

	pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
	where
		D: Deserializer<'de>,
	{
		u64::deserialize(deserializer).map(Duration::from_millis)
	}
}

mod millis_opt {
	// crates.io
	use serde::{Deserialize, Deserializer, Serializer};
	// self
	use crate::_prelude::Duration;

	pub fn serialize<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		match value {
			Some(duration) => super::millis::serialize(duration, serializer),
			None => serializer.serialize_none(),
		}
	}

	pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
	where
		D: Deserializer<'de>,
	{
		Option::<u64>::deserialize(deserializer).map(|value| value.map(Duration::from_millis))
	}
}

//! Runtime error types and the fixed failure taxonomy surfaced to generated clients.

// self
use crate::{
	_prelude::*,
	http::{RequestDescriptor, ResponseEnvelope},
};

/// Runtime-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Boxed error used for opaque transport and handler failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical runtime error exposed by construction-time APIs.
///
/// Call-time failures are reported as [`ErrorEvent`] values instead.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Credential acquisition failure.
	#[error(transparent)]
	Auth(#[from] AuthError),
	/// Transport failure (DNS, TCP, TLS).
	#[error(transparent)]
	Transport(#[from] TransportError),
}

/// Configuration and validation failures raised while assembling the runtime.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// No transport was supplied and the default transport is disabled.
	#[error("No transport is configured; enable the `reqwest` feature or supply one.")]
	MissingTransport,
	/// Configuration document could not be parsed.
	#[error("Configuration is malformed at `{path}`.")]
	Malformed {
		/// JSON path of the offending value.
		path: String,
		/// Underlying parsing failure.
		#[source]
		source: serde_json::Error,
	},
	/// An endpoint URL could not be parsed.
	#[error("URL is invalid.")]
	InvalidUrl {
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// HTTP method is not supported by the runtime.
	#[error("HTTP method `{method}` is not supported.")]
	UnsupportedMethod {
		/// Method string as received.
		method: String,
	},
	/// Rate bounds are not positive or the floor exceeds the ceiling.
	#[error("Rate floor {rate_floor} must be positive and must not exceed max rate {max_rate}.")]
	InvalidRate {
		/// Configured ceiling.
		max_rate: f64,
		/// Configured floor.
		rate_floor: f64,
	},
	/// Additive-increase parameters are out of range.
	#[error("Rate increase step must be non-negative and the success interval at least 1.")]
	InvalidRateIncrease,
	/// Backoff base is zero or exceeds the cap.
	#[error("Backoff base must be positive and must not exceed the backoff cap.")]
	InvalidBackoff,
	/// Cache capacity is zero.
	#[error("Cache capacity must be at least 1.")]
	ZeroCacheCapacity,
	/// Webhook dispatch was requested without a secret.
	#[error("Webhook secret is not configured.")]
	MissingWebhookSecret,
	/// Webhook secret is empty, so anyone could compute valid signatures.
	#[error("Webhook secret must not be empty.")]
	EmptyWebhookSecret,
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
impl From<serde_path_to_error::Error<serde_json::Error>> for ConfigError {
	fn from(e: serde_path_to_error::Error<serde_json::Error>) -> Self {
		let path = e.path().to_string();

		Self::Malformed { path, source: e.into_inner() }
	}
}
impl From<url::ParseError> for ConfigError {
	fn from(source: url::ParseError) -> Self {
		Self::InvalidUrl { source }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Credential lifecycle failures raised by the token manager and its sources.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum AuthError {
	/// The request needs a bearer token but no token manager is configured.
	#[error("Request requires authentication but no token manager is configured.")]
	NotConfigured,
	/// The credential provider rejected the client or grant.
	#[error("Credential provider rejected the request: {reason}.")]
	Rejected {
		/// Provider-supplied reason string.
		reason: String,
	},
	/// The credential provider could not be reached or answered unexpectedly.
	#[error("Credential provider is unavailable: {reason}.")]
	Unavailable {
		/// Transport- or provider-supplied reason string.
		reason: String,
	},
	/// Token response omitted `expires_in`.
	#[error("Token response is missing expires_in.")]
	MissingExpiry,
	/// A refresh failed; the manager refuses to hand out tokens until re-authentication.
	#[error("Token is invalid; re-authentication is required.")]
	Invalid,
	/// The caller's deadline elapsed while waiting for a token.
	#[error("Timed out waiting for a token.")]
	Timeout,
}

/// Transport-level failures (network, IO, unreadable responses).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Connection could not be established; no request bytes reached the server.
	#[error("Connection could not be established.")]
	Connect {
		/// Transport-specific connection error.
		#[source]
		source: BoxError,
	},
	/// The request timed out.
	#[error("Request timed out.")]
	Timeout {
		/// Transport-specific timeout error.
		#[source]
		source: BoxError,
	},
	/// Underlying HTTP client reported a network failure after the connection was made.
	#[error("Network error occurred while sending the request.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Response could not be read or decoded.
	#[error("Response is malformed: {message}.")]
	Malformed {
		/// Description of the decoding failure.
		message: String,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while sending the request.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a connection-establishment failure.
	pub fn connect(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Connect { source: Box::new(src) }
	}

	/// Wraps a timeout failure.
	pub fn timeout(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Timeout { source: Box::new(src) }
	}

	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}

	/// Returns `true` when the failure happened before any request bytes were sent.
	pub fn sent_nothing(&self) -> bool {
		matches!(self, Self::Connect { .. })
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		if e.is_timeout() {
			Self::timeout(e)
		} else if e.is_connect() {
			Self::connect(e)
		} else if e.is_decode() || e.is_body() {
			Self::Malformed { message: e.to_string() }
		} else {
			Self::network(e)
		}
	}
}

/// Fixed failure taxonomy every terminal outcome is classified into.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ErrorKind {
	/// Upstream rejected the call for exceeding its rate limit.
	RateLimitExceeded,
	/// Credentials were missing, rejected, or could not be obtained.
	AuthenticationFailed,
	/// Upstream rejected the request payload or parameters.
	ValidationError,
	/// Target resource does not exist.
	NotFound,
	/// Upstream failed with a 5xx status.
	ServerError,
	/// Connection or network failure.
	NetworkError,
	/// A deadline or upstream timeout elapsed.
	Timeout,
	/// Anything outside the other categories, including malformed responses.
	Unknown,
}
impl ErrorKind {
	/// Every kind, in declaration order.
	pub const ALL: [Self; 8] = [
		Self::RateLimitExceeded,
		Self::AuthenticationFailed,
		Self::ValidationError,
		Self::NotFound,
		Self::ServerError,
		Self::NetworkError,
		Self::Timeout,
		Self::Unknown,
	];

	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::RateLimitExceeded => "rate_limit_exceeded",
			Self::AuthenticationFailed => "authentication_failed",
			Self::ValidationError => "validation_error",
			Self::NotFound => "not_found",
			Self::ServerError => "server_error",
			Self::NetworkError => "network_error",
			Self::Timeout => "timeout",
			Self::Unknown => "unknown",
		}
	}
}
impl Display for ErrorKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Underlying reason attached to an [`ErrorEvent`].
#[derive(Debug, ThisError)]
pub enum ErrorCause {
	/// Upstream answered with a non-success status.
	#[error("Upstream responded with HTTP {status}.")]
	Status {
		/// HTTP status code.
		status: u16,
	},
	/// The transport failed.
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// No token could be attached.
	#[error(transparent)]
	Auth(#[from] AuthError),
	/// No throttle slot became available before the caller's deadline.
	#[error("No throttle slot became available before the deadline.")]
	ThrottleTimeout,
}

/// Terminal failure of one logical call, returned to the caller and routed to callbacks.
#[derive(Debug, ThisError)]
#[error("Call failed with {kind} after {attempts} attempt(s): {cause}")]
pub struct ErrorEvent {
	/// Classified failure kind.
	pub kind: ErrorKind,
	/// Classification of the last attempt.
	///
	/// Equal to `kind` unless the caller's deadline ended the call before the next retry, in
	/// which case `kind` is [`ErrorKind::Timeout`] and this keeps what the upstream answered.
	pub attempt_kind: ErrorKind,
	/// Descriptor of the call that failed.
	pub descriptor: RequestDescriptor,
	/// Underlying cause.
	#[source]
	pub cause: ErrorCause,
	/// Number of attempts made, including the first.
	pub attempts: u32,
	/// Final response, when the failure came from an HTTP status.
	pub response: Option<ResponseEnvelope>,
}
impl ErrorEvent {
	/// Creates an event without a response envelope.
	pub fn new(
		kind: ErrorKind,
		descriptor: RequestDescriptor,
		cause: impl Into<ErrorCause>,
		attempts: u32,
	) -> Self {
		Self { kind, attempt_kind: kind, descriptor, cause: cause.into(), attempts, response: None }
	}

	/// Relabels the event as [`ErrorKind::Timeout`], keeping the attempt's classification.
	pub fn into_deadline_timeout(mut self) -> Self {
		self.kind = ErrorKind::Timeout;

		self
	}

	/// Attaches the final response envelope.
	pub fn with_response(mut self, response: ResponseEnvelope) -> Self {
		self.response = Some(response);

		self
	}

	/// HTTP status of the final response, if one was received.
	pub fn status(&self) -> Option<u16> {
		self.response.as_ref().map(|response| response.status)
	}
}

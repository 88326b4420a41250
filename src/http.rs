//! Transport seam and the request/response value types shared across the runtime.
//!
//! [`Transport`] is the runtime's only dependency on an HTTP stack. The default
//! [`ReqwestTransport`] is enabled by the `reqwest` feature; tests and embedders supply their
//! own implementation (typically behind `Arc<T>`) to script responses or reuse an existing
//! client.

mod request;
mod response;
#[cfg(feature = "reqwest")] mod client;

#[cfg(feature = "reqwest")] pub use client::*;
pub use request::*;
pub use response::*;

// self
use crate::{_prelude::*, error::{ConfigError, TransportError}};

/// Boxed future returned by [`Transport::send`].
pub type TransportFuture<'a> =
	Pin<Box<dyn Future<Output = Result<ResponseEnvelope, TransportError>> + 'a + Send>>;

/// Executes one HTTP exchange.
///
/// Implementations must be `Send + Sync + 'static` so one transport can be shared by every
/// executor of a client. A non-2xx status is a successful exchange; only failures to obtain a
/// response are reported as [`TransportError`].
pub trait Transport
where
	Self: 'static + Send + Sync,
{
	/// Sends `request` and resolves with the upstream response.
	fn send(&self, request: OutboundRequest) -> TransportFuture<'_>;
}
impl<T> Transport for Arc<T>
where
	T: ?Sized + Transport,
{
	fn send(&self, request: OutboundRequest) -> TransportFuture<'_> {
		(**self).send(request)
	}
}

/// HTTP methods understood by the runtime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
	/// `GET`.
	Get,
	/// `HEAD`.
	Head,
	/// `OPTIONS`.
	Options,
	/// `PUT`.
	Put,
	/// `DELETE`.
	Delete,
	/// `POST`.
	Post,
	/// `PATCH`.
	Patch,
}
impl Method {
	/// Uppercase wire representation.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Get => "GET",
			Self::Head => "HEAD",
			Self::Options => "OPTIONS",
			Self::Put => "PUT",
			Self::Delete => "DELETE",
			Self::Post => "POST",
			Self::Patch => "PATCH",
		}
	}

	/// Whether repeating the request leaves the server in the same state.
	pub const fn is_idempotent(self) -> bool {
		!matches!(self, Self::Post | Self::Patch)
	}

	/// Whether the method only reads.
	pub const fn is_safe(self) -> bool {
		matches!(self, Self::Get | Self::Head | Self::Options)
	}
}
impl Display for Method {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
impl FromStr for Method {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_uppercase().as_str() {
			"GET" => Ok(Self::Get),
			"HEAD" => Ok(Self::Head),
			"OPTIONS" => Ok(Self::Options),
			"PUT" => Ok(Self::Put),
			"DELETE" => Ok(Self::Delete),
			"POST" => Ok(Self::Post),
			"PATCH" => Ok(Self::Patch),
			_ => Err(ConfigError::UnsupportedMethod { method: s.to_owned() }),
		}
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn methods_parse_case_insensitively() {
		assert_eq!("get".parse::<Method>().expect("GET should parse."), Method::Get);
		assert_eq!("Patch".parse::<Method>().expect("PATCH should parse."), Method::Patch);
		assert!(matches!(
			"TRACE".parse::<Method>(),
			Err(ConfigError::UnsupportedMethod { method }) if method == "TRACE"
		));
	}

	#[test]
	fn only_post_and_patch_are_non_idempotent() {
		let non_idempotent = [
			Method::Get,
			Method::Head,
			Method::Options,
			Method::Put,
			Method::Delete,
			Method::Post,
			Method::Patch,
		]
		.into_iter()
		.filter(|method| !method.is_idempotent())
		.collect::<Vec<_>>();

		assert_eq!(non_idempotent, [Method::Post, Method::Patch]);
	}
}

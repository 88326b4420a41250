// self
use crate::{
	_prelude::*,
	http::{OutboundRequest, ResponseEnvelope},
};

/// Hook applied to every outbound attempt, in registration order.
///
/// `prepare` runs after the bearer token is attached and before the throttle permit is
/// spent; `observe` sees every response the transport returned, successful or not.
pub trait RequestMiddleware
where
	Self: 'static + Send + Sync,
{
	/// Stable name used in logs.
	fn name(&self) -> &str;

	/// Adjusts the outbound request.
	fn prepare(&self, request: &mut OutboundRequest);

	/// Inspects a response. The default implementation does nothing.
	fn observe(&self, response: &ResponseEnvelope) {
		let _ = response;
	}
}

/// Adds fixed headers to every request.
#[derive(Clone, Debug, Default)]
pub struct StaticHeaders {
	headers: BTreeMap<String, String>,
}
impl StaticHeaders {
	/// Creates an empty header set.
	pub fn new() -> Self {
		Self::default()
	}

	/// Adds a header; the name is lowercased.
	pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
		self.headers.insert(name.as_ref().to_ascii_lowercase(), value.into());

		self
	}
}
impl RequestMiddleware for StaticHeaders {
	fn name(&self) -> &str {
		"static_headers"
	}

	fn prepare(&self, request: &mut OutboundRequest) {
		for (name, value) in &self.headers {
			request.set_header(name, value.clone());
		}
	}
}

// crates.io
use reqwest::redirect::Policy;
// self
use crate::{
	_prelude::*,
	config::RuntimeConfig,
	error::{ConfigError, TransportError},
	http::{Method, OutboundRequest, ResponseEnvelope, Transport, TransportFuture},
};

/// Default [`Transport`] backed by [`ReqwestClient`].
///
/// Redirects are not followed so retry and cache decisions always see the status the
/// upstream actually returned.
#[derive(Clone, Debug)]
pub struct ReqwestTransport {
	client: ReqwestClient,
	timeout: Option<Duration>,
}
impl ReqwestTransport {
	/// Builds a client honoring the configured per-attempt timeout.
	pub fn new(config: &RuntimeConfig) -> Result<Self, ConfigError> {
		let client = ReqwestClient::builder().redirect(Policy::none()).build()?;

		Ok(Self { client, timeout: config.request_timeout })
	}

	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self { client, timeout: None }
	}

	/// Applies a per-attempt timeout.
	pub fn with_timeout(mut self, timeout: Duration) -> Self {
		self.timeout = Some(timeout);

		self
	}
}
impl Transport for ReqwestTransport {
	fn send(&self, request: OutboundRequest) -> TransportFuture<'_> {
		Box::pin(async move {
			let descriptor = request.into_descriptor();
			let mut builder = self
				.client
				.request(to_reqwest_method(descriptor.method()), descriptor.url().clone());

			for (name, value) in descriptor.headers() {
				builder = builder.header(name.as_str(), value.as_str());
			}
			if let Some(body) = descriptor.body() {
				builder = builder.body(body.to_vec());
			}
			if let Some(timeout) = self.timeout {
				builder = builder.timeout(timeout);
			}

			let response = builder.send().await?;
			let status = response.status().as_u16();
			let headers = response
				.headers()
				.iter()
				.filter_map(|(name, value)| {
					value.to_str().ok().map(|value| (name.as_str().to_owned(), value.to_owned()))
				})
				.collect::<BTreeMap<_, _>>();
			let body = response.bytes().await?.to_vec();
			let mut envelope = ResponseEnvelope::new(status, body);

			envelope.headers = headers;

			Ok(envelope)
		})
	}
}

fn to_reqwest_method(method: Method) -> reqwest::Method {
	match method {
		Method::Get => reqwest::Method::GET,
		Method::Head => reqwest::Method::HEAD,
		Method::Options => reqwest::Method::OPTIONS,
		Method::Put => reqwest::Method::PUT,
		Method::Delete => reqwest::Method::DELETE,
		Method::Post => reqwest::Method::POST,
		Method::Patch => reqwest::Method::PATCH,
	}
}

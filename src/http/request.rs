// self
use crate::{_prelude::*, http::Method};

const REDACTED_HEADERS: [&str; 3] = ["authorization", "proxy-authorization", "cookie"];

/// Immutable description of one logical call.
///
/// Header names are stored lowercased. Idempotency defaults to the method's semantics and
/// cacheability defaults to `GET`; generated code overrides either per operation.
#[derive(Clone, PartialEq, Eq)]
pub struct RequestDescriptor {
	method: Method,
	url: Url,
	headers: BTreeMap<String, String>,
	body: Option<Vec<u8>>,
	idempotent: bool,
	cacheable: bool,
	requires_auth: bool,
}
impl RequestDescriptor {
	/// Starts a builder for `method` against `url`.
	pub fn builder(method: Method, url: Url) -> RequestDescriptorBuilder {
		RequestDescriptorBuilder {
			descriptor: Self {
				idempotent: method.is_idempotent(),
				cacheable: matches!(method, Method::Get),
				method,
				url,
				headers: BTreeMap::new(),
				body: None,
				requires_auth: false,
			},
		}
	}

	/// Reopens the descriptor for modification, e.g. to derive the next page request.
	pub fn to_builder(&self) -> RequestDescriptorBuilder {
		RequestDescriptorBuilder { descriptor: self.clone() }
	}

	/// HTTP method.
	pub fn method(&self) -> Method {
		self.method
	}

	/// Absolute target URL, including the query string.
	pub fn url(&self) -> &Url {
		&self.url
	}

	/// Request headers keyed by lowercase name.
	pub fn headers(&self) -> &BTreeMap<String, String> {
		&self.headers
	}

	/// Looks up a header by case-insensitive name.
	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
	}

	/// Request body bytes.
	pub fn body(&self) -> Option<&[u8]> {
		self.body.as_deref()
	}

	/// Whether the call may be repeated without additional side effects.
	pub fn is_idempotent(&self) -> bool {
		self.idempotent
	}

	/// Whether a successful response may be served from the cache.
	pub fn is_cacheable(&self) -> bool {
		self.cacheable
	}

	/// Whether a bearer token must be attached.
	pub fn requires_auth(&self) -> bool {
		self.requires_auth
	}
}
impl Debug for RequestDescriptor {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		let headers = self
			.headers
			.iter()
			.map(|(name, value)| {
				let value = if REDACTED_HEADERS.contains(&name.as_str()) {
					"<redacted>"
				} else {
					value.as_str()
				};

				(name.as_str(), value)
			})
			.collect::<BTreeMap<_, _>>();

		f.debug_struct("RequestDescriptor")
			.field("method", &self.method)
			.field("url", &self.url.as_str())
			.field("headers", &headers)
			.field("body_len", &self.body.as_ref().map(Vec::len))
			.field("idempotent", &self.idempotent)
			.field("cacheable", &self.cacheable)
			.field("requires_auth", &self.requires_auth)
			.finish()
	}
}

/// Builder for [`RequestDescriptor`].
#[derive(Clone, Debug)]
pub struct RequestDescriptorBuilder {
	descriptor: RequestDescriptor,
}
impl RequestDescriptorBuilder {
	/// Sets a header, replacing any previous value with the same name.
	pub fn header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
		self.descriptor.headers.insert(name.as_ref().to_ascii_lowercase(), value.into());

		self
	}

	/// Sets a query parameter, replacing every existing pair with the same key.
	pub fn query(mut self, key: &str, value: &str) -> Self {
		set_query_param(&mut self.descriptor.url, key, Some(value));

		self
	}

	/// Removes every query pair with `key`.
	pub fn remove_query(mut self, key: &str) -> Self {
		set_query_param(&mut self.descriptor.url, key, None);

		self
	}

	/// Sets raw body bytes.
	pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
		self.descriptor.body = Some(body.into());

		self
	}

	/// Serializes `value` as the JSON body and sets `content-type`.
	pub fn json_value(mut self, value: &serde_json::Value) -> Self {
		self.descriptor.body = Some(value.to_string().into_bytes());
		self.descriptor.headers.insert("content-type".into(), "application/json".into());

		self
	}

	/// Overrides the idempotency flag.
	pub fn idempotent(mut self, idempotent: bool) -> Self {
		self.descriptor.idempotent = idempotent;

		self
	}

	/// Overrides the cacheability flag.
	pub fn cacheable(mut self, cacheable: bool) -> Self {
		self.descriptor.cacheable = cacheable;

		self
	}

	/// Marks the call as requiring a bearer token.
	pub fn requires_auth(mut self, requires_auth: bool) -> Self {
		self.descriptor.requires_auth = requires_auth;

		self
	}

	/// Finalizes the descriptor.
	pub fn build(self) -> RequestDescriptor {
		self.descriptor
	}
}

/// Mutable per-attempt request handed to middleware and the transport.
///
/// Headers added here (bearer token, middleware headers) never leak back into the caller's
/// descriptor or the cache fingerprint.
#[derive(Clone, Debug)]
pub struct OutboundRequest {
	descriptor: RequestDescriptor,
}
impl OutboundRequest {
	/// Starts an attempt from a descriptor.
	pub fn new(descriptor: RequestDescriptor) -> Self {
		Self { descriptor }
	}

	/// Current request contents.
	pub fn descriptor(&self) -> &RequestDescriptor {
		&self.descriptor
	}

	/// Sets a header for this attempt only.
	pub fn set_header(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
		self.descriptor.headers.insert(name.as_ref().to_ascii_lowercase(), value.into());
	}

	/// Removes a header for this attempt.
	pub fn remove_header(&mut self, name: &str) -> Option<String> {
		self.descriptor.headers.remove(&name.to_ascii_lowercase())
	}

	/// Consumes the attempt and returns the final request contents.
	pub fn into_descriptor(self) -> RequestDescriptor {
		self.descriptor
	}
}
impl From<RequestDescriptor> for OutboundRequest {
	fn from(descriptor: RequestDescriptor) -> Self {
		Self::new(descriptor)
	}
}

fn set_query_param(url: &mut Url, key: &str, value: Option<&str>) {
	let kept = url
		.query_pairs()
		.filter(|(k, _)| k != key)
		.map(|(k, v)| (k.into_owned(), v.into_owned()))
		.collect::<Vec<_>>();

	if kept.is_empty() && value.is_none() {
		url.set_query(None);

		return;
	}

	let mut pairs = url.query_pairs_mut();

	pairs.clear();

	for (k, v) in &kept {
		pairs.append_pair(k, v);
	}
	if let Some(value) = value {
		pairs.append_pair(key, value);
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn url(raw: &str) -> Url {
		Url::parse(raw).expect("Fixture URL should parse.")
	}

	#[test]
	fn defaults_follow_method_semantics() {
		let get = RequestDescriptor::builder(Method::Get, url("https://api.example.com/a")).build();
		let post =
			RequestDescriptor::builder(Method::Post, url("https://api.example.com/a")).build();
		let put = RequestDescriptor::builder(Method::Put, url("https://api.example.com/a")).build();

		assert!(get.is_idempotent() && get.is_cacheable());
		assert!(!post.is_idempotent() && !post.is_cacheable());
		assert!(put.is_idempotent() && !put.is_cacheable());
		assert!(!get.requires_auth());
	}

	#[test]
	fn query_replaces_existing_key() {
		let descriptor = RequestDescriptor::builder(
			Method::Get,
			url("https://api.example.com/items?limit=10&page_token=a"),
		)
		.query("page_token", "b")
		.build();

		assert_eq!(descriptor.url().query(), Some("limit=10&page_token=b"));

		let cleared = descriptor.to_builder().remove_query("page_token").remove_query("limit").build();

		assert_eq!(cleared.url().query(), None);
	}

	#[test]
	fn headers_are_case_insensitive_and_redacted_in_debug() {
		let descriptor = RequestDescriptor::builder(Method::Get, url("https://api.example.com"))
			.header("Authorization", "Bearer secret-token")
			.header("X-Trace", "abc")
			.build();

		assert_eq!(descriptor.header("authorization"), Some("Bearer secret-token"));
		assert_eq!(descriptor.header("x-trace"), Some("abc"));

		let debug = format!("{descriptor:?}");

		assert!(!debug.contains("secret-token"));
		assert!(debug.contains("abc"));
	}

	#[test]
	fn outbound_headers_do_not_touch_the_source_descriptor() {
		let descriptor =
			RequestDescriptor::builder(Method::Get, url("https://api.example.com")).build();
		let mut outbound = OutboundRequest::new(descriptor.clone());

		outbound.set_header("Authorization", "Bearer t");

		assert_eq!(outbound.descriptor().header("authorization"), Some("Bearer t"));
		assert!(descriptor.header("authorization").is_none());
	}
}

// crates.io
use sha2::{Digest, Sha256};
// self
use crate::{_prelude::*, http::RequestDescriptor};

/// Stable identity of a request for caching purposes.
///
/// SHA-256 over the method, the URL with its query pairs sorted and fragment dropped, and the
/// body. JSON bodies are re-serialized with sorted keys first, so key order and whitespace do
/// not change the fingerprint. Per-attempt headers never contribute.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 32]);
impl Fingerprint {
	/// Computes the fingerprint of `descriptor`.
	pub fn of(descriptor: &RequestDescriptor) -> Self {
		let mut hasher = Sha256::new();

		hasher.update(descriptor.method().as_str().as_bytes());
		hasher.update([0_u8]);
		hasher.update(normalized_url(descriptor.url()).as_bytes());
		hasher.update([0_u8]);

		if let Some(body) = descriptor.body() {
			match serde_json::from_slice::<serde_json::Value>(body) {
				Ok(value) => hasher.update(value.to_string().as_bytes()),
				Err(_) => hasher.update(body),
			}
		}

		Self(hasher.finalize().into())
	}

	/// Lowercase hex rendering.
	pub fn to_hex(&self) -> String {
		hex::encode(self.0)
	}
}
impl Debug for Fingerprint {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("Fingerprint").field(&self.to_hex()).finish()
	}
}
impl Display for Fingerprint {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.to_hex())
	}
}
impl From<&RequestDescriptor> for Fingerprint {
	fn from(descriptor: &RequestDescriptor) -> Self {
		Self::of(descriptor)
	}
}

fn normalized_url(url: &Url) -> String {
	let mut url = url.clone();
	let mut pairs = url
		.query_pairs()
		.map(|(k, v)| (k.into_owned(), v.into_owned()))
		.collect::<Vec<_>>();

	pairs.sort();
	url.set_fragment(None);

	if pairs.is_empty() {
		url.set_query(None);
	} else {
		url.query_pairs_mut().clear().extend_pairs(pairs);
	}

	url.into()
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::http::Method;

	fn descriptor(method: Method, raw: &str, body: Option<&str>) -> RequestDescriptor {
		let builder =
			RequestDescriptor::builder(method, Url::parse(raw).expect("Fixture URL should parse."));

		match body {
			Some(body) => builder.body(body.as_bytes().to_vec()).build(),
			None => builder.build(),
		}
	}

	#[test]
	fn query_order_and_fragment_are_ignored() {
		let a = descriptor(Method::Get, "https://api.example.com/users?b=2&a=1#top", None);
		let b = descriptor(Method::Get, "https://api.example.com/users?a=1&b=2", None);

		assert_eq!(Fingerprint::of(&a), Fingerprint::of(&b));
	}

	#[test]
	fn json_key_order_and_whitespace_are_ignored() {
		let a = descriptor(Method::Post, "https://api.example.com/q", Some(r#"{"b":1,"a":[1,2]}"#));
		let b = descriptor(
			Method::Post,
			"https://api.example.com/q",
			Some("{ \"a\": [1, 2],\n \"b\": 1 }"),
		);

		assert_eq!(Fingerprint::of(&a), Fingerprint::of(&b));
	}

	#[test]
	fn method_and_non_json_body_contribute() {
		let get = descriptor(Method::Get, "https://api.example.com/q", None);
		let head = descriptor(Method::Head, "https://api.example.com/q", None);
		let text_a = descriptor(Method::Post, "https://api.example.com/q", Some("a=1"));
		let text_b = descriptor(Method::Post, "https://api.example.com/q", Some("a=2"));

		assert_ne!(Fingerprint::of(&get), Fingerprint::of(&head));
		assert_ne!(Fingerprint::of(&text_a), Fingerprint::of(&text_b));
		assert_eq!(Fingerprint::of(&get).to_hex().len(), 64);
	}

	#[test]
	fn auth_headers_do_not_contribute() {
		let plain = descriptor(Method::Get, "https://api.example.com/me", None);
		let authed = plain.to_builder().header("authorization", "Bearer a").build();

		assert_eq!(Fingerprint::of(&plain), Fingerprint::of(&authed));
	}
}

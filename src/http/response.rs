// crates.io
use serde::de::DeserializeOwned;
use time::format_description::well_known::Rfc2822;
// self
use crate::{_prelude::*, error::TransportError};

/// Upstream response as seen by the runtime, the cache, and error callbacks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResponseEnvelope {
	/// HTTP status code.
	pub status: u16,
	/// Response headers keyed by lowercase name.
	pub headers: BTreeMap<String, String>,
	/// Raw response body.
	pub body: Vec<u8>,
	/// Wall-clock receive time.
	pub received_at: OffsetDateTime,
}
impl ResponseEnvelope {
	/// Creates an envelope stamped with the current time.
	pub fn new(status: u16, body: Vec<u8>) -> Self {
		Self { status, headers: BTreeMap::new(), body, received_at: OffsetDateTime::now_utc() }
	}

	/// Adds a header; the name is lowercased.
	pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
		self.headers.insert(name.as_ref().to_ascii_lowercase(), value.into());

		self
	}

	/// Whether the status is in the 2xx range.
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}

	/// Looks up a header by case-insensitive name.
	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
	}

	/// Parses `Retry-After` as delta-seconds or an HTTP date; past dates yield `None`.
	pub fn retry_after(&self) -> Option<Duration> {
		let raw = self.header("retry-after")?.trim();

		if let Ok(secs) = raw.parse::<u64>() {
			return Some(Duration::from_secs(secs));
		}
		if let Ok(moment) = OffsetDateTime::parse(raw, &Rfc2822) {
			let delta = moment - OffsetDateTime::now_utc();

			if delta.is_positive() {
				return delta.try_into().ok();
			}
		}

		None
	}

	/// Deserializes the body as JSON.
	pub fn json<T>(&self) -> Result<T, TransportError>
	where
		T: DeserializeOwned,
	{
		let mut deserializer = serde_json::Deserializer::from_slice(&self.body);

		serde_path_to_error::deserialize(&mut deserializer).map_err(|e| {
			TransportError::Malformed { message: format!("{} at `{}`", e.inner(), e.path()) }
		})
	}
}

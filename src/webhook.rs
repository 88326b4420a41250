//! Inbound webhook verification and dispatch, plus outbound subscription registration.
//!
//! [`WebhookDispatcher::handle`] authenticates a delivery with HMAC-SHA256 over the raw body
//! before anything else looks at it. Rejected deliveries never reach a handler. Accepted
//! deliveries are routed by event type to handlers that run in registration order, with
//! failures isolated the same way as [`ErrorRouter`](crate::router::ErrorRouter) callbacks.

pub mod signature;

// std
use std::sync::atomic::{AtomicU64, Ordering};
// crates.io
use serde_json::Value;
// self
use crate::{
	_prelude::*,
	auth::Secret,
	config::RuntimeConfig,
	error::{ConfigError, ErrorEvent},
	executor::{CallContext, RequestExecutor},
	http::{Method, RequestDescriptor, ResponseEnvelope},
	obs::{self, CallOutcome, CallSpan, Component},
	router::{self, CallbackId, DispatchMetrics, HandlerError},
};

/// Why a delivery was refused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, ThisError)]
pub enum RejectReason {
	/// No signature header accompanied the delivery.
	#[error("Webhook signature is missing.")]
	MissingSignature,
	/// The signature is not `sha256=<hex>`, bare hex, or base64 of a SHA-256 digest.
	#[error("Webhook signature is malformed.")]
	MalformedSignature,
	/// The signature does not match the payload.
	#[error("Webhook signature does not match the payload.")]
	SignatureMismatch,
	/// The verified payload is not a JSON object.
	#[error("Webhook payload is not a JSON object.")]
	UndecodablePayload,
	/// The payload carries neither `event_type` nor `type`.
	#[error("Webhook payload has no event type.")]
	MissingEventType,
}
impl RejectReason {
	/// Returns a stable label suitable for logs.
	pub const fn as_str(self) -> &'static str {
		match self {
			RejectReason::MissingSignature => "missing_signature",
			RejectReason::MalformedSignature => "malformed_signature",
			RejectReason::SignatureMismatch => "signature_mismatch",
			RejectReason::UndecodablePayload => "undecodable_payload",
			RejectReason::MissingEventType => "missing_event_type",
		}
	}
}

/// Result of handling one delivery.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WebhookOutcome {
	/// Signature verified and handlers ran.
	Accepted {
		/// Event type the delivery was routed by.
		event_type: String,
		/// Handlers invoked.
		handled: usize,
		/// Handlers that returned an error or panicked.
		failed: usize,
	},
	/// Delivery refused before any handler ran.
	Rejected(RejectReason),
}
impl WebhookOutcome {
	/// Whether the delivery passed verification.
	pub fn is_accepted(&self) -> bool {
		matches!(self, Self::Accepted { .. })
	}
}

/// A verified delivery as seen by handlers.
#[derive(Clone, Debug)]
pub struct WebhookEvent {
	/// Event type from `event_type` (or `type`).
	pub event_type: String,
	/// Decoded JSON body.
	pub body: Value,
	/// Raw payload bytes exactly as received.
	pub payload: Vec<u8>,
	/// Signature header as received.
	pub signature: String,
	/// Whether the signature was verified; always `true` for dispatched events.
	pub verified: bool,
}

/// Handler for verified deliveries of one event type.
pub trait WebhookHandler
where
	Self: 'static + Send + Sync,
{
	/// Handles one event.
	fn handle(&self, event: &WebhookEvent) -> Result<(), HandlerError>;
}

type Registration = (CallbackId, Arc<dyn WebhookHandler>);

/// Verifies and routes inbound webhook deliveries.
pub struct WebhookDispatcher {
	secret: Secret,
	registry: RwLock<HashMap<String, Vec<Registration>>>,
	next_id: AtomicU64,
	rejected: AtomicU64,
	metrics: DispatchMetrics,
}
impl WebhookDispatcher {
	/// Creates a dispatcher verifying deliveries with `secret`, which must not be empty.
	pub fn new(secret: impl Into<Secret>) -> Result<Self, ConfigError> {
		let secret = secret.into();

		if secret.expose().is_empty() {
			return Err(ConfigError::EmptyWebhookSecret);
		}

		Ok(Self {
			secret,
			registry: Default::default(),
			next_id: AtomicU64::new(0),
			rejected: AtomicU64::new(0),
			metrics: DispatchMetrics::default(),
		})
	}

	/// Creates a dispatcher from the configured `webhookSecret`.
	pub fn from_config(config: &RuntimeConfig) -> Result<Self, ConfigError> {
		let secret = config.webhook_secret.clone().ok_or(ConfigError::MissingWebhookSecret)?;

		Self::new(secret)
	}

	/// Registers a closure for `event_type`.
	pub fn register_handler<F>(&self, event_type: impl Into<String>, handler: F) -> CallbackId
	where
		F: 'static + Send + Sync + Fn(&WebhookEvent) -> Result<(), HandlerError>,
	{
		self.register_shared(event_type, Arc::new(FnHandler(handler)))
	}

	/// Registers a shared handler for `event_type`.
	pub fn register_shared(
		&self,
		event_type: impl Into<String>,
		handler: Arc<dyn WebhookHandler>,
	) -> CallbackId {
		let id = CallbackId(self.next_id.fetch_add(1, Ordering::Relaxed));

		self.registry.write().entry(event_type.into()).or_default().push((id, handler));

		id
	}

	/// Removes a registration, returning whether it existed.
	pub fn unregister_handler(&self, event_type: &str, id: CallbackId) -> bool {
		let mut registry = self.registry.write();
		let Some(handlers) = registry.get_mut(event_type) else {
			return false;
		};
		let before = handlers.len();

		handlers.retain(|(registered, _)| *registered != id);

		let removed = handlers.len() != before;

		if handlers.is_empty() {
			registry.remove(event_type);
		}

		removed
	}

	/// Number of handlers registered for `event_type`.
	pub fn handler_count(&self, event_type: &str) -> usize {
		self.registry.read().get(event_type).map_or(0, Vec::len)
	}

	/// Dispatch counters for accepted deliveries.
	pub fn metrics(&self) -> &DispatchMetrics {
		&self.metrics
	}

	/// Deliveries rejected so far.
	pub fn rejected(&self) -> u64 {
		self.rejected.load(Ordering::Relaxed)
	}

	/// Verifies `payload` against `signature` and routes it to the handlers for its event type.
	pub fn handle(&self, payload: &[u8], signature_header: Option<&str>) -> WebhookOutcome {
		obs::record_call_outcome(Component::Webhook, CallOutcome::Attempt);

		let event = match self.verify(payload, signature_header) {
			Ok(event) => event,
			Err(reason) => {
				self.rejected.fetch_add(1, Ordering::Relaxed);

				obs::webhook_rejected(&reason);
				obs::record_call_outcome(Component::Webhook, CallOutcome::Failure);

				return WebhookOutcome::Rejected(reason);
			},
		};
		let handlers = self.registry.read().get(&event.event_type).cloned().unwrap_or_default();

		self.metrics.routed.incr();

		if handlers.is_empty() {
			self.metrics.unhandled.incr();
		}

		let mut failed = 0;

		for (_, handler) in &handlers {
			if let Err(failure) = router::run_isolated(|| handler.handle(&event)) {
				failed += 1;

				self.metrics.handler_failures.incr();
				obs::handler_failed(Component::Webhook, &event.event_type, &failure);
			}
		}

		obs::record_call_outcome(Component::Webhook, CallOutcome::Success);

		WebhookOutcome::Accepted { event_type: event.event_type, handled: handlers.len(), failed }
	}

	fn verify(
		&self,
		payload: &[u8],
		signature_header: Option<&str>,
	) -> Result<WebhookEvent, RejectReason> {
		let header = signature_header.ok_or(RejectReason::MissingSignature)?;
		let digest = signature::decode_signature(header)?;

		if !signature::verify(self.secret.expose(), payload, &digest) {
			return Err(RejectReason::SignatureMismatch);
		}

		let body = serde_json::from_slice::<Value>(payload)
			.ok()
			.filter(Value::is_object)
			.ok_or(RejectReason::UndecodablePayload)?;
		let event_type = ["event_type", "type"]
			.into_iter()
			.find_map(|field| body.get(field).and_then(Value::as_str))
			.filter(|event_type| !event_type.is_empty())
			.ok_or(RejectReason::MissingEventType)?
			.to_owned();

		Ok(WebhookEvent {
			event_type,
			body,
			payload: payload.to_vec(),
			signature: header.trim().to_owned(),
			verified: true,
		})
	}
}
impl Debug for WebhookDispatcher {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let registry = self.registry.read();
		let counts = registry
			.iter()
			.map(|(event_type, handlers)| (event_type.clone(), handlers.len()))
			.collect::<BTreeMap<_, _>>();

		f.debug_struct("WebhookDispatcher")
			.field("secret", &self.secret)
			.field("handlers", &counts)
			.finish()
	}
}

struct FnHandler<F>(F);
impl<F> WebhookHandler for FnHandler<F>
where
	F: 'static + Send + Sync + Fn(&WebhookEvent) -> Result<(), HandlerError>,
{
	fn handle(&self, event: &WebhookEvent) -> Result<(), HandlerError> {
		(self.0)(event)
	}
}

/// Subscription registered with a provider's webhook endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Subscription {
	/// URL the provider delivers events to.
	pub callback_url: Url,
	/// Event types to subscribe to.
	pub events: Vec<String>,
}
impl Subscription {
	/// Creates a subscription for `callback_url` with no event filter.
	pub fn new(callback_url: Url) -> Self {
		Self { callback_url, events: Vec::new() }
	}

	/// Subscribes to the given event types.
	pub fn with_events<I, S>(mut self, events: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.events = events.into_iter().map(Into::into).collect();

		self
	}

	/// Builds the `POST` request registering this subscription at `endpoint`.
	pub fn to_descriptor(&self, endpoint: &Url) -> RequestDescriptor {
		let body = serde_json::json!({
			"url": self.callback_url.as_str(),
			"events": self.events,
		});

		RequestDescriptor::builder(Method::Post, endpoint.clone()).json_value(&body).build()
	}
}

/// Registers `subscription` at `endpoint` through `executor`.
///
/// The request carries a bearer token when the executor has a token manager.
pub async fn subscribe(
	executor: &RequestExecutor,
	endpoint: &Url,
	subscription: &Subscription,
	ctx: &CallContext,
) -> Result<ResponseEnvelope, ErrorEvent> {
	let descriptor = subscription
		.to_descriptor(endpoint)
		.to_builder()
		.requires_auth(executor.tokens().is_some())
		.build();
	let span = CallSpan::new(Component::Webhook, "subscribe");

	span.instrument(executor.execute(descriptor, ctx)).await
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::AtomicUsize;
	// self
	use super::*;

	const SECRET: &str = "whsec-test";

	fn signed(payload: &str) -> String {
		format!(
			"sha256={}",
			signature::sign_hex(SECRET, payload.as_bytes()).expect("HMAC accepts any key length.")
		)
	}

	#[test]
	fn verified_events_reach_handlers_for_their_type() {
		let dispatcher = WebhookDispatcher::new(SECRET).expect("Dispatcher should build.");
		let seen = Arc::new(Mutex::new(Vec::new()));
		let sink = seen.clone();

		dispatcher.register_handler("invoice.paid", move |event| {
			sink.lock().push(event.body["id"].as_u64());

			Ok(())
		});
		dispatcher.register_handler("invoice.voided", |_| panic!("Wrong event type routed."));

		let payload = r#"{"event_type":"invoice.paid","id":7}"#;
		let outcome = dispatcher.handle(payload.as_bytes(), Some(&signed(payload)));

		assert_eq!(outcome, WebhookOutcome::Accepted {
			event_type: "invoice.paid".into(),
			handled: 1,
			failed: 0
		});
		assert_eq!(*seen.lock(), [Some(7)]);
	}

	#[test]
	fn type_field_is_used_when_event_type_is_absent() {
		let dispatcher = WebhookDispatcher::new(SECRET).expect("Dispatcher should build.");
		let payload = r#"{"type":"ping"}"#;
		let outcome = dispatcher.handle(payload.as_bytes(), Some(&signed(payload)));

		assert_eq!(outcome, WebhookOutcome::Accepted {
			event_type: "ping".into(),
			handled: 0,
			failed: 0
		});
		assert_eq!(dispatcher.metrics().unhandled(), 1);
	}

	#[test]
	fn rejections_never_invoke_handlers() {
		let dispatcher = WebhookDispatcher::new(SECRET).expect("Dispatcher should build.");
		let calls = Arc::new(AtomicUsize::new(0));
		let counter = calls.clone();

		dispatcher.register_handler("ping", move |_| {
			counter.fetch_add(1, Ordering::SeqCst);

			Ok(())
		});

		let payload = r#"{"event_type":"ping"}"#;
		let cases = [
			(payload, None, RejectReason::MissingSignature),
			(payload, Some("sha256=nothex".to_owned()), RejectReason::MalformedSignature),
			(payload, Some(signed(r#"{"event_type":"pong"}"#)), RejectReason::SignatureMismatch),
			("not json", Some(signed("not json")), RejectReason::UndecodablePayload),
			(r#"{"id":1}"#, Some(signed(r#"{"id":1}"#)), RejectReason::MissingEventType),
		];

		for (payload, header, reason) in cases {
			assert_eq!(
				dispatcher.handle(payload.as_bytes(), header.as_deref()),
				WebhookOutcome::Rejected(reason)
			);
		}

		assert_eq!(calls.load(Ordering::SeqCst), 0);
		assert_eq!(dispatcher.rejected(), 5);
	}

	#[test]
	fn failing_handlers_do_not_block_later_ones() {
		let dispatcher = WebhookDispatcher::new(SECRET).expect("Dispatcher should build.");
		let calls = Arc::new(AtomicUsize::new(0));
		let counter = calls.clone();

		dispatcher.register_handler("ping", |_| Err("downstream unavailable".into()));
		dispatcher.register_handler("ping", move |_| {
			counter.fetch_add(1, Ordering::SeqCst);

			Ok(())
		});

		let payload = r#"{"event_type":"ping"}"#;
		let outcome = dispatcher.handle(payload.as_bytes(), Some(&signed(payload)));

		assert_eq!(outcome, WebhookOutcome::Accepted {
			event_type: "ping".into(),
			handled: 2,
			failed: 1
		});
		assert_eq!(calls.load(Ordering::SeqCst), 1);
	}

	#[test]
	fn from_config_requires_a_secret() {
		assert!(matches!(
			WebhookDispatcher::from_config(&RuntimeConfig::default()),
			Err(ConfigError::MissingWebhookSecret)
		));

		let dispatcher =
			WebhookDispatcher::from_config(&RuntimeConfig::default().with_webhook_secret(SECRET))
				.expect("Configured secret should build a dispatcher.");

		assert!(!format!("{dispatcher:?}").contains(SECRET));
	}

	#[test]
	fn empty_secrets_are_refused() {
		assert!(matches!(WebhookDispatcher::new(""), Err(ConfigError::EmptyWebhookSecret)));
		assert!(matches!(
			WebhookDispatcher::from_config(&RuntimeConfig::default().with_webhook_secret("")),
			Err(ConfigError::EmptyWebhookSecret)
		));
	}

	#[test]
	fn subscription_descriptor_posts_url_and_events() {
		let descriptor = Subscription::new(
			Url::parse("https://app.example.com/hooks").expect("Fixture URL should parse."),
		)
		.with_events(["invoice.paid", "invoice.voided"])
		.to_descriptor(
			&Url::parse("https://api.example.com/webhooks").expect("Fixture URL should parse."),
		);
		let body: Value = serde_json::from_slice(descriptor.body().unwrap_or_default())
			.expect("Subscription body should be JSON.");

		assert_eq!(descriptor.method(), Method::Post);
		assert!(!descriptor.is_idempotent());
		assert_eq!(body["url"], "https://app.example.com/hooks");
		assert_eq!(body["events"][1], "invoice.voided");
	}
}

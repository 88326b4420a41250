// std
use std::sync::atomic::{AtomicUsize, Ordering};
// crates.io
use base64::{Engine as _, engine::general_purpose::STANDARD};
use httpmock::prelude::*;
// self
use apigen_runtime::{
	_preludet::*,
	executor::CallContext,
	webhook::{self, RejectReason, Subscription, WebhookDispatcher, WebhookOutcome, signature},
};

const SECRET: &str = "whsec-integration";

fn hex_signature(payload: &[u8]) -> String {
	signature::sign_hex(SECRET, payload).expect("HMAC accepts any key length.")
}

#[test]
fn bad_signature_is_rejected_without_calling_handlers() {
	let dispatcher =
		WebhookDispatcher::from_config(&test_config().with_webhook_secret(SECRET))
			.expect("Dispatcher should build.");
	let calls = Arc::new(AtomicUsize::new(0));
	let counter = calls.clone();

	dispatcher.register_handler("order.created", move |_| {
		counter.fetch_add(1, Ordering::SeqCst);

		Ok(())
	});

	let payload = br#"{"event_type":"order.created","id":"o-1"}"#;
	let forged = signature::sign_hex("attacker", payload).expect("HMAC accepts any key length.");

	assert_eq!(
		dispatcher.handle(payload, Some(&format!("sha256={forged}"))),
		WebhookOutcome::Rejected(RejectReason::SignatureMismatch)
	);
	assert_eq!(calls.load(Ordering::SeqCst), 0);
	assert_eq!(dispatcher.rejected(), 1);
}

#[test]
fn every_signature_encoding_is_accepted() {
	let dispatcher = WebhookDispatcher::new(SECRET).expect("Dispatcher should build.");
	let seen = Arc::new(Mutex::new(Vec::new()));
	let sink = seen.clone();

	dispatcher.register_handler("order.created", move |event| {
		assert!(event.verified);

		sink.lock().push(event.signature.clone());

		Ok(())
	});

	let payload = br#"{"event_type":"order.created","id":"o-1"}"#;
	let hex = hex_signature(payload);
	let raw = hex::decode(&hex).expect("Signature should be hex.");
	let headers = [format!("sha256={hex}"), hex.clone(), STANDARD.encode(raw)];

	for header in &headers {
		assert!(dispatcher.handle(payload, Some(header)).is_accepted());
	}

	assert_eq!(*seen.lock(), headers);
}

#[test]
fn tampered_payload_fails_verification() {
	let dispatcher = WebhookDispatcher::new(SECRET).expect("Dispatcher should build.");
	let signed = br#"{"event_type":"refund.issued","amount":10}"#;
	let tampered = br#"{"event_type":"refund.issued","amount":1000}"#;
	let header = hex_signature(signed);

	assert_eq!(
		dispatcher.handle(tampered, Some(&header)),
		WebhookOutcome::Rejected(RejectReason::SignatureMismatch)
	);
}

#[tokio::test]
async fn subscribe_posts_the_callback_and_events() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/webhooks").json_body(serde_json::json!({
				"url": "https://app.example.com/hooks",
				"events": ["order.created", "order.cancelled"],
			}));
			then.status(201).body(r#"{"id":"sub-1"}"#);
		})
		.await;
	let executor = build_reqwest_test_executor(test_config());
	let subscription =
		Subscription::new(Url::parse("https://app.example.com/hooks").expect("URL should parse."))
			.with_events(["order.created", "order.cancelled"]);
	let endpoint = Url::parse(&server.url("/webhooks")).expect("Mock endpoint should parse.");
	let envelope = webhook::subscribe(&executor, &endpoint, &subscription, &CallContext::new())
		.await
		.expect("Subscription should be registered.");

	assert_eq!(envelope.status, 201);

	mock.assert_calls_async(1).await;
}

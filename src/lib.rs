//! Adaptive request-execution runtime embedded in generated API clients: AIMD throttling,
//! jittered retries, response caching, singleflight OAuth tokens, pagination, and signed
//! webhook dispatch behind one composition root.

#![deny(clippy::all, missing_docs)]
#![cfg_attr(not(test), deny(unused_crate_dependencies))]

pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod executor;
pub mod http;
pub mod obs;
pub mod pagination;
pub mod retry;
pub mod router;
pub mod throttle;
pub mod webhook;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// std
	use std::collections::VecDeque;
	// self
	use crate::{
		config::RuntimeConfig,
		error::TransportError,
		executor::RequestExecutor,
		http::{OutboundRequest, RequestDescriptor, ResponseEnvelope, Transport, TransportFuture},
	};

	/// Transport that replays queued outcomes and records every request it receives.
	///
	/// Once the queue is drained every request is answered with the fallback status and an
	/// empty JSON object body.
	#[derive(Debug)]
	pub struct ScriptedTransport {
		queue: Mutex<VecDeque<Result<ResponseEnvelope, TransportError>>>,
		requests: Mutex<Vec<RequestDescriptor>>,
		fallback_status: u16,
	}
	impl ScriptedTransport {
		/// Creates a transport that answers `200 {}` once the queue is empty.
		pub fn new() -> Self {
			Self::with_fallback_status(200)
		}

		/// Creates a transport whose fallback response uses `status`.
		pub fn with_fallback_status(status: u16) -> Self {
			Self {
				queue: Default::default(),
				requests: Default::default(),
				fallback_status: status,
			}
		}

		/// Queues a response envelope.
		pub fn respond(&self, envelope: ResponseEnvelope) -> &Self {
			self.queue.lock().push_back(Ok(envelope));

			self
		}

		/// Queues a transport failure.
		pub fn fail(&self, error: TransportError) -> &Self {
			self.queue.lock().push_back(Err(error));

			self
		}

		/// Number of requests sent through the transport so far.
		pub fn calls(&self) -> usize {
			self.requests.lock().len()
		}

		/// Requests received so far, in arrival order.
		pub fn requests(&self) -> Vec<RequestDescriptor> {
			self.requests.lock().clone()
		}
	}
	impl Default for ScriptedTransport {
		fn default() -> Self {
			Self::new()
		}
	}
	impl Transport for ScriptedTransport {
		fn send(&self, request: OutboundRequest) -> TransportFuture<'_> {
			self.requests.lock().push(request.into_descriptor());

			let next = self
				.queue
				.lock()
				.pop_front()
				.unwrap_or_else(|| Ok(json_response(self.fallback_status, "{}")));

			Box::pin(async move { next })
		}
	}

	/// Builds a JSON response envelope with the provided status and body.
	pub fn json_response(status: u16, body: &str) -> ResponseEnvelope {
		ResponseEnvelope::new(status, body.as_bytes().to_vec())
			.with_header("content-type", "application/json")
	}

	/// Runtime configuration with millisecond backoff so retry tests stay fast.
	pub fn test_config() -> RuntimeConfig {
		RuntimeConfig::default()
			.with_max_rate(1_000.)
			.with_backoff(Duration::from_millis(1), Duration::from_millis(5))
	}

	/// Builds an executor on top of a scripted transport.
	pub fn build_test_executor(
		config: RuntimeConfig,
		transport: Arc<ScriptedTransport>,
	) -> RequestExecutor {
		RequestExecutor::builder(config)
			.transport(transport)
			.build()
			.expect("Failed to build the scripted test executor.")
	}

	/// Builds an executor backed by the crate's reqwest transport for `httpmock` tests.
	#[cfg(feature = "reqwest")]
	pub fn build_reqwest_test_executor(config: RuntimeConfig) -> RequestExecutor {
		RequestExecutor::builder(config)
			.build()
			.expect("Failed to build the reqwest test executor.")
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
		time::Duration,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::OffsetDateTime;
	pub use tokio::time::Instant;
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;

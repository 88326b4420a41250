//! Composition root: cache, throttle, token, retry, and error routing around one transport.
//!
//! [`RequestExecutor::execute`] serves cacheable descriptors from the [`ResponseCache`] when
//! possible. Otherwise every attempt attaches a bearer token when the descriptor requires one,
//! runs the middleware chain, then waits for a throttle permit, spends it, and sends. The
//! [`RetryExecutor`] decides whether to try again; the final outcome feeds the
//! [`ThrottleController`], successes are cached, and terminal failures are routed through the
//! [`ErrorRouter`] before being returned.

mod middleware;

pub use middleware::*;

// self
use crate::{
	_prelude::*,
	auth::{TokenManager, TokenSource},
	cache::{Fingerprint, ResponseCache},
	config::RuntimeConfig,
	error::{AuthError, ConfigError, ErrorCause, ErrorEvent, ErrorKind, TransportError},
	http::{OutboundRequest, RequestDescriptor, ResponseEnvelope, Transport},
	obs::{self, CallOutcome, CallSpan, Component},
	retry::{AttemptResult, RetryExecutor, RetryPolicy},
	router::ErrorRouter,
	throttle::{ThrottleController, ThrottleOutcome},
};

/// Per-call options.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CallContext {
	deadline: Option<Instant>,
}
impl CallContext {
	/// Context without a deadline.
	pub fn new() -> Self {
		Self::default()
	}

	/// Bounds throttle waits, token acquisition, sends, and backoff sleeps by `deadline`.
	pub fn with_deadline(mut self, deadline: Instant) -> Self {
		self.deadline = Some(deadline);

		self
	}

	/// Sets the deadline `timeout` from now.
	pub fn with_timeout(self, timeout: Duration) -> Self {
		self.with_deadline(Instant::now() + timeout)
	}

	/// Deadline, if any.
	pub fn deadline(&self) -> Option<Instant> {
		self.deadline
	}
}

/// Builder for [`RequestExecutor`].
pub struct RequestExecutorBuilder {
	config: RuntimeConfig,
	transport: Option<Arc<dyn Transport>>,
	tokens: Option<Arc<TokenManager>>,
	token_source: Option<Arc<dyn TokenSource>>,
	router: Option<Arc<ErrorRouter>>,
	middleware: Vec<Arc<dyn RequestMiddleware>>,
}
impl RequestExecutorBuilder {
	/// Uses `transport` instead of the default reqwest transport.
	pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
		self.transport = Some(transport);

		self
	}

	/// Attaches an existing token manager.
	pub fn token_manager(mut self, tokens: Arc<TokenManager>) -> Self {
		self.tokens = Some(tokens);

		self
	}

	/// Builds a token manager around `source` using the configured refresh margin.
	pub fn token_source(mut self, source: Arc<dyn TokenSource>) -> Self {
		self.token_source = Some(source);

		self
	}

	/// Shares an error router, e.g. between executors of the same client.
	pub fn router(mut self, router: Arc<ErrorRouter>) -> Self {
		self.router = Some(router);

		self
	}

	/// Appends a middleware to the chain.
	pub fn middleware(mut self, middleware: Arc<dyn RequestMiddleware>) -> Self {
		self.middleware.push(middleware);

		self
	}

	/// Validates the configuration and assembles the executor.
	pub fn build(self) -> Result<RequestExecutor> {
		let Self { config, transport, tokens, token_source, router, middleware } = self;

		config.validate()?;

		let transport = match transport {
			Some(transport) => transport,
			None => default_transport(&config)?,
		};
		let tokens = tokens.or_else(|| {
			token_source.map(|source| Arc::new(TokenManager::from_config(source, &config)))
		});

		Ok(RequestExecutor {
			cache: ResponseCache::from_config(&config),
			throttle: ThrottleController::from_config(&config),
			retry: RetryExecutor::new(RetryPolicy::from(&config)),
			router: router.unwrap_or_default(),
			config,
			transport,
			tokens,
			middleware,
		})
	}
}
impl Debug for RequestExecutorBuilder {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RequestExecutorBuilder")
			.field("config", &self.config)
			.field("transport_set", &self.transport.is_some())
			.field("tokens_set", &(self.tokens.is_some() || self.token_source.is_some()))
			.field("middleware", &self.middleware.len())
			.finish()
	}
}

#[cfg(feature = "reqwest")]
fn default_transport(config: &RuntimeConfig) -> Result<Arc<dyn Transport>, ConfigError> {
	Ok(Arc::new(crate::http::ReqwestTransport::new(config)?))
}
#[cfg(not(feature = "reqwest"))]
fn default_transport(_: &RuntimeConfig) -> Result<Arc<dyn Transport>, ConfigError> {
	Err(ConfigError::MissingTransport)
}

/// Executes calls for one generated client; share it behind an `Arc` across tasks.
pub struct RequestExecutor {
	config: RuntimeConfig,
	transport: Arc<dyn Transport>,
	cache: ResponseCache,
	throttle: ThrottleController,
	retry: RetryExecutor,
	tokens: Option<Arc<TokenManager>>,
	router: Arc<ErrorRouter>,
	middleware: Vec<Arc<dyn RequestMiddleware>>,
}
impl RequestExecutor {
	/// Starts a builder for `config`.
	pub fn builder(config: RuntimeConfig) -> RequestExecutorBuilder {
		RequestExecutorBuilder {
			config,
			transport: None,
			tokens: None,
			token_source: None,
			router: None,
			middleware: Vec::new(),
		}
	}

	/// Executes one logical call.
	pub async fn execute(
		&self,
		descriptor: RequestDescriptor,
		ctx: &CallContext,
	) -> Result<ResponseEnvelope, ErrorEvent> {
		let span = CallSpan::new(Component::Executor, "execute");

		obs::record_call_outcome(Component::Executor, CallOutcome::Attempt);

		let result = span.instrument(self.execute_inner(descriptor, ctx.deadline())).await;

		match &result {
			Ok(_) => obs::record_call_outcome(Component::Executor, CallOutcome::Success),
			Err(_) => obs::record_call_outcome(Component::Executor, CallOutcome::Failure),
		}

		result
	}

	/// Drops the cached response for `descriptor`, returning whether one existed.
	pub fn invalidate(&self, descriptor: &RequestDescriptor) -> bool {
		self.cache.invalidate(&Fingerprint::of(descriptor))
	}

	/// Routes a failure detected outside the retry loop (e.g. an unparseable page) and hands it
	/// back to the caller.
	pub fn route_failure(&self, event: ErrorEvent) -> ErrorEvent {
		self.router.route(&event);

		event
	}

	/// Effective configuration.
	pub fn config(&self) -> &RuntimeConfig {
		&self.config
	}

	/// Response cache.
	pub fn cache(&self) -> &ResponseCache {
		&self.cache
	}

	/// Adaptive throttle.
	pub fn throttle(&self) -> &ThrottleController {
		&self.throttle
	}

	/// Error callback registry.
	pub fn router(&self) -> &Arc<ErrorRouter> {
		&self.router
	}

	/// Token manager, when one is configured.
	pub fn tokens(&self) -> Option<&Arc<TokenManager>> {
		self.tokens.as_ref()
	}

	/// Shared transport.
	pub fn transport(&self) -> &Arc<dyn Transport> {
		&self.transport
	}

	async fn execute_inner(
		&self,
		descriptor: RequestDescriptor,
		deadline: Option<Instant>,
	) -> Result<ResponseEnvelope, ErrorEvent> {
		let fingerprint = descriptor.is_cacheable().then(|| Fingerprint::of(&descriptor));

		if let Some(fingerprint) = &fingerprint {
			let cached = self.cache.get(fingerprint);

			obs::record_cache_lookup(cached.is_some());

			if let Some(envelope) = cached {
				obs::cache_hit(descriptor.url());
				obs::record_call_outcome(Component::Executor, CallOutcome::CacheHit);

				return Ok(envelope);
			}
		}

		let result = self
			.retry
			.run(&descriptor, deadline, |_| self.attempt(&descriptor, deadline))
			.await;

		match result {
			Ok(envelope) => {
				self.throttle.report(ThrottleOutcome::Success);

				if let Some(fingerprint) = fingerprint
					&& envelope.is_success()
				{
					self.cache.put(fingerprint, envelope.clone(), self.cache.ttl());
				}

				Ok(envelope)
			},
			Err(event) => {
				self.throttle.report(ThrottleOutcome::Failure(event.attempt_kind));

				if event.attempt_kind == ErrorKind::AuthenticationFailed
					&& event.status() == Some(401)
					&& let Some(tokens) = &self.tokens
				{
					tokens.mark_rejected();
				}

				Err(self.route_failure(event))
			},
		}
	}

	async fn attempt(
		&self,
		descriptor: &RequestDescriptor,
		deadline: Option<Instant>,
	) -> AttemptResult {
		let mut request = OutboundRequest::new(descriptor.clone());

		if descriptor.requires_auth() {
			let tokens = self.tokens.as_ref().ok_or(AuthError::NotConfigured)?;
			let token = tokens.get_token(deadline).await?;

			request.set_header("authorization", token.bearer());
		}

		for middleware in &self.middleware {
			middleware.prepare(&mut request);
		}

		// Taken last so a slow token refresh never sits on a slot.
		self.throttle
			.acquire(deadline)
			.await
			.map_err(|_| ErrorCause::ThrottleTimeout)?
			.consume();

		let send = self.transport.send(request);
		let envelope = match deadline {
			Some(deadline) => tokio::time::timeout_at(deadline, send)
				.await
				.map_err(TransportError::timeout)??,
			None => send.await?,
		};

		for middleware in &self.middleware {
			middleware.observe(&envelope);
		}

		Ok(envelope)
	}
}
impl Debug for RequestExecutor {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RequestExecutor")
			.field("config", &self.config)
			.field("cache_len", &self.cache.len())
			.field("throttle", &self.throttle.state())
			.field("tokens", &self.tokens)
			.field("router", &self.router)
			.field(
				"middleware",
				&self.middleware.iter().map(|middleware| middleware.name()).collect::<Vec<_>>(),
			)
			.finish()
	}
}

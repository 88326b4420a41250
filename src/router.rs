//! Dispatches terminal [`ErrorEvent`]s to callbacks registered per [`ErrorKind`].
//!
//! Handlers run in registration order on a snapshot of the registry, so registering or
//! unregistering from inside a handler only affects later events. A handler that returns an
//! error or panics is logged and counted; the remaining handlers still run and the caller
//! still receives the typed failure.

// std
use std::{
	panic::{self, AssertUnwindSafe},
	sync::atomic::{AtomicU64, Ordering},
};
// self
use crate::{
	_prelude::*,
	error::{ErrorEvent, ErrorKind},
	obs::{self, Component},
};

pub use crate::obs::DispatchMetrics;

/// Error returned by a failing handler.
pub type HandlerError = Box<dyn StdError + Send + Sync>;

/// Callback invoked for routed error events.
pub trait ErrorHandler
where
	Self: 'static + Send + Sync,
{
	/// Handles one event.
	fn handle(&self, event: &ErrorEvent) -> Result<(), HandlerError>;
}

/// Handle returned by registration, used to unregister.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallbackId(pub(crate) u64);

/// Result of routing one event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Routed {
	/// At least one handler ran.
	Handled {
		/// Handlers invoked.
		invoked: usize,
		/// Handlers that returned an error or panicked.
		failed: usize,
	},
	/// No handler is registered for the event's kind.
	Unhandled,
}
impl Routed {
	/// Whether any handler ran.
	pub fn is_handled(self) -> bool {
		matches!(self, Self::Handled { .. })
	}
}

/// Why an isolated handler invocation failed.
#[derive(Debug, ThisError)]
pub(crate) enum HandlerFailure {
	#[error("Handler returned an error: {0}")]
	Error(HandlerError),
	#[error("Handler panicked: {0}")]
	Panicked(String),
}

type Registration = (CallbackId, Arc<dyn ErrorHandler>);

/// Per-client registry of error callbacks.
#[derive(Default)]
pub struct ErrorRouter {
	registry: RwLock<HashMap<ErrorKind, Vec<Registration>>>,
	next_id: AtomicU64,
	metrics: DispatchMetrics,
}
impl ErrorRouter {
	/// Creates an empty router.
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers a closure for `kind`.
	pub fn register_callback<F>(&self, kind: ErrorKind, callback: F) -> CallbackId
	where
		F: 'static + Send + Sync + Fn(&ErrorEvent) -> Result<(), HandlerError>,
	{
		self.register_handler(kind, Arc::new(FnHandler(callback)))
	}

	/// Registers a shared handler for `kind`.
	pub fn register_handler(&self, kind: ErrorKind, handler: Arc<dyn ErrorHandler>) -> CallbackId {
		let id = CallbackId(self.next_id.fetch_add(1, Ordering::Relaxed));

		self.registry.write().entry(kind).or_default().push((id, handler));

		id
	}

	/// Removes a registration, returning whether it existed.
	pub fn unregister_callback(&self, kind: ErrorKind, id: CallbackId) -> bool {
		let mut registry = self.registry.write();
		let Some(handlers) = registry.get_mut(&kind) else {
			return false;
		};
		let before = handlers.len();

		handlers.retain(|(registered, _)| *registered != id);

		let removed = handlers.len() != before;

		if handlers.is_empty() {
			registry.remove(&kind);
		}

		removed
	}

	/// Removes every registration.
	pub fn clear(&self) {
		self.registry.write().clear();
	}

	/// Number of handlers registered for `kind`.
	pub fn handler_count(&self, kind: ErrorKind) -> usize {
		self.registry.read().get(&kind).map_or(0, Vec::len)
	}

	/// Invokes every handler registered for the event's kind.
	///
	/// An event the deadline relabelled as [`ErrorKind::Timeout`] also reaches the handlers of
	/// its [`attempt_kind`](ErrorEvent::attempt_kind), after the `Timeout` handlers.
	pub fn route(&self, event: &ErrorEvent) -> Routed {
		let handlers = {
			let registry = self.registry.read();
			let mut handlers = registry.get(&event.kind).cloned().unwrap_or_default();

			if event.attempt_kind != event.kind
				&& let Some(extra) = registry.get(&event.attempt_kind)
			{
				handlers.extend(extra.iter().cloned());
			}

			handlers
		};

		self.metrics.routed.incr();

		if handlers.is_empty() {
			self.metrics.unhandled.incr();

			return Routed::Unhandled;
		}

		let mut failed = 0;

		for (_, handler) in &handlers {
			if let Err(failure) = run_isolated(|| handler.handle(event)) {
				failed += 1;

				self.metrics.handler_failures.incr();
				obs::handler_failed(Component::Executor, event.kind.as_str(), &failure);
			}
		}

		Routed::Handled { invoked: handlers.len(), failed }
	}

	/// Dispatch counters.
	pub fn metrics(&self) -> &DispatchMetrics {
		&self.metrics
	}

	/// Handler invocations that returned an error or panicked so far.
	pub fn handler_failures(&self) -> u64 {
		self.metrics.handler_failures()
	}
}
impl Debug for ErrorRouter {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let registry = self.registry.read();
		let counts = registry
			.iter()
			.map(|(kind, handlers)| (kind.as_str(), handlers.len()))
			.collect::<BTreeMap<_, _>>();

		f.debug_struct("ErrorRouter").field("handlers", &counts).finish()
	}
}

struct FnHandler<F>(F);
impl<F> ErrorHandler for FnHandler<F>
where
	F: 'static + Send + Sync + Fn(&ErrorEvent) -> Result<(), HandlerError>,
{
	fn handle(&self, event: &ErrorEvent) -> Result<(), HandlerError> {
		(self.0)(event)
	}
}

/// Runs `f`, converting both errors and panics into [`HandlerFailure`].
pub(crate) fn run_isolated<F>(f: F) -> Result<(), HandlerFailure>
where
	F: FnOnce() -> Result<(), HandlerError>,
{
	match panic::catch_unwind(AssertUnwindSafe(f)) {
		Ok(Ok(())) => Ok(()),
		Ok(Err(e)) => Err(HandlerFailure::Error(e)),
		Err(payload) => {
			let message = payload
				.downcast_ref::<&str>()
				.map(|s| (*s).to_owned())
				.or_else(|| payload.downcast_ref::<String>().cloned())
				.unwrap_or_else(|| "non-string panic payload".into());

			Err(HandlerFailure::Panicked(message))
		},
	}
}

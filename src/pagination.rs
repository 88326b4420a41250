//! Lazy, forward-only traversal of paginated collection endpoints.
//!
//! Each [`PaginationCursor::next`] issues one [`RequestExecutor::execute`] with the
//! continuation token applied to the base request. A response without a continuation token
//! exhausts the cursor; afterwards `next` returns `None` without touching the network.

// crates.io
use serde_json::Value;
// self
use crate::{
	_prelude::*,
	error::{ErrorCause, ErrorEvent, ErrorKind, TransportError},
	executor::{CallContext, RequestExecutor},
	http::{RequestDescriptor, ResponseEnvelope},
	obs::{self, CallOutcome, CallSpan, Component},
};

/// Items and continuation extracted from one page response.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PageContents {
	/// Page items.
	pub items: Vec<Value>,
	/// Token for the next page; `None` ends the traversal.
	pub next_token: Option<String>,
}

/// A page response could not be interpreted.
#[derive(Debug, ThisError)]
pub enum PageError {
	/// Body is not valid JSON.
	#[error("Page body is not valid JSON.")]
	NotJson(#[source] serde_json::Error),
	/// The items field exists but is not an array.
	#[error("Page field `{field}` is not an array.")]
	ItemsNotArray {
		/// Configured items field.
		field: String,
	},
	/// The continuation field is neither a string, a number, nor null.
	#[error("Page field `{field}` is not a valid continuation token.")]
	InvalidToken {
		/// Configured token field.
		field: String,
	},
}

/// Decides how continuation tokens are read from responses and applied to requests.
pub trait PageStrategy
where
	Self: 'static + Send + Sync,
{
	/// Derives the request for the page identified by `token`.
	fn apply_token(&self, base: &RequestDescriptor, token: &str) -> RequestDescriptor;

	/// Extracts items and the next continuation token.
	fn parse(&self, envelope: &ResponseEnvelope) -> Result<PageContents, PageError>;
}

/// JSON body strategy: items under `results`, token under `next_page_token`, sent back as
/// the `page_token` query parameter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JsonPageStrategy {
	items_field: String,
	token_field: String,
	query_param: String,
}
impl JsonPageStrategy {
	/// Overrides the items field.
	pub fn with_items_field(mut self, field: impl Into<String>) -> Self {
		self.items_field = field.into();

		self
	}

	/// Overrides the continuation token field.
	pub fn with_token_field(mut self, field: impl Into<String>) -> Self {
		self.token_field = field.into();

		self
	}

	/// Overrides the query parameter the token is sent in.
	pub fn with_query_param(mut self, param: impl Into<String>) -> Self {
		self.query_param = param.into();

		self
	}
}
impl Default for JsonPageStrategy {
	fn default() -> Self {
		Self {
			items_field: "results".into(),
			token_field: "next_page_token".into(),
			query_param: "page_token".into(),
		}
	}
}
impl PageStrategy for JsonPageStrategy {
	fn apply_token(&self, base: &RequestDescriptor, token: &str) -> RequestDescriptor {
		base.to_builder().query(&self.query_param, token).build()
	}

	fn parse(&self, envelope: &ResponseEnvelope) -> Result<PageContents, PageError> {
		let mut body = serde_json::from_slice::<Value>(&envelope.body).map_err(PageError::NotJson)?;
		let items = match body.get_mut(&self.items_field).map(Value::take) {
			None | Some(Value::Null) => Vec::new(),
			Some(Value::Array(items)) => items,
			Some(_) => return Err(PageError::ItemsNotArray { field: self.items_field.clone() }),
		};
		let next_token = match body.get(&self.token_field) {
			None | Some(Value::Null) => None,
			Some(Value::String(token)) if token.is_empty() => None,
			Some(Value::String(token)) => Some(token.clone()),
			Some(Value::Number(token)) => Some(token.to_string()),
			Some(_) => return Err(PageError::InvalidToken { field: self.token_field.clone() }),
		};

		Ok(PageContents { items, next_token })
	}
}

/// Traversal position.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PageCursor {
	/// Token for the next page; `None` before the first page and after the last.
	pub continuation: Option<String>,
	/// Zero-based index of the next page.
	pub index: u64,
	/// Whether the last page has been seen.
	pub exhausted: bool,
}

/// One fetched page.
#[derive(Clone, Debug)]
pub struct Page {
	/// Zero-based page index.
	pub index: u64,
	/// Page items.
	pub items: Vec<Value>,
	/// Continuation token returned with this page.
	pub next_token: Option<String>,
	/// Raw response.
	pub envelope: ResponseEnvelope,
}

/// Lazy page sequence over a collection endpoint.
pub struct PaginationCursor {
	executor: Arc<RequestExecutor>,
	base: RequestDescriptor,
	strategy: Arc<dyn PageStrategy>,
	ctx: CallContext,
	cursor: PageCursor,
}
impl PaginationCursor {
	/// Starts a traversal of `base` using [`JsonPageStrategy`].
	pub fn new(executor: Arc<RequestExecutor>, base: RequestDescriptor) -> Self {
		Self {
			executor,
			base,
			strategy: Arc::new(JsonPageStrategy::default()),
			ctx: CallContext::default(),
			cursor: PageCursor::default(),
		}
	}

	/// Uses a custom strategy.
	pub fn with_strategy(mut self, strategy: Arc<dyn PageStrategy>) -> Self {
		self.strategy = strategy;

		self
	}

	/// Applies `ctx` to every page request.
	pub fn with_context(mut self, ctx: CallContext) -> Self {
		self.ctx = ctx;

		self
	}

	/// Current position.
	pub fn position(&self) -> &PageCursor {
		&self.cursor
	}

	/// Whether the last page has been seen.
	pub fn is_exhausted(&self) -> bool {
		self.cursor.exhausted
	}

	/// Fetches the next page, or returns `None` once exhausted.
	///
	/// A failed fetch leaves the position unchanged, so calling `next` again retries the same
	/// page.
	pub async fn next(&mut self) -> Result<Option<Page>, ErrorEvent> {
		if self.cursor.exhausted {
			return Ok(None);
		}

		let span = CallSpan::new(Component::Pagination, "next");

		obs::record_call_outcome(Component::Pagination, CallOutcome::Attempt);

		let result = span.instrument(self.fetch()).await;

		match &result {
			Ok(_) => obs::record_call_outcome(Component::Pagination, CallOutcome::Success),
			Err(_) => obs::record_call_outcome(Component::Pagination, CallOutcome::Failure),
		}

		result.map(Some)
	}

	/// Drains the remaining pages and concatenates their items.
	pub async fn collect_all(&mut self) -> Result<Vec<Value>, ErrorEvent> {
		let mut items = Vec::new();

		while let Some(page) = self.next().await? {
			items.extend(page.items);
		}

		Ok(items)
	}

	async fn fetch(&mut self) -> Result<Page, ErrorEvent> {
		let descriptor = match &self.cursor.continuation {
			Some(token) => self.strategy.apply_token(&self.base, token),
			None => self.base.clone(),
		};
		let envelope = self.executor.execute(descriptor.clone(), &self.ctx).await?;
		let contents = match self.strategy.parse(&envelope) {
			Ok(contents) => contents,
			Err(e) => {
				self.executor.invalidate(&descriptor);

				let cause = TransportError::Malformed { message: e.to_string() };
				let event = ErrorEvent::new(ErrorKind::Unknown, descriptor, ErrorCause::from(cause), 1)
					.with_response(envelope);

				return Err(self.executor.route_failure(event));
			},
		};
		let page = Page {
			index: self.cursor.index,
			items: contents.items,
			next_token: contents.next_token.clone(),
			envelope,
		};

		self.cursor.index += 1;
		self.cursor.exhausted = contents.next_token.is_none();
		self.cursor.continuation = contents.next_token;

		Ok(page)
	}
}
impl Debug for PaginationCursor {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("PaginationCursor")
			.field("base", &self.base)
			.field("cursor", &self.cursor)
			.finish()
	}
}

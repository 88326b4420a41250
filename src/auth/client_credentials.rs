//! OAuth 2.0 `client_credentials` source backed by the `oauth2` crate.
//!
//! Token requests travel through the same [`Transport`] as API calls, adapted to
//! [`AsyncHttpClient`] so `oauth2` handles form encoding, client authentication, and
//! response parsing. Refresh tokens are used when the provider issues them.

// crates.io
use oauth2::{
	AsyncHttpClient, AuthType, ClientId, ClientSecret, EndpointNotSet, EndpointSet,
	HttpClientError, HttpRequest, HttpResponse, RefreshToken, RequestTokenError, Scope,
	TokenResponse, TokenUrl,
	basic::{BasicClient, BasicErrorResponse, BasicTokenResponse},
	http::{HeaderName, HeaderValue, StatusCode},
};
// self
use crate::{
	_prelude::*,
	auth::{Secret, TokenFuture, TokenGrant, TokenSource},
	error::{AuthError, ConfigError, TransportError},
	http::{Method, OutboundRequest, RequestDescriptor, Transport},
};

type TokenClient =
	BasicClient<EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;
type TokenRequestError = RequestTokenError<HttpClientError<TransportError>, BasicErrorResponse>;

/// Where client credentials are placed on token requests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ClientAuthMethod {
	/// HTTP Basic `Authorization` header (`client_secret_basic`).
	#[default]
	Basic,
	/// Form fields in the request body (`client_secret_post`).
	RequestBody,
}

/// [`TokenSource`] performing the `client_credentials` and `refresh_token` grants.
pub struct ClientCredentialsSource {
	client: TokenClient,
	http: TransportHttpClient,
	scopes: Vec<String>,
}
impl ClientCredentialsSource {
	/// Creates a source for `token_url` using HTTP Basic client authentication.
	pub fn new(
		transport: Arc<dyn Transport>,
		token_url: &Url,
		client_id: impl Into<String>,
		client_secret: impl Into<String>,
	) -> Result<Self, ConfigError> {
		let token_url = TokenUrl::new(token_url.to_string())?;
		let client = BasicClient::new(ClientId::new(client_id.into()))
			.set_client_secret(ClientSecret::new(client_secret.into()))
			.set_token_uri(token_url);

		Ok(Self { client, http: TransportHttpClient(transport), scopes: Vec::new() })
	}

	/// Overrides client authentication placement.
	pub fn with_auth_method(mut self, method: ClientAuthMethod) -> Self {
		let auth_type = match method {
			ClientAuthMethod::Basic => AuthType::BasicAuth,
			ClientAuthMethod::RequestBody => AuthType::RequestBody,
		};

		self.client = self.client.set_auth_type(auth_type);

		self
	}

	/// Requests the given scopes on every grant.
	pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.scopes = scopes.into_iter().map(Into::into).collect();

		self
	}
}
impl TokenSource for ClientCredentialsSource {
	fn acquire(&self) -> TokenFuture<'_> {
		Box::pin(async move {
			let mut request = self.client.exchange_client_credentials();

			for scope in &self.scopes {
				request = request.add_scope(Scope::new(scope.clone()));
			}

			let response = request.request_async(&self.http).await.map_err(map_request_error)?;

			map_token_response(response)
		})
	}

	fn refresh<'a>(&'a self, refresh_token: &'a Secret) -> TokenFuture<'a> {
		Box::pin(async move {
			let refresh_token = RefreshToken::new(refresh_token.expose().to_owned());
			let mut request = self.client.exchange_refresh_token(&refresh_token);

			for scope in &self.scopes {
				request = request.add_scope(Scope::new(scope.clone()));
			}

			let response = request.request_async(&self.http).await.map_err(map_request_error)?;

			map_token_response(response)
		})
	}
}
impl Debug for ClientCredentialsSource {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ClientCredentialsSource")
			.field("client_id", &self.client.client_id().as_str())
			.field("token_url", &self.client.token_uri().as_str())
			.field("scopes", &self.scopes)
			.finish()
	}
}

/// Adapter exposing a [`Transport`] as an `oauth2` HTTP client.
struct TransportHttpClient(Arc<dyn Transport>);
impl<'c> AsyncHttpClient<'c> for TransportHttpClient {
	type Error = HttpClientError<TransportError>;
	type Future = Pin<Box<dyn Future<Output = Result<HttpResponse, Self::Error>> + 'c + Send>>;

	fn call(&'c self, request: HttpRequest) -> Self::Future {
		Box::pin(async move {
			let (parts, body) = request.into_parts();
			let method = parts
				.method
				.as_str()
				.parse::<Method>()
				.map_err(|e| HttpClientError::Other(e.to_string()))?;
			let url = Url::parse(&parts.uri.to_string())
				.map_err(|e| HttpClientError::Other(e.to_string()))?;
			let mut builder =
				RequestDescriptor::builder(method, url).idempotent(false).cacheable(false);

			for (name, value) in &parts.headers {
				if let Ok(value) = value.to_str() {
					builder = builder.header(name.as_str(), value);
				}
			}
			if !body.is_empty() {
				builder = builder.body(body);
			}

			let envelope = self
				.0
				.send(OutboundRequest::new(builder.build()))
				.await
				.map_err(|e| HttpClientError::Reqwest(Box::new(e)))?;
			let mut response = HttpResponse::new(envelope.body);

			*response.status_mut() = StatusCode::from_u16(envelope.status)
				.map_err(|e| HttpClientError::Other(e.to_string()))?;

			for (name, value) in &envelope.headers {
				if let (Ok(name), Ok(value)) =
					(HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value))
				{
					response.headers_mut().append(name, value);
				}
			}

			Ok(response)
		})
	}
}

fn map_request_error(err: TokenRequestError) -> AuthError {
	match err {
		RequestTokenError::ServerResponse(response) => {
			let reason = match response.error_description() {
				Some(description) => format!("{}: {description}", response.error().as_ref()),
				None => response.error().as_ref().to_owned(),
			};

			AuthError::Rejected { reason }
		},
		RequestTokenError::Request(HttpClientError::Reqwest(e)) =>
			AuthError::Unavailable { reason: e.to_string() },
		RequestTokenError::Request(e) => AuthError::Unavailable { reason: e.to_string() },
		RequestTokenError::Parse(e, _body) =>
			AuthError::Unavailable { reason: format!("token response could not be parsed: {e}") },
		RequestTokenError::Other(message) => AuthError::Unavailable { reason: message },
	}
}

fn map_token_response(response: BasicTokenResponse) -> Result<TokenGrant, AuthError> {
	let expires_in = response.expires_in().ok_or(AuthError::MissingExpiry)?;
	let mut grant = TokenGrant::new(response.access_token().secret().to_owned(), expires_in);

	if let Some(refresh) = response.refresh_token() {
		grant = grant.with_refresh_token(refresh.secret().to_owned());
	}

	Ok(grant)
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::_preludet::ScriptedTransport;

	#[test]
	fn debug_output_omits_the_client_secret() {
		let source = ClientCredentialsSource::new(
			Arc::new(ScriptedTransport::new()),
			&Url::parse("https://auth.example.com/token").expect("Fixture URL should parse."),
			"client-1",
			"very-secret",
		)
		.expect("Source should build.");
		let debug = format!("{source:?}");

		assert!(debug.contains("client-1"));
		assert!(!debug.contains("very-secret"));
	}

	#[tokio::test]
	async fn client_credentials_grant_goes_through_the_transport() {
		let transport = Arc::new(ScriptedTransport::new());

		transport.respond(
			crate::_preludet::json_response(
				200,
				r#"{"access_token":"at-1","token_type":"bearer","expires_in":3600,"refresh_token":"rt-1"}"#,
			),
		);

		let source = ClientCredentialsSource::new(
			transport.clone(),
			&Url::parse("https://auth.example.com/token").expect("Fixture URL should parse."),
			"client-1",
			"very-secret",
		)
		.expect("Source should build.")
		.with_auth_method(ClientAuthMethod::RequestBody)
		.with_scopes(["read", "write"]);
		let grant = source.acquire().await.expect("Grant should succeed.");

		assert_eq!(grant.access_token.expose(), "at-1");
		assert_eq!(grant.refresh_token.as_ref().map(Secret::expose), Some("rt-1"));
		assert_eq!(grant.expires_in, Duration::from_secs(3600));

		let sent = transport.requests();
		let body = String::from_utf8(sent[0].body().map(<[u8]>::to_vec).unwrap_or_default())
			.expect("Form body should be UTF-8.");

		assert_eq!(sent[0].method(), Method::Post);
		assert!(body.contains("grant_type=client_credentials"));
		assert!(body.contains("client_secret=very-secret"));
		assert!(body.contains("scope=read+write"));
	}

	#[tokio::test]
	async fn oauth_error_responses_become_rejections() {
		let transport = Arc::new(ScriptedTransport::new());

		transport.respond(crate::_preludet::json_response(
			400,
			r#"{"error":"invalid_client","error_description":"unknown client"}"#,
		));

		let source = ClientCredentialsSource::new(
			transport,
			&Url::parse("https://auth.example.com/token").expect("Fixture URL should parse."),
			"client-1",
			"wrong",
		)
		.expect("Source should build.");
		let err = source.acquire().await.expect_err("Provider should reject the client.");

		assert_eq!(err, AuthError::Rejected { reason: "invalid_client: unknown client".into() });
	}

	#[tokio::test]
	async fn missing_expiry_is_rejected() {
		let transport = Arc::new(ScriptedTransport::new());

		transport.respond(crate::_preludet::json_response(
			200,
			r#"{"access_token":"at-1","token_type":"bearer"}"#,
		));

		let source = ClientCredentialsSource::new(
			transport,
			&Url::parse("https://auth.example.com/token").expect("Fixture URL should parse."),
			"client-1",
			"secret",
		)
		.expect("Source should build.");

		assert_eq!(source.acquire().await, Err(AuthError::MissingExpiry));
	}
}

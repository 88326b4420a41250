// self
use crate::{
	_prelude::*,
	auth::{Secret, TokenGrant},
	error::AuthError,
};

/// Boxed future returned by [`TokenSource`] operations.
pub type TokenFuture<'a> = Pin<Box<dyn Future<Output = Result<TokenGrant, AuthError>> + 'a + Send>>;

/// Strategy that mints and refreshes credentials for the [`TokenManager`](crate::auth::TokenManager).
pub trait TokenSource
where
	Self: 'static + Send + Sync,
{
	/// Obtains a fresh credential from scratch.
	fn acquire(&self) -> TokenFuture<'_>;

	/// Exchanges `refresh_token` for a new credential.
	///
	/// The default implementation ignores the refresh token and acquires from scratch.
	fn refresh<'a>(&'a self, refresh_token: &'a Secret) -> TokenFuture<'a> {
		let _ = refresh_token;

		self.acquire()
	}
}

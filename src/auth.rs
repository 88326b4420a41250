//! OAuth2 credential lifecycle: redacted secrets, token state, pluggable sources, and the
//! singleflight [`TokenManager`].

mod client_credentials;
mod manager;
mod secret;
mod source;
mod token;

pub use client_credentials::*;
pub use manager::*;
pub use secret::*;
pub use source::*;
pub use token::*;

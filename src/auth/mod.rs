//! Chart provider authentication
//!
//! This module provides:
//! - PKCE challenge generation for the OAuth2 login
//! - the loopback callback server
//! - refresh token persistence
//! - `AuthSession`, the login state machine
//! - signed access for tile downloads

mod pkce;
mod callback_server;
mod token_store;
mod provider;
mod signed;
mod session;

pub use pkce::{generate_code_challenge, AuthChallenge};
pub use callback_server::{parse_form, CallbackServer, FormFields};
pub use token_store::TokenStore;
pub use provider::{decode_token_response, IdentityProvider, TokenSet};
pub use signed::{fetch_signed_access, ChartCredentials, SignedAccess, SignedAccessEndpoints};
pub use session::{AuthSession, PendingAuth, SessionState};

//! IdentityProvider - the chart provider's OAuth2 endpoints
//!
//! Builds the authorization URL and talks to the token endpoint:
//! - authorization code exchange (PKCE)
//! - refresh token grant
//! - strict decoding of the token response

use serde::{Deserialize, Serialize};
use url::Url;
use crate::Result;
use crate::cancel::CancelToken;
use crate::config::Config;
use crate::error::Error;
use crate::http::HttpsClient;
use super::pkce::AuthChallenge;

/// Scopes requested for chart access
const CHART_SCOPES: &[&str] = &["openid", "charts", "userinfo", "offline_access"];

/// Tokens issued by the provider
///
/// A non-empty `access_token` means the session is logged in.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct TokenSet {
    pub id_token: String,
    pub access_token: String,
    pub refresh_token: String,
}

impl std::fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSet")
            .field("id_token", &redact(&self.id_token))
            .field("access_token", &redact(&self.access_token))
            .field("refresh_token", &redact(&self.refresh_token))
            .finish()
    }
}

fn redact(value: &str) -> &'static str {
    if value.is_empty() { "<empty>" } else { "<redacted>" }
}

/// Token endpoint response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    id_token: String,
    access_token: String,
    refresh_token: String,
}

/// Token exchange request
#[derive(Debug, Serialize)]
struct TokenExchangeRequest<'a> {
    grant_type: &'a str,
    code: &'a str,
    session_state: &'a str,
    code_verifier: &'a str,
    client_id: &'a str,
    client_secret: &'a str,
    redirect_uri: &'a str,
}

/// Token refresh request
#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    grant_type: &'a str,
    refresh_token: &'a str,
    client_id: &'a str,
    client_secret: &'a str,
}

/// OAuth2 client for the chart provider's identity server
#[derive(Clone)]
pub struct IdentityProvider {
    client_id: String,
    client_secret: String,
    authorize_url: String,
    token_url: String,
    http: HttpsClient,
}

impl IdentityProvider {
    pub fn new(config: &Config, http: HttpsClient) -> Self {
        Self {
            client_id: config.client_id.clone(),
            client_secret: config.client_secret().to_string(),
            authorize_url: config.endpoints.authorize_url.clone(),
            token_url: config.endpoints.token_url.clone(),
            http,
        }
    }

    /// Whether this build carries a client secret
    pub fn is_supported(&self) -> bool {
        !self.client_secret.is_empty()
    }

    /// Build the authorization URL the user opens in a browser
    pub fn authorization_url(&self, challenge: &AuthChallenge) -> Result<String> {
        let mut url = Url::parse(&self.authorize_url)?;

        url.query_pairs_mut()
            .append_pair("scope", &CHART_SCOPES.join(" "))
            .append_pair("response_type", "code id_token")
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", &challenge.redirect_uri())
            .append_pair("response_mode", "form_post")
            .append_pair("state", &challenge.state)
            .append_pair("nonce", &challenge.nonce)
            .append_pair("code_challenge_method", "S256")
            .append_pair("code_challenge", &challenge.code_challenge());

        Ok(url.to_string())
    }

    /// Exchange an authorization code for tokens
    pub async fn exchange_code(
        &self,
        code: &str,
        session_state: &str,
        challenge: &AuthChallenge,
        cancel: &CancelToken,
    ) -> Result<TokenSet> {
        let redirect_uri = challenge.redirect_uri();
        let request = TokenExchangeRequest {
            grant_type: "authorization_code",
            code,
            session_state,
            code_verifier: &challenge.verifier,
            client_id: &self.client_id,
            client_secret: &self.client_secret,
            redirect_uri: &redirect_uri,
        };

        tracing::debug!("Exchanging authorization code at {}", self.token_url);
        let reply = self.http.post_form(&self.token_url, &request, cancel).await?;
        decode_token_response(&reply)
    }

    /// Trade a refresh token for a new token set
    ///
    /// A rejection by the provider surfaces as [`Error::HttpStatus`]. No
    /// `redirect_uri` is sent: the refresh grant does not use one, and a
    /// relogin after a restart has no callback port to name.
    pub async fn refresh(&self, refresh_token: &str, cancel: &CancelToken) -> Result<TokenSet> {
        let request = RefreshRequest {
            grant_type: "refresh_token",
            refresh_token,
            client_id: &self.client_id,
            client_secret: &self.client_secret,
        };

        tracing::debug!("Refreshing tokens at {}", self.token_url);
        let reply = self.http.post_form(&self.token_url, &request, cancel).await?;
        decode_token_response(&reply)
    }
}

/// Decode a token response, failing if any token is missing, mistyped or empty
pub fn decode_token_response(json: &str) -> Result<TokenSet> {
    let response: TokenResponse = serde_json::from_str(json)?;

    if response.access_token.is_empty() {
        return Err(Error::Auth("Token response has an empty access_token".to_string()));
    }
    if response.refresh_token.is_empty() {
        return Err(Error::Auth("Token response has an empty refresh_token".to_string()));
    }

    // TODO: verify the id_token signature against the provider's published keys
    Ok(TokenSet {
        id_token: response.id_token,
        access_token: response.access_token,
        refresh_token: response.refresh_token,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(token_url: String) -> IdentityProvider {
        let mut config = Config::default();
        config.client_id = "tablet".to_string();
        config.client_secret = Some("s3cret".to_string());
        config.endpoints.token_url = token_url;
        IdentityProvider::new(&config, HttpsClient::new())
    }

    const TOKENS: &str = r#"{"id_token":"id","access_token":"access","refresh_token":"refresh","expires_in":3600}"#;

    #[test]
    fn test_authorization_url() {
        let provider = provider("https://example.com/token".to_string());
        let challenge = AuthChallenge::new(49152);
        let url = Url::parse(&provider.authorization_url(&challenge).unwrap()).unwrap();

        assert_eq!(url.path(), "/connect/authorize");
        let query: HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(query["scope"], "openid charts userinfo offline_access");
        assert_eq!(query["response_type"], "code id_token");
        assert_eq!(query["client_id"], "tablet");
        assert_eq!(query["redirect_uri"], "http://127.0.0.1:49152");
        assert_eq!(query["response_mode"], "form_post");
        assert_eq!(query["state"], challenge.state);
        assert_eq!(query["nonce"], challenge.nonce);
        assert_eq!(query["code_challenge_method"], "S256");
        assert_eq!(query["code_challenge"], challenge.code_challenge());
    }

    #[test]
    fn test_decode_token_response() {
        let tokens = decode_token_response(TOKENS).unwrap();
        assert_eq!(tokens.id_token, "id");
        assert_eq!(tokens.access_token, "access");
        assert_eq!(tokens.refresh_token, "refresh");
    }

    #[test]
    fn test_decode_rejects_missing_or_mistyped_fields() {
        assert!(decode_token_response(r#"{"access_token":"a","refresh_token":"r"}"#).is_err());
        assert!(decode_token_response(r#"{"id_token":"i","access_token":5,"refresh_token":"r"}"#).is_err());
        assert!(decode_token_response(r#"{"id_token":"i","access_token":"","refresh_token":"r"}"#).is_err());
        assert!(decode_token_response("not json").is_err());
    }

    #[test]
    fn test_token_set_debug_is_redacted() {
        let tokens = decode_token_response(TOKENS).unwrap();
        let debug = format!("{:?}", tokens);
        assert!(!debug.contains("access\""));
        assert!(debug.contains("<redacted>"));
    }

    #[tokio::test]
    async fn test_exchange_code_sends_pkce_fields() {
        let server = MockServer::start().await;
        let challenge = AuthChallenge::new(5000);
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=the-code"))
            .and(body_string_contains(format!("code_verifier={}", challenge.verifier)))
            .and(body_string_contains("client_secret=s3cret"))
            .and(body_string_contains("redirect_uri=http%3A%2F%2F127.0.0.1%3A5000"))
            .respond_with(ResponseTemplate::new(200).set_body_string(TOKENS))
            .expect(1)
            .mount(&server)
            .await;

        let tokens = provider(format!("{}/token", server.uri()))
            .exchange_code("the-code", "ss", &challenge, &CancelToken::new())
            .await
            .unwrap();
        assert_eq!(tokens.access_token, "access");
    }

    #[tokio::test]
    async fn test_refresh_rejection_is_http_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=old"))
            .respond_with(ResponseTemplate::new(400).set_body_string(r#"{"error":"invalid_grant"}"#))
            .expect(1)
            .mount(&server)
            .await;

        let err = provider(server.uri())
            .refresh("old", &CancelToken::new())
            .await
            .unwrap_err();
        assert!(err.is_rejection());
    }

    #[test]
    fn test_is_supported_requires_secret() {
        let mut config = Config::default();
        config.client_secret = Some("x".to_string());
        assert!(IdentityProvider::new(&config, HttpsClient::new()).is_supported());
    }
}

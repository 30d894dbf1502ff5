//! Cancellable HTTPS client
//!
//! Thin wrapper around `reqwest` that checks a [`CancelToken`] before
//! sending, while waiting for the response and between body chunks, and
//! turns non-2xx responses into [`Error::HttpStatus`].

use reqwest::header::{COOKIE, SET_COOKIE};
use reqwest::{Client, RequestBuilder, Response};
use serde::Serialize;
use crate::Result;
use crate::cancel::CancelToken;
use crate::error::Error;

/// Longest error body kept in [`Error::HttpStatus`]
const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Clone, Default)]
pub struct HttpsClient {
    client: Client,
}

/// Body and cookies of an authorized GET
#[derive(Debug, Clone)]
pub struct AuthorizedReply {
    pub body: String,
    /// `name=value` pairs from every `Set-Cookie` header
    pub cookies: Vec<String>,
}

impl HttpsClient {
    pub fn new() -> Self {
        Self { client: Client::new() }
    }

    /// POST a form-encoded body and return the response text
    pub async fn post_form<T: Serialize + ?Sized>(
        &self,
        url: &str,
        form: &T,
        cancel: &CancelToken,
    ) -> Result<String> {
        let response = self.send(self.client.post(url).form(form), cancel).await?;
        let body = read_body(response, cancel).await?;
        String::from_utf8(body).map_err(|e| Error::Other(format!("Response is not UTF-8: {}", e)))
    }

    /// GET with a bearer token
    pub async fn get_authorized(
        &self,
        url: &str,
        bearer: &str,
        cancel: &CancelToken,
    ) -> Result<AuthorizedReply> {
        let response = self.send(self.client.get(url).bearer_auth(bearer), cancel).await?;

        let cookies = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .filter_map(|value| value.split(';').next())
            .map(|pair| pair.trim().to_string())
            .filter(|pair| !pair.is_empty())
            .collect();

        let body = read_body(response, cancel).await?;
        let body = String::from_utf8(body)
            .map_err(|e| Error::Other(format!("Response is not UTF-8: {}", e)))?;

        Ok(AuthorizedReply { body, cookies })
    }

    /// Download raw bytes, sending `cookies` as the `Cookie` header when non-empty
    pub async fn download(&self, url: &str, cookies: &str, cancel: &CancelToken) -> Result<Vec<u8>> {
        let mut request = self.client.get(url);
        if !cookies.is_empty() {
            request = request.header(COOKIE, cookies);
        }
        let response = self.send(request, cancel).await?;
        read_body(response, cancel).await
    }

    async fn send(&self, request: RequestBuilder, cancel: &CancelToken) -> Result<Response> {
        cancel.check()?;

        let response = tokio::select! {
            response = request.send() => response?,
            _ = cancel.cancelled() => return Err(Error::Cancelled),
        };

        let status = response.status();
        if !status.is_success() {
            let body = match read_body(response, cancel).await {
                Ok(bytes) => bytes,
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(_) => Vec::new(),
            };
            let mut body = String::from_utf8_lossy(&body).into_owned();
            if body.len() > MAX_ERROR_BODY {
                let mut end = MAX_ERROR_BODY;
                while !body.is_char_boundary(end) {
                    end -= 1;
                }
                body.truncate(end);
            }
            return Err(Error::HttpStatus { status: status.as_u16(), body });
        }

        Ok(response)
    }
}

async fn read_body(mut response: Response, cancel: &CancelToken) -> Result<Vec<u8>> {
    let mut body = Vec::new();
    loop {
        cancel.check()?;
        let chunk = tokio::select! {
            chunk = response.chunk() => chunk?,
            _ = cancel.cancelled() => return Err(Error::Cancelled),
        };
        match chunk {
            Some(bytes) => body.extend_from_slice(&bytes),
            None => break,
        }
    }
    cancel.check()?;
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_post_form_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpsClient::new();
        let form = [("grant_type", "refresh_token")];
        let body = client
            .post_form(&format!("{}/token", server.uri()), &form, &CancelToken::new())
            .await
            .unwrap();
        assert_eq!(body, "ok");
    }

    #[tokio::test]
    async fn test_non_success_is_distinguishable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid_grant"))
            .mount(&server)
            .await;

        let client = HttpsClient::new();
        let err = client
            .post_form(&server.uri(), &[("a", "b")], &CancelToken::new())
            .await
            .unwrap_err();
        assert!(err.is_rejection());
        match err {
            Error::HttpStatus { status, body } => {
                assert_eq!(status, 400);
                assert_eq!(body, "invalid_grant");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_cancelled_before_send_makes_no_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let cancel = CancelToken::new();
        cancel.cancel();
        let err = HttpsClient::new()
            .download(&server.uri(), "", &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[tokio::test]
    async fn test_cancel_while_waiting_for_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(vec![1u8; 16])
                    .set_delay(std::time::Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let err = HttpsClient::new()
            .download(&server.uri(), "", &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[tokio::test]
    async fn test_cancel_while_reading_error_body() {
        // answers 500 at once, then stalls halfway through the body
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket
                .write_all(b"HTTP/1.1 500 Internal Server Error\r\nContent-Length: 100\r\n\r\npartial")
                .await
                .unwrap();
            tokio::time::sleep(std::time::Duration::from_secs(10)).await;
        });

        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(200)).await;
            trigger.cancel();
        });

        let result = tokio::time::timeout(
            std::time::Duration::from_secs(3),
            HttpsClient::new().post_form(&format!("http://127.0.0.1:{}", port), &[("a", "b")], &cancel),
        )
        .await
        .expect("cancel should interrupt the error body");
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn test_long_error_body_is_truncated() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("é".repeat(400)))
            .mount(&server)
            .await;

        let err = HttpsClient::new()
            .download(&server.uri(), "", &CancelToken::new())
            .await
            .unwrap_err();
        match err {
            Error::HttpStatus { status, body } => {
                assert_eq!(status, 503);
                assert!(body.len() <= MAX_ERROR_BODY);
                assert!(body.chars().all(|c| c == 'é'));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_authorized_get_collects_cookies() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("authorization", "Bearer abc"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("key")
                    .append_header("set-cookie", "CloudFront-Policy=p1; Path=/; Secure")
                    .append_header("set-cookie", "CloudFront-Signature=s1; Path=/"),
            )
            .mount(&server)
            .await;

        let reply = HttpsClient::new()
            .get_authorized(&server.uri(), "abc", &CancelToken::new())
            .await
            .unwrap();
        assert_eq!(reply.body, "key");
        assert_eq!(
            reply.cookies,
            vec!["CloudFront-Policy=p1".to_string(), "CloudFront-Signature=s1".to_string()]
        );
    }

    #[tokio::test]
    async fn test_download_sends_cookie_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("cookie", "a=1; b=2"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8, 8, 9]))
            .expect(1)
            .mount(&server)
            .await;

        let bytes = HttpsClient::new()
            .download(&server.uri(), "a=1; b=2", &CancelToken::new())
            .await
            .unwrap();
        assert_eq!(bytes, vec![7u8, 8, 9]);
    }
}

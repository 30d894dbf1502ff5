//! OAuth2 callback server
//!
//! A temporary loopback HTTP server that receives the provider's
//! `form_post` reply. It binds an OS-assigned port on 127.0.0.1, hands the
//! first form-encoded POST to a handler and then shuts down.

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use crate::Result;
use crate::cancel::CancelToken;
use crate::error::Error;

/// Requests larger than this are refused
const MAX_REQUEST_BYTES: usize = 64 * 1024;

/// Connections that send no complete request within this time are dropped
const READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Success HTML page shown after authorization
const SUCCESS_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>navcharts | Login Successful</title>
    <style>
        body {
            background-color: #0b0e14;
            color: #e2e8f0;
            font-family: -apple-system, system-ui, sans-serif;
            display: flex;
            justify-content: center;
            align-items: center;
            height: 100vh;
            margin: 0;
            text-align: center;
        }
        h1 { font-size: 24px; color: #22c55e; }
        p { font-size: 15px; color: #94a3b8; line-height: 1.6; }
    </style>
</head>
<body>
    <div>
        <h1>Login Successful</h1>
        <p>Charts are now available.<br>You can close this window.</p>
    </div>
</body>
</html>"#;

/// Error HTML page
const ERROR_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>navcharts | Login Failed</title>
    <style>
        body {
            background-color: #0b0e14;
            color: #e2e8f0;
            font-family: -apple-system, system-ui, sans-serif;
            display: flex;
            justify-content: center;
            align-items: center;
            height: 100vh;
            margin: 0;
            text-align: center;
        }
        h1 { font-size: 24px; color: #ef4444; }
        p { font-size: 15px; color: #94a3b8; line-height: 1.6; }
    </style>
</head>
<body>
    <div>
        <h1>Login Failed</h1>
        <p>The login link only works once.<br>Please start the login again.</p>
    </div>
</body>
</html>"#;

/// Form fields of a callback POST
pub type FormFields = HashMap<String, String>;

/// A bound, not yet serving, loopback listener
pub struct CallbackServer {
    listener: TcpListener,
    port: u16,
}

#[derive(Debug)]
struct RawRequest {
    method: String,
    body: String,
}

/// A connection whose request has been read, or failed to read
type ReadOutcome = (TcpStream, SocketAddr, Result<RawRequest>);

impl CallbackServer {
    /// Bind an ephemeral port on 127.0.0.1
    pub async fn bind() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await
            .map_err(|e| Error::Auth(format!("Failed to start callback server: {}", e)))?;
        let port = listener.local_addr()?.port();

        tracing::info!("Callback server listening on http://127.0.0.1:{}", port);

        Ok(Self { listener, port })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Wait for one form POST and pass its fields to `on_reply`
    ///
    /// Every connection is read on its own task, so an idle socket (such as
    /// a browser preconnect) cannot hold up the real callback. Requests that
    /// are not POSTs are answered with 405 and do not count. The handler's
    /// result decides the page shown in the browser and is returned once the
    /// response has been written.
    pub async fn serve_once<F, Fut>(self, cancel: CancelToken, on_reply: F) -> Result<()>
    where
        F: FnOnce(FormFields) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let mut readers: JoinSet<ReadOutcome> = JoinSet::new();

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (socket, peer) = accepted
                        .map_err(|e| Error::Auth(format!("Failed to accept connection: {}", e)))?;
                    readers.spawn(read_connection(socket, peer));
                }
                Some(joined) = readers.join_next(), if !readers.is_empty() => {
                    let (mut socket, peer, request) = match joined {
                        Ok(outcome) => outcome,
                        Err(e) => {
                            tracing::warn!("Callback connection task failed: {}", e);
                            continue;
                        }
                    };

                    let request = match request {
                        Ok(request) => request,
                        Err(e) => {
                            tracing::warn!("Ignoring malformed callback request from {}: {}", peer, e);
                            respond(&mut socket, "400 Bad Request", ERROR_HTML).await;
                            continue;
                        }
                    };

                    if !request.method.eq_ignore_ascii_case("POST") {
                        tracing::debug!("Ignoring {} request from {}", request.method, peer);
                        respond(&mut socket, "405 Method Not Allowed", "").await;
                        continue;
                    }

                    let result = on_reply(parse_form(&request.body)).await;

                    let (status, body) = match &result {
                        Ok(()) => ("200 OK", SUCCESS_HTML),
                        Err(_) => ("400 Bad Request", ERROR_HTML),
                    };
                    respond(&mut socket, status, body).await;

                    // Dropping the set aborts the remaining readers
                    return result;
                }
                _ = cancel.cancelled() => {
                    tracing::debug!("Callback server on port {} cancelled", self.port);
                    return Err(Error::Cancelled);
                }
            }
        }
    }
}

/// Decode an `application/x-www-form-urlencoded` body
pub fn parse_form(body: &str) -> FormFields {
    url::form_urlencoded::parse(body.trim().as_bytes())
        .into_owned()
        .collect()
}

async fn read_connection(mut socket: TcpStream, peer: SocketAddr) -> ReadOutcome {
    let request = match tokio::time::timeout(READ_TIMEOUT, read_request(&mut socket)).await {
        Ok(request) => request,
        Err(_) => Err(Error::Protocol("Timed out reading callback request".to_string())),
    };
    (socket, peer, request)
}

async fn read_request(socket: &mut TcpStream) -> Result<RawRequest> {
    let mut buffer = Vec::with_capacity(4096);
    let mut chunk = [0u8; 4096];

    loop {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..n]);

        if buffer.len() > MAX_REQUEST_BYTES {
            return Err(Error::Protocol("Callback request too large".to_string()));
        }
        if let Some(expected) = expected_length(&buffer)? {
            if buffer.len() >= expected {
                break;
            }
        }
    }

    parse_request(&buffer)
}

/// Total request length once the header block is complete
///
/// Fails as soon as the announced length exceeds [`MAX_REQUEST_BYTES`].
fn expected_length(buffer: &[u8]) -> Result<Option<usize>> {
    let Some(header_end) = buffer.windows(4).position(|w| w == b"\r\n\r\n") else {
        return Ok(None);
    };
    let header_end = header_end + 4;
    let head = String::from_utf8_lossy(&buffer[..header_end]);

    let content_length = match head
        .lines()
        .skip(1)
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
    {
        Some((_, value)) => value
            .trim()
            .parse::<u64>()
            .map_err(|_| Error::Protocol("Invalid Content-Length".to_string()))?,
        None => 0,
    };
    let content_length = usize::try_from(content_length)
        .map_err(|_| Error::Protocol("Callback request too large".to_string()))?;

    header_end
        .checked_add(content_length)
        .filter(|total| *total <= MAX_REQUEST_BYTES)
        .map(Some)
        .ok_or_else(|| Error::Protocol("Callback request too large".to_string()))
}

fn parse_request(raw: &[u8]) -> Result<RawRequest> {
    let text = String::from_utf8_lossy(raw);
    let (head, body) = text
        .split_once("\r\n\r\n")
        .ok_or_else(|| Error::Protocol("Incomplete request".to_string()))?;

    let method = head
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().next())
        .ok_or_else(|| Error::Protocol("Empty request".to_string()))?;

    Ok(RawRequest {
        method: method.to_string(),
        body: body.to_string(),
    })
}

async fn respond(socket: &mut TcpStream, status: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    );

    let _ = socket.write_all(response.as_bytes()).await;
    let _ = socket.shutdown().await;
}

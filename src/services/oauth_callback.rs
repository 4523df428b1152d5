//! One-shot loopback HTTP listener for the OAuth redirect.
//!
//! The sign-in flow redirects the browser to `redirect_to`
//! (`http://127.0.0.1:<port>/auth/callback` by default). This listener accepts
//! that single request, answers with a short plain-text page, and hands the
//! full callback URL back so the code can be exchanged.

use std::net::SocketAddr;
use std::time::Duration;

use reqwest::Url;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::types::errors::AuthError;

/// Upper bound on the request head we are willing to read.
const MAX_REQUEST_BYTES: usize = 8 * 1024;

/// How long one connection may take to send its request head.
const HEAD_READ_TIMEOUT: Duration = Duration::from_secs(5);

pub struct CallbackListener {
    listener: TcpListener,
    path: String,
    head_timeout: Duration,
}

/// Request target (`/path?query`) from an HTTP request head.
pub fn request_target(head: &str) -> Option<&str> {
    let line = head.lines().next()?;
    let mut parts = line.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some("GET"), Some(target)) => Some(target),
        _ => None,
    }
}

impl CallbackListener {
    /// Binds the host and port of `redirect_to`. Only loopback hosts are accepted.
    pub async fn bind(redirect_to: &str) -> Result<Self, AuthError> {
        let url = Url::parse(redirect_to)
            .map_err(|e| AuthError::Rejected(format!("invalid redirect url: {}", e)))?;
        let host = url.host_str().unwrap_or_default();
        let host = match host {
            "localhost" => "127.0.0.1",
            "127.0.0.1" | "[::1]" => host,
            other => {
                return Err(AuthError::Rejected(format!(
                    "redirect host must be loopback, got {}",
                    other
                )))
            }
        };
        let port = url.port_or_known_default().unwrap_or(80);
        Self::bind_addr(&format!("{}:{}", host, port), url.path()).await
    }

    /// Binds `addr` and waits for requests to `path`.
    pub async fn bind_addr(addr: &str, path: &str) -> Result<Self, AuthError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| AuthError::NetworkError(format!("cannot listen on {}: {}", addr, e)))?;
        Ok(Self {
            listener,
            path: path.to_string(),
            head_timeout: HEAD_READ_TIMEOUT,
        })
    }

    /// Overrides how long a single connection may stay silent.
    pub fn with_head_timeout(mut self, timeout: Duration) -> Self {
        self.head_timeout = timeout;
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr, AuthError> {
        self.listener
            .local_addr()
            .map_err(|e| AuthError::NetworkError(e.to_string()))
    }

    /// Waits up to `timeout` for the redirect and returns the callback URL.
    pub async fn wait(self, timeout: Duration) -> Result<String, AuthError> {
        tokio::time::timeout(timeout, self.accept_callback())
            .await
            .map_err(|_| AuthError::Rejected("timed out waiting for the sign-in redirect".to_string()))?
    }

    async fn accept_callback(&self) -> Result<String, AuthError> {
        let addr = self.local_addr()?;
        loop {
            let (mut stream, peer) = self
                .listener
                .accept()
                .await
                .map_err(|e| AuthError::NetworkError(e.to_string()))?;
            let head = match tokio::time::timeout(self.head_timeout, read_head(&mut stream)).await {
                Ok(Ok(head)) => head,
                Ok(Err(e)) => {
                    tracing::debug!(%peer, error = %e, "unreadable callback request");
                    continue;
                }
                Err(_) => {
                    tracing::debug!(%peer, "callback connection sent nothing, dropping it");
                    continue;
                }
            };

            let target = request_target(&head).map(str::to_string);
            match target {
                Some(target) if target.split('?').next() == Some(self.path.as_str()) => {
                    let _ = respond(&mut stream, "200 OK", "Sign-in received. You can close this window.").await;
                    return Ok(format!("http://{}{}", addr, target));
                }
                _ => {
                    let _ = respond(&mut stream, "404 Not Found", "Not found.").await;
                }
            }
        }
    }
}

async fn read_head(stream: &mut TcpStream) -> std::io::Result<String> {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if buf.windows(4).any(|w| w == b"\r\n\r\n") || buf.len() >= MAX_REQUEST_BYTES {
            break;
        }
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

async fn respond(stream: &mut TcpStream, status: &str, message: &str) -> std::io::Result<()> {
    let body = format!("{}\n", message);
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    );
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await
}

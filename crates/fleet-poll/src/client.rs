//! Minimal JSON-over-HTTP/1 client for status servers.

use std::time::Duration;

use bytes::Bytes;
use fleet_state::{ServerList, StatusData};
use http::Uri;
use http_body_util::{BodyExt, Empty};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{PollError, PollResult};

/// Talks to one status server: `GET /servers` and `GET /status`.
#[derive(Debug, Clone)]
pub struct HttpStatusClient {
    base_url: String,
    /// `host:port` to connect to.
    authority: String,
    /// Path prefix from the base URL, without a trailing slash.
    prefix: String,
    timeout: Duration,
}

impl HttpStatusClient {
    /// Only plain `http://` URLs are accepted.
    pub fn new(base_url: &str, timeout: Duration) -> PollResult<Self> {
        let invalid = |reason| PollError::InvalidUrl {
            url: base_url.to_string(),
            reason,
        };
        let uri: Uri = base_url.parse().map_err(|_| invalid("not a URI"))?;
        if uri.scheme_str() != Some("http") {
            return Err(invalid("scheme must be http"));
        }
        let host = uri.host().ok_or_else(|| invalid("missing host"))?;
        let port = uri.port_u16().unwrap_or(80);
        Ok(Self {
            base_url: base_url.to_string(),
            authority: format!("{host}:{port}"),
            prefix: uri.path().trim_end_matches('/').to_string(),
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn servers(&self) -> PollResult<ServerList> {
        self.get_json("/servers").await
    }

    pub async fn status(&self) -> PollResult<StatusData> {
        self.get_json("/status").await
    }

    /// GET `path` below the base URL and decode the body as JSON.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> PollResult<T> {
        let target = format!("{}{path}", self.prefix);
        match tokio::time::timeout(self.timeout, self.fetch(&target)).await {
            Ok(body) => {
                let body = body?;
                serde_json::from_slice(&body).map_err(|source| PollError::Decode {
                    uri: self.uri_for(&target),
                    source,
                })
            }
            Err(_) => Err(PollError::Timeout {
                uri: self.uri_for(&target),
                timeout: self.timeout,
            }),
        }
    }

    fn uri_for(&self, target: &str) -> String {
        format!("http://{}{target}", self.authority)
    }

    async fn fetch(&self, target: &str) -> PollResult<Bytes> {
        let stream = tokio::net::TcpStream::connect(&self.authority)
            .await
            .map_err(|source| PollError::Connect {
                addr: self.authority.clone(),
                source,
            })?;

        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|source| PollError::Http {
                uri: self.uri_for(target),
                source,
            })?;

        // Drive the connection in the background.
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!(error = %e, "status connection closed with error");
            }
        });

        let req = http::Request::builder()
            .method("GET")
            .uri(target)
            .header("host", &self.authority)
            .header("accept", "application/json")
            .header("user-agent", "fleet-poll/0.1")
            .body(Empty::<Bytes>::new())?;

        let resp = sender
            .send_request(req)
            .await
            .map_err(|source| PollError::Http {
                uri: self.uri_for(target),
                source,
            })?;
        if !resp.status().is_success() {
            return Err(PollError::Status {
                uri: self.uri_for(target),
                status: resp.status(),
            });
        }

        let body = resp
            .into_body()
            .collect()
            .await
            .map_err(|source| PollError::Http {
                uri: self.uri_for(target),
                source,
            })?;
        Ok(body.to_bytes())
    }
}

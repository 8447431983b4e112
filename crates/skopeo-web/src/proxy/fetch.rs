use std::io::Read;
use std::sync::Arc;

use tracing::{debug, warn};
use url::Url;

use super::ProxyError;
use crate::config::ServerConfig;

const ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

/// One fetched target page. Not retained after the response is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetDocument {
    /// The URL as the operator supplied it, trimmed.
    pub url: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
}

/// Blocking HTTP client for target pages, driven from async handlers on the
/// blocking pool.
#[derive(Clone)]
pub struct PageFetcher {
    agent: ureq::Agent,
    user_agent: Arc<str>,
    max_body_bytes: u64,
}

impl PageFetcher {
    pub fn new(config: &ServerConfig) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(config.timeout).build();
        Self {
            agent,
            user_agent: Arc::from(config.user_agent.as_str()),
            max_body_bytes: config.max_body_bytes,
        }
    }

    pub async fn fetch(&self, raw_url: &str) -> Result<TargetDocument, ProxyError> {
        let target = parse_target(raw_url)?;
        let requested = raw_url.trim().to_string();
        let fetcher = self.clone();
        match tokio::task::spawn_blocking(move || fetcher.fetch_blocking(&target, requested)).await
        {
            Ok(result) => result,
            Err(error) => Err(ProxyError::Internal(format!(
                "fetch worker join error: {error}"
            ))),
        }
    }

    fn fetch_blocking(&self, target: &Url, requested: String) -> Result<TargetDocument, ProxyError> {
        let request = self
            .agent
            .get(target.as_str())
            .set("User-Agent", &self.user_agent)
            .set("Accept", ACCEPT);

        let response = match request.call() {
            Ok(response) => response,
            Err(ureq::Error::Status(status, response)) if status < 500 => response,
            Err(ureq::Error::Status(status, response)) => {
                warn!(url = %target, status, "target returned server error");
                return Err(ProxyError::UpstreamStatus {
                    status,
                    reason: response.status_text().to_string(),
                });
            }
            Err(ureq::Error::Transport(transport)) => {
                warn!(url = %target, error = %transport, "target fetch failed");
                return Err(classify_transport(&transport));
            }
        };

        let status = response.status();
        let final_url = response.get_url().to_string();
        let content_type = response.header("content-type").map(str::to_string);
        if let Some(content_type) = &content_type
            && !is_html_content_type(content_type)
        {
            return Err(ProxyError::UnsupportedContentType(content_type.clone()));
        }

        let mut bytes = Vec::new();
        response
            .into_reader()
            .take(self.max_body_bytes + 1)
            .read_to_end(&mut bytes)
            .map_err(|error| {
                if is_timeout_io(&error) {
                    ProxyError::Timeout
                } else {
                    ProxyError::Unreachable(format!("failed reading target body: {error}"))
                }
            })?;
        if bytes.len() as u64 > self.max_body_bytes {
            return Err(ProxyError::BodyTooLarge {
                limit: self.max_body_bytes,
            });
        }

        debug!(url = %requested, %final_url, status, bytes = bytes.len(), "fetched target page");
        Ok(TargetDocument {
            url: requested,
            status,
            content_type,
            body: String::from_utf8_lossy(&bytes).into_owned(),
        })
    }
}

/// Validates the operator-supplied URL: present, absolute, http(s).
pub fn parse_target(raw: &str) -> Result<Url, ProxyError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ProxyError::MissingUrl);
    }
    let url = Url::parse(raw).map_err(|e| ProxyError::InvalidUrl(format!("{raw}: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ProxyError::InvalidUrl(format!(
            "unsupported scheme '{other}'"
        ))),
    }
}

pub fn is_html_content_type(content_type: &str) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    mime == "text/html" || mime == "application/xhtml+xml"
}

fn classify_transport(transport: &ureq::Transport) -> ProxyError {
    if is_timeout_transport(transport) {
        return ProxyError::Timeout;
    }
    match transport.kind() {
        ureq::ErrorKind::Dns
        | ureq::ErrorKind::ConnectionFailed
        | ureq::ErrorKind::Io
        | ureq::ErrorKind::TooManyRedirects
        | ureq::ErrorKind::BadStatus
        | ureq::ErrorKind::BadHeader => ProxyError::Unreachable(transport.to_string()),
        ureq::ErrorKind::InvalidUrl | ureq::ErrorKind::UnknownScheme => {
            ProxyError::InvalidUrl(transport.to_string())
        }
        _ => ProxyError::Internal(transport.to_string()),
    }
}

fn is_timeout_transport(transport: &ureq::Transport) -> bool {
    let io_timeout = std::error::Error::source(transport)
        .and_then(|source| source.downcast_ref::<std::io::Error>())
        .is_some_and(is_timeout_io);
    io_timeout || transport.to_string().contains("timed out")
}

fn is_timeout_io(error: &std::io::Error) -> bool {
    matches!(
        error.kind(),
        std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
    )
}

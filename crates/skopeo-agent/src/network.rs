//! Network interception.
//!
//! [`InterceptingTransport`] decorates the page's HTTP transport so every
//! explicit call is mirrored to the host as a request record followed by
//! exactly one terminal record. [`ResourceObserver`] turns resource-timing
//! entries (scripts, stylesheets, images, media, fonts) into best-effort
//! records.

use std::error::Error;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use skopeo_types::{
    AgentMessage, Headers, MAX_BODY_CHARS, NetworkCategory, NetworkFailure, NetworkRecord,
    NetworkResponse, RequestId, truncate_chars,
};
use tracing::debug;

use crate::platform::{Clock, HostSink};

/// Request payload as handed to the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Text(String),
    FormData,
    UrlEncoded(Vec<(String, String)>),
    Json(serde_json::Value),
    /// Binary or otherwise unserializable payloads.
    Opaque,
}

impl RequestBody {
    /// Bounded, display-safe rendition recorded in the request record.
    pub fn summarize(&self) -> String {
        match self {
            Self::Text(text) => truncate_chars(text, MAX_BODY_CHARS),
            Self::FormData => "[FormData]".to_string(),
            Self::UrlEncoded(pairs) => url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(pairs)
                .finish(),
            Self::Json(value) => truncate_chars(&value.to_string(), MAX_BODY_CHARS),
            Self::Opaque => "[Complex Object]".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: String,
    pub url: String,
    pub headers: Headers,
    pub body: Option<RequestBody>,
    /// `fetch` or `xhr`, depending on which page API issued the call.
    pub category: NetworkCategory,
}

impl HttpRequest {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            headers: Headers::new(),
            body: None,
            category: NetworkCategory::Fetch,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new("GET", url)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn body(mut self, body: RequestBody) -> Self {
        self.body = Some(body);
        self
    }

    pub fn category(mut self, category: NetworkCategory) -> Self {
        self.category = category;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Headers,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: Vec::new(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
            .map(|(_, value)| value.as_str())
    }

    /// Body as text, only for json/text/xml content types.
    fn textual_body(&self) -> Option<String> {
        if is_textual_content_type(self.content_type()?) {
            Some(truncate_chars(
                &String::from_utf8_lossy(&self.body),
                MAX_BODY_CHARS,
            ))
        } else {
            None
        }
    }
}

/// Whether a response with this content type has its body mirrored.
pub fn is_textual_content_type(content_type: &str) -> bool {
    let content_type = content_type.to_ascii_lowercase();
    ["json", "text", "xml"]
        .iter()
        .any(|marker| content_type.contains(marker))
}

/// Transport-level failure (DNS, refused connection, aborted request...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError {
    message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl Error for TransportError {}

/// The page's HTTP transport.
pub trait Transport {
    fn send(
        &self,
        request: HttpRequest,
    ) -> impl Future<Output = Result<HttpResponse, TransportError>>;
}

/// Monotonic `<prefix>-N` id source.
///
/// Interceptors that report into the same host share one through an `Arc`
/// so their ids never collide.
#[derive(Debug)]
pub struct RequestIds {
    prefix: &'static str,
    next: AtomicU64,
}

impl RequestIds {
    pub const fn new(prefix: &'static str) -> Self {
        Self {
            prefix,
            next: AtomicU64::new(1),
        }
    }

    pub fn next(&self) -> RequestId {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        RequestId::new(format!("{}-{n}", self.prefix))
    }
}

/// Decorator over a [`Transport`] that reports each call to the host.
///
/// Emits `network-request` before forwarding, then `network-response` or
/// `network-error`, and hands back the inner result untouched.
pub struct InterceptingTransport<T, S, C> {
    inner: T,
    sink: S,
    clock: C,
    ids: Arc<RequestIds>,
}

impl<T: Transport, S: HostSink, C: Clock> InterceptingTransport<T, S, C> {
    pub fn new(inner: T, sink: S, clock: C) -> Self {
        Self::sharing(inner, sink, clock, Arc::new(RequestIds::new("req")))
    }

    /// Like [`InterceptingTransport::new`], drawing ids from `ids`.
    pub fn sharing(inner: T, sink: S, clock: C, ids: Arc<RequestIds>) -> Self {
        Self {
            inner,
            sink,
            clock,
            ids,
        }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    pub async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let id = self.ids.next();
        let started = self.clock.now_ms();
        let mut record = NetworkRecord::pending(
            id.clone(),
            request.method.clone(),
            request.url.clone(),
            request.category,
            started,
        );
        record.request_headers = Some(request.headers.clone());
        record.request_body = request.body.as_ref().map(RequestBody::summarize);
        self.sink.post(AgentMessage::NetworkRequest(record));

        let result = self.inner.send(request).await;
        let finished = self.clock.now_ms();
        match &result {
            Ok(response) => {
                self.sink.post(AgentMessage::NetworkResponse(NetworkResponse {
                    id,
                    status: response.status,
                    timestamp: finished,
                    duration: (finished - started).max(0) as f64,
                    response_headers: response.headers.clone(),
                    response_body: response.textual_body(),
                }));
            }
            Err(error) => {
                debug!(%id, %error, "intercepted request failed");
                self.sink.post(AgentMessage::NetworkError(NetworkFailure {
                    id,
                    error: error.to_string(),
                    timestamp: finished,
                }));
            }
        }
        result
    }
}

impl<T: Transport, S: HostSink, C: Clock> Transport for InterceptingTransport<T, S, C> {
    fn send(
        &self,
        request: HttpRequest,
    ) -> impl Future<Output = Result<HttpResponse, TransportError>> {
        InterceptingTransport::send(self, request)
    }
}

/// One resource-timing entry.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceEntry {
    pub name: String,
    pub initiator_type: String,
    /// Milliseconds.
    pub duration: f64,
}

/// Reports resource loads that explicit interception does not see.
pub struct ResourceObserver<S, C> {
    sink: S,
    clock: C,
    ids: RequestIds,
}

impl<S: HostSink, C: Clock> ResourceObserver<S, C> {
    pub fn new(sink: S, clock: C) -> Self {
        Self {
            sink,
            clock,
            ids: RequestIds::new("res"),
        }
    }

    /// Emits a completed `network-request` record for a resource entry,
    /// assumed successful. Returns the id used, or `None` when the entry's
    /// initiator is skipped.
    pub fn observe(&self, entry: &ResourceEntry) -> Option<RequestId> {
        let category = match NetworkCategory::from_initiator(&entry.initiator_type)? {
            NetworkCategory::Other => return None,
            category => category,
        };
        let duration = entry.duration.max(0.0);
        let id = self.ids.next();
        let mut record = NetworkRecord::pending(
            id.clone(),
            "GET",
            entry.name.clone(),
            category,
            self.clock.now_ms() - duration.round() as i64,
        );
        record.duration = Some(duration);
        record.status = Some(200);
        self.sink.post(AgentMessage::NetworkRequest(record));
        Some(id)
    }
}

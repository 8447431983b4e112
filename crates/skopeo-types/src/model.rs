use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Header name → value. Ordering carries no meaning.
pub type Headers = BTreeMap<String, String>;

/// Snapshot of an element's bounding client rectangle, in CSS pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub left: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
            top: y,
            right: x + width,
            bottom: y + height,
            left: x,
        }
    }
}

/// Tag/id/class of an immediate child, without recursing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildSummary {
    pub tag_name: String,
    pub id: String,
    pub class_name: String,
}

/// Message-safe snapshot of a selected element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementDescriptor {
    pub tag_name: String,
    pub id: String,
    pub class_name: String,
    pub inner_text: String,
    /// Inner markup, truncated to [`crate::MAX_INNER_HTML_CHARS`].
    pub inner_html: String,
    pub attributes: BTreeMap<String, String>,
    /// Full ancestor-chain selector; re-evaluating it yields this element.
    pub selector: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xpath: Option<String>,
    pub rect: Rect,
    pub has_parent: bool,
    pub children: Vec<ChildSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tree: Option<DomTreeNode>,
}

/// One node of a bounded DOM subtree capture.
///
/// `path` is the list of child indices leading from the capture root to this
/// node; the root itself has an empty path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomTreeNode {
    pub tag_name: String,
    pub id: String,
    pub class_name: String,
    pub path: Vec<usize>,
    #[serde(default)]
    pub children: Vec<DomTreeNode>,
}

impl DomTreeNode {
    /// Walks the snapshot by child index.
    pub fn descendant(&self, path: &[usize]) -> Option<&DomTreeNode> {
        path.iter()
            .try_fold(self, |node, &index| node.children.get(index))
    }

    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(DomTreeNode::node_count).sum::<usize>()
    }

    pub fn depth(&self) -> usize {
        self.children
            .iter()
            .map(|child| child.depth() + 1)
            .max()
            .unwrap_or(0)
    }
}

/// Opaque network record identifier, unique within one agent session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkCategory {
    Fetch,
    Xhr,
    Script,
    Image,
    Css,
    Video,
    Audio,
    Font,
    Other,
}

impl NetworkCategory {
    /// Maps a resource-timing `initiatorType` to a category. Returns `None`
    /// for initiators that are captured by explicit interception instead.
    pub fn from_initiator(initiator: &str) -> Option<Self> {
        match initiator {
            "fetch" | "xmlhttprequest" | "beacon" => None,
            "script" => Some(Self::Script),
            "link" | "css" => Some(Self::Css),
            "img" | "image" => Some(Self::Image),
            "video" => Some(Self::Video),
            "audio" => Some(Self::Audio),
            "font" => Some(Self::Font),
            _ => Some(Self::Other),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fetch => "fetch",
            Self::Xhr => "xhr",
            Self::Script => "script",
            Self::Image => "image",
            Self::Css => "css",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Font => "font",
            Self::Other => "other",
        }
    }
}

/// One intercepted network call as seen by the consumer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkRecord {
    pub id: RequestId,
    pub url: String,
    pub method: String,
    pub category: NetworkCategory,
    /// Request start, milliseconds since the Unix epoch.
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_headers: Option<Headers>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_headers: Option<Headers>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl NetworkRecord {
    pub fn pending(
        id: RequestId,
        method: impl Into<String>,
        url: impl Into<String>,
        category: NetworkCategory,
        timestamp: i64,
    ) -> Self {
        Self {
            id,
            url: url.into(),
            method: method.into(),
            category,
            timestamp,
            duration: None,
            request_headers: None,
            response_headers: None,
            request_body: None,
            response_body: None,
            status: None,
            error: None,
        }
    }

    /// A record is terminal once it carries a status or an error.
    pub fn is_complete(&self) -> bool {
        self.status.is_some() || self.error.is_some()
    }

    pub fn apply_response(&mut self, response: NetworkResponse) {
        self.status = Some(response.status);
        self.duration = Some(response.duration);
        self.response_headers = Some(response.response_headers);
        self.response_body = response.response_body;
    }

    pub fn apply_failure(&mut self, failure: NetworkFailure) {
        self.duration = Some((failure.timestamp - self.timestamp).max(0) as f64);
        self.error = Some(failure.error);
    }
}

/// Terminal success record for a request, keyed by the request's id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkResponse {
    pub id: RequestId,
    pub status: u16,
    pub timestamp: i64,
    /// Milliseconds between request start and completion; never negative.
    pub duration: f64,
    #[serde(default)]
    pub response_headers: Headers,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_body: Option<String>,
}

/// Terminal failure record for a request, keyed by the request's id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkFailure {
    pub id: RequestId,
    pub error: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleLevel {
    Log,
    Warn,
    Error,
    Info,
}

impl ConsoleLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Log => "log",
            Self::Warn => "warn",
            Self::Error => "error",
            Self::Info => "info",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleRecord {
    pub level: ConsoleLevel,
    pub args: Vec<String>,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageEntry {
    pub key: String,
    pub value: String,
}

impl StorageEntry {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Cookies and local key-value entries captured in one scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageSnapshot {
    pub cookies: Vec<StorageEntry>,
    pub local_storage: Vec<StorageEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    Audio,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MediaAsset {
    pub url: String,
    pub kind: MediaKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<Dimensions>,
}

//! Seams between the agent and the environment it runs in.
//!
//! A browser binding implements these over the live page; [`crate::dom::MemoryDocument`]
//! implements [`Document`] in memory for tests and headless use.

use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use skopeo_types::{AgentMessage, Dimensions, Rect};

/// Read/write access to the inspected document.
///
/// Every method that takes a node only ever receives nodes this document
/// handed out. `children` and `parent_element` only traverse element nodes.
pub trait Document {
    type Node: Clone + PartialEq + fmt::Debug;

    /// The `<html>` element, if the document has one.
    fn document_element(&self) -> Option<Self::Node>;
    fn parent_element(&self, node: &Self::Node) -> Option<Self::Node>;
    fn children(&self, node: &Self::Node) -> Vec<Self::Node>;
    /// Lowercase tag name.
    fn tag_name(&self, node: &Self::Node) -> String;
    /// Attributes in source order.
    fn attributes(&self, node: &Self::Node) -> Vec<(String, String)>;
    fn inner_text(&self, node: &Self::Node) -> String;
    fn inner_html(&self, node: &Self::Node) -> String;
    fn bounding_rect(&self, node: &Self::Node) -> Rect;

    fn add_class(&mut self, node: &Self::Node, class: &str);
    fn remove_class(&mut self, node: &Self::Node, class: &str);

    /// First descendant of `scope` matching a CSS selector.
    fn query_selector(
        &self,
        scope: &Self::Node,
        selector: &str,
    ) -> Result<Option<Self::Node>, LookupError>;

    /// First element, in document order, selected by an XPath expression
    /// evaluated against the whole document.
    fn evaluate_xpath(&self, expression: &str) -> Result<Option<Self::Node>, LookupError>;

    /// Installs a stylesheet into the document head.
    fn inject_style(&mut self, css: &str);

    fn scroll_into_view(&mut self, _node: &Self::Node) {}

    /// Resolved `src` property of a media element.
    fn resource_url(&self, node: &Self::Node) -> Option<String>;
    /// Natural pixel size of a loaded image.
    fn natural_size(&self, node: &Self::Node) -> Option<Dimensions>;
    /// Computed `background-image` value, e.g. `url("https://…/a.png")` or `none`.
    fn background_image(&self, node: &Self::Node) -> Option<String>;

    fn attribute(&self, node: &Self::Node, name: &str) -> Option<String> {
        self.attributes(node)
            .into_iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    }

    fn id(&self, node: &Self::Node) -> String {
        self.attribute(node, "id").unwrap_or_default()
    }

    fn class_name(&self, node: &Self::Node) -> String {
        self.attribute(node, "class").unwrap_or_default()
    }

    fn has_class(&self, node: &Self::Node, class: &str) -> bool {
        self.class_name(node)
            .split_ascii_whitespace()
            .any(|token| token == class)
    }

    /// Every element in document order.
    fn elements(&self) -> Vec<Self::Node> {
        let mut out = Vec::new();
        let mut stack: Vec<Self::Node> = self.document_element().into_iter().collect();
        while let Some(node) = stack.pop() {
            let mut children = self.children(&node);
            children.reverse();
            stack.extend(children);
            out.push(node);
        }
        out
    }

    fn elements_by_tag(&self, tag: &str) -> Vec<Self::Node> {
        self.elements()
            .into_iter()
            .filter(|node| self.tag_name(node).eq_ignore_ascii_case(tag))
            .collect()
    }
}

/// Failure reported by a selector or XPath evaluator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupError {
    message: String,
}

impl LookupError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn invalid_selector(selector: &str) -> Self {
        Self::new(format!("'{selector}' is not a valid selector"))
    }

    pub fn invalid_xpath(expression: &str) -> Self {
        Self::new(format!("'{expression}' is not a valid XPath expression"))
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for LookupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl Error for LookupError {}

/// Outbound half of the agent↔host channel. Posting never fails from the
/// agent's point of view; an undeliverable message is simply lost.
pub trait HostSink {
    fn post(&self, message: AgentMessage);
}

impl<T: HostSink + ?Sized> HostSink for &T {
    fn post(&self, message: AgentMessage) {
        (**self).post(message)
    }
}

impl<T: HostSink + ?Sized> HostSink for Arc<T> {
    fn post(&self, message: AgentMessage) {
        (**self).post(message)
    }
}

/// Buffers every posted message in order.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    messages: Arc<Mutex<Vec<AgentMessage>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drains buffered messages.
    pub fn take(&self) -> Vec<AgentMessage> {
        std::mem::take(&mut *self.messages.lock())
    }

    pub fn snapshot(&self) -> Vec<AgentMessage> {
        self.messages.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.lock().is_empty()
    }
}

impl HostSink for MemorySink {
    fn post(&self, message: AgentMessage) {
        self.messages.lock().push(message);
    }
}

/// Serializes messages to JSON and hands them to a raw post function
/// (`window.parent.postMessage` in a browser binding).
pub struct JsonSink<F> {
    post: F,
}

impl<F: Fn(String)> JsonSink<F> {
    pub fn new(post: F) -> Self {
        Self { post }
    }
}

impl<F: Fn(String)> HostSink for JsonSink<F> {
    fn post(&self, message: AgentMessage) {
        match message.to_json() {
            Ok(json) => (self.post)(json),
            Err(error) => tracing::warn!(kind = message.kind(), %error, "dropping unencodable message"),
        }
    }
}

pub trait Clock {
    /// Milliseconds since the Unix epoch.
    fn now_ms(&self) -> i64;
}

impl<T: Clock + ?Sized> Clock for &T {
    fn now_ms(&self) -> i64 {
        (**self).now_ms()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|duration| duration.as_millis().min(i64::MAX as u128) as i64)
            .unwrap_or(0)
    }
}

/// Clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn starting_at(now_ms: i64) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(now_ms)),
        }
    }

    pub fn set(&self, now_ms: i64) {
        self.now.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, by_ms: i64) {
        self.now.fetch_add(by_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Cookie jar and persistent key-value store of the inspected page.
pub trait StorageSource {
    /// `document.cookie`: non-HTTP-only cookies as `a=1; b=2`.
    fn cookie_string(&self) -> String;
    /// Local key-value entries in key-index order.
    fn local_entries(&self) -> Result<Vec<(String, String)>, StorageError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    AccessDenied(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AccessDenied(reason) => write!(f, "storage access denied: {reason}"),
        }
    }
}

impl Error for StorageError {}

/// In-memory storage, for tests and headless use.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    pub cookies: String,
    pub local: Vec<(String, String)>,
    pub denied: bool,
}

impl StorageSource for MemoryStorage {
    fn cookie_string(&self) -> String {
        self.cookies.clone()
    }

    fn local_entries(&self) -> Result<Vec<(String, String)>, StorageError> {
        if self.denied {
            return Err(StorageError::AccessDenied(
                "the document is sandboxed and lacks the 'allow-same-origin' flag".into(),
            ));
        }
        Ok(self.local.clone())
    }
}

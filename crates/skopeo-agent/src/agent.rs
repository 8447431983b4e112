//! The instrumentation agent: pointer-driven selection, remote control from
//! the host, timers and scans.

use skopeo_types::{AgentMessage, HostMessage, LookupStatus};
use tracing::{debug, warn};

use crate::descriptor::describe;
use crate::platform::{Clock, Document, HostSink, StorageSource};
use crate::scan::{scan_media, scan_storage};
use crate::session::{InspectMode, Session};
use crate::tree::resolve_path;

pub const HIGHLIGHT_CLASS: &str = "skopeo-highlight";
pub const SELECTED_CLASS: &str = "skopeo-selected";
pub const TREE_HIGHLIGHT_CLASS: &str = "skopeo-highlight-tree";
/// Every class the agent puts on page elements.
pub const AGENT_CLASSES: [&str; 3] = [HIGHLIGHT_CLASS, SELECTED_CLASS, TREE_HIGHLIGHT_CLASS];

/// How long a programmatic selection stays highlighted.
pub const TRANSIENT_HIGHLIGHT_MS: i64 = 2_000;
/// Delay between the document load event and the first media scan.
pub const INITIAL_MEDIA_SCAN_DELAY_MS: i64 = 1_000;

pub const HIGHLIGHT_STYLESHEET: &str = "\
.skopeo-highlight {
  outline: 2px solid #3b82f6 !important;
  background-color: rgba(59, 130, 246, 0.1) !important;
  cursor: crosshair !important;
}
.skopeo-selected {
  outline: 2px solid #dc2626 !important;
}
.skopeo-highlight-tree {
  outline: 2px dashed #f59e0b !important;
  background-color: rgba(245, 158, 11, 0.1) !important;
}
";

/// What the embedder must do with a click event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickOutcome {
    /// The click selected an element; prevent the default action and stop
    /// propagation.
    Captured,
    /// Let the page handle the click.
    PassThrough,
}

pub struct Agent<D: Document, S, C, St> {
    document: D,
    sink: S,
    clock: C,
    storage: St,
    session: Session<D::Node>,
}

impl<D, S, C, St> Agent<D, S, C, St>
where
    D: Document,
    S: HostSink,
    C: Clock,
    St: StorageSource,
{
    /// Attaches an agent to a freshly loaded document and installs the
    /// highlight stylesheet.
    pub fn install(mut document: D, sink: S, clock: C, storage: St) -> Self {
        document.inject_style(HIGHLIGHT_STYLESHEET);
        debug!("inspection agent installed");
        Self {
            document,
            sink,
            clock,
            storage,
            session: Session::new(),
        }
    }

    pub fn document(&self) -> &D {
        &self.document
    }

    pub fn document_mut(&mut self) -> &mut D {
        &mut self.document
    }

    pub fn session(&self) -> &Session<D::Node> {
        &self.session
    }

    pub fn selection(&self) -> Option<&D::Node> {
        self.session.selection()
    }

    fn is_root_or_body(&self, node: &D::Node) -> bool {
        matches!(self.document.tag_name(node).as_str(), "html" | "body")
    }

    pub fn pointer_over(&mut self, node: &D::Node) {
        if !self.session.is_active() {
            return;
        }
        if let Some(previous) = self.session.replace_hovered(node.clone())
            && previous != *node
        {
            self.document.remove_class(&previous, HIGHLIGHT_CLASS);
        }
        if self.is_root_or_body(node) {
            return;
        }
        self.document.add_class(node, HIGHLIGHT_CLASS);
    }

    pub fn pointer_out(&mut self, node: &D::Node) {
        if self.document.has_class(node, HIGHLIGHT_CLASS) {
            self.document.remove_class(node, HIGHLIGHT_CLASS);
        }
    }

    pub fn click(&mut self, node: &D::Node) -> ClickOutcome {
        if !self.session.is_active() || self.is_root_or_body(node) {
            return ClickOutcome::PassThrough;
        }
        self.select(node.clone());
        ClickOutcome::Captured
    }

    /// Decodes and dispatches one raw host message. Anything that fails to
    /// decode or validate is logged and dropped.
    pub fn handle_raw(&mut self, raw: &str) {
        match HostMessage::from_json(raw) {
            Ok(message) => self.handle(message),
            Err(error) => warn!(%error, "dropping host message"),
        }
    }

    pub fn handle(&mut self, message: HostMessage) {
        debug!(kind = message.kind(), "host message");
        match message {
            HostMessage::ToggleInspect { value } => {
                self.session.set_mode(InspectMode::from_flag(value));
            }
            HostMessage::SelectParent => {
                let parent = self
                    .session
                    .selection()
                    .and_then(|current| self.document.parent_element(current));
                if let Some(parent) = parent {
                    self.select(parent);
                }
            }
            HostMessage::SelectChild { index } => {
                let child = self
                    .session
                    .selection()
                    .and_then(|current| self.document.children(current).into_iter().nth(index));
                if let Some(child) = child {
                    self.select(child);
                }
            }
            HostMessage::SelectXpath { xpath } => self.select_xpath(xpath),
            HostMessage::SelectDescendant { selector } => self.select_descendant(selector),
            HostMessage::HighlightDescendant { path } => {
                let Some(current) = self.session.selection().cloned() else {
                    return;
                };
                for marked in self.document.elements() {
                    if self.document.has_class(&marked, TREE_HIGHLIGHT_CLASS) {
                        self.document.remove_class(&marked, TREE_HIGHLIGHT_CLASS);
                    }
                }
                if let Some(target) = resolve_path(&self.document, &current, &path) {
                    self.document.add_class(&target, TREE_HIGHLIGHT_CLASS);
                }
            }
            HostMessage::SelectTreeNode { path } => {
                let target = self
                    .session
                    .selection()
                    .and_then(|current| resolve_path(&self.document, current, &path));
                if let Some(target) = target {
                    self.select(target.clone());
                    self.reveal(&target);
                }
            }
            HostMessage::ScanMedia => self.scan_media(),
            HostMessage::ScanStorage => self.scan_storage(),
        }
    }

    fn select_xpath(&mut self, xpath: String) {
        match self.document.evaluate_xpath(&xpath) {
            Ok(Some(node)) => {
                self.select(node.clone());
                self.reveal(&node);
            }
            Ok(None) => {
                warn!(%xpath, "no element for xpath");
                self.sink.post(AgentMessage::XpathStatus {
                    xpath,
                    status: LookupStatus::NotFound,
                    error: None,
                });
            }
            Err(error) => {
                warn!(%xpath, %error, "invalid xpath");
                self.sink.post(AgentMessage::XpathStatus {
                    xpath,
                    status: LookupStatus::Error,
                    error: Some(error.message().to_string()),
                });
            }
        }
    }

    fn select_descendant(&mut self, selector: String) {
        let Some(current) = self.session.selection().cloned() else {
            debug!(%selector, "descendant lookup without a selection");
            return;
        };
        match self.document.query_selector(&current, &selector) {
            Ok(Some(node)) => {
                self.select(node.clone());
                self.reveal(&node);
            }
            Ok(None) => {
                warn!(%selector, "descendant not found");
                self.sink.post(AgentMessage::SelectorStatus {
                    selector,
                    status: LookupStatus::NotFound,
                    error: None,
                });
            }
            Err(error) => {
                warn!(%selector, %error, "invalid selector");
                self.sink.post(AgentMessage::SelectorStatus {
                    selector,
                    status: LookupStatus::Error,
                    error: Some(error.message().to_string()),
                });
            }
        }
    }

    /// Makes `node` the current selection and reports it.
    fn select(&mut self, node: D::Node) {
        let descriptor = describe(&self.document, &node);
        debug!(selector = %descriptor.selector, "element selected");
        if let Some(previous) = self.session.selection()
            && *previous != node
        {
            self.document.remove_class(previous, SELECTED_CLASS);
        }
        self.document.add_class(&node, SELECTED_CLASS);
        self.session.select(node);
        self.sink.post(AgentMessage::ElementSelected(descriptor));
    }

    /// Scrolls to `node` and highlights it until [`TRANSIENT_HIGHLIGHT_MS`]
    /// have passed.
    fn reveal(&mut self, node: &D::Node) {
        self.document.scroll_into_view(node);
        self.document.add_class(node, HIGHLIGHT_CLASS);
        let deadline = self.clock.now_ms() + TRANSIENT_HIGHLIGHT_MS;
        self.session.schedule_transient(node.clone(), deadline);
    }

    pub fn scan_media(&mut self) {
        let assets = scan_media(&self.document);
        debug!(count = assets.len(), "media scan");
        self.sink.post(AgentMessage::MediaFound { assets });
    }

    pub fn scan_storage(&mut self) {
        let snapshot = scan_storage(&self.storage);
        debug!(
            cookies = snapshot.cookies.len(),
            local = snapshot.local_storage.len(),
            "storage scan"
        );
        self.sink.post(AgentMessage::StorageData(snapshot));
    }

    /// Document `load` hook: schedules the initial media scan.
    pub fn on_load(&mut self) {
        let at = self.clock.now_ms() + INITIAL_MEDIA_SCAN_DELAY_MS;
        self.session.schedule_media_scan(at);
    }

    /// Timer hook: clears expired transient highlights and runs a due
    /// initial media scan.
    pub fn tick(&mut self) {
        let now = self.clock.now_ms();
        for node in self.session.take_expired(now) {
            self.document.remove_class(&node, HIGHLIGHT_CLASS);
        }
        if self.session.take_due_media_scan(now) {
            self.scan_media();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{MemoryDocument, NodeId};
    use crate::platform::{ManualClock, MemorySink, MemoryStorage};
    use skopeo_types::{ElementDescriptor, FeedLimits, InspectorFeed, LookupTarget};

    type TestAgent = Agent<MemoryDocument, MemorySink, ManualClock, MemoryStorage>;

    struct Fixture {
        agent: TestAgent,
        sink: MemorySink,
        clock: ManualClock,
        list: NodeId,
        items: Vec<NodeId>,
    }

    fn fixture() -> Fixture {
        let mut doc = MemoryDocument::new().with_base_url("https://shop.test/");
        let body = doc.body();
        let list = doc.append_element(body, "ul", &[("class", "products")]);
        let items = (0..3)
            .map(|i| {
                let li = doc.append_element(list, "li", &[("data-i", &i.to_string())]);
                let link = doc.append_element(li, "a", &[("href", &format!("/p/{i}"))]);
                doc.append_text(link, &format!("Product {i}"));
                li
            })
            .collect();
        doc.append_element(body, "img", &[("src", "/logo.svg")]);

        let sink = MemorySink::new();
        let clock = ManualClock::starting_at(50_000);
        let storage = MemoryStorage {
            cookies: "sid=1".into(),
            ..MemoryStorage::default()
        };
        let agent = Agent::install(doc, sink.clone(), clock.clone(), storage);
        Fixture {
            agent,
            sink,
            clock,
            list,
            items,
        }
    }

    fn selected(messages: &[AgentMessage]) -> Vec<&ElementDescriptor> {
        messages
            .iter()
            .filter_map(|message| match message {
                AgentMessage::ElementSelected(descriptor) => Some(descriptor),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn install_injects_highlight_styles() {
        let f = fixture();
        assert_eq!(f.agent.document().injected_styles(), [HIGHLIGHT_STYLESHEET]);
        for class in [HIGHLIGHT_CLASS, SELECTED_CLASS, TREE_HIGHLIGHT_CLASS] {
            assert!(HIGHLIGHT_STYLESHEET.contains(&format!(".{class} {{")), "{class}");
        }
        assert!(f.sink.is_empty());
    }

    #[test]
    fn hover_moves_the_outline_and_skips_body() {
        let mut f = fixture();
        let (a, b) = (f.items[0], f.items[1]);
        f.agent.pointer_over(&a);
        f.agent.pointer_over(&b);
        let doc = f.agent.document();
        assert!(!doc.has_class(&a, HIGHLIGHT_CLASS));
        assert!(doc.has_class(&b, HIGHLIGHT_CLASS));

        let body = f.agent.document().body();
        f.agent.pointer_over(&body);
        assert!(!f.agent.document().has_class(&b, HIGHLIGHT_CLASS));
        assert!(!f.agent.document().has_class(&body, HIGHLIGHT_CLASS));

        f.agent.pointer_over(&a);
        f.agent.pointer_out(&a);
        assert!(!f.agent.document().has_class(&a, HIGHLIGHT_CLASS));
    }

    #[test]
    fn clicks_select_unless_inactive_or_structural() {
        let mut f = fixture();
        assert_eq!(f.agent.click(&f.items[1]), ClickOutcome::Captured);
        let body = f.agent.document().body();
        assert_eq!(f.agent.click(&body), ClickOutcome::PassThrough);

        f.agent.handle(HostMessage::ToggleInspect { value: false });
        assert_eq!(f.agent.click(&f.items[0]), ClickOutcome::PassThrough);
        f.agent.pointer_over(&f.items[0]);
        assert!(!f.agent.document().has_class(&f.items[0], HIGHLIGHT_CLASS));

        let messages = f.sink.take();
        let selections = selected(&messages);
        assert_eq!(selections.len(), 1);
        assert_eq!(selections[0].selector, "html > body > ul > li:nth-of-type(2)");
        assert_eq!(f.agent.selection(), Some(&f.items[1]));
    }

    #[test]
    fn only_the_current_selection_is_marked() {
        let mut f = fixture();
        f.agent.pointer_over(&f.items[0]);
        f.agent.click(&f.items[0]);
        assert!(f.agent.document().has_class(&f.items[0], SELECTED_CLASS));

        f.agent.pointer_over(&f.items[1]);
        f.agent.click(&f.items[1]);
        f.agent.click(&f.items[1]);
        let doc = f.agent.document();
        assert!(!doc.has_class(&f.items[0], SELECTED_CLASS));
        assert!(doc.has_class(&f.items[1], SELECTED_CLASS));

        f.agent.handle(HostMessage::SelectParent);
        assert!(!f.agent.document().has_class(&f.items[1], SELECTED_CLASS));
        assert!(f.agent.document().has_class(&f.list, SELECTED_CLASS));

        let messages = f.sink.take();
        let selections = selected(&messages);
        assert_eq!(selections.len(), 4);
        for descriptor in &selections[..3] {
            assert_eq!(descriptor.class_name, "");
            assert!(!descriptor.selector.contains("skopeo"), "{}", descriptor.selector);
        }
        assert!(selections[3].children.iter().all(|child| child.class_name.is_empty()));
    }

    #[test]
    fn parent_and_child_navigation_tolerate_missing_context() {
        let mut f = fixture();
        f.agent.handle(HostMessage::SelectParent);
        f.agent.handle(HostMessage::SelectChild { index: 0 });
        assert!(f.sink.is_empty(), "no selection yet");

        f.agent.click(&f.items[0]);
        f.agent.handle(HostMessage::SelectParent);
        assert_eq!(f.agent.selection(), Some(&f.list));
        f.agent.handle(HostMessage::SelectChild { index: 2 });
        assert_eq!(f.agent.selection(), Some(&f.items[2]));
        f.agent.handle(HostMessage::SelectChild { index: 9 });
        assert_eq!(f.agent.selection(), Some(&f.items[2]));

        let html = f.agent.document().html();
        assert_eq!(f.agent.click(&html), ClickOutcome::PassThrough);
        f.agent.handle(HostMessage::SelectParent);
        assert_eq!(f.agent.selection(), Some(&f.list));
        assert_eq!(selected(&f.sink.take()).len(), 4);
    }

    #[test]
    fn xpath_lookup_selects_reveals_and_expires() {
        let mut f = fixture();
        f.agent.handle(HostMessage::SelectXpath {
            xpath: "//li[@data-i='1']/a".into(),
        });
        let link = f.agent.selection().copied().expect("selected");
        assert_eq!(f.agent.document().scrolled(), [link]);
        assert!(f.agent.document().has_class(&link, HIGHLIGHT_CLASS));

        f.clock.advance(TRANSIENT_HIGHLIGHT_MS - 1);
        f.agent.tick();
        assert!(f.agent.document().has_class(&link, HIGHLIGHT_CLASS));
        f.clock.advance(1);
        f.agent.tick();
        assert!(!f.agent.document().has_class(&link, HIGHLIGHT_CLASS));

        let messages = f.sink.take();
        assert_eq!(selected(&messages)[0].inner_text, "Product 1");
    }

    #[test]
    fn xpath_without_match_reports_not_found() {
        let mut f = fixture();
        f.agent.handle(HostMessage::SelectXpath {
            xpath: "//table".into(),
        });
        f.agent.handle(HostMessage::SelectXpath {
            xpath: "//li[".into(),
        });
        let messages = f.sink.take();
        assert_eq!(
            messages[0],
            AgentMessage::XpathStatus {
                xpath: "//table".into(),
                status: LookupStatus::NotFound,
                error: None,
            }
        );
        let AgentMessage::XpathStatus { status, error, .. } = &messages[1] else {
            panic!("expected xpath-status");
        };
        assert_eq!(*status, LookupStatus::Error);
        assert!(error.as_deref().is_some_and(|e| e.contains("//li[")));
        assert!(f.agent.selection().is_none());
    }

    #[test]
    fn descendant_failures_reply_with_selector_status() {
        let mut f = fixture();
        f.agent.handle(HostMessage::SelectDescendant {
            selector: "a".into(),
        });
        assert!(f.sink.is_empty(), "ignored without a selection");

        f.agent.click(&f.list);
        f.sink.take();
        f.agent.handle(HostMessage::SelectDescendant {
            selector: "table".into(),
        });
        f.agent.handle(HostMessage::SelectDescendant {
            selector: "li >".into(),
        });

        let mut feed = InspectorFeed::new(FeedLimits::default());
        let messages = f.sink.take();
        assert_eq!(
            messages.iter().map(AgentMessage::kind).collect::<Vec<_>>(),
            ["selector-status", "selector-status"]
        );
        assert!(matches!(
            &messages[0],
            AgentMessage::SelectorStatus { status: LookupStatus::NotFound, error: None, .. }
        ));
        for message in messages {
            feed.apply(message);
        }
        let report = feed.last_lookup().expect("lookup failure tracked");
        assert_eq!(report.target, LookupTarget::Selector("li >".into()));
        assert_eq!(report.status, LookupStatus::Error);
        assert_eq!(f.agent.selection(), Some(&f.list));
    }

    #[test]
    fn descendant_match_selects_within_the_selection() {
        let mut f = fixture();
        f.agent.click(&f.items[2]);
        f.agent.handle(HostMessage::SelectDescendant {
            selector: "a[href$='2']".into(),
        });
        let messages = f.sink.take();
        let selections = selected(&messages);
        assert_eq!(selections.len(), 2);
        assert_eq!(selections[1].tag_name, "a");
        assert_eq!(f.agent.document().scrolled().len(), 1);
    }

    #[test]
    fn tree_paths_select_and_highlight() {
        let mut f = fixture();
        f.agent.click(&f.list);
        f.agent.handle(HostMessage::HighlightDescendant { path: vec![0, 0] });
        f.agent.handle(HostMessage::HighlightDescendant { path: vec![1] });
        let marked: Vec<NodeId> = f
            .agent
            .document()
            .elements()
            .into_iter()
            .filter(|node| f.agent.document().has_class(node, TREE_HIGHLIGHT_CLASS))
            .collect();
        assert_eq!(marked, [f.items[1]]);

        f.agent.handle(HostMessage::HighlightDescendant { path: vec![7] });
        assert!(!f.agent.document().has_class(&f.items[1], TREE_HIGHLIGHT_CLASS));

        f.agent.handle(HostMessage::SelectTreeNode { path: vec![2] });
        assert_eq!(f.agent.selection(), Some(&f.items[2]));
        f.agent.handle(HostMessage::SelectTreeNode { path: vec![5, 5] });
        assert_eq!(f.agent.selection(), Some(&f.items[2]));
    }

    #[test]
    fn raw_messages_are_validated_and_dropped_on_error() {
        let mut f = fixture();
        f.agent.handle_raw(r#"{"type":"scan-storage"}"#);
        f.agent.handle_raw(r#"{"type":"select-xpath","xpath":""}"#);
        f.agent.handle_raw(r#"{"type":"self-destruct"}"#);
        f.agent.handle_raw("{");
        let messages = f.sink.take();
        assert_eq!(messages.len(), 1);
        let AgentMessage::StorageData(snapshot) = &messages[0] else {
            panic!("expected storage-data");
        };
        assert_eq!(snapshot.cookies.len(), 1);
    }

    #[test]
    fn load_schedules_one_initial_media_scan() {
        let mut f = fixture();
        f.agent.on_load();
        f.agent.tick();
        assert!(f.sink.is_empty());
        f.clock.advance(INITIAL_MEDIA_SCAN_DELAY_MS);
        f.agent.tick();
        f.agent.tick();
        let messages = f.sink.take();
        assert_eq!(messages.len(), 1);
        let AgentMessage::MediaFound { assets } = &messages[0] else {
            panic!("expected media-found");
        };
        assert_eq!(assets[0].url, "https://shop.test/logo.svg");
    }
}

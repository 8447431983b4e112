//! Host-side view of one inspection session.
//!
//! The host never reads agent state directly; it folds the agent's message
//! stream into an [`InspectorFeed`]. Network and console history live in
//! bounded ring buffers so a long session cannot grow without limit.

use std::collections::VecDeque;

use tracing::debug;

use crate::model::{
    ConsoleRecord, ElementDescriptor, MediaAsset, NetworkRecord, StorageSnapshot,
};
use crate::protocol::{AgentMessage, LookupStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedLimits {
    pub network: usize,
    pub console: usize,
}

impl Default for FeedLimits {
    fn default() -> Self {
        Self {
            network: 1000,
            console: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupTarget {
    XPath(String),
    Selector(String),
}

/// Most recent failed lookup reported by the agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupReport {
    pub target: LookupTarget,
    pub status: LookupStatus,
    pub error: Option<String>,
}

#[derive(Debug, Default)]
pub struct InspectorFeed {
    limits: FeedLimits,
    network: VecDeque<NetworkRecord>,
    console: VecDeque<ConsoleRecord>,
    storage: Option<StorageSnapshot>,
    media: Vec<MediaAsset>,
    selected: Option<ElementDescriptor>,
    last_lookup: Option<LookupReport>,
    evicted_network: u64,
    evicted_console: u64,
}

impl InspectorFeed {
    pub fn new(limits: FeedLimits) -> Self {
        Self {
            limits,
            ..Self::default()
        }
    }

    pub fn apply(&mut self, message: AgentMessage) {
        match message {
            AgentMessage::ElementSelected(descriptor) => {
                self.last_lookup = None;
                self.selected = Some(descriptor);
            }
            AgentMessage::ConsoleLog(record) => {
                if self.limits.console == 0 {
                    return;
                }
                if self.console.len() == self.limits.console {
                    self.console.pop_front();
                    self.evicted_console += 1;
                }
                self.console.push_back(record);
            }
            AgentMessage::NetworkRequest(record) => {
                if self.limits.network == 0 {
                    return;
                }
                if self.network.len() == self.limits.network {
                    self.network.pop_front();
                    self.evicted_network += 1;
                }
                self.network.push_back(record);
            }
            AgentMessage::NetworkResponse(response) => {
                match self.pending_request_mut(response.id.as_str()) {
                    Some(record) => record.apply_response(response),
                    None => debug!(id = %response.id, "response for unknown or completed request"),
                }
            }
            AgentMessage::NetworkError(failure) => {
                match self.pending_request_mut(failure.id.as_str()) {
                    Some(record) => record.apply_failure(failure),
                    None => debug!(id = %failure.id, "error for unknown or completed request"),
                }
            }
            AgentMessage::MediaFound { assets } => self.media = assets,
            AgentMessage::StorageData(snapshot) => self.storage = Some(snapshot),
            AgentMessage::XpathStatus {
                xpath,
                status,
                error,
            } => {
                self.last_lookup = Some(LookupReport {
                    target: LookupTarget::XPath(xpath),
                    status,
                    error,
                });
            }
            AgentMessage::SelectorStatus {
                selector,
                status,
                error,
            } => {
                self.last_lookup = Some(LookupReport {
                    target: LookupTarget::Selector(selector),
                    status,
                    error,
                });
            }
        }
    }

    fn pending_request_mut(&mut self, id: &str) -> Option<&mut NetworkRecord> {
        self.network
            .iter_mut()
            .rev()
            .find(|record| record.id.as_str() == id)
            .filter(|record| !record.is_complete())
    }

    pub fn network(&self) -> impl ExactSizeIterator<Item = &NetworkRecord> {
        self.network.iter()
    }

    pub fn request(&self, id: &str) -> Option<&NetworkRecord> {
        self.network.iter().find(|record| record.id.as_str() == id)
    }

    pub fn console(&self) -> impl ExactSizeIterator<Item = &ConsoleRecord> {
        self.console.iter()
    }

    pub fn storage(&self) -> Option<&StorageSnapshot> {
        self.storage.as_ref()
    }

    pub fn media(&self) -> &[MediaAsset] {
        &self.media
    }

    pub fn selected(&self) -> Option<&ElementDescriptor> {
        self.selected.as_ref()
    }

    pub fn last_lookup(&self) -> Option<&LookupReport> {
        self.last_lookup.as_ref()
    }

    /// Number of records dropped from the front of each ring buffer so far.
    pub fn evicted(&self) -> (u64, u64) {
        (self.evicted_network, self.evicted_console)
    }

    pub fn clear_network(&mut self) {
        self.network.clear();
    }

    pub fn clear_console(&mut self) {
        self.console.clear();
    }

    /// Forgets everything; used when the rendering surface navigates.
    pub fn reset(&mut self) {
        *self = Self::new(self.limits);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        ConsoleLevel, Headers, NetworkCategory, NetworkFailure, NetworkResponse, RequestId,
    };

    fn request(id: &str, timestamp: i64) -> AgentMessage {
        AgentMessage::NetworkRequest(NetworkRecord::pending(
            RequestId::new(id),
            "GET",
            format!("https://example.com/{id}"),
            NetworkCategory::Fetch,
            timestamp,
        ))
    }

    fn response(id: &str, status: u16) -> AgentMessage {
        AgentMessage::NetworkResponse(NetworkResponse {
            id: RequestId::new(id),
            status,
            timestamp: 20,
            duration: 10.0,
            response_headers: Headers::new(),
            response_body: Some("ok".into()),
        })
    }

    #[test]
    fn response_merges_into_matching_request_once() {
        let mut feed = InspectorFeed::default();
        feed.apply(request("a", 10));
        feed.apply(request("b", 11));
        feed.apply(response("a", 200));
        feed.apply(response("a", 500));

        let a = feed.request("a").expect("request a recorded");
        assert_eq!(a.status, Some(200));
        assert_eq!(a.duration, Some(10.0));
        assert_eq!(a.response_body.as_deref(), Some("ok"));
        assert!(!feed.request("b").expect("request b recorded").is_complete());
        assert_eq!(feed.network().len(), 2);
    }

    #[test]
    fn error_after_response_is_ignored() {
        let mut feed = InspectorFeed::default();
        feed.apply(request("a", 10));
        feed.apply(response("a", 204));
        feed.apply(AgentMessage::NetworkError(NetworkFailure {
            id: RequestId::new("a"),
            error: "late".into(),
            timestamp: 30,
        }));
        let a = feed.request("a").expect("request a recorded");
        assert_eq!(a.status, Some(204));
        assert_eq!(a.error, None);
    }

    #[test]
    fn ring_buffers_evict_oldest_entries() {
        let mut feed = InspectorFeed::new(FeedLimits {
            network: 2,
            console: 1,
        });
        for (index, id) in ["a", "b", "c"].into_iter().enumerate() {
            feed.apply(request(id, index as i64));
            feed.apply(AgentMessage::ConsoleLog(ConsoleRecord {
                level: ConsoleLevel::Log,
                args: vec![id.into()],
                timestamp: index as i64,
            }));
        }
        let ids: Vec<_> = feed.network().map(|r| r.id.as_str().to_string()).collect();
        assert_eq!(ids, ["b", "c"]);
        assert_eq!(feed.console().next().map(|r| r.args.clone()), Some(vec!["c".to_string()]));
        assert_eq!(feed.evicted(), (1, 2));
    }

    #[test]
    fn snapshots_replace_and_clears_empty() {
        let mut feed = InspectorFeed::default();
        feed.apply(AgentMessage::MediaFound {
            assets: vec![MediaAsset {
                url: "https://example.com/a.png".into(),
                kind: crate::MediaKind::Image,
                dimensions: None,
            }],
        });
        feed.apply(AgentMessage::MediaFound { assets: Vec::new() });
        assert!(feed.media().is_empty());

        feed.apply(request("a", 1));
        feed.clear_network();
        assert_eq!(feed.network().len(), 0);

        feed.apply(AgentMessage::XpathStatus {
            xpath: "//x".into(),
            status: LookupStatus::NotFound,
            error: None,
        });
        assert_eq!(
            feed.last_lookup().map(|r| r.target.clone()),
            Some(LookupTarget::XPath("//x".into()))
        );
        feed.reset();
        assert!(feed.last_lookup().is_none());
    }
}

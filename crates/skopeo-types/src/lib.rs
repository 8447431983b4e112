//! Shared vocabulary for skopeo remote page inspection.
//!
//! The instrumentation agent runs inside a sandboxed copy of a third-party
//! page and talks to a trusted host surface through fire-and-forget messages.
//! This crate holds everything both sides need to agree on:
//!
//! - the data model ([`ElementDescriptor`], [`DomTreeNode`], [`NetworkRecord`],
//!   [`ConsoleRecord`], [`StorageSnapshot`], [`MediaAsset`]),
//! - the wire envelopes ([`AgentMessage`], [`HostMessage`]) as closed tagged
//!   unions, validated on receipt,
//! - the host-side [`InspectorFeed`], which folds agent messages into bounded
//!   history,
//! - the [`ApiError`] envelope returned by the proxy service.

use facet::Facet;

pub mod feed;
pub mod model;
pub mod protocol;

pub use feed::{FeedLimits, InspectorFeed, LookupReport, LookupTarget};
pub use model::{
    ChildSummary, ConsoleLevel, ConsoleRecord, Dimensions, DomTreeNode, ElementDescriptor,
    Headers, MediaAsset, MediaKind, NetworkCategory, NetworkFailure, NetworkRecord,
    NetworkResponse, Rect, RequestId, StorageEntry, StorageSnapshot,
};
pub use protocol::{AgentMessage, HostMessage, LookupStatus, ProtocolError};

/// Maximum number of characters of inner markup carried in a descriptor.
pub const MAX_INNER_HTML_CHARS: usize = 500;

/// Maximum depth (below the capture root) of a [`DomTreeNode`] snapshot.
pub const MAX_TREE_DEPTH: usize = 10;

/// Maximum number of characters of a captured request or response body.
pub const MAX_BODY_CHARS: usize = 100_000;

/// Uniform error envelope returned by the HTTP service.
#[derive(Facet, Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub error: String,
}

/// Truncates `value` to at most `max_chars` characters, never splitting a
/// UTF-8 sequence.
pub fn truncate_chars(value: &str, max_chars: usize) -> String {
    match value.char_indices().nth(max_chars) {
        Some((byte_index, _)) => value[..byte_index].to_string(),
        None => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_chars_keeps_short_values() {
        assert_eq!(truncate_chars("abc", 5), "abc");
        assert_eq!(truncate_chars("abc", 3), "abc");
    }

    #[test]
    fn truncate_chars_respects_multibyte_boundaries() {
        assert_eq!(truncate_chars("héllo wörld", 7), "héllo w");
        assert_eq!(truncate_chars("日本語テキスト", 3), "日本語");
    }
}

//! Agent↔host message envelopes.
//!
//! Both directions use `{ "type": "<kebab-case>", ...payload }`. Delivery is
//! fire-and-forget and order-preserving per sender; nothing here is
//! acknowledged. Receivers decode through [`HostMessage::from_json`] /
//! [`AgentMessage::from_json`] and drop whatever fails validation.

use std::error::Error;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::MAX_TREE_DEPTH;
use crate::model::{
    ConsoleRecord, ElementDescriptor, MediaAsset, NetworkFailure, NetworkRecord,
    NetworkResponse, StorageSnapshot,
};

/// Outcome of a failed element lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LookupStatus {
    NotFound,
    Error,
}

/// Messages emitted by the agent inside the rendering surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum AgentMessage {
    ElementSelected(ElementDescriptor),
    ConsoleLog(ConsoleRecord),
    NetworkRequest(NetworkRecord),
    NetworkResponse(NetworkResponse),
    NetworkError(NetworkFailure),
    MediaFound {
        assets: Vec<MediaAsset>,
    },
    StorageData(StorageSnapshot),
    XpathStatus {
        xpath: String,
        status: LookupStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    SelectorStatus {
        selector: String,
        status: LookupStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl AgentMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ElementSelected(_) => "element-selected",
            Self::ConsoleLog(_) => "console-log",
            Self::NetworkRequest(_) => "network-request",
            Self::NetworkResponse(_) => "network-response",
            Self::NetworkError(_) => "network-error",
            Self::MediaFound { .. } => "media-found",
            Self::StorageData(_) => "storage-data",
            Self::XpathStatus { .. } => "xpath-status",
            Self::SelectorStatus { .. } => "selector-status",
        }
    }

    pub fn to_json(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Encode(e.to_string()))
    }

    pub fn from_json(raw: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(raw).map_err(|e| ProtocolError::Malformed(e.to_string()))
    }
}

/// Remote-control commands sent by the host to the agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum HostMessage {
    ToggleInspect { value: bool },
    SelectParent,
    SelectChild { index: usize },
    SelectXpath { xpath: String },
    SelectDescendant { selector: String },
    SelectTreeNode { path: Vec<usize> },
    HighlightDescendant { path: Vec<usize> },
    ScanMedia,
    ScanStorage,
}

impl HostMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ToggleInspect { .. } => "toggle-inspect",
            Self::SelectParent => "select-parent",
            Self::SelectChild { .. } => "select-child",
            Self::SelectXpath { .. } => "select-xpath",
            Self::SelectDescendant { .. } => "select-descendant",
            Self::SelectTreeNode { .. } => "select-tree-node",
            Self::HighlightDescendant { .. } => "highlight-descendant",
            Self::ScanMedia => "scan-media",
            Self::ScanStorage => "scan-storage",
        }
    }

    /// Decodes and validates one inbound command.
    pub fn from_json(raw: &str) -> Result<Self, ProtocolError> {
        let message: Self =
            serde_json::from_str(raw).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
        message.validate()?;
        Ok(message)
    }

    pub fn to_json(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Encode(e.to_string()))
    }

    /// Checks payload constraints that the shape alone does not express.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        match self {
            Self::SelectXpath { xpath } if xpath.trim().is_empty() => {
                Err(ProtocolError::invalid(self.kind(), "xpath must be non-empty"))
            }
            Self::SelectDescendant { selector } if selector.trim().is_empty() => Err(
                ProtocolError::invalid(self.kind(), "selector must be non-empty"),
            ),
            Self::SelectTreeNode { path } | Self::HighlightDescendant { path }
                if path.len() > MAX_TREE_DEPTH =>
            {
                Err(ProtocolError::invalid(
                    self.kind(),
                    format!(
                        "path has {} segments, at most {MAX_TREE_DEPTH} are addressable",
                        path.len()
                    ),
                ))
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Not JSON, unknown `type`, or a payload of the wrong shape.
    Malformed(String),
    /// Well-formed, but violates a payload constraint.
    Invalid {
        kind: &'static str,
        reason: String,
    },
    Encode(String),
}

impl ProtocolError {
    fn invalid(kind: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            kind,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed(reason) => write!(f, "malformed message: {reason}"),
            Self::Invalid { kind, reason } => write!(f, "invalid {kind} message: {reason}"),
            Self::Encode(reason) => write!(f, "failed to encode message: {reason}"),
        }
    }
}

impl Error for ProtocolError {}

//! Instrumentation agent core.
//!
//! The agent lives inside the inspected document. It turns pointer events
//! and host commands into element selections, mirrors console and network
//! activity, and scans media and storage, reporting everything as
//! [`skopeo_types::AgentMessage`]s through a [`HostSink`].
//!
//! All environment access goes through the traits in [`platform`]. A browser
//! binding implements them over the live page; [`dom::MemoryDocument`] and
//! the in-memory sinks, clocks and storage cover tests and headless use.

pub mod agent;
pub mod console;
pub mod descriptor;
pub mod dom;
pub mod network;
pub mod platform;
pub mod scan;
pub mod selector;
pub mod session;
pub mod tree;

pub use agent::{Agent, ClickOutcome};
pub use console::{ConsoleBackend, InterceptingConsole, TracingConsole};
pub use network::{
    HttpRequest, HttpResponse, InterceptingTransport, RequestBody, RequestIds, ResourceEntry,
    ResourceObserver, Transport, TransportError,
};
pub use platform::{
    Clock, Document, HostSink, JsonSink, LookupError, ManualClock, MemorySink, MemoryStorage,
    StorageError, StorageSource, SystemClock,
};
pub use session::{InspectMode, Session};

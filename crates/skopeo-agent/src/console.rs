//! Console interception.

use serde_json::Value;
use skopeo_types::{AgentMessage, ConsoleLevel, ConsoleRecord};

use crate::platform::{Clock, HostSink};

/// The page's original console.
pub trait ConsoleBackend {
    fn write(&self, level: ConsoleLevel, args: &[Value]);
}

impl<T: ConsoleBackend + ?Sized> ConsoleBackend for &T {
    fn write(&self, level: ConsoleLevel, args: &[Value]) {
        (**self).write(level, args)
    }
}

/// Backend that forwards console output to `tracing`, for headless runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingConsole;

impl ConsoleBackend for TracingConsole {
    fn write(&self, level: ConsoleLevel, args: &[Value]) {
        let line = args.iter().map(stringify_arg).collect::<Vec<_>>().join(" ");
        match level {
            ConsoleLevel::Error => tracing::error!(target: "page_console", "{line}"),
            ConsoleLevel::Warn => tracing::warn!(target: "page_console", "{line}"),
            ConsoleLevel::Info => tracing::info!(target: "page_console", "{line}"),
            ConsoleLevel::Log => tracing::debug!(target: "page_console", "{line}"),
        }
    }
}

/// Stringifies one console argument: strings verbatim, anything else as JSON.
pub fn stringify_arg(arg: &Value) -> String {
    match arg {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Wraps a [`ConsoleBackend`]: every call reaches the original first, then
/// is mirrored to the host as `console-log`.
pub struct InterceptingConsole<B, S, C> {
    backend: B,
    sink: S,
    clock: C,
}

impl<B: ConsoleBackend, S: HostSink, C: Clock> InterceptingConsole<B, S, C> {
    pub fn new(backend: B, sink: S, clock: C) -> Self {
        Self {
            backend,
            sink,
            clock,
        }
    }

    pub fn emit(&self, level: ConsoleLevel, args: &[Value]) {
        self.backend.write(level, args);
        self.sink.post(AgentMessage::ConsoleLog(ConsoleRecord {
            level,
            args: args.iter().map(stringify_arg).collect(),
            timestamp: self.clock.now_ms(),
        }));
    }

    pub fn log(&self, args: &[Value]) {
        self.emit(ConsoleLevel::Log, args)
    }

    pub fn info(&self, args: &[Value]) {
        self.emit(ConsoleLevel::Info, args)
    }

    pub fn warn(&self, args: &[Value]) {
        self.emit(ConsoleLevel::Warn, args)
    }

    pub fn error(&self, args: &[Value]) {
        self.emit(ConsoleLevel::Error, args)
    }

    /// Restores the original backend.
    pub fn into_inner(self) -> B {
        self.backend
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{ManualClock, MemorySink};
    use parking_lot::Mutex;
    use serde_json::json;

    #[derive(Default)]
    struct RecordingBackend {
        calls: Mutex<Vec<(ConsoleLevel, usize)>>,
    }

    impl ConsoleBackend for RecordingBackend {
        fn write(&self, level: ConsoleLevel, args: &[Value]) {
            self.calls.lock().push((level, args.len()));
        }
    }

    #[test]
    fn original_console_is_called_and_mirrored() {
        let backend = RecordingBackend::default();
        let sink = MemorySink::new();
        let console = InterceptingConsole::new(&backend, sink.clone(), ManualClock::starting_at(77));

        console.warn(&[json!("low disk"), json!({"free": 3}), json!(null), json!(1.5)]);
        console.log(&[]);

        assert_eq!(
            *backend.calls.lock(),
            [(ConsoleLevel::Warn, 4), (ConsoleLevel::Log, 0)]
        );
        let messages = sink.take();
        let AgentMessage::ConsoleLog(record) = &messages[0] else {
            panic!("expected console-log, got {}", messages[0].kind());
        };
        assert_eq!(record.level, ConsoleLevel::Warn);
        assert_eq!(record.args, ["low disk", r#"{"free":3}"#, "null", "1.5"]);
        assert_eq!(record.timestamp, 77);
        assert_eq!(messages.len(), 2);
    }

    #[test]
    fn into_inner_returns_the_original() {
        let console = InterceptingConsole::new(TracingConsole, MemorySink::new(), ManualClock::default());
        console.info(&[json!("hello")]);
        let _original: TracingConsole = console.into_inner();
    }
}

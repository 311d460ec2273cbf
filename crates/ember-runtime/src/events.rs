//! Embedder-facing diagnostic events.
//!
//! A plain callback sink, separate from `tracing`, so hosts without a
//! subscriber can still observe what a scenario is doing.

use ember_ast::Span;
use serde::Serialize;

/// Event class. `Watchdog` flags capability denials and budget trips for
/// alerting separately from ordinary bugs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Info,
    Error,
    Watchdog,
}

/// One structured event emitted to the diagnostics sink.
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticEvent {
    pub kind: EventKind,
    pub message: String,
    /// Chunk the triggering instruction lives in, when known.
    pub chunk: Option<u16>,
    /// Source location of the triggering instruction, when known.
    pub span: Option<Span>,
    /// Frame number of the entry call this happened in (0 during init).
    pub tick: u64,
    /// Native involved, for native-related events.
    pub native: Option<String>,
}

impl DiagnosticEvent {
    pub fn info(message: impl Into<String>) -> Self {
        Self::new(EventKind::Info, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(EventKind::Error, message)
    }

    pub fn watchdog(message: impl Into<String>) -> Self {
        Self::new(EventKind::Watchdog, message)
    }

    fn new(kind: EventKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            chunk: None,
            span: None,
            tick: 0,
            native: None,
        }
    }

    pub fn at(mut self, chunk: u16, span: Span) -> Self {
        self.chunk = Some(chunk);
        self.span = Some(span);
        self
    }

    pub fn during(mut self, tick: u64) -> Self {
        self.tick = tick;
        self
    }

    pub fn for_native(mut self, native: impl Into<String>) -> Self {
        self.native = Some(native.into());
        self
    }
}

/// Diagnostics callback. Defaults to a no-op.
pub type LogSink = Box<dyn FnMut(&DiagnosticEvent)>;

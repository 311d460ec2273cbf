//! Compile-time diagnostics.
//!
//! Diagnostics are accumulated, never thrown: every stage keeps going after
//! reporting one so a single compile surfaces as many problems as possible.
//! A program compiled with any `Severity::Error` diagnostic must never be
//! executed.

use crate::span::Span;
use serde::{Deserialize, Serialize};

/// Severity level for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Error,
    Warning,
}

/// A structured, non-fatal compile-time report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Human-readable error message.
    pub message: String,
    /// Source location the report points at.
    pub span: Span,
    /// Severity of the diagnostic.
    pub severity: Severity,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
            severity: Severity::Error,
        }
    }

    pub fn warning(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
            severity: Severity::Warning,
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at {}", self.message, self.span)
    }
}

/// Check whether a diagnostic list forbids execution.
pub fn has_errors(diagnostics: &[Diagnostic]) -> bool {
    diagnostics.iter().any(|d| d.severity == Severity::Error)
}

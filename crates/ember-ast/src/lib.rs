//! Foundation types for the Ember scripting engine.
//!
//! - `span` — source location tracking threaded through every stage
//! - `diagnostic` — accumulated compile-time reports
//! - `ast` — parsed node types

pub mod ast;
pub mod diagnostic;
pub mod span;

pub use ast::*;
pub use diagnostic::{has_errors, Diagnostic, Severity};
pub use span::{LineIndex, Position, Span};

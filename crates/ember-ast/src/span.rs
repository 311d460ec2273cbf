//! Source location tracking for error reporting and debugging.
//!
//! Every stage of the pipeline (lexer, parser, compiler, VM) threads spans
//! through so failures can always be attributed to a source location.
//!
//! # Design
//!
//! - `Position` — absolute byte index plus 1-based line/column
//! - `Span` — start/end positions, merged by taking the first start and last end
//! - `LineIndex` — converts byte offsets into positions for one source text

use serde::{Deserialize, Serialize};

/// A single point in a source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    /// Absolute byte offset into the source
    pub index: u32,
    /// 1-based line number
    pub line: u32,
    /// 1-based column (byte offset within the line)
    pub column: u32,
}

impl Position {
    /// The start of any source text.
    pub const fn origin() -> Self {
        Self {
            index: 0,
            line: 1,
            column: 1,
        }
    }
}

/// A contiguous region of source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    /// First position covered by this span
    pub start: Position,
    /// Position just past the last covered byte
    pub end: Position,
}

impl Span {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    /// A zero-length span at the start of a file.
    pub fn zero() -> Self {
        Self {
            start: Position::origin(),
            end: Position::origin(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.start.index == self.end.index
    }

    /// Merge two spans: the first span's start, the last span's end.
    pub fn merge(&self, last: &Span) -> Span {
        Span {
            start: self.start,
            end: last.end,
        }
    }
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.start.line, self.start.column)
    }
}

/// Byte-offset to line/column conversion for one source text.
///
/// Built once per compile; `\n`, `\r`, and `\r\n` each count as a single
/// line terminator.
#[derive(Debug, Clone)]
pub struct LineIndex {
    line_starts: Vec<u32>,
}

impl LineIndex {
    pub fn new(source: &str) -> Self {
        let bytes = source.as_bytes();
        let mut line_starts = vec![0u32];
        let mut i = 0;
        while i < bytes.len() {
            match bytes[i] {
                b'\n' => line_starts.push((i + 1) as u32),
                b'\r' => {
                    if bytes.get(i + 1) == Some(&b'\n') {
                        i += 1;
                    }
                    line_starts.push((i + 1) as u32);
                }
                _ => {}
            }
            i += 1;
        }
        Self { line_starts }
    }

    /// Get the position for a byte offset.
    pub fn position(&self, offset: u32) -> Position {
        let line_idx = match self.line_starts.binary_search(&offset) {
            Ok(idx) => idx,
            Err(idx) => idx - 1,
        };
        Position {
            index: offset,
            line: (line_idx + 1) as u32,
            column: offset - self.line_starts[line_idx] + 1,
        }
    }

    /// Get the span covering a byte range.
    pub fn span(&self, start: u32, end: u32) -> Span {
        Span {
            start: self.position(start),
            end: self.position(end),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_takes_first_start_last_end() {
        let index = LineIndex::new("let x = 1;\nlet y = 2;");
        let a = index.span(0, 3);
        let b = index.span(11, 14);
        let merged = a.merge(&b);
        assert_eq!(merged.start.index, 0);
        assert_eq!(merged.end.index, 14);
        assert_eq!(merged.end.line, 2);
    }

    #[test]
    fn test_line_index_lf() {
        let index = LineIndex::new("ab\ncd");
        assert_eq!(index.position(0), Position { index: 0, line: 1, column: 1 });
        assert_eq!(index.position(3), Position { index: 3, line: 2, column: 1 });
        assert_eq!(index.position(4), Position { index: 4, line: 2, column: 2 });
    }

    #[test]
    fn test_line_index_crlf_counts_one_line() {
        let index = LineIndex::new("ab\r\ncd\ref");
        assert_eq!(index.position(4).line, 2);
        assert_eq!(index.position(7).line, 3);
        assert_eq!(index.position(7).column, 1);
    }

    #[test]
    fn test_position_at_eof() {
        let index = LineIndex::new("ab");
        let pos = index.position(2);
        assert_eq!(pos.line, 1);
        assert_eq!(pos.column, 3);
    }
}

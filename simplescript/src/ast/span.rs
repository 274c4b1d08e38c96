//! Source location tracking

use serde::{Deserialize, Serialize};
use std::fmt;

/// A named piece of source text.
///
/// Lexing a text creates one `Source`; the parser, runtime errors and every
/// function defined from that text share it through an `Rc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    pub name: String,
    pub text: String,
}

impl Source {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
        }
    }

    /// The exact text covered by `span`.
    pub fn slice(&self, span: Span) -> &str {
        let end = span.end.index.min(self.text.len());
        let start = span.start.index.min(end);
        &self.text[start..end]
    }

    /// Line `line` (0-based) without its terminating newline.
    pub fn line(&self, line: usize) -> Option<&str> {
        self.text.split('\n').nth(line)
    }
}

/// A point in the source text.
///
/// `index` is a byte offset into the text, `line` and `column` are 0-based and
/// the column counts characters, not bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub index: usize,
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(index: usize, line: usize, column: usize) -> Self {
        Self {
            index,
            line,
            column,
        }
    }

    /// Step over `ch`, the character at this position.
    pub fn advance(self, ch: char) -> Position {
        if ch == '\n' {
            Position {
                index: self.index + ch.len_utf8(),
                line: self.line + 1,
                column: 0,
            }
        } else {
            Position {
                index: self.index + ch.len_utf8(),
                line: self.line,
                column: self.column + 1,
            }
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line + 1, self.column + 1)
    }
}

/// A span in the source code, end exclusive
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Position,
    pub end: Position,
}

impl Span {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    /// Zero-width span, used when something is missing at `pos`.
    pub fn empty_at(pos: Position) -> Self {
        Self { start: pos, end: pos }
    }

    pub fn merge(self, other: Span) -> Span {
        let start = if other.start.index < self.start.index {
            other.start
        } else {
            self.start
        };
        let end = if other.end.index > self.end.index {
            other.end
        } else {
            self.end
        };
        Span { start, end }
    }

    pub fn is_empty(&self) -> bool {
        self.start.index >= self.end.index
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start.index, self.end.index)
    }
}

impl From<Span> for std::ops::Range<usize> {
    fn from(span: Span) -> Self {
        span.start.index..span.end.index
    }
}

/// A value with source location
#[derive(Debug, Clone, Serialize)]
pub struct Spanned<T> {
    pub node: T,
    pub span: Span,
}

impl<T> Spanned<T> {
    pub fn new(node: T, span: Span) -> Self {
        Self { node, span }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn walk(text: &str) -> Position {
        text.chars().fold(Position::default(), Position::advance)
    }

    #[test]
    fn test_advance_same_line() {
        let pos = walk("abc");
        assert_eq!(pos, Position::new(3, 0, 3));
    }

    #[test]
    fn test_advance_newline_resets_column() {
        let pos = walk("ab\ncd");
        assert_eq!(pos, Position::new(5, 1, 2));
    }

    #[test]
    fn test_advance_counts_bytes_for_index() {
        let pos = walk("é1");
        assert_eq!(pos.index, 3);
        assert_eq!(pos.column, 2);
    }

    #[test]
    fn test_span_merge_non_overlapping() {
        let a = Span::new(Position::new(0, 0, 0), Position::new(5, 0, 5));
        let b = Span::new(Position::new(10, 0, 10), Position::new(15, 0, 15));
        let merged = a.merge(b);
        assert_eq!(merged.start.index, 0);
        assert_eq!(merged.end.index, 15);
        assert_eq!(b.merge(a), merged);
    }

    #[test]
    fn test_span_empty_at() {
        let span = Span::empty_at(Position::new(4, 1, 2));
        assert!(span.is_empty());
        let range: std::ops::Range<usize> = span.into();
        assert!(range.is_empty());
    }

    #[test]
    fn test_source_slice_and_line() {
        let source = Source::new("<test>", "VAR a = 1\nVAR b = 2");
        let start = walk("VAR a = 1\nVAR ");
        let end = start.advance('b');
        assert_eq!(source.slice(Span::new(start, end)), "b");
        assert_eq!(source.line(1), Some("VAR b = 2"));
        assert_eq!(source.line(2), None);
    }

    #[test]
    fn test_position_display_is_one_based() {
        assert_eq!(Position::new(12, 2, 4).to_string(), "3:5");
        let span = Span::new(Position::new(1, 0, 1), Position::new(4, 0, 4));
        assert_eq!(span.to_string(), "1..4");
    }
}

//! Error types and reporting

use crate::ast::{Source, Span};
use crate::interp::{RuntimeError, TraceEntry};
use std::rc::Rc;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Why the lexer stopped
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LexErrorKind {
    #[error("illegal character '{0}'")]
    IllegalCharacter(char),

    #[error("a number cannot contain more than one decimal point")]
    MultipleDecimalPoints,

    #[error("unterminated string literal")]
    UnterminatedString,

    #[error("integer literal does not fit in 64 bits")]
    IntegerTooLarge,
}

impl LexErrorKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::IllegalCharacter(_) => "IllegalCharacter",
            Self::MultipleDecimalPoints => "MultipleDecimalPoints",
            Self::UnterminatedString => "UnterminatedString",
            Self::IntegerTooLarge => "IntegerTooLarge",
        }
    }
}

/// Lexer error
#[derive(Debug, Clone, Error)]
#[error("{kind}")]
pub struct LexError {
    pub kind: LexErrorKind,
    pub span: Span,
    pub file: Rc<Source>,
}

/// Parser error: the token at `span` is not what the grammar allows there
#[derive(Debug, Clone, Error)]
#[error("invalid syntax: {expected}")]
pub struct SyntaxError {
    pub expected: String,
    pub span: Span,
    pub file: Rc<Source>,
}

/// Any error the pipeline can produce
#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error(transparent)]
    Lex(#[from] LexError),

    #[error(transparent)]
    Syntax(#[from] SyntaxError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

impl Error {
    pub fn span(&self) -> Span {
        match self {
            Self::Lex(e) => e.span,
            Self::Syntax(e) => e.span,
            Self::Runtime(e) => e.span,
        }
    }

    /// The source text the span points into
    pub fn file(&self) -> &Rc<Source> {
        match self {
            Self::Lex(e) => &e.file,
            Self::Syntax(e) => &e.file,
            Self::Runtime(e) => &e.file,
        }
    }

    /// Error name shown to the user, e.g. `InvalidSyntax`
    pub fn name(&self) -> &'static str {
        match self {
            Self::Lex(e) => e.kind.name(),
            Self::Syntax(_) => "InvalidSyntax",
            Self::Runtime(e) => e.kind.name(),
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::Lex(e) => e.kind.to_string(),
            Self::Syntax(e) => e.expected.clone(),
            Self::Runtime(e) => e.kind.to_string(),
        }
    }

    pub fn traceback(&self) -> &[TraceEntry] {
        match self {
            Self::Runtime(e) => &e.traceback,
            Self::Lex(_) | Self::Syntax(_) => &[],
        }
    }

    /// Plain-text rendering. Runtime errors lead with their traceback; lex and
    /// syntax errors end with the file and line instead.
    pub fn render(&self) -> String {
        let mut out = String::new();
        if !self.traceback().is_empty() {
            out.push_str("Traceback (most recent call last):\n");
            for entry in self.traceback() {
                out.push_str(&format!("  {entry}\n"));
            }
        }
        out.push_str(&format!("{}: {}\n", self.name(), self.message()));
        out.push_str(&underline(self.file(), self.span()));
        if self.traceback().is_empty() {
            out.push_str(&format!(
                "  File {}, line {}\n",
                self.file().name,
                self.span().start.line + 1
            ));
        }
        out
    }
}

/// Source line(s) covered by `span`, each followed by `^` under exactly the
/// spanned characters. Zero-width spans get a single caret.
pub fn underline(file: &Source, span: Span) -> String {
    let mut out = String::new();
    let first = span.start.line;
    let mut last = span.end.line.max(first);
    // A span ending just past a newline does not cover the following line.
    if last > first && span.end.column == 0 {
        last -= 1;
    }

    for line_no in first..=last {
        let Some(line) = file.line(line_no) else {
            break;
        };
        let line = line.trim_end_matches('\r').replace('\t', " ");
        let width = line.chars().count();
        let col_start = if line_no == first { span.start.column } else { 0 };
        let col_end = if line_no == span.end.line {
            span.end.column
        } else {
            width
        };
        let carets = col_end.saturating_sub(col_start).max(1);
        out.push_str(&line);
        out.push('\n');
        out.push_str(&" ".repeat(col_start));
        out.push_str(&"^".repeat(carets));
        out.push('\n');
    }
    out
}

/// Report error with ariadne
pub fn report_error(error: &Error) {
    use ariadne::{Color, Config, IndexType, Label, Report, ReportKind, Source as Text};

    let file = error.file();
    let name = file.name.as_str();
    let range: std::ops::Range<usize> = error.span().into();

    let mut report = Report::build(ReportKind::Error, (name, range.clone()))
        .with_config(Config::default().with_index_type(IndexType::Byte))
        .with_message(format!("{} error", error.name()))
        .with_label(
            Label::new((name, range))
                .with_message(error.message())
                .with_color(Color::Red),
        );

    if !error.traceback().is_empty() {
        let mut note = String::from("Traceback (most recent call last):");
        for entry in error.traceback() {
            note.push_str(&format!("\n  {entry}"));
        }
        report = report.with_note(note);
    }

    if let Err(e) = report.finish().eprint((name, Text::from(file.text.as_str()))) {
        log::warn!("failed to print diagnostic: {e}");
        eprintln!("{}", error.render());
    }
}

//! Runtime errors for the interpreter

use crate::ast::{Source, Span};
use std::fmt;
use std::rc::Rc;
use thiserror::Error;

/// Kinds of runtime errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeErrorKind {
    #[error("division by zero")]
    DivisionByZero,

    #[error("modulo by zero")]
    ModuloByZero,

    #[error("'{0}' is not defined")]
    UndefinedVariable(String),

    /// `right` is `None` for unary operators and single-argument builtins
    #[error("{}", mismatch_message(.op, .left, .right))]
    TypeMismatch {
        op: String,
        left: &'static str,
        right: Option<&'static str>,
    },

    #[error("{name} takes {expected} argument(s) but {actual} were given")]
    WrongArgCount {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("index {index} is out of range for length {len}")]
    IndexOutOfRange { index: i64, len: usize },

    #[error("maximum recursion depth of {0} exceeded")]
    MaxRecursionDepth(usize),

    #[error("string result would exceed {limit} bytes", limit = super::value::MAX_STRING_LEN)]
    StringTooLong,
}

fn mismatch_message(op: &str, left: &str, right: &Option<&'static str>) -> String {
    match right {
        Some(right) => format!("unsupported operand types for {op}: '{left}' and '{right}'"),
        None => format!("unsupported operand type for {op}: '{left}'"),
    }
}

impl RuntimeErrorKind {
    /// Error name shown to the user
    pub fn name(&self) -> &'static str {
        match self {
            Self::DivisionByZero => "DivisionByZero",
            Self::ModuloByZero => "ModuloByZero",
            Self::UndefinedVariable(_) => "UndefinedVariable",
            Self::TypeMismatch { .. } => "TypeMismatch",
            Self::WrongArgCount { .. } => "WrongArgCount",
            Self::IndexOutOfRange { .. } => "IndexOutOfRange",
            Self::MaxRecursionDepth(_) => "MaxRecursionDepth",
            Self::StringTooLong => "StringTooLong",
        }
    }

    pub fn type_mismatch(op: impl fmt::Display, left: &'static str, right: Option<&'static str>) -> Self {
        Self::TypeMismatch {
            op: op.to_string(),
            left,
            right,
        }
    }
}

/// One line of a traceback: `File <name>, line <n>, in <context>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEntry {
    pub source_name: String,
    /// 1-based
    pub line: usize,
    pub context: String,
}

impl TraceEntry {
    pub fn new(source_name: impl Into<String>, line: usize, context: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
            line,
            context: context.into(),
        }
    }
}

impl fmt::Display for TraceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "File {}, line {}, in {}",
            self.source_name, self.line, self.context
        )
    }
}

/// Runtime error during interpretation.
///
/// `span` is the innermost failing sub-expression in `file`; `traceback`
/// lists the active frames outermost first.
#[derive(Debug, Clone, Error)]
#[error("{kind}")]
pub struct RuntimeError {
    pub kind: RuntimeErrorKind,
    pub span: Span,
    pub file: Rc<Source>,
    pub traceback: Vec<TraceEntry>,
}

impl RuntimeError {
    pub fn new(kind: RuntimeErrorKind, span: Span, file: Rc<Source>, traceback: Vec<TraceEntry>) -> Self {
        RuntimeError {
            kind,
            span,
            file,
            traceback,
        }
    }

    /// The failing source text
    pub fn snippet(&self) -> &str {
        self.file.slice(self.span)
    }
}

/// Result type for interpreter operations
pub type InterpResult<T> = Result<T, RuntimeError>;

//! Abstract Syntax Tree definitions

mod expr;
mod span;

pub use expr::*;
pub use span::*;

use serde::Serialize;
use std::fmt;
use std::rc::Rc;

/// A program is a sequence of top-level statements
#[derive(Debug, Clone, Serialize)]
pub struct Program {
    pub statements: Vec<Spanned<Expr>>,
    pub span: Span,
    /// The text the program was parsed from
    #[serde(skip)]
    pub source: Rc<Source>,
}

impl Program {
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, stmt) in self.statements.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{stmt}")?;
        }
        Ok(())
    }
}

//! SimpleScript
//!
//! Lexer, recursive-descent parser and tree-walking interpreter for a small
//! scripting language, with source spans precise enough to underline the
//! exact text behind every error.

pub mod ast;
pub mod error;
pub mod interp;
pub mod lexer;
pub mod parser;
pub mod repl;

pub use ast::Span;
pub use error::{Error, Result};
pub use interp::{Config, Environments, Interpreter, Value};

/// Lex, parse and evaluate `text` with `interpreter`, naming the source
/// `source_name` in spans and tracebacks
pub fn run(source_name: &str, text: &str, interpreter: &mut Interpreter) -> Result<Value> {
    let tokens = lexer::tokenize(text, source_name)?;
    let program = parser::parse(tokens)?;
    Ok(interpreter.run(&program)?)
}

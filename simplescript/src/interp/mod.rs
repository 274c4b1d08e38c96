//! Tree-walking interpreter

mod builtins;
mod env;
mod error;
mod eval;
mod value;

pub use builtins::{Builtin, BuiltinFn, BUILTINS};
pub use env::{EnvId, Environments, ScopeHandle};
pub use error::{InterpResult, RuntimeError, RuntimeErrorKind, TraceEntry};
pub use eval::{Config, Flow, Interpreter, DEFAULT_MAX_RECURSION_DEPTH};
pub use value::{Function, ListRef, Value};

//! Runtime values for the interpreter

use super::builtins::Builtin;
use super::env::{EnvId, ScopeHandle};
use super::error::RuntimeErrorKind;
use crate::ast::{BinOp, Expr, Source, Spanned, UnOp};
use std::cell::RefCell;
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

/// Largest string `Str * Int` may build
pub const MAX_STRING_LEN: usize = 1 << 30;

/// Shared, mutable list storage. Assigning a list aliases it.
pub type ListRef = Rc<RefCell<Vec<Value>>>;

/// A user-defined function together with the scope it was defined in
#[derive(Debug)]
pub struct Function {
    pub name: Option<String>,
    pub params: Vec<String>,
    pub body: Rc<Spanned<Expr>>,
    /// Defining scope, pinned while the function is alive
    pub scope: Rc<ScopeHandle>,
    /// Text the body was parsed from
    pub file: Rc<Source>,
}

impl Function {
    /// Name used in tracebacks and error messages
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("<anonymous>")
    }

    pub fn env(&self) -> EnvId {
        self.scope.id()
    }
}

/// Runtime value
#[derive(Clone)]
pub enum Value {
    /// 64-bit integer
    Int(i64),
    /// 64-bit floating point
    Float(f64),
    Str(String),
    List(ListRef),
    Function(Rc<Function>),
    Builtin(&'static Builtin),
    /// Result of statements with no useful value
    Nothing,
}

impl Value {
    pub fn list(items: Vec<Value>) -> Value {
        Value::List(Rc::new(RefCell::new(items)))
    }

    pub fn bool(b: bool) -> Value {
        Value::Int(i64::from(b))
    }

    /// Check if value is truthy
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Int(n) => *n != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.borrow().is_empty(),
            Value::Function(_) | Value::Builtin(_) => true,
            Value::Nothing => false,
        }
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }

    pub fn is_zero(&self) -> bool {
        match self {
            Value::Int(n) => *n == 0,
            Value::Float(f) => *f == 0.0,
            _ => false,
        }
    }

    /// Get type name for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Function(_) => "function",
            Value::Builtin(_) => "built-in function",
            Value::Nothing => "nothing",
        }
    }

    /// Try to convert to f64
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(n) => Some(*n as f64),
            _ => None,
        }
    }
}

/// Writes values, printing a list that is already being written as `[...]`
struct Printer<'a, 'b> {
    f: &'a mut fmt::Formatter<'b>,
    open: Vec<*const RefCell<Vec<Value>>>,
}

impl Printer<'_, '_> {
    fn value(&mut self, value: &Value, quoted: bool) -> fmt::Result {
        match value {
            Value::Int(n) => write!(self.f, "{n}"),
            // Debug keeps the fractional part: 2.0, not 2
            Value::Float(x) => write!(self.f, "{x:?}"),
            Value::Str(s) if quoted => write!(self.f, "{s:?}"),
            Value::Str(s) => self.f.write_str(s),
            Value::List(items) => {
                let ptr = Rc::as_ptr(items);
                if self.open.contains(&ptr) {
                    return self.f.write_str("[...]");
                }
                self.open.push(ptr);
                self.f.write_str("[")?;
                for (i, item) in items.borrow().iter().enumerate() {
                    if i > 0 {
                        self.f.write_str(", ")?;
                    }
                    self.value(item, true)?;
                }
                self.open.pop();
                self.f.write_str("]")
            }
            Value::Function(func) => write!(self.f, "<function {}>", func.display_name()),
            Value::Builtin(b) => write!(self.f, "<built-in function {}>", b.name),
            Value::Nothing => self.f.write_str("()"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Printer { f, open: Vec::new() }.value(self, false)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "Int({n})"),
            Value::Float(x) => write!(f, "Float({x:?})"),
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::List(_) => write!(f, "List({self})"),
            Value::Function(func) => write!(f, "Function({})", func.display_name()),
            Value::Builtin(b) => write!(f, "Builtin({})", b.name),
            Value::Nothing => f.write_str("Nothing"),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        equal(self, other, &mut Vec::new())
    }
}

type ListPair = (*const RefCell<Vec<Value>>, *const RefCell<Vec<Value>>);

/// Structural equality. A pair of lists already being compared counts as
/// equal, so self-containing lists terminate.
fn equal(left: &Value, right: &Value, comparing: &mut Vec<ListPair>) -> bool {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => a == b,
        (Value::Float(a), Value::Float(b)) => a == b,
        (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => (*a as f64) == *b,
        (Value::Str(a), Value::Str(b)) => a == b,
        (Value::List(a), Value::List(b)) => {
            if Rc::ptr_eq(a, b) {
                return true;
            }
            let pair = (Rc::as_ptr(a), Rc::as_ptr(b));
            if comparing.contains(&pair) {
                return true;
            }
            let (a, b) = (a.borrow(), b.borrow());
            if a.len() != b.len() {
                return false;
            }
            comparing.push(pair);
            let same = a.iter().zip(b.iter()).all(|(x, y)| equal(x, y, comparing));
            comparing.pop();
            same
        }
        (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
        (Value::Builtin(a), Value::Builtin(b)) => std::ptr::eq(*a, *b),
        (Value::Nothing, Value::Nothing) => true,
        _ => false,
    }
}

/// Resolve a possibly negative index against a sequence of `len` items
pub fn resolve_index(index: i64, len: usize) -> Result<usize, RuntimeErrorKind> {
    let out_of_range = || RuntimeErrorKind::IndexOutOfRange { index, len };
    let signed_len = i64::try_from(len).map_err(|_| out_of_range())?;
    let resolved = if index < 0 { index + signed_len } else { index };
    if (0..signed_len).contains(&resolved) {
        usize::try_from(resolved).map_err(|_| out_of_range())
    } else {
        Err(out_of_range())
    }
}

fn mismatch(op: BinOp, left: &Value, right: &Value) -> RuntimeErrorKind {
    RuntimeErrorKind::type_mismatch(op, left.type_name(), Some(right.type_name()))
}

/// Apply a non-short-circuiting binary operator.
///
/// Zero divisors are rejected by the caller, which knows the divisor's span;
/// here they only guard against panics.
pub fn binary(op: BinOp, left: &Value, right: &Value) -> Result<Value, RuntimeErrorKind> {
    match (left, right) {
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => numeric(op, left, right),

        (Value::Str(a), Value::Str(b)) => match op {
            BinOp::Add => Ok(Value::Str(format!("{a}{b}"))),
            _ => compare(op, a.cmp(b)).ok_or_else(|| mismatch(op, left, right)),
        },
        (Value::Str(s), Value::Int(n)) if op == BinOp::Mul => repeat(s, *n),

        (Value::List(items), _) => list_op(op, left, items, right).ok_or_else(|| mismatch(op, left, right))?,

        _ if matches!(op, BinOp::Eq | BinOp::Ne) => {
            Ok(Value::bool((left == right) == (op == BinOp::Eq)))
        }
        _ => Err(mismatch(op, left, right)),
    }
}

/// `s * n`; a negative count gives the empty string
fn repeat(s: &str, count: i64) -> Result<Value, RuntimeErrorKind> {
    let count = usize::try_from(count).unwrap_or(0);
    match s.len().checked_mul(count) {
        Some(len) if len <= MAX_STRING_LEN => Ok(Value::Str(s.repeat(count))),
        _ => Err(RuntimeErrorKind::StringTooLong),
    }
}

fn list_op(
    op: BinOp,
    left: &Value,
    items: &ListRef,
    right: &Value,
) -> Option<Result<Value, RuntimeErrorKind>> {
    let result = match (op, right) {
        (BinOp::Add, value) => {
            let mut copy = items.borrow().clone();
            copy.push(value.clone());
            Ok(Value::list(copy))
        }
        (BinOp::Mul, Value::List(other)) => {
            let mut copy = items.borrow().clone();
            copy.extend(other.borrow().iter().cloned());
            Ok(Value::list(copy))
        }
        (BinOp::Sub, Value::Int(index)) => {
            let mut copy = items.borrow().clone();
            resolve_index(*index, copy.len()).map(|i| {
                copy.remove(i);
                Value::list(copy)
            })
        }
        (BinOp::Div, Value::Int(index)) => {
            let items = items.borrow();
            resolve_index(*index, items.len()).map(|i| items[i].clone())
        }
        (BinOp::Eq | BinOp::Ne, value) => {
            Ok(Value::bool((left == value) == (op == BinOp::Eq)))
        }
        _ => return None,
    };
    Some(result)
}

fn compare(op: BinOp, ordering: Ordering) -> Option<Value> {
    let holds = match op {
        BinOp::Eq => ordering == Ordering::Equal,
        BinOp::Ne => ordering != Ordering::Equal,
        BinOp::Lt => ordering == Ordering::Less,
        BinOp::Gt => ordering == Ordering::Greater,
        BinOp::Le => ordering != Ordering::Greater,
        BinOp::Ge => ordering != Ordering::Less,
        _ => return None,
    };
    Some(Value::bool(holds))
}

fn numeric(op: BinOp, left: &Value, right: &Value) -> Result<Value, RuntimeErrorKind> {
    if let (Value::Int(a), Value::Int(b)) = (left, right) {
        if let Some(value) = int_op(op, *a, *b) {
            return Ok(value);
        }
    }
    let (Some(a), Some(b)) = (left.as_float(), right.as_float()) else {
        return Err(mismatch(op, left, right));
    };
    float_op(op, a, b).ok_or_else(|| mismatch(op, left, right))
}

/// Integer arithmetic; `None` means "redo it in floating point".
fn int_op(op: BinOp, a: i64, b: i64) -> Option<Value> {
    let value = match op {
        BinOp::Add => Value::Int(a.checked_add(b)?),
        BinOp::Sub => Value::Int(a.checked_sub(b)?),
        BinOp::Mul => Value::Int(a.checked_mul(b)?),
        BinOp::Div => return None,
        BinOp::IntDiv => Value::Int(a.checked_div(b)?),
        BinOp::Mod => {
            let r = a.checked_rem(b)?;
            Value::Int(if r != 0 && (r < 0) != (b < 0) { r + b } else { r })
        }
        BinOp::Pow => {
            let exp = u32::try_from(b).ok()?;
            Value::Int(a.checked_pow(exp)?)
        }
        _ => compare(op, a.cmp(&b))?,
    };
    Some(value)
}

fn float_op(op: BinOp, a: f64, b: f64) -> Option<Value> {
    let value = match op {
        BinOp::Add => Value::Float(a + b),
        BinOp::Sub => Value::Float(a - b),
        BinOp::Mul => Value::Float(a * b),
        BinOp::Div => Value::Float(a / b),
        BinOp::IntDiv => Value::Float((a / b).trunc()),
        BinOp::Mod => {
            let r = a % b;
            Value::Float(if r != 0.0 && (r < 0.0) != (b < 0.0) { r + b } else { r })
        }
        BinOp::Pow => Value::Float(a.powf(b)),
        _ => compare(op, a.partial_cmp(&b)?)?,
    };
    Some(value)
}

/// Apply a unary operator
pub fn unary(op: UnOp, value: &Value) -> Result<Value, RuntimeErrorKind> {
    match (op, value) {
        (UnOp::Not, v) => Ok(Value::bool(!v.is_truthy())),
        (UnOp::Neg, Value::Int(n)) => Ok(n
            .checked_neg()
            .map(Value::Int)
            .unwrap_or(Value::Float(-(*n as f64)))),
        (UnOp::Neg, Value::Float(x)) => Ok(Value::Float(-x)),
        (UnOp::Pos, Value::Int(_) | Value::Float(_)) => Ok(value.clone()),
        _ => Err(RuntimeErrorKind::type_mismatch(op, value.type_name(), None)),
    }
}

/// `target[index]` for lists and strings
pub fn index(target: &Value, index: &Value) -> Result<Value, RuntimeErrorKind> {
    match (target, index) {
        (Value::List(items), Value::Int(i)) => {
            let items = items.borrow();
            resolve_index(*i, items.len()).map(|i| items[i].clone())
        }
        (Value::Str(s), Value::Int(i)) => {
            let len = s.chars().count();
            let at = resolve_index(*i, len)?;
            Ok(Value::Str(s.chars().skip(at).take(1).collect()))
        }
        _ => Err(RuntimeErrorKind::type_mismatch(
            "[]",
            target.type_name(),
            Some(index.type_name()),
        )),
    }
}

//! Built-in functions bound in the global scope

use super::error::RuntimeErrorKind;
use super::value::{resolve_index, Value};
use std::fmt;

/// Builtin function type. Arity is checked by the caller.
pub type BuiltinFn = fn(&[Value]) -> Result<Value, RuntimeErrorKind>;

pub struct Builtin {
    pub name: &'static str,
    pub arity: usize,
    pub func: BuiltinFn,
}

impl fmt::Debug for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Builtin({})", self.name)
    }
}

pub static BUILTINS: [Builtin; 10] = [
    Builtin { name: "PRINT", arity: 1, func: builtin_print },
    Builtin { name: "PRINT_RET", arity: 1, func: builtin_print_ret },
    Builtin { name: "IS_NUM", arity: 1, func: builtin_is_num },
    Builtin { name: "IS_STR", arity: 1, func: builtin_is_str },
    Builtin { name: "IS_LIST", arity: 1, func: builtin_is_list },
    Builtin { name: "IS_FUN", arity: 1, func: builtin_is_fun },
    Builtin { name: "APPEND", arity: 2, func: builtin_append },
    Builtin { name: "EXTEND", arity: 2, func: builtin_extend },
    Builtin { name: "POP", arity: 2, func: builtin_pop },
    Builtin { name: "LEN", arity: 1, func: builtin_len },
];

fn builtin_print(args: &[Value]) -> Result<Value, RuntimeErrorKind> {
    println!("{}", args[0]);
    Ok(Value::Nothing)
}

fn builtin_print_ret(args: &[Value]) -> Result<Value, RuntimeErrorKind> {
    Ok(Value::Str(args[0].to_string()))
}

fn builtin_is_num(args: &[Value]) -> Result<Value, RuntimeErrorKind> {
    Ok(Value::bool(args[0].is_number()))
}

fn builtin_is_str(args: &[Value]) -> Result<Value, RuntimeErrorKind> {
    Ok(Value::bool(matches!(args[0], Value::Str(_))))
}

fn builtin_is_list(args: &[Value]) -> Result<Value, RuntimeErrorKind> {
    Ok(Value::bool(matches!(args[0], Value::List(_))))
}

fn builtin_is_fun(args: &[Value]) -> Result<Value, RuntimeErrorKind> {
    Ok(Value::bool(matches!(
        args[0],
        Value::Function(_) | Value::Builtin(_)
    )))
}

fn builtin_append(args: &[Value]) -> Result<Value, RuntimeErrorKind> {
    match &args[0] {
        Value::List(items) => {
            items.borrow_mut().push(args[1].clone());
            Ok(Value::Nothing)
        }
        other => Err(RuntimeErrorKind::type_mismatch("APPEND", other.type_name(), None)),
    }
}

fn builtin_extend(args: &[Value]) -> Result<Value, RuntimeErrorKind> {
    match (&args[0], &args[1]) {
        (Value::List(target), Value::List(source)) => {
            // Copy first: extending a list with itself aliases both arguments
            let extra = source.borrow().clone();
            target.borrow_mut().extend(extra);
            Ok(Value::Nothing)
        }
        (a, b) => Err(RuntimeErrorKind::type_mismatch(
            "EXTEND",
            a.type_name(),
            Some(b.type_name()),
        )),
    }
}

fn builtin_pop(args: &[Value]) -> Result<Value, RuntimeErrorKind> {
    match (&args[0], &args[1]) {
        (Value::List(items), Value::Int(index)) => {
            let mut items = items.borrow_mut();
            let at = resolve_index(*index, items.len())?;
            Ok(items.remove(at))
        }
        (a, b) => Err(RuntimeErrorKind::type_mismatch(
            "POP",
            a.type_name(),
            Some(b.type_name()),
        )),
    }
}

fn builtin_len(args: &[Value]) -> Result<Value, RuntimeErrorKind> {
    let len = match &args[0] {
        Value::List(items) => items.borrow().len(),
        Value::Str(s) => s.chars().count(),
        other => return Err(RuntimeErrorKind::type_mismatch("LEN", other.type_name(), None)),
    };
    Ok(Value::Int(i64::try_from(len).unwrap_or(i64::MAX)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(name: &str) -> Option<&'static Builtin> {
        BUILTINS.iter().find(|b| b.name == name)
    }

    fn call(name: &str, args: &[Value]) -> Result<Value, RuntimeErrorKind> {
        let builtin = lookup(name).expect("builtin exists");
        assert_eq!(builtin.arity, args.len());
        (builtin.func)(args)
    }

    #[test]
    fn test_lookup() {
        assert!(lookup("LEN").is_some());
        assert!(lookup("len").is_none());
    }

    #[test]
    fn test_type_predicates() {
        assert_eq!(call("IS_NUM", &[Value::Float(1.0)]), Ok(Value::Int(1)));
        assert_eq!(call("IS_STR", &[Value::Int(1)]), Ok(Value::Int(0)));
        assert_eq!(call("IS_LIST", &[Value::list(vec![])]), Ok(Value::Int(1)));
        let print = Value::Builtin(lookup("PRINT").unwrap());
        assert_eq!(call("IS_FUN", &[print]), Ok(Value::Int(1)));
    }

    #[test]
    fn test_append_mutates_alias() {
        let list = Value::list(vec![Value::Int(1)]);
        let alias = list.clone();
        call("APPEND", &[list, Value::Int(2)]).unwrap();
        assert_eq!(alias.to_string(), "[1, 2]");
    }

    #[test]
    fn test_extend_with_itself() {
        let list = Value::list(vec![Value::Int(1), Value::Int(2)]);
        call("EXTEND", &[list.clone(), list.clone()]).unwrap();
        assert_eq!(list.to_string(), "[1, 2, 1, 2]");
    }

    #[test]
    fn test_pop() {
        let list = Value::list(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        assert_eq!(call("POP", &[list.clone(), Value::Int(-1)]), Ok(Value::Int(3)));
        assert_eq!(list.to_string(), "[1, 2]");
        assert_eq!(
            call("POP", &[list, Value::Int(5)]),
            Err(RuntimeErrorKind::IndexOutOfRange { index: 5, len: 2 })
        );
    }

    #[test]
    fn test_len_and_print_ret() {
        assert_eq!(call("LEN", &[Value::Str("héllo".into())]), Ok(Value::Int(5)));
        assert_eq!(
            call("PRINT_RET", &[Value::Float(2.0)]),
            Ok(Value::Str("2.0".into()))
        );
        assert!(call("LEN", &[Value::Int(3)]).is_err());
    }
}

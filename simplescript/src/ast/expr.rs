//! Expression AST nodes

use super::Spanned;
use serde::Serialize;
use std::fmt;
use std::rc::Rc;

/// Expression or statement node
#[derive(Debug, Clone, Serialize)]
pub enum Expr {
    /// Integer literal
    IntLit(i64),
    /// Float literal
    FloatLit(f64),
    /// String literal
    StringLit(String),
    /// List literal: [a, b, c]
    ListLit(Vec<Spanned<Expr>>),

    /// Variable reference
    VarAccess(String),

    /// `VAR name = value` (declare) or `name = value` (re-assign)
    VarAssign {
        name: String,
        value: Box<Spanned<Expr>>,
        declare: bool,
    },

    /// Binary operation
    Binary {
        left: Box<Spanned<Expr>>,
        op: BinOp,
        right: Box<Spanned<Expr>>,
    },

    /// Unary operation
    Unary {
        op: UnOp,
        expr: Box<Spanned<Expr>>,
    },

    /// IF cond THEN body (ELIF cond THEN body)* (ELSE body)?
    If {
        branches: Vec<(Spanned<Expr>, Spanned<Expr>)>,
        else_branch: Option<Box<Spanned<Expr>>>,
    },

    /// FOR var = start TO end (STEP step)? THEN body
    For {
        var: String,
        start: Box<Spanned<Expr>>,
        end: Box<Spanned<Expr>>,
        step: Option<Box<Spanned<Expr>>>,
        body: Box<Spanned<Expr>>,
    },

    /// WHILE cond THEN body
    While {
        cond: Box<Spanned<Expr>>,
        body: Box<Spanned<Expr>>,
    },

    /// FUN name?(params) -> expr, or a block body ending in END
    FuncDef {
        name: Option<String>,
        params: Vec<Spanned<String>>,
        body: Rc<Spanned<Expr>>,
    },

    /// Function call
    Call {
        callee: Box<Spanned<Expr>>,
        args: Vec<Spanned<Expr>>,
    },

    /// Postfix index: target[index]
    Index {
        target: Box<Spanned<Expr>>,
        index: Box<Spanned<Expr>>,
    },

    /// RETURN with optional value
    Return(Option<Box<Spanned<Expr>>>),
    /// CONTINUE
    Continue,
    /// BREAK
    Break,

    /// Multi-line body: NEWLINE statements END
    Block(Vec<Spanned<Expr>>),
}

/// Binary operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BinOp {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    /// Integer division, written `|`
    IntDiv,
    Mod,
    Pow,

    // Comparison
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,

    // Logical
    And,
    Or,
}

impl BinOp {
    /// Whether a zero right operand is an error for this operator
    pub fn rejects_zero_divisor(self) -> bool {
        matches!(self, BinOp::Div | BinOp::IntDiv | BinOp::Mod)
    }
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BinOp::Add => write!(f, "+"),
            BinOp::Sub => write!(f, "-"),
            BinOp::Mul => write!(f, "*"),
            BinOp::Div => write!(f, "/"),
            BinOp::IntDiv => write!(f, "|"),
            BinOp::Mod => write!(f, "%"),
            BinOp::Pow => write!(f, "^"),
            BinOp::Eq => write!(f, "=="),
            BinOp::Ne => write!(f, "!="),
            BinOp::Lt => write!(f, "<"),
            BinOp::Gt => write!(f, ">"),
            BinOp::Le => write!(f, "<="),
            BinOp::Ge => write!(f, ">="),
            BinOp::And => write!(f, "AND"),
            BinOp::Or => write!(f, "OR"),
        }
    }
}

/// Unary operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UnOp {
    /// Negation (-)
    Neg,
    /// Unary plus, a no-op on numbers
    Pos,
    /// Logical NOT
    Not,
}

impl fmt::Display for UnOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnOp::Neg => write!(f, "-"),
            UnOp::Pos => write!(f, "+"),
            UnOp::Not => write!(f, "NOT"),
        }
    }
}

// Canonical S-expression form. Spans are left out, so two nodes parsed from
// different places print identically when they have the same structure.

impl<T: fmt::Display> fmt::Display for Spanned<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.node, f)
    }
}

fn write_seq<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, " ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::IntLit(n) => write!(f, "{n}"),
            Expr::FloatLit(x) => write!(f, "{x:?}"),
            Expr::StringLit(s) => write!(f, "{s:?}"),
            Expr::ListLit(items) => {
                write!(f, "[")?;
                write_seq(f, items)?;
                write!(f, "]")
            }
            Expr::VarAccess(name) => write!(f, "{name}"),
            Expr::VarAssign {
                name,
                value,
                declare,
            } => {
                let head = if *declare { "var" } else { "set" };
                write!(f, "({head} {name} {value})")
            }
            Expr::Binary { left, op, right } => write!(f, "({op} {left} {right})"),
            Expr::Unary { op, expr } => write!(f, "({op} {expr})"),
            Expr::If {
                branches,
                else_branch,
            } => {
                write!(f, "(if")?;
                for (cond, body) in branches {
                    write!(f, " ({cond} {body})")?;
                }
                if let Some(else_branch) = else_branch {
                    write!(f, " (else {else_branch})")?;
                }
                write!(f, ")")
            }
            Expr::For {
                var,
                start,
                end,
                step,
                body,
            } => {
                write!(f, "(for {var} {start} {end}")?;
                if let Some(step) = step {
                    write!(f, " (step {step})")?;
                }
                write!(f, " {body})")
            }
            Expr::While { cond, body } => write!(f, "(while {cond} {body})"),
            Expr::FuncDef { name, params, body } => {
                write!(f, "(fun {} (", name.as_deref().unwrap_or("_"))?;
                write_seq(
                    f,
                    &params.iter().map(|p| p.node.as_str()).collect::<Vec<_>>(),
                )?;
                write!(f, ") {body})")
            }
            Expr::Call { callee, args } => {
                write!(f, "(call {callee}")?;
                for arg in args {
                    write!(f, " {arg}")?;
                }
                write!(f, ")")
            }
            Expr::Index { target, index } => write!(f, "(index {target} {index})"),
            Expr::Return(Some(value)) => write!(f, "(return {value})"),
            Expr::Return(None) => write!(f, "(return)"),
            Expr::Continue => write!(f, "(continue)"),
            Expr::Break => write!(f, "(break)"),
            Expr::Block(stmts) => {
                write!(f, "(block")?;
                for stmt in stmts {
                    write!(f, " {stmt}")?;
                }
                write!(f, ")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Span;

    fn lit(n: i64) -> Spanned<Expr> {
        Spanned::new(Expr::IntLit(n), Span::default())
    }

    #[test]
    fn test_binop_display() {
        assert_eq!(BinOp::IntDiv.to_string(), "|");
        assert_eq!(BinOp::Pow.to_string(), "^");
        assert_eq!(BinOp::And.to_string(), "AND");
    }

    #[test]
    fn test_zero_divisor_operators() {
        assert!(BinOp::Div.rejects_zero_divisor());
        assert!(BinOp::IntDiv.rejects_zero_divisor());
        assert!(BinOp::Mod.rejects_zero_divisor());
        assert!(!BinOp::Mul.rejects_zero_divisor());
    }

    #[test]
    fn test_expr_display_nested() {
        let expr = Expr::Binary {
            left: Box::new(lit(1)),
            op: BinOp::Add,
            right: Box::new(Spanned::new(
                Expr::Unary {
                    op: UnOp::Neg,
                    expr: Box::new(lit(2)),
                },
                Span::default(),
            )),
        };
        assert_eq!(expr.to_string(), "(+ 1 (- 2))");
    }

    #[test]
    fn test_float_display_keeps_fraction() {
        assert_eq!(Expr::FloatLit(2.0).to_string(), "2.0");
        assert_eq!(Expr::StringLit("a\"b".into()).to_string(), "\"a\\\"b\"");
    }
}

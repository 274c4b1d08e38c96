//! Expression evaluator

use super::env::{EnvId, Environments};
use super::error::{InterpResult, RuntimeError, RuntimeErrorKind, TraceEntry};
use super::value::{self, Function, Value};
use crate::ast::{BinOp, Expr, Program, Source, Span, Spanned};
use std::rc::Rc;

/// Default limit on nested function calls
pub const DEFAULT_MAX_RECURSION_DEPTH: usize = 1000;

/// Stack growth parameters for deep recursion
const STACK_RED_ZONE: usize = 128 * 1024; // 128KB remaining triggers growth
const STACK_GROW_SIZE: usize = 4 * 1024 * 1024; // Grow by 4MB each time

/// Interpreter settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Nested calls allowed before `MaxRecursionDepth`
    pub max_recursion_depth: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_recursion_depth: DEFAULT_MAX_RECURSION_DEPTH,
        }
    }
}

/// Outcome of evaluating a node: a value, or a control signal travelling up
/// to the loop or call that absorbs it
#[derive(Debug, Clone, PartialEq)]
pub enum Flow {
    Normal(Value),
    Return(Value),
    Break,
    Continue,
}

/// Unwrap a normal value or hand any control signal back to the caller
macro_rules! value {
    ($flow:expr) => {
        match $flow {
            Flow::Normal(value) => value,
            signal => return Ok(signal),
        }
    };
}

/// An active program or function body, for tracebacks
#[derive(Debug)]
struct Frame {
    context: String,
    file: Rc<Source>,
    /// Call site in the enclosing frame's file
    entered_at: Option<Span>,
}

/// The interpreter. Owns the global environment for the whole session, so
/// definitions persist across calls to [`Interpreter::run`].
#[derive(Debug)]
pub struct Interpreter {
    envs: Environments,
    config: Config,
    /// Current call depth
    depth: usize,
    frames: Vec<Frame>,
}

impl Interpreter {
    /// Create an interpreter around an existing global environment
    pub fn new(envs: Environments, config: Config) -> Self {
        Interpreter {
            envs,
            config,
            depth: 0,
            frames: Vec::new(),
        }
    }

    pub fn environments(&self) -> &Environments {
        &self.envs
    }

    pub fn config(&self) -> Config {
        self.config
    }

    /// Look up a global binding
    pub fn global(&self, name: &str) -> Option<Value> {
        self.envs.get(self.envs.global(), name)
    }

    /// Run a program in the global scope and return the value of its last
    /// statement. A stray RETURN ends the program with its value.
    pub fn run(&mut self, program: &Program) -> InterpResult<Value> {
        self.depth = 0;
        self.frames.clear();
        self.frames.push(Frame {
            context: "<program>".to_string(),
            file: Rc::clone(&program.source),
            entered_at: None,
        });
        log::debug!(
            "running {} statement(s) from {}",
            program.statements.len(),
            program.source.name
        );

        let result = self.run_statements(&program.statements);
        self.frames.clear();
        self.envs.collect();
        result
    }

    fn run_statements(&mut self, statements: &[Spanned<Expr>]) -> InterpResult<Value> {
        let global = self.envs.global();
        let mut last = Value::Nothing;
        for stmt in statements {
            match self.eval(stmt, global)? {
                Flow::Normal(value) => last = value,
                Flow::Return(value) => return Ok(value),
                Flow::Break | Flow::Continue => return Ok(Value::Nothing),
            }
        }
        Ok(last)
    }

    /// Call a function or builtin value with already evaluated arguments
    pub fn call_value(&mut self, callee: &Value, args: Vec<Value>, span: Span) -> InterpResult<Value> {
        match callee {
            Value::Builtin(builtin) => {
                if args.len() != builtin.arity {
                    return Err(self.error(
                        RuntimeErrorKind::WrongArgCount {
                            name: builtin.name.to_string(),
                            expected: builtin.arity,
                            actual: args.len(),
                        },
                        span,
                    ));
                }
                log::trace!("calling builtin {}", builtin.name);
                (builtin.func)(&args).map_err(|kind| self.error(kind, span))
            }
            Value::Function(func) => self.call_function(func, args, span),
            other => Err(self.error(
                RuntimeErrorKind::type_mismatch("call", other.type_name(), None),
                span,
            )),
        }
    }

    fn call_function(&mut self, func: &Rc<Function>, args: Vec<Value>, span: Span) -> InterpResult<Value> {
        // Check arity
        if func.params.len() != args.len() {
            return Err(self.error(
                RuntimeErrorKind::WrongArgCount {
                    name: func.display_name().to_string(),
                    expected: func.params.len(),
                    actual: args.len(),
                },
                span,
            ));
        }

        // Check recursion depth
        if self.depth >= self.config.max_recursion_depth {
            return Err(self.error(
                RuntimeErrorKind::MaxRecursionDepth(self.config.max_recursion_depth),
                span,
            ));
        }

        log::trace!("calling {} at depth {}", func.display_name(), self.depth);
        self.depth += 1;
        self.frames.push(Frame {
            context: func.display_name().to_string(),
            file: Rc::clone(&func.file),
            entered_at: Some(span),
        });

        // Create child env from the captured environment (lexical scoping)
        let scope = self.envs.child(func.env());
        for (param, arg) in func.params.iter().zip(args) {
            self.envs.define(scope, param.as_str(), arg);
        }

        let result = self.eval(&func.body, scope);

        self.envs.release(scope);
        self.frames.pop();
        self.depth -= 1;

        // Return is absorbed here, as are loop signals that escaped the body
        Ok(match result? {
            Flow::Normal(value) | Flow::Return(value) => value,
            Flow::Break | Flow::Continue => Value::Nothing,
        })
    }

    /// Build a runtime error at `span` in the current frame, with a traceback
    /// of every active frame
    fn error(&self, kind: RuntimeErrorKind, span: Span) -> RuntimeError {
        let traceback = self
            .frames
            .iter()
            .enumerate()
            .map(|(i, frame)| {
                let at = self
                    .frames
                    .get(i + 1)
                    .and_then(|callee| callee.entered_at)
                    .unwrap_or(span);
                TraceEntry::new(frame.file.name.as_str(), at.start.line + 1, frame.context.as_str())
            })
            .collect();
        RuntimeError::new(kind, span, self.current_file(), traceback)
    }

    fn current_file(&self) -> Rc<Source> {
        self.frames
            .last()
            .map(|frame| Rc::clone(&frame.file))
            .unwrap_or_else(|| Rc::new(Source::new("<unknown>", "")))
    }

    /// Evaluate an expression with automatic stack growth for deep recursion
    fn eval(&mut self, expr: &Spanned<Expr>, env: EnvId) -> InterpResult<Flow> {
        stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || self.eval_inner(expr, env))
    }

    /// Inner eval implementation
    fn eval_inner(&mut self, expr: &Spanned<Expr>, env: EnvId) -> InterpResult<Flow> {
        let value = match &expr.node {
            Expr::IntLit(n) => Value::Int(*n),
            Expr::FloatLit(f) => Value::Float(*f),
            Expr::StringLit(s) => Value::Str(s.clone()),

            Expr::ListLit(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(value!(self.eval(item, env)?));
                }
                Value::list(values)
            }

            Expr::VarAccess(name) => self.envs.get(env, name).ok_or_else(|| {
                self.error(RuntimeErrorKind::UndefinedVariable(name.clone()), expr.span)
            })?,

            Expr::VarAssign {
                name,
                value,
                declare,
            } => {
                let value = value!(self.eval(value, env)?);
                if *declare {
                    self.envs.define(env, name.as_str(), value.clone());
                } else {
                    self.envs.set(env, name, value.clone());
                }
                value
            }

            Expr::Binary { left, op, right } => return self.eval_binary(expr.span, left, *op, right, env),

            Expr::Unary { op, expr: operand } => {
                let value = value!(self.eval(operand, env)?);
                value::unary(*op, &value).map_err(|kind| self.error(kind, expr.span))?
            }

            Expr::If {
                branches,
                else_branch,
            } => {
                for (cond, body) in branches {
                    let cond = value!(self.eval(cond, env)?);
                    if cond.is_truthy() {
                        return self.eval(body, env);
                    }
                }
                match else_branch {
                    Some(body) => return self.eval(body, env),
                    None => Value::Nothing,
                }
            }

            Expr::For {
                var,
                start,
                end,
                step,
                body,
            } => return self.eval_for(var, start, end, step.as_deref(), body, env),

            Expr::While { cond, body } => {
                let collect = !matches!(body.node, Expr::Block(_));
                let mut results = Vec::new();
                loop {
                    let cond = value!(self.eval(cond, env)?);
                    if !cond.is_truthy() {
                        break;
                    }
                    match self.eval(body, env)? {
                        Flow::Normal(value) if collect => results.push(value),
                        Flow::Normal(_) | Flow::Continue => {}
                        Flow::Break => return Ok(Flow::Normal(Value::Nothing)),
                        ret @ Flow::Return(_) => return Ok(ret),
                    }
                }
                if collect { Value::list(results) } else { Value::Nothing }
            }

            Expr::FuncDef { name, params, body } => {
                let func = Value::Function(Rc::new(Function {
                    name: name.clone(),
                    params: params.iter().map(|p| p.node.clone()).collect(),
                    body: Rc::clone(body),
                    scope: self.envs.capture(env),
                    file: self.current_file(),
                }));
                if let Some(name) = name {
                    self.envs.define(env, name.as_str(), func.clone());
                }
                func
            }

            Expr::Call { callee, args } => {
                let callee = value!(self.eval(callee, env)?);
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(value!(self.eval(arg, env)?));
                }
                self.call_value(&callee, values, expr.span)?
            }

            Expr::Index { target, index } => {
                let target = value!(self.eval(target, env)?);
                let index = value!(self.eval(index, env)?);
                value::index(&target, &index).map_err(|kind| self.error(kind, expr.span))?
            }

            Expr::Return(value) => {
                let value = match value {
                    Some(value) => value!(self.eval(value, env)?),
                    None => Value::Nothing,
                };
                return Ok(Flow::Return(value));
            }
            Expr::Continue => return Ok(Flow::Continue),
            Expr::Break => return Ok(Flow::Break),

            Expr::Block(statements) => {
                for stmt in statements {
                    value!(self.eval(stmt, env)?);
                }
                Value::Nothing
            }
        };
        Ok(Flow::Normal(value))
    }

    fn eval_binary(
        &mut self,
        span: Span,
        left: &Spanned<Expr>,
        op: BinOp,
        right: &Spanned<Expr>,
        env: EnvId,
    ) -> InterpResult<Flow> {
        let lhs = value!(self.eval(left, env)?);

        // Short-circuit evaluation for logical operators
        match op {
            BinOp::And if !lhs.is_truthy() => return Ok(Flow::Normal(lhs)),
            BinOp::Or if lhs.is_truthy() => return Ok(Flow::Normal(lhs)),
            BinOp::And | BinOp::Or => return self.eval(right, env),
            _ => {}
        }

        let rhs = value!(self.eval(right, env)?);

        // Only the divisor is checked, and its own span is reported
        if op.rejects_zero_divisor() && lhs.is_number() && rhs.is_zero() {
            let kind = if op == BinOp::Mod {
                RuntimeErrorKind::ModuloByZero
            } else {
                RuntimeErrorKind::DivisionByZero
            };
            return Err(self.error(kind, right.span));
        }

        value::binary(op, &lhs, &rhs)
            .map(Flow::Normal)
            .map_err(|kind| self.error(kind, span))
    }

    fn eval_for(
        &mut self,
        var: &str,
        start: &Spanned<Expr>,
        end: &Spanned<Expr>,
        step: Option<&Spanned<Expr>>,
        body: &Spanned<Expr>,
        env: EnvId,
    ) -> InterpResult<Flow> {
        let start_value = value!(self.eval(start, env)?);
        let end_value = value!(self.eval(end, env)?);
        let step_value = match step {
            Some(step) => value!(self.eval(step, env)?),
            None => Value::Int(1),
        };

        self.loop_bound(&start_value, start.span)?;
        let limit = self.loop_bound(&end_value, end.span)?;
        let ascending = self.loop_bound(&step_value, step.map_or(start.span, |s| s.span))? > 0.0;

        let collect = !matches!(body.node, Expr::Block(_));
        let mut results = Vec::new();
        let mut counter = start_value;
        loop {
            let current = counter.as_float().unwrap_or(limit);
            let in_range = if ascending { current < limit } else { current > limit };
            if !in_range {
                break;
            }

            self.envs.define(env, var, counter.clone());
            match self.eval(body, env)? {
                Flow::Normal(value) if collect => results.push(value),
                Flow::Normal(_) | Flow::Continue => {}
                Flow::Break => return Ok(Flow::Normal(Value::Nothing)),
                ret @ Flow::Return(_) => return Ok(ret),
            }

            counter = value::binary(BinOp::Add, &counter, &step_value)
                .map_err(|kind| self.error(kind, body.span))?;
        }

        Ok(Flow::Normal(if collect {
            Value::list(results)
        } else {
            Value::Nothing
        }))
    }

    /// A FOR bound or step as a number
    fn loop_bound(&self, value: &Value, span: Span) -> InterpResult<f64> {
        value.as_float().ok_or_else(|| {
            self.error(
                RuntimeErrorKind::type_mismatch("FOR", value.type_name(), None),
                span,
            )
        })
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new(Environments::new(), Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use crate::parser::parse;

    fn run_with(interp: &mut Interpreter, source: &str) -> InterpResult<Value> {
        let tokens = tokenize(source, "<test>").expect("tokenize failed");
        let program = parse(tokens).expect("parse failed");
        interp.run(&program)
    }

    fn eval(source: &str) -> Value {
        run_with(&mut Interpreter::default(), source).expect("run failed")
    }

    fn eval_err(source: &str) -> RuntimeError {
        match run_with(&mut Interpreter::default(), source) {
            Ok(value) => panic!("expected runtime error, got {value}"),
            Err(e) => e,
        }
    }

    #[test]
    fn test_arithmetic_precedence() {
        assert_eq!(eval("(2 + 1) | (4 - 1)"), Value::Int(1));
        assert_eq!(eval("10 | 2 + (8 ^ 2) - 6"), Value::Int(63));
        assert_eq!(eval("((1 + 2) * 3 ^ 2) / 2").to_string(), "13.5");
    }

    #[test]
    fn test_short_circuit_skips_right() {
        // The right operand would fail if it were evaluated
        assert_eq!(eval("0 AND undefined_name"), Value::Int(0));
        assert_eq!(eval("\"yes\" OR 1 / 0"), Value::Str("yes".into()));
        assert_eq!(eval("1 AND 5"), Value::Int(5));
    }

    #[test]
    fn test_zero_dividend_is_fine() {
        assert_eq!(eval("0 / 5").to_string(), "0.0");
    }

    #[test]
    fn test_modulo_by_zero_uses_divisor_span() {
        let err = eval_err("7 % (2 - 2)");
        assert_eq!(err.kind, RuntimeErrorKind::ModuloByZero);
        assert_eq!(err.snippet(), "(2 - 2)");
    }

    #[test]
    fn test_if_forms() {
        assert_eq!(eval("IF 0 THEN 1 ELIF 0 THEN 2 ELSE 3"), Value::Int(3));
        assert_eq!(eval("IF 0 THEN 1"), Value::Nothing);
        assert_eq!(eval("IF 1 THEN\n  5\nEND"), Value::Nothing);
    }

    #[test]
    fn test_inline_for_collects_values() {
        assert_eq!(eval("FOR i = 0 TO 4 THEN i * 2").to_string(), "[0, 2, 4, 6]");
        assert_eq!(eval("FOR i = 3 TO 0 STEP -1 THEN i").to_string(), "[3, 2, 1]");
    }

    #[test]
    fn test_block_for_yields_nothing() {
        let mut interp = Interpreter::default();
        let value = run_with(
            &mut interp,
            "VAR total = 0\nFOR i = 1 TO 5 THEN\n  total = total + i\nEND",
        )
        .unwrap();
        assert_eq!(value, Value::Nothing);
        assert_eq!(interp.global("total"), Some(Value::Int(10)));
        assert_eq!(interp.global("i"), Some(Value::Int(4)));
    }

    #[test]
    fn test_break_and_continue() {
        let source = "VAR seen = []\n\
                      VAR i = 0\n\
                      WHILE i < 10 THEN\n  \
                        i = i + 1\n  \
                        IF i % 2 == 0 THEN CONTINUE\n  \
                        IF i > 7 THEN BREAK\n  \
                        APPEND(seen, i)\n\
                      END\n\
                      seen";
        assert_eq!(eval(source).to_string(), "[1, 3, 5, 7]");
    }

    #[test]
    fn test_return_absorbed_at_call() {
        let source = "FUN first_even(items)\n  \
                        FOR i = 0 TO LEN(items) THEN\n    \
                          IF items[i] % 2 == 0 THEN RETURN items[i]\n  \
                        END\n  \
                        RETURN -1\n\
                      END\n\
                      first_even([3, 5, 8, 10])";
        assert_eq!(eval(source), Value::Int(8));
    }

    #[test]
    fn test_block_function_without_return_yields_nothing() {
        assert_eq!(eval("FUN f()\n  1 + 1\nEND\nf()"), Value::Nothing);
        assert_eq!(eval("FUN g() -> 1 + 1\ng()"), Value::Int(2));
    }

    #[test]
    fn test_top_level_return_ends_program() {
        assert_eq!(eval("RETURN 4\n5"), Value::Int(4));
        assert_eq!(eval("BREAK\n5"), Value::Nothing);
    }

    #[test]
    fn test_closure_sees_later_updates() {
        let source = "VAR n = 1\nFUN get() -> n\nn = 2\nget()";
        assert_eq!(eval(source), Value::Int(2));
    }

    #[test]
    fn test_counter_closure_keeps_scope_alive() {
        let source = "FUN make()\n  \
                        VAR count = 0\n  \
                        RETURN FUN () -> count = count + 1\n\
                      END\n\
                      VAR c = make()\n\
                      c()\n\
                      c()\n\
                      c()";
        assert_eq!(eval(source), Value::Int(3));
    }

    #[test]
    fn test_call_scopes_are_released() {
        let mut interp = Interpreter::default();
        run_with(&mut interp, "FUN sq(x) -> x * x\nFOR i = 0 TO 50 THEN sq(i)").unwrap();
        assert_eq!(interp.environments().live(), 1);
    }

    #[test]
    fn test_dropped_closures_release_their_scopes() {
        let mut interp = Interpreter::default();
        let source = "FUN make() -> FUN () -> 1\nFOR i = 0 TO 1000 THEN\n  make()\nEND";
        run_with(&mut interp, source).unwrap();
        assert_eq!(interp.environments().live(), 1);

        // The inline form keeps every closure in its result list
        let kept = run_with(&mut interp, "FOR i = 0 TO 1000 THEN make()").unwrap();
        assert_eq!(interp.environments().live(), 1001);
        drop(kept);
        run_with(&mut interp, "0").unwrap();
        assert_eq!(interp.environments().live(), 1);
    }

    #[test]
    fn test_self_referencing_closure_is_collected() {
        let mut interp = Interpreter::default();
        let source = "FUN outer()\n  \
                        FUN inner() -> 1\n  \
                        RETURN inner()\n\
                      END\n\
                      FOR i = 0 TO 300 THEN\n  \
                        outer()\n\
                      END";
        run_with(&mut interp, source).unwrap();
        assert_eq!(interp.environments().live(), 1);
    }

    #[test]
    fn test_escaped_closure_keeps_scope_until_unbound() {
        let mut interp = Interpreter::default();
        let source = "FUN adder(n) -> FUN (x) -> x + n\nVAR add2 = adder(2)\nadd2(3)";
        assert_eq!(run_with(&mut interp, source).unwrap(), Value::Int(5));
        assert_eq!(interp.environments().live(), 2);

        run_with(&mut interp, "add2 = 0").unwrap();
        assert_eq!(interp.environments().live(), 1);
    }

    #[test]
    fn test_sweep_during_loop_keeps_pending_results() {
        let mut interp = Interpreter::default();
        let source = "FUN adder(n) -> FUN (x) -> x + n\n\
                      VAR fs = FOR i = 0 TO 600 THEN adder(i)\n\
                      (fs / 599)(1)";
        assert_eq!(run_with(&mut interp, source).unwrap(), Value::Int(600));
        assert_eq!(interp.environments().live(), 601);

        run_with(&mut interp, "fs = 0").unwrap();
        assert_eq!(interp.environments().live(), 1);
    }

    #[test]
    fn test_wrong_arg_count() {
        let err = eval_err("FUN add(a, b) -> a + b\nadd(1)");
        assert_eq!(
            err.kind,
            RuntimeErrorKind::WrongArgCount {
                name: "add".into(),
                expected: 2,
                actual: 1
            }
        );
        assert_eq!(err.snippet(), "add(1)");
    }

    #[test]
    fn test_calling_a_number() {
        let err = eval_err("VAR x = 3\nx(1)");
        assert_eq!(err.kind.name(), "TypeMismatch");
    }

    #[test]
    fn test_max_recursion_depth() {
        let mut interp = Interpreter::new(
            Environments::new(),
            Config {
                max_recursion_depth: 50,
            },
        );
        let err = run_with(&mut interp, "FUN down(n) -> down(n + 1)\ndown(0)").unwrap_err();
        assert_eq!(err.kind, RuntimeErrorKind::MaxRecursionDepth(50));
        assert_eq!(err.traceback.len(), 51);
        assert_eq!(err.traceback[0].context, "<program>");
    }

    #[test]
    fn test_undefined_variable_span() {
        let err = eval_err("VAR a = 1 + missing");
        assert_eq!(err.kind, RuntimeErrorKind::UndefinedVariable("missing".into()));
        assert_eq!(err.snippet(), "missing");
    }

    #[test]
    fn test_for_requires_numbers() {
        let err = eval_err("FOR i = \"a\" TO 3 THEN i");
        assert_eq!(err.kind.name(), "TypeMismatch");
        assert_eq!(err.snippet(), "\"a\"");
    }
}

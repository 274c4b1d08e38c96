//! Recursive-descent parser
//!
//! Precedence, lowest first: `AND`/`OR`, comparison (and prefix `NOT`),
//! `+ -`, `* / | %`, unary sign, `^`, call/index, atoms. `^` is right
//! associative and its right operand may carry a sign, so `2^-1` is
//! `2^(-1)`.

use crate::ast::{BinOp, Expr, Program, Source, Span, Spanned, UnOp};
use crate::error::SyntaxError;
use crate::lexer::{Keyword, Token, TokenKind, Tokens};
use std::rc::Rc;


type ParseResult<T> = Result<T, SyntaxError>;

/// Stack growth for deeply nested input
const STACK_RED_ZONE: usize = 128 * 1024;
const STACK_GROW_SIZE: usize = 4 * 1024 * 1024;

const EXPR_START: &str = "int, float, string, identifier, '+', '-', '(', '[', 'IF', 'FOR', 'WHILE', 'FUN'";

/// Parse tokens into AST
pub fn parse(tokens: Tokens) -> ParseResult<Program> {
    let mut parser = Parser::new(tokens);
    let program = parser.program()?;
    log::debug!(
        "parsed {} top-level statements from {}",
        program.statements.len(),
        program.source.name
    );
    Ok(program)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    file: Rc<Source>,
}

impl Parser {
    fn new(tokens: Tokens) -> Self {
        let Tokens { file, mut tokens } = tokens;
        if !matches!(tokens.last(), Some(t) if t.kind == TokenKind::Eof) {
            let end = tokens.last().map(|t| t.span.end).unwrap_or_default();
            tokens.push(Token::new(TokenKind::Eof, Span::empty_at(end)));
        }
        Parser {
            tokens,
            pos: 0,
            file,
        }
    }

    // ------------------------------------------------------------------
    // Token cursor
    // ------------------------------------------------------------------

    fn current(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self, offset: usize) -> &TokenKind {
        let idx = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[idx].kind
    }

    fn at(&self, kind: &TokenKind) -> bool {
        &self.current().kind == kind
    }

    fn at_keyword(&self, kw: Keyword) -> bool {
        self.current().kind.is_keyword(kw)
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    /// End of the last consumed token
    fn prev_end(&self) -> crate::ast::Position {
        if self.pos == 0 {
            self.current().span.start
        } else {
            self.tokens[self.pos - 1].span.end
        }
    }

    /// End of the last consumed token that is not a statement separator
    fn last_significant_end(&self) -> crate::ast::Position {
        self.tokens[..self.pos]
            .iter()
            .rev()
            .find(|t| t.kind != TokenKind::Newline)
            .map(|t| t.span.end)
            .unwrap_or_else(|| self.prev_end())
    }

    fn skip_newlines(&mut self) -> usize {
        let mut count = 0;
        while self.at(&TokenKind::Newline) {
            self.advance();
            count += 1;
        }
        count
    }

    /// Error at the current token. A missing token (current is a newline or
    /// the end of input) is reported just past the last consumed token.
    fn unexpected(&self, expected: impl Into<String>) -> SyntaxError {
        let token = self.current();
        let span = match token.kind {
            TokenKind::Newline | TokenKind::Eof => Span::empty_at(self.last_significant_end()),
            _ => token.span,
        };
        SyntaxError {
            expected: expected.into(),
            span,
            file: Rc::clone(&self.file),
        }
    }

    fn expect(&mut self, kind: TokenKind) -> ParseResult<Token> {
        if self.at(&kind) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(format!("expected '{kind}'")))
        }
    }

    fn expect_keyword(&mut self, kw: Keyword) -> ParseResult<Token> {
        if self.at_keyword(kw) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(format!("expected '{kw}'")))
        }
    }

    fn expect_identifier(&mut self) -> ParseResult<Spanned<String>> {
        match &self.current().kind {
            TokenKind::Identifier(name) => {
                let name = name.clone();
                let token = self.advance();
                Ok(Spanned::new(name, token.span))
            }
            _ => Err(self.unexpected("expected identifier")),
        }
    }

    fn spanned(&self, node: Expr, start: crate::ast::Position) -> Spanned<Expr> {
        Spanned::new(node, Span::new(start, self.prev_end()))
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn program(&mut self) -> ParseResult<Program> {
        let start = self.current().span.start;
        let statements = self.statements(&[])?;
        if !self.at(&TokenKind::Eof) {
            return Err(self.unexpected(
                "expected an operator or the end of the statement",
            ));
        }
        let end = self.current().span.end;
        Ok(Program {
            statements,
            span: Span::new(start, end),
            source: Rc::clone(&self.file),
        })
    }

    /// Newline-separated statements, stopping before any of `terminators`
    /// or the end of input.
    fn statements(&mut self, terminators: &[Keyword]) -> ParseResult<Vec<Spanned<Expr>>> {
        let mut statements = Vec::new();
        self.skip_newlines();

        loop {
            if self.at(&TokenKind::Eof) || terminators.iter().any(|kw| self.at_keyword(*kw)) {
                break;
            }
            statements.push(self.statement()?);
            if self.skip_newlines() == 0 {
                break;
            }
        }

        Ok(statements)
    }

    /// Block body: already past the NEWLINE that opens it, stops before the
    /// terminator keyword.
    fn block(&mut self, terminators: &[Keyword]) -> ParseResult<Spanned<Expr>> {
        let opened_at = self.prev_end();
        let statements = self.statements(terminators)?;
        if !terminators.iter().any(|kw| self.at_keyword(*kw)) {
            let names: Vec<String> = terminators.iter().map(|kw| format!("'{kw}'")).collect();
            return Err(self.unexpected(format!("expected {}", names.join(" or "))));
        }
        let span = match (statements.first(), statements.last()) {
            (Some(first), Some(last)) => first.span.merge(last.span),
            _ => Span::empty_at(opened_at),
        };
        Ok(Spanned::new(Expr::Block(statements), span))
    }

    fn statement(&mut self) -> ParseResult<Spanned<Expr>> {
        let start = self.current().span.start;

        if self.at_keyword(Keyword::Return) {
            self.advance();
            let value = if starts_expr(&self.current().kind) {
                Some(Box::new(self.expr()?))
            } else {
                None
            };
            return Ok(self.spanned(Expr::Return(value), start));
        }

        if self.at_keyword(Keyword::Continue) {
            self.advance();
            return Ok(self.spanned(Expr::Continue, start));
        }

        if self.at_keyword(Keyword::Break) {
            self.advance();
            return Ok(self.spanned(Expr::Break, start));
        }

        self.expr()
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    /// Recurse into `parse`, growing the stack when it runs low
    fn nested<T>(&mut self, parse: impl FnOnce(&mut Self) -> ParseResult<T>) -> ParseResult<T> {
        stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || parse(self))
    }

    fn expr(&mut self) -> ParseResult<Spanned<Expr>> {
        self.nested(Self::assignment)
    }

    fn assignment(&mut self) -> ParseResult<Spanned<Expr>> {
        let start = self.current().span.start;

        if self.at_keyword(Keyword::Var) {
            self.advance();
            let name = self.expect_identifier()?;
            self.expect(TokenKind::Eq)?;
            let value = self.expr()?;
            return Ok(self.spanned(
                Expr::VarAssign {
                    name: name.node,
                    value: Box::new(value),
                    declare: true,
                },
                start,
            ));
        }

        if matches!(self.current().kind, TokenKind::Identifier(_))
            && *self.peek_kind(1) == TokenKind::Eq
        {
            let name = self.expect_identifier()?;
            self.advance();
            let value = self.expr()?;
            return Ok(self.spanned(
                Expr::VarAssign {
                    name: name.node,
                    value: Box::new(value),
                    declare: false,
                },
                start,
            ));
        }

        let mut left = self.comparison()?;
        loop {
            let op = if self.at_keyword(Keyword::And) {
                BinOp::And
            } else if self.at_keyword(Keyword::Or) {
                BinOp::Or
            } else {
                break;
            };
            self.advance();
            let right = self.comparison()?;
            left = binary(left, op, right);
        }
        Ok(left)
    }

    fn comparison(&mut self) -> ParseResult<Spanned<Expr>> {
        if self.at_keyword(Keyword::Not) {
            let start = self.advance().span.start;
            let operand = self.nested(Self::comparison)?;
            return Ok(self.spanned(
                Expr::Unary {
                    op: UnOp::Not,
                    expr: Box::new(operand),
                },
                start,
            ));
        }

        let mut left = self.arith()?;
        loop {
            let op = match self.current().kind {
                TokenKind::EqEq => BinOp::Eq,
                TokenKind::NotEq => BinOp::Ne,
                TokenKind::Lt => BinOp::Lt,
                TokenKind::Gt => BinOp::Gt,
                TokenKind::LtEq => BinOp::Le,
                TokenKind::GtEq => BinOp::Ge,
                _ => break,
            };
            self.advance();
            let right = self.arith()?;
            left = binary(left, op, right);
        }
        Ok(left)
    }

    fn arith(&mut self) -> ParseResult<Spanned<Expr>> {
        let mut left = self.term()?;
        loop {
            let op = match self.current().kind {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.term()?;
            left = binary(left, op, right);
        }
        Ok(left)
    }

    fn term(&mut self) -> ParseResult<Spanned<Expr>> {
        let mut left = self.factor()?;
        loop {
            let op = match self.current().kind {
                TokenKind::Mul => BinOp::Mul,
                TokenKind::Div => BinOp::Div,
                TokenKind::IntDiv => BinOp::IntDiv,
                TokenKind::Mod => BinOp::Mod,
                _ => break,
            };
            self.advance();
            let right = self.factor()?;
            left = binary(left, op, right);
        }
        Ok(left)
    }

    fn factor(&mut self) -> ParseResult<Spanned<Expr>> {
        self.nested(Self::signed)
    }

    fn signed(&mut self) -> ParseResult<Spanned<Expr>> {
        let op = match self.current().kind {
            TokenKind::Plus => Some(UnOp::Pos),
            TokenKind::Minus => Some(UnOp::Neg),
            _ => None,
        };
        match op {
            Some(op) => {
                let start = self.advance().span.start;
                let operand = self.factor()?;
                Ok(self.spanned(
                    Expr::Unary {
                        op,
                        expr: Box::new(operand),
                    },
                    start,
                ))
            }
            None => self.power(),
        }
    }

    fn power(&mut self) -> ParseResult<Spanned<Expr>> {
        let base = self.call()?;
        if self.at(&TokenKind::Pow) {
            self.advance();
            let exponent = self.factor()?;
            return Ok(binary(base, BinOp::Pow, exponent));
        }
        Ok(base)
    }

    fn call(&mut self) -> ParseResult<Spanned<Expr>> {
        let start = self.current().span.start;
        let mut expr = self.atom()?;

        loop {
            if self.at(&TokenKind::LParen) {
                self.advance();
                let mut args = Vec::new();
                if !self.at(&TokenKind::RParen) {
                    args.push(self.expr()?);
                    while self.at(&TokenKind::Comma) {
                        self.advance();
                        args.push(self.expr()?);
                    }
                }
                if !self.at(&TokenKind::RParen) {
                    return Err(self.unexpected("expected ',' or ')'"));
                }
                self.advance();
                expr = self.spanned(
                    Expr::Call {
                        callee: Box::new(expr),
                        args,
                    },
                    start,
                );
            } else if self.at(&TokenKind::LSquare) {
                self.advance();
                let index = self.expr()?;
                self.expect(TokenKind::RSquare)?;
                expr = self.spanned(
                    Expr::Index {
                        target: Box::new(expr),
                        index: Box::new(index),
                    },
                    start,
                );
            } else {
                break;
            }
        }

        Ok(expr)
    }

    fn atom(&mut self) -> ParseResult<Spanned<Expr>> {
        let token = self.current().clone();
        match token.kind {
            TokenKind::Int(n) => {
                self.advance();
                Ok(Spanned::new(Expr::IntLit(n), token.span))
            }
            TokenKind::Float(x) => {
                self.advance();
                Ok(Spanned::new(Expr::FloatLit(x), token.span))
            }
            TokenKind::Str(s) => {
                self.advance();
                Ok(Spanned::new(Expr::StringLit(s), token.span))
            }
            TokenKind::Identifier(name) => {
                self.advance();
                Ok(Spanned::new(Expr::VarAccess(name), token.span))
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.expr()?;
                self.expect(TokenKind::RParen)?;
                // The parentheses belong to the node's span.
                Ok(Spanned::new(inner.node, Span::new(token.span.start, self.prev_end())))
            }
            TokenKind::LSquare => self.list_expr(),
            TokenKind::Keyword(Keyword::If) => self.if_expr(),
            TokenKind::Keyword(Keyword::For) => self.for_expr(),
            TokenKind::Keyword(Keyword::While) => self.while_expr(),
            TokenKind::Keyword(Keyword::Fun) => self.func_def(),
            _ => Err(self.unexpected(format!("expected {EXPR_START}"))),
        }
    }

    fn list_expr(&mut self) -> ParseResult<Spanned<Expr>> {
        let start = self.expect(TokenKind::LSquare)?.span.start;
        let mut elements = Vec::new();
        if !self.at(&TokenKind::RSquare) {
            elements.push(self.expr()?);
            while self.at(&TokenKind::Comma) {
                self.advance();
                elements.push(self.expr()?);
            }
        }
        if !self.at(&TokenKind::RSquare) {
            return Err(self.unexpected("expected ',' or ']'"));
        }
        self.advance();
        Ok(self.spanned(Expr::ListLit(elements), start))
    }

    fn if_expr(&mut self) -> ParseResult<Spanned<Expr>> {
        let start = self.expect_keyword(Keyword::If)?.span.start;
        let mut branches = Vec::new();
        let mut else_branch = None;

        loop {
            let cond = self.expr()?;
            self.expect_keyword(Keyword::Then)?;

            if self.at(&TokenKind::Newline) {
                let body = self.block(&[Keyword::End, Keyword::Elif, Keyword::Else])?;
                branches.push((cond, body));
                if self.at_keyword(Keyword::End) {
                    self.advance();
                    break;
                }
            } else {
                let body = self.statement()?;
                branches.push((cond, body));
            }

            if self.at_keyword(Keyword::Elif) {
                self.advance();
                continue;
            }
            if self.at_keyword(Keyword::Else) {
                self.advance();
                else_branch = Some(Box::new(self.else_body()?));
            }
            break;
        }

        Ok(self.spanned(
            Expr::If {
                branches,
                else_branch,
            },
            start,
        ))
    }

    fn else_body(&mut self) -> ParseResult<Spanned<Expr>> {
        if self.at(&TokenKind::Newline) {
            let body = self.block(&[Keyword::End])?;
            self.advance();
            Ok(body)
        } else {
            self.statement()
        }
    }

    /// Inline `statement` or `NEWLINE statements END`
    fn loop_body(&mut self) -> ParseResult<Spanned<Expr>> {
        if self.at(&TokenKind::Newline) {
            let body = self.block(&[Keyword::End])?;
            self.advance();
            Ok(body)
        } else {
            self.statement()
        }
    }

    fn for_expr(&mut self) -> ParseResult<Spanned<Expr>> {
        let start = self.expect_keyword(Keyword::For)?.span.start;
        let var = self.expect_identifier()?;
        self.expect(TokenKind::Eq)?;
        let from = self.expr()?;
        self.expect_keyword(Keyword::To)?;
        let to = self.expr()?;
        let step = if self.at_keyword(Keyword::Step) {
            self.advance();
            Some(Box::new(self.expr()?))
        } else {
            None
        };
        self.expect_keyword(Keyword::Then)?;
        let body = self.loop_body()?;

        Ok(self.spanned(
            Expr::For {
                var: var.node,
                start: Box::new(from),
                end: Box::new(to),
                step,
                body: Box::new(body),
            },
            start,
        ))
    }

    fn while_expr(&mut self) -> ParseResult<Spanned<Expr>> {
        let start = self.expect_keyword(Keyword::While)?.span.start;
        let cond = self.expr()?;
        self.expect_keyword(Keyword::Then)?;
        let body = self.loop_body()?;

        Ok(self.spanned(
            Expr::While {
                cond: Box::new(cond),
                body: Box::new(body),
            },
            start,
        ))
    }

    fn func_def(&mut self) -> ParseResult<Spanned<Expr>> {
        let start = self.expect_keyword(Keyword::Fun)?.span.start;

        let name = match &self.current().kind {
            TokenKind::Identifier(_) => Some(self.expect_identifier()?.node),
            TokenKind::LParen => None,
            _ => return Err(self.unexpected("expected identifier or '('")),
        };

        self.expect(TokenKind::LParen)?;
        let mut params = Vec::new();
        if !self.at(&TokenKind::RParen) {
            params.push(self.expect_identifier()?);
            while self.at(&TokenKind::Comma) {
                self.advance();
                params.push(self.expect_identifier()?);
            }
        }
        if !self.at(&TokenKind::RParen) {
            return Err(self.unexpected("expected ',' or ')'"));
        }
        self.advance();

        let body = if self.at(&TokenKind::Arrow) {
            self.advance();
            self.expr()?
        } else if self.at(&TokenKind::Newline) {
            let body = self.block(&[Keyword::End])?;
            self.advance();
            body
        } else {
            return Err(self.unexpected("expected '->' or newline"));
        };

        Ok(self.spanned(
            Expr::FuncDef {
                name,
                params,
                body: Rc::new(body),
            },
            start,
        ))
    }
}

fn binary(left: Spanned<Expr>, op: BinOp, right: Spanned<Expr>) -> Spanned<Expr> {
    let span = left.span.merge(right.span);
    Spanned::new(
        Expr::Binary {
            left: Box::new(left),
            op,
            right: Box::new(right),
        },
        span,
    )
}

fn starts_expr(kind: &TokenKind) -> bool {
    match kind {
        TokenKind::Int(_)
        | TokenKind::Float(_)
        | TokenKind::Str(_)
        | TokenKind::Identifier(_)
        | TokenKind::Plus
        | TokenKind::Minus
        | TokenKind::LParen
        | TokenKind::LSquare => true,
        TokenKind::Keyword(kw) => matches!(
            kw,
            Keyword::Var | Keyword::Not | Keyword::If | Keyword::For | Keyword::While | Keyword::Fun
        ),
        _ => false,
    }
}

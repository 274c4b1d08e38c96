//! Token definitions

use crate::ast::Span;
use logos::{Lexer, Logos};
use serde::Serialize;
use std::fmt;

/// Raw lexer failure reported by logos; `tokenize` turns it into a
/// positioned [`crate::error::LexError`].
#[derive(Debug, Clone, Default, PartialEq)]
pub enum RawLexError {
    #[default]
    Unrecognized,
    MultipleDecimalPoints,
    UnterminatedString,
    IntegerTooLarge,
}

/// Reserved words. Anything else matching the identifier pattern is an
/// identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Keyword {
    Var,
    And,
    Or,
    Not,
    If,
    Then,
    Elif,
    Else,
    For,
    To,
    Step,
    While,
    Fun,
    End,
    Return,
    Continue,
    Break,
}

impl Keyword {
    pub fn as_str(self) -> &'static str {
        match self {
            Keyword::Var => "VAR",
            Keyword::And => "AND",
            Keyword::Or => "OR",
            Keyword::Not => "NOT",
            Keyword::If => "IF",
            Keyword::Then => "THEN",
            Keyword::Elif => "ELIF",
            Keyword::Else => "ELSE",
            Keyword::For => "FOR",
            Keyword::To => "TO",
            Keyword::Step => "STEP",
            Keyword::While => "WHILE",
            Keyword::Fun => "FUN",
            Keyword::End => "END",
            Keyword::Return => "RETURN",
            Keyword::Continue => "CONTINUE",
            Keyword::Break => "BREAK",
        }
    }
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn parse_int(lex: &mut Lexer<TokenKind>) -> Result<i64, RawLexError> {
    lex.slice()
        .parse::<i64>()
        .map_err(|_| RawLexError::IntegerTooLarge)
}

fn parse_float(lex: &mut Lexer<TokenKind>) -> Result<f64, RawLexError> {
    let slice = lex.slice();
    if slice.matches('.').count() > 1 {
        return Err(RawLexError::MultipleDecimalPoints);
    }
    // "7." is a valid float literal
    slice
        .trim_end_matches('.')
        .parse::<f64>()
        .map_err(|_| RawLexError::MultipleDecimalPoints)
}

fn parse_string(lex: &mut Lexer<TokenKind>) -> String {
    let s = lex.slice();
    let inner = &s[1..s.len() - 1];
    let mut result = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => result.push('\n'),
                Some('t') => result.push('\t'),
                Some(other) => result.push(other),
                None => result.push('\\'),
            }
        } else {
            result.push(c);
        }
    }
    result
}

fn unterminated_string(_: &mut Lexer<TokenKind>) -> Result<String, RawLexError> {
    Err(RawLexError::UnterminatedString)
}

fn word(lex: &mut Lexer<TokenKind>) -> String {
    lex.slice().to_string()
}

/// SimpleScript token kind
#[derive(Logos, Debug, Clone, PartialEq, Serialize)]
#[logos(error = RawLexError)]
#[logos(skip r"[ \t\r]+")]
#[logos(skip r"#[^\n]*")]
pub enum TokenKind {
    // Literals
    #[regex(r"[0-9]+", parse_int)]
    Int(i64),

    // Anything with two or more dots is matched here too so that it is
    // reported as one malformed literal.
    #[regex(r"[0-9]+\.[0-9]*(\.[0-9]*)*", parse_float)]
    Float(f64),

    #[regex(r#""([^"\\]|\\.)*""#, parse_string)]
    #[regex(r#""([^"\\]|\\.)*\\?"#, unterminated_string)]
    Str(String),

    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", word)]
    Identifier(String),

    #[token("VAR", |_| Keyword::Var)]
    #[token("AND", |_| Keyword::And)]
    #[token("OR", |_| Keyword::Or)]
    #[token("NOT", |_| Keyword::Not)]
    #[token("IF", |_| Keyword::If)]
    #[token("THEN", |_| Keyword::Then)]
    #[token("ELIF", |_| Keyword::Elif)]
    #[token("ELSE", |_| Keyword::Else)]
    #[token("FOR", |_| Keyword::For)]
    #[token("TO", |_| Keyword::To)]
    #[token("STEP", |_| Keyword::Step)]
    #[token("WHILE", |_| Keyword::While)]
    #[token("FUN", |_| Keyword::Fun)]
    #[token("END", |_| Keyword::End)]
    #[token("RETURN", |_| Keyword::Return)]
    #[token("CONTINUE", |_| Keyword::Continue)]
    #[token("BREAK", |_| Keyword::Break)]
    Keyword(Keyword),

    // Operators
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Mul,
    #[token("/")]
    Div,
    #[token("|")]
    IntDiv,
    #[token("%")]
    Mod,
    #[token("^")]
    Pow,
    #[token("=")]
    Eq,
    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("<=")]
    LtEq,
    #[token(">=")]
    GtEq,
    #[token("->")]
    Arrow,

    // Punctuation
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LSquare,
    #[token("]")]
    RSquare,
    #[token(",")]
    Comma,
    #[token("\n")]
    #[token(";")]
    Newline,

    /// End of input, appended by `tokenize`
    Eof,
}

impl TokenKind {
    pub fn is_keyword(&self, kw: Keyword) -> bool {
        matches!(self, TokenKind::Keyword(k) if *k == kw)
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Int(n) => write!(f, "{n}"),
            TokenKind::Float(x) => write!(f, "{x:?}"),
            TokenKind::Str(s) => write!(f, "{s:?}"),
            TokenKind::Identifier(s) => write!(f, "{s}"),
            TokenKind::Keyword(kw) => write!(f, "{kw}"),
            TokenKind::Plus => write!(f, "+"),
            TokenKind::Minus => write!(f, "-"),
            TokenKind::Mul => write!(f, "*"),
            TokenKind::Div => write!(f, "/"),
            TokenKind::IntDiv => write!(f, "|"),
            TokenKind::Mod => write!(f, "%"),
            TokenKind::Pow => write!(f, "^"),
            TokenKind::Eq => write!(f, "="),
            TokenKind::EqEq => write!(f, "=="),
            TokenKind::NotEq => write!(f, "!="),
            TokenKind::Lt => write!(f, "<"),
            TokenKind::Gt => write!(f, ">"),
            TokenKind::LtEq => write!(f, "<="),
            TokenKind::GtEq => write!(f, ">="),
            TokenKind::Arrow => write!(f, "->"),
            TokenKind::LParen => write!(f, "("),
            TokenKind::RParen => write!(f, ")"),
            TokenKind::LSquare => write!(f, "["),
            TokenKind::RSquare => write!(f, "]"),
            TokenKind::Comma => write!(f, ","),
            TokenKind::Newline => write!(f, "newline"),
            TokenKind::Eof => write!(f, "end of input"),
        }
    }
}

/// A token and the source it was read from
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Self { kind, span }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex_all(source: &str) -> Vec<Result<TokenKind, RawLexError>> {
        TokenKind::lexer(source).collect()
    }

    #[test]
    fn test_keyword_spelling_lexes_back() {
        let keywords = [
            Keyword::Var,
            Keyword::Elif,
            Keyword::Step,
            Keyword::Fun,
            Keyword::Return,
            Keyword::Continue,
        ];
        for kw in keywords {
            assert_eq!(lex_all(kw.as_str()), vec![Ok(TokenKind::Keyword(kw))]);
        }
    }

    #[test]
    fn test_lex_keyword_vs_identifier() {
        assert_eq!(
            lex_all("VAR VARIABLE var"),
            vec![
                Ok(TokenKind::Keyword(Keyword::Var)),
                Ok(TokenKind::Identifier("VARIABLE".into())),
                Ok(TokenKind::Identifier("var".into())),
            ]
        );
    }

    #[test]
    fn test_lex_two_char_operators_are_greedy() {
        assert_eq!(
            lex_all("== != <= >= -> = < > -"),
            vec![
                Ok(TokenKind::EqEq),
                Ok(TokenKind::NotEq),
                Ok(TokenKind::LtEq),
                Ok(TokenKind::GtEq),
                Ok(TokenKind::Arrow),
                Ok(TokenKind::Eq),
                Ok(TokenKind::Lt),
                Ok(TokenKind::Gt),
                Ok(TokenKind::Minus),
            ]
        );
    }

    #[test]
    fn test_lex_float_forms() {
        assert_eq!(lex_all("1.5"), vec![Ok(TokenKind::Float(1.5))]);
        assert_eq!(lex_all("7."), vec![Ok(TokenKind::Float(7.0))]);
        assert_eq!(
            lex_all("1.2.3"),
            vec![Err(RawLexError::MultipleDecimalPoints)]
        );
    }

    #[test]
    fn test_lex_string_escapes() {
        assert_eq!(
            lex_all(r#""a\tb\n\"c\"\q""#),
            vec![Ok(TokenKind::Str("a\tb\n\"c\"q".into()))]
        );
    }

    #[test]
    fn test_lex_unterminated_string() {
        assert_eq!(
            lex_all(r#""abc"#),
            vec![Err(RawLexError::UnterminatedString)]
        );
    }

    #[test]
    fn test_lex_integer_too_large() {
        assert_eq!(
            lex_all("99999999999999999999"),
            vec![Err(RawLexError::IntegerTooLarge)]
        );
    }

    #[test]
    fn test_lex_comments_and_separators() {
        assert_eq!(
            lex_all("1 # ignored\n2; 3"),
            vec![
                Ok(TokenKind::Int(1)),
                Ok(TokenKind::Newline),
                Ok(TokenKind::Int(2)),
                Ok(TokenKind::Newline),
                Ok(TokenKind::Int(3)),
            ]
        );
    }

    #[test]
    fn test_token_display() {
        assert_eq!(TokenKind::IntDiv.to_string(), "|");
        assert_eq!(TokenKind::Keyword(Keyword::Elif).to_string(), "ELIF");
        assert_eq!(TokenKind::Eof.to_string(), "end of input");
        assert_eq!(TokenKind::Float(2.0).to_string(), "2.0");
    }
}

//! Lexer implementation using logos

mod token;

pub use token::{Keyword, RawLexError, Token, TokenKind};

use crate::ast::{Position, Source, Span};
use crate::error::{LexError, LexErrorKind};
use logos::Logos;
use std::rc::Rc;

/// Output of the lexer: the tokens of one source text, ending in `Eof`.
#[derive(Debug, Clone)]
pub struct Tokens {
    pub file: Rc<Source>,
    pub tokens: Vec<Token>,
}

impl Tokens {
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Token> {
        self.tokens.iter()
    }
}

/// Converts byte offsets into positions by stepping through the text one
/// character at a time. Offsets must be requested in increasing order.
struct Locator<'a> {
    text: &'a str,
    pos: Position,
}

impl<'a> Locator<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            pos: Position::default(),
        }
    }

    fn seek(&mut self, index: usize) -> Position {
        if index > self.pos.index {
            for ch in self.text[self.pos.index..index].chars() {
                self.pos = self.pos.advance(ch);
            }
        }
        self.pos
    }
}

/// Tokenize `text`, naming it `name` in positions and errors
pub fn tokenize(text: &str, name: &str) -> Result<Tokens, LexError> {
    tokenize_source(Rc::new(Source::new(name, text)))
}

/// Tokenize an already shared source
pub fn tokenize_source(file: Rc<Source>) -> Result<Tokens, LexError> {
    let text = file.text.as_str();
    let mut tokens = Vec::new();
    let mut locator = Locator::new(text);
    let mut lexer = TokenKind::lexer(text);

    while let Some(result) = lexer.next() {
        let range = lexer.span();
        let start = locator.seek(range.start);
        match result {
            Ok(kind) => {
                let end = locator.seek(range.end);
                tokens.push(Token::new(kind, Span::new(start, end)));
            }
            Err(raw) => {
                let (kind, end) = match raw {
                    RawLexError::Unrecognized => {
                        let ch = lexer.slice().chars().next().unwrap_or('\0');
                        (LexErrorKind::IllegalCharacter(ch), start.advance(ch))
                    }
                    RawLexError::MultipleDecimalPoints => {
                        (LexErrorKind::MultipleDecimalPoints, locator.seek(range.end))
                    }
                    RawLexError::UnterminatedString => {
                        (LexErrorKind::UnterminatedString, locator.seek(range.end))
                    }
                    RawLexError::IntegerTooLarge => {
                        (LexErrorKind::IntegerTooLarge, locator.seek(range.end))
                    }
                };
                log::debug!("lex error in {}: {kind}", file.name);
                return Err(LexError {
                    kind,
                    span: Span::new(start, end),
                    file: Rc::clone(&file),
                });
            }
        }
    }

    let eof = locator.seek(text.len());
    tokens.push(Token::new(TokenKind::Eof, Span::empty_at(eof)));
    log::debug!("lexed {} tokens from {}", tokens.len(), file.name);

    Ok(Tokens { file, tokens })
}

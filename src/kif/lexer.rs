//! Logos-based lexer for the KIF surface syntax.
//!
//! Fast tokenization using the logos crate. Atom characters are everything
//! except whitespace, parentheses, `;`, `?`, and `"`.

use logos::Logos;
use text_size::TextSize;

/// A token with its kind, text, and position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
    pub offset: TextSize,
}

/// Lexer wrapping the logos-generated tokenizer
pub struct Lexer<'a> {
    inner: logos::Lexer<'a, LogosToken>,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            inner: LogosToken::lexer(input),
        }
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let logos_token = self.inner.next()?;
        let text = self.inner.slice();
        let offset = TextSize::new(self.inner.span().start as u32);

        let kind = match logos_token {
            Ok(t) => t.into(),
            Err(()) => TokenKind::Error,
        };

        Some(Token { kind, text, offset })
    }
}

/// Tokenize an entire string into a Vec
pub fn tokenize(input: &str) -> Vec<Token<'_>> {
    Lexer::new(input).collect()
}

/// Token kinds the parser consumes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Whitespace,
    Comment,
    LParen,
    RParen,
    String,
    Var,
    Atom,
    Error,
}

impl TokenKind {
    /// Trivia is skipped by the parser
    pub fn is_trivia(self) -> bool {
        matches!(self, TokenKind::Whitespace | TokenKind::Comment)
    }
}

impl From<LogosToken> for TokenKind {
    fn from(t: LogosToken) -> Self {
        match t {
            LogosToken::Whitespace => TokenKind::Whitespace,
            LogosToken::Comment => TokenKind::Comment,
            LogosToken::LParen => TokenKind::LParen,
            LogosToken::RParen => TokenKind::RParen,
            LogosToken::String => TokenKind::String,
            LogosToken::Var => TokenKind::Var,
            LogosToken::Atom => TokenKind::Atom,
        }
    }
}

/// Logos token enum - maps to TokenKind
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogosToken {
    #[regex(r"[ \t\r\n\f]+")]
    Whitespace,

    /// `;` to end of line
    #[regex(r";[^\n]*")]
    Comment,

    #[token("(")]
    LParen,

    #[token(")")]
    RParen,

    /// Escape validation happens in the parser; the lexer only needs the
    /// closing quote to not be escaped.
    #[regex(r#""([^"\\]|\\.)*""#)]
    String,

    /// `?` followed by at least one atom character
    #[regex(r#"\?[^ \t\r\n\f();?"]+"#)]
    Var,

    #[regex(r#"[^ \t\r\n\f();?"]+"#)]
    Atom,
}

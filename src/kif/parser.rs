//! Recursive-descent parser for KIF.
//!
//! Consumes the token stream from [`super::lexer`] and builds [`Term`]
//! trees. The structure is a single pass over the tokens with an explicit
//! stack of open lists; there is no grammar beyond "atoms, variables, and
//! balanced lists", so no lookahead is needed.

use super::error::{ParseError, ParseErrorKind};
use super::lexer::{Lexer, TokenKind};
use super::term::Term;

/// Parse a KIF source string into its top-level terms.
///
/// Comments (`;` to end of line) and whitespace are skipped. Returns the
/// first error encountered; nothing is produced on failure.
pub fn parse_kif(input: &str) -> Result<Vec<Term>, ParseError> {
    let mut top = Vec::new();
    // Stack of open lists with the byte offset of their `(`.
    let mut stack: Vec<(Vec<Term>, usize)> = Vec::new();

    for token in Lexer::new(input) {
        let offset = u32::from(token.offset) as usize;
        if token.kind.is_trivia() {
            continue;
        }
        let term = match token.kind {
            TokenKind::LParen => {
                stack.push((Vec::new(), offset));
                continue;
            }
            TokenKind::RParen => {
                let Some((children, _)) = stack.pop() else {
                    return Err(ParseError::at_offset(
                        ParseErrorKind::UnmatchedClose,
                        input,
                        offset,
                    ));
                };
                Term::lst(children)
            }
            TokenKind::Atom => Term::atom(token.text),
            TokenKind::Var => Term::Var(token.text.into()),
            TokenKind::String => {
                let value = decode_string(token.text, input, offset)?;
                Term::quoted_atom(&value)
            }
            TokenKind::Error => {
                return Err(classify_error(token.text, input, offset));
            }
            TokenKind::Whitespace | TokenKind::Comment => unreachable!("trivia skipped above"),
        };

        match stack.last_mut() {
            Some((children, _)) => children.push(term),
            None => top.push(term),
        }
    }

    if let Some((_, open_offset)) = stack.last() {
        return Err(ParseError::at_offset(
            ParseErrorKind::UnexpectedEof("list"),
            input,
            *open_offset,
        ));
    }

    Ok(top)
}

/// Map a lexer error slice to a specific parse error.
fn classify_error(text: &str, input: &str, offset: usize) -> ParseError {
    let kind = if text.starts_with('"') {
        ParseErrorKind::UnterminatedString
    } else if text.starts_with('?') {
        ParseErrorKind::EmptyVariable
    } else {
        ParseErrorKind::UnexpectedChar(text.chars().next().unwrap_or('\u{fffd}'))
    };
    ParseError::at_offset(kind, input, offset)
}

/// Decode a quoted string token (including its surrounding quotes).
///
/// Recognized escapes: `\n \t \r \" \\`. Anything else is an error located
/// at the backslash.
fn decode_string(token: &str, input: &str, offset: usize) -> Result<String, ParseError> {
    let body = &token[1..token.len() - 1];
    let mut out = String::with_capacity(body.len());
    let mut chars = body.char_indices();
    while let Some((i, c)) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        // The lexer guarantees a character follows every backslash.
        let (_, escaped) = chars.next().expect("lexer rejects trailing backslash");
        match escaped {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            '"' => out.push('"'),
            '\\' => out.push('\\'),
            other => {
                return Err(ParseError::at_offset(
                    ParseErrorKind::MalformedEscape(other),
                    input,
                    offset + 1 + i,
                ));
            }
        }
    }
    Ok(out)
}

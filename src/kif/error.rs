//! Parse errors with source locations.
//!
//! Every error carries a 1-based line and column plus a rolling context
//! window of at most [`CONTEXT_CHARS`] characters ending at the offending
//! position, so callers can report useful diagnostics without holding on to
//! the input.

use thiserror::Error;

/// Width of the rolling context window attached to errors.
pub const CONTEXT_CHARS: usize = 50;

/// What went wrong while parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseErrorKind {
    #[error("malformed escape `\\{0}`")]
    MalformedEscape(char),

    #[error("unterminated string literal")]
    UnterminatedString,

    #[error("unmatched `)`")]
    UnmatchedClose,

    #[error("empty variable name")]
    EmptyVariable,

    #[error("unexpected end of input inside {0}")]
    UnexpectedEof(&'static str),

    #[error("unexpected character `{0}`")]
    UnexpectedChar(char),
}

/// A located parse error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} at line {line}, column {column} (near `{context}`)")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    /// 1-based line of the offending position.
    pub line: u32,
    /// 1-based column (in characters) of the offending position.
    pub column: u32,
    /// Up to [`CONTEXT_CHARS`] characters of input ending at the position.
    pub context: String,
}

impl ParseError {
    /// Build an error for a byte offset into `input`, deriving location and
    /// context.
    pub fn at_offset(kind: ParseErrorKind, input: &str, offset: usize) -> Self {
        let offset = offset.min(input.len());
        let before = &input[..offset];
        let line = before.bytes().filter(|&b| b == b'\n').count() as u32 + 1;
        let line_start = before.rfind('\n').map(|i| i + 1).unwrap_or(0);
        let column = before[line_start..].chars().count() as u32 + 1;

        // Include the offending character in the window when there is one.
        let end = input[offset..]
            .chars()
            .next()
            .map(|c| offset + c.len_utf8())
            .unwrap_or(offset);
        let window = &input[..end];
        let context: String = {
            let chars: Vec<char> = window.chars().collect();
            let start = chars.len().saturating_sub(CONTEXT_CHARS);
            chars[start..].iter().collect()
        };

        Self {
            kind,
            line,
            column,
            context,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_first_line() {
        let err = ParseError::at_offset(ParseErrorKind::UnmatchedClose, "(p a))", 5);
        assert_eq!(err.line, 1);
        assert_eq!(err.column, 6);
        assert_eq!(err.context, "(p a))");
    }

    #[test]
    fn test_location_after_newlines() {
        let input = "(p a)\n(q b)\n  )";
        let err = ParseError::at_offset(ParseErrorKind::UnmatchedClose, input, 14);
        assert_eq!(err.line, 3);
        assert_eq!(err.column, 3);
    }

    #[test]
    fn test_context_window_is_bounded() {
        let input = "x".repeat(200);
        let err = ParseError::at_offset(ParseErrorKind::UnexpectedChar('y'), &input, 180);
        assert_eq!(err.context.chars().count(), CONTEXT_CHARS);
    }

    #[test]
    fn test_display_mentions_location() {
        let err = ParseError::at_offset(ParseErrorKind::UnterminatedString, "\"oops", 0);
        let msg = err.to_string();
        assert!(msg.contains("unterminated string"));
        assert!(msg.contains("line 1"));
    }
}

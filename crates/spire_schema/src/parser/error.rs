//! Parser error types.

use crate::lexer::Token;
use spire_core::CompileError;

/// Syntax error at a byte offset in one fragment
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct SyntaxError {
    /// Byte offset into the fragment
    pub offset: usize,
    /// What went wrong
    pub message: String,
}

impl SyntaxError {
    /// Create a syntax error
    #[must_use]
    pub fn new(offset: usize, message: impl Into<String>) -> Self {
        Self {
            offset,
            message: message.into(),
        }
    }

    /// Expected one thing, found another (or end of input)
    #[must_use]
    pub fn expected(what: &str, found: Option<&Token>, offset: usize) -> Self {
        let message = match found {
            Some(token) => format!("expected {what}, found {token}"),
            None => format!("expected {what}, found end of input"),
        };
        Self::new(offset, message)
    }

    /// Resolve the offset against the fragment text
    #[must_use]
    pub fn into_compile_error(self, fragment: usize, source: &str) -> CompileError {
        let (line, column) = line_column(source, self.offset);
        CompileError::Parse {
            fragment,
            line,
            column,
            message: self.message,
        }
    }
}

/// 1-based line and column of a byte offset
#[must_use]
pub fn line_column(source: &str, offset: usize) -> (u32, u32) {
    let offset = offset.min(source.len());
    let before = &source[..offset];
    let line = before.matches('\n').count() + 1;
    let line_start = before.rfind('\n').map_or(0, |i| i + 1);
    let column = before[line_start..].chars().count() + 1;
    (line as u32, column as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_column() {
        let src = "type A {\n  id: ID!\n}";
        assert_eq!(line_column(src, 0), (1, 1));
        assert_eq!(line_column(src, 11), (2, 3));
        assert_eq!(line_column(src, 1000), (3, 2));
    }

    #[test]
    fn test_into_compile_error() {
        let err = SyntaxError::expected("':'", Some(&Token::Name("ID".into())), 11);
        let compiled = err.into_compile_error(2, "type A {\n  id ID!\n}");
        match compiled {
            CompileError::Parse {
                fragment,
                line,
                column,
                message,
            } => {
                assert_eq!((fragment, line, column), (2, 2, 3));
                assert_eq!(message, "expected ':', found 'ID'");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}

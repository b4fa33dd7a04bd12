//! Token stream wrapper for the hand-written parser.

use super::error::SyntaxError;
use crate::ast::Span;
use crate::lexer::Token;
use std::ops::Range;

/// Token stream with lookahead and source position tracking
pub struct TokenStream<'src> {
    tokens: Vec<(Token, Range<usize>)>,
    pos: usize,
    source: &'src str,
    fragment: usize,
}

impl<'src> TokenStream<'src> {
    /// Create a stream over already-lexed tokens
    #[must_use]
    pub fn new(tokens: Vec<(Token, Range<usize>)>, source: &'src str, fragment: usize) -> Self {
        Self {
            tokens,
            pos: 0,
            source,
            fragment,
        }
    }

    /// Peek at the current token
    #[must_use]
    pub fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    /// Peek `n` tokens ahead
    #[must_use]
    pub fn peek_nth(&self, n: usize) -> Option<&Token> {
        self.tokens.get(self.pos + n).map(|(t, _)| t)
    }

    /// Consume and return the current token
    pub fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(t, _)| t.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    /// Check the current token's kind
    #[must_use]
    pub fn check(&self, expected: &Token) -> bool {
        matches!(self.peek(), Some(t) if std::mem::discriminant(t) == std::mem::discriminant(expected))
    }

    /// Check for a contextual keyword
    #[must_use]
    pub fn check_keyword(&self, keyword: &str) -> bool {
        self.peek().is_some_and(|t| t.is_keyword(keyword))
    }

    /// Consume the token if it has the expected kind
    pub fn eat(&mut self, expected: &Token) -> bool {
        if self.check(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Require a token of the expected kind
    ///
    /// # Errors
    ///
    /// Returns error if the current token has another kind
    pub fn expect(&mut self, expected: &Token) -> Result<(), SyntaxError> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(self.error_expected(&expected.to_string()))
        }
    }

    /// Require a name token and return it
    ///
    /// # Errors
    ///
    /// Returns error if the current token is not a name
    pub fn expect_name(&mut self) -> Result<String, SyntaxError> {
        match self.peek() {
            Some(Token::Name(name)) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.error_expected("a name")),
        }
    }

    /// Require a specific contextual keyword
    ///
    /// # Errors
    ///
    /// Returns error if the keyword is absent
    pub fn expect_keyword(&mut self, keyword: &str) -> Result<(), SyntaxError> {
        if self.check_keyword(keyword) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error_expected(&format!("'{keyword}'")))
        }
    }

    /// Check if the stream is exhausted
    #[must_use]
    pub fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    /// Byte offset of the current token, or end of source
    #[must_use]
    pub fn offset(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map_or(self.source.len(), |(_, range)| range.start)
    }

    /// Span of the current token
    #[must_use]
    pub fn span(&self) -> Span {
        let (line, column) = super::error::line_column(self.source, self.offset());
        Span::new(self.fragment, line, column)
    }

    /// Build an "expected X" error at the current token
    #[must_use]
    pub fn error_expected(&self, what: &str) -> SyntaxError {
        SyntaxError::expected(what, self.peek(), self.offset())
    }

    /// Build an arbitrary error at the current token
    #[must_use]
    pub fn error(&self, message: impl Into<String>) -> SyntaxError {
        SyntaxError::new(self.offset(), message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logos::Logos;

    fn stream(src: &str) -> TokenStream<'_> {
        let tokens = Token::lexer(src)
            .spanned()
            .map(|(t, r)| (t.unwrap(), r))
            .collect();
        TokenStream::new(tokens, src, 0)
    }

    #[test]
    fn test_peek_and_advance() {
        let mut s = stream("type Todo");
        assert!(s.check_keyword("type"));
        assert_eq!(s.peek_nth(1), Some(&Token::Name("Todo".into())));
        s.advance();
        assert_eq!(s.expect_name().unwrap(), "Todo");
        assert!(s.at_end());
    }

    #[test]
    fn test_expect_reports_position() {
        let mut s = stream("a\n  b");
        s.advance();
        let err = s.expect(&Token::Colon).unwrap_err();
        assert_eq!(err.offset, 4);
        assert_eq!(s.span(), Span::new(0, 2, 3));
    }
}

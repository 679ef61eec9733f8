use crate::diagnostics::ErrorCode;
use crate::lexer::{Lexer, Token, TokenKind};

/// A structured parse failure. Raised by grammar productions and caught by the
/// parser's fill driver, which records it and resynchronizes.
#[derive(Debug, Clone)]
pub struct ParseFault {
    pub token: Option<Token>,
    pub code: ErrorCode,
    pub message: String,
}

impl ParseFault {
    pub fn new(token: Option<Token>, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            token,
            code,
            message: message.into(),
        }
    }
}

pub type ParseResult<T> = Result<T, ParseFault>;

/// One-token lookahead over the lexer, skipping whitespace and comments.
pub struct TokenCursor<'a> {
    lexer: Lexer<'a>,
    peeked: Option<Token>,
    previous: Option<Token>,
}

impl<'a> TokenCursor<'a> {
    pub fn new(lexer: Lexer<'a>) -> Self {
        Self {
            lexer,
            peeked: None,
            previous: None,
        }
    }

    pub fn peek(&mut self) -> Option<&Token> {
        if self.peeked.is_none() {
            self.peeked = self
                .lexer
                .by_ref()
                .find(|t| !matches!(t.kind, TokenKind::Whitespace | TokenKind::Comment));
        }
        self.peeked.as_ref()
    }

    /// Advances past the peeked token, remembering it as `previous`.
    pub fn consume(&mut self) -> Option<Token> {
        self.peek();
        let token = self.peeked.take();
        if token.is_some() {
            self.previous.clone_from(&token);
        }
        token
    }

    /// The peeked token, or an "unexpected end of input" fault.
    pub fn read(&mut self) -> ParseResult<&Token> {
        let previous = self.previous.clone();
        self.peek()
            .ok_or_else(|| ParseFault::new(previous, ErrorCode::UnexpectedEof, "unexpected end of input"))
    }

    /// The last consumed token, used to anchor after-the-fact diagnostics.
    pub fn previous(&self) -> Option<&Token> {
        self.previous.as_ref()
    }

    pub fn is_eof(&mut self) -> bool {
        self.peek().is_none()
    }

    /// The index of the next token, or `usize::MAX` when exhausted. Used to detect
    /// a production that neither consumed nor rejected anything.
    pub fn position(&mut self) -> usize {
        self.peek().map_or(usize::MAX, |t| t.index)
    }

    pub fn is(&mut self, text: &str) -> bool {
        self.peek().is_some_and(|t| t.is(text))
    }

    pub fn consume_if(&mut self, text: &str) -> bool {
        if self.is(text) {
            self.consume();
            true
        } else {
            false
        }
    }

    /// Consumes the peeked token if it has the given text, else faults.
    pub fn expect(&mut self, text: &str) -> ParseResult<Token> {
        let token = self.read()?.clone();
        if token.is(text) {
            self.consume();
            Ok(token)
        } else {
            Err(ParseFault::new(
                Some(token.clone()),
                ErrorCode::Syntax,
                format!("expected '{}', found {}", text, token),
            ))
        }
    }

    /// Consumes an identifier-class token, else faults.
    pub fn expect_identifier(&mut self, what: &str) -> ParseResult<Token> {
        let token = self.read()?.clone();
        if token.kind == TokenKind::AlphaNumeric {
            self.consume();
            Ok(token)
        } else {
            Err(ParseFault::new(
                Some(token.clone()),
                ErrorCode::Syntax,
                format!("expected {}, found {}", what, token),
            ))
        }
    }

    /// Statement-level resynchronization: skip past the next `;` at the current
    /// nesting depth, stopping (without consuming) at an unbalanced `}`.
    pub fn skip_to_statement_end(&mut self) {
        let mut depth = 0usize;
        while let Some(token) = self.peek() {
            if token.is("}") {
                if depth == 0 {
                    return;
                }
                depth -= 1;
            } else if token.is("{") {
                depth += 1;
            } else if token.is(";") && depth == 0 {
                self.consume();
                return;
            }
            self.consume();
        }
    }

    /// Object-level resynchronization: skip past the `}` that closes the object
    /// being read, or past a bare `;` if no block was ever opened.
    pub fn skip_to_object_end(&mut self) {
        let mut depth = 0usize;
        while let Some(token) = self.consume() {
            if token.is("{") {
                depth += 1;
            } else if token.is("}") {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return;
                }
            } else if token.is(";") && depth == 0 {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cursor(input: &str) -> TokenCursor<'_> {
        TokenCursor::new(Lexer::new(input, "test.proto"))
    }

    #[test]
    fn test_peek_does_not_consume() {
        let mut c = cursor("a b");
        assert!(c.is("a"));
        assert!(c.is("a"));
        assert_eq!(c.consume().map(|t| t.value), Some("a".to_string()));
        assert_eq!(c.previous().map(|t| t.value.as_str()), Some("a"));
        assert!(c.is("b"));
    }

    #[test]
    fn test_comments_and_whitespace_are_skipped() {
        let mut c = cursor("a // note\n /* x */ b");
        c.consume();
        assert!(c.is("b"));
    }

    #[test]
    fn test_read_at_eof_faults() {
        let mut c = cursor("last");
        c.consume();
        let fault = c.read().unwrap_err();
        assert_eq!(fault.code, ErrorCode::UnexpectedEof);
        assert_eq!(fault.token.map(|t| t.value), Some("last".to_string()));
        assert_eq!(c.position(), usize::MAX);
    }

    #[test]
    fn test_skip_to_statement_end() {
        let mut c = cursor("int32 x = { 1; } ; next");
        c.skip_to_statement_end();
        assert!(c.is("next"));
    }

    #[test]
    fn test_skip_to_statement_end_stops_at_closing_brace() {
        let mut c = cursor("garbage here } after");
        c.skip_to_statement_end();
        assert!(c.is("}"));
    }

    #[test]
    fn test_skip_to_object_end() {
        let mut c = cursor("Foo { a { b } c } next");
        c.skip_to_object_end();
        assert!(c.is("next"));
    }
}

//! Token stream wrapper for the hand-written parser.

use ember_ast::Span;
use ember_lexer::{Token, TokenKind};

/// Token stream with one token of lookahead and span tracking.
pub struct TokenStream<'src> {
    tokens: &'src [Token],
    pos: usize,
}

impl<'src> TokenStream<'src> {
    pub fn new(tokens: &'src [Token]) -> Self {
        Self { tokens, pos: 0 }
    }

    /// Peek at the current token without consuming it.
    pub fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    /// Peek at the current token kind without consuming it.
    pub fn peek_kind(&self) -> Option<&TokenKind> {
        self.tokens.get(self.pos).map(|t| &t.kind)
    }

    /// Advance to the next token and return the consumed one.
    pub fn advance(&mut self) -> Option<&Token> {
        let token = self.tokens.get(self.pos);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    /// Check if the current token matches the expected kind.
    ///
    /// Matches on the variant, ignoring any payload (an `Ident` check matches
    /// any identifier).
    pub fn check(&self, expected: &TokenKind) -> bool {
        matches!(self.peek_kind(), Some(k) if std::mem::discriminant(k) == std::mem::discriminant(expected))
    }

    /// Consume the current token if it matches the expected kind.
    pub fn eat(&mut self, expected: &TokenKind) -> bool {
        if self.check(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    /// Current position in the token stream.
    pub fn current_pos(&self) -> usize {
        self.pos
    }

    /// Span from a starting token position to the last consumed token.
    pub fn span_from(&self, start: usize) -> Span {
        let start_span = match self.tokens.get(start) {
            Some(token) => token.span,
            None => return self.current_span(),
        };
        let end_span = if self.pos > start {
            self.tokens
                .get(self.pos - 1)
                .map(|t| t.span)
                .unwrap_or(start_span)
        } else {
            start_span
        };
        start_span.merge(&end_span)
    }

    /// Span of the current token, or a zero-length span at the end of the
    /// last token once the stream is exhausted.
    pub fn current_span(&self) -> Span {
        if let Some(token) = self.tokens.get(self.pos) {
            token.span
        } else if let Some(last) = self.tokens.last() {
            Span::new(last.span.end, last.span.end)
        } else {
            Span::zero()
        }
    }
}

//! Expression parsing - Pratt core plus assignment, unary, and postfix calls.

use crate::Parser;
use ember_ast::{BinaryOp, Expr, ExprKind, UnaryOp};
use ember_lexer::TokenKind;

/// Get binary operator metadata (precedence and operator enum).
///
/// Higher precedence binds tighter; every binary operator is left
/// associative. This is the single source of truth for binary operator
/// parsing.
fn binary_op_info(kind: &TokenKind) -> Option<(u8, BinaryOp)> {
    match kind {
        TokenKind::OrOr => Some((10, BinaryOp::Or)),
        TokenKind::AndAnd => Some((20, BinaryOp::And)),
        TokenKind::EqEq => Some((30, BinaryOp::Eq)),
        TokenKind::BangEq => Some((30, BinaryOp::Ne)),
        TokenKind::Lt => Some((40, BinaryOp::Lt)),
        TokenKind::LtEq => Some((40, BinaryOp::Le)),
        TokenKind::Gt => Some((40, BinaryOp::Gt)),
        TokenKind::GtEq => Some((40, BinaryOp::Ge)),
        TokenKind::Plus => Some((50, BinaryOp::Add)),
        TokenKind::Minus => Some((50, BinaryOp::Sub)),
        TokenKind::Star => Some((60, BinaryOp::Mul)),
        TokenKind::Slash => Some((60, BinaryOp::Div)),
        TokenKind::Percent => Some((60, BinaryOp::Mod)),
        _ => None,
    }
}

impl Parser<'_> {
    /// Parse an expression. Assignment is the lowest precedence level and
    /// right associative; its target must be a bare identifier.
    pub(crate) fn parse_expr(&mut self) -> Expr {
        let start = self.stream.current_pos();
        let left = self.parse_pratt(0);

        if self.stream.check(&TokenKind::Assign) {
            self.stream.advance();
            let value = self.parse_expr();
            let span = self.stream.span_from(start);
            return match left.kind {
                ExprKind::Identifier(target) => Expr::new(
                    ExprKind::Assign {
                        target,
                        value: Box::new(value),
                    },
                    span,
                ),
                _ => {
                    self.error("invalid assignment target", left.span);
                    Expr::new(ExprKind::Error, span)
                }
            };
        }

        left
    }

    /// Pratt parser - binary operators with precedence climbing.
    fn parse_pratt(&mut self, min_prec: u8) -> Expr {
        let start = self.stream.current_pos();
        let mut left = self.parse_unary();

        while let Some(kind) = self.stream.peek_kind() {
            let Some((prec, op)) = binary_op_info(kind) else {
                break;
            };
            if prec < min_prec {
                break;
            }

            self.stream.advance();
            let right = self.parse_pratt(prec + 1);
            let span = self.stream.span_from(start);
            left = Expr::new(
                ExprKind::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                span,
            );
        }

        left
    }

    /// Parse prefix operators `!` and `-`.
    fn parse_unary(&mut self) -> Expr {
        let start = self.stream.current_pos();
        let op = match self.stream.peek_kind() {
            Some(TokenKind::Minus) => Some(UnaryOp::Neg),
            Some(TokenKind::Bang) => Some(UnaryOp::Not),
            _ => None,
        };

        if let Some(op) = op {
            self.stream.advance();
            let operand = self.parse_unary();
            let span = self.stream.span_from(start);
            return Expr::new(
                ExprKind::Unary {
                    op,
                    operand: Box::new(operand),
                },
                span,
            );
        }

        self.parse_postfix()
    }

    /// Parse postfix call expressions: `callee(args)`.
    fn parse_postfix(&mut self) -> Expr {
        let start = self.stream.current_pos();
        let mut expr = self.parse_primary();

        while self.stream.check(&TokenKind::LParen) {
            let args = self.parse_call_args();
            let span = self.stream.span_from(start);
            expr = Expr::new(
                ExprKind::Call {
                    callee: Box::new(expr),
                    args,
                },
                span,
            );
        }

        expr
    }

    /// Parse atomic expressions: literals, identifiers, grouping, and
    /// `call name(args)` native invocations.
    fn parse_primary(&mut self) -> Expr {
        let start = self.stream.current_pos();

        match self.stream.peek_kind().cloned() {
            Some(TokenKind::Number(value)) => {
                self.stream.advance();
                Expr::new(ExprKind::Number(value), self.stream.span_from(start))
            }
            Some(TokenKind::Str(value)) => {
                self.stream.advance();
                Expr::new(ExprKind::Str(value), self.stream.span_from(start))
            }
            Some(TokenKind::True) => {
                self.stream.advance();
                Expr::new(ExprKind::Bool(true), self.stream.span_from(start))
            }
            Some(TokenKind::False) => {
                self.stream.advance();
                Expr::new(ExprKind::Bool(false), self.stream.span_from(start))
            }
            Some(TokenKind::Null) => {
                self.stream.advance();
                Expr::new(ExprKind::Null, self.stream.span_from(start))
            }
            Some(TokenKind::Ident(name)) => {
                self.stream.advance();
                Expr::new(ExprKind::Identifier(name), self.stream.span_from(start))
            }
            Some(TokenKind::LParen) => {
                self.stream.advance();
                let inner = self.parse_expr();
                self.expect(&TokenKind::RParen, "to close grouping");
                Expr::new(
                    ExprKind::Grouping(Box::new(inner)),
                    self.stream.span_from(start),
                )
            }
            Some(TokenKind::Call) => self.parse_native_call(),
            other => {
                let span = self.stream.current_span();
                match other {
                    Some(kind) => {
                        self.error(format!("expected expression, found '{}'", kind), span);
                        self.stream.advance();
                    }
                    None => self.error("expected expression, found end of input", span),
                }
                Expr::new(ExprKind::Error, span)
            }
        }
    }

    /// Parse `call name(args)`.
    fn parse_native_call(&mut self) -> Expr {
        let start = self.stream.current_pos();
        self.stream.advance(); // `call`

        let name = match self.stream.peek_kind().cloned() {
            Some(TokenKind::Ident(name)) => {
                self.stream.advance();
                name
            }
            _ => {
                self.error("expected native name after 'call'", self.stream.current_span());
                return Expr::new(ExprKind::Error, self.stream.span_from(start));
            }
        };

        let args = self.parse_call_args();
        Expr::new(
            ExprKind::NativeCall { name, args },
            self.stream.span_from(start),
        )
    }

    /// Parse a parenthesized, comma-separated argument list.
    fn parse_call_args(&mut self) -> Vec<Expr> {
        let mut args = Vec::new();
        if self.expect(&TokenKind::LParen, "to open argument list").is_none() {
            return args;
        }

        while !self.stream.check(&TokenKind::RParen) && !self.stream.at_end() {
            args.push(self.parse_expr());
            if !self.stream.check(&TokenKind::RParen) && !self.stream.eat(&TokenKind::Comma) {
                break;
            }
        }

        self.expect(&TokenKind::RParen, "to close argument list");
        args
    }
}

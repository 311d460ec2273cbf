//! Error-tolerant recursive-descent parser.
//!
//! The parser never aborts on bad input. Each syntax problem is recorded as a
//! [`Diagnostic`], the offending region is replaced with an
//! [`ExprKind::Error`](ember_ast::ExprKind::Error) node or skipped to the next
//! statement boundary, and parsing continues so a single pass reports every
//! error in the source.

mod expr;
mod stmt;
mod stream;

use ember_ast::{Diagnostic, Program, Span};
use ember_lexer::{Token, TokenKind};
use stream::TokenStream;

pub struct Parser<'src> {
    stream: TokenStream<'src>,
    diagnostics: Vec<Diagnostic>,
    /// Block nesting level. Zero means top level, where `let` binds a global.
    depth: usize,
}

/// Parse a token stream into a [`Program`]. Always produces a program;
/// inspect the diagnostics for errors before compiling it.
pub fn parse(tokens: &[Token]) -> (Program, Vec<Diagnostic>) {
    Parser::new(tokens).run()
}

/// Lex and parse in one step, merging lexer and parser diagnostics in
/// source order.
pub fn parse_source(source: &str) -> (Program, Vec<Diagnostic>) {
    let (tokens, mut diagnostics) = ember_lexer::lex(source);
    let (program, parse_diagnostics) = parse(&tokens);
    diagnostics.extend(parse_diagnostics);
    diagnostics.sort_by_key(|d| (d.span.start.index, d.span.end.index));
    (program, diagnostics)
}

impl<'src> Parser<'src> {
    fn new(tokens: &'src [Token]) -> Self {
        Self {
            stream: TokenStream::new(tokens),
            diagnostics: Vec::new(),
            depth: 0,
        }
    }

    fn run(mut self) -> (Program, Vec<Diagnostic>) {
        let start = self.stream.current_pos();
        let mut statements = Vec::new();
        while !self.stream.at_end() {
            match self.parse_statement() {
                Some(stmt) => statements.push(stmt),
                None => self.synchronize(),
            }
        }
        let span = self.stream.span_from(start);
        (Program { statements, span }, self.diagnostics)
    }

    pub(crate) fn error(&mut self, message: impl Into<String>, span: Span) {
        self.diagnostics.push(Diagnostic::error(message, span));
    }

    /// Require the next token to be `expected`. On mismatch, record a
    /// diagnostic and leave the stream untouched.
    pub(crate) fn expect(&mut self, expected: &TokenKind, context: &str) -> Option<Span> {
        if self.stream.check(expected) {
            let span = self.stream.current_span();
            self.stream.advance();
            return Some(span);
        }
        let found = match self.stream.peek() {
            Some(token) => format!("'{}'", token.kind),
            None => "end of input".to_string(),
        };
        self.error(
            format!("expected '{expected}' {context}, found {found}"),
            self.stream.current_span(),
        );
        None
    }

    /// Require an identifier and return its name.
    pub(crate) fn expect_ident(&mut self, context: &str) -> Option<String> {
        if let Some(TokenKind::Ident(name)) = self.stream.peek_kind() {
            let name = name.clone();
            self.stream.advance();
            return Some(name);
        }
        let found = match self.stream.peek() {
            Some(token) => format!("'{}'", token.kind),
            None => "end of input".to_string(),
        };
        self.error(
            format!("expected identifier {context}, found {found}"),
            self.stream.current_span(),
        );
        None
    }

    /// Require a terminating `;`. Missing semicolons are reported but the
    /// statement built so far is kept.
    pub(crate) fn expect_semicolon(&mut self) {
        self.expect(&TokenKind::Semicolon, "to end statement");
    }

    /// Skip tokens until a likely statement boundary. Consumes a stray `;`
    /// so recovery makes progress.
    pub(crate) fn synchronize(&mut self) {
        while let Some(kind) = self.stream.peek_kind() {
            match kind {
                TokenKind::Semicolon => {
                    self.stream.advance();
                    return;
                }
                TokenKind::Let
                | TokenKind::Fn
                | TokenKind::Return
                | TokenKind::If
                | TokenKind::While
                | TokenKind::Schedule
                | TokenKind::RBrace => return,
                _ => {
                    self.stream.advance();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_ast::{BinaryOp, ExprKind, StmtKind};

    fn parse_ok(source: &str) -> Program {
        let (program, diagnostics) = parse_source(source);
        assert!(diagnostics.is_empty(), "unexpected diagnostics: {diagnostics:?}");
        program
    }

    #[test]
    fn top_level_let_is_global() {
        let program = parse_ok("let hp = 10;");
        match &program.statements[0].kind {
            StmtKind::Let { name, global, init } => {
                assert_eq!(name, "hp");
                assert!(*global);
                assert!(init.is_some());
            }
            other => panic!("expected let, got {other:?}"),
        }
    }

    #[test]
    fn let_inside_function_is_local() {
        let program = parse_ok("fn helper() { let x = 1; }");
        let StmtKind::Function(decl) = &program.statements[0].kind else {
            panic!("expected function");
        };
        let StmtKind::Let { global, .. } = &decl.body[0].kind else {
            panic!("expected let");
        };
        assert!(!global);
    }

    #[test]
    fn on_init_and_on_tick_are_tagged() {
        let program = parse_ok("fn onInit(seed) {} fn onTick(frame, dt) {}");
        assert!(matches!(program.statements[0].kind, StmtKind::OnInit(_)));
        assert!(matches!(program.statements[1].kind, StmtKind::OnTick(_)));
        let StmtKind::OnTick(decl) = &program.statements[1].kind else {
            unreachable!();
        };
        assert_eq!(decl.params.len(), 2);
        assert_eq!(decl.params[0].name, "frame");
    }

    #[test]
    fn precedence_mul_over_add() {
        let program = parse_ok("1 + 2 * 3;");
        let StmtKind::Expression(expr) = &program.statements[0].kind else {
            panic!("expected expression statement");
        };
        let ExprKind::Binary { op, right, .. } = &expr.kind else {
            panic!("expected binary");
        };
        assert_eq!(*op, BinaryOp::Add);
        assert!(matches!(
            right.kind,
            ExprKind::Binary {
                op: BinaryOp::Mul,
                ..
            }
        ));
    }

    #[test]
    fn logical_or_binds_loosest() {
        let program = parse_ok("a == 1 || b < 2 && c;");
        let StmtKind::Expression(expr) = &program.statements[0].kind else {
            panic!("expected expression statement");
        };
        assert!(matches!(
            expr.kind,
            ExprKind::Binary {
                op: BinaryOp::Or,
                ..
            }
        ));
    }

    #[test]
    fn assignment_is_right_associative() {
        let program = parse_ok("a = b = 3;");
        let StmtKind::Expression(expr) = &program.statements[0].kind else {
            panic!("expected expression statement");
        };
        let ExprKind::Assign { target, value } = &expr.kind else {
            panic!("expected assignment");
        };
        assert_eq!(target, "a");
        assert!(matches!(value.kind, ExprKind::Assign { .. }));
    }

    #[test]
    fn invalid_assignment_target_recovers() {
        let (program, diagnostics) = parse_source("1 = 2;");
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].message.contains("invalid assignment target"));
        // The statement is still present, carrying an error node.
        assert_eq!(program.statements.len(), 1);
    }

    #[test]
    fn native_call_syntax() {
        let program = parse_ok("call ignite(x, y);");
        let StmtKind::Expression(expr) = &program.statements[0].kind else {
            panic!("expected expression statement");
        };
        let ExprKind::NativeCall { name, args } = &expr.kind else {
            panic!("expected native call, got {:?}", expr.kind);
        };
        assert_eq!(name, "ignite");
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn schedule_statement() {
        let program = parse_ok("schedule(30, \"spawn\");");
        let StmtKind::Schedule { delay, task } = &program.statements[0].kind else {
            panic!("expected schedule");
        };
        assert!(matches!(delay.kind, ExprKind::Number(n) if n == 30.0));
        assert!(matches!(task.kind, ExprKind::Str(_)));
    }

    #[test]
    fn if_else_and_while() {
        let program = parse_ok("if (x > 0) { x = x - 1; } else { x = 0; } while (x) x = 0;");
        assert!(matches!(program.statements[0].kind, StmtKind::If { .. }));
        assert!(matches!(program.statements[1].kind, StmtKind::While { .. }));
        let StmtKind::If { alternate, .. } = &program.statements[0].kind else {
            unreachable!();
        };
        assert!(alternate.is_some());
    }

    #[test]
    fn recovery_reports_multiple_errors() {
        let source = "let = 1; let ok = 2; fn (x) {} let also = 3;";
        let (program, diagnostics) = parse_source(source);
        assert!(diagnostics.len() >= 2, "got {diagnostics:?}");
        // Both well-formed statements survive recovery.
        let lets = program
            .statements
            .iter()
            .filter(|s| matches!(s.kind, StmtKind::Let { .. }))
            .count();
        assert_eq!(lets, 2);
    }

    #[test]
    fn missing_expression_yields_error_node() {
        let (program, diagnostics) = parse_source("let x = ;");
        assert!(!diagnostics.is_empty());
        let StmtKind::Let { init, .. } = &program.statements[0].kind else {
            panic!("expected let");
        };
        assert!(matches!(init.as_ref().unwrap().kind, ExprKind::Error));
    }

    #[test]
    fn return_with_and_without_value() {
        let program = parse_ok("fn f() { return 1; } fn g() { return; }");
        let StmtKind::Function(f) = &program.statements[0].kind else {
            panic!();
        };
        assert!(matches!(f.body[0].kind, StmtKind::Return(Some(_))));
        let StmtKind::Function(g) = &program.statements[1].kind else {
            panic!();
        };
        assert!(matches!(g.body[0].kind, StmtKind::Return(None)));
    }

    #[test]
    fn user_function_call_parses_as_call() {
        let program = parse_ok("helper(1, 2);");
        let StmtKind::Expression(expr) = &program.statements[0].kind else {
            panic!("expected expression statement");
        };
        assert!(matches!(expr.kind, ExprKind::Call { .. }));
    }
}

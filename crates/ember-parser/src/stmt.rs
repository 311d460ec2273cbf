//! Statement and declaration parsing.

use crate::Parser;
use ember_ast::{Expr, FnDecl, Param, Stmt, StmtKind};
use ember_lexer::TokenKind;

impl Parser<'_> {
    /// Parse one statement. Returns `None` when the statement could not be
    /// recognized; the caller synchronizes to the next statement boundary.
    pub(crate) fn parse_statement(&mut self) -> Option<Stmt> {
        match self.stream.peek_kind() {
            Some(TokenKind::Let) => self.parse_let(),
            Some(TokenKind::Fn) => self.parse_function(),
            Some(TokenKind::Return) => self.parse_return(),
            Some(TokenKind::If) => self.parse_if(),
            Some(TokenKind::While) => self.parse_while(),
            Some(TokenKind::Schedule) => self.parse_schedule(),
            Some(TokenKind::LBrace) => self.parse_block_statement(),
            Some(_) => self.parse_expression_statement(),
            None => None,
        }
    }

    /// `let name [= expr];` — global when outside any block or function.
    fn parse_let(&mut self) -> Option<Stmt> {
        let start = self.stream.current_pos();
        self.stream.advance(); // `let`

        let name = self.expect_ident("after 'let'")?;
        let init = if self.stream.eat(&TokenKind::Assign) {
            Some(self.parse_expr())
        } else {
            None
        };
        self.expect_semicolon();

        Some(Stmt::new(
            StmtKind::Let {
                name,
                init,
                global: self.depth == 0,
            },
            self.stream.span_from(start),
        ))
    }

    /// `fn name(params) { body }`. The names `onInit` and `onTick` tag the
    /// dedicated entry-point statement kinds.
    fn parse_function(&mut self) -> Option<Stmt> {
        let start = self.stream.current_pos();
        self.stream.advance(); // `fn`

        let name = self.expect_ident("after 'fn'")?;
        self.expect(&TokenKind::LParen, "to open parameter list")?;

        let mut params = Vec::new();
        while !self.stream.check(&TokenKind::RParen) && !self.stream.at_end() {
            let param_start = self.stream.current_pos();
            let param = self.expect_ident("in parameter list")?;
            params.push(Param {
                name: param,
                span: self.stream.span_from(param_start),
            });
            if !self.stream.check(&TokenKind::RParen) && !self.stream.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RParen, "to close parameter list")?;

        self.expect(&TokenKind::LBrace, "to open function body")?;
        let body = self.parse_block_body();

        let decl = FnDecl {
            name: name.clone(),
            params,
            body,
        };
        let kind = match name.as_str() {
            "onInit" => StmtKind::OnInit(decl),
            "onTick" => StmtKind::OnTick(decl),
            _ => StmtKind::Function(decl),
        };
        Some(Stmt::new(kind, self.stream.span_from(start)))
    }

    /// `return [expr];`
    fn parse_return(&mut self) -> Option<Stmt> {
        let start = self.stream.current_pos();
        self.stream.advance(); // `return`

        let value = if self.stream.check(&TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expr())
        };
        self.expect_semicolon();

        Some(Stmt::new(
            StmtKind::Return(value),
            self.stream.span_from(start),
        ))
    }

    /// `if (cond) stmt [else stmt]`
    fn parse_if(&mut self) -> Option<Stmt> {
        let start = self.stream.current_pos();
        self.stream.advance(); // `if`

        self.expect(&TokenKind::LParen, "after 'if'")?;
        let condition = self.parse_expr();
        self.expect(&TokenKind::RParen, "to close condition")?;

        let consequent = Box::new(self.parse_branch());
        let alternate = if self.stream.eat(&TokenKind::Else) {
            Some(Box::new(self.parse_branch()))
        } else {
            None
        };

        Some(Stmt::new(
            StmtKind::If {
                condition,
                consequent,
                alternate,
            },
            self.stream.span_from(start),
        ))
    }

    /// `while (cond) stmt`
    fn parse_while(&mut self) -> Option<Stmt> {
        let start = self.stream.current_pos();
        self.stream.advance(); // `while`

        self.expect(&TokenKind::LParen, "after 'while'")?;
        let condition = self.parse_expr();
        self.expect(&TokenKind::RParen, "to close condition")?;

        let body = Box::new(self.parse_branch());

        Some(Stmt::new(
            StmtKind::While { condition, body },
            self.stream.span_from(start),
        ))
    }

    /// `schedule(delay, task);`
    fn parse_schedule(&mut self) -> Option<Stmt> {
        let start = self.stream.current_pos();
        self.stream.advance(); // `schedule`

        self.expect(&TokenKind::LParen, "after 'schedule'")?;
        let delay = self.parse_expr();
        self.expect(&TokenKind::Comma, "between schedule arguments")?;
        let task = self.parse_expr();
        self.expect(&TokenKind::RParen, "to close schedule arguments")?;
        self.expect_semicolon();

        Some(Stmt::new(
            StmtKind::Schedule { delay, task },
            self.stream.span_from(start),
        ))
    }

    /// `{ stmt* }`
    fn parse_block_statement(&mut self) -> Option<Stmt> {
        let start = self.stream.current_pos();
        self.stream.advance(); // `{`
        let statements = self.parse_block_body();
        Some(Stmt::new(
            StmtKind::Block(statements),
            self.stream.span_from(start),
        ))
    }

    /// Bare expression followed by `;`.
    fn parse_expression_statement(&mut self) -> Option<Stmt> {
        let start = self.stream.current_pos();
        let expr = self.parse_expr();
        self.expect_semicolon();
        Some(Stmt::new(
            StmtKind::Expression(expr),
            self.stream.span_from(start),
        ))
    }

    /// Parse statements until `}` or end of input. The opening `{` has been
    /// consumed; consumes the closing `}`.
    fn parse_block_body(&mut self) -> Vec<Stmt> {
        self.depth += 1;
        let mut statements = Vec::new();
        while !self.stream.check(&TokenKind::RBrace) && !self.stream.at_end() {
            match self.parse_statement() {
                Some(stmt) => statements.push(stmt),
                None => self.synchronize(),
            }
        }
        self.depth -= 1;
        self.expect(&TokenKind::RBrace, "to close block");
        statements
    }

    /// Parse the single-statement branch of an `if`/`while`. A failed parse
    /// synthesizes an empty block so the surrounding node stays well formed.
    fn parse_branch(&mut self) -> Stmt {
        let span = self.stream.current_span();
        match self.parse_statement() {
            Some(stmt) => stmt,
            None => {
                self.synchronize();
                Stmt::new(StmtKind::Block(Vec::new()), span)
            }
        }
    }
}

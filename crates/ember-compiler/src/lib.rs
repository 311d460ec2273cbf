//! AST to bytecode compiler.
//!
//! Single pass over the program. Diagnostics accumulate and never stop
//! compilation of later statements; recovery codegen keeps the stack
//! balanced so one bad expression does not cascade. A program compiled with
//! any error diagnostic must be rejected by the caller, never executed.

use std::collections::HashMap;

use ember_ast::{
    BinaryOp, Diagnostic, Expr, ExprKind, FnDecl, Program, Span, Stmt, StmtKind, UnaryOp,
};
use ember_vm::{Chunk, CompiledProgram, EntryPoint, Op, SlotId};

/// Native name reserved by the `schedule` statement. Always interned with
/// id 0 so hosts can bind it without compiling a script first.
pub const SCHEDULE_NATIVE: &str = "schedule";

/// Compile a parsed program. The `schedule` native is pre-seeded at id 0.
pub fn compile(program: &Program) -> (CompiledProgram, Vec<Diagnostic>) {
    compile_with_natives(program, &[(SCHEDULE_NATIVE, 0)])
}

/// Compile with caller-supplied fixed native ids. Seeded mappings are never
/// reassigned; unseeded names get the next sequential id on first use.
pub fn compile_with_natives(
    program: &Program,
    seeds: &[(&str, u16)],
) -> (CompiledProgram, Vec<Diagnostic>) {
    let mut compiler = Compiler::default();
    for (name, id) in seeds {
        compiler.program.natives.insert((*name).to_string(), *id);
    }
    compiler.run(program)
}

/// Lex, parse, and compile in one step. Diagnostics from all three stages
/// are merged in source order.
pub fn compile_source(source: &str) -> (CompiledProgram, Vec<Diagnostic>) {
    let (ast, mut diagnostics) = ember_parser::parse_source(source);
    let (compiled, compile_diagnostics) = compile(&ast);
    diagnostics.extend(compile_diagnostics);
    diagnostics.sort_by_key(|d| (d.span.start.index, d.span.end.index));
    (compiled, diagnostics)
}

#[derive(Default)]
struct Compiler {
    program: CompiledProgram,
    diagnostics: Vec<Diagnostic>,
}

/// Per-function state: the chunk under construction plus the scope chain.
/// All scopes of one function share a single slot counter, so shadowed
/// names get independent slots.
struct FnCompiler {
    chunk: Chunk,
    scopes: Vec<HashMap<String, SlotId>>,
    next_slot: u16,
}

impl FnCompiler {
    fn new(chunk: Chunk) -> Self {
        Self {
            chunk,
            scopes: vec![HashMap::new()],
            next_slot: 0,
        }
    }

    fn declare(&mut self, name: &str) -> SlotId {
        let slot = self.next_slot;
        self.next_slot += 1;
        if self.next_slot > self.chunk.locals {
            self.chunk.locals = self.next_slot;
        }
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), slot);
        }
        slot
    }

    fn lookup(&self, name: &str) -> Option<SlotId> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).copied())
    }
}

enum Resolution {
    Local(SlotId),
    Global(u16),
    Unknown,
}

impl Compiler {
    fn run(mut self, ast: &Program) -> (CompiledProgram, Vec<Diagnostic>) {
        // Chunk 0 is the implicit top-level chunk holding global
        // initializers and any loose top-level statements.
        self.program
            .chunks
            .push(Chunk::new("<main>", 0, ast.span));
        let mut top = FnCompiler::new(Chunk::new("<main>", 0, ast.span));

        for stmt in &ast.statements {
            self.compile_stmt(&mut top, stmt);
        }
        if !matches!(
            top.chunk.code.last().map(|i| i.op),
            Some(Op::Halt | Op::Return)
        ) {
            top.chunk.emit(Op::Halt, ast.span);
        }
        self.program.chunks[0] = top.chunk;

        (self.program, self.diagnostics)
    }

    fn error(&mut self, message: impl Into<String>, span: Span) {
        self.diagnostics.push(Diagnostic::error(message, span));
    }

    fn warning(&mut self, message: impl Into<String>, span: Span) {
        self.diagnostics.push(Diagnostic::warning(message, span));
    }

    fn compile_stmt(&mut self, f: &mut FnCompiler, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Let { name, init, global } => {
                self.compile_let(f, stmt.span, name, init.as_ref(), *global);
            }
            StmtKind::Function(decl) => {
                self.compile_function(decl, stmt.span, None);
            }
            StmtKind::OnInit(decl) => {
                if decl.params.len() != 1 {
                    self.warning(
                        format!(
                            "onInit is invoked with 1 argument (seed), not {}",
                            decl.params.len()
                        ),
                        stmt.span,
                    );
                }
                self.compile_function(decl, stmt.span, Some("onInit"));
            }
            StmtKind::OnTick(decl) => {
                if decl.params.len() != 2 {
                    self.warning(
                        format!(
                            "onTick is invoked with 2 arguments (frame, dt), not {}",
                            decl.params.len()
                        ),
                        stmt.span,
                    );
                }
                self.compile_function(decl, stmt.span, Some("onTick"));
            }
            StmtKind::Return(value) => {
                match value {
                    Some(expr) => self.compile_expr(f, expr),
                    None => {
                        f.chunk.emit(Op::Null, stmt.span);
                    }
                }
                f.chunk.emit(Op::Return, stmt.span);
            }
            StmtKind::If {
                condition,
                consequent,
                alternate,
            } => {
                self.compile_expr(f, condition);
                let jump_false = f.chunk.emit(Op::JumpIfFalse(0), condition.span);
                self.compile_stmt(f, consequent);
                match alternate {
                    Some(alternate) => {
                        let jump_end = f.chunk.emit(Op::Jump(0), stmt.span);
                        let else_start = f.chunk.offset() as u16;
                        f.chunk.patch_jump(jump_false, else_start);
                        self.compile_stmt(f, alternate);
                        let end = f.chunk.offset() as u16;
                        f.chunk.patch_jump(jump_end, end);
                    }
                    None => {
                        let end = f.chunk.offset() as u16;
                        f.chunk.patch_jump(jump_false, end);
                    }
                }
            }
            StmtKind::While { condition, body } => {
                let head = f.chunk.offset() as u16;
                self.compile_expr(f, condition);
                let jump_exit = f.chunk.emit(Op::JumpIfFalse(0), condition.span);
                self.compile_stmt(f, body);
                f.chunk.emit(Op::Jump(head), stmt.span);
                let end = f.chunk.offset() as u16;
                f.chunk.patch_jump(jump_exit, end);
            }
            StmtKind::Block(statements) => {
                f.scopes.push(HashMap::new());
                for stmt in statements {
                    self.compile_stmt(f, stmt);
                }
                f.scopes.pop();
            }
            StmtKind::Schedule { delay, task } => {
                self.compile_expr(f, delay);
                self.compile_expr(f, task);
                let id = self.program.native_id(SCHEDULE_NATIVE);
                f.chunk.emit(Op::CallNative { id, argc: 2 }, stmt.span);
                f.chunk.emit(Op::Pop, stmt.span);
            }
            StmtKind::Expression(expr) => {
                self.compile_expr(f, expr);
                f.chunk.emit(Op::Pop, stmt.span);
            }
        }
    }

    fn compile_let(
        &mut self,
        f: &mut FnCompiler,
        span: Span,
        name: &str,
        init: Option<&Expr>,
        global: bool,
    ) {
        match init {
            Some(expr) => self.compile_expr(f, expr),
            None => {
                f.chunk.emit(Op::Null, span);
            }
        }

        if global {
            if self.program.globals.contains_key(name) {
                self.error(format!("global '{name}' is already declared"), span);
            }
            let slot = self.program.global_slot(name);
            f.chunk.emit(Op::SetGlobal(slot), span);
        } else {
            // Redeclaring within the same block is an error; shadowing an
            // outer scope gets a fresh slot.
            let slot = if f
                .scopes
                .last()
                .is_some_and(|scope| scope.contains_key(name))
            {
                self.error(format!("'{name}' is already declared in this block"), span);
                f.lookup(name).unwrap_or(0)
            } else {
                f.declare(name)
            };
            f.chunk.emit(Op::SetLocal(slot), span);
        }
        f.chunk.emit(Op::Pop, span);
    }

    fn compile_function(&mut self, decl: &FnDecl, span: Span, entry: Option<&str>) {
        if decl.params.len() > u8::MAX as usize {
            self.error(
                format!("function '{}' has too many parameters", decl.name),
                span,
            );
            return;
        }

        let chunk = Chunk::new(decl.name.clone(), decl.params.len() as u8, span);
        let mut f = FnCompiler::new(chunk);
        for param in &decl.params {
            if f.lookup(&param.name).is_some() {
                self.error(
                    format!("duplicate parameter '{}'", param.name),
                    param.span,
                );
                continue;
            }
            f.declare(&param.name);
        }

        for stmt in &decl.body {
            self.compile_stmt(&mut f, stmt);
        }
        if !matches!(
            f.chunk.code.last().map(|i| i.op),
            Some(Op::Return | Op::Halt)
        ) {
            f.chunk.emit(Op::Null, span);
            f.chunk.emit(Op::Return, span);
        }

        let index = self.program.chunks.len() as u16;
        self.program.chunks.push(f.chunk);

        if let Some(entry_name) = entry {
            if self.program.entry_points.contains_key(entry_name) {
                self.error(format!("duplicate '{entry_name}' declaration"), span);
                return;
            }
            self.program.entry_points.insert(
                entry_name.to_string(),
                EntryPoint {
                    chunk: index,
                    arity: decl.params.len() as u8,
                },
            );
        }
    }

    fn compile_expr(&mut self, f: &mut FnCompiler, expr: &Expr) {
        let span = expr.span;
        match &expr.kind {
            ExprKind::Number(value) => {
                let idx = self.program.add_constant(ember_vm::Value::Number(*value));
                f.chunk.emit(Op::Constant(idx), span);
            }
            ExprKind::Str(value) => {
                let idx = self
                    .program
                    .add_constant(ember_vm::Value::Str(value.clone()));
                f.chunk.emit(Op::Constant(idx), span);
            }
            ExprKind::Bool(true) => {
                f.chunk.emit(Op::True, span);
            }
            ExprKind::Bool(false) => {
                f.chunk.emit(Op::False, span);
            }
            ExprKind::Null => {
                f.chunk.emit(Op::Null, span);
            }
            ExprKind::Identifier(name) => match self.resolve(f, name) {
                Resolution::Local(slot) => {
                    f.chunk.emit(Op::GetLocal(slot), span);
                }
                Resolution::Global(slot) => {
                    f.chunk.emit(Op::GetGlobal(slot), span);
                }
                Resolution::Unknown => {
                    self.error(format!("unknown identifier '{name}'"), span);
                    f.chunk.emit(Op::Null, span);
                }
            },
            ExprKind::Binary { op, left, right } => {
                self.compile_binary(f, span, *op, left, right);
            }
            ExprKind::Unary { op, operand } => {
                self.compile_expr(f, operand);
                let op = match op {
                    UnaryOp::Neg => Op::Neg,
                    UnaryOp::Not => Op::Not,
                };
                f.chunk.emit(op, span);
            }
            ExprKind::Grouping(inner) => self.compile_expr(f, inner),
            ExprKind::Assign { target, value } => {
                self.compile_expr(f, value);
                match self.resolve(f, target) {
                    Resolution::Local(slot) => {
                        f.chunk.emit(Op::SetLocal(slot), span);
                    }
                    Resolution::Global(slot) => {
                        f.chunk.emit(Op::SetGlobal(slot), span);
                    }
                    Resolution::Unknown => {
                        // The value stays on the stack as the expression
                        // result, so no balancing is needed.
                        self.error(format!("unknown identifier '{target}'"), span);
                    }
                }
            }
            ExprKind::NativeCall { name, args } => {
                if args.len() > u8::MAX as usize {
                    self.error(format!("too many arguments to native '{name}'"), span);
                    f.chunk.emit(Op::Null, span);
                    return;
                }
                for arg in args {
                    self.compile_expr(f, arg);
                }
                let id = self.program.native_id(name);
                f.chunk.emit(
                    Op::CallNative {
                        id,
                        argc: args.len() as u8,
                    },
                    span,
                );
            }
            ExprKind::Call { callee, .. } => {
                let what = match &callee.kind {
                    ExprKind::Identifier(name) => format!("'{name}'"),
                    _ => "this expression".to_string(),
                };
                self.error(
                    format!("{what} is not callable; script functions cannot be invoked directly (use 'call' for natives)"),
                    span,
                );
                f.chunk.emit(Op::Null, span);
            }
            // The parser already reported this region; keep the stack shape.
            ExprKind::Error => {
                f.chunk.emit(Op::Null, span);
            }
        }
    }

    fn compile_binary(
        &mut self,
        f: &mut FnCompiler,
        span: Span,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
    ) {
        // Logical operators short-circuit and preserve the deciding operand
        // as the expression value.
        match op {
            BinaryOp::And => {
                self.compile_expr(f, left);
                f.chunk.emit(Op::Dup, span);
                let jump_false = f.chunk.emit(Op::JumpIfFalse(0), span);
                f.chunk.emit(Op::Pop, span);
                self.compile_expr(f, right);
                let end = f.chunk.offset() as u16;
                f.chunk.patch_jump(jump_false, end);
                return;
            }
            BinaryOp::Or => {
                self.compile_expr(f, left);
                f.chunk.emit(Op::Dup, span);
                let jump_rhs = f.chunk.emit(Op::JumpIfFalse(0), span);
                let jump_end = f.chunk.emit(Op::Jump(0), span);
                let rhs = f.chunk.offset() as u16;
                f.chunk.patch_jump(jump_rhs, rhs);
                f.chunk.emit(Op::Pop, span);
                self.compile_expr(f, right);
                let end = f.chunk.offset() as u16;
                f.chunk.patch_jump(jump_end, end);
                return;
            }
            _ => {}
        }

        self.compile_expr(f, left);
        self.compile_expr(f, right);
        let op = match op {
            BinaryOp::Add => Op::Add,
            BinaryOp::Sub => Op::Sub,
            BinaryOp::Mul => Op::Mul,
            BinaryOp::Div => Op::Div,
            BinaryOp::Mod => Op::Mod,
            BinaryOp::Eq => Op::Eq,
            BinaryOp::Ne => Op::Ne,
            BinaryOp::Lt => Op::Lt,
            BinaryOp::Le => Op::Le,
            BinaryOp::Gt => Op::Gt,
            BinaryOp::Ge => Op::Ge,
            BinaryOp::And | BinaryOp::Or => unreachable!("short-circuit ops handled above"),
        };
        f.chunk.emit(op, span);
    }

    fn resolve(&self, f: &FnCompiler, name: &str) -> Resolution {
        if let Some(slot) = f.lookup(name) {
            return Resolution::Local(slot);
        }
        if let Some(slot) = self.program.globals.get(name) {
            return Resolution::Global(*slot);
        }
        Resolution::Unknown
    }
}

//! Bytecode executor.
//!
//! Stack-based VM with a fixed-capacity operand stack, a bounded frame
//! stack, and an instruction-budget watchdog. Deterministic for a fixed
//! program, globals store, and argument list; all host interaction goes
//! through the [`NativeDispatch`] trait.

use crate::bytecode::{CompiledProgram, Op};
use crate::value::Value;
use ember_ast::Span;
use thiserror::Error;
use tracing::debug;

/// Operand stack capacity.
pub const STACK_MAX: usize = 256;

/// Frame stack capacity.
pub const FRAMES_MAX: usize = 64;

/// Instruction budget applied when neither the VM nor the program
/// overrides it.
pub const DEFAULT_BUDGET: u64 = 100_000;

/// Fatal execution failure. None of these are retried: the same inputs
/// would fail the same way.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum VmError {
    #[error("stack overflow in chunk {chunk} at instruction {ip}")]
    StackOverflow { chunk: u16, ip: usize },

    #[error("stack underflow in chunk {chunk} at instruction {ip}")]
    StackUnderflow { chunk: u16, ip: usize },

    #[error("frame stack overflow in chunk {chunk} at instruction {ip}")]
    FrameOverflow { chunk: u16, ip: usize },

    #[error(
        "instruction budget exceeded in '{entry}' (limit {limit}, executed {executed}) at chunk {chunk} instruction {ip}"
    )]
    BudgetExceeded {
        limit: u64,
        executed: u64,
        entry: String,
        chunk: u16,
        ip: usize,
    },

    #[error("'{entry}' expects {expected} argument(s), got {got}")]
    ArityMismatch {
        entry: String,
        expected: u8,
        got: usize,
    },

    #[error("unknown entry point '{name}'")]
    UnknownEntry { name: String },

    #[error("missing chunk {index}")]
    MissingChunk { index: u16 },

    #[error("no native bound for id {id} in chunk {chunk} at instruction {ip}")]
    UnknownNative { id: u16, chunk: u16, ip: usize },

    #[error("missing capability '{capability}' for native '{native}'")]
    CapabilityDenied { native: String, capability: String },

    #[error("native '{native}' aborted: {message}")]
    NativeAborted { native: String, message: String },

    #[error("invalid program: {message}")]
    Invalid { message: String },
}

/// Location of the instruction that triggered a native dispatch.
#[derive(Debug, Clone, Copy)]
pub struct CallSite {
    pub chunk: u16,
    pub ip: usize,
    pub span: Span,
}

/// Host-side native dispatcher. The runtime layer implements this to apply
/// capability gating and invoke bound handlers; returning an error aborts
/// the run.
pub trait NativeDispatch {
    fn call_native(
        &mut self,
        name: &str,
        id: u16,
        args: Vec<Value>,
        site: CallSite,
    ) -> Result<Value, VmError>;
}

struct Frame {
    chunk: u16,
    ip: usize,
    /// Operand-stack watermark to restore on return.
    base: usize,
    locals: Vec<Value>,
}

/// One VM instance: owns the operand stack, frame stack, and globals store
/// for a single loaded program. Allocated once and reset between runs, never
/// reallocated.
pub struct Vm {
    stack: Vec<Value>,
    frames: Vec<Frame>,
    globals: Vec<Value>,
    budget: u64,
    executed: u64,
}

impl Vm {
    pub fn new(global_count: usize, budget: u64) -> Self {
        Self {
            stack: Vec::with_capacity(STACK_MAX),
            frames: Vec::with_capacity(FRAMES_MAX),
            globals: vec![Value::Null; global_count],
            budget,
            executed: 0,
        }
    }

    /// Build a VM sized for `program`, honoring its budget override.
    pub fn for_program(program: &CompiledProgram) -> Self {
        Self::new(
            program.globals.len(),
            program.budget.unwrap_or(DEFAULT_BUDGET),
        )
    }

    /// Per-instance budget override. Takes effect at the next [`Vm::arm`].
    pub fn set_budget(&mut self, budget: u64) {
        self.budget = budget;
    }

    pub fn budget(&self) -> u64 {
        self.budget
    }

    /// Re-arm the watchdog. Called at the start of every public entry
    /// invocation; runs between arms share one budget window.
    pub fn arm(&mut self) {
        self.executed = 0;
    }

    /// Reset every global slot to null without reallocating the store.
    pub fn reset_globals(&mut self) {
        for slot in &mut self.globals {
            *slot = Value::Null;
        }
    }

    pub fn global(&self, slot: u16) -> Option<&Value> {
        self.globals.get(slot as usize)
    }

    pub fn globals(&self) -> &[Value] {
        &self.globals
    }

    /// Run a named entry point. Argument count is validated against the
    /// entry's declared arity before any instruction executes.
    pub fn run_entry(
        &mut self,
        program: &CompiledProgram,
        name: &str,
        args: &[Value],
        dispatch: &mut dyn NativeDispatch,
    ) -> Result<Value, VmError> {
        let entry = program
            .entry_points
            .get(name)
            .ok_or_else(|| VmError::UnknownEntry {
                name: name.to_string(),
            })?;
        if args.len() != entry.arity as usize {
            return Err(VmError::ArityMismatch {
                entry: name.to_string(),
                expected: entry.arity,
                got: args.len(),
            });
        }
        self.run_chunk(program, entry.chunk, args, dispatch)
    }

    /// Run one chunk to completion.
    pub fn run_chunk(
        &mut self,
        program: &CompiledProgram,
        chunk_index: u16,
        args: &[Value],
        dispatch: &mut dyn NativeDispatch,
    ) -> Result<Value, VmError> {
        let chunk = program
            .chunks
            .get(chunk_index as usize)
            .ok_or(VmError::MissingChunk { index: chunk_index })?;
        if args.len() != chunk.params as usize {
            return Err(VmError::ArityMismatch {
                entry: chunk.name.clone(),
                expected: chunk.params,
                got: args.len(),
            });
        }
        debug!(chunk = %chunk.name, args = args.len(), "vm run");

        self.stack.clear();
        self.frames.clear();
        let mut locals = vec![Value::Null; chunk.locals as usize];
        for (slot, arg) in args.iter().enumerate() {
            locals[slot] = arg.clone();
        }
        self.frames.push(Frame {
            chunk: chunk_index,
            ip: 0,
            base: 0,
            locals,
        });

        let entry_name = chunk.name.clone();
        self.execute(program, &entry_name, dispatch)
    }

    fn execute(
        &mut self,
        program: &CompiledProgram,
        entry: &str,
        dispatch: &mut dyn NativeDispatch,
    ) -> Result<Value, VmError> {
        loop {
            let Some(frame) = self.frames.last_mut() else {
                return Ok(Value::Null);
            };
            let chunk_index = frame.chunk;
            let chunk = program
                .chunks
                .get(chunk_index as usize)
                .ok_or(VmError::MissingChunk { index: chunk_index })?;

            // Falling off the end behaves as an implicit return.
            let Some(instruction) = chunk.code.get(frame.ip) else {
                let base = frame.base;
                let value = if self.stack.len() > base {
                    self.stack.pop().unwrap_or(Value::Null)
                } else {
                    Value::Null
                };
                self.stack.truncate(base);
                self.frames.pop();
                if self.frames.is_empty() {
                    return Ok(value);
                }
                push(&mut self.stack, value, chunk_index, 0)?;
                continue;
            };

            // Watchdog: checked before every single dispatch.
            if self.executed >= self.budget {
                return Err(VmError::BudgetExceeded {
                    limit: self.budget,
                    executed: self.executed,
                    entry: entry.to_string(),
                    chunk: chunk_index,
                    ip: frame.ip,
                });
            }
            self.executed += 1;

            let ip = frame.ip;
            frame.ip += 1;

            match instruction.op {
                Op::Constant(idx) => {
                    let value = program
                        .constants
                        .get(idx as usize)
                        .ok_or_else(|| VmError::Invalid {
                            message: format!("constant index {idx} out of bounds"),
                        })?
                        .clone();
                    push(&mut self.stack, value, chunk_index, ip)?;
                }
                Op::Null => push(&mut self.stack, Value::Null, chunk_index, ip)?,
                Op::True => push(&mut self.stack, Value::Bool(true), chunk_index, ip)?,
                Op::False => push(&mut self.stack, Value::Bool(false), chunk_index, ip)?,
                Op::Pop => {
                    pop(&mut self.stack, chunk_index, ip)?;
                }
                Op::Dup => {
                    let top = self
                        .stack
                        .last()
                        .cloned()
                        .ok_or(VmError::StackUnderflow {
                            chunk: chunk_index,
                            ip,
                        })?;
                    push(&mut self.stack, top, chunk_index, ip)?;
                }

                Op::GetGlobal(slot) => {
                    let value = self
                        .globals
                        .get(slot as usize)
                        .ok_or_else(|| VmError::Invalid {
                            message: format!("global slot {slot} out of bounds"),
                        })?
                        .clone();
                    push(&mut self.stack, value, chunk_index, ip)?;
                }
                Op::SetGlobal(slot) => {
                    // Store leaves the value on top for chained assignment.
                    let value = self
                        .stack
                        .last()
                        .cloned()
                        .ok_or(VmError::StackUnderflow {
                            chunk: chunk_index,
                            ip,
                        })?;
                    let target = self
                        .globals
                        .get_mut(slot as usize)
                        .ok_or_else(|| VmError::Invalid {
                            message: format!("global slot {slot} out of bounds"),
                        })?;
                    *target = value;
                }
                Op::GetLocal(slot) => {
                    let value = frame
                        .locals
                        .get(slot as usize)
                        .ok_or_else(|| VmError::Invalid {
                            message: format!("local slot {slot} out of bounds"),
                        })?
                        .clone();
                    push(&mut self.stack, value, chunk_index, ip)?;
                }
                Op::SetLocal(slot) => {
                    let value = self
                        .stack
                        .last()
                        .cloned()
                        .ok_or(VmError::StackUnderflow {
                            chunk: chunk_index,
                            ip,
                        })?;
                    let target = frame
                        .locals
                        .get_mut(slot as usize)
                        .ok_or_else(|| VmError::Invalid {
                            message: format!("local slot {slot} out of bounds"),
                        })?;
                    *target = value;
                }

                Op::Add => {
                    let b = pop(&mut self.stack, chunk_index, ip)?;
                    let a = pop(&mut self.stack, chunk_index, ip)?;
                    let result = match (&a, &b) {
                        (Value::Str(_), _) | (_, Value::Str(_)) => {
                            Value::Str(format!("{a}{b}"))
                        }
                        _ => Value::Number(a.as_number() + b.as_number()),
                    };
                    push(&mut self.stack, result, chunk_index, ip)?;
                }
                Op::Sub => binary_numeric(&mut self.stack, chunk_index, ip, |a, b| a - b)?,
                Op::Mul => binary_numeric(&mut self.stack, chunk_index, ip, |a, b| a * b)?,
                Op::Div => binary_numeric(&mut self.stack, chunk_index, ip, |a, b| a / b)?,
                Op::Mod => binary_numeric(&mut self.stack, chunk_index, ip, |a, b| a % b)?,
                Op::Neg => {
                    let a = pop(&mut self.stack, chunk_index, ip)?;
                    push(
                        &mut self.stack,
                        Value::Number(-a.as_number()),
                        chunk_index,
                        ip,
                    )?;
                }

                Op::Eq => binary_compare(&mut self.stack, chunk_index, ip, |a, b| a == b)?,
                Op::Ne => binary_compare(&mut self.stack, chunk_index, ip, |a, b| a != b)?,
                Op::Lt => binary_relational(&mut self.stack, chunk_index, ip, |a, b| a < b)?,
                Op::Le => binary_relational(&mut self.stack, chunk_index, ip, |a, b| a <= b)?,
                Op::Gt => binary_relational(&mut self.stack, chunk_index, ip, |a, b| a > b)?,
                Op::Ge => binary_relational(&mut self.stack, chunk_index, ip, |a, b| a >= b)?,
                Op::Not => {
                    let a = pop(&mut self.stack, chunk_index, ip)?;
                    push(
                        &mut self.stack,
                        Value::Bool(!a.is_truthy()),
                        chunk_index,
                        ip,
                    )?;
                }

                Op::Jump(target) => {
                    frame.ip = target as usize;
                }
                Op::JumpIfFalse(target) => {
                    let condition = pop(&mut self.stack, chunk_index, ip)?;
                    if !condition.is_truthy() {
                        frame.ip = target as usize;
                    }
                }

                Op::CallNative { id, argc } => {
                    let mut call_args = Vec::with_capacity(argc as usize);
                    for _ in 0..argc {
                        call_args.push(pop(&mut self.stack, chunk_index, ip)?);
                    }
                    // Popped in reverse; restore left-to-right order.
                    call_args.reverse();
                    let name = program
                        .native_name(id)
                        .ok_or(VmError::UnknownNative {
                            id,
                            chunk: chunk_index,
                            ip,
                        })?
                        .to_string();
                    let site = CallSite {
                        chunk: chunk_index,
                        ip,
                        span: instruction.span,
                    };
                    let result = dispatch.call_native(&name, id, call_args, site)?;
                    push(&mut self.stack, result, chunk_index, ip)?;
                }

                Op::Return => {
                    let value = pop(&mut self.stack, chunk_index, ip)?;
                    let base = frame.base;
                    self.stack.truncate(base);
                    self.frames.pop();
                    if self.frames.is_empty() {
                        return Ok(value);
                    }
                    push(&mut self.stack, value, chunk_index, ip)?;
                }
                Op::Halt => {
                    let base = frame.base;
                    let value = if self.stack.len() > base {
                        self.stack.pop().unwrap_or(Value::Null)
                    } else {
                        Value::Null
                    };
                    self.stack.clear();
                    self.frames.clear();
                    return Ok(value);
                }
            }
        }
    }
}

fn push(stack: &mut Vec<Value>, value: Value, chunk: u16, ip: usize) -> Result<(), VmError> {
    if stack.len() >= STACK_MAX {
        return Err(VmError::StackOverflow { chunk, ip });
    }
    stack.push(value);
    Ok(())
}

fn pop(stack: &mut Vec<Value>, chunk: u16, ip: usize) -> Result<Value, VmError> {
    stack.pop().ok_or(VmError::StackUnderflow { chunk, ip })
}

fn binary_numeric(
    stack: &mut Vec<Value>,
    chunk: u16,
    ip: usize,
    apply: impl Fn(f64, f64) -> f64,
) -> Result<(), VmError> {
    let b = pop(stack, chunk, ip)?;
    let a = pop(stack, chunk, ip)?;
    push(
        stack,
        Value::Number(apply(a.as_number(), b.as_number())),
        chunk,
        ip,
    )
}

fn binary_relational(
    stack: &mut Vec<Value>,
    chunk: u16,
    ip: usize,
    apply: impl Fn(f64, f64) -> bool,
) -> Result<(), VmError> {
    let b = pop(stack, chunk, ip)?;
    let a = pop(stack, chunk, ip)?;
    push(
        stack,
        Value::Bool(apply(a.as_number(), b.as_number())),
        chunk,
        ip,
    )
}

fn binary_compare(
    stack: &mut Vec<Value>,
    chunk: u16,
    ip: usize,
    apply: impl Fn(&Value, &Value) -> bool,
) -> Result<(), VmError> {
    let b = pop(stack, chunk, ip)?;
    let a = pop(stack, chunk, ip)?;
    push(stack, Value::Bool(apply(&a, &b)), chunk, ip)
}

//! Bytecode instruction set and compiled-program model.
//!
//! Flat, fixed-operand instruction encoding for stack-based execution.
//! Jump operands are absolute in-chunk instruction indices, so instructions
//! are randomly addressable and chunks can be serialized verbatim.

use crate::value::Value;
use crate::VmError;
use ember_ast::Span;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Local slot identifier. Parameters occupy slots `0..arity` in declaration
/// order; `let` bindings allocate the slots after them.
pub type SlotId = u16;

/// Index into the program's native-symbol table.
pub type NativeId = u16;

/// Bytecode instruction.
///
/// Stack-based: operands are popped from the stack, results pushed back.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Op {
    // === Stack ===
    /// Push a value from the constant pool
    Constant(u16),
    /// Push null
    Null,
    /// Push true
    True,
    /// Push false
    False,
    /// Pop and discard top of stack
    Pop,
    /// Duplicate top of stack
    Dup,

    // === Globals / locals ===
    /// Push value of global slot
    GetGlobal(u16),
    /// Store top of stack to global slot (does not pop)
    SetGlobal(u16),
    /// Push value from local slot
    GetLocal(SlotId),
    /// Store top of stack to local slot (does not pop)
    SetLocal(SlotId),

    // === Arithmetic ===
    /// Pop b, pop a, push a + b (string concatenation when either is a string)
    Add,
    /// Pop b, pop a, push a - b
    Sub,
    /// Pop b, pop a, push a * b
    Mul,
    /// Pop b, pop a, push a / b (non-finite results flow through)
    Div,
    /// Pop b, pop a, push a % b
    Mod,
    /// Pop a, push -a
    Neg,

    // === Comparison (push a Bool) ===
    /// Structural equality
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// Pop a, push true when a is falsy
    Not,

    // === Control flow (absolute in-chunk targets) ===
    /// Set instruction pointer to target
    Jump(u16),
    /// Pop condition, jump to target when it is falsy
    JumpIfFalse(u16),

    // === Natives ===
    /// Pop `argc` arguments, dispatch native `id`, push the result
    CallNative { id: NativeId, argc: u8 },

    // === Termination ===
    /// Pop the return value and end the current frame
    Return,
    /// End the entire run, yielding the top of stack (or null)
    Halt,
}

/// One instruction with its source location.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    pub op: Op,
    pub span: Span,
}

/// A compiled unit: the implicit top-level chunk or one function body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub name: String,
    /// Parameter count. Parameters fill local slots `0..params`.
    pub params: u8,
    /// Total local slots, parameters included.
    pub locals: u16,
    pub span: Span,
    pub code: Vec<Instruction>,
}

impl Chunk {
    pub fn new(name: impl Into<String>, params: u8, span: Span) -> Self {
        Self {
            name: name.into(),
            params,
            locals: params as u16,
            span,
            code: Vec::new(),
        }
    }

    /// Emit an instruction, returning its offset.
    pub fn emit(&mut self, op: Op, span: Span) -> usize {
        self.code.push(Instruction { op, span });
        self.code.len() - 1
    }

    /// Current instruction offset (for jump patching).
    pub fn offset(&self) -> usize {
        self.code.len()
    }

    /// Patch the jump at `offset` to point at `target`.
    ///
    /// # Panics
    ///
    /// Panics if the instruction at `offset` is not a jump.
    pub fn patch_jump(&mut self, offset: usize, target: u16) {
        match &mut self.code[offset].op {
            Op::Jump(t) | Op::JumpIfFalse(t) => *t = target,
            _ => panic!("attempted to patch non-jump instruction"),
        }
    }
}

/// Entry-point binding: which chunk implements `onInit`/`onTick` and how many
/// arguments it expects.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EntryPoint {
    pub chunk: u16,
    pub arity: u8,
}

/// A fully compiled program. Immutable once the compiler hands it over.
///
/// Chunk 0 is always the implicit top-level chunk holding global
/// initializers. Table orders are part of the contract: global slots, native
/// ids, and entry points are looked up by the index recorded here.
#[derive(Debug, Clone, Default)]
pub struct CompiledProgram {
    pub chunks: Vec<Chunk>,
    pub constants: Vec<Value>,
    /// Global name -> slot, in first-use order.
    pub globals: IndexMap<String, u16>,
    /// Native name -> id, in first-seen order (pre-seeded ids first).
    pub natives: IndexMap<String, u16>,
    pub entry_points: IndexMap<String, EntryPoint>,
    /// Per-program instruction budget override.
    pub budget: Option<u64>,
}

impl CompiledProgram {
    /// Intern a constant, returning its pool index. Existing entries are
    /// reused; the pool itself is append-only so indices stay stable.
    pub fn add_constant(&mut self, value: Value) -> u16 {
        if let Some(idx) = self.constants.iter().position(|v| v == &value) {
            return idx as u16;
        }
        let idx = self.constants.len() as u16;
        self.constants.push(value);
        idx
    }

    /// Slot for a global, assigned on first use and stable thereafter.
    pub fn global_slot(&mut self, name: &str) -> u16 {
        if let Some(slot) = self.globals.get(name) {
            return *slot;
        }
        let slot = self.globals.len() as u16;
        self.globals.insert(name.to_string(), slot);
        slot
    }

    /// Id for a native symbol, assigned sequentially on first occurrence.
    /// Pre-seeded names keep the id they were seeded with.
    pub fn native_id(&mut self, name: &str) -> u16 {
        if let Some(id) = self.natives.get(name) {
            return *id;
        }
        // Next id after the highest assigned one, so pre-seeded ids are
        // never reassigned even when they leave gaps.
        let id = self
            .natives
            .values()
            .map(|id| id + 1)
            .max()
            .unwrap_or(0);
        self.natives.insert(name.to_string(), id);
        id
    }

    pub fn native_name(&self, id: u16) -> Option<&str> {
        self.natives
            .iter()
            .find(|(_, v)| **v == id)
            .map(|(k, _)| k.as_str())
    }

    /// Check every index an instruction references against its table.
    /// A program that fails here must never be executed.
    pub fn validate(&self) -> Result<(), VmError> {
        if self.chunks.is_empty() {
            return Err(VmError::Invalid {
                message: "program has no chunks".to_string(),
            });
        }
        for (name, entry) in &self.entry_points {
            let Some(chunk) = self.chunks.get(entry.chunk as usize) else {
                return Err(VmError::Invalid {
                    message: format!("entry point '{name}' references missing chunk {}", entry.chunk),
                });
            };
            if chunk.params != entry.arity {
                return Err(VmError::Invalid {
                    message: format!(
                        "entry point '{name}' arity {} does not match chunk parameter count {}",
                        entry.arity, chunk.params
                    ),
                });
            }
        }
        for (chunk_idx, chunk) in self.chunks.iter().enumerate() {
            for (ip, instruction) in chunk.code.iter().enumerate() {
                let bad = |what: &str, index: usize, limit: usize| VmError::Invalid {
                    message: format!(
                        "chunk {chunk_idx} ip {ip}: {what} index {index} out of bounds ({limit} entries)"
                    ),
                };
                match instruction.op {
                    Op::Constant(idx) => {
                        if idx as usize >= self.constants.len() {
                            return Err(bad("constant", idx as usize, self.constants.len()));
                        }
                    }
                    Op::GetGlobal(slot) | Op::SetGlobal(slot) => {
                        if slot as usize >= self.globals.len() {
                            return Err(bad("global", slot as usize, self.globals.len()));
                        }
                    }
                    Op::GetLocal(slot) | Op::SetLocal(slot) => {
                        if slot >= chunk.locals {
                            return Err(bad("local", slot as usize, chunk.locals as usize));
                        }
                    }
                    Op::Jump(target) | Op::JumpIfFalse(target) => {
                        // One past the end is allowed: the executor treats
                        // falling off the chunk as an implicit return.
                        if target as usize > chunk.code.len() {
                            return Err(bad("jump target", target as usize, chunk.code.len()));
                        }
                    }
                    Op::CallNative { id, .. } => {
                        if self.native_name(id).is_none() {
                            return Err(bad("native", id as usize, self.natives.len()));
                        }
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }
}

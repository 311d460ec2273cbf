//! Bytecode model and stack-based virtual machine.
//!
//! Split from the compiler so embedders can load serialized programs
//! without pulling in the front end.

pub mod bytecode;
pub mod executor;
pub mod serialize;
pub mod value;

pub use bytecode::{Chunk, CompiledProgram, EntryPoint, Instruction, NativeId, Op, SlotId};
pub use executor::{
    CallSite, NativeDispatch, Vm, VmError, DEFAULT_BUDGET, FRAMES_MAX, STACK_MAX,
};
pub use serialize::{SerializeError, SerializedProgram, FORMAT_VERSION};
pub use value::Value;

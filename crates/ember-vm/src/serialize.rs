//! Versioned storage form of a compiled program.
//!
//! Table-valued fields (globals, natives, entry points) are written as
//! explicit ordered pair lists, never as native map types, so the on-disk
//! order is exactly the in-memory table order. Round trips are lossless:
//! a deserialized program executes identically to the one serialized.

use crate::bytecode::{Chunk, CompiledProgram, EntryPoint};
use crate::value::Value;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Bump when the schema changes shape. Readers reject anything newer.
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum SerializeError {
    #[error("unsupported program format version {found} (supported up to {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },
    #[error("duplicate {table} entry '{name}'")]
    DuplicateEntry { table: &'static str, name: String },
    #[error("invalid program: {message}")]
    Invalid { message: String },
}

/// The wire/storage form of [`CompiledProgram`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializedProgram {
    pub version: u32,
    pub chunks: Vec<Chunk>,
    pub constants: Vec<Value>,
    pub globals: Vec<(String, u16)>,
    pub natives: Vec<(String, u16)>,
    pub entry_points: Vec<(String, EntryPoint)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget: Option<u64>,
}

impl SerializedProgram {
    pub fn from_program(program: &CompiledProgram) -> Self {
        Self {
            version: FORMAT_VERSION,
            chunks: program.chunks.clone(),
            constants: program.constants.clone(),
            globals: pairs(&program.globals),
            natives: pairs(&program.natives),
            entry_points: program
                .entry_points
                .iter()
                .map(|(name, entry)| (name.clone(), *entry))
                .collect(),
            budget: program.budget,
        }
    }

    /// Rebuild the executable form, validating version, table uniqueness,
    /// and every instruction operand.
    pub fn into_program(self) -> Result<CompiledProgram, SerializeError> {
        if self.version > FORMAT_VERSION {
            return Err(SerializeError::UnsupportedVersion {
                found: self.version,
                supported: FORMAT_VERSION,
            });
        }

        let program = CompiledProgram {
            chunks: self.chunks,
            constants: self.constants,
            globals: table("globals", self.globals)?,
            natives: table("natives", self.natives)?,
            entry_points: table("entry points", self.entry_points)?,
            budget: self.budget,
        };
        program
            .validate()
            .map_err(|err| SerializeError::Invalid {
                message: err.to_string(),
            })?;
        Ok(program)
    }
}

fn pairs(map: &IndexMap<String, u16>) -> Vec<(String, u16)> {
    map.iter().map(|(k, v)| (k.clone(), *v)).collect()
}

fn table<V>(
    name: &'static str,
    entries: Vec<(String, V)>,
) -> Result<IndexMap<String, V>, SerializeError> {
    let mut map = IndexMap::with_capacity(entries.len());
    for (key, value) in entries {
        if map.insert(key.clone(), value).is_some() {
            return Err(SerializeError::DuplicateEntry { table: name, name: key });
        }
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::Op;
    use ember_ast::Span;

    fn sample_program() -> CompiledProgram {
        let mut program = CompiledProgram::default();
        let one = program.add_constant(Value::Number(1.0));
        let slot = program.global_slot("counter");
        program.natives.insert("schedule".to_string(), 0);
        let log = program.native_id("log");

        let mut main = Chunk::new("<main>", 0, Span::zero());
        main.emit(Op::Constant(one), Span::zero());
        main.emit(Op::SetGlobal(slot), Span::zero());
        main.emit(Op::Pop, Span::zero());
        main.emit(Op::Halt, Span::zero());
        program.chunks.push(main);

        let mut init = Chunk::new("onInit", 1, Span::zero());
        init.emit(Op::GetLocal(0), Span::zero());
        init.emit(Op::CallNative { id: log, argc: 1 }, Span::zero());
        init.emit(Op::Return, Span::zero());
        program.chunks.push(init);
        program
            .entry_points
            .insert("onInit".to_string(), EntryPoint { chunk: 1, arity: 1 });
        program
    }

    #[test]
    fn round_trip_preserves_everything() {
        let program = sample_program();
        let serialized = SerializedProgram::from_program(&program);
        let json = serde_json::to_string(&serialized).unwrap();
        let parsed: SerializedProgram = serde_json::from_str(&json).unwrap();
        let restored = parsed.into_program().unwrap();

        assert_eq!(restored.constants, program.constants);
        assert_eq!(restored.globals, program.globals);
        assert_eq!(restored.natives, program.natives);
        assert_eq!(restored.entry_points, program.entry_points);
        assert_eq!(restored.chunks.len(), program.chunks.len());
        for (a, b) in restored.chunks.iter().zip(&program.chunks) {
            assert_eq!(a.code, b.code);
            assert_eq!(a.params, b.params);
            assert_eq!(a.locals, b.locals);
        }
    }

    #[test]
    fn rejects_newer_version() {
        let mut serialized = SerializedProgram::from_program(&sample_program());
        serialized.version = FORMAT_VERSION + 1;
        assert!(matches!(
            serialized.into_program(),
            Err(SerializeError::UnsupportedVersion { .. })
        ));
    }

    #[test]
    fn rejects_duplicate_global_name() {
        let mut serialized = SerializedProgram::from_program(&sample_program());
        serialized.globals.push(("counter".to_string(), 9));
        assert!(matches!(
            serialized.into_program(),
            Err(SerializeError::DuplicateEntry { table: "globals", .. })
        ));
    }

    #[test]
    fn rejects_corrupted_jump_target() {
        let mut serialized = SerializedProgram::from_program(&sample_program());
        serialized.chunks[0].code[0].op = Op::Jump(99);
        assert!(matches!(
            serialized.into_program(),
            Err(SerializeError::Invalid { .. })
        ));
    }
}

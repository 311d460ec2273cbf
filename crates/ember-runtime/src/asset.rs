//! Scenario asset file format.
//!
//! The unit of distribution: a named, capability-scoped, serialized program.
//! `meta` is advisory only and never affects execution.

use ember_vm::{CompiledProgram, SerializeError, SerializedProgram};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("malformed scenario asset: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Program(#[from] SerializeError),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioAsset {
    pub name: String,
    /// Capabilities this scenario is granted on top of the baseline.
    /// Empty means deny everything non-baseline.
    #[serde(default)]
    pub capabilities: Vec<String>,
    pub bytecode: SerializedProgram,
    #[serde(default)]
    pub meta: serde_json::Value,
}

impl ScenarioAsset {
    pub fn new(name: impl Into<String>, program: &CompiledProgram) -> Self {
        Self {
            name: name.into(),
            capabilities: Vec::new(),
            bytecode: SerializedProgram::from_program(program),
            meta: serde_json::Value::Null,
        }
    }

    pub fn from_json(json: &str) -> Result<Self, AssetError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, AssetError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Rebuild the executable program, validating the bytecode.
    pub fn program(&self) -> Result<CompiledProgram, AssetError> {
        Ok(self.bytecode.clone().into_program()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_compiler::compile_source;

    #[test]
    fn asset_round_trips_through_json() {
        let (program, diagnostics) = compile_source("let x = 1; fn onTick(frame, dt) { x = x + 1; }");
        assert!(diagnostics.is_empty());

        let mut asset = ScenarioAsset::new("test", &program);
        asset.capabilities.push("world.ignite".to_string());
        let json = asset.to_json().unwrap();
        let restored = ScenarioAsset::from_json(&json).unwrap();

        assert_eq!(restored.name, "test");
        assert_eq!(restored.capabilities, vec!["world.ignite"]);
        let rebuilt = restored.program().unwrap();
        assert_eq!(rebuilt.globals, program.globals);
        assert_eq!(rebuilt.entry_points, program.entry_points);
    }

    #[test]
    fn meta_is_optional() {
        let (program, _) = compile_source("let x = 1;");
        let asset = ScenarioAsset::new("bare", &program);
        let json = asset.to_json().unwrap();
        // Strip meta entirely; deserialization still succeeds.
        let mut raw: serde_json::Value = serde_json::from_str(&json).unwrap();
        raw.as_object_mut().unwrap().remove("meta");
        let restored = ScenarioAsset::from_json(&raw.to_string()).unwrap();
        assert_eq!(restored.meta, serde_json::Value::Null);
    }
}

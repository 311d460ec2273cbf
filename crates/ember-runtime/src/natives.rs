//! Native call surface: capabilities, outcomes, bindings, and the host trait.

use ember_ast::Span;
use ember_vm::Value;

use crate::rng::RngProvider;

/// Capability names gating the built-in natives.
pub mod capability {
    pub const WORLD_IGNITE: &str = "world.ignite";
    pub const WORLD_SPAWN: &str = "world.spawn";
    pub const WORLD_FACTION: &str = "world.faction";
    pub const WORLD_FIELD: &str = "world.field";
    pub const WORLD_FIELD_WRITE: &str = "world.fieldWrite";
    pub const RUNTIME_RAND: &str = "runtime.rand";
    pub const RUNTIME_LOG: &str = "runtime.log";
    pub const RUNTIME_SCHEDULE: &str = "runtime.schedule";
}

/// Grants every runtime holds even when the asset declares none.
pub fn baseline_grants() -> Vec<&'static str> {
    vec![capability::RUNTIME_RAND, capability::RUNTIME_LOG]
}

/// Capability required by a built-in native, or `None` for unknown names.
pub fn builtin_capability(name: &str) -> Option<&'static str> {
    match name {
        "ignite" => Some(capability::WORLD_IGNITE),
        "spawnAgent" => Some(capability::WORLD_SPAWN),
        "switchFaction" => Some(capability::WORLD_FACTION),
        "field" => Some(capability::WORLD_FIELD),
        "fieldWrite" => Some(capability::WORLD_FIELD_WRITE),
        "rand" | "randRange" | "randTile" => Some(capability::RUNTIME_RAND),
        "logDebug" => Some(capability::RUNTIME_LOG),
        "schedule" => Some(capability::RUNTIME_SCHEDULE),
        _ => None,
    }
}

/// Normalized result of one native invocation. Handlers may hand back bare
/// values through the `From` conversions; panics are caught at the dispatch
/// boundary and converted to `Failure`.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success(Value),
    Failure(String),
}

impl Outcome {
    pub fn failure(message: impl Into<String>) -> Self {
        Outcome::Failure(message.into())
    }
}

impl From<Value> for Outcome {
    fn from(value: Value) -> Self {
        Outcome::Success(value)
    }
}

impl From<f64> for Outcome {
    fn from(n: f64) -> Self {
        Outcome::Success(Value::Number(n))
    }
}

impl From<bool> for Outcome {
    fn from(b: bool) -> Self {
        Outcome::Success(Value::Bool(b))
    }
}

impl From<String> for Outcome {
    fn from(s: String) -> Self {
        Outcome::Success(Value::Str(s))
    }
}

impl From<()> for Outcome {
    fn from(_: ()) -> Self {
        Outcome::Success(Value::Null)
    }
}

/// Call-site metadata passed to every handler.
#[derive(Debug, Clone, Copy)]
pub struct NativeCall {
    /// Frame number of the surrounding entry call (0 during init).
    pub tick: u64,
    /// Source span of the `call` expression.
    pub span: Span,
    /// Chunk the call was issued from.
    pub chunk: u16,
}

/// A caller-supplied native handler.
pub type NativeFn = Box<dyn FnMut(&[Value], &NativeCall) -> Outcome>;

/// A named native: an optional capability gate plus the handler. Bindings
/// registered by the embedder override built-ins of the same name.
pub struct NativeBinding {
    pub capability: Option<String>,
    pub handler: NativeFn,
}

impl NativeBinding {
    /// An ungated handler, callable regardless of grants.
    pub fn new(handler: NativeFn) -> Self {
        Self {
            capability: None,
            handler,
        }
    }

    /// A handler gated behind `capability`.
    pub fn gated(capability: impl Into<String>, handler: NativeFn) -> Self {
        Self {
            capability: Some(capability.into()),
            handler,
        }
    }
}

impl std::fmt::Debug for NativeBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeBinding")
            .field("capability", &self.capability)
            .finish_non_exhaustive()
    }
}

fn unavailable(name: &str) -> Outcome {
    Outcome::Failure(format!("native unavailable: no host implementation for '{name}'"))
}

/// Host-side world interface backing the built-in natives. Every method has
/// a failing default, so an unbound built-in fails cleanly instead of
/// crashing the runtime.
pub trait Host {
    fn ignite(&mut self, _args: &[Value]) -> Outcome {
        unavailable("ignite")
    }

    fn spawn_agent(&mut self, _args: &[Value]) -> Outcome {
        unavailable("spawnAgent")
    }

    fn switch_faction(&mut self, _args: &[Value]) -> Outcome {
        unavailable("switchFaction")
    }

    fn field_read(&mut self, _args: &[Value]) -> Outcome {
        unavailable("field")
    }

    fn field_write(&mut self, _args: &[Value]) -> Outcome {
        unavailable("fieldWrite")
    }

    /// Pick a random tile. The runtime's rng provider is passed in so host
    /// randomness stays on the deterministic stream.
    fn random_tile(&mut self, _args: &[Value], _rng: &mut dyn RngProvider) -> Outcome {
        unavailable("randTile")
    }
}

/// Host with no world attached. Built-ins all report unavailable.
#[derive(Debug, Default)]
pub struct NullHost;

impl Host for NullHost {}

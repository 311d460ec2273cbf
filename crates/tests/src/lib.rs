//! Integration test harness for Ember.
//!
//! Utilities for end-to-end testing of the full pipeline:
//! lex -> parse -> compile -> (serialize) -> execute -> verify.

use std::cell::RefCell;
use std::rc::Rc;

use ember_runtime::{
    DiagnosticEvent, Host, NativeBinding, Outcome, Runtime, RuntimeConfig, RngProvider,
};
use ember_vm::{CompiledProgram, Value};

/// Compile source, panicking on any error diagnostic.
pub fn compile(source: &str) -> CompiledProgram {
    let (program, diagnostics) = ember_compiler::compile_source(source);
    assert!(
        !ember_ast::has_errors(&diagnostics),
        "compilation failed: {diagnostics:?}"
    );
    program
}

/// Test harness wrapping one runtime with a recording `log` native and a
/// recording diagnostics sink.
pub struct TestHarness {
    pub runtime: Runtime,
    calls: Rc<RefCell<Vec<Vec<Value>>>>,
    events: Rc<RefCell<Vec<DiagnosticEvent>>>,
}

impl TestHarness {
    /// Create a harness from script source with the default configuration.
    ///
    /// # Panics
    ///
    /// Panics if compilation or runtime construction fails.
    pub fn from_source(source: &str) -> Self {
        Self::with_config(source, |config| config)
    }

    /// Create a harness, letting the caller adjust the runtime configuration
    /// (grants, bindings, budget) before construction.
    pub fn with_config(
        source: &str,
        configure: impl FnOnce(RuntimeConfig) -> RuntimeConfig,
    ) -> Self {
        Self::for_program(compile(source), configure)
    }

    /// Create a harness around an already-compiled program.
    pub fn for_program(
        program: CompiledProgram,
        configure: impl FnOnce(RuntimeConfig) -> RuntimeConfig,
    ) -> Self {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let events = Rc::new(RefCell::new(Vec::new()));

        let call_log = Rc::clone(&calls);
        let log = NativeBinding::new(Box::new(move |args: &[Value], _meta| {
            call_log.borrow_mut().push(args.to_vec());
            Outcome::Success(Value::Null)
        }));
        let event_log = Rc::clone(&events);
        let sink = Box::new(move |event: &DiagnosticEvent| {
            event_log.borrow_mut().push(event.clone());
        });

        let config = configure(
            RuntimeConfig::new(program)
                .bind_native("log", log)
                .sink(sink),
        );
        let runtime = Runtime::new(config).expect("runtime construction failed");
        Self {
            runtime,
            calls,
            events,
        }
    }

    /// Arguments of every `log` call so far, in call order.
    pub fn log_calls(&self) -> Vec<Vec<Value>> {
        self.calls.borrow().clone()
    }

    /// Every diagnostic event emitted so far.
    pub fn events(&self) -> Vec<DiagnosticEvent> {
        self.events.borrow().clone()
    }

    pub fn global(&self, name: &str) -> Option<Value> {
        self.runtime.global(name)
    }
}

/// Host that records world mutations and answers field reads with a fixed
/// value, for asserting on native-call sequences.
#[derive(Default)]
pub struct RecordingHost {
    pub ignitions: Vec<Vec<Value>>,
    pub spawns: Vec<Vec<Value>>,
    pub field_value: f64,
}

impl Host for RecordingHost {
    fn ignite(&mut self, args: &[Value]) -> Outcome {
        self.ignitions.push(args.to_vec());
        Outcome::Success(Value::Bool(true))
    }

    fn spawn_agent(&mut self, args: &[Value]) -> Outcome {
        self.spawns.push(args.to_vec());
        Outcome::Success(Value::Number(self.spawns.len() as f64))
    }

    fn field_read(&mut self, _args: &[Value]) -> Outcome {
        Outcome::Success(Value::Number(self.field_value))
    }

    fn random_tile(&mut self, _args: &[Value], rng: &mut dyn RngProvider) -> Outcome {
        Outcome::Success(Value::Number(rng.range(0.0, 64.0).floor()))
    }
}

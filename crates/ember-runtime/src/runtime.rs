//! The embeddable wrapper: one VM bound to one compiled program, with
//! capability gating, result normalization, and status tracking.
//!
//! Nothing escapes `run_init`/`tick` as a panic. Fatal VM failures come back
//! as `Err` and are recorded; native handler failures are swallowed into the
//! script as null results and recorded; the host polls [`RuntimeStatus`]
//! between ticks.

use std::collections::{BTreeSet, HashMap};
use std::panic::{catch_unwind, AssertUnwindSafe};

use ember_vm::{CallSite, CompiledProgram, NativeDispatch, Value, Vm, VmError};
use tracing::{debug, warn};

use crate::asset::{AssetError, ScenarioAsset};
use crate::error::RuntimeError;
use crate::events::{DiagnosticEvent, LogSink};
use crate::natives::{
    baseline_grants, builtin_capability, Host, NativeBinding, NativeCall, NullHost, Outcome,
};
use crate::rng::{RngProvider, SplitMix64};

/// A task queued by the `schedule` native, waiting for its due frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledTask {
    pub due: f64,
    pub task: String,
}

/// Health of one runtime instance. `healthy` latches false on the first
/// failure and stays false until the runtime is dropped.
#[derive(Debug)]
pub struct RuntimeStatus {
    pub healthy: bool,
    pub last_error: Option<RuntimeError>,
}

impl Default for RuntimeStatus {
    fn default() -> Self {
        Self {
            healthy: true,
            last_error: None,
        }
    }
}

/// Construction inputs. Only the compiled program is required; everything
/// else has a deny-by-default or no-op fallback.
pub struct RuntimeConfig {
    program: CompiledProgram,
    capabilities: Vec<String>,
    bindings: Vec<(String, NativeBinding)>,
    host: Option<Box<dyn Host>>,
    rng: Option<Box<dyn RngProvider>>,
    sink: Option<LogSink>,
    budget: Option<u64>,
}

impl RuntimeConfig {
    pub fn new(program: CompiledProgram) -> Self {
        Self {
            program,
            capabilities: Vec::new(),
            bindings: Vec::new(),
            host: None,
            rng: None,
            sink: None,
            budget: None,
        }
    }

    /// Build a config from a scenario asset: its bytecode plus its declared
    /// capability grants.
    pub fn for_asset(asset: &ScenarioAsset) -> Result<Self, AssetError> {
        let program = asset.program()?;
        Ok(Self::new(program).grant_all(asset.capabilities.iter().cloned()))
    }

    pub fn grant(mut self, capability: impl Into<String>) -> Self {
        self.capabilities.push(capability.into());
        self
    }

    pub fn grant_all<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities
            .extend(capabilities.into_iter().map(Into::into));
        self
    }

    /// Register or override a native by name. Overrides shadow built-ins.
    pub fn bind_native(mut self, name: impl Into<String>, binding: NativeBinding) -> Self {
        self.bindings.push((name.into(), binding));
        self
    }

    pub fn host(mut self, host: Box<dyn Host>) -> Self {
        self.host = Some(host);
        self
    }

    pub fn rng(mut self, rng: Box<dyn RngProvider>) -> Self {
        self.rng = Some(rng);
        self
    }

    pub fn sink(mut self, sink: LogSink) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Instruction-budget override for this runtime instance.
    pub fn budget(mut self, budget: u64) -> Self {
        self.budget = Some(budget);
        self
    }
}

/// One loaded scenario. Owns the VM, the capability gate, and the status
/// record. Single-threaded: callers must serialize access to one instance.
pub struct Runtime {
    program: CompiledProgram,
    vm: Vm,
    gate: NativeGate,
    status: RuntimeStatus,
}

impl Runtime {
    pub fn new(config: RuntimeConfig) -> Result<Self, RuntimeError> {
        config
            .program
            .validate()
            .map_err(|err| RuntimeError::Config {
                message: err.to_string(),
            })?;

        let mut grants: BTreeSet<String> =
            baseline_grants().into_iter().map(str::to_string).collect();
        grants.extend(config.capabilities);

        let mut vm = Vm::for_program(&config.program);
        if let Some(budget) = config.budget {
            vm.set_budget(budget);
        }

        Ok(Self {
            vm,
            gate: NativeGate {
                grants,
                bindings: config.bindings.into_iter().collect(),
                host: config.host.unwrap_or_else(|| Box::new(NullHost)),
                rng: config.rng.unwrap_or_else(|| Box::<SplitMix64>::default()),
                sink: config.sink.unwrap_or_else(|| Box::new(|_| {})),
                tick: 0,
                pending_failure: None,
                scheduled: Vec::new(),
            },
            program: config.program,
            status: RuntimeStatus::default(),
        })
    }

    /// Reset globals, run the top-level initializers, then `onInit(seed)`.
    /// The rng provider is reseeded first, so a fixed seed replays exactly.
    pub fn run_init(&mut self, seed: u64) -> Result<(), RuntimeError> {
        debug!(seed, "run_init");
        self.gate.tick = 0;
        self.gate.pending_failure = None;
        self.gate.scheduled.clear();
        self.gate.rng.reseed(seed);

        self.vm.arm();
        self.vm.reset_globals();
        let result = self
            .vm
            .run_chunk(&self.program, 0, &[], &mut self.gate)
            .and_then(|_| {
                if self.program.entry_points.contains_key("onInit") {
                    self.vm
                        .run_entry(
                            &self.program,
                            "onInit",
                            &[Value::Number(seed as f64)],
                            &mut self.gate,
                        )
                        .map(|_| ())
                } else {
                    Ok(())
                }
            });
        self.finish(result)
    }

    /// Run `onTick(frame, dt)`. A program without `onTick` ticks as a no-op.
    pub fn tick(&mut self, frame: u64, dt: f64) -> Result<(), RuntimeError> {
        debug!(frame, dt, "tick");
        self.gate.tick = frame;
        self.gate.pending_failure = None;

        if !self.program.entry_points.contains_key("onTick") {
            return Ok(());
        }
        self.vm.arm();
        let result = self
            .vm
            .run_entry(
                &self.program,
                "onTick",
                &[Value::Number(frame as f64), Value::Number(dt)],
                &mut self.gate,
            )
            .map(|_| ());
        self.finish(result)
    }

    pub fn status(&self) -> &RuntimeStatus {
        &self.status
    }

    pub fn program(&self) -> &CompiledProgram {
        &self.program
    }

    /// Current value of a global, by script name.
    pub fn global(&self, name: &str) -> Option<Value> {
        let slot = *self.program.globals.get(name)?;
        self.vm.global(slot).cloned()
    }

    /// Tasks queued by `schedule` whose due frame has arrived. Draining them
    /// is the host's job; the runtime only keeps the queue.
    pub fn take_due_tasks(&mut self, frame: u64) -> Vec<ScheduledTask> {
        let due = frame as f64;
        let mut taken = Vec::new();
        self.gate.scheduled.retain(|task| {
            if task.due <= due {
                taken.push(task.clone());
                false
            } else {
                true
            }
        });
        taken
    }

    pub fn scheduled_tasks(&self) -> &[ScheduledTask] {
        &self.gate.scheduled
    }

    fn finish(&mut self, result: Result<(), VmError>) -> Result<(), RuntimeError> {
        match result {
            Err(err) => {
                let err = RuntimeError::from(err);
                // Capability denials already produced their watchdog event
                // at the call site.
                if !matches!(err, RuntimeError::Vm(VmError::CapabilityDenied { .. })) {
                    let event = if err.is_watchdog() {
                        DiagnosticEvent::watchdog(err.to_string())
                    } else {
                        DiagnosticEvent::error(err.to_string())
                    }
                    .during(self.gate.tick);
                    (self.gate.sink)(&event);
                }
                warn!(error = %err, "entry call failed");
                self.status.healthy = false;
                self.status.last_error = Some(err.clone());
                Err(err)
            }
            Ok(()) => {
                if let Some(failure) = self.gate.pending_failure.take() {
                    self.status.healthy = false;
                    self.status.last_error = Some(failure);
                }
                Ok(())
            }
        }
    }
}

/// The native dispatcher handed to the VM: capability checks, handler
/// invocation, panic containment, and result normalization. Split from
/// [`Runtime`] so the VM can borrow it while the program stays borrowed.
struct NativeGate {
    grants: BTreeSet<String>,
    bindings: HashMap<String, NativeBinding>,
    host: Box<dyn Host>,
    rng: Box<dyn RngProvider>,
    sink: LogSink,
    tick: u64,
    /// First native failure of the current run.
    pending_failure: Option<RuntimeError>,
    scheduled: Vec<ScheduledTask>,
}

impl NativeDispatch for NativeGate {
    fn call_native(
        &mut self,
        name: &str,
        id: u16,
        args: Vec<Value>,
        site: CallSite,
    ) -> Result<Value, VmError> {
        let required = match self.bindings.get(name) {
            Some(binding) => binding.capability.clone(),
            None => match builtin_capability(name) {
                Some(capability) => Some(capability.to_string()),
                // Not a built-in and nothing bound: broken program or
                // misconfigured host, fatal.
                None => {
                    return Err(VmError::UnknownNative {
                        id,
                        chunk: site.chunk,
                        ip: site.ip,
                    })
                }
            },
        };

        // Fail closed: the handler never runs without its capability.
        if let Some(capability) = &required {
            if !self.grants.contains(capability) {
                return self.deny(name, capability, site);
            }
        }

        let meta = NativeCall {
            tick: self.tick,
            span: site.span,
            chunk: site.chunk,
        };
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            if let Some(binding) = self.bindings.get_mut(name) {
                (binding.handler)(&args, &meta)
            } else {
                self.run_builtin(name, &args)
            }
        }))
        .unwrap_or_else(|payload| Outcome::Failure(panic_message(payload.as_ref())));

        self.normalize(name, outcome, site)
    }
}

impl NativeGate {
    fn run_builtin(&mut self, name: &str, args: &[Value]) -> Outcome {
        match name {
            "ignite" => self.host.ignite(args),
            "spawnAgent" => self.host.spawn_agent(args),
            "switchFaction" => self.host.switch_faction(args),
            "field" => self.host.field_read(args),
            "fieldWrite" => self.host.field_write(args),
            "rand" => Outcome::Success(Value::Number(self.rng.random())),
            "randRange" => match args {
                [lo, hi] => {
                    Outcome::Success(Value::Number(self.rng.range(lo.as_number(), hi.as_number())))
                }
                _ => Outcome::failure(format!("randRange expects 2 arguments, got {}", args.len())),
            },
            "randTile" => self.host.random_tile(args, self.rng.as_mut()),
            "logDebug" => {
                let message = args
                    .iter()
                    .map(Value::to_string)
                    .collect::<Vec<_>>()
                    .join(" ");
                debug!(target: "ember_script", "{message}");
                let event = DiagnosticEvent::info(message)
                    .during(self.tick)
                    .for_native("logDebug");
                (self.sink)(&event);
                Outcome::Success(Value::Null)
            }
            "schedule" => match args {
                [delay, task] => {
                    self.scheduled.push(ScheduledTask {
                        due: self.tick as f64 + delay.as_number(),
                        task: task.to_string(),
                    });
                    Outcome::Success(Value::Null)
                }
                _ => Outcome::failure(format!("schedule expects 2 arguments, got {}", args.len())),
            },
            _ => Outcome::failure(format!("native unavailable: '{name}'")),
        }
    }

    fn deny(&mut self, name: &str, capability: &str, site: CallSite) -> Result<Value, VmError> {
        warn!(native = name, capability, "capability denied");
        let event = DiagnosticEvent::watchdog(format!(
            "missing capability '{capability}' for native '{name}'"
        ))
        .at(site.chunk, site.span)
        .during(self.tick)
        .for_native(name);
        (self.sink)(&event);
        Err(VmError::CapabilityDenied {
            native: name.to_string(),
            capability: capability.to_string(),
        })
    }

    fn normalize(&mut self, name: &str, outcome: Outcome, site: CallSite) -> Result<Value, VmError> {
        match outcome {
            Outcome::Success(value) => Ok(value),
            Outcome::Failure(message) => {
                warn!(native = name, %message, "native failure");
                let event = DiagnosticEvent::error(message.clone())
                    .at(site.chunk, site.span)
                    .during(self.tick)
                    .for_native(name);
                (self.sink)(&event);
                if self.pending_failure.is_none() {
                    self.pending_failure = Some(RuntimeError::NativeFailure {
                        native: name.to_string(),
                        message,
                    });
                }
                // The script sees null and keeps running.
                Ok(Value::Null)
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("native handler panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("native handler panicked: {message}")
    } else {
        "native handler panicked".to_string()
    }
}

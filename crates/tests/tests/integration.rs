//! End-to-end tests: source through compile, serialization, and execution.

use ember_runtime::{
    capability, EventKind, Runtime, RuntimeConfig, RuntimeError, ScenarioAsset,
};
use ember_tests::{compile, RecordingHost, TestHarness};
use ember_vm::{SerializedProgram, Value, VmError};
use proptest::prelude::*;

#[test]
fn counter_scenario_logs_and_updates_state() {
    let mut harness = TestHarness::from_source(
        "let counter = 0;\n\
         fn onInit(seed) {\n\
             counter = seed;\n\
             call log(counter);\n\
         }\n\
         fn onTick(frame, dt) {\n\
             counter = counter + 1;\n\
             call log(counter);\n\
         }",
    );

    harness.runtime.run_init(7).unwrap();
    harness.runtime.tick(0, 0.16).unwrap();

    assert!(harness.runtime.status().healthy);
    assert_eq!(
        harness.log_calls(),
        vec![vec![Value::Number(7.0)], vec![Value::Number(8.0)]]
    );
    assert_eq!(harness.global("counter"), Some(Value::Number(8.0)));
}

/// A program must behave identically after a JSON round trip: same log
/// sequence, same final globals.
#[test]
fn serialized_program_executes_identically() {
    let source = "let total = 0;\n\
         let label = \"sum=\";\n\
         fn onInit(seed) { total = seed * 2; }\n\
         fn onTick(frame, dt) {\n\
             let i = 0;\n\
             while (i < 3) {\n\
                 total = total + frame;\n\
                 i = i + 1;\n\
             }\n\
             if (total > 10 && frame != 0) {\n\
                 call log(label + total);\n\
             } else {\n\
                 call log(total);\n\
             }\n\
         }";
    let original = compile(source);

    let json = serde_json::to_string(&SerializedProgram::from_program(&original)).unwrap();
    let restored: SerializedProgram = serde_json::from_str(&json).unwrap();
    let restored = restored.into_program().unwrap();

    let mut a = TestHarness::for_program(original, |config| config);
    let mut b = TestHarness::for_program(restored, |config| config);
    for harness in [&mut a, &mut b] {
        harness.runtime.run_init(4).unwrap();
        for frame in 0..3 {
            harness.runtime.tick(frame, 0.1).unwrap();
        }
    }

    assert_eq!(a.log_calls(), b.log_calls());
    assert_eq!(a.global("total"), b.global("total"));
    assert_eq!(a.global("total"), Some(Value::Number(17.0)));
}

#[test]
fn scenario_asset_round_trips_with_grants() {
    let program = compile("fn onTick(frame, dt) { schedule(2, \"respawn\"); }");
    let mut asset = ScenarioAsset::new("respawner", &program);
    asset
        .capabilities
        .push(capability::RUNTIME_SCHEDULE.to_string());

    let json = asset.to_json().unwrap();
    let loaded = ScenarioAsset::from_json(&json).unwrap();
    assert_eq!(loaded.name, "respawner");

    let mut runtime = Runtime::new(RuntimeConfig::for_asset(&loaded).unwrap()).unwrap();
    runtime.tick(5, 0.1).unwrap();
    assert!(runtime.status().healthy);
    let due = runtime.take_due_tasks(7);
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].task, "respawn");
}

#[test]
fn same_seed_replays_the_same_run() {
    let source = "let x = 0;\n\
         fn onInit(seed) { x = call rand(); }\n\
         fn onTick(frame, dt) {\n\
             x = call randRange(0, 100);\n\
             call log(x);\n\
         }";
    let mut a = TestHarness::from_source(source);
    let mut b = TestHarness::from_source(source);
    for harness in [&mut a, &mut b] {
        harness.runtime.run_init(1234).unwrap();
        for frame in 0..5 {
            harness.runtime.tick(frame, 0.1).unwrap();
        }
    }
    assert_eq!(a.log_calls(), b.log_calls());
    assert_eq!(a.global("x"), b.global("x"));

    let mut c = TestHarness::from_source(source);
    c.runtime.run_init(4321).unwrap();
    for frame in 0..5 {
        c.runtime.tick(frame, 0.1).unwrap();
    }
    assert_ne!(a.log_calls(), c.log_calls());
}

#[test]
fn ungranted_world_native_is_denied() {
    let mut harness = TestHarness::with_config(
        "fn onTick(frame, dt) { call spawnAgent(\"wolf\", 3, 4); }",
        |config| config.host(Box::new(RecordingHost::default())),
    );

    let err = harness.runtime.tick(0, 0.1).unwrap_err();
    assert!(err.is_watchdog());
    assert!(err.to_string().contains("world.spawn"));
    assert!(!harness.runtime.status().healthy);
    assert!(harness
        .events()
        .iter()
        .any(|event| event.kind == EventKind::Watchdog
            && event.native.as_deref() == Some("spawnAgent")));
}

#[test]
fn granted_world_native_reaches_the_host() {
    let mut harness = TestHarness::with_config(
        "fn onTick(frame, dt) {\n\
             let lit = call ignite(3, 4);\n\
             call log(lit);\n\
         }",
        |config| {
            config
                .grant(capability::WORLD_IGNITE)
                .host(Box::new(RecordingHost::default()))
        },
    );

    harness.runtime.tick(0, 0.1).unwrap();
    assert!(harness.runtime.status().healthy);
    assert_eq!(harness.log_calls(), vec![vec![Value::Bool(true)]]);
}

#[test]
fn budget_aborts_at_the_configured_limit() {
    let mut harness = TestHarness::with_config(
        "fn onTick(frame, dt) { while (true) {} }",
        |config| config.budget(250),
    );

    let err = harness.runtime.tick(0, 0.1).unwrap_err();
    match err {
        RuntimeError::Vm(VmError::BudgetExceeded {
            limit, executed, ..
        }) => {
            assert_eq!(limit, 250);
            assert_eq!(executed, 250);
        }
        other => panic!("expected a budget trip, got {other:?}"),
    }
    assert!(!harness.runtime.status().healthy);
}

#[test]
fn init_shares_one_budget_window_across_top_level_and_on_init() {
    // Top level and onInit each fit a budget of 12 alone but not together.
    let source = "let a = 1; let b = 2; let c = 3;\n\
         fn onInit(seed) { let i = seed; }";
    let mut tight = TestHarness::with_config(source, |config| config.budget(12));
    let err = tight.runtime.run_init(0).unwrap_err();
    assert!(err.is_watchdog());

    let mut roomy = TestHarness::with_config(source, |config| config.budget(100));
    roomy.runtime.run_init(0).unwrap();
    assert!(roomy.runtime.status().healthy);
}

/// Only `false` and `null` are falsy. Zero and the empty string take the
/// true branch.
#[test]
fn zero_and_empty_string_are_truthy() {
    let mut harness = TestHarness::from_source(
        "let fromZero = \"?\";\n\
         let fromEmpty = \"?\";\n\
         let fromNull = \"?\";\n\
         fn onInit(seed) {\n\
             if (0) { fromZero = \"true\"; } else { fromZero = \"false\"; }\n\
             if (\"\") { fromEmpty = \"true\"; } else { fromEmpty = \"false\"; }\n\
             if (null) { fromNull = \"true\"; } else { fromNull = \"false\"; }\n\
         }",
    );
    harness.runtime.run_init(0).unwrap();
    assert_eq!(harness.global("fromZero"), Some(Value::Str("true".into())));
    assert_eq!(harness.global("fromEmpty"), Some(Value::Str("true".into())));
    assert_eq!(harness.global("fromNull"), Some(Value::Str("false".into())));
}

#[test]
fn schedule_needs_its_grant() {
    let source = "fn onInit(seed) { schedule(10, \"spawnWave\"); }";

    let mut denied = TestHarness::from_source(source);
    let err = denied.runtime.run_init(0).unwrap_err();
    assert!(err.to_string().contains("missing capability"));
    assert!(!denied.runtime.status().healthy);

    let mut granted = TestHarness::with_config(source, |config| {
        config.grant(capability::RUNTIME_SCHEDULE)
    });
    granted.runtime.run_init(0).unwrap();
    assert!(granted.runtime.status().healthy);
    assert_eq!(granted.runtime.scheduled_tasks().len(), 1);
    assert_eq!(granted.runtime.scheduled_tasks()[0].due, 10.0);
}

#[test]
fn parse_errors_do_not_abort_compilation_of_later_statements() {
    let (program, diagnostics) = ember_compiler::compile_source(
        "let a = ;\nlet b = 2;\nfn onTick(frame, dt) { b = b + 1; }",
    );
    assert!(ember_ast::has_errors(&diagnostics));
    // Recovery kept the later declarations.
    assert!(program.globals.contains_key("b"));
    assert!(program.entry_points.contains_key("onTick"));
}

fn arithmetic_source(seed: i64, terms: &[(i64, char)]) -> String {
    let mut source = format!("let g0 = {seed};\n");
    for (i, (value, op)) in terms.iter().enumerate() {
        source.push_str(&format!("let g{} = g{} {} {};\n", i + 1, i, op, value));
    }
    source
}

proptest! {
    /// Arbitrary straight-line arithmetic programs survive the JSON round
    /// trip with identical global state.
    #[test]
    fn round_trip_preserves_arithmetic_globals(
        seed in -1_000i64..1_000,
        terms in proptest::collection::vec(
            (-1_000i64..1_000, prop_oneof![Just('+'), Just('-'), Just('*')]),
            1..6,
        ),
    ) {
        let source = arithmetic_source(seed, &terms);
        let original = compile(&source);

        let json = serde_json::to_string(&SerializedProgram::from_program(&original)).unwrap();
        let restored: SerializedProgram = serde_json::from_str(&json).unwrap();
        let restored = restored.into_program().unwrap();

        let mut a = Runtime::new(RuntimeConfig::new(original)).unwrap();
        let mut b = Runtime::new(RuntimeConfig::new(restored)).unwrap();
        a.run_init(0).unwrap();
        b.run_init(0).unwrap();

        for i in 0..=terms.len() {
            let name = format!("g{i}");
            prop_assert_eq!(a.global(&name), b.global(&name));
        }
    }
}

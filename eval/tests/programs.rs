//! End-to-end checks that compiled programs reproduce tree evaluation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use assert_matches::assert_matches;
use rand::{rngs::StdRng, Rng, SeedableRng};

use ntuple_eval::{CacheStore, Compiler, Frame, Vm};
use ntuple_expr::{
    evaluate, parse_expression, transform, EvalError, Expr, Function, NativeFn, Value, ValueType,
};

const SEED: u64 = 2_718_281_828;

fn event_types() -> HashMap<String, ValueType> {
    let mut types = HashMap::new();
    types.insert("px".to_owned(), ValueType::Float);
    types.insert("py".to_owned(), ValueType::Float);
    types.insert("pz".to_owned(), ValueType::Float);
    types.insert("energy".to_owned(), ValueType::Float);
    types.insert("charge".to_owned(), ValueType::Int);
    types.insert("njets".to_owned(), ValueType::Int);
    types.insert("trigger".to_owned(), ValueType::Bool);
    types
}

fn random_event(rng: &mut StdRng) -> HashMap<String, Value> {
    let mut event = HashMap::new();
    event.insert("px".to_owned(), Value::Float(rng.gen_range(-50.0..50.0)));
    event.insert("py".to_owned(), Value::Float(rng.gen_range(-50.0..50.0)));
    event.insert("pz".to_owned(), Value::Float(rng.gen_range(-120.0..120.0)));
    event.insert("energy".to_owned(), Value::Float(rng.gen_range(1.0..250.0)));
    event.insert("charge".to_owned(), Value::Int(rng.gen_range(-1..=1)));
    event.insert("njets".to_owned(), Value::Int(rng.gen_range(0..8)));
    event.insert("trigger".to_owned(), Value::Bool(rng.gen_bool(0.7)));
    event
}

fn frame_for(event: &HashMap<String, Value>) -> Frame {
    let mut frame = Frame::new();
    for (name, value) in event {
        frame.set_named(name, value.clone());
    }
    frame
}

fn event_compiler() -> Compiler {
    event_types()
        .into_iter()
        .fold(Compiler::new(), |compiler, (name, ty)| {
            compiler.with_symbol_type(name, ty)
        })
}

/// The tree the compiler lowers: symbol types applied, casts inserted.
fn typed(expr: &Arc<Expr>) -> Arc<Expr> {
    transform::insert_casts(&transform::set_types(expr, &event_types()))
}

#[test]
fn compiled_programs_agree_with_tree_evaluation() {
    let formulas = [
        "sqrt(px ** 2 + py ** 2)",
        "hypot(px, py, pz)",
        "energy - hypot(px, py, pz)",
        "abs(charge) + njets",
        "px / energy",
        "njets % 3 == 0",
        "njets // 2 + charge",
        "trigger and sqrt(px ** 2 + py ** 2) > 20.0",
        "if_then(trigger, energy, 0.0)",
        "min(njets, 4) * max(abs(px), abs(py))",
        "in_range(px / energy, -0.5, 0.5)",
        "near(px, py, 10.0)",
        "0.0 <= energy < 250.0",
        "(njets & 1) == 1 or trigger",
        "njets << 2 | abs(charge)",
        "atan2(py, px)",
        "gaussian(0.0, 25.0, px)",
        "get_bit(njets, 2)",
        "-px * 2 + py * 0.5",
        "~njets + if_then(charge == 0, 0, 1)",
        "not trigger",
        "cos(pz / 120.0) ** 2 + sin(pz / 120.0) ** 2",
    ];

    let mut rng = StdRng::seed_from_u64(SEED);
    let events: Vec<_> = (0..32).map(|_| random_event(&mut rng)).collect();

    let compiler = event_compiler();
    let mut vm = Vm::new();
    for formula in formulas {
        let expr = parse_expression(formula).unwrap();
        let program = compiler.compile(&expr);
        let reference = typed(&expr);

        for event in &events {
            let frame = frame_for(event);
            let expected = evaluate(&reference, event).unwrap();
            let actual = vm.run(&program, &frame).unwrap();
            assert_eq!(actual, expected, "formula `{formula}` diverged");
        }
    }
}

#[test]
fn short_circuits_guard_faulting_tails() {
    let mut vm = Vm::new();
    let compiler = event_compiler();

    let guarded = parse_expression("njets != 0 and energy / njets > 20.0").unwrap();
    let program = compiler.compile(&guarded);
    let mut event = random_event(&mut StdRng::seed_from_u64(SEED));
    event.insert("njets".to_owned(), Value::Int(0));

    let result = vm.run(&program, &frame_for(&event)).unwrap();
    assert_eq!(result, Value::Bool(false));
    assert_eq!(evaluate(&typed(&guarded), &event).unwrap(), result);

    // Same guard, other direction.
    let fallback = parse_expression("njets == 0 or energy / njets > 20.0").unwrap();
    let program = compiler.compile(&fallback);
    let result = vm.run(&program, &frame_for(&event)).unwrap();
    assert_eq!(result, Value::Bool(true));
}

#[test]
fn conditionals_run_only_the_selected_branch() {
    let expr = parse_expression("if_then(njets == 0, 0.0, energy / njets)").unwrap();
    let program = event_compiler().compile(&expr);

    let mut event = random_event(&mut StdRng::seed_from_u64(SEED));
    event.insert("njets".to_owned(), Value::Int(0));

    let mut vm = Vm::new();
    let result = vm.run(&program, &frame_for(&event)).unwrap();
    assert_eq!(result, Value::Float(0.0));
}

#[test]
fn faults_are_identical_to_the_interpreter() {
    let formulas = [
        "sqrt(px - 100.0)",
        "log(energy - 300.0)",
        "energy // (njets - njets)",
        "njets << 70",
    ];

    let mut rng = StdRng::seed_from_u64(SEED);
    let event = random_event(&mut rng);
    let compiler = event_compiler();
    let mut vm = Vm::new();

    for formula in formulas {
        let expr = parse_expression(formula).unwrap();
        let program = compiler.compile(&expr);

        let expected = evaluate(&typed(&expr), &event).unwrap_err();
        let actual = vm.run(&program, &frame_for(&event)).unwrap_err();
        assert_eq!(actual, expected, "formula `{formula}` faulted differently");
    }
}

#[test]
fn unbound_symbols_are_reported_by_name() {
    let expr = parse_expression("sqrt(programs_test_missing)").unwrap();
    let program = Compiler::new()
        .with_symbol_type("programs_test_missing", ValueType::Float)
        .compile(&expr);

    let mut vm = Vm::new();
    assert_matches!(
        vm.run(&program, &Frame::new()),
        Err(EvalError::Symbol(name)) if name == "programs_test_missing"
    );
}

#[test]
fn string_expressions_take_the_interpreter_path() {
    let expr = parse_expression("'mu' in label and energy > 10.0").unwrap();
    let program = event_compiler().compile(&expr);

    let mut event = random_event(&mut StdRng::seed_from_u64(SEED));
    event.insert("label".to_owned(), Value::Str("dimuon".into()));
    event.insert("energy".to_owned(), Value::Float(55.0));

    let mut vm = Vm::new();
    let result = vm.run(&program, &frame_for(&event)).unwrap();
    assert_eq!(result, Value::Bool(true));
    assert_eq!(evaluate(&typed(&expr), &event).unwrap(), result);
}

#[derive(Default)]
struct CountingDouble {
    calls: AtomicUsize,
}

impl NativeFn for CountingDouble {
    fn name(&self) -> &str {
        "counting_double"
    }

    fn call(&self, args: &[Value]) -> Result<Value, EvalError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match args[0].as_f64() {
            Some(x) => Ok(Value::Float(x * 2.0)),
            None => Err(EvalError::Type("counting_double expects a number".into())),
        }
    }
}

#[test]
fn caches_skip_recomputation_for_repeated_rows() {
    let counting = Arc::new(CountingDouble::default());
    let function = Expr::constant(Value::Function(Function::Native(
        Arc::clone(&counting) as Arc<dyn NativeFn>
    )));
    let call = Expr::call(
        function,
        vec![Expr::typed_symbol("programs_test_pt", ValueType::Float)],
    );
    let expr = Expr::cached(0, call);

    let program = Compiler::new().compile(&expr);
    let mut caches = CacheStore::new();
    let slot = caches.add(ValueType::Object, 4);
    assert_eq!(slot, 0);

    let mut frame = Frame::new();
    frame.set_named("programs_test_pt", Value::Float(3.0));
    frame.set_row(Some(2));

    let mut vm = Vm::new();
    let first = vm.run_cached(&program, &frame, &mut caches).unwrap();
    let second = vm.run_cached(&program, &frame, &mut caches).unwrap();
    assert_eq!(first, Value::Float(6.0));
    assert_eq!(second, first);
    assert_eq!(counting.calls.load(Ordering::SeqCst), 1);

    // A different row recomputes once more.
    frame.set_row(Some(3));
    vm.run_cached(&program, &frame, &mut caches).unwrap();
    assert_eq!(counting.calls.load(Ordering::SeqCst), 2);

    // Invalidation forces a fresh evaluation.
    caches.reset();
    vm.run_cached(&program, &frame, &mut caches).unwrap();
    assert_eq!(counting.calls.load(Ordering::SeqCst), 3);
}

#[test]
fn rowless_frames_bypass_caches() {
    let counting = Arc::new(CountingDouble::default());
    let function = Expr::constant(Value::Function(Function::Native(
        Arc::clone(&counting) as Arc<dyn NativeFn>
    )));
    let call = Expr::call(
        function,
        vec![Expr::typed_symbol("programs_test_q", ValueType::Float)],
    );
    let expr = Expr::cached(0, call);

    let program = Compiler::new().compile(&expr);
    let mut caches = CacheStore::new();
    caches.add(ValueType::Object, 1);

    let mut frame = Frame::new();
    frame.set_named("programs_test_q", Value::Float(1.0));

    let mut vm = Vm::new();
    vm.run_cached(&program, &frame, &mut caches).unwrap();
    vm.run_cached(&program, &frame, &mut caches).unwrap();
    assert_eq!(counting.calls.load(Ordering::SeqCst), 2);
}

#[test]
fn disassembly_mentions_every_instruction() {
    let expr = parse_expression("if_then(trigger, energy, 0.0)").unwrap();
    let program = event_compiler().compile(&expr);

    let listing = program.to_string();
    assert!(listing.contains("bool_symbol"));
    assert!(listing.contains("jump_if_true"));
    assert!(listing.contains("float_symbol"));
    assert_eq!(listing.lines().count(), program.len() + 1);
}

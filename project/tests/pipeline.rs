//! End-to-end checks of the table-to-histogram pipeline.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use assert_matches::assert_matches;

use ntuple_eval::Op;
use ntuple_expr::{
    parse_expression, EvalError, Expr, Function, NativeFn, NumericError, Value, ValueType,
};
use ntuple_hist::{BinIndex, BinType, BinnedAxis, ErrorModel, Histogram};
use ntuple_project::{ColumnData, ErrorPolicy, MemoryTable, ProjectError, Projection, Projector};

fn three_rows() -> MemoryTable {
    MemoryTable::from_columns(vec![
        ("x", ColumnData::Int(vec![1, 2, 3])),
        ("w", ColumnData::Float(vec![0.5, 1.0, 2.0])),
    ])
    .unwrap()
}

fn one_bin() -> Histogram {
    let axis = BinnedAxis::even(1, (0.0, 5.0), ValueType::Float).unwrap();
    Histogram::new(vec![axis], BinType::Float, ErrorModel::Symmetric).unwrap()
}

/// Runs `formula` as an unweighted, unselected projection and collects the
/// values the sink receives, row by row.
fn projected_values(table: &MemoryTable, formula: &str) -> Vec<Value> {
    let target = parse_expression(formula).unwrap();
    let mut collected = Vec::new();
    let mut sink = |value: &Value, _: f64| -> Result<(), ProjectError> {
        collected.push(value.clone());
        Ok(())
    };
    let mut projections = [Projection::new(&target, &mut sink)];
    Projector::new().project(table, &mut projections).unwrap();
    collected
}

#[test]
fn weights_and_selections_shape_the_fill() {
    let table = three_rows();
    let mut histogram = one_bin();

    let target = parse_expression("x").unwrap();
    let cut = parse_expression("x > 1").unwrap();
    let weight = parse_expression("w").unwrap();

    let mut projections = [Projection::new(&target, &mut histogram).with_selection(&cut)];
    let total = Projector::new()
        .with_weight(&weight)
        .project(&table, &mut projections)
        .unwrap();

    // Every row contributes its weight to the total; only the two selected
    // rows reach the histogram.
    assert_eq!(total, 3.5);
    assert_eq!(histogram.bin_content(&[BinIndex::Bin(0)]).unwrap(), 3.0);
    assert_eq!(histogram.number_of_samples(), 2);

    let (low, high) = histogram.bin_error(&[BinIndex::Bin(0)]).unwrap();
    assert_eq!(low, 5.0_f64.sqrt());
    assert_eq!(high, low);
}

#[test]
fn faulting_selections_follow_the_policy() {
    let table = three_rows();
    let target = parse_expression("x").unwrap();
    let cut = parse_expression("1 / (x - 2) > 0").unwrap();

    let mut histogram = one_bin();
    let mut projections = [Projection::new(&target, &mut histogram).with_selection(&cut)];
    let err = Projector::new()
        .project(&table, &mut projections)
        .unwrap_err();
    assert_matches!(
        err,
        ProjectError::Eval {
            fault: EvalError::Numeric(NumericError::DivisionByZero),
            ..
        }
    );

    // Skipping drops the faulting row from this projection only; the other
    // rows and the weight total are unaffected.
    let mut histogram = one_bin();
    let mut projections = [Projection::new(&target, &mut histogram).with_selection(&cut)];
    let total = Projector::new()
        .on_error(ErrorPolicy::WarnAndSkip)
        .project(&table, &mut projections)
        .unwrap();

    assert_eq!(total, 3.0);
    assert_eq!(histogram.bin_content(&[BinIndex::Bin(0)]).unwrap(), 1.0);
    assert_eq!(histogram.number_of_samples(), 1);
}

#[test]
fn faulting_weights_drop_the_whole_row() {
    let table = three_rows();
    let target = parse_expression("x").unwrap();
    let weight = parse_expression("6.0 / (x - 2)").unwrap();

    let mut histogram = one_bin();
    let mut projections = [Projection::new(&target, &mut histogram)];
    assert_matches!(
        Projector::new()
            .with_weight(&weight)
            .project(&table, &mut projections),
        Err(ProjectError::Eval { .. })
    );

    // Rows 0 and 2 weigh -6 and +6; row 1 is dropped before any sink runs.
    let mut histogram = one_bin();
    let mut projections = [Projection::new(&target, &mut histogram)];
    let total = Projector::new()
        .with_weight(&weight)
        .on_error(ErrorPolicy::WarnAndSkip)
        .project(&table, &mut projections)
        .unwrap();

    assert_eq!(total, 0.0);
    assert_eq!(histogram.bin_content(&[BinIndex::Bin(0)]).unwrap(), 0.0);
    assert_eq!(histogram.number_of_samples(), 2);
}

#[derive(Default)]
struct CountingDouble {
    calls: AtomicUsize,
}

impl NativeFn for CountingDouble {
    fn name(&self) -> &str {
        "pipeline_double"
    }

    fn call(&self, args: &[Value]) -> Result<Value, EvalError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match args[0].as_f64() {
            Some(x) => Ok(Value::Float(x * 2.0)),
            None => Err(EvalError::Type("pipeline_double expects a number".into())),
        }
    }
}

#[test]
fn registered_expressions_are_computed_once_per_row() {
    let table =
        MemoryTable::from_columns(vec![("pt", ColumnData::Float(vec![4.0, 9.0]))]).unwrap();

    let counting = Arc::new(CountingDouble::default());
    let function = Expr::constant(Value::Function(Function::Native(
        Arc::clone(&counting) as Arc<dyn NativeFn>
    )));
    let shared = Expr::call(function, vec![Expr::symbol("pt")]);
    assert_eq!(table.cache_expression(&shared), 0);

    // The marker shows up in every program compiled against the table.
    let program = table.compile(&shared);
    assert!(program
        .ops()
        .iter()
        .any(|op| matches!(op, Op::ObjectCacheGet { .. })));

    let mut first = Vec::new();
    let mut second = Vec::new();
    let mut sink_a = |value: &Value, weight: f64| -> Result<(), ProjectError> {
        first.push((value.clone(), weight));
        Ok(())
    };
    let mut sink_b = |value: &Value, weight: f64| -> Result<(), ProjectError> {
        second.push((value.clone(), weight));
        Ok(())
    };
    let mut projections = [
        Projection::new(&shared, &mut sink_a),
        Projection::new(&shared, &mut sink_b),
    ];
    Projector::new().project(&table, &mut projections).unwrap();

    // Two rows and two projections, but each row computes the call once.
    assert_eq!(counting.calls.load(Ordering::SeqCst), 2);
    assert_eq!(first, [(Value::Float(8.0), 1.0), (Value::Float(18.0), 1.0)]);
    assert_eq!(second, first);
}

#[test]
fn pseudo_columns_expose_the_row_and_the_table() {
    let table = MemoryTable::from_columns(vec![("pt", ColumnData::Float(vec![5.0, 6.0, 7.0]))])
        .unwrap()
        .with_name("events");

    assert_eq!(
        projected_values(&table, "_index"),
        [Value::Int(0), Value::Int(1), Value::Int(2)]
    );
    assert_eq!(
        projected_values(&table, "_table.rows"),
        vec![Value::Int(3); 3]
    );
    assert_eq!(
        projected_values(&table, "pt * 2.0"),
        [Value::Float(10.0), Value::Float(12.0), Value::Float(14.0)]
    );
}

#[test]
fn detached_rows_project_without_a_table() {
    let events: Vec<HashMap<String, Value>> = (1..=4)
        .map(|njets| {
            let mut event = HashMap::new();
            event.insert("njets".to_owned(), Value::Int(njets));
            event
        })
        .collect();

    let target = parse_expression("njets").unwrap();
    let cut = parse_expression("njets % 2 == 0").unwrap();
    let weight = parse_expression("0.5 * njets").unwrap();

    let axis = BinnedAxis::even(5, (0.0, 5.0), ValueType::Float).unwrap();
    let mut histogram =
        Histogram::new(vec![axis], BinType::Float, ErrorModel::Symmetric).unwrap();
    let mut projections = [Projection::new(&target, &mut histogram).with_selection(&cut)];
    let total = Projector::new()
        .with_weight(&weight)
        .project_rows(events, &mut projections)
        .unwrap();

    assert_eq!(total, 5.0);
    assert_eq!(histogram.bin_content(&[BinIndex::Bin(2)]).unwrap(), 1.0);
    assert_eq!(histogram.bin_content(&[BinIndex::Bin(4)]).unwrap(), 2.0);
    assert_eq!(histogram.number_of_samples(), 2);
}

//! Columnar in-memory tables.
//!
//! A [`MemoryTable`] stores events column by column and is the unit formulas
//! are compiled against: [`MemoryTable::compile`] types every symbol naming a
//! column, wraps registered shared subexpressions in cache markers and hands
//! the tree to the bytecode compiler. Rows are cheap views borrowing the
//! table; they expose the reserved `_index` and `_table` bindings next to
//! the columns.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ntuple_eval::{CacheStore, CompiledProgram, Compiler};
use ntuple_expr::{transform, Bindings, Builtins, Expr, ObjectValue, Value, ValueType};

use crate::error::ProjectError;
use crate::schema::{Column, Schema};

/// Values of one table column.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    /// Boolean flags.
    Bool(Vec<bool>),
    /// Integer values.
    Int(Vec<i64>),
    /// Float values.
    Float(Vec<f64>),
    /// Anything else: strings, tuples, opaque objects.
    Object(Vec<Value>),
}

impl ColumnData {
    /// Number of rows in the column.
    pub fn len(&self) -> usize {
        match self {
            Self::Bool(values) => values.len(),
            Self::Int(values) => values.len(),
            Self::Float(values) => values.len(),
            Self::Object(values) => values.len(),
        }
    }

    /// Whether the column has no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Type tag the compiler assigns to symbols reading this column.
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Bool(_) => ValueType::Bool,
            Self::Int(_) => ValueType::Int,
            Self::Float(_) => ValueType::Float,
            Self::Object(_) => ValueType::Object,
        }
    }

    /// Value of one row.
    pub fn value(&self, row: usize) -> Option<Value> {
        match self {
            Self::Bool(values) => values.get(row).copied().map(Value::Bool),
            Self::Int(values) => values.get(row).copied().map(Value::Int),
            Self::Float(values) => values.get(row).copied().map(Value::Float),
            Self::Object(values) => values.get(row).cloned(),
        }
    }
}

/// What the `_table` binding exposes to formulas.
#[derive(Debug)]
struct TableMeta {
    name: Option<String>,
    rows: usize,
    columns: Vec<String>,
}

impl ObjectValue for TableMeta {
    fn type_name(&self) -> &'static str {
        "table"
    }

    fn attr(&self, name: &str) -> Option<Value> {
        match name {
            "rows" => Some(Value::Int(self.rows as i64)),
            "name" => self.name.clone().map(Value::from),
            "columns" => Some(Value::tuple(
                self.columns.iter().cloned().map(Value::from),
            )),
            _ => None,
        }
    }
}

/// Columnar table of events.
#[derive(Debug)]
pub struct MemoryTable {
    schema: Schema,
    columns: Vec<ColumnData>,
    rows: usize,
    meta: Arc<TableMeta>,
    caches: Mutex<CacheStore>,
    cached: Mutex<Vec<Arc<Expr>>>,
}

impl MemoryTable {
    /// Builds a table from named columns.
    ///
    /// Column names must be unique and all columns must have the same number
    /// of rows. A column whose name collides with a parser builtin is kept
    /// but cannot be read from formulas, since the parser resolves such
    /// names first; this logs a warning.
    pub fn from_columns<N: Into<String>>(
        columns: Vec<(N, ColumnData)>,
    ) -> Result<Self, ProjectError> {
        let mut described = Vec::with_capacity(columns.len());
        let mut data = Vec::with_capacity(columns.len());
        let mut rows = None;
        for (name, column) in columns {
            let name = name.into();
            match rows {
                None => rows = Some(column.len()),
                Some(expected) if expected != column.len() => {
                    return Err(ProjectError::ColumnLength {
                        name,
                        expected,
                        found: column.len(),
                    });
                }
                Some(_) => {}
            }
            if Builtins::standard().is_reserved(&name) {
                log::warn!("column `{name}` shadows a builtin; formulas cannot read it");
            }
            described.push(Column::new(name, column.value_type()));
            data.push(column);
        }
        let schema = Schema::new(described)?;
        let rows = rows.unwrap_or(0);
        Ok(Self {
            meta: Arc::new(TableMeta {
                name: None,
                rows,
                columns: schema.columns().iter().map(|c| c.name.clone()).collect(),
            }),
            schema,
            columns: data,
            rows,
            caches: Mutex::new(CacheStore::new()),
            cached: Mutex::new(Vec::new()),
        })
    }

    /// Names the table; the name is visible to formulas as `_table.name`.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.meta = Arc::new(TableMeta {
            name: Some(name.into()),
            rows: self.meta.rows,
            columns: self.meta.columns.clone(),
        });
        self
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows
    }

    /// Whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Name given with [`with_name`](Self::with_name), if any.
    pub fn name(&self) -> Option<&str> {
        self.meta.name.as_deref()
    }

    /// The table's column layout.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// View of one row.
    pub fn row(&self, index: usize) -> Option<Row<'_>> {
        (index < self.rows).then_some(Row { table: self, index })
    }

    /// Iterates over all rows in order.
    pub fn rows(&self) -> Rows<'_> {
        Rows {
            table: self,
            index: 0,
        }
    }

    /// Value of one cell, by row and column name.
    pub fn value(&self, row: usize, name: &str) -> Option<Value> {
        self.row(row)?.get(name)
    }

    /// Compiles a formula against the table.
    ///
    /// Symbols naming columns get the column's type, `_index` is an int and
    /// any subtree registered with
    /// [`cache_expression`](Self::cache_expression) is wrapped in a cache
    /// marker, so every program compiled here shares its per-row results.
    pub fn compile(&self, expr: &Arc<Expr>) -> CompiledProgram {
        let typed = self.typed(expr);
        let expanded = self.cache_expand(&typed);
        Compiler::new().compile(&expanded)
    }

    /// Registers a subexpression whose value is cached per row.
    ///
    /// Programs compiled afterwards recompute the subtree at most once per
    /// row between them. Returns the cache slot.
    pub fn cache_expression(&self, expr: &Arc<Expr>) -> usize {
        let typed = self.typed(expr);
        let mut registered = self.cached.lock().unwrap_or_else(PoisonError::into_inner);
        let slot = self
            .caches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .add(typed.result_type(), self.rows);
        debug_assert_eq!(slot, registered.len());
        registered.push(typed);
        slot
    }

    /// Applies the schema's symbol types to a tree.
    fn typed(&self, expr: &Arc<Expr>) -> Arc<Expr> {
        let mut types: HashMap<_, _> = self
            .schema
            .columns()
            .iter()
            .map(|column| (column.name.clone(), column.ty))
            .collect();
        types.insert("_index".to_owned(), ValueType::Int);
        transform::set_types(expr, &types)
    }

    /// Wraps registered subtrees in cache markers. `expr` must already be
    /// typed, since the registered trees are.
    fn cache_expand(&self, expr: &Arc<Expr>) -> Arc<Expr> {
        let registered = self.cached.lock().unwrap_or_else(PoisonError::into_inner);
        if registered.is_empty() {
            return Arc::clone(expr);
        }
        transform::rewrite(expr, &mut |node| {
            registered
                .iter()
                .position(|candidate| candidate.as_ref() == node.as_ref())
                .map(|slot| Expr::cached(slot, Arc::clone(node)))
        })
    }

    pub(crate) fn cache_guard(&self) -> MutexGuard<'_, CacheStore> {
        self.caches.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn column(&self, index: usize) -> &ColumnData {
        &self.columns[index]
    }

    pub(crate) fn meta_object(&self) -> Arc<dyn ObjectValue> {
        Arc::clone(&self.meta) as Arc<dyn ObjectValue>
    }
}

/// Read-only view of one table row.
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    table: &'a MemoryTable,
    index: usize,
}

impl Row<'_> {
    /// Ordinal of the row within its table.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Value of a column in this row.
    ///
    /// The reserved names `_index` and `_table` take precedence over
    /// columns and yield the row ordinal and the owning table.
    pub fn get(&self, name: &str) -> Option<Value> {
        match name {
            "_index" => Some(Value::Int(self.index as i64)),
            "_table" => Some(Value::Object(self.table.meta_object())),
            _ => {
                let column = self.table.schema.index_of(name)?;
                self.table.columns[column].value(self.index)
            }
        }
    }
}

impl Bindings for Row<'_> {
    fn get(&self, name: &str) -> Option<Value> {
        Row::get(self, name)
    }
}

/// Iterator over the rows of a table.
#[derive(Debug, Clone)]
pub struct Rows<'a> {
    table: &'a MemoryTable,
    index: usize,
}

impl<'a> Iterator for Rows<'a> {
    type Item = Row<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let row = self.table.row(self.index)?;
        self.index += 1;
        Some(row)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.table.rows.saturating_sub(self.index);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Rows<'_> {}

impl<'a> IntoIterator for &'a MemoryTable {
    type Item = Row<'a>;
    type IntoIter = Rows<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows()
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use ntuple_expr::evaluate;

    use super::*;

    fn sample() -> MemoryTable {
        MemoryTable::from_columns(vec![
            ("pt", ColumnData::Float(vec![12.5, 48.0, 31.0])),
            ("njets", ColumnData::Int(vec![2, 0, 4])),
            ("trigger", ColumnData::Bool(vec![true, false, true])),
        ])
        .unwrap()
        .with_name("events")
    }

    #[test]
    fn rows_read_columns_and_reserved_names() {
        let table = sample();
        assert_eq!(table.len(), 3);
        assert_eq!(table.value(1, "pt"), Some(Value::Float(48.0)));
        assert_eq!(table.value(2, "njets"), Some(Value::Int(4)));
        assert_eq!(table.value(0, "_index"), Some(Value::Int(0)));
        assert_eq!(table.value(0, "eta"), None);
        assert!(table.row(3).is_none());

        let indices: Vec<_> = table.rows().map(|row| row.index()).collect();
        assert_eq!(indices, [0, 1, 2]);
    }

    #[test]
    fn table_metadata_is_an_object() {
        let table = sample();
        let row = table.row(0).unwrap();
        let meta = row.get("_table").unwrap();
        assert_eq!(meta.type_name(), "table");

        let rows = evaluate(&Expr::parse("_table.rows").unwrap(), &row).unwrap();
        assert_eq!(rows, Value::Int(3));
        let name = evaluate(&Expr::parse("_table.name").unwrap(), &row).unwrap();
        assert_eq!(name, Value::Str("events".into()));
    }

    #[test]
    fn mismatched_column_lengths_are_rejected() {
        let result = MemoryTable::from_columns(vec![
            ("pt", ColumnData::Float(vec![1.0, 2.0])),
            ("njets", ColumnData::Int(vec![1])),
        ]);
        assert_matches!(
            result,
            Err(ProjectError::ColumnLength {
                name,
                expected: 2,
                found: 1,
            }) if name == "njets"
        );

        let duplicated = MemoryTable::from_columns(vec![
            ("pt", ColumnData::Float(vec![1.0])),
            ("pt", ColumnData::Int(vec![1])),
        ]);
        assert_matches!(duplicated, Err(ProjectError::DuplicateColumn { .. }));
    }

    #[test]
    fn compiled_programs_read_typed_columns() {
        let table = sample();
        let program = table.compile(&Expr::parse("pt > 20.0 and njets >= 1").unwrap());
        assert_eq!(program.result_type(), ValueType::Bool);

        let mut vm = ntuple_eval::Vm::new();
        let mut frame = ntuple_eval::Frame::new();
        frame.set_named("pt", Value::Float(48.0));
        frame.set_named("njets", Value::Int(0));
        assert_eq!(vm.run(&program, &frame).unwrap(), Value::Bool(false));
    }

    #[test]
    fn registered_expressions_compile_to_cache_markers() {
        let table = sample();
        let shared = Expr::parse("sqrt(pt)").unwrap();
        let slot = table.cache_expression(&shared);
        assert_eq!(slot, 0);
        assert_eq!(table.cache_guard().len(), 1);

        let program = table.compile(&Expr::parse("sqrt(pt) > 5.0").unwrap());
        let cached = program
            .ops()
            .iter()
            .any(|op| matches!(op, ntuple_eval::Op::FloatCacheGet { slot: 0, .. }));
        assert!(cached, "no cache read in:\n{program}");
    }
}

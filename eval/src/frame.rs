//! Symbol bindings for a single evaluation.
//!
//! A [`Frame`] maps [`symbols`] slots to values for one event and optionally
//! carries the table row the event came from; the row index is what lets
//! cache instructions recognise repeated evaluations. Frames are meant to be
//! reused: [`clear`](Frame::clear) keeps the allocation.

use ntuple_expr::symbols;
use ntuple_expr::{Bindings, EvalError, Value};

/// Values bound to symbol slots during one program run.
#[derive(Debug, Clone, Default)]
pub struct Frame {
    slots: Vec<Option<Value>>,
    row: Option<usize>,
}

impl Frame {
    /// Creates an empty frame.
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a symbol slot to a value, growing the frame as needed.
    pub fn set(&mut self, slot: usize, value: Value) {
        if slot >= self.slots.len() {
            self.slots.resize(slot + 1, None);
        }
        self.slots[slot] = Some(value);
    }

    /// Binds a symbol by name, registering it if necessary.
    pub fn set_named(&mut self, name: &str, value: Value) {
        self.set(symbols::symbol_index(name), value);
    }

    /// Row of the source table this frame was filled from.
    ///
    /// `None` disables the per-row caches; every cache lookup misses and
    /// nothing is recorded.
    pub fn row(&self) -> Option<usize> {
        self.row
    }

    /// Sets the source row.
    pub fn set_row(&mut self, row: Option<usize>) {
        self.row = row;
    }

    /// Unbinds everything and forgets the row, keeping the allocation.
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
        self.row = None;
    }

    /// Value bound to a slot, if any.
    pub fn get(&self, slot: usize) -> Option<&Value> {
        self.slots.get(slot)?.as_ref()
    }

    pub(crate) fn int(&self, slot: usize) -> Result<i64, EvalError> {
        let value = self.require(slot)?;
        value
            .as_i64()
            .ok_or_else(|| type_mismatch(slot, value, "an int"))
    }

    pub(crate) fn float(&self, slot: usize) -> Result<f64, EvalError> {
        let value = self.require(slot)?;
        value
            .as_f64()
            .ok_or_else(|| type_mismatch(slot, value, "a float"))
    }

    pub(crate) fn flag(&self, slot: usize) -> Result<bool, EvalError> {
        self.require(slot)?.truth()
    }

    pub(crate) fn object(&self, slot: usize) -> Result<Value, EvalError> {
        self.require(slot).cloned()
    }

    fn require(&self, slot: usize) -> Result<&Value, EvalError> {
        self.get(slot)
            .ok_or_else(|| EvalError::Symbol(slot_name(slot)))
    }
}

/// Frames resolve names through the global symbol registry, so an
/// interpreter fallback inside a compiled program sees the same bindings as
/// the typed instructions around it.
impl Bindings for Frame {
    fn get(&self, name: &str) -> Option<Value> {
        Frame::get(self, symbols::lookup(name)?).cloned()
    }
}

fn slot_name(slot: usize) -> String {
    symbols::symbol_name(slot).map_or_else(|| format!("#{slot}"), |name| name.to_string())
}

fn type_mismatch(slot: usize, value: &Value, expected: &str) -> EvalError {
    EvalError::Type(format!(
        "symbol `{}` is bound to {}, not {expected}",
        slot_name(slot),
        value.type_name()
    ))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn named_bindings_resolve_through_the_registry() {
        let mut frame = Frame::new();
        frame.set_named("frame_test_pt", Value::Float(41.5));

        let slot = symbols::lookup("frame_test_pt").unwrap();
        assert_eq!(frame.get(slot), Some(&Value::Float(41.5)));
        assert_eq!(
            Bindings::get(&frame, "frame_test_pt"),
            Some(Value::Float(41.5))
        );
        assert_eq!(Bindings::get(&frame, "frame_test_unset"), None);
    }

    #[test]
    fn typed_reads_promote_like_the_interpreter() {
        let mut frame = Frame::new();
        frame.set_named("frame_test_n", Value::Int(3));
        frame.set_named("frame_test_flag", Value::Bool(true));
        let n = symbols::symbol_index("frame_test_n");
        let flag = symbols::symbol_index("frame_test_flag");

        assert_eq!(frame.float(n).unwrap(), 3.0);
        assert_eq!(frame.int(flag).unwrap(), 1);
        assert!(frame.flag(n).unwrap());
    }

    #[test]
    fn missing_and_mistyped_slots_report_the_symbol() {
        let mut frame = Frame::new();
        frame.set_named("frame_test_label", Value::Str("signal".into()));
        let label = symbols::symbol_index("frame_test_label");
        let unset = symbols::symbol_index("frame_test_never_bound");

        assert_matches!(frame.int(unset), Err(EvalError::Symbol(name)) if name == "frame_test_never_bound");
        assert_matches!(frame.float(label), Err(EvalError::Type(message)) if message.contains("frame_test_label"));
    }

    #[test]
    fn clear_unbinds_and_forgets_the_row() {
        let mut frame = Frame::new();
        frame.set(0, Value::Int(1));
        frame.set_row(Some(5));
        frame.clear();

        assert_eq!(frame.get(0), None);
        assert_eq!(frame.row(), None);
    }
}

//! Per-row caches for shared subexpressions.
//!
//! When several formulas over one table contain the same subtree, the
//! compiler wraps that subtree in a cache marker and every program computing
//! it gets `*_cache_get` / `*_cache_set` instructions against a common slot.
//! The store keeps one typed column per slot plus a validity mask, indexed
//! by table row; whichever program reaches the subtree first for a row pays
//! for it, later programs reuse the result.

use ntuple_expr::{Value, ValueType};

/// Typed storage for one cached subexpression.
#[derive(Debug, Clone)]
enum CachedValues {
    Int(Vec<i64>),
    Float(Vec<f64>),
    Bool(Vec<bool>),
    Object(Vec<Value>),
}

#[derive(Debug, Clone)]
struct ExprCache {
    mask: Vec<bool>,
    values: CachedValues,
}

impl ExprCache {
    fn new(ty: ValueType, rows: usize) -> Self {
        let values = match ty {
            ValueType::Bool => CachedValues::Bool(vec![false; rows]),
            ValueType::Int => CachedValues::Int(vec![0; rows]),
            ValueType::Float => CachedValues::Float(vec![0.0; rows]),
            ValueType::Object => CachedValues::Object(vec![Value::Bool(false); rows]),
        };
        Self {
            mask: vec![false; rows],
            values,
        }
    }

    fn hit(&self, row: usize) -> bool {
        self.mask[row]
    }
}

/// Collection of per-row caches shared by the programs of one table.
#[derive(Debug, Clone, Default)]
pub struct CacheStore {
    caches: Vec<ExprCache>,
}

impl CacheStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a cache for `rows` results of type `ty`, returning its slot.
    pub fn add(&mut self, ty: ValueType, rows: usize) -> usize {
        self.caches.push(ExprCache::new(ty, rows));
        self.caches.len() - 1
    }

    /// Number of cache slots.
    pub fn len(&self) -> usize {
        self.caches.len()
    }

    /// Whether the store has no slots.
    pub fn is_empty(&self) -> bool {
        self.caches.is_empty()
    }

    /// Invalidates every cached result, keeping the slots.
    pub fn reset(&mut self) {
        for cache in &mut self.caches {
            cache.mask.fill(false);
        }
    }

    pub(crate) fn lookup_int(&self, slot: usize, row: usize) -> Option<i64> {
        let cache = &self.caches[slot];
        match &cache.values {
            CachedValues::Int(values) if cache.hit(row) => Some(values[row]),
            CachedValues::Int(_) => None,
            _ => panic!("cache slot {slot} does not hold ints"),
        }
    }

    pub(crate) fn store_int(&mut self, slot: usize, row: usize, value: i64) {
        let cache = &mut self.caches[slot];
        match &mut cache.values {
            CachedValues::Int(values) => values[row] = value,
            _ => panic!("cache slot {slot} does not hold ints"),
        }
        cache.mask[row] = true;
    }

    pub(crate) fn lookup_float(&self, slot: usize, row: usize) -> Option<f64> {
        let cache = &self.caches[slot];
        match &cache.values {
            CachedValues::Float(values) if cache.hit(row) => Some(values[row]),
            CachedValues::Float(_) => None,
            _ => panic!("cache slot {slot} does not hold floats"),
        }
    }

    pub(crate) fn store_float(&mut self, slot: usize, row: usize, value: f64) {
        let cache = &mut self.caches[slot];
        match &mut cache.values {
            CachedValues::Float(values) => values[row] = value,
            _ => panic!("cache slot {slot} does not hold floats"),
        }
        cache.mask[row] = true;
    }

    pub(crate) fn lookup_bool(&self, slot: usize, row: usize) -> Option<bool> {
        let cache = &self.caches[slot];
        match &cache.values {
            CachedValues::Bool(values) if cache.hit(row) => Some(values[row]),
            CachedValues::Bool(_) => None,
            _ => panic!("cache slot {slot} does not hold bools"),
        }
    }

    pub(crate) fn store_bool(&mut self, slot: usize, row: usize, value: bool) {
        let cache = &mut self.caches[slot];
        match &mut cache.values {
            CachedValues::Bool(values) => values[row] = value,
            _ => panic!("cache slot {slot} does not hold bools"),
        }
        cache.mask[row] = true;
    }

    pub(crate) fn lookup_object(&self, slot: usize, row: usize) -> Option<Value> {
        let cache = &self.caches[slot];
        match &cache.values {
            CachedValues::Object(values) if cache.hit(row) => Some(values[row].clone()),
            CachedValues::Object(_) => None,
            _ => panic!("cache slot {slot} does not hold objects"),
        }
    }

    pub(crate) fn store_object(&mut self, slot: usize, row: usize, value: Value) {
        let cache = &mut self.caches[slot];
        match &mut cache.values {
            CachedValues::Object(values) => values[row] = value,
            _ => panic!("cache slot {slot} does not hold objects"),
        }
        cache.mask[row] = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_are_handed_out_in_order() {
        let mut store = CacheStore::new();
        assert_eq!(store.add(ValueType::Float, 4), 0);
        assert_eq!(store.add(ValueType::Int, 4), 1);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn values_come_back_only_after_a_store() {
        let mut store = CacheStore::new();
        let slot = store.add(ValueType::Float, 3);

        assert_eq!(store.lookup_float(slot, 1), None);
        store.store_float(slot, 1, 2.5);
        assert_eq!(store.lookup_float(slot, 1), Some(2.5));
        assert_eq!(store.lookup_float(slot, 0), None);
    }

    #[test]
    fn reset_invalidates_without_dropping_slots() {
        let mut store = CacheStore::new();
        let slot = store.add(ValueType::Bool, 2);
        store.store_bool(slot, 0, true);

        store.reset();
        assert_eq!(store.len(), 1);
        assert_eq!(store.lookup_bool(slot, 0), None);
    }

    #[test]
    #[should_panic(expected = "does not hold ints")]
    fn type_confusion_is_a_programming_error() {
        let mut store = CacheStore::new();
        let slot = store.add(ValueType::Float, 1);
        store.store_int(slot, 0, 7);
    }
}

//! Process-wide symbol registry.
//!
//! Compiled programs address row values by a dense integer index instead of
//! by name. The registry hands out indices on first use and never reuses or
//! reorders them, so an index embedded in a program stays valid for the
//! lifetime of the process. Any thread may register symbols; a row view must
//! expose a value for every index a program executed against it refers to.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use once_cell::sync::Lazy;

static REGISTRY: Lazy<RwLock<Registry>> = Lazy::new(|| RwLock::new(Registry::default()));

#[derive(Debug, Default)]
struct Registry {
    indices: HashMap<Arc<str>, usize>,
    names: Vec<Arc<str>>,
}

/// Returns the index of `name`, registering the name on first use.
pub fn symbol_index(name: &str) -> usize {
    let registry = REGISTRY.read().unwrap_or_else(PoisonError::into_inner);
    if let Some(&index) = registry.indices.get(name) {
        return index;
    }
    drop(registry);

    let mut registry = REGISTRY.write().unwrap_or_else(PoisonError::into_inner);
    // Racing registrations of one name must agree on its index, so look the
    // name up again under the write lock.
    if let Some(&index) = registry.indices.get(name) {
        return index;
    }
    let name: Arc<str> = name.into();
    let index = registry.names.len();
    registry.names.push(Arc::clone(&name));
    registry.indices.insert(name, index);
    index
}

/// Returns the index of `name` without registering it.
pub fn lookup(name: &str) -> Option<usize> {
    let registry = REGISTRY.read().unwrap_or_else(PoisonError::into_inner);
    registry.indices.get(name).copied()
}

/// Returns the name registered at `index`.
pub fn symbol_name(index: usize) -> Option<Arc<str>> {
    let registry = REGISTRY.read().unwrap_or_else(PoisonError::into_inner);
    registry.names.get(index).cloned()
}

/// Number of registered symbols.
pub fn symbol_count() -> usize {
    let registry = REGISTRY.read().unwrap_or_else(PoisonError::into_inner);
    registry.names.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    // The registry is shared by the whole test binary, so these tests assert
    // relative properties only, never absolute index values.

    #[test]
    fn indices_are_stable() {
        let first = symbol_index("symbols_test_pt");
        let other = symbol_index("symbols_test_eta");
        let again = symbol_index("symbols_test_pt");

        assert_eq!(first, again);
        assert_ne!(first, other);
        assert_eq!(lookup("symbols_test_pt"), Some(first));
    }

    #[test]
    fn names_round_trip() {
        let index = symbol_index("symbols_test_phi");
        assert_eq!(symbol_name(index).as_deref(), Some("symbols_test_phi"));
        assert!(symbol_count() > index);
    }

    #[test]
    fn unknown_names_are_not_registered_by_lookup() {
        assert_eq!(lookup("symbols_test_never_registered"), None);
    }
}

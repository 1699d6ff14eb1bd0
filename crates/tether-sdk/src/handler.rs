//! Native entry points callable from the foreign runtime
//!
//! The foreign runtime resolves the fixed entry-point names in
//! [`crate::names`] against a `NativeEntryRegistry` when it loads the bridge
//! support classes. After linking, dispatch is a direct call.

use std::collections::HashMap;
use std::sync::Arc;

use crate::context::ForeignContext;
use crate::value::ForeignValue;

/// A native entry point.
///
/// Receives `[this, args...]`. To fail, it sets a pending exception with
/// [`ForeignContext::throw`] and returns `Null`.
pub type NativeEntryFn =
    Arc<dyn Fn(&dyn ForeignContext, &[ForeignValue]) -> ForeignValue + Send + Sync>;

/// Registry of native entry points indexed by symbolic name.
#[derive(Clone)]
pub struct NativeEntryRegistry {
    entries: HashMap<String, NativeEntryFn>,
}

impl NativeEntryRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Register an entry point by name
    pub fn register(
        &mut self,
        name: &str,
        entry: impl Fn(&dyn ForeignContext, &[ForeignValue]) -> ForeignValue + Send + Sync + 'static,
    ) {
        self.entries.insert(name.to_string(), Arc::new(entry));
    }

    /// Get an entry point by name (used at link time)
    pub fn get(&self, name: &str) -> Option<NativeEntryFn> {
        self.entries.get(name).cloned()
    }

    /// Check if an entry point is registered
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Merge another registry into this one, replacing duplicates
    pub fn extend(&mut self, other: NativeEntryRegistry) {
        self.entries.extend(other.entries);
    }

    /// Registered names
    pub fn names(&self) -> Vec<&str> {
        self.entries.keys().map(|s| s.as_str()).collect()
    }

    /// Get the number of registered entry points
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for NativeEntryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for NativeEntryRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeEntryRegistry")
            .field("count", &self.entries.len())
            .finish()
    }
}

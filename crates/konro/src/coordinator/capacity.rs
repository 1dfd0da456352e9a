//! Capacity-by-key resolution.
//!
//! Some configuration keys are known to tolerate no batching at all — the
//! downstream solver treats them as singletons — so the capacity a batch is
//! created with is a function of its key, not a global constant.

use std::collections::HashMap;

/// Resolves the capacity of a new batch from its configuration key.
pub trait CapacityPolicy: Send + Sync {
    /// Number of parameter vectors a batch for `key` accepts before it is
    /// considered full. Always at least 1.
    fn capacity_for(&self, key: &str) -> usize;
}

/// The same capacity for every key.
pub struct NominalCapacity(usize);

impl NominalCapacity {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity >= 1, "batch capacity must be at least 1");
        Self(capacity)
    }
}

impl CapacityPolicy for NominalCapacity {
    fn capacity_for(&self, _key: &str) -> usize {
        self.0
    }
}

/// A nominal capacity with per-key exceptions.
///
/// ```
/// use konro::coordinator::{CapacityPolicy, KeyOverrides};
///
/// let policy = KeyOverrides::new(8).with("special", 1);
/// assert_eq!(policy.capacity_for("anything"), 8);
/// assert_eq!(policy.capacity_for("special"), 1);
/// ```
pub struct KeyOverrides {
    nominal: usize,
    overrides: HashMap<String, usize>,
}

impl KeyOverrides {
    pub fn new(nominal: usize) -> Self {
        assert!(nominal >= 1, "batch capacity must be at least 1");
        Self {
            nominal,
            overrides: HashMap::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, capacity: usize) -> Self {
        assert!(capacity >= 1, "batch capacity must be at least 1");
        self.overrides.insert(key.into(), capacity);
        self
    }
}

impl CapacityPolicy for KeyOverrides {
    fn capacity_for(&self, key: &str) -> usize {
        self.overrides.get(key).copied().unwrap_or(self.nominal)
    }
}

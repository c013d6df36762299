use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use knob_schema::{BatchOutcome, KnobDocs, UpdateRequest, ValuesSnapshot};

use crate::batch::{reset_knobs, update_knobs};
use crate::report::{describe, snapshot_with_metadata};
use crate::store::KnobSet;

/// Cloneable handle to one subsystem's [`KnobSet`].
///
/// Writers hold the lock for a whole batch and readers take it only long
/// enough to copy, so no reader ever observes a half-applied batch.
#[derive(Debug, Clone)]
pub struct SharedKnobSet {
    name: Arc<str>,
    inner: Arc<Mutex<KnobSet>>,
}

impl SharedKnobSet {
    pub fn new(set: KnobSet) -> Self {
        Self {
            name: Arc::from(set.owner_name()),
            inner: Arc::new(Mutex::new(set)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn update(&self, request: &UpdateRequest) -> BatchOutcome {
        update_knobs(&mut self.lock(), request)
    }

    pub fn reset(&self, source: &str) -> BatchOutcome {
        reset_knobs(&mut self.lock(), source)
    }

    pub fn snapshot(&self) -> ValuesSnapshot {
        snapshot_with_metadata(&self.lock())
    }

    pub fn describe(&self) -> KnobDocs {
        describe(&self.lock())
    }

    pub fn current(&self, key: &str) -> Option<f64> {
        self.lock().current(key)
    }

    /// Run `read` against the set while holding the lock.
    pub fn with_set<R>(&self, read: impl FnOnce(&KnobSet) -> R) -> R {
        read(&self.lock())
    }

    // Mutation is a per-key replace, so a poisoned lock still guards a
    // consistent set.
    fn lock(&self) -> MutexGuard<'_, KnobSet> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

//! In-memory state store

use crate::domain::{ValidatorDoppelgangerState, ValidatorIndex};
use crate::error::StoreResult;
use crate::ports::outbound::ValidatorStateStore;
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// Volatile store for tests and single-shot runs.
#[derive(Default)]
pub struct InMemoryStateStore {
    rows: RwLock<BTreeMap<ValidatorIndex, ValidatorDoppelgangerState>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }
}

impl ValidatorStateStore for InMemoryStateStore {
    fn load(&self, index: ValidatorIndex) -> StoreResult<Option<ValidatorDoppelgangerState>> {
        self.rows
            .read()
            .get(&index)
            .map(|row| row.validate().map(|_| row.clone()))
            .transpose()
    }

    fn save(&self, state: &ValidatorDoppelgangerState) -> StoreResult<()> {
        state.validate()?;
        self.rows
            .write()
            .insert(state.validator_index, state.clone());
        Ok(())
    }

    fn in_doppelganger(&self) -> StoreResult<Vec<ValidatorDoppelgangerState>> {
        Ok(self
            .rows
            .read()
            .values()
            .filter(|row| row.in_doppelganger)
            .cloned()
            .collect())
    }
}

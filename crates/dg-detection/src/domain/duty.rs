//! Attester duty normalisation

use super::types::{Slot, ValidatorIndex};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Assignment of one validator to a committee at one slot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttesterDuty {
    pub validator_index: ValidatorIndex,
    /// Assigned slot
    pub slot: Slot,
    pub committee_index: u64,
    /// Position of the validator inside its committee
    pub validator_committee_index: u64,
    pub committee_length: u64,
}

impl AttesterDuty {
    /// Slot whose block is expected to carry the attestation.
    pub fn inclusion_slot(&self) -> Slot {
        self.slot + 1
    }
}

/// Duties returned by one batched lookup for one epoch.
///
/// `indexes` is the list the beacon node actually answered for; later lookups
/// must use it rather than the list that was asked for.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DutySet {
    pub indexes: Vec<ValidatorIndex>,
    pub duties: Vec<AttesterDuty>,
    /// Distinct inclusion slots, ascending
    pub slots: Vec<Slot>,
}

impl DutySet {
    pub fn from_duties(duties: Vec<AttesterDuty>) -> Self {
        let indexes = duties.iter().map(|d| d.validator_index).collect();
        let slots = duties
            .iter()
            .map(AttesterDuty::inclusion_slot)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        Self {
            indexes,
            duties,
            slots,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.duties.is_empty()
    }

    /// Drops duties whose inclusion block cannot exist yet.
    pub fn retain_included_by(&mut self, head_slot: Slot) -> usize {
        let before = self.duties.len();
        self.duties.retain(|d| d.inclusion_slot() <= head_slot);
        self.slots.retain(|s| *s <= head_slot);
        before - self.duties.len()
    }
}

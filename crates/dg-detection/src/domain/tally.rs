//! Window-wide tallies over evaluated duties

use super::evaluator::AttestationOutcome;
use super::types::{Epoch, ValidatorIndex};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Accumulates outcomes across an epoch window.
///
/// Tallies are order-independent: recording the same outcomes in any order
/// yields the same [`WindowSummary`].
#[derive(Clone, Debug)]
pub struct WindowTally {
    first_epoch: Epoch,
    last_epoch: Epoch,
    non_errored_found: bool,
    found: BTreeMap<Epoch, bool>,
    missed: BTreeMap<Epoch, BTreeSet<ValidatorIndex>>,
    unknown: u64,
    evaluated: u64,
}

impl WindowTally {
    pub fn new(first_epoch: Epoch, last_epoch: Epoch) -> Self {
        Self {
            first_epoch,
            last_epoch,
            non_errored_found: false,
            found: BTreeMap::new(),
            missed: BTreeMap::new(),
            unknown: 0,
            evaluated: 0,
        }
    }

    pub fn record(
        &mut self,
        epoch: Epoch,
        validator_index: ValidatorIndex,
        outcome: AttestationOutcome,
    ) {
        self.evaluated += 1;
        let found = self.found.entry(epoch).or_insert(false);
        match outcome {
            AttestationOutcome::Attested => {
                self.non_errored_found = true;
                *found = true;
            }
            AttestationOutcome::PresumedAttested => *found = true,
            AttestationOutcome::Missed => {
                self.missed.entry(epoch).or_default().insert(validator_index);
            }
            AttestationOutcome::Unknown => self.unknown += 1,
        }
    }

    /// Count `count` duties as unresolved, e.g. when the duty lookup itself failed.
    pub fn record_unavailable(&mut self, epoch: Epoch, count: u64) {
        self.found.entry(epoch).or_insert(false);
        self.evaluated += count;
        self.unknown += count;
    }

    pub fn duties_evaluated(&self) -> u64 {
        self.evaluated
    }

    /// Same validator missed in at least two distinct epochs.
    pub fn confirmed_cross_epoch_miss(&self) -> bool {
        let mut seen: BTreeSet<ValidatorIndex> = BTreeSet::new();
        self.missed
            .values()
            .flat_map(|epoch_misses| epoch_misses.iter())
            .any(|index| !seen.insert(*index))
    }

    pub fn summary(&self) -> WindowSummary {
        let found_attestation_per_epoch = (self.first_epoch..=self.last_epoch)
            .map(|e| self.found.get(&e).copied().unwrap_or(false))
            .collect();
        let not_found_ratio = if self.evaluated == 0 {
            0.0
        } else {
            self.unknown as f64 / self.evaluated as f64
        };

        WindowSummary {
            first_epoch: self.first_epoch,
            non_errored_attestation_found: self.non_errored_found,
            found_attestation_per_epoch,
            confirmed_cross_epoch_miss: self.confirmed_cross_epoch_miss(),
            not_found_ratio,
            duties_evaluated: self.evaluated,
        }
    }
}

/// Result of aggregating a window, input to the decision policy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WindowSummary {
    pub first_epoch: Epoch,
    /// A decoded aggregate had the validator's bit set somewhere in the window
    pub non_errored_attestation_found: bool,
    /// Index 0 is `first_epoch`
    pub found_attestation_per_epoch: Vec<bool>,
    pub confirmed_cross_epoch_miss: bool,
    pub not_found_ratio: f64,
    pub duties_evaluated: u64,
}

impl WindowSummary {
    pub fn found_in_first_epoch(&self) -> bool {
        self.found_attestation_per_epoch
            .first()
            .copied()
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use AttestationOutcome::*;

    #[test]
    fn test_single_epoch_miss_not_confirmed() {
        let mut tally = WindowTally::new(10, 12);
        tally.record(10, 1, Missed);
        tally.record(10, 2, Missed);
        tally.record(11, 2, Attested);
        assert!(!tally.confirmed_cross_epoch_miss());
    }

    #[test]
    fn test_non_adjacent_epoch_miss_confirmed() {
        let mut tally = WindowTally::new(10, 12);
        tally.record(10, 7, Missed);
        tally.record(11, 7, Attested);
        tally.record(12, 7, Missed);
        assert!(tally.confirmed_cross_epoch_miss());
    }

    #[test]
    fn test_different_validators_do_not_confirm() {
        let mut tally = WindowTally::new(10, 11);
        tally.record(10, 1, Missed);
        tally.record(11, 2, Missed);
        assert!(!tally.confirmed_cross_epoch_miss());
    }

    #[test]
    fn test_presumed_attested_is_found_but_not_non_errored() {
        let mut tally = WindowTally::new(5, 6);
        tally.record(5, 1, PresumedAttested);
        let summary = tally.summary();
        assert!(!summary.non_errored_attestation_found);
        assert_eq!(summary.found_attestation_per_epoch, vec![true, false]);
        assert!(summary.found_in_first_epoch());
    }

    #[test]
    fn test_not_found_ratio() {
        let mut tally = WindowTally::new(1, 2);
        tally.record(1, 1, Unknown);
        tally.record(1, 2, Missed);
        tally.record(2, 1, Missed);
        tally.record_unavailable(2, 1);
        let summary = tally.summary();
        assert_eq!(summary.duties_evaluated, 4);
        assert!((summary.not_found_ratio - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_order_independent() {
        let outcomes = [(3, 1, Missed), (4, 1, Missed), (3, 2, Attested), (4, 2, Unknown)];
        let mut forward = WindowTally::new(3, 4);
        let mut backward = WindowTally::new(3, 4);
        for (e, i, o) in outcomes {
            forward.record(e, i, o);
        }
        for (e, i, o) in outcomes.into_iter().rev() {
            backward.record(e, i, o);
        }
        assert_eq!(forward.summary(), backward.summary());
    }

    #[test]
    fn test_empty_window_ratio_is_zero() {
        let summary = WindowTally::new(0, 0).summary();
        assert_eq!(summary.duties_evaluated, 0);
        assert_eq!(summary.not_found_ratio, 0.0);
        assert_eq!(summary.found_attestation_per_epoch, vec![false]);
    }
}

//! Start/no-start decision over a window summary

use super::tally::WindowSummary;

pub const DEFAULT_NOT_FOUND_THRESHOLD: f64 = 0.3;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DecisionPolicy {
    /// Highest tolerated fraction of unresolved duties
    pub not_found_threshold: f64,
}

impl Default for DecisionPolicy {
    fn default() -> Self {
        Self {
            not_found_threshold: DEFAULT_NOT_FOUND_THRESHOLD,
        }
    }
}

impl DecisionPolicy {
    pub fn new(not_found_threshold: f64) -> Self {
        Self {
            not_found_threshold,
        }
    }

    /// True when too much of the window could not be fetched to trust absence.
    pub fn data_gate_tripped(&self, summary: &WindowSummary) -> bool {
        summary.not_found_ratio > self.not_found_threshold
    }

    /// A start requires no genuine attestation in the window, plus either a
    /// silent first epoch or a validator missing in two distinct epochs.
    pub fn should_start(&self, summary: &WindowSummary) -> bool {
        let no_evidence = !summary.non_errored_attestation_found;
        let silent_first_epoch = !summary.found_in_first_epoch();

        ((no_evidence && silent_first_epoch) || (no_evidence && summary.confirmed_cross_epoch_miss))
            && !self.data_gate_tripped(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(
        non_errored: bool,
        per_epoch: Vec<bool>,
        cross_miss: bool,
        ratio: f64,
    ) -> WindowSummary {
        WindowSummary {
            first_epoch: 0,
            non_errored_attestation_found: non_errored,
            found_attestation_per_epoch: per_epoch,
            confirmed_cross_epoch_miss: cross_miss,
            not_found_ratio: ratio,
            duties_evaluated: 10,
        }
    }

    #[test]
    fn test_silent_first_epoch_starts() {
        let policy = DecisionPolicy::new(0.3);
        assert!(policy.should_start(&summary(false, vec![false, true], false, 0.1)));
    }

    #[test]
    fn test_ratio_gate_blocks_start() {
        let policy = DecisionPolicy::new(0.3);
        let s = summary(false, vec![false, true], false, 0.5);
        assert!(policy.data_gate_tripped(&s));
        assert!(!policy.should_start(&s));
    }

    #[test]
    fn test_ratio_at_threshold_passes() {
        let policy = DecisionPolicy::new(0.3);
        assert!(policy.should_start(&summary(false, vec![false], false, 0.3)));
    }

    #[test]
    fn test_genuine_attestation_never_starts() {
        let policy = DecisionPolicy::new(0.3);
        for per_epoch in [vec![false, false], vec![true, false], vec![false, true]] {
            for cross in [false, true] {
                assert!(!policy.should_start(&summary(true, per_epoch.clone(), cross, 0.0)));
            }
        }
    }

    #[test]
    fn test_cross_epoch_miss_overrides_found_first_epoch() {
        let policy = DecisionPolicy::default();
        assert!(policy.should_start(&summary(false, vec![true, false], true, 0.0)));
        assert!(!policy.should_start(&summary(false, vec![true, false], false, 0.0)));
    }
}

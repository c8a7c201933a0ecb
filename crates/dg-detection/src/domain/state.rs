//! Per-validator doppelganger state machine
//!
//! ```text
//! [IDLE] ──first check──→ [CHECKING] ──safe epoch reached, evaluated──→ [RESOLVED(start|no-start)]
//!    ↑                                                                        │
//!    └──────────────────── sweep: current epoch > enabled_epoch ──────────────┘
//! ```
//!
//! A window stays open after resolution; only the sweep returns a record to
//! `Idle`, whatever the outcome.

use super::types::{Epoch, ValidatorIndex};
use crate::error::{StoreError, StoreResult};
use serde::{Deserialize, Serialize};

/// Epochs added on top of the cooldown when a window opens
pub const DEFAULT_WINDOW_MARGIN: u64 = 2;

/// Lifecycle phase of one validator's check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CheckPhase {
    Idle,
    Checking { check_started: Epoch },
    Resolved { start: bool },
}

/// Persisted row, one per validator index.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorDoppelgangerState {
    pub validator_index: ValidatorIndex,
    /// Group that opened the current or most recent window
    pub group: Option<String>,
    pub in_doppelganger: bool,
    pub check_started: Epoch,
    /// Last epoch the window stays open; zero while idle
    pub enabled_epoch: Epoch,
    pub started_vc: bool,
    /// Epoch the open window was resolved in
    pub decided_epoch: Option<Epoch>,
}

impl ValidatorDoppelgangerState {
    pub fn new(validator_index: ValidatorIndex) -> Self {
        Self {
            validator_index,
            group: None,
            in_doppelganger: false,
            check_started: 0,
            enabled_epoch: 0,
            started_vc: false,
            decided_epoch: None,
        }
    }

    pub fn phase(&self) -> CheckPhase {
        match (self.in_doppelganger, self.decided_epoch) {
            (false, _) => CheckPhase::Idle,
            (true, None) => CheckPhase::Checking {
                check_started: self.check_started,
            },
            (true, Some(_)) => CheckPhase::Resolved {
                start: self.started_vc,
            },
        }
    }

    pub fn open_window(&mut self, group: &str, current: Epoch, cooldown: u64, margin: u64) {
        self.group = Some(group.to_string());
        self.in_doppelganger = true;
        self.check_started = current;
        self.enabled_epoch = current.saturating_add(cooldown).saturating_add(margin);
        self.started_vc = false;
        self.decided_epoch = None;
    }

    /// Join a window already opened by other members of the same group.
    pub fn adopt_window(&mut self, owner: &ValidatorDoppelgangerState) {
        self.group = owner.group.clone();
        self.in_doppelganger = true;
        self.check_started = owner.check_started;
        self.enabled_epoch = owner.enabled_epoch;
        self.started_vc = false;
        self.decided_epoch = None;
    }

    /// Earliest epoch at which the open window may be evaluated.
    pub fn safe_epoch(&self, cooldown: u64) -> Epoch {
        self.check_started.saturating_add(cooldown)
    }

    pub fn is_expired(&self, current: Epoch) -> bool {
        self.in_doppelganger && current > self.enabled_epoch
    }

    pub fn clear(&mut self) {
        self.in_doppelganger = false;
        self.enabled_epoch = 0;
    }

    pub fn record_decision(&mut self, start: bool, epoch: Epoch) {
        self.started_vc = start;
        self.decided_epoch = Some(epoch);
    }

    pub fn owned_by(&self, group: &str) -> bool {
        self.in_doppelganger && self.group.as_deref() == Some(group)
    }

    /// Window opened by `group` at `check_started`.
    pub fn in_window(&self, group: &str, check_started: Epoch) -> bool {
        self.owned_by(group) && self.check_started == check_started
    }

    /// Another active window holds this validator while `epoch` is still
    /// before its cooldown boundary.
    pub fn blocks_evaluation(
        &self,
        group: &str,
        check_started: Epoch,
        epoch: Epoch,
        cooldown: u64,
    ) -> bool {
        self.in_doppelganger
            && !self.in_window(group, check_started)
            && epoch < self.enabled_epoch.saturating_sub(cooldown)
    }

    /// Boundary check applied to every row read from storage.
    pub fn validate(&self) -> StoreResult<()> {
        let corrupt = |reason: &str| {
            Err(StoreError::Corrupt {
                validator_index: self.validator_index,
                reason: reason.to_string(),
            })
        };

        if !self.in_doppelganger && self.enabled_epoch != 0 {
            return corrupt("enabled_epoch set outside an active window");
        }
        if self.in_doppelganger && self.enabled_epoch < self.check_started {
            return corrupt("window closes before it opened");
        }
        if self.in_doppelganger && self.group.is_none() {
            return corrupt("active window without an owning group");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_row_is_idle() {
        let state = ValidatorDoppelgangerState::new(9);
        assert_eq!(state.phase(), CheckPhase::Idle);
        assert!(state.validate().is_ok());
    }

    #[test]
    fn test_open_window_sets_bounds() {
        let mut state = ValidatorDoppelgangerState::new(9);
        state.open_window("g1", 100, 2, DEFAULT_WINDOW_MARGIN);
        assert_eq!(state.phase(), CheckPhase::Checking { check_started: 100 });
        assert_eq!(state.enabled_epoch, 104);
        assert_eq!(state.safe_epoch(2), 102);
        assert!(state.validate().is_ok());
    }

    #[test]
    fn test_resolution_keeps_window_open() {
        let mut state = ValidatorDoppelgangerState::new(1);
        state.open_window("g1", 10, 2, 2);
        state.record_decision(true, 12);
        assert_eq!(state.phase(), CheckPhase::Resolved { start: true });
        assert!(state.in_doppelganger);
    }

    #[test]
    fn test_expiry_and_clear() {
        let mut state = ValidatorDoppelgangerState::new(1);
        state.open_window("g1", 10, 2, 2);
        assert!(!state.is_expired(14));
        assert!(state.is_expired(15));
        state.clear();
        assert_eq!(state.phase(), CheckPhase::Idle);
        assert_eq!(state.enabled_epoch, 0);
        assert!(!state.is_expired(15));
        assert!(state.validate().is_ok());
    }

    #[test]
    fn test_foreign_window_blocks_until_cooldown_boundary() {
        let mut state = ValidatorDoppelgangerState::new(1);
        state.open_window("other", 10, 2, 2); // enabled_epoch 14
        assert!(state.blocks_evaluation("mine", 10, 11, 2));
        assert!(!state.blocks_evaluation("mine", 10, 12, 2));
        // own window never blocks
        assert!(!state.blocks_evaluation("other", 10, 11, 2));
        // same group but a different window does
        assert!(state.blocks_evaluation("other", 9, 11, 2));
    }

    #[test]
    fn test_validate_rejects_inconsistent_rows() {
        let mut state = ValidatorDoppelgangerState::new(3);
        state.enabled_epoch = 7;
        assert!(matches!(
            state.validate(),
            Err(StoreError::Corrupt {
                validator_index: 3,
                ..
            })
        ));

        let mut orphan = ValidatorDoppelgangerState::new(4);
        orphan.in_doppelganger = true;
        orphan.enabled_epoch = 5;
        assert!(orphan.validate().is_err());
    }

    #[test]
    fn test_adopt_window_copies_bounds() {
        let mut owner = ValidatorDoppelgangerState::new(1);
        owner.open_window("g", 20, 3, 2);
        let mut joiner = ValidatorDoppelgangerState::new(2);
        joiner.adopt_window(&owner);
        assert!(joiner.in_window("g", 20));
        assert_eq!(joiner.enabled_epoch, 25);
    }
}

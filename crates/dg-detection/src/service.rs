//! Doppelganger Service - check orchestration
//!
//! One check request runs through:
//!
//! 1. resolve the group's keys to validator indexes
//! 2. read the head slot and derive the current epoch
//! 3. open the group's window, or find the one already open
//! 4. refuse while the cooldown has not elapsed
//! 5. evaluate every duty of every epoch in `[check_started, current]`
//! 6. apply the decision policy and persist `started_vc`
//!
//! Persisted state is only touched inside synchronous sections holding the
//! per-validator stripes from [`StateLocks`].

use crate::domain::policy::DEFAULT_NOT_FOUND_THRESHOLD;
use crate::domain::state::DEFAULT_WINDOW_MARGIN;
use crate::domain::types::group_label;
use crate::domain::{
    epoch_of, evaluate_duty, AttestationRecord, DecisionPolicy, DutySet, Epoch, Slot,
    ValidatorGroup, ValidatorIndex, WindowSummary, WindowTally,
};
use crate::error::{BeaconError, BeaconResult, DetectionError, DetectionResult};
use crate::locks::{StateLocks, DEFAULT_LOCK_STRIPES};
use crate::metrics;
use crate::ports::inbound::{CheckDecision, DecisionReason, DoppelgangerApi, SweepReport};
use crate::ports::outbound::{BeaconNodeGateway, ValidatorStateStore};
use async_trait::async_trait;
use futures::future::join_all;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Detection configuration
#[derive(Clone, Debug)]
pub struct DetectionConfig {
    /// Epochs that must pass after a window opens before it is evaluated
    pub cooldown_epochs: u64,
    /// Extra epochs a window stays open beyond the cooldown
    pub window_margin_epochs: u64,
    /// Highest tolerated fraction of unresolved duties
    pub not_found_threshold: f64,
    /// Upper bound on any single beacon node call
    pub fetch_timeout: Duration,
    pub lock_stripes: usize,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            cooldown_epochs: 2,
            window_margin_epochs: DEFAULT_WINDOW_MARGIN,
            not_found_threshold: DEFAULT_NOT_FOUND_THRESHOLD,
            fetch_timeout: Duration::from_secs(10),
            lock_stripes: DEFAULT_LOCK_STRIPES,
        }
    }
}

impl DetectionConfig {
    pub fn validate(&self) -> DetectionResult<()> {
        let invalid = |reason: &str| {
            Err(DetectionError::Configuration {
                reason: reason.to_string(),
            })
        };

        if self.cooldown_epochs == 0 {
            return invalid("cooldown_epochs must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.not_found_threshold) {
            return invalid("not_found_threshold must be within [0, 1]");
        }
        if self.fetch_timeout.is_zero() {
            return invalid("fetch_timeout must be non-zero");
        }
        Ok(())
    }
}

/// How a check request found the group's window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum WindowEntry {
    Opened { check_started: Epoch },
    Existing { check_started: Epoch },
    /// Every validator is held by another group's active window
    Contended { validator_index: ValidatorIndex },
}

enum WindowVerdict {
    Summary(WindowSummary),
    Race {
        validator_index: ValidatorIndex,
        epoch: Epoch,
    },
}

/// Block data needed to evaluate duties included at one slot.
#[derive(Default)]
struct SlotData {
    attestations: Option<Vec<AttestationRecord>>,
    /// Root of the block at the assigned slot, `inclusion_slot - 1`
    parent_root: Option<String>,
}

/// Doppelganger Service implementation
pub struct DoppelgangerService<B, S>
where
    B: BeaconNodeGateway,
    S: ValidatorStateStore,
{
    config: DetectionConfig,
    policy: DecisionPolicy,
    beacon: Arc<B>,
    store: Arc<S>,
    locks: StateLocks,
}

impl<B, S> DoppelgangerService<B, S>
where
    B: BeaconNodeGateway,
    S: ValidatorStateStore,
{
    pub fn new(config: DetectionConfig, beacon: Arc<B>, store: Arc<S>) -> Self {
        let policy = DecisionPolicy::new(config.not_found_threshold);
        let locks = StateLocks::new(config.lock_stripes);
        Self {
            config,
            policy,
            beacon,
            store,
            locks,
        }
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    async fn fetch<T>(&self, request: impl Future<Output = BeaconResult<T>>) -> BeaconResult<T> {
        tokio::time::timeout(self.config.fetch_timeout, request)
            .await
            .unwrap_or(Err(BeaconError::Timeout))
    }

    async fn run_check(&self, group: &ValidatorGroup) -> DetectionResult<CheckDecision> {
        let head_slot = self.fetch(self.beacon.head_slot()).await?;
        let current = epoch_of(head_slot);

        let indexes = self
            .fetch(async { Ok(self.beacon.resolve_indexes(group.pubkeys()).await) })
            .await?;
        if indexes.is_empty() {
            return Err(DetectionError::InvalidInput {
                reason: format!("no key of group '{}' is known to the beacon node", group.id()),
            });
        }

        let check_started = match self.enter_check(group, &indexes, current)? {
            WindowEntry::Opened { check_started } => {
                info!(
                    group = group.id(),
                    validators = indexes.len(),
                    check_started,
                    "[dg] 🔒 Doppelganger window opened"
                );
                metrics::set_group_in_check(group.metric_label(), true);
                return Err(self.cooldown_error(check_started, current));
            }
            WindowEntry::Existing { check_started } => check_started,
            WindowEntry::Contended { validator_index } => {
                warn!(
                    group = group.id(),
                    validator_index, "validator held by another active window"
                );
                return Ok(CheckDecision::race(validator_index, current));
            }
        };

        if current < check_started.saturating_add(self.config.cooldown_epochs) {
            return Err(self.cooldown_error(check_started, current));
        }

        let summary = match self
            .aggregate_window(group, &indexes, check_started, current, head_slot)
            .await?
        {
            WindowVerdict::Summary(summary) => summary,
            WindowVerdict::Race {
                validator_index,
                epoch,
            } => {
                warn!(
                    group = group.id(),
                    validator_index, epoch, "race detected, refusing to start"
                );
                return Ok(CheckDecision::race(validator_index, epoch));
            }
        };

        if summary.duties_evaluated == 0 {
            return Err(DetectionError::NoDutiesEvaluated {
                from: check_started,
                to: current,
            });
        }
        metrics::observe_not_found_ratio(summary.not_found_ratio);

        let start = self.policy.should_start(&summary);
        self.persist_decision(group, &indexes, check_started, start, current)?;

        if self.policy.data_gate_tripped(&summary) {
            warn!(
                group = group.id(),
                not_found_ratio = summary.not_found_ratio,
                "too many duties unresolved, check inconclusive"
            );
            return Err(DetectionError::DataUnavailable {
                not_found_ratio: summary.not_found_ratio,
                threshold: self.policy.not_found_threshold,
            });
        }

        info!(
            group = group.id(),
            start,
            check_started,
            current,
            duties = summary.duties_evaluated,
            not_found_ratio = summary.not_found_ratio,
            "[dg] ✅ Doppelganger check resolved"
        );
        Ok(CheckDecision {
            start,
            reason: DecisionReason::Evaluated(summary),
        })
    }

    fn cooldown_error(&self, check_started: Epoch, current: Epoch) -> DetectionError {
        DetectionError::CooldownNotElapsed {
            check_started,
            safe_epoch: check_started.saturating_add(self.config.cooldown_epochs),
            current_epoch: current,
        }
    }

    /// Find or open the group's window.
    ///
    /// Idle members join an existing window; members held by another group's
    /// unexpired window are left alone.
    fn enter_check(
        &self,
        group: &ValidatorGroup,
        indexes: &[ValidatorIndex],
        current: Epoch,
    ) -> DetectionResult<WindowEntry> {
        let _guards = self.locks.acquire(indexes);

        let mut rows = Vec::with_capacity(indexes.len());
        for index in indexes {
            rows.push(self.store.load_or_create(*index)?);
        }

        let owner = rows
            .iter()
            .filter(|r| r.owned_by(group.id()))
            .min_by_key(|r| r.check_started)
            .cloned();

        if let Some(owner) = owner {
            for row in rows.iter_mut().filter(|r| !r.in_doppelganger) {
                row.adopt_window(&owner);
                self.store.save(row)?;
            }
            return Ok(WindowEntry::Existing {
                check_started: owner.check_started,
            });
        }

        let mut opened = 0usize;
        let mut contended = None;
        for row in rows.iter_mut() {
            if row.in_doppelganger && !row.is_expired(current) {
                contended.get_or_insert(row.validator_index);
                continue;
            }
            row.open_window(
                group.id(),
                current,
                self.config.cooldown_epochs,
                self.config.window_margin_epochs,
            );
            self.store.save(row)?;
            opened += 1;
        }

        match contended {
            Some(validator_index) if opened == 0 => Ok(WindowEntry::Contended { validator_index }),
            _ => Ok(WindowEntry::Opened {
                check_started: current,
            }),
        }
    }

    async fn aggregate_window(
        &self,
        group: &ValidatorGroup,
        indexes: &[ValidatorIndex],
        check_started: Epoch,
        current: Epoch,
        head_slot: Slot,
    ) -> DetectionResult<WindowVerdict> {
        let mut tally = WindowTally::new(check_started, current);
        let mut queried = indexes.to_vec();

        for epoch in check_started..=current {
            let mut duties = match self
                .fetch(self.beacon.attester_duties(epoch, &queried))
                .await
            {
                Ok(duties) => DutySet::from_duties(duties),
                Err(e) => {
                    warn!(epoch, error = %e, "attester duties unavailable");
                    tally.record_unavailable(epoch, queried.len() as u64);
                    continue;
                }
            };
            if !duties.indexes.is_empty() {
                queried = duties.indexes.clone();
            }

            let pending = duties.retain_included_by(head_slot);
            if pending > 0 {
                debug!(epoch, pending, "skipping duties not yet includable");
            }

            let blocks = self.fetch_slots(&duties.slots).await;

            for duty in &duties.duties {
                if let Some(row) = self.store.load(duty.validator_index)? {
                    if row.blocks_evaluation(
                        group.id(),
                        check_started,
                        epoch,
                        self.config.cooldown_epochs,
                    ) {
                        return Ok(WindowVerdict::Race {
                            validator_index: duty.validator_index,
                            epoch,
                        });
                    }
                }

                let block = blocks.get(&duty.inclusion_slot());
                let outcome = evaluate_duty(
                    duty,
                    block.and_then(|b| b.attestations.as_deref()),
                    block.and_then(|b| b.parent_root.as_deref()),
                );
                debug!(
                    validator_index = duty.validator_index,
                    slot = duty.slot,
                    ?outcome,
                    "duty evaluated"
                );
                tally.record(epoch, duty.validator_index, outcome);
            }
        }

        Ok(WindowVerdict::Summary(tally.summary()))
    }

    /// Fetch attestations and parent roots for every distinct inclusion slot.
    async fn fetch_slots(&self, slots: &[Slot]) -> HashMap<Slot, SlotData> {
        let fetched = join_all(slots.iter().map(|slot| self.fetch_slot(*slot))).await;
        slots.iter().copied().zip(fetched).collect()
    }

    async fn fetch_slot(&self, slot: Slot) -> SlotData {
        let (attestations, parent_root) = futures::join!(
            self.fetch(self.beacon.block_attestations(slot)),
            self.fetch(self.beacon.block_root(slot.saturating_sub(1))),
        );
        SlotData {
            attestations: found_or_log(slot, "attestations", attestations),
            parent_root: found_or_log(slot, "parent root", parent_root),
        }
    }

    fn persist_decision(
        &self,
        group: &ValidatorGroup,
        indexes: &[ValidatorIndex],
        check_started: Epoch,
        start: bool,
        current: Epoch,
    ) -> DetectionResult<()> {
        let _guards = self.locks.acquire(indexes);
        for index in indexes {
            let mut row = self.store.load_or_create(*index)?;
            // cleared by the sweep or taken over while the window was evaluated
            if !row.in_window(group.id(), check_started) {
                continue;
            }
            row.record_decision(start, current);
            self.store.save(&row)?;
        }
        Ok(())
    }

    /// Close every window whose `enabled_epoch` lies before `epoch`.
    pub fn sweep_at(&self, epoch: Epoch) -> DetectionResult<SweepReport> {
        let mut report = SweepReport {
            epoch,
            ..SweepReport::default()
        };
        let mut groups: BTreeMap<String, bool> = BTreeMap::new();

        for candidate in self.store.in_doppelganger()? {
            let index = candidate.validator_index;
            let _guards = self.locks.acquire(&[index]);

            // re-read under the lock, a check may have changed the row
            let Some(mut row) = self.store.load(index)? else {
                continue;
            };
            let label = group_label(row.group.as_deref().unwrap_or_default()).to_string();

            if row.is_expired(epoch) {
                row.clear();
                self.store.save(&row)?;
                report.cleared.push(index);
                groups.entry(label).or_insert(false);
            } else if row.in_doppelganger {
                report.still_active += 1;
                groups.insert(label, true);
            }
        }

        for (group, active) in &groups {
            metrics::set_group_in_check(group, *active);
        }
        metrics::record_sweep_cleared(report.cleared.len() as u64);

        if !report.cleared.is_empty() {
            info!(
                epoch,
                cleared = report.cleared.len(),
                still_active = report.still_active,
                "[dg] 🔓 Sweep closed expired windows"
            );
        }
        Ok(report)
    }
}

fn found_or_log<T>(slot: Slot, what: &str, result: BeaconResult<Option<T>>) -> Option<T> {
    match result {
        Ok(Some(value)) => Some(value),
        Ok(None) => {
            debug!(slot, what, "not found");
            None
        }
        Err(e) => {
            warn!(slot, what, error = %e, "block lookup failed");
            None
        }
    }
}

fn outcome_label(result: &DetectionResult<CheckDecision>) -> &'static str {
    match result {
        Ok(CheckDecision {
            reason: DecisionReason::RaceDetected { .. },
            ..
        }) => "race",
        Ok(decision) if decision.start => "start",
        Ok(_) => "no_start",
        Err(DetectionError::CooldownNotElapsed { .. }) => "cooldown",
        Err(e) if e.is_inconclusive() => "inconclusive",
        Err(_) => "error",
    }
}

#[async_trait]
impl<B, S> DoppelgangerApi for DoppelgangerService<B, S>
where
    B: BeaconNodeGateway,
    S: ValidatorStateStore,
{
    async fn evaluate_group(&self, group: &ValidatorGroup) -> DetectionResult<CheckDecision> {
        let result = self.run_check(group).await;
        metrics::record_check(outcome_label(&result));
        result
    }

    async fn sweep(&self) -> DetectionResult<SweepReport> {
        let epoch = self.fetch(self.beacon.head_epoch()).await?;
        self.sweep_at(epoch)
    }
}

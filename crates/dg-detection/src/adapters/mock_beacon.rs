//! Scripted beacon node for tests and dry runs

use crate::domain::bits::SMALL_BITLIST_LIMIT;
use crate::domain::{AttestationRecord, AttesterDuty, Epoch, Slot, ValidatorIndex};
use crate::error::{BeaconError, BeaconResult};
use crate::ports::outbound::BeaconNodeGateway;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};

#[derive(Default)]
struct ChainView {
    head_slot: Slot,
    head_unavailable: bool,
    indexes: HashMap<String, ValidatorIndex>,
    duties: HashMap<Epoch, Vec<AttesterDuty>>,
    failing_duty_epochs: HashSet<Epoch>,
    attestations: HashMap<Slot, Vec<AttestationRecord>>,
    roots: HashMap<Slot, String>,
    failing_slots: HashSet<Slot>,
    attestation_requests: HashMap<Slot, usize>,
    duty_requests: Vec<(Epoch, Vec<ValidatorIndex>)>,
}

/// In-memory beacon node answering from a scripted chain view.
#[derive(Default)]
pub struct MockBeaconNode {
    view: RwLock<ChainView>,
}

impl MockBeaconNode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_head_slot(&self, slot: Slot) {
        self.view.write().head_slot = slot;
    }

    pub fn set_head_unavailable(&self, unavailable: bool) {
        self.view.write().head_unavailable = unavailable;
    }

    pub fn add_validator(&self, pubkey: &str, index: ValidatorIndex) {
        self.view.write().indexes.insert(pubkey.to_string(), index);
    }

    pub fn add_duty(&self, epoch: Epoch, duty: AttesterDuty) {
        self.view.write().duties.entry(epoch).or_default().push(duty);
    }

    pub fn fail_duties(&self, epoch: Epoch) {
        self.view.write().failing_duty_epochs.insert(epoch);
    }

    /// Make every request for the block at `slot` fail.
    pub fn fail_slot(&self, slot: Slot) {
        self.view.write().failing_slots.insert(slot);
    }

    pub fn set_block_root(&self, slot: Slot, root: &str) {
        self.view.write().roots.insert(slot, root.to_string());
    }

    /// Ensure a block exists at `slot`, possibly without attestations.
    pub fn add_block(&self, slot: Slot) {
        self.view.write().attestations.entry(slot).or_default();
    }

    /// Include an aggregate with the given committee positions set.
    pub fn add_aggregate(
        &self,
        inclusion_slot: Slot,
        committee_index: u64,
        root: &str,
        committee_length: u64,
        positions: &[u64],
    ) {
        let record = AttestationRecord {
            committee_index,
            beacon_block_root: root.to_string(),
            aggregation_bits: encode_bits(committee_length, positions),
        };
        self.view
            .write()
            .attestations
            .entry(inclusion_slot)
            .or_default()
            .push(record);
    }

    pub fn attestation_requests(&self, slot: Slot) -> usize {
        self.view
            .read()
            .attestation_requests
            .get(&slot)
            .copied()
            .unwrap_or(0)
    }

    pub fn duty_requests(&self) -> Vec<(Epoch, Vec<ValidatorIndex>)> {
        self.view.read().duty_requests.clone()
    }
}

/// Encode positions the way blocks carry them. Small committees get the
/// SSZ length delimiter at bit `committee_length`, sharing the last data byte
/// when the length is not a multiple of 8.
pub fn encode_bits(committee_length: u64, positions: &[u64]) -> String {
    let delimited = committee_length < SMALL_BITLIST_LIMIT;
    let total_bits = committee_length + u64::from(delimited);
    let mut bytes = vec![0u8; total_bits.div_ceil(8).max(1) as usize];
    let mut set = |p: u64| bytes[(p / 8) as usize] |= 1 << (p % 8);

    for &p in positions.iter().filter(|p| **p < committee_length) {
        set(p);
    }
    if delimited {
        set(committee_length);
    }
    format!("0x{}", hex::encode(bytes))
}

#[async_trait]
impl BeaconNodeGateway for MockBeaconNode {
    async fn head_slot(&self) -> BeaconResult<Slot> {
        let view = self.view.read();
        if view.head_unavailable {
            return Err(BeaconError::Request("connection refused".into()));
        }
        Ok(view.head_slot)
    }

    async fn attester_duties(
        &self,
        epoch: Epoch,
        indexes: &[ValidatorIndex],
    ) -> BeaconResult<Vec<AttesterDuty>> {
        let mut view = self.view.write();
        view.duty_requests.push((epoch, indexes.to_vec()));
        if view.failing_duty_epochs.contains(&epoch) {
            return Err(BeaconError::Status {
                status: 500,
                path: format!("/eth/v1/validator/duties/attester/{epoch}"),
            });
        }
        Ok(view
            .duties
            .get(&epoch)
            .map(|duties| {
                duties
                    .iter()
                    .filter(|d| indexes.contains(&d.validator_index))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn block_attestations(&self, slot: Slot) -> BeaconResult<Option<Vec<AttestationRecord>>> {
        let mut view = self.view.write();
        *view.attestation_requests.entry(slot).or_insert(0) += 1;
        if view.failing_slots.contains(&slot) {
            return Err(BeaconError::Timeout);
        }
        Ok(view.attestations.get(&slot).cloned())
    }

    async fn block_root(&self, slot: Slot) -> BeaconResult<Option<String>> {
        let view = self.view.read();
        if view.failing_slots.contains(&slot) {
            return Err(BeaconError::Timeout);
        }
        Ok(view.roots.get(&slot).cloned())
    }

    async fn validator_index(&self, pubkey: &str) -> BeaconResult<Option<ValidatorIndex>> {
        Ok(self.view.read().indexes.get(pubkey).copied())
    }
}

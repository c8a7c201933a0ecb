//! Driven Ports (SPI - Outbound Dependencies)

use crate::domain::{
    epoch_of, AttestationRecord, AttesterDuty, Epoch, PublicKey, Slot,
    ValidatorDoppelgangerState, ValidatorIndex,
};
use crate::error::{BeaconResult, StoreResult};
use async_trait::async_trait;
use futures::future::join_all;
use tracing::warn;

/// Read-only view of a beacon node.
///
/// `Ok(None)` means the node answered 404; every other failure is an error.
#[async_trait]
pub trait BeaconNodeGateway: Send + Sync {
    /// Slot of the current head block
    async fn head_slot(&self) -> BeaconResult<Slot>;

    async fn head_epoch(&self) -> BeaconResult<Epoch> {
        Ok(epoch_of(self.head_slot().await?))
    }

    /// Attester duties for `indexes` in `epoch`, one batched request
    async fn attester_duties(
        &self,
        epoch: Epoch,
        indexes: &[ValidatorIndex],
    ) -> BeaconResult<Vec<AttesterDuty>>;

    /// Attestations carried by the block at `slot`
    async fn block_attestations(&self, slot: Slot) -> BeaconResult<Option<Vec<AttestationRecord>>>;

    /// Root of the block at `slot`
    async fn block_root(&self, slot: Slot) -> BeaconResult<Option<String>>;

    async fn validator_index(&self, pubkey: &str) -> BeaconResult<Option<ValidatorIndex>>;

    /// Resolve every key the node knows; unknown keys are logged and skipped.
    async fn resolve_indexes(&self, pubkeys: &[PublicKey]) -> Vec<ValidatorIndex> {
        let lookups = join_all(pubkeys.iter().map(|pk| self.validator_index(pk))).await;

        let mut indexes = Vec::with_capacity(pubkeys.len());
        for (pubkey, lookup) in pubkeys.iter().zip(lookups) {
            match lookup {
                Ok(Some(index)) => indexes.push(index),
                Ok(None) => warn!(%pubkey, "validator not known to beacon node, skipping"),
                Err(e) => warn!(%pubkey, error = %e, "validator index lookup failed, skipping"),
            }
        }
        indexes.sort_unstable();
        indexes.dedup();
        indexes
    }
}

/// Persisted per-validator state.
///
/// Implementations must validate rows they read and only ever hand out
/// records that pass [`ValidatorDoppelgangerState::validate`].
pub trait ValidatorStateStore: Send + Sync {
    fn load(&self, index: ValidatorIndex) -> StoreResult<Option<ValidatorDoppelgangerState>>;

    fn save(&self, state: &ValidatorDoppelgangerState) -> StoreResult<()>;

    /// Every row with an active window
    fn in_doppelganger(&self) -> StoreResult<Vec<ValidatorDoppelgangerState>>;

    /// Load a row, creating the idle default on first access.
    fn load_or_create(&self, index: ValidatorIndex) -> StoreResult<ValidatorDoppelgangerState> {
        match self.load(index)? {
            Some(state) => Ok(state),
            None => {
                let state = ValidatorDoppelgangerState::new(index);
                self.save(&state)?;
                Ok(state)
            }
        }
    }
}

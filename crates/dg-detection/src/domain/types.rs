//! Chain primitives and validator groups

use crate::error::{DetectionError, DetectionResult};
use serde::{Deserialize, Serialize};

pub type Epoch = u64;
pub type Slot = u64;
pub type ValidatorIndex = u64;

/// Hex-encoded BLS public key as accepted by the beacon API
pub type PublicKey = String;

pub const SLOTS_PER_EPOCH: u64 = 32;

/// Epoch containing `slot`.
pub fn epoch_of(slot: Slot) -> Epoch {
    slot / SLOTS_PER_EPOCH
}

/// First slot of `epoch`.
pub fn start_slot(epoch: Epoch) -> Slot {
    epoch.saturating_mul(SLOTS_PER_EPOCH)
}

/// Operator-defined set of keys checked together.
///
/// Immutable for the duration of one check.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorGroup {
    id: String,
    pubkeys: Vec<PublicKey>,
}

impl ValidatorGroup {
    pub fn new(id: impl Into<String>, pubkeys: Vec<PublicKey>) -> DetectionResult<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(DetectionError::InvalidInput {
                reason: "validator group identifier is empty".into(),
            });
        }

        let pubkeys: Vec<PublicKey> = pubkeys
            .into_iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        if pubkeys.is_empty() {
            return Err(DetectionError::InvalidInput {
                reason: format!("validator group '{id}' has no public keys"),
            });
        }

        Ok(Self { id, pubkeys })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn pubkeys(&self) -> &[PublicKey] {
        &self.pubkeys
    }

    /// Label used for per-group metrics: the identifier up to its first `.`.
    pub fn metric_label(&self) -> &str {
        group_label(&self.id)
    }
}

/// Metric label for a stored group identifier.
pub fn group_label(id: &str) -> &str {
    id.split('.').next().unwrap_or(id)
}

//! On-chain attestation data

use serde::{Deserialize, Serialize};

/// One attestation included in a block, reduced to the fields detection needs.
///
/// Signatures are not checked; presence in the aggregation bitfield is the signal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationRecord {
    pub committee_index: u64,
    /// 0x-prefixed root the attestation votes for
    pub beacon_block_root: String,
    /// 0x-prefixed SSZ bitlist
    pub aggregation_bits: String,
}

impl AttestationRecord {
    /// Whether this aggregate belongs to the given committee and head vote.
    pub fn matches(&self, committee_index: u64, block_root: &str) -> bool {
        self.committee_index == committee_index
            && self.beacon_block_root.eq_ignore_ascii_case(block_root)
    }
}

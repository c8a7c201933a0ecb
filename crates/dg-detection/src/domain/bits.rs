//! Aggregation bitfield decoding
//!
//! Aggregation bits arrive as a hex-encoded SSZ bitlist. Bit `p` of the list
//! is bit `p % 8` of byte `p / 8`, so a `BitVec<u8, Lsb0>` over the raw bytes
//! indexes committee members directly.
//!
//! For committees shorter than [`SMALL_BITLIST_LIMIT`] members the final byte
//! only carries the bitlist length delimiter and is dropped before decoding.

use super::attestation::AttestationRecord;
use bitvec::prelude::*;
use thiserror::Error;

/// Committee length below which the trailing delimiter byte is discarded
pub const SMALL_BITLIST_LIMIT: u64 = 280;

pub type CommitteeBits = BitVec<u8, Lsb0>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BitDecodeError {
    #[error("aggregation bits are not valid hex: {0}")]
    InvalidHex(String),
}

/// Decode one aggregation bitfield into per-committee-member flags.
pub fn decode_aggregation_bits(
    hex_bits: &str,
    committee_length: u64,
) -> Result<CommitteeBits, BitDecodeError> {
    let raw = hex_bits.strip_prefix("0x").unwrap_or(hex_bits);
    let mut bytes = hex::decode(raw).map_err(|e| BitDecodeError::InvalidHex(e.to_string()))?;

    if committee_length < SMALL_BITLIST_LIMIT {
        bytes.pop();
    }

    Ok(BitVec::from_vec(bytes))
}

/// Merge every aggregate in `attestations` that matches the committee and root.
///
/// Returns `Ok(None)` when no attestation matches.
pub fn committee_bits(
    attestations: &[AttestationRecord],
    committee_index: u64,
    block_root: &str,
    committee_length: u64,
) -> Result<Option<CommitteeBits>, BitDecodeError> {
    let mut merged: Option<CommitteeBits> = None;

    for attestation in attestations
        .iter()
        .filter(|a| a.matches(committee_index, block_root))
    {
        let bits = decode_aggregation_bits(&attestation.aggregation_bits, committee_length)?;
        match merged.as_mut() {
            None => merged = Some(bits),
            Some(acc) => {
                if acc.len() < bits.len() {
                    acc.resize(bits.len(), false);
                }
                for i in bits.iter_ones() {
                    acc.set(i, true);
                }
            }
        }
    }

    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(committee: u64, root: &str, bits: &str) -> AttestationRecord {
        AttestationRecord {
            committee_index: committee,
            beacon_block_root: root.into(),
            aggregation_bits: bits.into(),
        }
    }

    #[test]
    fn test_small_committee_drops_trailing_byte() {
        // 0x05 = bits 0 and 2; 0x01 is the delimiter byte
        let bits = decode_aggregation_bits("0x0501", 10).unwrap();
        assert_eq!(bits.len(), 8);
        assert_eq!(bits.iter_ones().collect::<Vec<_>>(), vec![0, 2]);
    }

    #[test]
    fn test_large_committee_keeps_every_byte() {
        let mut raw = vec![0u8; 36];
        raw[0] = 0b1000_0000; // member 7
        raw[35] = 0b0000_0010; // member 281
        let bits = decode_aggregation_bits(&hex::encode(&raw), 285).unwrap();
        assert_eq!(bits.len(), 36 * 8);
        assert_eq!(bits.iter_ones().collect::<Vec<_>>(), vec![7, 281]);
    }

    #[test]
    fn test_natural_bit_order_across_bytes() {
        // member 9 lives in the second byte, bit 1
        let bits = decode_aggregation_bits("0x000201", 12).unwrap();
        assert!(bits[9]);
        assert_eq!(bits.count_ones(), 1);
    }

    #[test]
    fn test_boundary_at_limit() {
        assert_eq!(decode_aggregation_bits("ffff", 279).unwrap().len(), 8);
        assert_eq!(decode_aggregation_bits("ffff", 280).unwrap().len(), 16);
    }

    #[test]
    fn test_invalid_hex_rejected() {
        assert!(matches!(
            decode_aggregation_bits("0xzz", 10),
            Err(BitDecodeError::InvalidHex(_))
        ));
    }

    #[test]
    fn test_no_matching_attestation() {
        let atts = vec![record(1, "0xaa", "0x0101"), record(0, "0xbb", "0x0101")];
        assert_eq!(committee_bits(&atts, 0, "0xaa", 8).unwrap(), None);
    }

    #[test]
    fn test_matching_aggregates_are_merged() {
        let atts = vec![
            record(3, "0xAA", "0x0101"),
            record(3, "0xaa", "0x0401"),
            record(4, "0xaa", "0xff01"),
        ];
        let bits = committee_bits(&atts, 3, "0xaa", 8).unwrap().unwrap();
        assert_eq!(bits.iter_ones().collect::<Vec<_>>(), vec![0, 2]);
    }
}

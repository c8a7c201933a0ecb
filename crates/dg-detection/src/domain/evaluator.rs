//! Per-duty attestation evaluation

use super::attestation::AttestationRecord;
use super::bits::committee_bits;
use super::duty::AttesterDuty;
use serde::{Deserialize, Serialize};

/// What the chain says about one duty.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttestationOutcome {
    /// The validator's bit is set in a decoded aggregate
    Attested,
    /// No aggregate could be decoded for the duty; assumed attested
    PresumedAttested,
    /// Aggregate decoded and the validator's bit is clear
    Missed,
    /// Block or root could not be fetched
    Unknown,
}

impl AttestationOutcome {
    /// Any positive signal, optimistic default included.
    pub fn is_attested(self) -> bool {
        matches!(self, Self::Attested | Self::PresumedAttested)
    }
}

/// Evaluate one duty against the inclusion block's attestations and the
/// root of the block at the duty's assigned slot.
///
/// `None` on either input means the lookup failed or returned 404.
pub fn evaluate_duty(
    duty: &AttesterDuty,
    attestations: Option<&[AttestationRecord]>,
    block_root: Option<&str>,
) -> AttestationOutcome {
    let (Some(attestations), Some(root)) = (attestations, block_root) else {
        return AttestationOutcome::Unknown;
    };

    let bits = match committee_bits(
        attestations,
        duty.committee_index,
        root,
        duty.committee_length,
    ) {
        Ok(Some(bits)) => bits,
        Ok(None) => return AttestationOutcome::PresumedAttested,
        Err(e) => {
            tracing::debug!(
                validator_index = duty.validator_index,
                slot = duty.slot,
                error = %e,
                "undecodable aggregation bits"
            );
            return AttestationOutcome::Unknown;
        }
    };

    match usize::try_from(duty.validator_committee_index)
        .ok()
        .and_then(|i| bits.get(i).map(|b| *b))
    {
        Some(true) => AttestationOutcome::Attested,
        Some(false) => AttestationOutcome::Missed,
        // Position lost with the dropped delimiter byte (committees under
        // 280 whose length is not a multiple of 8): no bit was read, not a miss.
        None => AttestationOutcome::PresumedAttested,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROOT: &str = "0x1111";

    fn duty(position: u64) -> AttesterDuty {
        AttesterDuty {
            validator_index: 42,
            slot: 100,
            committee_index: 5,
            validator_committee_index: position,
            committee_length: 16,
        }
    }

    fn aggregate(bits: &str) -> Vec<AttestationRecord> {
        vec![AttestationRecord {
            committee_index: 5,
            beacon_block_root: ROOT.into(),
            aggregation_bits: bits.into(),
        }]
    }

    #[test]
    fn test_bit_set_is_attested() {
        let atts = aggregate("0x000401"); // member 10
        assert_eq!(
            evaluate_duty(&duty(10), Some(&atts), Some(ROOT)),
            AttestationOutcome::Attested
        );
    }

    #[test]
    fn test_bit_clear_is_missed() {
        let atts = aggregate("0x000401");
        assert_eq!(
            evaluate_duty(&duty(3), Some(&atts), Some(ROOT)),
            AttestationOutcome::Missed
        );
    }

    #[test]
    fn test_missing_block_or_root_is_unknown() {
        let atts = aggregate("0x000401");
        assert_eq!(
            evaluate_duty(&duty(10), None, Some(ROOT)),
            AttestationOutcome::Unknown
        );
        assert_eq!(
            evaluate_duty(&duty(10), Some(&atts), None),
            AttestationOutcome::Unknown
        );
    }

    #[test]
    fn test_no_matching_aggregate_presumed_attested() {
        let atts = aggregate("0x000401");
        let outcome = evaluate_duty(&duty(3), Some(&atts), Some("0x2222"));
        assert_eq!(outcome, AttestationOutcome::PresumedAttested);
        assert!(outcome.is_attested());
    }

    #[test]
    fn test_position_beyond_bitfield_presumed_attested() {
        let atts = aggregate("0x0001");
        assert_eq!(
            evaluate_duty(&duty(12), Some(&atts), Some(ROOT)),
            AttestationOutcome::PresumedAttested
        );
    }

    #[test]
    fn test_member_in_delimiter_byte_presumed_attested() {
        // committee of 10: members 8 and 9 share the byte with the delimiter
        let last_member = AttesterDuty {
            committee_length: 10,
            ..duty(9)
        };
        let atts = aggregate("0x0004");
        assert_eq!(
            evaluate_duty(&last_member, Some(&atts), Some(ROOT)),
            AttestationOutcome::PresumedAttested
        );

        // members in earlier bytes are still read
        let early_member = AttesterDuty {
            committee_length: 10,
            ..duty(2)
        };
        assert_eq!(
            evaluate_duty(&early_member, Some(&atts), Some(ROOT)),
            AttestationOutcome::Missed
        );
    }

    #[test]
    fn test_malformed_bits_unknown() {
        let atts = aggregate("0xnothex");
        assert_eq!(
            evaluate_duty(&duty(1), Some(&atts), Some(ROOT)),
            AttestationOutcome::Unknown
        );
    }
}

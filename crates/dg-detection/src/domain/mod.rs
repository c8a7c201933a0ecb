//! Domain layer: pure detection logic, no I/O

pub mod attestation;
pub mod bits;
pub mod duty;
pub mod evaluator;
pub mod policy;
pub mod state;
pub mod tally;
pub mod types;

pub use attestation::AttestationRecord;
pub use bits::{committee_bits, decode_aggregation_bits, BitDecodeError, CommitteeBits};
pub use duty::{AttesterDuty, DutySet};
pub use evaluator::{evaluate_duty, AttestationOutcome};
pub use policy::DecisionPolicy;
pub use state::{CheckPhase, ValidatorDoppelgangerState};
pub use tally::{WindowSummary, WindowTally};
pub use types::{
    epoch_of, start_slot, Epoch, PublicKey, Slot, ValidatorGroup, ValidatorIndex, SLOTS_PER_EPOCH,
};

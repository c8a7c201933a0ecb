//! # dg-detection
//!
//! Doppelganger detection for validator signing keys.
//!
//! ## Overview
//!
//! Before a validator client may start, this crate checks whether another
//! instance of the same keys is already attesting on chain:
//! - **Bit Decoder**: hex aggregation bitfield → per-committee-member flags
//! - **Duty Resolver**: batched attester duties, deduplicated inclusion slots
//! - **Attestation Evaluator**: one duty → attested / missed / unknown
//! - **Window Aggregator**: tallies across `[check_started, current_epoch]`
//! - **Decision Policy**: start only on silence, guarded by a not-found ratio
//! - **State Machine**: cooldown window per validator, closed by a sweep
//!
//! ## Architecture
//!
//! ```text
//! HTTP /check ──evaluate_group──→ DoppelgangerService ──→ BeaconNodeGateway (duties, blocks, roots)
//!                                        │
//! sweep timer ──sweep──────────────────→ ├──→ ValidatorStateStore (per-validator rows)
//!                                        │
//!                                        └──→ StateLocks (per-index stripes)
//! ```
//!
//! ## Decision
//!
//! ```text
//! start = ((!non_errored_found && !found[first_epoch])
//!          || (!non_errored_found && confirmed_cross_epoch_miss))
//!         && not_found_ratio <= threshold
//! ```
//!
//! Anything inconclusive is an error, never `start = true`.
//!
//! ## Example
//!
//! ```rust,ignore
//! use dg_detection::{DetectionConfig, DoppelgangerService, ValidatorGroup};
//! use dg_detection::ports::inbound::DoppelgangerApi;
//!
//! let service = DoppelgangerService::new(DetectionConfig::default(), beacon, store);
//!
//! let group = ValidatorGroup::new("mainnet-a.txt", pubkeys)?;
//! match service.evaluate_group(&group).await {
//!     Ok(decision) if decision.start => launch_validator_client(),
//!     Ok(_) => keep_waiting(),
//!     Err(e) if e.is_inconclusive() => retry_later(),
//!     Err(e) => return Err(e.into()),
//! }
//! ```

pub mod adapters;
pub mod domain;
pub mod error;
pub mod locks;
pub mod metrics;
pub mod ports;
pub mod service;

pub use domain::{
    AttestationOutcome, AttestationRecord, AttesterDuty, CheckPhase, DecisionPolicy, Epoch, Slot,
    ValidatorDoppelgangerState, ValidatorGroup, ValidatorIndex, WindowSummary,
};
pub use error::{BeaconError, DetectionError, DetectionResult, StoreError};
pub use ports::inbound::{CheckDecision, DecisionReason, DoppelgangerApi, SweepReport};
pub use ports::outbound::{BeaconNodeGateway, ValidatorStateStore};
pub use service::{DetectionConfig, DoppelgangerService};

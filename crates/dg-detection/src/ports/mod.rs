//! Ports module for doppelganger detection

pub mod inbound;
pub mod outbound;

pub use inbound::{CheckDecision, DecisionReason, DoppelgangerApi, SweepReport};
pub use outbound::{BeaconNodeGateway, ValidatorStateStore};

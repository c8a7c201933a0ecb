//! # checker-runtime
//!
//! Service wrapper around `dg-detection`: a validator client launcher asks
//! `GET /check?filename=<list>` and only starts when the answer is
//! `{"start": true}`.
//!
//! ## Tasks
//!
//! ```text
//! ┌────────────────────┐   evaluate_group   ┌──────────────────────┐
//! │ check server :8080 │ ─────────────────→ │                      │
//! └────────────────────┘                    │ DoppelgangerService  │ ──→ beacon node
//! ┌────────────────────┐       sweep        │                      │ ──→ state store
//! │ sweeper (60s)      │ ─────────────────→ │                      │
//! └────────────────────┘                    └──────────────────────┘
//! ┌────────────────────┐
//! │ metrics :9100      │  Prometheus text format
//! └────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod http;
pub mod runtime;
pub mod sweeper;
pub mod telemetry;
pub mod validators;

pub use config::{CheckerConfig, ConfigError, StorageBackend};
pub use error::RuntimeError;
pub use runtime::CheckerRuntime;

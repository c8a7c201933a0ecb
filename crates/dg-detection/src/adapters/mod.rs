//! # Adapters Layer (Hexagonal Architecture)
//!
//! Implementations of the outbound ports: the beacon node HTTP API and the
//! persisted validator state.

mod beacon_http;
mod file_store;
mod memory_store;
mod mock_beacon;
#[cfg(feature = "rocksdb")]
mod rocksdb_store;

pub use beacon_http::{BeaconNodeHttpClient, Timeouts};
pub use file_store::FileStateStore;
pub use memory_store::InMemoryStateStore;
pub use mock_beacon::{encode_bits, MockBeaconNode};
#[cfg(feature = "rocksdb")]
pub use rocksdb_store::RocksDbStateStore;

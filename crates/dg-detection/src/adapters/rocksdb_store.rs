//! # RocksDB State Store
//!
//! One key per validator: the big-endian index under the `validators` column
//! family, bincode-encoded [`ValidatorDoppelgangerState`] as value.

use crate::domain::{ValidatorDoppelgangerState, ValidatorIndex};
use crate::error::{StoreError, StoreResult};
use crate::ports::outbound::ValidatorStateStore;
use rocksdb::{ColumnFamilyDescriptor, IteratorMode, Options, WriteOptions, DB};
use std::path::Path;

pub const CF_VALIDATORS: &str = "validators";

pub struct RocksDbStateStore {
    db: DB,
    sync_writes: bool,
}

impl RocksDbStateStore {
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        opts.set_compression_type(rocksdb::DBCompressionType::Snappy);

        let mut cf_opts = Options::default();
        cf_opts.set_compression_type(rocksdb::DBCompressionType::Snappy);
        let cf = ColumnFamilyDescriptor::new(CF_VALIDATORS, cf_opts);

        let db = DB::open_cf_descriptors(&opts, path, vec![cf])
            .map_err(|e| StoreError::Backend(format!("Failed to open RocksDB: {}", e)))?;

        Ok(Self {
            db,
            sync_writes: true,
        })
    }

    fn cf(&self) -> StoreResult<&rocksdb::ColumnFamily> {
        self.db
            .cf_handle(CF_VALIDATORS)
            .ok_or_else(|| StoreError::Backend("missing validators column family".into()))
    }

    fn decode(bytes: &[u8]) -> StoreResult<ValidatorDoppelgangerState> {
        let row: ValidatorDoppelgangerState = bincode::deserialize(bytes)?;
        row.validate()?;
        Ok(row)
    }
}

impl ValidatorStateStore for RocksDbStateStore {
    fn load(&self, index: ValidatorIndex) -> StoreResult<Option<ValidatorDoppelgangerState>> {
        let value = self
            .db
            .get_cf(self.cf()?, index.to_be_bytes())
            .map_err(|e| StoreError::Backend(format!("RocksDB get failed: {}", e)))?;
        value.as_deref().map(Self::decode).transpose()
    }

    fn save(&self, state: &ValidatorDoppelgangerState) -> StoreResult<()> {
        state.validate()?;
        let bytes = bincode::serialize(state)?;

        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.sync_writes);

        self.db
            .put_cf_opt(
                self.cf()?,
                state.validator_index.to_be_bytes(),
                bytes,
                &write_opts,
            )
            .map_err(|e| StoreError::Backend(format!("RocksDB put failed: {}", e)))
    }

    fn in_doppelganger(&self) -> StoreResult<Vec<ValidatorDoppelgangerState>> {
        let mut rows = Vec::new();
        for item in self.db.iterator_cf(self.cf()?, IteratorMode::Start) {
            let (_, value) =
                item.map_err(|e| StoreError::Backend(format!("RocksDB scan failed: {}", e)))?;
            let row = Self::decode(&value)?;
            if row.in_doppelganger {
                rows.push(row);
            }
        }
        Ok(rows)
    }
}

//! Per-validator lock table
//!
//! Read-modify-write of persisted state happens under the stripes covering
//! the touched validator indexes. Stripes are always taken in ascending
//! order, so overlapping groups cannot deadlock. Guards are never held
//! across an `.await`.

use crate::domain::ValidatorIndex;
use parking_lot::{Mutex, MutexGuard};

pub const DEFAULT_LOCK_STRIPES: usize = 64;

pub struct StateLocks {
    stripes: Vec<Mutex<()>>,
}

impl StateLocks {
    pub fn new(stripes: usize) -> Self {
        Self {
            stripes: (0..stripes.max(1)).map(|_| Mutex::new(())).collect(),
        }
    }

    fn stripe(&self, index: ValidatorIndex) -> usize {
        (index % self.stripes.len() as u64) as usize
    }

    /// Lock every stripe covering `indexes`.
    pub fn acquire(&self, indexes: &[ValidatorIndex]) -> Vec<MutexGuard<'_, ()>> {
        let mut stripes: Vec<usize> = indexes.iter().map(|i| self.stripe(*i)).collect();
        stripes.sort_unstable();
        stripes.dedup();
        stripes.into_iter().map(|s| self.stripes[s].lock()).collect()
    }
}

impl Default for StateLocks {
    fn default() -> Self {
        Self::new(DEFAULT_LOCK_STRIPES)
    }
}

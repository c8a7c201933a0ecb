//! File-backed state store
//!
//! The whole table lives in memory and is rewritten on every save through a
//! temp file and rename, so a crash leaves either the old or the new table.
//!
//! The in-memory copy is only authoritative while this process is the sole
//! writer, so `open` takes an exclusive lock on `<path>.lock` and holds it
//! until the store is dropped. A second opener, in this or another process,
//! gets `StoreError::Backend`.

use crate::domain::{ValidatorDoppelgangerState, ValidatorIndex};
use crate::error::{StoreError, StoreResult};
use crate::ports::outbound::ValidatorStateStore;
use fs2::FileExt;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

type Table = BTreeMap<ValidatorIndex, ValidatorDoppelgangerState>;

/// Exclusive lock on a state file, released on drop.
struct StateFileLock {
    file: File,
    path: PathBuf,
}

impl StateFileLock {
    fn acquire(state_path: &Path) -> StoreResult<Self> {
        let mut lock_path = state_path.as_os_str().to_owned();
        lock_path.push(".lock");
        let path = PathBuf::from(lock_path);

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)?;

        if file.try_lock_exclusive().is_err() {
            let holder = std::fs::read_to_string(&path)
                .ok()
                .and_then(|s| s.trim().parse::<u32>().ok());
            warn!(
                "[dg] 🔒 State file {} is locked (holder pid: {:?})",
                state_path.display(),
                holder
            );
            return Err(StoreError::Backend(match holder {
                Some(pid) => format!(
                    "state file {} already in use by process {pid}",
                    state_path.display()
                ),
                None => format!("state file {} already in use", state_path.display()),
            }));
        }

        file.set_len(0)?;
        let mut locked = file;
        writeln!(locked, "{}", std::process::id())?;
        locked.sync_all()?;

        Ok(Self { file: locked, path })
    }
}

impl Drop for StateFileLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
        let _ = std::fs::remove_file(&self.path);
    }
}

pub struct FileStateStore {
    rows: RwLock<Table>,
    path: PathBuf,
    _lock: StateFileLock,
}

impl FileStateStore {
    /// Open the store at `path`, creating an empty table if the file is absent.
    ///
    /// An unreadable or corrupt file is an error, never an empty table, and
    /// so is a state file already held by another open store.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        create_parent(&path)?;
        let lock = StateFileLock::acquire(&path)?;

        let rows = match std::fs::read(&path) {
            Ok(bytes) => {
                let rows: Table = bincode::deserialize(&bytes)?;
                for row in rows.values() {
                    row.validate()?;
                }
                info!(
                    "[dg] 💾 Loaded {} validator rows from {}",
                    rows.len(),
                    path.display()
                );
                rows
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("[dg] 📁 No existing state file at {}", path.display());
                Table::new()
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            rows: RwLock::new(rows),
            path,
            _lock: lock,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_table(&self, rows: &Table) -> StoreResult<()> {
        let bytes = bincode::serialize(rows)?;

        let temp_path = self.path.with_extension("tmp");
        let mut file = std::fs::File::create(&temp_path)?;
        file.write_all(&bytes)?;
        file.sync_all()?;

        std::fs::rename(&temp_path, &self.path)?;
        Ok(())
    }
}

fn create_parent(path: &Path) -> StoreResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

impl ValidatorStateStore for FileStateStore {
    fn load(&self, index: ValidatorIndex) -> StoreResult<Option<ValidatorDoppelgangerState>> {
        Ok(self.rows.read().get(&index).cloned())
    }

    fn save(&self, state: &ValidatorDoppelgangerState) -> StoreResult<()> {
        state.validate()?;
        let mut rows = self.rows.write();
        let previous = rows.insert(state.validator_index, state.clone());
        if let Err(e) = self.write_table(&rows) {
            match previous {
                Some(old) => rows.insert(state.validator_index, old),
                None => rows.remove(&state.validator_index),
            };
            return Err(e);
        }
        Ok(())
    }

    fn in_doppelganger(&self) -> StoreResult<Vec<ValidatorDoppelgangerState>> {
        Ok(self
            .rows
            .read()
            .values()
            .filter(|row| row.in_doppelganger)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.db");

        {
            let store = FileStateStore::open(&path).unwrap();
            let mut row = store.load_or_create(11).unwrap();
            row.open_window("group-a", 40, 2, 2);
            store.save(&row).unwrap();
        }

        let reopened = FileStateStore::open(&path).unwrap();
        let row = reopened.load(11).unwrap().unwrap();
        assert!(row.in_window("group-a", 40));
        assert_eq!(reopened.in_doppelganger().unwrap().len(), 1);
    }

    #[test]
    fn test_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/state.db");
        let store = FileStateStore::open(&path).unwrap();
        store.load_or_create(1).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_second_open_of_same_file_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.db");

        let first = FileStateStore::open(&path).unwrap();
        let mut row = first.load_or_create(1).unwrap();
        row.open_window("group-a", 40, 2, 2);
        first.save(&row).unwrap();

        let second = FileStateStore::open(&path);
        assert!(matches!(second, Err(StoreError::Backend(_))));

        // the first handle's rows are untouched
        assert!(first.load(1).unwrap().unwrap().in_window("group-a", 40));

        drop(first);
        let reopened = FileStateStore::open(&path).unwrap();
        assert!(reopened.load(1).unwrap().unwrap().in_window("group-a", 40));
    }

    #[test]
    fn test_lock_file_records_pid_and_is_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.db");
        let lock_path = dir.path().join("state.db.lock");

        let store = FileStateStore::open(&path).unwrap();
        let pid: u32 = std::fs::read_to_string(&lock_path)
            .unwrap()
            .trim()
            .parse()
            .unwrap();
        assert_eq!(pid, std::process::id());

        drop(store);
        assert!(!lock_path.exists());
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.db");
        std::fs::write(&path, b"definitely not bincode").unwrap();
        assert!(FileStateStore::open(&path).is_err());
    }
}

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use fs2::FileExt as _;

use crate::error::StorageError;

/// Exclusive writer lock for one store file, held for the lifetime of a
/// [`Database`](crate::Database).
///
/// `fs2` file locks coordinate separate processes. They do not reliably
/// exclude a second open from the same process, so an in-process set of held
/// paths backs them up.
#[derive(Debug)]
pub(crate) struct StoreLock {
    file: File,
    path: PathBuf,
}

impl StoreLock {
    pub(crate) fn acquire(store_path: &Path) -> Result<Self, StorageError> {
        let path = lock_path(store_path);
        {
            let mut held = held_locks()
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if !held.insert(path.clone()) {
                return Err(StorageError::Locked {
                    path: store_path.to_path_buf(),
                });
            }
        }

        match Self::lock_file(&path) {
            Ok(file) => Ok(Self { file, path }),
            Err(err) => {
                release_in_process(&path);
                if err.kind() == std::io::ErrorKind::WouldBlock
                    || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
                {
                    Err(StorageError::Locked {
                        path: store_path.to_path_buf(),
                    })
                } else {
                    Err(err.into())
                }
            }
        }
    }

    fn lock_file(path: &Path) -> std::io::Result<File> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)?;
        file.try_lock_exclusive()?;
        Ok(file)
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
        release_in_process(&self.path);
    }
}

fn lock_path(store_path: &Path) -> PathBuf {
    let mut name = store_path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(".lock");
    store_path.with_file_name(name)
}

fn held_locks() -> &'static Mutex<HashSet<PathBuf>> {
    static HELD: OnceLock<Mutex<HashSet<PathBuf>>> = OnceLock::new();
    HELD.get_or_init(|| Mutex::new(HashSet::new()))
}

fn release_in_process(path: &Path) {
    let mut held = held_locks()
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    held.remove(path);
}

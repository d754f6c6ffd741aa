use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};

use memmap2::MmapOptions;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::address::Address;
use crate::error::StorageError;
use crate::header::{self, root_slot_address};
use crate::heap::{Heap, CHUNK_SIZE};
use crate::lock::StoreLock;
use crate::malloc::{Pool, POOL_COUNT};

#[derive(Clone, Debug)]
pub struct DatabaseOptions {
    /// Take an exclusive lock file next to the store so only one writer
    /// (process or in-process instance) can open it.
    pub exclusive_lock: bool,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self {
            exclusive_lock: true,
        }
    }
}

/// Snapshot of allocator bookkeeping.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreStats {
    pub version: u32,
    pub chunk_count: usize,
    pub end_of_heap: u64,
    pub generation: u64,
    pub pool_usage: [u64; POOL_COUNT],
}

struct StoreState {
    heap: Heap,
    file: File,
}

/// An open store: one backing file, one reader/writer monitor, one write
/// generation counter.
pub struct Database {
    path: PathBuf,
    state: RwLock<StoreState>,
    generation: AtomicU64,
    _lock: Option<StoreLock>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("path", &self.path)
            .field("generation", &self.generation())
            .finish_non_exhaustive()
    }
}

impl Database {
    /// Opens (or creates) an isolated store bound to `path`.
    ///
    /// Fails with [`StorageError::VersionMismatch`] or
    /// [`StorageError::InvalidHeader`] when the file cannot be read; see
    /// [`Database::open_or_rebuild`] for the recovering variant.
    pub fn open(path: &Path, options: &DatabaseOptions) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let lock = if options.exclusive_lock {
            Some(StoreLock::acquire(path)?)
        } else {
            None
        };

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)?;
        let len = file.metadata()?.len();

        let (heap, generation) = if len == 0 {
            let mut heap = Heap::empty();
            header::initialize(&mut heap)?;
            (heap, 0)
        } else {
            if len % CHUNK_SIZE as u64 != 0 {
                return Err(StorageError::InvalidHeader(
                    "file length is not a multiple of the chunk size",
                ));
            }
            // Safety: the mapping is read-only and only used to fault chunks
            // in. This process never truncates the file while mapped except
            // in `reset`, which drops the mapping first.
            let map = unsafe { MmapOptions::new().map(&file)? };
            let heap = Heap::mapped(map);
            let info = header::read(&heap)?;
            tracing::debug!(
                target: "ndx.storage",
                path = %path.display(),
                version = info.version,
                chunks = heap.chunk_count(),
                "opened store"
            );
            (heap, info.generation)
        };

        Ok(Self {
            path: path.to_path_buf(),
            state: RwLock::new(StoreState { heap, file }),
            generation: AtomicU64::new(generation),
            _lock: lock,
        })
    }

    /// Opens `path`, deleting and recreating the file if its header is
    /// unreadable or its version lies outside the supported range.
    pub fn open_or_rebuild(path: &Path, options: &DatabaseOptions) -> Result<Self, StorageError> {
        match Self::open(path, options) {
            Ok(db) => Ok(db),
            Err(err) if err.needs_rebuild() => {
                tracing::warn!(
                    target: "ndx.storage",
                    path = %path.display(),
                    error = %err,
                    "store is unreadable; rebuilding from scratch"
                );
                match std::fs::remove_file(path) {
                    Ok(()) => {}
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                    Err(err) => return Err(err.into()),
                }
                Self::open(path, options)
            }
            Err(err) => Err(err),
        }
    }

    /// Returns the process-wide instance for `path`, opening it on first use.
    ///
    /// Instances are shared while any `Arc` is alive; tests that need
    /// isolation should use [`Database::open`] on a private file instead.
    pub fn open_shared(path: &Path, options: &DatabaseOptions) -> Result<Arc<Self>, StorageError> {
        let key = registry_key(path)?;
        let registry = shared_registry();
        let mut map = registry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(existing) = map.get(&key).and_then(Weak::upgrade) {
            return Ok(existing);
        }

        let db = Arc::new(Self::open_or_rebuild(&key, options)?);
        map.retain(|_, weak| weak.strong_count() > 0);
        map.insert(key, Arc::downgrade(&db));
        Ok(db)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current write generation. Read without taking the monitor.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Acquires the read side of the monitor.
    pub fn read(&self) -> ReadTxn<'_> {
        ReadTxn {
            db: self,
            state: self.state.read(),
        }
    }

    /// Acquires the write side of the monitor. Blocks until every reader has
    /// released.
    pub fn write(&self) -> WriteTxn<'_> {
        WriteTxn {
            db: self,
            state: self.state.write(),
        }
    }

    /// Writes dirty chunks and the header back to the file.
    pub fn flush(&self) -> Result<(), StorageError> {
        let mut txn = self.write();
        txn.flush()
    }

    /// Discards every record and reformats the store.
    pub fn clear(&self) -> Result<(), StorageError> {
        let mut txn = self.write();
        txn.reset()
    }

    /// Bytes currently allocated from `pool`, block headers included.
    pub fn pool_usage(&self, pool: Pool) -> u64 {
        self.stats()
            .pool_usage
            .get(usize::from(pool.id()))
            .copied()
            .unwrap_or_default()
    }

    pub fn stats(&self) -> StoreStats {
        let txn = self.read();
        let mut pool_usage = [0u64; POOL_COUNT];
        for (pool, usage) in pool_usage.iter_mut().enumerate() {
            *usage = txn
                .get_u64(header::pool_usage_address(pool))
                .unwrap_or_default();
        }
        StoreStats {
            version: header::read(&txn).map(|info| info.version).unwrap_or_default(),
            chunk_count: txn.chunk_count(),
            end_of_heap: txn
                .get_u64(header::end_of_heap_address())
                .unwrap_or_default(),
            generation: self.generation(),
            pool_usage,
        }
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if !state.heap.has_dirty_chunks() {
            return;
        }
        let generation = self.generation.load(Ordering::Acquire);
        let result = match state.heap.slice_mut(header::generation_address(), 8) {
            Ok(bytes) => {
                bytes.copy_from_slice(&generation.to_le_bytes());
                state.heap.flush_to(&mut state.file)
            }
            Err(err) => Err(err),
        };
        if let Err(err) = result {
            tracing::debug!(
                target: "ndx.storage",
                path = %self.path.display(),
                error = %err,
                "failed to flush store on close"
            );
        }
    }
}

fn shared_registry() -> &'static Mutex<HashMap<PathBuf, Weak<Database>>> {
    static SHARED: OnceLock<Mutex<HashMap<PathBuf, Weak<Database>>>> = OnceLock::new();
    SHARED.get_or_init(|| Mutex::new(HashMap::new()))
}

fn registry_key(path: &Path) -> Result<PathBuf, StorageError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)?;
    let parent = std::fs::canonicalize(parent)?;
    match path.file_name() {
        Some(name) => Ok(parent.join(name)),
        None => Err(StorageError::Io(std::io::Error::other(
            "store path has no file name",
        ))),
    }
}

/// Shared access to the store. Any number may be alive at once.
pub struct ReadTxn<'db> {
    db: &'db Database,
    state: RwLockReadGuard<'db, StoreState>,
}

impl<'db> ReadTxn<'db> {
    pub fn database(&self) -> &'db Database {
        self.db
    }

    pub fn root(&self, slot: usize) -> Result<u64, StorageError> {
        self.state.heap.get_u64(root_slot_address(slot))
    }
}

impl Deref for ReadTxn<'_> {
    type Target = Heap;

    fn deref(&self) -> &Heap {
        &self.state.heap
    }
}

/// Exclusive access to the store. Every mutating call bumps the write
/// generation before touching the heap.
pub struct WriteTxn<'db> {
    db: &'db Database,
    state: RwLockWriteGuard<'db, StoreState>,
}

impl<'db> WriteTxn<'db> {
    pub fn database(&self) -> &'db Database {
        self.db
    }

    pub(crate) fn heap(&self) -> &Heap {
        &self.state.heap
    }

    pub(crate) fn heap_mut(&mut self) -> &mut Heap {
        &mut self.state.heap
    }

    pub(crate) fn bump_generation(&self) {
        self.db.generation.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn write_u64(&mut self, address: Address, value: u64) -> Result<(), StorageError> {
        self.put_bytes(address, &value.to_le_bytes())
    }

    pub fn root(&self, slot: usize) -> Result<u64, StorageError> {
        self.state.heap.get_u64(root_slot_address(slot))
    }

    pub fn set_root(&mut self, slot: usize, value: u64) -> Result<(), StorageError> {
        self.put_u64(root_slot_address(slot), value)
    }

    pub fn put_bytes(&mut self, address: Address, bytes: &[u8]) -> Result<(), StorageError> {
        self.bump_generation();
        self.state
            .heap
            .slice_mut(address, bytes.len())?
            .copy_from_slice(bytes);
        Ok(())
    }

    pub fn put_u8(&mut self, address: Address, value: u8) -> Result<(), StorageError> {
        self.put_bytes(address, &[value])
    }

    pub fn put_u16(&mut self, address: Address, value: u16) -> Result<(), StorageError> {
        self.put_bytes(address, &value.to_le_bytes())
    }

    pub fn put_u32(&mut self, address: Address, value: u32) -> Result<(), StorageError> {
        self.put_bytes(address, &value.to_le_bytes())
    }

    pub fn put_u64(&mut self, address: Address, value: u64) -> Result<(), StorageError> {
        self.put_bytes(address, &value.to_le_bytes())
    }

    pub fn put_i32(&mut self, address: Address, value: i32) -> Result<(), StorageError> {
        self.put_bytes(address, &value.to_le_bytes())
    }

    pub fn put_i64(&mut self, address: Address, value: i64) -> Result<(), StorageError> {
        self.put_bytes(address, &value.to_le_bytes())
    }

    pub fn put_f32(&mut self, address: Address, value: f32) -> Result<(), StorageError> {
        self.put_bytes(address, &value.to_le_bytes())
    }

    pub fn put_f64(&mut self, address: Address, value: f64) -> Result<(), StorageError> {
        self.put_bytes(address, &value.to_le_bytes())
    }

    pub fn put_address(&mut self, address: Address, value: Address) -> Result<(), StorageError> {
        self.put_u64(address, value.get())
    }

    /// Writes dirty chunks and the current generation back to the file.
    pub fn flush(&mut self) -> Result<(), StorageError> {
        let generation = self.db.generation();
        let StoreState { heap, file } = &mut *self.state;
        heap.slice_mut(header::generation_address(), 8)?
            .copy_from_slice(&generation.to_le_bytes());
        let written = heap.flush_to(file)?;
        tracing::trace!(target: "ndx.storage", chunks = written, "flushed store");
        Ok(())
    }

    /// Truncates the backing file and formats an empty store in its place.
    pub fn reset(&mut self) -> Result<(), StorageError> {
        self.bump_generation();
        let StoreState { heap, file } = &mut *self.state;
        // Drop the old mapping before shrinking the file underneath it.
        *heap = Heap::empty();
        file.set_len(0)?;
        header::initialize(heap)?;
        heap.flush_to(file)?;
        tracing::info!(
            target: "ndx.storage",
            path = %self.db.path.display(),
            "store reset"
        );
        Ok(())
    }
}

impl Deref for WriteTxn<'_> {
    type Target = Heap;

    fn deref(&self) -> &Heap {
        &self.state.heap
    }
}

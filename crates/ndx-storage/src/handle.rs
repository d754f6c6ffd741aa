use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::database::{Database, ReadTxn};
use crate::error::StorageError;
use crate::heap::Heap;

type Search<T, E> = dyn Fn(&Heap) -> Result<T, E> + Send + Sync;

/// A query result that may be held across lock boundaries.
///
/// The handle remembers the store generation its value was computed at. When
/// the generation has moved on, the next access reruns the search under a
/// read lock, so callers always see a value consistent with the current
/// store contents. Reading the cached value while the store is unchanged
/// does not touch the store's lock.
pub struct StableHandle<T, E = StorageError> {
    db: Arc<Database>,
    search: Box<Search<T, E>>,
    cached: Mutex<Option<(u64, T)>>,
}

impl<T, E> fmt::Debug for StableHandle<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StableHandle")
            .field("store", &self.db.path())
            .field("cached_generation", &self.cached.lock().as_ref().map(|(g, _)| *g))
            .finish_non_exhaustive()
    }
}

impl<T, E> StableHandle<T, E>
where
    T: Clone,
    E: From<StorageError>,
{
    /// A handle whose value is computed on first access.
    pub fn new(db: Arc<Database>, search: impl Fn(&Heap) -> Result<T, E> + Send + Sync + 'static) -> Self {
        Self {
            db,
            search: Box::new(search),
            cached: Mutex::new(None),
        }
    }

    /// A handle seeded with `value`, which the caller computed under a lock
    /// held at `generation`.
    pub fn with_initial(
        db: Arc<Database>,
        generation: u64,
        value: T,
        search: impl Fn(&Heap) -> Result<T, E> + Send + Sync + 'static,
    ) -> Self {
        Self {
            db,
            search: Box::new(search),
            cached: Mutex::new(Some((generation, value))),
        }
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    fn cached_at(&self, generation: u64) -> Option<T> {
        match &*self.cached.lock() {
            Some((at, value)) if *at == generation => Some(value.clone()),
            _ => None,
        }
    }

    /// Current value, recomputed if the store changed since it was cached.
    pub fn get(&self) -> Result<T, E> {
        if let Some(value) = self.cached_at(self.db.generation()) {
            return Ok(value);
        }
        let txn = self.db.read();
        self.refresh(&txn)
    }

    /// Runs `f` with a read lock held and the value valid under that lock.
    pub fn read<R>(&self, f: impl FnOnce(&ReadTxn<'_>, T) -> Result<R, E>) -> Result<R, E> {
        let txn = self.db.read();
        let value = self.refresh(&txn)?;
        f(&txn, value)
    }

    /// Drops the cached value so the next access searches again.
    pub fn invalidate(&self) {
        *self.cached.lock() = None;
    }

    fn refresh(&self, txn: &ReadTxn<'_>) -> Result<T, E> {
        // Writers are excluded while `txn` is alive, so the generation is stable.
        let generation = self.db.generation();
        if let Some(value) = self.cached_at(generation) {
            return Ok(value);
        }
        let value = (self.search)(&**txn)?;
        *self.cached.lock() = Some((generation, value.clone()));
        Ok(value)
    }
}

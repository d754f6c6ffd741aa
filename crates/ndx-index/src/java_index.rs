use std::path::Path;
use std::sync::Arc;

use ndx_storage::{Address, Database, DatabaseOptions, Heap, ReadTxn, StableHandle, WriteTxn};

use crate::config::IndexConfig;
use crate::descriptor;
use crate::error::{IndexError, Result};
use crate::fingerprint::{backing_file, FingerprintCache};
use crate::nodes::{ResourceRec, TypeIdRec, TypeRec};
use crate::schema::{java_schema, tags, JavaSchema, FULLY_INDEXED};

/// Query and mutation surface of the type index.
///
/// Read operations take the heap of a [`ReadTxn`] (or a [`WriteTxn`], which
/// derefs to the same heap) and hand back views borrowing it. Mutating
/// operations take the [`WriteTxn`] the caller already holds; the index never
/// acquires the write lock on its own except in [`JavaIndex::index_file`],
/// [`JavaIndex::rebuild`] and [`JavaIndex::flush`].
#[derive(Debug)]
pub struct JavaIndex {
    db: Arc<Database>,
    schema: &'static JavaSchema,
    fingerprints: FingerprintCache,
    flush_on_index: bool,
}

impl JavaIndex {
    /// Opens the process-wide index described by `config`.
    pub fn open(config: &IndexConfig) -> Result<Self> {
        let path = config.database_path()?;
        let db = Database::open_shared(&path, &config.database_options())?;
        Self::with_database(db, config)
    }

    /// Opens an index on a private store file, rebuilding it if unreadable.
    pub fn open_at(path: &Path) -> Result<Self> {
        let db = Database::open_or_rebuild(path, &DatabaseOptions::default())?;
        Self::with_database(Arc::new(db), &IndexConfig::default())
    }

    pub fn with_database(db: Arc<Database>, config: &IndexConfig) -> Result<Self> {
        Ok(Self {
            db,
            schema: java_schema()?,
            fingerprints: FingerprintCache::new(),
            flush_on_index: config.flush_on_index,
        })
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    pub fn read(&self) -> ReadTxn<'_> {
        self.db.read()
    }

    pub fn write(&self) -> WriteTxn<'_> {
        self.db.write()
    }

    pub fn generation(&self) -> u64 {
        self.db.generation()
    }

    pub(crate) fn schema(&self) -> &'static JavaSchema {
        self.schema
    }

    pub(crate) fn flush_on_index(&self) -> bool {
        self.flush_on_index
    }

    pub(crate) fn fingerprints(&self) -> &FingerprintCache {
        &self.fingerprints
    }

    /// Returns the type id for `descriptor`, creating it if absent.
    ///
    /// A freshly created id has no references and stays in the store until
    /// something references it and then lets go.
    pub fn create_type_id(&self, txn: &mut WriteTxn<'_>, descriptor: &str) -> Result<Address> {
        descriptor::validate(descriptor)?;
        let by_descriptor = self.schema.type_ids_by_descriptor();
        if let Some(existing) = by_descriptor.find_first(txn, descriptor)? {
            return Ok(existing);
        }

        let fields = &self.schema.type_id;
        let id = self.schema.registry.create(txn, tags::TYPE_ID)?;
        fields.descriptor.put_string(txn, id, descriptor)?;
        fields
            .simple_name
            .put_string(txn, id, descriptor::simple_name(descriptor))?;
        by_descriptor.insert(txn, id)?;
        self.schema.type_ids_by_simple_name().insert(txn, id)?;
        Ok(id)
    }

    pub fn find_type<'t>(&self, heap: &'t Heap, descriptor: &str) -> Result<Option<TypeIdRec<'t>>> {
        match self.schema.type_ids_by_descriptor().find_first(heap, descriptor)? {
            Some(id) => TypeIdRec::load(heap, id).map(Some),
            None => Ok(None),
        }
    }

    /// Type ids whose simple name starts with `prefix`, in name order.
    pub fn find_types_by_simple_name<'t>(
        &self,
        heap: &'t Heap,
        prefix: &str,
        limit: Option<usize>,
    ) -> Result<Vec<TypeIdRec<'t>>> {
        self.schema
            .type_ids_by_simple_name()
            .find_prefix(heap, prefix, limit)?
            .into_iter()
            .map(|id| TypeIdRec::load(heap, id))
            .collect()
    }

    pub fn all_type_ids<'t>(&self, heap: &'t Heap) -> Result<Vec<TypeIdRec<'t>>> {
        self.schema
            .type_ids_by_descriptor()
            .records(heap)?
            .into_iter()
            .map(|id| TypeIdRec::load(heap, id))
            .collect()
    }

    /// Every resource indexed under `path`, oldest record address first.
    pub fn find_resources_with_path<'t>(&self, heap: &'t Heap, path: &str) -> Result<Vec<ResourceRec<'t>>> {
        self.schema
            .resources_by_path()
            .find_all(heap, path)?
            .into_iter()
            .map(|resource| ResourceRec::load(heap, resource))
            .collect()
    }

    /// The most recently scanned fully indexed resource for `path`, or the
    /// most recent partial one if no scan of `path` completed.
    pub fn find_best_resource<'t>(&self, heap: &'t Heap, path: &str) -> Result<Option<ResourceRec<'t>>> {
        let fields = &self.schema.resource;
        let best = self.schema.resources_by_path().find_best(heap, path, |heap, resource| {
            let complete = fields.flags.get_u32(heap, resource)? & FULLY_INDEXED != 0;
            Ok((complete, fields.last_scanned.get_u64(heap, resource)?))
        })?;
        best.map(|resource| ResourceRec::load(heap, resource)).transpose()
    }

    pub fn all_resources<'t>(&self, heap: &'t Heap) -> Result<Vec<ResourceRec<'t>>> {
        self.schema
            .resources_by_path()
            .records(heap)?
            .into_iter()
            .map(|resource| ResourceRec::load(heap, resource))
            .collect()
    }

    /// Type declarations of every resource.
    pub fn all_types<'t>(&self, heap: &'t Heap) -> Result<Vec<TypeRec<'t>>> {
        let mut types = Vec::new();
        for resource in self.all_resources(heap)? {
            types.extend(resource.types()?);
        }
        Ok(types)
    }

    /// Declarations naming `descriptor` as their superclass or an interface.
    pub fn find_subtypes<'t>(&self, heap: &'t Heap, descriptor: &str) -> Result<Vec<TypeRec<'t>>> {
        match self.find_type(heap, descriptor)? {
            Some(id) => id.subtypes(),
            None => Ok(Vec::new()),
        }
    }

    /// Whether `resource` was fully indexed and its backing file still has
    /// the fingerprint recorded for it.
    pub fn is_up_to_date(&self, resource: &ResourceRec<'_>) -> Result<bool> {
        if !resource.is_fully_indexed()? {
            return Ok(false);
        }
        let path = resource.path()?;
        let file = backing_file(&path);
        let stored = resource.fingerprint()?;
        if let Some(up_to_date) = self.fingerprints.get(file, &stored) {
            return Ok(up_to_date);
        }

        let up_to_date = stored.compare(file)?.is_current();
        self.fingerprints.insert(file, stored, up_to_date);
        Ok(up_to_date)
    }

    /// Forgets cached staleness answers for `path` (a file or a resource path).
    pub fn dirty(&self, path: &Path) {
        let file = path.to_str().map_or(path, backing_file);
        self.fingerprints.dirty(file);
    }

    /// Deletes a resource and every type it declares.
    pub fn delete_resource(&self, txn: &mut WriteTxn<'_>, resource: Address) -> Result<()> {
        let path = ResourceRec::load(txn, resource)?.path()?;
        self.schema.registry.delete(txn, resource)?;
        self.fingerprints.dirty(backing_file(&path));
        Ok(())
    }

    /// Deletes a type id nothing refers to. Returns `false`, leaving the id
    /// in place, while it is still referenced.
    pub fn delete_type_id(&self, txn: &mut WriteTxn<'_>, id: Address) -> Result<bool> {
        if TypeIdRec::load(txn, id)?.ref_count()? > 0 {
            return Ok(false);
        }
        self.schema.registry.delete(txn, id)?;
        Ok(true)
    }

    /// A handle that re-finds the type id for `descriptor` whenever the store
    /// changes.
    pub fn type_id_handle(&self, descriptor: &str) -> StableHandle<Option<Address>, IndexError> {
        let descriptor = descriptor.to_string();
        let schema = self.schema;
        StableHandle::new(self.db.clone(), move |heap| {
            Ok(schema.type_ids_by_descriptor().find_first(heap, &descriptor)?)
        })
    }

    /// Discards every record and starts over with an empty store.
    pub fn rebuild(&self) -> Result<()> {
        tracing::warn!(
            target: "ndx.index",
            path = %self.db.path().display(),
            "rebuilding type index"
        );
        self.db.clear()?;
        self.fingerprints.clear();
        Ok(())
    }

    pub fn flush(&self) -> Result<()> {
        Ok(self.db.flush()?)
    }
}

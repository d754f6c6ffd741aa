use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use ndx_index::{
    AnnotationRec, AnnotationStub, CancellationToken, ClassStub, FieldRec, FieldStub, IndexError, IndexOutcome,
    JavaIndex, MethodRec, MethodStub, SignatureRec, TypeRec, TypeSignatureStub,
};
use ndx_storage::{Address, Heap, StableHandle};
use parking_lot::Mutex;

use crate::artifact::read_artifact;
use crate::descriptor::{BinaryTypeDescriptor, ReindexRequest};
use crate::error::BridgeError;
use crate::view::{BinaryTypeView, ClassDecoder};

type RebuildHook = dyn Fn(&JavaIndex) -> Result<(), IndexError> + Send + Sync;

/// Finds the current declaration of `descriptor` in the resource at
/// `index_path`, if that resource is fully indexed and up to date.
fn locate(
    index: &JavaIndex,
    heap: &Heap,
    index_path: &str,
    descriptor: &str,
) -> Result<Option<Address>, BridgeError> {
    let Some(resource) = index.find_best_resource(heap, index_path)? else {
        return Ok(None);
    };
    if !index.is_up_to_date(&resource)? {
        return Ok(None);
    }
    let Some(id) = index.find_type(heap, descriptor)? else {
        return Ok(None);
    };
    Ok(id.declaration_in(resource.address())?.map(|ty| ty.address()))
}

/// A type read through the index.
///
/// Holds no raw address: every access revalidates against the store and
/// fails with [`BridgeError::NotIndexed`] once the declaration is gone or
/// its resource went stale.
///
/// Accessors do not apply the factory's rebuild policy. Storage and
/// corruption errors are returned as is (check
/// [`BridgeError::needs_rebuild`]); callers that hit one should drop the
/// handle and go back through [`BinaryTypeFactory::read_type`], which
/// rebuilds or disables indexed reads.
pub struct IndexBinaryType {
    descriptor: String,
    handle: StableHandle<Option<Address>, BridgeError>,
}

impl fmt::Debug for IndexBinaryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexBinaryType")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

impl IndexBinaryType {
    /// `true` while the declaration is still present and current.
    pub fn is_valid(&self) -> Result<bool, BridgeError> {
        Ok(self.handle.get()?.is_some())
    }

    // Errors here bypass the rebuild policy; see the type docs.
    fn with_type<R>(&self, f: impl FnOnce(TypeRec<'_>) -> Result<R, IndexError>) -> Result<R, BridgeError> {
        self.handle.read(|txn, located| match located {
            Some(address) => Ok(f(TypeRec::load(txn, address)?)?),
            None => Err(BridgeError::NotIndexed),
        })
    }
}

impl BinaryTypeView for IndexBinaryType {
    fn descriptor(&self) -> Result<String, BridgeError> {
        self.with_type(|ty| ty.descriptor())
    }

    fn access_flags(&self) -> Result<u32, BridgeError> {
        self.with_type(|ty| ty.access_flags())
    }

    fn generic_signature(&self) -> Result<Option<String>, BridgeError> {
        self.with_type(|ty| ty.generic_signature())
    }

    fn source_file(&self) -> Result<Option<String>, BridgeError> {
        self.with_type(|ty| ty.source_file())
    }

    fn enclosing_type(&self) -> Result<Option<String>, BridgeError> {
        self.with_type(|ty| ty.enclosing_type()?.map(|id| id.descriptor()).transpose())
    }

    fn superclass(&self) -> Result<Option<TypeSignatureStub>, BridgeError> {
        self.with_type(|ty| ty.superclass()?.map(|s| s.to_stub()).transpose())
    }

    fn interfaces(&self) -> Result<Vec<TypeSignatureStub>, BridgeError> {
        self.with_type(|ty| ty.interfaces()?.iter().map(SignatureRec::to_stub).collect())
    }

    fn methods(&self) -> Result<Vec<MethodStub>, BridgeError> {
        self.with_type(|ty| ty.methods()?.iter().map(MethodRec::to_stub).collect())
    }

    fn fields(&self) -> Result<Vec<FieldStub>, BridgeError> {
        self.with_type(|ty| ty.fields()?.iter().map(FieldRec::to_stub).collect())
    }

    fn annotations(&self) -> Result<Vec<AnnotationStub>, BridgeError> {
        self.with_type(|ty| ty.annotations()?.iter().map(AnnotationRec::to_stub).collect())
    }

    fn to_stub(&self) -> Result<ClassStub, BridgeError> {
        self.with_type(|ty| ty.to_stub())
    }
}

/// Result of [`BinaryTypeFactory::read_type_or_decode`].
#[derive(Debug)]
pub enum BinaryType {
    Indexed(IndexBinaryType),
    Decoded(ClassStub),
}

impl BinaryType {
    pub fn is_indexed(&self) -> bool {
        matches!(self, BinaryType::Indexed(_))
    }

    fn view(&self) -> &dyn BinaryTypeView {
        match self {
            BinaryType::Indexed(ty) => ty,
            BinaryType::Decoded(stub) => stub,
        }
    }
}

impl BinaryTypeView for BinaryType {
    fn descriptor(&self) -> Result<String, BridgeError> {
        self.view().descriptor()
    }

    fn access_flags(&self) -> Result<u32, BridgeError> {
        self.view().access_flags()
    }

    fn generic_signature(&self) -> Result<Option<String>, BridgeError> {
        self.view().generic_signature()
    }

    fn source_file(&self) -> Result<Option<String>, BridgeError> {
        self.view().source_file()
    }

    fn enclosing_type(&self) -> Result<Option<String>, BridgeError> {
        self.view().enclosing_type()
    }

    fn superclass(&self) -> Result<Option<TypeSignatureStub>, BridgeError> {
        self.view().superclass()
    }

    fn interfaces(&self) -> Result<Vec<TypeSignatureStub>, BridgeError> {
        self.view().interfaces()
    }

    fn methods(&self) -> Result<Vec<MethodStub>, BridgeError> {
        self.view().methods()
    }

    fn fields(&self) -> Result<Vec<FieldStub>, BridgeError> {
        self.view().fields()
    }

    fn annotations(&self) -> Result<Vec<AnnotationStub>, BridgeError> {
        self.view().annotations()
    }

    fn to_stub(&self) -> Result<ClassStub, BridgeError> {
        self.view().to_stub()
    }
}

/// Decides per lookup whether a binary type is read from the index or
/// decoded from its artifact.
///
/// Structural corruption triggers one rebuild and a retry. If the retry
/// fails the same way, indexed reads stay off for the life of the factory
/// and every lookup decodes directly.
pub struct BinaryTypeFactory {
    index: Arc<JavaIndex>,
    rebuild: Box<RebuildHook>,
    indexed_reads: AtomicBool,
    reindex_tx: Sender<ReindexRequest>,
    reindex_rx: Receiver<ReindexRequest>,
    /// Requests sent and not yet taken off the queue.
    pending: Mutex<HashSet<ReindexRequest>>,
}

impl fmt::Debug for BinaryTypeFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BinaryTypeFactory")
            .field("index", &self.index)
            .field("indexed_reads", &self.indexed_reads_enabled())
            .field("pending_reindex", &self.reindex_rx.len())
            .finish_non_exhaustive()
    }
}

impl BinaryTypeFactory {
    pub fn new(index: Arc<JavaIndex>) -> Self {
        let (reindex_tx, reindex_rx) = crossbeam_channel::unbounded();
        Self {
            index,
            rebuild: Box::new(JavaIndex::rebuild),
            indexed_reads: AtomicBool::new(true),
            reindex_tx,
            reindex_rx,
            pending: Mutex::new(HashSet::new()),
        }
    }

    /// Replaces the action taken when corruption is detected. Defaults to
    /// [`JavaIndex::rebuild`].
    pub fn with_rebuild(
        mut self,
        rebuild: impl Fn(&JavaIndex) -> Result<(), IndexError> + Send + Sync + 'static,
    ) -> Self {
        self.rebuild = Box::new(rebuild);
        self
    }

    pub fn index(&self) -> &Arc<JavaIndex> {
        &self.index
    }

    pub fn indexed_reads_enabled(&self) -> bool {
        self.indexed_reads.load(Ordering::Acquire)
    }

    /// Reads `descriptor` from the index.
    ///
    /// Fails with [`BridgeError::NotIndexed`] when the resource is absent,
    /// stale or only partially indexed, or when indexed reads are disabled.
    pub fn read_type(&self, descriptor: &BinaryTypeDescriptor) -> Result<IndexBinaryType, BridgeError> {
        if !self.indexed_reads_enabled() {
            return Err(BridgeError::NotIndexed);
        }
        match self.try_read_type(descriptor) {
            Err(err) if err.needs_rebuild() => {
                tracing::warn!(
                    target: "ndx.classpath",
                    descriptor = %descriptor.field_descriptor,
                    error = %err,
                    "type index is corrupt; rebuilding"
                );
                (self.rebuild)(&self.index)?;
                match self.try_read_type(descriptor) {
                    Err(err) if err.needs_rebuild() => {
                        tracing::warn!(
                            target: "ndx.classpath",
                            descriptor = %descriptor.field_descriptor,
                            error = %err,
                            "type index still corrupt after rebuild; disabling indexed reads"
                        );
                        self.indexed_reads.store(false, Ordering::Release);
                        Err(BridgeError::NotIndexed)
                    }
                    other => other,
                }
            }
            other => other,
        }
    }

    fn try_read_type(&self, descriptor: &BinaryTypeDescriptor) -> Result<IndexBinaryType, BridgeError> {
        let txn = self.index.read();
        let generation = self.index.generation();
        let located = locate(&self.index, &txn, &descriptor.index_path, &descriptor.field_descriptor)?;
        if located.is_none() {
            return Err(BridgeError::NotIndexed);
        }

        let index = Arc::clone(&self.index);
        let index_path = descriptor.index_path.clone();
        let field_descriptor = descriptor.field_descriptor.clone();
        let handle = StableHandle::with_initial(
            Arc::clone(self.index.database()),
            generation,
            located,
            move |heap| locate(&index, heap, &index_path, &field_descriptor),
        );
        Ok(IndexBinaryType {
            descriptor: descriptor.field_descriptor.clone(),
            handle,
        })
    }

    /// Reads from the index if possible, otherwise decodes the artifact
    /// bytes with `decoder` and queues the artifact for reindexing.
    pub fn read_type_or_decode(
        &self,
        descriptor: &BinaryTypeDescriptor,
        decoder: &dyn ClassDecoder,
    ) -> Result<BinaryType, BridgeError> {
        match self.read_type(descriptor) {
            Ok(ty) => return Ok(BinaryType::Indexed(ty)),
            Err(BridgeError::NotIndexed) => {}
            Err(err) => return Err(err),
        }

        let bytes = read_artifact(&descriptor.index_path)?;
        let stub = decoder.decode(&bytes).map_err(|source| BridgeError::Decode {
            index_path: descriptor.index_path.clone(),
            source,
        })?;
        self.request_reindex(descriptor);
        Ok(BinaryType::Decoded(stub))
    }

    /// Queues the artifact behind `descriptor` unless it is already queued.
    fn request_reindex(&self, descriptor: &BinaryTypeDescriptor) {
        let request = ReindexRequest::from(descriptor);
        if !self.pending.lock().insert(request.clone()) {
            return;
        }
        tracing::trace!(
            target: "ndx.classpath",
            location = %descriptor.location.display(),
            index_path = %descriptor.index_path,
            "queued for reindexing"
        );
        // The factory owns a receiver, so the channel cannot be disconnected.
        let _ = self.reindex_tx.send(request);
    }

    /// A receiver for reindex requests, for a background indexer.
    ///
    /// An artifact is queued at most once until its request is handled.
    /// Consumers of this receiver call [`finish_reindex`](Self::finish_reindex)
    /// for each request they take, or later misses for that artifact are not
    /// queued again.
    pub fn reindex_requests(&self) -> Receiver<ReindexRequest> {
        self.reindex_rx.clone()
    }

    /// Marks `request` as handled so the artifact can be queued again.
    pub fn finish_reindex(&self, request: &ReindexRequest) {
        self.pending.lock().remove(request);
    }

    /// Drains the requests queued so far.
    pub fn take_reindex_requests(&self) -> Vec<ReindexRequest> {
        let requests: Vec<_> = self.reindex_rx.try_iter().collect();
        let mut pending = self.pending.lock();
        for request in &requests {
            pending.remove(request);
        }
        requests
    }

    /// Decodes and indexes queued artifacts until the queue is empty or
    /// `cancel` fires. Returns how many were indexed completely. A request
    /// interrupted by cancellation goes back on the queue.
    pub fn process_reindex_queue(
        &self,
        decoder: &dyn ClassDecoder,
        cancel: &CancellationToken,
    ) -> Result<usize, BridgeError> {
        let mut indexed = 0;
        while !cancel.is_cancelled() {
            let Ok(request) = self.reindex_rx.try_recv() else {
                break;
            };
            match self.reindex(&request, decoder, cancel) {
                Ok(IndexOutcome::Cancelled { .. }) => {
                    // Still pending; put it back for the next run.
                    let _ = self.reindex_tx.send(request);
                    break;
                }
                Ok(IndexOutcome::Indexed { .. }) => {
                    self.finish_reindex(&request);
                    indexed += 1;
                }
                Err(err) => {
                    self.finish_reindex(&request);
                    return Err(err);
                }
            }
        }
        Ok(indexed)
    }

    fn reindex(
        &self,
        request: &ReindexRequest,
        decoder: &dyn ClassDecoder,
        cancel: &CancellationToken,
    ) -> Result<IndexOutcome, BridgeError> {
        let bytes = read_artifact(&request.index_path)?;
        let stub = decoder.decode(&bytes).map_err(|source| BridgeError::Decode {
            index_path: request.index_path.clone(),
            source,
        })?;
        Ok(self.index.index_file(&request.index_path, &[stub], cancel)?)
    }
}

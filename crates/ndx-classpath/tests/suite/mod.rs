// Consolidated integration test suite, compiled by `tests/harness.rs`.
mod corruption;
mod fallback;
mod indexed;

use std::path::Path;
use std::sync::Arc;

use ndx_classpath::{BinaryTypeDescriptor, BinaryTypeFactory, BoxError};
use ndx_index::{ClassStub, JavaIndex};

/// Class bytes in these tests are JSON-encoded stubs.
pub(crate) fn decode_json(bytes: &[u8]) -> Result<ClassStub, BoxError> {
    Ok(serde_json::from_slice(bytes)?)
}

pub(crate) fn class_bytes(class: &ClassStub) -> Vec<u8> {
    serde_json::to_vec(class).unwrap()
}

pub(crate) fn open_factory() -> (tempfile::TempDir, BinaryTypeFactory) {
    let dir = tempfile::tempdir().unwrap();
    let index = JavaIndex::open_at(&dir.path().join("types.ndx")).unwrap();
    (dir, BinaryTypeFactory::new(Arc::new(index)))
}

pub(crate) fn loose_descriptor(class_dir: &Path, file: &Path, field_descriptor: &str) -> BinaryTypeDescriptor {
    BinaryTypeDescriptor {
        location: class_dir.to_path_buf(),
        field_descriptor: field_descriptor.to_string(),
        workspace_path: file.strip_prefix(class_dir).unwrap().display().to_string(),
        index_path: file.to_str().unwrap().to_string(),
    }
}

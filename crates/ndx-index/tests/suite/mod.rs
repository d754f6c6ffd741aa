// Consolidated integration test suite, compiled by `tests/harness.rs`.
mod concurrency;
mod config;
mod constants;
mod end_to_end;
mod facade;
mod staleness;

use ndx_index::JavaIndex;

pub(crate) fn open_index() -> (tempfile::TempDir, JavaIndex) {
    let dir = tempfile::tempdir().unwrap();
    let index = JavaIndex::open_at(&dir.path().join("types.ndx")).unwrap();
    (dir, index)
}

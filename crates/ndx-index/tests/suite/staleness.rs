use std::fs::File;
use std::path::Path;
use std::time::{Duration, SystemTime};

use ndx_index::{CancellationToken, ClassStub, JavaIndex};

use super::open_index;

fn set_mtime(path: &Path, secs: u64) {
    File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
        .unwrap();
}

fn up_to_date(index: &JavaIndex, path: &str) -> bool {
    let txn = index.read();
    let resource = index.find_best_resource(&txn, path).unwrap().unwrap();
    index.is_up_to_date(&resource).unwrap()
}

#[test]
fn resource_goes_stale_exactly_when_its_file_changes() {
    let (dir, index) = open_index();
    let class_file = dir.path().join("X.class");
    std::fs::write(&class_file, b"cafebabe-1").unwrap();
    set_mtime(&class_file, 1_000);
    let path = class_file.to_str().unwrap();

    index
        .index_file(path, &[ClassStub::new("Lp/X;")], &CancellationToken::new())
        .unwrap();
    assert!(up_to_date(&index, path));

    // Touching without a content change keeps the resource current.
    set_mtime(&class_file, 2_000);
    index.dirty(&class_file);
    assert!(up_to_date(&index, path));

    std::fs::write(&class_file, b"cafebabe-22").unwrap();
    index.dirty(&class_file);
    assert!(!up_to_date(&index, path));

    std::fs::remove_file(&class_file).unwrap();
    index.dirty(&class_file);
    assert!(!up_to_date(&index, path));
}

#[test]
fn cached_answer_is_kept_until_dirty() {
    let (dir, index) = open_index();
    let class_file = dir.path().join("Y.class");
    std::fs::write(&class_file, b"one").unwrap();
    let path = class_file.to_str().unwrap();

    index
        .index_file(path, &[ClassStub::new("Lp/Y;")], &CancellationToken::new())
        .unwrap();
    assert!(up_to_date(&index, path));

    std::fs::write(&class_file, b"three").unwrap();
    assert!(up_to_date(&index, path), "answer is cached until dirtied");

    index.dirty(&class_file);
    assert!(!up_to_date(&index, path));

    // Reindexing records the new fingerprint.
    index
        .index_file(path, &[ClassStub::new("Lp/Y;")], &CancellationToken::new())
        .unwrap();
    assert!(up_to_date(&index, path));
}

#[test]
fn archive_entries_follow_their_archive() {
    let (dir, index) = open_index();
    let jar = dir.path().join("lib.jar");
    std::fs::write(&jar, b"PK-archive").unwrap();
    let entry = format!("{}|p/Z.class", jar.display());

    index
        .index_file(&entry, &[ClassStub::new("Lp/Z;")], &CancellationToken::new())
        .unwrap();
    assert!(up_to_date(&index, &entry));

    std::fs::write(&jar, b"PK-archive-rebuilt").unwrap();
    index.dirty(Path::new(&entry));
    assert!(!up_to_date(&index, &entry));
}

#[test]
fn partially_indexed_resource_is_never_up_to_date() {
    let (dir, index) = open_index();
    let class_file = dir.path().join("P.class");
    std::fs::write(&class_file, b"partial").unwrap();
    let path = class_file.to_str().unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let outcome = index
        .index_file(path, &[ClassStub::new("Lp/P;")], &cancel)
        .unwrap();
    assert!(outcome.is_cancelled());
    assert!(!up_to_date(&index, path));

    let txn = index.read();
    assert!(index.find_type(&txn, "Lp/P;").unwrap().is_none());
}

use std::path::Path;

use ndx_classpath::{BinaryTypeDescriptor, BinaryTypeFactory, BinaryTypeView};
use ndx_index::{CancellationToken, ClassStub};
use ndx_storage::NODE_TAG;

use super::{class_bytes, decode_json, loose_descriptor, open_factory};

fn index_bad(dir: &Path, factory: &BinaryTypeFactory) -> BinaryTypeDescriptor {
    let class = ClassStub::new("Lp/Bad;");
    let file = dir.join("Bad.class");
    std::fs::write(&file, class_bytes(&class)).unwrap();
    let descriptor = loose_descriptor(dir, &file, "Lp/Bad;");
    factory
        .index()
        .index_file(&descriptor.index_path, &[class], &CancellationToken::new())
        .unwrap();
    descriptor
}

/// Overwrites the tag of the `Lp/Bad;` declaration with one no schema knows.
fn corrupt_bad(factory: &BinaryTypeFactory) {
    let index = factory.index();
    let mut txn = index.write();
    let declaration = index
        .find_type(&txn, "Lp/Bad;")
        .unwrap()
        .unwrap()
        .best_declaration()
        .unwrap()
        .unwrap()
        .address();
    NODE_TAG.put_u16(&mut txn, declaration, 999).unwrap();
}

fn corrupt_declaration(dir: &Path, factory: &BinaryTypeFactory) -> BinaryTypeDescriptor {
    let descriptor = index_bad(dir, factory);
    corrupt_bad(factory);
    descriptor
}

#[test]
fn corruption_rebuilds_the_index_once() {
    let (dir, factory) = open_factory();
    let descriptor = corrupt_declaration(dir.path(), &factory);

    assert!(factory.read_type(&descriptor).unwrap_err().is_not_indexed());
    assert!(factory.indexed_reads_enabled());

    let index = factory.index();
    let txn = index.read();
    assert!(index.all_resources(&txn).unwrap().is_empty());
}

#[test]
fn persistent_corruption_disables_indexed_reads() {
    let (dir, factory) = open_factory();
    let factory = factory.with_rebuild(|_| Ok(()));
    let descriptor = corrupt_declaration(dir.path(), &factory);

    assert!(factory.read_type(&descriptor).unwrap_err().is_not_indexed());
    assert!(!factory.indexed_reads_enabled());

    let ty = factory.read_type_or_decode(&descriptor, &decode_json).unwrap();
    assert!(!ty.is_indexed());
    assert_eq!(ty.descriptor().unwrap(), "Lp/Bad;");
}

#[test]
fn held_type_reports_corruption_and_the_factory_recovers() {
    let (dir, factory) = open_factory();
    let descriptor = index_bad(dir.path(), &factory);
    let ty = factory.read_type(&descriptor).unwrap();
    assert_eq!(ty.descriptor().unwrap(), "Lp/Bad;");

    corrupt_bad(&factory);
    let err = ty.descriptor().unwrap_err();
    assert!(err.needs_rebuild(), "{err}");
    assert!(factory.indexed_reads_enabled(), "accessors leave the policy to the factory");

    assert!(factory.read_type(&descriptor).unwrap_err().is_not_indexed());
    assert!(factory.indexed_reads_enabled());
    let ty = factory.read_type_or_decode(&descriptor, &decode_json).unwrap();
    assert_eq!(ty.descriptor().unwrap(), "Lp/Bad;");
}

use std::io::Write;

use ndx_classpath::{BinaryType, BinaryTypeView, ReindexRequest};
use ndx_index::{CancellationToken, ClassStub, MethodStub};
use pretty_assertions::assert_eq;

use super::{class_bytes, decode_json, loose_descriptor, open_factory};

fn gadget(method: &str) -> ClassStub {
    ClassStub {
        methods: vec![MethodStub::new(method, "()V")],
        ..ClassStub::new("Lp/Gadget;")
    }
}

#[test]
fn unindexed_artifact_is_decoded_then_indexed_from_the_queue() {
    let (dir, factory) = open_factory();
    let file = dir.path().join("Gadget.class");
    std::fs::write(&file, class_bytes(&gadget("spin"))).unwrap();
    let descriptor = loose_descriptor(dir.path(), &file, "Lp/Gadget;");

    assert!(factory.read_type(&descriptor).unwrap_err().is_not_indexed());

    let ty = factory.read_type_or_decode(&descriptor, &decode_json).unwrap();
    assert!(matches!(&ty, BinaryType::Decoded(stub) if *stub == gadget("spin")));
    assert_eq!(ty.methods().unwrap(), vec![MethodStub::new("spin", "()V")]);

    assert_eq!(
        factory.take_reindex_requests(),
        vec![ReindexRequest {
            location: dir.path().to_path_buf(),
            index_path: descriptor.index_path.clone(),
        }]
    );

    factory.read_type_or_decode(&descriptor, &decode_json).unwrap();
    let indexed = factory
        .process_reindex_queue(&decode_json, &CancellationToken::new())
        .unwrap();
    assert_eq!(indexed, 1);

    let ty = factory.read_type_or_decode(&descriptor, &decode_json).unwrap();
    assert!(ty.is_indexed());
    assert_eq!(ty.to_stub().unwrap(), gadget("spin"));
    assert!(factory.take_reindex_requests().is_empty());
}

#[test]
fn changed_artifact_falls_back_to_decoding() {
    let (dir, factory) = open_factory();
    let file = dir.path().join("Gadget.class");
    std::fs::write(&file, class_bytes(&gadget("spin"))).unwrap();
    let descriptor = loose_descriptor(dir.path(), &file, "Lp/Gadget;");
    factory
        .index()
        .index_file(&descriptor.index_path, &[gadget("spin")], &CancellationToken::new())
        .unwrap();
    assert!(factory.read_type(&descriptor).is_ok());

    std::fs::write(&file, class_bytes(&gadget("whirl"))).unwrap();
    factory.index().dirty(&file);

    let ty = factory.read_type_or_decode(&descriptor, &decode_json).unwrap();
    assert!(!ty.is_indexed());
    assert_eq!(ty.methods().unwrap(), vec![MethodStub::new("whirl", "()V")]);
    assert_eq!(factory.take_reindex_requests().len(), 1);
}

#[test]
fn archive_entries_are_decoded_from_the_zip() {
    let (dir, factory) = open_factory();
    let jar = dir.path().join("lib.jar");
    let mut zip = zip::ZipWriter::new(std::fs::File::create(&jar).unwrap());
    zip.start_file("p/Gadget.class", zip::write::FileOptions::default())
        .unwrap();
    zip.write_all(&class_bytes(&gadget("pack"))).unwrap();
    zip.finish().unwrap();

    let descriptor = ndx_classpath::BinaryTypeDescriptor {
        location: jar.clone(),
        field_descriptor: "Lp/Gadget;".to_string(),
        workspace_path: "lib.jar".to_string(),
        index_path: format!("{}|p/Gadget.class", jar.display()),
    };

    let ty = factory.read_type_or_decode(&descriptor, &decode_json).unwrap();
    assert_eq!(ty.to_stub().unwrap(), gadget("pack"));

    assert_eq!(
        factory
            .process_reindex_queue(&decode_json, &CancellationToken::new())
            .unwrap(),
        1
    );
    let ty = factory.read_type(&descriptor).unwrap();
    assert_eq!(ty.methods().unwrap(), vec![MethodStub::new("pack", "()V")]);
}

#[test]
fn decode_failures_name_the_artifact() {
    let (dir, factory) = open_factory();
    let file = dir.path().join("Broken.class");
    std::fs::write(&file, b"not json").unwrap();
    let descriptor = loose_descriptor(dir.path(), &file, "Lp/Broken;");

    let err = factory.read_type_or_decode(&descriptor, &decode_json).unwrap_err();
    assert!(err.to_string().contains("Broken.class"), "{err}");
    assert!(factory.take_reindex_requests().is_empty());
}

#[test]
fn cancelled_queue_processing_indexes_nothing() {
    let (dir, factory) = open_factory();
    let file = dir.path().join("Gadget.class");
    std::fs::write(&file, class_bytes(&gadget("spin"))).unwrap();
    let descriptor = loose_descriptor(dir.path(), &file, "Lp/Gadget;");
    factory.read_type_or_decode(&descriptor, &decode_json).unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    assert_eq!(factory.process_reindex_queue(&decode_json, &cancel).unwrap(), 0);
    assert!(factory.read_type(&descriptor).unwrap_err().is_not_indexed());
    assert_eq!(factory.reindex_requests().len(), 1, "request stays queued");
}

#[test]
fn repeated_misses_queue_one_request() {
    let (dir, factory) = open_factory();
    let file = dir.path().join("Gadget.class");
    std::fs::write(&file, class_bytes(&gadget("spin"))).unwrap();
    let descriptor = loose_descriptor(dir.path(), &file, "Lp/Gadget;");

    for _ in 0..3 {
        assert!(!factory.read_type_or_decode(&descriptor, &decode_json).unwrap().is_indexed());
    }
    let queue = factory.reindex_requests();
    assert_eq!(queue.len(), 1);

    let request = queue.try_recv().unwrap();
    factory.read_type_or_decode(&descriptor, &decode_json).unwrap();
    assert!(queue.is_empty(), "still pending until finished");

    factory.finish_reindex(&request);
    factory.read_type_or_decode(&descriptor, &decode_json).unwrap();
    assert_eq!(queue.len(), 1);
}

#[test]
fn cancelled_request_is_not_duplicated_by_later_misses() {
    let (dir, factory) = open_factory();
    let file = dir.path().join("Gadget.class");
    std::fs::write(&file, class_bytes(&gadget("spin"))).unwrap();
    let descriptor = loose_descriptor(dir.path(), &file, "Lp/Gadget;");
    factory.read_type_or_decode(&descriptor, &decode_json).unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    assert_eq!(factory.process_reindex_queue(&decode_json, &cancel).unwrap(), 0);
    factory.read_type_or_decode(&descriptor, &decode_json).unwrap();
    assert_eq!(factory.reindex_requests().len(), 1);

    assert_eq!(
        factory
            .process_reindex_queue(&decode_json, &CancellationToken::new())
            .unwrap(),
        1
    );
    assert!(factory.read_type(&descriptor).unwrap().is_valid().unwrap());
    assert!(factory.take_reindex_requests().is_empty());
}

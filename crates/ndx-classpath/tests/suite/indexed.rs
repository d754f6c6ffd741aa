use ndx_classpath::{BinaryTypeView, BridgeError};
use ndx_index::{CancellationToken, ClassStub, FieldStub, MethodStub, TypeSignatureStub};
use pretty_assertions::assert_eq;

use super::{class_bytes, loose_descriptor, open_factory};

fn widget() -> ClassStub {
    ClassStub {
        superclass: Some(TypeSignatureStub::raw("Ljava/lang/Object;")),
        interfaces: vec![TypeSignatureStub::raw("Ljava/lang/Runnable;")],
        methods: vec![MethodStub::new("run", "()V")],
        fields: vec![FieldStub::new("count", "I")],
        source_file: Some("Widget.java".to_string()),
        access_flags: 0x0021,
        ..ClassStub::new("Lp/Widget;")
    }
}

#[test]
fn fully_indexed_current_artifact_is_read_from_the_index() {
    let (dir, factory) = open_factory();
    let file = dir.path().join("p/Widget.class");
    std::fs::create_dir_all(file.parent().unwrap()).unwrap();
    std::fs::write(&file, class_bytes(&widget())).unwrap();
    let descriptor = loose_descriptor(dir.path(), &file, "Lp/Widget;");

    factory
        .index()
        .index_file(&descriptor.index_path, &[widget()], &CancellationToken::new())
        .unwrap();

    let ty = factory.read_type(&descriptor).unwrap();
    assert!(ty.is_valid().unwrap());
    assert_eq!(ty.descriptor().unwrap(), "Lp/Widget;");
    assert_eq!(ty.access_flags().unwrap(), 0x0021);
    assert_eq!(ty.source_file().unwrap().as_deref(), Some("Widget.java"));
    assert_eq!(ty.generic_signature().unwrap(), None);
    assert_eq!(ty.enclosing_type().unwrap(), None);
    assert_eq!(
        ty.superclass().unwrap(),
        Some(TypeSignatureStub::raw("Ljava/lang/Object;"))
    );
    assert_eq!(ty.interfaces().unwrap(), vec![TypeSignatureStub::raw("Ljava/lang/Runnable;")]);
    assert_eq!(ty.methods().unwrap(), vec![MethodStub::new("run", "()V")]);
    assert_eq!(ty.fields().unwrap(), vec![FieldStub::new("count", "I")]);
    assert!(ty.annotations().unwrap().is_empty());
    assert_eq!(ty.to_stub().unwrap(), widget());
    assert!(factory.take_reindex_requests().is_empty());
}

#[test]
fn handle_reports_not_indexed_once_the_resource_is_removed() {
    let (dir, factory) = open_factory();
    let file = dir.path().join("Widget.class");
    std::fs::write(&file, class_bytes(&widget())).unwrap();
    let descriptor = loose_descriptor(dir.path(), &file, "Lp/Widget;");
    factory
        .index()
        .index_file(&descriptor.index_path, &[widget()], &CancellationToken::new())
        .unwrap();

    let ty = factory.read_type(&descriptor).unwrap();
    assert_eq!(ty.methods().unwrap().len(), 1);

    {
        let index = factory.index();
        let mut txn = index.write();
        assert_eq!(index.remove_resource(&mut txn, &descriptor.index_path).unwrap(), 1);
    }

    assert!(!ty.is_valid().unwrap());
    assert!(matches!(ty.methods(), Err(BridgeError::NotIndexed)));
    assert!(factory.read_type(&descriptor).unwrap_err().is_not_indexed());
}

#[test]
fn type_missing_from_an_indexed_resource_is_not_indexed() {
    let (dir, factory) = open_factory();
    let file = dir.path().join("Widget.class");
    std::fs::write(&file, class_bytes(&widget())).unwrap();
    let path = file.to_str().unwrap();
    factory
        .index()
        .index_file(path, &[widget()], &CancellationToken::new())
        .unwrap();

    let descriptor = loose_descriptor(dir.path(), &file, "Lp/Gadget;");
    assert!(factory.read_type(&descriptor).unwrap_err().is_not_indexed());
}

#[test]
fn interrupted_rescan_keeps_the_complete_one_readable() {
    let (dir, factory) = open_factory();
    let file = dir.path().join("Widget.class");
    std::fs::write(&file, class_bytes(&widget())).unwrap();
    let descriptor = loose_descriptor(dir.path(), &file, "Lp/Widget;");
    let index = factory.index();
    index
        .index_file(&descriptor.index_path, &[widget()], &CancellationToken::new())
        .unwrap();

    let stopped = CancellationToken::new();
    stopped.cancel();
    let outcome = index.index_file(&descriptor.index_path, &[widget()], &stopped).unwrap();
    assert!(outcome.is_cancelled());

    let ty = factory.read_type(&descriptor).unwrap();
    assert_eq!(ty.to_stub().unwrap(), widget());
    let txn = index.read();
    let best = index.find_best_resource(&txn, &descriptor.index_path).unwrap().unwrap();
    assert!(best.is_fully_indexed().unwrap());
}

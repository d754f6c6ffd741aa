use ndx_index::{
    AnnotationStub, AnnotationValueStub, CancellationToken, ClassStub, ConstantValue, FieldStub, Fingerprint,
    IndexError, JavaIndex, JavaNode, MethodStub, TypeSignatureStub,
};
use pretty_assertions::assert_eq;

use super::open_index;

fn class_with_method(descriptor: &str, name: &str, method_descriptor: &str) -> ClassStub {
    ClassStub {
        methods: vec![MethodStub::new(name, method_descriptor)],
        ..ClassStub::new(descriptor)
    }
}

#[test]
fn index_find_and_remove_one_type() {
    let (_dir, index) = open_index();
    let cancel = CancellationToken::new();
    {
        let mut txn = index.write();
        let outcome = index
            .index_resource(
                &mut txn,
                "/out/p/X.class",
                Fingerprint::of_bytes(b"X", 1),
                &[class_with_method("Lp/X;", "m", "()V")],
                &cancel,
            )
            .unwrap();
        assert!(!outcome.is_cancelled());
    }

    {
        let txn = index.read();
        let id = index.find_type(&txn, "Lp/X;").unwrap().unwrap();
        let ty = id.best_declaration().unwrap().unwrap();
        let methods = ty.methods().unwrap();
        assert_eq!(methods.len(), 1);
        assert_eq!(methods[0].name().unwrap(), "m");
        assert_eq!(methods[0].descriptor().unwrap(), "()V");
        assert_eq!(ty.resource().unwrap().path().unwrap(), "/out/p/X.class");
        assert!(matches!(
            JavaNode::load(&txn, ty.address()).unwrap(),
            JavaNode::Type(found) if found == ty
        ));
    }

    {
        let mut txn = index.write();
        assert_eq!(index.remove_resource(&mut txn, "/out/p/X.class").unwrap(), 1);
    }
    let txn = index.read();
    assert!(index.find_type(&txn, "Lp/X;").unwrap().is_none());
    assert!(index.all_resources(&txn).unwrap().is_empty());
    assert!(index.find_types_by_simple_name(&txn, "X", None).unwrap().is_empty());
}

#[test]
fn delete_resource_by_address() {
    let (_dir, index) = open_index();
    let mut txn = index.write();
    let outcome = index
        .index_resource(
            &mut txn,
            "/out/p/D.class",
            Fingerprint::of_bytes(b"D", 1),
            &[ClassStub::new("Lp/D;")],
            &CancellationToken::new(),
        )
        .unwrap();
    index.delete_resource(&mut txn, outcome.resource()).unwrap();
    assert!(index.find_type(&txn, "Lp/D;").unwrap().is_none());
    assert!(index.find_resources_with_path(&txn, "/out/p/D.class").unwrap().is_empty());
}

#[test]
fn newer_fingerprint_supersedes_older_resource() {
    let (_dir, index) = open_index();
    let cancel = CancellationToken::new();
    let path = "/lib/a.jar|p/S.class";
    let mut txn = index.write();

    index
        .index_resource(
            &mut txn,
            path,
            Fingerprint::of_bytes(b"v1", 1),
            &[class_with_method("Lp/S;", "old", "()V")],
            &cancel,
        )
        .unwrap();
    let second = index
        .index_resource(
            &mut txn,
            path,
            Fingerprint::of_bytes(b"v2", 2),
            &[class_with_method("Lp/S;", "new", "(I)V")],
            &cancel,
        )
        .unwrap();

    let resources = index.find_resources_with_path(&txn, path).unwrap();
    assert_eq!(resources.len(), 1);
    assert_eq!(resources[0].address(), second.resource());
    assert_eq!(resources[0].fingerprint().unwrap(), Fingerprint::of_bytes(b"v2", 2));

    let id = index.find_type(&txn, "Lp/S;").unwrap().unwrap();
    assert_eq!(id.ref_count().unwrap(), 1);
    let declarations = id.declarations().unwrap();
    assert_eq!(declarations.len(), 1);
    let stub = declarations[0].to_stub().unwrap();
    assert_eq!(stub.methods, vec![MethodStub::new("new", "(I)V")]);
}

#[test]
fn cancelled_scan_leaves_previous_resource_readable() {
    let (_dir, index) = open_index();
    let path = "/out/p/C.class";
    let mut txn = index.write();

    index
        .index_resource(
            &mut txn,
            path,
            Fingerprint::of_bytes(b"v1", 1),
            &[ClassStub::new("Lp/C;")],
            &CancellationToken::new(),
        )
        .unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let cancelled = index
        .index_resource(
            &mut txn,
            path,
            Fingerprint::of_bytes(b"v2", 2),
            &[ClassStub::new("Lp/C;"), ClassStub::new("Lp/C$Inner;")],
            &cancel,
        )
        .unwrap();
    assert!(cancelled.is_cancelled());

    // The old declaration survives; the partial resource declares nothing.
    let id = index.find_type(&txn, "Lp/C;").unwrap().unwrap();
    let best = id.best_declaration().unwrap().unwrap();
    assert!(best.resource().unwrap().is_fully_indexed().unwrap());
    assert!(index.find_type(&txn, "Lp/C$Inner;").unwrap().is_none());

    // A later complete scan removes both earlier resources.
    let done = index
        .index_resource(
            &mut txn,
            path,
            Fingerprint::of_bytes(b"v3", 3),
            &[ClassStub::new("Lp/C;")],
            &CancellationToken::new(),
        )
        .unwrap();
    let resources = index.find_resources_with_path(&txn, path).unwrap();
    assert_eq!(resources.len(), 1);
    assert_eq!(resources[0].address(), done.resource());
}

#[test]
fn subtypes_are_tracked_through_supertype_signatures() {
    let (_dir, index) = open_index();
    let mut txn = index.write();
    let list = ClassStub {
        superclass: Some(TypeSignatureStub::raw("Ljava/util/AbstractList;")),
        interfaces: vec![TypeSignatureStub::raw("Ljava/util/List;")],
        ..ClassStub::new("Lp/MyList;")
    };
    let other = ClassStub {
        interfaces: vec![TypeSignatureStub::raw("Ljava/util/List;")],
        ..ClassStub::new("Lp/OtherList;")
    };
    index
        .index_resource(
            &mut txn,
            "/lib/lists.jar|p/MyList.class",
            Fingerprint::of_bytes(b"l", 1),
            &[list, other],
            &CancellationToken::new(),
        )
        .unwrap();

    let mut names: Vec<String> = index
        .find_subtypes(&txn, "Ljava/util/List;")
        .unwrap()
        .iter()
        .map(|ty| ty.descriptor().unwrap())
        .collect();
    names.sort();
    assert_eq!(names, vec!["Lp/MyList;".to_string(), "Lp/OtherList;".to_string()]);

    let abstract_list = index.find_subtypes(&txn, "Ljava/util/AbstractList;").unwrap();
    assert_eq!(abstract_list.len(), 1);
    assert!(index.find_subtypes(&txn, "Ljava/lang/Object;").unwrap().is_empty());
    assert_eq!(index.all_types(&txn).unwrap().len(), 2);
}

fn assert_nothing_written(index: &JavaIndex, path: &str) {
    let mut txn = index.write();
    assert!(index.all_resources(&txn).unwrap().is_empty());
    assert!(index.all_type_ids(&txn).unwrap().is_empty());
    assert!(index.find_type(&txn, "Lp/X;").unwrap().is_none());
    assert_eq!(index.remove_resource(&mut txn, path).unwrap(), 0);
}

#[test]
fn bad_superclass_descriptor_writes_nothing() {
    let (_dir, index) = open_index();
    let class = ClassStub {
        superclass: Some(TypeSignatureStub::raw("")),
        ..class_with_method("Lp/X;", "m", "()V")
    };
    let err = {
        let mut txn = index.write();
        index
            .index_resource(
                &mut txn,
                "/out/X.class",
                Fingerprint::of_bytes(b"X", 1),
                &[class],
                &CancellationToken::new(),
            )
            .unwrap_err()
    };
    assert!(matches!(err, IndexError::InvalidDescriptor(ref d) if d.is_empty()), "{err:?}");
    assert_nothing_written(&index, "/out/X.class");
}

#[test]
fn bad_descriptor_in_a_later_class_writes_nothing() {
    let (_dir, index) = open_index();
    let nested_enum = AnnotationStub {
        descriptor: "Lp/Ann;".into(),
        values: vec![AnnotationValueStub {
            name: "kind".into(),
            value: ConstantValue::Array(vec![ConstantValue::Enum {
                descriptor: String::new(),
                name: "A".into(),
            }]),
        }],
    };
    let classes = [
        ClassStub::new("Lp/X;"),
        ClassStub {
            fields: vec![FieldStub {
                annotations: vec![nested_enum],
                ..FieldStub::new("f", "I")
            }],
            ..ClassStub::new("Lp/Y;")
        },
    ];
    let err = {
        let mut txn = index.write();
        index
            .index_resource(
                &mut txn,
                "/lib/a.jar|p/X.class",
                Fingerprint::of_bytes(b"a", 1),
                &classes,
                &CancellationToken::new(),
            )
            .unwrap_err()
    };
    assert!(matches!(err, IndexError::InvalidDescriptor(_)), "{err:?}");
    assert_nothing_written(&index, "/lib/a.jar|p/X.class");
}

#[test]
fn empty_optional_strings_are_rejected() {
    let (_dir, index) = open_index();
    let classes = [
        ClassStub {
            source_file: Some(String::new()),
            ..ClassStub::new("Lp/X;")
        },
        ClassStub {
            methods: vec![MethodStub {
                generic_signature: Some(String::new()),
                ..MethodStub::new("m", "()V")
            }],
            ..ClassStub::new("Lp/X;")
        },
    ];
    for class in classes {
        let err = {
            let mut txn = index.write();
            index
                .index_resource(
                    &mut txn,
                    "/out/X.class",
                    Fingerprint::of_bytes(b"X", 1),
                    &[class],
                    &CancellationToken::new(),
                )
                .unwrap_err()
        };
        assert!(
            matches!(err, IndexError::InvalidClass { ref descriptor, .. } if descriptor == "Lp/X;"),
            "{err:?}"
        );
        assert_nothing_written(&index, "/out/X.class");
    }
}

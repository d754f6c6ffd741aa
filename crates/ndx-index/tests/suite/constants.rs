use ndx_index::schema::tags;
use ndx_index::{
    AnnotationStub, AnnotationValueStub, CancellationToken, ClassStub, ConstantValue, FieldStub, Fingerprint,
    MethodStub, TypeArgumentStub, TypeSignatureStub, Wildcard,
};
use pretty_assertions::assert_eq;

use super::open_index;

fn retention(policy: &str) -> AnnotationStub {
    AnnotationStub {
        descriptor: "Ljava/lang/annotation/Retention;".to_string(),
        values: vec![AnnotationValueStub {
            name: "value".to_string(),
            value: ConstantValue::Enum {
                descriptor: "Ljava/lang/annotation/RetentionPolicy;".to_string(),
                name: policy.to_string(),
            },
        }],
    }
}

fn rich_class() -> ClassStub {
    let map_of_strings = TypeSignatureStub {
        descriptor: "Ljava/util/Map;".to_string(),
        dimensions: 0,
        arguments: vec![
            TypeArgumentStub {
                wildcard: Wildcard::Exact,
                bound: Some(TypeSignatureStub::raw("Ljava/lang/String;")),
            },
            TypeArgumentStub {
                wildcard: Wildcard::Extends,
                bound: Some(TypeSignatureStub {
                    descriptor: "Ljava/lang/Number;".to_string(),
                    dimensions: 1,
                    arguments: Vec::new(),
                }),
            },
            TypeArgumentStub {
                wildcard: Wildcard::Unbounded,
                bound: None,
            },
        ],
    };

    ClassStub {
        descriptor: "Lp/Outer$Config;".to_string(),
        access_flags: 0x2601,
        generic_signature: Some("<T:Ljava/lang/Object;>Ljava/lang/Object;".to_string()),
        source_file: Some("Outer.java".to_string()),
        enclosing_type: Some("Lp/Outer;".to_string()),
        superclass: Some(TypeSignatureStub::raw("Ljava/lang/Object;")),
        interfaces: vec![map_of_strings],
        methods: vec![
            MethodStub {
                annotations: vec![retention("RUNTIME")],
                default_value: Some(ConstantValue::Array(vec![
                    ConstantValue::Int(1),
                    ConstantValue::Int(-2),
                    ConstantValue::Class(TypeSignatureStub::raw("Ljava/lang/Runnable;")),
                ])),
                access_flags: 0x0401,
                ..MethodStub::new("values", "()[I")
            },
            MethodStub {
                generic_signature: Some("<U:Ljava/lang/Object;>(TU;)V".to_string()),
                ..MethodStub::new("<init>", "(Ljava/lang/Object;)V")
            },
        ],
        fields: vec![
            FieldStub {
                constant: Some(ConstantValue::Boolean(true)),
                access_flags: 0x0019,
                ..FieldStub::new("ENABLED", "Z")
            },
            FieldStub {
                constant: Some(ConstantValue::Byte(-7)),
                ..FieldStub::new("B", "B")
            },
            FieldStub {
                constant: Some(ConstantValue::Char(0x263a)),
                ..FieldStub::new("C", "C")
            },
            FieldStub {
                constant: Some(ConstantValue::Short(-300)),
                ..FieldStub::new("S", "S")
            },
            FieldStub {
                constant: Some(ConstantValue::Long(i64::MIN)),
                ..FieldStub::new("J", "J")
            },
            FieldStub {
                constant: Some(ConstantValue::Float(1.5)),
                ..FieldStub::new("F", "F")
            },
            FieldStub {
                constant: Some(ConstantValue::Double(-0.25)),
                ..FieldStub::new("D", "D")
            },
            FieldStub {
                constant: Some(ConstantValue::String("x".repeat(300))),
                annotations: vec![AnnotationStub {
                    descriptor: "Lp/Nested;".to_string(),
                    values: vec![AnnotationValueStub {
                        name: "inner".to_string(),
                        value: ConstantValue::Annotation(retention("CLASS")),
                    }],
                }],
                ..FieldStub::new("NAME", "Ljava/lang/String;")
            },
        ],
        annotations: vec![retention("SOURCE")],
    }
}

#[test]
fn class_facts_read_back_unchanged() {
    let (_dir, index) = open_index();
    let class = rich_class();
    let mut txn = index.write();
    index
        .index_resource(
            &mut txn,
            "/lib/outer.jar|p/Outer$Config.class",
            Fingerprint::of_bytes(b"outer", 1),
            std::slice::from_ref(&class),
            &CancellationToken::new(),
        )
        .unwrap();

    let id = index.find_type(&txn, "Lp/Outer$Config;").unwrap().unwrap();
    assert_eq!(id.simple_name().unwrap(), "Config");
    let ty = id.best_declaration().unwrap().unwrap();
    assert_eq!(ty.to_stub().unwrap(), class);

    let kinds: Vec<_> = ty
        .fields()
        .unwrap()
        .iter()
        .map(|field| field.constant().unwrap().unwrap().kind().unwrap())
        .collect();
    assert_eq!(
        kinds,
        vec![
            tags::BOOLEAN,
            tags::BYTE,
            tags::CHAR,
            tags::SHORT,
            tags::LONG,
            tags::FLOAT,
            tags::DOUBLE,
            tags::STRING
        ]
    );
}

#[test]
fn referenced_type_ids_are_released_with_the_class() {
    let (_dir, index) = open_index();
    let mut txn = index.write();
    index
        .index_resource(
            &mut txn,
            "/lib/outer.jar|p/Outer$Config.class",
            Fingerprint::of_bytes(b"outer", 1),
            &[rich_class()],
            &CancellationToken::new(),
        )
        .unwrap();

    let policy = index
        .find_type(&txn, "Ljava/lang/annotation/RetentionPolicy;")
        .unwrap()
        .unwrap();
    assert_eq!(policy.ref_count().unwrap(), 3);
    assert!(index.find_type(&txn, "Lp/Outer;").unwrap().is_some());

    index
        .remove_resource(&mut txn, "/lib/outer.jar|p/Outer$Config.class")
        .unwrap();
    assert!(index.all_type_ids(&txn).unwrap().is_empty());
}

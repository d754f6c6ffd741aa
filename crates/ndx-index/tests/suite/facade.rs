use std::collections::BTreeSet;

use ndx_index::{CancellationToken, ClassStub, Fingerprint};
use pretty_assertions::assert_eq;

use super::open_index;

const DESCRIPTORS: &[&str] = &[
    "Ljava/util/Map;",
    "Ljava/util/Map$Entry;",
    "Ljava/util/HashMap;",
    "Ljava/util/Maps;",
    "Lcom/example/MapperImpl;",
    "Lcom/example/Mapper;",
    "Lcom/example/List;",
    "Lp/Ünïcode;",
];

#[test]
fn find_type_returns_the_created_descriptor_byte_for_byte() {
    let (_dir, index) = open_index();
    let mut txn = index.write();
    for descriptor in DESCRIPTORS {
        let first = index.create_type_id(&mut txn, descriptor).unwrap();
        let second = index.create_type_id(&mut txn, descriptor).unwrap();
        assert_eq!(first, second, "{descriptor}");
    }
    drop(txn);

    let txn = index.read();
    for descriptor in DESCRIPTORS {
        let found = index.find_type(&txn, descriptor).unwrap().unwrap();
        assert_eq!(found.descriptor().unwrap().as_bytes(), descriptor.as_bytes());
    }
    assert_eq!(index.all_type_ids(&txn).unwrap().len(), DESCRIPTORS.len());
    assert!(index.find_type(&txn, "Ljava/util/Mapp;").unwrap().is_none());
}

fn simple_names(index: &ndx_index::JavaIndex, prefix: &str, limit: Option<usize>) -> BTreeSet<String> {
    let txn = index.read();
    index
        .find_types_by_simple_name(&txn, prefix, limit)
        .unwrap()
        .iter()
        .map(|id| id.descriptor().unwrap())
        .collect()
}

#[test]
fn simple_name_prefix_search_matches_exactly_and_narrows() {
    let (_dir, index) = open_index();
    {
        let mut txn = index.write();
        for descriptor in DESCRIPTORS {
            index.create_type_id(&mut txn, descriptor).unwrap();
        }
    }

    for prefix in ["", "M", "Ma", "Map", "Mapp", "Mapper", "E", "Ü", "Z"] {
        let expected: BTreeSet<String> = DESCRIPTORS
            .iter()
            .filter(|d| ndx_index::simple_name(d).starts_with(prefix))
            .map(|d| d.to_string())
            .collect();
        assert_eq!(simple_names(&index, prefix, None), expected, "prefix {prefix:?}");

        let narrower = simple_names(&index, &format!("{prefix}a"), None);
        assert!(narrower.is_subset(&expected), "prefix {prefix:?}");
    }

    assert_eq!(simple_names(&index, "Map", Some(2)).len(), 2);
    assert_eq!(simple_names(&index, "Entry", None).len(), 1);
}

#[test]
fn best_resource_prefers_complete_scans() {
    let (_dir, index) = open_index();
    let cancel = CancellationToken::new();
    let mut txn = index.write();

    let stopped = CancellationToken::new();
    stopped.cancel();
    let first_partial = index
        .index_resource(
            &mut txn,
            "/lib/a.jar|p/X.class",
            Fingerprint::of_bytes(b"v1", 1),
            &[ClassStub::new("Lp/X;")],
            &stopped,
        )
        .unwrap();
    let best = index.find_best_resource(&txn, "/lib/a.jar|p/X.class").unwrap().unwrap();
    assert_eq!(best.address(), first_partial.resource());

    let complete = index
        .index_resource(
            &mut txn,
            "/lib/a.jar|p/X.class",
            Fingerprint::of_bytes(b"v1", 1),
            &[ClassStub::new("Lp/X;")],
            &cancel,
        )
        .unwrap();
    let partial = index
        .index_resource(
            &mut txn,
            "/lib/a.jar|p/X.class",
            Fingerprint::of_bytes(b"v2", 2),
            &[ClassStub::new("Lp/X;")],
            &stopped,
        )
        .unwrap();
    assert!(partial.is_cancelled());

    let resources = index
        .find_resources_with_path(&txn, "/lib/a.jar|p/X.class")
        .unwrap();
    assert_eq!(resources.len(), 3);

    let best = index.find_best_resource(&txn, "/lib/a.jar|p/X.class").unwrap().unwrap();
    assert_eq!(best.address(), complete.resource());
    assert!(best.is_fully_indexed().unwrap());
    let newer = resources
        .iter()
        .find(|r| r.address() == partial.resource())
        .unwrap();
    assert!(newer.last_scanned().unwrap() > best.last_scanned().unwrap());

    assert_eq!(index.all_resources(&txn).unwrap().len(), 3);
    assert!(index.find_best_resource(&txn, "/lib/b.jar|p/X.class").unwrap().is_none());
}

#[test]
fn stable_handle_revalidates_after_delete() {
    let (_dir, index) = open_index();
    let cancel = CancellationToken::new();
    {
        let mut txn = index.write();
        index
            .index_resource(
                &mut txn,
                "/out/p/X.class",
                Fingerprint::of_bytes(b"x", 1),
                &[ClassStub::new("Lp/X;")],
                &cancel,
            )
            .unwrap();
    }

    let type_handle = index.type_id_handle("Lp/X;");
    let first = type_handle.get().unwrap();
    assert!(first.is_some());
    let generation = index.generation();
    assert_eq!(type_handle.get().unwrap(), first);
    assert_eq!(index.generation(), generation);

    let descriptor = type_handle
        .read(|txn, id| {
            let id = id.unwrap();
            Ok(ndx_index::TypeIdRec::load(txn, id)?.descriptor()?)
        })
        .unwrap();
    assert_eq!(descriptor, "Lp/X;");

    {
        let mut txn = index.write();
        index.remove_resource(&mut txn, "/out/p/X.class").unwrap();
    }
    assert_eq!(type_handle.get().unwrap(), None);
}

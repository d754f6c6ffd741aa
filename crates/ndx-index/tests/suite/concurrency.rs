use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Barrier;

use ndx_index::{CancellationToken, ClassStub, Fingerprint, IndexError, JavaNode, TypeIdRec};

use super::open_index;

const READERS: usize = 4;
const ROUNDS: usize = 200;

/// Stops the readers even if the writer panics.
struct StopOnDrop<'a>(&'a AtomicBool);

impl Drop for StopOnDrop<'_> {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Release);
    }
}

#[test]
fn readers_never_see_a_half_written_record_at_a_reused_address() {
    let (_dir, index) = open_index();
    let address = {
        let mut txn = index.write();
        index.create_type_id(&mut txn, "Lp/Alpha;").unwrap()
    };

    let done = AtomicBool::new(false);
    let observed = AtomicUsize::new(0);
    let barrier = Barrier::new(READERS + 1);

    std::thread::scope(|scope| {
        for _ in 0..READERS {
            scope.spawn(|| {
                barrier.wait();
                while !done.load(Ordering::Acquire) {
                    let txn = index.read();
                    // Deliberately reuses an address across lock releases;
                    // the load must fail cleanly or see a complete record.
                    match TypeIdRec::load(&txn, address) {
                        Ok(id) => {
                            let descriptor = id.descriptor().unwrap();
                            let simple_name = id.simple_name().unwrap();
                            match descriptor.as_str() {
                                "Lp/Alpha;" => assert_eq!(simple_name, "Alpha"),
                                "Lp/Beta;" => assert_eq!(simple_name, "Beta"),
                                other => panic!("unexpected descriptor {other:?}"),
                            }
                            assert!(matches!(JavaNode::load(&txn, address).unwrap(), JavaNode::TypeId(_)));
                            observed.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(IndexError::Storage(err)) => {
                            assert!(err.is_corruption(), "unexpected error {err}");
                        }
                        Err(err) => panic!("unexpected error {err}"),
                    }
                }
            });
        }

        barrier.wait();
        let _stop = StopOnDrop(&done);
        for round in 0..ROUNDS {
            let (from, to) = if round % 2 == 0 {
                ("Lp/Alpha;", "Lp/Beta;")
            } else {
                ("Lp/Beta;", "Lp/Alpha;")
            };
            let mut txn = index.write();
            let old = index.find_type(&txn, from).unwrap().unwrap().address();
            assert!(index.delete_type_id(&mut txn, old).unwrap());
            let new = index.create_type_id(&mut txn, to).unwrap();
            assert_eq!(new, address, "freed slot is handed out again");
            drop(txn);
            std::thread::yield_now();
        }
    });

    assert!(observed.load(Ordering::Relaxed) > 0);
    let txn = index.read();
    assert_eq!(index.find_type(&txn, "Lp/Alpha;").unwrap().unwrap().address(), address);
}

#[test]
fn readers_run_alongside_indexing() {
    let (_dir, index) = open_index();
    let done = AtomicBool::new(false);

    std::thread::scope(|scope| {
        for _ in 0..READERS {
            scope.spawn(|| {
                while !done.load(Ordering::Acquire) {
                    let txn = index.read();
                    for resource in index.all_resources(&txn).unwrap() {
                        assert!(resource.is_fully_indexed().unwrap());
                        for ty in resource.types().unwrap() {
                            let stub = ty.to_stub().unwrap();
                            assert!(stub.descriptor.starts_with("Lp/T"));
                        }
                    }
                }
            });
        }

        let _stop = StopOnDrop(&done);
        let cancel = CancellationToken::new();
        for round in 0..50u64 {
            let mut txn = index.write();
            let classes: Vec<_> = (0..3)
                .map(|i| ClassStub::new(format!("Lp/T{round}_{i};")))
                .collect();
            index
                .index_resource(
                    &mut txn,
                    &format!("/out/{}.class", round % 5),
                    Fingerprint::of_bytes(&round.to_le_bytes(), round),
                    &classes,
                    &cancel,
                )
                .unwrap();
        }
    });

    let txn = index.read();
    assert_eq!(index.all_resources(&txn).unwrap().len(), 5);
    assert_eq!(index.all_types(&txn).unwrap().len(), 15);
}

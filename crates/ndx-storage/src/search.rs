use std::cmp::Ordering;

use crate::address::Address;
use crate::btree::{BTree, BTreeVisitor, RecordComparator};
use crate::database::WriteTxn;
use crate::error::StorageError;
use crate::heap::Heap;
use crate::schema::{FieldDesc, FieldKind};
use crate::strings;

/// Orders records by the string stored in one of their fields.
#[derive(Debug, Clone, Copy)]
pub struct StringFieldComparator {
    field: FieldDesc,
}

impl RecordComparator for StringFieldComparator {
    fn compare(&self, heap: &Heap, a: Address, b: Address) -> Result<Ordering, StorageError> {
        let left = strings::read_string_bytes(heap, self.field.get_address(heap, a)?)?;
        strings::compare_string(heap, self.field.get_address(heap, b)?, &left).map(Ordering::reverse)
    }
}

/// B-tree keyed by a string field: exact, prefix and ranked lookups.
///
/// Records with equal keys are kept in address order, so every lookup that
/// returns several records returns them lowest address first.
#[derive(Debug, Clone)]
pub struct StringFieldIndex {
    tree: BTree<StringFieldComparator>,
    field: FieldDesc,
}

impl StringFieldIndex {
    /// Index rooted at `anchor`, keyed by `field`.
    ///
    /// # Panics
    /// Panics if `field` is not a [`FieldKind::String`] field.
    pub fn new(anchor: Address, field: FieldDesc) -> Self {
        assert_eq!(field.kind(), FieldKind::String, "index key must be a string field");
        Self {
            tree: BTree::new(anchor, StringFieldComparator { field }),
            field,
        }
    }

    pub fn insert(&self, txn: &mut WriteTxn<'_>, record: Address) -> Result<(), StorageError> {
        self.tree.insert(txn, record)
    }

    pub fn delete(&self, txn: &mut WriteTxn<'_>, record: Address) -> Result<bool, StorageError> {
        self.tree.delete(txn, record)
    }

    pub fn clear(&self, txn: &mut WriteTxn<'_>) -> Result<(), StorageError> {
        self.tree.clear(txn)
    }

    pub fn records(&self, heap: &Heap) -> Result<Vec<Address>, StorageError> {
        self.tree.records(heap)
    }

    pub fn find_all(&self, heap: &Heap, key: &str) -> Result<Vec<Address>, StorageError> {
        let mut visitor = Matches::new(self.field, Match::Exact(key.as_bytes()), None);
        self.tree.accept(heap, &mut visitor)?;
        Ok(visitor.found)
    }

    /// Lowest-addressed record whose key equals `key`.
    pub fn find_first(&self, heap: &Heap, key: &str) -> Result<Option<Address>, StorageError> {
        let mut visitor = Matches::new(self.field, Match::Exact(key.as_bytes()), Some(1));
        self.tree.accept(heap, &mut visitor)?;
        Ok(visitor.found.into_iter().next())
    }

    /// Records whose key starts with `prefix`, in key order, at most `limit`.
    pub fn find_prefix(&self, heap: &Heap, prefix: &str, limit: Option<usize>) -> Result<Vec<Address>, StorageError> {
        let mut visitor = Matches::new(self.field, Match::Prefix(prefix.as_bytes()), limit);
        self.tree.accept(heap, &mut visitor)?;
        Ok(visitor.found)
    }

    /// Among records whose key equals `key`, the one `rank` scores highest.
    /// Equal scores go to the lowest address.
    pub fn find_best<R, F>(&self, heap: &Heap, key: &str, mut rank: F) -> Result<Option<Address>, StorageError>
    where
        R: Ord,
        F: FnMut(&Heap, Address) -> Result<R, StorageError>,
    {
        let mut best: Option<(R, Address)> = None;
        for record in self.find_all(heap, key)? {
            let score = rank(heap, record)?;
            if best.as_ref().is_none_or(|(top, _)| score > *top) {
                best = Some((score, record));
            }
        }
        Ok(best.map(|(_, record)| record))
    }
}

enum Match<'k> {
    Exact(&'k [u8]),
    Prefix(&'k [u8]),
}

struct Matches<'k> {
    field: FieldDesc,
    key: Match<'k>,
    limit: Option<usize>,
    found: Vec<Address>,
}

impl<'k> Matches<'k> {
    fn new(field: FieldDesc, key: Match<'k>, limit: Option<usize>) -> Self {
        Self {
            field,
            key,
            limit,
            found: Vec::new(),
        }
    }
}

impl BTreeVisitor for Matches<'_> {
    fn compare(&mut self, heap: &Heap, record: Address) -> Result<Ordering, StorageError> {
        let head = self.field.get_address(heap, record)?;
        match self.key {
            Match::Exact(key) => strings::compare_string(heap, head, key),
            Match::Prefix(prefix) => {
                if strings::starts_with(heap, head, prefix)? {
                    Ok(Ordering::Equal)
                } else {
                    strings::compare_string(heap, head, prefix)
                }
            }
        }
    }

    fn visit(&mut self, _heap: &Heap, record: Address) -> Result<bool, StorageError> {
        if self.limit == Some(0) {
            return Ok(false);
        }
        self.found.push(record);
        Ok(self.limit.is_none_or(|limit| self.found.len() < limit))
    }
}

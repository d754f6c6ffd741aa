//! Ordered index of record addresses.
//!
//! Nodes hold at most `2 * degree - 1` keys. Keys are record addresses
//! ordered by a [`RecordComparator`], with the address itself breaking ties,
//! so duplicate keys are allowed and every record has exactly one position.
//! Inserts split full nodes on the way down. Deletes pull the in-order
//! predecessor or successor into internal nodes and release subtrees that
//! become empty, but do not rebalance.

use std::cmp::Ordering;

use crate::address::Address;
use crate::database::WriteTxn;
use crate::error::StorageError;
use crate::heap::Heap;
use crate::malloc::Pool;

pub const DEFAULT_DEGREE: usize = 8;

const NODE_HEADER_LEN: u32 = 8;
// Far deeper than any tree that fits in a store; deeper means a cycle.
const MAX_DEPTH: usize = 64;

/// Total order over records stored in a [`BTree`].
pub trait RecordComparator {
    fn compare(&self, heap: &Heap, a: Address, b: Address) -> Result<Ordering, StorageError>;
}

/// Bounded in-order traversal.
pub trait BTreeVisitor {
    /// Orders `record` relative to the search key. Records comparing
    /// [`Ordering::Equal`] must form a contiguous run of the tree's order.
    fn compare(&mut self, heap: &Heap, record: Address) -> Result<Ordering, StorageError>;

    /// Called for each matching record in order. Return `false` to stop.
    fn visit(&mut self, heap: &Heap, record: Address) -> Result<bool, StorageError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Node {
    leaf: bool,
    keys: Vec<Address>,
    children: Vec<Address>,
}

/// A B-tree whose root pointer lives in the 8-byte cell `anchor`.
#[derive(Debug, Clone)]
pub struct BTree<C> {
    anchor: Address,
    degree: usize,
    comparator: C,
}

impl<C: RecordComparator> BTree<C> {
    pub fn new(anchor: Address, comparator: C) -> Self {
        Self::with_degree(anchor, DEFAULT_DEGREE, comparator)
    }

    /// # Panics
    /// Panics if `degree < 2`.
    pub fn with_degree(anchor: Address, degree: usize, comparator: C) -> Self {
        assert!(degree >= 2, "b-tree degree must be at least 2");
        Self {
            anchor,
            degree,
            comparator,
        }
    }

    pub fn comparator(&self) -> &C {
        &self.comparator
    }

    fn max_keys(&self) -> usize {
        2 * self.degree - 1
    }

    fn node_size(&self) -> u32 {
        NODE_HEADER_LEN + 8 * (self.max_keys() + 2 * self.degree) as u32
    }

    fn key_address(&self, node: Address, i: usize) -> Address {
        node.offset(NODE_HEADER_LEN + 8 * i as u32)
    }

    fn child_address(&self, node: Address, i: usize) -> Address {
        node.offset(NODE_HEADER_LEN + 8 * (self.max_keys() + i) as u32)
    }

    fn read_node(&self, heap: &Heap, address: Address) -> Result<Node, StorageError> {
        let count = heap.get_u16(address)? as usize;
        let leaf = heap.get_u16(address.offset(2))? != 0;
        if count > self.max_keys() {
            return Err(StorageError::Corruption {
                address,
                reason: "b-tree node holds too many keys",
            });
        }
        let keys = (0..count)
            .map(|i| heap.get_address(self.key_address(address, i)))
            .collect::<Result<Vec<_>, _>>()?;
        let children = if leaf {
            Vec::new()
        } else {
            (0..=count)
                .map(|i| heap.get_address(self.child_address(address, i)))
                .collect::<Result<Vec<_>, _>>()?
        };
        Ok(Node {
            leaf,
            keys,
            children,
        })
    }

    fn write_node(&self, txn: &mut WriteTxn<'_>, address: Address, node: &Node) -> Result<(), StorageError> {
        txn.put_u16(address, node.keys.len() as u16)?;
        txn.put_u16(address.offset(2), u16::from(node.leaf))?;
        for (i, key) in node.keys.iter().enumerate() {
            txn.put_address(self.key_address(address, i), *key)?;
        }
        for (i, child) in node.children.iter().enumerate() {
            txn.put_address(self.child_address(address, i), *child)?;
        }
        Ok(())
    }

    fn allocate_node(&self, txn: &mut WriteTxn<'_>, node: &Node) -> Result<Address, StorageError> {
        let address = txn.malloc(self.node_size(), Pool::BTREE)?;
        self.write_node(txn, address, node)?;
        Ok(address)
    }

    fn order(&self, heap: &Heap, a: Address, b: Address) -> Result<Ordering, StorageError> {
        Ok(self.comparator.compare(heap, a, b)?.then(a.cmp(&b)))
    }

    /// Number of keys in `node` ordered before `record`.
    fn position(&self, heap: &Heap, node: &Node, record: Address) -> Result<(usize, bool), StorageError> {
        for (i, key) in node.keys.iter().enumerate() {
            match self.order(heap, record, *key)? {
                Ordering::Less => return Ok((i, false)),
                Ordering::Equal => return Ok((i, true)),
                Ordering::Greater => {}
            }
        }
        Ok((node.keys.len(), false))
    }

    pub fn is_empty(&self, heap: &Heap) -> Result<bool, StorageError> {
        let root = heap.get_address(self.anchor)?;
        if root.is_null() {
            return Ok(true);
        }
        Ok(self.first(heap)?.is_none())
    }

    /// Smallest record in the tree.
    pub fn first(&self, heap: &Heap) -> Result<Option<Address>, StorageError> {
        let mut found = None;
        self.accept(heap, &mut FirstVisitor(&mut found))?;
        Ok(found)
    }

    pub fn insert(&self, txn: &mut WriteTxn<'_>, record: Address) -> Result<(), StorageError> {
        let root = txn.get_address(self.anchor)?;
        if root.is_null() {
            let leaf = Node {
                leaf: true,
                keys: vec![record],
                children: Vec::new(),
            };
            let address = self.allocate_node(txn, &leaf)?;
            return txn.put_address(self.anchor, address);
        }

        let root_node = self.read_node(txn, root)?;
        let start = if root_node.keys.len() == self.max_keys() {
            let mut new_root = Node {
                leaf: false,
                keys: Vec::new(),
                children: vec![root],
            };
            let new_root_address = self.allocate_node(txn, &new_root)?;
            self.split_child(txn, new_root_address, &mut new_root, 0)?;
            txn.put_address(self.anchor, new_root_address)?;
            new_root_address
        } else {
            root
        };
        self.insert_non_full(txn, start, record)
    }

    fn split_child(
        &self,
        txn: &mut WriteTxn<'_>,
        parent_address: Address,
        parent: &mut Node,
        index: usize,
    ) -> Result<(), StorageError> {
        let child_address = parent.children[index];
        let mut child = self.read_node(txn, child_address)?;
        let t = self.degree;

        let right = Node {
            leaf: child.leaf,
            keys: child.keys.split_off(t),
            children: if child.leaf {
                Vec::new()
            } else {
                child.children.split_off(t)
            },
        };
        let median = child.keys.pop().ok_or(StorageError::Corruption {
            address: child_address,
            reason: "split of an empty b-tree node",
        })?;

        let right_address = self.allocate_node(txn, &right)?;
        self.write_node(txn, child_address, &child)?;
        parent.keys.insert(index, median);
        parent.children.insert(index + 1, right_address);
        self.write_node(txn, parent_address, parent)
    }

    fn insert_non_full(&self, txn: &mut WriteTxn<'_>, start: Address, record: Address) -> Result<(), StorageError> {
        let mut address = start;
        for _ in 0..MAX_DEPTH {
            let mut node = self.read_node(txn, address)?;
            let (mut i, _) = self.position(txn, &node, record)?;
            if node.leaf {
                node.keys.insert(i, record);
                return self.write_node(txn, address, &node);
            }

            let child = self.read_node(txn, node.children[i])?;
            if child.keys.len() == self.max_keys() {
                self.split_child(txn, address, &mut node, i)?;
                if self.order(txn, record, node.keys[i])? == Ordering::Greater {
                    i += 1;
                }
            }
            address = node.children[i];
        }
        Err(too_deep(start))
    }

    /// Removes `record`. Returns whether it was present.
    pub fn delete(&self, txn: &mut WriteTxn<'_>, record: Address) -> Result<bool, StorageError> {
        let root = txn.get_address(self.anchor)?;
        if root.is_null() {
            return Ok(false);
        }
        let removed = self.delete_from(txn, root, record, 0)?;
        self.collapse_root(txn)?;
        Ok(removed)
    }

    fn delete_from(
        &self,
        txn: &mut WriteTxn<'_>,
        address: Address,
        record: Address,
        depth: usize,
    ) -> Result<bool, StorageError> {
        if depth > MAX_DEPTH {
            return Err(too_deep(address));
        }
        let mut node = self.read_node(txn, address)?;
        let (i, found) = self.position(txn, &node, record)?;

        if !found {
            if node.leaf {
                return Ok(false);
            }
            return self.delete_from(txn, node.children[i], record, depth + 1);
        }

        if node.leaf {
            node.keys.remove(i);
        } else if let Some(predecessor) = self.take_extreme(txn, node.children[i], true, depth + 1)? {
            node.keys[i] = predecessor;
        } else if let Some(successor) = self.take_extreme(txn, node.children[i + 1], false, depth + 1)? {
            node.keys[i] = successor;
        } else {
            node.keys.remove(i);
            let empty = node.children.remove(i + 1);
            self.free_subtree(txn, empty, depth + 1)?;
        }
        self.write_node(txn, address, &node)?;
        Ok(true)
    }

    /// Removes and returns the largest (`max`) or smallest record of a
    /// subtree, or `None` if the subtree holds no records.
    fn take_extreme(
        &self,
        txn: &mut WriteTxn<'_>,
        address: Address,
        max: bool,
        depth: usize,
    ) -> Result<Option<Address>, StorageError> {
        if depth > MAX_DEPTH {
            return Err(too_deep(address));
        }
        let mut node = self.read_node(txn, address)?;
        if node.leaf {
            let taken = if max {
                node.keys.pop()
            } else if node.keys.is_empty() {
                None
            } else {
                Some(node.keys.remove(0))
            };
            if taken.is_some() {
                self.write_node(txn, address, &node)?;
            }
            return Ok(taken);
        }

        let edge = if max { node.children.len() - 1 } else { 0 };
        if let Some(found) = self.take_extreme(txn, node.children[edge], max, depth + 1)? {
            return Ok(Some(found));
        }
        if node.keys.is_empty() {
            return Ok(None);
        }

        // The edge subtree is empty; the edge key of this node is the extreme.
        let empty = node.children.remove(edge);
        let taken = if max {
            node.keys.pop()
        } else {
            Some(node.keys.remove(0))
        };
        self.free_subtree(txn, empty, depth + 1)?;
        self.write_node(txn, address, &node)?;
        Ok(taken)
    }

    fn collapse_root(&self, txn: &mut WriteTxn<'_>) -> Result<(), StorageError> {
        for _ in 0..MAX_DEPTH {
            let root = txn.get_address(self.anchor)?;
            if root.is_null() {
                return Ok(());
            }
            let node = self.read_node(txn, root)?;
            if !node.keys.is_empty() {
                return Ok(());
            }
            let replacement = if node.leaf {
                Address::NULL
            } else {
                node.children[0]
            };
            txn.put_address(self.anchor, replacement)?;
            txn.free(root)?;
        }
        Err(too_deep(self.anchor))
    }

    fn free_subtree(&self, txn: &mut WriteTxn<'_>, address: Address, depth: usize) -> Result<(), StorageError> {
        if depth > MAX_DEPTH {
            return Err(too_deep(address));
        }
        let node = self.read_node(txn, address)?;
        for child in node.children {
            self.free_subtree(txn, child, depth + 1)?;
        }
        txn.free(address)
    }

    /// Frees every tree node. Records are not touched.
    pub fn clear(&self, txn: &mut WriteTxn<'_>) -> Result<(), StorageError> {
        let root = txn.get_address(self.anchor)?;
        if !root.is_null() {
            self.free_subtree(txn, root, 0)?;
        }
        txn.put_address(self.anchor, Address::NULL)
    }

    /// Runs `visitor` over the records it matches, in tree order, skipping
    /// subtrees that cannot contain a match.
    pub fn accept(&self, heap: &Heap, visitor: &mut dyn BTreeVisitor) -> Result<(), StorageError> {
        let root = heap.get_address(self.anchor)?;
        if root.is_null() {
            return Ok(());
        }
        self.visit_node(heap, root, visitor, 0).map(|_| ())
    }

    /// Returns `false` once the visitor has asked to stop.
    fn visit_node(
        &self,
        heap: &Heap,
        address: Address,
        visitor: &mut dyn BTreeVisitor,
        depth: usize,
    ) -> Result<bool, StorageError> {
        if depth > MAX_DEPTH {
            return Err(too_deep(address));
        }
        let node = self.read_node(heap, address)?;
        for (i, key) in node.keys.iter().enumerate() {
            let ordering = visitor.compare(heap, *key)?;
            if ordering != Ordering::Less
                && !node.leaf
                && !self.visit_node(heap, node.children[i], visitor, depth + 1)?
            {
                return Ok(false);
            }
            match ordering {
                Ordering::Less => {}
                Ordering::Equal => {
                    if !visitor.visit(heap, *key)? {
                        return Ok(false);
                    }
                }
                Ordering::Greater => return Ok(false),
            }
        }
        if !node.leaf {
            if let Some(last) = node.children.last() {
                return self.visit_node(heap, *last, visitor, depth + 1);
            }
        }
        Ok(true)
    }

    /// Every record in tree order.
    pub fn records(&self, heap: &Heap) -> Result<Vec<Address>, StorageError> {
        let mut all = CollectAll(Vec::new());
        self.accept(heap, &mut all)?;
        Ok(all.0)
    }
}

fn too_deep(address: Address) -> StorageError {
    StorageError::Corruption {
        address,
        reason: "b-tree deeper than any valid tree",
    }
}

struct FirstVisitor<'a>(&'a mut Option<Address>);

impl BTreeVisitor for FirstVisitor<'_> {
    fn compare(&mut self, _heap: &Heap, _record: Address) -> Result<Ordering, StorageError> {
        Ok(Ordering::Equal)
    }

    fn visit(&mut self, _heap: &Heap, record: Address) -> Result<bool, StorageError> {
        *self.0 = Some(record);
        Ok(false)
    }
}

struct CollectAll(Vec<Address>);

impl BTreeVisitor for CollectAll {
    fn compare(&mut self, _heap: &Heap, _record: Address) -> Result<Ordering, StorageError> {
        Ok(Ordering::Equal)
    }

    fn visit(&mut self, _heap: &Heap, record: Address) -> Result<bool, StorageError> {
        self.0.push(record);
        Ok(true)
    }
}

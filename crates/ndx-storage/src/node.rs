//! Polymorphic node records.
//!
//! Every node starts with a `u16` type tag. A [`NodeTypeRegistry`] maps tags
//! to their layout, parent kind and optional destruct hook, which is enough to
//! load a node through any ancestor type and to release everything a node
//! owns when it is deleted.

use crate::address::Address;
use crate::database::WriteTxn;
use crate::error::StorageError;
use crate::heap::Heap;
use crate::malloc::{is_live_block, Pool};
use crate::schema::{FieldDesc, FieldKind, SchemaError, StructDef, StructLayout};
use crate::strings;

pub type NodeTag = u16;

/// The tag field shared by every node layout.
pub const NODE_TAG: FieldDesc = FieldDesc::at("tag", FieldKind::U16, 0);

// Owned pointers nest this deep at most; deeper means a cycle.
const MAX_OWNERSHIP_DEPTH: usize = 256;

/// Runs before a node's owned fields are released, with the node still
/// intact. Used to unlink the node from indexes and shared records.
pub type DestructHook =
    fn(txn: &mut WriteTxn<'_>, registry: &NodeTypeRegistry, node: Address) -> Result<(), StorageError>;

impl StructDef {
    /// Starts a node layout: the tag field at offset 0.
    pub fn node(name: &'static str) -> Self {
        let mut def = StructDef::new(name);
        def.field(NODE_TAG.name(), NODE_TAG.kind());
        def
    }
}

#[derive(Debug, Clone)]
pub struct NodeType {
    pub tag: NodeTag,
    pub name: &'static str,
    pub parent: Option<NodeTag>,
    /// `None` for abstract kinds, which can be loaded through but never created.
    pub layout: Option<StructLayout>,
    pub pool: Pool,
    pub destruct: Option<DestructHook>,
}

impl NodeType {
    pub fn new(tag: NodeTag, name: &'static str, layout: StructLayout) -> Self {
        Self {
            tag,
            name,
            parent: None,
            layout: Some(layout),
            pool: Pool::MISC,
            destruct: None,
        }
    }

    pub fn abstract_kind(tag: NodeTag, name: &'static str) -> Self {
        Self {
            tag,
            name,
            parent: None,
            layout: None,
            pool: Pool::MISC,
            destruct: None,
        }
    }

    pub fn extends(mut self, parent: NodeTag) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn in_pool(mut self, pool: Pool) -> Self {
        self.pool = pool;
        self
    }

    pub fn on_destruct(mut self, hook: DestructHook) -> Self {
        self.destruct = Some(hook);
        self
    }
}

/// A node's address paired with its concrete tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeRef {
    pub address: Address,
    pub tag: NodeTag,
}

#[derive(Debug, Default, Clone)]
pub struct NodeTypeRegistry {
    types: Vec<Option<NodeType>>,
}

impl NodeTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a node kind. Parents must be registered before children.
    pub fn register(&mut self, node_type: NodeType) -> Result<(), SchemaError> {
        let tag = node_type.tag;
        if self.get(tag).is_some() {
            return Err(SchemaError::DuplicateTag(tag));
        }
        if let Some(parent) = node_type.parent {
            if self.get(parent).is_none() {
                return Err(SchemaError::UnknownParent { tag, parent });
            }
        }
        let index = usize::from(tag);
        if self.types.len() <= index {
            self.types.resize(index + 1, None);
        }
        self.types[index] = Some(node_type);
        Ok(())
    }

    pub fn get(&self, tag: NodeTag) -> Option<&NodeType> {
        self.types.get(usize::from(tag)).and_then(Option::as_ref)
    }

    pub fn name_of(&self, tag: NodeTag) -> &'static str {
        self.get(tag).map_or("<unregistered>", |node_type| node_type.name)
    }

    /// `true` if `tag` is `ancestor` or derives from it.
    pub fn is_assignable(&self, tag: NodeTag, ancestor: NodeTag) -> bool {
        let mut current = Some(tag);
        for _ in 0..self.types.len() + 1 {
            match current {
                Some(t) if t == ancestor => return true,
                Some(t) => current = self.get(t).and_then(|node_type| node_type.parent),
                None => return false,
            }
        }
        false
    }

    /// Reads the tag of the node at `address`.
    pub fn load(&self, heap: &Heap, address: Address) -> Result<NodeRef, StorageError> {
        if address.is_null() || !is_live_block(heap, address)? {
            return Err(StorageError::Corruption {
                address,
                reason: "node address does not name a live block",
            });
        }
        let tag = NODE_TAG.get_u16(heap, address)?;
        if self.get(tag).is_none() {
            return Err(StorageError::UnexpectedKind {
                address,
                expected: "a registered node kind",
                actual: format!("tag {tag}"),
            });
        }
        Ok(NodeRef { address, tag })
    }

    /// Like [`load`](Self::load), but fails unless the node is assignable to `expected`.
    pub fn load_typed(&self, heap: &Heap, address: Address, expected: NodeTag) -> Result<NodeRef, StorageError> {
        let node = self.load(heap, address)?;
        if !self.is_assignable(node.tag, expected) {
            return Err(StorageError::UnexpectedKind {
                address,
                expected: self.name_of(expected),
                actual: self.name_of(node.tag).to_string(),
            });
        }
        Ok(node)
    }

    /// Allocates a zeroed node of kind `tag`.
    pub fn create(&self, txn: &mut WriteTxn<'_>, tag: NodeTag) -> Result<Address, StorageError> {
        let node_type = self.get(tag).ok_or_else(|| StorageError::UnexpectedKind {
            address: Address::NULL,
            expected: "a registered node kind",
            actual: format!("tag {tag}"),
        })?;
        let layout = node_type
            .layout
            .as_ref()
            .ok_or(SchemaError::AbstractKind(node_type.name))?;
        let address = txn.malloc(layout.size(), node_type.pool)?;
        NODE_TAG.put_u16(txn, address, tag)?;
        Ok(address)
    }

    /// Deletes a node and everything it owns.
    pub fn delete(&self, txn: &mut WriteTxn<'_>, address: Address) -> Result<(), StorageError> {
        self.delete_at_depth(txn, address, 0)
    }

    fn delete_at_depth(&self, txn: &mut WriteTxn<'_>, address: Address, depth: usize) -> Result<(), StorageError> {
        if depth > MAX_OWNERSHIP_DEPTH {
            return Err(StorageError::Corruption {
                address,
                reason: "node ownership chain does not terminate",
            });
        }
        let node = self.load(txn, address)?;

        let mut kind = Some(node.tag);
        while let Some(tag) = kind {
            let Some(node_type) = self.get(tag) else { break };
            if let Some(hook) = node_type.destruct {
                hook(txn, self, address)?;
            }
            kind = node_type.parent;
        }

        let fields = self
            .get(node.tag)
            .and_then(|node_type| node_type.layout.as_ref())
            .map(|layout| layout.fields().to_vec())
            .unwrap_or_default();
        for field in fields {
            match field.kind() {
                FieldKind::Pointer => {
                    let child = field.get_address(txn, address)?;
                    if !child.is_null() {
                        self.delete_at_depth(txn, child, depth + 1)?;
                    }
                }
                FieldKind::String => {
                    let head = field.get_address(txn, address)?;
                    strings::free_string(txn, head)?;
                }
                FieldKind::List => field.list(address).clear(txn)?,
                FieldKind::OwnedList => {
                    let list = field.list(address);
                    for child in list.items(txn)? {
                        self.delete_at_depth(txn, child, depth + 1)?;
                    }
                    list.clear(txn)?;
                }
                _ => {}
            }
        }

        txn.free(address)
    }
}

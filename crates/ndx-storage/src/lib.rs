//! Chunked, file-backed record store for the ndx type index.
//!
//! ## Format
//! A store is a single file made of fixed-size chunks ([`CHUNK_SIZE`]). Chunk 0
//! begins with a fixed-offset header:
//! - magic bytes and the schema version triple (minimum supported, maximum
//!   supported, current)
//! - the end-of-heap pointer used by the allocator
//! - a small table of root slots where higher layers anchor their indexes
//! - per-pool usage counters and the allocator free lists
//!
//! Everything after the header is heap: blocks handed out by the allocator,
//! each prefixed by an 8-byte block header. Blocks never straddle a chunk
//! boundary.
//!
//! ## Access discipline
//! All reads go through a [`ReadTxn`] and all mutations through a [`WriteTxn`];
//! both are guards on the store's reader/writer monitor. Record wrappers
//! borrow the transaction, so an [`Address`] can only be dereferenced while a
//! lock is held. [`StableHandle`] is the one construct allowed to carry a query
//! result across lock boundaries; it revalidates against the store's write
//! generation.

mod address;
mod btree;
mod database;
mod error;
mod handle;
mod header;
mod heap;
mod list;
mod lock;
mod malloc;
mod node;
mod schema;
mod search;
mod strings;

pub use address::Address;
pub use btree::{BTree, BTreeVisitor, RecordComparator, DEFAULT_DEGREE};
pub use database::{Database, DatabaseOptions, ReadTxn, StoreStats, WriteTxn};
pub use error::StorageError;
pub use handle::StableHandle;
pub use header::{
    root_slot_address, CURRENT_VERSION, HEADER_LEN, MAX_SUPPORTED_VERSION, MIN_SUPPORTED_VERSION,
    ROOT_SLOT_COUNT,
};
pub use heap::{Heap, CHUNK_SIZE};
pub use list::RecordList;
pub use malloc::{Pool, BLOCK_HEADER_LEN, MAX_MALLOC_SIZE, POOL_COUNT};
pub use node::{DestructHook, NodeRef, NodeTag, NodeType, NodeTypeRegistry, NODE_TAG};
pub use schema::{FieldDesc, FieldKind, SchemaError, StructDef, StructLayout};
pub use search::{StringFieldComparator, StringFieldIndex};
pub use strings::{
    compare_string, free_string, read_string, read_string_bytes, starts_with as string_starts_with,
    write_string,
};

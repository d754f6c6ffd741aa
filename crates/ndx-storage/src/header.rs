//! Fixed-offset store header living at the start of chunk 0.

use crate::address::Address;
use crate::error::StorageError;
use crate::heap::{Heap, CHUNK_SIZE};
use crate::malloc::{FREE_LIST_COUNT, POOL_COUNT};

pub const MAGIC: [u8; 8] = *b"NDXSTORE";

// Bump whenever the record layout or header interpretation changes. Files
// outside `[MIN_SUPPORTED_VERSION, MAX_SUPPORTED_VERSION]` are rebuilt.
pub const CURRENT_VERSION: u32 = 2;
pub const MIN_SUPPORTED_VERSION: u32 = 2;
pub const MAX_SUPPORTED_VERSION: u32 = 2;

pub const ROOT_SLOT_COUNT: usize = 8;

/// Bytes reserved for the header. The heap starts right after it.
pub const HEADER_LEN: usize = 1024;

const MAGIC_OFFSET: u64 = 0;
const MIN_VERSION_OFFSET: u64 = 8;
const MAX_VERSION_OFFSET: u64 = 12;
const VERSION_OFFSET: u64 = 16;
const CHUNK_SIZE_OFFSET: u64 = 20;
const END_OF_HEAP_OFFSET: u64 = 24;
const GENERATION_OFFSET: u64 = 32;
const ROOT_SLOTS_OFFSET: u64 = 40;
const POOL_USAGE_OFFSET: u64 = ROOT_SLOTS_OFFSET + 8 * ROOT_SLOT_COUNT as u64;
const FREE_LISTS_OFFSET: u64 = POOL_USAGE_OFFSET + 8 * POOL_COUNT as u64;
const HEADER_END: u64 = FREE_LISTS_OFFSET + 8 * FREE_LIST_COUNT as u64;

const _: () = assert!(HEADER_END <= HEADER_LEN as u64);
const _: () = assert!(HEADER_LEN <= CHUNK_SIZE);

/// Address of root slot `slot`. Higher layers store index roots and counters here.
///
/// # Panics
/// Panics if `slot >= ROOT_SLOT_COUNT`.
pub fn root_slot_address(slot: usize) -> Address {
    assert!(slot < ROOT_SLOT_COUNT, "root slot {slot} out of range");
    Address::new(ROOT_SLOTS_OFFSET + 8 * slot as u64)
}

pub(crate) fn pool_usage_address(pool: usize) -> Address {
    Address::new(POOL_USAGE_OFFSET + 8 * pool as u64)
}

pub(crate) fn free_list_address(class: usize) -> Address {
    Address::new(FREE_LISTS_OFFSET + 8 * class as u64)
}

pub(crate) const fn end_of_heap_address() -> Address {
    Address::new(END_OF_HEAP_OFFSET)
}

pub(crate) const fn generation_address() -> Address {
    Address::new(GENERATION_OFFSET)
}

/// Version triple and bookkeeping read from an existing header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct HeaderInfo {
    pub version: u32,
    pub min_supported: u32,
    pub max_supported: u32,
    pub end_of_heap: u64,
    pub generation: u64,
}

pub(crate) fn read(heap: &Heap) -> Result<HeaderInfo, StorageError> {
    if heap.is_empty() {
        return Err(StorageError::InvalidHeader("store has no header chunk"));
    }
    if heap.get_bytes(Address::new(MAGIC_OFFSET), MAGIC.len())? != MAGIC {
        return Err(StorageError::InvalidHeader("bad magic"));
    }

    let version = heap.get_u32(Address::new(VERSION_OFFSET))?;
    if !(MIN_SUPPORTED_VERSION..=MAX_SUPPORTED_VERSION).contains(&version) {
        return Err(StorageError::VersionMismatch {
            found: version,
            min: MIN_SUPPORTED_VERSION,
            max: MAX_SUPPORTED_VERSION,
        });
    }

    if heap.get_u32(Address::new(CHUNK_SIZE_OFFSET))? as usize != CHUNK_SIZE {
        return Err(StorageError::InvalidHeader("chunk size mismatch"));
    }

    let end_of_heap = heap.get_u64(end_of_heap_address())?;
    if end_of_heap < HEADER_LEN as u64 || end_of_heap > heap.len() {
        return Err(StorageError::InvalidHeader("end of heap outside the file"));
    }

    Ok(HeaderInfo {
        version,
        min_supported: heap.get_u32(Address::new(MIN_VERSION_OFFSET))?,
        max_supported: heap.get_u32(Address::new(MAX_VERSION_OFFSET))?,
        end_of_heap,
        generation: heap.get_u64(generation_address())?,
    })
}

/// Formats chunk 0 of an empty heap.
pub(crate) fn initialize(heap: &mut Heap) -> Result<(), StorageError> {
    heap.grow_to(1);
    heap.slice_mut(Address::new(0), HEADER_LEN)?.fill(0);
    heap.slice_mut(Address::new(MAGIC_OFFSET), MAGIC.len())?
        .copy_from_slice(&MAGIC);
    put_u32(heap, MIN_VERSION_OFFSET, MIN_SUPPORTED_VERSION)?;
    put_u32(heap, MAX_VERSION_OFFSET, MAX_SUPPORTED_VERSION)?;
    put_u32(heap, VERSION_OFFSET, CURRENT_VERSION)?;
    put_u32(heap, CHUNK_SIZE_OFFSET, CHUNK_SIZE as u32)?;
    heap.slice_mut(end_of_heap_address(), 8)?
        .copy_from_slice(&(HEADER_LEN as u64).to_le_bytes());
    Ok(())
}

fn put_u32(heap: &mut Heap, offset: u64, value: u32) -> Result<(), StorageError> {
    heap.slice_mut(Address::new(offset), 4)?
        .copy_from_slice(&value.to_le_bytes());
    Ok(())
}

#[cfg(test)]
pub(crate) fn overwrite_version(heap: &mut Heap, version: u32) {
    put_u32(heap, VERSION_OFFSET, version).unwrap();
}

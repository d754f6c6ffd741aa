//! Owned string chains.
//!
//! A string is stored as a chain of segments, each one block:
//! `[total_len u32][seg_len u32][next u64][bytes]`. Only the first segment
//! carries `total_len`. The empty string is the null address, so a zeroed
//! field reads back as `""`.

use std::cmp::Ordering;

use crate::address::Address;
use crate::database::WriteTxn;
use crate::error::StorageError;
use crate::heap::Heap;
use crate::malloc::{Pool, MAX_MALLOC_SIZE};

const SEGMENT_HEADER_LEN: u32 = 16;
const MAX_SEGMENT_PAYLOAD: u32 = MAX_MALLOC_SIZE - SEGMENT_HEADER_LEN;
// Bound on chain walks; a longer chain means a cycle.
const MAX_SEGMENTS: usize = (u32::MAX / MAX_SEGMENT_PAYLOAD) as usize + 1;

/// Writes `value` into a fresh chain and returns its head.
pub fn write_string(txn: &mut WriteTxn<'_>, value: &str) -> Result<Address, StorageError> {
    let bytes = value.as_bytes();
    if bytes.is_empty() {
        return Ok(Address::NULL);
    }
    let total = u32::try_from(bytes.len()).map_err(|_| StorageError::AllocationTooLarge {
        size: u32::MAX,
        max: u32::MAX,
    })?;

    let mut head = Address::NULL;
    let mut previous = Address::NULL;
    for piece in bytes.chunks(MAX_SEGMENT_PAYLOAD as usize) {
        let len = piece.len() as u32;
        let segment = txn.malloc(SEGMENT_HEADER_LEN + len, Pool::STRINGS)?;
        if head.is_null() {
            head = segment;
            txn.put_u32(segment, total)?;
        } else {
            txn.put_address(previous.offset(8), segment)?;
        }
        txn.put_u32(segment.offset(4), len)?;
        txn.put_bytes(segment.offset(SEGMENT_HEADER_LEN), piece)?;
        previous = segment;
    }
    Ok(head)
}

/// Visits each segment's bytes in order; stops early when `f` returns `false`.
fn for_each_segment(
    heap: &Heap,
    head: Address,
    mut f: impl FnMut(&[u8]) -> bool,
) -> Result<(), StorageError> {
    let mut segment = head;
    let mut walked = 0usize;
    while !segment.is_null() {
        walked += 1;
        if walked > MAX_SEGMENTS {
            return Err(StorageError::Corruption {
                address: head,
                reason: "string chain does not terminate",
            });
        }
        let len = heap.get_u32(segment.offset(4))?;
        if len > MAX_SEGMENT_PAYLOAD {
            return Err(StorageError::Corruption {
                address: segment,
                reason: "string segment length exceeds block size",
            });
        }
        let bytes = heap.get_bytes(segment.offset(SEGMENT_HEADER_LEN), len as usize)?;
        if !f(bytes) {
            return Ok(());
        }
        segment = heap.get_address(segment.offset(8))?;
    }
    Ok(())
}

pub fn read_string_bytes(heap: &Heap, head: Address) -> Result<Vec<u8>, StorageError> {
    if head.is_null() {
        return Ok(Vec::new());
    }
    let total = heap.get_u32(head)? as usize;
    let mut out = Vec::with_capacity(total);
    for_each_segment(heap, head, |bytes| {
        out.extend_from_slice(bytes);
        true
    })?;
    if out.len() != total {
        return Err(StorageError::Corruption {
            address: head,
            reason: "string length does not match its segments",
        });
    }
    Ok(out)
}

pub fn read_string(heap: &Heap, head: Address) -> Result<String, StorageError> {
    String::from_utf8(read_string_bytes(heap, head)?).map_err(|_| StorageError::Corruption {
        address: head,
        reason: "string is not valid utf-8",
    })
}

/// Byte-wise comparison of the stored string against `key`, without
/// materializing the stored value.
pub fn compare_string(heap: &Heap, head: Address, key: &[u8]) -> Result<Ordering, StorageError> {
    let mut rest = key;
    let mut ordering = Ordering::Equal;
    for_each_segment(heap, head, |bytes| {
        let n = bytes.len().min(rest.len());
        ordering = bytes[..n].cmp(&rest[..n]);
        if ordering != Ordering::Equal {
            return false;
        }
        if bytes.len() > rest.len() {
            ordering = Ordering::Greater;
            return false;
        }
        rest = &rest[n..];
        true
    })?;
    if ordering == Ordering::Equal && !rest.is_empty() {
        ordering = Ordering::Less;
    }
    Ok(ordering)
}

pub fn starts_with(heap: &Heap, head: Address, prefix: &[u8]) -> Result<bool, StorageError> {
    let mut rest = prefix;
    let mut matches = true;
    for_each_segment(heap, head, |bytes| {
        let n = bytes.len().min(rest.len());
        if bytes[..n] != rest[..n] {
            matches = false;
            return false;
        }
        rest = &rest[n..];
        !rest.is_empty()
    })?;
    Ok(matches && rest.is_empty())
}

/// Frees every segment of the chain at `head`. Null is a no-op.
pub fn free_string(txn: &mut WriteTxn<'_>, head: Address) -> Result<(), StorageError> {
    let mut segment = head;
    let mut walked = 0usize;
    while !segment.is_null() {
        walked += 1;
        if walked > MAX_SEGMENTS {
            return Err(StorageError::Corruption {
                address: head,
                reason: "string chain does not terminate",
            });
        }
        let next = txn.get_address(segment.offset(8))?;
        txn.free(segment)?;
        segment = next;
    }
    Ok(())
}

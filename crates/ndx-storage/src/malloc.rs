//! Block allocator.
//!
//! Block sizes are rounded to a size class: multiples of 16 bytes up to 1 KiB,
//! then powers of two up to a whole chunk. Each class keeps a LIFO free list
//! whose head lives in the store header; the next pointer of a free block is
//! stored in its first payload word.

use crate::address::Address;
use crate::database::WriteTxn;
use crate::error::StorageError;
use crate::header::{self, free_list_address, pool_usage_address};
use crate::heap::{Heap, CHUNK_SIZE};

/// Bytes preceding every payload: `size u32`, `pool u16`, `flags u16`.
pub const BLOCK_HEADER_LEN: u32 = 8;

/// Largest payload a single allocation can hold.
pub const MAX_MALLOC_SIZE: u32 = CHUNK_SIZE as u32 - BLOCK_HEADER_LEN;

pub const POOL_COUNT: usize = 8;

const GRANULE: u32 = 16;
const SMALL_LIMIT: u32 = 1024;
const SMALL_CLASSES: usize = (SMALL_LIMIT / GRANULE) as usize;
const LARGE_CLASSES: usize = (CHUNK_SIZE.trailing_zeros() - SMALL_LIMIT.trailing_zeros()) as usize;
pub(crate) const FREE_LIST_COUNT: usize = SMALL_CLASSES + LARGE_CLASSES;

const FLAG_ALLOCATED: u16 = 0x1;

/// Accounting bucket for allocations; usage per pool is tracked in the header.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Pool(u16);

impl Pool {
    pub const MISC: Pool = Pool(0);
    pub const STRINGS: Pool = Pool(1);
    pub const BTREE: Pool = Pool(2);
    pub const LISTS: Pool = Pool(3);

    /// Pools `4..POOL_COUNT` are free for callers to assign.
    pub const fn new(id: u16) -> Pool {
        Pool(id)
    }

    pub const fn id(self) -> u16 {
        self.0
    }
}

fn size_class(total: u32) -> (usize, u32) {
    if total <= SMALL_LIMIT {
        let size = total.max(GRANULE).div_ceil(GRANULE) * GRANULE;
        ((size / GRANULE) as usize - 1, size)
    } else {
        let size = total.next_power_of_two();
        let class = SMALL_CLASSES + (size.trailing_zeros() - SMALL_LIMIT.trailing_zeros()) as usize - 1;
        (class, size)
    }
}

/// Largest class size that fits in `remaining` bytes.
fn largest_fitting_class(remaining: u32) -> u32 {
    if remaining >= 2 * SMALL_LIMIT {
        1 << (31 - remaining.leading_zeros())
    } else {
        (remaining.min(SMALL_LIMIT) / GRANULE) * GRANULE
    }
}

/// Returns `true` if `address` is the payload of a block that is currently allocated.
pub(crate) fn is_live_block(heap: &Heap, address: Address) -> Result<bool, StorageError> {
    if address.get() < (header::HEADER_LEN as u64 + u64::from(BLOCK_HEADER_LEN)) {
        return Ok(false);
    }
    let block = Address::new(address.get() - u64::from(BLOCK_HEADER_LEN));
    let flags = heap.get_u16(block.offset(6))?;
    Ok(flags & FLAG_ALLOCATED != 0)
}

/// Payload capacity of the block at `address`.
pub(crate) fn block_capacity(heap: &Heap, address: Address) -> Result<u32, StorageError> {
    let block = Address::new(address.get() - u64::from(BLOCK_HEADER_LEN));
    Ok(heap.get_u32(block)?.saturating_sub(BLOCK_HEADER_LEN))
}

impl WriteTxn<'_> {
    /// Allocates a zeroed block with room for `size` payload bytes.
    pub fn malloc(&mut self, size: u32, pool: Pool) -> Result<Address, StorageError> {
        if size > MAX_MALLOC_SIZE {
            return Err(StorageError::AllocationTooLarge {
                size,
                max: MAX_MALLOC_SIZE,
            });
        }
        if usize::from(pool.0) >= POOL_COUNT {
            return Err(StorageError::InvalidPool(pool.0));
        }
        self.bump_generation();

        let (class, block_size) = size_class(size + BLOCK_HEADER_LEN);
        let head = self.heap().get_address(free_list_address(class))?;
        let block = if head.is_null() {
            self.carve(block_size)?
        } else {
            let next = self.heap().get_u64(head.offset(BLOCK_HEADER_LEN))?;
            self.write_u64(free_list_address(class), next)?;
            head
        };

        self.write_block_header(block, block_size, pool.0, FLAG_ALLOCATED)?;
        self.heap_mut()
            .slice_mut(block.offset(BLOCK_HEADER_LEN), (block_size - BLOCK_HEADER_LEN) as usize)?
            .fill(0);
        self.adjust_pool_usage(pool.0, i64::from(block_size))?;

        Ok(block.offset(BLOCK_HEADER_LEN))
    }

    /// Returns the block holding `address` to its free list.
    pub fn free(&mut self, address: Address) -> Result<(), StorageError> {
        if !is_live_block(self.heap(), address)? {
            return Err(StorageError::Corruption {
                address,
                reason: "free of a block that is not allocated",
            });
        }
        self.bump_generation();

        let block = Address::new(address.get() - u64::from(BLOCK_HEADER_LEN));
        let block_size = self.heap().get_u32(block)?;
        let pool = self.heap().get_u16(block.offset(4))?;
        let (class, class_size) = size_class(block_size);
        if class_size != block_size {
            return Err(StorageError::Corruption {
                address,
                reason: "block size does not match any size class",
            });
        }

        self.adjust_pool_usage(pool, -i64::from(block_size))?;
        self.push_free(block, class, block_size)
    }

    fn carve(&mut self, block_size: u32) -> Result<Address, StorageError> {
        let end = self.heap().get_u64(header::end_of_heap_address())?;
        let chunk = CHUNK_SIZE as u64;
        let chunk_end = (end / chunk + 1) * chunk;

        let start = if end + u64::from(block_size) > chunk_end {
            self.release_tail(end, chunk_end)?;
            chunk_end
        } else {
            end
        };
        let new_end = start + u64::from(block_size);

        let needed_chunks = new_end.div_ceil(chunk) as usize;
        if needed_chunks > self.heap().chunk_count() {
            tracing::trace!(
                target: "ndx.storage",
                chunks = needed_chunks,
                "growing store"
            );
            self.heap_mut().grow_to(needed_chunks);
        }
        self.write_u64(header::end_of_heap_address(), new_end)?;
        Ok(Address::new(start))
    }

    /// Splits the unused tail of a chunk into free blocks.
    fn release_tail(&mut self, mut from: u64, to: u64) -> Result<(), StorageError> {
        while to - from >= u64::from(GRANULE) {
            let size = largest_fitting_class((to - from) as u32);
            let (class, _) = size_class(size);
            let block = Address::new(from);
            self.push_free(block, class, size)?;
            from += u64::from(size);
        }
        Ok(())
    }

    fn push_free(&mut self, block: Address, class: usize, block_size: u32) -> Result<(), StorageError> {
        let head = self.heap().get_u64(free_list_address(class))?;
        self.write_block_header(block, block_size, 0, 0)?;
        self.write_u64(block.offset(BLOCK_HEADER_LEN), head)?;
        self.write_u64(free_list_address(class), block.get())
    }

    fn write_block_header(
        &mut self,
        block: Address,
        size: u32,
        pool: u16,
        flags: u16,
    ) -> Result<(), StorageError> {
        let bytes = self.heap_mut().slice_mut(block, BLOCK_HEADER_LEN as usize)?;
        bytes[0..4].copy_from_slice(&size.to_le_bytes());
        bytes[4..6].copy_from_slice(&pool.to_le_bytes());
        bytes[6..8].copy_from_slice(&flags.to_le_bytes());
        Ok(())
    }

    fn adjust_pool_usage(&mut self, pool: u16, delta: i64) -> Result<(), StorageError> {
        let slot = pool_usage_address(usize::from(pool).min(POOL_COUNT - 1));
        let current = self.heap().get_u64(slot)?;
        let updated = current.saturating_add_signed(delta);
        self.write_u64(slot, updated)
    }
}

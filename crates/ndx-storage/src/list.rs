use crate::address::Address;
use crate::database::WriteTxn;
use crate::error::StorageError;
use crate::heap::Heap;
use crate::malloc::{Pool, MAX_MALLOC_SIZE};

// Page layout: [len u32][cap u32][next u64][items u64 * cap]
const PAGE_HEADER_LEN: u32 = 16;
const FIRST_PAGE_CAPACITY: u32 = 4;
const MAX_PAGE_CAPACITY: u32 = (MAX_MALLOC_SIZE - PAGE_HEADER_LEN) / 8;
const MAX_PAGES: usize = 1 << 20;

/// Growable list of record addresses, rooted in an 8-byte cell.
///
/// The cell holds the first page; pages double in capacity as the list
/// grows. Order of insertion is preserved, including across removals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordList {
    cell: Address,
}

impl RecordList {
    /// List whose head pointer is stored at `cell`.
    pub fn at(cell: Address) -> Self {
        Self { cell }
    }

    fn pages(&self, heap: &Heap) -> Result<Vec<Address>, StorageError> {
        let mut pages = Vec::new();
        let mut page = heap.get_address(self.cell)?;
        while !page.is_null() {
            if pages.len() >= MAX_PAGES {
                return Err(StorageError::Corruption {
                    address: self.cell,
                    reason: "list page chain does not terminate",
                });
            }
            pages.push(page);
            page = heap.get_address(page.offset(8))?;
        }
        Ok(pages)
    }

    pub fn is_empty(&self, heap: &Heap) -> Result<bool, StorageError> {
        Ok(self.len(heap)? == 0)
    }

    pub fn len(&self, heap: &Heap) -> Result<usize, StorageError> {
        let mut total = 0usize;
        for page in self.pages(heap)? {
            total += heap.get_u32(page)? as usize;
        }
        Ok(total)
    }

    pub fn items(&self, heap: &Heap) -> Result<Vec<Address>, StorageError> {
        let mut out = Vec::new();
        for page in self.pages(heap)? {
            let (len, cap) = page_bounds(heap, page)?;
            if len > cap {
                return Err(StorageError::Corruption {
                    address: page,
                    reason: "list page length exceeds capacity",
                });
            }
            for i in 0..len {
                out.push(heap.get_address(item_address(page, i))?);
            }
        }
        Ok(out)
    }

    pub fn contains(&self, heap: &Heap, item: Address) -> Result<bool, StorageError> {
        Ok(self.items(heap)?.contains(&item))
    }

    pub fn push(&self, txn: &mut WriteTxn<'_>, item: Address) -> Result<(), StorageError> {
        let pages = self.pages(txn)?;
        let (tail, next_capacity) = match pages.last() {
            Some(&last) => {
                let (len, cap) = page_bounds(txn, last)?;
                if len < cap {
                    txn.put_address(item_address(last, len), item)?;
                    txn.put_u32(last, len + 1)?;
                    return Ok(());
                }
                (last.offset(8), (cap * 2).min(MAX_PAGE_CAPACITY))
            }
            None => (self.cell, FIRST_PAGE_CAPACITY),
        };

        let page = txn.malloc(PAGE_HEADER_LEN + 8 * next_capacity, Pool::LISTS)?;
        txn.put_u32(page, 1)?;
        txn.put_u32(page.offset(4), next_capacity)?;
        txn.put_address(item_address(page, 0), item)?;
        txn.put_address(tail, page)
    }

    /// Removes the first occurrence of `item`. Returns whether it was present.
    pub fn remove(&self, txn: &mut WriteTxn<'_>, item: Address) -> Result<bool, StorageError> {
        let mut link = self.cell;
        for page in self.pages(txn)? {
            let (len, _) = page_bounds(txn, page)?;
            let mut found = None;
            for i in 0..len {
                if txn.get_address(item_address(page, i))? == item {
                    found = Some(i);
                    break;
                }
            }
            let Some(index) = found else {
                link = page.offset(8);
                continue;
            };

            for i in index + 1..len {
                let moved = txn.get_address(item_address(page, i))?;
                txn.put_address(item_address(page, i - 1), moved)?;
            }
            txn.put_address(item_address(page, len - 1), Address::NULL)?;
            txn.put_u32(page, len - 1)?;

            if len == 1 {
                let next = txn.get_address(page.offset(8))?;
                txn.put_address(link, next)?;
                txn.free(page)?;
            }
            return Ok(true);
        }
        Ok(false)
    }

    /// Frees every page and leaves the list empty. Items are not touched.
    pub fn clear(&self, txn: &mut WriteTxn<'_>) -> Result<(), StorageError> {
        for page in self.pages(txn)? {
            txn.free(page)?;
        }
        txn.put_address(self.cell, Address::NULL)
    }
}

fn page_bounds(heap: &Heap, page: Address) -> Result<(u32, u32), StorageError> {
    Ok((heap.get_u32(page)?, heap.get_u32(page.offset(4))?))
}

fn item_address(page: Address, index: u32) -> Address {
    page.offset(PAGE_HEADER_LEN + 8 * index)
}

use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::sync::OnceLock;

use byteorder::{ByteOrder, LittleEndian};
use memmap2::Mmap;

use crate::address::Address;
use crate::error::StorageError;

/// Size of one growth unit of the backing file.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// The in-memory image of a store.
///
/// Chunks that already exist on disk are faulted in lazily from a read-only
/// mapping of the file; chunks created after open live only in memory until
/// the next flush. A `Heap` is only reachable through a transaction, so every
/// accessor here runs under the store's monitor.
pub struct Heap {
    chunks: Vec<OnceLock<Box<[u8]>>>,
    dirty: Vec<bool>,
    backing: Option<Mmap>,
}

impl std::fmt::Debug for Heap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Heap")
            .field("chunks", &self.chunks.len())
            .field("mapped", &self.backing.is_some())
            .finish_non_exhaustive()
    }
}

impl Heap {
    pub(crate) fn empty() -> Self {
        Self {
            chunks: Vec::new(),
            dirty: Vec::new(),
            backing: None,
        }
    }

    pub(crate) fn mapped(backing: Mmap) -> Self {
        let count = backing.len() / CHUNK_SIZE;
        Self {
            chunks: (0..count).map(|_| OnceLock::new()).collect(),
            dirty: vec![false; count],
            backing: Some(backing),
        }
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Total addressable bytes.
    pub fn len(&self) -> u64 {
        (self.chunks.len() * CHUNK_SIZE) as u64
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn get_u8(&self, address: Address) -> Result<u8, StorageError> {
        Ok(self.slice(address, 1)?[0])
    }

    pub fn get_u16(&self, address: Address) -> Result<u16, StorageError> {
        Ok(LittleEndian::read_u16(self.slice(address, 2)?))
    }

    pub fn get_u32(&self, address: Address) -> Result<u32, StorageError> {
        Ok(LittleEndian::read_u32(self.slice(address, 4)?))
    }

    pub fn get_u64(&self, address: Address) -> Result<u64, StorageError> {
        Ok(LittleEndian::read_u64(self.slice(address, 8)?))
    }

    pub fn get_i32(&self, address: Address) -> Result<i32, StorageError> {
        Ok(LittleEndian::read_i32(self.slice(address, 4)?))
    }

    pub fn get_i64(&self, address: Address) -> Result<i64, StorageError> {
        Ok(LittleEndian::read_i64(self.slice(address, 8)?))
    }

    pub fn get_f32(&self, address: Address) -> Result<f32, StorageError> {
        Ok(LittleEndian::read_f32(self.slice(address, 4)?))
    }

    pub fn get_f64(&self, address: Address) -> Result<f64, StorageError> {
        Ok(LittleEndian::read_f64(self.slice(address, 8)?))
    }

    /// Reads a pointer-sized field and returns it as an [`Address`].
    pub fn get_address(&self, address: Address) -> Result<Address, StorageError> {
        Ok(Address::new(self.get_u64(address)?))
    }

    pub fn get_bytes(&self, address: Address, len: usize) -> Result<&[u8], StorageError> {
        self.slice(address, len)
    }

    fn slice(&self, address: Address, len: usize) -> Result<&[u8], StorageError> {
        let (index, offset) = locate(address, len, self.chunks.len())?;
        let chunk = self.chunks[index].get_or_init(|| fault_chunk(self.backing.as_ref(), index));
        Ok(&chunk[offset..offset + len])
    }

    pub(crate) fn slice_mut(&mut self, address: Address, len: usize) -> Result<&mut [u8], StorageError> {
        let (index, offset) = locate(address, len, self.chunks.len())?;
        let backing = self.backing.as_ref();
        let slot = &mut self.chunks[index];
        if slot.get().is_none() {
            let _ = slot.set(fault_chunk(backing, index));
        }
        self.dirty[index] = true;
        match slot.get_mut() {
            Some(chunk) => Ok(&mut chunk[offset..offset + len]),
            None => Err(StorageError::Corruption {
                address,
                reason: "chunk failed to load",
            }),
        }
    }

    /// Appends zero-filled chunks until `count` chunks exist.
    pub(crate) fn grow_to(&mut self, count: usize) {
        while self.chunks.len() < count {
            self.chunks
                .push(OnceLock::from(vec![0u8; CHUNK_SIZE].into_boxed_slice()));
            self.dirty.push(true);
        }
    }

    pub(crate) fn has_dirty_chunks(&self) -> bool {
        self.dirty.iter().any(|dirty| *dirty)
    }

    /// Writes every dirty chunk back to `file`.
    pub(crate) fn flush_to(&mut self, file: &mut File) -> Result<usize, StorageError> {
        let mut written = 0usize;
        for (index, dirty) in self.dirty.iter_mut().enumerate() {
            if !*dirty {
                continue;
            }
            if let Some(chunk) = self.chunks[index].get() {
                file.seek(SeekFrom::Start((index * CHUNK_SIZE) as u64))?;
                file.write_all(chunk)?;
                written += 1;
            }
            *dirty = false;
        }
        if written > 0 {
            file.sync_data()?;
        }
        Ok(written)
    }
}

fn locate(address: Address, len: usize, chunk_count: usize) -> Result<(usize, usize), StorageError> {
    let raw = address.get();
    let index = (raw / CHUNK_SIZE as u64) as usize;
    let offset = (raw % CHUNK_SIZE as u64) as usize;
    if index >= chunk_count || offset + len > CHUNK_SIZE {
        return Err(StorageError::OutOfBounds { address, len });
    }
    Ok((index, offset))
}

fn fault_chunk(backing: Option<&Mmap>, index: usize) -> Box<[u8]> {
    let mut chunk = vec![0u8; CHUNK_SIZE].into_boxed_slice();
    if let Some(map) = backing {
        let start = index * CHUNK_SIZE;
        if start < map.len() {
            let end = (start + CHUNK_SIZE).min(map.len());
            chunk[..end - start].copy_from_slice(&map[start..end]);
        }
    }
    chunk
}

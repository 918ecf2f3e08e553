//! Shared index-roots header page (§3, §6): a small dictionary from index
//! id to that index's current root page id, consulted and updated on
//! every root change.

use std::collections::HashMap;
use std::sync::Arc;

use crate::buffer::BufferPool;
use crate::error::DbError;
use crate::io::{Decodeable, Encodeable};
use crate::types::{DbResult, SmallResult};

const ROOTS_MAGIC: u32 = 0x524F4F54; // "ROOT"

pub struct IndexRoots {
    buffer_pool: Arc<BufferPool>,
    page_id: u32,
}

impl IndexRoots {
    /// Allocate a brand-new, empty roots page.
    pub fn create(buffer_pool: Arc<BufferPool>) -> DbResult<Self> {
        let (page_id, _) = buffer_pool.new_page()?;
        buffer_pool.write_page(page_id, Self::encode(&HashMap::new()))?;
        buffer_pool.unpin_page(page_id, true)?;
        Ok(Self { buffer_pool, page_id })
    }

    /// Reattach to a roots page already on disk at `page_id`.
    pub fn open(buffer_pool: Arc<BufferPool>, page_id: u32) -> Self {
        Self { buffer_pool, page_id }
    }

    pub fn page_id(&self) -> u32 {
        self.page_id
    }

    fn decode(data: &[u8]) -> DbResult<HashMap<u32, u32>> {
        let mut cursor = std::io::Cursor::new(data);
        let magic = u32::decode_from(&mut cursor);
        if magic != ROOTS_MAGIC {
            return Err(DbError::corruption("index roots page magic mismatch"));
        }
        let count = u32::decode_from(&mut cursor);
        let mut map = HashMap::with_capacity(count as usize);
        for _ in 0..count {
            let index_id = u32::decode_from(&mut cursor);
            let root_id = u32::decode_from(&mut cursor);
            map.insert(index_id, root_id);
        }
        Ok(map)
    }

    fn encode(map: &HashMap<u32, u32>) -> Vec<u8> {
        let mut buf = ROOTS_MAGIC.encode();
        buf.extend((map.len() as u32).encode());
        for (&index_id, &root_id) in map {
            buf.extend(index_id.encode());
            buf.extend(root_id.encode());
        }
        buf.resize(crate::disk::PAGE_SIZE, 0);
        buf
    }

    /// Fetch, decode, optionally mutate and persist, all under one pin so
    /// the page can never be evicted out from under a read-modify-write.
    fn with_map<T>(&self, f: impl FnOnce(&mut HashMap<u32, u32>) -> T, persist: bool) -> DbResult<T> {
        let data = self.buffer_pool.fetch_page(self.page_id)?;
        let mut map = match Self::decode(&data) {
            Ok(m) => m,
            Err(e) => {
                self.buffer_pool.unpin_page(self.page_id, false)?;
                return Err(e);
            }
        };
        let result = f(&mut map);
        if persist {
            self.buffer_pool.write_page(self.page_id, Self::encode(&map))?;
        }
        self.buffer_pool.unpin_page(self.page_id, persist)?;
        Ok(result)
    }

    pub fn get(&self, index_id: u32) -> DbResult<Option<u32>> {
        self.with_map(|map| map.get(&index_id).copied(), false)
    }

    pub fn set(&self, index_id: u32, root_id: u32) -> SmallResult {
        self.with_map(|map| map.insert(index_id, root_id), true).map(|_| ())
    }

    pub fn remove(&self, index_id: u32) -> SmallResult {
        self.with_map(|map| map.remove(&index_id), true).map(|_| ())
    }
}

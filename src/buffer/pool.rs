//! Pin-counted buffer pool (§4.3).
//!
//! The teacher's own buffer pools (`btree/buffer_pool.rs`, `bufferpool.rs`,
//! `btree/page_cache.rs`) cache every page forever and never evict, which
//! doesn't give callers a real pin/replacer contract to honor. This is
//! rewritten to actually evict, but keeps the teacher's shape: a `HashMap`
//! frame table behind a single mutex, `log::debug!` tracing at fetch/unpin/
//! flush, and a `Database`/`Unique`-style global accessor in
//! [`crate::database`].

use std::collections::HashMap;
use std::sync::Mutex;

use crate::buffer::replacer::{ClockReplacer, FrameId, LruReplacer, Replacer};
use crate::disk::manager::DiskManager;
use crate::disk::PAGE_SIZE;
use crate::error::DbError;
use crate::types::DbResult;

/// Which eviction policy to back a pool with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplacerPolicy {
    Lru,
    Clock,
}

struct Frame {
    page_id: Option<u32>,
    data: Vec<u8>,
    pin_count: u32,
    dirty: bool,
}

impl Frame {
    fn empty() -> Self {
        Self {
            page_id: None,
            data: vec![0u8; PAGE_SIZE],
            pin_count: 0,
            dirty: false,
        }
    }
}

struct Inner {
    frames: Vec<Frame>,
    page_table: HashMap<u32, FrameId>,
    free_list: Vec<FrameId>,
    replacer: Box<dyn Replacer>,
}

/// Fixed-capacity pool of page-sized frames, fronting a [`DiskManager`].
///
/// Every fetched page is pinned; callers must [`BufferPool::unpin`] it
/// exactly once per successful fetch/new before it becomes eligible for
/// eviction.
pub struct BufferPool {
    disk: DiskManager,
    inner: Mutex<Inner>,
}

impl BufferPool {
    pub fn new(disk: DiskManager, capacity: usize, policy: ReplacerPolicy) -> Self {
        let replacer: Box<dyn Replacer> = match policy {
            ReplacerPolicy::Lru => Box::new(LruReplacer::new(capacity)),
            ReplacerPolicy::Clock => Box::new(ClockReplacer::new(capacity)),
        };
        let frames = (0..capacity).map(|_| Frame::empty()).collect();
        Self {
            disk,
            inner: Mutex::new(Inner {
                frames,
                page_table: HashMap::new(),
                free_list: (0..capacity).collect(),
                replacer,
            }),
        }
    }

    pub fn disk(&self) -> &DiskManager {
        &self.disk
    }

    /// Find a frame for `page_id`: free list first, then the replacer's
    /// victim, evicting (and flushing, if dirty) whatever it held.
    fn allocate_frame(&self, inner: &mut Inner) -> DbResult<FrameId> {
        if let Some(frame_id) = inner.free_list.pop() {
            return Ok(frame_id);
        }

        let frame_id = inner.replacer.victim().ok_or(DbError::OutOfMemory)?;
        let victim_page_id = inner.frames[frame_id].page_id;
        if let Some(old_id) = victim_page_id {
            if inner.frames[frame_id].dirty {
                self.disk.write_page(old_id, &inner.frames[frame_id].data)?;
            }
            inner.page_table.remove(&old_id);
            log::debug!("buffer pool evicted page {} from frame {}", old_id, frame_id);
        }
        Ok(frame_id)
    }

    /// Fetch `page_id`, pinning it. The caller owns exactly one pin per
    /// successful call and must [`BufferPool::unpin`] it later.
    pub fn fetch_page(&self, page_id: u32) -> DbResult<Vec<u8>> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(&frame_id) = inner.page_table.get(&page_id) {
            inner.frames[frame_id].pin_count += 1;
            inner.replacer.pin(frame_id);
            log::debug!("buffer pool hit page {} in frame {}", page_id, frame_id);
            return Ok(inner.frames[frame_id].data.clone());
        }

        let frame_id = self.allocate_frame(&mut inner)?;
        let data = self.disk.read_page(page_id)?;
        inner.frames[frame_id] = Frame {
            page_id: Some(page_id),
            data: data.clone(),
            pin_count: 1,
            dirty: false,
        };
        inner.page_table.insert(page_id, frame_id);
        inner.replacer.pin(frame_id);
        log::debug!("buffer pool loaded page {} into frame {}", page_id, frame_id);
        Ok(data)
    }

    /// Allocate a brand-new page on disk and pin it in the pool, zero-filled.
    pub fn new_page(&self) -> DbResult<(u32, Vec<u8>)> {
        let page_id = self.disk.allocate_page()?;
        let mut inner = self.inner.lock().unwrap();
        let frame_id = self.allocate_frame(&mut inner)?;
        let data = vec![0u8; PAGE_SIZE];
        inner.frames[frame_id] = Frame {
            page_id: Some(page_id),
            data: data.clone(),
            pin_count: 1,
            dirty: true,
        };
        inner.page_table.insert(page_id, frame_id);
        inner.replacer.pin(frame_id);
        log::debug!("buffer pool created page {} in frame {}", page_id, frame_id);
        Ok((page_id, data))
    }

    /// Unpin `page_id`. `is_dirty` is sticky: once true for a frame it stays
    /// true until the page is flushed.
    pub fn unpin_page(&self, page_id: u32, is_dirty: bool) -> DbResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let frame_id = *inner
            .page_table
            .get(&page_id)
            .ok_or_else(|| DbError::not_found(format!("page {} not in buffer pool", page_id)))?;

        let frame = &mut inner.frames[frame_id];
        if frame.pin_count == 0 {
            return Err(DbError::corruption(format!(
                "page {} unpinned with pin count already zero",
                page_id
            )));
        }
        frame.dirty |= is_dirty;
        frame.pin_count -= 1;
        if frame.pin_count == 0 {
            inner.replacer.unpin(frame_id);
        }
        Ok(())
    }

    /// Overwrite the in-memory contents of a pinned page (the write does
    /// not touch disk until it's evicted or explicitly flushed).
    pub fn write_page(&self, page_id: u32, data: Vec<u8>) -> DbResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let frame_id = *inner
            .page_table
            .get(&page_id)
            .ok_or_else(|| DbError::not_found(format!("page {} not in buffer pool", page_id)))?;
        let frame = &mut inner.frames[frame_id];
        frame.data = data;
        frame.dirty = true;
        Ok(())
    }

    pub fn flush_page(&self, page_id: u32) -> DbResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let frame_id = *inner
            .page_table
            .get(&page_id)
            .ok_or_else(|| DbError::not_found(format!("page {} not in buffer pool", page_id)))?;
        self.disk.write_page(page_id, &inner.frames[frame_id].data)?;
        inner.frames[frame_id].dirty = false;
        Ok(())
    }

    pub fn flush_all(&self) -> DbResult<()> {
        let page_ids: Vec<u32> = {
            let inner = self.inner.lock().unwrap();
            inner.page_table.keys().copied().collect()
        };
        for page_id in page_ids {
            self.flush_page(page_id)?;
        }
        Ok(())
    }

    /// Remove a page from the pool and free it on disk. Fails if it is
    /// still pinned.
    pub fn delete_page(&self, page_id: u32) -> DbResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(&frame_id) = inner.page_table.get(&page_id) {
            if inner.frames[frame_id].pin_count > 0 {
                return Err(DbError::conflict(format!("page {} is still pinned", page_id)));
            }
            inner.page_table.remove(&page_id);
            inner.replacer.pin(frame_id);
            inner.frames[frame_id] = Frame::empty();
            inner.free_list.push(frame_id);
        }
        drop(inner);
        self.disk.deallocate_page(page_id)
    }

    /// Debug invariant check: true iff no resident frame is still pinned.
    /// Intended for test assertions after an operation that should have
    /// released every pin it took (e.g. an index scan running to completion).
    pub fn all_unpinned(&self) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.frames.iter().all(|f| f.pin_count == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool_with(policy: ReplacerPolicy, capacity: usize) -> (BufferPool, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let disk = DiskManager::open(dir.path().join("test.db")).unwrap();
        (BufferPool::new(disk, capacity, policy), dir)
    }

    #[test]
    fn new_page_round_trips_through_eviction() {
        let (pool, _dir) = pool_with(ReplacerPolicy::Lru, 1);
        let (id_a, mut data_a) = pool.new_page().unwrap();
        data_a[0] = 42;
        pool.write_page(id_a, data_a).unwrap();
        pool.unpin_page(id_a, true).unwrap();

        // second page forces frame 0's eviction since capacity is 1
        let (id_b, _) = pool.new_page().unwrap();
        pool.unpin_page(id_b, false).unwrap();

        let read_back = pool.fetch_page(id_a).unwrap();
        assert_eq!(read_back[0], 42);
        pool.unpin_page(id_a, false).unwrap();
    }

    #[test]
    fn out_of_memory_when_all_frames_pinned() {
        let (pool, _dir) = pool_with(ReplacerPolicy::Clock, 2);
        let (a, _) = pool.new_page().unwrap();
        let (b, _) = pool.new_page().unwrap();
        let err = pool.new_page();
        assert!(matches!(err, Err(DbError::OutOfMemory)));
        pool.unpin_page(a, false).unwrap();
        pool.unpin_page(b, false).unwrap();
    }

    #[test]
    fn delete_rejects_pinned_page() {
        let (pool, _dir) = pool_with(ReplacerPolicy::Lru, 2);
        let (id, _) = pool.new_page().unwrap();
        assert!(pool.delete_page(id).is_err());
        pool.unpin_page(id, false).unwrap();
        assert!(pool.delete_page(id).is_ok());
    }
}

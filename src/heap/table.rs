//! Linked list of slotted pages with insert/update/delete and a forward
//! iterator (§4.6).

use std::sync::Arc;

use crate::buffer::BufferPool;
use crate::error::DbError;
use crate::heap::page::{HeapPage, NO_PAGE};
use crate::record::{Row, RowId, Schema};
use crate::types::{DbResult, SmallResult};

pub struct TableHeap {
    pub first_page_id: u32,
    buffer_pool: Arc<BufferPool>,
    schema: Schema,
}

impl TableHeap {
    /// Allocate the first page and start a brand-new heap.
    pub fn new(buffer_pool: Arc<BufferPool>, schema: Schema) -> DbResult<Self> {
        let (page_id, _) = buffer_pool.new_page()?;
        let page = HeapPage::new(page_id);
        buffer_pool.write_page(page_id, page.to_bytes())?;
        buffer_pool.unpin_page(page_id, true)?;
        Ok(Self {
            first_page_id: page_id,
            buffer_pool,
            schema,
        })
    }

    /// Reattach to an existing heap whose first page is already on disk
    /// (used by the catalog when reloading a table on open).
    pub fn open(buffer_pool: Arc<BufferPool>, first_page_id: u32, schema: Schema) -> Self {
        Self {
            first_page_id,
            buffer_pool,
            schema,
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Walk the page chain, inserting into the first page with room;
    /// allocate and link a new page if none accepts it.
    pub fn insert_tuple(&self, row: &mut Row) -> SmallResult {
        let bytes = row.encode(&self.schema);
        if bytes.len() > HeapPage::capacity_for_fresh_tuple() {
            return Err(DbError::corruption(
                "tuple is larger than a page can ever hold",
            ));
        }

        let mut page_id = self.first_page_id;
        loop {
            let data = self.buffer_pool.fetch_page(page_id)?;
            let mut page = HeapPage::from_bytes(page_id, &data);

            if let Some(slot) = page.insert(&bytes) {
                self.buffer_pool.write_page(page_id, page.to_bytes())?;
                self.buffer_pool.unpin_page(page_id, true)?;
                row.rid = RowId::new(page_id, slot);
                return Ok(());
            }

            if page.next_page_id == NO_PAGE {
                let (new_page_id, _) = self.buffer_pool.new_page()?;
                page.next_page_id = new_page_id;
                self.buffer_pool.write_page(page_id, page.to_bytes())?;
                self.buffer_pool.unpin_page(page_id, true)?;

                let new_page = HeapPage::new(new_page_id);
                self.buffer_pool
                    .write_page(new_page_id, new_page.to_bytes())?;
                self.buffer_pool.unpin_page(new_page_id, true)?;
                page_id = new_page_id;
            } else {
                let next = page.next_page_id;
                self.buffer_pool.unpin_page(page_id, false)?;
                page_id = next;
            }
        }
    }

    /// In-place update when the new encoding fits the old slot; otherwise
    /// mark-delete the old tuple, insert the new one, and roll back the
    /// mark-delete if that insert fails.
    pub fn update_tuple(&self, new_row: &mut Row, rid: RowId) -> SmallResult {
        let data = self.buffer_pool.fetch_page(rid.page_id)?;
        let mut page = HeapPage::from_bytes(rid.page_id, &data);
        if !page.is_live(rid.slot) {
            self.buffer_pool.unpin_page(rid.page_id, false)?;
            return Err(DbError::not_found(format!("row {:?}", rid)));
        }

        let new_bytes = new_row.encode(&self.schema);
        if page.update_in_place(rid.slot, &new_bytes) {
            self.buffer_pool.write_page(rid.page_id, page.to_bytes())?;
            self.buffer_pool.unpin_page(rid.page_id, true)?;
            new_row.rid = rid;
            return Ok(());
        }

        page.mark_delete(rid.slot);
        self.buffer_pool.write_page(rid.page_id, page.to_bytes())?;
        self.buffer_pool.unpin_page(rid.page_id, true)?;

        match self.insert_tuple(new_row) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.rollback_delete(rid)?;
                Err(e)
            }
        }
    }

    pub fn mark_delete(&self, rid: RowId) -> SmallResult {
        self.with_slot(rid, |page| page.mark_delete(rid.slot))
    }

    pub fn apply_delete(&self, rid: RowId) -> SmallResult {
        self.with_slot(rid, |page| page.apply_delete(rid.slot))
    }

    pub fn rollback_delete(&self, rid: RowId) -> SmallResult {
        self.with_slot(rid, |page| page.rollback_delete(rid.slot))
    }

    fn with_slot(&self, rid: RowId, op: impl FnOnce(&mut HeapPage) -> bool) -> SmallResult {
        let data = self.buffer_pool.fetch_page(rid.page_id)?;
        let mut page = HeapPage::from_bytes(rid.page_id, &data);
        if !op(&mut page) {
            self.buffer_pool.unpin_page(rid.page_id, false)?;
            return Err(DbError::not_found(format!("row {:?}", rid)));
        }
        self.buffer_pool.write_page(rid.page_id, page.to_bytes())?;
        self.buffer_pool.unpin_page(rid.page_id, true)
    }

    pub fn get_tuple(&self, rid: RowId) -> DbResult<Row> {
        let data = self.buffer_pool.fetch_page(rid.page_id)?;
        let page = HeapPage::from_bytes(rid.page_id, &data);
        let result = match page.read(rid.slot) {
            Some(bytes) => {
                let mut cursor = std::io::Cursor::new(bytes.to_vec());
                Row::decode(&mut cursor, &self.schema)
            }
            None => Err(DbError::not_found(format!("row {:?}", rid))),
        };
        self.buffer_pool.unpin_page(rid.page_id, false)?;
        result
    }

    pub fn iter(&self) -> TableIter<'_> {
        TableIter {
            heap: self,
            page_id: self.first_page_id,
            slot: None,
            finished: false,
        }
    }
}

/// Holds (heap, current page id, current slot); advances within a page,
/// then follows `next_page_id` until it finds a live tuple or the chain
/// ends.
pub struct TableIter<'a> {
    heap: &'a TableHeap,
    page_id: u32,
    slot: Option<u32>,
    finished: bool,
}

impl<'a> Iterator for TableIter<'a> {
    type Item = DbResult<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.finished {
                return None;
            }
            let data = match self.heap.buffer_pool.fetch_page(self.page_id) {
                Ok(d) => d,
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e));
                }
            };
            let page = HeapPage::from_bytes(self.page_id, &data);

            let candidate = match self.slot {
                None => page.first_live_slot(),
                Some(s) => page.next_live_slot(s),
            };

            if let Some(slot) = candidate {
                self.slot = Some(slot);
                let bytes = page.read(slot).expect("slot reported live but unreadable").to_vec();
                let _ = self.heap.buffer_pool.unpin_page(self.page_id, false);
                let mut cursor = std::io::Cursor::new(bytes);
                return Some(Row::decode(&mut cursor, &self.heap.schema));
            }

            let next_page_id = page.next_page_id;
            let _ = self.heap.buffer_pool.unpin_page(self.page_id, false);
            if next_page_id == NO_PAGE {
                self.finished = true;
                return None;
            }
            self.page_id = next_page_id;
            self.slot = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::ReplacerPolicy;
    use crate::disk::DiskManager;
    use crate::record::{Column, ColumnType, Field};

    fn test_heap() -> (TableHeap, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let disk = DiskManager::open(dir.path().join("test.db")).unwrap();
        let pool = Arc::new(BufferPool::new(disk, 16, ReplacerPolicy::Clock));
        let schema = Schema::new(vec![Column::new("id", ColumnType::Int32, 0, false, true)]);
        let heap = TableHeap::new(pool, schema).unwrap();
        (heap, dir)
    }

    #[test]
    fn insert_and_get_round_trip() {
        let (heap, _dir) = test_heap();
        let mut row = Row::new(RowId::new(0, 0), vec![Field::Int32(42)]);
        heap.insert_tuple(&mut row).unwrap();
        let fetched = heap.get_tuple(row.rid).unwrap();
        assert_eq!(fetched.fields, vec![Field::Int32(42)]);
    }

    #[test]
    fn iterator_visits_every_live_tuple_once_in_order() {
        let (heap, _dir) = test_heap();
        let mut rids = Vec::new();
        for i in 0..50 {
            let mut row = Row::new(RowId::new(0, 0), vec![Field::Int32(i)]);
            heap.insert_tuple(&mut row).unwrap();
            rids.push(row.rid);
        }
        let values: Vec<i32> = heap
            .iter()
            .map(|r| r.unwrap().fields[0].as_i32().unwrap())
            .collect();
        assert_eq!(values, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn delete_then_iterate_skips_the_row() {
        let (heap, _dir) = test_heap();
        let mut a = Row::new(RowId::new(0, 0), vec![Field::Int32(1)]);
        let mut b = Row::new(RowId::new(0, 0), vec![Field::Int32(2)]);
        heap.insert_tuple(&mut a).unwrap();
        heap.insert_tuple(&mut b).unwrap();

        heap.mark_delete(a.rid).unwrap();
        heap.apply_delete(a.rid).unwrap();

        let values: Vec<i32> = heap
            .iter()
            .map(|r| r.unwrap().fields[0].as_i32().unwrap())
            .collect();
        assert_eq!(values, vec![2]);
    }

    #[test]
    fn update_falls_back_to_mark_and_reinsert_when_it_does_not_fit() {
        let dir = tempfile::tempdir().unwrap();
        let disk = DiskManager::open(dir.path().join("test.db")).unwrap();
        let pool = Arc::new(BufferPool::new(disk, 16, ReplacerPolicy::Clock));
        let schema = Schema::new(vec![
            Column::new("id", ColumnType::Int32, 0, false, true),
            Column::new("note", ColumnType::Char(8), 1, true, false),
        ]);
        let heap = TableHeap::new(pool, schema).unwrap();

        // a null `note` costs zero bytes, so the slot's reserved capacity
        // is too small for a later non-null value of the same column.
        let mut row = Row::new(RowId::new(0, 0), vec![Field::Int32(1), Field::Null]);
        heap.insert_tuple(&mut row).unwrap();
        let old_rid = row.rid;

        let mut updated = Row::new(
            RowId::new(0, 0),
            vec![Field::Int32(1), Field::Char("grown".to_string())],
        );
        heap.update_tuple(&mut updated, old_rid).unwrap();
        assert_ne!(updated.rid, old_rid, "update should have re-inserted elsewhere");

        // the old slot is tombstoned and no longer readable
        assert!(heap.get_tuple(old_rid).is_err());
        let fetched = heap.get_tuple(updated.rid).unwrap();
        assert_eq!(fetched.fields[1], Field::Char("grown".to_string()));
    }

    #[test]
    fn update_in_place_when_it_fits() {
        let (heap, _dir) = test_heap();
        let mut row = Row::new(RowId::new(0, 0), vec![Field::Int32(1)]);
        heap.insert_tuple(&mut row).unwrap();
        let old_rid = row.rid;

        let mut updated = Row::new(RowId::new(0, 0), vec![Field::Int32(99)]);
        heap.update_tuple(&mut updated, old_rid).unwrap();
        assert_eq!(updated.rid, old_rid);

        let fetched = heap.get_tuple(old_rid).unwrap();
        assert_eq!(fetched.fields, vec![Field::Int32(99)]);
    }

    #[test]
    fn random_inserts_and_deletes_survive_a_full_shuffle() {
        use rand::seq::SliceRandom;
        use rand::Rng;

        let (heap, _dir) = test_heap();
        let mut rng = rand::thread_rng();
        let mut live = Vec::new();
        for _ in 0..300 {
            let value: i32 = rng.gen();
            let mut row = Row::new(RowId::new(0, 0), vec![Field::Int32(value)]);
            heap.insert_tuple(&mut row).unwrap();
            live.push((row.rid, value));
        }

        live.shuffle(&mut rng);
        let (deleted, kept): (Vec<_>, Vec<_>) = live.into_iter().partition(|_| rng.gen_bool(0.4));
        for (rid, _) in &deleted {
            heap.mark_delete(*rid).unwrap();
            heap.apply_delete(*rid).unwrap();
        }

        let mut remaining: Vec<i32> = heap.iter().map(|r| r.unwrap().fields[0].as_i32().unwrap()).collect();
        let mut expected: Vec<i32> = kept.into_iter().map(|(_, v)| v).collect();
        remaining.sort_unstable();
        expected.sort_unstable();
        assert_eq!(remaining, expected);
    }
}

//! Slotted page layout for table heap data pages (§3, §4.6).
//!
//! Slots live in a directory that grows forward from the header; tuple
//! bytes are packed from the end of the page backward. A slot is reused by
//! insert once it carries no live tuple and its capacity is large enough;
//! `apply_delete` is the only path that permanently frees a slot's bytes,
//! matching the "mark, then reclaim" two-step the table heap leans on for
//! `UpdateTuple`.

use crate::disk::PAGE_SIZE;

const HEADER_SIZE: usize = 4 + 4 + 2 + 2;
const SLOT_SIZE: usize = 2 + 2 + 2 + 1;

pub const NO_PAGE: u32 = u32::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotStatus {
    Empty,
    Live,
    Deleted,
}

impl SlotStatus {
    fn to_byte(self) -> u8 {
        match self {
            SlotStatus::Empty => 0,
            SlotStatus::Live => 1,
            SlotStatus::Deleted => 2,
        }
    }

    fn from_byte(b: u8) -> Self {
        match b {
            0 => SlotStatus::Empty,
            1 => SlotStatus::Live,
            2 => SlotStatus::Deleted,
            _ => panic!("invalid slot status byte {}", b),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    offset: u16,
    capacity: u16,
    len: u16,
    status: SlotStatus,
}

/// One slotted data page of a table heap, held entirely in memory as the
/// raw bytes the buffer pool hands back.
pub struct HeapPage {
    pub page_id: u32,
    pub next_page_id: u32,
    slots: Vec<Slot>,
    free_space_offset: u16,
    data: Vec<u8>,
}

impl HeapPage {
    pub fn new(page_id: u32) -> Self {
        Self {
            page_id,
            next_page_id: NO_PAGE,
            slots: Vec::new(),
            free_space_offset: PAGE_SIZE as u16,
            data: vec![0u8; PAGE_SIZE],
        }
    }

    pub fn from_bytes(page_id: u32, bytes: &[u8]) -> Self {
        debug_assert_eq!(bytes.len(), PAGE_SIZE);
        let next_page_id = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
        let num_slots = u16::from_le_bytes(bytes[8..10].try_into().unwrap()) as usize;
        let free_space_offset = u16::from_le_bytes(bytes[10..12].try_into().unwrap());

        let mut slots = Vec::with_capacity(num_slots);
        for i in 0..num_slots {
            let base = HEADER_SIZE + i * SLOT_SIZE;
            let offset = u16::from_le_bytes(bytes[base..base + 2].try_into().unwrap());
            let capacity = u16::from_le_bytes(bytes[base + 2..base + 4].try_into().unwrap());
            let len = u16::from_le_bytes(bytes[base + 4..base + 6].try_into().unwrap());
            let status = SlotStatus::from_byte(bytes[base + 6]);
            slots.push(Slot {
                offset,
                capacity,
                len,
                status,
            });
        }

        Self {
            page_id,
            next_page_id,
            slots,
            free_space_offset,
            data: bytes.to_vec(),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = self.data.clone();
        buf[0..4].copy_from_slice(&self.page_id.to_le_bytes());
        buf[4..8].copy_from_slice(&self.next_page_id.to_le_bytes());
        buf[8..10].copy_from_slice(&(self.slots.len() as u16).to_le_bytes());
        buf[10..12].copy_from_slice(&self.free_space_offset.to_le_bytes());
        for (i, slot) in self.slots.iter().enumerate() {
            let base = HEADER_SIZE + i * SLOT_SIZE;
            buf[base..base + 2].copy_from_slice(&slot.offset.to_le_bytes());
            buf[base + 2..base + 4].copy_from_slice(&slot.capacity.to_le_bytes());
            buf[base + 4..base + 6].copy_from_slice(&slot.len.to_le_bytes());
            buf[base + 6] = slot.status.to_byte();
        }
        buf
    }

    fn directory_end(&self, num_slots: usize) -> usize {
        HEADER_SIZE + num_slots * SLOT_SIZE
    }

    fn free_bytes(&self) -> usize {
        (self.free_space_offset as usize).saturating_sub(self.directory_end(self.slots.len()))
    }

    /// Insert `bytes`, reusing a deleted slot of sufficient capacity before
    /// appending a new one. Returns the slot number, or `None` if it does
    /// not fit.
    pub fn insert(&mut self, bytes: &[u8]) -> Option<u32> {
        let needed = bytes.len();

        for (i, slot) in self.slots.iter_mut().enumerate() {
            if slot.status == SlotStatus::Empty && slot.capacity as usize >= needed {
                let offset = slot.offset as usize;
                self.data[offset..offset + needed].copy_from_slice(bytes);
                slot.len = needed as u16;
                slot.status = SlotStatus::Live;
                return Some(i as u32);
            }
        }

        let directory_end_with_new_slot = self.directory_end(self.slots.len() + 1);
        if (self.free_space_offset as usize).saturating_sub(directory_end_with_new_slot) < needed {
            return None;
        }

        let new_offset = self.free_space_offset as usize - needed;
        self.data[new_offset..new_offset + needed].copy_from_slice(bytes);
        self.slots.push(Slot {
            offset: new_offset as u16,
            capacity: needed as u16,
            len: needed as u16,
            status: SlotStatus::Live,
        });
        self.free_space_offset = new_offset as u16;
        Some((self.slots.len() - 1) as u32)
    }

    /// In-place update; succeeds only if `bytes` fits within the slot's
    /// existing reserved capacity.
    pub fn update_in_place(&mut self, slot_num: u32, bytes: &[u8]) -> bool {
        let slot = match self.slots.get_mut(slot_num as usize) {
            Some(s) if s.status == SlotStatus::Live => s,
            _ => return false,
        };
        if bytes.len() > slot.capacity as usize {
            return false;
        }
        let offset = slot.offset as usize;
        self.data[offset..offset + bytes.len()].copy_from_slice(bytes);
        slot.len = bytes.len() as u16;
        true
    }

    pub fn mark_delete(&mut self, slot_num: u32) -> bool {
        match self.slots.get_mut(slot_num as usize) {
            Some(s) if s.status == SlotStatus::Live => {
                s.status = SlotStatus::Deleted;
                true
            }
            _ => false,
        }
    }

    pub fn rollback_delete(&mut self, slot_num: u32) -> bool {
        match self.slots.get_mut(slot_num as usize) {
            Some(s) if s.status == SlotStatus::Deleted => {
                s.status = SlotStatus::Live;
                true
            }
            _ => false,
        }
    }

    /// Permanently free a tombstoned slot's capacity for reuse.
    pub fn apply_delete(&mut self, slot_num: u32) -> bool {
        match self.slots.get_mut(slot_num as usize) {
            Some(s) if s.status == SlotStatus::Deleted => {
                s.status = SlotStatus::Empty;
                s.len = 0;
                true
            }
            _ => false,
        }
    }

    pub fn is_live(&self, slot_num: u32) -> bool {
        matches!(self.slots.get(slot_num as usize), Some(s) if s.status == SlotStatus::Live)
    }

    pub fn read(&self, slot_num: u32) -> Option<&[u8]> {
        let slot = self.slots.get(slot_num as usize)?;
        if slot.status != SlotStatus::Live {
            return None;
        }
        let offset = slot.offset as usize;
        Some(&self.data[offset..offset + slot.len as usize])
    }

    pub fn num_slots(&self) -> u32 {
        self.slots.len() as u32
    }

    pub fn first_live_slot(&self) -> Option<u32> {
        self.slots
            .iter()
            .position(|s| s.status == SlotStatus::Live)
            .map(|i| i as u32)
    }

    pub fn next_live_slot(&self, after: u32) -> Option<u32> {
        self.slots
            .iter()
            .enumerate()
            .skip(after as usize + 1)
            .find(|(_, s)| s.status == SlotStatus::Live)
            .map(|(i, _)| i as u32)
    }

    /// Maximum tuple size this page could ever host, used by the heap to
    /// short-circuit an insert attempt that could never fit even on an
    /// empty page.
    pub fn capacity_for_fresh_tuple() -> usize {
        PAGE_SIZE - HEADER_SIZE - SLOT_SIZE
    }

    #[cfg(test)]
    fn free_bytes_pub(&self) -> usize {
        self.free_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_read_round_trip() {
        let mut page = HeapPage::new(0);
        let slot = page.insert(b"hello").unwrap();
        assert_eq!(page.read(slot), Some(&b"hello"[..]));
    }

    #[test]
    fn mark_delete_then_rollback_restores_tuple() {
        let mut page = HeapPage::new(0);
        let slot = page.insert(b"hello").unwrap();
        assert!(page.mark_delete(slot));
        assert_eq!(page.read(slot), None);
        assert!(page.rollback_delete(slot));
        assert_eq!(page.read(slot), Some(&b"hello"[..]));
    }

    #[test]
    fn apply_delete_frees_slot_for_reuse_by_a_smaller_tuple() {
        let mut page = HeapPage::new(0);
        let slot = page.insert(b"hello world").unwrap();
        page.mark_delete(slot);
        page.apply_delete(slot);
        assert_eq!(page.read(slot), None);

        let reused = page.insert(b"hi").unwrap();
        assert_eq!(reused, slot);
        assert_eq!(page.read(slot), Some(&b"hi"[..]));
    }

    #[test]
    fn update_in_place_respects_original_capacity() {
        let mut page = HeapPage::new(0);
        let slot = page.insert(b"hello").unwrap();
        assert!(page.update_in_place(slot, b"hi"));
        assert_eq!(page.read(slot), Some(&b"hi"[..]));
        assert!(!page.update_in_place(slot, b"way too long for this slot"));
    }

    #[test]
    fn page_to_bytes_round_trips_through_from_bytes() {
        let mut page = HeapPage::new(3);
        page.next_page_id = 9;
        page.insert(b"a").unwrap();
        page.insert(b"bb").unwrap();
        let bytes = page.to_bytes();
        let reloaded = HeapPage::from_bytes(3, &bytes);
        assert_eq!(reloaded.next_page_id, 9);
        assert_eq!(reloaded.read(0), Some(&b"a"[..]));
        assert_eq!(reloaded.read(1), Some(&b"bb"[..]));
        assert_eq!(reloaded.free_bytes_pub(), page.free_bytes_pub());
    }
}

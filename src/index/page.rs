//! B+-tree leaf and internal page layouts (§3, §4.7).
//!
//! Both page kinds share a common header (type, id, parent id, size, max
//! size, key type, lsn) per the "tagged variant on a common header" design
//! note; dispatch happens on the type tag rather than through a trait
//! object hierarchy.

use crate::record::field::Field;
use crate::record::row::RowId;
use crate::record::types::ColumnType;

pub const NO_PAGE: u32 = u32::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageType {
    Leaf,
    Internal,
}

const HEADER_LEN: usize = 1 + 4 + 4 + 2 + 2 + 2 + 8;

fn write_common_header(
    buf: &mut Vec<u8>,
    page_type: PageType,
    page_id: u32,
    parent_id: u32,
    size: u16,
    max_size: u16,
    key_type: ColumnType,
    lsn: u64,
) {
    buf.push(match page_type {
        PageType::Leaf => 0,
        PageType::Internal => 1,
    });
    buf.extend(page_id.to_le_bytes());
    buf.extend(parent_id.to_le_bytes());
    buf.extend(size.to_le_bytes());
    buf.extend(max_size.to_le_bytes());
    buf.push(key_type.tag());
    buf.push(key_type.size() as u8);
    buf.extend(lsn.to_le_bytes());
}

struct CommonHeader {
    page_type: PageType,
    page_id: u32,
    parent_id: u32,
    size: u16,
    max_size: u16,
    key_type: ColumnType,
    lsn: u64,
}

fn read_common_header(bytes: &[u8]) -> CommonHeader {
    let page_type = match bytes[0] {
        0 => PageType::Leaf,
        1 => PageType::Internal,
        other => panic!("invalid b+-tree page type tag {}", other),
    };
    let page_id = u32::from_le_bytes(bytes[1..5].try_into().unwrap());
    let parent_id = u32::from_le_bytes(bytes[5..9].try_into().unwrap());
    let size = u16::from_le_bytes(bytes[9..11].try_into().unwrap());
    let max_size = u16::from_le_bytes(bytes[11..13].try_into().unwrap());
    let key_type = ColumnType::from_tag(bytes[13], bytes[14]).expect("invalid key type tag");
    let lsn = u64::from_le_bytes(bytes[15..23].try_into().unwrap());
    CommonHeader {
        page_type,
        page_id,
        parent_id,
        size,
        max_size,
        key_type,
        lsn,
    }
}

fn encode_key(buf: &mut Vec<u8>, key: &Field, key_type: ColumnType) {
    buf.extend(key.encode_value(key_type));
}

fn decode_key(bytes: &[u8], key_type: ColumnType) -> Field {
    let mut cursor = std::io::Cursor::new(bytes);
    Field::decode_value(&mut cursor, key_type)
}

/// ⌈max/2⌉, the minimum occupancy for any non-root node.
pub fn min_size(max_size: usize) -> usize {
    (max_size + 1) / 2
}

#[derive(Debug, Clone)]
pub struct LeafPage {
    pub page_id: u32,
    pub parent_id: u32,
    pub max_size: usize,
    pub key_type: ColumnType,
    pub lsn: u64,
    pub next_page_id: u32,
    entries: Vec<(Field, RowId)>,
}

impl LeafPage {
    pub fn new(page_id: u32, max_size: usize, key_type: ColumnType) -> Self {
        Self {
            page_id,
            parent_id: NO_PAGE,
            max_size,
            key_type,
            lsn: 0,
            next_page_id: NO_PAGE,
            entries: Vec::new(),
        }
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() > self.max_size
    }

    pub fn entries(&self) -> &[(Field, RowId)] {
        &self.entries
    }

    pub fn key_at(&self, i: usize) -> &Field {
        &self.entries[i].0
    }

    pub fn value_at(&self, i: usize) -> RowId {
        self.entries[i].1
    }

    /// Insert in key order. Rejects duplicate keys.
    pub fn insert(&mut self, key: Field, value: RowId) -> bool {
        match self.entries.binary_search_by(|(k, _)| k.cmp(&key)) {
            Ok(_) => false,
            Err(pos) => {
                self.entries.insert(pos, (key, value));
                true
            }
        }
    }

    pub fn get(&self, key: &Field) -> Option<RowId> {
        self.entries
            .binary_search_by(|(k, _)| k.cmp(key))
            .ok()
            .map(|i| self.entries[i].1)
    }

    pub fn remove(&mut self, key: &Field) -> bool {
        match self.entries.binary_search_by(|(k, _)| k.cmp(key)) {
            Ok(i) => {
                self.entries.remove(i);
                true
            }
            Err(_) => false,
        }
    }

    /// First index whose key is `>= key`.
    pub fn lower_bound(&self, key: &Field) -> usize {
        self.entries.partition_point(|(k, _)| k < key)
    }

    /// Move the upper half of entries into a fresh Vec, keeping the lower
    /// half (inclusive of the split point) on this page.
    pub fn split_off_upper_half(&mut self) -> Vec<(Field, RowId)> {
        let mid = self.entries.len() / 2;
        self.entries.split_off(mid)
    }

    pub fn take_entries(self) -> Vec<(Field, RowId)> {
        self.entries
    }

    pub fn set_entries(&mut self, entries: Vec<(Field, RowId)>) {
        self.entries = entries;
    }

    pub fn append_entries(&mut self, mut entries: Vec<(Field, RowId)>) {
        self.entries.append(&mut entries);
    }

    pub fn prepend_entries(&mut self, mut entries: Vec<(Field, RowId)>) {
        entries.append(&mut self.entries);
        self.entries = entries;
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_LEN + 4 + self.entries.len() * 16);
        write_common_header(
            &mut buf,
            PageType::Leaf,
            self.page_id,
            self.parent_id,
            self.entries.len() as u16,
            self.max_size as u16,
            self.key_type,
            self.lsn,
        );
        buf.extend(self.next_page_id.to_le_bytes());
        for (key, rid) in &self.entries {
            encode_key(&mut buf, key, self.key_type);
            buf.extend(rid.page_id.to_le_bytes());
            buf.extend(rid.slot.to_le_bytes());
        }
        buf
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        let header = read_common_header(bytes);
        assert_eq!(header.page_type, PageType::Leaf);
        let next_page_id = u32::from_le_bytes(bytes[HEADER_LEN..HEADER_LEN + 4].try_into().unwrap());
        let key_size = header.key_type.size();
        let entry_size = key_size + 8;
        let mut offset = HEADER_LEN + 4;
        let mut entries = Vec::with_capacity(header.size as usize);
        for _ in 0..header.size {
            let key = decode_key(&bytes[offset..offset + key_size], header.key_type);
            let page_id = u32::from_le_bytes(
                bytes[offset + key_size..offset + key_size + 4]
                    .try_into()
                    .unwrap(),
            );
            let slot = u32::from_le_bytes(
                bytes[offset + key_size + 4..offset + key_size + 8]
                    .try_into()
                    .unwrap(),
            );
            entries.push((key, RowId::new(page_id, slot)));
            offset += entry_size;
        }
        Self {
            page_id: header.page_id,
            parent_id: header.parent_id,
            max_size: header.max_size as usize,
            key_type: header.key_type,
            lsn: header.lsn,
            next_page_id,
            entries,
        }
    }
}

/// `children[0]` has no associated key (the spec's "dummy" slot 0); every
/// subsequent `children[i]` is paired with the separator key that routes
/// to it.
#[derive(Debug, Clone)]
pub struct InternalPage {
    pub page_id: u32,
    pub parent_id: u32,
    pub max_size: usize,
    pub key_type: ColumnType,
    pub lsn: u64,
    children: Vec<u32>,
    keys: Vec<Option<Field>>,
}

impl InternalPage {
    pub fn new(page_id: u32, max_size: usize, key_type: ColumnType) -> Self {
        Self {
            page_id,
            parent_id: NO_PAGE,
            max_size,
            key_type,
            lsn: 0,
            children: Vec::new(),
            keys: Vec::new(),
        }
    }

    pub fn new_root(page_id: u32, left: u32, key: Field, right: u32, max_size: usize, key_type: ColumnType) -> Self {
        Self {
            page_id,
            parent_id: NO_PAGE,
            max_size,
            key_type,
            lsn: 0,
            children: vec![left, right],
            keys: vec![None, Some(key)],
        }
    }

    /// Number of children (= number of populated slots, including the
    /// dummy-keyed slot 0).
    pub fn size(&self) -> usize {
        self.children.len()
    }

    pub fn is_full(&self) -> bool {
        self.children.len() > self.max_size
    }

    pub fn child_at(&self, i: usize) -> u32 {
        self.children[i]
    }

    pub fn key_at(&self, i: usize) -> Option<&Field> {
        self.keys[i].as_ref()
    }

    pub fn children(&self) -> &[u32] {
        &self.children
    }

    pub fn index_of_child(&self, child_id: u32) -> Option<usize> {
        self.children.iter().position(|&c| c == child_id)
    }

    /// Smallest `i >= 1` whose key is `> key`, or `size()` if none —
    /// descend to `child_at(i - 1)`.
    pub fn find_child_index(&self, key: &Field) -> usize {
        for i in 1..self.children.len() {
            if self.keys[i].as_ref().unwrap() > key {
                return i;
            }
        }
        self.children.len()
    }

    pub fn find_child(&self, key: &Field) -> u32 {
        let pos = self.find_child_index(key);
        self.children[pos - 1]
    }

    /// Insert `new_child` with separator `key` directly after `after_child`.
    pub fn insert_after(&mut self, after_child: u32, key: Field, new_child: u32) {
        let idx = self.index_of_child(after_child).expect("child not present");
        self.children.insert(idx + 1, new_child);
        self.keys.insert(idx + 1, Some(key));
    }

    /// Move the upper half of (child, key) pairs to a new page, promoting
    /// the boundary key. The first migrated child becomes the new page's
    /// dummy slot 0.
    pub fn split_off_upper_half(&mut self) -> (Field, Vec<u32>, Vec<Option<Field>>) {
        let mid = self.children.len() / 2;
        let promote_key = self.keys[mid].clone().expect("split boundary must have a key");
        let new_children = self.children.split_off(mid);
        let mut new_keys = self.keys.split_off(mid);
        new_keys[0] = None;
        (promote_key, new_children, new_keys)
    }

    pub fn set_parts(&mut self, children: Vec<u32>, mut keys: Vec<Option<Field>>) {
        keys[0] = None;
        self.children = children;
        self.keys = keys;
    }

    pub fn children_and_keys(self) -> (Vec<u32>, Vec<Option<Field>>) {
        (self.children, self.keys)
    }

    /// Remove `child_id` and its associated separator (or, for slot 0, the
    /// separator that used to route to slot 1).
    pub fn remove_child(&mut self, child_id: u32) {
        let idx = self.index_of_child(child_id).expect("child not present");
        self.children.remove(idx);
        self.keys.remove(idx);
        if !self.keys.is_empty() {
            self.keys[0] = None;
        }
    }

    pub fn only_child(&self) -> Option<u32> {
        if self.children.len() == 1 {
            Some(self.children[0])
        } else {
            None
        }
    }

    pub fn set_key_at(&mut self, i: usize, key: Field) {
        self.keys[i] = Some(key);
    }

    /// Drop the last (child, key) pair, returning the removed child and the
    /// separator that used to route to it — the value that replaces the
    /// parent's separator when a right node borrows from this one.
    pub fn pop_last(&mut self) -> (u32, Field) {
        let child = self.children.pop().expect("pop_last on empty node");
        let key = self.keys.pop().flatten().expect("last key must be Some");
        (child, key)
    }

    /// Drop the first child, returning it along with the key that used to
    /// separate it from the new first child — the value that replaces the
    /// parent's separator when a left node borrows from this one.
    pub fn pop_first(&mut self) -> (u32, Field) {
        let child = self.children.remove(0);
        self.keys.remove(0);
        let key = self.keys[0].take().expect("second key must be Some");
        (child, key)
    }

    /// Prepend `child` as the new dummy-keyed slot 0, demoting the old slot
    /// 0 to slot 1 with `key` (the separator pulled down from the parent).
    pub fn push_front(&mut self, child: u32, key: Field) {
        self.children.insert(0, child);
        self.keys.insert(0, None);
        self.keys[1] = Some(key);
    }

    /// Append `child` as the new last slot, separated from the old last
    /// child by `key` (the separator pulled down from the parent).
    pub fn push_back(&mut self, child: u32, key: Field) {
        self.children.push(child);
        self.keys.push(Some(key));
    }

    /// Absorb `right`'s children onto the end of this page. `bridge_key` is
    /// the parent separator that used to stand between the two nodes; it
    /// becomes the key for `right`'s former dummy-keyed slot 0.
    pub fn merge_from_right(&mut self, bridge_key: Field, right: InternalPage) {
        let (mut children, mut keys) = right.children_and_keys();
        keys[0] = Some(bridge_key);
        self.children.append(&mut children);
        self.keys.append(&mut keys);
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let key_size = self.key_type.size();
        let mut buf = Vec::with_capacity(HEADER_LEN + self.children.len() * (4 + key_size));
        write_common_header(
            &mut buf,
            PageType::Internal,
            self.page_id,
            self.parent_id,
            self.children.len() as u16,
            self.max_size as u16,
            self.key_type,
            self.lsn,
        );
        for i in 0..self.children.len() {
            buf.extend(self.children[i].to_le_bytes());
            match &self.keys[i] {
                Some(k) => encode_key(&mut buf, k, self.key_type),
                None => buf.extend(vec![0u8; key_size]),
            }
        }
        buf
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        let header = read_common_header(bytes);
        assert_eq!(header.page_type, PageType::Internal);
        let key_size = header.key_type.size();
        let entry_size = 4 + key_size;
        let mut offset = HEADER_LEN;
        let mut children = Vec::with_capacity(header.size as usize);
        let mut keys = Vec::with_capacity(header.size as usize);
        for i in 0..header.size as usize {
            let child = u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap());
            children.push(child);
            if i == 0 {
                keys.push(None);
            } else {
                keys.push(Some(decode_key(&bytes[offset + 4..offset + entry_size], header.key_type)));
            }
            offset += entry_size;
        }
        Self {
            page_id: header.page_id,
            parent_id: header.parent_id,
            max_size: header.max_size as usize,
            key_type: header.key_type,
            lsn: header.lsn,
            children,
            keys,
        }
    }
}

/// Peek just the common header's type tag without fully parsing the page —
/// used by code that must dispatch before it knows which variant to build.
pub fn peek_page_type(bytes: &[u8]) -> PageType {
    read_common_header(bytes).page_type
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::row::RowId;

    #[test]
    fn leaf_insert_keeps_key_order_and_rejects_duplicates() {
        let mut leaf = LeafPage::new(1, 4, ColumnType::Int32);
        assert!(leaf.insert(Field::Int32(3), RowId::new(0, 0)));
        assert!(leaf.insert(Field::Int32(1), RowId::new(0, 1)));
        assert!(leaf.insert(Field::Int32(2), RowId::new(0, 2)));
        assert!(!leaf.insert(Field::Int32(2), RowId::new(0, 3)));
        let keys: Vec<i32> = leaf.entries().iter().map(|(k, _)| k.as_i32().unwrap()).collect();
        assert_eq!(keys, vec![1, 2, 3]);
    }

    #[test]
    fn leaf_codec_round_trips() {
        let mut leaf = LeafPage::new(7, 4, ColumnType::Int32);
        leaf.parent_id = 2;
        leaf.next_page_id = 9;
        leaf.insert(Field::Int32(10), RowId::new(1, 0));
        leaf.insert(Field::Int32(20), RowId::new(1, 1));
        let bytes = leaf.to_bytes();
        let decoded = LeafPage::from_bytes(&bytes);
        assert_eq!(decoded.page_id, 7);
        assert_eq!(decoded.parent_id, 2);
        assert_eq!(decoded.next_page_id, 9);
        assert_eq!(decoded.size(), 2);
        assert_eq!(decoded.get(&Field::Int32(20)), Some(RowId::new(1, 1)));
    }

    #[test]
    fn internal_find_child_matches_separator_semantics() {
        let internal = InternalPage::new_root(1, 10, Field::Int32(5), 11, 4, ColumnType::Int32);
        assert_eq!(internal.find_child(&Field::Int32(1)), 10);
        assert_eq!(internal.find_child(&Field::Int32(5)), 11);
        assert_eq!(internal.find_child(&Field::Int32(9)), 11);
    }

    #[test]
    fn internal_codec_round_trips() {
        let internal = InternalPage::new_root(3, 10, Field::Int32(5), 11, 4, ColumnType::Int32);
        let bytes = internal.to_bytes();
        let decoded = InternalPage::from_bytes(&bytes);
        assert_eq!(decoded.size(), 2);
        assert_eq!(decoded.child_at(0), 10);
        assert_eq!(decoded.child_at(1), 11);
        assert_eq!(decoded.key_at(1), Some(&Field::Int32(5)));
        assert_eq!(decoded.key_at(0), None);
    }
}

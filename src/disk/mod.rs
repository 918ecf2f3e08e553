//! Paged disk manager: the only layer that speaks to the filesystem.

pub mod bitmap;
pub mod manager;

pub use bitmap::{BitmapPage, BITMAP_CAPACITY, PAGE_SIZE};
pub use manager::{DiskManager, MAX_EXTENTS};

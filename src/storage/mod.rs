//! Storage layer: disk I/O, the metadata page, and the page allocator.

mod bitmap;
mod disk_manager;
mod meta;

pub use bitmap::{bitmap_pages_needed, Bitmap};
pub use disk_manager::{DiskManager, DiskManagerImpl};
pub use meta::MetaPage;

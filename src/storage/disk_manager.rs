//! Disk manager: raw page I/O over a single backing file.
//!
//! `read_page`/`write_page` read or write exactly one page at `id * page_size`.
//! Unlike the teacher crate's `DiskManager`, there is no "page 0 is
//! off-limits" rule here — the metadata page and bitmap pages are read
//! and written through the same calls as node and value pages; callers
//! above this layer (storage::meta, storage::bitmap, the B-tree) are
//! responsible for only touching the pages they own.
//!
//! Reads/writes use positioned I/O (`pread`/`pwrite` via
//! `FileExt::read_exact_at`/`write_all_at`) instead of seek-then-read,
//! so `DiskManager` methods take `&self`: no interior-mutability lock
//! is needed to support read-only search, matching the single-threaded,
//! non-suspending model of §5.

use crate::error::Result;
use crate::page::PageBuf;
use crate::types::PageId;
use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::Path;

/// Abstraction over page I/O, so the rest of the engine never touches
/// `std::fs` directly.
pub trait DiskManager {
    /// Read exactly one page. A short read is a `StorageFailure`.
    fn read_page(&self, id: PageId) -> Result<PageBuf>;

    /// Write exactly one page.
    fn write_page(&self, id: PageId, data: &PageBuf) -> Result<()>;

    /// Flush to stable storage.
    fn sync(&self) -> Result<()>;

    /// The configured page size.
    fn page_size(&self) -> usize;
}

/// File-backed `DiskManager`.
pub struct DiskManagerImpl {
    file: File,
    page_size: usize,
    sync_on_write: bool,
}

impl DiskManagerImpl {
    /// Create a new, fixed-size database file of `n_pages` pages, each
    /// `page_size` bytes, and zero it. Fails if `path` already exists.
    pub fn create(path: &Path, n_pages: u32, page_size: usize, sync_on_write: bool) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;

        file.set_len(n_pages as u64 * page_size as u64)?;
        file.sync_all()?;

        Ok(Self {
            file,
            page_size,
            sync_on_write,
        })
    }

    /// Open an existing database file without altering its size.
    pub fn open_existing(path: &Path, page_size: usize, sync_on_write: bool) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(Self {
            file,
            page_size,
            sync_on_write,
        })
    }

    /// Current file length in bytes.
    pub fn len(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }
}

impl DiskManager for DiskManagerImpl {
    fn read_page(&self, id: PageId) -> Result<PageBuf> {
        let mut buf = PageBuf::new();
        let offset = id.file_offset(self.page_size);
        self.file.read_exact_at(buf.as_bytes_mut(), offset)?;
        Ok(buf)
    }

    fn write_page(&self, id: PageId, data: &PageBuf) -> Result<()> {
        let offset = id.file_offset(self.page_size);
        self.file.write_all_at(data.as_bytes(), offset)?;
        if self.sync_on_write {
            self.file.sync_data()?;
        }
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    fn page_size(&self) -> usize {
        self.page_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_create_preallocates_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        let dm = DiskManagerImpl::create(&path, 16, 4096, false).unwrap();
        assert_eq!(dm.len().unwrap(), 16 * 4096);
    }

    #[test]
    fn test_write_then_read_page() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        let dm = DiskManagerImpl::create(&path, 4, 4096, false).unwrap();

        let mut buf = PageBuf::new();
        buf.as_bytes_mut()[0..5].copy_from_slice(b"hello");
        dm.write_page(PageId::new(2), &buf).unwrap();

        let read_back = dm.read_page(PageId::new(2)).unwrap();
        assert_eq!(&read_back.as_bytes()[0..5], b"hello");
    }

    #[test]
    fn test_reopen_preserves_contents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        {
            let dm = DiskManagerImpl::create(&path, 4, 4096, true).unwrap();
            let mut buf = PageBuf::new();
            buf.as_bytes_mut()[0..4].copy_from_slice(b"test");
            dm.write_page(PageId::new(1), &buf).unwrap();
        }

        {
            let dm = DiskManagerImpl::open_existing(&path, 4096, false).unwrap();
            let buf = dm.read_page(PageId::new(1)).unwrap();
            assert_eq!(&buf.as_bytes()[0..4], b"test");
        }
    }

    #[test]
    fn test_create_fails_if_exists() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        DiskManagerImpl::create(&path, 4, 4096, false).unwrap();
        assert!(DiskManagerImpl::create(&path, 4, 4096, false).is_err());
    }
}

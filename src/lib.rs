//! # btreekv
//!
//! An embedded, single-file, disk-backed ordered key-value store built
//! on a paged B-tree.
//!
//! ## Architecture
//!
//! - **Page layer** (`page`): fixed-layout node and value codecs over
//!   raw `PAGE_SIZE` buffers — no slotted cells, no defragmentation.
//! - **Storage layer** (`storage`): raw page I/O (`DiskManager`), the
//!   metadata page (`MetaPage`), and the page allocator (`Bitmap`).
//! - **B-tree layer** (`btree`): the engine itself — search, proactive
//!   split insertion, top-down merge/redistribute deletion.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use btreekv::{Db, DbConfig};
//!
//! let config = DbConfig::new("my_database.db").key_len(16);
//! let mut db = Db::create(config)?;
//!
//! db.insert(b"hello", b"world")?;
//! assert_eq!(db.search(b"hello")?, Some(b"world".to_vec()));
//! db.delete(b"hello")?;
//! ```
//!
//! ## Non-goals
//!
//! No concurrent access (the engine assumes a single caller and keeps
//! no internal locking), no range scans or cursors, no networked
//! access, no compression, no write-ahead log or transactions. See
//! `DESIGN.md` for the reasoning.

pub mod btree;
pub mod error;
pub mod page;
pub mod storage;
pub mod types;

pub use error::{Result, StorageError};
pub use types::{DbConfig, PageId, PAGE_SIZE};

use btree::BTree;
use page::node::{k_max_for, Node, NodeCodec};
use storage::{Bitmap, DiskManager, DiskManagerImpl, MetaPage};
use std::io::Write as IoWrite;

/// Point-in-time counters describing a database's on-disk shape.
#[derive(Debug, Clone)]
pub struct DbStats {
    /// Total pages in the file, including metadata and bitmap pages.
    pub n_pages: u32,
    /// Pages currently allocated (metadata + bitmap + live nodes/values).
    pub live_pages: usize,
    /// Fixed key length (`L_K`) this database was created with.
    pub key_len: usize,
    /// Maximum keys per node (`K_MAX`).
    pub k_max: usize,
    /// Current tree depth, root counted as level 1.
    pub height: usize,
}

/// Main database handle: an embedded, ordered key-value store backed
/// by one file.
pub struct Db {
    tree: BTree,
    meta_template: MetaPage,
    log: Option<std::sync::Arc<dyn Fn(&str) + Send + Sync>>,
}

impl Db {
    /// Create a new database file at `config.path`. Fails if the file
    /// already exists.
    pub fn create(config: DbConfig) -> Result<Self> {
        let page_size = PAGE_SIZE;
        let n_pages = (config.target_size as usize).div_ceil(page_size).max(2) as u32;

        let k_max = k_max_for(config.key_len, page_size).ok_or_else(|| {
            StorageError::invalid_operation(format!(
                "key_len {} leaves no room for K_MAX >= 4 in a {}-byte page",
                config.key_len, page_size
            ))
        })?;

        let dm = DiskManagerImpl::create(&config.path, n_pages, page_size, config.sync_on_write)?;
        let bitmap_pages = storage::bitmap_pages_needed(n_pages, page_size);
        if n_pages <= bitmap_pages + 1 {
            return Err(StorageError::invalid_operation(
                "target_size too small to hold metadata, bitmap, and one node page",
            ));
        }

        let mut bitmap = Bitmap::populate(&dm, n_pages, page_size)?;
        let root_page = bitmap.allocate(&dm)?;

        let codec = NodeCodec::new(config.key_len, k_max);
        let root = Node::new_leaf(root_page, PageId(0));
        dm.write_page(root_page, &codec.encode(&root))?;

        let mut meta = MetaPage::new(
            page_size as u32,
            n_pages,
            config.key_len as u32,
            k_max as u32,
            bitmap_pages,
        );
        meta.root_page = root_page;
        let mut meta_buf = page::PageBuf::new();
        meta.write(meta_buf.as_bytes_mut());
        dm.write_page(PageId::HEADER, &meta_buf)?;
        dm.sync()?;

        let tree = BTree::new(dm, bitmap, config.key_len, k_max, root_page)?;
        let log = config.log.clone();
        if let Some(sink) = &log {
            sink(&format!(
                "created database at {} (key_len={}, k_max={}, n_pages={})",
                config.path.display(),
                config.key_len,
                k_max,
                n_pages
            ));
        }

        Ok(Self {
            tree,
            meta_template: meta,
            log,
        })
    }

    /// Open an existing database file, validating its metadata page.
    pub fn open(config: DbConfig) -> Result<Self> {
        let dm = DiskManagerImpl::open_existing(&config.path, PAGE_SIZE, config.sync_on_write)?;
        let meta_buf = dm.read_page(PageId::HEADER)?;
        let meta = MetaPage::read(meta_buf.as_bytes())?;

        if meta.page_size as usize != PAGE_SIZE {
            return Err(StorageError::invalid_db(format!(
                "database page size {} does not match this build's PAGE_SIZE {}",
                meta.page_size, PAGE_SIZE
            )));
        }

        let bitmap = Bitmap::load(&dm, meta.n_pages, meta.bitmap_pages, PAGE_SIZE)?;
        let tree = BTree::new(
            dm,
            bitmap,
            meta.key_len as usize,
            meta.k_max as usize,
            meta.root_page,
        )?;

        if let Some(sink) = &config.log {
            sink(&format!("opened database at {}", config.path.display()));
        }

        Ok(Self {
            tree,
            meta_template: meta,
            log: config.log,
        })
    }

    fn log(&self, msg: &str) {
        if let Some(sink) = &self.log {
            sink(msg);
        }
    }

    /// Insert or update a key-value pair.
    pub fn insert(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.tree.insert(key, value)?;
        self.sync_root_pointer()?;
        self.log(&format!("insert {} bytes under {}-byte key", value.len(), key.len()));
        Ok(())
    }

    /// Look up a key. Returns `None` if it is not present.
    pub fn search(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.tree.get(key)
    }

    /// Delete a key. Returns `true` if it was present.
    pub fn delete(&mut self, key: &[u8]) -> Result<bool> {
        let found = self.tree.delete(key)?;
        if found {
            self.sync_root_pointer()?;
            self.log(&format!("delete key ({} bytes)", key.len()));
        }
        Ok(found)
    }

    /// Re-persist the metadata page. The root page id itself never
    /// changes (splits and contractions both preserve it, see
    /// `btree::tree`), but the metadata page's checksum and fields are
    /// kept in lockstep here in case that ever changes.
    fn sync_root_pointer(&mut self) -> Result<()> {
        self.meta_template.root_page = self.tree.root_page();
        let mut buf = page::PageBuf::new();
        self.meta_template.write(buf.as_bytes_mut());
        self.tree.disk_manager().write_page(PageId::HEADER, &buf)
    }

    /// Current tree depth, root counted as level 1.
    pub fn height(&self) -> Result<usize> {
        self.tree.height()
    }

    /// Point-in-time statistics about this database.
    pub fn stats(&self) -> Result<DbStats> {
        Ok(DbStats {
            n_pages: self.meta_template.n_pages,
            live_pages: self.tree.live_pages(),
            key_len: self.tree.key_len(),
            k_max: self.tree.k_max(),
            height: self.tree.height()?,
        })
    }

    /// Explicitly release this database's resources after syncing the
    /// backing file to stable storage. Every mutation is already
    /// durable by the time `insert`/`delete` return (see §5's
    /// "externally observable" rule), so this mainly exists for
    /// symmetry with `create`/`open` and to surface a final-sync I/O
    /// error to the caller instead of losing it in `Drop`. Dropping a
    /// `Db` without calling `close` is safe: the file handle, root
    /// node buffer, and bitmap buffer are all released the same way
    /// either way.
    pub fn close(self) -> Result<()> {
        self.tree.disk_manager().sync()
    }

    /// Write every `(key, value)` pair to `out`, one per line, in
    /// ascending key order. A debugging aid, not a general iterator.
    pub fn print<W: IoWrite>(&self, out: &mut W) -> Result<()> {
        self.tree.for_each(&mut |key, value| {
            let trimmed = trim_trailing_zeros(key);
            writeln!(
                out,
                "{} => {}",
                String::from_utf8_lossy(trimmed),
                String::from_utf8_lossy(value)
            )
            .map_err(StorageError::from)
        })
    }
}

fn trim_trailing_zeros(key: &[u8]) -> &[u8] {
    let end = key.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    &key[..end]
}

//! Common types used throughout the storage engine.

mod page_id;

pub use page_id::PageId;

/// Page size in bytes. Fixed for this revision; persisted in the
/// metadata page on `create()` so `open()` can refuse a file written
/// with a different page size.
pub const PAGE_SIZE: usize = 4096;

/// Minimum number of keys per non-root node (B-tree order property).
///
/// A full node (`K_MAX` keys) splits by promoting one key to the
/// parent and dividing the remaining `K_MAX - 1` keys in half, so the
/// smaller side has `floor((K_MAX - 1) / 2)` keys — that is the bound
/// a split can actually guarantee, and so the threshold `delete` uses
/// to decide a node is underfull. Equivalent to `ceil(K_MAX / 2) - 1`.
pub fn min_fill(k_max: usize) -> usize {
    (k_max - 1) / 2
}

/// Default key length used by [`DbConfig::new`] when the caller does
/// not otherwise specify one.
pub const DEFAULT_KEY_LEN: usize = 8;

/// Configuration for creating or opening a database.
///
/// Mirrors the shape of a storage-engine `Config`/`BTreeConfig` pair:
/// path plus a handful of knobs, all defaulted so a caller can just
/// call [`DbConfig::new`] for the common case.
#[derive(Clone)]
pub struct DbConfig {
    /// Path to the database file.
    pub path: std::path::PathBuf,
    /// Fixed key length `L_K` in bytes. Only consulted by `create()`;
    /// `open()` reads the persisted value from the metadata page.
    pub key_len: usize,
    /// Target file size in bytes for `create()`. Rounded up to a whole
    /// number of pages.
    pub target_size: u64,
    /// Whether to `fsync` the file after every page write.
    pub sync_on_write: bool,
    /// Optional sink for diagnostic messages (split/merge/bitmap
    /// persistence). Not a process-wide logger: each `Db` gets its own.
    pub log: Option<std::sync::Arc<dyn Fn(&str) + Send + Sync>>,
}

impl DbConfig {
    /// Create a configuration with default key length and a 1 MiB
    /// initial file size.
    pub fn new<P: Into<std::path::PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            key_len: DEFAULT_KEY_LEN,
            target_size: 1024 * 1024,
            sync_on_write: false,
            log: None,
        }
    }

    /// Set the fixed key length used when creating a new database.
    pub fn key_len(mut self, key_len: usize) -> Self {
        self.key_len = key_len;
        self
    }

    /// Set the target file size used when creating a new database.
    pub fn target_size(mut self, target_size: u64) -> Self {
        self.target_size = target_size;
        self
    }

    /// Enable `fsync` after every page write.
    pub fn sync_on_write(mut self, enabled: bool) -> Self {
        self.sync_on_write = enabled;
        self
    }

    /// Install a diagnostic sink.
    pub fn log<F: Fn(&str) + Send + Sync + 'static>(mut self, sink: F) -> Self {
        self.log = Some(std::sync::Arc::new(sink));
        self
    }
}

//! The metadata page (page 0).
//!
//! Holds everything `open()` needs to recover without the caller
//! re-specifying database parameters: page size, total page count, key
//! length, fanout, the bitmap's extent, and the root node's page id.
//! Guarded by a CRC32 checksum so a truncated or foreign file is
//! rejected with `InvalidDatabaseFile` rather than silently
//! misinterpreted as a valid layout.

use crate::error::{Result, StorageError};
use crate::types::PageId;

/// Identifies a file written by this engine.
pub const MAGIC: &[u8; 8] = b"BTKVSTR\0";

/// On-disk format version. Bump if the layout changes incompatibly.
pub const VERSION: u32 = 1;

const HEADER_LEN: usize = 40; // everything up to and including the checksum

/// The metadata page.
#[derive(Debug, Clone, Copy)]
pub struct MetaPage {
    pub page_size: u32,
    pub n_pages: u32,
    pub key_len: u32,
    pub k_max: u32,
    pub root_page: PageId,
    pub bitmap_pages: u32,
}

impl MetaPage {
    pub fn new(page_size: u32, n_pages: u32, key_len: u32, k_max: u32, bitmap_pages: u32) -> Self {
        Self {
            page_size,
            n_pages,
            key_len,
            k_max,
            root_page: PageId(0),
            bitmap_pages,
        }
    }

    /// Read and validate a metadata page from raw bytes (one full page).
    pub fn read(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(StorageError::invalid_db("metadata page too short"));
        }
        if &bytes[0..8] != MAGIC {
            return Err(StorageError::invalid_db("bad magic bytes"));
        }

        let version = u32::from_be_bytes(bytes[8..12].try_into().unwrap());
        if version != VERSION {
            return Err(StorageError::invalid_db(format!(
                "unsupported format version {version} (expected {VERSION})"
            )));
        }

        let page_size = u32::from_be_bytes(bytes[12..16].try_into().unwrap());
        let n_pages = u32::from_be_bytes(bytes[16..20].try_into().unwrap());
        let key_len = u32::from_be_bytes(bytes[20..24].try_into().unwrap());
        let k_max = u32::from_be_bytes(bytes[24..28].try_into().unwrap());
        let root_page = u32::from_be_bytes(bytes[28..32].try_into().unwrap());
        let bitmap_pages = u32::from_be_bytes(bytes[32..36].try_into().unwrap());

        let stored_checksum = u32::from_be_bytes(bytes[36..40].try_into().unwrap());
        let computed_checksum = crc32fast::hash(&bytes[0..36]);
        if stored_checksum != computed_checksum {
            return Err(StorageError::invalid_db("metadata checksum mismatch"));
        }

        Ok(Self {
            page_size,
            n_pages,
            key_len,
            k_max,
            root_page: PageId::new(root_page),
            bitmap_pages,
        })
    }

    /// Serialize this metadata into a full page buffer.
    pub fn write(&self, bytes: &mut [u8]) {
        bytes.fill(0);
        bytes[0..8].copy_from_slice(MAGIC);
        bytes[8..12].copy_from_slice(&VERSION.to_be_bytes());
        bytes[12..16].copy_from_slice(&self.page_size.to_be_bytes());
        bytes[16..20].copy_from_slice(&self.n_pages.to_be_bytes());
        bytes[20..24].copy_from_slice(&self.key_len.to_be_bytes());
        bytes[24..28].copy_from_slice(&self.k_max.to_be_bytes());
        bytes[28..32].copy_from_slice(&self.root_page.value().to_be_bytes());
        bytes[32..36].copy_from_slice(&self.bitmap_pages.to_be_bytes());

        let checksum = crc32fast::hash(&bytes[0..36]);
        bytes[36..40].copy_from_slice(&checksum.to_be_bytes());
    }
}

//! Value page codec.
//!
//! Each key owns exactly one value page: a small header followed by
//! the payload bytes. `next_page` is reserved for chaining oversized
//! values across multiple pages but is never set by this revision —
//! a value that does not fit in one page is rejected with
//! `ValueTooLarge` rather than silently truncated or chained.

use crate::error::{Result, StorageError};
use crate::page::PageBuf;
use crate::types::PageId;

/// Size of the value page header: `data_size: u32` + `next_page: u32`.
pub const VALUE_HEADER_SIZE: usize = 8;

/// Largest payload that fits in one value page of the given size.
pub fn max_value_size(page_size: usize) -> usize {
    page_size - VALUE_HEADER_SIZE
}

/// Encode `bytes` into a value page buffer. Fails with `ValueTooLarge`
/// if `bytes` does not fit after the header.
pub fn encode_value(bytes: &[u8], page_size: usize) -> Result<PageBuf> {
    let max = max_value_size(page_size);
    if bytes.len() > max {
        return Err(StorageError::ValueTooLarge {
            size: bytes.len(),
            max,
        });
    }

    let mut buf = PageBuf::new();
    let out = buf.as_bytes_mut();
    out[0..4].copy_from_slice(&(bytes.len() as u32).to_be_bytes());
    out[4..8].copy_from_slice(&PageId(0).value().to_be_bytes()); // next_page, unused
    out[VALUE_HEADER_SIZE..VALUE_HEADER_SIZE + bytes.len()].copy_from_slice(bytes);
    Ok(buf)
}

/// Decode a value page buffer back into an owned byte vector.
pub fn decode_value(page: PageId, buf: &PageBuf) -> Result<Vec<u8>> {
    let bytes = buf.as_bytes();
    let data_size = u32::from_be_bytes(bytes[0..4].try_into().unwrap()) as usize;
    let max = max_value_size(bytes.len());
    if data_size > max {
        return Err(StorageError::corrupt_node(
            page,
            format!("value data_size {} exceeds page capacity {}", data_size, max),
        ));
    }
    Ok(bytes[VALUE_HEADER_SIZE..VALUE_HEADER_SIZE + data_size].to_vec())
}

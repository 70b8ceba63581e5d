//! Companion id-table file for checkpoints.
//!
//! One record per vector block, appended in block order:
//!
//! `[u32 id_count] { [u32 len] [len bytes UTF-8] [u32 index-within-block] } *`
//!
//! Plain buffered file IO; this file is tiny next to the vector file and
//! needs no mapping.

use crate::error::Result;
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::warn;

/// Truncates the meta file to empty, creating it if missing.
///
/// # Errors
///
/// Returns `Io` on filesystem failures.
pub fn truncate(path: &Path) -> Result<()> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;
    Ok(())
}

/// Appends one block's id table.
///
/// `entries` pairs each string id with its vector's index inside the block.
///
/// # Errors
///
/// Returns `Io` on filesystem failures.
pub fn append_block(path: &Path, entries: &[(&str, u32)]) -> Result<()> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut writer = BufWriter::new(file);

    #[allow(clippy::cast_possible_truncation)]
    writer.write_all(&(entries.len() as u32).to_le_bytes())?;
    for (id, index) in entries {
        let bytes = id.as_bytes();
        #[allow(clippy::cast_possible_truncation)]
        writer.write_all(&(bytes.len() as u32).to_le_bytes())?;
        writer.write_all(bytes)?;
        writer.write_all(&index.to_le_bytes())?;
    }
    writer.flush()?;
    writer.get_ref().sync_all()?;
    Ok(())
}

/// Reads every complete block table, in order.
///
/// A truncated or malformed record ends the scan; tables before it are
/// returned, mirroring the vector file's prefix-preserving policy.
///
/// # Errors
///
/// Returns `Io` if the file cannot be read at all.
pub fn read_blocks(path: &Path) -> Result<Vec<Vec<(String, u32)>>> {
    let bytes = std::fs::read(path)?;
    let mut blocks = Vec::new();
    let mut offset = 0usize;

    'scan: while offset + 4 <= bytes.len() {
        let id_count = read_u32(&bytes, offset) as usize;
        offset += 4;

        let mut table = Vec::with_capacity(id_count);
        for _ in 0..id_count {
            if offset + 4 > bytes.len() {
                warn!("truncated meta record, stopping scan");
                break 'scan;
            }
            let len = read_u32(&bytes, offset) as usize;
            offset += 4;
            if offset + len + 4 > bytes.len() {
                warn!("truncated meta record, stopping scan");
                break 'scan;
            }
            let Ok(id) = std::str::from_utf8(&bytes[offset..offset + len]) else {
                warn!("non-UTF-8 id in meta file, stopping scan");
                break 'scan;
            };
            offset += len;
            let index = read_u32(&bytes, offset);
            offset += 4;
            table.push((id.to_string(), index));
        }
        blocks.push(table);
    }
    Ok(blocks)
}

#[inline]
fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_le_bytes(buf)
}

//! Memory-mapped checkpoint file for vector payloads.
//!
//! Layout (all integers little-endian):
//!
//! | Offset | Bytes | Field |
//! |---|---|---|
//! | 0 | 4 | Magic `"OMDB"` |
//! | 4 | 4 | Format version (2) |
//! | 8 | 4 | Dimension |
//! | 12 | 4 | Vector count, updated last on checkpoint |
//! | 16 | 1008 | Reserved, zeroed |
//! | 1024 | — | Block stream |
//!
//! Each block: a 32-byte header (count, dimension, CRC32 of the body or 0,
//! block id, zero padding) followed by `count * dimension * 4` bytes of raw
//! floats, with the block end padded to the next 64 KiB boundary past the
//! file header. The file grows by `ftruncate` + remap; the header's count
//! field is written after the block body, so a torn checkpoint leaves the
//! previous header readable.
//!
//! The mapping lives as long as this object; drop flushes it.

use crate::error::{Error, Result};
use memmap2::MmapMut;
use parking_lot::RwLock;
use std::fs::{File, OpenOptions};
use std::path::Path;
use tracing::{error, warn};

/// File magic.
pub const MAGIC: [u8; 4] = *b"OMDB";

/// On-disk format version.
pub const FORMAT_VERSION: u32 = 2;

/// Bytes reserved for the file header.
pub const HEADER_LEN: usize = 1024;

/// Bytes per block header.
pub const BLOCK_HEADER_LEN: usize = 32;

/// Block-end alignment.
pub const BLOCK_ALIGN: usize = 64 * 1024;

const FLOAT_SIZE: usize = std::mem::size_of::<f32>();

#[inline]
fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_le_bytes(buf)
}

#[inline]
fn write_u32(bytes: &mut [u8], offset: usize, value: u32) {
    bytes[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

/// Rounds a block end up to the next 64 KiB boundary past the file header.
#[inline]
fn align_block_end(raw_end: usize) -> usize {
    HEADER_LEN + (raw_end - HEADER_LEN).div_ceil(BLOCK_ALIGN) * BLOCK_ALIGN
}

/// Stores one vector into a block body region, each float as 4
/// little-endian bytes. `dst` must be exactly `vector.len() * 4` bytes.
#[inline]
fn store_floats(dst: &mut [u8], vector: &[f32]) {
    debug_assert_eq!(dst.len(), vector.len() * FLOAT_SIZE);
    for (slot, &value) in dst.chunks_exact_mut(FLOAT_SIZE).zip(vector) {
        slot.copy_from_slice(&value.to_le_bytes());
    }
}

/// Decodes a block body back into floats.
#[inline]
fn load_floats(body: &[u8]) -> Vec<f32> {
    body.chunks_exact(FLOAT_SIZE)
        .map(|b| f32::from_le_bytes(b.try_into().expect("chunks_exact yields 4 bytes")))
        .collect()
}

/// One block's payload, copied out of the mapping.
#[derive(Debug, Clone)]
pub struct RecoveredBlock {
    /// Block sequence number.
    pub block_id: u32,
    /// Vectors in the block.
    pub count: usize,
    /// `count * dimension` floats in block order.
    pub floats: Vec<f32>,
}

/// Append-only mmap-backed vector checkpoint file.
#[derive(Debug)]
pub struct CheckpointFile {
    file: File,
    mmap: RwLock<MmapMut>,
    dimension: usize,
    vector_count: u32,
    data_end: usize,
    next_block_id: u32,
    write_checksums: bool,
}

impl CheckpointFile {
    /// Creates a fresh checkpoint file, truncating anything at `path`.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the file cannot be created or mapped.
    pub fn create(path: &Path, dimension: usize, write_checksums: bool) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(HEADER_LEN as u64)?;

        // SAFETY: the file is open read+write and sized to cover the mapped
        // range by the set_len above.
        let mut mmap = unsafe { MmapMut::map_mut(&file)? };
        mmap[0..4].copy_from_slice(&MAGIC);
        write_u32(&mut mmap, 4, FORMAT_VERSION);
        #[allow(clippy::cast_possible_truncation)]
        write_u32(&mut mmap, 8, dimension as u32);
        write_u32(&mut mmap, 12, 0);
        mmap.flush()?;

        Ok(Self {
            file,
            mmap: RwLock::new(mmap),
            dimension,
            vector_count: 0,
            data_end: HEADER_LEN,
            next_block_id: 0,
            write_checksums,
        })
    }

    /// Opens an existing checkpoint file and validates its header.
    ///
    /// # Errors
    ///
    /// Returns `Io` on filesystem failures and `Corrupt` on a bad magic,
    /// unsupported version, or truncated header.
    pub fn open(path: &Path, write_checksums: bool) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let len = file.metadata()?.len() as usize;
        if len < HEADER_LEN {
            return Err(Error::Corrupt(format!(
                "checkpoint header truncated ({len} bytes)"
            )));
        }

        // SAFETY: file is open read+write; mapping covers its current length.
        let mmap = unsafe { MmapMut::map_mut(&file)? };
        if mmap[0..4] != MAGIC {
            return Err(Error::Corrupt("bad magic".into()));
        }
        let version = read_u32(&mmap, 4);
        if version != FORMAT_VERSION {
            return Err(Error::Corrupt(format!(
                "unsupported format version {version}"
            )));
        }
        let dimension = read_u32(&mmap, 8) as usize;
        if dimension == 0 {
            return Err(Error::Corrupt("zero dimension".into()));
        }
        let vector_count = read_u32(&mmap, 12);

        let (data_end, next_block_id) = Self::scan_extent(&mmap, dimension);

        Ok(Self {
            file,
            mmap: RwLock::new(mmap),
            dimension,
            vector_count,
            data_end,
            next_block_id,
            write_checksums,
        })
    }

    /// Vector dimension recorded in the header.
    #[must_use]
    pub const fn dimension(&self) -> usize {
        self.dimension
    }

    /// Vector count recorded in the header.
    #[must_use]
    pub const fn vector_count(&self) -> u32 {
        self.vector_count
    }

    /// Appends one block and updates the header count, in that order, with
    /// an msync after each step.
    ///
    /// # Errors
    ///
    /// Returns `Io` if extending, remapping, or flushing fails.
    pub fn append_block(&mut self, vectors: &[&[f32]], new_total: u32) -> Result<u32> {
        let body_len = vectors.len() * self.dimension * FLOAT_SIZE;
        let block_start = self.data_end;
        let body_start = block_start + BLOCK_HEADER_LEN;
        let raw_end = body_start + body_len;
        let padded_end = align_block_end(raw_end);
        let block_id = self.next_block_id;

        self.file.set_len(padded_end as u64)?;

        let mut mmap = self.mmap.write();
        mmap.flush()?;
        // SAFETY: the file was just extended to padded_end; the fresh
        // mapping covers the whole range and the old one is dropped on
        // assignment.
        *mmap = unsafe { MmapMut::map_mut(&self.file)? };

        #[allow(clippy::cast_possible_truncation)]
        write_u32(&mut mmap, block_start, vectors.len() as u32);
        #[allow(clippy::cast_possible_truncation)]
        write_u32(&mut mmap, block_start + 4, self.dimension as u32);
        write_u32(&mut mmap, block_start + 12, block_id);
        // Bytes 16..32 stay zero (ftruncate zero-fills new pages).

        let row = self.dimension * FLOAT_SIZE;
        let mut cursor = body_start;
        for vector in vectors {
            debug_assert_eq!(vector.len(), self.dimension);
            store_floats(&mut mmap[cursor..cursor + row], vector);
            cursor += row;
        }

        let checksum = if self.write_checksums {
            let mut hasher = crc32fast::Hasher::new();
            hasher.update(&mmap[body_start..raw_end]);
            hasher.finalize()
        } else {
            0
        };
        write_u32(&mut mmap, block_start + 8, checksum);

        // Block body first, header count last.
        mmap.flush_range(block_start, padded_end - block_start)?;
        write_u32(&mut mmap, 12, new_total);
        mmap.flush_range(0, HEADER_LEN)?;
        drop(mmap);

        self.data_end = padded_end;
        self.vector_count = new_total;
        self.next_block_id += 1;
        Ok(block_id)
    }

    /// Reads every valid block in order.
    ///
    /// Scanning stops at the first corrupt block header, dimension
    /// mismatch, truncated body, or checksum mismatch; blocks before it are
    /// returned. A zero checksum slot skips verification.
    #[must_use]
    pub fn read_blocks(&self) -> Vec<RecoveredBlock> {
        let mmap = self.mmap.read();
        let mut blocks = Vec::new();
        let mut offset = HEADER_LEN;

        while offset + BLOCK_HEADER_LEN <= mmap.len() {
            let count = read_u32(&mmap, offset) as usize;
            let dim = read_u32(&mmap, offset + 4) as usize;
            let checksum = read_u32(&mmap, offset + 8);
            let block_id = read_u32(&mmap, offset + 12);

            if count == 0 {
                break;
            }
            if dim != self.dimension {
                warn!(block_id, dim, "block dimension mismatch, stopping scan");
                break;
            }

            let body_start = offset + BLOCK_HEADER_LEN;
            let body_len = count * dim * FLOAT_SIZE;
            let raw_end = body_start + body_len;
            if raw_end > mmap.len() {
                warn!(block_id, "truncated block body, stopping scan");
                break;
            }

            if checksum != 0 {
                let mut hasher = crc32fast::Hasher::new();
                hasher.update(&mmap[body_start..raw_end]);
                if hasher.finalize() != checksum {
                    warn!(block_id, "block checksum mismatch, stopping scan");
                    break;
                }
            }

            blocks.push(RecoveredBlock {
                block_id,
                count,
                floats: load_floats(&mmap[body_start..raw_end]),
            });
            offset = align_block_end(raw_end);
        }
        blocks
    }

    /// Flushes the mapping to disk.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the msync fails.
    pub fn flush(&self) -> Result<()> {
        self.mmap.write().flush()?;
        Ok(())
    }

    /// Walks block headers to find the append position and next block id.
    ///
    /// Checksums are not verified here; this only needs sizes.
    fn scan_extent(mmap: &MmapMut, dimension: usize) -> (usize, u32) {
        let mut offset = HEADER_LEN;
        let mut next_block_id = 0;

        while offset + BLOCK_HEADER_LEN <= mmap.len() {
            let count = read_u32(mmap, offset) as usize;
            let dim = read_u32(mmap, offset + 4) as usize;
            let block_id = read_u32(mmap, offset + 12);
            if count == 0 || dim != dimension {
                break;
            }
            let raw_end = offset + BLOCK_HEADER_LEN + count * dim * FLOAT_SIZE;
            if raw_end > mmap.len() {
                break;
            }
            offset = align_block_end(raw_end);
            next_block_id = block_id + 1;
        }
        (offset, next_block_id)
    }
}

impl Drop for CheckpointFile {
    fn drop(&mut self) {
        if let Some(mmap) = self.mmap.try_write() {
            if let Err(e) = mmap.flush() {
                error!(?e, "failed to flush checkpoint mmap on drop");
            }
        }
    }
}

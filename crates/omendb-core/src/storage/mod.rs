//! Crash-durable checkpoint storage.
//!
//! Two companion files per checkpoint path: `<path>.vectors` holds raw float
//! payloads in 64 KiB-aligned blocks behind a 1 KiB file header, and
//! `<path>.meta` holds the per-block string-id tables. The graph itself is
//! never persisted; recovery rebuilds it by re-insertion.

pub mod meta;
pub mod mmap;

pub use mmap::{CheckpointFile, RecoveredBlock};

//! Runtime-tunable constants.
//!
//! This crate persists nothing: there is no config file to load. Instead a
//! handful of atomics hold values an embedding UI may want to tweak at
//! runtime — a static atomic plus a getter/setter pair, updated lazily
//! (existing workers keep the value they started with).

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Bytes read per indexing chunk.
pub const INDEX_CHUNK_BYTES: usize = 5 * 1024 * 1024;

/// Lines per block in the compressed line-offset storage.
pub const BLOCK_SIZE: usize = 256;

/// Lines per chunk evaluated by the search worker.
pub const SEARCH_CHUNK_LINES: usize = 5000;

/// Visible-column tab stop width.
pub const TAB_STOP: usize = 8;

/// Upper bound on distinct threads with a private decode-cache slot before
/// overflow threads fall back to sharing slot 0.
pub const MAX_READER_THREADS: usize = 16;

const DEFAULT_POLLING_INTERVAL_MS: u64 = 1000;

/// Filesystem watcher polling interval in milliseconds. Zero disables
/// polling entirely; nonzero enables periodic stat-based checks as a
/// fallback regardless of OS event delivery. Applies to watches registered
/// after the change.
static POLLING_INTERVAL_MS: AtomicU64 = AtomicU64::new(DEFAULT_POLLING_INTERVAL_MS);

/// Whether the unified filtered view defaults to showing both matches and
/// marks.
static DEFAULT_VISIBILITY_BOTH: AtomicBool = AtomicBool::new(true);

pub fn polling_interval_ms() -> u64 {
    POLLING_INTERVAL_MS.load(Ordering::Relaxed)
}

pub fn set_polling_interval_ms(ms: u64) {
    POLLING_INTERVAL_MS.store(ms, Ordering::Relaxed);
}

pub fn default_visibility_both() -> bool {
    DEFAULT_VISIBILITY_BOTH.load(Ordering::Relaxed)
}

pub fn set_default_visibility_both(both: bool) {
    DEFAULT_VISIBILITY_BOTH.store(both, Ordering::Relaxed);
}

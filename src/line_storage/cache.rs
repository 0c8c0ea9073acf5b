//! Per-thread single-entry read cache.
//!
//! Sequential scrolling through a log re-reads `at(i)`, `at(i+1)`,
//! `at(i+2)`, … from the same thread. Remembering the last decoded
//! position's byte cursor inside its block turns that common path into
//! "decode one more delta" instead of "walk the block prefix from the
//! start" — O(1) amortized instead of O(BLOCK_SIZE).
//!
//! Each *thread* gets a small integer slot, assigned once via a wait-free
//! `fetch_add` the first time that thread touches any
//! [`super::CompressedLineStorage`] — plain thread-local storage would work
//! just as well here, but a lock-free slot table sized to
//! `MAX_READER_THREADS` keeps the cache's lifetime tied to the storage
//! instance rather than the thread. Each storage instance then owns its own
//! `MAX_READER_THREADS`-sized array of slots, so the cache is private to a
//! (thread, storage) pair without needing per-instance TLS. Threads beyond
//! the cap share slot 0, which just means they cache-miss more often
//! against each other — never a correctness problem, since a stale cache
//! entry is always re-validated against the requested index before use.

use std::cell::Cell;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use crate::config::MAX_READER_THREADS;
use crate::ignore_poison::IgnorePoison;

static NEXT_SLOT: AtomicU32 = AtomicU32::new(0);

thread_local! {
    static MY_SLOT: Cell<Option<usize>> = const { Cell::new(None) };
}

/// Returns the calling thread's slot index, assigning one on first use.
pub fn current_slot() -> usize {
    MY_SLOT.with(|cell| {
        if let Some(slot) = cell.get() {
            return slot;
        }
        let assigned = NEXT_SLOT.fetch_add(1, Ordering::Relaxed) as usize;
        let slot = if assigned < MAX_READER_THREADS { assigned } else { 0 };
        cell.set(Some(slot));
        slot
    })
}

/// A single remembered decode position.
#[derive(Clone, Copy)]
pub struct CacheEntry {
    /// Global line index this entry describes.
    pub line: u32,
    /// Absolute byte offset at `line`.
    pub offset: u64,
    /// Whether `line` lives in the 64-bit pool.
    pub pool_is_64: bool,
    pub block_idx: usize,
    /// Byte cursor into the block's delta stream just after decoding `line`.
    pub cursor: usize,
    /// Entry index within the block (0 = the block's absolute first offset).
    pub entry_in_block: usize,
}

pub struct ReadCache {
    slots: Vec<Mutex<Option<CacheEntry>>>,
}

impl ReadCache {
    pub fn new() -> Self {
        Self {
            slots: (0..MAX_READER_THREADS).map(|_| Mutex::new(None)).collect(),
        }
    }

    /// Returns the calling thread's cached entry, if any.
    pub fn get(&self) -> Option<CacheEntry> {
        let slot = current_slot();
        *self.slots[slot].lock_ignore_poison()
    }

    pub fn set(&self, entry: CacheEntry) {
        let slot = current_slot();
        *self.slots[slot].lock_ignore_poison() = Some(entry);
    }

    /// Drops every cached position. Called on append/truncation/clear, since
    /// cached block cursors become meaningless once block contents change.
    pub fn invalidate_all(&self) {
        for slot in &self.slots {
            *slot.lock_ignore_poison() = None;
        }
    }
}

impl Default for ReadCache {
    fn default() -> Self {
        Self::new()
    }
}

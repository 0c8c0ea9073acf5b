//! Compressed, append-only storage for a file's end-of-line offsets.
//!
//! Offsets are split across two pools keyed by whether they fit in 32 bits.
//! Most logs never cross the 4 GiB line, so the 32-bit pool carries the
//! common case at half the per-entry width; `first_long_line` records where
//! the switch happened and never moves backward once set (a later short
//! offset after a long one still belongs in the 64-bit pool, since pool
//! membership is about position in the file, not offset magnitude for that
//! particular line — see `append`).
//!
//! Within a pool, lines are grouped into fixed-size blocks (`config::BLOCK_SIZE`)
//! storing one absolute offset per block followed by delta-encoded entries
//! (see [`delta`]). `at(i)` locates the block by division, then decodes
//! forward from either the block start or a cached cursor (see [`cache`]).

mod cache;
mod delta;

#[cfg(test)]
mod mod_test;

use cache::{CacheEntry, ReadCache};
use delta::Decoded;

use crate::config::BLOCK_SIZE;

/// One block's worth of encoded entries: a leading absolute offset followed
/// by `delta::encode_entry`-encoded deltas/absolutes.
struct Block {
    /// Absolute offset of the block's first line.
    first_offset: u64,
    /// Encoded bytes for lines `1..block.len()` within the block.
    data: Vec<u8>,
    /// Number of lines stored in this block (1 + number of encoded entries).
    count: usize,
    /// Offset of the block's last line, kept in step with `data` so `push`
    /// doesn't have to decode the whole block just to find it.
    last_offset: u64,
}

impl Block {
    fn new(first_offset: u64) -> Self {
        Self { first_offset, data: Vec::new(), count: 1, last_offset: first_offset }
    }
}

/// One offset pool (32-bit or 64-bit).
struct Pool {
    blocks: Vec<Block>,
    is_64: bool,
}

impl Pool {
    fn new(is_64: bool) -> Self {
        Self { blocks: Vec::new(), is_64 }
    }

    fn len(&self) -> usize {
        match self.blocks.last() {
            None => 0,
            Some(_) => {
                let full_blocks = self.blocks.len().saturating_sub(1);
                full_blocks * BLOCK_SIZE + self.blocks.last().map_or(0, |b| b.count)
            }
        }
    }

    /// Appends `value`, which must be strictly greater than the pool's
    /// current last offset (or be the pool's very first entry). O(1): the
    /// block already knows its own last offset, so this never decodes.
    fn push(&mut self, value: u64) {
        let needs_new_block = match self.blocks.last() {
            None => true,
            Some(b) => b.count >= BLOCK_SIZE,
        };
        if needs_new_block {
            self.blocks.push(Block::new(value));
            return;
        }
        let block = self.blocks.last_mut().unwrap();
        delta::encode_entry(&mut block.data, block.last_offset, value, self.is_64);
        block.count += 1;
        block.last_offset = value;
    }

    /// Decodes the `local`-th line (0-based within the pool), optionally
    /// resuming from a cached position in the same block.
    fn at(&self, local: usize, cached: Option<&CacheEntry>) -> (u64, CacheEntry) {
        let block_idx = local / BLOCK_SIZE;
        let entry_in_block = local % BLOCK_SIZE;
        let block = &self.blocks[block_idx];

        if entry_in_block == 0 {
            let entry = CacheEntry {
                line: local as u32,
                offset: block.first_offset,
                pool_is_64: self.is_64,
                block_idx,
                cursor: 0,
                entry_in_block: 0,
            };
            return (block.first_offset, entry);
        }

        // Try to resume from a cached position in the same block, at or
        // before the target entry.
        let (mut offset, mut cursor, mut at_entry) = match cached {
            Some(c) if c.block_idx == block_idx && c.entry_in_block <= entry_in_block => {
                (c.offset, c.cursor, c.entry_in_block)
            }
            _ => (block.first_offset, 0, 0),
        };

        while at_entry < entry_in_block {
            offset = match delta::decode_entry(&block.data, &mut cursor, self.is_64) {
                Decoded::Delta(d) => offset + d,
                Decoded::Absolute(v) => v,
            };
            at_entry += 1;
        }

        let entry = CacheEntry {
            line: local as u32,
            offset,
            pool_is_64: self.is_64,
            block_idx,
            cursor,
            entry_in_block,
        };
        (offset, entry)
    }

    /// Removes the pool's last entry. Returns `true` if a whole block was
    /// deallocated (the popped entry was a block's sole/first entry).
    fn pop(&mut self) -> bool {
        let block = self.blocks.last_mut().expect("pop on empty pool");
        if block.count == 1 {
            self.blocks.pop();
            true
        } else {
            // Re-walk from the block start to find where the last entry's
            // encoding begins, then truncate the data buffer there. Rare
            // path (pop_back is used once per fake-final-LF rewrite), so
            // this doesn't need the running-cursor treatment `push` gets.
            let mut cursor = 0;
            let mut last_start = 0;
            let mut offset = block.first_offset;
            let mut prev_offset = block.first_offset;
            for _ in 1..block.count {
                last_start = cursor;
                prev_offset = offset;
                offset = match delta::decode_entry(&block.data, &mut cursor, self.is_64) {
                    Decoded::Delta(d) => offset + d,
                    Decoded::Absolute(v) => v,
                };
            }
            block.data.truncate(last_start);
            block.count -= 1;
            block.last_offset = prev_offset;
            false
        }
    }
}

/// Threshold at which an offset moves from the 32-bit pool to the 64-bit one.
const SPLIT_THRESHOLD: u64 = 1u64 << 32;

/// Append-only, randomly-accessible sequence of strictly increasing byte
/// offsets.
pub struct CompressedLineStorage {
    pool32: Pool,
    pool64: Pool,
    /// Index (in the combined sequence) of the first line stored in
    /// `pool64`. `None` until an offset crosses [`SPLIT_THRESHOLD`]; never
    /// moves backward once set.
    first_long_line: Option<u32>,
    cache: ReadCache,
}

impl CompressedLineStorage {
    pub fn new() -> Self {
        Self {
            pool32: Pool::new(false),
            pool64: Pool::new(true),
            first_long_line: None,
            cache: ReadCache::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.pool32.len() + self.pool64.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Appends `offset`, which must be strictly greater than the current
    /// last offset. Amortized O(1); may allocate a new block.
    pub fn append(&mut self, offset: u64) {
        let goes_long = self.first_long_line.is_some() || offset >= SPLIT_THRESHOLD;
        if goes_long && self.first_long_line.is_none() {
            self.first_long_line = Some(self.len() as u32);
        }
        if goes_long {
            self.pool64.push(offset);
        } else {
            self.pool32.push(offset);
        }
        // The just-written tail invalidates any cached cursor that assumed
        // a block was already full.
        self.cache.invalidate_all();
    }

    /// Semantically equivalent to calling [`Self::append`] for each element
    /// of `batch`, in order.
    pub fn append_list(&mut self, batch: &[u64]) {
        for &offset in batch {
            self.append(offset);
        }
    }

    /// Random access by line index. O(1) amortized (sequential access from
    /// the same thread hits the per-thread cache), O(BLOCK_SIZE) worst case.
    pub fn at(&self, index: usize) -> u64 {
        assert!(index < self.len(), "line index out of range");
        let split = self.first_long_line.map(|v| v as usize);
        match split {
            Some(split) if index >= split => {
                let cached = self.cache.get().filter(|c| c.pool_is_64);
                let (offset, entry) = self.pool64.at(index - split, cached.as_ref());
                self.cache.set(entry);
                offset
            }
            _ => {
                let cached = self.cache.get().filter(|c| !c.pool_is_64);
                let (offset, entry) = self.pool32.at(index, cached.as_ref());
                self.cache.set(entry);
                offset
            }
        }
    }

    /// Removes the last entry. O(1); used exactly once per fake-final-LF
    /// rewrite.
    pub fn pop_back(&mut self) {
        assert!(!self.is_empty(), "pop_back on empty storage");
        self.cache.invalidate_all();
        let was_long = match self.first_long_line {
            Some(split) => (self.len() - 1) >= split as usize,
            None => false,
        };
        if was_long {
            self.pool64.pop();
            // If the popped entry was the one that originally crossed the
            // threshold, undo the split too: the next append re-derives it
            // from the offset it's given, same as on a pool that never
            // split.
            if self.first_long_line == Some(self.len() as u32) {
                self.first_long_line = None;
            }
        } else {
            self.pool32.pop();
        }
    }
}

impl Default for CompressedLineStorage {
    fn default() -> Self {
        Self::new()
    }
}

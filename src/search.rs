//! SearchWorker: chunked regex evaluation over a [`crate::log_data::LogData`].
//!
//! A worker thread pulls fixed-size chunks under a mutex, reporting progress
//! after each chunk, operating over line ranges and optionally fanning a
//! chunk out across a `rayon` pool.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use rayon::prelude::*;
use regex::{Regex, RegexBuilder};

use crate::config::SEARCH_CHUNK_LINES;
use crate::events::{self, Event, EventSender, SearchFinishStatus};
use crate::ignore_poison::IgnorePoison;
use crate::log_data::LineOrientedSource;

/// A line number known to match the active pattern.
pub type LineNumber = u32;

/// Sorted, duplicate-free set of matching line numbers. A `Vec` suffices:
/// entries are only ever appended in increasing order (within a chunk) or
/// merged in sorted order (across parallel partitions), and the one
/// deletion an update-search pre-step ever asks for always targets the
/// last entry.
#[derive(Debug, Default, Clone)]
pub struct SearchResultArray {
    lines: Vec<LineNumber>,
}

impl SearchResultArray {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn contains(&self, line: LineNumber) -> bool {
        self.lines.binary_search(&line).is_ok()
    }

    pub fn get(&self, index: usize) -> Option<LineNumber> {
        self.lines.get(index).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = LineNumber> + '_ {
        self.lines.iter().copied()
    }

    /// Position of `line` in the sorted set, for reverse lookup.
    pub fn position(&self, line: LineNumber) -> Option<usize> {
        self.lines.binary_search(&line).ok()
    }

    /// Merges an already-sorted batch in, preserving order and uniqueness.
    /// Appends in the common case (`batch`'s first entry is past the
    /// current tail); falls back to a full merge otherwise, which only
    /// happens when parallel partitions report out of line order.
    fn merge_sorted(&mut self, batch: &[LineNumber]) {
        if batch.is_empty() {
            return;
        }
        if self.lines.last().is_none_or(|&last| *batch.first().unwrap() > last) {
            self.lines.extend_from_slice(batch);
            return;
        }
        let mut merged = Vec::with_capacity(self.lines.len() + batch.len());
        let (mut i, mut j) = (0, 0);
        while i < self.lines.len() && j < batch.len() {
            match self.lines[i].cmp(&batch[j]) {
                std::cmp::Ordering::Less => {
                    merged.push(self.lines[i]);
                    i += 1;
                }
                std::cmp::Ordering::Greater => {
                    merged.push(batch[j]);
                    j += 1;
                }
                std::cmp::Ordering::Equal => {
                    merged.push(self.lines[i]);
                    i += 1;
                    j += 1;
                }
            }
        }
        merged.extend_from_slice(&self.lines[i..]);
        merged.extend_from_slice(&batch[j..]);
        self.lines = merged;
    }

    /// Removes the match at `line`, if present: the formerly-last line is
    /// re-checked after growth, before resuming the scan.
    fn remove(&mut self, line: LineNumber) -> bool {
        match self.lines.binary_search(&line) {
            Ok(idx) => {
                self.lines.remove(idx);
                true
            }
            Err(_) => false,
        }
    }
}

/// Search state shared between the worker and its consumer.
#[derive(Debug, Default)]
pub struct SearchData {
    pub matches: SearchResultArray,
    pub max_length: usize,
    pub nb_lines_processed: u32,
    /// Matches appended since the last [`Self::drain_new_matches`] call, in
    /// the order they were found (increasing, since chunks are scanned in
    /// increasing line order). A consumer folds these into its own derived
    /// view instead of re-merging the whole match set on every read.
    new_matches: Vec<LineNumber>,
}

impl SearchData {
    /// Atomically takes and clears the matches accumulated since the last
    /// drain.
    pub fn drain_new_matches(&mut self) -> Vec<LineNumber> {
        std::mem::take(&mut self.new_matches)
    }
}

/// Drives regex evaluation over a [`LineOrientedSource`] in chunks,
/// reporting progress and merging results into a shared [`SearchData`].
pub struct SearchWorker {
    cancel: AtomicBool,
}

impl SearchWorker {
    pub fn new() -> Self {
        Self { cancel: AtomicBool::new(false) }
    }

    pub fn interrupt(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    fn reset_cancel(&self) {
        self.cancel.store(false, Ordering::Relaxed);
    }

    /// Evaluates `pattern` over `[start_line, end_line)` of `source`,
    /// merging matches into `data` chunk by chunk. `case_insensitive`
    /// mirrors the flag that accompanies every user-supplied pattern. An
    /// uncompilable `pattern` is reported via `search_finished` with
    /// [`SearchFinishStatus::InvalidPattern`] and the search contributes no
    /// matches rather than failing hard.
    pub fn run<S: LineOrientedSource + Sync + ?Sized>(
        &self,
        source: &S,
        pattern: &str,
        case_insensitive: bool,
        start_line: u32,
        end_line: u32,
        data: &Mutex<SearchData>,
        sender: Option<&EventSender>,
    ) {
        self.reset_cancel();

        let regex = match RegexBuilder::new(pattern).case_insensitive(case_insensitive).build() {
            Ok(r) => r,
            Err(_) => {
                if let Some(s) = sender {
                    events::notify(s, Event::SearchFinished(SearchFinishStatus::InvalidPattern));
                }
                return;
            }
        };

        let total = source.line_count().min(end_line as usize) as u32;
        let mut next = start_line;
        let mut nb_matches_total = data.lock_ignore_poison().matches.len();

        while next < total {
            if self.cancel.load(Ordering::Relaxed) {
                if let Some(s) = sender {
                    events::notify(s, Event::SearchFinished(SearchFinishStatus::Interrupted));
                }
                return;
            }

            let chunk_end = (next + SEARCH_CHUNK_LINES as u32).min(total);
            let (batch, max_len) = scan_chunk(source, &regex, next, chunk_end);

            {
                let mut guard = data.lock_ignore_poison();
                guard.matches.merge_sorted(&batch);
                guard.new_matches.extend_from_slice(&batch);
                guard.max_length = guard.max_length.max(max_len);
                guard.nb_lines_processed = chunk_end;
            }
            nb_matches_total += batch.len();

            let percent = if total == start_line { 100 } else { (((chunk_end - start_line) * 100) / (total - start_line).max(1)).min(100) as u8 };
            if let Some(s) = sender {
                events::notify(
                    s,
                    Event::SearchProgressed { nb_matches: nb_matches_total, percent, initial_line: next },
                );
            }
            next = chunk_end;
        }

        if let Some(s) = sender {
            events::notify(s, Event::SearchFinished(SearchFinishStatus::Completed));
        }
    }

    /// Deletes the match recorded at `line`, if any — the update-search
    /// pre-step that re-checks the formerly-last line after growth.
    pub fn forget_match(&self, data: &Mutex<SearchData>, line: LineNumber) {
        data.lock_ignore_poison().matches.remove(line);
    }
}

impl Default for SearchWorker {
    fn default() -> Self {
        Self::new()
    }
}

/// Evaluates `regex` over `[start, end)`, returning matching line numbers in
/// ascending order plus the max expanded length seen. Partitions the range
/// across a `rayon` pool when it is worth the overhead: each partition
/// produces a sorted result, merged in a final step.
fn scan_chunk<S: LineOrientedSource + Sync + ?Sized>(
    source: &S,
    regex: &Regex,
    start: u32,
    end: u32,
) -> (Vec<LineNumber>, usize) {
    const PARALLEL_THRESHOLD: u32 = 1000;
    if end - start < PARALLEL_THRESHOLD {
        return scan_range(source, regex, start, end);
    }

    let partitions = rayon::current_num_threads().max(1) as u32;
    let span = (end - start).div_ceil(partitions);
    let ranges: Vec<(u32, u32)> =
        (start..end).step_by(span as usize).map(|p| (p, (p + span).min(end))).collect();

    // Each partition produces its own sorted result; a final sort-merge
    // combines them.
    let results: Vec<(Vec<LineNumber>, usize)> =
        ranges.into_par_iter().map(|(a, b)| scan_range(source, regex, a, b)).collect();

    let mut matches = Vec::new();
    let mut max_len = 0;
    for (batch, len) in results {
        matches.extend(batch);
        max_len = max_len.max(len);
    }
    matches.sort_unstable();
    (matches, max_len)
}

fn scan_range<S: LineOrientedSource + Sync + ?Sized>(
    source: &S,
    regex: &Regex,
    start: u32,
    end: u32,
) -> (Vec<LineNumber>, usize) {
    let mut matches = Vec::new();
    let mut max_len = 0;
    for line in start..end {
        let text = source.line(line as usize);
        if regex.is_match(&text) {
            matches.push(line);
            max_len = max_len.max(source.line_length(line as usize));
        }
    }
    (matches, max_len)
}

/// Convenience wrapper for spawning [`SearchWorker::run`] on a background
/// thread and returning a join handle the caller can ignore or await.
pub fn spawn_search<S>(
    source: Arc<S>,
    worker: Arc<SearchWorker>,
    pattern: String,
    case_insensitive: bool,
    start_line: u32,
    end_line: u32,
    data: Arc<Mutex<SearchData>>,
    sender: Option<EventSender>,
) -> std::thread::JoinHandle<()>
where
    S: LineOrientedSource + Send + Sync + 'static,
{
    std::thread::spawn(move || {
        worker.run(source.as_ref(), &pattern, case_insensitive, start_line, end_line, &data, sender.as_ref());
    })
}

//! Indexer: streams a file in chunks, locates line terminators, and appends
//! their offsets to a shared [`IndexingData`].
//!
//! The scan loop is a fixed-size read buffer plus `memchr` for the
//! terminator search, with a leftover buffer carrying any partial line or
//! terminator across chunk boundaries. Matches are appended into a
//! [`crate::line_storage::CompressedLineStorage`], cancellation is
//! cooperative via an `AtomicBool` checked between chunks, terminator width
//! is encoding-aware, line length tracking is tab-expanded, and a
//! fake-final-LF flag lets a resumable, growing index retract and recompute
//! its synthetic trailing terminator as new bytes arrive.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use memchr::memchr;
use serde::{Deserialize, Serialize};

use crate::config::INDEX_CHUNK_BYTES;
use crate::encoding::{self, Encoding};
use crate::error::{Error, Result};
use crate::events::{self, Event, EventSender};
use crate::ignore_poison::IgnorePoison;
use crate::line_storage::CompressedLineStorage;

/// How an indexing operation concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexingStatus {
    Successful,
    Interrupted,
    NoMemory,
}

/// How the file on disk compares to what's already indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileChange {
    Unchanged,
    DataAdded,
    Truncated,
}

/// The process-wide (per open file) shared index. Mutated only by the
/// indexer worker, under its own mutex; readers take the lock only long
/// enough to read an offset or the current size, never across file I/O.
pub struct IndexingData {
    pub line_ends: CompressedLineStorage,
    pub indexed_size: u64,
    pub max_length: usize,
    pub encoding_guess: Encoding,
    pub encoding_forced: Option<Encoding>,
    /// Set when the last line has no terminator in the file and a synthetic
    /// one was appended so callers can slice ranges uniformly.
    pub fake_final_lf: bool,
}

impl IndexingData {
    fn new() -> Self {
        Self {
            line_ends: CompressedLineStorage::new(),
            indexed_size: 0,
            max_length: 0,
            encoding_guess: Encoding::Ascii,
            encoding_forced: None,
            fake_final_lf: false,
        }
    }

    pub fn effective_encoding(&self) -> Encoding {
        self.encoding_forced.unwrap_or(self.encoding_guess)
    }

    pub fn line_count(&self) -> usize {
        self.line_ends.len()
    }
}

impl Default for IndexingData {
    fn default() -> Self {
        Self::new()
    }
}

/// Drives indexing of one attached file. Owned by `LogData`; its methods run
/// on the operation-queue's worker thread.
pub struct Indexer {
    path: PathBuf,
    cancel: AtomicBool,
}

impl Indexer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), cancel: AtomicBool::new(false) }
    }

    /// Sets the cooperative cancellation flag, checked between chunks.
    pub fn interrupt(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    fn reset_cancel(&self) {
        self.cancel.store(false, Ordering::Relaxed);
    }

    /// Clears `data` and scans the whole file from offset 0.
    pub fn index_all(
        &self,
        data: &Mutex<IndexingData>,
        forced_encoding: Option<Encoding>,
        sender: Option<&EventSender>,
    ) -> Result<IndexingStatus> {
        {
            let mut guard = data.lock_ignore_poison();
            *guard = IndexingData::new();
            guard.encoding_forced = forced_encoding;
        }
        self.scan(data, 0, sender)
    }

    /// Appends newly-written bytes starting at `data.indexed_size`.
    /// Retracts a previously-appended fake final LF first: `from` rewinds
    /// by the length of the unterminated tail so the real terminator
    /// position is recomputed as the new bytes arrive.
    pub fn index_additional(
        &self,
        data: &Mutex<IndexingData>,
        sender: Option<&EventSender>,
    ) -> Result<IndexingStatus> {
        let from = {
            let mut guard = data.lock_ignore_poison();
            if guard.fake_final_lf {
                let n = guard.line_ends.len();
                let tail_start = if n >= 2 { guard.line_ends.at(n - 2) } else { 0 };
                guard.line_ends.pop_back();
                guard.indexed_size = tail_start;
                guard.fake_final_lf = false;
            }
            guard.indexed_size
        };
        self.scan(data, from, sender)
    }

    /// Compares the file's current size against `data.indexed_size`.
    pub fn check_file_changes(&self, data: &Mutex<IndexingData>) -> Result<FileChange> {
        let current_size = std::fs::metadata(&self.path)?.len();
        let indexed_size = data.lock_ignore_poison().indexed_size;
        Ok(if current_size == indexed_size {
            FileChange::Unchanged
        } else if current_size > indexed_size {
            FileChange::DataAdded
        } else {
            FileChange::Truncated
        })
    }

    fn scan(
        &self,
        data: &Mutex<IndexingData>,
        from: u64,
        sender: Option<&EventSender>,
    ) -> Result<IndexingStatus> {
        self.reset_cancel();
        log::info!("indexing {} from offset {from}", self.path.display());

        let mut file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::warn!("{} does not exist; treating as empty", self.path.display());
                if let Some(s) = sender {
                    events::notify(s, Event::LoadingFinished(IndexingStatus::Successful));
                }
                return Ok(IndexingStatus::Successful);
            }
            Err(e) => return Err(e.into()),
        };
        let total_size = file.metadata()?.len();
        file.seek(SeekFrom::Start(from))?;

        if from == 0 && total_size > 0 {
            let mut prefix = vec![0u8; INDEX_CHUNK_BYTES.min(64 * 1024).min(total_size as usize)];
            let n = file.read(&mut prefix)?;
            prefix.truncate(n);
            data.lock_ignore_poison().encoding_guess = encoding::detect(&prefix);
            file.seek(SeekFrom::Start(from))?;
        }

        let tab_stop = crate::config::TAB_STOP;
        let encoding = data.lock_ignore_poison().effective_encoding();

        let mut buf = vec![0u8; INDEX_CHUNK_BYTES];
        let mut carry: Vec<u8> = Vec::new();
        let mut scanned_abs = from;

        loop {
            if self.cancel.load(Ordering::Relaxed) {
                log::info!("indexing of {} interrupted", self.path.display());
                if let Some(s) = sender {
                    events::notify(s, Event::LoadingFinished(IndexingStatus::Interrupted));
                }
                return Ok(IndexingStatus::Interrupted);
            }

            let bytes_read = file.read(&mut buf)?;
            if bytes_read == 0 {
                break;
            }
            scanned_abs += bytes_read as u64;

            if !carry.is_empty() {
                carry.extend_from_slice(&buf[..bytes_read]);
            }
            let data_slice: &[u8] = if carry.is_empty() { &buf[..bytes_read] } else { &carry };
            let data_start_abs = scanned_abs - data_slice.len() as u64;

            let mut batch: Vec<u64> = Vec::new();
            let mut batch_max_len = 0usize;
            let mut pos = 0usize;
            while let Some(term_end) = find_terminator(&data_slice[pos..], encoding) {
                let line_end = pos + term_end;
                batch.push(data_start_abs + line_end as u64);
                let visible = encoding::visible_length(
                    &encoding::decode(&data_slice[pos..line_end - encoding.lf_width()], encoding),
                    tab_stop,
                );
                batch_max_len = batch_max_len.max(visible);
                pos = line_end;
            }

            let remainder = data_slice[pos..].to_vec();
            {
                let mut guard = data.lock_ignore_poison();
                guard.line_ends.append_list(&batch);
                guard.max_length = guard.max_length.max(batch_max_len);
                guard.indexed_size = data_start_abs + pos as u64;
            }
            carry = remainder;

            let percent = if total_size == 0 {
                100
            } else {
                (((data_start_abs + pos as u64) * 100) / total_size).min(100) as u8
            };
            if let Some(s) = sender {
                events::notify(s, Event::LoadingProgressed(percent));
            }
        }

        // `carry` now holds bytes past the last confirmed terminator: an
        // unterminated tail. Synthesize a fake final LF one byte past the
        // real EOF (offset `file_size + 1`) so downstream range slicing can
        // treat every line uniformly. `indexed_size` stays at the real file
        // size — only `line_ends` carries the +1 fake entry — so
        // `get_file_size` keeps reporting the true length.
        if !carry.is_empty() {
            let mut guard = data.lock_ignore_poison();
            let real_size = guard.indexed_size + carry.len() as u64;
            guard.line_ends.append(real_size + 1);
            let visible = encoding::visible_length(&encoding::decode(&carry, encoding), tab_stop);
            guard.max_length = guard.max_length.max(visible);
            guard.indexed_size = real_size;
            guard.fake_final_lf = true;
        }

        let (lines, bytes) = {
            let guard = data.lock_ignore_poison();
            (guard.line_count(), guard.indexed_size)
        };
        log::info!("indexing of {} finished: {lines} lines, {bytes} bytes", self.path.display());
        if let Some(s) = sender {
            events::notify(s, Event::LoadingFinished(IndexingStatus::Successful));
        }
        Ok(IndexingStatus::Successful)
    }
}

/// Locates the next line terminator in `data`, returning the byte index
/// just past it (so `data[..idx]` is the line including its terminator), or
/// `None` if no complete terminator is present.
fn find_terminator(data: &[u8], encoding: Encoding) -> Option<usize> {
    let width = encoding.lf_width();
    if width == 1 {
        return memchr(b'\n', data).map(|idx| idx + 1);
    }
    // Multi-byte terminator: U+000A encoded as `width` bytes with a single
    // 0x0A at `lf_index_within_code_unit` and zero bytes elsewhere.
    let lf_idx = encoding.lf_index_within_code_unit();
    let mut search_from = 0;
    loop {
        let rel = memchr(b'\n', data.get(search_from..)?)?;
        let abs = search_from + rel;
        if abs < lf_idx {
            search_from = abs + 1;
            continue;
        }
        let unit_start = abs - lf_idx;
        if unit_start + width > data.len() {
            return None;
        }
        let unit = &data[unit_start..unit_start + width];
        if unit.iter().enumerate().all(|(i, &b)| (i == lf_idx) == (b == b'\n')) {
            return Some(unit_start + width);
        }
        search_from = abs + 1;
    }
}

/// Resolves a path to an openable file, surfacing directory-vs-file
/// mismatches distinctly from a missing path.
pub fn validate_path(path: &Path) -> Result<()> {
    let metadata = std::fs::metadata(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => Error::NotFound(path.display().to_string()),
        _ => Error::from(e),
    })?;
    if metadata.is_dir() {
        return Err(Error::IsDirectory);
    }
    Ok(())
}

#[cfg(test)]
mod indexer_test;

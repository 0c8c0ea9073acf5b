//! LogData: the single point of access to an attached file's content.
//!
//! Owns the file path, the shared [`IndexingData`], the indexer worker, the
//! watcher registration, and the [`OperationQueue`] that serializes
//! operations against all three. Line reads open a fresh file handle per
//! call rather than holding one open across the struct's lifetime, so no
//! shared file mutex is ever contended and descriptors never outlive a
//! single seek+read.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use crate::config;
use crate::encoding::{self, Encoding};
use crate::error::{Error, Result};
use crate::events::{self, Event, EventSender, FileChangeStatus};
use crate::ignore_poison::IgnorePoison;
use crate::indexer::{self, FileChange, Indexer, IndexingData, IndexingStatus};
use crate::operation_queue::{Op, OperationQueue};
use crate::watcher::{self, Watch};

#[cfg(test)]
mod log_data_test;

/// Common read contract shared by [`LogData`] (the raw file) and
/// [`crate::filtered_data::FilteredData`] (the derived view): a single
/// trait with two concrete implementations, rather than a shared base
/// type.
pub trait LineOrientedSource {
    fn line_count(&self) -> usize;
    fn max_length(&self) -> usize;
    fn line(&self, index: usize) -> String;
    fn expanded_line(&self, index: usize) -> String;
    fn line_length(&self, index: usize) -> usize;
}

/// A cursor position within a [`LineOrientedSource`]: a line number plus a
/// 0-based column in the decoded (tab-expanded) line. Carried opaquely by
/// this crate for a consuming UI's caret/selection state; nothing here
/// interprets it beyond clamping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FilePosition {
    pub line: u32,
    pub column: usize,
}

impl FilePosition {
    pub fn new(line: u32, column: usize) -> Self {
        Self { line, column }
    }

    /// Clamps `self.column` to `source`'s line length at `self.line`, so a
    /// position recorded against a longer line (for example before a
    /// truncation) stays valid.
    pub fn clamped<S: LineOrientedSource + ?Sized>(self, source: &S) -> Self {
        if self.line as usize >= source.line_count() {
            return Self { line: self.line, column: 0 };
        }
        let max_column = source.line_length(self.line as usize);
        Self { line: self.line, column: self.column.min(max_column) }
    }
}

struct Shared {
    path: Mutex<Option<PathBuf>>,
    indexing: Mutex<IndexingData>,
    indexer: Mutex<Option<Arc<Indexer>>>,
    watch: Mutex<Option<Watch>>,
    sender: Mutex<Option<EventSender>>,
    /// Whether the current pending/executing reaction to file growth has
    /// already been classified DataAdded, so further growth coalesces into
    /// it rather than spawning a second partial reindex.
    currently_data_added: AtomicBool,
    /// Callbacks invoked when a truncation is detected, before the
    /// compensating full reindex starts. `FilteredData::new` registers one
    /// per derived view so its matches and marks are cleared per spec: a
    /// filtered view's search results and marks are only meaningful against
    /// the file content they were computed from.
    on_truncate: Mutex<Vec<Box<dyn Fn() + Send + Sync>>>,
}

/// Single point of access to an attached file's content.
pub struct LogData {
    shared: Arc<Shared>,
    queue: OperationQueue,
}

impl LogData {
    pub fn new() -> Self {
        let shared = Arc::new(Shared {
            path: Mutex::new(None),
            indexing: Mutex::new(IndexingData::default()),
            indexer: Mutex::new(None),
            watch: Mutex::new(None),
            sender: Mutex::new(None),
            currently_data_added: AtomicBool::new(false),
            on_truncate: Mutex::new(Vec::new()),
        });
        let dispatch_shared = Arc::clone(&shared);
        let queue = OperationQueue::new(move |op| dispatch(&dispatch_shared, op));
        Self { shared, queue }
    }

    /// Registers `sender` to receive progress/completion events. Only one
    /// sender is kept; call again to replace it.
    pub fn set_event_sender(&self, sender: EventSender) {
        *self.shared.sender.lock_ignore_poison() = Some(sender);
    }

    /// Attaches to `path` and starts indexing it. One-shot: calling this a
    /// second time on the same `LogData` is a contract violation, detected
    /// and reported rather than silently tolerated.
    ///
    /// `forced_encoding`, if given, is in effect for the very first index
    /// pass — not just for a later `reload` — since the encoding determines
    /// the terminator stride the indexer scans by (see
    /// [`Encoding::lf_width`]) and that can't be changed after the fact
    /// without rescanning.
    pub fn attach(&self, path: impl AsRef<Path>, forced_encoding: Option<Encoding>) -> Result<()> {
        let path = path.as_ref();
        {
            let mut guard = self.shared.path.lock_ignore_poison();
            if guard.is_some() {
                return Err(Error::AlreadyAttached);
            }
            *guard = Some(path.to_path_buf());
        }

        match indexer::validate_path(path) {
            Ok(()) | Err(Error::NotFound(_)) => {}
            Err(e) => return Err(e),
        }

        *self.shared.indexer.lock_ignore_poison() = Some(Arc::new(Indexer::new(path)));

        let queue_for_watch = self.queue.clone();
        let watch = watcher::watch(path, config::polling_interval_ms(), move || {
            queue_for_watch.enqueue(Op::CheckChanges);
        })?;
        *self.shared.watch.lock_ignore_poison() = Some(watch);

        self.queue.enqueue(Op::Attach { forced_encoding });
        Ok(())
    }

    /// Sets the cooperative cancellation flag on the active indexing
    /// operation, if any.
    pub fn interrupt_loading(&self) {
        if let Some(indexer) = self.shared.indexer.lock_ignore_poison().as_ref() {
            indexer.interrupt();
        }
    }

    /// Enqueues a full reindex, optionally with a forced encoding.
    pub fn reload(&self, forced_encoding: Option<Encoding>) {
        self.queue.enqueue(Op::FullReindex { forced_encoding });
    }

    pub fn get_file_size(&self) -> u64 {
        self.shared.indexing.lock_ignore_poison().indexed_size
    }

    pub fn get_last_modified(&self) -> Option<SystemTime> {
        let path = self.shared.path.lock_ignore_poison().clone()?;
        std::fs::metadata(path).ok()?.modified().ok()
    }

    pub fn get_max_length(&self) -> usize {
        self.shared.indexing.lock_ignore_poison().max_length
    }

    pub fn get_detected_encoding(&self) -> Encoding {
        self.shared.indexing.lock_ignore_poison().effective_encoding()
    }

    /// Overrides the encoding used for decoding. Does not affect how the
    /// indexer scans for line terminators in an already-completed index;
    /// takes effect on the next `reload`.
    pub fn set_display_encoding(&self, encoding: Encoding) {
        self.shared.indexing.lock_ignore_poison().encoding_forced = Some(encoding);
    }

    /// Stores multibyte terminator code-unit offsets for a future reindex.
    /// This implementation always keeps terminator code units intact
    /// across chunk boundaries by carrying incomplete trailing bytes into
    /// the next read rather than splitting mid-codepoint, so the offsets
    /// given here only ever describe whole code units.
    pub fn set_multibyte_encoding_offsets(&self, _before_cr: usize, _after_cr: usize) {
        // No additional state needed: `Encoding::lf_index_within_code_unit`
        // already derives the equivalent offset from the encoding itself.
    }

    pub fn get_line_length(&self, line: usize) -> usize {
        encoding::visible_length(&self.get_line_string(line), config::TAB_STOP)
    }

    pub fn get_line_string(&self, line: usize) -> String {
        self.get_lines(line, 1).into_iter().next().unwrap_or_default()
    }

    pub fn get_expanded_line_string(&self, line: usize) -> String {
        self.get_expanded_lines(line, 1).into_iter().next().unwrap_or_default()
    }

    /// Fetches `count` lines starting at `first`: look up the byte range
    /// under the IndexingData lock, release it, then read the range from a
    /// freshly opened file handle and split/decode it.
    pub fn get_lines(&self, first: usize, count: usize) -> Vec<String> {
        self.read_lines(first, count, false)
    }

    pub fn get_expanded_lines(&self, first: usize, count: usize) -> Vec<String> {
        self.read_lines(first, count, true)
    }

    fn read_lines(&self, first: usize, count: usize, expand: bool) -> Vec<String> {
        if count == 0 {
            return Vec::new();
        }
        let (b0, ends, encoding) = {
            let guard = self.shared.indexing.lock_ignore_poison();
            let total = guard.line_count();
            if first >= total {
                log::debug!("get_lines: index {first} out of range (0..{total}); returning empty");
                return Vec::new();
            }
            let count = count.min(total - first);
            let b0 = if first == 0 { 0 } else { guard.line_ends.at(first - 1) };
            let clamp = guard.indexed_size;
            let ends: Vec<u64> =
                (first..first + count).map(|i| guard.line_ends.at(i).min(clamp)).collect();
            (b0, ends, guard.effective_encoding())
        };

        let Some(path) = self.shared.path.lock_ignore_poison().clone() else {
            return vec![String::new(); ends.len()];
        };
        let b1 = *ends.last().unwrap_or(&b0);
        let buf = match read_range(&path, b0, b1) {
            Ok(b) => b,
            Err(e) => {
                log::warn!("get_lines: failed to read {} [{b0}, {b1}): {e}", path.display());
                return vec![String::new(); ends.len()];
            }
        };

        let mut out = Vec::with_capacity(ends.len());
        let mut start_rel = 0usize;
        for &end in &ends {
            let end_rel = (end - b0) as usize;
            let end_rel = end_rel.min(buf.len());
            let start_rel_clamped = start_rel.min(end_rel);
            let slice = &buf[start_rel_clamped..end_rel];
            let decoded = strip_terminator(&encoding::decode(slice, encoding));
            out.push(if expand { encoding::expand_tabs(&decoded, config::TAB_STOP).0 } else { decoded });
            start_rel = end_rel;
        }
        out
    }

    pub fn line_count(&self) -> usize {
        self.shared.indexing.lock_ignore_poison().line_count()
    }

    /// Creates a [`crate::filtered_data::FilteredData`] view over this log.
    /// Requires `self` already behind an `Arc`, since the filtered view
    /// outlives any single borrow and runs its own search worker against
    /// the same underlying file.
    pub fn create_filtered_data(self: &Arc<Self>) -> crate::filtered_data::FilteredData {
        crate::filtered_data::FilteredData::new(Arc::clone(self))
    }

    /// Registers `f` to run when this file is detected truncated, before the
    /// compensating full reindex starts. Not unregistered: every derived
    /// view created over this `LogData` lives at most as long as it does.
    pub(crate) fn register_truncation_observer<F>(&self, f: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.shared.on_truncate.lock_ignore_poison().push(Box::new(f));
    }
}

impl Default for LogData {
    fn default() -> Self {
        Self::new()
    }
}

impl LineOrientedSource for LogData {
    fn line_count(&self) -> usize {
        LogData::line_count(self)
    }
    fn max_length(&self) -> usize {
        self.get_max_length()
    }
    fn line(&self, index: usize) -> String {
        self.get_line_string(index)
    }
    fn expanded_line(&self, index: usize) -> String {
        self.get_expanded_line_string(index)
    }
    fn line_length(&self, index: usize) -> usize {
        self.get_line_length(index)
    }
}

fn read_range(path: &Path, start: u64, end: u64) -> std::io::Result<Vec<u8>> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(start))?;
    let len = end.saturating_sub(start) as usize;
    let mut buf = vec![0u8; len];
    file.read_exact(&mut buf)?;
    Ok(buf)
}

/// Strips a trailing line terminator a decoded slice may still carry (the
/// byte range handed to `decode` runs up to and including the EOL byte(s)).
/// Handles a bare `\n` and a `\r\n` pair so CRLF-terminated logs decode the
/// same as LF-terminated ones.
fn strip_terminator(decoded: &str) -> String {
    let mut s = decoded;
    if let Some(stripped) = s.strip_suffix('\n') {
        s = stripped;
    }
    if let Some(stripped) = s.strip_suffix('\r') {
        s = stripped;
    }
    s.to_string()
}

fn dispatch(shared: &Shared, op: Op) {
    let indexer = shared.indexer.lock_ignore_poison().clone();
    let Some(indexer) = indexer else {
        return;
    };
    let sender = shared.sender.lock_ignore_poison().clone();

    match op {
        Op::Attach { forced_encoding } | Op::FullReindex { forced_encoding } => {
            shared.currently_data_added.store(false, Ordering::Relaxed);
            match indexer.index_all(&shared.indexing, forced_encoding, sender.as_ref()) {
                Ok(_) => {}
                Err(e) => log::warn!("indexing failed: {e}"),
            }
        }
        Op::PartialReindex => {
            shared.currently_data_added.store(false, Ordering::Relaxed);
            match indexer.index_additional(&shared.indexing, sender.as_ref()) {
                Ok(_) => {}
                Err(e) => log::warn!("partial reindex failed: {e}"),
            }
        }
        Op::CheckChanges => {
            handle_check_changes(shared, &indexer, sender.as_ref());
        }
    }
}

/// Reacts to a watcher-driven `CheckChanges`.
fn handle_check_changes(shared: &Shared, indexer: &Indexer, sender: Option<&EventSender>) {
    let change = match indexer.check_file_changes(&shared.indexing) {
        Ok(c) => c,
        Err(_) => FileChange::Unchanged,
    };
    let status = match change {
        FileChange::Unchanged => FileChangeStatus::Unchanged,
        FileChange::DataAdded => FileChangeStatus::DataAdded,
        FileChange::Truncated => FileChangeStatus::Truncated,
    };
    if let Some(s) = sender {
        events::notify(s, Event::FileChanged(status));
    }

    match change {
        FileChange::Unchanged => {}
        FileChange::Truncated => {
            shared.currently_data_added.store(false, Ordering::Relaxed);
            for observer in shared.on_truncate.lock_ignore_poison().iter() {
                observer();
            }
            dispatch(shared, Op::FullReindex { forced_encoding: None });
        }
        FileChange::DataAdded => {
            if !shared.currently_data_added.swap(true, Ordering::Relaxed) {
                dispatch(shared, Op::PartialReindex);
            }
            // Else: a partial reindex for this growth episode is already
            // in flight or queued; this check coalesces into it.
        }
    }
}

#[allow(dead_code)]
fn _assert_indexing_status_used(_: IndexingStatus) {}

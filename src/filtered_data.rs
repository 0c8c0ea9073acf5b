//! FilteredData: a derived, line-oriented view over a [`LogData`] combining
//! search matches and user marks.
//!
//! Layers a search result set and a mark set over the same backend and
//! exposes one merged view across three visibility modes, backed by an
//! explicit `FilteredItem` union cache.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::config;
use crate::encoding::Encoding;
use crate::events::EventSender;
use crate::ignore_poison::IgnorePoison;
use crate::log_data::{LineOrientedSource, LogData};
use crate::marks::{Mark, Marks};
use crate::search::{LineNumber, SearchData, SearchResultArray, SearchWorker};

/// Which lines are visible in the derived view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    MatchesOnly,
    MarksOnly,
    MarksAndMatches,
}

/// How a filtered line is tagged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineTag {
    Match,
    Mark,
    Both,
}

/// One entry of the unified view cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FilteredItem {
    line: LineNumber,
    tag: LineTag,
}

/// Sentinel returned by [`FilteredData::get_line_index_number`] when the
/// requested source line is not part of the filtered view.
pub const NOT_FOUND: usize = usize::MAX;

struct State {
    visibility: Visibility,
    marks: Marks,
    search_data: Arc<Mutex<SearchData>>,
    search_pattern: Option<String>,
    search_case_insensitive: bool,
    /// Lazily regenerated sorted merge of matches and marks; `None` when
    /// stale.
    unified: Option<Vec<FilteredItem>>,
    max_length_marks: usize,
}

/// A derived view over a [`LogData`]: search matches plus user marks,
/// presented as one line sequence under a visibility mode.
pub struct FilteredData {
    source: Arc<LogData>,
    state: Arc<Mutex<State>>,
    worker: Arc<SearchWorker>,
    search_generation: AtomicUsize,
}

impl FilteredData {
    pub(crate) fn new(source: Arc<LogData>) -> Self {
        let state = Arc::new(Mutex::new(State {
            visibility: if config::default_visibility_both() { Visibility::MarksAndMatches } else { Visibility::MatchesOnly },
            marks: Marks::new(),
            search_data: Arc::new(Mutex::new(SearchData::default())),
            search_pattern: None,
            search_case_insensitive: false,
            unified: None,
            max_length_marks: 0,
        }));
        let worker = Arc::new(SearchWorker::new());

        // Per spec: a truncation clears prior matches and marks, since both
        // are only meaningful against the file content they were computed
        // from. Interrupt first so a search still scanning the
        // about-to-vanish range doesn't keep writing into a cleared result.
        let state_for_truncate = Arc::clone(&state);
        let worker_for_truncate = Arc::clone(&worker);
        source.register_truncation_observer(move || {
            worker_for_truncate.interrupt();
            let mut guard = state_for_truncate.lock_ignore_poison();
            guard.search_pattern = None;
            guard.search_data = Arc::new(Mutex::new(SearchData::default()));
            guard.marks.clear();
            guard.max_length_marks = 0;
            guard.unified = None;
        });

        Self { source, state, worker, search_generation: AtomicUsize::new(0) }
    }

    pub fn set_visibility(&self, visibility: Visibility) {
        let mut guard = self.state.lock_ignore_poison();
        guard.visibility = visibility;
        guard.unified = None;
    }

    pub fn visibility(&self) -> Visibility {
        self.state.lock_ignore_poison().visibility
    }

    /// Cancels any in-flight search, clears prior matches, and starts a
    /// fresh one over `[start_line, end_line)`. `case_insensitive` is the
    /// flag paired with every user-supplied pattern.
    pub fn run_search(
        &self,
        pattern: &str,
        case_insensitive: bool,
        start_line: u32,
        end_line: u32,
        sender: Option<EventSender>,
    ) {
        self.worker.interrupt();
        let generation = self.search_generation.fetch_add(1, Ordering::SeqCst) + 1;

        let search_data = {
            let mut guard = self.state.lock_ignore_poison();
            guard.search_pattern = Some(pattern.to_string());
            guard.search_case_insensitive = case_insensitive;
            guard.search_data = Arc::new(Mutex::new(SearchData::default()));
            guard.unified = None;
            Arc::clone(&guard.search_data)
        };

        self.spawn(pattern.to_string(), case_insensitive, start_line, end_line, search_data, sender, generation);
    }

    /// Continues the active pattern (with the case-sensitivity it was
    /// started with) from `start_line`, first forgetting any match recorded
    /// at `start_line - 1` since that formerly-last line may have grown.
    pub fn update_search(&self, start_line: u32, end_line: u32, sender: Option<EventSender>) {
        let (pattern, case_insensitive, search_data) = {
            let guard = self.state.lock_ignore_poison();
            let Some(pattern) = guard.search_pattern.clone() else { return };
            (pattern, guard.search_case_insensitive, Arc::clone(&guard.search_data))
        };

        if start_line > 0 {
            self.worker.forget_match(&search_data, start_line - 1);
        }
        self.state.lock_ignore_poison().unified = None;

        let generation = self.search_generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.spawn(pattern, case_insensitive, start_line, end_line, search_data, sender, generation);
    }

    fn spawn(
        &self,
        pattern: String,
        case_insensitive: bool,
        start_line: u32,
        end_line: u32,
        search_data: Arc<Mutex<SearchData>>,
        sender: Option<EventSender>,
        _generation: usize,
    ) {
        // The operation-queue model already serializes the caller's
        // interaction with one FilteredData at a time, so the worker just
        // runs on its own spawned thread rather than through its own queue.
        crate::search::spawn_search(
            Arc::clone(&self.source),
            Arc::clone(&self.worker),
            pattern,
            case_insensitive,
            start_line,
            end_line,
            search_data,
            sender,
        );
    }

    pub fn interrupt_search(&self) {
        self.worker.interrupt();
    }

    pub fn clear_search(&self) {
        let mut guard = self.state.lock_ignore_poison();
        guard.search_pattern = None;
        guard.search_data = Arc::new(Mutex::new(SearchData::default()));
        guard.unified = None;
    }

    pub fn add_mark(&self, line: Mark) {
        let mut guard = self.state.lock_ignore_poison();
        if guard.marks.insert(line) {
            let length = self.source.get_line_length(line as usize);
            guard.max_length_marks = guard.max_length_marks.max(length);
            guard.unified = None;
        }
    }

    /// Removes a mark, rescanning remaining marks for the new max length if
    /// the removed mark held the previous max.
    pub fn delete_mark(&self, line: Mark) {
        let mut guard = self.state.lock_ignore_poison();
        if !guard.marks.remove(line) {
            return;
        }
        guard.unified = None;
        let removed_length = self.source.get_line_length(line as usize);
        if removed_length >= guard.max_length_marks {
            guard.max_length_marks = guard
                .marks
                .iter()
                .map(|l| self.source.get_line_length(l as usize))
                .max()
                .unwrap_or(0);
        }
    }

    pub fn clear_marks(&self) {
        let mut guard = self.state.lock_ignore_poison();
        guard.marks.clear();
        guard.max_length_marks = 0;
        guard.unified = None;
    }

    pub fn is_marked(&self, line: Mark) -> bool {
        self.state.lock_ignore_poison().marks.contains(line)
    }

    /// Number of lines visible under the current visibility.
    pub fn get_nb_line(&self) -> usize {
        let mut guard = self.state.lock_ignore_poison();
        match guard.visibility {
            Visibility::MatchesOnly => guard.search_data.lock_ignore_poison().matches.len(),
            Visibility::MarksOnly => guard.marks.len(),
            Visibility::MarksAndMatches => {
                self.ensure_unified(&mut guard);
                guard.unified.as_ref().map(Vec::len).unwrap_or(0)
            }
        }
    }

    /// Maps a filtered index back to the source line number.
    pub fn get_matching_line_number(&self, index: usize) -> Option<LineNumber> {
        let mut guard = self.state.lock_ignore_poison();
        match guard.visibility {
            Visibility::MatchesOnly => guard.search_data.lock_ignore_poison().matches.get(index),
            Visibility::MarksOnly => guard.marks.iter().nth(index),
            Visibility::MarksAndMatches => {
                self.ensure_unified(&mut guard);
                guard.unified.as_ref().and_then(|v| v.get(index)).map(|item| item.line)
            }
        }
    }

    /// Reverse map: the filtered index of `source_line`, or [`NOT_FOUND`]
    /// if it is not part of the current view.
    pub fn get_line_index_number(&self, source_line: LineNumber) -> usize {
        let mut guard = self.state.lock_ignore_poison();
        match guard.visibility {
            Visibility::MatchesOnly => {
                guard.search_data.lock_ignore_poison().matches.position(source_line).unwrap_or(NOT_FOUND)
            }
            Visibility::MarksOnly => guard.marks.iter().position(|l| l == source_line).unwrap_or(NOT_FOUND),
            Visibility::MarksAndMatches => {
                self.ensure_unified(&mut guard);
                guard
                    .unified
                    .as_ref()
                    .and_then(|v| v.iter().position(|item| item.line == source_line))
                    .unwrap_or(NOT_FOUND)
            }
        }
    }

    /// How `index` is tagged in the current view.
    pub fn filtered_line_type(&self, index: usize) -> Option<LineTag> {
        let mut guard = self.state.lock_ignore_poison();
        match guard.visibility {
            Visibility::MatchesOnly => {
                guard.search_data.lock_ignore_poison().matches.get(index).map(|_| LineTag::Match)
            }
            Visibility::MarksOnly => guard.marks.iter().nth(index).map(|_| LineTag::Mark),
            Visibility::MarksAndMatches => {
                self.ensure_unified(&mut guard);
                guard.unified.as_ref().and_then(|v| v.get(index)).map(|item| item.tag)
            }
        }
    }

    pub fn get_detected_encoding(&self) -> Encoding {
        self.source.get_detected_encoding()
    }

    /// Keeps the unified view current: drains whatever matches the search
    /// worker has appended since the last call and folds them in, rebuilding
    /// from scratch only the first time (or after a visibility/mark/search
    /// change invalidates the cache outright). This runs on every read
    /// rather than only in response to a progress signal, so a consumer
    /// sees matches found mid-search, not just ones found before the view
    /// was first read or after the search completes.
    fn ensure_unified(&self, guard: &mut State) {
        let new_matches = guard.search_data.lock_ignore_poison().drain_new_matches();
        match guard.unified.take() {
            None => {
                let matches = guard.search_data.lock_ignore_poison().matches.clone();
                guard.unified = Some(Self::merge_matches_and_marks(&matches, &guard.marks));
            }
            Some(mut merged) => {
                Self::fold_new_matches(&mut merged, &new_matches);
                guard.unified = Some(merged);
            }
        }
    }

    /// Full sorted two-pointer merge of matches and marks, coalescing lines
    /// present in both.
    fn merge_matches_and_marks(matches: &SearchResultArray, marks: &Marks) -> Vec<FilteredItem> {
        let mut merged = Vec::with_capacity(matches.len() + marks.len());
        let mark_lines: Vec<Mark> = marks.iter().collect();
        let match_lines: Vec<LineNumber> = matches.iter().collect();
        let (mut i, mut j) = (0, 0);
        while i < match_lines.len() && j < mark_lines.len() {
            match match_lines[i].cmp(&mark_lines[j]) {
                std::cmp::Ordering::Less => {
                    merged.push(FilteredItem { line: match_lines[i], tag: LineTag::Match });
                    i += 1;
                }
                std::cmp::Ordering::Greater => {
                    merged.push(FilteredItem { line: mark_lines[j], tag: LineTag::Mark });
                    j += 1;
                }
                std::cmp::Ordering::Equal => {
                    merged.push(FilteredItem { line: match_lines[i], tag: LineTag::Both });
                    i += 1;
                    j += 1;
                }
            }
        }
        for &line in &match_lines[i..] {
            merged.push(FilteredItem { line, tag: LineTag::Match });
        }
        for &line in &mark_lines[j..] {
            merged.push(FilteredItem { line, tag: LineTag::Mark });
        }
        merged
    }

    /// Merges an already-sorted batch of newly found match lines into an
    /// existing unified view: a line already present (as a mark) gets
    /// upgraded to [`LineTag::Both`], otherwise a new [`LineTag::Match`]
    /// entry is inserted in order.
    fn fold_new_matches(unified: &mut Vec<FilteredItem>, new_matches: &[LineNumber]) {
        if new_matches.is_empty() {
            return;
        }
        let mut merged = Vec::with_capacity(unified.len() + new_matches.len());
        let (mut i, mut j) = (0, 0);
        while i < unified.len() && j < new_matches.len() {
            match unified[i].line.cmp(&new_matches[j]) {
                std::cmp::Ordering::Less => {
                    merged.push(unified[i]);
                    i += 1;
                }
                std::cmp::Ordering::Greater => {
                    merged.push(FilteredItem { line: new_matches[j], tag: LineTag::Match });
                    j += 1;
                }
                std::cmp::Ordering::Equal => {
                    let tag = if unified[i].tag == LineTag::Mark { LineTag::Both } else { unified[i].tag };
                    merged.push(FilteredItem { line: unified[i].line, tag });
                    i += 1;
                    j += 1;
                }
            }
        }
        merged.extend_from_slice(&unified[i..]);
        for &line in &new_matches[j..] {
            merged.push(FilteredItem { line, tag: LineTag::Match });
        }
        *unified = merged;
    }

    fn max_length_matches(&self) -> usize {
        self.state.lock_ignore_poison().search_data.lock_ignore_poison().max_length
    }
}

impl LineOrientedSource for FilteredData {
    fn line_count(&self) -> usize {
        self.get_nb_line()
    }

    /// Max of the two independently tracked lengths when both visibilities
    /// contribute.
    fn max_length(&self) -> usize {
        let visibility = self.state.lock_ignore_poison().visibility;
        match visibility {
            Visibility::MatchesOnly => self.max_length_matches(),
            Visibility::MarksOnly => self.state.lock_ignore_poison().max_length_marks,
            Visibility::MarksAndMatches => {
                let marks_max = self.state.lock_ignore_poison().max_length_marks;
                self.max_length_matches().max(marks_max)
            }
        }
    }

    fn line(&self, index: usize) -> String {
        match self.get_matching_line_number(index) {
            Some(line) => self.source.get_line_string(line as usize),
            None => String::new(),
        }
    }

    fn expanded_line(&self, index: usize) -> String {
        match self.get_matching_line_number(index) {
            Some(line) => self.source.get_expanded_line_string(line as usize),
            None => String::new(),
        }
    }

    fn line_length(&self, index: usize) -> usize {
        match self.get_matching_line_number(index) {
            Some(line) => self.source.get_line_length(line as usize),
            None => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn attached(contents: &[u8]) -> (Arc<LogData>, tempfile::NamedTempFile) {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents).unwrap();
        file.flush().unwrap();
        let log_data = Arc::new(LogData::new());
        log_data.attach(file.path(), None).unwrap();
        // The queue runs Attach asynchronously; give the worker a moment.
        std::thread::sleep(std::time::Duration::from_millis(200));
        (log_data, file)
    }

    #[test]
    fn marks_only_view_lists_marks_in_order() {
        let (log_data, _file) = attached(b"one\ntwo\nthree\nfour\n");
        let filtered = log_data.create_filtered_data();
        filtered.set_visibility(Visibility::MarksOnly);
        filtered.add_mark(3);
        filtered.add_mark(1);
        assert_eq!(filtered.get_nb_line(), 2);
        assert_eq!(filtered.get_matching_line_number(0), Some(1));
        assert_eq!(filtered.get_matching_line_number(1), Some(3));
    }

    #[test]
    fn delete_mark_rescans_max_length_when_longest_mark_removed() {
        let (log_data, _file) = attached(b"short\nthis line is much longer\nmid\n");
        let filtered = log_data.create_filtered_data();
        filtered.add_mark(1);
        filtered.add_mark(2);
        let before = filtered.state.lock().unwrap().max_length_marks;
        assert!(before > 0);
        filtered.delete_mark(1);
        let after = filtered.state.lock().unwrap().max_length_marks;
        assert_eq!(after, "mid".len());
    }

    #[test]
    fn get_line_index_number_returns_not_found_for_absent_line() {
        let (log_data, _file) = attached(b"a\nb\nc\n");
        let filtered = log_data.create_filtered_data();
        filtered.set_visibility(Visibility::MarksOnly);
        filtered.add_mark(0);
        assert_eq!(filtered.get_line_index_number(2), NOT_FOUND);
        assert_eq!(filtered.get_line_index_number(0), 0);
    }

    #[test]
    fn unified_view_coalesces_lines_that_are_both_matched_and_marked() {
        let (log_data, _file) = attached(b"alpha\nbeta error\ngamma\ndelta error\n");
        let filtered = log_data.create_filtered_data();
        filtered.set_visibility(Visibility::MarksAndMatches);
        filtered.add_mark(1);
        filtered.add_mark(2);
        filtered.run_search("error", false, 0, 4, None);
        std::thread::sleep(std::time::Duration::from_millis(200));

        assert_eq!(filtered.get_nb_line(), 3);
        assert_eq!(filtered.filtered_line_type(0), Some(LineTag::Both));
        assert_eq!(filtered.filtered_line_type(1), Some(LineTag::Mark));
        assert_eq!(filtered.filtered_line_type(2), Some(LineTag::Match));
    }

    #[test]
    fn unified_view_picks_up_matches_found_after_an_earlier_partial_read() {
        let (log_data, _file) = attached(b"alpha\nbeta error\ngamma\ndelta error\n");
        let filtered = log_data.create_filtered_data();
        filtered.set_visibility(Visibility::MarksAndMatches);
        filtered.add_mark(2);
        filtered.run_search("error", false, 0, 4, None);

        // Read the unified view while the search is still (almost
        // certainly) in flight, caching whatever partial merge exists at
        // that moment.
        let _ = filtered.get_nb_line();

        std::thread::sleep(std::time::Duration::from_millis(200));

        // A later read must reflect matches the worker found after the
        // first read, not the partial snapshot cached back then.
        assert_eq!(filtered.get_nb_line(), 3);
        assert_eq!(filtered.get_matching_line_number(0), Some(1));
        assert_eq!(filtered.get_matching_line_number(1), Some(2));
        assert_eq!(filtered.get_matching_line_number(2), Some(3));
        assert_eq!(filtered.filtered_line_type(1), Some(LineTag::Mark));
    }

    #[test]
    fn clear_marks_empties_marks_only_view() {
        let (log_data, _file) = attached(b"a\nb\n");
        let filtered = log_data.create_filtered_data();
        filtered.set_visibility(Visibility::MarksOnly);
        filtered.add_mark(0);
        filtered.add_mark(1);
        filtered.clear_marks();
        assert_eq!(filtered.get_nb_line(), 0);
    }

    #[test]
    fn truncation_clears_matches_and_marks() {
        let (log_data, file) = attached(b"alpha\nbeta error\ngamma\ndelta error\n");
        let filtered = log_data.create_filtered_data();
        filtered.set_visibility(Visibility::MarksAndMatches);
        filtered.add_mark(0);
        filtered.run_search("error", false, 0, 4, None);
        std::thread::sleep(std::time::Duration::from_millis(200));
        assert_eq!(filtered.get_nb_line(), 3);

        file.as_file().set_len(0).unwrap();

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        while log_data.line_count() != 0 && std::time::Instant::now() < deadline {
            std::thread::sleep(std::time::Duration::from_millis(20));
        }
        assert_eq!(log_data.line_count(), 0);
        assert_eq!(filtered.get_nb_line(), 0);
        assert!(!filtered.is_marked(0));
    }

    #[test]
    fn run_search_case_insensitive_matches_differently_cased_lines() {
        let (log_data, _file) = attached(b"alpha\nBETA ERROR\ngamma\n");
        let filtered = log_data.create_filtered_data();
        filtered.set_visibility(Visibility::MatchesOnly);
        filtered.run_search("error", true, 0, 3, None);
        std::thread::sleep(std::time::Duration::from_millis(200));
        assert_eq!(filtered.get_nb_line(), 1);
        assert_eq!(filtered.get_matching_line_number(0), Some(1));
    }
}

//! The callback/channel contract workers use to report progress. Consumers
//! register a `Sender<Event>` (for example with
//! [`crate::log_data::LogData::attach`] or
//! [`crate::filtered_data::FilteredData::run_search`]) and drain it with
//! `try_iter()` on their own thread; sending never blocks the worker.
//!
//! Progress reports for one operation arrive in non-decreasing percentage
//! order and `loading_finished` / `search_finished` follow the last progress
//! report for that operation, because a single `mpsc::Sender` preserves send
//! order and every operation is driven by exactly one worker thread at a
//! time.

use std::sync::mpsc::Sender;

use serde::{Deserialize, Serialize};

use crate::indexer::IndexingStatus;

/// A sink workers push [`Event`]s into. A thin alias so call sites read
/// naturally; cloning an `mpsc::Sender` is cheap and each worker gets its own
/// clone.
pub type EventSender = Sender<Event>;

/// Notifications emitted by `LogData` and `FilteredData` workers.
/// `Serialize`/`Deserialize` so an embedding UI on the far side of an IPC
/// boundary can forward these without hand-rolled encoding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    /// Indexing progress, 0-100.
    LoadingProgressed(u8),
    /// An index/reindex operation finished.
    LoadingFinished(IndexingStatus),
    /// The watched file changed on disk, right before a reaction is
    /// enqueued.
    FileChanged(FileChangeStatus),
    /// Search progress: matches found so far, percent complete, and the
    /// first line of the chunk just processed.
    SearchProgressed { nb_matches: usize, percent: u8, initial_line: u32 },
    /// A search run completed, was interrupted, or failed to compile.
    SearchFinished(SearchFinishStatus),
}

/// Classification of a `file_changed` notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileChangeStatus {
    Unchanged,
    DataAdded,
    Truncated,
}

/// How a search operation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchFinishStatus {
    Completed,
    Interrupted,
    /// The regex failed to compile; the engine surfaces this as "no
    /// matches" rather than an error.
    InvalidPattern,
}

/// Sends `event`, discarding the result: once the consumer has disconnected
/// (dropped its receiver, for example on session close) a worker's progress
/// reports are simply no longer interesting to anyone, not a failure worth
/// propagating.
pub fn notify(sender: &EventSender, event: Event) {
    let _ = sender.send(event);
}

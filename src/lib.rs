//! Indexing, filtering, and search engine for append-only, multi-gigabyte text logs.
//!
//! The crate streams a log file in chunks while maintaining a compact,
//! variable-width compressed index of line offsets ([`line_storage`]),
//! watches the file for growth or truncation ([`watcher`]), and exposes a
//! random-access line-read API ([`log_data`]) together with an incrementally
//! updated regex search + user-mark view ([`filtered_data`], [`search`]).
//!
//! A consuming UI drives the engine through [`log_data::LogData`] and
//! [`filtered_data::FilteredData`] and receives progress/completion
//! notifications through the [`events::Event`] channel. No module here
//! depends on a UI toolkit.

#![warn(unused_qualifications)]

pub mod config;
pub mod encoding;
pub mod error;
pub mod events;
pub mod filtered_data;
mod ignore_poison;
pub mod indexer;
pub mod line_storage;
pub mod log_data;
pub mod marks;
pub mod operation_queue;
pub mod search;
pub mod watcher;

pub use error::{Error, Result};

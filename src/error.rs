//! Crate-wide error taxonomy.
//!
//! Workers never abort the process on content-derived errors: every failure
//! mode here is translated to a value, either returned from a synchronous
//! call or carried in a completion [`crate::events::Event`].

use std::fmt;
use std::io;

/// Errors surfaced by the public API of this crate.
#[derive(Debug)]
pub enum Error {
    Io(String),
    /// The path does not exist (or stopped existing mid-operation).
    NotFound(String),
    /// A directory was given where a file was expected.
    IsDirectory,
    /// `LogData::attach` was called twice on the same instance.
    AlreadyAttached,
    /// A regex failed to compile; the search is treated as "no matches",
    /// not a hard failure.
    InvalidPattern(String),
    /// Allocation failure while growing the index or search results.
    NoMemory,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(msg) => write!(f, "{msg}"),
            Self::NotFound(path) => write!(f, "file not found: {path}"),
            Self::IsDirectory => write!(f, "expected a file, found a directory"),
            Self::AlreadyAttached => write!(f, "LogData is already attached to a file"),
            Self::InvalidPattern(msg) => write!(f, "invalid regular expression: {msg}"),
            Self::NoMemory => write!(f, "out of memory"),
        }
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::NotFound => Self::NotFound(e.to_string()),
            _ => Self::Io(e.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

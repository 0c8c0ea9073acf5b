//! Extension trait to ignore mutex poisoning.
//!
//! Every mutex in this crate guards a simple value (an index, a result set,
//! a queue slot) where a panic on another thread while holding the lock
//! doesn't invalidate what's stored. This trait replaces the
//! `.lock().unwrap_or_else(|e| e.into_inner())` boilerplate that recovering
//! from that would otherwise take at every call site with a single
//! `.lock_ignore_poison()` call.

use std::sync::{Mutex, MutexGuard};

pub trait IgnorePoison<T> {
    /// Locks the mutex, ignoring poison. Use this for simple value stores where
    /// a panic in another thread doesn't invalidate the data.
    fn lock_ignore_poison(&self) -> MutexGuard<'_, T>;
}

impl<T> IgnorePoison<T> for Mutex<T> {
    fn lock_ignore_poison(&self) -> MutexGuard<'_, T> {
        self.lock().unwrap_or_else(|e| e.into_inner())
    }
}

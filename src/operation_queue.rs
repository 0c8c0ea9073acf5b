//! Serializes index/reindex/check operations against a single worker thread.
//!
//! A `thread::spawn`-driven worker runs one operation at a time; a request
//! that arrives while the worker is busy is queued and coalesced with
//! whatever is already pending rather than dropped or run concurrently.

use std::sync::{Arc, Condvar, Mutex};
use std::thread;

use crate::encoding::Encoding;
use crate::ignore_poison::IgnorePoison;

/// A unit of work dispatched to `LogData`'s worker.
#[derive(Debug, Clone)]
pub enum Op {
    Attach { forced_encoding: Option<Encoding> },
    FullReindex { forced_encoding: Option<Encoding> },
    PartialReindex,
    CheckChanges,
}

impl Op {
    /// Whether `self`, if pending, should be replaced by `incoming` rather
    /// than kept: latest wins, a pending partial reindex coalesces with
    /// another partial reindex, and a full reindex supersedes anything.
    fn superseded_by(&self, incoming: &Op) -> bool {
        match (self, incoming) {
            (_, Op::FullReindex { .. }) => true,
            (Op::PartialReindex, Op::PartialReindex) => true,
            (Op::CheckChanges, Op::CheckChanges) => true,
            _ => false,
        }
    }
}

struct State {
    executing: Option<Op>,
    pending: Option<Op>,
}

/// Single-in-flight operation queue: `{executing: Op|None, pending: Op|None}`.
/// Bound to a single dispatch function at construction — every `Op` this
/// queue ever runs, whether dispatched immediately or promoted from
/// `pending`, goes through the same handler.
///
/// All fields are `Arc`-based, so cloning shares the same underlying queue —
/// needed so a watcher callback can hold its own handle and enqueue
/// [`Op::CheckChanges`] without borrowing the owning `LogData`.
#[derive(Clone)]
pub struct OperationQueue {
    state: Arc<Mutex<State>>,
    idle: Arc<Condvar>,
    dispatch: Arc<dyn Fn(Op) + Send + Sync>,
}

impl OperationQueue {
    pub fn new<F>(dispatch: F) -> Self
    where
        F: Fn(Op) + Send + Sync + 'static,
    {
        Self {
            state: Arc::new(Mutex::new(State { executing: None, pending: None })),
            idle: Arc::new(Condvar::new()),
            dispatch: Arc::new(dispatch),
        }
    }

    /// Enqueues `op`: dispatches it on a worker thread immediately if the
    /// queue is idle, otherwise coalesces it into `pending` per
    /// [`Op::superseded_by`]. Never blocks the calling thread.
    pub fn enqueue(&self, op: Op) {
        let mut guard = self.state.lock_ignore_poison();
        if guard.executing.is_none() {
            guard.executing = Some(op.clone());
            drop(guard);
            self.spawn_worker(op);
            return;
        }

        match &guard.pending {
            Some(current_pending) if !current_pending.superseded_by(&op) => {
                log::debug!("operation queue: {op:?} coalesced into existing pending operation");
            }
            _ => {
                log::debug!("operation queue: {op:?} queued as pending");
                guard.pending = Some(op);
            }
        }
    }

    fn spawn_worker(&self, op: Op) {
        let state = Arc::clone(&self.state);
        let idle = Arc::clone(&self.idle);
        let dispatch = Arc::clone(&self.dispatch);
        thread::spawn(move || {
            let mut current = op;
            loop {
                dispatch(current.clone());

                let mut guard = state.lock_ignore_poison();
                match guard.pending.take() {
                    Some(next) => {
                        guard.executing = Some(next.clone());
                        current = next;
                    }
                    None => {
                        guard.executing = None;
                        idle.notify_all();
                        break;
                    }
                }
            }
        });
    }

    /// Blocks the calling thread until no operation is executing or
    /// pending. Intended for tests and graceful shutdown, not the hot path.
    pub fn drain(&self) {
        let guard = self.state.lock_ignore_poison();
        let _guard = self
            .idle
            .wait_while(guard, |s| s.executing.is_some() || s.pending.is_some())
            .unwrap_or_else(|e| e.into_inner());
    }

    pub fn is_idle(&self) -> bool {
        let guard = self.state.lock_ignore_poison();
        guard.executing.is_none() && guard.pending.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn runs_single_operation_immediately() {
        let ran = Arc::new(AtomicUsize::new(0));
        let ran2 = Arc::clone(&ran);
        let queue = OperationQueue::new(move |_| {
            ran2.fetch_add(1, Ordering::SeqCst);
        });
        queue.enqueue(Op::CheckChanges);
        queue.drain();
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn coalesces_duplicate_pending_partial_reindex() {
        let counts = Arc::new(Mutex::new(Vec::new()));
        let gate = Arc::new((Mutex::new(false), Condvar::new()));

        let counts2 = Arc::clone(&counts);
        let gate2 = Arc::clone(&gate);
        let first_run = Arc::new(std::sync::atomic::AtomicBool::new(true));
        let queue = OperationQueue::new(move |op| {
            if first_run.swap(false, Ordering::SeqCst) {
                let (lock, cvar) = &*gate2;
                let guard = lock.lock().unwrap();
                let _ = cvar.wait_timeout_while(guard, Duration::from_secs(5), |done| !*done).unwrap();
            }
            counts2.lock().unwrap().push(format!("{op:?}"));
        });

        queue.enqueue(Op::PartialReindex);
        // While the first PartialReindex is still executing (blocked on the
        // gate), enqueue two more: they coalesce into one pending slot.
        queue.enqueue(Op::PartialReindex);
        queue.enqueue(Op::PartialReindex);

        {
            let (lock, cvar) = &*gate;
            let mut done = lock.lock().unwrap();
            *done = true;
            cvar.notify_all();
        }

        queue.drain();
        // Exactly two dispatches: the first PartialReindex, and one
        // coalesced follow-up — never three.
        assert_eq!(counts.lock().unwrap().len(), 2);
    }

    #[test]
    fn full_reindex_supersedes_pending_partial() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let gate = Arc::new((Mutex::new(false), Condvar::new()));

        let seen2 = Arc::clone(&seen);
        let gate2 = Arc::clone(&gate);
        let first_run = Arc::new(std::sync::atomic::AtomicBool::new(true));
        let queue = OperationQueue::new(move |op| {
            if first_run.swap(false, Ordering::SeqCst) {
                let (lock, cvar) = &*gate2;
                let guard = lock.lock().unwrap();
                let _ = cvar.wait_timeout_while(guard, Duration::from_secs(5), |done| !*done).unwrap();
                return;
            }
            seen2.lock().unwrap().push(format!("{op:?}"));
        });

        queue.enqueue(Op::CheckChanges);
        queue.enqueue(Op::PartialReindex);
        queue.enqueue(Op::FullReindex { forced_encoding: None });

        {
            let (lock, cvar) = &*gate;
            let mut done = lock.lock().unwrap();
            *done = true;
            cvar.notify_all();
        }
        queue.drain();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].starts_with("FullReindex"));
    }
}

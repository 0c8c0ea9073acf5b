//! Notifies the core when a single watched path's content changes on disk.
//!
//! Built on a `notify_debouncer_full::Debouncer` (`new_debouncer`), with a
//! `DEBOUNCE_MS` atomic configurable at runtime and a callback invoked on
//! the debouncer's own thread. Rather than diffing a whole directory
//! listing, this watches one file's containing directory so deletion,
//! recreation, and rename-over are all visible, debounced down to a single
//! callback per discrete change.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use notify::RecursiveMode;
use notify_debouncer_full::{new_debouncer, DebounceEventResult, Debouncer, RecommendedCache};

use crate::ignore_poison::IgnorePoison;

const DEFAULT_DEBOUNCE_MS: u64 = 200;

static DEBOUNCE_MS: AtomicU64 = AtomicU64::new(DEFAULT_DEBOUNCE_MS);

/// Sets the debounce window for watches created after this call. Existing
/// watches keep the window they were created with.
pub fn set_debounce_ms(ms: u64) {
    DEBOUNCE_MS.store(ms, Ordering::Relaxed);
}

fn debounce_ms() -> u64 {
    DEBOUNCE_MS.load(Ordering::Relaxed)
}

/// A watched path's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PathState {
    Exists,
    Removed,
}

fn probe(path: &Path) -> PathState {
    if path.exists() { PathState::Exists } else { PathState::Removed }
}

/// One watched file. Dropping it stops the watch (the debouncer is dropped,
/// which unregisters the OS-level watch).
pub struct Watch {
    _debouncer: Debouncer<notify::RecommendedWatcher, RecommendedCache>,
    _poller: Option<std::thread::JoinHandle<()>>,
    stop_poller: Arc<std::sync::atomic::AtomicBool>,
}

impl Drop for Watch {
    fn drop(&mut self) {
        self.stop_poller.store(true, Ordering::Relaxed);
    }
}

/// Registers a watch on `path`'s containing directory (so delete/recreate is
/// visible even though the original inode is gone) and invokes `callback`
/// once per discrete, debounced change.
///
/// `callback` also drives the polling fallback: if `polling_interval_ms` is
/// nonzero, a background thread additionally stats the file on that cadence
/// and invokes `callback` when size or mtime moved since the last check,
/// surviving OS backends that miss edits.
pub fn watch<F>(path: &Path, polling_interval_ms: u64, callback: F) -> crate::error::Result<Watch>
where
    F: Fn() + Send + Sync + 'static,
{
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));
    let target = path.to_path_buf();
    let callback = Arc::new(callback);
    let last_state = Arc::new(Mutex::new(probe(&target)));

    let cb_for_debouncer = Arc::clone(&callback);
    let target_for_debouncer = target.clone();
    let last_state_for_debouncer = Arc::clone(&last_state);
    let debounce_duration = Duration::from_millis(debounce_ms());
    let mut debouncer = new_debouncer(debounce_duration, None, move |result: DebounceEventResult| {
        let relevant = match &result {
            Ok(events) => events.iter().any(|e| e.paths.iter().any(|p| p == &target_for_debouncer)),
            Err(_) => true,
        };
        if !relevant {
            return;
        }
        let new_state = probe(&target_for_debouncer);
        let mut guard = last_state_for_debouncer.lock_ignore_poison();
        let transitioned = *guard != new_state;
        *guard = new_state;
        drop(guard);
        if transitioned || new_state == PathState::Exists {
            cb_for_debouncer();
        }
    })
    .map_err(|e| crate::error::Error::Io(e.to_string()))?;

    debouncer
        .watch(&dir, RecursiveMode::NonRecursive)
        .map_err(|e| crate::error::Error::Io(e.to_string()))?;

    let stop_poller = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let poller = if polling_interval_ms > 0 {
        let stop = Arc::clone(&stop_poller);
        let target = target.clone();
        let callback = Arc::clone(&callback);
        let last_state = Arc::clone(&last_state);
        let mut last_token = change_token(&target);
        Some(std::thread::spawn(move || {
            while !stop.load(Ordering::Relaxed) {
                std::thread::sleep(Duration::from_millis(polling_interval_ms));
                if stop.load(Ordering::Relaxed) {
                    break;
                }
                let token = change_token(&target);
                if token != last_token {
                    last_token = token;
                    let new_state = probe(&target);
                    *last_state.lock_ignore_poison() = new_state;
                    callback();
                }
            }
        }))
    } else {
        None
    };

    Ok(Watch { _debouncer: debouncer, _poller: poller, stop_poller })
}

/// A coarse (size, mtime) fingerprint used by the polling fallback to detect
/// edits that the OS backend's driver missed.
fn change_token(path: &Path) -> Option<(u64, std::time::SystemTime)> {
    let meta = std::fs::metadata(path).ok()?;
    Some((meta.len(), meta.modified().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    #[test]
    fn detects_content_change_via_polling_fallback() {
        set_debounce_ms(10);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("watched.log");
        std::fs::write(&path, b"initial\n").unwrap();

        let count = Arc::new(AtomicUsize::new(0));
        let count2 = Arc::clone(&count);
        let _watch = watch(&path, 20, move || {
            count2.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        std::thread::sleep(Duration::from_millis(30));
        let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        f.write_all(b"more\n").unwrap();
        f.flush().unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while count.load(Ordering::SeqCst) == 0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(20));
        }
        assert!(count.load(Ordering::SeqCst) > 0, "callback was never invoked after file write");
    }

    #[test]
    fn change_token_reflects_size_growth() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.log");
        std::fs::write(&path, b"a").unwrap();
        let before = change_token(&path);
        std::thread::sleep(Duration::from_millis(10));
        std::fs::write(&path, b"ab").unwrap();
        let after = change_token(&path);
        assert_ne!(before, after);
    }

    #[test]
    fn probe_reports_removed_for_missing_path() {
        assert_eq!(probe(Path::new("/does/not/exist/at/all")), PathState::Removed);
    }
}

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use tempfile::NamedTempFile;

use super::*;

fn write_temp(contents: &[u8]) -> NamedTempFile {
    let mut f = NamedTempFile::new().unwrap();
    f.write_all(contents).unwrap();
    f.flush().unwrap();
    f
}

fn attach_and_wait(path: &Path) -> LogData {
    let log_data = LogData::new();
    log_data.attach(path, None).unwrap();
    log_data.queue.drain();
    log_data
}

#[test]
fn attach_indexes_file_and_reports_line_count() {
    let file = write_temp(b"alpha\nbeta\ngamma\n");
    let log_data = attach_and_wait(file.path());
    assert_eq!(log_data.line_count(), 3);
    assert_eq!(log_data.get_file_size(), 17);
}

#[test]
fn reattaching_is_a_contract_violation() {
    let file = write_temp(b"one\n");
    let log_data = attach_and_wait(file.path());
    let err = log_data.attach(file.path(), None).unwrap_err();
    assert!(matches!(err, Error::AlreadyAttached));
}

#[test]
fn get_lines_returns_requested_range_in_order() {
    let file = write_temp(b"one\ntwo\nthree\nfour\n");
    let log_data = attach_and_wait(file.path());
    let lines = log_data.get_lines(1, 2);
    assert_eq!(lines, vec!["two".to_string(), "three".to_string()]);
}

#[test]
fn get_lines_past_eof_returns_empty() {
    let file = write_temp(b"only one line\n");
    let log_data = attach_and_wait(file.path());
    assert!(log_data.get_lines(5, 3).is_empty());
}

#[test]
fn get_expanded_line_string_replaces_tabs_with_spaces() {
    let file = write_temp(b"a\tb\n");
    let log_data = attach_and_wait(file.path());
    assert_eq!(log_data.get_line_string(0), "a\tb");
    assert_eq!(log_data.get_expanded_line_string(0), "a       b");
}

#[test]
fn missing_file_attaches_as_empty() {
    let log_data = LogData::new();
    log_data.attach("/nonexistent/path/missing.log", None).unwrap();
    log_data.queue.drain();
    assert_eq!(log_data.line_count(), 0);
    assert_eq!(log_data.get_file_size(), 0);
}

#[test]
fn growth_triggers_partial_reindex_without_losing_prior_lines() {
    let mut file = write_temp(b"first\nsecond\n");
    let log_data = attach_and_wait(file.path());
    assert_eq!(log_data.line_count(), 2);

    file.write_all(b"third\n").unwrap();
    file.flush().unwrap();

    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while log_data.line_count() < 3 && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(20));
    }
    assert_eq!(log_data.line_count(), 3);
    assert_eq!(log_data.get_lines(0, 3), vec!["first", "second", "third"]);
}

#[test]
fn truncation_triggers_full_reindex_to_empty() {
    let mut file = write_temp(b"a\nb\nc\n");
    let log_data = attach_and_wait(file.path());
    assert_eq!(log_data.line_count(), 3);

    file.as_file().set_len(0).unwrap();

    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while log_data.line_count() != 0 && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(20));
    }
    assert_eq!(log_data.line_count(), 0);
    assert_eq!(log_data.get_file_size(), 0);
}

#[test]
fn create_filtered_data_shares_the_same_source() {
    let file = write_temp(b"alpha\nbeta error\ngamma\n");
    let log_data = Arc::new(attach_and_wait(file.path()));
    let filtered = log_data.create_filtered_data();
    assert_eq!(filtered.get_detected_encoding(), log_data.get_detected_encoding());
}

#[test]
fn set_display_encoding_overrides_effective_encoding() {
    let file = write_temp(b"hello\n");
    let log_data = attach_and_wait(file.path());
    log_data.set_display_encoding(Encoding::Cp1251);
    assert_eq!(log_data.get_detected_encoding(), Encoding::Cp1251);
}

#[test]
fn attach_with_forced_encoding_applies_to_initial_index() {
    let file = write_temp(b"hello\n");
    let log_data = LogData::new();
    log_data.attach(file.path(), Some(Encoding::Cp1251)).unwrap();
    log_data.queue.drain();
    // The forced encoding must win even though `index_all` resets
    // `IndexingData` from scratch at the start of the very operation that
    // applies it, not only on a later `reload`.
    assert_eq!(log_data.get_detected_encoding(), Encoding::Cp1251);
}

#[test]
fn file_position_clamps_column_to_line_length() {
    let file = write_temp(b"short\nlonger line here\n");
    let log_data = attach_and_wait(file.path());
    let pos = FilePosition::new(0, 9999).clamped(&log_data);
    assert_eq!(pos.column, "short".len());
}

#[test]
fn file_position_past_last_line_clamps_to_column_zero() {
    let file = write_temp(b"only\n");
    let log_data = attach_and_wait(file.path());
    let pos = FilePosition::new(5, 3).clamped(&log_data);
    assert_eq!(pos.column, 0);
}

use std::io::Write;
use std::sync::mpsc;
use std::sync::Mutex;

use tempfile::NamedTempFile;

use super::*;

fn write_temp(contents: &[u8]) -> NamedTempFile {
    let mut f = NamedTempFile::new().unwrap();
    f.write_all(contents).unwrap();
    f.flush().unwrap();
    f
}

#[test]
fn indexes_simple_file_with_trailing_newline() {
    let file = write_temp(b"alpha\nbeta\ngamma\n");
    let indexer = Indexer::new(file.path());
    let data = Mutex::new(IndexingData::new());
    let status = indexer.index_all(&data, None, None).unwrap();
    assert_eq!(status, IndexingStatus::Successful);
    let guard = data.lock().unwrap();
    assert_eq!(guard.line_count(), 3);
    assert!(!guard.fake_final_lf);
    assert_eq!(guard.line_ends.at(0), 6);
    assert_eq!(guard.line_ends.at(1), 11);
    assert_eq!(guard.line_ends.at(2), 17);
}

#[test]
fn unterminated_final_line_gets_fake_lf() {
    let file = write_temp(b"one\ntwo\nthree");
    let indexer = Indexer::new(file.path());
    let data = Mutex::new(IndexingData::new());
    indexer.index_all(&data, None, None).unwrap();
    let guard = data.lock().unwrap();
    assert_eq!(guard.line_count(), 3);
    assert!(guard.fake_final_lf);
    assert_eq!(guard.indexed_size, 13);
}

#[test]
fn index_additional_extends_after_growth() {
    let mut file = write_temp(b"first\nsecond");
    let indexer = Indexer::new(file.path());
    let data = Mutex::new(IndexingData::new());
    indexer.index_all(&data, None, None).unwrap();
    assert_eq!(data.lock().unwrap().line_count(), 2);
    assert!(data.lock().unwrap().fake_final_lf);

    file.write_all(b" part two\nthird\n").unwrap();
    file.flush().unwrap();

    indexer.index_additional(&data, None).unwrap();
    let guard = data.lock().unwrap();
    assert_eq!(guard.line_count(), 3);
    assert!(!guard.fake_final_lf);
    assert_eq!(guard.line_ends.at(0), 6);
    assert_eq!(guard.line_ends.at(1), 22);
    assert_eq!(guard.line_ends.at(2), 28);
}

#[test]
fn check_file_changes_detects_growth_and_truncation() {
    let mut file = write_temp(b"hello\n");
    let indexer = Indexer::new(file.path());
    let data = Mutex::new(IndexingData::new());
    indexer.index_all(&data, None, None).unwrap();
    assert_eq!(indexer.check_file_changes(&data).unwrap(), FileChange::Unchanged);

    file.write_all(b"world\n").unwrap();
    file.flush().unwrap();
    assert_eq!(indexer.check_file_changes(&data).unwrap(), FileChange::DataAdded);

    file.as_file().set_len(0).unwrap();
    assert_eq!(indexer.check_file_changes(&data).unwrap(), FileChange::Truncated);
}

#[test]
fn missing_file_indexes_as_empty_successful() {
    let indexer = Indexer::new("/nonexistent/path/does-not-exist.log");
    let data = Mutex::new(IndexingData::new());
    let status = indexer.index_all(&data, None, None).unwrap();
    assert_eq!(status, IndexingStatus::Successful);
    assert_eq!(data.lock().unwrap().line_count(), 0);
}

#[test]
fn interrupt_stops_indexing_and_reports_interrupted() {
    let mut contents = Vec::new();
    for i in 0..200_000 {
        contents.extend_from_slice(format!("line {i}\n").as_bytes());
    }
    let file = write_temp(&contents);
    let indexer = Indexer::new(file.path());
    let data = Mutex::new(IndexingData::new());
    indexer.interrupt();
    let status = indexer.index_all(&data, None, None).unwrap();
    assert_eq!(status, IndexingStatus::Interrupted);
}

#[test]
fn emits_progress_and_finished_events() {
    let file = write_temp(b"a\nb\nc\n");
    let indexer = Indexer::new(file.path());
    let data = Mutex::new(IndexingData::new());
    let (tx, rx) = mpsc::channel();
    indexer.index_all(&data, None, Some(&tx)).unwrap();
    let events: Vec<_> = rx.try_iter().collect();
    assert!(matches!(events.last(), Some(Event::LoadingFinished(IndexingStatus::Successful))));
}

#[test]
fn forced_encoding_overrides_detected_guess() {
    let file = write_temp(b"line one\nline two\n");
    let indexer = Indexer::new(file.path());
    let data = Mutex::new(IndexingData::new());
    indexer.index_all(&data, Some(Encoding::Cp1251), None).unwrap();
    assert_eq!(data.lock().unwrap().effective_encoding(), Encoding::Cp1251);
}

#[test]
fn chunk_boundary_terminator_is_still_found() {
    // Force a terminator to straddle a read-chunk boundary by shrinking the
    // effective chunk via a long single line plus a short one.
    let mut contents = vec![b'x'; INDEX_CHUNK_BYTES - 2];
    contents.push(b'\n');
    contents.extend_from_slice(b"short\n");
    let file = write_temp(&contents);
    let indexer = Indexer::new(file.path());
    let data = Mutex::new(IndexingData::new());
    indexer.index_all(&data, None, None).unwrap();
    let guard = data.lock().unwrap();
    assert_eq!(guard.line_count(), 2);
    assert_eq!(guard.line_ends.at(0), (INDEX_CHUNK_BYTES - 2) as u64 + 1);
}

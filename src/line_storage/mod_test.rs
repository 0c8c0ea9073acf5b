use super::*;

#[test]
fn sequential_append_and_random_access() {
    let mut storage = CompressedLineStorage::new();
    let offsets: Vec<u64> = (0..2000).map(|i| i * 37).collect();
    for &o in &offsets {
        storage.append(o);
    }
    assert_eq!(storage.len(), offsets.len());
    for (i, &o) in offsets.iter().enumerate() {
        assert_eq!(storage.at(i), o);
    }
}

#[test]
fn out_of_order_random_access_still_correct() {
    let mut storage = CompressedLineStorage::new();
    let offsets: Vec<u64> = (0..1000).map(|i| i * 123 + 7).collect();
    storage.append_list(&offsets);
    for &i in &[999, 0, 500, 1, 998, 256, 255, 257] {
        assert_eq!(storage.at(i), offsets[i]);
    }
}

#[test]
fn block_boundary_pop_back_frees_block() {
    let mut storage = CompressedLineStorage::new();
    for i in 0..BLOCK_SIZE as u64 {
        storage.append(i * 10);
    }
    assert_eq!(storage.len(), BLOCK_SIZE);
    storage.append(BLOCK_SIZE as u64 * 10);
    assert_eq!(storage.len(), BLOCK_SIZE + 1);

    storage.pop_back();
    assert_eq!(storage.len(), BLOCK_SIZE);
    for i in 0..BLOCK_SIZE {
        assert_eq!(storage.at(i), i as u64 * 10);
    }
}

#[test]
fn pop_back_within_block_restores_prior_value() {
    let mut storage = CompressedLineStorage::new();
    storage.append_list(&[10, 42, 99, 150]);
    storage.pop_back();
    assert_eq!(storage.len(), 3);
    assert_eq!(storage.at(2), 99);
    storage.append(200);
    assert_eq!(storage.at(3), 200);
}

#[test]
fn crosses_into_64_bit_pool_and_stays_there() {
    let mut storage = CompressedLineStorage::new();
    let threshold = 1u64 << 32;
    storage.append(threshold - 100);
    storage.append(threshold + 50);
    // A short delta after a long offset must still land in the 64-bit pool.
    storage.append(threshold + 60);
    assert_eq!(storage.at(0), threshold - 100);
    assert_eq!(storage.at(1), threshold + 50);
    assert_eq!(storage.at(2), threshold + 60);
}

#[test]
fn pop_back_undoes_threshold_crossing() {
    let mut storage = CompressedLineStorage::new();
    storage.append(100);
    storage.append(1u64 << 33);
    storage.pop_back();
    // The crossing line is gone; a new short offset should land back in
    // the 32-bit pool rather than being forced long forever.
    storage.append(200);
    assert_eq!(storage.at(1), 200);
}

#[test]
fn absolute_fallback_entries_round_trip() {
    let mut storage = CompressedLineStorage::new();
    let mut offset = 0u64;
    let mut expected = Vec::new();
    for i in 0..300u64 {
        offset += if i % 10 == 0 { 50_000 } else { 5 };
        storage.append(offset);
        expected.push(offset);
    }
    for (i, &e) in expected.iter().enumerate() {
        assert_eq!(storage.at(i), e);
    }
}

#[test]
#[should_panic(expected = "out of range")]
fn at_out_of_range_panics() {
    let storage = CompressedLineStorage::new();
    storage.at(0);
}

#[test]
fn concurrent_readers_share_storage_without_corrupting_each_other() {
    use std::sync::Arc;
    use std::thread;

    let mut storage = CompressedLineStorage::new();
    let offsets: Vec<u64> = (0..5000).map(|i| i * 11 + 3).collect();
    storage.append_list(&offsets);
    let storage = Arc::new(storage);

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let storage = Arc::clone(&storage);
            let offsets = offsets.clone();
            thread::spawn(move || {
                for i in (t..offsets.len()).step_by(8) {
                    assert_eq!(storage.at(i), offsets[i]);
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
}

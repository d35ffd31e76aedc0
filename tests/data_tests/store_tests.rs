//! Tests for the data store
//!
//! These tests verify:
//! - File header creation and last-id persistence
//! - Append and read back by offset
//! - Soft deletes
//! - Full scans and corruption detection

use std::fs::{self, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::PathBuf;

use bestiary::codec::DATA_HEADER_SIZE;
use bestiary::data::DataStore;
use bestiary::{BestiaryError, Creature};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_store() -> (TempDir, PathBuf, DataStore) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("creatures.bin");
    let store = DataStore::open(&path, true).unwrap();
    (temp_dir, path, store)
}

fn creature(id: i64, name: &str) -> Creature {
    let mut creature = Creature::new(name, "Test Creature");
    creature.id = id;
    creature.types = vec!["Fire".to_string(), "Flying".to_string()];
    creature.height_m = 1.7;
    creature.weight_kg = 90.5;
    creature
}

// =============================================================================
// Header Tests
// =============================================================================

#[test]
fn test_open_writes_header() {
    let (_temp, path, store) = setup_store();

    assert!(store.is_empty());
    assert_eq!(store.len(), DATA_HEADER_SIZE);
    assert_eq!(store.last_id(), 0);

    let bytes = fs::read(&path).unwrap();
    assert_eq!(&bytes[0..4], b"BSTY");
}

#[test]
fn test_last_id_persists() {
    let (_temp, path, mut store) = setup_store();

    store.set_last_id(41).unwrap();
    drop(store);

    let store = DataStore::open(&path, false).unwrap();
    assert_eq!(store.last_id(), 41);
}

#[test]
fn test_open_rejects_foreign_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("creatures.bin");
    fs::write(&path, b"definitely not a bestiary file").unwrap();

    let result = DataStore::open(&path, false);
    assert!(matches!(result, Err(BestiaryError::CorruptRecord(_))));
}

// =============================================================================
// Append/Read Tests
// =============================================================================

#[test]
fn test_append_and_read() {
    let (_temp, _path, mut store) = setup_store();

    let first = store.append_creature(&creature(1, "Ember")).unwrap();
    let second = store.append_creature(&creature(2, "Tide")).unwrap();

    assert_eq!(first, DATA_HEADER_SIZE);
    assert!(second > first);

    let record = store.read_at(second).unwrap();
    assert_eq!(record.offset, second);
    assert!(!record.deleted);
    assert_eq!(record.creature, creature(2, "Tide"));
    assert_eq!(store.read_at(first).unwrap().creature.name, "Ember");
}

#[test]
fn test_read_survives_reopen() {
    let (_temp, path, mut store) = setup_store();
    let offset = store.append_creature(&creature(1, "Ember")).unwrap();
    drop(store);

    let mut store = DataStore::open(&path, false).unwrap();
    assert_eq!(store.read_at(offset).unwrap().creature, creature(1, "Ember"));
}

#[test]
fn test_read_out_of_range() {
    let (_temp, _path, mut store) = setup_store();
    store.append_creature(&creature(1, "Ember")).unwrap();

    assert!(matches!(store.read_at(0), Err(BestiaryError::CorruptRecord(_))));
    assert!(matches!(
        store.read_at(store.len()),
        Err(BestiaryError::CorruptRecord(_))
    ));
}

#[test]
fn test_checksum_detects_corruption() {
    let (_temp, path, mut store) = setup_store();
    let offset = store.append_creature(&creature(1, "Ember")).unwrap();
    drop(store);

    let mut file = OpenOptions::new().write(true).open(&path).unwrap();
    file.seek(SeekFrom::Start(offset + 9 + 10)).unwrap();
    file.write_all(&[0xFF]).unwrap();
    drop(file);

    let mut store = DataStore::open(&path, false).unwrap();
    let result = store.read_at(offset);
    assert!(matches!(result, Err(BestiaryError::CorruptRecord(_))));
}

// =============================================================================
// Soft Delete Tests
// =============================================================================

#[test]
fn test_soft_delete() {
    let (_temp, _path, mut store) = setup_store();
    let offset = store.append_creature(&creature(1, "Ember")).unwrap();
    let len = store.len();

    store.soft_delete(offset).unwrap();

    let record = store.read_at(offset).unwrap();
    assert!(record.deleted);
    assert_eq!(record.creature.name, "Ember");
    assert_eq!(store.len(), len);
}

#[test]
fn test_soft_delete_twice() {
    let (_temp, _path, mut store) = setup_store();
    let offset = store.append_creature(&creature(1, "Ember")).unwrap();

    store.soft_delete(offset).unwrap();
    let result = store.soft_delete(offset);

    assert!(matches!(result, Err(BestiaryError::NotFound)));
}

// =============================================================================
// Iterator Tests
// =============================================================================

#[test]
fn test_iter_in_file_order() {
    let (_temp, _path, mut store) = setup_store();
    let names = ["Ember", "Tide", "Moss", "Volt"];
    let offsets: Vec<u64> = names
        .iter()
        .enumerate()
        .map(|(i, name)| store.append_creature(&creature(i as i64 + 1, name)).unwrap())
        .collect();
    store.soft_delete(offsets[1]).unwrap();

    let records: Vec<_> = store.iter().unwrap().map(|r| r.unwrap()).collect();

    assert_eq!(records.len(), 4);
    for (record, (&offset, name)) in records.iter().zip(offsets.iter().zip(names)) {
        assert_eq!(record.offset, offset);
        assert_eq!(record.creature.name, name);
    }
    assert!(records[1].deleted);
    assert!(!records[0].deleted && !records[2].deleted && !records[3].deleted);
}

#[test]
fn test_iter_empty() {
    let (_temp, _path, mut store) = setup_store();

    assert_eq!(store.iter().unwrap().count(), 0);
}

#[test]
fn test_iter_stops_after_corrupt_frame() {
    let (_temp, path, mut store) = setup_store();
    store.append_creature(&creature(1, "Ember")).unwrap();
    let bad = store.append_creature(&creature(2, "Tide")).unwrap();
    store.append_creature(&creature(3, "Moss")).unwrap();
    drop(store);

    let mut file = OpenOptions::new().write(true).open(&path).unwrap();
    file.seek(SeekFrom::Start(bad)).unwrap();
    file.write_all(&[9]).unwrap();
    drop(file);

    let mut store = DataStore::open(&path, false).unwrap();
    let results: Vec<_> = store.iter().unwrap().collect();

    assert_eq!(results.len(), 2);
    assert!(results[0].is_ok());
    assert!(matches!(results[1], Err(BestiaryError::CorruptRecord(_))));
}

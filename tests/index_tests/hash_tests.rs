//! Tests for the dynamic hash index
//!
//! These tests verify:
//! - Buddy and split-image arithmetic
//! - Lookup after insert, update and delete
//! - Bucket splits and directory doubling
//! - Bucket merges and free-list reuse
//! - Directory depth limit

use bestiary::config::IndexOptions;
use bestiary::index::{buddy_index, split_image, Session};
use bestiary::BestiaryError;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

/// Slot size for 8 usable records (load factor 9)
const SLOT: u64 = 16 + 9 * 16;

fn setup_session(bucket_records: usize, max_global_depth: u32) -> (TempDir, Session) {
    let temp_dir = TempDir::new().unwrap();
    let options = IndexOptions {
        bucket_records,
        max_global_depth,
        sync_on_close: false,
    };
    let session = Session::create(
        &temp_dir.path().join("hash_directory.bin"),
        &temp_dir.path().join("hash_buckets.bin"),
        options,
    )
    .unwrap();
    (temp_dir, session)
}

fn insert_all(session: &mut Session, keys: &[i64]) {
    let mut hash = session.hash();
    for &key in keys {
        hash.insert(key, key as u64 * 100).unwrap();
    }
}

fn assert_all_found(session: &mut Session, keys: &[i64]) {
    let mut hash = session.hash();
    for &key in keys {
        assert_eq!(hash.lookup(key).unwrap(), key as u64 * 100, "key {}", key);
    }
}

// =============================================================================
// Buddy Arithmetic Tests
// =============================================================================

#[test]
fn test_buddy_index_flips_top_local_bit() {
    assert_eq!(buddy_index(0, 1), Some(1));
    assert_eq!(buddy_index(1, 1), Some(0));
    assert_eq!(buddy_index(2, 2), Some(0));
    assert_eq!(buddy_index(5, 3), Some(1));
    assert_eq!(buddy_index(6, 2), Some(4));
}

#[test]
fn test_buddy_index_depth_zero_has_no_buddy() {
    assert_eq!(buddy_index(0, 0), None);
    assert_eq!(buddy_index(3, 0), None);
}

#[test]
fn test_split_image_within_bounds() {
    // pos already the lowest slot of the bucket
    assert_eq!(split_image(0, 1), (0, 2));
    assert_eq!(split_image(1, 1), (1, 3));
    assert_eq!(split_image(1, 2), (1, 5));
}

#[test]
fn test_split_image_from_upper_slot() {
    // pos + 2^depth would fall past an 8-slot directory; the pair is still
    // the canonical (low, low + 2^depth)
    assert_eq!(split_image(6, 1), (0, 2));
    assert_eq!(split_image(7, 2), (3, 7));
    assert_eq!(split_image(5, 1), (1, 3));
}

#[test]
fn test_split_image_depth_zero() {
    assert_eq!(split_image(0, 0), (0, 1));
    assert_eq!(split_image(1, 0), (0, 1));
}

// =============================================================================
// Basic Operations Tests
// =============================================================================

#[test]
fn test_new_index_layout() {
    let (_temp, session) = setup_session(8, 16);

    assert_eq!(session.directory().global_depth(), 1);
    assert_eq!(session.directory().bucket_pointers(), &[0, SLOT]);
    assert!(session.directory().free_list().is_empty());
    assert_eq!(session.store().slot_count(), 2);
}

#[test]
fn test_lookup_missing_key() {
    let (_temp, mut session) = setup_session(8, 16);

    let result = session.hash().lookup(42);
    assert!(matches!(result, Err(BestiaryError::NotFound)));
}

#[test]
fn test_lookup_after_insert() {
    let (_temp, mut session) = setup_session(8, 16);
    let keys: Vec<i64> = (0..200).collect();

    insert_all(&mut session, &keys);

    assert_all_found(&mut session, &keys);
    assert!(matches!(session.hash().lookup(200), Err(BestiaryError::NotFound)));
}

#[test]
fn test_sparse_and_negative_keys() {
    let (_temp, mut session) = setup_session(4, 20);
    let keys = [-1, -2, -17, 1_000_000, 3, 7, 1 << 40, -(1 << 33), 12, 96];

    insert_all(&mut session, &keys);

    assert_all_found(&mut session, &keys);
}

#[test]
fn test_update_changes_only_target() {
    let (_temp, mut session) = setup_session(8, 16);
    let keys: Vec<i64> = (0..40).collect();
    insert_all(&mut session, &keys);

    session.hash().update(17, 9999).unwrap();

    let mut hash = session.hash();
    assert_eq!(hash.lookup(17).unwrap(), 9999);
    for &key in keys.iter().filter(|&&k| k != 17) {
        assert_eq!(hash.lookup(key).unwrap(), key as u64 * 100);
    }
}

#[test]
fn test_update_missing_key() {
    let (_temp, mut session) = setup_session(8, 16);
    insert_all(&mut session, &[1, 2, 3]);

    let result = session.hash().update(4, 10);
    assert!(matches!(result, Err(BestiaryError::NotFound)));
}

#[test]
fn test_delete_then_lookup() {
    let (_temp, mut session) = setup_session(8, 16);
    let keys: Vec<i64> = (0..60).collect();
    insert_all(&mut session, &keys);

    assert_eq!(session.hash().delete(25).unwrap(), 2500);

    assert!(matches!(session.hash().lookup(25), Err(BestiaryError::NotFound)));
    let remaining: Vec<i64> = keys.into_iter().filter(|&k| k != 25).collect();
    assert_all_found(&mut session, &remaining);
}

#[test]
fn test_delete_missing_key() {
    let (_temp, mut session) = setup_session(8, 16);
    insert_all(&mut session, &[1, 2]);

    let result = session.hash().delete(3);
    assert!(matches!(result, Err(BestiaryError::NotFound)));
}

#[test]
fn test_delete_everything_then_reinsert() {
    let (_temp, mut session) = setup_session(4, 16);
    let keys: Vec<i64> = (0..80).collect();
    insert_all(&mut session, &keys);

    {
        let mut hash = session.hash();
        for &key in &keys {
            hash.delete(key).unwrap();
        }
        for &key in &keys {
            assert!(matches!(hash.lookup(key), Err(BestiaryError::NotFound)));
        }
    }

    insert_all(&mut session, &keys);
    assert_all_found(&mut session, &keys);
}

// =============================================================================
// Split Tests
// =============================================================================

#[test]
fn test_no_split_below_threshold() {
    let (_temp, mut session) = setup_session(8, 16);

    // Keys 0..8 spread over both buckets, four each
    insert_all(&mut session, &(0..8).collect::<Vec<_>>());

    assert_eq!(session.directory().global_depth(), 1);
    assert_eq!(session.store().slot_count(), 2);
    assert_all_found(&mut session, &(0..8).collect::<Vec<_>>());
}

#[test]
fn test_split_correctness() {
    let (_temp, mut session) = setup_session(8, 16);

    // Nine even keys all address slot 0; the ninth forces the split
    let keys: Vec<i64> = (0..9).map(|i| i * 2).collect();
    insert_all(&mut session, &keys[..8]);
    assert_eq!(session.store().slot_count(), 2);
    assert_eq!(session.directory().global_depth(), 1);

    insert_all(&mut session, &keys[8..]);

    assert_eq!(session.store().slot_count(), 3);
    assert_eq!(session.directory().global_depth(), 2);
    assert_all_found(&mut session, &keys);

    // Slot 0 keeps keys ≡ 0 (mod 4), slot 2 gets keys ≡ 2 (mod 4)
    let dump = session.dump().unwrap();
    let low = dump.slots[0].bucket.as_ref().unwrap();
    let high = dump.slots[2].bucket.as_ref().unwrap();
    assert_eq!(low.local_depth, 2);
    assert_eq!(high.local_depth, 2);
    assert!(low.records().iter().all(|r| r.key % 4 == 0));
    assert!(high.records().iter().all(|r| r.key % 4 == 2));
    assert_eq!(low.len() + high.len(), 9);
    assert_eq!(low.len(), 5);
}

#[test]
fn test_split_scenario_load_factor_nine() {
    let (_temp, mut session) = setup_session(8, 16);

    let mut keys: Vec<i64> = (0..8).collect();
    insert_all(&mut session, &keys);
    assert_eq!(session.directory().global_depth(), 1);

    // Fill slot 0 up to the threshold, then one more
    insert_all(&mut session, &[8, 10, 12, 14]);
    assert_eq!(session.store().slot_count(), 2);
    insert_all(&mut session, &[16]);
    keys.extend([8, 10, 12, 14, 16]);

    assert_eq!(session.directory().global_depth(), 2);
    assert_eq!(session.store().slot_count(), 3);
    assert_all_found(&mut session, &keys);

    // Odd bucket untouched: still depth 1, shared by slots 1 and 3
    let pointers = session.directory().bucket_pointers().to_vec();
    assert_eq!(pointers[1], pointers[3]);
    assert_ne!(pointers[0], pointers[2]);
}

#[test]
fn test_split_without_doubling() {
    let (_temp, mut session) = setup_session(2, 16);

    // Even keys split slot 0 and double the directory to depth 2
    insert_all(&mut session, &[0, 2, 4]);
    assert_eq!(session.directory().global_depth(), 2);
    let pointers = session.directory().bucket_pointers().to_vec();
    assert_eq!(pointers[1], pointers[3]);

    // The odd bucket (depth 1) now splits without another doubling
    insert_all(&mut session, &[1, 3, 5]);
    assert_eq!(session.directory().global_depth(), 2);
    let pointers = session.directory().bucket_pointers().to_vec();
    assert_ne!(pointers[1], pointers[3]);

    assert_all_found(&mut session, &[0, 1, 2, 3, 4, 5]);
}

#[test]
fn test_split_retries_when_half_is_full() {
    let (_temp, mut session) = setup_session(2, 16);

    // All keys share their low three bits, so the split at depth 2 sends
    // every record to one half and a second split is needed
    insert_all(&mut session, &[0, 8, 16, 24]);

    assert_eq!(session.directory().global_depth(), 4);
    assert_eq!(session.store().slot_count(), 5);
    assert_all_found(&mut session, &[0, 8, 16, 24]);
}

#[test]
fn test_directory_full() {
    let (_temp, mut session) = setup_session(2, 2);

    insert_all(&mut session, &[0, 8, 16]);
    assert_eq!(session.directory().global_depth(), 2);
    let directory = session.directory().clone();
    let slots = session.store().slot_count();

    let result = session.hash().insert(24, 2400);
    assert!(matches!(
        result,
        Err(BestiaryError::DirectoryFull { max_depth: 2 })
    ));
    assert_all_found(&mut session, &[0, 8, 16]);

    // Refused before any split ran
    assert_eq!(session.directory(), &directory);
    assert_eq!(session.store().slot_count(), slots);
}

#[test]
fn test_directory_full_after_several_splits() {
    let (_temp, mut session) = setup_session(2, 3);
    insert_all(&mut session, &[0, 8, 16]);
    let directory = session.directory().clone();
    let slots = session.store().slot_count();

    // Would need depth 4 to separate 24 from the others
    let result = session.hash().insert(24, 2400);
    assert!(matches!(
        result,
        Err(BestiaryError::DirectoryFull { max_depth: 3 })
    ));

    assert_eq!(session.directory(), &directory);
    assert_eq!(session.store().slot_count(), slots);
    assert_all_found(&mut session, &[0, 8, 16]);
}

#[test]
fn test_split_within_depth_limit_succeeds() {
    let (_temp, mut session) = setup_session(2, 3);

    // 4 differs from 0 and 8 in bit 2, which depth 3 can still split on
    insert_all(&mut session, &[0, 8, 16, 4]);

    assert_eq!(session.directory().global_depth(), 3);
    assert_all_found(&mut session, &[0, 8, 16, 4]);
}

#[test]
fn test_directory_length_tracks_depth() {
    let (_temp, mut session) = setup_session(3, 20);
    let keys: Vec<i64> = (0..500).map(|i| i * 7).collect();

    insert_all(&mut session, &keys);

    let directory = session.directory();
    assert_eq!(directory.len(), 1 << directory.global_depth());
    assert_all_found(&mut session, &keys);
}

// =============================================================================
// Merge Tests
// =============================================================================

#[test]
fn test_merge_reclaims_slot() {
    let (_temp, mut session) = setup_session(8, 16);

    session.hash().insert(1, 100).unwrap();
    session.hash().delete(1).unwrap();

    // The odd bucket emptied and folded into the even one
    let directory = session.directory();
    assert_eq!(directory.free_list().iter().copied().collect::<Vec<_>>(), vec![SLOT]);
    assert_eq!(directory.bucket_pointers(), &[0, 0]);

    // Nine even keys fill the merged bucket and force a split, which must
    // reuse the freed slot instead of growing the file
    let keys: Vec<i64> = (0..9).map(|i| i * 2).collect();
    insert_all(&mut session, &keys);

    assert_eq!(session.store().slot_count(), 2);
    assert!(session.directory().free_list().is_empty());
    assert_eq!(session.directory().bucket_pointers(), &[0, SLOT]);
    assert_all_found(&mut session, &keys);

    insert_all(&mut session, &[1]);
    assert_all_found(&mut session, &[1]);
}

#[test]
fn test_merge_lowers_buddy_depth() {
    let (_temp, mut session) = setup_session(8, 16);
    let evens: Vec<i64> = (0..9).map(|i| i * 2).collect();
    insert_all(&mut session, &evens);
    assert_eq!(session.directory().global_depth(), 2);

    let upper = session.directory().pointer(2);

    // Empty the bucket holding keys ≡ 2 (mod 4)
    {
        let mut hash = session.hash();
        for key in [2, 6, 10, 14] {
            hash.delete(key).unwrap();
        }
    }

    let directory = session.directory();
    assert_eq!(directory.pointer(2), directory.pointer(0));
    assert_eq!(directory.free_list().front(), Some(&upper));

    let dump = session.dump().unwrap();
    assert_eq!(dump.slots[0].bucket.as_ref().unwrap().local_depth, 1);

    let remaining = [0, 4, 8, 12, 16];
    assert_all_found(&mut session, &remaining);

    insert_all(&mut session, &[2, 6]);
    assert_all_found(&mut session, &[0, 2, 4, 6, 8, 12, 16]);
}

#[test]
fn test_no_merge_when_buddy_is_deeper() {
    let (_temp, mut session) = setup_session(8, 16);
    insert_all(&mut session, &(0..8).collect::<Vec<_>>());
    insert_all(&mut session, &[8, 10, 12, 14, 16]);
    let before = session.directory().bucket_pointers().to_vec();

    // The odd bucket (depth 1) empties, but its buddy has depth 2
    {
        let mut hash = session.hash();
        for key in [1, 3, 5, 7] {
            hash.delete(key).unwrap();
        }
    }

    assert!(session.directory().free_list().is_empty());
    assert_eq!(session.directory().bucket_pointers(), before.as_slice());
    assert_all_found(&mut session, &[0, 2, 4, 6, 8, 10, 12, 14, 16]);

    insert_all(&mut session, &[3]);
    assert_all_found(&mut session, &[3]);
}

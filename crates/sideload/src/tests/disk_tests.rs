//! Disk-variant specifics: lazy directory lifecycle, on-disk naming,
//! foreign files, replica isolation, interrupted-write cleanup.

use super::*;
use std::fs;
use tempfile::tempdir;

const HIGH_TERM: u64 = 2;

// -------------------- Directory lifecycle --------------------

#[test]
fn directory_is_created_lazily_on_first_put() {
    let base = tempdir().unwrap();
    let ctx = OpContext::background();
    let mut ss = DiskSideloadStorage::new(base.path(), 1, 2);

    assert!(!ss.dir_created());
    assert!(!ss.dir().exists());

    // Reads on a fresh storage do not create (or check) the directory.
    assert!(matches!(ss.get(&ctx, 1, 1), Err(SideloadError::NotFound)));
    assert!(!ss.dir().exists());

    ss.put(&ctx, 1, HIGH_TERM, &payload(1)).unwrap();
    assert!(ss.dir_created());
    assert!(ss.dir().is_dir());
}

#[test]
fn clear_removes_directory() {
    let base = tempdir().unwrap();
    let ctx = OpContext::background();
    let mut ss = DiskSideloadStorage::new(base.path(), 1, 2);

    ss.put(&ctx, 1, HIGH_TERM, &payload(1)).unwrap();
    ss.clear(&ctx).unwrap();
    assert!(!ss.dir_created());
    assert!(!ss.dir().exists());

    // Put on a recently cleared storage recreates the directory.
    ss.put(&ctx, 2, HIGH_TERM, &payload(2)).unwrap();
    assert!(ss.dir().is_dir());
}

#[test]
fn full_truncation_removes_directory() {
    let base = tempdir().unwrap();
    let ctx = OpContext::background();
    let mut ss = DiskSideloadStorage::new(base.path(), 1, 2);

    for i in [3u64, 5, 7, 9, 10] {
        ss.put(&ctx, i, HIGH_TERM, &payload(i)).unwrap();
    }
    ss.truncate_to(&ctx, u64::MAX).unwrap();
    assert!(!ss.dir().exists());
    assert!(!ss.dir_created());
}

#[test]
fn partial_truncation_keeps_directory() {
    let base = tempdir().unwrap();
    let ctx = OpContext::background();
    let mut ss = DiskSideloadStorage::new(base.path(), 1, 2);

    ss.put(&ctx, 3, HIGH_TERM, &payload(3)).unwrap();
    ss.put(&ctx, 9, HIGH_TERM, &payload(9)).unwrap();
    ss.truncate_to(&ctx, 5).unwrap();
    assert!(ss.dir().is_dir());
    assert_eq!(ss.get(&ctx, 9, HIGH_TERM).unwrap(), payload(9));
}

#[test]
fn truncate_on_absent_directory_is_noop() {
    let base = tempdir().unwrap();
    let ctx = OpContext::background();
    let mut ss = DiskSideloadStorage::new(base.path(), 1, 2);

    assert_eq!(ss.truncate_to(&ctx, 1).unwrap(), TruncateStats::default());
    assert!(!ss.dir_created());
}

#[test]
fn purge_does_not_remove_empty_directory() {
    let base = tempdir().unwrap();
    let ctx = OpContext::background();
    let mut ss = DiskSideloadStorage::new(base.path(), 1, 2);

    ss.put(&ctx, 1, HIGH_TERM, &payload(1)).unwrap();
    ss.purge(&ctx, 1, HIGH_TERM).unwrap();
    assert!(ss.dir().is_dir());
}

// -------------------- Foreign files --------------------

#[test]
fn foreign_file_blocks_final_removal() {
    let base = tempdir().unwrap();
    let ctx = OpContext::background();
    let mut ss = DiskSideloadStorage::new(base.path(), 1, 2);

    for i in [3u64, 5, 7, 9, 10] {
        ss.put(&ctx, i, HIGH_TERM, &payload(i)).unwrap();
    }

    let foreign = ss.dir().join("cantremove.xx");
    fs::write(&foreign, b"not ours").unwrap();

    let err = ss.truncate_to(&ctx, u64::MAX).unwrap_err();
    // The error message names the offending directory.
    assert!(err.to_string().contains("directory not empty"));
    assert!(err.to_string().contains(ss.dir().to_str().unwrap()));
    match err {
        SideloadError::DirectoryNotEmpty(dir) => assert_eq!(dir, ss.dir()),
        other => panic!("expected DirectoryNotEmpty, got {other:?}"),
    }

    // After the operator removes the foreign file a retry succeeds and the
    // directory is gone.
    fs::remove_file(&foreign).unwrap();
    ss.truncate_to(&ctx, u64::MAX).unwrap();
    assert!(!ss.dir().exists());
}

#[test]
fn foreign_file_is_not_listed_or_truncated() {
    let base = tempdir().unwrap();
    let ctx = OpContext::background();
    let mut ss = DiskSideloadStorage::new(base.path(), 1, 2);

    ss.put(&ctx, 5, HIGH_TERM, &payload(5)).unwrap();
    fs::write(ss.dir().join("NOTES"), b"operator scribbles").unwrap();

    assert_eq!(ss.list(&ctx).unwrap(), vec![(5, HIGH_TERM)]);

    // Partial truncation leaves foreign files alone.
    ss.truncate_to(&ctx, 4).unwrap();
    assert!(ss.dir().join("NOTES").exists());
}

// -------------------- Naming & layout --------------------

#[test]
fn on_disk_layout_is_deterministic() {
    let base = tempdir().unwrap();
    let ctx = OpContext::background();
    let mut ss = DiskSideloadStorage::new(base.path(), 12, 34);

    assert_eq!(ss.dir(), base.path().join("sideload_12_34"));
    ss.put(&ctx, 56, 78, b"x").unwrap();
    assert!(base.path().join("sideload_12_34").join("i56t78").is_file());
}

#[test]
fn filename_returns_path_without_checking_existence() {
    let base = tempdir().unwrap();
    let ctx = OpContext::background();
    let ss = DiskSideloadStorage::new(base.path(), 1, 2);

    let path = ss.filename(&ctx, 13, 99).unwrap();
    assert_eq!(path, ss.dir().join("i13t99"));
    assert!(!path.exists());
}

#[test]
fn payload_file_name_roundtrip() {
    assert_eq!(payload_file_name(13, 99), "i13t99");
    assert_eq!(parse_payload_file_name("i13t99"), Some((13, 99)));
    assert_eq!(parse_payload_file_name("cantremove.xx"), None);
    assert_eq!(parse_payload_file_name("i13"), None);
    assert_eq!(parse_payload_file_name("it"), None);
    assert_eq!(parse_payload_file_name("i13t"), None);
    assert_eq!(parse_payload_file_name("ixty"), None);
}

// -------------------- Replica isolation & rediscovery --------------------

#[test]
fn other_replica_does_not_observe_payloads() {
    let base = tempdir().unwrap();
    let ctx = OpContext::background();

    let mut ss = DiskSideloadStorage::new(base.path(), 1, 2);
    ss.put(&ctx, 3, HIGH_TERM, &payload(3)).unwrap();

    let other = DiskSideloadStorage::new(base.path(), 1, 999);
    assert!(matches!(
        other.get(&ctx, 3, HIGH_TERM),
        Err(SideloadError::NotFound)
    ));
}

#[test]
fn fresh_instance_discovers_existing_layout() {
    let base = tempdir().unwrap();
    let ctx = OpContext::background();

    {
        let mut ss = DiskSideloadStorage::new(base.path(), 1, 2);
        ss.put(&ctx, 3, 1, &payload(3)).unwrap();
        ss.put(&ctx, 3, 2, &payload(6)).unwrap();
    }

    // Recreating the storage over the same layout changes nothing about its
    // contents; dir_created starts false and is discovered lazily.
    let mut ss = DiskSideloadStorage::new(base.path(), 1, 2);
    assert!(!ss.dir_created());
    assert_eq!(ss.get(&ctx, 3, 1).unwrap(), payload(3));
    assert_eq!(ss.get(&ctx, 3, 2).unwrap(), payload(6));
    assert!(!ss.dir_created());

    // A put over the existing directory works fine.
    ss.put(&ctx, 4, 2, &payload(8)).unwrap();
    assert_eq!(ss.list(&ctx).unwrap(), vec![(3, 1), (3, 2), (4, 2)]);
}

// -------------------- Interrupted writes --------------------

#[test]
fn truncation_sweeps_leftover_tmp_files() {
    let base = tempdir().unwrap();
    let ctx = OpContext::background();
    let mut ss = DiskSideloadStorage::new(base.path(), 1, 2);

    ss.put(&ctx, 9, HIGH_TERM, &payload(9)).unwrap();
    // Simulate a crash mid-put: the temp file survived, the rename didn't.
    fs::write(ss.dir().join("i5t2.tmp"), b"partial").unwrap();

    let stats = ss.truncate_to(&ctx, 4).unwrap();
    assert!(!ss.dir().join("i5t2.tmp").exists());
    // Temp files are invisible payloads; they count as neither freed nor
    // retained.
    assert_eq!(stats.freed, 0);

    // And a full truncation can now remove the directory.
    ss.truncate_to(&ctx, u64::MAX).unwrap();
    assert!(!ss.dir().exists());
}

#[test]
fn overwrite_is_atomic_on_the_key() {
    let base = tempdir().unwrap();
    let ctx = OpContext::background();
    let mut ss = DiskSideloadStorage::new(base.path(), 1, 2);

    ss.put(&ctx, 1, 1, &vec![b'a'; 4096]).unwrap();
    ss.put(&ctx, 1, 1, b"b").unwrap();
    assert_eq!(ss.get(&ctx, 1, 1).unwrap(), b"b");
    // No temp file left behind.
    assert_eq!(ss.list(&ctx).unwrap(), vec![(1, 1)]);
    assert!(!ss.dir().join("i1t1.tmp").exists());
}

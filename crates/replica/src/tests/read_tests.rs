//! Tests for the log read path and its cache-fill rules.

use super::*;

const RANGE_ID: u64 = 1;

/// A replica with one sideloaded proposal applied, returning the index it
/// landed at.
fn replica_with_ingest(ctx: &OpContext) -> (Replica, u64) {
    let mut repl = Replica::new_in_mem(RANGE_ID, 1);
    repl.propose_write(ctx, b"w1".to_vec()).unwrap();
    let index = repl.propose_ingest(ctx, b"bulk sstable".to_vec()).unwrap();
    repl.propose_write(ctx, b"w2".to_vec()).unwrap();
    (repl, index)
}

#[test]
fn entries_inlines_and_populates_cache() {
    let ctx = OpContext::background();
    let (mut repl, index) = replica_with_ingest(&ctx);

    let ents = repl.entries(&ctx, index, index + 1, usize::MAX).unwrap();
    assert_eq!(ents.len(), 1);
    let ingest = ingest_of(&ents[0]).unwrap();
    assert_eq!(ingest.data, b"bulk sstable");

    // The fat entry landed in the cache.
    let cached = repl.entry_cache().get(RANGE_ID, index).unwrap();
    assert_eq!(cached, &ents[0]);
}

#[test]
fn entries_without_storage_neither_inlines_nor_caches() {
    let ctx = OpContext::background();
    let (mut repl, index) = replica_with_ingest(&ctx);

    let ents = repl
        .entries_no_sideload(&ctx, index, index + 1, usize::MAX)
        .unwrap();
    assert_eq!(ents.len(), 1);
    // The entry comes back thin, exactly as stored in the log.
    let ingest = ingest_of(&ents[0]).unwrap();
    assert!(ingest.data.is_empty());

    // And the cache must not have been polluted with it.
    assert!(repl.entry_cache().get(RANGE_ID, index).is_none());
}

#[test]
fn warm_cache_does_not_leak_fat_entries_into_storageless_reads() {
    let ctx = OpContext::background();
    let (mut repl, index) = replica_with_ingest(&ctx);

    // Warm the cache with the fat entry via a normal read.
    repl.entries(&ctx, index, index + 1, usize::MAX).unwrap();
    assert!(repl.entry_cache().get(RANGE_ID, index).is_some());

    // A storage-less read of the same index must still return the thin
    // entry as stored in the log, not the cached fat one.
    let ents = repl
        .entries_no_sideload(&ctx, index, index + 1, usize::MAX)
        .unwrap();
    assert_eq!(ents.len(), 1);
    assert!(ingest_of(&ents[0]).unwrap().data.is_empty());
    assert_eq!(&ents[0], repl.raft_log().get(index).unwrap());
}

#[test]
fn second_read_is_served_from_cache() {
    let ctx = OpContext::background();
    let (mut repl, index) = replica_with_ingest(&ctx);

    let first = repl.entries(&ctx, index, index + 1, usize::MAX).unwrap();

    // Remove the payload from storage; a cached read must still succeed.
    repl.sideloaded_mut().clear(&ctx).unwrap();
    let second = repl.entries(&ctx, index, index + 1, usize::MAX).unwrap();
    assert_eq!(first, second);
}

#[test]
fn read_spans_cached_and_uncached_entries() {
    let ctx = OpContext::background();
    let (mut repl, index) = replica_with_ingest(&ctx);
    let lo = index - 1;
    let hi = index + 2;

    // Warm the cache with just the ingest entry.
    repl.entries(&ctx, index, index + 1, usize::MAX).unwrap();

    let ents = repl.entries(&ctx, lo, hi, usize::MAX).unwrap();
    assert_eq!(
        ents.iter().map(|e| e.index).collect::<Vec<_>>(),
        vec![lo, index, index + 1]
    );
    assert_eq!(ingest_of(&ents[1]).unwrap().data, b"bulk sstable");
}

#[test]
fn missing_log_entry_is_an_error() {
    let ctx = OpContext::background();
    let (mut repl, index) = replica_with_ingest(&ctx);

    let err = repl
        .entries(&ctx, index, index + 100, usize::MAX)
        .unwrap_err();
    assert!(err.to_string().contains("missing log entry"));
}

#[test]
fn byte_budget_limits_the_result() {
    let ctx = OpContext::background();
    let mut repl = Replica::new_in_mem(RANGE_ID, 1);
    let first = repl.propose_write(&ctx, vec![b'x'; 100]).unwrap();
    repl.propose_write(&ctx, vec![b'y'; 100]).unwrap();

    // A one-byte budget still returns the first entry.
    let ents = repl.entries(&ctx, first, first + 2, 1).unwrap();
    assert_eq!(ents.len(), 1);
    assert_eq!(ents[0].index, first);

    let all = repl.entries(&ctx, first, first + 2, usize::MAX).unwrap();
    assert_eq!(all.len(), 2);
}

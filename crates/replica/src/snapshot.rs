//! Snapshot send integration. Log entries read from an engine snapshot are
//! thin; the streamer must inline each one before sending, and a payload
//! that was truncated away between the engine snapshot and the log read
//! turns into a typed retry error.

use anyhow::Result;
use cache::EntryCache;
use codec::RaftEntry;
use context::OpContext;
use sideload::{SideloadError, SideloadStorage};
use thiserror::Error;

use crate::{maybe_inline_sideloaded, Replica};

/// The sideload storage no longer holds a payload one of the snapshot's log
/// entries needs: the log truncation queue ran between taking the engine
/// snapshot and reading the entries. The sender restarts from a fresh
/// (engine + log) snapshot pair.
#[derive(Debug, Error)]
#[error("snapshot must be retried: sideloaded payload was truncated away")]
pub struct MustRetrySnapshotDueToTruncation;

/// Point-in-time state captured for transmission to another replica.
#[derive(Debug)]
pub struct OutgoingSnapshot {
    pub range_id: u64,
    /// Log entries as read from the engine snapshot; sideloaded ones are
    /// thin and must be inlined before streaming.
    pub entries: Vec<RaftEntry>,
}

/// Inlines every sideloaded entry of a snapshot. Any missing payload fails
/// the whole snapshot with [`MustRetrySnapshotDueToTruncation`].
pub fn inline_snapshot_entries(
    ctx: &OpContext,
    range_id: u64,
    entries: &[RaftEntry],
    sideloaded: &dyn SideloadStorage,
    cache: &EntryCache,
) -> Result<Vec<RaftEntry>> {
    let mut out = Vec::with_capacity(entries.len());
    for ent in entries {
        match maybe_inline_sideloaded(ctx, range_id, ent, sideloaded, cache) {
            Ok(Some(fat)) => out.push(fat),
            Ok(None) => out.push(ent.clone()),
            Err(err) => {
                if matches!(
                    err.downcast_ref::<SideloadError>(),
                    Some(SideloadError::NotFound)
                ) {
                    return Err(MustRetrySnapshotDueToTruncation.into());
                }
                return Err(err);
            }
        }
    }
    Ok(out)
}

impl Replica {
    /// Captures the replica's log as an engine snapshot would see it: thin
    /// entries, decoupled from later log and storage mutations.
    pub fn log_snapshot(&self) -> OutgoingSnapshot {
        OutgoingSnapshot {
            range_id: self.range_id,
            entries: self.log.snapshot_entries(),
        }
    }

    /// Prepares a previously captured snapshot's entries for streaming,
    /// inlining each sideloaded one against the live storage and cache.
    pub fn stream_snapshot(&self, ctx: &OpContext, snap: &OutgoingSnapshot) -> Result<Vec<RaftEntry>> {
        inline_snapshot_entries(
            ctx,
            snap.range_id,
            &snap.entries,
            self.sideloaded.as_ref(),
            &self.cache,
        )
    }
}

//! Truncation glue: once a Raft log truncation has committed, drop the
//! truncated prefix from the log, the entry cache, and the sideload
//! storage, and keep the tracked log size in sync.

use anyhow::Result;
use context::OpContext;
use sideload::{SideloadStorage, TruncateStats};

use crate::Replica;

impl Replica {
    /// Applies a committed log truncation: everything below `first_index`
    /// is dropped from the log, the cache, and the sideload storage. The
    /// tracked log size shrinks by the removed entry bytes **and** the freed
    /// payload bytes (payloads were counted when their entries were
    /// appended).
    ///
    /// Truncation is not strictly ordered with reproposals, so a payload
    /// written for a reproposed entry may briefly outlive its index's
    /// truncation; the next truncation sweeps it.
    pub fn truncate_log(&mut self, ctx: &OpContext, first_index: u64) -> Result<TruncateStats> {
        let removed = self.log.truncate_prefix(first_index);
        let removed_bytes: u64 = removed.iter().map(|e| e.size() as u64).sum();

        self.cache.clear_to(self.range_id, first_index);

        let stats = self.sideloaded.truncate_to(ctx, first_index)?;
        self.raft_log_size = self
            .raft_log_size
            .saturating_sub(removed_bytes + stats.freed);

        tracing::debug!(
            target: "harborkv::sideload",
            range_id = self.range_id,
            first_index,
            entries_removed = removed.len(),
            payload_bytes_freed = stats.freed,
            "truncated raft log"
        );
        Ok(stats)
    }

    /// Recomputes the actual log size (entry bytes plus stored payload
    /// bytes) for consistency checks against [`raft_log_size`].
    ///
    /// Probes the payload total via a truncation at the log's first index,
    /// which removes nothing that is still referenced but does sweep
    /// payloads leaked below it.
    ///
    /// [`raft_log_size`]: Replica::raft_log_size
    pub fn recompute_raft_log_size(&mut self, ctx: &OpContext) -> Result<u64> {
        let entry_bytes: u64 = self.log.iter().map(|e| e.size() as u64).sum();
        let stats = self.sideloaded.truncate_to(ctx, self.log.first_index())?;
        Ok(entry_bytes + stats.retained)
    }
}

//! Log read path. Serves entries from the entry cache when possible, falls
//! back to the log, and inlines sideloaded entries on the way out.
//!
//! The cache rule matters: the cache holds only fat entries, so it is
//! consulted and populated only when a sideload storage is supplied. A
//! caller without one (e.g. a term lookup that doesn't care about payloads)
//! gets thin entries straight from the log and leaves the cache alone.

use anyhow::{bail, ensure, Result};
use cache::EntryCache;
use codec::RaftEntry;
use context::OpContext;
use sideload::SideloadStorage;

use crate::{maybe_inline_sideloaded, RaftLog, Replica};

/// Reads entries `[lo, hi)` from the cache and `log`, up to roughly
/// `max_bytes` (at least one entry is returned if any exists). With a
/// sideload storage, returned entries are fat and newly read ones are added
/// to `cache`; with `None`, entries come back as stored in the log and the
/// cache is neither consulted nor populated.
pub fn read_entries(
    ctx: &OpContext,
    range_id: u64,
    log: &RaftLog,
    cache: &mut EntryCache,
    sideloaded: Option<&dyn SideloadStorage>,
    lo: u64,
    hi: u64,
    max_bytes: usize,
) -> Result<Vec<RaftEntry>> {
    ensure!(lo <= hi, "invalid entry range [{lo}, {hi})");

    // The cache holds fat entries, so it can only serve callers that asked
    // for inlining; a storage-less read must come straight from the log.
    let mut out = if sideloaded.is_some() {
        cache.get_entries(range_id, lo, hi, max_bytes)
    } else {
        Vec::new()
    };
    let mut bytes: usize = out.iter().map(|e| e.size()).sum();
    let mut next = lo + out.len() as u64;

    let fetched_from = out.len();
    while next < hi {
        ctx.check_canceled()?;
        let Some(ent) = log.get(next) else {
            bail!("missing log entry at index {next}");
        };
        let ent = match sideloaded {
            Some(ss) => match maybe_inline_sideloaded(ctx, range_id, ent, ss, cache)? {
                Some(fat) => fat,
                None => ent.clone(),
            },
            None => ent.clone(),
        };
        let size = ent.size();
        if !out.is_empty() && bytes + size > max_bytes {
            break;
        }
        bytes += size;
        out.push(ent);
        next += 1;
    }

    if sideloaded.is_some() && out.len() > fetched_from {
        cache.add_entries(range_id, &out[fetched_from..]);
    }
    Ok(out)
}

impl Replica {
    /// Reads `[lo, hi)` with inlining: every returned sideloaded entry is
    /// fat, and the entry cache is warmed with what was read.
    pub fn entries(
        &mut self,
        ctx: &OpContext,
        lo: u64,
        hi: u64,
        max_bytes: usize,
    ) -> Result<Vec<RaftEntry>> {
        read_entries(
            ctx,
            self.range_id,
            &self.log,
            &mut self.cache,
            Some(self.sideloaded.as_ref()),
            lo,
            hi,
            max_bytes,
        )
    }

    /// Reads `[lo, hi)` without a sideload storage: no inlining, and the
    /// entry cache is neither read nor written. Used by callers that only
    /// need entry metadata.
    pub fn entries_no_sideload(
        &mut self,
        ctx: &OpContext,
        lo: u64,
        hi: u64,
        max_bytes: usize,
    ) -> Result<Vec<RaftEntry>> {
        read_entries(
            ctx,
            self.range_id,
            &self.log,
            &mut self.cache,
            None,
            lo,
            hi,
            max_bytes,
        )
    }
}

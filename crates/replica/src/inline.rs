//! Inbound inlining pipeline: restore the payload of a thin entry read back
//! from the Raft log, consulting the entry cache before the storage.

use anyhow::{anyhow, Result};
use cache::EntryCache;
use codec::{
    decode_raft_command, encode_raft_command, sniff_sideloaded, EntryVersion, RaftEntry,
    ReplicatedCommand,
};
use context::OpContext;
use sideload::{SideloadError, SideloadStorage};

/// Re-inlines the sideloaded payload of `entry`, if it has one.
///
/// Returns `Ok(None)` when the entry needs no work: it is not sideloaded,
/// carries no ingest, or is already fat. Otherwise returns the fat entry,
/// taken from the entry cache when a cached version at the same term exists
/// and from `sideloaded` otherwise. The input entry is never mutated.
///
/// A payload missing from storage fails with a `missing sideloaded payload`
/// error wrapping [`SideloadError::NotFound`]; the snapshot path translates
/// it into a retry.
pub fn maybe_inline_sideloaded(
    ctx: &OpContext,
    range_id: u64,
    entry: &RaftEntry,
    sideloaded: &dyn SideloadStorage,
    cache: &EntryCache,
) -> Result<Option<RaftEntry>> {
    if !sniff_sideloaded(&entry.data) {
        return Ok(None);
    }

    let (cmd_id, cmd_bytes) = decode_raft_command(&entry.data)?;
    let mut cmd = ReplicatedCommand::unmarshal(cmd_bytes)?;
    let Some(ingest) = cmd.ingest.as_mut() else {
        return Ok(None);
    };
    if !ingest.data.is_empty() {
        ctx.record("already inlined");
        return Ok(None);
    }

    // The cache holds fat entries only, so a hit at the right term saves the
    // storage read and the re-encode.
    if let Some(cached) = cache.get(range_id, entry.index) {
        if cached.term == entry.term {
            ctx.record("using cache hit");
            return Ok(Some(cached.clone()));
        }
    }

    ingest.data = match sideloaded.get(ctx, entry.index, entry.term) {
        Ok(payload) => payload,
        Err(err @ SideloadError::NotFound) => {
            return Err(anyhow!(err).context(format!(
                "missing sideloaded payload for entry at index {} term {}",
                entry.index, entry.term
            )));
        }
        Err(err) => return Err(err.into()),
    };

    let fat = RaftEntry::new(
        entry.index,
        entry.term,
        encode_raft_command(EntryVersion::Sideloaded, cmd_id, &cmd.marshal()?),
    );
    ctx.record("inlined entry not cached");
    Ok(Some(fat))
}

//! Outbound sideloading pipeline: given a batch of entries about to be
//! appended, strip the bulk payloads of sideloaded commands into the
//! sideload storage and hand back the thinned batch.

use std::borrow::Cow;

use anyhow::Result;
use codec::{
    decode_raft_command, encode_raft_command, sniff_sideloaded, CommandId, EntryVersion,
    RaftEntry, ReplicatedCommand,
};
use context::OpContext;
use sideload::SideloadStorage;

/// Strips the payload out of every sideloaded entry in `entries`, writing
/// each payload to `sideloaded` under the entry's `(index, term)`. Returns
/// the (possibly thinned) batch and the total payload bytes stripped.
///
/// `maybe_cmd` may supply an already-decoded command for the envelope's
/// command id, saving the unmarshal of a proposal that is still in memory.
///
/// The caller's entries are never mutated: the batch is copied lazily, on
/// the first entry that actually needs thinning. Entries with the standard
/// encoding pass through untouched even if they carry an ingest.
///
/// A storage failure aborts the batch; payloads already written stay behind
/// and are swept by later truncation.
pub fn maybe_sideload_entries<'a>(
    ctx: &OpContext,
    entries: &'a [RaftEntry],
    sideloaded: &mut dyn SideloadStorage,
    maybe_cmd: impl Fn(CommandId) -> Option<ReplicatedCommand>,
) -> Result<(Cow<'a, [RaftEntry]>, u64)> {
    let mut output: Option<Vec<RaftEntry>> = None;
    let mut stripped = 0u64;

    for (i, ent) in entries.iter().enumerate() {
        if !sniff_sideloaded(&ent.data) {
            continue;
        }

        let (cmd_id, cmd_bytes) = decode_raft_command(&ent.data)?;
        let mut cmd = match maybe_cmd(cmd_id) {
            Some(cmd) => {
                ctx.record("command already in memory");
                cmd
            }
            None => ReplicatedCommand::unmarshal(cmd_bytes)?,
        };

        let payload = match cmd.ingest.as_mut() {
            Some(ingest) if !ingest.data.is_empty() => std::mem::take(&mut ingest.data),
            // Nothing to strip; forward unchanged.
            _ => continue,
        };

        let output = output.get_or_insert_with(|| {
            ctx.record(format!("copying entries slice of length {}", entries.len()));
            entries.to_vec()
        });

        ctx.record("writing payload");
        sideloaded.put(ctx, ent.index, ent.term, &payload)?;
        stripped += payload.len() as u64;

        output[i].data = encode_raft_command(EntryVersion::Sideloaded, cmd_id, &cmd.marshal()?);
    }

    let entries = match output {
        Some(thinned) => Cow::Owned(thinned),
        None => Cow::Borrowed(entries),
    };
    Ok((entries, stripped))
}

//! Append path: proposals flow through the sideloading pipeline, thin
//! entries land in the Raft log, and the tracked log size grows by the
//! entry bytes plus the stripped payload bytes.

use anyhow::Result;
use codec::{
    encode_raft_command, CommandId, EntryVersion, IngestSst, RaftEntry, ReplicatedCommand,
};
use context::OpContext;

use crate::{maybe_sideload_entries, Replica};

impl Replica {
    /// Proposes a bulk-ingest command carrying `sst` and appends it. The
    /// payload is sideloaded during the append; the log receives the thin
    /// entry. Returns the index the proposal landed at.
    pub fn propose_ingest(&mut self, ctx: &OpContext, sst: Vec<u8>) -> Result<u64> {
        ctx.record("sideloadable proposal detected");
        let index = self.log.last_index() + 1;
        let cmd = ReplicatedCommand {
            max_lease_index: index,
            ingest: Some(IngestSst::new(sst)),
            write_batch: Vec::new(),
        };
        let id = self.next_command_id();
        let ent = RaftEntry::new(
            index,
            self.term,
            encode_raft_command(EntryVersion::Sideloaded, id, &cmd.marshal()?),
        );
        self.append_entries(ctx, &[ent], |_| None)?;
        Ok(index)
    }

    /// Proposes an ordinary write-batch command (standard encoding; never
    /// sideloaded). Returns the index the proposal landed at.
    pub fn propose_write(&mut self, ctx: &OpContext, write_batch: Vec<u8>) -> Result<u64> {
        let index = self.log.last_index() + 1;
        let cmd = ReplicatedCommand {
            max_lease_index: index,
            ingest: None,
            write_batch,
        };
        let id = self.next_command_id();
        let ent = RaftEntry::new(
            index,
            self.term,
            encode_raft_command(EntryVersion::Standard, id, &cmd.marshal()?),
        );
        self.append_entries(ctx, &[ent], |_| None)?;
        Ok(index)
    }

    /// Appends a batch of entries, sideloading payloads first. `maybe_cmd`
    /// may supply still-in-memory decoded commands by id. Returns the total
    /// payload bytes stripped from the batch.
    ///
    /// Payloads are written to storage before the thin entries are handed to
    /// the log, so a reader that observes the appended entries will find
    /// their payloads.
    pub fn append_entries(
        &mut self,
        ctx: &OpContext,
        entries: &[RaftEntry],
        maybe_cmd: impl Fn(CommandId) -> Option<ReplicatedCommand>,
    ) -> Result<u64> {
        let (entries, stripped) =
            maybe_sideload_entries(ctx, entries, self.sideloaded.as_mut(), maybe_cmd)?;
        for ent in entries.iter() {
            self.raft_log_size += ent.size() as u64;
        }
        self.raft_log_size += stripped;
        self.log.append(entries.into_owned());
        Ok(stripped)
    }
}

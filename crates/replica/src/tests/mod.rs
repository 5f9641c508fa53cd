use crate::*;

use cache::EntryCache;
use codec::{
    decode_raft_command, encode_raft_command, sniff_sideloaded, CommandId, EntryVersion,
    IngestSst, RaftEntry, ReplicatedCommand,
};
use context::OpContext;
use sideload::{MemSideloadStorage, SideloadError, SideloadStorage};

mod read_tests;

pub(crate) fn test_cmd_id() -> CommandId {
    CommandId::from_bytes(*b"xxxxxxxx")
}

/// Builds an entry wrapping a command with the given ingest sub-message,
/// mirroring what the proposal path produces.
pub(crate) fn mk_ent(
    version: EntryVersion,
    index: u64,
    term: u64,
    ingest: Option<&IngestSst>,
) -> RaftEntry {
    let cmd = ReplicatedCommand {
        max_lease_index: 0,
        ingest: ingest.cloned(),
        write_batch: Vec::new(),
    };
    RaftEntry::new(
        index,
        term,
        encode_raft_command(version, test_cmd_id(), &cmd.marshal().unwrap()),
    )
}

/// Fat ingest: payload inline. The crc32 is deliberately left at zero; the
/// pipelines never check it.
pub(crate) fn sst_fat() -> IngestSst {
    IngestSst {
        data: b"foo".to_vec(),
        crc32: 0,
    }
}

/// Thin ingest: payload stripped.
pub(crate) fn sst_thin() -> IngestSst {
    IngestSst {
        data: Vec::new(),
        crc32: 0,
    }
}

/// Decodes the ingest sub-message out of an entry's envelope.
pub(crate) fn ingest_of(ent: &RaftEntry) -> Option<IngestSst> {
    let (_, cmd_bytes) = decode_raft_command(&ent.data).unwrap();
    ReplicatedCommand::unmarshal(cmd_bytes).unwrap().ingest
}

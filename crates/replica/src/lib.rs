//! # Replica - Raft Log Sideloading Orchestrator
//!
//! Ties the [`codec`], [`cache`], and [`sideload`] crates together into the
//! sideloading data path of a single HarborKV replica.
//!
//! ## Data flow
//!
//! ```text
//! Proposals
//!   |
//!   v
//! ┌───────────────────────────────────────────────────┐
//! │                    REPLICA                        │
//! │                                                   │
//! │ append.rs → maybe_sideload_entries                │
//! │               |          |                        │
//! │               |          └→ payloads → sideload   │
//! │               v                        storage    │
//! │          thin entries → Raft log                  │
//! │                                                   │
//! │ read.rs → entry cache → log → maybe_inline        │
//! │             (fat)      (thin)    |                │
//! │                                  └→ sideload      │
//! │                                     storage       │
//! │                                                   │
//! │ snapshot.rs → inline all, or retry error          │
//! │ truncate.rs → log + cache + storage + size        │
//! │ rekey.rs    → move sideload dir on identity change│
//! └───────────────────────────────────────────────────┘
//! ```
//!
//! ## Module responsibilities
//!
//! | Module          | Purpose                                            |
//! |-----------------|----------------------------------------------------|
//! | [`lib.rs`]      | `Replica` struct, constructors, accessors, `Debug` |
//! | [`log`]         | In-memory Raft log keyspace stand-in               |
//! | [`sideloading`] | Outbound pipeline: strip payloads before append    |
//! | [`inline`]      | Inbound pipeline: restore payloads on read         |
//! | [`append`]      | Proposal + append path, log size accounting        |
//! | [`read`]        | Log read path with entry-cache fill rules          |
//! | [`snapshot`]    | Snapshot send integration + retry error            |
//! | [`truncate`]    | Truncation-triggered purges                        |
//! | [`rekey`]       | Replica-identity directory moves                   |
//!
//! All calls into a replica happen under its Raft mutex; nothing here is
//! internally synchronized. Consistency contract: the Raft log only ever
//! holds **thin** entries for the sideloaded encoding, with their payloads
//! retrievable from the sideload storage until truncated away; everything
//! handed back out of the read and snapshot paths is **fat**.

mod append;
mod inline;
mod log;
mod read;
mod rekey;
mod sideloading;
mod snapshot;
mod truncate;

use std::path::PathBuf;

use cache::EntryCache;
use codec::CommandId;
use sideload::{DiskSideloadStorage, MemSideloadStorage, SideloadStorage};

pub use inline::maybe_inline_sideloaded;
pub use log::RaftLog;
pub use read::read_entries;
pub use sideloading::maybe_sideload_entries;
pub use snapshot::{inline_snapshot_entries, MustRetrySnapshotDueToTruncation, OutgoingSnapshot};

/// Default byte budget for the per-replica entry cache.
pub const DEFAULT_ENTRY_CACHE_BYTES: usize = 4 * 1024 * 1024;

/// One replica's sideloading-aware Raft log state.
pub struct Replica {
    pub(crate) range_id: u64,
    pub(crate) replica_id: u64,
    /// Current Raft term, stamped onto proposals.
    pub(crate) term: u64,
    /// Base directory for disk sideload storages; `None` for in-memory
    /// replicas (which also skip directory moves on rekey).
    pub(crate) base_dir: Option<PathBuf>,
    pub(crate) log: RaftLog,
    pub(crate) sideloaded: Box<dyn SideloadStorage>,
    pub(crate) cache: EntryCache,
    /// Aggregate byte size of the Raft log **including** sideloaded
    /// payloads. Appends add, truncations subtract; see `truncate.rs`.
    pub(crate) raft_log_size: u64,
    next_cmd_seq: u64,
}

impl Replica {
    /// A replica whose payloads live on disk under
    /// `<base>/sideload_<range_id>_<replica_id>/`.
    pub fn new_disk(base_dir: impl Into<PathBuf>, range_id: u64, replica_id: u64) -> Self {
        let base_dir = base_dir.into();
        let sideloaded = DiskSideloadStorage::new(&base_dir, range_id, replica_id);
        Self {
            range_id,
            replica_id,
            term: 1,
            base_dir: Some(base_dir),
            log: RaftLog::new(),
            sideloaded: Box::new(sideloaded),
            cache: EntryCache::new(DEFAULT_ENTRY_CACHE_BYTES),
            raft_log_size: 0,
            next_cmd_seq: 0,
        }
    }

    /// A replica backed by in-memory sideload storage (tests, or replicas
    /// not yet assigned a store).
    pub fn new_in_mem(range_id: u64, replica_id: u64) -> Self {
        Self {
            range_id,
            replica_id,
            term: 1,
            base_dir: None,
            log: RaftLog::new(),
            sideloaded: Box::new(MemSideloadStorage::new(range_id, replica_id)),
            cache: EntryCache::new(DEFAULT_ENTRY_CACHE_BYTES),
            raft_log_size: 0,
            next_cmd_seq: 0,
        }
    }

    pub fn range_id(&self) -> u64 {
        self.range_id
    }

    pub fn replica_id(&self) -> u64 {
        self.replica_id
    }

    pub fn term(&self) -> u64 {
        self.term
    }

    /// Bumps the term stamped onto subsequent proposals (leadership change).
    pub fn set_term(&mut self, term: u64) {
        self.term = term;
    }

    /// Tracked Raft log size, sideloaded payloads included.
    pub fn raft_log_size(&self) -> u64 {
        self.raft_log_size
    }

    pub fn sideloaded(&self) -> &dyn SideloadStorage {
        self.sideloaded.as_ref()
    }

    pub fn sideloaded_mut(&mut self) -> &mut dyn SideloadStorage {
        self.sideloaded.as_mut()
    }

    pub fn entry_cache(&self) -> &EntryCache {
        &self.cache
    }

    pub fn entry_cache_mut(&mut self) -> &mut EntryCache {
        &mut self.cache
    }

    pub fn raft_log(&self) -> &RaftLog {
        &self.log
    }

    pub(crate) fn next_command_id(&mut self) -> CommandId {
        self.next_cmd_seq += 1;
        CommandId::from_bytes(self.next_cmd_seq.to_be_bytes())
    }
}

impl std::fmt::Debug for Replica {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Replica")
            .field("range_id", &self.range_id)
            .field("replica_id", &self.replica_id)
            .field("term", &self.term)
            .field("log_entries", &self.log.len())
            .field("raft_log_size", &self.raft_log_size)
            .field("cached_entries", &self.cache.len())
            .field("sideload_dir", &self.sideloaded.dir())
            .finish()
    }
}

#[cfg(test)]
mod tests;

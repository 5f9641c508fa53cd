//! # Sideload — Per-Replica Payload Storage
//!
//! Bulk-ingest commands carry payloads that are too large to keep inline in
//! the Raft log: they would be copied into every snapshot, pinned in the
//! entry cache, and re-read on every log scan. Instead the sideloading
//! pipeline strips the payload out of the entry before the append and hands
//! it to a [`SideloadStorage`], keyed by the entry's `(index, term)`. The
//! inlining pipeline reads it back when the full entry is needed.
//!
//! Two implementations share the contract:
//!
//! - [`DiskSideloadStorage`] — one file per payload under a per-replica
//!   directory. This is what runs in production.
//! - [`MemSideloadStorage`] — a plain map, for tests and for replicas that
//!   have not been assigned a store yet.
//!
//! ## On-disk layout
//!
//! ```text
//! <base>/sideload_<range_id>_<replica_id>/i<index>t<term>
//! ```
//!
//! The same `index` may exist at several `term`s (leadership changes and
//! reproposals); all versions coexist until purged or truncated. The
//! directory is created lazily on the first `put` and removed once the last
//! payload is truncated away.
//!
//! ## Truncation
//!
//! `truncate_to(first_index)` is **exclusive**: it removes every payload
//! with `index < first_index`, at every term, and reports the freed and
//! retained byte totals so the caller can keep its Raft log size accounting
//! in sync.

use std::io;
use std::path::{Path, PathBuf};

use context::OpContext;
use thiserror::Error;

mod disk;
mod mem;

pub use disk::DiskSideloadStorage;
pub use mem::MemSideloadStorage;

/// Byte totals reported by [`SideloadStorage::truncate_to`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TruncateStats {
    /// Bytes of payloads removed by this truncation.
    pub freed: u64,
    /// Bytes of payloads still stored after this truncation.
    pub retained: u64,
}

/// Errors from sideload storage operations.
#[derive(Debug, Error)]
pub enum SideloadError {
    /// No payload stored under the requested `(index, term)`.
    #[error("sideloaded payload not found")]
    NotFound,

    /// A foreign file kept the storage directory from being removed after a
    /// full truncation. Names the directory so operators can find the file.
    #[error("while purging {}: directory not empty", .0.display())]
    DirectoryNotEmpty(PathBuf),

    /// The operation context was cancelled at an I/O boundary.
    #[error(transparent)]
    Canceled(#[from] context::Canceled),

    /// Any other filesystem failure. Fatal for the Raft append path.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Keyed blob store for the sideloaded payloads of one replica.
///
/// All calls for a given replica happen under the replica's Raft mutex, so
/// implementations need no internal synchronization. Storages of different
/// replicas never share state (disjoint directories).
pub trait SideloadStorage {
    /// Root directory backing this storage. The in-memory variant returns an
    /// empty sentinel path.
    fn dir(&self) -> &Path;

    /// Stores `contents` under `(index, term)`, replacing any previous
    /// payload at that key. Creates the backing directory if needed.
    fn put(
        &mut self,
        ctx: &OpContext,
        index: u64,
        term: u64,
        contents: &[u8],
    ) -> Result<(), SideloadError>;

    /// Reads the payload at `(index, term)`. Never creates the directory.
    fn get(&self, ctx: &OpContext, index: u64, term: u64) -> Result<Vec<u8>, SideloadError>;

    /// Removes the payload at `(index, term)`. Leaves the directory in
    /// place even if it becomes empty.
    fn purge(&mut self, ctx: &OpContext, index: u64, term: u64) -> Result<(), SideloadError>;

    /// Removes every payload with `index < first_index`, at every term. If
    /// nothing remains afterwards, removes the directory. A no-op if the
    /// directory does not exist.
    fn truncate_to(
        &mut self,
        ctx: &OpContext,
        first_index: u64,
    ) -> Result<TruncateStats, SideloadError>;

    /// Removes all payloads and the backing directory.
    fn clear(&mut self, ctx: &OpContext) -> Result<(), SideloadError>;

    /// Path a payload at `(index, term)` lives (or would live) at. The disk
    /// variant returns the path without checking existence — the ingest
    /// handler uses it to hardlink the payload instead of copying it. The
    /// in-memory variant returns an empty sentinel path.
    fn filename(&self, ctx: &OpContext, index: u64, term: u64)
        -> Result<PathBuf, SideloadError>;
}

/// File name for the payload at `(index, term)`: `i<index>t<term>`.
pub(crate) fn payload_file_name(index: u64, term: u64) -> String {
    format!("i{index}t{term}")
}

/// Inverse of [`payload_file_name`]; `None` for foreign files.
pub(crate) fn parse_payload_file_name(name: &str) -> Option<(u64, u64)> {
    let rest = name.strip_prefix('i')?;
    let (index, term) = rest.split_once('t')?;
    if index.is_empty() || term.is_empty() {
        return None;
    }
    Some((index.parse().ok()?, term.parse().ok()?))
}

#[cfg(test)]
mod tests;

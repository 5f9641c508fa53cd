//! In-memory sideload storage: a plain map with the same externally
//! observable semantics as the disk variant, minus directory behavior.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use context::OpContext;

use crate::{SideloadError, SideloadStorage, TruncateStats};

pub struct MemSideloadStorage {
    range_id: u64,
    replica_id: u64,
    /// Empty sentinel; there is no backing directory.
    dir: PathBuf,
    m: HashMap<(u64, u64), Vec<u8>>,
}

impl MemSideloadStorage {
    pub fn new(range_id: u64, replica_id: u64) -> Self {
        Self {
            range_id,
            replica_id,
            dir: PathBuf::new(),
            m: HashMap::new(),
        }
    }

    pub fn range_id(&self) -> u64 {
        self.range_id
    }

    pub fn replica_id(&self) -> u64 {
        self.replica_id
    }

    pub fn len(&self) -> usize {
        self.m.len()
    }

    pub fn is_empty(&self) -> bool {
        self.m.is_empty()
    }

    /// Sorted `(index, term)` keys of every stored payload.
    pub fn keys(&self) -> Vec<(u64, u64)> {
        let mut keys: Vec<_> = self.m.keys().copied().collect();
        keys.sort_unstable();
        keys
    }
}

impl SideloadStorage for MemSideloadStorage {
    fn dir(&self) -> &Path {
        &self.dir
    }

    fn put(
        &mut self,
        ctx: &OpContext,
        index: u64,
        term: u64,
        contents: &[u8],
    ) -> Result<(), SideloadError> {
        ctx.check_canceled()?;
        // overwrite frees the previous buffer
        self.m.insert((index, term), contents.to_vec());
        Ok(())
    }

    fn get(&self, ctx: &OpContext, index: u64, term: u64) -> Result<Vec<u8>, SideloadError> {
        ctx.check_canceled()?;
        self.m
            .get(&(index, term))
            .cloned()
            .ok_or(SideloadError::NotFound)
    }

    fn purge(&mut self, ctx: &OpContext, index: u64, term: u64) -> Result<(), SideloadError> {
        ctx.check_canceled()?;
        self.m
            .remove(&(index, term))
            .map(|_| ())
            .ok_or(SideloadError::NotFound)
    }

    fn truncate_to(
        &mut self,
        ctx: &OpContext,
        first_index: u64,
    ) -> Result<TruncateStats, SideloadError> {
        ctx.check_canceled()?;
        let mut stats = TruncateStats::default();
        self.m.retain(|&(index, _term), contents| {
            if index < first_index {
                stats.freed += contents.len() as u64;
                false
            } else {
                stats.retained += contents.len() as u64;
                true
            }
        });
        Ok(stats)
    }

    fn clear(&mut self, ctx: &OpContext) -> Result<(), SideloadError> {
        ctx.check_canceled()?;
        self.m.clear();
        Ok(())
    }

    fn filename(
        &self,
        ctx: &OpContext,
        _index: u64,
        _term: u64,
    ) -> Result<PathBuf, SideloadError> {
        ctx.check_canceled()?;
        // No file backs an in-memory payload; callers get the sentinel.
        Ok(PathBuf::new())
    }
}

impl std::fmt::Debug for MemSideloadStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemSideloadStorage")
            .field("range_id", &self.range_id)
            .field("replica_id", &self.replica_id)
            .field("payloads", &self.m.len())
            .finish()
    }
}

//! On-disk sideload storage: one file per payload under a per-replica
//! directory, written atomically via temp file + rename.

use std::fs::{self, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

use context::OpContext;

use crate::{parse_payload_file_name, payload_file_name, SideloadError, SideloadStorage, TruncateStats};

pub struct DiskSideloadStorage {
    range_id: u64,
    replica_id: u64,
    dir: PathBuf,
    /// Whether we know the directory exists on disk. Fresh instances over an
    /// existing layout start `false` and discover the directory lazily.
    dir_created: bool,
}

impl DiskSideloadStorage {
    /// Derives the storage directory for a replica identity under `base`.
    pub fn storage_dir(base: &Path, range_id: u64, replica_id: u64) -> PathBuf {
        base.join(format!("sideload_{range_id}_{replica_id}"))
    }

    /// Creates a handle rooted at the deterministic per-replica directory.
    /// No I/O happens until the first `put`.
    pub fn new(base: impl AsRef<Path>, range_id: u64, replica_id: u64) -> Self {
        let dir = Self::storage_dir(base.as_ref(), range_id, replica_id);
        Self {
            range_id,
            replica_id,
            dir,
            dir_created: false,
        }
    }

    pub fn range_id(&self) -> u64 {
        self.range_id
    }

    pub fn replica_id(&self) -> u64 {
        self.replica_id
    }

    #[cfg(test)]
    pub(crate) fn dir_created(&self) -> bool {
        self.dir_created
    }

    /// Sorted `(index, term)` keys of every payload currently on disk.
    /// Foreign files are skipped.
    pub fn list(&self, ctx: &OpContext) -> Result<Vec<(u64, u64)>, SideloadError> {
        ctx.check_canceled()?;
        let iter = match fs::read_dir(&self.dir) {
            Ok(iter) => iter,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut keys = Vec::new();
        for entry in iter {
            let entry = entry?;
            if let Some(name) = entry.file_name().to_str() {
                if let Some(key) = parse_payload_file_name(name) {
                    keys.push(key);
                }
            }
        }
        keys.sort_unstable();
        Ok(keys)
    }

    fn payload_path(&self, index: u64, term: u64) -> PathBuf {
        self.dir.join(payload_file_name(index, term))
    }

    /// Writes `contents` to `path` atomically: temp file in the same
    /// directory, fsync, rename over the target.
    fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
        let tmp = path.with_extension("tmp");
        {
            let mut f = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp)?;
            f.write_all(contents)?;
            f.flush()?;
            f.sync_all()?;
        }
        fs::rename(&tmp, path)
    }
}

impl SideloadStorage for DiskSideloadStorage {
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
        if !self.dir_created {
            fs::create_dir_all(&self.dir)?;
            tracing::debug!(target: "harborkv::sideload", dir = %self.dir.display(), "created sideload directory");
            self.dir_created = true;
        }
        let path = self.payload_path(index, term);
        match Self::write_atomic(&path, contents) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                // The directory vanished underneath us (e.g. a concurrent
                // replica destruction raced a reproposal). Recreate once and
                // retry.
                fs::create_dir_all(&self.dir)?;
                self.dir_created = true;
                Self::write_atomic(&path, contents).map_err(Into::into)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn get(&self, ctx: &OpContext, index: u64, term: u64) -> Result<Vec<u8>, SideloadError> {
        ctx.check_canceled()?;
        match fs::read(self.payload_path(index, term)) {
            Ok(contents) => Ok(contents),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(SideloadError::NotFound),
            Err(e) => Err(e.into()),
        }
    }

    fn purge(&mut self, ctx: &OpContext, index: u64, term: u64) -> Result<(), SideloadError> {
        ctx.check_canceled()?;
        match fs::remove_file(self.payload_path(index, term)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(SideloadError::NotFound),
            Err(e) => Err(e.into()),
        }
    }

    fn truncate_to(
        &mut self,
        ctx: &OpContext,
        first_index: u64,
    ) -> Result<TruncateStats, SideloadError> {
        ctx.check_canceled()?;
        let iter = match fs::read_dir(&self.dir) {
            Ok(iter) => iter,
            // Absent directory: nothing to truncate.
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(TruncateStats::default()),
            Err(e) => return Err(e.into()),
        };

        let mut stats = TruncateStats::default();
        let mut kept = 0usize;
        for entry in iter {
            let entry = entry?;
            ctx.check_canceled()?;
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };

            // Leftover temp files from interrupted writes are never visible
            // payloads; remove them whenever we scan the directory.
            if let Some(stem) = name.strip_suffix(".tmp") {
                if parse_payload_file_name(stem).is_some() {
                    fs::remove_file(entry.path())?;
                    continue;
                }
            }

            // Foreign files are left alone; they only matter if they later
            // block the directory removal below.
            let Some((index, _term)) = parse_payload_file_name(name) else {
                continue;
            };

            let len = entry.metadata()?.len();
            if index < first_index {
                fs::remove_file(entry.path())?;
                stats.freed += len;
            } else {
                stats.retained += len;
                kept += 1;
            }
        }

        if kept == 0 {
            match fs::remove_dir(&self.dir) {
                Ok(()) => {
                    tracing::debug!(target: "harborkv::sideload", dir = %self.dir.display(), "removed empty sideload directory");
                    self.dir_created = false;
                }
                Err(e) if e.kind() == ErrorKind::NotFound => self.dir_created = false,
                Err(e) if e.kind() == ErrorKind::DirectoryNotEmpty => {
                    return Err(SideloadError::DirectoryNotEmpty(self.dir.clone()));
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(stats)
    }

    fn clear(&mut self, ctx: &OpContext) -> Result<(), SideloadError> {
        ctx.check_canceled()?;
        match fs::remove_dir_all(&self.dir) {
            Ok(()) => {
                self.dir_created = false;
                Ok(())
            }
            // Clearing an absent directory is fine.
            Err(e) if e.kind() == ErrorKind::NotFound => {
                self.dir_created = false;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn filename(
        &self,
        ctx: &OpContext,
        index: u64,
        term: u64,
    ) -> Result<PathBuf, SideloadError> {
        ctx.check_canceled()?;
        // The path is deterministic; existence is not checked. The ingest
        // handler may call this before the payload has been written.
        Ok(self.payload_path(index, term))
    }
}

impl std::fmt::Debug for DiskSideloadStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskSideloadStorage")
            .field("range_id", &self.range_id)
            .field("replica_id", &self.replica_id)
            .field("dir", &self.dir)
            .field("dir_created", &self.dir_created)
            .finish()
    }
}

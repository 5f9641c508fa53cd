//! Replica-identity changes. When a replica learns its (new) replica id,
//! its sideload directory path changes with it; the old directory is moved
//! so every stored payload stays readable under the new identity.

use std::fs;

use anyhow::{Context, Result};
use context::OpContext;
use sideload::{DiskSideloadStorage, SideloadStorage};

use crate::Replica;

impl Replica {
    /// Rekeys the replica to `new_replica_id`. For disk-backed replicas the
    /// sideload directory is renamed to the new identity's path in one
    /// atomic move; in-memory replicas only update the id.
    pub fn set_replica_id(&mut self, ctx: &OpContext, new_replica_id: u64) -> Result<()> {
        ctx.check_canceled()?;
        if new_replica_id == self.replica_id {
            return Ok(());
        }

        if let Some(base) = self.base_dir.clone() {
            let next = DiskSideloadStorage::new(&base, self.range_id, new_replica_id);
            let old_dir = self.sideloaded.dir().to_path_buf();
            if old_dir.exists() {
                fs::rename(&old_dir, next.dir()).with_context(|| {
                    format!(
                        "moving sideloaded directory {} to {}",
                        old_dir.display(),
                        next.dir().display()
                    )
                })?;
                tracing::debug!(
                    target: "harborkv::sideload",
                    range_id = self.range_id,
                    old = %old_dir.display(),
                    new = %next.dir().display(),
                    "moved sideload directory on rekey"
                );
            }
            self.sideloaded = Box::new(next);
        }

        self.replica_id = new_replica_id;
        Ok(())
    }
}

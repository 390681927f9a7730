//! Sync height bookkeeping for the block scanner
//!
//! A single persisted row remembers the highest block height that has been
//! fully recorded, so a restarted scanner can resume where it stopped.

use crate::error::{OptionalExt, Result};
use crate::persistence::LedgerStore;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct SyncHeightTracker {
    store: Arc<dyn LedgerStore>,
}

impl SyncHeightTracker {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Stores `height` as the synced height. The value is overwritten as
    /// given; callers are expected to pass non-decreasing heights.
    pub fn record_sync_height(&self, height: u64) -> Result<()> {
        let existing = match self.store.find_sync_height().optional()? {
            Some(row) => row,
            None => match self.store.create_sync_height(height) {
                Ok(_) => {
                    debug!(height, "created sync height");
                    return Ok(());
                }
                Err(e) if e.is_constraint_violation() => {
                    warn!(height, "sync height row created concurrently, updating instead");
                    self.store.find_sync_height()?
                }
                Err(e) => return Err(e),
            },
        };

        self.store.update_sync_height(existing.id, height)?;
        debug!(height, previous = existing.height, "updated sync height");
        Ok(())
    }

    /// The last recorded height, or `None` before the first sync.
    pub fn get_synced_height(&self) -> Result<Option<u64>> {
        Ok(self.store.find_sync_height().optional()?.map(|row| row.height))
    }

    /// The next height to scan.
    pub fn resume_height(&self) -> Result<u64> {
        Ok(self
            .get_synced_height()?
            .map_or(0, |height| height.saturating_add(1)))
    }
}

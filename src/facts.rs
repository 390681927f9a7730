//! Entry point for the block scanner: one shared store behind the ledger and
//! the sync tracker.

use crate::config::{Config, LedgerConfig};
use crate::error::Result;
use crate::ledger::FarmerLedger;
use crate::persistence::{Database, LedgerStore};
use crate::sync::SyncHeightTracker;
use crate::timestamp;
use std::sync::Arc;

pub struct BlockFacts {
    ledger: FarmerLedger,
    tracker: SyncHeightTracker,
}

impl BlockFacts {
    /// Opens the SQLite database named by `config`.
    pub fn open(config: &Config) -> Result<Self> {
        config.validate()?;
        let db = Database::open_with_config(&config.database)?;
        Self::with_store(Arc::new(db), &config.ledger)
    }

    pub fn with_store(store: Arc<dyn LedgerStore>, config: &LedgerConfig) -> Result<Self> {
        Ok(Self {
            ledger: FarmerLedger::new(store.clone(), config)?,
            tracker: SyncHeightTracker::new(store),
        })
    }

    pub fn estimate_timestamp(&self, height: u64) -> u64 {
        timestamp::estimate_timestamp(height)
    }

    pub fn increment_total(&self, farmer_address: &str) -> Result<()> {
        self.ledger.increment_total(farmer_address)
    }

    pub fn increment_daily(&self, farmer_address: &str, timestamp: u64) -> Result<()> {
        self.ledger.increment_daily(farmer_address, timestamp)
    }

    pub fn record_sync_height(&self, height: u64) -> Result<()> {
        self.tracker.record_sync_height(height)
    }

    pub fn get_synced_height(&self) -> Result<Option<u64>> {
        self.tracker.get_synced_height()
    }

    pub fn resume_height(&self) -> Result<u64> {
        self.tracker.resume_height()
    }

    /// Credits the block at `height` to `farmer_address` in both the lifetime
    /// and the daily counters. The day comes from the estimated timestamp and
    /// is resolved before either counter is written.
    pub fn credit_block(&self, farmer_address: &str, height: u64) -> Result<()> {
        let day = self.ledger.day_of(timestamp::estimate_timestamp(height))?;
        self.ledger.increment_total(farmer_address)?;
        self.ledger.increment_day(farmer_address, &day)
    }

    pub fn ledger(&self) -> &FarmerLedger {
        &self.ledger
    }

    pub fn tracker(&self) -> &SyncHeightTracker {
        &self.tracker
    }
}

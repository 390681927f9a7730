//! Per-farmer block counters
//!
//! Every counter follows the same protocol against the store:
//! look the row up; when found, ask the store to add one to it; when absent,
//! create it with a count of one. A create that clashes on the unique key
//! lost a race with another writer, so the lookup is repeated and the
//! freshly created row is incremented instead.

use crate::config::LedgerConfig;
use crate::error::{OptionalExt, Result};
use crate::models::{DailyFarmerBlocks, TotalFarmerBlocks};
use crate::persistence::LedgerStore;
use crate::timestamp::day_for_timestamp;
use chrono::FixedOffset;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct FarmerLedger {
    store: Arc<dyn LedgerStore>,
    day_offset: FixedOffset,
    create_retries: u32,
}

impl FarmerLedger {
    pub fn new(store: Arc<dyn LedgerStore>, config: &LedgerConfig) -> Result<Self> {
        Ok(Self {
            store,
            day_offset: config.day_offset()?,
            create_retries: config.create_retries.max(1),
        })
    }

    /// Adds one block to the lifetime count of `farmer_address`.
    pub fn increment_total(&self, farmer_address: &str) -> Result<()> {
        self.upsert(
            "total",
            farmer_address,
            || self.store.find_total_blocks(farmer_address).map(|row| row.id),
            |id| self.store.increment_total_blocks(id, 1),
            || self.store.create_total_blocks(farmer_address, 1).map(|_| ()),
        )
    }

    /// Adds one block to the count of `farmer_address` for the calendar day
    /// containing `timestamp`.
    pub fn increment_daily(&self, farmer_address: &str, timestamp: u64) -> Result<()> {
        let day = self.day_of(timestamp)?;
        self.increment_day(farmer_address, &day)
    }

    /// Adds one block to the count of `farmer_address` on `day` (`YYYY-MM-DD`).
    pub fn increment_day(&self, farmer_address: &str, day: &str) -> Result<()> {
        self.upsert(
            "daily",
            farmer_address,
            || self.store.find_daily_blocks(farmer_address, day).map(|row| row.id),
            |id| self.store.increment_daily_blocks(id, 1),
            || self.store.create_daily_blocks(farmer_address, day, 1).map(|_| ()),
        )
    }

    /// The daily bucket `timestamp` falls into.
    pub fn day_of(&self, timestamp: u64) -> Result<String> {
        day_for_timestamp(timestamp, self.day_offset)
    }

    /// Lifetime blocks of a farmer, `None` if it never produced one.
    pub fn total_blocks(&self, farmer_address: &str) -> Result<Option<u64>> {
        Ok(self
            .store
            .find_total_blocks(farmer_address)
            .optional()?
            .map(|row| row.block_count))
    }

    /// Blocks of a farmer on `day` (`YYYY-MM-DD`).
    pub fn daily_blocks(&self, farmer_address: &str, day: &str) -> Result<Option<u64>> {
        Ok(self
            .store
            .find_daily_blocks(farmer_address, day)
            .optional()?
            .map(|row| row.block_count))
    }

    pub fn top_farmers(&self, limit: usize) -> Result<Vec<TotalFarmerBlocks>> {
        self.store.list_total_blocks(limit)
    }

    pub fn farmer_history(&self, farmer_address: &str) -> Result<Vec<DailyFarmerBlocks>> {
        self.store.list_daily_blocks(farmer_address)
    }

    pub fn day_offset(&self) -> FixedOffset {
        self.day_offset
    }

    fn upsert(
        &self,
        counter: &str,
        farmer_address: &str,
        find: impl Fn() -> Result<u64>,
        increment: impl Fn(u64) -> Result<()>,
        create: impl Fn() -> Result<()>,
    ) -> Result<()> {
        let mut attempt = 0;
        loop {
            if let Some(id) = find().optional()? {
                debug!(counter, farmer_address, id, "incrementing block count");
                return increment(id);
            }

            match create() {
                Ok(()) => {
                    debug!(counter, farmer_address, "created block count");
                    return Ok(());
                }
                Err(e) if e.is_constraint_violation() && attempt < self.create_retries => {
                    attempt += 1;
                    warn!(
                        counter,
                        farmer_address, attempt, "concurrent create detected, retrying as increment"
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }
}

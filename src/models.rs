//! Persisted rows. `id` is assigned by the store and never chosen by callers.

use serde::{Deserialize, Serialize};

/// Lifetime block count of a farmer. One row per `farmer_address`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TotalFarmerBlocks {
    pub id: u64,
    pub farmer_address: String,
    pub block_count: u64,
}

/// Blocks a farmer produced on one calendar day. One row per
/// `(farmer_address, day)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyFarmerBlocks {
    pub id: u64,
    pub farmer_address: String,
    /// `YYYY-MM-DD`
    pub day: String,
    pub block_count: u64,
}

/// The highest block height fully recorded. At most one row exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncHeight {
    pub id: u64,
    #[serde(default)]
    pub height: u64,
}

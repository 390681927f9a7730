//! blockfacts - per-farmer block accounting for Chia farming rewards
//!
//! # Architecture
//!
//! The crate is organized into logical modules:
//!
//! ## Estimation
//! - [`timestamp`] - Block height to wall-clock timestamp and calendar day
//!
//! ## Accounting
//! - [`ledger`] - Lifetime and daily block counters per farmer
//! - [`sync`] - Last synchronized block height
//! - [`facts`] - Facade used by the block scanner
//!
//! ## State Management
//! - [`models`] - Persisted rows
//! - [`persistence`] - Storage interface, SQLite and in-memory backends
//!
//! ## Configuration & Utilities
//! - [`config`] - Configuration management
//! - [`error`] - Error types

#![forbid(unsafe_code)]

// ============================================================================
// Estimation
// ============================================================================
pub mod timestamp;

// ============================================================================
// Accounting
// ============================================================================
pub mod facts;
pub mod ledger;
pub mod sync;

// ============================================================================
// State Management
// ============================================================================
pub mod models;
pub mod persistence;

// ============================================================================
// Configuration & Utilities
// ============================================================================
pub mod config;
pub mod error;

pub use error::{LedgerError, Result};
pub use facts::BlockFacts;

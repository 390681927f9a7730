//! Database persistence layer for blockfacts

use crate::config::DatabaseConfig;
use crate::error::{LedgerError, Result};
use crate::models::{DailyFarmerBlocks, SyncHeight, TotalFarmerBlocks};
use rusqlite::{params, Connection, Row};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{info, warn};

/// Storage capability consumed by the ledger and the sync tracker.
///
/// `find_*` report a missing row as [`LedgerError::NotFound`]. `create_*`
/// report a unique-key clash as [`LedgerError::ConstraintViolation`].
/// Increments are relative updates applied by the store in a single step,
/// so concurrent callers never lose counts.
pub trait LedgerStore: Send + Sync {
    fn find_total_blocks(&self, farmer_address: &str) -> Result<TotalFarmerBlocks>;
    fn create_total_blocks(&self, farmer_address: &str, block_count: u64) -> Result<TotalFarmerBlocks>;
    fn increment_total_blocks(&self, id: u64, delta: u64) -> Result<()>;
    /// Farmers ordered by `block_count` descending, then address.
    fn list_total_blocks(&self, limit: usize) -> Result<Vec<TotalFarmerBlocks>>;

    fn find_daily_blocks(&self, farmer_address: &str, day: &str) -> Result<DailyFarmerBlocks>;
    fn create_daily_blocks(&self, farmer_address: &str, day: &str, block_count: u64) -> Result<DailyFarmerBlocks>;
    fn increment_daily_blocks(&self, id: u64, delta: u64) -> Result<()>;
    /// Daily rows of one farmer ordered by day.
    fn list_daily_blocks(&self, farmer_address: &str) -> Result<Vec<DailyFarmerBlocks>>;

    fn find_sync_height(&self) -> Result<SyncHeight>;
    fn create_sync_height(&self, height: u64) -> Result<SyncHeight>;
    fn update_sync_height(&self, id: u64, height: u64) -> Result<()>;
}

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS total_farmer_blocks (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        farmer_address VARCHAR(256) NOT NULL,
        block_count INTEGER NOT NULL
    );
    CREATE UNIQUE INDEX IF NOT EXISTS idx_tfb_farmer_address
        ON total_farmer_blocks (farmer_address);

    CREATE TABLE IF NOT EXISTS daily_farmer_blocks (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        farmer_address VARCHAR(256) NOT NULL,
        block_count INTEGER NOT NULL,
        day DATE NOT NULL
    );
    CREATE UNIQUE INDEX IF NOT EXISTS idx_dfb_farmer_day
        ON daily_farmer_blocks (farmer_address, day);
    CREATE INDEX IF NOT EXISTS idx_dfb_day
        ON daily_farmer_blocks (day);

    CREATE TABLE IF NOT EXISTS block_sync_height (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        singleton INTEGER NOT NULL DEFAULT 1 UNIQUE CHECK (singleton = 1),
        height INTEGER NOT NULL DEFAULT 0
    );
";

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Opens (and creates when missing) the database at `path` with default
    /// settings. `":memory:"` gives a private in-memory database.
    pub fn open(path: &str) -> Result<Self> {
        Self::open_with_config(&DatabaseConfig {
            path: path.to_string(),
            ..DatabaseConfig::default()
        })
    }

    pub fn open_with_config(config: &DatabaseConfig) -> Result<Self> {
        let in_memory = config.path == ":memory:";
        if !in_memory {
            if let Some(parent) = Path::new(&config.path).parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)?;
                }
            }
        }

        let conn = Connection::open(&config.path).map_err(LedgerError::Database)?;
        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))
            .map_err(LedgerError::Database)?;

        // Best effort: WAL lets readers proceed while the sync loop writes.
        if !in_memory {
            match conn.pragma_update_and_check(None, "journal_mode", "wal", |row| row.get::<_, String>(0)) {
                Ok(mode) if mode.eq_ignore_ascii_case("wal") => {}
                Ok(mode) => warn!("Database {} stays in {} journal mode instead of WAL", config.path, mode),
                Err(e) => warn!("Failed to enable WAL on {}: {}", config.path, e),
            }
            if let Err(e) = conn.pragma_update(None, "synchronous", "normal") {
                warn!("Failed to set synchronous=normal on {}: {}", config.path, e);
            }
        }

        conn.execute_batch(SCHEMA).map_err(LedgerError::Database)?;
        info!("Opened block facts database at {}", config.path);

        Ok(Database { conn: Mutex::new(conn) })
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> rusqlite::Result<T>) -> Result<T> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| LedgerError::Storage("Mutex poisoned".to_string()))?;
        f(&conn).map_err(LedgerError::from)
    }

    /// Runs an UPDATE that must touch exactly one row.
    fn update_one(&self, sql: &str, value: i64, id: u64) -> Result<()> {
        let id = to_sql_i64(id, "id")?;
        let changed = self.with_conn(|conn| conn.execute(sql, params![value, id]))?;
        if changed == 0 {
            return Err(LedgerError::NotFound);
        }
        Ok(())
    }
}

impl LedgerStore for Database {
    fn find_total_blocks(&self, farmer_address: &str) -> Result<TotalFarmerBlocks> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, farmer_address, block_count FROM total_farmer_blocks
                 WHERE farmer_address = ?1",
                params![farmer_address],
                total_from_row,
            )
        })
    }

    fn create_total_blocks(&self, farmer_address: &str, block_count: u64) -> Result<TotalFarmerBlocks> {
        let count = to_sql_i64(block_count, "block_count")?;
        let id = self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO total_farmer_blocks (farmer_address, block_count) VALUES (?1, ?2)",
                params![farmer_address, count],
            )?;
            Ok(conn.last_insert_rowid())
        })?;

        Ok(TotalFarmerBlocks {
            id: id as u64,
            farmer_address: farmer_address.to_string(),
            block_count,
        })
    }

    fn increment_total_blocks(&self, id: u64, delta: u64) -> Result<()> {
        self.update_one(
            "UPDATE total_farmer_blocks SET block_count = block_count + ?1 WHERE id = ?2",
            to_sql_i64(delta, "delta")?,
            id,
        )
    }

    fn list_total_blocks(&self, limit: usize) -> Result<Vec<TotalFarmerBlocks>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, farmer_address, block_count FROM total_farmer_blocks
                 ORDER BY block_count DESC, farmer_address ASC LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit], total_from_row)?;
            rows.collect()
        })
    }

    fn find_daily_blocks(&self, farmer_address: &str, day: &str) -> Result<DailyFarmerBlocks> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, farmer_address, day, block_count FROM daily_farmer_blocks
                 WHERE farmer_address = ?1 AND day = ?2",
                params![farmer_address, day],
                daily_from_row,
            )
        })
    }

    fn create_daily_blocks(&self, farmer_address: &str, day: &str, block_count: u64) -> Result<DailyFarmerBlocks> {
        let count = to_sql_i64(block_count, "block_count")?;
        let id = self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO daily_farmer_blocks (farmer_address, day, block_count) VALUES (?1, ?2, ?3)",
                params![farmer_address, day, count],
            )?;
            Ok(conn.last_insert_rowid())
        })?;

        Ok(DailyFarmerBlocks {
            id: id as u64,
            farmer_address: farmer_address.to_string(),
            day: day.to_string(),
            block_count,
        })
    }

    fn increment_daily_blocks(&self, id: u64, delta: u64) -> Result<()> {
        self.update_one(
            "UPDATE daily_farmer_blocks SET block_count = block_count + ?1 WHERE id = ?2",
            to_sql_i64(delta, "delta")?,
            id,
        )
    }

    fn list_daily_blocks(&self, farmer_address: &str) -> Result<Vec<DailyFarmerBlocks>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, farmer_address, day, block_count FROM daily_farmer_blocks
                 WHERE farmer_address = ?1 ORDER BY day ASC",
            )?;
            let rows = stmt.query_map(params![farmer_address], daily_from_row)?;
            rows.collect()
        })
    }

    fn find_sync_height(&self) -> Result<SyncHeight> {
        self.with_conn(|conn| {
            conn.query_row("SELECT id, height FROM block_sync_height LIMIT 1", [], |row| {
                Ok(SyncHeight {
                    id: row.get::<_, i64>(0)? as u64,
                    height: row.get::<_, i64>(1)? as u64,
                })
            })
        })
    }

    fn create_sync_height(&self, height: u64) -> Result<SyncHeight> {
        let height_sql = to_sql_i64(height, "height")?;
        let id = self.with_conn(|conn| {
            conn.execute("INSERT INTO block_sync_height (height) VALUES (?1)", params![height_sql])?;
            Ok(conn.last_insert_rowid())
        })?;
        Ok(SyncHeight { id: id as u64, height })
    }

    fn update_sync_height(&self, id: u64, height: u64) -> Result<()> {
        self.update_one(
            "UPDATE block_sync_height SET height = ?1 WHERE id = ?2",
            to_sql_i64(height, "height")?,
            id,
        )
    }
}

fn total_from_row(row: &Row<'_>) -> rusqlite::Result<TotalFarmerBlocks> {
    Ok(TotalFarmerBlocks {
        id: row.get::<_, i64>(0)? as u64,
        farmer_address: row.get(1)?,
        block_count: row.get::<_, i64>(2)? as u64,
    })
}

fn daily_from_row(row: &Row<'_>) -> rusqlite::Result<DailyFarmerBlocks> {
    Ok(DailyFarmerBlocks {
        id: row.get::<_, i64>(0)? as u64,
        farmer_address: row.get(1)?,
        day: row.get(2)?,
        block_count: row.get::<_, i64>(3)? as u64,
    })
}

fn to_sql_i64(value: u64, field: &'static str) -> Result<i64> {
    i64::try_from(value).map_err(|_| LedgerError::ValueOverflow { field, value })
}

/// Simple in-memory store useful for tests and ephemeral runs. Enforces the
/// same unique keys as the SQLite schema.
#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<MemoryTables>,
}

#[derive(Default)]
struct MemoryTables {
    next_id: u64,
    totals: HashMap<String, TotalFarmerBlocks>,
    daily: HashMap<(String, String), DailyFarmerBlocks>,
    sync_height: Option<SyncHeight>,
}

impl MemoryTables {
    fn assign_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> Result<std::sync::MutexGuard<'_, MemoryTables>> {
        self.inner
            .lock()
            .map_err(|_| LedgerError::Storage("Mutex poisoned".to_string()))
    }
}

fn add_count(count: &mut u64, delta: u64) -> Result<()> {
    *count = count
        .checked_add(delta)
        .filter(|sum| *sum <= i64::MAX as u64)
        .ok_or(LedgerError::ValueOverflow { field: "block_count", value: delta })?;
    Ok(())
}

impl LedgerStore for InMemoryStore {
    fn find_total_blocks(&self, farmer_address: &str) -> Result<TotalFarmerBlocks> {
        self.tables()?
            .totals
            .get(farmer_address)
            .cloned()
            .ok_or(LedgerError::NotFound)
    }

    fn create_total_blocks(&self, farmer_address: &str, block_count: u64) -> Result<TotalFarmerBlocks> {
        to_sql_i64(block_count, "block_count")?;
        let mut tables = self.tables()?;
        if tables.totals.contains_key(farmer_address) {
            return Err(LedgerError::ConstraintViolation(format!(
                "total_farmer_blocks.farmer_address {farmer_address}"
            )));
        }
        let row = TotalFarmerBlocks {
            id: tables.assign_id(),
            farmer_address: farmer_address.to_string(),
            block_count,
        };
        tables.totals.insert(farmer_address.to_string(), row.clone());
        Ok(row)
    }

    fn increment_total_blocks(&self, id: u64, delta: u64) -> Result<()> {
        let mut tables = self.tables()?;
        let row = tables
            .totals
            .values_mut()
            .find(|row| row.id == id)
            .ok_or(LedgerError::NotFound)?;
        add_count(&mut row.block_count, delta)
    }

    fn list_total_blocks(&self, limit: usize) -> Result<Vec<TotalFarmerBlocks>> {
        let mut rows: Vec<_> = self.tables()?.totals.values().cloned().collect();
        rows.sort_by(|a, b| {
            b.block_count
                .cmp(&a.block_count)
                .then_with(|| a.farmer_address.cmp(&b.farmer_address))
        });
        rows.truncate(limit);
        Ok(rows)
    }

    fn find_daily_blocks(&self, farmer_address: &str, day: &str) -> Result<DailyFarmerBlocks> {
        self.tables()?
            .daily
            .get(&(farmer_address.to_string(), day.to_string()))
            .cloned()
            .ok_or(LedgerError::NotFound)
    }

    fn create_daily_blocks(&self, farmer_address: &str, day: &str, block_count: u64) -> Result<DailyFarmerBlocks> {
        to_sql_i64(block_count, "block_count")?;
        let mut tables = self.tables()?;
        let key = (farmer_address.to_string(), day.to_string());
        if tables.daily.contains_key(&key) {
            return Err(LedgerError::ConstraintViolation(format!(
                "daily_farmer_blocks.farmer_address, daily_farmer_blocks.day {farmer_address} {day}"
            )));
        }
        let row = DailyFarmerBlocks {
            id: tables.assign_id(),
            farmer_address: farmer_address.to_string(),
            day: day.to_string(),
            block_count,
        };
        tables.daily.insert(key, row.clone());
        Ok(row)
    }

    fn increment_daily_blocks(&self, id: u64, delta: u64) -> Result<()> {
        let mut tables = self.tables()?;
        let row = tables
            .daily
            .values_mut()
            .find(|row| row.id == id)
            .ok_or(LedgerError::NotFound)?;
        add_count(&mut row.block_count, delta)
    }

    fn list_daily_blocks(&self, farmer_address: &str) -> Result<Vec<DailyFarmerBlocks>> {
        let mut rows: Vec<_> = self
            .tables()?
            .daily
            .values()
            .filter(|row| row.farmer_address == farmer_address)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.day.cmp(&b.day));
        Ok(rows)
    }

    fn find_sync_height(&self) -> Result<SyncHeight> {
        self.tables()?.sync_height.ok_or(LedgerError::NotFound)
    }

    fn create_sync_height(&self, height: u64) -> Result<SyncHeight> {
        to_sql_i64(height, "height")?;
        let mut tables = self.tables()?;
        if tables.sync_height.is_some() {
            return Err(LedgerError::ConstraintViolation("block_sync_height.singleton".to_string()));
        }
        let row = SyncHeight { id: tables.assign_id(), height };
        tables.sync_height = Some(row);
        Ok(row)
    }

    fn update_sync_height(&self, id: u64, height: u64) -> Result<()> {
        to_sql_i64(height, "height")?;
        let mut tables = self.tables()?;
        match tables.sync_height.as_mut() {
            Some(row) if row.id == id => {
                row.height = height;
                Ok(())
            }
            _ => Err(LedgerError::NotFound),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stores() -> Vec<(&'static str, Box<dyn LedgerStore>)> {
        let sqlite: Box<dyn LedgerStore> = Box::new(Database::open(":memory:").unwrap());
        let memory: Box<dyn LedgerStore> = Box::new(InMemoryStore::new());
        vec![("sqlite", sqlite), ("memory", memory)]
    }

    #[test]
    fn test_database_open() {
        let db = Database::open(":memory:").unwrap();
        assert!(db.conn.lock().unwrap().is_autocommit());
    }

    #[test]
    fn test_file_database_uses_wal() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("facts.db");
        let db = Database::open(path.to_str().unwrap()).unwrap();

        let mode: String = db
            .conn
            .lock()
            .unwrap()
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
    }

    #[test]
    fn test_database_open_creates_parent_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("facts.db");
        Database::open(path.to_str().unwrap()).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_find_missing_rows_is_not_found() {
        for (name, store) in stores() {
            assert!(store.find_total_blocks("nobody").unwrap_err().is_not_found(), "{name}");
            assert!(store.find_daily_blocks("nobody", "2021-03-19").unwrap_err().is_not_found(), "{name}");
            assert!(store.find_sync_height().unwrap_err().is_not_found(), "{name}");
        }
    }

    #[test]
    fn test_duplicate_total_is_constraint_violation() {
        for (name, store) in stores() {
            store.create_total_blocks("farmer", 1).unwrap();
            let err = store.create_total_blocks("farmer", 1).unwrap_err();
            assert!(err.is_constraint_violation(), "{name}: {err:?}");
        }
    }

    #[test]
    fn test_duplicate_daily_is_constraint_violation() {
        for (name, store) in stores() {
            store.create_daily_blocks("farmer", "2021-03-19", 1).unwrap();
            store.create_daily_blocks("farmer", "2021-03-20", 1).unwrap();
            store.create_daily_blocks("other", "2021-03-19", 1).unwrap();
            let err = store.create_daily_blocks("farmer", "2021-03-19", 1).unwrap_err();
            assert!(err.is_constraint_violation(), "{name}: {err:?}");
        }
    }

    #[test]
    fn test_second_sync_height_row_is_rejected() {
        for (name, store) in stores() {
            store.create_sync_height(10).unwrap();
            let err = store.create_sync_height(20).unwrap_err();
            assert!(err.is_constraint_violation(), "{name}: {err:?}");
            assert_eq!(store.find_sync_height().unwrap().height, 10, "{name}");
        }
    }

    #[test]
    fn test_increment_is_relative() {
        for (name, store) in stores() {
            let row = store.create_total_blocks("farmer", 1).unwrap();
            store.increment_total_blocks(row.id, 1).unwrap();
            store.increment_total_blocks(row.id, 3).unwrap();
            assert_eq!(store.find_total_blocks("farmer").unwrap().block_count, 5, "{name}");

            let daily = store.create_daily_blocks("farmer", "2021-03-19", 1).unwrap();
            store.increment_daily_blocks(daily.id, 1).unwrap();
            assert_eq!(store.find_daily_blocks("farmer", "2021-03-19").unwrap().block_count, 2, "{name}");
        }
    }

    #[test]
    fn test_update_missing_id_is_not_found() {
        for (name, store) in stores() {
            assert!(store.increment_total_blocks(42, 1).unwrap_err().is_not_found(), "{name}");
            assert!(store.increment_daily_blocks(42, 1).unwrap_err().is_not_found(), "{name}");
            assert!(store.update_sync_height(42, 1).unwrap_err().is_not_found(), "{name}");
        }
    }

    #[test]
    fn test_rejects_values_beyond_sqlite_integer() {
        for (name, store) in stores() {
            let err = store.create_sync_height(u64::MAX).unwrap_err();
            assert!(
                matches!(err, LedgerError::ValueOverflow { field: "height", .. }),
                "{name}: {err:?}"
            );
        }
    }

    #[test]
    fn test_listing_order() {
        for (name, store) in stores() {
            let a = store.create_total_blocks("alice", 1).unwrap();
            store.create_total_blocks("carol", 3).unwrap();
            store.create_total_blocks("bob", 3).unwrap();
            store.increment_total_blocks(a.id, 1).unwrap();

            let top: Vec<_> = store
                .list_total_blocks(2)
                .unwrap()
                .into_iter()
                .map(|row| row.farmer_address)
                .collect();
            assert_eq!(top, vec!["bob", "carol"], "{name}");

            store.create_daily_blocks("alice", "2021-03-21", 1).unwrap();
            store.create_daily_blocks("alice", "2021-03-19", 2).unwrap();
            store.create_daily_blocks("bob", "2021-03-20", 1).unwrap();
            let days: Vec<_> = store
                .list_daily_blocks("alice")
                .unwrap()
                .into_iter()
                .map(|row| row.day)
                .collect();
            assert_eq!(days, vec!["2021-03-19", "2021-03-21"], "{name}");
        }
    }
}

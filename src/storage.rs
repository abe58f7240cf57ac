use anyhow::Result;
use rusqlite::{params, Connection};

use crate::logging::{log, obj, v_str, Domain, Level};
use crate::snapshot::Snapshot;

/// One row of epoch history.
#[derive(Debug, Clone, PartialEq)]
pub struct EpochRow {
    pub tick: u64,
    pub live_cells: usize,
    pub total_stock: f64,
    pub failures: usize,
    pub overflow_skips: u64,
    pub digest: String,
}

pub struct EpochStore {
    conn: Connection,
}

impl EpochStore {
    pub fn new(path: &str) -> Result<Self> {
        Ok(Self { conn: Connection::open(path)? })
    }

    pub fn in_memory() -> Result<Self> {
        Ok(Self { conn: Connection::open_in_memory()? })
    }

    pub fn init(&mut self) -> Result<()> {
        self.conn.execute_batch(
            "BEGIN;
            CREATE TABLE IF NOT EXISTS epochs (
                tick INTEGER PRIMARY KEY,
                live_cells INTEGER NOT NULL,
                total_stock REAL NOT NULL,
                failures INTEGER NOT NULL,
                overflow_skips INTEGER NOT NULL,
                digest TEXT NOT NULL
            );
            COMMIT;",
        )?;
        Ok(())
    }

    /// Insert or replace the row for the snapshot's tick.
    pub fn record_epoch(&mut self, snap: &Snapshot) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT OR REPLACE INTO epochs (tick, live_cells, total_stock, failures, overflow_skips, digest)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                snap.tick as i64,
                snap.live_count() as i64,
                snap.total_stock(),
                snap.failures as i64,
                snap.overflow_skips as i64,
                snap.digest
            ],
        )?;
        tx.commit()?;
        log(
            Level::Trace,
            Domain::Storage,
            "epoch_recorded",
            obj(&[("tick", serde_json::json!(snap.tick)), ("digest", v_str(&snap.digest))]),
        );
        Ok(())
    }

    pub fn history(&self) -> Result<Vec<EpochRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT tick, live_cells, total_stock, failures, overflow_skips, digest
             FROM epochs ORDER BY tick",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(EpochRow {
                tick: row.get::<_, i64>(0)? as u64,
                live_cells: row.get::<_, i64>(1)? as usize,
                total_stock: row.get(2)?,
                failures: row.get::<_, i64>(3)? as usize,
                overflow_skips: row.get::<_, i64>(4)? as u64,
                digest: row.get(5)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

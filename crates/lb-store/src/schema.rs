use rusqlite::Connection;

use crate::error::Result;

pub const SCHEMA_VERSION: i64 = 1;

pub const DEFAULT_BUSY_TIMEOUT_MS: u32 = 5000;

pub fn initialize(conn: &Connection, busy_timeout_ms: u32) -> Result<()> {
    conn.execute_batch("PRAGMA journal_mode = WAL;")?;
    conn.pragma_update(None, "busy_timeout", busy_timeout_ms)?;
    conn.pragma_update(None, "wal_autocheckpoint", 100)?;

    // Fold any stale WAL from a previous crash into the main file.
    // In-memory databases legitimately fail this.
    if conn
        .execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")
        .is_ok()
    {
        tracing::info!("startup WAL checkpoint complete");
    }

    // reference_id is not a FOREIGN KEY: references may outlive their
    // canonical, and a dangling reference resolves to empty content.
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS metadata (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS blocks (
            id            TEXT PRIMARY KEY,
            workspace_id  TEXT NOT NULL,
            content       TEXT NOT NULL DEFAULT '',
            kind          TEXT NOT NULL DEFAULT 'note',
            zone          TEXT NOT NULL,
            order_key     REAL NOT NULL,
            reference_id  TEXT,
            content_hash  TEXT,
            token_count   INTEGER NOT NULL DEFAULT 0,
            is_draft      INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_blocks_position ON blocks(workspace_id, zone, order_key);
        CREATE INDEX IF NOT EXISTS idx_blocks_hash ON blocks(content_hash);
        CREATE INDEX IF NOT EXISTS idx_blocks_reference ON blocks(reference_id);
        ",
    )?;

    conn.execute(
        "INSERT OR REPLACE INTO metadata (key, value) VALUES ('schema_version', ?1)",
        [SCHEMA_VERSION.to_string()],
    )?;

    Ok(())
}

pub fn get_schema_version(conn: &Connection) -> Result<Option<i64>> {
    let mut stmt = conn.prepare("SELECT value FROM metadata WHERE key = 'schema_version'")?;
    let version = stmt
        .query_row([], |row| {
            let v: String = row.get(0)?;
            Ok(v.parse::<i64>().unwrap_or(0))
        })
        .ok();
    Ok(version)
}

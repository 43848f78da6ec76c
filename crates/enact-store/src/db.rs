use rusqlite::{Connection, Result};

/// Initialise the tactical store schema. Safe to call on every connect (idempotent).
///
/// `record` holds the full upstream JSON document; the other columns are
/// projections of it for lookups and are rewritten together on every upsert.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS stations (
            id          INTEGER PRIMARY KEY,
            title       TEXT,
            latitude    REAL,
            longitude   REAL,
            record      TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_stations_position
            ON stations(latitude, longitude);",
    )
}

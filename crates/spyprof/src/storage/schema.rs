use rusqlite::{Connection, OptionalExtension};

pub const SCHEMA_VERSION: i32 = 1;

/// Create all tables (drops existing tables first, a snapshot replaces the previous one)
pub fn create_tables(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        DROP TABLE IF EXISTS samples;
        DROP TABLE IF EXISTS totals;
        DROP TABLE IF EXISTS locations;
        DROP TABLE IF EXISTS meta;

        CREATE TABLE meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        -- Unique (file, line) pairs
        CREATE TABLE locations (
            id INTEGER PRIMARY KEY,
            file TEXT NOT NULL,
            line INTEGER NOT NULL,
            UNIQUE(file, line)
        );

        -- Hit counts per clock ("wall" or "cpu")
        CREATE TABLE samples (
            clock TEXT NOT NULL,
            location_id INTEGER NOT NULL,
            count INTEGER NOT NULL,
            PRIMARY KEY (clock, location_id),
            FOREIGN KEY (location_id) REFERENCES locations(id)
        );

        CREATE INDEX idx_samples_location ON samples(location_id);

        -- Delivered interrupts per clock
        CREATE TABLE totals (
            clock TEXT PRIMARY KEY,
            total INTEGER NOT NULL
        );
        "#,
    )
}

/// Set a metadata key
pub fn set_meta(conn: &Connection, key: &str, value: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO meta (key, value) VALUES (?, ?)",
        [key, value],
    )?;
    Ok(())
}

/// Get a metadata key
pub fn get_meta(conn: &Connection, key: &str) -> rusqlite::Result<Option<String>> {
    conn.query_row("SELECT value FROM meta WHERE key = ?", [key], |row| {
        row.get(0)
    })
    .optional()
}

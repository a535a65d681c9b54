use super::schema::{self, SCHEMA_VERSION};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::symbols::SourceLocation;
use crate::table::{Clock, SampleAggregator};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OpenFlags};
use std::collections::HashMap;
use std::path::Path;

/// Session facts stored alongside the tables
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotMeta {
    pub start_time: DateTime<Utc>,
    pub samples_per_second: u32,
    pub dump_interval_secs: u64,
    pub exe_path: String,
    pub pid: u32,
}

impl SnapshotMeta {
    /// Metadata describing the current process profiled with `config`
    pub fn for_current_process(config: &Config, start_time: DateTime<Utc>) -> Self {
        let exe_path = std::env::current_exe()
            .map(|p| p.display().to_string())
            .unwrap_or_default();

        SnapshotMeta {
            start_time,
            samples_per_second: config.samples_per_second,
            dump_interval_secs: config.dump_interval.as_secs(),
            exe_path,
            pid: std::process::id(),
        }
    }

    /// Read the metadata of an open snapshot
    pub fn read(conn: &Connection) -> Result<Self> {
        let start_time = DateTime::parse_from_rfc3339(&require_meta(conn, "start_time")?)
            .map_err(|e| Error::Snapshot(format!("start_time: {}", e)))?
            .with_timezone(&Utc);

        Ok(SnapshotMeta {
            start_time,
            samples_per_second: parse_meta(conn, "samples_per_second")?,
            dump_interval_secs: parse_meta(conn, "dump_interval_secs")?,
            exe_path: require_meta(conn, "exe_path")?,
            pid: parse_meta(conn, "pid")?,
        })
    }
}

/// A symbolised copy of both clocks' tables
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub meta: SnapshotMeta,
    pub samples: SampleAggregator<SourceLocation>,
}

impl Snapshot {
    /// Write the snapshot to `path`, replacing any previous one
    pub fn write(&self, path: &Path) -> Result<()> {
        let mut conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA synchronous = NORMAL;")?;

        let tx = conn.transaction()?;
        schema::create_tables(&tx)?;

        let meta = &self.meta;
        schema::set_meta(&tx, "version", &SCHEMA_VERSION.to_string())?;
        schema::set_meta(&tx, "start_time", &meta.start_time.to_rfc3339())?;
        schema::set_meta(
            &tx,
            "samples_per_second",
            &meta.samples_per_second.to_string(),
        )?;
        schema::set_meta(
            &tx,
            "dump_interval_secs",
            &meta.dump_interval_secs.to_string(),
        )?;
        schema::set_meta(&tx, "exe_path", &meta.exe_path)?;
        schema::set_meta(&tx, "pid", &meta.pid.to_string())?;

        {
            let mut insert_location =
                tx.prepare_cached("INSERT INTO locations (file, line) VALUES (?, ?)")?;
            let mut insert_sample = tx.prepare_cached(
                "INSERT INTO samples (clock, location_id, count) VALUES (?, ?, ?)",
            )?;
            let mut insert_total =
                tx.prepare_cached("INSERT INTO totals (clock, total) VALUES (?, ?)")?;

            // Cache: (file, line) -> location_id
            let mut location_ids: HashMap<&SourceLocation, i64> = HashMap::new();

            for clock in Clock::ALL {
                let samples = self.samples.clock(clock);
                insert_total.execute(rusqlite::params![clock.name(), samples.total as i64])?;

                for (location, &count) in samples.table.iter() {
                    let id = match location_ids.get(location) {
                        Some(&id) => id,
                        None => {
                            insert_location
                                .execute(rusqlite::params![&location.file, location.line as i64])?;
                            let id = tx.last_insert_rowid();
                            location_ids.insert(location, id);
                            id
                        }
                    };
                    insert_sample.execute(rusqlite::params![clock.name(), id, count as i64])?;
                }
            }
        }

        tx.commit()?;
        Ok(())
    }

    /// Read a snapshot written by [`Snapshot::write`]
    pub fn load(path: &Path) -> Result<Self> {
        let conn = open(path)?;
        let meta = SnapshotMeta::read(&conn)?;

        let mut samples = SampleAggregator::new();

        let mut stmt = conn.prepare("SELECT clock, total FROM totals")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (name, total) = row?;
            samples.clock_mut(clock_named(&name)?).total = total as u64;
        }

        let mut stmt = conn.prepare(
            r#"
            SELECT s.clock, l.file, l.line, s.count
            FROM samples s
            JOIN locations l ON s.location_id = l.id
            "#,
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })?;
        for row in rows {
            let (name, file, line, count) = row?;
            samples
                .clock_mut(clock_named(&name)?)
                .table
                .add(SourceLocation::new(file, line as u32), count as u64);
        }

        Ok(Snapshot { meta, samples })
    }
}

/// Open a snapshot read-only, checking its schema version
pub fn open(path: &Path) -> Result<Connection> {
    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;

    let version: i32 = parse_meta(&conn, "version")?;
    if version != SCHEMA_VERSION {
        return Err(Error::Snapshot(format!(
            "schema version {} (expected {})",
            version, SCHEMA_VERSION
        )));
    }

    Ok(conn)
}

/// Sample total of one clock
pub fn clock_total(conn: &Connection, clock: Clock) -> Result<u64> {
    let total: i64 = conn.query_row(
        "SELECT COALESCE(SUM(total), 0) FROM totals WHERE clock = ?",
        [clock.name()],
        |row| row.get(0),
    )?;
    Ok(total as u64)
}

fn clock_named(name: &str) -> Result<Clock> {
    Clock::from_name(name).ok_or_else(|| Error::Snapshot(format!("unknown clock {:?}", name)))
}

fn require_meta(conn: &Connection, key: &str) -> Result<String> {
    schema::get_meta(conn, key)?.ok_or_else(|| Error::Snapshot(format!("missing {}", key)))
}

fn parse_meta<T: std::str::FromStr>(conn: &Connection, key: &str) -> Result<T> {
    require_meta(conn, key)?
        .parse()
        .map_err(|_| Error::Snapshot(format!("malformed {}", key)))
}

/// One row of the `top` query
#[derive(Debug, Clone)]
pub struct TopEntry {
    pub file: String,
    pub line: u32,
    pub samples: u64,
    /// Share of the clock's sample total
    pub percent: f64,
}

/// Hottest lines of one clock, at or above `threshold` percent
pub fn query_top(
    conn: &Connection,
    clock: Clock,
    limit: usize,
    threshold: f64,
) -> Result<Vec<TopEntry>> {
    let total = clock_total(conn, clock)?;
    if total == 0 {
        return Ok(vec![]);
    }

    let mut stmt = conn.prepare(
        r#"
        SELECT l.file, l.line, s.count
        FROM samples s
        JOIN locations l ON s.location_id = l.id
        WHERE s.clock = ?1
        ORDER BY s.count DESC, l.file ASC, l.line ASC
        LIMIT ?2
        "#,
    )?;

    let rows = stmt.query_map(rusqlite::params![clock.name(), limit as i64], |row| {
        let samples: i64 = row.get(2)?;
        Ok(TopEntry {
            file: row.get(0)?,
            line: row.get::<_, i64>(1)? as u32,
            samples: samples as u64,
            percent: samples as f64 * 100.0 / total as f64,
        })
    })?;

    let mut entries = Vec::new();
    for row in rows {
        let entry = row?;
        if entry.percent >= threshold {
            entries.push(entry);
        }
    }

    Ok(entries)
}

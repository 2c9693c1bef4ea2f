//! SQLite database storage
//!
//! The pipeline talks to storage through the two traits below so tests can
//! substitute in-memory stores; `SqliteStore` is the production backend.

use anyhow::{Context, Result};
use model::{ConnectionStatus, ErrorCode, Event, EventKind, Measurement, MeasurementError};
use rusqlite::{Connection, params};
use std::path::Path;
use std::sync::Mutex;
use tracing::info;

/// Measurement persistence used by the collector (insert, startup
/// rehydration) and by summary callers (range queries).
pub trait MeasurementStore: Send + Sync + 'static {
    /// Insert and return the stored row with its id filled in.
    fn insert(&self, measurement: &Measurement) -> Result<Measurement>;

    /// Most recent measurements, newest first.
    fn find_recent(&self, limit: usize) -> Result<Vec<Measurement>>;

    /// Measurements within `[from_ms, to_ms]`, ascending by timestamp.
    fn find_by_range(&self, from_ms: i64, to_ms: i64) -> Result<Vec<Measurement>>;

    fn find_latest(&self) -> Result<Option<Measurement>>;
}

/// Event persistence used by the pipeline when the detector emits.
pub trait EventStore: Send + Sync + 'static {
    fn insert(&self, event: &Event) -> Result<Event>;

    /// Most recent events, newest first.
    fn find_recent(&self, limit: usize) -> Result<Vec<Event>>;

    /// Events within `[from_ms, to_ms]`, ascending by timestamp.
    fn find_by_range(&self, from_ms: i64, to_ms: i64) -> Result<Vec<Event>>;
}

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open database")?;

        // Enable WAL mode for better concurrent read/write performance
        conn.pragma_update(None, "journal_mode", "WAL")
            .context("Failed to enable WAL mode")?;

        // Set busy timeout to 5 seconds (handles brief lock conflicts)
        conn.pragma_update(None, "busy_timeout", "5000")
            .context("Failed to set busy timeout")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn initialize(&self) -> Result<()> {
        info!("Initializing database schema");

        let conn = self.conn.lock().unwrap();

        conn.execute(
            "CREATE TABLE IF NOT EXISTS measurements (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp_ms INTEGER NOT NULL,
                status TEXT NOT NULL,
                download_mbps REAL,
                upload_mbps REAL,
                latency_ms REAL,
                jitter_ms REAL,
                packet_loss_percent REAL,
                duration_since_last_ms INTEGER NOT NULL,
                estimated_downtime_ms INTEGER,
                error_code TEXT,
                error_message TEXT,
                meta TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_measurements_timestamp
             ON measurements(timestamp_ms)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp_ms INTEGER NOT NULL,
                event_type TEXT NOT NULL,
                payload TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_events_timestamp ON events(timestamp_ms)",
            [],
        )?;

        info!("Database schema initialized");

        Ok(())
    }
}

fn row_to_measurement(row: &rusqlite::Row) -> rusqlite::Result<Measurement> {
    let status_str: String = row.get(2)?;
    let status = ConnectionStatus::from_str(&status_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            rusqlite::types::Type::Text,
            format!("unknown status: {}", status_str).into(),
        )
    })?;

    let error_code: Option<String> = row.get(10)?;
    let error_message: Option<String> = row.get(11)?;
    let error = match (error_code.as_deref(), error_message) {
        (Some("NO_CONNECTIVITY"), Some(message)) => {
            Some(MeasurementError::new(ErrorCode::NoConnectivity, message))
        }
        (Some("SPEED_TEST_FAILED"), Some(message)) => {
            Some(MeasurementError::new(ErrorCode::SpeedTestFailed, message))
        }
        _ => None,
    };

    // The meta bag is opaque pass-through; a corrupted blob degrades to empty
    // rather than poisoning reads.
    let meta_str: String = row.get(12)?;
    let meta = serde_json::from_str(&meta_str).unwrap_or_default();

    Ok(Measurement {
        id: row.get(0)?,
        timestamp_ms: row.get(1)?,
        status,
        download_mbps: row.get(3)?,
        upload_mbps: row.get(4)?,
        latency_ms: row.get(5)?,
        jitter_ms: row.get(6)?,
        packet_loss_percent: row.get(7)?,
        duration_since_last_ms: row.get(8)?,
        estimated_downtime_ms: row.get(9)?,
        error,
        meta,
    })
}

const MEASUREMENT_COLUMNS: &str = "id, timestamp_ms, status, download_mbps, upload_mbps, \
     latency_ms, jitter_ms, packet_loss_percent, duration_since_last_ms, \
     estimated_downtime_ms, error_code, error_message, meta";

impl MeasurementStore for SqliteStore {
    fn insert(&self, measurement: &Measurement) -> Result<Measurement> {
        let conn = self.conn.lock().unwrap();

        let error_code = measurement.error.as_ref().map(|e| match e.code {
            ErrorCode::NoConnectivity => "NO_CONNECTIVITY",
            ErrorCode::SpeedTestFailed => "SPEED_TEST_FAILED",
        });
        let error_message = measurement.error.as_ref().map(|e| e.message.clone());
        let meta = serde_json::to_string(&measurement.meta)?;

        conn.execute(
            "INSERT INTO measurements (
                timestamp_ms, status, download_mbps, upload_mbps, latency_ms,
                jitter_ms, packet_loss_percent, duration_since_last_ms,
                estimated_downtime_ms, error_code, error_message, meta
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                measurement.timestamp_ms,
                measurement.status.as_str(),
                measurement.download_mbps,
                measurement.upload_mbps,
                measurement.latency_ms,
                measurement.jitter_ms,
                measurement.packet_loss_percent,
                measurement.duration_since_last_ms,
                measurement.estimated_downtime_ms,
                error_code,
                error_message,
                meta,
            ],
        )?;

        let mut stored = measurement.clone();
        stored.id = Some(conn.last_insert_rowid());
        Ok(stored)
    }

    fn find_recent(&self, limit: usize) -> Result<Vec<Measurement>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM measurements ORDER BY timestamp_ms DESC LIMIT ?1",
            MEASUREMENT_COLUMNS
        ))?;

        let measurements = stmt
            .query_map(params![limit as i64], row_to_measurement)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(measurements)
    }

    fn find_by_range(&self, from_ms: i64, to_ms: i64) -> Result<Vec<Measurement>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM measurements
             WHERE timestamp_ms >= ?1 AND timestamp_ms <= ?2
             ORDER BY timestamp_ms ASC",
            MEASUREMENT_COLUMNS
        ))?;

        let measurements = stmt
            .query_map(params![from_ms, to_ms], row_to_measurement)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(measurements)
    }

    fn find_latest(&self) -> Result<Option<Measurement>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM measurements ORDER BY timestamp_ms DESC LIMIT 1",
            MEASUREMENT_COLUMNS
        ))?;

        let mut rows = stmt.query_map([], row_to_measurement)?;
        rows.next().transpose().map_err(Into::into)
    }
}

fn row_to_event(row: &rusqlite::Row) -> rusqlite::Result<Event> {
    let payload: String = row.get(3)?;
    let kind: EventKind = serde_json::from_str(&payload).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            rusqlite::types::Type::Text,
            format!("invalid event payload: {}", e).into(),
        )
    })?;

    Ok(Event {
        id: row.get(0)?,
        timestamp_ms: row.get(1)?,
        kind,
    })
}

impl EventStore for SqliteStore {
    fn insert(&self, event: &Event) -> Result<Event> {
        let conn = self.conn.lock().unwrap();
        let payload = serde_json::to_string(&event.kind)?;

        conn.execute(
            "INSERT INTO events (timestamp_ms, event_type, payload) VALUES (?1, ?2, ?3)",
            params![event.timestamp_ms, event.kind.type_str(), payload],
        )?;

        let mut stored = event.clone();
        stored.id = Some(conn.last_insert_rowid());
        Ok(stored)
    }

    fn find_recent(&self, limit: usize) -> Result<Vec<Event>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, timestamp_ms, event_type, payload FROM events
             ORDER BY timestamp_ms DESC LIMIT ?1",
        )?;

        let events = stmt
            .query_map(params![limit as i64], row_to_event)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(events)
    }

    fn find_by_range(&self, from_ms: i64, to_ms: i64) -> Result<Vec<Event>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, timestamp_ms, event_type, payload FROM events
             WHERE timestamp_ms >= ?1 AND timestamp_ms <= ?2
             ORDER BY timestamp_ms ASC",
        )?;

        let events = stmt
            .query_map(params![from_ms, to_ms], row_to_event)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(events)
    }
}

//! Measurement data structures

use serde::{Deserialize, Serialize};
use std::fmt;

/// Connection state derived from one collection cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// Connectivity check passed and the speed test produced a value
    Online,

    /// Connectivity check failed
    Offline,

    /// Connectivity check passed but every speed-test attempt failed
    Degraded,
}

impl ConnectionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionStatus::Online => "online",
            ConnectionStatus::Offline => "offline",
            ConnectionStatus::Degraded => "degraded",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "online" => Some(ConnectionStatus::Online),
            "offline" => Some(ConnectionStatus::Offline),
            "degraded" => Some(ConnectionStatus::Degraded),
            _ => None,
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Machine-readable failure code attached to a measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    NoConnectivity,
    SpeedTestFailed,
}

/// Structured failure detail for a non-online cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementError {
    pub code: ErrorCode,
    pub message: String,
}

impl MeasurementError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// One probe outcome. Exactly one is produced per completed collection cycle;
/// a cycle rejected by the single-flight guard produces none.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Measurement {
    /// Assigned by the store on insert
    pub id: Option<i64>,

    /// Unix timestamp in milliseconds; primary ordering key. Not guaranteed
    /// monotonic with insert order, consumers must sort.
    pub timestamp_ms: i64,

    pub status: ConnectionStatus,

    /// Download throughput in Mbps (None = not measured this cycle)
    pub download_mbps: Option<f64>,

    /// Upload throughput in Mbps
    pub upload_mbps: Option<f64>,

    /// Round-trip latency in milliseconds
    pub latency_ms: Option<f64>,

    /// Latency jitter in milliseconds
    pub jitter_ms: Option<f64>,

    /// Packet loss across the connectivity burst, in percent
    pub packet_loss_percent: Option<f64>,

    /// Elapsed time since the previous cycle start; downtime proxy when the
    /// link is not online. First cycle uses the configured interval.
    pub duration_since_last_ms: i64,

    /// Equal to `duration_since_last_ms` only when `status != Online`
    pub estimated_downtime_ms: Option<i64>,

    pub error: Option<MeasurementError>,

    /// Opaque pass-through bag (probe source, attempt count, simulation flag).
    /// Analytics never inspects this.
    #[serde(default)]
    pub meta: serde_json::Map<String, serde_json::Value>,
}

impl Measurement {
    pub fn new(status: ConnectionStatus, timestamp_ms: i64, duration_since_last_ms: i64) -> Self {
        let estimated_downtime_ms =
            (status != ConnectionStatus::Online).then_some(duration_since_last_ms);

        Self {
            id: None,
            timestamp_ms,
            status,
            download_mbps: None,
            upload_mbps: None,
            latency_ms: None,
            jitter_ms: None,
            packet_loss_percent: None,
            duration_since_last_ms,
            estimated_downtime_ms,
            error: None,
            meta: serde_json::Map::new(),
        }
    }

    pub fn is_online(&self) -> bool {
        self.status == ConnectionStatus::Online
    }

    pub fn set_meta(&mut self, key: &str, value: impl Into<serde_json::Value>) {
        self.meta.insert(key.to_string(), value.into());
    }
}

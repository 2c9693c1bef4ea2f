//! Pipeline error taxonomy

use thiserror::Error;

/// Errors surfaced by the monitoring pipeline to its callers.
///
/// Probe-internal failures are absorbed by the collector's retry loop and
/// become `Offline`/`Degraded` measurements instead of errors; only faults a
/// caller can act on appear here.
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("no connectivity: {0}")]
    NoConnectivity(String),

    #[error("speed test failed after {attempts} attempts")]
    SpeedTestFailed { attempts: u32 },

    #[error("unrealistic {metric} reading: {value:.1} Mbps exceeds ceiling {ceiling:.1}")]
    UnrealisticReading {
        metric: &'static str,
        value: f64,
        ceiling: f64,
    },

    #[error("storage failure: {0}")]
    Storage(String),

    #[error("manual trigger timed out after {waited_ms} ms")]
    TriggerTimeout { waited_ms: u64 },
}

/// Failure of a single probe operation (one connectivity check or one
/// transfer attempt). Never propagates past the collector.
#[derive(Error, Debug, Clone)]
pub enum ProbeFailure {
    #[error("target unreachable: {0}")]
    Unreachable(String),

    #[error("transfer failed: {0}")]
    Transfer(String),

    #[error("timed out after {0} ms")]
    Timeout(u64),
}

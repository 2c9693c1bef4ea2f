//! On-demand window summaries
//!
//! A `Summary` is ephemeral: computed from an arbitrary window of
//! measurements, returned to the caller, never persisted.

use serde::{Deserialize, Serialize};

/// Round to 2 decimal places, half away from zero on the scaled integer.
/// This is the policy for every externally reported floating value.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// `round2` lifted over optional values; NaN propagates as `None`, never as 0.
pub fn round2_opt(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite()).map(round2)
}

/// Min/max/avg for one metric over the accepted samples of a window.
/// All fields are `None` when no sample passed the realism filters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricStats {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub avg: Option<f64>,
}

/// Downtime accounting. `events` counts contiguous non-online runs, not
/// individual samples.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Downtime {
    pub events: u64,
    pub duration_ms: i64,
}

/// One detected drop episode between consecutive accepted download samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeedDrop {
    pub timestamp_ms: i64,
    pub previous_mbps: f64,
    pub current_mbps: f64,
    pub drop_mbps: f64,
    pub drop_percent: f64,
}

/// Recorded drop episodes, bounded to keep response sizes sane. `count`
/// reflects recorded entries only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpeedDrops {
    pub count: u64,
    pub events: Vec<SpeedDrop>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub total_samples: u64,
    pub online_samples: u64,
    pub offline_samples: u64,
    pub uptime_percent: Option<f64>,
    pub downtime: Downtime,
    pub download: MetricStats,
    pub upload: MetricStats,
    pub latency: MetricStats,
    pub speed_drops: SpeedDrops,
}

impl Summary {
    /// The canonical zero summary returned for an empty window.
    pub fn empty() -> Self {
        Self::default()
    }
}

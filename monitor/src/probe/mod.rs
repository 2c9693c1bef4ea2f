//! Probe strategies
//!
//! A probe performs one network measurement attempt: a lightweight
//! connectivity pre-check and, separately, timed download/upload transfers.
//! The collector owns retries and validation; probes only report what one
//! attempt saw.

mod http;
mod simulated;

pub use http::HttpProbe;
pub use simulated::SimulatedProbe;

use model::ProbeFailure;
use std::future::Future;

/// Result of the reachability burst that precedes a speed test.
#[derive(Debug, Clone, Default)]
pub struct ConnectivityCheck {
    pub latency_ms: Option<f64>,
    pub jitter_ms: Option<f64>,
    pub packet_loss_percent: Option<f64>,
}

/// One pluggable measurement capability. Stateless except for simulated-mode
/// drift.
pub trait ProbeStrategy: Send + Sync + 'static {
    /// Short tag recorded in `meta.source` of every measurement
    fn source(&self) -> &'static str;

    /// Lightweight reachability check with its own timeout. `Err` means the
    /// link is down and the speed test must be skipped.
    fn check_connectivity(
        &self,
    ) -> impl Future<Output = Result<ConnectivityCheck, ProbeFailure>> + Send;

    /// One timed download attempt, in Mbps.
    fn measure_download(&self) -> impl Future<Output = Result<f64, ProbeFailure>> + Send;

    /// One timed upload attempt, in Mbps.
    fn measure_upload(&self) -> impl Future<Output = Result<f64, ProbeFailure>> + Send;
}

/// Throughput of a timed transfer in Mbps.
pub(crate) fn mbps(bytes: usize, elapsed_secs: f64) -> f64 {
    if elapsed_secs <= 0.0 {
        return 0.0;
    }
    (bytes as f64 * 8.0) / (elapsed_secs * 1_000_000.0)
}

/// Mean latency and mean absolute deviation of a ping burst.
pub(crate) fn burst_stats(rtts_ms: &[f64]) -> (Option<f64>, Option<f64>) {
    if rtts_ms.is_empty() {
        return (None, None);
    }
    let avg = rtts_ms.iter().sum::<f64>() / rtts_ms.len() as f64;
    let jitter = rtts_ms.iter().map(|r| (r - avg).abs()).sum::<f64>() / rtts_ms.len() as f64;
    (Some(avg), Some(jitter))
}

//! Measurement collection
//!
//! The collector owns the periodic schedule, the connectivity pre-check, the
//! retry loop and the single-flight guarantee. Every completed cycle yields
//! exactly one persisted measurement; a cycle that loses the single-flight
//! race yields none.

use crate::config::{Config, ProbeConfig, ThresholdsConfig};
use crate::pipeline::Publisher;
use crate::probe::ProbeStrategy;
use crate::storage::MeasurementStore;
use chrono::Utc;
use model::{
    ConnectionStatus, ErrorCode, Measurement, MeasurementError, MonitorError, round2_opt,
};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Extra slack on top of the worst-case cycle when a manual trigger waits for
/// someone else's emission.
const TRIGGER_MARGIN_MS: u64 = 2_000;

pub struct Collector<P, S> {
    interval_ms: u64,
    probe_config: ProbeConfig,
    thresholds: ThresholdsConfig,
    probe: P,
    store: Arc<S>,
    publisher: Publisher,
    running: AtomicBool,
    in_flight: AtomicBool,
    last_run_at: Mutex<Option<Instant>>,
}

impl<P, S> Collector<P, S>
where
    P: ProbeStrategy,
    S: MeasurementStore,
{
    pub fn new(config: &Config, probe: P, store: Arc<S>, publisher: Publisher) -> Self {
        Self {
            interval_ms: config.general.interval_ms,
            probe_config: config.probe.clone(),
            thresholds: config.thresholds.clone(),
            probe,
            store,
            publisher,
            running: AtomicBool::new(false),
            in_flight: AtomicBool::new(false),
            last_run_at: Mutex::new(None),
        }
    }

    #[cfg(test)]
    pub fn probe(&self) -> &P {
        &self.probe
    }

    /// Run one collection cycle. Returns `None` without touching the network
    /// when a cycle is already in flight, or when the schedule has not been
    /// started and the call is not forced.
    pub async fn collect(&self, force: bool) -> Option<Measurement> {
        if !force && !self.running.load(Ordering::SeqCst) {
            debug!("Collector not running and call not forced, skipping");
            return None;
        }

        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Measurement already in flight, skipping");
            return None;
        }

        let measurement = self.run_cycle().await;

        // A storage fault is logged and the in-memory measurement still
        // flows downstream.
        let stored = match self.store.insert(&measurement) {
            Ok(stored) => stored,
            Err(e) => {
                error!("Failed to store measurement: {}", e);
                measurement
            }
        };

        self.publisher.publish_measurement(&stored);
        self.in_flight.store(false, Ordering::SeqCst);

        Some(stored)
    }

    /// One probe sequence: connectivity pre-check, retried download, then a
    /// best-effort upload. Probe failures never escape; they become the
    /// measurement's status and error fields.
    async fn run_cycle(&self) -> Measurement {
        let timestamp_ms = Utc::now().timestamp_millis();
        let duration_since_last_ms = {
            let mut last = self.last_run_at.lock().unwrap();
            let elapsed = last
                .map(|at| at.elapsed().as_millis() as i64)
                .unwrap_or(self.interval_ms as i64);
            *last = Some(Instant::now());
            elapsed
        };

        let check = match self.probe.check_connectivity().await {
            Ok(check) => check,
            Err(failure) => {
                let error = MonitorError::NoConnectivity(failure.to_string());
                warn!("{}", error);
                let mut m = Measurement::new(
                    ConnectionStatus::Offline,
                    timestamp_ms,
                    duration_since_last_ms,
                );
                m.error = Some(MeasurementError::new(
                    ErrorCode::NoConnectivity,
                    error.to_string(),
                ));
                m.set_meta("source", self.probe.source());
                return m;
            }
        };

        let ceiling = self.thresholds.max_realistic_download_mbps;
        let mut download = None;
        let mut attempts = 0u32;

        for attempt in 1..=self.probe_config.max_retries {
            attempts = attempt;
            match self.probe.measure_download().await {
                Ok(mbps) if is_realistic(mbps, ceiling) => {
                    download = Some(mbps);
                    break;
                }
                Ok(mbps) => {
                    // An implausible value is a failed attempt, never stored as-is.
                    warn!(
                        "{}",
                        MonitorError::UnrealisticReading {
                            metric: "download",
                            value: mbps,
                            ceiling,
                        }
                    );
                }
                Err(e) => {
                    warn!(
                        "Download attempt {}/{} failed: {}",
                        attempt, self.probe_config.max_retries, e
                    );
                }
            }
            if attempt < self.probe_config.max_retries {
                tokio::time::sleep(Duration::from_millis(self.probe_config.retry_delay_ms)).await;
            }
        }

        // Upload is best-effort and independent of download success.
        let upload_ceiling = self.thresholds.max_realistic_upload_mbps;
        let upload = match self.probe.measure_upload().await {
            Ok(mbps) if is_realistic(mbps, upload_ceiling) => Some(mbps),
            Ok(mbps) => {
                warn!(
                    "{}",
                    MonitorError::UnrealisticReading {
                        metric: "upload",
                        value: mbps,
                        ceiling: upload_ceiling,
                    }
                );
                None
            }
            Err(e) => {
                debug!("Upload measurement failed: {}", e);
                None
            }
        };

        let status = if download.is_some() {
            ConnectionStatus::Online
        } else {
            // Connectivity holds but every attempt failed: degraded, stored,
            // never silently dropped.
            ConnectionStatus::Degraded
        };

        let mut m = Measurement::new(status, timestamp_ms, duration_since_last_ms);
        m.download_mbps = round2_opt(download);
        m.upload_mbps = round2_opt(upload);
        m.latency_ms = round2_opt(check.latency_ms);
        m.jitter_ms = round2_opt(check.jitter_ms);
        m.packet_loss_percent = round2_opt(check.packet_loss_percent);
        m.set_meta("source", self.probe.source());
        m.set_meta("attempts", attempts);

        if download.is_none() {
            m.error = Some(MeasurementError::new(
                ErrorCode::SpeedTestFailed,
                MonitorError::SpeedTestFailed { attempts }.to_string(),
            ));
            m.set_meta("note", "unreliable");
        }

        m
    }

    /// Force an out-of-band cycle. If the single-flight slot is taken, wait
    /// for the in-flight (or next scheduled) emission instead of queueing,
    /// bounded by the worst-case cycle plus one interval.
    pub async fn trigger_once(&self) -> Result<Measurement, MonitorError> {
        // Subscribe before attempting, so an emission finishing between the
        // rejected collect and the wait cannot be missed.
        let mut rx = self.publisher.subscribe_measurements();

        if let Some(measurement) = self.collect(true).await {
            return Ok(measurement);
        }

        let waited_ms = self.trigger_wait_ms();
        match tokio::time::timeout(Duration::from_millis(waited_ms), rx.recv()).await {
            Ok(Ok(measurement)) => Ok(measurement),
            _ => Err(MonitorError::TriggerTimeout { waited_ms }),
        }
    }

    /// Worst-case cycle duration plus one schedule interval plus margin.
    fn trigger_wait_ms(&self) -> u64 {
        let p = &self.probe_config;
        let cycle_ms = p.connectivity_timeout_ms
            + (p.download_timeout_ms + p.retry_delay_ms) * p.max_retries as u64
            + p.upload_timeout_ms;
        cycle_ms + self.interval_ms + TRIGGER_MARGIN_MS
    }

    #[cfg(test)]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Periodic schedule: the initial cycle runs immediately and forced,
    /// subsequent cycles are best-effort.
    pub async fn run_schedule(self: Arc<Self>) {
        self.running.store(true, Ordering::SeqCst);
        info!("Collection schedule started (interval {} ms)", self.interval_ms);

        let mut ticker = tokio::time::interval(Duration::from_millis(self.interval_ms));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut first = true;
        loop {
            ticker.tick().await;
            if self.collect(first).await.is_none() && !first {
                debug!("Scheduled cycle skipped");
            }
            first = false;
        }
    }
}

fn is_realistic(mbps: f64, ceiling: f64) -> bool {
    mbps.is_finite() && mbps > 0.0 && mbps <= ceiling
}

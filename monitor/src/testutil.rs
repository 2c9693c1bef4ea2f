//! Shared test doubles: an in-memory store pair and a scriptable probe.

use crate::probe::{ConnectivityCheck, ProbeStrategy};
use crate::storage::{EventStore, MeasurementStore};
use anyhow::Result;
use model::{Event, Measurement, ProbeFailure};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

/// In-memory measurement and event storage.
#[derive(Default)]
pub struct MemoryStore {
    measurements: Mutex<Vec<Measurement>>,
    events: Mutex<Vec<Event>>,
}

impl MemoryStore {
    pub fn measurement_count(&self) -> usize {
        self.measurements.lock().unwrap().len()
    }
}

impl MeasurementStore for MemoryStore {
    fn insert(&self, measurement: &Measurement) -> Result<Measurement> {
        let mut rows = self.measurements.lock().unwrap();
        let mut stored = measurement.clone();
        stored.id = Some(rows.len() as i64 + 1);
        rows.push(stored.clone());
        Ok(stored)
    }

    fn find_recent(&self, limit: usize) -> Result<Vec<Measurement>> {
        let mut rows = self.measurements.lock().unwrap().clone();
        rows.sort_by_key(|m| std::cmp::Reverse(m.timestamp_ms));
        rows.truncate(limit);
        Ok(rows)
    }

    fn find_by_range(&self, from_ms: i64, to_ms: i64) -> Result<Vec<Measurement>> {
        let mut rows: Vec<Measurement> = self
            .measurements
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.timestamp_ms >= from_ms && m.timestamp_ms <= to_ms)
            .cloned()
            .collect();
        rows.sort_by_key(|m| m.timestamp_ms);
        Ok(rows)
    }

    fn find_latest(&self) -> Result<Option<Measurement>> {
        Ok(self
            .measurements
            .lock()
            .unwrap()
            .iter()
            .max_by_key(|m| m.timestamp_ms)
            .cloned())
    }
}

impl EventStore for MemoryStore {
    fn insert(&self, event: &Event) -> Result<Event> {
        let mut rows = self.events.lock().unwrap();
        let mut stored = event.clone();
        stored.id = Some(rows.len() as i64 + 1);
        rows.push(stored.clone());
        Ok(stored)
    }

    fn find_recent(&self, limit: usize) -> Result<Vec<Event>> {
        let mut rows = self.events.lock().unwrap().clone();
        rows.sort_by_key(|e| std::cmp::Reverse(e.timestamp_ms));
        rows.truncate(limit);
        Ok(rows)
    }

    fn find_by_range(&self, from_ms: i64, to_ms: i64) -> Result<Vec<Event>> {
        let mut rows: Vec<Event> = self
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.timestamp_ms >= from_ms && e.timestamp_ms <= to_ms)
            .cloned()
            .collect();
        rows.sort_by_key(|e| e.timestamp_ms);
        Ok(rows)
    }
}

/// A probe that plays back a script of download results and can be toggled
/// unreachable or slowed down mid-test.
pub struct ScriptedProbe {
    reachable: AtomicBool,
    connectivity_delay_ms: AtomicU64,
    downloads: Mutex<VecDeque<Result<f64, ProbeFailure>>>,
    upload_ok: AtomicBool,
    connectivity_attempts: AtomicU32,
    download_attempts: AtomicU32,
}

impl ScriptedProbe {
    /// Reachable probe whose download attempts yield the given speeds in
    /// order, then fail.
    pub fn reachable(download_mbps: &[f64]) -> Self {
        Self::with_download_script(download_mbps.iter().copied().map(Ok).collect())
    }

    pub fn with_download_script(script: Vec<Result<f64, ProbeFailure>>) -> Self {
        Self {
            reachable: AtomicBool::new(true),
            connectivity_delay_ms: AtomicU64::new(0),
            downloads: Mutex::new(script.into()),
            upload_ok: AtomicBool::new(true),
            connectivity_attempts: AtomicU32::new(0),
            download_attempts: AtomicU32::new(0),
        }
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn set_connectivity_delay_ms(&self, delay_ms: u64) {
        self.connectivity_delay_ms.store(delay_ms, Ordering::SeqCst);
    }

    pub fn fail_uploads(&self) {
        self.upload_ok.store(false, Ordering::SeqCst);
    }

    pub fn connectivity_attempts(&self) -> u32 {
        self.connectivity_attempts.load(Ordering::SeqCst)
    }

    pub fn download_attempts(&self) -> u32 {
        self.download_attempts.load(Ordering::SeqCst)
    }
}

impl ProbeStrategy for ScriptedProbe {
    fn source(&self) -> &'static str {
        "scripted"
    }

    async fn check_connectivity(&self) -> Result<ConnectivityCheck, ProbeFailure> {
        self.connectivity_attempts.fetch_add(1, Ordering::SeqCst);

        let delay_ms = self.connectivity_delay_ms.load(Ordering::SeqCst);
        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }

        if !self.reachable.load(Ordering::SeqCst) {
            return Err(ProbeFailure::Unreachable("scripted outage".to_string()));
        }

        Ok(ConnectivityCheck {
            latency_ms: Some(20.0),
            jitter_ms: Some(2.0),
            packet_loss_percent: Some(0.0),
        })
    }

    async fn measure_download(&self) -> Result<f64, ProbeFailure> {
        self.download_attempts.fetch_add(1, Ordering::SeqCst);
        self.downloads
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ProbeFailure::Transfer("download script exhausted".to_string())))
    }

    async fn measure_upload(&self) -> Result<f64, ProbeFailure> {
        if self.upload_ok.load(Ordering::SeqCst) {
            Ok(22.5)
        } else {
            Err(ProbeFailure::Transfer("scripted upload failure".to_string()))
        }
    }
}

//! Pipeline coordination
//!
//! Wires Collector -> (persist) -> Detector -> (persist, notify) and exposes
//! window summaries on demand. No algorithm of its own, composition only.

use crate::analytics::compute_summary;
use crate::collector::Collector;
use crate::config::{AnalyticsConfig, Config, ThresholdsConfig};
use crate::detector::EventDetector;
use crate::output;
use crate::probe::ProbeStrategy;
use crate::storage::{EventStore, MeasurementStore};
use anyhow::Result;
use model::{Event, Measurement, MonitorError, Summary};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// Fire-and-forget notification sink for downstream transports. Publishing
/// never fails; with no subscribers the payload is simply dropped.
#[derive(Clone)]
pub struct Publisher {
    measurements: broadcast::Sender<Measurement>,
    events: broadcast::Sender<Event>,
}

impl Publisher {
    pub fn new(capacity: usize) -> Self {
        let (measurements, _) = broadcast::channel(capacity);
        let (events, _) = broadcast::channel(capacity);
        Self {
            measurements,
            events,
        }
    }

    pub fn publish_measurement(&self, measurement: &Measurement) {
        let _ = self.measurements.send(measurement.clone());
    }

    pub fn publish_event(&self, event: &Event) {
        let _ = self.events.send(event.clone());
    }

    pub fn subscribe_measurements(&self) -> broadcast::Receiver<Measurement> {
        self.measurements.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }
}

impl Default for Publisher {
    fn default() -> Self {
        Self::new(64)
    }
}

pub struct Pipeline<P, MS, ES> {
    collector: Arc<Collector<P, MS>>,
    detector: EventDetector,
    measurement_store: Arc<MS>,
    event_store: Arc<ES>,
    publisher: Publisher,
    thresholds: ThresholdsConfig,
    analytics: AnalyticsConfig,
}

impl<P, MS, ES> Pipeline<P, MS, ES>
where
    P: ProbeStrategy,
    MS: MeasurementStore,
    ES: EventStore,
{
    pub fn new(
        config: &Config,
        probe: P,
        measurement_store: Arc<MS>,
        event_store: Arc<ES>,
    ) -> Result<Self> {
        let publisher = Publisher::default();

        let mut detector = EventDetector::new(config.thresholds.clone());
        detector.rehydrate(measurement_store.as_ref())?;

        let collector = Arc::new(Collector::new(
            config,
            probe,
            measurement_store.clone(),
            publisher.clone(),
        ));

        Ok(Self {
            collector,
            detector,
            measurement_store,
            event_store,
            publisher,
            thresholds: config.thresholds.clone(),
            analytics: config.analytics.clone(),
        })
    }

    pub fn publisher(&self) -> &Publisher {
        &self.publisher
    }

    #[cfg(test)]
    pub fn collector(&self) -> &Arc<Collector<P, MS>> {
        &self.collector
    }

    /// Run the schedule until the task is cancelled, feeding every collected
    /// measurement to the detector in collection order.
    pub async fn run(mut self) -> Result<()> {
        let mut rx = self.publisher.subscribe_measurements();
        let schedule = tokio::spawn(self.collector.clone().run_schedule());

        info!("Pipeline running (Press Ctrl+C to stop)");

        loop {
            match rx.recv().await {
                Ok(measurement) => {
                    output::print_measurement(&measurement);
                    for event in self.process_measurement(&measurement) {
                        output::print_event(&event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    // Should not happen with one producer per cycle; the
                    // detector state machine cannot skip measurements.
                    warn!("Detector lagged behind, {} measurements skipped", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }

        schedule.abort();
        Ok(())
    }

    /// Detect, persist and publish the events for one measurement. Returns
    /// the stored events.
    pub fn process_measurement(&mut self, measurement: &Measurement) -> Vec<Event> {
        let mut stored_events = Vec::new();

        for event in self.detector.analyze(measurement) {
            // Persist before publishing, but a storage fault must not
            // suppress the in-memory notification.
            let stored = match self.event_store.insert(&event) {
                Ok(stored) => stored,
                Err(e) => {
                    error!("Failed to store event: {}", e);
                    event
                }
            };
            self.publisher.publish_event(&stored);
            stored_events.push(stored);
        }

        stored_events
    }

    /// One out-of-band cycle without the schedule: collect forced, run
    /// detection, return the measurement.
    pub async fn run_once(&mut self) -> Result<Measurement, MonitorError> {
        let measurement = self.collector.trigger_once().await?;
        self.process_measurement(&measurement);
        Ok(measurement)
    }

    /// Summary over the stored measurements in `[from_ms, to_ms]`.
    pub fn summary(&self, from_ms: i64, to_ms: i64) -> Result<Summary, MonitorError> {
        let window = self
            .measurement_store
            .find_by_range(from_ms, to_ms)
            .map_err(|e| MonitorError::Storage(e.to_string()))?;
        Ok(compute_summary(&window, &self.thresholds, &self.analytics))
    }
}

//! Event detection
//!
//! Classifies consecutive measurements into discrete transition events. The
//! detector is a two-state machine: it only ever compares the current
//! measurement against a snapshot of the previous one, never against history.

use crate::config::ThresholdsConfig;
use crate::storage::MeasurementStore;
use anyhow::Result;
use model::{ConnectionStatus, Event, EventKind, Measurement, round2};
use tracing::info;

/// Snapshot of the last processed measurement.
#[derive(Debug, Clone)]
struct PreviousState {
    status: ConnectionStatus,
    download_mbps: Option<f64>,
    timestamp_ms: i64,
}

impl PreviousState {
    fn of(m: &Measurement) -> Self {
        Self {
            status: m.status,
            download_mbps: m.download_mbps,
            timestamp_ms: m.timestamp_ms,
        }
    }
}

pub struct EventDetector {
    thresholds: ThresholdsConfig,
    previous: Option<PreviousState>,
}

impl EventDetector {
    pub fn new(thresholds: ThresholdsConfig) -> Self {
        Self {
            thresholds,
            previous: None,
        }
    }

    /// Seed the previous-state snapshot from the most recent persisted
    /// measurement so detection is continuous across restarts.
    pub fn rehydrate<S: MeasurementStore>(&mut self, store: &S) -> Result<()> {
        if let Some(m) = store.find_latest()? {
            info!(
                "Rehydrated detector state: {} at {}",
                m.status, m.timestamp_ms
            );
            self.previous = Some(PreviousState::of(&m));
        }
        Ok(())
    }

    /// Compare one measurement against the previous snapshot and emit the
    /// resulting events. The snapshot is overwritten unconditionally,
    /// whether or not anything fired.
    pub fn analyze(&mut self, m: &Measurement) -> Vec<Event> {
        let mut events = Vec::new();

        if let Some(previous) = &self.previous {
            match (previous.status, m.status) {
                (ConnectionStatus::Online, ConnectionStatus::Offline) => {
                    info!("Connection lost at {}", m.timestamp_ms);
                    events.push(Event::new(m.timestamp_ms, EventKind::ConnectionLost));
                }
                (ConnectionStatus::Offline, ConnectionStatus::Online) => {
                    let offline_for_ms = m
                        .timestamp_ms
                        .checked_sub(previous.timestamp_ms)
                        .filter(|d| *d >= 0);
                    info!(
                        "Connection restored at {} (offline for {:?} ms)",
                        m.timestamp_ms, offline_for_ms
                    );
                    events.push(Event::new(
                        m.timestamp_ms,
                        EventKind::ConnectionRestored { offline_for_ms },
                    ));
                }
                (ConnectionStatus::Online, ConnectionStatus::Online) => {
                    if let Some(event) = self.check_speed_shift(previous, m) {
                        events.push(event);
                    }
                }
                // Degraded transitions carry no usable signal either way.
                _ => {}
            }
        }

        self.previous = Some(PreviousState::of(m));
        events
    }

    /// Evaluate the online->online pair for a speed shift. Branching on the
    /// sign of the delta means at most one side is ever checked, so
    /// degradation and improvement cannot both fire for one pair even with
    /// asymmetric thresholds.
    fn check_speed_shift(&self, previous: &PreviousState, m: &Measurement) -> Option<Event> {
        let prev_mbps = previous.download_mbps?;
        let cur_mbps = m.download_mbps?;

        let delta = prev_mbps - cur_mbps;
        if delta > 0.0 {
            let drop_percent = if prev_mbps > 0.0 {
                delta / prev_mbps * 100.0
            } else {
                0.0
            };
            if delta >= self.thresholds.speed_drop_mbps
                || drop_percent >= self.thresholds.speed_drop_percent
            {
                info!(
                    "Speed degradation: {:.2} -> {:.2} Mbps ({:.1}%)",
                    prev_mbps, cur_mbps, drop_percent
                );
                return Some(Event::new(
                    m.timestamp_ms,
                    EventKind::SpeedDegradation {
                        previous_mbps: round2(prev_mbps),
                        current_mbps: round2(cur_mbps),
                        drop_mbps: round2(delta),
                        drop_percent: round2(drop_percent),
                    },
                ));
            }
        } else if delta < 0.0 {
            let gain = -delta;
            let gain_percent = if prev_mbps > 0.0 {
                gain / prev_mbps * 100.0
            } else {
                0.0
            };
            if gain >= self.thresholds.improve_mbps()
                || gain_percent >= self.thresholds.improve_percent()
            {
                info!(
                    "Speed improved: {:.2} -> {:.2} Mbps (+{:.1}%)",
                    prev_mbps, cur_mbps, gain_percent
                );
                return Some(Event::new(
                    m.timestamp_ms,
                    EventKind::SpeedImproved {
                        previous_mbps: round2(prev_mbps),
                        current_mbps: round2(cur_mbps),
                        gain_mbps: round2(gain),
                        gain_percent: round2(gain_percent),
                    },
                ));
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MeasurementStore, SqliteStore};

    fn detector() -> EventDetector {
        EventDetector::new(ThresholdsConfig {
            speed_drop_mbps: 15.0,
            speed_drop_percent: 30.0,
            ..Default::default()
        })
    }

    fn online(timestamp_ms: i64, download_mbps: f64) -> Measurement {
        let mut m = Measurement::new(ConnectionStatus::Online, timestamp_ms, 60_000);
        m.download_mbps = Some(download_mbps);
        m
    }

    fn offline(timestamp_ms: i64) -> Measurement {
        Measurement::new(ConnectionStatus::Offline, timestamp_ms, 60_000)
    }

    #[test]
    fn first_measurement_emits_nothing() {
        let mut detector = detector();
        assert!(detector.analyze(&online(1_000, 100.0)).is_empty());
    }

    #[test]
    fn online_to_offline_emits_connection_lost() {
        let mut detector = detector();
        detector.analyze(&online(1_000, 100.0));

        let events = detector.analyze(&offline(2_000));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::ConnectionLost);
        assert_eq!(events[0].timestamp_ms, 2_000);
    }

    #[test]
    fn offline_to_online_emits_connection_restored() {
        let mut detector = detector();
        detector.analyze(&offline(1_000));

        let events = detector.analyze(&online(61_000, 100.0));
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0].kind,
            EventKind::ConnectionRestored {
                offline_for_ms: Some(60_000)
            }
        );
    }

    #[test]
    fn repeated_offline_emits_nothing() {
        let mut detector = detector();
        detector.analyze(&offline(1_000));
        assert!(detector.analyze(&offline(2_000)).is_empty());
    }

    #[test]
    fn degraded_transitions_emit_nothing() {
        let mut detector = detector();
        detector.analyze(&online(1_000, 100.0));

        let degraded = Measurement::new(ConnectionStatus::Degraded, 2_000, 60_000);
        assert!(detector.analyze(&degraded).is_empty());
        // degraded -> offline is also silent
        assert!(detector.analyze(&offline(3_000)).is_empty());
        // but the snapshot kept moving: offline -> online now fires restored
        let events = detector.analyze(&online(4_000, 100.0));
        assert_eq!(events[0].kind.type_str(), "connection-restored");
    }

    #[test]
    fn absolute_drop_threshold_fires_degradation() {
        let mut detector = detector();
        detector.analyze(&online(1_000, 100.0));

        let events = detector.analyze(&online(2_000, 80.0));
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0].kind,
            EventKind::SpeedDegradation {
                previous_mbps: 100.0,
                current_mbps: 80.0,
                drop_mbps: 20.0,
                drop_percent: 20.0,
            }
        );
    }

    #[test]
    fn percent_improvement_fires_speed_improved() {
        let mut detector = detector();
        detector.analyze(&online(1_000, 100.0));

        let events = detector.analyze(&online(2_000, 140.0));
        assert_eq!(events.len(), 1);
        match &events[0].kind {
            EventKind::SpeedImproved {
                gain_mbps,
                gain_percent,
                ..
            } => {
                assert_eq!(*gain_mbps, 40.0);
                assert_eq!(*gain_percent, 40.0);
            }
            other => panic!("expected speed-improved, got {:?}", other),
        }
    }

    #[test]
    fn a_pair_never_emits_both_speed_events() {
        // Thresholds of zero would fire on any change in either direction;
        // the sign split must still keep emissions to at most one.
        let mut detector = EventDetector::new(ThresholdsConfig {
            speed_drop_mbps: 0.0,
            speed_drop_percent: 0.0,
            speed_improve_mbps: Some(0.0),
            speed_improve_percent: Some(0.0),
            ..Default::default()
        });

        detector.analyze(&online(1_000, 100.0));
        assert_eq!(detector.analyze(&online(2_000, 90.0)).len(), 1);
        assert_eq!(detector.analyze(&online(3_000, 95.0)).len(), 1);
        // unchanged speed emits nothing at all
        assert!(detector.analyze(&online(4_000, 95.0)).is_empty());
    }

    #[test]
    fn small_changes_below_thresholds_emit_nothing() {
        let mut detector = detector();
        detector.analyze(&online(1_000, 100.0));
        assert!(detector.analyze(&online(2_000, 95.0)).is_empty());
        assert!(detector.analyze(&online(3_000, 99.0)).is_empty());
    }

    #[test]
    fn snapshot_moves_even_when_nothing_fires() {
        let mut detector = detector();
        detector.analyze(&online(1_000, 100.0));
        // 100 -> 95 is below thresholds, but the snapshot must now be 95
        detector.analyze(&online(2_000, 95.0));

        // 95 -> 78 is a 17 Mbps drop from the *new* snapshot
        let events = detector.analyze(&online(3_000, 78.0));
        assert_eq!(events.len(), 1);
        match &events[0].kind {
            EventKind::SpeedDegradation { previous_mbps, .. } => {
                assert_eq!(*previous_mbps, 95.0)
            }
            other => panic!("expected speed-degradation, got {:?}", other),
        }
    }

    #[test]
    fn rehydrated_detector_sees_transition_after_restart() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.initialize().unwrap();
        MeasurementStore::insert(&store, &online(1_000, 100.0)).unwrap();

        // fresh process: a new detector seeded from storage
        let mut detector = detector();
        detector.rehydrate(&store).unwrap();

        let events = detector.analyze(&offline(61_000));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::ConnectionLost);
    }

    #[test]
    fn rehydrate_on_empty_store_behaves_like_fresh_start() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.initialize().unwrap();

        let mut detector = detector();
        detector.rehydrate(&store).unwrap();
        assert!(detector.analyze(&offline(1_000)).is_empty());
    }
}

//! Detected transition events

use serde::{Deserialize, Serialize};

/// Payload of a detected transition. Tag values double as the wire/storage
/// type strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum EventKind {
    ConnectionLost,

    ConnectionRestored {
        /// Time since the last processed measurement, if known
        offline_for_ms: Option<i64>,
    },

    SpeedDegradation {
        previous_mbps: f64,
        current_mbps: f64,
        drop_mbps: f64,
        drop_percent: f64,
    },

    SpeedImproved {
        previous_mbps: f64,
        current_mbps: f64,
        gain_mbps: f64,
        gain_percent: f64,
    },
}

impl EventKind {
    pub fn type_str(&self) -> &'static str {
        match self {
            EventKind::ConnectionLost => "connection-lost",
            EventKind::ConnectionRestored { .. } => "connection-restored",
            EventKind::SpeedDegradation { .. } => "speed-degradation",
            EventKind::SpeedImproved { .. } => "speed-improved",
        }
    }
}

/// A detected state transition, derived from exactly two adjacent logical
/// states (previous snapshot, current measurement). Never mutated after
/// creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Assigned by the store on insert
    pub id: Option<i64>,

    /// Copied from the triggering measurement
    pub timestamp_ms: i64,

    #[serde(flatten)]
    pub kind: EventKind,
}

impl Event {
    pub fn new(timestamp_ms: i64, kind: EventKind) -> Self {
        Self {
            id: None,
            timestamp_ms,
            kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_serializes_with_kebab_case_tag() {
        let event = Event::new(
            42,
            EventKind::SpeedDegradation {
                previous_mbps: 100.0,
                current_mbps: 80.0,
                drop_mbps: 20.0,
                drop_percent: 20.0,
            },
        );

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "speed-degradation");
        assert_eq!(json["drop_mbps"], 20.0);

        let back: Event = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn type_str_matches_serde_tag() {
        let kind = EventKind::ConnectionRestored {
            offline_for_ms: Some(5_000),
        };
        let json = serde_json::to_value(&kind).unwrap();
        assert_eq!(json["type"], kind.type_str());
    }
}

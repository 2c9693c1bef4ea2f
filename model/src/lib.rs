//! Linkpulse Data Model Library
//!
//! Shared types for the monitoring pipeline: measurements, detected events,
//! on-demand summaries, and the error taxonomy. This crate is pure data, no I/O.

pub mod error;
pub mod event;
pub mod measurement;
pub mod summary;

pub use error::{MonitorError, ProbeFailure};
pub use event::{Event, EventKind};
pub use measurement::{ConnectionStatus, ErrorCode, Measurement, MeasurementError};
pub use summary::{Downtime, MetricStats, SpeedDrop, SpeedDrops, Summary, round2, round2_opt};

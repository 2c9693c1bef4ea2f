//! Simulated probing
//!
//! Produces plausible readings without touching the network: speeds drift
//! around configured base values, latency wobbles, and the link goes down for
//! whole cycles with a configured probability. Used by `--simulate` and by
//! tests that need a pipeline without connectivity.

use super::{ConnectivityCheck, ProbeStrategy};
use crate::config::SimulationConfig;
use model::ProbeFailure;
use rand::Rng;
use std::sync::Mutex;

pub struct SimulatedProbe {
    config: SimulationConfig,
    /// Slow multiplicative drift carried across cycles
    drift: Mutex<f64>,
}

impl SimulatedProbe {
    pub fn new(config: SimulationConfig) -> Self {
        Self {
            config,
            drift: Mutex::new(1.0),
        }
    }

    /// Advance the drift a small random step and return the new factor,
    /// clamped so the simulated link stays between 40% and 120% of base.
    fn step_drift(&self) -> f64 {
        let mut drift = self.drift.lock().unwrap();
        let step: f64 = rand::thread_rng().gen_range(-0.05..0.05);
        *drift = (*drift + step).clamp(0.4, 1.2);
        *drift
    }

    fn link_is_down(&self) -> bool {
        rand::thread_rng().gen_bool(self.config.outage_probability)
    }
}

impl ProbeStrategy for SimulatedProbe {
    fn source(&self) -> &'static str {
        "simulated"
    }

    async fn check_connectivity(&self) -> Result<ConnectivityCheck, ProbeFailure> {
        if self.link_is_down() {
            return Err(ProbeFailure::Unreachable("simulated outage".to_string()));
        }

        let mut rng = rand::thread_rng();
        let latency = self.config.base_latency_ms * rng.gen_range(0.8..1.6);
        let jitter = latency * rng.gen_range(0.05..0.25);

        Ok(ConnectivityCheck {
            latency_ms: Some(latency),
            jitter_ms: Some(jitter),
            packet_loss_percent: Some(0.0),
        })
    }

    async fn measure_download(&self) -> Result<f64, ProbeFailure> {
        let drift = self.step_drift();
        let noise: f64 = rand::thread_rng().gen_range(0.95..1.05);
        Ok(self.config.base_download_mbps * drift * noise)
    }

    async fn measure_upload(&self) -> Result<f64, ProbeFailure> {
        let drift = *self.drift.lock().unwrap();
        let noise: f64 = rand::thread_rng().gen_range(0.95..1.05);
        Ok(self.config.base_upload_mbps * drift * noise)
    }
}

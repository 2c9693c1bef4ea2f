//! HTTP-based probing
//!
//! Connectivity is checked with a short burst of requests against a
//! generate-204 style endpoint; throughput is measured by timing a payload
//! download and a random-body upload against speed-test endpoints.

use super::{ConnectivityCheck, ProbeStrategy, burst_stats, mbps};
use crate::config::ProbeConfig;
use anyhow::{Context, Result};
use model::ProbeFailure;
use rand::RngCore;
use std::time::{Duration, Instant};
use tracing::debug;

pub struct HttpProbe {
    config: ProbeConfig,
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new(config: ProbeConfig) -> Result<Self> {
        // Per-request timeouts are applied per operation; the client itself
        // carries no global timeout.
        let client = reqwest::Client::builder()
            .user_agent("linkpulse/0.1")
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { config, client })
    }

    async fn ping_once(&self) -> Result<f64, ProbeFailure> {
        let timeout = Duration::from_millis(self.config.connectivity_timeout_ms);
        let start = Instant::now();

        let response = self
            .client
            .get(&self.config.connectivity_url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProbeFailure::Timeout(self.config.connectivity_timeout_ms)
                } else {
                    ProbeFailure::Unreachable(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(ProbeFailure::Unreachable(format!(
                "connectivity endpoint returned {}",
                response.status()
            )));
        }

        Ok(start.elapsed().as_secs_f64() * 1000.0)
    }
}

impl ProbeStrategy for HttpProbe {
    fn source(&self) -> &'static str {
        "http"
    }

    async fn check_connectivity(&self) -> Result<ConnectivityCheck, ProbeFailure> {
        let samples = self.config.ping_samples.max(1);
        let mut rtts = Vec::with_capacity(samples as usize);
        let mut lost = 0u32;

        for _ in 0..samples {
            match self.ping_once().await {
                Ok(rtt_ms) => rtts.push(rtt_ms),
                Err(e) => {
                    debug!("Connectivity ping failed: {}", e);
                    lost += 1;
                }
            }
        }

        // All pings lost means the link is down, not a noisy sample.
        if rtts.is_empty() {
            return Err(ProbeFailure::Unreachable(format!(
                "all {} reachability requests failed",
                samples
            )));
        }

        let (latency_ms, jitter_ms) = burst_stats(&rtts);
        let packet_loss_percent = Some(lost as f64 / samples as f64 * 100.0);

        Ok(ConnectivityCheck {
            latency_ms,
            jitter_ms,
            packet_loss_percent,
        })
    }

    async fn measure_download(&self) -> Result<f64, ProbeFailure> {
        let timeout = Duration::from_millis(self.config.download_timeout_ms);
        let start = Instant::now();

        let response = self
            .client
            .get(&self.config.download_url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProbeFailure::Timeout(self.config.download_timeout_ms)
                } else {
                    ProbeFailure::Transfer(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(ProbeFailure::Transfer(format!(
                "download endpoint returned {}",
                response.status()
            )));
        }

        let body = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                ProbeFailure::Timeout(self.config.download_timeout_ms)
            } else {
                ProbeFailure::Transfer(e.to_string())
            }
        })?;

        let elapsed = start.elapsed().as_secs_f64();
        let result = mbps(body.len(), elapsed);
        debug!(
            "Download: {} bytes in {:.2}s -> {:.2} Mbps",
            body.len(),
            elapsed,
            result
        );
        Ok(result)
    }

    async fn measure_upload(&self) -> Result<f64, ProbeFailure> {
        let mut payload = vec![0u8; self.config.upload_bytes];
        rand::thread_rng().fill_bytes(&mut payload);
        let bytes = payload.len();

        let timeout = Duration::from_millis(self.config.upload_timeout_ms);
        let start = Instant::now();

        let response = self
            .client
            .post(&self.config.upload_url)
            .timeout(timeout)
            .body(payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProbeFailure::Timeout(self.config.upload_timeout_ms)
                } else {
                    ProbeFailure::Transfer(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(ProbeFailure::Transfer(format!(
                "upload endpoint returned {}",
                response.status()
            )));
        }

        let elapsed = start.elapsed().as_secs_f64();
        let result = mbps(bytes, elapsed);
        debug!(
            "Upload: {} bytes in {:.2}s -> {:.2} Mbps",
            bytes, elapsed, result
        );
        Ok(result)
    }
}

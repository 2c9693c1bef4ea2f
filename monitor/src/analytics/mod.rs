//! Window analytics
//!
//! `compute_summary` reduces an arbitrary window of measurements to
//! uptime/downtime/speed statistics. It is a pure function: no side effects,
//! deterministic for any ordering of the input (the window is sorted
//! internally).

use crate::config::{AnalyticsConfig, ThresholdsConfig};
use model::{Downtime, Measurement, MetricStats, SpeedDrop, Summary, round2, round2_opt};

/// Running min/max/sum for one metric over accepted samples.
#[derive(Default)]
struct Accumulator {
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
}

impl Accumulator {
    fn accept(&mut self, value: f64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.count += 1;
        self.sum += value;
    }

    fn stats(&self) -> MetricStats {
        if self.count == 0 {
            return MetricStats::default();
        }
        MetricStats {
            min: round2_opt(Some(self.min)),
            max: round2_opt(Some(self.max)),
            avg: round2_opt(Some(self.sum / self.count as f64)),
        }
    }
}

/// A reading is usable only when finite, positive and below the realism
/// ceiling; anything else is an outlier and must not pollute aggregates.
fn passes_realism(value: f64, ceiling: f64) -> bool {
    value.is_finite() && value > 0.0 && value <= ceiling
}

pub fn compute_summary(
    measurements: &[Measurement],
    thresholds: &ThresholdsConfig,
    analytics: &AnalyticsConfig,
) -> Summary {
    if measurements.is_empty() {
        return Summary::empty();
    }

    // Never assume caller order; sort a copy by the primary ordering key.
    let mut window: Vec<&Measurement> = measurements.iter().collect();
    window.sort_by_key(|m| m.timestamp_ms);

    let mut online_samples = 0u64;
    let mut offline_samples = 0u64;
    let mut downtime = Downtime::default();
    let mut previous_was_offline = false;

    let mut download = Accumulator::default();
    let mut upload = Accumulator::default();
    let mut latency = Accumulator::default();

    let mut last_online_download: Option<f64> = None;
    let mut drops: Vec<SpeedDrop> = Vec::new();

    for m in window {
        if !m.is_online() {
            // Offline and degraded rows both carry a downtime proxy and no
            // usable speed fields.
            offline_samples += 1;
            downtime.duration_ms += m
                .estimated_downtime_ms
                .unwrap_or(if m.duration_since_last_ms > 0 {
                    m.duration_since_last_ms
                } else {
                    analytics.fallback_interval_ms
                });
            if !previous_was_offline {
                downtime.events += 1;
            }
            previous_was_offline = true;
            continue;
        }

        online_samples += 1;
        previous_was_offline = false;

        if let Some(mbps) = m.download_mbps {
            if passes_realism(mbps, thresholds.max_realistic_download_mbps) {
                download.accept(mbps);

                if let Some(previous) = last_online_download {
                    let drop_mbps = previous - mbps;
                    let drop_percent = if previous > 0.0 {
                        drop_mbps / previous * 100.0
                    } else {
                        0.0
                    };

                    if drop_mbps >= thresholds.speed_drop_mbps
                        || drop_percent >= thresholds.speed_drop_percent
                    {
                        // Bounded response size: once capped, further drops
                        // are not recorded and the count stays at the cap.
                        if drops.len() < analytics.max_drop_events {
                            drops.push(SpeedDrop {
                                timestamp_ms: m.timestamp_ms,
                                previous_mbps: round2(previous),
                                current_mbps: round2(mbps),
                                drop_mbps: round2(drop_mbps),
                                drop_percent: round2(drop_percent),
                            });
                        }
                    }
                }

                last_online_download = Some(mbps);
            }
        }

        if let Some(mbps) = m.upload_mbps {
            if passes_realism(mbps, thresholds.max_realistic_upload_mbps) {
                upload.accept(mbps);
            }
        }

        // Latency has no upper-bound filter; any finite positive value counts.
        if let Some(ms) = m.latency_ms {
            if ms.is_finite() && ms > 0.0 {
                latency.accept(ms);
            }
        }
    }

    let total_samples = measurements.len() as u64;
    let uptime_percent = round2_opt(Some(online_samples as f64 / total_samples as f64 * 100.0));

    Summary {
        total_samples,
        online_samples,
        offline_samples,
        uptime_percent,
        downtime,
        download: download.stats(),
        upload: upload.stats(),
        latency: latency.stats(),
        speed_drops: model::SpeedDrops {
            count: drops.len() as u64,
            events: drops,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::ConnectionStatus;

    fn thresholds() -> ThresholdsConfig {
        ThresholdsConfig {
            speed_drop_mbps: 15.0,
            speed_drop_percent: 30.0,
            ..Default::default()
        }
    }

    fn analytics() -> AnalyticsConfig {
        AnalyticsConfig::default()
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
    fn empty_window_yields_canonical_zero_summary() {
        let summary = compute_summary(&[], &thresholds(), &analytics());
        assert_eq!(summary, Summary::empty());
        assert_eq!(summary.uptime_percent, None);
    }

    #[test]
    fn summary_is_order_independent() {
        let measurements = vec![
            online(1_000, 100.0),
            offline(2_000),
            online(3_000, 80.0),
            online(4_000, 95.0),
            offline(5_000),
        ];

        let sorted = compute_summary(&measurements, &thresholds(), &analytics());

        let mut shuffled = measurements.clone();
        shuffled.swap(0, 4);
        shuffled.swap(1, 3);
        let summary = compute_summary(&shuffled, &thresholds(), &analytics());

        assert_eq!(summary, sorted);
    }

    #[test]
    fn outlier_download_does_not_affect_stats() {
        let mut implausible = online(2_000, 2_000.0);
        implausible.upload_mbps = Some(30.0);

        let measurements = vec![online(1_000, 100.0), implausible, online(3_000, 90.0)];
        let summary = compute_summary(&measurements, &thresholds(), &analytics());

        // default ceiling is 1000 Mbps
        assert_eq!(summary.download.max, Some(100.0));
        assert_eq!(summary.download.min, Some(90.0));
        assert_eq!(summary.download.avg, Some(95.0));
        // the outlier row itself still counts as an online sample
        assert_eq!(summary.online_samples, 3);
        assert_eq!(summary.upload.avg, Some(30.0));
    }

    #[test]
    fn absolute_threshold_records_one_drop() {
        let measurements = vec![online(1_000, 100.0), online(2_000, 80.0)];
        let summary = compute_summary(&measurements, &thresholds(), &analytics());

        assert_eq!(summary.speed_drops.count, 1);
        let drop = &summary.speed_drops.events[0];
        assert_eq!(drop.drop_mbps, 20.0);
        assert_eq!(drop.drop_percent, 20.0);
        assert_eq!(drop.previous_mbps, 100.0);
        assert_eq!(drop.current_mbps, 80.0);
    }

    #[test]
    fn percent_threshold_records_one_drop() {
        let mut config = thresholds();
        config.speed_drop_mbps = 100.0; // absolute side cannot trigger

        let measurements = vec![online(1_000, 100.0), online(2_000, 60.0)];
        let summary = compute_summary(&measurements, &config, &analytics());

        assert_eq!(summary.speed_drops.count, 1);
        assert_eq!(summary.speed_drops.events[0].drop_percent, 40.0);
    }

    #[test]
    fn small_dip_records_nothing() {
        let measurements = vec![online(1_000, 100.0), online(2_000, 95.0)];
        let summary = compute_summary(&measurements, &thresholds(), &analytics());
        assert_eq!(summary.speed_drops.count, 0);
    }

    #[test]
    fn downtime_counts_runs_not_samples() {
        let measurements = vec![
            online(1_000, 100.0),
            offline(2_000),
            offline(3_000),
            online(4_000, 100.0),
            offline(5_000),
        ];
        let summary = compute_summary(&measurements, &thresholds(), &analytics());

        assert_eq!(summary.downtime.events, 2);
        assert_eq!(summary.downtime.duration_ms, 3 * 60_000);
        assert_eq!(summary.offline_samples, 3);
        assert_eq!(summary.online_samples, 2);
        assert_eq!(summary.uptime_percent, Some(40.0));
    }

    #[test]
    fn degraded_rows_join_the_downtime_branch() {
        let degraded = Measurement::new(ConnectionStatus::Degraded, 2_000, 60_000);
        let measurements = vec![online(1_000, 100.0), degraded, online(3_000, 100.0)];
        let summary = compute_summary(&measurements, &thresholds(), &analytics());

        assert_eq!(summary.offline_samples, 1);
        assert_eq!(summary.downtime.events, 1);
        assert_eq!(summary.downtime.duration_ms, 60_000);
        // no speed drop: the degraded row has no download sample
        assert_eq!(summary.speed_drops.count, 0);
    }

    #[test]
    fn drop_events_cap_at_fifty() {
        // 100 alternating samples: 100, 50, 100, 50, ... every transition in
        // either direction of 50 Mbps crosses the 15 Mbps threshold downward
        // on odd samples only.
        let mut measurements = Vec::new();
        for i in 0..100 {
            let mbps = if i % 2 == 0 { 100.0 } else { 50.0 };
            measurements.push(online(1_000 * (i as i64 + 1), mbps));
        }

        let summary = compute_summary(&measurements, &thresholds(), &analytics());
        assert_eq!(summary.speed_drops.count, 50);
        assert_eq!(summary.speed_drops.events.len(), 50);
    }

    #[test]
    fn fallback_interval_covers_rows_without_duration() {
        let mut m = offline(1_000);
        m.estimated_downtime_ms = None;
        m.duration_since_last_ms = 0;

        let summary = compute_summary(&[m], &thresholds(), &analytics());
        assert_eq!(summary.downtime.duration_ms, 60_000);
    }

    #[test]
    fn latency_has_no_upper_bound_filter() {
        let mut slow = online(1_000, 100.0);
        slow.latency_ms = Some(12_000.0);
        let mut fast = online(2_000, 100.0);
        fast.latency_ms = Some(10.0);

        let summary = compute_summary(&[slow, fast], &thresholds(), &analytics());
        assert_eq!(summary.latency.max, Some(12_000.0));
        assert_eq!(summary.latency.min, Some(10.0));
    }
}

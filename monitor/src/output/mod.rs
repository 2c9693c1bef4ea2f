//! Console output and CSV export

use anyhow::Result;
use model::{Event, EventKind, Measurement, Summary};
use std::path::Path;

fn format_time(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms)
        .map(|dt| dt.with_timezone(&chrono::Local).format("%H:%M:%S").to_string())
        .unwrap_or_else(|| timestamp_ms.to_string())
}

fn format_mbps(value: Option<f64>) -> String {
    value
        .map(|v| format!("{:.2} Mbps", v))
        .unwrap_or_else(|| "-".to_string())
}

pub fn print_measurement(m: &Measurement) {
    match &m.error {
        Some(error) => {
            println!(
                "[{}] {:<8} {}",
                format_time(m.timestamp_ms),
                m.status,
                error.message
            );
        }
        None => {
            println!(
                "[{}] {:<8} down {}  up {}  rtt {}",
                format_time(m.timestamp_ms),
                m.status,
                format_mbps(m.download_mbps),
                format_mbps(m.upload_mbps),
                m.latency_ms
                    .map(|v| format!("{:.1} ms", v))
                    .unwrap_or_else(|| "-".to_string()),
            );
        }
    }
}

pub fn print_event(event: &Event) {
    let time = format_time(event.timestamp_ms);
    match &event.kind {
        EventKind::ConnectionLost => println!("[{}] EVENT connection lost", time),
        EventKind::ConnectionRestored { offline_for_ms } => match offline_for_ms {
            Some(ms) => println!("[{}] EVENT connection restored after {:.1}s", time, *ms as f64 / 1000.0),
            None => println!("[{}] EVENT connection restored", time),
        },
        EventKind::SpeedDegradation {
            previous_mbps,
            current_mbps,
            drop_percent,
            ..
        } => println!(
            "[{}] EVENT speed degradation {:.2} -> {:.2} Mbps (-{:.1}%)",
            time, previous_mbps, current_mbps, drop_percent
        ),
        EventKind::SpeedImproved {
            previous_mbps,
            current_mbps,
            gain_percent,
            ..
        } => println!(
            "[{}] EVENT speed improved {:.2} -> {:.2} Mbps (+{:.1}%)",
            time, previous_mbps, current_mbps, gain_percent
        ),
    }
}

pub fn print_summary(summary: &Summary) {
    println!("Samples:   {} total, {} online, {} offline",
        summary.total_samples, summary.online_samples, summary.offline_samples);
    println!(
        "Uptime:    {}",
        summary
            .uptime_percent
            .map(|v| format!("{:.2}%", v))
            .unwrap_or_else(|| "-".to_string())
    );
    println!(
        "Downtime:  {} episodes, {:.1}s total",
        summary.downtime.events,
        summary.downtime.duration_ms as f64 / 1000.0
    );

    for (name, stats) in [
        ("Download", &summary.download),
        ("Upload", &summary.upload),
        ("Latency", &summary.latency),
    ] {
        let unit = if name == "Latency" { "ms" } else { "Mbps" };
        match (stats.min, stats.max, stats.avg) {
            (Some(min), Some(max), Some(avg)) => println!(
                "{:<9}  min {:.2} / avg {:.2} / max {:.2} {}",
                format!("{}:", name),
                min,
                avg,
                max,
                unit
            ),
            _ => println!("{:<9}  no accepted samples", format!("{}:", name)),
        }
    }

    println!("Drops:     {} recorded", summary.speed_drops.count);
    for drop in &summary.speed_drops.events {
        println!(
            "  [{}] {:.2} -> {:.2} Mbps (-{:.1}%)",
            format_time(drop.timestamp_ms),
            drop.previous_mbps,
            drop.current_mbps,
            drop.drop_percent
        );
    }
}

/// Export measurements as CSV
pub fn export_csv(measurements: &[Measurement], output_path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(output_path)?;

    writer.write_record([
        "timestamp_ms",
        "status",
        "download_mbps",
        "upload_mbps",
        "latency_ms",
        "jitter_ms",
        "packet_loss_percent",
        "duration_since_last_ms",
        "estimated_downtime_ms",
        "error_code",
        "error_message",
    ])?;

    for m in measurements {
        writer.write_record([
            m.timestamp_ms.to_string(),
            m.status.as_str().to_string(),
            m.download_mbps.map(|v| format!("{:.2}", v)).unwrap_or_default(),
            m.upload_mbps.map(|v| format!("{:.2}", v)).unwrap_or_default(),
            m.latency_ms.map(|v| format!("{:.2}", v)).unwrap_or_default(),
            m.jitter_ms.map(|v| format!("{:.2}", v)).unwrap_or_default(),
            m.packet_loss_percent
                .map(|v| format!("{:.2}", v))
                .unwrap_or_default(),
            m.duration_since_last_ms.to_string(),
            m.estimated_downtime_ms
                .map(|v| v.to_string())
                .unwrap_or_default(),
            m.error
                .as_ref()
                .map(|e| format!("{:?}", e.code))
                .unwrap_or_default(),
            m.error.as_ref().map(|e| e.message.clone()).unwrap_or_default(),
        ])?;
    }

    writer.flush()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::ConnectionStatus;

    #[test]
    fn csv_export_writes_one_row_per_measurement() {
        let dir = std::env::temp_dir().join("linkpulse-test-export");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("export.csv");

        let mut online = Measurement::new(ConnectionStatus::Online, 1_000, 60_000);
        online.download_mbps = Some(94.5);
        let offline = Measurement::new(ConnectionStatus::Offline, 2_000, 60_000);

        export_csv(&[online, offline], &path).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3); // header + 2 rows
        assert!(lines[1].contains("online"));
        assert!(lines[2].contains("offline"));

        std::fs::remove_file(&path).ok();
    }
}

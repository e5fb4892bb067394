//! Recorded position samples for replay
//!
//! A samples file is a JSON array of `{"lat": .., "lon": .., "ts": ..}`
//! objects. `ts` is optional; missing timestamps are spaced one second apart
//! starting from the load time.

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use route_tracker::{RawPosition, Timestamp};
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct SampleRecord {
    lat: f64,
    lon: f64,
    #[serde(default)]
    ts: Option<Timestamp>,
}

/// Parse samples from JSON text
pub fn parse_samples(content: &str) -> Result<Vec<RawPosition>> {
    let records: Vec<SampleRecord> =
        serde_json::from_str(content).context("Samples must be a JSON array of {lat, lon, ts?}")?;

    let base = Utc::now();
    Ok(records
        .into_iter()
        .enumerate()
        .map(|(i, record)| {
            let ts = record
                .ts
                .unwrap_or_else(|| base + Duration::seconds(i as i64));
            RawPosition::new(record.lat, record.lon, ts)
        })
        .collect())
}

/// Load samples from a file
pub fn load_samples(path: &Path) -> Result<Vec<RawPosition>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read samples file: {:?}", path))?;

    let samples =
        parse_samples(&content).with_context(|| format!("Failed to parse samples file: {:?}", path))?;

    log::info!("Loaded {} sample(s) from {:?}", samples.len(), path);
    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_and_without_timestamps() {
        let json = r#"[
            {"lat": 41.0, "lon": 29.0, "ts": "2024-05-17T12:00:00Z"},
            {"lat": 41.001, "lon": 29.001},
            {"lat": 41.002, "lon": 29.002}
        ]"#;

        let samples = parse_samples(json).unwrap();
        assert_eq!(samples.len(), 3);
        assert_eq!(samples[0].timestamp.to_rfc3339(), "2024-05-17T12:00:00+00:00");
        assert_eq!(samples[2].timestamp - samples[1].timestamp, Duration::seconds(1));
    }

    #[test]
    fn test_out_of_range_values_pass_through() {
        // Validation is the controller's job; the replay must not hide bad input
        let samples = parse_samples(r#"[{"lat": 95.0, "lon": 0.0}]"#).unwrap();
        assert_eq!(samples[0].latitude, 95.0);
    }

    #[test]
    fn test_rejects_non_array() {
        assert!(parse_samples(r#"{"lat": 1.0}"#).is_err());
    }
}

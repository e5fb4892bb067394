//! Route reports
//!
//! Prints the stored route as a table and exports it as JSON.

use anyhow::{Context, Result};
use route_tracker::{route_distance_m, Fix};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Render the route as an ASCII table with per-leg distances
pub fn render_route(route: &[Fix]) -> String {
    let mut out = String::new();
    out.push_str("   #     latitude    longitude  time (UTC)              leg (m)\n");
    out.push_str("───────────────────────────────────────────────────────────────\n");

    let mut previous: Option<&Fix> = None;
    for (index, fix) in route.iter().enumerate() {
        let leg = previous.map_or(0.0, |p| p.distance_to(fix));
        out.push_str(&format!(
            "{:>4}  {:>11.6}  {:>11.6}  {}  {:>9.1}\n",
            index + 1,
            fix.latitude(),
            fix.longitude(),
            fix.timestamp().format("%Y-%m-%d %H:%M:%S"),
            leg
        ));
        previous = Some(fix);
    }

    out.push_str("───────────────────────────────────────────────────────────────\n");
    out.push_str(&format!(
        "{} fix(es), {:.3} km\n",
        route.len(),
        route_distance_m(route) / 1000.0
    ));
    out
}

/// Write the route to `path` as a pretty-printed JSON array
pub fn export_json(route: &[Fix], path: &Path) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("Failed to create export file: {:?}", path))?;
    let mut writer = BufWriter::new(file);

    serde_json::to_writer_pretty(&mut writer, route).context("Failed to serialize route")?;
    writeln!(writer)?;
    writer.flush()?;

    log::info!("Exported {} fix(es) to {:?}", route.len(), path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn route() -> Vec<Fix> {
        let t0 = Utc.with_ymd_and_hms(2024, 5, 17, 12, 0, 0).unwrap();
        vec![
            Fix::new(41.0, 29.0, t0).unwrap(),
            Fix::new(41.01, 29.0, t0 + Duration::seconds(60)).unwrap(),
        ]
    }

    #[test]
    fn test_render_route() {
        let text = render_route(&route());
        assert!(text.contains("   1    41.000000    29.000000  2024-05-17 12:00:00"));
        assert!(text.contains("2 fix(es), 1.112 km"));
    }

    #[test]
    fn test_export_round_trips_through_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("route.json");
        export_json(&route(), &path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let back: Vec<Fix> = serde_json::from_str(&content).unwrap();
        assert_eq!(back, route());
    }
}

//! Standalone route replay demo
//!
//! Replays a synthetic walk through the tracking controller against an
//! in-memory store and prints the events and the resulting route.
//!
//! Usage:
//!   replay_route [--threshold <metres>] [--signal-loss-after <count>]
//!
//! Example:
//!   replay_route --threshold 50 --signal-loss-after 12

use chrono::{Duration as ChronoDuration, Utc};
use route_tracker::{
    route_distance_m, EventBus, RawPosition, ReplaySource, RouteStore, TrackerConfig,
    TrackingController, TrackingEvent,
};
use std::env;
use std::sync::Arc;
use std::time::Duration;

/// A walk heading north-east with a pause in the middle and one bad sample
fn synthetic_walk() -> Vec<RawPosition> {
    let start = Utc::now();
    let mut samples = Vec::new();
    let (mut lat, mut lon) = (41.0082, 28.9784);

    for i in 0..20 {
        // Standing still between samples 8 and 12
        if !(8..12).contains(&i) {
            lat += 0.0004;
            lon += 0.0003;
        }
        samples.push(RawPosition::new(lat, lon, start + ChronoDuration::seconds(i * 5)));
    }

    samples.insert(15, RawPosition::new(f64::NAN, lon, start));
    samples
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let mut threshold = 30.0;
    let mut fail_after = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--threshold" if i + 1 < args.len() => {
                threshold = args[i + 1].parse()?;
                i += 2;
            }
            "--signal-loss-after" if i + 1 < args.len() => {
                fail_after = Some(args[i + 1].parse()?);
                i += 2;
            }
            other => {
                eprintln!("Unknown argument: {}", other);
                eprintln!("Usage: replay_route [--threshold <metres>] [--signal-loss-after <count>]");
                std::process::exit(1);
            }
        }
    }

    let mut source = ReplaySource::new(synthetic_walk()).with_pacing(Duration::from_millis(10));
    if let Some(count) = fail_after {
        source = source.with_failure_after(count);
    }
    let source = Arc::new(source);

    let config = TrackerConfig::default().with_min_displacement(threshold);
    let controller = TrackingController::new(
        config,
        RouteStore::in_memory(),
        source.clone(),
        EventBus::new(256),
    )?;
    let events = controller.bus().subscribe();

    println!("=== REPLAYING {} SAMPLES (threshold {}m) ===", source.len(), threshold);
    controller.start()?;
    if !source.wait_until_finished(Duration::from_secs(10)) {
        eprintln!("Replay did not finish in time");
    }
    controller.stop()?;

    for event in events.drain() {
        match &event {
            TrackingEvent::StateChanged { .. } | TrackingEvent::TrackingInterrupted { .. } => {
                println!("{}", event)
            }
            _ => println!("  {}", event),
        }
    }

    let route = controller.route()?;
    let stats = controller.stats();
    println!("\n=== SUMMARY ===");
    println!("Accepted: {}", stats.accepted);
    println!("Filtered: {}", stats.filtered);
    println!("Rejected: {}", stats.rejected);
    println!("Route:    {} fix(es), {:.1} m", route.len(), route_distance_m(&route));

    Ok(())
}

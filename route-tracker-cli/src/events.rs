//! Console rendering of tracking events and the activity indicator

use route_tracker::{ActivityIndicator, TrackingEvent};

/// Prints the ongoing-activity notice the host would show as a notification
pub struct ConsoleIndicator;

impl ActivityIndicator for ConsoleIndicator {
    fn show(&self) {
        println!("● Location tracking active");
    }

    fn hide(&self) {
        println!("○ Location tracking paused");
    }
}

/// One console line per event
pub fn format_event(event: &TrackingEvent) -> String {
    match event {
        TrackingEvent::FixAccepted(fix) => format!(
            "  ✓ {:>11.6} {:>12.6}  {}",
            fix.latitude(),
            fix.longitude(),
            fix.timestamp().format("%Y-%m-%d %H:%M:%S")
        ),
        TrackingEvent::FixDropped { fix, error } => {
            format!("  ✗ dropped {:.6},{:.6}: {}", fix.latitude(), fix.longitude(), error)
        }
        TrackingEvent::FixRejected {
            latitude,
            longitude,
            reason,
        } => format!("  ⚠ rejected {},{}: {}", latitude, longitude, reason),
        TrackingEvent::TrackingInterrupted { reason } => {
            format!("⚠️  Tracking interrupted: {}", reason)
        }
        TrackingEvent::RouteReset => "Route reset".to_string(),
        TrackingEvent::StateChanged { from, to } => format!("[{} → {}]", from, to),
    }
}

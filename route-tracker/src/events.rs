//! Events published to subscribers of the tracking core

use crate::types::{Fix, InterruptReason, StorageError, TrackingState};
use std::fmt;

/// Everything a subscriber (map view, watchdog, analytics) can observe
#[derive(Debug, Clone, PartialEq)]
pub enum TrackingEvent {
    /// A fix passed the filter and was persisted
    FixAccepted(Fix),

    /// Acquisition could not start or was lost mid-session
    TrackingInterrupted { reason: InterruptReason },

    /// A fix was accepted but could not be persisted after retrying
    FixDropped { fix: Fix, error: StorageError },

    /// A raw sample had out-of-range coordinates
    FixRejected {
        latitude: f64,
        longitude: f64,
        reason: String,
    },

    /// The route was cleared
    RouteReset,

    /// The controller moved between lifecycle states
    StateChanged {
        from: TrackingState,
        to: TrackingState,
    },
}

impl TrackingEvent {
    /// The fix carried by this event, if any
    pub fn fix(&self) -> Option<&Fix> {
        match self {
            TrackingEvent::FixAccepted(fix) => Some(fix),
            TrackingEvent::FixDropped { fix, .. } => Some(fix),
            _ => None,
        }
    }

    pub fn is_fix_accepted(&self) -> bool {
        matches!(self, TrackingEvent::FixAccepted(_))
    }
}

impl fmt::Display for TrackingEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackingEvent::FixAccepted(fix) => write!(f, "fix accepted: {}", fix),
            TrackingEvent::TrackingInterrupted { reason } => {
                write!(f, "tracking interrupted: {}", reason)
            }
            TrackingEvent::FixDropped { fix, error } => {
                write!(f, "fix dropped: {} ({})", fix, error)
            }
            TrackingEvent::FixRejected {
                latitude,
                longitude,
                reason,
            } => write!(f, "fix rejected: {},{} ({})", latitude, longitude, reason),
            TrackingEvent::RouteReset => write!(f, "route reset"),
            TrackingEvent::StateChanged { from, to } => write!(f, "state {} -> {}", from, to),
        }
    }
}

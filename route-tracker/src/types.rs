//! Core types for the route tracker library
//!
//! This module defines the fundamental values that flow through the tracking
//! pipeline: validated position fixes, the lifecycle state, and the error
//! taxonomy shared by every component.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Timestamp type used throughout the tracker
pub type Timestamp = DateTime<Utc>;

/// Result type for tracker operations
pub type Result<T> = std::result::Result<T, TrackerError>;

/// Mean Earth radius in metres (IUGG)
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Decimal places kept when comparing coordinates for duplicates
const COORDINATE_PRECISION: f64 = 1e7;

/// A single validated position fix
///
/// Latitude is always within [-90, 90] and longitude within [-180, 180].
/// The only ways to obtain a `Fix` are [`Fix::new`] and deserialization,
/// both of which enforce the range check.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "FixRecord", into = "FixRecord")]
pub struct Fix {
    latitude: f64,
    longitude: f64,
    timestamp: Timestamp,
}

/// Wire shape of a fix, before validation
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct FixRecord {
    lat: f64,
    lon: f64,
    ts: Timestamp,
}

impl Fix {
    /// Build a fix, rejecting out-of-range or non-finite coordinates
    pub fn new(latitude: f64, longitude: f64, timestamp: Timestamp) -> Result<Self> {
        let lat_ok = latitude.is_finite() && (-90.0..=90.0).contains(&latitude);
        let lon_ok = longitude.is_finite() && (-180.0..=180.0).contains(&longitude);

        if !lat_ok || !lon_ok {
            return Err(TrackerError::MalformedFix {
                latitude,
                longitude,
            });
        }

        Ok(Self {
            latitude,
            longitude,
            timestamp,
        })
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// Great-circle distance to another fix in metres
    pub fn distance_to(&self, other: &Fix) -> f64 {
        haversine_distance_m(
            (self.latitude, self.longitude),
            (other.latitude, other.longitude),
        )
    }

    /// True if both fixes round to the same coordinates (7 decimal places)
    pub fn same_position(&self, other: &Fix) -> bool {
        round_coordinate(self.latitude) == round_coordinate(other.latitude)
            && round_coordinate(self.longitude) == round_coordinate(other.longitude)
    }
}

impl TryFrom<FixRecord> for Fix {
    type Error = TrackerError;

    fn try_from(record: FixRecord) -> Result<Self> {
        Fix::new(record.lat, record.lon, record.ts)
    }
}

impl From<Fix> for FixRecord {
    fn from(fix: Fix) -> Self {
        Self {
            lat: fix.latitude,
            lon: fix.longitude,
            ts: fix.timestamp,
        }
    }
}

impl fmt::Display for Fix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.6},{:.6} @ {}",
            self.latitude,
            self.longitude,
            self.timestamp.to_rfc3339()
        )
    }
}

fn round_coordinate(value: f64) -> i64 {
    (value * COORDINATE_PRECISION).round() as i64
}

/// Haversine distance between two (latitude, longitude) pairs in degrees
pub fn haversine_distance_m(a: (f64, f64), b: (f64, f64)) -> f64 {
    let (lat1, lon1) = (a.0.to_radians(), a.1.to_radians());
    let (lat2, lon2) = (b.0.to_radians(), b.1.to_radians());

    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}

/// Sum of leg distances along a route, in metres
pub fn route_distance_m(route: &[Fix]) -> f64 {
    route.windows(2).map(|w| w[0].distance_to(&w[1])).sum()
}

/// Lifecycle state of the tracking controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackingState {
    /// Never started in this process
    Idle,
    /// Position updates requested, waiting for the first delivery
    Acquiring,
    /// Receiving and recording fixes
    Tracking,
    /// Stopped by request or by an interruption; restartable
    Stopped,
}

impl TrackingState {
    /// True while a position subscription is (being) held
    pub fn is_active(&self) -> bool {
        matches!(self, TrackingState::Acquiring | TrackingState::Tracking)
    }
}

impl fmt::Display for TrackingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackingState::Idle => write!(f, "Idle"),
            TrackingState::Acquiring => write!(f, "Acquiring"),
            TrackingState::Tracking => write!(f, "Tracking"),
            TrackingState::Stopped => write!(f, "Stopped"),
        }
    }
}

/// Why a tracking session was interrupted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterruptReason {
    /// Location permission was denied or revoked
    PermissionDenied,
    /// Signal or hardware unavailable
    AcquisitionUnavailable(String),
}

impl fmt::Display for InterruptReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterruptReason::PermissionDenied => write!(f, "permission denied"),
            InterruptReason::AcquisitionUnavailable(msg) => {
                write!(f, "acquisition unavailable: {}", msg)
            }
        }
    }
}

/// Storage failure category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageErrorKind {
    /// The substrate could not be read or written
    IoFailure,
    /// Stored data could not be interpreted
    Corrupt,
}

impl fmt::Display for StorageErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageErrorKind::IoFailure => write!(f, "I/O failure"),
            StorageErrorKind::Corrupt => write!(f, "corrupt data"),
        }
    }
}

/// Errors raised by the persistence layer
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("storage {kind}: {message}")]
pub struct StorageError {
    pub kind: StorageErrorKind,
    pub message: String,
}

impl StorageError {
    pub fn io(message: impl Into<String>) -> Self {
        Self {
            kind: StorageErrorKind::IoFailure,
            message: message.into(),
        }
    }

    pub fn corrupt(message: impl Into<String>) -> Self {
        Self {
            kind: StorageErrorKind::Corrupt,
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::io(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_io() {
            StorageError::io(err.to_string())
        } else {
            StorageError::corrupt(err.to_string())
        }
    }
}

/// Errors that can occur while tracking
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TrackerError {
    #[error("Malformed fix: latitude {latitude}, longitude {longitude} out of range")]
    MalformedFix { latitude: f64, longitude: f64 },

    #[error("Location permission denied")]
    PermissionDenied,

    #[error("Position acquisition unavailable: {0}")]
    AcquisitionUnavailable(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

//! Tracker configuration types
//!
//! This module defines the configuration surface of the tracking core: the
//! cadence requested from the position source, the fix filter thresholds,
//! and event bus sizing. Everything has a default matching a high-accuracy,
//! displacement-gated recording policy.

use crate::types::{Result, TrackerError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the tracking controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Cadence and priority requested from the position source
    #[serde(default)]
    pub location: LocationRequest,

    /// Fix acceptance thresholds
    #[serde(default)]
    pub filter: FilterConfig,

    /// Event bus sizing
    #[serde(default)]
    pub bus: BusConfig,

    /// Immediate retries after a failed append before the fix is dropped
    #[serde(default = "default_append_retries")]
    pub append_retries: u32,
}

fn default_append_retries() -> u32 {
    1
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            location: LocationRequest::default(),
            filter: FilterConfig::default(),
            bus: BusConfig::default(),
            append_retries: default_append_retries(),
        }
    }
}

/// Requested accuracy / power trade-off
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    #[default]
    HighAccuracy,
    Balanced,
    LowPower,
}

/// Position update request passed to the acquisition subsystem
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationRequest {
    /// Nominal update interval in milliseconds (default: 10000ms)
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Fastest acceptable update interval in milliseconds (default: 500ms)
    #[serde(default = "default_fastest_interval_ms")]
    pub fastest_interval_ms: u64,

    /// Smallest displacement in metres the source should report (default: 100m)
    #[serde(default = "default_min_displacement")]
    pub min_displacement_m: f64,

    #[serde(default)]
    pub priority: Priority,
}

fn default_interval_ms() -> u64 {
    10_000
}

fn default_fastest_interval_ms() -> u64 {
    500
}

fn default_min_displacement() -> f64 {
    100.0
}

impl Default for LocationRequest {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            fastest_interval_ms: default_fastest_interval_ms(),
            min_displacement_m: default_min_displacement(),
            priority: Priority::default(),
        }
    }
}

impl LocationRequest {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn fastest_interval(&self) -> Duration {
        Duration::from_millis(self.fastest_interval_ms)
    }
}

/// Thresholds applied by the fix filter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Minimum distance in metres between consecutive fixes (default: 100m)
    #[serde(default = "default_min_displacement")]
    pub min_displacement_m: f64,

    /// Optional: accept a closer fix anyway once this much time has passed
    #[serde(default)]
    pub min_interval_ms: Option<u64>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            min_displacement_m: default_min_displacement(),
            min_interval_ms: None,
        }
    }
}

/// Event bus sizing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusConfig {
    /// Pending events kept per subscriber before the oldest is dropped
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

/// Upper bound for the filter time gate (one year)
const MAX_MIN_INTERVAL_MS: u64 = 365 * 24 * 60 * 60 * 1000;

fn default_queue_capacity() -> usize {
    64
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl TrackerConfig {
    /// Create a new tracker configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set the minimum displacement for both the request and the filter
    pub fn with_min_displacement(mut self, metres: f64) -> Self {
        self.location.min_displacement_m = metres;
        self.filter.min_displacement_m = metres;
        self
    }

    /// Builder method: set the nominal and fastest update intervals
    pub fn with_intervals(mut self, interval: Duration, fastest: Duration) -> Self {
        self.location.interval_ms = interval.as_millis() as u64;
        self.location.fastest_interval_ms = fastest.as_millis() as u64;
        self
    }

    /// Builder method: enable the time gate in the fix filter
    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.filter.min_interval_ms = Some(interval.as_millis() as u64);
        self
    }

    /// Builder method: set the per-subscriber queue capacity
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.bus.queue_capacity = capacity;
        self
    }

    /// Builder method: set the number of immediate append retries
    pub fn with_append_retries(mut self, retries: u32) -> Self {
        self.append_retries = retries;
        self
    }

    /// Check that thresholds and sizes are usable
    pub fn validate(&self) -> Result<()> {
        let metres = self.filter.min_displacement_m;
        if !metres.is_finite() || metres < 0.0 {
            return Err(TrackerError::Config(format!(
                "min_displacement_m must be a non-negative number, got {}",
                metres
            )));
        }

        if let Some(ms) = self.filter.min_interval_ms {
            if ms > MAX_MIN_INTERVAL_MS {
                return Err(TrackerError::Config(format!(
                    "min_interval_ms must be at most {}, got {}",
                    MAX_MIN_INTERVAL_MS, ms
                )));
            }
        }

        if self.location.fastest_interval_ms > self.location.interval_ms {
            return Err(TrackerError::Config(format!(
                "fastest_interval_ms ({}) exceeds interval_ms ({})",
                self.location.fastest_interval_ms, self.location.interval_ms
            )));
        }

        if self.bus.queue_capacity == 0 {
            return Err(TrackerError::Config(
                "bus.queue_capacity must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

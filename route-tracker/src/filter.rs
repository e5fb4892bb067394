//! Fix acceptance policy
//!
//! Displacement is the primary gate: a candidate is kept when it is at least
//! `min_displacement_m` metres from the previously accepted fix. An optional
//! time gate lets a closer fix through once enough time has passed.

use crate::config::FilterConfig;
use crate::types::Fix;

/// Pure acceptance filter for candidate fixes
#[derive(Debug, Clone, PartialEq)]
pub struct FixFilter {
    min_displacement_m: f64,
    min_interval: Option<chrono::Duration>,
}

impl FixFilter {
    /// Filter with the given displacement threshold and no time gate
    pub fn new(min_displacement_m: f64) -> Self {
        Self {
            min_displacement_m,
            min_interval: None,
        }
    }

    pub fn from_config(config: &FilterConfig) -> Self {
        Self {
            min_displacement_m: config.min_displacement_m,
            min_interval: config.min_interval_ms.map(|ms| {
                chrono::Duration::milliseconds(i64::try_from(ms).unwrap_or(i64::MAX))
            }),
        }
    }

    /// Builder method: accept closer fixes once `interval` has elapsed
    pub fn with_min_interval(mut self, interval: chrono::Duration) -> Self {
        self.min_interval = Some(interval);
        self
    }

    pub fn min_displacement_m(&self) -> f64 {
        self.min_displacement_m
    }

    /// Decide whether `candidate` should follow `previous` in the route
    ///
    /// The threshold is inclusive: a candidate exactly `min_displacement_m`
    /// away is accepted.
    pub fn accept(&self, previous: Option<&Fix>, candidate: &Fix) -> bool {
        let Some(previous) = previous else {
            return true;
        };

        if previous.same_position(candidate) {
            return false;
        }

        if previous.distance_to(candidate) >= self.min_displacement_m {
            return true;
        }

        match self.min_interval {
            Some(interval) => candidate.timestamp() - previous.timestamp() >= interval,
            None => false,
        }
    }
}

impl Default for FixFilter {
    fn default() -> Self {
        Self::from_config(&FilterConfig::default())
    }
}

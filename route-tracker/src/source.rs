//! Position acquisition seam
//!
//! The acquisition subsystem is an external collaborator. It receives a
//! [`LocationRequest`] and a [`PositionSink`], and hands back a cancellable
//! [`PositionSubscription`]. Samples and failures flow back through the
//! sink from whatever thread the source runs on.
//!
//! [`ReplaySource`] plays back a fixed list of samples and is used by the
//! CLI and by tests.

use crate::config::LocationRequest;
use crate::types::{InterruptReason, Timestamp};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// An unvalidated sample as delivered by the acquisition subsystem
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawPosition {
    #[serde(rename = "lat")]
    pub latitude: f64,
    #[serde(rename = "lon")]
    pub longitude: f64,
    #[serde(rename = "ts")]
    pub timestamp: Timestamp,
}

impl RawPosition {
    pub fn new(latitude: f64, longitude: f64, timestamp: Timestamp) -> Self {
        Self {
            latitude,
            longitude,
            timestamp,
        }
    }
}

/// Failures reported by the acquisition subsystem
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    #[error("location permission denied")]
    PermissionDenied,

    #[error("position source unavailable: {0}")]
    Unavailable(String),
}

impl From<SourceError> for InterruptReason {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::PermissionDenied => InterruptReason::PermissionDenied,
            SourceError::Unavailable(msg) => InterruptReason::AcquisitionUnavailable(msg),
        }
    }
}

/// Receiver of deliveries routed through a [`PositionSink`]
///
/// `generation` identifies the subscription the delivery belongs to, so a
/// receiver can ignore anything from a subscription it already cancelled.
pub trait PositionHandler: Send + Sync {
    fn on_position(&self, generation: u64, position: RawPosition);

    fn on_error(&self, generation: u64, error: SourceError);
}

/// Delivery handle given to a position source
///
/// Holds only a weak reference to its receiver: once the receiver is gone,
/// deliveries are silently discarded.
#[derive(Clone)]
pub struct PositionSink {
    handler: Weak<dyn PositionHandler>,
    generation: u64,
}

impl PositionSink {
    pub fn new(handler: Weak<dyn PositionHandler>, generation: u64) -> Self {
        Self {
            handler,
            generation,
        }
    }

    pub fn deliver(&self, position: RawPosition) {
        if let Some(handler) = self.handler.upgrade() {
            handler.on_position(self.generation, position);
        }
    }

    pub fn fail(&self, error: SourceError) {
        if let Some(handler) = self.handler.upgrade() {
            handler.on_error(self.generation, error);
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl std::fmt::Debug for PositionSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PositionSink")
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

/// A live request for position updates
///
/// `cancel` is idempotent. Once it returns the source makes no further
/// deliveries on this subscription's sink.
pub trait PositionSubscription: Send {
    fn cancel(&mut self);
}

/// The acquisition subsystem
pub trait PositionSource: Send + Sync {
    /// Start delivering samples to `sink` at the requested cadence
    ///
    /// Authorization failures are reported as [`SourceError::PermissionDenied`],
    /// distinct from transport failures.
    fn request_updates(
        &self,
        request: &LocationRequest,
        sink: PositionSink,
    ) -> Result<Box<dyn PositionSubscription>, SourceError>;
}

#[derive(Debug, Default)]
struct ReplayProgress {
    delivered: usize,
    finished: bool,
    cancelled: bool,
}

#[derive(Debug, Default)]
struct ReplayShared {
    progress: Mutex<ReplayProgress>,
    changed: Condvar,
}

impl ReplayShared {
    fn lock(&self) -> MutexGuard<'_, ReplayProgress> {
        self.progress.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// Plays back a recorded list of samples on its own thread
///
/// Pacing defaults to the request's fastest interval. Permission denial and
/// a mid-session signal loss can be simulated.
#[derive(Debug)]
pub struct ReplaySource {
    samples: Vec<RawPosition>,
    pacing: Option<Duration>,
    deny_permission: bool,
    fail_after: Option<usize>,
    current: Mutex<Option<Arc<ReplayShared>>>,
}

impl ReplaySource {
    pub fn new(samples: Vec<RawPosition>) -> Self {
        Self {
            samples,
            pacing: None,
            deny_permission: false,
            fail_after: None,
            current: Mutex::new(None),
        }
    }

    /// Builder method: fixed delay between samples instead of the request cadence
    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = Some(pacing);
        self
    }

    /// Builder method: refuse every request as unauthorized
    pub fn with_permission_denied(mut self, denied: bool) -> Self {
        self.deny_permission = denied;
        self
    }

    /// Builder method: report signal loss after `count` samples were delivered
    pub fn with_failure_after(mut self, count: usize) -> Self {
        self.fail_after = Some(count);
        self
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Block until the latest replay ran out of samples, failed or was cancelled
    ///
    /// Returns false on timeout or if nothing was ever requested.
    pub fn wait_until_finished(&self, timeout: Duration) -> bool {
        let shared = match self
            .current
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
        {
            Some(shared) => shared,
            None => return false,
        };

        let deadline = Instant::now() + timeout;
        let mut progress = shared.lock();
        while !progress.finished {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            progress = shared
                .changed
                .wait_timeout(progress, deadline - now)
                .unwrap_or_else(|p| p.into_inner())
                .0;
        }
        true
    }

    pub fn is_finished(&self) -> bool {
        self.current
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .as_ref()
            .is_some_and(|shared| shared.lock().finished)
    }

    /// Samples handed to the sink by the latest replay
    pub fn delivered(&self) -> usize {
        self.current
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .as_ref()
            .map_or(0, |shared| shared.lock().delivered)
    }
}

impl PositionSource for ReplaySource {
    fn request_updates(
        &self,
        request: &LocationRequest,
        sink: PositionSink,
    ) -> Result<Box<dyn PositionSubscription>, SourceError> {
        if self.deny_permission {
            log::warn!("Replay source refusing request: permission denied");
            return Err(SourceError::PermissionDenied);
        }

        let pacing = self.pacing.unwrap_or_else(|| request.fastest_interval());
        let samples = self.samples.clone();
        let fail_after = self.fail_after;
        let shared = Arc::new(ReplayShared::default());
        *self.current.lock().unwrap_or_else(|p| p.into_inner()) = Some(shared.clone());

        log::debug!(
            "Replaying {} sample(s) every {:?} (generation {})",
            samples.len(),
            pacing,
            sink.generation()
        );

        let worker_shared = shared.clone();
        let worker = thread::Builder::new()
            .name("replay-source".to_string())
            .spawn(move || replay(samples, pacing, fail_after, sink, &worker_shared))
            .map_err(|e| SourceError::Unavailable(format!("failed to start replay: {}", e)))?;

        Ok(Box::new(ReplaySubscription {
            shared,
            worker: Some(worker),
        }))
    }
}

fn replay(
    samples: Vec<RawPosition>,
    pacing: Duration,
    fail_after: Option<usize>,
    sink: PositionSink,
    shared: &ReplayShared,
) {
    for (index, sample) in samples.into_iter().enumerate() {
        if index > 0 && !pacing.is_zero() {
            let progress = shared.lock();
            let (progress, _) = shared
                .changed
                .wait_timeout_while(progress, pacing, |p| !p.cancelled)
                .unwrap_or_else(|p| p.into_inner());
            drop(progress);
        }

        if shared.lock().cancelled {
            break;
        }

        if fail_after == Some(index) {
            sink.fail(SourceError::Unavailable("signal lost".to_string()));
            break;
        }

        sink.deliver(sample);
        shared.lock().delivered += 1;
    }

    shared.lock().finished = true;
    shared.changed.notify_all();
}

struct ReplaySubscription {
    shared: Arc<ReplayShared>,
    worker: Option<JoinHandle<()>>,
}

impl PositionSubscription for ReplaySubscription {
    fn cancel(&mut self) {
        self.shared.lock().cancelled = true;
        self.shared.changed.notify_all();

        if let Some(worker) = self.worker.take() {
            if worker.thread().id() != thread::current().id() && worker.join().is_err() {
                log::error!("Replay thread panicked");
            }
        }
    }
}

impl Drop for ReplaySubscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

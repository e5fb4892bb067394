//! Tracking controller
//!
//! Owns the lifecycle state machine and the ingestion pipeline:
//!
//! ```text
//! Idle ──start──▶ Acquiring ──first delivery──▶ Tracking
//!                    │                             │
//!      denied / unavailable               stop / interrupted
//!                    ▼                             ▼
//!                 Stopped ◀────────────────────────┘
//!                    │
//!                    └──start──▶ Acquiring
//! ```
//!
//! State, the subscription generation and the last accepted fix live behind
//! one mutex. A delivery holds that mutex from validation through publish,
//! and `stop` bumps the generation under it, so once `stop` returns no
//! delivery can still publish a `FixAccepted`. The position source itself is
//! never called with the mutex held.

use crate::bus::EventBus;
use crate::config::TrackerConfig;
use crate::events::TrackingEvent;
use crate::filter::FixFilter;
use crate::source::{
    PositionHandler, PositionSink, PositionSource, PositionSubscription, RawPosition, SourceError,
};
use crate::store::RouteStore;
use crate::types::{Fix, InterruptReason, Result, StorageError, TrackingState};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

/// Counters describing what happened to delivered samples
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControllerStats {
    /// Persisted and published
    pub accepted: u64,
    /// Valid but too close to the previous fix
    pub filtered: u64,
    /// Malformed coordinates
    pub rejected: u64,
    /// Accepted but lost to storage failures
    pub dropped: u64,
}

#[derive(Debug, Default)]
struct StatCounters {
    accepted: AtomicU64,
    filtered: AtomicU64,
    rejected: AtomicU64,
    dropped: AtomicU64,
}

struct ControllerCore {
    state: TrackingState,
    // Identifies the live subscription; bumped whenever one is abandoned
    generation: u64,
    last_accepted: Option<Fix>,
    subscription: Option<Box<dyn PositionSubscription>>,
}

struct ControllerInner {
    core: Mutex<ControllerCore>,
    accepting: AtomicBool,
    config: TrackerConfig,
    filter: FixFilter,
    store: RouteStore,
    bus: EventBus,
    source: Arc<dyn PositionSource>,
    stats: StatCounters,
    self_ref: Weak<ControllerInner>,
}

/// Drives position acquisition and records the route
///
/// Cloning yields another handle on the same controller.
#[derive(Clone)]
pub struct TrackingController {
    inner: Arc<ControllerInner>,
}

impl TrackingController {
    /// Create an idle controller over `store`, fed by `source`, publishing on `bus`
    ///
    /// The last stored fix becomes the filter's memory so a resumed route
    /// continues where it left off. A store that cannot be read is treated
    /// as empty.
    pub fn new(
        config: TrackerConfig,
        store: RouteStore,
        source: Arc<dyn PositionSource>,
        bus: EventBus,
    ) -> Result<Self> {
        config.validate()?;

        let last_accepted = match store.last() {
            Ok(last) => last,
            Err(e) => {
                log::warn!("Could not read stored route, starting without history: {}", e);
                None
            }
        };

        if let Some(fix) = &last_accepted {
            log::debug!("Restored last accepted fix: {}", fix);
        }

        let filter = FixFilter::from_config(&config.filter);
        let inner = Arc::new_cyclic(|self_ref| ControllerInner {
            core: Mutex::new(ControllerCore {
                state: TrackingState::Idle,
                generation: 0,
                last_accepted,
                subscription: None,
            }),
            accepting: AtomicBool::new(false),
            config,
            filter,
            store,
            bus,
            source,
            stats: StatCounters::default(),
            self_ref: self_ref.clone(),
        });

        Ok(Self { inner })
    }

    /// Begin acquiring positions
    ///
    /// Persists `trackingEnabled = true` and requests updates. A no-op while
    /// already Acquiring or Tracking. Permission or acquisition failures do
    /// not return an error: they move the controller to Stopped and publish
    /// `TrackingInterrupted`.
    pub fn start(&self) -> Result<()> {
        let inner = &self.inner;

        let generation = {
            let mut core = inner.lock();
            if core.state.is_active() {
                log::debug!("start() ignored: already {}", core.state);
                return Ok(());
            }

            inner.store.set_tracking_enabled(true)?;
            core.generation += 1;
            inner.accepting.store(true, Ordering::SeqCst);
            inner.transition(&mut core, TrackingState::Acquiring);
            core.generation
        };

        let handler: Weak<dyn PositionHandler> = inner.self_ref.clone();
        let sink = PositionSink::new(handler, generation);
        let requested = inner.source.request_updates(&inner.config.location, sink);

        let mut core = inner.lock();
        match requested {
            Ok(subscription) => {
                if core.generation == generation && core.state.is_active() {
                    log::info!(
                        "Position updates requested (interval {:?}, fastest {:?}, min displacement {}m)",
                        inner.config.location.interval(),
                        inner.config.location.fastest_interval(),
                        inner.config.location.min_displacement_m
                    );
                    core.subscription = Some(subscription);
                } else {
                    // Stopped or interrupted while the request was in flight
                    drop(core);
                    let mut subscription = subscription;
                    subscription.cancel();
                }
            }
            Err(e) => {
                if core.generation == generation && core.state.is_active() {
                    log::warn!("Position updates unavailable: {}", e);
                    inner.interrupt(&mut core, e.into());
                }
            }
        }

        Ok(())
    }

    /// Stop acquiring positions and switch tracking off
    ///
    /// Idempotent: outside Acquiring/Tracking it only makes sure the
    /// persisted flag is off and publishes nothing. After it returns no
    /// further `FixAccepted` is published.
    pub fn stop(&self) -> Result<()> {
        let inner = &self.inner;

        let (subscription, persisted) = {
            let mut core = inner.lock();
            inner.accepting.store(false, Ordering::SeqCst);

            if !core.state.is_active() {
                let persisted = match inner.store.is_tracking_enabled() {
                    Ok(true) => inner.store.set_tracking_enabled(false),
                    Ok(false) => Ok(()),
                    Err(e) => Err(e),
                };
                (None, persisted)
            } else {
                core.generation += 1;
                let subscription = core.subscription.take();
                let persisted = inner.store.set_tracking_enabled(false);
                inner.transition(&mut core, TrackingState::Stopped);
                (subscription, persisted)
            }
        };

        if let Some(mut subscription) = subscription {
            subscription.cancel();
        }

        persisted.map_err(Into::into)
    }

    /// Clear the recorded route, stopping first if needed
    pub fn reset(&self) -> Result<()> {
        if self.state().is_active() {
            log::info!("Reset requested while {}, stopping first", self.state());
        }
        self.stop()?;

        let inner = &self.inner;
        let mut core = inner.lock();
        inner.store.clear()?;
        core.last_accepted = None;
        inner.bus.publish(TrackingEvent::RouteReset);
        Ok(())
    }

    /// Restart hook for the host: start again if tracking was left enabled
    ///
    /// Returns true when a start was issued. Calling it repeatedly is safe.
    pub fn resume_if_enabled(&self) -> Result<bool> {
        if !self.inner.store.is_tracking_enabled()? {
            log::debug!("Tracking not enabled, nothing to resume");
            return Ok(false);
        }

        if self.state().is_active() {
            return Ok(false);
        }

        log::info!("Resuming tracking enabled before restart");
        self.start()?;
        Ok(true)
    }

    pub fn state(&self) -> TrackingState {
        self.inner.lock().state
    }

    /// The recorded route in acceptance order
    pub fn route(&self) -> std::result::Result<Vec<Fix>, StorageError> {
        self.inner.store.list()
    }

    pub fn last_accepted(&self) -> Option<Fix> {
        self.inner.lock().last_accepted
    }

    pub fn is_tracking_enabled(&self) -> std::result::Result<bool, StorageError> {
        self.inner.store.is_tracking_enabled()
    }

    pub fn stats(&self) -> ControllerStats {
        let stats = &self.inner.stats;
        ControllerStats {
            accepted: stats.accepted.load(Ordering::Relaxed),
            filtered: stats.filtered.load(Ordering::Relaxed),
            rejected: stats.rejected.load(Ordering::Relaxed),
            dropped: stats.dropped.load(Ordering::Relaxed),
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.inner.bus
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.inner.config
    }
}

impl std::fmt::Debug for TrackingController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackingController")
            .field("state", &self.state())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl ControllerInner {
    fn lock(&self) -> MutexGuard<'_, ControllerCore> {
        self.core.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn transition(&self, core: &mut ControllerCore, to: TrackingState) {
        let from = core.state;
        if from == to {
            return;
        }
        core.state = to;
        log::info!("Tracking state {} -> {}", from, to);
        self.bus.publish(TrackingEvent::StateChanged { from, to });
    }

    fn interrupt(&self, core: &mut ControllerCore, reason: InterruptReason) {
        self.accepting.store(false, Ordering::SeqCst);
        core.generation += 1;
        self.transition(core, TrackingState::Stopped);
        log::warn!("Tracking interrupted: {}", reason);
        self.bus.publish(TrackingEvent::TrackingInterrupted { reason });
    }

    fn is_live(&self, core: &ControllerCore, generation: u64) -> bool {
        core.generation == generation
            && core.state.is_active()
            && self.accepting.load(Ordering::SeqCst)
    }

    fn append_with_retry(&self, fix: &Fix) -> std::result::Result<(), StorageError> {
        let mut attempt = 0;
        loop {
            match self.store.append(fix) {
                Ok(()) => return Ok(()),
                Err(e) if attempt < self.config.append_retries => {
                    attempt += 1;
                    log::warn!("Append failed ({}), retrying", e);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl PositionHandler for ControllerInner {
    fn on_position(&self, generation: u64, position: RawPosition) {
        let mut core = self.lock();
        if !self.is_live(&core, generation) {
            log::trace!("Ignoring delivery from inactive subscription {}", generation);
            return;
        }

        // Any delivery confirms the subscription is live and authorized
        if core.state == TrackingState::Acquiring {
            self.transition(&mut core, TrackingState::Tracking);
        }

        let candidate = match Fix::new(position.latitude, position.longitude, position.timestamp) {
            Ok(fix) => fix,
            Err(e) => {
                self.stats.rejected.fetch_add(1, Ordering::Relaxed);
                log::warn!("Rejecting sample: {}", e);
                self.bus.publish(TrackingEvent::FixRejected {
                    latitude: position.latitude,
                    longitude: position.longitude,
                    reason: e.to_string(),
                });
                return;
            }
        };

        if !self.filter.accept(core.last_accepted.as_ref(), &candidate) {
            self.stats.filtered.fetch_add(1, Ordering::Relaxed);
            log::trace!("Filtered fix {}", candidate);
            return;
        }

        match self.append_with_retry(&candidate) {
            Ok(()) => {
                core.last_accepted = Some(candidate);
                self.stats.accepted.fetch_add(1, Ordering::Relaxed);
                log::debug!("Accepted fix {}", candidate);
                self.bus.publish(TrackingEvent::FixAccepted(candidate));
            }
            Err(error) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                log::warn!("Dropping fix {}: {}", candidate, error);
                self.bus.publish(TrackingEvent::FixDropped {
                    fix: candidate,
                    error,
                });
            }
        }
    }

    fn on_error(&self, generation: u64, error: SourceError) {
        let subscription = {
            let mut core = self.lock();
            if !self.is_live(&core, generation) {
                log::trace!("Ignoring error from inactive subscription {}: {}", generation, error);
                return;
            }
            let subscription = core.subscription.take();
            self.interrupt(&mut core, error.into());
            subscription
        };

        if let Some(mut subscription) = subscription {
            subscription.cancel();
        }
    }
}

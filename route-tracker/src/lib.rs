//! Route Tracker Library
//!
//! Records a device's position over time as an ordered, persisted route and
//! pushes newly accepted fixes to in-process subscribers.
//!
//! # Architecture
//!
//! - [`FixFilter`] decides whether a candidate fix is far enough from the
//!   previous one to be kept
//! - [`RouteStore`] is the durable, ordered log of accepted fixes plus the
//!   tracking-enabled flag, layered over a [`PersistenceSubstrate`]
//! - [`EventBus`] fans events out to subscribers through bounded queues
//! - [`TrackingController`] owns the lifecycle state machine and the
//!   ingestion pipeline
//! - [`ServiceLifecycleAdapter`] maps host start/stop/restart commands onto
//!   the controller
//!
//! The position source, the persistence substrate, the activity indicator
//! and address lookup are seams implemented by the host.
//!
//! # Example Usage
//!
//! ```no_run
//! use route_tracker::{
//!     EventBus, FileSubstrate, ReplaySource, RouteStore, TrackerConfig,
//!     TrackingController, TrackingEvent,
//! };
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! let substrate = FileSubstrate::open(Path::new("./data")).unwrap();
//! let store = RouteStore::new(Arc::new(substrate));
//! let source = Arc::new(ReplaySource::new(Vec::new()));
//!
//! let controller = TrackingController::new(
//!     TrackerConfig::new(),
//!     store,
//!     source,
//!     EventBus::default(),
//! )
//! .unwrap();
//!
//! let feed = controller.bus().subscribe();
//! controller.start().unwrap();
//!
//! while let Some(event) = feed.recv() {
//!     if let TrackingEvent::FixAccepted(fix) = event {
//!         println!("New fix: {}", fix);
//!     }
//! }
//! ```

// Public modules
pub mod address;
pub mod bus;
pub mod config;
pub mod controller;
pub mod events;
pub mod filter;
pub mod lifecycle;
pub mod source;
pub mod store;
pub mod types;

// Re-export main types for convenience
pub use address::{describe_or_fallback, AddressLookup, LookupError};
pub use bus::{EventBus, Subscription, SubscriptionId};
pub use config::{BusConfig, FilterConfig, LocationRequest, Priority, TrackerConfig};
pub use controller::{ControllerStats, TrackingController};
pub use events::TrackingEvent;
pub use filter::FixFilter;
pub use lifecycle::{ActivityIndicator, HostCommand, ServiceLifecycleAdapter};
pub use source::{
    PositionHandler, PositionSink, PositionSource, PositionSubscription, RawPosition,
    ReplaySource, SourceError,
};
pub use store::{FileSubstrate, MemorySubstrate, PersistenceSubstrate, RouteStore};
pub use types::{
    haversine_distance_m, route_distance_m, Fix, InterruptReason, Result, StorageError,
    StorageErrorKind, Timestamp, TrackerError, TrackingState,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_basics() {
        // Smoke test: a fresh store holds no route and tracking is off
        let store = RouteStore::in_memory();
        assert!(store.list().unwrap().is_empty());
        assert!(!store.is_tracking_enabled().unwrap());
    }
}

//! Persisted route store
//!
//! The route is an append-only log of index-tagged JSON records layered over
//! a [`PersistenceSubstrate`]. Acceptance order is preserved by the log
//! itself and checked on read through the strictly increasing `seq` tag.

pub mod file;
pub mod substrate;

pub use file::FileSubstrate;
pub use substrate::{MemorySubstrate, PersistenceSubstrate};

use crate::types::{Fix, StorageError, StorageErrorKind, Timestamp};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

/// Record log key holding the route
pub const ROUTE_KEY: &str = "tracking_route";

/// Flag key holding the tracking-enabled switch
pub const TRACKING_ENABLED_KEY: &str = "route_tracking_enabled";

/// On-disk shape of one route entry
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RouteRecord {
    seq: u64,
    lat: f64,
    lon: f64,
    ts: Timestamp,
}

/// Outcome of decoding the stored log
#[derive(Debug, Default)]
struct DecodedRoute {
    fixes: Vec<Fix>,
    last_seq: Option<u64>,
    corrupt: usize,
}

fn decode(records: &[String]) -> DecodedRoute {
    let mut decoded = DecodedRoute::default();

    for (index, raw) in records.iter().enumerate() {
        let record: RouteRecord = match serde_json::from_str(raw) {
            Ok(record) => record,
            Err(e) => {
                log::warn!("Skipping unreadable route record #{}: {}", index, e);
                decoded.corrupt += 1;
                continue;
            }
        };

        if let Some(last) = decoded.last_seq {
            if record.seq <= last {
                log::warn!(
                    "Skipping out-of-order route record #{} (seq {} after {})",
                    index,
                    record.seq,
                    last
                );
                decoded.corrupt += 1;
                continue;
            }
        }

        match Fix::new(record.lat, record.lon, record.ts) {
            Ok(fix) => {
                decoded.fixes.push(fix);
                decoded.last_seq = Some(record.seq);
            }
            Err(e) => {
                log::warn!("Skipping invalid route record #{}: {}", index, e);
                decoded.corrupt += 1;
            }
        }
    }

    decoded
}

/// Durable, ordered log of accepted fixes plus the tracking-enabled flag
///
/// Cloning yields another handle on the same substrate. Exactly one
/// controller should write through it per process.
#[derive(Clone)]
pub struct RouteStore {
    substrate: Arc<dyn PersistenceSubstrate>,
    // Next sequence number; None until first read from the substrate
    next_seq: Arc<Mutex<Option<u64>>>,
}

impl RouteStore {
    pub fn new(substrate: Arc<dyn PersistenceSubstrate>) -> Self {
        Self {
            substrate,
            next_seq: Arc::new(Mutex::new(None)),
        }
    }

    /// Store backed by a fresh [`MemorySubstrate`]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemorySubstrate::new()))
    }

    /// Durably add `fix` to the end of the route
    ///
    /// The sequence counter only advances once the substrate accepted the
    /// record, so a failed append can be retried as-is.
    pub fn append(&self, fix: &Fix) -> Result<(), StorageError> {
        let mut next_seq = self.next_seq.lock().unwrap_or_else(|p| p.into_inner());

        let seq = match *next_seq {
            Some(seq) => seq,
            None => {
                let records = self.substrate.list_records(ROUTE_KEY)?;
                decode(&records).last_seq.map_or(0, |last| last + 1)
            }
        };

        let record = RouteRecord {
            seq,
            lat: fix.latitude(),
            lon: fix.longitude(),
            ts: fix.timestamp(),
        };
        let line = serde_json::to_string(&record)?;

        self.substrate.append_record(ROUTE_KEY, &line)?;
        *next_seq = Some(seq + 1);
        Ok(())
    }

    /// The full route in acceptance order
    ///
    /// Corrupt records are skipped and logged; substrate I/O failures are
    /// returned so the caller knows the route may be incomplete.
    pub fn list(&self) -> Result<Vec<Fix>, StorageError> {
        let records = self.substrate.list_records(ROUTE_KEY)?;
        let decoded = decode(&records);

        if decoded.corrupt > 0 {
            log::warn!(
                "Route contains {} corrupt record(s); {} readable fix(es) returned",
                decoded.corrupt,
                decoded.fixes.len()
            );
        }

        Ok(decoded.fixes)
    }

    /// Last stored fix, if any
    pub fn last(&self) -> Result<Option<Fix>, StorageError> {
        Ok(self.list()?.pop())
    }

    /// Number of readable fixes
    pub fn len(&self) -> Result<usize, StorageError> {
        Ok(self.list()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.len()? == 0)
    }

    /// Empty the route and switch tracking off
    pub fn clear(&self) -> Result<(), StorageError> {
        let mut next_seq = self.next_seq.lock().unwrap_or_else(|p| p.into_inner());
        self.substrate.clear_records(ROUTE_KEY)?;
        *next_seq = Some(0);
        drop(next_seq);

        self.substrate.set_flag(TRACKING_ENABLED_KEY, false)?;
        log::info!("Route cleared");
        Ok(())
    }

    /// Persisted tracking switch; an unreadable flag reads as off
    pub fn is_tracking_enabled(&self) -> Result<bool, StorageError> {
        match self.substrate.get_flag(TRACKING_ENABLED_KEY) {
            Ok(flag) => Ok(flag.unwrap_or(false)),
            Err(e) if e.kind == StorageErrorKind::Corrupt => {
                log::warn!("Tracking flag unreadable, treating as disabled: {}", e);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    pub fn set_tracking_enabled(&self, enabled: bool) -> Result<(), StorageError> {
        self.substrate.set_flag(TRACKING_ENABLED_KEY, enabled)
    }
}

impl std::fmt::Debug for RouteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteStore").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn fix(lat: f64, lon: f64, secs: i64) -> Fix {
        let t0 = Utc.with_ymd_and_hms(2024, 5, 17, 12, 0, 0).unwrap();
        Fix::new(lat, lon, t0 + Duration::seconds(secs)).unwrap()
    }

    #[test]
    fn test_list_preserves_acceptance_order() {
        let store = RouteStore::in_memory();
        // Deliberately not sorted by any coordinate
        let fixes = vec![fix(30.0, 10.0, 0), fix(10.0, 30.0, 1), fix(20.0, 20.0, 2)];
        for f in &fixes {
            store.append(f).unwrap();
        }

        assert_eq!(store.list().unwrap(), fixes);
        assert_eq!(store.last().unwrap(), Some(fixes[2]));
        assert_eq!(store.len().unwrap(), 3);
    }

    #[test]
    fn test_clear_then_list_is_empty_and_disabled() {
        let store = RouteStore::in_memory();
        store.set_tracking_enabled(true).unwrap();
        store.append(&fix(1.0, 1.0, 0)).unwrap();

        store.clear().unwrap();
        assert!(store.list().unwrap().is_empty());
        assert!(!store.is_tracking_enabled().unwrap());
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn test_tracking_flag_defaults_to_false() {
        let store = RouteStore::in_memory();
        assert!(!store.is_tracking_enabled().unwrap());
        store.set_tracking_enabled(true).unwrap();
        assert!(store.is_tracking_enabled().unwrap());
    }

    #[test]
    fn test_corrupt_records_are_skipped() {
        let substrate = Arc::new(MemorySubstrate::new());
        let store = RouteStore::new(substrate.clone());

        store.append(&fix(1.0, 1.0, 0)).unwrap();
        substrate.insert_raw(ROUTE_KEY, "1.0,1.0");
        substrate.insert_raw(ROUTE_KEY, r#"{"seq":7,"lat":95.0,"lon":1.0,"ts":"2024-05-17T12:00:00Z"}"#);
        store.append(&fix(2.0, 2.0, 1)).unwrap();

        assert_eq!(store.list().unwrap(), vec![fix(1.0, 1.0, 0), fix(2.0, 2.0, 1)]);
    }

    #[test]
    fn test_out_of_order_sequence_is_skipped() {
        let substrate = Arc::new(MemorySubstrate::new());
        substrate.insert_raw(ROUTE_KEY, r#"{"seq":5,"lat":1.0,"lon":1.0,"ts":"2024-05-17T12:00:00Z"}"#);
        substrate.insert_raw(ROUTE_KEY, r#"{"seq":3,"lat":2.0,"lon":2.0,"ts":"2024-05-17T12:00:01Z"}"#);

        let store = RouteStore::new(substrate);
        let route = store.list().unwrap();
        assert_eq!(route.len(), 1);
        assert_eq!(route[0].latitude(), 1.0);

        // New records continue after the highest readable sequence number
        store.append(&fix(3.0, 3.0, 2)).unwrap();
        assert_eq!(store.len().unwrap(), 2);
    }

    #[test]
    fn test_io_failure_surfaces_from_list() {
        let substrate = Arc::new(MemorySubstrate::new());
        let store = RouteStore::new(substrate.clone());
        substrate.fail_next_reads(1);

        let err = store.list().unwrap_err();
        assert_eq!(err.kind, StorageErrorKind::IoFailure);
    }

    #[test]
    fn test_failed_append_does_not_consume_sequence() {
        let substrate = Arc::new(MemorySubstrate::new());
        let store = RouteStore::new(substrate.clone());
        store.append(&fix(1.0, 1.0, 0)).unwrap();

        substrate.fail_next_appends(1);
        assert!(store.append(&fix(2.0, 2.0, 1)).is_err());
        store.append(&fix(2.0, 2.0, 1)).unwrap();

        let raw = substrate.list_records(ROUTE_KEY).unwrap();
        assert_eq!(raw.len(), 2);
        assert!(raw[1].starts_with(r#"{"seq":1,"#));
    }

    #[test]
    fn test_reopened_store_continues_sequence() {
        let substrate: Arc<dyn PersistenceSubstrate> = Arc::new(MemorySubstrate::new());
        RouteStore::new(substrate.clone()).append(&fix(1.0, 1.0, 0)).unwrap();

        let reopened = RouteStore::new(substrate.clone());
        reopened.append(&fix(2.0, 2.0, 1)).unwrap();

        let raw = substrate.list_records(ROUTE_KEY).unwrap();
        assert!(raw[1].starts_with(r#"{"seq":1,"#));
        assert_eq!(reopened.len().unwrap(), 2);
    }
}

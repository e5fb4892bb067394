// End-to-end tracking scenarios over the public API
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use route_tracker::{
    EventBus, FileSubstrate, Fix, FixFilter, InterruptReason, LocationRequest, MemorySubstrate,
    PositionSink, PositionSource, PositionSubscription, RawPosition, ReplaySource, RouteStore,
    SourceError, Timestamp, TrackerConfig, TrackingController, TrackingEvent, TrackingState,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn t(secs: i64) -> Timestamp {
    Utc.with_ymd_and_hms(2024, 5, 17, 12, 0, 0).unwrap() + ChronoDuration::seconds(secs)
}

/// Source driven by the test thread
#[derive(Default)]
struct ManualSource {
    sink: Mutex<Option<PositionSink>>,
    deny: bool,
}

struct NoopSubscription;

impl PositionSubscription for NoopSubscription {
    fn cancel(&mut self) {}
}

impl PositionSource for ManualSource {
    fn request_updates(
        &self,
        _request: &LocationRequest,
        sink: PositionSink,
    ) -> Result<Box<dyn PositionSubscription>, SourceError> {
        if self.deny {
            return Err(SourceError::PermissionDenied);
        }
        *self.sink.lock().unwrap() = Some(sink);
        Ok(Box::new(NoopSubscription))
    }
}

impl ManualSource {
    fn push(&self, lat: f64, lon: f64, secs: i64) {
        let sink = self.sink.lock().unwrap().clone().unwrap();
        sink.deliver(RawPosition::new(lat, lon, t(secs)));
    }
}

/// Source that delivers synchronously from inside `request_updates`
struct EagerSource {
    samples: Vec<RawPosition>,
}

impl PositionSource for EagerSource {
    fn request_updates(
        &self,
        _request: &LocationRequest,
        sink: PositionSink,
    ) -> Result<Box<dyn PositionSubscription>, SourceError> {
        for sample in &self.samples {
            sink.deliver(*sample);
        }
        Ok(Box::new(NoopSubscription))
    }
}

fn controller_with(source: Arc<dyn PositionSource>, store: RouteStore) -> TrackingController {
    TrackingController::new(TrackerConfig::new(), store, source, EventBus::new(256)).unwrap()
}

#[test]
fn duplicate_collapsed_then_distant_fix_appended() {
    let source = Arc::new(ManualSource::default());
    let controller = controller_with(source.clone(), RouteStore::in_memory());
    controller.start().unwrap();

    source.push(10.0, 20.0, 0);
    source.push(10.0, 20.0, 1);
    assert_eq!(controller.route().unwrap(), vec![Fix::new(10.0, 20.0, t(0)).unwrap()]);

    source.push(10.001, 20.001, 2);
    assert_eq!(
        controller.route().unwrap(),
        vec![
            Fix::new(10.0, 20.0, t(0)).unwrap(),
            Fix::new(10.001, 20.001, t(2)).unwrap(),
        ]
    );
}

#[test]
fn route_is_the_accepted_subsequence_in_submission_order() {
    let source = Arc::new(ManualSource::default());
    let controller = controller_with(source.clone(), RouteStore::in_memory());
    let filter = FixFilter::default();
    controller.start().unwrap();

    // A zig-zag walk with some short hops and repeats mixed in
    let candidates = [
        (41.0000, 29.0000),
        (41.0003, 29.0000),
        (41.0020, 29.0000),
        (41.0020, 29.0000),
        (40.9990, 29.0030),
        (40.9991, 29.0031),
        (41.0100, 28.9900),
        (41.0000, 29.0000),
        (41.0004, 29.0001),
    ];

    let mut expected: Vec<Fix> = Vec::new();
    for (i, (lat, lon)) in candidates.iter().enumerate() {
        let candidate = Fix::new(*lat, *lon, t(i as i64)).unwrap();
        if filter.accept(expected.last(), &candidate) {
            expected.push(candidate);
        }
        source.push(*lat, *lon, i as i64);
    }

    assert!(expected.len() > 2 && expected.len() < candidates.len());
    assert_eq!(controller.route().unwrap(), expected);
    assert_eq!(controller.stats().accepted as usize, expected.len());
}

#[test]
fn fix_accepted_events_match_route() {
    let source = Arc::new(ManualSource::default());
    let controller = controller_with(source.clone(), RouteStore::in_memory());
    let feed = controller.bus().subscribe();
    controller.start().unwrap();

    for i in 0..5 {
        source.push(10.0 + i as f64 * 0.01, 20.0, i);
    }

    let published: Vec<Fix> = feed
        .drain()
        .into_iter()
        .filter_map(|event| match event {
            TrackingEvent::FixAccepted(fix) => Some(fix),
            _ => None,
        })
        .collect();
    assert_eq!(published, controller.route().unwrap());
}

#[test]
fn stop_twice_is_idempotent() {
    let source = Arc::new(ManualSource::default());
    let controller = controller_with(source.clone(), RouteStore::in_memory());
    controller.start().unwrap();
    source.push(10.0, 20.0, 0);

    let feed = controller.bus().subscribe();
    controller.stop().unwrap();
    let first = feed.drain();
    controller.stop().unwrap();
    let second = feed.drain();

    assert_eq!(controller.state(), TrackingState::Stopped);
    assert_eq!(
        first,
        vec![TrackingEvent::StateChanged {
            from: TrackingState::Tracking,
            to: TrackingState::Stopped,
        }]
    );
    assert!(second.is_empty());
}

#[test]
fn permission_denied_on_start() {
    let store = RouteStore::in_memory();
    store.append(&Fix::new(1.0, 1.0, t(0)).unwrap()).unwrap();

    let source = Arc::new(ManualSource {
        deny: true,
        ..ManualSource::default()
    });
    let controller = controller_with(source, store.clone());
    let feed = controller.bus().subscribe();

    controller.start().unwrap();

    assert_eq!(controller.state(), TrackingState::Stopped);
    let interruptions: Vec<_> = feed
        .drain()
        .into_iter()
        .filter(|event| matches!(event, TrackingEvent::TrackingInterrupted { .. }))
        .collect();
    assert_eq!(
        interruptions,
        vec![TrackingEvent::TrackingInterrupted {
            reason: InterruptReason::PermissionDenied,
        }]
    );
    assert_eq!(store.list().unwrap(), vec![Fix::new(1.0, 1.0, t(0)).unwrap()]);
}

#[test]
fn restart_resumes_without_ui_start() {
    let substrate = Arc::new(MemorySubstrate::new());

    {
        let source = Arc::new(ManualSource::default());
        let controller = controller_with(source.clone(), RouteStore::new(substrate.clone()));
        controller.start().unwrap();
        source.push(10.0, 20.0, 0);
        // Process killed here: no stop()
    }

    let source = Arc::new(ManualSource::default());
    let controller = controller_with(source.clone(), RouteStore::new(substrate));
    assert_eq!(controller.state(), TrackingState::Idle);

    assert!(controller.resume_if_enabled().unwrap());
    assert_eq!(controller.state(), TrackingState::Acquiring);

    // History survives and the filter remembers the last fix
    source.push(10.0, 20.0, 30);
    source.push(10.01, 20.0, 31);
    assert_eq!(controller.route().unwrap().len(), 2);
}

#[test]
fn restart_does_nothing_when_disabled() {
    let substrate = Arc::new(MemorySubstrate::new());
    {
        let source = Arc::new(ManualSource::default());
        let controller = controller_with(source, RouteStore::new(substrate.clone()));
        controller.start().unwrap();
        controller.stop().unwrap();
    }

    let controller = controller_with(Arc::new(ManualSource::default()), RouteStore::new(substrate));
    assert!(!controller.resume_if_enabled().unwrap());
    assert_eq!(controller.state(), TrackingState::Idle);
}

#[test]
fn synchronous_delivery_during_start() {
    let source = Arc::new(EagerSource {
        samples: vec![
            RawPosition::new(10.0, 20.0, t(0)),
            RawPosition::new(10.01, 20.0, t(1)),
        ],
    });
    let controller = controller_with(source, RouteStore::in_memory());

    controller.start().unwrap();
    assert_eq!(controller.state(), TrackingState::Tracking);
    assert_eq!(controller.route().unwrap().len(), 2);
}

#[test]
fn replay_session_over_file_substrate() {
    let dir = tempfile::tempdir().unwrap();
    let samples: Vec<RawPosition> = (0..6)
        .map(|i| RawPosition::new(41.0 + i as f64 * 0.002, 29.0, t(i)))
        .collect();

    {
        let source = Arc::new(ReplaySource::new(samples.clone()).with_pacing(Duration::ZERO));
        let store = RouteStore::new(Arc::new(FileSubstrate::open(dir.path()).unwrap()));
        let controller = controller_with(source.clone(), store);

        controller.start().unwrap();
        assert!(source.wait_until_finished(Duration::from_secs(5)));
        assert_eq!(controller.state(), TrackingState::Tracking);
    }

    // Reopen the directory as a new process would
    let store = RouteStore::new(Arc::new(FileSubstrate::open(dir.path()).unwrap()));
    let route = store.list().unwrap();
    assert_eq!(route.len(), samples.len());
    for (fix, sample) in route.iter().zip(&samples) {
        assert_eq!(fix.latitude(), sample.latitude);
        assert_eq!(fix.timestamp(), sample.timestamp);
    }
    assert!(store.is_tracking_enabled().unwrap());
}

#[test]
fn signal_loss_mid_session_is_reported() {
    let samples: Vec<RawPosition> = (0..5)
        .map(|i| RawPosition::new(10.0 + i as f64 * 0.01, 20.0, t(i)))
        .collect();
    let source = Arc::new(
        ReplaySource::new(samples)
            .with_pacing(Duration::ZERO)
            .with_failure_after(3),
    );
    let controller = controller_with(source.clone(), RouteStore::in_memory());
    let feed = controller.bus().subscribe();

    controller.start().unwrap();
    assert!(source.wait_until_finished(Duration::from_secs(5)));

    assert_eq!(controller.state(), TrackingState::Stopped);
    assert_eq!(controller.route().unwrap().len(), 3);

    let events = feed.drain();
    assert!(matches!(
        events.last(),
        Some(TrackingEvent::TrackingInterrupted {
            reason: InterruptReason::AcquisitionUnavailable(_)
        })
    ));
}

#[test]
fn clear_then_list_is_empty() {
    let store = RouteStore::in_memory();
    store.set_tracking_enabled(true).unwrap();
    for i in 0..3 {
        store.append(&Fix::new(i as f64, 0.0, t(i)).unwrap()).unwrap();
    }

    store.clear().unwrap();
    assert!(store.list().unwrap().is_empty());
    assert!(!store.is_tracking_enabled().unwrap());
}

#[test]
fn torn_record_after_crash_is_skipped() {
    use std::io::Write;

    let dir = tempfile::tempdir().unwrap();
    let substrate = Arc::new(FileSubstrate::open(dir.path()).unwrap());
    let store = RouteStore::new(substrate.clone());
    store.append(&Fix::new(10.0, 20.0, t(0)).unwrap()).unwrap();

    // Crash halfway through the second record
    let path = substrate.dir().join("tracking_route.jsonl");
    let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(br#"{"seq":1,"lat":10.0"#).unwrap();
    drop(file);

    let reopened = RouteStore::new(Arc::new(FileSubstrate::open(dir.path()).unwrap()));
    assert_eq!(reopened.len().unwrap(), 1);

    reopened.append(&Fix::new(11.0, 20.0, t(5)).unwrap()).unwrap();
    let route = reopened.list().unwrap();
    assert_eq!(route.len(), 2);
    assert_eq!(route[1].latitude(), 11.0);
}

#[test]
fn corrupt_flags_file_does_not_block_start() {
    let dir = tempfile::tempdir().unwrap();
    let substrate = Arc::new(FileSubstrate::open(dir.path()).unwrap());
    std::fs::write(substrate.dir().join("flags.json"), "{\"route_tracking_en").unwrap();

    let source = Arc::new(ManualSource::default());
    let controller = controller_with(source.clone(), RouteStore::new(substrate));

    assert!(!controller.is_tracking_enabled().unwrap());
    assert!(!controller.resume_if_enabled().unwrap());

    controller.start().unwrap();
    assert_eq!(controller.state(), TrackingState::Acquiring);
    assert!(controller.is_tracking_enabled().unwrap());
}

#[test]
fn invalid_bytes_in_route_log_do_not_stop_recording() {
    use std::io::Write;

    let dir = tempfile::tempdir().unwrap();
    let substrate = Arc::new(FileSubstrate::open(dir.path()).unwrap());
    RouteStore::new(substrate.clone())
        .append(&Fix::new(10.0, 20.0, t(0)).unwrap())
        .unwrap();

    let path = substrate.dir().join("tracking_route.jsonl");
    let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(b"\xff\n").unwrap();
    drop(file);

    let source = Arc::new(ManualSource::default());
    let controller = controller_with(
        source.clone(),
        RouteStore::new(Arc::new(FileSubstrate::open(dir.path()).unwrap())),
    );
    assert_eq!(controller.route().unwrap().len(), 1);

    controller.start().unwrap();
    for i in 1..=3 {
        source.push(10.0 + i as f64 * 0.01, 20.0, i);
    }

    let route = controller.route().unwrap();
    assert_eq!(route.len(), 4);
    assert_eq!(route[3].latitude(), 10.0 + 3.0 * 0.01);
    assert_eq!(controller.stats().dropped, 0);
    assert_eq!(controller.stats().accepted, 3);
}

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tracing::field::{Field, Visit};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::Layer;
use musth_guard_core::{
    AlertCfg, AlertKind, DetectionEvent, DirectorySink, LogNotifier, RecordingSink, Signal, TrackCfg,
};
use musth_guard_supervisor::*;

const TAIL: usize = 1;
const EAR: usize = 0;

fn builder() -> BasicEventBuilder {
    BasicEventBuilder::new(ClassNames::new(["Aggressive_ear", "Aggressive_tail", "Normal"]))
}

/// Small windows so tests reach alert states quickly.
fn quick_cfg() -> AlertCfg {
    let shrink = |mut t: TrackCfg| {
        t.signal_capacity = 4;
        t.escalation_capacity = 8;
        t
    };
    let mut cfg = AlertCfg::default();
    cfg.tail = shrink(cfg.tail);
    cfg.ear = shrink(cfg.ear);
    cfg.thresholds.warn_tail = 6;
    cfg.thresholds.warn_ear = 6;
    cfg.thresholds.alert_tail = 1;
    cfg.thresholds.alert_ear = 1;
    cfg
}

#[test]
fn sources_keep_separate_windows() {
    let sup = GuardSupervisor::new(4, AlertCfg::default()).unwrap();
    let b = builder();
    let mut sink: RecordingSink<()> = RecordingSink::new();

    for _ in 0..50 {
        sup.ingest(&b, "cam-north", &[DetectorRow::new(TAIL, 0.9)], Utc::now(), &(), &mut sink)
            .unwrap();
    }
    sup.ingest(&b, "cam-south", &[DetectorRow::new(EAR, 0.9)], Utc::now(), &(), &mut sink)
        .unwrap();

    assert_eq!(sup.source_count(), 2);
    assert_eq!(sup.with_engine("cam-north", |e| e.vote_count(Signal::Tail)), Some(50));
    assert_eq!(sup.with_engine("cam-south", |e| e.vote_count(Signal::Tail)), Some(0));
    assert_eq!(sup.with_engine("cam-south", |e| e.vote_count(Signal::Ear)), Some(1));
    assert_eq!(sup.with_engine("cam-west", |e| e.events_seen()), None);
}

#[test]
fn frame_rows_are_evaluated_in_order() {
    let sup = GuardSupervisor::new(1, quick_cfg()).unwrap();
    let b = builder();
    let mut sink: RecordingSink<u32> = RecordingSink::new();

    let rows = [DetectorRow::new(TAIL, 0.9), DetectorRow::new(EAR, 0.9), DetectorRow::new(2, 0.99)];
    let mut all = Vec::new();
    for frame in 0..4u32 {
        all.extend(sup.ingest(&b, "cam", &rows, Utc::now(), &frame, &mut sink).unwrap());
    }
    assert_eq!(all.len(), 12);
    assert_eq!(sup.with_engine("cam", |e| e.events_seen()), Some(12));
    assert!(all.iter().any(|e| e.decision.kind == AlertKind::CombinedAlert));
    // every combined alert reached the sink, tagged with its frame
    let alerts = all.iter().filter(|e| e.decision.is_alert()).count();
    assert_eq!(sink.calls.len(), alerts);
}

#[test]
fn empty_frame_creates_nothing() {
    let sup = GuardSupervisor::new(1, AlertCfg::default()).unwrap();
    let mut sink: RecordingSink<()> = RecordingSink::new();
    let out = sup.ingest(&builder(), "cam", &[], Utc::now(), &(), &mut sink).unwrap();
    assert!(out.is_empty());
    assert_eq!(sup.source_count(), 0);
}

#[test]
fn sink_failure_does_not_stop_the_stream() {
    let sup = GuardSupervisor::new(1, quick_cfg()).unwrap();
    let mut sink: RecordingSink<()> = RecordingSink::failing("no display");
    let rows = [DetectorRow::new(TAIL, 0.9), DetectorRow::new(EAR, 0.9)];

    let mut failures = 0;
    for _ in 0..6 {
        for eval in sup.ingest(&builder(), "cam", &rows, Utc::now(), &(), &mut sink).unwrap() {
            if let Some(Err(_)) = eval.evidence {
                failures += 1;
            }
        }
    }
    assert!(failures > 0);
    assert_eq!(sup.with_engine("cam", |e| e.events_seen()), Some(12));
}

#[test]
fn snapshot_json_round_trip_and_restore() {
    let sup = GuardSupervisor::new(3, AlertCfg::default()).unwrap();
    let mut sink: RecordingSink<()> = RecordingSink::new();
    for id in ["b-cam", "a-cam"] {
        let events: Vec<DetectionEvent> = (0..30).map(|_| DetectionEvent::now("Aggressive_tail", 0.8)).collect();
        sup.ingest_events(id, &events, &(), &mut sink).unwrap();
    }

    let snap = sup.snapshot();
    assert_eq!(snap.engines.len(), 2);
    assert_eq!(snap.engines[0].0, "a-cam");

    let json = snap.to_json().unwrap();
    let back = SupervisorSnapshot::from_json(&json).unwrap();
    assert_eq!(back, snap);

    let fresh = GuardSupervisor::new(1, AlertCfg::default()).unwrap();
    let stats = fresh.restore(back);
    assert_eq!(stats, RestoreStats { applied: 2, overwritten: 0, rejected: 0 });
    assert_eq!(fresh.with_engine("b-cam", |e| e.vote_count(Signal::Tail)), Some(30));
    assert_eq!(fresh.snapshot(), snap);
}

#[test]
fn restore_merge_overwrites_and_rejects() {
    let sup = GuardSupervisor::new(2, AlertCfg::default()).unwrap();
    let mut sink: RecordingSink<()> = RecordingSink::new();
    let events: Vec<DetectionEvent> = (0..10).map(|_| DetectionEvent::now("Aggressive_ear", 0.9)).collect();
    sup.ingest_events("cam-1", &events, &(), &mut sink).unwrap();
    sup.ingest_events("cam-2", &events, &(), &mut sink).unwrap();
    let snap = sup.snapshot_sources(&["cam-1"]);
    assert_eq!(snap.engines.len(), 1);

    // oversized windows for a small-capacity override
    let mut small = AlertCfg::default();
    small.ear.signal_capacity = 3;
    let mut other = GuardSupervisor::new(2, AlertCfg::default()).unwrap();
    other.set_cfg_override("cam-1", small).unwrap();
    let stats = other.restore_merge(snap.clone());
    assert_eq!(stats.rejected, 1);
    assert_eq!(stats.applied, 0);

    other.clear_cfg_override("cam-1");
    other.ingest_events("cam-1", &events[..2], &(), &mut sink).unwrap();
    let stats = other.restore_merge(snap);
    assert_eq!(stats, RestoreStats { applied: 1, overwritten: 1, rejected: 0 });
    assert_eq!(other.with_engine("cam-1", |e| e.vote_count(Signal::Ear)), Some(10));

    other.clear_source("cam-1");
    assert_eq!(other.source_count(), 0);
}

#[test]
fn directory_sink_receives_frame_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let sup = GuardSupervisor::new(1, quick_cfg()).unwrap();
    let mut sink = DirectorySink::new(dir.path(), LogNotifier);
    let rows = [DetectorRow::new(TAIL, 0.9), DetectorRow::new(EAR, 0.9)];

    let mut saved = Vec::new();
    for _ in 0..4 {
        for eval in sup.ingest(&builder(), "cam", &rows, Utc::now(), b"\xff\xd8jpeg".as_slice(), &mut sink).unwrap() {
            if let Some(Ok(id)) = eval.evidence {
                saved.push(id);
            }
        }
    }
    assert!(!saved.is_empty());
    for id in &saved {
        assert_eq!(std::fs::read(&id.0).unwrap(), b"\xff\xd8jpeg");
    }
}

/// Counts warn-level events that carry an `error` field.
struct ErrorWarnings(Arc<AtomicUsize>);

struct HasError(bool);

impl Visit for HasError {
    fn record_debug(&mut self, field: &Field, _value: &dyn std::fmt::Debug) {
        if field.name() == "error" {
            self.0 = true;
        }
    }
}

impl<S: tracing::Subscriber> Layer<S> for ErrorWarnings {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() != tracing::Level::WARN {
            return;
        }
        let mut v = HasError(false);
        event.record(&mut v);
        if v.0 {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[test]
fn each_sink_failure_is_logged_once() {
    let warnings = Arc::new(AtomicUsize::new(0));
    let subscriber = tracing_subscriber::registry().with(ErrorWarnings(warnings.clone()));

    let failures = tracing::subscriber::with_default(subscriber, || {
        let sup = GuardSupervisor::new(1, quick_cfg()).unwrap();
        let mut sink: RecordingSink<()> = RecordingSink::failing("no display");
        let rows = [DetectorRow::new(TAIL, 0.9), DetectorRow::new(EAR, 0.9)];
        let mut failures = 0;
        for _ in 0..4 {
            for eval in sup.ingest(&builder(), "cam", &rows, Utc::now(), &(), &mut sink).unwrap() {
                if let Some(Err(_)) = eval.evidence {
                    failures += 1;
                }
            }
        }
        failures
    });

    assert_eq!(failures, 4);
    assert_eq!(warnings.load(Ordering::SeqCst), failures);
}

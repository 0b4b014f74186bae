//! Lifecycle and live re-optimization tests through the `Engine` API.

mod fixtures;

use std::sync::Arc;
use std::thread;

use delivery_planner::engine::Engine;
use delivery_planner::error::PlanError;
use delivery_planner::model::{
    ActionTaken, DisruptionEvent, Priority, Route, RouteStatus, Stop, StopStatus, TimeWindow,
};
use delivery_planner::planner::optimize;
use delivery_planner::traffic::TrafficModel;

use fixtures::*;

fn engine() -> Engine {
    Engine::new(Arc::new(GridProvider), Arc::new(TrafficModel::new()), flat_opts())
}

fn plan(id: &str, stops: Vec<Stop>) -> Route {
    optimize(id, origin(), stops, &GridProvider, &TrafficModel::new(), &flat_opts())
        .expect("fixture route plans")
        .route
}

/// Registers a freshly planned route and starts it.
fn activate(engine: &Engine, id: &str, stops: Vec<Stop>) {
    engine.register(plan(id, stops)).expect("route registers");
    engine.start(id).expect("route starts");
}

fn line_stops() -> Vec<Stop> {
    vec![stop("a", 0.01, 0.0), stop("b", 0.02, 0.0), stop("c", 0.03, 0.0)]
}

// ============================================================
// Lifecycle
// ============================================================

#[test]
fn test_lifecycle_happy_path() {
    let engine = engine();
    engine.register(plan("r1", line_stops())).expect("registers");
    assert_eq!(engine.snapshot("r1").unwrap().status, RouteStatus::Planned);

    assert_eq!(engine.start("r1").unwrap(), RouteStatus::Active);
    assert_eq!(engine.pause("r1").unwrap(), RouteStatus::Paused);
    assert_eq!(engine.resume("r1").unwrap(), RouteStatus::Active);
    assert_eq!(engine.cancel("r1").unwrap(), RouteStatus::Cancelled);

    let archived = engine.archive("r1").expect("terminal route archives");
    assert_eq!(archived.status, RouteStatus::Cancelled);
    assert!(matches!(engine.snapshot("r1"), Err(PlanError::UnknownRoute { .. })));
}

#[test]
fn test_invalid_transitions_rejected() {
    let engine = engine();
    engine.register(plan("r1", line_stops())).expect("registers");

    assert!(matches!(engine.pause("r1"), Err(PlanError::RouteInactive { .. })));
    assert!(matches!(engine.resume("r1"), Err(PlanError::RouteInactive { .. })));
    assert!(matches!(engine.complete("r1"), Err(PlanError::RouteInactive { .. })));
    assert!(matches!(engine.archive("r1"), Err(PlanError::RouteInactive { .. })));

    engine.start("r1").expect("starts");
    assert!(matches!(engine.start("r1"), Err(PlanError::RouteInactive { .. })));
}

#[test]
fn test_duplicate_registration_rejected() {
    let engine = engine();
    engine.register(plan("r1", line_stops())).expect("registers");
    assert!(matches!(
        engine.register(plan("r1", Vec::new())),
        Err(PlanError::DuplicateRoute { .. })
    ));
}

#[test]
fn test_unknown_route() {
    let engine = engine();
    assert!(matches!(engine.snapshot("nope"), Err(PlanError::UnknownRoute { .. })));
    assert!(matches!(
        engine.reoptimize("nope", DisruptionEvent::HeavyTraffic { factor: 2.0 }),
        Err(PlanError::UnknownRoute { .. })
    ));
}

#[test]
fn test_reoptimize_requires_active_route() {
    let engine = engine();
    engine.register(plan("r1", line_stops())).expect("registers");
    assert!(matches!(
        engine.reoptimize("r1", DisruptionEvent::HeavyTraffic { factor: 2.0 }),
        Err(PlanError::RouteInactive { .. })
    ));

    engine.start("r1").expect("starts");
    engine.pause("r1").expect("pauses");
    assert!(matches!(
        engine.reoptimize("r1", DisruptionEvent::HeavyTraffic { factor: 2.0 }),
        Err(PlanError::RouteInactive { .. })
    ));
}

#[test]
fn test_event_against_cancelled_route_is_discarded() {
    let engine = engine();
    activate(&engine, "r1", line_stops());
    engine.cancel("r1").expect("cancels");

    let action = engine
        .reoptimize("r1", DisruptionEvent::StopCancelled { stop_id: "a".to_string() })
        .expect("discarded, not an error");
    assert_eq!(action.taken, ActionTaken::Discarded);
    assert_eq!(action.affected, 0);
}

// ============================================================
// Delivery progress
// ============================================================

#[test]
fn test_progress_marks_and_autocomplete() {
    let engine = engine();
    activate(&engine, "r1", vec![stop("a", 0.01, 0.0), stop("b", 0.02, 0.0)]);

    assert_eq!(engine.mark_en_route("r1").unwrap(), "a");
    let snap = engine.snapshot("r1").unwrap();
    assert_eq!(snap.stops[0].stop.status, StopStatus::EnRoute);
    assert_eq!(snap.next_pos, 0);

    assert_eq!(engine.mark_arrived("r1").unwrap(), "a");
    assert_eq!(engine.mark_delivered("r1").unwrap(), "a");
    assert_eq!(engine.snapshot("r1").unwrap().next_pos, 1);

    assert_eq!(engine.mark_failed("r1").unwrap(), "b");
    let snap = engine.snapshot("r1").unwrap();
    assert_eq!(snap.stops[1].stop.status, StopStatus::Failed);
    assert_eq!(snap.status, RouteStatus::Completed, "route completes when nothing remains");

    assert!(matches!(engine.mark_delivered("r1"), Err(PlanError::RouteInactive { .. })));
}

#[test]
fn test_visited_prefix_is_immutable() {
    let engine = engine();
    activate(&engine, "r1", line_stops());
    engine.mark_delivered("r1").expect("delivers a");

    let action = engine
        .reoptimize("r1", DisruptionEvent::StopCancelled { stop_id: "a".to_string() })
        .expect("event applies");
    assert_eq!(action.taken, ActionTaken::NoChange, "visited stops cannot be cancelled");

    engine
        .reoptimize("r1", DisruptionEvent::HeavyTraffic { factor: 2.0 })
        .expect("event applies");
    let snap = engine.snapshot("r1").unwrap();
    assert_eq!(snap.next_pos, 1);
    assert_eq!(snap.stops[0].stop.id, "a");
    assert_eq!(snap.stops[0].stop.status, StopStatus::Delivered);
}

// ============================================================
// STOP_CANCELLED / ADDRESS_UNRESOLVED
// ============================================================

#[test]
fn test_stop_cancelled_removes_and_shortens() {
    let engine = engine();
    activate(&engine, "r1", line_stops());

    let action = engine
        .reoptimize("r1", DisruptionEvent::StopCancelled { stop_id: "b".to_string() })
        .expect("event applies");
    assert_eq!(action.taken, ActionTaken::StopRemoved);
    assert!(action.affected >= 1);
    assert!(action.delta_time_min < 0.0, "removing a stop shortens the route");

    let snap = engine.snapshot("r1").unwrap();
    assert_eq!(ids(&snap.stops), vec!["a", "c"]);
    let removed = snap.removed.iter().find(|s| s.id == "b").expect("archived");
    assert_eq!(removed.status, StopStatus::Cancelled);
}

#[test]
fn test_stop_cancelled_is_idempotent() {
    let engine = engine();
    activate(&engine, "r1", line_stops());
    let event = DisruptionEvent::StopCancelled { stop_id: "b".to_string() };

    engine.reoptimize("r1", event.clone()).expect("first application");
    let second = engine.reoptimize("r1", event).expect("redelivery is benign");
    assert_eq!(second.taken, ActionTaken::NoChange);
    assert_eq!(second.affected, 0);

    assert!(matches!(
        engine.reoptimize("r1", DisruptionEvent::StopCancelled { stop_id: "zz".to_string() }),
        Err(PlanError::UnknownStop { .. })
    ));
}

#[test]
fn test_cancelled_stop_never_reappears() {
    let engine = engine();
    activate(&engine, "r1", line_stops());
    engine
        .reoptimize("r1", DisruptionEvent::StopCancelled { stop_id: "b".to_string() })
        .expect("cancels b");

    // Later events naming b must not resurrect it.
    let insert = engine
        .reoptimize("r1", DisruptionEvent::NewUrgentStop { stop: stop("b", 0.02, 0.0) })
        .expect("event applies");
    assert_eq!(insert.taken, ActionTaken::NoChange);

    let window = engine
        .reoptimize(
            "r1",
            DisruptionEvent::WindowChanged {
                stop_id: "b".to_string(),
                window: Some(TimeWindow::new(hm(11, 0), hm(12, 0))),
            },
        )
        .expect("event applies");
    assert_eq!(window.taken, ActionTaken::NoChange);

    let snap = engine.snapshot("r1").unwrap();
    assert!(!ids(&snap.stops).contains(&"b"));
    assert_eq!(snap.removed.iter().filter(|s| s.id == "b").count(), 1);
}

#[test]
fn test_address_unresolved_fails_the_stop() {
    let engine = engine();
    activate(&engine, "r1", vec![stop("a", 0.01, 0.0), stop("b", 0.02, 0.0)]);

    let action = engine
        .reoptimize("r1", DisruptionEvent::AddressUnresolved { stop_id: "b".to_string() })
        .expect("event applies");
    assert_eq!(action.taken, ActionTaken::StopFailed);

    let snap = engine.snapshot("r1").unwrap();
    assert_eq!(ids(&snap.stops), vec!["a"]);
    let removed = snap.removed.iter().find(|s| s.id == "b").expect("archived");
    assert_eq!(removed.status, StopStatus::Failed);

    let second = engine
        .reoptimize("r1", DisruptionEvent::AddressUnresolved { stop_id: "b".to_string() })
        .expect("redelivery is benign");
    assert_eq!(second.taken, ActionTaken::NoChange);
}

// ============================================================
// NEW_URGENT_STOP
// ============================================================

#[test]
fn test_new_urgent_stop_inserted_at_cheapest_position() {
    let engine = engine();
    activate(&engine, "r1", vec![stop("a", 0.01, 0.0), stop("c", 0.03, 0.0), stop("e", 0.05, 0.0)]);

    let action = engine
        .reoptimize("r1", DisruptionEvent::NewUrgentStop { stop: stop("b", 0.02, 0.0) })
        .expect("event applies");
    assert_eq!(action.taken, ActionTaken::StopInserted);
    assert!(action.affected >= 1);
    assert!(action.delta_time_min > 0.0, "an extra stop adds service time");

    let snap = engine.snapshot("r1").unwrap();
    assert_eq!(ids(&snap.stops), vec!["a", "b", "c", "e"], "on-the-way position wins");

    let second = engine
        .reoptimize("r1", DisruptionEvent::NewUrgentStop { stop: stop("b", 0.02, 0.0) })
        .expect("redelivery is benign");
    assert_eq!(second.taken, ActionTaken::NoChange);
    let snap = engine.snapshot("r1").unwrap();
    assert_eq!(snap.stops.iter().filter(|p| p.stop.id == "b").count(), 1);
}

#[test]
fn test_new_urgent_stop_validates_coordinates() {
    let engine = engine();
    activate(&engine, "r1", line_stops());
    assert!(matches!(
        engine.reoptimize("r1", DisruptionEvent::NewUrgentStop { stop: stop("x", 91.0, 0.0) }),
        Err(PlanError::InvalidCoordinate { .. })
    ));
}

// ============================================================
// RECIPIENT_ABSENT
// ============================================================

#[test]
fn test_recipient_absent_defers_to_end_of_suffix() {
    let engine = engine();
    activate(&engine, "r1", line_stops());

    let action = engine
        .reoptimize("r1", DisruptionEvent::RecipientAbsent { stop_id: "a".to_string() })
        .expect("event applies");
    assert_eq!(action.taken, ActionTaken::StopDeferred);

    let snap = engine.snapshot("r1").unwrap();
    assert_eq!(ids(&snap.stops), vec!["b", "c", "a"]);
    assert_eq!(snap.stops[2].stop.status, StopStatus::SkippedRetry);

    let second = engine
        .reoptimize("r1", DisruptionEvent::RecipientAbsent { stop_id: "a".to_string() })
        .expect("redelivery is benign");
    assert_eq!(second.taken, ActionTaken::NoChange);
    let snap = engine.snapshot("r1").unwrap();
    assert_eq!(snap.stops.iter().filter(|p| p.stop.id == "a").count(), 1);
}

// ============================================================
// HEAVY_TRAFFIC
// ============================================================

#[test]
fn test_heavy_traffic_below_threshold_ignored() {
    let engine = engine();
    activate(&engine, "r1", line_stops());

    let action = engine
        .reoptimize("r1", DisruptionEvent::HeavyTraffic { factor: 1.2 })
        .expect("event applies");
    assert_eq!(action.taken, ActionTaken::NoChange);
    assert_eq!(ids(&engine.snapshot("r1").unwrap().stops), vec!["a", "b", "c"]);
}

#[test]
fn test_heavy_traffic_resequences_by_window_urgency() {
    // At normal speeds the distance order x-then-z meets z's window with
    // minutes to spare; at 1.8x travel times only the urgency order does.
    // The resequenced suffix must survive refinement, which re-evaluates
    // candidates at the congested travel times.
    let engine = engine();
    activate(
        &engine,
        "r1",
        vec![
            stop("x", 0.01, 0.0),
            windowed("z", 0.20, 0.0, hm(9, 0), hm(10, 28)),
        ],
    );
    assert_eq!(ids(&engine.snapshot("r1").unwrap().stops), vec!["x", "z"]);

    let action = engine
        .reoptimize("r1", DisruptionEvent::HeavyTraffic { factor: 1.8 })
        .expect("event applies");
    assert_eq!(action.taken, ActionTaken::SuffixResequenced);
    assert_eq!(action.affected, 2);

    let snap = engine.snapshot("r1").unwrap();
    assert_eq!(ids(&snap.stops), vec!["z", "x"]);
    let z = &snap.stops[0];
    // 20 min base leg at 1.8x: arrival reflects the congestion.
    assert!((z.arrival_min - 636.0).abs() < 1e-6, "got {}", z.arrival_min);
    let window = z.stop.window.expect("z is windowed");
    assert!(z.arrival_min <= window.end_min as f64 + 10.0, "z still met under surge");
}

// ============================================================
// ACCUMULATED_DELAY
// ============================================================

#[test]
fn test_accumulated_delay_below_threshold_ignored() {
    let engine = engine();
    activate(&engine, "r1", line_stops());

    let action = engine
        .reoptimize("r1", DisruptionEvent::AccumulatedDelay { delay_min: 10.0 })
        .expect("event applies");
    assert_eq!(action.taken, ActionTaken::NoChange);
}

#[test]
fn test_accumulated_delay_promotes_high_priority() {
    // The refined plan serves the windowed medium stop first; a real delay
    // pulls the high-priority stop to the front of what remains.
    let engine = engine();
    activate(
        &engine,
        "r1",
        vec![
            windowed("m1", 0.01, 0.0, hm(10, 10), hm(11, 40)),
            prioritized("h", 0.05, 0.0, Priority::High)
                .with_window(TimeWindow::new(hm(13, 20), hm(15, 0))),
        ],
    );
    assert_eq!(ids(&engine.snapshot("r1").unwrap().stops), vec!["m1", "h"]);

    let action = engine
        .reoptimize("r1", DisruptionEvent::AccumulatedDelay { delay_min: 25.0 })
        .expect("event applies");
    assert_eq!(action.taken, ActionTaken::PriorityPromoted);
    assert_eq!(action.affected, 2);
    assert_eq!(ids(&engine.snapshot("r1").unwrap().stops), vec!["h", "m1"]);
}

#[test]
fn test_accumulated_delay_persists_across_remediations() {
    let engine = engine();
    activate(&engine, "r1", line_stops());
    assert!((engine.snapshot("r1").unwrap().stops[0].arrival_min - 601.0).abs() < 1e-9);

    engine
        .reoptimize("r1", DisruptionEvent::AccumulatedDelay { delay_min: 30.0 })
        .expect("event applies");
    let snap = engine.snapshot("r1").unwrap();
    assert!((snap.departure_min - 630.0).abs() < 1e-9, "slip recorded on the route");
    assert!((snap.stops[0].arrival_min - 631.0).abs() < 1e-9);

    // A later, unrelated remediation must reschedule from the delayed
    // clock, not the original plan.
    engine
        .reoptimize("r1", DisruptionEvent::StopCancelled { stop_id: "b".to_string() })
        .expect("event applies");
    let snap = engine.snapshot("r1").unwrap();
    assert_eq!(ids(&snap.stops), vec!["a", "c"]);
    assert!(
        (snap.stops[0].arrival_min - 631.0).abs() < 1e-9,
        "delay vanished: arrival {}",
        snap.stops[0].arrival_min
    );
}

// ============================================================
// WINDOW_CHANGED
// ============================================================

#[test]
fn test_window_changed_reorders_suffix() {
    let engine = engine();
    activate(&engine, "r1", line_stops());

    let window = TimeWindow::new(hm(9, 50), hm(10, 0));
    let action = engine
        .reoptimize(
            "r1",
            DisruptionEvent::WindowChanged { stop_id: "c".to_string(), window: Some(window) },
        )
        .expect("event applies");
    assert_eq!(action.taken, ActionTaken::WindowUpdated);

    let snap = engine.snapshot("r1").unwrap();
    assert_eq!(snap.stops[0].stop.id, "c", "tight window pulls c forward");
    assert_eq!(snap.stops[0].stop.window, Some(window));
    let mut all = ids(&snap.stops);
    all.sort();
    assert_eq!(all, vec!["a", "b", "c"]);

    let second = engine
        .reoptimize(
            "r1",
            DisruptionEvent::WindowChanged { stop_id: "c".to_string(), window: Some(window) },
        )
        .expect("redelivery is benign");
    assert_eq!(second.taken, ActionTaken::NoChange);

    assert!(matches!(
        engine.reoptimize(
            "r1",
            DisruptionEvent::WindowChanged { stop_id: "zz".to_string(), window: None },
        ),
        Err(PlanError::UnknownStop { .. })
    ));
}

// ============================================================
// Concurrency
// ============================================================

#[test]
fn test_concurrent_remediations_serialize_per_route() {
    let engine = Arc::new(engine());
    activate(
        &engine,
        "r1",
        vec![
            stop("a", 0.01, 0.0),
            stop("b", 0.02, 0.0),
            stop("c", 0.03, 0.0),
            stop("d", 0.04, 0.0),
        ],
    );

    let cancel_b = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || {
            engine.reoptimize("r1", DisruptionEvent::StopCancelled { stop_id: "b".to_string() })
        })
    };
    let cancel_c = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || {
            engine.reoptimize("r1", DisruptionEvent::StopCancelled { stop_id: "c".to_string() })
        })
    };

    assert!(cancel_b.join().expect("thread completes").is_ok());
    assert!(cancel_c.join().expect("thread completes").is_ok());

    let snap = engine.snapshot("r1").unwrap();
    assert_eq!(ids(&snap.stops), vec!["a", "d"]);
    assert_eq!(snap.removed.len(), 2);
    for id in ["b", "c"] {
        assert_eq!(
            snap.stops.iter().filter(|p| p.stop.id == id).count()
                + snap.removed.iter().filter(|s| s.id == id).count(),
            1,
            "{} appears exactly once",
            id
        );
    }
}

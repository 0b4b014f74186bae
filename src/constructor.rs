//! Greedy window- and priority-aware tour construction.
//!
//! Candidates are gated by priority tier: among the feasible stops the best
//! tier present is served first, and within a tier the pick minimizes time
//! to service: effective travel time (base time scaled by the traffic factor
//! at the estimated arrival hour) plus any forced wait for the window to
//! open. Ties go to the earlier window end, then stable
//! input order. A stop whose window cannot be met under the grace tolerance
//! is never dropped: when no candidate is feasible the globally nearest one
//! is taken anyway and will surface as projected-late.

use tracing::debug;

use crate::model::{Coord, Priority, Stop};
use crate::planner::PlanOptions;
use crate::provider::Estimator;
use crate::schedule::effective_leg;
use crate::traffic::TrafficModel;

const TIME_EPS: f64 = 1e-9;

/// Orders `stops` into a visit sequence starting from `origin` at
/// `start_min`. Returns a permutation of the input; never refuses a stop.
pub(crate) fn construct(
    origin: Coord,
    start_min: f64,
    stops: &[Stop],
    est: &Estimator<'_>,
    traffic: &TrafficModel,
    opts: &PlanOptions,
) -> Vec<Stop> {
    if stops.is_empty() {
        return Vec::new();
    }

    // (input index, stop); the index is the stable tie-break.
    let mut remaining: Vec<(usize, Stop)> = stops.iter().cloned().enumerate().collect();
    let mut order = Vec::with_capacity(stops.len());
    let mut current = origin;
    let mut clock = start_min;

    while !remaining.is_empty() {
        let pick = select_next(current, clock, &remaining, est, traffic, opts);
        let (_, stop) = remaining.remove(pick);

        // Advance the clock the same way the scheduler will.
        let leg = effective_leg(est, traffic, current, stop.coord, clock);
        let arrival = clock + leg.effective_min;
        let wait = stop
            .window
            .map(|w| (w.start_min as f64 - arrival).max(0.0))
            .unwrap_or(0.0);
        clock = arrival + wait + stop.service_min;
        current = stop.coord;
        order.push(stop);
    }

    debug!(stops = order.len(), "constructed initial tour");
    order
}

struct Candidate {
    index: usize,
    cost_min: f64,
    distance_km: f64,
    window_end: u32,
    priority: Priority,
    feasible: bool,
}

/// Index into `remaining` of the next stop to visit.
fn select_next(
    current: Coord,
    clock: f64,
    remaining: &[(usize, Stop)],
    est: &Estimator<'_>,
    traffic: &TrafficModel,
    opts: &PlanOptions,
) -> usize {
    let candidates: Vec<Candidate> = remaining
        .iter()
        .enumerate()
        .map(|(index, (_, stop))| {
            let leg = effective_leg(est, traffic, current, stop.coord, clock);
            let arrival = clock + leg.effective_min;
            let (feasible, wait) = match stop.window {
                Some(window) => (
                    arrival <= window.end_min as f64 + opts.grace_min,
                    (window.start_min as f64 - arrival).max(0.0),
                ),
                None => (true, 0.0),
            };
            Candidate {
                index,
                // Time until service can start: forced waiting for a window
                // to open counts against a candidate just like driving.
                cost_min: leg.effective_min + wait,
                distance_km: leg.distance_km,
                window_end: stop.window_end_or_max(),
                priority: stop.priority,
                feasible,
            }
        })
        .collect();

    let best_tier = candidates
        .iter()
        .filter(|c| c.feasible)
        .map(|c| c.priority)
        .min();

    match best_tier {
        Some(tier) => candidates
            .iter()
            .filter(|c| c.feasible && c.priority == tier)
            .fold(None::<&Candidate>, |best, c| match best {
                None => Some(c),
                Some(b) if beats(c, b) => Some(c),
                Some(b) => Some(b),
            })
            .map(|c| c.index)
            .unwrap_or(0),
        // Nothing feasible: take the globally nearest stop regardless of
        // tier; it will be marked projected-late by the scheduler.
        None => candidates
            .iter()
            .fold(None::<&Candidate>, |best, c| match best {
                None => Some(c),
                Some(b) if c.distance_km + TIME_EPS < b.distance_km => Some(c),
                Some(b) => Some(b),
            })
            .map(|c| c.index)
            .unwrap_or(0),
    }
}

/// Within a tier: faster wins; on a time tie the earlier window end wins;
/// otherwise the earlier input position (iteration order) stays.
fn beats(challenger: &Candidate, incumbent: &Candidate) -> bool {
    if challenger.cost_min + TIME_EPS < incumbent.cost_min {
        return true;
    }
    if incumbent.cost_min + TIME_EPS < challenger.cost_min {
        return false;
    }
    challenger.window_end < incumbent.window_end
}

//! Arrival-time simulation shared by construction, refinement, and
//! re-optimization.
//!
//! One walk of a stop sequence is the single source of truth for projected
//! arrivals: base leg from the estimator, traffic factor at the estimated
//! arrival hour, waiting for windows that have not opened, dwell time at the
//! door. Everything that evaluates a candidate ordering goes through here.

use crate::model::{Coord, PlannedStop, Stop};
use crate::planner::PlanOptions;
use crate::provider::Estimator;
use crate::traffic::{TrafficModel, hour_of};

/// A leg with the traffic factor applied.
#[derive(Debug, Clone, Copy)]
pub(crate) struct EffectiveLeg {
    pub distance_km: f64,
    pub effective_min: f64,
}

/// Base leg scaled by the traffic factor at the estimated arrival hour.
pub(crate) fn effective_leg(
    est: &Estimator<'_>,
    traffic: &TrafficModel,
    from: Coord,
    to: Coord,
    clock_min: f64,
) -> EffectiveLeg {
    let leg = est.leg(from, to);
    let hour = hour_of(clock_min + leg.duration_min);
    let factor = traffic.segment_factor(hour, from, to);
    EffectiveLeg {
        distance_km: leg.distance_km,
        effective_min: leg.duration_min * factor,
    }
}

/// Projects timings for a stop sequence departing `origin` at `start_min`.
///
/// `base_km`/`base_min` seed the cumulative totals, so a suffix rebuilt
/// mid-route keeps route-level cumulatives monotone across the visited
/// prefix boundary.
pub(crate) fn schedule_stops(
    origin: Coord,
    start_min: f64,
    base_km: f64,
    base_min: f64,
    stops: &[Stop],
    est: &Estimator<'_>,
    traffic: &TrafficModel,
    opts: &PlanOptions,
) -> Vec<PlannedStop> {
    let mut plan = Vec::with_capacity(stops.len());
    let mut current = origin;
    let mut clock = start_min;
    let mut cum_km = base_km;
    let mut cum_travel = base_min;

    for stop in stops {
        let leg = effective_leg(est, traffic, current, stop.coord, clock);
        let arrival = clock + leg.effective_min;
        cum_km += leg.distance_km;
        cum_travel += leg.effective_min;

        let (wait, late) = match stop.window {
            Some(window) => {
                let wait = (window.start_min as f64 - arrival).max(0.0);
                let late = arrival > window.end_min as f64 + opts.grace_min;
                (wait, late)
            }
            None => (0.0, false),
        };
        let departure = arrival + wait + stop.service_min;

        plan.push(PlannedStop {
            stop: stop.clone(),
            arrival_min: arrival,
            departure_min: departure,
            wait_min: wait,
            cum_distance_km: cum_km,
            cum_travel_min: cum_travel,
            projected_late: late,
        });

        current = stop.coord;
        clock = departure;
    }

    plan
}

/// Weighted tour cost: effective travel minutes plus penalized lateness.
pub(crate) fn weighted_cost(plan: &[PlannedStop], opts: &PlanOptions) -> f64 {
    let travel = plan.last().map(|p| p.cum_travel_min).unwrap_or(0.0);
    let lateness: f64 = plan
        .iter()
        .filter_map(|p| {
            let window = p.stop.window?;
            let over = p.arrival_min - window.end_min as f64;
            (over > 0.0).then_some(over)
        })
        .sum();
    travel + opts.late_weight * lateness
}

/// Window satisfied within the grace tolerance.
pub(crate) fn meets_window(planned: &PlannedStop, opts: &PlanOptions) -> bool {
    match planned.stop.window {
        Some(window) => planned.arrival_min <= window.end_min as f64 + opts.grace_min,
        None => true,
    }
}

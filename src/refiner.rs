//! Constrained 2-opt local search.
//!
//! Reverses tour segments whenever that strictly lowers the weighted cost
//! without breaking any window that the current plan satisfies. Stops that
//! are already projected late do not veto a swap; their lateness is priced
//! into the cost instead. Full passes repeat until a pass finds nothing or
//! the pass cap (2N by default) is hit. A tour that no legal swap improves
//! is a local optimum, not a failure.

use std::collections::HashSet;

use tracing::debug;

use crate::model::{Coord, Stop};
use crate::planner::PlanOptions;
use crate::provider::Estimator;
use crate::schedule::{meets_window, schedule_stops, weighted_cost};
use crate::traffic::TrafficModel;

const COST_EPS: f64 = 1e-9;

/// Improves a tour in place. Returns a permutation of `order` whose weighted
/// cost is less than or equal to the input's.
pub(crate) fn refine(
    origin: Coord,
    start_min: f64,
    base_km: f64,
    base_min: f64,
    order: Vec<Stop>,
    est: &Estimator<'_>,
    traffic: &TrafficModel,
    opts: &PlanOptions,
) -> Vec<Stop> {
    let n = order.len();
    if n < 2 {
        return order;
    }

    let mut current = order;
    let mut plan = schedule_stops(origin, start_min, base_km, base_min, &current, est, traffic, opts);
    let mut cost = weighted_cost(&plan, opts);

    let max_passes = (opts.two_opt_pass_factor * n).max(1);
    for pass in 0..max_passes {
        let mut improved = false;

        for i in 0..n - 1 {
            for j in i + 1..n {
                let mut candidate = current.clone();
                candidate[i..=j].reverse();

                let candidate_plan =
                    schedule_stops(origin, start_min, base_km, base_min, &candidate, est, traffic, opts);
                let candidate_cost = weighted_cost(&candidate_plan, opts);

                if candidate_cost + COST_EPS < cost
                    && keeps_met_windows(&plan, &candidate_plan, opts)
                {
                    current = candidate;
                    plan = candidate_plan;
                    cost = candidate_cost;
                    improved = true;
                }
            }
        }

        if !improved {
            debug!(passes = pass + 1, cost, "2-opt converged");
            break;
        }
    }

    current
}

/// Every stop whose window the current plan satisfies must still be
/// satisfied by the candidate.
pub(crate) fn keeps_met_windows(
    current: &[crate::model::PlannedStop],
    candidate: &[crate::model::PlannedStop],
    opts: &PlanOptions,
) -> bool {
    let met: HashSet<&str> = current
        .iter()
        .filter(|p| p.stop.window.is_some() && meets_window(p, opts))
        .map(|p| p.stop.id.as_str())
        .collect();

    candidate
        .iter()
        .filter(|p| met.contains(p.stop.id.as_str()))
        .all(|p| meets_window(p, opts))
}

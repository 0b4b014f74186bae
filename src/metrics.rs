//! Route-level aggregates derived from a projected plan.

use serde::{Deserialize, Serialize};

use crate::model::PlannedStop;
use crate::planner::PlanOptions;

/// Metrics payload exposed alongside an optimized route.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RouteMetrics {
    pub total_distance_km: f64,
    /// Effective driving time (traffic-adjusted), minutes.
    pub total_travel_min: f64,
    /// Waiting for windows plus service at the door, minutes.
    pub total_dwell_min: f64,
    pub estimated_cost: f64,
    /// Percentage saved versus visiting the stops in naive input order.
    /// Negative values are possible in adversarial inputs and reported as-is.
    pub savings_pct: f64,
    /// Stops projected to miss their window beyond the grace tolerance.
    pub late_stops: usize,
    /// At least one leg came from the straight-line fallback.
    pub degraded: bool,
}

impl RouteMetrics {
    pub fn empty() -> Self {
        Self {
            total_distance_km: 0.0,
            total_travel_min: 0.0,
            total_dwell_min: 0.0,
            estimated_cost: 0.0,
            savings_pct: 0.0,
            late_stops: 0,
            degraded: false,
        }
    }
}

/// Monetary cost of a plan's distance and elapsed working time.
pub(crate) fn plan_cost(plan: &[PlannedStop], opts: &PlanOptions) -> f64 {
    let distance = plan.last().map(|p| p.cum_distance_km).unwrap_or(0.0);
    let travel = plan.last().map(|p| p.cum_travel_min).unwrap_or(0.0);
    let dwell: f64 = plan.iter().map(|p| p.wait_min + p.stop.service_min).sum();
    distance * opts.cost_per_km + (travel + dwell) * opts.cost_per_min
}

/// Derives metrics for `plan`, with `naive_plan` (the input order, scheduled
/// identically) as the savings baseline.
pub(crate) fn compute_metrics(
    plan: &[PlannedStop],
    naive_plan: &[PlannedStop],
    degraded: bool,
    opts: &PlanOptions,
) -> RouteMetrics {
    let total_distance_km = plan.last().map(|p| p.cum_distance_km).unwrap_or(0.0);
    let total_travel_min = plan.last().map(|p| p.cum_travel_min).unwrap_or(0.0);
    let total_dwell_min: f64 = plan.iter().map(|p| p.wait_min + p.stop.service_min).sum();
    let estimated_cost = plan_cost(plan, opts);

    let naive_cost = plan_cost(naive_plan, opts);
    let savings_pct = if naive_cost > 0.0 {
        (naive_cost - estimated_cost) / naive_cost * 100.0
    } else {
        0.0
    };

    RouteMetrics {
        total_distance_km,
        total_travel_min,
        total_dwell_min,
        estimated_cost,
        savings_pct,
        late_stops: plan.iter().filter(|p| p.projected_late).count(),
        degraded,
    }
}

//! Single-route optimization entry points.
//!
//! `optimize` validates the input, builds an initial tour, refines it with
//! 2-opt, and projects metrics against the naive input order. Provider
//! outages degrade to straight-line estimates instead of failing; infeasible
//! windows mark stops late instead of rejecting them. `optimize_batch` runs
//! many independent routes in parallel; routes share nothing mutable.

use std::collections::HashSet;

use rayon::prelude::*;
use tracing::info;

use crate::constructor::construct;
use crate::error::PlanError;
use crate::metrics::{RouteMetrics, compute_metrics};
use crate::model::{Origin, Route, RouteStatus, Stop};
use crate::provider::Estimator;
use crate::refiner::refine;
use crate::schedule::schedule_stops;
use crate::traffic::TrafficModel;
use crate::traits::DistanceProvider;

/// Tuning knobs for construction, refinement, and remediation.
#[derive(Debug, Clone)]
pub struct PlanOptions {
    /// Planned departure from the origin, minutes from midnight.
    pub departure_min: f64,
    /// Tolerance past a window end before a stop counts as late.
    pub grace_min: f64,
    /// Weight of lateness minutes in the refiner's cost.
    pub late_weight: f64,
    pub cost_per_km: f64,
    pub cost_per_min: f64,
    /// 2-opt pass cap is this factor times the stop count.
    pub two_opt_pass_factor: usize,
    /// HEAVY_TRAFFIC below this factor is ignored.
    pub heavy_traffic_threshold: f64,
    /// ACCUMULATED_DELAY below this many minutes is ignored.
    pub delay_threshold_min: f64,
    /// A window ending within this horizon counts as "soon" for promotion.
    pub soon_window_min: f64,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self {
            departure_min: 8.0 * 60.0,
            grace_min: 10.0,
            late_weight: 3.0,
            cost_per_km: 2.5,
            cost_per_min: 0.8,
            two_opt_pass_factor: 2,
            heavy_traffic_threshold: 1.5,
            delay_threshold_min: 15.0,
            soon_window_min: 60.0,
        }
    }
}

/// A planned route plus its metrics.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizedRoute {
    pub route: Route,
    pub metrics: RouteMetrics,
}

/// Plans a visit order for `stops` from `origin`.
///
/// Returns a permutation of exactly the input stops for any N >= 0; an empty
/// stop list yields an empty route. Identical inputs and provider responses
/// produce identical orderings.
pub fn optimize(
    route_id: impl Into<String>,
    origin: Origin,
    stops: Vec<Stop>,
    provider: &dyn DistanceProvider,
    traffic: &TrafficModel,
    opts: &PlanOptions,
) -> Result<OptimizedRoute, PlanError> {
    let route_id = route_id.into();
    validate(&origin, &stops)?;

    let est = Estimator::new(provider);
    let start = opts.departure_min;

    let naive_plan = schedule_stops(origin.coord, start, 0.0, 0.0, &stops, &est, traffic, opts);

    let order = construct(origin.coord, start, &stops, &est, traffic, opts);
    let order = refine(origin.coord, start, 0.0, 0.0, order, &est, traffic, opts);
    let plan = schedule_stops(origin.coord, start, 0.0, 0.0, &order, &est, traffic, opts);

    let metrics = compute_metrics(&plan, &naive_plan, est.degraded(), opts);
    info!(
        route_id = %route_id,
        stops = plan.len(),
        total_km = metrics.total_distance_km,
        savings_pct = metrics.savings_pct,
        late = metrics.late_stops,
        degraded = metrics.degraded,
        "route optimized"
    );

    let route = Route {
        id: route_id,
        origin,
        status: RouteStatus::Planned,
        stops: plan,
        next_pos: 0,
        departure_min: start,
        degraded: metrics.degraded,
        removed: Vec::new(),
    };

    Ok(OptimizedRoute { route, metrics })
}

/// One unit of work for `optimize_batch`.
#[derive(Debug, Clone)]
pub struct PlanRequest {
    pub route_id: String,
    pub origin: Origin,
    pub stops: Vec<Stop>,
}

/// Optimizes independent routes in parallel. Each request gets its own
/// estimator; only the provider and traffic model are shared, read-only.
pub fn optimize_batch(
    requests: Vec<PlanRequest>,
    provider: &(dyn DistanceProvider + Sync),
    traffic: &TrafficModel,
    opts: &PlanOptions,
) -> Vec<Result<OptimizedRoute, PlanError>> {
    requests
        .into_par_iter()
        .map(|req| optimize(req.route_id, req.origin, req.stops, provider as &dyn DistanceProvider, traffic, opts))
        .collect()
}

fn validate(origin: &Origin, stops: &[Stop]) -> Result<(), PlanError> {
    if !origin.coord.is_valid() {
        return Err(PlanError::invalid_coordinate("origin", origin.coord.lat, origin.coord.lng));
    }

    let mut seen = HashSet::with_capacity(stops.len());
    for stop in stops {
        if !stop.coord.is_valid() {
            return Err(PlanError::invalid_coordinate(&stop.id, stop.coord.lat, stop.coord.lng));
        }
        if !seen.insert(stop.id.as_str()) {
            return Err(PlanError::duplicate_stop(&stop.id));
        }
    }
    Ok(())
}

//! Live re-optimization of active routes.
//!
//! The engine owns registered routes for the duration of their execution,
//! drives the lifecycle state machine, and applies disruption events to the
//! unvisited suffix only. Visited history is never reordered or restatused.
//!
//! Remediations on the same route are serialized by a per-route mutex: a
//! disruption arriving mid-remediation waits and is then re-derived against
//! the just-applied state. A route that turns CANCELLED while an event waits
//! discards that event's result instead of applying it. Routes are
//! independent of each other; remediations on different routes run
//! concurrently.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{info, warn};

use crate::constructor::construct;
use crate::error::PlanError;
use crate::model::{
    ActionTaken, DisruptionEvent, RemediationAction, Route, RouteStatus, Stop, StopStatus,
};
use crate::planner::PlanOptions;
use crate::provider::Estimator;
use crate::refiner::{keeps_met_windows, refine};
use crate::schedule::{meets_window, schedule_stops, weighted_cost};
use crate::traffic::TrafficModel;
use crate::traits::DistanceProvider;

pub struct Engine {
    provider: Arc<dyn DistanceProvider + Send + Sync>,
    traffic: Arc<TrafficModel>,
    opts: PlanOptions,
    routes: Mutex<HashMap<String, Arc<Mutex<Route>>>>,
}

impl Engine {
    pub fn new(
        provider: Arc<dyn DistanceProvider + Send + Sync>,
        traffic: Arc<TrafficModel>,
        opts: PlanOptions,
    ) -> Self {
        Self {
            provider,
            traffic,
            opts,
            routes: Mutex::new(HashMap::new()),
        }
    }

    /// Takes ownership of a planned route for execution.
    pub fn register(&self, route: Route) -> Result<(), PlanError> {
        let mut routes = lock(&self.routes);
        if routes.contains_key(&route.id) {
            return Err(PlanError::duplicate_route(&route.id));
        }
        routes.insert(route.id.clone(), Arc::new(Mutex::new(route)));
        Ok(())
    }

    /// Current state of a route, cloned.
    pub fn snapshot(&self, route_id: &str) -> Result<Route, PlanError> {
        let slot = self.slot(route_id)?;
        let route = lock(&slot);
        Ok(route.clone())
    }

    /// Removes a terminated route from the engine and returns it for
    /// archival. The route must be COMPLETED or CANCELLED.
    pub fn archive(&self, route_id: &str) -> Result<Route, PlanError> {
        let slot = self.slot(route_id)?;
        {
            let route = lock(&slot);
            if !route.status.is_terminal() {
                return Err(PlanError::route_inactive(route_id, route.status));
            }
        }
        let mut routes = lock(&self.routes);
        let slot = routes
            .remove(route_id)
            .ok_or_else(|| PlanError::unknown_route(route_id))?;
        drop(routes);
        let route = lock(&slot);
        Ok(route.clone())
    }

    pub fn start(&self, route_id: &str) -> Result<RouteStatus, PlanError> {
        self.transition(route_id, &[RouteStatus::Planned], RouteStatus::Active)
    }

    pub fn pause(&self, route_id: &str) -> Result<RouteStatus, PlanError> {
        self.transition(route_id, &[RouteStatus::Active], RouteStatus::Paused)
    }

    pub fn resume(&self, route_id: &str) -> Result<RouteStatus, PlanError> {
        self.transition(route_id, &[RouteStatus::Paused], RouteStatus::Active)
    }

    pub fn complete(&self, route_id: &str) -> Result<RouteStatus, PlanError> {
        self.transition(route_id, &[RouteStatus::Active], RouteStatus::Completed)
    }

    /// Cancels from any non-terminal state. Terminal states are absorbing.
    pub fn cancel(&self, route_id: &str) -> Result<RouteStatus, PlanError> {
        self.transition(
            route_id,
            &[RouteStatus::Planned, RouteStatus::Active, RouteStatus::Paused],
            RouteStatus::Cancelled,
        )
    }

    /// The driver departed toward the next stop.
    pub fn mark_en_route(&self, route_id: &str) -> Result<String, PlanError> {
        self.set_next_status(route_id, StopStatus::EnRoute, false)
    }

    /// The driver arrived at the next stop.
    pub fn mark_arrived(&self, route_id: &str) -> Result<String, PlanError> {
        self.set_next_status(route_id, StopStatus::Arrived, false)
    }

    /// The next stop was delivered; the suffix boundary advances. Completes
    /// the route when nothing remains.
    pub fn mark_delivered(&self, route_id: &str) -> Result<String, PlanError> {
        self.set_next_status(route_id, StopStatus::Delivered, true)
    }

    /// Delivery at the next stop failed; the suffix boundary still advances.
    pub fn mark_failed(&self, route_id: &str) -> Result<String, PlanError> {
        self.set_next_status(route_id, StopStatus::Failed, true)
    }

    /// Applies one disruption event to a route's unvisited suffix.
    pub fn reoptimize(
        &self,
        route_id: &str,
        event: DisruptionEvent,
    ) -> Result<RemediationAction, PlanError> {
        let slot = self.slot(route_id)?;
        let mut route = lock(&slot);

        // Cancelled while this event waited for the lock: drop the result.
        if route.status == RouteStatus::Cancelled {
            return Ok(RemediationAction::unchanged(ActionTaken::Discarded));
        }
        if route.status != RouteStatus::Active {
            return Err(PlanError::route_inactive(route_id, route.status));
        }

        let pre_km = route.total_distance_km();
        let pre_min = route.total_elapsed_min();
        let est = Estimator::new(&*self.provider);

        let taken = self.apply_event(&mut route, &event, &est)?;

        route.degraded |= est.degraded();
        let action = RemediationAction {
            taken: taken.0,
            affected: taken.1,
            delta_distance_km: route.total_distance_km() - pre_km,
            delta_time_min: route.total_elapsed_min() - pre_min,
        };
        info!(
            route_id = %route.id,
            action = ?action.taken,
            affected = action.affected,
            delta_km = action.delta_distance_km,
            delta_min = action.delta_time_min,
            "disruption remediated"
        );
        Ok(action)
    }

    fn apply_event(
        &self,
        route: &mut Route,
        event: &DisruptionEvent,
        est: &Estimator<'_>,
    ) -> Result<(ActionTaken, usize), PlanError> {
        match event {
            DisruptionEvent::StopCancelled { stop_id } => {
                self.remove_stop(route, stop_id, StopStatus::Cancelled, est, true)
            }
            DisruptionEvent::AddressUnresolved { stop_id } => {
                let result = self.remove_stop(route, stop_id, StopStatus::Failed, est, false)?;
                if result.0 != ActionTaken::NoChange {
                    warn!(route_id = %route.id, stop_id = %stop_id, "address unresolved, stop failed");
                    return Ok((ActionTaken::StopFailed, result.1));
                }
                Ok(result)
            }
            DisruptionEvent::HeavyTraffic { factor } => {
                if *factor < self.opts.heavy_traffic_threshold {
                    return Ok((ActionTaken::NoChange, 0));
                }
                let before = suffix_ids(route);
                let mut suffix = suffix_stops(route);
                // Urgency order: earliest window end first, windowless last.
                // Refinement then runs under the reported congestion, so a
                // swap back toward distance order is only accepted if the
                // windows hold at the surged travel times too.
                suffix.sort_by_key(|s| s.window_end_or_max());
                self.rebuild(route, suffix, est, true, *factor);
                Ok((ActionTaken::SuffixResequenced, changed_count(&before, &suffix_ids(route))))
            }
            DisruptionEvent::AccumulatedDelay { delay_min } => {
                if *delay_min < self.opts.delay_threshold_min {
                    return Ok((ActionTaken::NoChange, 0));
                }
                let before = suffix_ids(route);
                // Persist the slip at the resume point: every later rebuild,
                // whatever event triggers it, schedules from the delayed
                // clock instead of the original plan.
                if route.next_pos == 0 {
                    route.departure_min += *delay_min;
                } else {
                    let last = route.next_pos - 1;
                    route.stops[last].departure_min += *delay_min;
                }
                let horizon = route.resume_min() + self.opts.soon_window_min;
                let suffix = suffix_stops(route);
                let (promoted, rest): (Vec<Stop>, Vec<Stop>) = suffix.into_iter().partition(|s| {
                    s.priority == crate::model::Priority::High
                        || s.window.map(|w| (w.end_min as f64) <= horizon).unwrap_or(false)
                });
                let mut reordered = promoted;
                reordered.extend(rest);
                self.rebuild(route, reordered, est, false, 1.0);
                Ok((ActionTaken::PriorityPromoted, changed_count(&before, &suffix_ids(route))))
            }
            DisruptionEvent::RecipientAbsent { stop_id } => {
                if route.removed.iter().any(|s| s.id == *stop_id) {
                    return Ok((ActionTaken::NoChange, 0));
                }
                let pos = match route.position_of(stop_id) {
                    Some(pos) => pos,
                    None => return Err(PlanError::unknown_stop(&route.id, stop_id)),
                };
                if pos < route.next_pos {
                    // Already visited history.
                    return Ok((ActionTaken::NoChange, 0));
                }
                let mut suffix = suffix_stops(route);
                let idx = pos - route.next_pos;
                if suffix[idx].status == StopStatus::SkippedRetry && idx == suffix.len() - 1 {
                    return Ok((ActionTaken::NoChange, 0));
                }
                let mut stop = suffix.remove(idx);
                stop.status = StopStatus::SkippedRetry;
                suffix.push(stop);
                let before = suffix_ids(route);
                self.rebuild(route, suffix, est, false, 1.0);
                Ok((ActionTaken::StopDeferred, changed_count(&before, &suffix_ids(route)).max(1)))
            }
            DisruptionEvent::NewUrgentStop { stop } => {
                if !stop.coord.is_valid() {
                    return Err(PlanError::invalid_coordinate(&stop.id, stop.coord.lat, stop.coord.lng));
                }
                if route.contains(&stop.id) {
                    return Ok((ActionTaken::NoChange, 0));
                }
                let before = suffix_ids(route);
                let suffix = suffix_stops(route);
                let inserted = self.cheapest_insertion(route, suffix, stop.clone(), est);
                self.rebuild(route, inserted, est, false, 1.0);
                Ok((ActionTaken::StopInserted, changed_count(&before, &suffix_ids(route)).max(1)))
            }
            DisruptionEvent::WindowChanged { stop_id, window } => {
                let pos = match route.position_of(stop_id) {
                    Some(pos) => pos,
                    None => {
                        if route.removed.iter().any(|s| s.id == *stop_id) {
                            return Ok((ActionTaken::NoChange, 0));
                        }
                        return Err(PlanError::unknown_stop(&route.id, stop_id));
                    }
                };
                if pos < route.next_pos {
                    return Ok((ActionTaken::NoChange, 0));
                }
                if route.stops[pos].stop.window == *window {
                    return Ok((ActionTaken::NoChange, 0));
                }
                let before = suffix_ids(route);
                let mut suffix = suffix_stops(route);
                suffix[pos - route.next_pos].window = *window;
                // Window changes can invalidate the whole suffix ordering:
                // re-run construction, then refine.
                let order = construct(
                    route.resume_coord(),
                    route.resume_min(),
                    &suffix,
                    est,
                    &self.traffic,
                    &self.opts,
                );
                self.rebuild(route, order, est, true, 1.0);
                Ok((ActionTaken::WindowUpdated, changed_count(&before, &suffix_ids(route)).max(1)))
            }
        }
    }

    /// Shared path of STOP_CANCELLED and ADDRESS_UNRESOLVED: take the stop
    /// out of active routing with a terminal status and reschedule the rest.
    fn remove_stop(
        &self,
        route: &mut Route,
        stop_id: &str,
        terminal: StopStatus,
        est: &Estimator<'_>,
        refine_after: bool,
    ) -> Result<(ActionTaken, usize), PlanError> {
        if route.removed.iter().any(|s| s.id == stop_id) {
            return Ok((ActionTaken::NoChange, 0));
        }
        let pos = match route.position_of(stop_id) {
            Some(pos) => pos,
            None => return Err(PlanError::unknown_stop(&route.id, stop_id)),
        };
        if pos < route.next_pos {
            return Ok((ActionTaken::NoChange, 0));
        }

        let before = suffix_ids(route);
        let mut suffix = suffix_stops(route);
        let mut stop = suffix.remove(pos - route.next_pos);
        stop.status = terminal;
        route.removed.push(stop);
        self.rebuild(route, suffix, est, refine_after, 1.0);
        Ok((ActionTaken::StopRemoved, changed_count(&before, &suffix_ids(route)).max(1)))
    }

    /// Inserts `stop` into the suffix at the position with the smallest
    /// marginal weighted cost, preferring positions that keep every
    /// currently-met window met and meet the new stop's own window.
    fn cheapest_insertion(
        &self,
        route: &Route,
        suffix: Vec<Stop>,
        stop: Stop,
        est: &Estimator<'_>,
    ) -> Vec<Stop> {
        let origin = route.resume_coord();
        let start = route.resume_min();
        let (base_km, base_min) = route.resume_base();

        let current_plan = schedule_stops(
            origin, start, base_km, base_min, &suffix, est, &self.traffic, &self.opts,
        );

        let mut best_feasible: Option<(f64, usize)> = None;
        let mut best_any: Option<(f64, usize)> = None;

        for pos in 0..=suffix.len() {
            let mut candidate = suffix.clone();
            candidate.insert(pos, stop.clone());
            let plan = schedule_stops(
                origin, start, base_km, base_min, &candidate, est, &self.traffic, &self.opts,
            );
            let cost = weighted_cost(&plan, &self.opts);

            if best_any.map(|(c, _)| cost < c).unwrap_or(true) {
                best_any = Some((cost, pos));
            }

            let new_stop_ok = plan
                .iter()
                .find(|p| p.stop.id == stop.id)
                .map(|p| meets_window(p, &self.opts))
                .unwrap_or(false);
            if new_stop_ok && keeps_met_windows(&current_plan, &plan, &self.opts) {
                if best_feasible.map(|(c, _)| cost < c).unwrap_or(true) {
                    best_feasible = Some((cost, pos));
                }
            }
        }

        let pos = best_feasible.or(best_any).map(|(_, p)| p).unwrap_or(0);
        let mut result = suffix;
        result.insert(pos, stop);
        result
    }

    /// Reschedules `order` as the new suffix, optionally refining first.
    /// A `surge` above 1.0 overlays that congestion multiplier on the
    /// traffic model for this rebuild only. The visited prefix and
    /// route-level cumulatives are preserved.
    fn rebuild(
        &self,
        route: &mut Route,
        order: Vec<Stop>,
        est: &Estimator<'_>,
        refine_after: bool,
        surge: f64,
    ) {
        let origin = route.resume_coord();
        let start = route.resume_min();
        let (base_km, base_min) = route.resume_base();

        let surged;
        let traffic: &TrafficModel = if surge > 1.0 {
            surged = self.traffic.surged(surge);
            &surged
        } else {
            &*self.traffic
        };

        let order = if refine_after {
            refine(origin, start, base_km, base_min, order, est, traffic, &self.opts)
        } else {
            order
        };
        let plan = schedule_stops(origin, start, base_km, base_min, &order, est, traffic, &self.opts);

        route.stops.truncate(route.next_pos);
        route.stops.extend(plan);
    }

    fn transition(
        &self,
        route_id: &str,
        from: &[RouteStatus],
        to: RouteStatus,
    ) -> Result<RouteStatus, PlanError> {
        let slot = self.slot(route_id)?;
        let mut route = lock(&slot);
        if !from.contains(&route.status) {
            return Err(PlanError::route_inactive(route_id, route.status));
        }
        route.status = to;
        info!(route_id = %route_id, status = ?to, "route status changed");
        Ok(to)
    }

    fn set_next_status(
        &self,
        route_id: &str,
        status: StopStatus,
        advance: bool,
    ) -> Result<String, PlanError> {
        let slot = self.slot(route_id)?;
        let mut route = lock(&slot);
        if route.status != RouteStatus::Active {
            return Err(PlanError::route_inactive(route_id, route.status));
        }
        let next_pos = route.next_pos;
        let planned = match route.stops.get_mut(next_pos) {
            Some(planned) => planned,
            None => return Err(PlanError::route_inactive(route_id, route.status)),
        };
        planned.stop.status = status;
        let stop_id = planned.stop.id.clone();
        if advance {
            route.next_pos += 1;
            if route.next_pos == route.stops.len() {
                route.status = RouteStatus::Completed;
                info!(route_id = %route_id, "route completed");
            }
        }
        Ok(stop_id)
    }

    fn slot(&self, route_id: &str) -> Result<Arc<Mutex<Route>>, PlanError> {
        lock(&self.routes)
            .get(route_id)
            .cloned()
            .ok_or_else(|| PlanError::unknown_route(route_id))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn suffix_stops(route: &Route) -> Vec<Stop> {
    route.suffix().iter().map(|p| p.stop.clone()).collect()
}

fn suffix_ids(route: &Route) -> Vec<String> {
    route.suffix().iter().map(|p| p.stop.id.clone()).collect()
}

/// Stops whose suffix position changed, plus stops present in only one of
/// the two orderings.
fn changed_count(before: &[String], after: &[String]) -> usize {
    let mut changed = 0;
    for (i, id) in before.iter().enumerate() {
        match after.iter().position(|a| a == id) {
            Some(j) if j == i => {}
            _ => changed += 1,
        }
    }
    changed += after
        .iter()
        .filter(|id| !before.contains(id))
        .count();
    changed
}

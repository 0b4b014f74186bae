//! Core domain types for the delivery planner.
//!
//! These cross a storage boundary owned by collaborators (the engine receives
//! a route snapshot and returns an updated one), so everything here is
//! serde-derived. Statuses and disruption kinds are exhaustive tagged
//! variants rather than strings.

use serde::{Deserialize, Serialize};

/// Geographic coordinate (latitude, longitude).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coord {
    pub lat: f64,
    pub lng: f64,
}

impl Coord {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Finite and within WGS84 bounds.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }

    /// Stable string key at ~0.1m precision, for caching and dedup.
    pub fn key(&self) -> String {
        format!("{:.6},{:.6}", self.lat, self.lng)
    }
}

/// Delivery window in minutes from midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start_min: u32,
    pub end_min: u32,
}

impl TimeWindow {
    /// Creates a window, swapping the bounds if they arrive reversed.
    pub fn new(start_min: u32, end_min: u32) -> Self {
        if start_min <= end_min {
            Self { start_min, end_min }
        } else {
            Self { start_min: end_min, end_min: start_min }
        }
    }

    pub fn contains(&self, minute: f64) -> bool {
        minute >= self.start_min as f64 && minute <= self.end_min as f64
    }
}

/// Priority tier. Declaration order gives `High < Medium < Low`, so sorting
/// ascending puts high-priority stops first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    High,
    Medium,
    Low,
}

/// Lifecycle of a single stop.
///
/// `SkippedRetry` is the recipient-absent case: the stop stays routable at
/// the end of the suffix. `Skipped` is terminal abandonment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StopStatus {
    Pending,
    EnRoute,
    Arrived,
    Delivered,
    Failed,
    Skipped,
    SkippedRetry,
    Cancelled,
}

impl StopStatus {
    /// Terminal statuses are immutable visited history.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StopStatus::Delivered | StopStatus::Failed | StopStatus::Skipped | StopStatus::Cancelled
        )
    }
}

/// A delivery point to be routed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stop {
    pub id: String,
    pub coord: Coord,
    pub address: String,
    pub window: Option<TimeWindow>,
    pub priority: Priority,
    /// Dwell time at the door, in minutes.
    pub service_min: f64,
    pub status: StopStatus,
    /// Tag of the import subsystem or supplier that produced this stop.
    pub supplier: Option<String>,
}

impl Stop {
    pub fn new(id: impl Into<String>, coord: Coord) -> Self {
        Self {
            id: id.into(),
            coord,
            address: String::new(),
            window: None,
            priority: Priority::Medium,
            service_min: 5.0,
            status: StopStatus::Pending,
            supplier: None,
        }
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    pub fn with_window(mut self, window: TimeWindow) -> Self {
        self.window = Some(window);
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_service_min(mut self, minutes: f64) -> Self {
        self.service_min = minutes;
        self
    }

    pub fn with_supplier(mut self, supplier: impl Into<String>) -> Self {
        self.supplier = Some(supplier.into());
        self
    }

    /// Window end as a sort key; windowless stops sort last.
    pub fn window_end_or_max(&self) -> u32 {
        self.window.map(|w| w.end_min).unwrap_or(u32::MAX)
    }
}

/// How the route origin was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OriginSource {
    GpsFix,
    Manual,
}

/// Route starting point. Immutable once the route begins.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Origin {
    pub coord: Coord,
    pub source: OriginSource,
}

impl Origin {
    pub fn gps(coord: Coord) -> Self {
        Self { coord, source: OriginSource::GpsFix }
    }

    pub fn manual(coord: Coord) -> Self {
        Self { coord, source: OriginSource::Manual }
    }
}

/// One scheduled entry of a route: a stop plus its projected timings.
///
/// Position indices are the vector indices, so they are dense and unique by
/// construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedStop {
    pub stop: Stop,
    /// Projected arrival, minutes from midnight.
    pub arrival_min: f64,
    /// Projected departure (arrival + wait + service).
    pub departure_min: f64,
    /// Waiting before the window opens.
    pub wait_min: f64,
    pub cum_distance_km: f64,
    pub cum_travel_min: f64,
    /// Arrival misses the window even under the grace tolerance.
    pub projected_late: bool,
}

/// Route lifecycle. `Completed` and `Cancelled` are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RouteStatus {
    Planned,
    Active,
    Paused,
    Completed,
    Cancelled,
}

impl RouteStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RouteStatus::Completed | RouteStatus::Cancelled)
    }
}

/// An ordered single-vehicle delivery route.
///
/// `next_pos` is the boundary between visited history (immutable, never
/// reordered) and the unvisited suffix the re-optimization engine may mutate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub id: String,
    pub origin: Origin,
    pub status: RouteStatus,
    pub stops: Vec<PlannedStop>,
    pub next_pos: usize,
    /// Planned departure from the origin, minutes from midnight. Pushed back
    /// when an acknowledged delay arrives before the route departs.
    pub departure_min: f64,
    /// At least one leg was estimated via the straight-line fallback.
    pub degraded: bool,
    /// Stops taken out of active routing (cancelled, unresolved address).
    /// Kept so re-delivered disruption events recognize them.
    pub removed: Vec<Stop>,
}

impl Route {
    pub fn visited(&self) -> &[PlannedStop] {
        &self.stops[..self.next_pos.min(self.stops.len())]
    }

    pub fn suffix(&self) -> &[PlannedStop] {
        &self.stops[self.next_pos.min(self.stops.len())..]
    }

    pub fn position_of(&self, stop_id: &str) -> Option<usize> {
        self.stops.iter().position(|p| p.stop.id == stop_id)
    }

    /// True if the stop id is anywhere on the route, including the removed
    /// archive.
    pub fn contains(&self, stop_id: &str) -> bool {
        self.position_of(stop_id).is_some() || self.removed.iter().any(|s| s.id == stop_id)
    }

    /// Where the vehicle resumes from: the last visited stop, or the origin.
    pub fn resume_coord(&self) -> Coord {
        if self.next_pos == 0 {
            self.origin.coord
        } else {
            self.stops[self.next_pos - 1].stop.coord
        }
    }

    /// When the vehicle resumes, minutes from midnight.
    pub fn resume_min(&self) -> f64 {
        if self.next_pos == 0 {
            self.departure_min
        } else {
            self.stops[self.next_pos - 1].departure_min
        }
    }

    /// Distance and travel time accumulated over the visited prefix.
    pub fn resume_base(&self) -> (f64, f64) {
        if self.next_pos == 0 {
            (0.0, 0.0)
        } else {
            let last = &self.stops[self.next_pos - 1];
            (last.cum_distance_km, last.cum_travel_min)
        }
    }

    /// Total planned distance in km.
    pub fn total_distance_km(&self) -> f64 {
        self.stops.last().map(|p| p.cum_distance_km).unwrap_or(0.0)
    }

    /// Total planned elapsed time (travel + waiting + service) in minutes.
    pub fn total_elapsed_min(&self) -> f64 {
        self.stops
            .last()
            .map(|p| p.departure_min - self.departure_min)
            .unwrap_or(0.0)
    }
}

/// A runtime occurrence requiring route adjustment. Each kind carries only
/// the fields it needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DisruptionEvent {
    StopCancelled { stop_id: String },
    /// Congestion multiplier currently observed on the road.
    HeavyTraffic { factor: f64 },
    /// Elapsed time exceeds the plan by this many minutes.
    AccumulatedDelay { delay_min: f64 },
    RecipientAbsent { stop_id: String },
    NewUrgentStop { stop: Stop },
    AddressUnresolved { stop_id: String },
    WindowChanged { stop_id: String, window: Option<TimeWindow> },
}

/// What a remediation actually did to the route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionTaken {
    StopRemoved,
    SuffixResequenced,
    PriorityPromoted,
    StopDeferred,
    StopInserted,
    StopFailed,
    WindowUpdated,
    /// Event below threshold or already applied; nothing to do.
    NoChange,
    /// Route was cancelled while the remediation waited; result dropped.
    Discarded,
}

/// Outcome of applying one disruption event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RemediationAction {
    pub taken: ActionTaken,
    /// Number of stops whose position or status changed.
    pub affected: usize,
    /// New total distance minus the pre-remediation total, km.
    pub delta_distance_km: f64,
    /// New total elapsed time minus the pre-remediation total, minutes.
    pub delta_time_min: f64,
}

impl RemediationAction {
    pub fn unchanged(taken: ActionTaken) -> Self {
        Self { taken, affected: 0, delta_distance_km: 0.0, delta_time_min: 0.0 }
    }
}

//! Shared test fixtures: deterministic providers and stop builders.

#![allow(dead_code)]

use delivery_planner::error::ProviderError;
use delivery_planner::model::{Coord, Origin, Priority, Stop, TimeWindow};
use delivery_planner::planner::PlanOptions;
use delivery_planner::traits::{DistanceProvider, Leg};

/// Manhattan grid: 1 km and 1 driving minute per 0.01 degree.
pub struct GridProvider;

impl DistanceProvider for GridProvider {
    fn leg(&self, from: Coord, to: Coord) -> Result<Leg, ProviderError> {
        let d = ((from.lat - to.lat).abs() + (from.lng - to.lng).abs()) * 100.0;
        Ok(Leg { distance_km: d, duration_min: d })
    }
}

/// Provider that is always down, forcing the straight-line fallback.
pub struct DownProvider;

impl DistanceProvider for DownProvider {
    fn leg(&self, _from: Coord, _to: Coord) -> Result<Leg, ProviderError> {
        Err(ProviderError::Malformed("backend offline".to_string()))
    }
}

pub fn origin() -> Origin {
    Origin::gps(Coord::new(0.0, 0.0))
}

/// Options with a 10:00 departure so the traffic factor stays flat.
pub fn flat_opts() -> PlanOptions {
    PlanOptions { departure_min: 600.0, ..PlanOptions::default() }
}

pub fn stop(id: &str, lat: f64, lng: f64) -> Stop {
    Stop::new(id, Coord::new(lat, lng))
}

pub fn windowed(id: &str, lat: f64, lng: f64, start_min: u32, end_min: u32) -> Stop {
    stop(id, lat, lng).with_window(TimeWindow::new(start_min, end_min))
}

pub fn prioritized(id: &str, lat: f64, lng: f64, priority: Priority) -> Stop {
    stop(id, lat, lng).with_priority(priority)
}

pub fn hm(hours: u32, minutes: u32) -> u32 {
    hours * 60 + minutes
}

pub fn ids(stops: &[delivery_planner::model::PlannedStop]) -> Vec<&str> {
    stops.iter().map(|p| p.stop.id.as_str()).collect()
}

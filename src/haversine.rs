//! Haversine distance provider (fallback when the routing backend is down).
//!
//! Uses great-circle distance scaled by a road-correction factor to
//! approximate driving distance. Less accurate than a real router but always
//! available and never fails.

use crate::error::ProviderError;
use crate::model::Coord;
use crate::traits::{DistanceProvider, Leg};

/// Average driving speed assumption for time estimation.
const DEFAULT_SPEED_KMH: f64 = 40.0;

/// Straight-line to road-distance correction. Urban road networks run
/// roughly 30% longer than the crow flies.
const DEFAULT_ROAD_CORRECTION: f64 = 1.3;

/// Earth radius in kilometers.
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Haversine-based distance provider.
#[derive(Debug, Clone)]
pub struct HaversineProvider {
    /// Assumed average driving speed in km/h.
    pub speed_kmh: f64,
    /// Multiplier applied to the great-circle distance.
    pub road_correction: f64,
}

impl Default for HaversineProvider {
    fn default() -> Self {
        Self {
            speed_kmh: DEFAULT_SPEED_KMH,
            road_correction: DEFAULT_ROAD_CORRECTION,
        }
    }
}

impl HaversineProvider {
    pub fn new(speed_kmh: f64, road_correction: f64) -> Self {
        Self { speed_kmh, road_correction }
    }

    /// Great-circle distance between two points in kilometers.
    pub fn haversine_km(from: Coord, to: Coord) -> f64 {
        let lat1_rad = from.lat.to_radians();
        let lat2_rad = to.lat.to_radians();
        let delta_lat = (to.lat - from.lat).to_radians();
        let delta_lng = (to.lng - from.lng).to_radians();

        let a = (delta_lat / 2.0).sin().powi(2)
            + lat1_rad.cos() * lat2_rad.cos() * (delta_lng / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().asin();

        EARTH_RADIUS_KM * c
    }
}

impl DistanceProvider for HaversineProvider {
    fn leg(&self, from: Coord, to: Coord) -> Result<Leg, ProviderError> {
        let distance_km = Self::haversine_km(from, to) * self.road_correction;
        let duration_min = distance_km / self.speed_kmh * 60.0;
        Ok(Leg { distance_km, duration_min })
    }
}

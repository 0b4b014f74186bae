//! Provider seam for point-to-point travel estimates.
//!
//! The planner treats the routing backend as a cacheable pure function of a
//! coordinate pair. Concrete backends (OSRM, haversine fallback) implement
//! `DistanceProvider`; memoization and degraded-mode fallback are wrappers
//! in the `provider` module.

use crate::error::ProviderError;
use crate::model::Coord;

/// One leg between two coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Leg {
    pub distance_km: f64,
    /// Base travel time, before any traffic factor.
    pub duration_min: f64,
}

/// Point-to-point base distance/time lookup.
///
/// Implementations must be deterministic for a given coordinate pair so
/// results can be memoized within an optimization pass.
pub trait DistanceProvider {
    fn leg(&self, from: Coord, to: Coord) -> Result<Leg, ProviderError>;
}

impl<P: DistanceProvider + ?Sized> DistanceProvider for &P {
    fn leg(&self, from: Coord, to: Coord) -> Result<Leg, ProviderError> {
        (**self).leg(from, to)
    }
}

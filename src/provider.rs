//! Estimator: memoization and degraded-mode fallback over a provider.
//!
//! A single optimization pass asks for the same coordinate pair many times
//! (greedy scans, 2-opt candidates), so legs are cached per pair. When the
//! primary provider fails, the leg is answered from the haversine fallback
//! instead and the estimator latches a "degraded" flag that the planner
//! copies onto the route. A provider outage therefore never fails a pass.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::warn;

use crate::haversine::HaversineProvider;
use crate::model::Coord;
use crate::traits::{DistanceProvider, Leg};

pub struct Estimator<'a> {
    primary: &'a dyn DistanceProvider,
    fallback: HaversineProvider,
    cache: Mutex<HashMap<(String, String), Leg>>,
    degraded: AtomicBool,
}

impl<'a> Estimator<'a> {
    pub fn new(primary: &'a dyn DistanceProvider) -> Self {
        Self::with_fallback(primary, HaversineProvider::default())
    }

    pub fn with_fallback(primary: &'a dyn DistanceProvider, fallback: HaversineProvider) -> Self {
        Self {
            primary,
            fallback,
            cache: Mutex::new(HashMap::new()),
            degraded: AtomicBool::new(false),
        }
    }

    /// Base leg between two coordinates. Infallible: a primary failure is
    /// answered from the fallback and flagged.
    pub fn leg(&self, from: Coord, to: Coord) -> Leg {
        let key = (from.key(), to.key());
        if let Some(leg) = self
            .cache
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(&key)
        {
            return *leg;
        }

        let leg = match self.primary.leg(from, to) {
            Ok(leg) => leg,
            Err(err) => {
                warn!(from = %key.0, to = %key.1, error = %err, "provider failed, using straight-line estimate");
                self.degraded.store(true, Ordering::Relaxed);
                match self.fallback.leg(from, to) {
                    Ok(leg) => leg,
                    // HaversineProvider::leg is infallible.
                    Err(_) => Leg { distance_km: 0.0, duration_min: 0.0 },
                }
            }
        };

        self.cache
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(key, leg);
        leg
    }

    /// True once any leg was answered from the fallback.
    pub fn degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }
}

//! Hour-of-day traffic factors with an optional learned correction.
//!
//! The base schedule is a fixed piecewise function of the hour. On top of it
//! a per-segment correction can be learned from observed vs estimated travel
//! times (damped average), so chronically mispredicted segments drift toward
//! reality. Lookups are deterministic and side-effect-free; the correction
//! store is guarded for concurrent callers.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::model::Coord;

/// Lower bound on any factor, so durations never collapse to zero.
const FACTOR_FLOOR: f64 = 0.5;

/// Default damping for learned corrections. Tunable; 0.3 keeps roughly the
/// last handful of observations relevant without chasing single outliers.
const DEFAULT_DAMPING: f64 = 0.3;

/// Observed/estimated ratios outside this band are clamped before blending,
/// so one bad reading cannot poison a segment.
const RATIO_CLAMP: (f64, f64) = (0.25, 4.0);

/// Fixed congestion multiplier for an hour of day.
///
/// Morning peak 07-09h, lunch 11-14h, evening peak 17-19h, night discount
/// 22-05h, flat otherwise.
pub fn schedule_factor(hour: u8) -> f64 {
    match hour % 24 {
        7..=9 => 1.5,
        11..=14 => 1.2,
        17..=19 => 1.6,
        22..=23 | 0..=5 => 0.8,
        _ => 1.0,
    }
}

/// Hour of day for a minutes-from-midnight clock that may run past 24h.
pub fn hour_of(minute: f64) -> u8 {
    let hour = (minute / 60.0).floor() as i64;
    hour.rem_euclid(24) as u8
}

#[derive(Debug)]
pub struct TrafficModel {
    damping: f64,
    corrections: RwLock<HashMap<String, f64>>,
    /// Congestion multiplier overlaid on every segment; 1.0 normally,
    /// raised in views built by [`TrafficModel::surged`].
    surge: f64,
}

impl Default for TrafficModel {
    fn default() -> Self {
        Self {
            damping: DEFAULT_DAMPING,
            corrections: RwLock::new(HashMap::new()),
            surge: 1.0,
        }
    }
}

impl TrafficModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the correction damping factor (0 disables learning, 1 takes
    /// each new observation wholesale).
    pub fn with_damping(mut self, damping: f64) -> Self {
        self.damping = damping.clamp(0.0, 1.0);
        self
    }

    /// Schedule factor for an hour, floored.
    pub fn factor(&self, hour: u8) -> f64 {
        schedule_factor(hour).max(FACTOR_FLOOR)
    }

    /// Schedule factor blended with the learned correction for the segment
    /// and any overlaid surge, floored.
    pub fn segment_factor(&self, hour: u8, from: Coord, to: Coord) -> f64 {
        let correction = self
            .corrections
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(&pair_key(from, to))
            .copied()
            .unwrap_or(1.0);
        (schedule_factor(hour) * correction * self.surge).max(FACTOR_FLOOR)
    }

    /// A snapshot of this model with a reported congestion multiplier
    /// overlaid on every segment. Used to evaluate candidate orderings under
    /// the congestion a disruption event reports, without mutating the
    /// shared model. Corrections are copied; observations recorded on the
    /// snapshot are not fed back.
    pub fn surged(&self, factor: f64) -> TrafficModel {
        let corrections = self
            .corrections
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone();
        TrafficModel {
            damping: self.damping,
            corrections: RwLock::new(corrections),
            surge: self.surge * factor.max(1.0),
        }
    }

    /// Feeds back an observed travel time against the estimate used for a
    /// segment. The stored correction moves by a damped step toward the
    /// observed/estimated ratio.
    pub fn record_observation(&self, from: Coord, to: Coord, observed_min: f64, estimated_min: f64) {
        if !(observed_min > 0.0) || !(estimated_min > 0.0) {
            return;
        }
        let ratio = (observed_min / estimated_min).clamp(RATIO_CLAMP.0, RATIO_CLAMP.1);
        let mut store = self
            .corrections
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let entry = store.entry(pair_key(from, to)).or_insert(1.0);
        *entry = (1.0 - self.damping) * *entry + self.damping * ratio;
    }
}

fn pair_key(from: Coord, to: Coord) -> String {
    format!("{}|{}", from.key(), to.key())
}

//! Planner error types.
//!
//! Every variant carries the route/stop ids the caller needs for diagnosis
//! plus a unix timestamp taken when the error was built. Infeasible windows
//! and provider outages are deliberately not here: the former become LATE
//! markings, the latter degrade to the straight-line fallback.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::model::RouteStatus;

/// Unix seconds at the moment of the call.
pub(crate) fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Failure of the external distance/traffic provider.
#[derive(Debug)]
pub enum ProviderError {
    Http(reqwest::Error),
    Malformed(String),
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::Http(err) => write!(f, "provider request failed: {}", err),
            ProviderError::Malformed(detail) => write!(f, "provider response malformed: {}", detail),
        }
    }
}

impl std::error::Error for ProviderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProviderError::Http(err) => Some(err),
            ProviderError::Malformed(_) => None,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        ProviderError::Http(err)
    }
}

/// Errors surfaced by `optimize`/`reoptimize` and the engine lifecycle API.
#[derive(Debug)]
pub enum PlanError {
    /// Non-finite or out-of-range coordinates, rejected before computation.
    /// The origin uses the sentinel stop id `"origin"`.
    InvalidCoordinate { stop_id: String, lat: f64, lng: f64, at: u64 },
    /// Two input stops share an id.
    DuplicateStop { stop_id: String, at: u64 },
    /// A route with this id is already registered.
    DuplicateRoute { route_id: String, at: u64 },
    UnknownRoute { route_id: String, at: u64 },
    UnknownStop { route_id: String, stop_id: String, at: u64 },
    /// Lifecycle misuse: the route is not in a status that allows the call.
    RouteInactive { route_id: String, status: RouteStatus, at: u64 },
}

impl PlanError {
    pub fn invalid_coordinate(stop_id: impl Into<String>, lat: f64, lng: f64) -> Self {
        PlanError::InvalidCoordinate { stop_id: stop_id.into(), lat, lng, at: now_secs() }
    }

    pub fn duplicate_stop(stop_id: impl Into<String>) -> Self {
        PlanError::DuplicateStop { stop_id: stop_id.into(), at: now_secs() }
    }

    pub fn duplicate_route(route_id: impl Into<String>) -> Self {
        PlanError::DuplicateRoute { route_id: route_id.into(), at: now_secs() }
    }

    pub fn unknown_route(route_id: impl Into<String>) -> Self {
        PlanError::UnknownRoute { route_id: route_id.into(), at: now_secs() }
    }

    pub fn unknown_stop(route_id: impl Into<String>, stop_id: impl Into<String>) -> Self {
        PlanError::UnknownStop { route_id: route_id.into(), stop_id: stop_id.into(), at: now_secs() }
    }

    pub fn route_inactive(route_id: impl Into<String>, status: RouteStatus) -> Self {
        PlanError::RouteInactive { route_id: route_id.into(), status, at: now_secs() }
    }
}

impl fmt::Display for PlanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanError::InvalidCoordinate { stop_id, lat, lng, .. } => {
                write!(f, "invalid coordinates ({}, {}) for stop {}", lat, lng, stop_id)
            }
            PlanError::DuplicateStop { stop_id, .. } => {
                write!(f, "duplicate stop id {}", stop_id)
            }
            PlanError::DuplicateRoute { route_id, .. } => {
                write!(f, "route {} already registered", route_id)
            }
            PlanError::UnknownRoute { route_id, .. } => {
                write!(f, "unknown route {}", route_id)
            }
            PlanError::UnknownStop { route_id, stop_id, .. } => {
                write!(f, "unknown stop {} on route {}", stop_id, route_id)
            }
            PlanError::RouteInactive { route_id, status, .. } => {
                write!(f, "route {} is {:?}, operation not allowed", route_id, status)
            }
        }
    }
}

impl std::error::Error for PlanError {}

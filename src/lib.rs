//! delivery-planner
//!
//! Single-vehicle delivery sequencing: builds a window- and priority-aware
//! visit order from an origin and a stop set, refines it with constrained
//! 2-opt, and adapts the unvisited suffix live as disruptions arrive.
//! Routing backends plug in through [`traits::DistanceProvider`]; outages
//! degrade to straight-line estimates instead of failing a pass.

mod constructor;
pub mod engine;
pub mod error;
pub mod haversine;
pub mod metrics;
pub mod model;
pub mod osrm;
pub mod planner;
pub mod provider;
mod refiner;
mod schedule;
pub mod traffic;
pub mod traits;

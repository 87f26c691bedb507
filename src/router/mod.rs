//! Earliest-arrival routing over a time-expanded subway network.
//!
//! Nodes are (stop, arrival time) pairs. A stop is left either by boarding the departure that
//! reaches a neighbouring stop soonest, or by walking a transfer. The search is A* ordered by
//! elapsed time plus a straight-line lower bound on the time still needed.

mod astar;
mod heuristic;
mod itinerary;
mod network;

use thiserror::Error;

use crate::timetable::{stop::StopId, time::Time};

pub use heuristic::{haversine, Heuristic};
pub use itinerary::{Itinerary, Leg, LegMode};
pub use network::TransitNetwork;

#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Walking time for a transfer that doesn't give a positive `min_transfer_time`
    pub default_transfer_secs: u32,
    /// Floor on the speed the distance estimate assumes. Raised automatically to the fastest
    /// edge in the network.
    pub min_speed_mps: f64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            default_transfer_secs: 180,
            min_speed_mps: 10.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteQuery {
    pub origin: StopId,
    pub destination: StopId,
    pub departure: Time,
}

impl RouteQuery {
    pub fn new(origin: StopId, destination: StopId, departure: Time) -> Self {
        Self {
            origin,
            destination,
            departure,
        }
    }
}

/// An unreachable destination is an outcome, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    Found(Itinerary),
    NoPath,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouteError {
    #[error("Unknown stop: {0}")]
    UnknownStop(StopId),
    #[error("Departure {departure} is outside the service day, which ends at {horizon}")]
    DepartureOutOfRange { departure: Time, horizon: Time },
}

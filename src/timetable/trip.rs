use std::fmt;

use serde::{Deserialize, Serialize};

use crate::timetable::{calendar::ServiceId, stop_time::StopTime};

#[derive(Clone, Debug, Eq, PartialEq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TripId(String);

impl TripId {
    pub fn new(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl fmt::Display for TripId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RouteId(String);

impl RouteId {
    pub fn new(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl fmt::Display for RouteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone)]
pub struct Trip {
    pub id: TripId,
    pub route_id: RouteId,
    pub service_id: ServiceId,
    pub direction_id: Option<u8>,
    /// Ordered by stop_sequence
    pub stop_times: Vec<StopTime>,
}

impl Trip {
    pub fn new(
        id: TripId,
        route_id: RouteId,
        service_id: ServiceId,
        direction_id: Option<u8>,
    ) -> Self {
        Self {
            id,
            route_id,
            service_id,
            direction_id,
            stop_times: vec![],
        }
    }

    pub fn add_stop_time(&mut self, stop_time: StopTime) {
        self.stop_times.push(stop_time);
    }
}

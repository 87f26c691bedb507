use anyhow::Context;
use geo_types::{LineString, Point};
use serde::Serialize;

use crate::{
    router::TransitNetwork,
    timetable::{
        stop::StopId,
        time::Time,
        trip::{RouteId, TripId},
    },
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LegMode {
    Ride { trip_id: TripId, route_id: RouteId },
    /// A transfer on foot between two different stops
    Walk,
}

/// One boarded trip, or one walk, from a board stop and time to an alight stop and time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Leg {
    pub mode: LegMode,
    pub from_stop: StopId,
    pub departure: Time,
    pub to_stop: StopId,
    pub arrival: Time,
    /// Every stop passed, both ends included
    pub stops: Vec<StopId>,
}

impl Leg {
    pub fn trip_id(&self) -> Option<&TripId> {
        match &self.mode {
            LegMode::Ride { trip_id, .. } => Some(trip_id),
            LegMode::Walk => None,
        }
    }

    pub fn duration_secs(&self) -> u32 {
        self.arrival.since(self.departure)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Itinerary {
    pub origin: StopId,
    pub destination: StopId,
    pub departure: Time,
    pub legs: Vec<Leg>,
}

impl Itinerary {
    pub fn arrival(&self) -> Time {
        self.legs.last().map_or(self.departure, |l| l.arrival)
    }

    /// Elapsed time from the requested departure, waiting included.
    pub fn duration_secs(&self) -> u32 {
        self.arrival().since(self.departure)
    }

    pub fn rides(&self) -> usize {
        self.legs.iter().filter(|l| l.trip_id().is_some()).count()
    }

    pub fn num_stops(&self) -> usize {
        self.legs.iter().map(|l| l.stops.len().saturating_sub(1)).sum()
    }

    /// A FeatureCollection with one LineString per leg.
    pub fn to_geojson(&self, network: &TransitNetwork) -> anyhow::Result<String> {
        let features = self
            .legs
            .iter()
            .map(|leg| {
                let points = leg
                    .stops
                    .iter()
                    .map(|id| network.stop(id).map(|s| s.coord))
                    .collect::<Option<Vec<Point<f64>>>>()
                    .with_context(|| {
                        format!(
                            "Leg {} -> {} uses an unknown stop",
                            leg.from_stop, leg.to_stop
                        )
                    })?;
                let (mode, trip_id, route_id) = match &leg.mode {
                    LegMode::Ride { trip_id, route_id } => {
                        ("ride", Some(trip_id.to_string()), Some(route_id.to_string()))
                    }
                    LegMode::Walk => ("walk", None, None),
                };
                Ok(LegFeature {
                    mode,
                    trip_id,
                    route_id,
                    from_stop: leg.from_stop.to_string(),
                    to_stop: leg.to_stop.to_string(),
                    departure: leg.departure.to_string(),
                    arrival: leg.arrival.to_string(),
                    geometry: LineString::from(points),
                })
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        geojson::ser::to_feature_collection_string(&features).context("Failed to serialize")
    }
}

#[derive(Serialize)]
struct LegFeature {
    mode: &'static str,
    trip_id: Option<String>,
    route_id: Option<String>,
    from_stop: String,
    to_stop: String,
    departure: String,
    arrival: String,
    #[serde(serialize_with = "geojson::ser::serialize_geometry")]
    geometry: LineString<f64>,
}

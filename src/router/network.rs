use std::collections::HashMap;

use chrono::NaiveDate;
use itertools::Itertools;
use tracing::{info, warn};

use crate::{
    router::{
        heuristic::{haversine, Heuristic},
        RouterConfig,
    },
    timetable::{
        stop::{Stop, StopId},
        time::Time,
        trip::{RouteId, TripId},
        Timetable,
    },
};

#[derive(Debug, Clone, Copy)]
pub(crate) struct Call {
    pub stop: usize,
    pub arrival: Time,
    pub departure: Time,
}

#[derive(Debug)]
pub(crate) struct NetworkTrip {
    pub id: TripId,
    pub route_id: RouteId,
    pub calls: Vec<Call>,
}

/// One vehicle movement between consecutive calls of a trip. `hop` indexes the departing call.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Segment {
    pub trip: usize,
    pub hop: usize,
    pub departure: Time,
    pub arrival: Time,
}

/// Every segment from one stop to one neighbouring stop, sorted by departure.
#[derive(Debug)]
pub(crate) struct Link {
    pub to: usize,
    segments: Vec<Segment>,
    /// `best_from[i]` is the segment with the earliest arrival among `segments[i..]`
    best_from: Vec<usize>,
}

impl Link {
    fn new(to: usize, mut segments: Vec<Segment>) -> Self {
        segments.sort_by_key(|s| (s.departure, s.arrival, s.trip));

        let mut best_from = vec![0; segments.len()];
        let mut best = segments.len().saturating_sub(1);
        for i in (0..segments.len()).rev() {
            if segments[i].arrival <= segments[best].arrival {
                best = i;
            }
            best_from[i] = best;
        }

        Self {
            to,
            segments,
            best_from,
        }
    }

    /// The segment reaching `to` soonest, boarding at or after `t`. Because waiting is always
    /// allowed, this arrival never decreases as `t` grows.
    pub fn earliest(&self, t: Time) -> Option<&Segment> {
        let i = self.segments.partition_point(|s| s.departure < t);
        self.best_from.get(i).map(|&best| &self.segments[best])
    }

    fn fastest_secs(&self) -> Option<u32> {
        self.segments
            .iter()
            .map(|s| s.arrival.since(s.departure))
            .min()
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Walk {
    pub to: usize,
    pub secs: u32,
}

/// The time-expanded network for one service day. Read-only once built; every query borrows it.
pub struct TransitNetwork {
    pub(crate) stops: Vec<Stop>,
    index: HashMap<StopId, usize>,
    pub(crate) trips: Vec<NetworkTrip>,
    pub(crate) links: Vec<Vec<Link>>,
    pub(crate) walks: Vec<Vec<Walk>>,
    pub(crate) horizon: Time,
    pub(crate) heuristic: Heuristic,
}

impl TransitNetwork {
    /// Keeps the trips whose service runs on `date`, or every trip when no date is given.
    pub fn new(timetable: &Timetable, date: Option<NaiveDate>, config: &RouterConfig) -> Self {
        let stops = timetable.stops.clone();
        let index: HashMap<StopId, usize> = stops
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id.clone(), i))
            .collect();

        let mut trips = vec![];
        let mut segments: HashMap<(usize, usize), Vec<Segment>> = HashMap::new();
        let mut horizon = Time::END_OF_DAY;
        let mut inactive = 0;
        let mut unknown_stops = 0;
        let mut backwards = 0;

        for trip in &timetable.trips {
            if let Some(date) = date {
                if !timetable.calendar.runs_on(&trip.service_id, date) {
                    inactive += 1;
                    continue;
                }
            }

            let calls = trip
                .stop_times
                .iter()
                .map(|st| {
                    index.get(&st.stop_id).map(|&stop| Call {
                        stop,
                        arrival: st.arrival,
                        departure: st.departure,
                    })
                })
                .collect::<Option<Vec<_>>>();
            let Some(calls) = calls else {
                unknown_stops += 1;
                continue;
            };

            let trip_idx = trips.len();
            for (hop, (from, to)) in calls.iter().tuple_windows().enumerate() {
                if from.stop == to.stop {
                    continue;
                }
                if to.arrival < from.departure {
                    backwards += 1;
                    continue;
                }
                segments
                    .entry((from.stop, to.stop))
                    .or_default()
                    .push(Segment {
                        trip: trip_idx,
                        hop,
                        departure: from.departure,
                        arrival: to.arrival,
                    });
            }
            if let Some(latest) = calls.iter().map(|c| c.arrival.max(c.departure)).max() {
                horizon = horizon.max(latest);
            }

            trips.push(NetworkTrip {
                id: trip.id.clone(),
                route_id: trip.route_id.clone(),
                calls,
            });
        }

        if unknown_stops > 0 {
            warn!(trips = unknown_stops, "Skipped trips calling at unknown stops");
        }
        if backwards > 0 {
            warn!(segments = backwards, "Skipped segments arriving before they depart");
        }

        let mut links: Vec<Vec<Link>> = stops.iter().map(|_| vec![]).collect();
        for ((from, to), segs) in segments.into_iter().sorted_by_key(|(k, _)| *k) {
            links[from].push(Link::new(to, segs));
        }

        let mut walk_secs: HashMap<(usize, usize), u32> = HashMap::new();
        let mut too_long = 0;
        for transfer in timetable.transfers.iter().filter(|t| !t.is_same_stop()) {
            let (Some(&from), Some(&to)) =
                (index.get(&transfer.from_stop), index.get(&transfer.to_stop))
            else {
                continue;
            };
            let secs = transfer.walk_secs(config.default_transfer_secs);
            // Longer than the whole service day
            if secs > horizon.secs() {
                too_long += 1;
                continue;
            }
            walk_secs
                .entry((from, to))
                .and_modify(|s| *s = (*s).min(secs))
                .or_insert(secs);
        }
        if too_long > 0 {
            warn!(transfers = too_long, "Skipped transfers longer than the service day");
        }
        let mut walks: Vec<Vec<Walk>> = stops.iter().map(|_| vec![]).collect();
        for ((from, to), secs) in walk_secs.into_iter().sorted() {
            walks[from].push(Walk { to, secs });
        }

        let ride_edges = links.iter().enumerate().flat_map(|(from, out)| {
            out.iter().filter_map(move |link| {
                link.fastest_secs().map(|secs| (from, link.to, secs))
            })
        });
        let walk_edges = walks
            .iter()
            .enumerate()
            .flat_map(|(from, out)| out.iter().map(move |w| (from, w.to, w.secs)));
        let heuristic = Heuristic::fitted(
            config.min_speed_mps,
            ride_edges
                .chain(walk_edges)
                .map(|(from, to, secs)| (haversine(stops[from].coord, stops[to].coord), secs)),
        );
        if !heuristic.max_speed_mps().is_finite() {
            warn!("An edge covers distance in zero time, searching without a distance estimate");
        }

        info!(
            stops = stops.len(),
            trips = trips.len(),
            inactive_trips = inactive,
            links = links.iter().map(Vec::len).sum::<usize>(),
            walks = walks.iter().map(Vec::len).sum::<usize>(),
            max_speed_mps = heuristic.max_speed_mps(),
            horizon = %horizon,
            "Built transit network"
        );

        Self {
            stops,
            index,
            trips,
            links,
            walks,
            horizon,
            heuristic,
        }
    }

    pub fn stop_index(&self, id: &StopId) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn stop(&self, id: &StopId) -> Option<&Stop> {
        self.stop_index(id).map(|i| &self.stops[i])
    }

    pub fn stop_name<'a>(&'a self, id: &'a StopId) -> &'a str {
        self.stop(id).map_or(id.as_str(), |s| s.name.as_str())
    }

    pub fn num_trips(&self) -> usize {
        self.trips.len()
    }

    /// Latest departure accepted by a query: the end of the service day, or later if the feed
    /// runs past midnight.
    pub fn horizon(&self) -> Time {
        self.horizon
    }

    /// The search's estimate of the time from `from` to `to`, in seconds.
    pub fn estimate_secs(&self, from: &StopId, to: &StopId) -> Option<u32> {
        let from = self.stop(from)?;
        let to = self.stop(to)?;
        Some(self.heuristic.estimate(from.coord, to.coord))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(trip: usize, departure: u32, arrival: u32) -> Segment {
        Segment {
            trip,
            hop: 0,
            departure: Time::from_secs(departure),
            arrival: Time::from_secs(arrival),
        }
    }

    #[test]
    fn test_earliest_prefers_earliest_arrival_not_departure() {
        // A slow local leaves first, an express overtakes it
        let link = Link::new(
            1,
            vec![segment(0, 100, 400), segment(1, 150, 300), segment(2, 500, 600)],
        );
        assert_eq!(link.earliest(Time::from_secs(50)).unwrap().trip, 1);
        assert_eq!(link.earliest(Time::from_secs(150)).unwrap().trip, 1);
        assert_eq!(link.earliest(Time::from_secs(151)).unwrap().trip, 2);
        assert!(link.earliest(Time::from_secs(501)).is_none());
    }

    #[test]
    fn test_earliest_ties_go_to_earlier_departure() {
        let link = Link::new(1, vec![segment(0, 100, 300), segment(1, 200, 300)]);
        assert_eq!(link.earliest(Time::from_secs(0)).unwrap().trip, 0);
    }

    #[test]
    fn test_empty_link() {
        let link = Link::new(1, vec![]);
        assert!(link.earliest(Time::MIDNIGHT).is_none());
        assert!(link.fastest_secs().is_none());
    }
}

use std::{cmp::Ordering, collections::BinaryHeap};

use tracing::debug;

use crate::{
    router::{
        itinerary::{Itinerary, Leg, LegMode},
        network::{Segment, TransitNetwork},
        RouteError, RouteOutcome, RouteQuery,
    },
    timetable::time::Time,
};

/// How a stop was reached.
#[derive(Debug, Clone, Copy)]
enum Hop {
    Ride {
        trip: usize,
        hop: usize,
        from: usize,
        to: usize,
        departure: Time,
        arrival: Time,
    },
    Walk {
        from: usize,
        to: usize,
        departure: Time,
        arrival: Time,
    },
}

impl Hop {
    fn from(&self) -> usize {
        match self {
            Hop::Ride { from, .. } | Hop::Walk { from, .. } => *from,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Label {
    arrival: Time,
    legs: u32,
    via: Option<Hop>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct State {
    /// Elapsed seconds plus the remaining estimate
    estimate: u32,
    arrival: Time,
    legs: u32,
    stop: usize,
}

impl Ord for State {
    fn cmp(&self, other: &Self) -> Ordering {
        // Flipped for a min-heap. The remaining fields make the order total and deterministic.
        other
            .estimate
            .cmp(&self.estimate)
            .then_with(|| other.arrival.cmp(&self.arrival))
            .then_with(|| other.legs.cmp(&self.legs))
            .then_with(|| other.stop.cmp(&self.stop))
    }
}

impl PartialOrd for State {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

struct Search {
    departure: Time,
    labels: Vec<Option<Label>>,
    settled: Vec<bool>,
    frontier: BinaryHeap<State>,
}

impl Search {
    fn relax(&mut self, to: usize, label: Label, remaining: u32) {
        if self.settled[to] {
            return;
        }
        let improves = match self.labels[to] {
            None => true,
            Some(old) => (label.arrival, label.legs) < (old.arrival, old.legs),
        };
        if improves {
            self.labels[to] = Some(label);
            self.frontier.push(State {
                estimate: label.arrival.since(self.departure).saturating_add(remaining),
                arrival: label.arrival,
                legs: label.legs,
                stop: to,
            });
        }
    }
}

impl TransitNetwork {
    pub fn route(&self, query: &RouteQuery) -> Result<RouteOutcome, RouteError> {
        let origin = self
            .stop_index(&query.origin)
            .ok_or_else(|| RouteError::UnknownStop(query.origin.clone()))?;
        let destination = self
            .stop_index(&query.destination)
            .ok_or_else(|| RouteError::UnknownStop(query.destination.clone()))?;
        if query.departure > self.horizon {
            return Err(RouteError::DepartureOutOfRange {
                departure: query.departure,
                horizon: self.horizon,
            });
        }
        if origin == destination {
            return Ok(RouteOutcome::Found(Itinerary {
                origin: query.origin.clone(),
                destination: query.destination.clone(),
                departure: query.departure,
                legs: vec![],
            }));
        }

        let target = self.stops[destination].coord;
        let remaining = |stop: usize| self.heuristic.estimate(self.stops[stop].coord, target);

        let mut search = Search {
            departure: query.departure,
            labels: vec![None; self.stops.len()],
            settled: vec![false; self.stops.len()],
            frontier: BinaryHeap::new(),
        };
        search.labels[origin] = Some(Label {
            arrival: query.departure,
            legs: 0,
            via: None,
        });
        search.frontier.push(State {
            estimate: remaining(origin),
            arrival: query.departure,
            legs: 0,
            stop: origin,
        });

        let mut expanded = 0;
        while let Some(State {
            arrival,
            legs,
            stop,
            ..
        }) = search.frontier.pop()
        {
            if search.settled[stop] {
                continue;
            }
            let Some(label) = search.labels[stop] else {
                continue;
            };
            if label.arrival != arrival || label.legs != legs {
                continue;
            }
            search.settled[stop] = true;
            expanded += 1;

            if stop == destination {
                debug!(expanded, "Reached destination");
                return Ok(RouteOutcome::Found(self.itinerary(query, &search.labels, stop)));
            }

            // Where we are along the trip we arrived on, if any
            let riding = match label.via {
                Some(Hop::Ride { trip, hop, .. }) => Some((trip, hop + 1)),
                _ => None,
            };

            for link in &self.links[stop] {
                let mut best = link.earliest(arrival).copied();
                if let Some((trip, pos)) = riding {
                    let calls = &self.trips[trip].calls;
                    if let Some(next) = calls.get(pos + 1).filter(|c| c.stop == link.to) {
                        let stay = Segment {
                            trip,
                            hop: pos,
                            departure: calls[pos].departure,
                            arrival: next.arrival,
                        };
                        let no_worse = best.map_or(true, |b| stay.arrival <= b.arrival);
                        if no_worse && stay.arrival >= stay.departure {
                            best = Some(stay);
                        }
                    }
                }
                let Some(seg) = best else {
                    continue;
                };

                let boards = riding.map_or(true, |(trip, _)| trip != seg.trip);
                search.relax(
                    link.to,
                    Label {
                        arrival: seg.arrival,
                        legs: legs + u32::from(boards),
                        via: Some(Hop::Ride {
                            trip: seg.trip,
                            hop: seg.hop,
                            from: stop,
                            to: link.to,
                            departure: seg.departure,
                            arrival: seg.arrival,
                        }),
                    },
                    remaining(link.to),
                );
            }

            for walk in &self.walks[stop] {
                let walk_arrival = arrival + walk.secs;
                search.relax(
                    walk.to,
                    Label {
                        arrival: walk_arrival,
                        legs: legs + 1,
                        via: Some(Hop::Walk {
                            from: stop,
                            to: walk.to,
                            departure: arrival,
                            arrival: walk_arrival,
                        }),
                    },
                    remaining(walk.to),
                );
            }
        }

        debug!(expanded, "Frontier exhausted");
        Ok(RouteOutcome::NoPath)
    }

    fn itinerary(
        &self,
        query: &RouteQuery,
        labels: &[Option<Label>],
        destination: usize,
    ) -> Itinerary {
        let mut hops = vec![];
        let mut stop = destination;
        while let Some(hop) = labels[stop].and_then(|l| l.via) {
            hops.push(hop);
            stop = hop.from();
        }
        hops.reverse();

        let mut legs: Vec<Leg> = vec![];
        for hop in hops {
            match hop {
                Hop::Ride {
                    trip,
                    from,
                    to,
                    departure,
                    arrival,
                    ..
                } => {
                    let trip = &self.trips[trip];
                    let to_stop = self.stops[to].id.clone();
                    match legs.last_mut() {
                        Some(last) if last.trip_id() == Some(&trip.id) => {
                            last.to_stop = to_stop.clone();
                            last.arrival = arrival;
                            last.stops.push(to_stop);
                        }
                        _ => legs.push(Leg {
                            mode: LegMode::Ride {
                                trip_id: trip.id.clone(),
                                route_id: trip.route_id.clone(),
                            },
                            from_stop: self.stops[from].id.clone(),
                            departure,
                            to_stop: to_stop.clone(),
                            arrival,
                            stops: vec![self.stops[from].id.clone(), to_stop],
                        }),
                    }
                }
                Hop::Walk {
                    from,
                    to,
                    departure,
                    arrival,
                } => legs.push(Leg {
                    mode: LegMode::Walk,
                    from_stop: self.stops[from].id.clone(),
                    departure,
                    to_stop: self.stops[to].id.clone(),
                    arrival,
                    stops: vec![self.stops[from].id.clone(), self.stops[to].id.clone()],
                }),
            }
        }

        Itinerary {
            origin: query.origin.clone(),
            destination: query.destination.clone(),
            departure: query.departure,
            legs,
        }
    }
}

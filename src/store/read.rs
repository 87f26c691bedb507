use std::collections::HashMap;

use serde::Serialize;
use tracing::warn;

use crate::{
    store::Store,
    timetable::{
        calendar::{parse_date, Service, ServiceId},
        stop::{Stop, StopId},
        stop_time::StopTime,
        time::Time,
        transfer::Transfer,
        trip::{RouteId, Trip, TripId},
    },
};

/// One row of `trip_segments`, as used for model training.
#[derive(Debug, Clone, Serialize)]
pub struct TripSegment {
    pub trip_id: String,
    pub route_id: String,
    pub direction_id: Option<u8>,
    pub from_stop_id: String,
    pub to_stop_id: String,
    pub start_time_sec: u32,
    pub duration_sec: u32,
}

impl Store {
    pub fn stops(&self) -> anyhow::Result<Vec<Stop>> {
        let mut stmt = self
            .conn
            .prepare("SELECT stop_id, stop_name, stop_lat, stop_lon FROM stops ORDER BY stop_id")?;
        let stops = stmt
            .query_map([], |row| {
                let id: String = row.get(0)?;
                let name: Option<String> = row.get(1)?;
                Ok(Stop::new(
                    StopId::new(&id),
                    name.unwrap_or_else(|| id.clone()),
                    row.get(2)?,
                    row.get(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(stops)
    }

    /// Every trip with its stop times in sequence order. Stop times with neither an arrival nor
    /// a departure are skipped; a single missing side copies the other.
    pub fn trips(&self) -> anyhow::Result<Vec<Trip>> {
        let mut stmt = self.conn.prepare(
            "SELECT trip_id, stop_id, stop_sequence, arrival_time_sec, departure_time_sec
             FROM stop_times ORDER BY trip_id, stop_sequence",
        )?;
        let mut skipped = 0;
        let mut stop_times: HashMap<String, Vec<StopTime>> = HashMap::new();
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, u32>(2)?,
                row.get::<_, Option<u32>>(3)?,
                row.get::<_, Option<u32>>(4)?,
            ))
        })?;
        for row in rows {
            let (trip_id, stop_id, sequence, arrival, departure) = row?;
            let (arrival, departure) = match (arrival, departure) {
                (Some(a), Some(d)) => (a, d),
                (Some(a), None) => (a, a),
                (None, Some(d)) => (d, d),
                (None, None) => {
                    skipped += 1;
                    continue;
                }
            };
            stop_times.entry(trip_id).or_default().push(StopTime::new(
                StopId::new(&stop_id),
                sequence,
                Time::from_secs(arrival),
                Time::from_secs(departure),
            ));
        }
        if skipped > 0 {
            warn!(skipped, "Skipped stop times without any scheduled time");
        }

        let mut stmt = self
            .conn
            .prepare(
                "SELECT trip_id, route_id, service_id, direction_id FROM trips ORDER BY trip_id",
            )?;
        let trips = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<u8>>(3)?,
                ))
            })?
            .map(|row| {
                let (trip_id, route_id, service_id, direction_id) = row?;
                let mut trip = Trip::new(
                    TripId::new(&trip_id),
                    RouteId::new(&route_id),
                    ServiceId::new(&service_id),
                    direction_id,
                );
                for st in stop_times.remove(&trip_id).unwrap_or_default() {
                    trip.add_stop_time(st);
                }
                Ok(trip)
            })
            .collect::<rusqlite::Result<Vec<_>>>()?;

        if !stop_times.is_empty() {
            warn!(
                trips = stop_times.len(),
                "Stop times defined for unknown trips"
            );
        }

        Ok(trips)
    }

    pub fn transfers(&self) -> anyhow::Result<Vec<Transfer>> {
        let mut stmt = self
            .conn
            .prepare("SELECT from_stop_id, to_stop_id, min_transfer_time FROM transfers")?;
        let transfers = stmt
            .query_map([], |row| {
                Ok(Transfer::new(
                    StopId::new(&row.get::<_, String>(0)?),
                    StopId::new(&row.get::<_, String>(1)?),
                    row.get(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(transfers)
    }

    pub fn services(&self) -> anyhow::Result<Vec<Service>> {
        let mut stmt = self.conn.prepare(
            "SELECT service_id, monday, tuesday, wednesday, thursday, friday, saturday, sunday,
             start_date, end_date FROM calendar",
        )?;
        let rows = stmt
            .query_map([], |row| {
                let mut days_run = [false; 7];
                for (i, day) in days_run.iter_mut().enumerate() {
                    *day = row.get::<_, u8>(i + 1)? == 1;
                }
                Ok((
                    row.get::<_, String>(0)?,
                    days_run,
                    row.get::<_, String>(8)?,
                    row.get::<_, String>(9)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, days_run, start, end)| {
                Ok(Service {
                    id: ServiceId::new(&id),
                    start_date: parse_date(&start)?,
                    end_date: parse_date(&end)?,
                    days_run,
                })
            })
            .collect()
    }

    /// Segments usable as training rows: positive duration under an hour.
    pub fn training_segments(&self) -> anyhow::Result<Vec<TripSegment>> {
        self.query_segments(
            "SELECT trip_id, route_id, direction_id, from_stop_id, to_stop_id, start_time_sec,
             duration_sec
             FROM trip_segments
             WHERE duration_sec > 0 AND duration_sec < 3600
             ORDER BY trip_id, start_time_sec",
        )
    }

    pub fn sample_segments(&self, limit: usize) -> anyhow::Result<Vec<TripSegment>> {
        self.query_segments(&format!(
            "SELECT trip_id, route_id, direction_id, from_stop_id, to_stop_id, start_time_sec,
             duration_sec
             FROM trip_segments
             WHERE start_time_sec IS NOT NULL AND duration_sec >= 0
             LIMIT {limit}"
        ))
    }

    fn query_segments(&self, sql: &str) -> anyhow::Result<Vec<TripSegment>> {
        let mut stmt = self.conn.prepare(sql)?;
        let segments = stmt
            .query_map([], |row| {
                Ok(TripSegment {
                    trip_id: row.get(0)?,
                    route_id: row.get(1)?,
                    direction_id: row.get(2)?,
                    from_stop_id: row.get(3)?,
                    to_stop_id: row.get(4)?,
                    start_time_sec: row.get(5)?,
                    duration_sec: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(segments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_rows() -> Store {
        let store = Store::in_memory().unwrap();
        store
            .conn
            .execute_batch(crate::store::schema::CREATE_TABLES)
            .unwrap();
        store
            .conn
            .execute_batch(
                "INSERT INTO stops VALUES ('A', 'Alpha', 40.0, -73.0), ('B', NULL, 40.01, -73.0);
                 INSERT INTO trips VALUES ('T1', 'R1', 'Weekday', 0);
                 INSERT INTO stop_times VALUES
                    ('T1', 'B', 2, '08:10:00', '08:10:00', 29400, 29400),
                    ('T1', 'A', 1, '08:00:00', '08:00:00', 28800, 28800),
                    ('T1', 'C', 3, NULL, NULL, NULL, NULL),
                    ('T9', 'A', 1, '09:00:00', '09:00:00', 32400, 32400);
                 INSERT INTO calendar VALUES ('Weekday', 1, 1, 1, 1, 1, 0, 0, '2024-01-01', '2024-12-31');
                 INSERT INTO transfers VALUES ('A', 'B', 2, NULL);",
            )
            .unwrap();
        store
            .conn
            .execute_batch(crate::store::schema::CREATE_TRIP_SEGMENTS)
            .unwrap();
        store
    }

    #[test]
    fn test_stops_fall_back_to_id_for_name() {
        let stops = store_with_rows().stops().unwrap();
        assert_eq!(stops.len(), 2);
        assert_eq!(stops[0].name, "Alpha");
        assert_eq!(stops[1].name, "B");
        assert_eq!(stops[1].coord.y(), 40.01);
    }

    #[test]
    fn test_trips_are_ordered_and_skip_untimed_stops() {
        let trips = store_with_rows().trips().unwrap();
        assert_eq!(trips.len(), 1);
        let stops = trips[0]
            .stop_times
            .iter()
            .map(|st| st.stop_id.as_str().to_owned())
            .collect::<Vec<_>>();
        assert_eq!(stops, vec!["A", "B"]);
    }

    #[test]
    fn test_trip_segments_link_consecutive_stops() {
        let store = store_with_rows();
        // A->B and B->C; the trip without a trips row is not joined
        assert_eq!(store.count("trip_segments").unwrap(), 2);

        let training = store.training_segments().unwrap();
        assert_eq!(training.len(), 1);
        assert_eq!(training[0].from_stop_id, "A");
        assert_eq!(training[0].to_stop_id, "B");
        assert_eq!(training[0].duration_sec, 600);
        assert_eq!(training[0].direction_id, Some(0));
    }

    #[test]
    fn test_services_and_transfers() {
        let store = store_with_rows();
        let services = store.services().unwrap();
        assert_eq!(services.len(), 1);
        assert!(services[0].days_run[0]);
        assert!(!services[0].days_run[6]);

        let transfers = store.transfers().unwrap();
        assert_eq!(transfers.len(), 1);
        assert_eq!(transfers[0].min_transfer_time, None);
    }
}

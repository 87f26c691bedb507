pub const CREATE_TABLES: &str = "
DROP TABLE IF EXISTS trip_segments;
DROP TABLE IF EXISTS stop_times;
DROP TABLE IF EXISTS transfers;
DROP TABLE IF EXISTS calendar;
DROP TABLE IF EXISTS trips;
DROP TABLE IF EXISTS routes;
DROP TABLE IF EXISTS stops;

CREATE TABLE stops (
    stop_id TEXT PRIMARY KEY,
    stop_name TEXT,
    stop_lat REAL NOT NULL,
    stop_lon REAL NOT NULL
);

CREATE TABLE routes (
    route_id TEXT PRIMARY KEY,
    route_short_name TEXT,
    route_long_name TEXT,
    route_type INTEGER
);

CREATE TABLE trips (
    trip_id TEXT PRIMARY KEY,
    route_id TEXT NOT NULL,
    service_id TEXT NOT NULL,
    direction_id INTEGER
);

CREATE TABLE calendar (
    service_id TEXT PRIMARY KEY,
    monday INTEGER NOT NULL,
    tuesday INTEGER NOT NULL,
    wednesday INTEGER NOT NULL,
    thursday INTEGER NOT NULL,
    friday INTEGER NOT NULL,
    saturday INTEGER NOT NULL,
    sunday INTEGER NOT NULL,
    start_date TEXT NOT NULL,
    end_date TEXT NOT NULL
);

CREATE TABLE transfers (
    from_stop_id TEXT NOT NULL,
    to_stop_id TEXT NOT NULL,
    transfer_type INTEGER,
    min_transfer_time INTEGER
);

CREATE TABLE stop_times (
    trip_id TEXT NOT NULL,
    stop_id TEXT NOT NULL,
    stop_sequence INTEGER NOT NULL,
    arrival_time TEXT,
    departure_time TEXT,
    arrival_time_sec INTEGER,
    departure_time_sec INTEGER
);
";

pub const CREATE_INDICES: &str = "
CREATE INDEX idx_trip_seq ON stop_times (trip_id, stop_sequence);
CREATE INDEX idx_stop_id ON stop_times (stop_id);
CREATE INDEX idx_stop_departure ON stop_times (stop_id, departure_time_sec);
";

/// Links each stop time to the next one on the same trip. The last stop of every trip has no
/// successor and is dropped.
pub const CREATE_TRIP_SEGMENTS: &str = "
DROP TABLE IF EXISTS trip_segments;
CREATE TABLE trip_segments AS
WITH ordered_stops AS (
    SELECT
        trip_id,
        stop_id AS from_stop_id,
        departure_time_sec AS start_time_sec,
        stop_sequence,
        LEAD(stop_id) OVER (PARTITION BY trip_id ORDER BY stop_sequence) AS to_stop_id,
        LEAD(arrival_time_sec) OVER (PARTITION BY trip_id ORDER BY stop_sequence) AS end_time_sec
    FROM stop_times
)
SELECT
    os.trip_id,
    os.from_stop_id,
    os.to_stop_id,
    os.start_time_sec,
    os.end_time_sec,
    (os.end_time_sec - os.start_time_sec) AS duration_sec,
    t.route_id,
    t.service_id,
    t.direction_id
FROM ordered_stops os
JOIN trips t ON os.trip_id = t.trip_id
WHERE os.to_stop_id IS NOT NULL;
CREATE INDEX idx_segments_from ON trip_segments (from_stop_id, start_time_sec);
";

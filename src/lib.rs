//! Offline pipeline over a subway GTFS feed: clean the zip, load it into SQLite, route between
//! stops, and fit a travel time model.

pub mod clean;
pub mod router;
pub mod store;
pub mod timetable;
pub mod train;

pub mod calendar;
pub mod stop;
pub mod stop_time;
pub mod time;
pub mod transfer;
pub mod trip;

use std::path::Path;

use tracing::info;

use crate::{
    store::Store,
    timetable::{calendar::Calendar, stop::Stop, transfer::Transfer, trip::Trip},
};

/// One static feed snapshot, read once and never mutated.
pub struct Timetable {
    pub stops: Vec<Stop>,
    pub trips: Vec<Trip>,
    pub transfers: Vec<Transfer>,
    pub calendar: Calendar,
}

impl Timetable {
    pub fn read<P: AsRef<Path>>(db_path: P) -> anyhow::Result<Self> {
        let store = Store::open(db_path)?;
        Self::from_store(&store)
    }

    pub fn from_store(store: &Store) -> anyhow::Result<Self> {
        let stops = store.stops()?;
        let trips = store.trips()?;
        let transfers = store.transfers()?;
        let calendar = Calendar::new(store.services()?);

        info!(
            stops = stops.len(),
            trips = trips.len(),
            transfers = transfers.len(),
            "Read timetable"
        );

        Ok(Self {
            stops,
            trips,
            transfers,
            calendar,
        })
    }
}

use crate::timetable::{stop::StopId, time::Time};

#[derive(Debug, Clone)]
pub struct StopTime {
    pub stop_id: StopId,
    pub sequence: u32,
    pub arrival: Time,
    pub departure: Time,
}

impl StopTime {
    pub fn new(stop_id: StopId, sequence: u32, arrival: Time, departure: Time) -> Self {
        Self {
            stop_id,
            sequence,
            arrival,
            departure,
        }
    }
}

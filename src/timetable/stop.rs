use std::fmt;

use geo_types::Point;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StopId(String);

impl StopId {
    pub fn new(str: &str) -> Self {
        Self(str.to_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StopId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone)]
pub struct Stop {
    pub id: StopId,
    pub name: String,
    /// x is longitude, y is latitude
    pub coord: Point<f64>,
}

impl Stop {
    pub fn new(id: StopId, name: String, lat: f64, lon: f64) -> Self {
        Self {
            id,
            name,
            coord: Point::new(lon, lat),
        }
    }
}

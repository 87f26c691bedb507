use std::{
    collections::{HashMap, HashSet},
    fmt,
};

use anyhow::Context;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Eq, PartialEq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ServiceId(String);

impl ServiceId {
    pub fn new(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parses both the cleaned `YYYY-MM-DD` form and raw GTFS `YYYYMMDD`.
pub fn parse_date(s: &str) -> anyhow::Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(s, "%Y%m%d"))
        .with_context(|| format!("Invalid date {s:?}"))
}

#[derive(Debug, Clone)]
pub struct Service {
    pub id: ServiceId,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Monday first
    pub days_run: [bool; 7],
}

impl Service {
    pub fn runs_on(&self, date: NaiveDate) -> bool {
        self.start_date <= date
            && self.end_date >= date
            && self.days_run[date.weekday().num_days_from_monday() as usize]
    }
}

#[derive(Debug, Clone, Default)]
pub struct Calendar {
    services: HashMap<ServiceId, Service>,
}

impl Calendar {
    pub fn new(services: Vec<Service>) -> Self {
        Self {
            services: services.into_iter().map(|s| (s.id.clone(), s)).collect(),
        }
    }

    /// Without a calendar every service is assumed active. With one, unknown services never run.
    pub fn runs_on(&self, service_id: &ServiceId, date: NaiveDate) -> bool {
        if self.services.is_empty() {
            return true;
        }
        self.services
            .get(service_id)
            .is_some_and(|s| s.runs_on(date))
    }

    pub fn active_services(&self, date: NaiveDate) -> HashSet<ServiceId> {
        self.services
            .values()
            .filter(|s| s.runs_on(date))
            .map(|s| s.id.clone())
            .collect()
    }
}

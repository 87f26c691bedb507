use std::{fmt, ops::Add, str::FromStr};

use anyhow::{anyhow, bail, Context};
use serde::{Deserialize, Serialize};

/// Seconds since midnight of the service day. GTFS allows hours past 24 for trips that run
/// over midnight, so this can't be a `NaiveTime`.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Time(u32);

impl Time {
    pub const MIDNIGHT: Time = Time(0);
    pub const END_OF_DAY: Time = Time(24 * 3600);

    pub fn from_secs(secs: u32) -> Self {
        Self(secs)
    }

    pub fn secs(self) -> u32 {
        self.0
    }

    /// Parses `H:MM:SS` or `H:MM`. The hour may exceed 23.
    pub fn parse(s: &str) -> anyhow::Result<Self> {
        let parts = s.trim().split(':').collect::<Vec<_>>();
        let (h, m, sec) = match parts.as_slice() {
            [h, m] => (*h, *m, "0"),
            [h, m, s] => (*h, *m, *s),
            _ => bail!("Invalid GTFS time {s:?}"),
        };

        let h = h.parse::<u32>().with_context(|| format!("Invalid hour in {s:?}"))?;
        let m = m.parse::<u32>().with_context(|| format!("Invalid minute in {s:?}"))?;
        let sec = sec
            .parse::<u32>()
            .with_context(|| format!("Invalid second in {s:?}"))?;
        if m >= 60 || sec >= 60 {
            return Err(anyhow!("Out of range GTFS time {s:?}"));
        }

        h.checked_mul(3600)
            .and_then(|secs| secs.checked_add(m * 60 + sec))
            .map(Self)
            .with_context(|| format!("Out of range GTFS time {s:?}"))
    }

    /// Seconds from `earlier` to `self`, zero if `earlier` is later.
    pub fn since(self, earlier: Time) -> u32 {
        self.0.saturating_sub(earlier.0)
    }
}

/// Saturates at the largest representable time.
impl Add<u32> for Time {
    type Output = Time;

    fn add(self, secs: u32) -> Time {
        Time(self.0.saturating_add(secs))
    }
}

impl FromStr for Time {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Time::parse(s)
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02}:{:02}",
            self.0 / 3600,
            (self.0 / 60) % 60,
            self.0 % 60
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_past_midnight() {
        assert_eq!(Time::parse("25:30:00").unwrap().secs(), 91800);
        assert_eq!(Time::parse("8:05:09").unwrap().secs(), 8 * 3600 + 5 * 60 + 9);
    }

    #[test]
    fn test_parse_without_seconds() {
        assert_eq!(Time::parse("08:15").unwrap().secs(), 8 * 3600 + 15 * 60);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Time::parse("").is_err());
        assert!(Time::parse("08:61:00").is_err());
        assert!(Time::parse("ab:00:00").is_err());
        assert!(Time::parse("1:2:3:4").is_err());
    }

    #[test]
    fn test_parse_rejects_hours_that_overflow() {
        let err = Time::parse("9999999:00:00").unwrap_err();
        assert!(err.to_string().contains("Out of range GTFS time"), "{err}");
        assert!(Time::parse("1193046:28:15").is_ok());
        assert!(Time::parse("1193046:28:16").is_err());
    }

    #[test]
    fn test_add_saturates() {
        assert_eq!(Time::from_secs(60) + 30, Time::from_secs(90));
        assert_eq!(Time::parse("08:00:00").unwrap() + u32::MAX, Time::from_secs(u32::MAX));
    }

    #[test]
    fn test_display_round_trips_late_times() {
        let t = Time::parse("26:01:02").unwrap();
        assert_eq!(t.to_string(), "26:01:02");
    }

    #[test]
    fn test_since_saturates() {
        let a = Time::from_secs(100);
        let b = Time::from_secs(160);
        assert_eq!(b.since(a), 60);
        assert_eq!(a.since(b), 0);
    }
}

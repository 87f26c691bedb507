use crate::timetable::stop::StopId;

#[derive(Debug, Clone)]
pub struct Transfer {
    pub from_stop: StopId,
    pub to_stop: StopId,
    pub min_transfer_time: Option<u32>,
}

impl Transfer {
    pub fn new(from_stop: StopId, to_stop: StopId, min_transfer_time: Option<u32>) -> Self {
        Self {
            from_stop,
            to_stop,
            min_transfer_time,
        }
    }

    /// Walking time in seconds, falling back to `default_secs` when the feed gives none.
    pub fn walk_secs(&self, default_secs: u32) -> u32 {
        match self.min_transfer_time {
            Some(t) if t > 0 => t,
            _ => default_secs,
        }
    }

    pub fn is_same_stop(&self) -> bool {
        self.from_stop == self.to_stop
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_walk_secs_defaults_when_missing_or_zero() {
        let a = StopId::new("A");
        let b = StopId::new("B");
        assert_eq!(Transfer::new(a.clone(), b.clone(), None).walk_secs(180), 180);
        assert_eq!(Transfer::new(a.clone(), b.clone(), Some(0)).walk_secs(180), 180);
        assert_eq!(Transfer::new(a, b, Some(90)).walk_secs(180), 90);
    }
}

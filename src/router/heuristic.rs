use geo_types::Point;

/// Mean Earth radius in meters
const EARTH_RADIUS: f64 = 6_371_000.0;

/// Great-circle distance in meters between two lon/lat points.
pub fn haversine(a: Point<f64>, b: Point<f64>) -> f64 {
    let (phi1, phi2) = (a.y().to_radians(), b.y().to_radians());
    let dphi = (b.y() - a.y()).to_radians();
    let dlambda = (b.x() - a.x()).to_radians();

    let h = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS * h.sqrt().atan2((1.0 - h).sqrt())
}

/// Lower bound on remaining travel time: straight-line distance at the fastest speed anything
/// in the network moves.
#[derive(Debug, Clone, Copy)]
pub struct Heuristic {
    /// Infinite when some edge covers distance in zero time, which disables the estimate.
    max_speed_mps: f64,
}

impl Heuristic {
    pub fn new(max_speed_mps: f64) -> Self {
        Self { max_speed_mps }
    }

    /// Starts from `min_speed_mps` and raises the speed to cover every `(meters, seconds)` edge.
    pub fn fitted<I: IntoIterator<Item = (f64, u32)>>(min_speed_mps: f64, edges: I) -> Self {
        let mut max_speed_mps = min_speed_mps;
        for (meters, secs) in edges {
            if meters <= 0.0 {
                continue;
            }
            if secs == 0 {
                max_speed_mps = f64::INFINITY;
                break;
            }
            max_speed_mps = max_speed_mps.max(meters / secs as f64);
        }
        Self { max_speed_mps }
    }

    pub fn max_speed_mps(&self) -> f64 {
        self.max_speed_mps
    }

    /// Seconds, rounded down.
    pub fn estimate(&self, from: Point<f64>, to: Point<f64>) -> u32 {
        if !self.max_speed_mps.is_finite() || self.max_speed_mps <= 0.0 {
            return 0;
        }
        let secs = haversine(from, to) / self.max_speed_mps - 1e-6;
        secs.max(0.0).floor() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_haversine_known_distance() {
        // Van Cortlandt Park to South Ferry, roughly 23km apart
        let a = Point::new(-73.898583, 40.889248);
        let b = Point::new(-74.013664, 40.702068);
        let d = haversine(a, b);
        assert!((d - 22_900.0).abs() < 1_000.0, "{d}");
        assert_eq!(haversine(a, a), 0.0);
    }

    #[test]
    fn test_fitted_speed_covers_fastest_edge() {
        let h = Heuristic::fitted(10.0, vec![(1000.0, 200), (3000.0, 100), (0.0, 0)]);
        assert_eq!(h.max_speed_mps(), 30.0);
    }

    #[test]
    fn test_zero_duration_edge_disables_estimate() {
        let h = Heuristic::fitted(10.0, vec![(500.0, 0)]);
        let a = Point::new(-73.9, 40.8);
        let b = Point::new(-73.9, 40.9);
        assert_eq!(h.estimate(a, b), 0);
    }

    #[test]
    fn test_estimate_never_exceeds_edge_time() {
        let a = Point::new(-73.9, 40.80);
        let b = Point::new(-73.9, 40.81);
        let meters = haversine(a, b);
        let h = Heuristic::fitted(1.0, vec![(meters, 60)]);
        assert!(h.estimate(a, b) <= 60);
    }
}

//! Travel time model: a random forest over segment features, fitted on `trip_segments`.

mod encoder;
mod forest;

use std::{
    fs::File,
    io::{BufReader, BufWriter},
    path::Path,
};

use anyhow::{bail, Context};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{store::TripSegment, timetable::time::Time};

pub use encoder::LabelEncoder;
pub use forest::{RandomForest, RegressionTree, TreeParams};

#[derive(Debug, Clone)]
pub struct TrainConfig {
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    /// Share of rows held out for evaluation
    pub test_fraction: f64,
    pub seed: u64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            n_trees: 50,
            max_depth: 12,
            min_samples_leaf: 2,
            test_fraction: 0.2,
            seed: 42,
        }
    }
}

/// Held-out accuracy of a fitted model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub train_rows: usize,
    pub test_rows: usize,
    /// Mean absolute error in seconds
    pub mae: f64,
    pub r2: f64,
}

impl Evaluation {
    pub fn rating(&self) -> &'static str {
        if self.r2 > 0.9 {
            "Excellent"
        } else if self.r2 > 0.7 {
            "Good"
        } else {
            "Needs Improvement"
        }
    }
}

/// Predicts the seconds between two consecutive stops of a trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TravelTimeModel {
    route_encoder: LabelEncoder,
    stop_encoder: LabelEncoder,
    forest: RandomForest,
    pub evaluation: Option<Evaluation>,
}

impl TravelTimeModel {
    pub fn predict(
        &self,
        route_id: &str,
        direction_id: Option<u8>,
        start: Time,
        from_stop_id: &str,
        to_stop_id: &str,
    ) -> anyhow::Result<f64> {
        let features = encode(
            &self.route_encoder,
            &self.stop_encoder,
            route_id,
            direction_id,
            start.secs(),
            from_stop_id,
            to_stop_id,
        )?;
        Ok(self.forest.predict(&features))
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let path = path.as_ref();
        let file = File::create(path)
            .with_context(|| format!("Failed to create model file {}", path.display()))?;
        serde_json::to_writer(BufWriter::new(file), self)
            .with_context(|| format!("Failed to write model to {}", path.display()))?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Failed to open model file {}", path.display()))?;
        serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to parse model file {}", path.display()))
    }
}

/// Feature row: route code, direction (-1 when unknown), start time, from stop code, to stop code.
fn encode(
    route_encoder: &LabelEncoder,
    stop_encoder: &LabelEncoder,
    route_id: &str,
    direction_id: Option<u8>,
    start_time_sec: u32,
    from_stop_id: &str,
    to_stop_id: &str,
) -> anyhow::Result<Vec<f64>> {
    Ok(vec![
        route_encoder.transform(route_id).context("Unknown route")? as f64,
        direction_id.map_or(-1.0, f64::from),
        start_time_sec as f64,
        stop_encoder.transform(from_stop_id).context("Unknown stop")? as f64,
        stop_encoder.transform(to_stop_id).context("Unknown stop")? as f64,
    ])
}

/// Fits a model on a shuffled split of `segments` and scores it on the held-out rows.
pub fn train(segments: &[TripSegment], config: &TrainConfig) -> anyhow::Result<TravelTimeModel> {
    if segments.is_empty() {
        bail!("No training data found. Load a feed with timed stop_times first.");
    }
    if segments.len() < 2 {
        bail!("Need at least two training rows, found {}", segments.len());
    }

    let route_encoder = LabelEncoder::fit(segments.iter().map(|s| s.route_id.as_str()));
    let stop_encoder = LabelEncoder::fit(
        segments
            .iter()
            .flat_map(|s| [s.from_stop_id.as_str(), s.to_stop_id.as_str()]),
    );
    let x = segments
        .iter()
        .map(|s| {
            encode(
                &route_encoder,
                &stop_encoder,
                &s.route_id,
                s.direction_id,
                s.start_time_sec,
                &s.from_stop_id,
                &s.to_stop_id,
            )
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    let y = segments
        .iter()
        .map(|s| s.duration_sec as f64)
        .collect::<Vec<_>>();

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut order = (0..segments.len()).collect::<Vec<_>>();
    order.shuffle(&mut rng);
    let n_test = ((segments.len() as f64 * config.test_fraction).ceil() as usize)
        .clamp(1, segments.len() - 1);
    let (test, fit) = order.split_at(n_test);

    let x_fit = fit.iter().map(|&i| x[i].clone()).collect::<Vec<_>>();
    let y_fit = fit.iter().map(|&i| y[i]).collect::<Vec<_>>();
    info!(
        rows = fit.len(),
        trees = config.n_trees,
        routes = route_encoder.len(),
        stops = stop_encoder.len(),
        "Fitting travel time model"
    );
    let forest = RandomForest::fit(
        &x_fit,
        &y_fit,
        config.n_trees,
        &TreeParams::from(config),
        &mut rng,
    );

    let predictions = test
        .iter()
        .map(|&i| forest.predict(&x[i]))
        .collect::<Vec<_>>();
    let actual = test.iter().map(|&i| y[i]).collect::<Vec<_>>();
    let evaluation = Evaluation {
        train_rows: fit.len(),
        test_rows: test.len(),
        mae: mean_absolute_error(&actual, &predictions),
        r2: r2_score(&actual, &predictions),
    };
    info!(
        mae = evaluation.mae,
        r2 = evaluation.r2,
        rating = evaluation.rating(),
        "Evaluated travel time model"
    );

    Ok(TravelTimeModel {
        route_encoder,
        stop_encoder,
        forest,
        evaluation: Some(evaluation),
    })
}

impl From<&TrainConfig> for TreeParams {
    fn from(config: &TrainConfig) -> Self {
        Self {
            max_depth: config.max_depth,
            min_samples_leaf: config.min_samples_leaf,
        }
    }
}

pub fn mean_absolute_error(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.is_empty() {
        return 0.0;
    }
    actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).abs())
        .sum::<f64>()
        / actual.len() as f64
}

/// Coefficient of determination. A constant target scores 1 when matched exactly and 0 otherwise.
pub fn r2_score(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.is_empty() {
        return 0.0;
    }
    let mean = actual.iter().sum::<f64>() / actual.len() as f64;
    let ss_res = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).powi(2))
        .sum::<f64>();
    let ss_tot = actual.iter().map(|a| (a - mean).powi(2)).sum::<f64>();
    if ss_tot == 0.0 {
        return if ss_res == 0.0 { 1.0 } else { 0.0 };
    }
    1.0 - ss_res / ss_tot
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Duration depends on the route and the hour; stops only label the rows.
    fn segments() -> Vec<TripSegment> {
        let mut out = vec![];
        for route in ["1", "2", "3"] {
            for hour in 5..23u32 {
                for hop in 0..4u32 {
                    let base = match route {
                        "1" => 90,
                        "2" => 120,
                        _ => 150,
                    };
                    let rush = if (7..10).contains(&hour) { 60 } else { 0 };
                    out.push(TripSegment {
                        trip_id: format!("{route}_{hour}"),
                        route_id: route.to_owned(),
                        direction_id: Some(0),
                        from_stop_id: format!("{route}{hop:02}"),
                        to_stop_id: format!("{route}{:02}", hop + 1),
                        start_time_sec: hour * 3600 + hop * 300,
                        duration_sec: base + rush,
                    });
                }
            }
        }
        out
    }

    fn small_config() -> TrainConfig {
        TrainConfig {
            n_trees: 10,
            ..Default::default()
        }
    }

    #[test]
    fn test_learns_a_deterministic_function() {
        let model = train(&segments(), &small_config()).unwrap();
        let evaluation = model.evaluation.unwrap();
        assert_eq!(evaluation.train_rows + evaluation.test_rows, 216);
        assert!(evaluation.mae < 15.0, "{evaluation:?}");
        assert!(evaluation.r2 > 0.7, "{evaluation:?}");

        let quiet = model
            .predict("2", Some(0), Time::from_secs(13 * 3600), "201", "202")
            .unwrap();
        assert!((quiet - 120.0).abs() < 20.0, "{quiet}");
    }

    #[test]
    fn test_same_seed_same_model() {
        let a = train(&segments(), &small_config()).unwrap();
        let b = train(&segments(), &small_config()).unwrap();
        assert_eq!(a.evaluation, b.evaluation);
    }

    #[test]
    fn test_unseen_labels_are_errors() {
        let model = train(&segments(), &small_config()).unwrap();
        assert!(model
            .predict("9", None, Time::from_secs(0), "100", "101")
            .is_err());
        assert!(model
            .predict("1", None, Time::from_secs(0), "100", "XYZ")
            .is_err());
        assert!(model
            .predict("1", None, Time::from_secs(0), "100", "101")
            .is_ok());
    }

    #[test]
    fn test_empty_dataset_is_an_error() {
        let err = train(&[], &small_config()).unwrap_err();
        assert!(err.to_string().contains("No training data"));
    }

    #[test]
    fn test_save_and_load_predict_the_same() {
        let model = train(&segments(), &small_config()).unwrap();
        let path = std::env::temp_dir()
            .join(format!("travel_time_model_{}.json", std::process::id()));
        model.save(&path).unwrap();
        let loaded = TravelTimeModel::load(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        for s in segments().iter().step_by(7) {
            let t = Time::from_secs(s.start_time_sec);
            assert_eq!(
                model
                    .predict(&s.route_id, s.direction_id, t, &s.from_stop_id, &s.to_stop_id)
                    .unwrap(),
                loaded
                    .predict(&s.route_id, s.direction_id, t, &s.from_stop_id, &s.to_stop_id)
                    .unwrap(),
            );
        }
        assert_eq!(model.evaluation, loaded.evaluation);
    }

    #[test]
    fn test_metrics() {
        assert_eq!(mean_absolute_error(&[1.0, 3.0], &[2.0, 1.0]), 1.5);
        assert_eq!(r2_score(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]), 1.0);
        assert_eq!(r2_score(&[2.0, 2.0], &[2.0, 2.0]), 1.0);
        assert_eq!(r2_score(&[2.0, 2.0], &[1.0, 2.0]), 0.0);
        assert!(r2_score(&[1.0, 2.0, 3.0], &[3.0, 2.0, 1.0]) < 0.0);
    }

    #[test]
    fn test_rating_thresholds() {
        let evaluation = |r2| Evaluation {
            train_rows: 1,
            test_rows: 1,
            mae: 0.0,
            r2,
        };
        assert_eq!(evaluation(0.95).rating(), "Excellent");
        assert_eq!(evaluation(0.9).rating(), "Good");
        assert_eq!(evaluation(0.5).rating(), "Needs Improvement");
    }
}

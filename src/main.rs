use std::{fs, path::PathBuf, time::Instant};

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use subway_router::{
    clean::clean_feed,
    router::{LegMode, RouteOutcome, RouteQuery, RouterConfig, TransitNetwork},
    store::Store,
    timetable::{stop::StopId, time::Time, Timetable},
    train::{train, TrainConfig, TravelTimeModel},
};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Parser)]
#[command(name = "subway_router")]
#[command(about = "Clean, load, route over and model a subway GTFS feed", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Clean every table of a GTFS zip into CSV files
    Clean {
        /// GTFS zip to read
        #[arg(short, long, default_value = "gtfs_subway.zip")]
        feed: PathBuf,

        /// Directory for the cleaned CSV files
        #[arg(short, long, default_value = "cleaned_gtfs_data")]
        output_dir: PathBuf,
    },
    /// Load cleaned CSV files into a SQLite database
    Load {
        /// Directory of cleaned CSV files
        #[arg(short, long, default_value = "cleaned_gtfs_data")]
        input_dir: PathBuf,

        #[arg(long, default_value = "subway_network.db")]
        db: PathBuf,
    },
    /// Find the earliest arrival between two stops
    Route {
        /// Origin stop_id
        #[arg(default_value = "101S")]
        origin: String,

        /// Destination stop_id
        #[arg(default_value = "142S")]
        destination: String,

        /// Departure time, HH:MM[:SS]; may run past 24:00
        #[arg(short, long, default_value = "08:00:00")]
        time: Time,

        /// Service date, YYYY-MM-DD. Without it every trip runs.
        #[arg(short, long)]
        date: Option<NaiveDate>,

        #[arg(long, default_value = "subway_network.db")]
        db: PathBuf,

        /// Write the itinerary as a GeoJSON FeatureCollection
        #[arg(long)]
        geojson: Option<PathBuf>,

        /// Walking seconds for a transfer without a min_transfer_time
        #[arg(long, default_value_t = 180)]
        transfer_secs: u32,

        /// Lowest speed, in m/s, the distance estimate may assume
        #[arg(long, default_value_t = 10.0)]
        min_speed: f64,
    },
    /// Fit a travel time model on the loaded trip segments
    Train {
        #[arg(long, default_value = "subway_network.db")]
        db: PathBuf,

        /// Where to save the fitted model
        #[arg(short, long, default_value = "subway_time_model.json")]
        model: PathBuf,

        #[arg(long, default_value_t = 50)]
        trees: usize,

        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
    /// Predict the travel time between consecutive stops with a saved model
    Predict {
        route_id: String,

        from_stop: String,

        to_stop: String,

        /// Departure time from the first stop
        #[arg(short, long, default_value = "08:00:00")]
        time: Time,

        #[arg(long)]
        direction: Option<u8>,

        #[arg(short, long, default_value = "subway_time_model.json")]
        model: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .with_filter(
                    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
                ),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Clean { feed, output_dir } => {
            let now = Instant::now();
            let report = clean_feed(&feed, &output_dir)?;
            info!("Cleaned feed in {:?}", now.elapsed());
            println!(
                "Cleaned {} tables into {} ({} rows dropped, {} empty files skipped)",
                report.tables.len(),
                output_dir.display(),
                report.rows_dropped(),
                report.skipped_empty.len()
            );
        }
        Commands::Load { input_dir, db } => {
            let now = Instant::now();
            let mut store = Store::create(&db)?;
            let report = store.load_cleaned_dir(&input_dir)?;
            info!("Loaded database in {:?}", now.elapsed());
            println!("Database {} is ready: {report:?}", db.display());
        }
        Commands::Route {
            origin,
            destination,
            time,
            date,
            db,
            geojson,
            transfer_secs,
            min_speed,
        } => {
            let config = RouterConfig {
                default_transfer_secs: transfer_secs,
                min_speed_mps: min_speed,
            };

            let now = Instant::now();
            let timetable = Timetable::read(&db)?;
            if let Some(date) = date {
                info!(
                    services = timetable.calendar.active_services(date).len(),
                    "Services running on {date}"
                );
            }
            let network = TransitNetwork::new(&timetable, date, &config);
            info!("Built network in {:?}", now.elapsed());

            let query = RouteQuery::new(StopId::new(&origin), StopId::new(&destination), time);
            let now = Instant::now();
            let outcome = network.route(&query)?;
            info!("Searched in {:?}", now.elapsed());

            let itinerary = match outcome {
                RouteOutcome::Found(itinerary) => itinerary,
                RouteOutcome::NoPath => {
                    println!(
                        "No path found from {} to {} departing {time}",
                        network.stop_name(&query.origin),
                        network.stop_name(&query.destination)
                    );
                    return Ok(());
                }
            };

            println!("Origin: {} ({origin})", network.stop_name(&query.origin));
            println!(
                "Destination: {} ({destination})",
                network.stop_name(&query.destination)
            );
            println!(
                "Total travel time: {:.1} minutes, arriving {}",
                itinerary.duration_secs() as f64 / 60.0,
                itinerary.arrival()
            );
            println!(
                "Number of stops: {}, trips boarded: {}",
                itinerary.num_stops(),
                itinerary.rides()
            );
            for leg in &itinerary.legs {
                let how = match &leg.mode {
                    LegMode::Ride { trip_id, route_id } => format!("Route {route_id} ({trip_id})"),
                    LegMode::Walk => "Walk".to_owned(),
                };
                println!(
                    "  {how}: {} {} -> {} {} ({:.1} min)",
                    network.stop_name(&leg.from_stop),
                    leg.departure,
                    network.stop_name(&leg.to_stop),
                    leg.arrival,
                    leg.duration_secs() as f64 / 60.0
                );
            }

            if let Some(path) = geojson {
                fs::write(&path, itinerary.to_geojson(&network)?)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                info!("Wrote route to {}", path.display());
            }
        }
        Commands::Train {
            db,
            model,
            trees,
            seed,
        } => {
            let config = TrainConfig {
                n_trees: trees,
                seed,
                ..Default::default()
            };

            let now = Instant::now();
            let store = Store::open(&db)?;
            let segments = store.training_segments()?;
            info!(rows = segments.len(), "Read training data");
            let fitted = train(&segments, &config)?;
            info!("Trained model in {:?}", now.elapsed());

            if let Some(evaluation) = &fitted.evaluation {
                println!("Model Evaluation:");
                println!(
                    "Mean Absolute Error: {:.2} seconds ({:.2} minutes)",
                    evaluation.mae,
                    evaluation.mae / 60.0
                );
                println!("R² Score: {:.3}", evaluation.r2);
                println!("Model Performance: {}", evaluation.rating());
            }

            fitted.save(&model)?;
            println!("Model saved to {}", model.display());
        }
        Commands::Predict {
            route_id,
            from_stop,
            to_stop,
            time,
            direction,
            model,
        } => {
            let fitted = TravelTimeModel::load(&model)?;
            let secs = fitted.predict(&route_id, direction, time, &from_stop, &to_stop)?;
            println!(
                "Route {route_id} from {from_stop} to {to_stop} at {time}: {secs:.0} seconds ({:.1} minutes)",
                secs / 60.0
            );
        }
    }

    Ok(())
}

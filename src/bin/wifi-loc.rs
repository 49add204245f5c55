use std::{collections::BTreeMap, fs::File, io::BufReader, path::Path};

use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use wifi_loc::*;

use command_line::Command;
use configuration::SessionConfig;
use geometry::PositionEstimate;
use measurement::Measurement;
use session::LocalizationSession;

#[derive(Debug, Serialize)]
pub struct DeviceReport {
    pub device_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<PositionEstimate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SensorSeries {
    pub rssi_dbm: Vec<f64>,
    pub distance_m: Vec<f64>,
}

#[derive(Debug, Deserialize)]
pub struct CalibrationSample {
    pub distance_m: f64,
    pub rssi_dbm: f64,
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run(opts: command_line::Options) -> Result<()> {
    let mut config = SessionConfig::from_reader(BufReader::new(File::open(&opts.config)?))?;
    if let Some(method) = opts.method {
        config.solver = method;
    }

    info!(
        "Session with {} anchors, solver {:?}",
        config.anchors.len(),
        config.solver
    );
    let mut session = LocalizationSession::new(config)?;

    match opts.command {
        Command::Locate { feed } => {
            let feed: Vec<Measurement> = read_json(&feed)?;
            info!("Loaded {} measurements", feed.len());

            let reports: Vec<DeviceReport> = session
                .locate_all(&feed)
                .into_iter()
                .map(|(device_id, result)| match result {
                    Ok(position) => {
                        info!("Location of device {}: {:0.2?}", device_id, position);
                        DeviceReport {
                            device_id,
                            position: Some(position),
                            error: None,
                        }
                    }
                    Err(e) => DeviceReport {
                        device_id,
                        position: None,
                        error: Some(e.to_string()),
                    },
                })
                .collect();

            print_json(&reports)
        }
        Command::Simulate { x, y, seed } => {
            let mut rng = StdRng::seed_from_u64(seed);
            let readings = session.simulate((x, y), &mut rng)?;

            // Stable output order
            let readings: BTreeMap<_, _> = readings.into_iter().collect();
            print_json(&readings)
        }
        Command::Series { feed, device } => {
            let feed: Vec<Measurement> = read_json(&feed)?;
            let series: BTreeMap<String, SensorSeries> =
                measurement::device_series(&feed, &device)
                    .into_iter()
                    .map(|(sensor_id, rssi_dbm)| {
                        let distance_m = rssi_dbm
                            .iter()
                            .map(|&rssi| session.model().rssi_to_distance(rssi))
                            .collect();
                        (sensor_id, SensorSeries { rssi_dbm, distance_m })
                    })
                    .collect();

            info!("{} sensors saw device {}", series.len(), device);
            print_json(&series)
        }
        Command::Calibrate { samples } => {
            let samples: Vec<CalibrationSample> = read_json(&samples)?;
            let distances: Vec<f64> = samples.iter().map(|s| s.distance_m).collect();
            let rssi: Vec<f64> = samples.iter().map(|s| s.rssi_dbm).collect();

            session.recalibrate(&distances, &rssi)?;
            print_json(session.model().params())
        }
    }
}

pub fn main() -> Result<()> {
    // Parse command line
    let opts = command_line::parse();

    info!("Starting with options: {:?}", opts);

    run(opts).inspect_err(|e| error!("{}", e))
}

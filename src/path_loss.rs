// Log-distance path-loss model.
//
// Inverse direction: RSSI -> distance, used on every request.
// Forward direction: distance -> RSSI with Gaussian shadowing, used to
// synthesize readings for simulation and tests.

use std::collections::HashMap;

use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{LocError, Result};
use crate::geometry::{euclidean_distance, AnchorPosition};

/// Distances below this are clamped before taking the log in the forward model.
pub const MIN_SIMULATION_DISTANCE_M: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PathLossParams {
    /// Received power at the reference distance (dBm)
    pub reference_power_dbm: f64,
    pub reference_distance_m: f64,
    pub path_loss_exponent: f64,
    /// Standard deviation of the shadowing term (dB)
    pub shadowing_std_dev_db: f64,
    /// Simulated RSSI never drops below this (dBm)
    pub noise_floor_dbm: f64,
    pub tx_power_dbm: f64,
}

impl Default for PathLossParams {
    fn default() -> Self {
        PathLossParams {
            reference_power_dbm: -32.0,
            reference_distance_m: 1.0,
            path_loss_exponent: 2.3,
            shadowing_std_dev_db: 4.0,
            noise_floor_dbm: -100.0,
            tx_power_dbm: 20.0,
        }
    }
}

impl PathLossParams {
    /// Loss between the transmitter and the reference distance (dB).
    pub fn reference_path_loss_db(&self) -> f64 {
        self.tx_power_dbm - self.reference_power_dbm
    }

    pub fn validate(&self) -> Result<()> {
        let all_finite = [
            self.reference_power_dbm,
            self.reference_distance_m,
            self.path_loss_exponent,
            self.shadowing_std_dev_db,
            self.noise_floor_dbm,
            self.tx_power_dbm,
        ]
        .iter()
        .all(|v| v.is_finite());

        if !all_finite {
            return Err(LocError::Validation(
                "path-loss parameters must be finite".into(),
            ));
        }
        if self.reference_distance_m <= 0.0 {
            return Err(LocError::Validation(format!(
                "reference distance must be positive, got {}",
                self.reference_distance_m
            )));
        }
        if self.path_loss_exponent == 0.0 {
            return Err(LocError::Validation(
                "path-loss exponent must be non-zero".into(),
            ));
        }
        if self.shadowing_std_dev_db < 0.0 {
            return Err(LocError::Validation(format!(
                "shadowing std-dev must be non-negative, got {}",
                self.shadowing_std_dev_db
            )));
        }

        Ok(())
    }
}

/// Bidirectional RSSI <-> distance mapping.
///
/// The parameters only change through [`PathLossModel::calibrate`].
#[derive(Debug, Clone, Default)]
pub struct PathLossModel {
    params: PathLossParams,
}

impl PathLossModel {
    pub fn new(params: PathLossParams) -> Result<Self> {
        params.validate()?;
        Ok(PathLossModel { params })
    }

    pub fn params(&self) -> &PathLossParams {
        &self.params
    }

    /// Estimate the distance (m) at which `rssi_dbm` would be received.
    ///
    /// The input RSSI itself is never clamped; a path loss at or below the
    /// reference loss maps to the reference distance.
    pub fn rssi_to_distance(&self, rssi_dbm: f64) -> f64 {
        let p = &self.params;
        let path_loss = p.tx_power_dbm - rssi_dbm;
        let reference_loss = p.reference_path_loss_db();

        if path_loss <= reference_loss {
            return p.reference_distance_m;
        }

        p.reference_distance_m
            * 10f64.powf((path_loss - reference_loss) / (10.0 * p.path_loss_exponent))
    }

    pub fn convert_measurements(
        &self,
        measurements: &HashMap<String, f64>,
    ) -> HashMap<String, f64> {
        measurements
            .iter()
            .map(|(sensor_id, &rssi)| (sensor_id.clone(), self.rssi_to_distance(rssi)))
            .collect()
    }

    /// Synthesize the RSSI each anchor would report for a device at `device`.
    ///
    /// Shadowing is drawn from `rng`, so a seeded generator gives
    /// reproducible readings.
    pub fn simulate_rssi_from_position<R: Rng + ?Sized>(
        &self,
        device: (f64, f64),
        anchors: &[AnchorPosition],
        rng: &mut R,
    ) -> Result<HashMap<String, f64>> {
        let p = &self.params;
        let shadowing = Normal::new(0.0, p.shadowing_std_dev_db)
            .map_err(|e| LocError::Validation(format!("invalid shadowing std-dev: {e}")))?;

        let readings = anchors
            .iter()
            .map(|anchor| {
                let distance =
                    euclidean_distance(device, anchor.point()).max(MIN_SIMULATION_DISTANCE_M);

                let path_loss = if distance <= p.reference_distance_m {
                    p.reference_path_loss_db()
                } else {
                    p.reference_path_loss_db()
                        + 10.0 * p.path_loss_exponent * (distance / p.reference_distance_m).log10()
                };

                let total_loss = path_loss + shadowing.sample(rng);
                let rssi = (p.tx_power_dbm - total_loss).max(p.noise_floor_dbm);

                debug!("Simulated {} at {:.2} m: {:.2} dBm", anchor.id, distance, rssi);
                (anchor.id.clone(), rssi)
            })
            .collect();

        Ok(readings)
    }

    /// Refit the exponent and reference power from known distance/RSSI pairs.
    ///
    /// Fits `rssi = m * log10(d / d0) + b` by least squares, then sets
    /// `n = -m / 10` and the reference power to `b`.
    pub fn calibrate(
        &mut self,
        known_distances_m: &[f64],
        measured_rssi_dbm: &[f64],
    ) -> Result<()> {
        if known_distances_m.len() != measured_rssi_dbm.len() {
            return Err(LocError::Validation(format!(
                "number of distances ({}) must match number of RSSI measurements ({})",
                known_distances_m.len(),
                measured_rssi_dbm.len()
            )));
        }
        if known_distances_m.len() < 2 {
            return Err(LocError::Validation(
                "calibration needs at least two samples".into(),
            ));
        }
        if let Some(bad) = known_distances_m
            .iter()
            .find(|d| !(d.is_finite() && **d > 0.0))
        {
            return Err(LocError::Validation(format!(
                "known distances must be positive and finite, got {bad}"
            )));
        }

        let d0 = self.params.reference_distance_m;
        let xs: Vec<f64> = known_distances_m.iter().map(|d| (d / d0).log10()).collect();
        let ys = measured_rssi_dbm;

        let n = xs.len() as f64;
        let mean_x = xs.iter().sum::<f64>() / n;
        let mean_y = ys.iter().sum::<f64>() / n;

        let mut sxx = 0.0;
        let mut sxy = 0.0;
        for (x, y) in xs.iter().zip(ys) {
            sxx += (x - mean_x).powi(2);
            sxy += (x - mean_x) * (y - mean_y);
        }

        if sxx == 0.0 {
            return Err(LocError::Validation(
                "calibration needs at least two distinct distances".into(),
            ));
        }

        let slope = sxy / sxx;
        let intercept = mean_y - slope * mean_x;

        let mut params = self.params;
        params.path_loss_exponent = -slope / 10.0;
        params.reference_power_dbm = intercept;
        params.validate()?;
        self.params = params;

        info!(
            "Calibrated path-loss model: n = {:.3}, reference power = {:.2} dBm",
            params.path_loss_exponent, params.reference_power_dbm
        );

        Ok(())
    }
}

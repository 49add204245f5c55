// Explicitly owned localization context.
//
// Built once per process from a `SessionConfig` and passed to every request.
// Reads take `&self`; recalibration takes `&mut self`, so callers sharing a
// session across threads wrap it in a lock of their choosing.

use std::collections::{BTreeMap, HashMap};

use rand::Rng;
use tracing::{debug, warn};

use crate::configuration::SessionConfig;
use crate::error::Result;
use crate::geometry::{AnchorPosition, PositionEstimate};
use crate::measurement::{device_ids, latest_measurements, Measurement};
use crate::optimization::PositionSolver;
use crate::path_loss::PathLossModel;

#[derive(Debug, Clone)]
pub struct LocalizationSession {
    model: PathLossModel,
    solver: PositionSolver,
}

impl LocalizationSession {
    pub fn new(config: SessionConfig) -> Result<Self> {
        let model = PathLossModel::new(config.path_loss)?;
        let solver = PositionSolver::new(config.anchors)?.with_method(config.solver);

        Ok(LocalizationSession { model, solver })
    }

    pub fn anchors(&self) -> &[AnchorPosition] {
        self.solver.anchors()
    }

    pub fn model(&self) -> &PathLossModel {
        &self.model
    }

    pub fn solver(&self) -> &PositionSolver {
        &self.solver
    }

    /// Locate a device from its latest sensorId -> RSSI readings.
    ///
    /// Anchors without a usable reading are left out of the solve; fewer than
    /// 3 remaining anchors is a configuration error for this request.
    pub fn locate(&self, rssi: &HashMap<String, f64>) -> Result<PositionEstimate> {
        let distances = self.model.convert_measurements(rssi);

        for sensor_id in distances.keys() {
            if !self.anchors().iter().any(|a| &a.id == sensor_id) {
                warn!("Ignoring reading from unknown sensor {}", sensor_id);
            }
        }

        let mut anchors = Vec::new();
        let mut aligned = Vec::new();
        for anchor in self.anchors() {
            match distances.get(&anchor.id) {
                Some(&distance) if distance.is_finite() => {
                    anchors.push(anchor.clone());
                    aligned.push(distance);
                }
                _ => debug!("No usable reading for anchor {}", anchor.id),
            }
        }

        if anchors.len() == self.anchors().len() {
            return self.solver.estimate_position(&aligned);
        }

        PositionSolver::new(anchors)?
            .with_method(self.solver.method())
            .estimate_position(&aligned)
    }

    /// Locate every device in the feed from its latest readings.
    pub fn locate_all(&self, feed: &[Measurement]) -> BTreeMap<String, Result<PositionEstimate>> {
        device_ids(feed)
            .into_iter()
            .map(|device_id| {
                let result = self.locate(&latest_measurements(feed, &device_id));
                if let Err(e) = &result {
                    debug!("Could not locate {}: {}", device_id, e);
                }
                (device_id, result)
            })
            .collect()
    }

    pub fn recalibrate(
        &mut self,
        known_distances_m: &[f64],
        measured_rssi_dbm: &[f64],
    ) -> Result<()> {
        self.model.calibrate(known_distances_m, measured_rssi_dbm)
    }

    /// Synthesize the readings the session anchors would report for `device`.
    pub fn simulate<R: Rng + ?Sized>(
        &self,
        device: (f64, f64),
        rng: &mut R,
    ) -> Result<HashMap<String, f64>> {
        self.model
            .simulate_rssi_from_position(device, self.anchors(), rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LocError;
    use crate::geometry::{euclidean_distance, mean_error};
    use crate::optimization::SolverMethod;
    use crate::path_loss::PathLossParams;
    use rand::{rngs::StdRng, SeedableRng};

    fn config(shadowing_std_dev_db: f64) -> SessionConfig {
        SessionConfig {
            anchors: vec![
                AnchorPosition::new("s1", 0.0, 0.0),
                AnchorPosition::new("s2", 12.0, 0.0),
                AnchorPosition::new("s3", 12.0, 9.0),
                AnchorPosition::new("s4", 0.0, 9.0),
            ],
            path_loss: PathLossParams {
                shadowing_std_dev_db,
                ..Default::default()
            },
            solver: SolverMethod::GaussNewton,
        }
    }

    #[test]
    fn test_locate_noiseless() {
        let session = LocalizationSession::new(config(0.0)).unwrap();
        let mut rng = StdRng::seed_from_u64(1);

        let truth = (4.0, 6.5);
        let readings = session.simulate(truth, &mut rng).unwrap();
        let position = session.locate(&readings).unwrap();

        assert!(euclidean_distance(position.point(), truth) < 1e-3);
    }

    #[test]
    fn test_locate_with_missing_and_unknown_sensors() {
        let session = LocalizationSession::new(config(0.0)).unwrap();
        let mut rng = StdRng::seed_from_u64(1);

        let truth = (8.0, 2.0);
        let mut readings = session.simulate(truth, &mut rng).unwrap();
        readings.remove("s4");
        readings.insert("elsewhere".into(), -40.0);

        let position = session.locate(&readings).unwrap();
        assert!(euclidean_distance(position.point(), truth) < 1e-3);

        readings.remove("s3");
        assert!(matches!(
            session.locate(&readings),
            Err(LocError::Configuration(_))
        ));
    }

    #[test]
    fn test_locate_with_shadowing() {
        let session = LocalizationSession::new(config(2.0)).unwrap();
        let mut rng = StdRng::seed_from_u64(1234);

        let truths = [(2.0, 2.0), (6.0, 4.5), (10.0, 7.0), (3.0, 8.0)];
        let mut estimates = Vec::new();
        for &truth in &truths {
            let readings = session.simulate(truth, &mut rng).unwrap();
            estimates.push(session.locate(&readings).unwrap().point());
        }

        // 2 dB of shadowing should not throw estimates off the floor plan
        assert!(mean_error(&estimates, &truths) < 5.0);
    }

    #[test]
    fn test_locate_all() {
        let session = LocalizationSession::new(config(0.0)).unwrap();
        let mut rng = StdRng::seed_from_u64(9);

        let mut feed = Vec::new();
        for (sensor_id, rssi) in session.simulate((5.0, 5.0), &mut rng).unwrap() {
            feed.push(Measurement {
                sensor_id,
                device_id: "aa:bb".into(),
                rssi_dbm: rssi,
                timestamp: 100,
            });
        }
        feed.push(Measurement {
            sensor_id: "s1".into(),
            device_id: "cc:dd".into(),
            rssi_dbm: -50.0,
            timestamp: 100,
        });

        let results = session.locate_all(&feed);

        assert_eq!(results.len(), 2);
        let located = results["aa:bb"].as_ref().unwrap();
        assert!(euclidean_distance(located.point(), (5.0, 5.0)) < 1e-3);
        assert!(results["cc:dd"].is_err());
    }

    #[test]
    fn test_recalibrate() {
        let mut session = LocalizationSession::new(config(0.0)).unwrap();

        session
            .recalibrate(&[1.0, 10.0, 100.0], &[-40.0, -70.0, -100.0])
            .unwrap();

        assert!((session.model().params().path_loss_exponent - 3.0).abs() < 1e-9);
        assert!((session.model().params().reference_power_dbm - -40.0).abs() < 1e-9);
        assert!((session.model().rssi_to_distance(-70.0) - 10.0).abs() < 1e-6);
    }

    #[test]
    fn test_invalid_session() {
        let mut bad = config(0.0);
        bad.anchors.truncate(2);
        assert!(matches!(
            LocalizationSession::new(bad),
            Err(LocError::Configuration(_))
        ));
    }
}

/*
  Session configuration, e.g.

    {
      "anchors": [
        {"id": "sensor-1", "x": 0.0, "y": 0.0},
        {"id": "sensor-2", "x": 10.0, "y": 0.0},
        {"id": "sensor-3", "x": 0.0, "y": 10.0}
      ],
      "pathLoss": {"referencePowerDbm": -32.0, "pathLossExponent": 2.3},
      "solver": "gauss-newton"
    }

  `pathLoss` fields and `solver` fall back to their defaults when omitted.
*/

use std::io::Read;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::geometry::AnchorPosition;
use crate::optimization::SolverMethod;
use crate::path_loss::PathLossParams;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    pub anchors: Vec<AnchorPosition>,
    #[serde(default)]
    pub path_loss: PathLossParams,
    #[serde(default)]
    pub solver: SolverMethod,
}

impl SessionConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        Ok(serde_json::from_reader(reader)?)
    }
}

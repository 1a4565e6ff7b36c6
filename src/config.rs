use crate::coordinator::Algorithm;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// The default speed limit of every lane in m/s (60 mph).
pub const DEFAULT_LANE_SPEED_LIMIT: f64 = 26.82; // m/s

/// The largest number of lanes a lane mask can describe.
const MAX_LANES: u32 = u32::BITS;

/// The parameters of a lane change experiment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// The length of a traffic step in s.
    pub step_length: f64,
    /// The number of lanes on the road.
    pub num_lanes: u32,
    /// Bit `i` is set if vehicles in lane `i` may be selected to change lanes.
    pub selection_lanes: u32,
    /// The probability that an eligible vehicle is selected each time the governor fires.
    pub selection_probability: f64,
    /// The time between governor selections in s.
    pub selection_interval: f64,
    /// Seeds every random number generator of the experiment.
    pub seed: u64,
    /// The speed limit of each lane in m/s, starting from lane zero.
    pub lane_speed_limits: Vec<f64>,
    /// The decision algorithm run by every vehicle.
    pub algorithm: Algorithm,
    /// The lane change mode sent to each vehicle when it first appears.
    pub lane_change_mode: u32,
}

impl Default for Config {
    fn default() -> Self {
        let num_lanes = 5;
        Self {
            step_length: 1.0,
            num_lanes,
            selection_lanes: lane_mask(0..num_lanes),
            selection_probability: 0.01,
            selection_interval: 2.0,
            seed: 38203494,
            lane_speed_limits: vec![DEFAULT_LANE_SPEED_LIMIT; num_lanes as usize],
            algorithm: Algorithm::Baseline,
            lane_change_mode: 256,
        }
    }
}

/// Builds a lane mask selecting the given lanes. Lanes that cannot be represented are ignored.
pub fn lane_mask(lanes: impl IntoIterator<Item = u32>) -> u32 {
    lanes
        .into_iter()
        .filter(|lane| *lane < MAX_LANES)
        .fold(0, |mask, lane| mask | (1 << lane))
}

impl Config {
    /// Loads a configuration from a JSON file. Missing fields take their default values.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// The length of a traffic step.
    pub fn step_length(&self) -> Duration {
        Duration::from_secs_f64(self.step_length)
    }

    /// The time between governor selections.
    pub fn selection_interval(&self) -> Duration {
        Duration::from_secs_f64(self.selection_interval)
    }

    /// Checks that the configuration describes a runnable experiment.
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(Error::InvalidConfig(msg));
        if !(0.0..=1.0).contains(&self.selection_probability) {
            return fail(format!(
                "selection probability {} is not within [0, 1]",
                self.selection_probability
            ));
        }
        if !(self.step_length.is_finite() && self.step_length > 0.0) {
            return fail(format!("step length {} must be positive", self.step_length));
        }
        if !(self.selection_interval.is_finite() && self.selection_interval > 0.0) {
            return fail(format!(
                "selection interval {} must be positive",
                self.selection_interval
            ));
        }
        if !(2..=MAX_LANES).contains(&self.num_lanes) {
            return fail(format!(
                "{} lanes given, between 2 and {MAX_LANES} are supported",
                self.num_lanes
            ));
        }
        if self.selection_lanes & !lane_mask(0..self.num_lanes) != 0 {
            return fail(format!(
                "selection lanes {:#b} include lanes beyond the {} on the road",
                self.selection_lanes, self.num_lanes
            ));
        }
        if self.lane_speed_limits.len() > self.num_lanes as usize {
            return fail(format!(
                "{} lane speed limits given for {} lanes",
                self.lane_speed_limits.len(),
                self.num_lanes
            ));
        }
        if let Some(limit) = self
            .lane_speed_limits
            .iter()
            .find(|limit| !(limit.is_finite() && **limit > 0.0))
        {
            return fail(format!("lane speed limit {limit} must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.selection_lanes, 0b11111);
        assert_eq!(config.lane_speed_limits.len(), 5);
        assert_approx_eq!(config.lane_speed_limits[4], 26.82);
        assert_eq!(config.selection_interval(), Duration::from_secs(2));
        assert_eq!(config.step_length(), Duration::from_secs(1));
        assert_eq!(config.seed, 38203494);
        assert_eq!(config.algorithm, Algorithm::Baseline);
    }

    #[test]
    fn missing_json_fields_take_defaults() {
        let config: Config =
            serde_json::from_str(r#"{ "selection_probability": 0.5, "algorithm": "enhanced" }"#)
                .unwrap();
        assert_approx_eq!(config.selection_probability, 0.5);
        assert_eq!(config.algorithm, Algorithm::Enhanced);
        assert_eq!(config.num_lanes, 5);
        assert_eq!(config.lane_change_mode, 256);
    }

    #[test]
    fn lane_masks() {
        assert_eq!(lane_mask([0, 2]), 0b101);
        assert_eq!(lane_mask([]), 0);
        assert_eq!(lane_mask([40]), 0);
    }

    #[test]
    fn rejects_inconsistent_configs() {
        let invalid = [
            Config {
                selection_probability: 1.5,
                ..Default::default()
            },
            Config {
                step_length: 0.0,
                ..Default::default()
            },
            Config {
                selection_interval: -2.0,
                ..Default::default()
            },
            Config {
                num_lanes: 1,
                selection_lanes: 1,
                lane_speed_limits: vec![],
                ..Default::default()
            },
            Config {
                selection_lanes: 0b100000,
                ..Default::default()
            },
            Config {
                lane_speed_limits: vec![20.0; 6],
                ..Default::default()
            },
            Config {
                lane_speed_limits: vec![0.0],
                ..Default::default()
            },
        ];
        for config in invalid {
            assert!(
                matches!(config.validate(), Err(Error::InvalidConfig(_))),
                "{config:?} should be rejected"
            );
        }
    }
}

//! The interface to the traffic microsimulation which owns vehicle kinematics.

use crate::attributes::VehicleAttributes;
use serde::Serialize;
use std::time::Duration;

pub use highway::{HighwayParams, HighwayTraffic};

mod highway;

/// A traffic microsimulation that can be driven by the lane change experiment.
///
/// Vehicles are identified by the provider's own string identifiers.
/// Commands naming a vehicle that is not present are ignored.
pub trait TrafficProvider {
    /// The identifiers of the vehicles currently in the simulation.
    fn vehicle_ids(&self) -> Vec<String>;

    /// Whether the vehicle is currently in the simulation.
    fn contains(&self, vehicle: &str) -> bool {
        self.vehicle_ids().iter().any(|id| id == vehicle)
    }

    /// A snapshot of the vehicle's current state.
    fn attributes(&self, vehicle: &str) -> Option<VehicleAttributes>;

    /// Asks the vehicle to move into `lane`, staying there for at least `hold`.
    fn change_lane(&mut self, vehicle: &str, lane: u32, hold: Duration);

    /// Changes the vehicle's speed linearly to `speed` over `duration`.
    fn slow_down(&mut self, vehicle: &str, speed: f64, duration: Duration);

    /// Sets the bit set controlling how the vehicle makes lane changes of its own accord.
    fn set_lane_change_mode(&mut self, vehicle: &str, mode: u32);

    /// Sets the speed limit of a lane in m/s.
    fn set_lane_speed_limit(&mut self, lane: u32, speed: f64);

    /// Advances the simulation by one step.
    fn step(&mut self);

    /// The number of vehicles in the simulation plus those still waiting to depart.
    fn min_expected_number(&self) -> usize;

    /// Shuts the simulation down.
    fn close(&mut self) {}
}

/// A command received by a traffic provider, kept for inspection.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum TrafficCommand {
    ChangeLane {
        vehicle: String,
        lane: u32,
        hold: Duration,
    },
    SlowDown {
        vehicle: String,
        speed: f64,
        duration: Duration,
    },
    SetLaneChangeMode {
        vehicle: String,
        mode: u32,
    },
    SetLaneSpeedLimit {
        lane: u32,
        speed: f64,
    },
}

impl TrafficCommand {
    /// The vehicle the command is addressed to, if any.
    pub fn vehicle(&self) -> Option<&str> {
        match self {
            TrafficCommand::ChangeLane { vehicle, .. }
            | TrafficCommand::SlowDown { vehicle, .. }
            | TrafficCommand::SetLaneChangeMode { vehicle, .. } => Some(vehicle),
            TrafficCommand::SetLaneSpeedLimit { .. } => None,
        }
    }
}

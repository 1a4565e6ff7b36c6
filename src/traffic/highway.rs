use super::{TrafficCommand, TrafficProvider};
use crate::attributes::{Point2d, VehicleAttributes};
use crate::config::DEFAULT_LANE_SPEED_LIMIT;
use crate::error::{Error, Result};
use log::{trace, warn};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use std::collections::BTreeMap;
use std::time::Duration;

/// The lateral distance between lane centres in m.
const LANE_WIDTH: f64 = 3.2; // m

/// The parameters of a [HighwayTraffic] road.
#[derive(Clone, Copy, Debug)]
pub struct HighwayParams {
    /// The number of lanes.
    pub num_lanes: u32,
    /// The length of the road in m. Vehicles leave once they pass its end.
    pub road_length: f64,
    /// The length of a step in s.
    pub step_length: f64,
}

/// A straight multi-lane road on which vehicles drive without interacting.
///
/// Vehicles accelerate freely towards the lesser of their maximum speed
/// and the speed limit of their lane. Lane changes take effect on the
/// next step and speed commands are applied linearly over their duration.
pub struct HighwayTraffic {
    params: HighwayParams,
    /// The speed limit of each lane in m/s.
    speed_limits: Vec<f64>,
    /// The vehicles on the road, by name.
    cars: BTreeMap<String, Car>,
    /// Vehicles yet to enter the road, in order of departure.
    departures: Vec<Departure>,
    /// The current simulation time in s.
    time: f64,
    /// Every command received, in order.
    commands: Vec<TrafficCommand>,
    /// The number used to name the next randomly departing vehicle.
    next_vehicle: usize,
    closed: bool,
}

/// A vehicle on the road.
#[derive(Clone, Debug)]
struct Car {
    attributes: VehicleAttributes,
    /// Frozen vehicles hold their longitudinal position and speed.
    frozen: bool,
    /// The lane to move into on the next step.
    lane_request: Option<u32>,
    /// The speed command in progress.
    speed_command: Option<SpeedCommand>,
    lane_change_mode: Option<u32>,
}

/// A linear change of speed over time.
#[derive(Clone, Copy, Debug)]
struct SpeedCommand {
    from: f64,
    to: f64,
    /// The time over which the change is applied in s.
    duration: f64,
    /// The time the command has been in effect in s.
    elapsed: f64,
}

/// A vehicle waiting to enter the road.
#[derive(Clone, Debug)]
struct Departure {
    /// The time of departure in s.
    time: f64,
    name: String,
    attributes: VehicleAttributes,
}

impl SpeedCommand {
    /// Advances the command by `dt` seconds, returning the new speed
    /// and whether the command has finished.
    fn advance(&mut self, dt: f64) -> (f64, bool) {
        self.elapsed += dt;
        let frac = if self.duration > 0.0 {
            f64::min(self.elapsed / self.duration, 1.0)
        } else {
            1.0
        };
        (self.from + (self.to - self.from) * frac, frac >= 1.0)
    }
}

impl HighwayTraffic {
    /// Creates an empty road. Every lane starts with the default speed limit.
    pub fn new(params: HighwayParams) -> Self {
        Self {
            params,
            speed_limits: vec![DEFAULT_LANE_SPEED_LIMIT; params.num_lanes as usize],
            cars: BTreeMap::new(),
            departures: vec![],
            time: 0.0,
            commands: vec![],
            next_vehicle: 0,
            closed: false,
        }
    }

    /// The current simulation time in s.
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Places a vehicle on the road immediately.
    /// Returns `false` if a vehicle with the same name is already present.
    pub fn add_vehicle(&mut self, name: &str, attributes: VehicleAttributes) -> bool {
        if self.cars.contains_key(name) {
            return false;
        }
        let mut attributes = attributes;
        attributes.lane_index = attributes.lane_index.min(self.last_lane());
        attributes.position.y = attributes.lane_index as f64 * LANE_WIDTH;
        attributes.max_legal_speed = self.speed_limit(attributes.lane_index);
        self.cars.insert(
            name.to_owned(),
            Car {
                attributes,
                frozen: false,
                lane_request: None,
                speed_command: None,
                lane_change_mode: None,
            },
        );
        true
    }

    /// Takes a vehicle off the road, as if it had parked.
    pub fn remove_vehicle(&mut self, name: &str) -> Option<VehicleAttributes> {
        self.cars.remove(name).map(|car| car.attributes)
    }

    /// Schedules a vehicle to enter the road on the first step at or after `time` seconds.
    pub fn schedule_departure(&mut self, time: f64, name: &str, attributes: VehicleAttributes) {
        let idx = self.departures.partition_point(|d| d.time <= time);
        self.departures.insert(
            idx,
            Departure {
                time,
                name: name.to_owned(),
                attributes,
            },
        );
    }

    /// Schedules `count` vehicles to depart every `headway` seconds in random lanes
    /// at the start of the road. Initial speeds are sampled from a normal
    /// distribution around `mean_speed` with standard deviation `stddev`.
    pub fn schedule_random_departures(
        &mut self,
        count: usize,
        headway: f64,
        mean_speed: f64,
        stddev: f64,
        template: &VehicleAttributes,
        rng: &mut impl Rng,
    ) -> Result<()> {
        let distr =
            Normal::new(mean_speed, stddev).map_err(|_| Error::invalid("stddev", stddev.to_string()))?;
        let start = self.departures.last().map_or(self.time, |d| d.time);
        for i in 0..count {
            let speed = distr.sample(rng).min(template.max_speed).max(0.0);
            let attributes = VehicleAttributes {
                speed,
                lane_index: rng.gen_range(0..self.params.num_lanes),
                ..*template
            };
            let name = self.fresh_name();
            self.schedule_departure(start + (i + 1) as f64 * headway, &name, attributes);
        }
        Ok(())
    }

    /// Sets the `frozen` attribute of a vehicle. A frozen vehicle keeps its
    /// longitudinal position and speed, but still changes lanes when asked.
    pub fn set_vehicle_frozen(&mut self, name: &str, frozen: bool) {
        if let Some(car) = self.cars.get_mut(name) {
            car.frozen = frozen;
        }
    }

    /// The lane change mode most recently set for the vehicle.
    pub fn lane_change_mode(&self, name: &str) -> Option<u32> {
        self.cars.get(name).and_then(|car| car.lane_change_mode)
    }

    /// Every command received so far, in order.
    pub fn commands(&self) -> &[TrafficCommand] {
        &self.commands
    }

    /// The commands received for a single vehicle.
    pub fn commands_for<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a TrafficCommand> + 'a {
        self.commands
            .iter()
            .filter(move |cmd| cmd.vehicle() == Some(name))
    }

    /// The speed limit of a lane in m/s.
    pub fn speed_limit(&self, lane: u32) -> f64 {
        self.speed_limits
            .get(lane as usize)
            .copied()
            .unwrap_or(DEFAULT_LANE_SPEED_LIMIT)
    }

    /// Whether [TrafficProvider::close] has been called.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Generates a vehicle name not used by any vehicle on the road or waiting to depart.
    fn fresh_name(&mut self) -> String {
        loop {
            let name = format!("veh{}", self.next_vehicle);
            self.next_vehicle += 1;
            let taken = self.cars.contains_key(&name)
                || self.departures.iter().any(|d| d.name == name);
            if !taken {
                return name;
            }
        }
    }

    fn last_lane(&self) -> u32 {
        self.params.num_lanes.saturating_sub(1)
    }

    /// Updates the speed and position of a single vehicle.
    fn integrate(car: &mut Car, speed_limit: f64, dt: f64) {
        let attribs = &mut car.attributes;
        let vel = attribs.speed;
        let commanded = car.speed_command.as_mut().map(|command| command.advance(dt));
        let new_vel = match commanded {
            Some((vel, done)) => {
                if done {
                    car.speed_command = None;
                }
                vel
            }
            None => {
                let max_vel = f64::min(attribs.max_speed, speed_limit);
                let acc = if max_vel > 0.0 {
                    attribs.acceleration * (1.0 - (vel / max_vel).powi(4))
                } else {
                    -attribs.deceleration
                };
                vel + acc * dt
            }
        };
        let new_vel = f64::max(new_vel, 0.0);
        attribs.position.x += 0.5 * (vel + new_vel) * dt;
        attribs.speed = new_vel;
    }

    /// Moves vehicles whose departure time has come onto the road.
    fn depart_vehicles(&mut self) {
        let due = self.departures.partition_point(|d| d.time <= self.time);
        let departing: Vec<_> = self.departures.drain(..due).collect();
        for departure in departing {
            let attributes = VehicleAttributes {
                position: Point2d::new(0.0, 0.0),
                ..departure.attributes
            };
            if self.add_vehicle(&departure.name, attributes) {
                trace!("{} departs at {:.2}s", departure.name, self.time);
            } else {
                warn!(
                    "{} cannot depart at {:.2}s, a vehicle of that name is already on the road",
                    departure.name, self.time
                );
            }
        }
    }
}

impl TrafficProvider for HighwayTraffic {
    fn vehicle_ids(&self) -> Vec<String> {
        self.cars.keys().cloned().collect()
    }

    fn contains(&self, vehicle: &str) -> bool {
        self.cars.contains_key(vehicle)
    }

    fn attributes(&self, vehicle: &str) -> Option<VehicleAttributes> {
        self.cars.get(vehicle).map(|car| car.attributes)
    }

    fn change_lane(&mut self, vehicle: &str, lane: u32, hold: Duration) {
        self.commands.push(TrafficCommand::ChangeLane {
            vehicle: vehicle.to_owned(),
            lane,
            hold,
        });
        let last_lane = self.last_lane();
        if let Some(car) = self.cars.get_mut(vehicle) {
            car.lane_request = Some(lane.min(last_lane));
        }
    }

    fn slow_down(&mut self, vehicle: &str, speed: f64, duration: Duration) {
        self.commands.push(TrafficCommand::SlowDown {
            vehicle: vehicle.to_owned(),
            speed,
            duration,
        });
        if let Some(car) = self.cars.get_mut(vehicle) {
            car.speed_command = Some(SpeedCommand {
                from: car.attributes.speed,
                to: speed,
                duration: duration.as_secs_f64(),
                elapsed: 0.0,
            });
        }
    }

    fn set_lane_change_mode(&mut self, vehicle: &str, mode: u32) {
        self.commands.push(TrafficCommand::SetLaneChangeMode {
            vehicle: vehicle.to_owned(),
            mode,
        });
        if let Some(car) = self.cars.get_mut(vehicle) {
            car.lane_change_mode = Some(mode);
        }
    }

    fn set_lane_speed_limit(&mut self, lane: u32, speed: f64) {
        self.commands
            .push(TrafficCommand::SetLaneSpeedLimit { lane, speed });
        if let Some(limit) = self.speed_limits.get_mut(lane as usize) {
            *limit = speed;
        }
    }

    fn step(&mut self) {
        let dt = self.params.step_length;
        self.time += dt;

        for car in self.cars.values_mut() {
            if let Some(lane) = car.lane_request.take() {
                car.attributes.lane_index = lane;
                car.attributes.position.y = lane as f64 * LANE_WIDTH;
            }
            let limit = self
                .speed_limits
                .get(car.attributes.lane_index as usize)
                .copied()
                .unwrap_or(DEFAULT_LANE_SPEED_LIMIT);
            car.attributes.max_legal_speed = limit;
            if !car.frozen {
                Self::integrate(car, limit, dt);
            }
        }

        let road_length = self.params.road_length;
        self.cars.retain(|name, car| {
            let on_road = car.attributes.x() <= road_length;
            if !on_road {
                trace!("{name} leaves the road");
            }
            on_road
        });

        self.depart_vehicles();
    }

    fn min_expected_number(&self) -> usize {
        self.cars.len() + self.departures.len()
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

use crate::config::Config;
use crate::vehicle::Vehicle;
use itertools::Itertools;
use log::debug;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::time::Duration;

/// Periodically chooses vehicles that should change lanes.
///
/// Each time it fires, every placed vehicle without a pending target whose
/// lane is selectable is given a new target one lane away with the
/// configured probability. Vehicles in an edge lane always target the
/// lane inside it.
pub struct Governor {
    /// Bit `i` is set if vehicles in lane `i` may be selected.
    lane_mask: u32,
    /// The number of lanes on the road.
    num_lanes: u32,
    /// The probability of selecting an eligible vehicle.
    probability: f64,
    /// The time between selections.
    interval: Duration,
    /// The governor's own random number generator.
    rng: ChaCha8Rng,
}

impl Governor {
    /// Creates a new governor. On a road with fewer than two lanes it never selects anyone.
    ///
    /// # Parameters
    /// * `lane_mask` - Bit `i` is set if vehicles in lane `i` may be selected.
    /// * `num_lanes` - The number of lanes on the road.
    /// * `probability` - The probability of selecting an eligible vehicle.
    /// * `interval` - The time between selections.
    /// * `seed` - Seeds the random number generator.
    pub fn new(
        lane_mask: u32,
        num_lanes: u32,
        probability: f64,
        interval: Duration,
        seed: u64,
    ) -> Self {
        Self {
            lane_mask,
            num_lanes,
            probability,
            interval,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Creates a governor from the simulation configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.selection_lanes,
            config.num_lanes,
            config.selection_probability,
            config.selection_interval(),
            config.seed,
        )
    }

    /// The time between selections.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether vehicles in `lane` may be selected.
    pub fn is_selectable(&self, lane: u32) -> bool {
        lane < u32::BITS && self.lane_mask & (1 << lane) != 0
    }

    /// Gives new targets to some of the given vehicles, which must all be
    /// present in the traffic simulation. Returns the number of vehicles selected.
    pub fn select_vehicles<'a>(&mut self, vehicles: impl IntoIterator<Item = &'a mut Vehicle>) -> usize {
        let mut selected = vec![];
        for vehicle in vehicles {
            if !vehicle.is_placed() || !self.is_selectable(vehicle.lane()) || vehicle.has_target() {
                continue;
            }
            if self.rng.gen::<f64>() < self.probability {
                let Some(target) = self.choose_target(vehicle.lane()) else {
                    continue;
                };
                vehicle.set_target(target);
                selected.push(vehicle.name().to_owned());
            }
        }
        if !selected.is_empty() {
            debug!("Selected for lane change: {}", selected.iter().join(", "));
        }
        selected.len()
    }

    /// Chooses a lane adjacent to `lane`, moving away from the edges of the road.
    /// Returns `None` on a road with fewer than two lanes.
    fn choose_target(&mut self, lane: u32) -> Option<u32> {
        let last = self.num_lanes.checked_sub(1).filter(|last| *last > 0)?;
        let target = if lane == 0 {
            1
        } else if lane >= last {
            last - 1
        } else if self.rng.gen::<f64>() <= 0.5 {
            lane + 1
        } else {
            lane - 1
        };
        Some(target)
    }
}

use crate::attributes::VehicleAttributes;
use crate::coordinator::{Algorithm, Coordinator};
use crate::VehicleId;

/// A vehicle taking part in lane change negotiations.
///
/// The vehicle tracks a target lane assigned by the [Governor](crate::Governor)
/// and, one lane at a time, asks its coordinator to negotiate moves towards it.
#[derive(Clone, Debug)]
pub struct Vehicle {
    /// The vehicle's ID.
    id: VehicleId,
    /// The identifier of the vehicle in the traffic provider.
    name: String,
    /// The most recent snapshot of the vehicle's state.
    attributes: VehicleAttributes,
    /// Whether the vehicle has received its first snapshot.
    placed: bool,
    /// The lane the vehicle has been asked to reach, if any.
    target_lane: Option<u32>,
    /// The lane from which the last move was requested.
    previous_lane: Option<u32>,
    /// The lane of the most recent negotiation.
    negotiating: Option<u32>,
    /// The vehicle's lane change coordinator.
    coordinator: Coordinator,
}

impl Vehicle {
    /// Creates a new vehicle which has not yet been placed on the road.
    pub(crate) fn new(id: VehicleId, name: &str, algorithm: Algorithm) -> Self {
        Self {
            id,
            name: name.to_owned(),
            attributes: Default::default(),
            placed: false,
            target_lane: None,
            previous_lane: None,
            negotiating: None,
            coordinator: Coordinator::new(algorithm),
        }
    }

    /// Gets the vehicle's ID.
    pub fn id(&self) -> VehicleId {
        self.id
    }

    /// Gets the vehicle's identifier in the traffic provider.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The most recent snapshot of the vehicle's state.
    pub fn attributes(&self) -> &VehicleAttributes {
        &self.attributes
    }

    /// The lane the vehicle currently occupies.
    pub fn lane(&self) -> u32 {
        self.attributes.lane_index
    }

    /// Whether the vehicle has been placed on the road.
    pub fn is_placed(&self) -> bool {
        self.placed
    }

    /// The lane the vehicle is trying to reach.
    pub fn target_lane(&self) -> Option<u32> {
        self.target_lane
    }

    /// Whether the vehicle is trying to reach another lane.
    pub fn has_target(&self) -> bool {
        self.target_lane.is_some()
    }

    /// Sets the lane the vehicle should try to reach.
    /// Returns `false`, leaving the current target in place, if one is already pending.
    pub fn set_target(&mut self, lane: u32) -> bool {
        if self.has_target() {
            return false;
        }
        self.target_lane = Some(lane);
        true
    }

    /// The vehicle's lane change coordinator.
    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    pub(crate) fn coordinator_mut(&mut self) -> &mut Coordinator {
        &mut self.coordinator
    }

    /// Starts negotiating a move into `lane`, replacing any earlier negotiation.
    /// Returns the content of the query to broadcast.
    pub(crate) fn begin_negotiation(&mut self, lane: u32) -> String {
        self.negotiating = Some(lane);
        self.coordinator.begin(&self.attributes, lane)
    }

    /// Whether the vehicle has since started negotiating a move into a lane other than `lane`.
    pub fn has_moved_on_from(&self, lane: u32) -> bool {
        self.negotiating.map_or(false, |negotiating| negotiating != lane)
    }

    /// Replaces the vehicle's snapshot with a fresh one from the traffic provider.
    pub(crate) fn refresh(&mut self, attributes: VehicleAttributes) {
        self.attributes = attributes;
        self.placed = true;
    }

    /// Advances the vehicle's lane change state machine by one step.
    /// Returns the adjacent lane the vehicle should now negotiate a move into.
    ///
    /// A move is requested only when the vehicle has just settled into a lane
    /// it has not requested from before, so a move in flight is not requested twice.
    pub(crate) fn step(&mut self) -> Option<u32> {
        let target = self.target_lane?;
        let current = self.lane();
        if target == current {
            self.target_lane = None;
            return None;
        }
        if self.previous_lane == Some(current) {
            return None;
        }
        self.previous_lane = Some(current);
        if target > current {
            Some(current + 1)
        } else {
            Some(current - 1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    fn vehicle(lane: u32) -> Vehicle {
        let mut ids = SlotMap::<VehicleId, ()>::with_key();
        let mut vehicle = Vehicle::new(ids.insert(()), "veh0", Algorithm::Baseline);
        vehicle.refresh(VehicleAttributes {
            lane_index: lane,
            ..Default::default()
        });
        vehicle
    }

    fn move_to(vehicle: &mut Vehicle, lane: u32) {
        let attributes = *vehicle.attributes();
        vehicle.refresh(VehicleAttributes {
            lane_index: lane,
            ..attributes
        });
    }

    #[test]
    fn idle_vehicle_does_nothing() {
        let mut vehicle = vehicle(2);
        assert_eq!(vehicle.step(), None);
        assert!(!vehicle.has_target());
    }

    #[test]
    fn hops_one_lane_at_a_time_towards_target() {
        let mut vehicle = vehicle(0);
        assert!(vehicle.set_target(2));

        assert_eq!(vehicle.step(), Some(1));
        // Move still in flight
        assert_eq!(vehicle.step(), None);
        assert_eq!(vehicle.step(), None);

        move_to(&mut vehicle, 1);
        assert_eq!(vehicle.step(), Some(2));
        assert_eq!(vehicle.step(), None);

        move_to(&mut vehicle, 2);
        assert_eq!(vehicle.step(), None);
        assert_eq!(vehicle.target_lane(), None);
    }

    #[test]
    fn moves_down_when_target_is_below() {
        let mut vehicle = vehicle(3);
        vehicle.set_target(2);
        assert_eq!(vehicle.step(), Some(2));
    }

    #[test]
    fn pending_target_is_not_replaced() {
        let mut vehicle = vehicle(1);
        assert!(vehicle.set_target(2));
        assert!(!vehicle.set_target(0));
        assert_eq!(vehicle.target_lane(), Some(2));
    }

    #[test]
    fn later_negotiations_replace_earlier_ones() {
        let mut vehicle = vehicle(0);
        assert!(!vehicle.has_moved_on_from(1));

        vehicle.begin_negotiation(1);
        assert!(!vehicle.has_moved_on_from(1));

        move_to(&mut vehicle, 1);
        vehicle.begin_negotiation(2);
        assert!(vehicle.has_moved_on_from(1));
        assert!(!vehicle.has_moved_on_from(2));
    }

    #[test]
    fn new_vehicle_is_not_placed() {
        let mut ids = SlotMap::<VehicleId, ()>::with_key();
        let vehicle = Vehicle::new(ids.insert(()), "veh1", Algorithm::Enhanced);
        assert!(!vehicle.is_placed());
        assert_eq!(vehicle.name(), "veh1");
        assert_eq!(vehicle.coordinator().algorithm(), Algorithm::Enhanced);
    }
}

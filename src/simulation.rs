use crate::config::Config;
use crate::coordinator::{
    Algorithm, Decision, Reaction, RETRY_DELAY, SETTLE_WINDOW, SLOW_DOWN_FACTOR,
    SPEED_ADJUST_DURATION, YIELD_WAIT,
};
use crate::error::Result;
use crate::event::{Event, EventQueue};
use crate::governor::Governor;
use crate::message::{Action, Instruction, Message, Recipient};
use crate::network::{Network, Packet};
use crate::traffic::TrafficProvider;
use crate::vehicle::Vehicle;
use crate::{VehicleId, VehicleSet};
use log::{debug, info, trace, warn};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// A lane change recommendation carried out by a vehicle.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LaneChangeRecord {
    /// The simulation time of the recommendation in s.
    pub time: f64,
    /// The vehicle's identifier in the traffic provider.
    pub vehicle: String,
    /// The lane the vehicle occupied.
    pub from_lane: u32,
    /// The lane the vehicle negotiated a move into.
    pub to_lane: u32,
    /// Whether the move was recommended, rather than deferred.
    pub recommended: bool,
    /// The negotiation algorithm the vehicle ran.
    pub algorithm: Algorithm,
}

/// A lane change experiment.
///
/// The simulation owns the vehicle registry and a discrete-event queue.
/// Each step it synchronises the registry with the traffic provider, lets
/// every vehicle request its next lane change, and then advances the
/// traffic provider. Lane change negotiations, governor selections and
/// retry timers all run as events between steps.
pub struct Simulation<T> {
    config: Config,
    /// The traffic microsimulation.
    traffic: T,
    /// The vehicles known to the experiment.
    vehicles: VehicleSet,
    /// Maps the traffic provider's vehicle identifiers to vehicle IDs.
    names: HashMap<String, VehicleId>,
    /// The pending events.
    queue: EventQueue<Event>,
    governor: Governor,
    network: Network,
    /// Every lane change recommendation made so far.
    lane_changes: Vec<LaneChangeRecord>,
    /// Whether the traffic provider has run out of vehicles.
    finished: bool,
}

impl<T: TrafficProvider> Simulation<T> {
    /// Creates a new experiment over the given traffic provider.
    /// Lane speed limits from the configuration are applied immediately.
    pub fn new(config: Config, mut traffic: T) -> Result<Self> {
        config.validate()?;
        for (lane, speed) in config.lane_speed_limits.iter().enumerate() {
            traffic.set_lane_speed_limit(lane as u32, *speed);
        }

        let mut queue = EventQueue::new();
        queue.schedule(Duration::ZERO, Event::Step);
        queue.schedule(config.selection_interval(), Event::SelectVehicles);

        info!(
            "Lane change experiment: {} lanes, {} algorithm, selection probability {} every {}s",
            config.num_lanes, config.algorithm, config.selection_probability, config.selection_interval
        );

        Ok(Self {
            governor: Governor::from_config(&config),
            network: Network::new(config.seed.wrapping_add(1)),
            config,
            traffic,
            vehicles: VehicleSet::with_key(),
            names: HashMap::new(),
            queue,
            lane_changes: vec![],
            finished: false,
        })
    }

    /// Runs every event due no later than `until`, then advances the clock to `until`.
    pub fn run_until(&mut self, until: Duration) {
        while let Some((_, event)) = self.queue.pop_until(until) {
            self.handle(event);
        }
        self.queue.advance_to(until);
    }

    /// Runs until no events remain, then closes the traffic provider.
    /// Returns the time of the last event.
    pub fn run(&mut self) -> Duration {
        while let Some((_, event)) = self.queue.pop_until(Duration::MAX) {
            self.handle(event);
        }
        self.traffic.close();
        info!(
            "Experiment finished at {:.2}s after {} lane change recommendations",
            self.now().as_secs_f64(),
            self.lane_changes.len()
        );
        self.now()
    }

    /// The current simulation time.
    pub fn now(&self) -> Duration {
        self.queue.now()
    }

    /// Whether the traffic provider has run out of vehicles.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// The configuration the experiment runs with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Gets the ID of the vehicle with the given traffic provider identifier.
    pub fn vehicle_id(&self, name: &str) -> Option<VehicleId> {
        self.names.get(name).copied()
    }

    /// Gets a reference to the vehicle with the given ID.
    pub fn vehicle(&self, vehicle_id: VehicleId) -> Option<&Vehicle> {
        self.vehicles.get(vehicle_id)
    }

    /// Returns an iterator over all the vehicles in the experiment.
    pub fn iter_vehicles(&self) -> impl Iterator<Item = &Vehicle> {
        self.vehicles.values()
    }

    /// Asks the vehicle to make its way to `lane`, as the governor would.
    /// Returns `false` if the vehicle is unknown or already has a target.
    pub fn set_vehicle_target(&mut self, vehicle_id: VehicleId, lane: u32) -> bool {
        self.vehicles
            .get_mut(vehicle_id)
            .map_or(false, |vehicle| vehicle.set_target(lane))
    }

    /// Gets a reference to the traffic provider.
    pub fn traffic(&self) -> &T {
        &self.traffic
    }

    /// Gets a mutable reference to the traffic provider.
    pub fn traffic_mut(&mut self) -> &mut T {
        &mut self.traffic
    }

    /// Every lane change recommendation made so far, in order.
    pub fn lane_change_log(&self) -> &[LaneChangeRecord] {
        &self.lane_changes
    }

    /// Starts negotiating a move of the vehicle into the adjacent `lane`.
    ///
    /// The vehicle broadcasts a query and evaluates the responses once the
    /// settle window has passed. Does nothing if the vehicle has left the road.
    pub fn change_lane(&mut self, vehicle_id: VehicleId, lane: u32) {
        let Some(vehicle) = self.vehicles.get_mut(vehicle_id) else {
            return;
        };
        if !self.traffic.contains(vehicle.name()) {
            trace!("{} is not on the road, not changing lanes", vehicle.name());
            return;
        }
        let query = vehicle.begin_negotiation(lane);
        debug!(
            "{} negotiating a move from lane {} to lane {lane}",
            vehicle.name(),
            vehicle.lane()
        );
        self.send(Message::new(
            Action::Get,
            query,
            vehicle_id,
            Recipient::Broadcast,
        ));
        self.queue.schedule(
            SETTLE_WINDOW,
            Event::RunAlgorithm {
                vehicle: vehicle_id,
                lane,
            },
        );
    }

    fn handle(&mut self, event: Event) {
        match event {
            Event::Step => self.step(),
            Event::SelectVehicles => self.select_vehicles(),
            Event::Transmit(packet) => self.deliver(&packet),
            Event::RunAlgorithm { vehicle, lane } => self.run_algorithm(vehicle, lane),
            Event::Recommend {
                vehicle,
                recommend,
                lane,
            } => self.recommend(vehicle, recommend, lane),
            Event::VerifyLaneChange { vehicle, lane } => self.verify_lane_change(vehicle, lane),
            Event::ChangeLane { vehicle, lane } => self.change_lane(vehicle, lane),
        }
    }

    /// Performs one tick of the experiment loop.
    fn step(&mut self) {
        self.sync_vehicles();

        if self.traffic.min_expected_number() == 0 {
            info!(
                "No more vehicles expected at {:.2}s",
                self.now().as_secs_f64()
            );
            self.finished = true;
            return;
        }

        let mut requests = vec![];
        for (vehicle_id, vehicle) in &mut self.vehicles {
            if let Some(lane) = vehicle.step() {
                requests.push((vehicle_id, lane));
            }
        }
        for (vehicle_id, lane) in requests {
            self.change_lane(vehicle_id, lane);
        }

        self.traffic.step();
        self.queue.schedule(self.config.step_length(), Event::Step);
    }

    /// Registers new vehicles, retires departed ones and refreshes every snapshot.
    /// A vehicle joins the network once its first snapshot arrives.
    fn sync_vehicles(&mut self) {
        let active = self.traffic.vehicle_ids();

        let present: HashSet<&str> = active.iter().map(String::as_str).collect();
        let departed: Vec<VehicleId> = self
            .names
            .iter()
            .filter(|(name, _)| !present.contains(name.as_str()))
            .map(|(_, id)| *id)
            .collect();
        for vehicle_id in departed {
            self.retire(vehicle_id);
        }

        for name in &active {
            let vehicle_id = match self.names.get(name) {
                Some(id) => *id,
                None => self.register(name),
            };
            let Some(attributes) = self.traffic.attributes(name) else {
                trace!("No snapshot for {name} yet");
                continue;
            };
            if !self.vehicles[vehicle_id].is_placed() {
                self.traffic
                    .set_lane_change_mode(name, self.config.lane_change_mode);
                let delay = self.network.attach(vehicle_id);
                trace!("{name} joins the network with a {delay:?} transmission delay");
            }
            self.vehicles[vehicle_id].refresh(attributes);
        }
    }

    fn register(&mut self, name: &str) -> VehicleId {
        let algorithm = self.config.algorithm;
        let vehicle_id = self
            .vehicles
            .insert_with_key(|id| Vehicle::new(id, name, algorithm));
        self.names.insert(name.to_owned(), vehicle_id);
        debug!("{name} entered the simulation");
        vehicle_id
    }

    fn retire(&mut self, vehicle_id: VehicleId) {
        if let Some(vehicle) = self.vehicles.remove(vehicle_id) {
            self.names.remove(vehicle.name());
            self.network.detach(vehicle_id);
            debug!("{} left the simulation", vehicle.name());
        }
    }

    /// Lets the governor pick vehicles that should change lanes.
    fn select_vehicles(&mut self) {
        let traffic = &self.traffic;
        let candidates = self
            .vehicles
            .values_mut()
            .filter(|vehicle| traffic.contains(vehicle.name()));
        let selected = self.governor.select_vehicles(candidates);
        if selected > 0 {
            debug!(
                "Governor selected {selected} vehicles at {:.2}s",
                self.now().as_secs_f64()
            );
        }
        if self.traffic.min_expected_number() > 0 {
            self.queue
                .schedule(self.governor.interval(), Event::SelectVehicles);
        }
    }

    /// Queues a message for transmission after the sender's transmission delay.
    fn send(&mut self, message: Message) {
        let delay = self.network.transmission_delay(message.sender);
        self.queue
            .schedule(delay, Event::Transmit(message.to_packet()));
    }

    /// Hands a packet to each of its recipients.
    fn deliver(&mut self, packet: &Packet) {
        let message = match Message::from_packet(packet) {
            Ok(message) => message,
            Err(err) => {
                warn!("Dropping packet {:?}: {err}", packet.payload);
                return;
            }
        };
        trace!("Delivering {:?}", packet.payload);

        for recipient in self.network.recipients(packet) {
            let Some(vehicle) = self.vehicles.get_mut(recipient) else {
                continue;
            };
            let me = *vehicle.attributes();
            match vehicle.coordinator_mut().receive(&me, &message) {
                Ok(Reaction::Ignore) => {}
                Ok(Reaction::Reply(content)) => self.send(Message::new(
                    Action::Response,
                    content,
                    recipient,
                    Recipient::Vehicle(message.sender),
                )),
                Ok(Reaction::Obey(Instruction::SlowDown)) => self.yield_to_peer(recipient),
                Err(err) => warn!(
                    "{} dropped {:?}: {err}",
                    vehicle.name(),
                    packet.payload
                ),
            }
        }
    }

    /// Carries out a request from a peer to let it in.
    fn yield_to_peer(&mut self, vehicle_id: VehicleId) {
        let Some(vehicle) = self.vehicles.get(vehicle_id) else {
            return;
        };
        if !self.traffic.contains(vehicle.name()) {
            return;
        }
        let speed = vehicle.attributes().speed / SLOW_DOWN_FACTOR;
        debug!("{} yielding, adjusting speed to {speed:.2}", vehicle.name());
        self.traffic
            .slow_down(vehicle.name(), speed, SPEED_ADJUST_DURATION);
    }

    /// Evaluates the responses to a lane change query.
    fn run_algorithm(&mut self, vehicle_id: VehicleId, lane: u32) {
        let Some(vehicle) = self.vehicles.get(vehicle_id) else {
            return;
        };
        if !self.traffic.contains(vehicle.name()) {
            return;
        }
        let coordinator = vehicle.coordinator();
        let decision = coordinator.decide(vehicle.attributes(), lane);
        debug!(
            "{} decided {decision:?} for lane {lane} from {} responses",
            vehicle.name(),
            coordinator.responses().len()
        );

        match decision {
            Decision::Proceed => self.recommend(vehicle_id, true, lane),
            Decision::Accelerate { speed } => {
                self.traffic
                    .slow_down(vehicle.name(), speed, SPEED_ADJUST_DURATION);
                self.recommend(vehicle_id, true, lane);
            }
            Decision::Defer { speed } => {
                self.traffic
                    .slow_down(vehicle.name(), speed, SPEED_ADJUST_DURATION);
                self.recommend(vehicle_id, false, lane);
            }
            Decision::RequestYield { partner } => {
                self.send(Message::command(Instruction::SlowDown, vehicle_id, partner));
                self.queue.schedule(
                    YIELD_WAIT,
                    Event::Recommend {
                        vehicle: vehicle_id,
                        recommend: true,
                        lane,
                    },
                );
            }
        }
    }

    /// Acts on a lane change recommendation: changes lanes and verifies
    /// the change later, or retries the whole negotiation later.
    fn recommend(&mut self, vehicle_id: VehicleId, recommend: bool, lane: u32) {
        let Some(vehicle) = self.vehicles.get(vehicle_id) else {
            return;
        };
        if !self.traffic.contains(vehicle.name()) {
            return;
        }
        let from = vehicle.lane();
        self.lane_changes.push(LaneChangeRecord {
            time: self.queue.now().as_secs_f64(),
            vehicle: vehicle.name().to_owned(),
            from_lane: from,
            to_lane: lane,
            recommended: recommend,
            algorithm: vehicle.coordinator().algorithm(),
        });

        if recommend {
            self.traffic.change_lane(vehicle.name(), lane, Duration::ZERO);
            self.queue.schedule(
                RETRY_DELAY,
                Event::VerifyLaneChange {
                    vehicle: vehicle_id,
                    lane,
                },
            );
        } else {
            self.queue.schedule(
                RETRY_DELAY,
                Event::ChangeLane {
                    vehicle: vehicle_id,
                    lane,
                },
            );
        }
    }

    /// Retries a lane change that has not happened, unless the vehicle
    /// has since negotiated a move into another lane.
    fn verify_lane_change(&mut self, vehicle_id: VehicleId, lane: u32) {
        let Some(vehicle) = self.vehicles.get(vehicle_id) else {
            return;
        };
        if vehicle.has_moved_on_from(lane) {
            trace!("{} has moved on from lane {lane}", vehicle.name());
            return;
        }
        let current = vehicle.lane();
        if current != lane {
            debug!("{} is still in lane {current}, retrying", vehicle.name());
            self.change_lane(vehicle_id, lane);
        }
    }
}

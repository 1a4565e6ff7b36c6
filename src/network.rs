//! A simulated broadcast network connecting the vehicles.

use crate::message::Recipient;
use crate::VehicleId;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use slotmap::SecondaryMap;
use std::time::Duration;

/// The largest per-device transmission delay, in ns.
const MAX_TRANSMISSION_DELAY_NS: u64 = 50;

/// An encoded message in flight.
#[derive(Clone, Debug, PartialEq)]
pub struct Packet {
    pub sender: VehicleId,
    pub recipient: Recipient,
    /// The ASCII payload, `<Action>/<Content>`.
    pub payload: String,
}

/// A network device attached to a vehicle.
#[derive(Clone, Copy, Debug)]
struct Endpoint {
    /// The delay applied to every packet sent by this device,
    /// which keeps vehicles from transmitting in lockstep.
    transmission_delay: Duration,
}

/// The set of network devices that can exchange packets.
pub struct Network {
    endpoints: SecondaryMap<VehicleId, Endpoint>,
    rng: ChaCha8Rng,
}

impl Network {
    /// Creates an empty network. Transmission delays are drawn from a
    /// generator seeded with `seed`.
    pub fn new(seed: u64) -> Self {
        Self {
            endpoints: SecondaryMap::new(),
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Attaches a device to the vehicle, returning its transmission delay.
    /// Attaching an already attached vehicle keeps its existing delay.
    pub fn attach(&mut self, vehicle: VehicleId) -> Duration {
        if let Some(endpoint) = self.endpoints.get(vehicle) {
            return endpoint.transmission_delay;
        }
        let transmission_delay =
            Duration::from_nanos(self.rng.gen_range(0..=MAX_TRANSMISSION_DELAY_NS));
        self.endpoints
            .insert(vehicle, Endpoint { transmission_delay });
        transmission_delay
    }

    /// Detaches the vehicle's device. It will no longer receive packets.
    pub fn detach(&mut self, vehicle: VehicleId) {
        self.endpoints.remove(vehicle);
    }

    /// Whether the vehicle has a device attached.
    pub fn is_attached(&self, vehicle: VehicleId) -> bool {
        self.endpoints.contains_key(vehicle)
    }

    /// The transmission delay of the vehicle's device, or zero if it has none.
    pub fn transmission_delay(&self, vehicle: VehicleId) -> Duration {
        self.endpoints
            .get(vehicle)
            .map(|e| e.transmission_delay)
            .unwrap_or_default()
    }

    /// The vehicles which receive the packet.
    pub fn recipients(&self, packet: &Packet) -> Vec<VehicleId> {
        match packet.recipient {
            Recipient::Broadcast => self
                .endpoints
                .keys()
                .filter(|id| *id != packet.sender)
                .collect(),
            Recipient::Vehicle(id) if self.is_attached(id) => vec![id],
            Recipient::Vehicle(_) => vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::VehicleId;
    use slotmap::SlotMap;

    fn packet(sender: VehicleId, recipient: Recipient) -> Packet {
        Packet {
            sender,
            recipient,
            payload: "Get/1".into(),
        }
    }

    #[test]
    fn broadcast_reaches_everyone_but_sender() {
        let mut ids = SlotMap::<VehicleId, ()>::with_key();
        let (a, b, c) = (ids.insert(()), ids.insert(()), ids.insert(()));
        let mut network = Network::new(7);
        for id in [a, b, c] {
            network.attach(id);
        }

        assert_eq!(network.recipients(&packet(a, Recipient::Broadcast)), [b, c]);

        network.detach(c);
        assert_eq!(network.recipients(&packet(a, Recipient::Broadcast)), [b]);
        assert!(network.recipients(&packet(a, Recipient::Vehicle(c))).is_empty());
        assert_eq!(network.recipients(&packet(a, Recipient::Vehicle(b))), [b]);
    }

    #[test]
    fn delays_are_bounded_and_stable() {
        let mut ids = SlotMap::<VehicleId, ()>::with_key();
        let mut network = Network::new(42);
        for _ in 0..100 {
            let id = ids.insert(());
            let delay = network.attach(id);
            assert!(delay <= Duration::from_nanos(MAX_TRANSMISSION_DELAY_NS));
            assert_eq!(network.attach(id), delay);
            assert_eq!(network.transmission_delay(id), delay);
        }
    }

    #[test]
    fn delays_are_reproducible() {
        let mut ids = SlotMap::<VehicleId, ()>::with_key();
        let keys: Vec<_> = (0..10).map(|_| ids.insert(())).collect();
        let mut first = Network::new(3);
        let mut second = Network::new(3);
        for id in keys {
            assert_eq!(first.attach(id), second.attach(id));
        }
    }
}

pub use attributes::{Point2d, VehicleAttributes};
pub use cgmath;
pub use config::{lane_mask, Config};
pub use coordinator::{Algorithm, Coordinator, Decision, Reaction, ResponseTable};
pub use error::{Error, Result};
pub use event::{Event, EventQueue};
pub use governor::Governor;
pub use message::{Action, Instruction, Message, Recipient};
pub use network::{Network, Packet};
pub use simulation::{LaneChangeRecord, Simulation};
use slotmap::{new_key_type, SlotMap};
pub use slotmap::{Key, KeyData};
pub use traffic::{HighwayParams, HighwayTraffic, TrafficCommand, TrafficProvider};
pub use vehicle::Vehicle;

mod attributes;
mod config;
pub mod coordinator;
mod error;
mod event;
mod governor;
mod message;
mod network;
mod simulation;
pub mod traffic;
mod vehicle;

new_key_type! {
    /// Unique ID of a [Vehicle].
    pub struct VehicleId;
}

type VehicleSet = SlotMap<VehicleId, Vehicle>;

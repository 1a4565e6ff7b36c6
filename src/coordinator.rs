//! The per-vehicle lane change coordinator.
//!
//! A coordinator negotiates a single-lane move on behalf of its vehicle:
//! it broadcasts a query, collects the responses of peers that could be
//! affected, and runs one of two decision algorithms over them.
//! The coordinator itself performs no I/O; the [Simulation](crate::Simulation)
//! carries out the returned [Decision]s and [Reaction]s.

use crate::attributes::VehicleAttributes;
use crate::error::{Error, Result};
use crate::message::{Action, Instruction, Message};
use crate::VehicleId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub use ilach::LOOKAHEAD;
pub use peers::ResponseTable;

mod ilach;
mod ilach_plus;
mod peers;

/// Time allowed for peers to answer a query before the decision is made.
pub const SETTLE_WINDOW: Duration = Duration::from_millis(100);

/// Speed added when the vehicle accelerates into a gap, in m/s.
pub const SPEED_UP: f64 = 6.0; // m/s

/// The factor applied by a "slow down" speed adjustment. Speeds are divided by it.
pub const SLOW_DOWN_FACTOR: f64 = 2.0 / 3.0;

/// Time over which a speed adjustment is applied.
pub const SPEED_ADJUST_DURATION: Duration = Duration::from_secs(8);

/// Time the vehicle waits for a partner asked to yield before changing lanes.
pub const YIELD_WAIT: Duration = Duration::from_secs(4);

/// Time after a recommendation at which the lane change is verified or retried.
pub const RETRY_DELAY: Duration = Duration::from_secs(10);

/// The decision algorithm run by a coordinator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    /// ILACH: accelerate into the gap or wait for the partner to pass.
    #[default]
    Baseline,
    /// ILACH+: additionally asks the partner to yield when the vehicle is boxed in.
    Enhanced,
}

/// The outcome of a lane change negotiation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Decision {
    /// Change lanes now.
    Proceed,
    /// Adjust to `speed`, then change lanes.
    Accelerate { speed: f64 },
    /// Adjust to `speed` and retry later.
    Defer { speed: f64 },
    /// Ask `partner` to slow down, then change lanes after a fixed wait.
    RequestYield { partner: VehicleId },
}

/// What a coordinator wants done in response to a received message.
#[derive(Clone, Debug, PartialEq)]
pub enum Reaction {
    /// Nothing.
    Ignore,
    /// Send a [Action::Response] with this content back to the sender.
    Reply(String),
    /// Carry out an instruction from the sender.
    Obey(Instruction),
}

/// The lane change coordinator of a single vehicle.
#[derive(Clone, Debug)]
pub struct Coordinator {
    algorithm: Algorithm,
    /// Responses to the most recent query.
    responses: ResponseTable,
}

impl Algorithm {
    /// Encodes the context of a query for a move from `current` into `lane`.
    pub fn encode_query(self, lane: u32, current: u32) -> String {
        match self {
            Algorithm::Baseline => lane.to_string(),
            Algorithm::Enhanced => format!("{lane}/{current}"),
        }
    }

    /// Decodes the lanes whose occupants should answer a query.
    pub fn decode_query(self, content: &str) -> Result<Vec<u32>> {
        let lane = |s: &str| {
            s.trim()
                .parse::<u32>()
                .map_err(|_| Error::invalid("lane", s))
        };
        match self {
            Algorithm::Baseline => Ok(vec![lane(content)?]),
            Algorithm::Enhanced => {
                let (desired, current) = content
                    .split_once('/')
                    .ok_or_else(|| Error::MalformedPayload(content.to_owned()))?;
                Ok(vec![lane(desired)?, lane(current)?])
            }
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Algorithm::Baseline => "baseline",
            Algorithm::Enhanced => "enhanced",
        })
    }
}

impl FromStr for Algorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "baseline" | "ilach" => Ok(Algorithm::Baseline),
            "enhanced" | "ilach+" | "ilach-plus" => Ok(Algorithm::Enhanced),
            _ => Err(Error::invalid("algorithm", s)),
        }
    }
}

impl Coordinator {
    /// Creates a coordinator running the given algorithm.
    pub fn new(algorithm: Algorithm) -> Self {
        Self {
            algorithm,
            responses: ResponseTable::default(),
        }
    }

    /// The algorithm this coordinator runs.
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// The responses gathered for the current negotiation.
    pub fn responses(&self) -> &ResponseTable {
        &self.responses
    }

    /// Starts a new negotiation to move `me` into `lane`.
    /// Discards the responses of any previous negotiation and
    /// returns the content of the query to broadcast.
    pub fn begin(&mut self, me: &VehicleAttributes, lane: u32) -> String {
        self.responses.clear();
        self.algorithm.encode_query(lane, me.lane_index)
    }

    /// Handles a message received by the vehicle `me`.
    pub fn receive(&mut self, me: &VehicleAttributes, message: &Message) -> Result<Reaction> {
        match message.action {
            Action::Get => {
                let lanes = self.algorithm.decode_query(&message.content)?;
                if lanes.contains(&me.lane_index) {
                    Ok(Reaction::Reply(me.to_string()))
                } else {
                    Ok(Reaction::Ignore)
                }
            }
            Action::Response => {
                let attributes = message.content.parse()?;
                self.responses.insert(message.sender, attributes);
                Ok(Reaction::Ignore)
            }
            Action::Command => match self.algorithm {
                Algorithm::Baseline => Ok(Reaction::Ignore),
                Algorithm::Enhanced => Ok(Instruction::parse(&message.content)
                    .map_or(Reaction::Ignore, Reaction::Obey)),
            },
        }
    }

    /// Decides whether `me` should move into `lane`, based on the responses
    /// gathered since the negotiation began.
    pub fn decide(&self, me: &VehicleAttributes, lane: u32) -> Decision {
        match self.algorithm {
            Algorithm::Baseline => ilach::decide(me, &self.responses, lane),
            Algorithm::Enhanced => ilach_plus::decide(me, &self.responses, lane),
        }
    }
}

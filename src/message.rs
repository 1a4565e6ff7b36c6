//! Messages exchanged between lane-change coordinators.

use crate::error::{Error, Result};
use crate::network::Packet;
use crate::VehicleId;
use std::fmt;
use std::str::FromStr;

/// What the recipient of a message is asked to do.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    /// A query: recipients that could affect the sender's lane change reply.
    Get,
    /// A reply to a [Action::Get], carrying the responder's attributes.
    Response,
    /// An instruction to adjust behaviour in favour of the sender.
    Command,
}

/// The instructions which may be carried by a [Action::Command].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Instruction {
    /// Open a gap for the sender by adjusting speed.
    SlowDown,
}

/// The addressee of a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Recipient {
    /// Every vehicle within communication range.
    Broadcast,
    /// A single vehicle.
    Vehicle(VehicleId),
}

/// A message between two coordinators.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    /// What the sender wants done with the content.
    pub action: Action,
    /// The query, snapshot or instruction, depending on the action.
    pub content: String,
    /// The vehicle that sent the message.
    pub sender: VehicleId,
    /// Where the message is going.
    pub recipient: Recipient,
}

impl Action {
    /// The name used for the action on the wire.
    pub fn name(self) -> &'static str {
        match self {
            Action::Get => "Get",
            Action::Response => "Response",
            Action::Command => "Command",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Action {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Get" => Ok(Action::Get),
            "Response" => Ok(Action::Response),
            "Command" => Ok(Action::Command),
            other => Err(Error::UnknownAction(other.to_owned())),
        }
    }
}

impl Instruction {
    /// The literal instruction string.
    pub fn as_str(self) -> &'static str {
        match self {
            Instruction::SlowDown => "Slow_Down",
        }
    }

    /// Parses an instruction, returning `None` if it is not recognised.
    pub fn parse(content: &str) -> Option<Self> {
        content
            .starts_with(Instruction::SlowDown.as_str())
            .then_some(Instruction::SlowDown)
    }
}

impl Message {
    /// Creates a new message.
    pub fn new(
        action: Action,
        content: impl Into<String>,
        sender: VehicleId,
        recipient: Recipient,
    ) -> Self {
        Self {
            action,
            content: content.into(),
            sender,
            recipient,
        }
    }

    /// Creates a command carrying the given instruction.
    pub fn command(instruction: Instruction, sender: VehicleId, recipient: VehicleId) -> Self {
        Self::new(
            Action::Command,
            instruction.as_str(),
            sender,
            Recipient::Vehicle(recipient),
        )
    }

    /// Encodes the message as `<Action>/<Content>`.
    pub fn encode(&self) -> String {
        format!("{}/{}", self.action, self.content)
    }

    /// Wraps the encoded message in a packet ready for transmission.
    pub fn to_packet(&self) -> Packet {
        Packet {
            sender: self.sender,
            recipient: self.recipient,
            payload: self.encode(),
        }
    }

    /// Decodes a received packet.
    pub fn from_packet(packet: &Packet) -> Result<Self> {
        let (action, content) = packet
            .payload
            .split_once('/')
            .ok_or_else(|| Error::MalformedPayload(packet.payload.clone()))?;
        Ok(Self {
            action: action.parse()?,
            content: content.to_owned(),
            sender: packet.sender,
            recipient: packet.recipient,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::KeyData;

    fn ids() -> (VehicleId, VehicleId) {
        (
            VehicleId::from(KeyData::from_ffi(1)),
            VehicleId::from(KeyData::from_ffi(2)),
        )
    }

    #[test]
    fn encodes_action_then_content() {
        let (a, _) = ids();
        let msg = Message::new(Action::Get, "3/2", a, Recipient::Broadcast);
        assert_eq!(msg.encode(), "Get/3/2");
    }

    #[test]
    fn decoding_splits_on_first_separator() {
        let (a, _) = ids();
        let packet = Message::new(Action::Get, "3/2", a, Recipient::Broadcast).to_packet();
        let decoded = Message::from_packet(&packet).unwrap();
        assert_eq!(decoded.action, Action::Get);
        assert_eq!(decoded.content, "3/2");
        assert_eq!(decoded.sender, a);
    }

    #[test]
    fn command_targets_one_vehicle() {
        let (a, b) = ids();
        let msg = Message::command(Instruction::SlowDown, a, b);
        assert_eq!(msg.encode(), "Command/Slow_Down");
        assert_eq!(msg.recipient, Recipient::Vehicle(b));
        assert_eq!(Instruction::parse(&msg.content), Some(Instruction::SlowDown));
        assert_eq!(Instruction::parse("Speed_Up"), None);
    }

    #[test]
    fn rejects_bad_payloads() {
        let (a, _) = ids();
        let mut packet = Message::new(Action::Get, "1", a, Recipient::Broadcast).to_packet();
        packet.payload = "Hello".into();
        assert!(matches!(
            Message::from_packet(&packet),
            Err(Error::MalformedPayload(_))
        ));
        packet.payload = "Hello/1".into();
        assert!(matches!(
            Message::from_packet(&packet),
            Err(Error::UnknownAction(_))
        ));
    }
}

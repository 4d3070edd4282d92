//! Concrete message definitions
//!
//! Each message is a plain record. [`AnyMessage`] is the closed set the
//! standard registry can decode.

use serde::Serialize;
use uuid::Uuid;

use super::message::write_block_count;
use super::registry::{decode_as, DecodeFn};
use super::types::{Quaternion, Vector3};
use super::{CodecResult, Message, MessageType, Packet, Priority};

/// Liveness check; the peer answers with [`CompletePingCheck`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StartPingCheck {
    pub ping_id: u8,
    /// Oldest reliable sequence number the sender is still waiting on
    pub oldest_unacked: u32,
}

impl Message for StartPingCheck {
    const TYPE: MessageType = MessageType::high(1);

    fn write_fields(&self, packet: &mut Packet) -> CodecResult<()> {
        packet.write_u8(self.ping_id)?;
        packet.write_u32(self.oldest_unacked)
    }

    fn decode(packet: &mut Packet) -> CodecResult<Self> {
        Ok(Self {
            ping_id: packet.read_u8()?,
            oldest_unacked: packet.read_u32()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletePingCheck {
    pub ping_id: u8,
}

impl Message for CompletePingCheck {
    const TYPE: MessageType = MessageType::high(2);

    fn write_fields(&self, packet: &mut Packet) -> CodecResult<()> {
        packet.write_u8(self.ping_id)
    }

    fn decode(packet: &mut Packet) -> CodecResult<Self> {
        Ok(Self {
            ping_id: packet.read_u8()?,
        })
    }
}

/// Per-frame avatar state sent by a client
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentUpdate {
    pub agent_id: Uuid,
    pub session_id: Uuid,
    pub body_rotation: Quaternion,
    pub head_rotation: Quaternion,
    pub state: u8,
    pub camera_center: Vector3,
    pub camera_at_axis: Vector3,
    pub camera_left_axis: Vector3,
    pub camera_up_axis: Vector3,
    pub far: f32,
    pub control_flags: u32,
    pub flags: u8,
}

impl Message for AgentUpdate {
    const TYPE: MessageType = MessageType::high(4);
    const ZERO_CODED: bool = true;

    fn write_fields(&self, packet: &mut Packet) -> CodecResult<()> {
        packet.write_uuid(&self.agent_id)?;
        packet.write_uuid(&self.session_id)?;
        packet.write_quaternion(&self.body_rotation)?;
        packet.write_quaternion(&self.head_rotation)?;
        packet.write_u8(self.state)?;
        packet.write_vector3(&self.camera_center)?;
        packet.write_vector3(&self.camera_at_axis)?;
        packet.write_vector3(&self.camera_left_axis)?;
        packet.write_vector3(&self.camera_up_axis)?;
        packet.write_f32(self.far)?;
        packet.write_u32(self.control_flags)?;
        packet.write_u8(self.flags)
    }

    fn decode(packet: &mut Packet) -> CodecResult<Self> {
        Ok(Self {
            agent_id: packet.read_uuid()?,
            session_id: packet.read_uuid()?,
            body_rotation: packet.read_quaternion()?,
            head_rotation: packet.read_quaternion()?,
            state: packet.read_u8()?,
            camera_center: packet.read_vector3()?,
            camera_at_axis: packet.read_vector3()?,
            camera_left_axis: packet.read_vector3()?,
            camera_up_axis: packet.read_vector3()?,
            far: packet.read_f32()?,
            control_flags: packet.read_u32()?,
            flags: packet.read_u8()?,
        })
    }
}

/// Map position of one avatar, in coarse region units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CoarseLocation {
    pub x: u8,
    pub y: u8,
    pub z: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoarseLocationUpdate {
    pub locations: Vec<CoarseLocation>,
    /// Index of the receiving agent in `locations`, or -1
    pub you: i16,
    /// Index of the tracked agent in `locations`, or -1
    pub prey: i16,
}

impl Message for CoarseLocationUpdate {
    const TYPE: MessageType = MessageType::medium(6);

    fn write_fields(&self, packet: &mut Packet) -> CodecResult<()> {
        write_block_count(packet, self.locations.len())?;
        for loc in &self.locations {
            packet.write_u8(loc.x)?;
            packet.write_u8(loc.y)?;
            packet.write_u8(loc.z)?;
        }
        packet.write_i16(self.you)?;
        packet.write_i16(self.prey)
    }

    fn decode(packet: &mut Packet) -> CodecResult<Self> {
        let count = packet.read_u8()? as usize;
        let mut locations = Vec::with_capacity(count);
        for _ in 0..count {
            locations.push(CoarseLocation {
                x: packet.read_u8()?,
                y: packet.read_u8()?,
                z: packet.read_u8()?,
            });
        }
        Ok(Self {
            locations,
            you: packet.read_i16()?,
            prey: packet.read_i16()?,
        })
    }
}

/// First message on a new circuit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UseCircuitCode {
    pub code: u32,
    pub session_id: Uuid,
    pub id: Uuid,
}

impl Message for UseCircuitCode {
    const TYPE: MessageType = MessageType::low(3);

    fn write_fields(&self, packet: &mut Packet) -> CodecResult<()> {
        packet.write_u32(self.code)?;
        packet.write_uuid(&self.session_id)?;
        packet.write_uuid(&self.id)
    }

    fn decode(packet: &mut Packet) -> CodecResult<Self> {
        Ok(Self {
            code: packet.read_u32()?,
            session_id: packet.read_uuid()?,
            id: packet.read_uuid()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeleportLocationRequest {
    pub agent_id: Uuid,
    pub session_id: Uuid,
    pub region_handle: u64,
    pub position: Vector3,
    pub look_at: Vector3,
}

impl Message for TeleportLocationRequest {
    const TYPE: MessageType = MessageType::low(64);

    fn write_fields(&self, packet: &mut Packet) -> CodecResult<()> {
        packet.write_uuid(&self.agent_id)?;
        packet.write_uuid(&self.session_id)?;
        packet.write_u64(self.region_handle)?;
        packet.write_vector3(&self.position)?;
        packet.write_vector3(&self.look_at)
    }

    fn decode(packet: &mut Packet) -> CodecResult<Self> {
        Ok(Self {
            agent_id: packet.read_uuid()?,
            session_id: packet.read_uuid()?,
            region_handle: packet.read_u64()?,
            position: packet.read_vector3()?,
            look_at: packet.read_vector3()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatFromViewer {
    pub agent_id: Uuid,
    pub session_id: Uuid,
    pub message: String,
    pub chat_type: u8,
    pub channel: i32,
}

impl Message for ChatFromViewer {
    const TYPE: MessageType = MessageType::low(80);
    const ZERO_CODED: bool = true;

    fn write_fields(&self, packet: &mut Packet) -> CodecResult<()> {
        packet.write_uuid(&self.agent_id)?;
        packet.write_uuid(&self.session_id)?;
        packet.write_string16(&self.message)?;
        packet.write_u8(self.chat_type)?;
        packet.write_i32(self.channel)
    }

    fn decode(packet: &mut Packet) -> CodecResult<Self> {
        Ok(Self {
            agent_id: packet.read_uuid()?,
            session_id: packet.read_uuid()?,
            message: packet.read_string16()?,
            chat_type: packet.read_u8()?,
            channel: packet.read_i32()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SetAlwaysRun {
    pub agent_id: Uuid,
    pub session_id: Uuid,
    pub always_run: bool,
}

impl Message for SetAlwaysRun {
    const TYPE: MessageType = MessageType::low(88);

    fn write_fields(&self, packet: &mut Packet) -> CodecResult<()> {
        packet.write_uuid(&self.agent_id)?;
        packet.write_uuid(&self.session_id)?;
        packet.write_bool(self.always_run)
    }

    fn decode(packet: &mut Packet) -> CodecResult<Self> {
        Ok(Self {
            agent_id: packet.read_uuid()?,
            session_id: packet.read_uuid()?,
            always_run: packet.read_bool()?,
        })
    }
}

/// Standalone acknowledgment, used when there is no outbound traffic to
/// carry an ack trailer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PacketAck {
    pub packets: Vec<u32>,
}

impl Message for PacketAck {
    const TYPE: MessageType = MessageType::low(0xFFFB);

    fn write_fields(&self, packet: &mut Packet) -> CodecResult<()> {
        write_block_count(packet, self.packets.len())?;
        for &seq in &self.packets {
            packet.write_u32(seq)?;
        }
        Ok(())
    }

    fn decode(packet: &mut Packet) -> CodecResult<Self> {
        let count = packet.read_u8()? as usize;
        let mut packets = Vec::with_capacity(count);
        for _ in 0..count {
            packets.push(packet.read_u32()?);
        }
        Ok(Self { packets })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CloseCircuit;

impl Message for CloseCircuit {
    const TYPE: MessageType = MessageType::low(0xFFFD);

    fn write_fields(&self, _packet: &mut Packet) -> CodecResult<()> {
        Ok(())
    }

    fn decode(_packet: &mut Packet) -> CodecResult<Self> {
        Ok(Self)
    }
}

macro_rules! any_message {
    ($($name:ident),* $(,)?) => {
        /// Any message the standard registry knows
        #[derive(Debug, Clone, PartialEq, Serialize)]
        pub enum AnyMessage {
            $($name($name),)*
        }

        impl AnyMessage {
            pub fn message_type(&self) -> MessageType {
                match self {
                    $(AnyMessage::$name(_) => $name::TYPE,)*
                }
            }

            pub fn zero_coded(&self) -> bool {
                match self {
                    $(AnyMessage::$name(_) => $name::ZERO_CODED,)*
                }
            }

            pub fn name(&self) -> &'static str {
                match self {
                    $(AnyMessage::$name(_) => stringify!($name),)*
                }
            }

            /// Write the identifier and fields into `packet`.
            pub fn serialize(&self, packet: &mut Packet) -> CodecResult<()> {
                match self {
                    $(AnyMessage::$name(m) => Message::serialize(m, packet),)*
                }
            }

            pub fn priority(&self) -> Priority {
                self.message_type().priority()
            }
        }

        $(
            impl From<$name> for AnyMessage {
                fn from(message: $name) -> Self {
                    AnyMessage::$name(message)
                }
            }
        )*

        /// Identifier and decoder for every [`AnyMessage`] variant
        pub(crate) const STANDARD_DECODERS: &[(MessageType, DecodeFn)] = &[
            $(($name::TYPE, decode_as::<$name> as DecodeFn),)*
        ];
    };
}

any_message! {
    StartPingCheck,
    CompletePingCheck,
    AgentUpdate,
    CoarseLocationUpdate,
    UseCircuitCode,
    TeleportLocationRequest,
    ChatFromViewer,
    SetAlwaysRun,
    PacketAck,
    CloseCircuit,
}

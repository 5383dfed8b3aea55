//! MQTT control packets and their variable header / payload codecs.
//!
//! [`Packet`] holds one variant per [`PacketType`]. Decoding takes the flags
//! nibble from the fixed header plus the frame body; encoding produces the body
//! and leaves the fixed header to the [`PacketHandler`](crate::PacketHandler).

use crate::error::MqttError;
use crate::packet_id::PacketIdGenerator;
use crate::protocol::PacketType;
use bytes::{Buf, BufMut, Bytes, BytesMut};

mod ack;
mod connack;
mod connect;
mod publish;
mod subscribe;

pub use ack::{AckPacket, PubAck, PubComp, PubRec, PubRel, UnsubAck};
pub use connack::ConnAck;
pub use connect::{Connect, LastWill};
pub use publish::Publish;
pub use subscribe::{SubAck, Subscribe, Unsubscribe};

/// Fixed header flags for PUBREL, SUBSCRIBE and UNSUBSCRIBE.
pub const FIXED_FLAGS: u8 = 0b0010;

/// MQTT control packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Connect(Connect),
    ConnAck(ConnAck),
    Publish(Publish),
    PubAck(PubAck),
    PubRec(PubRec),
    PubRel(PubRel),
    PubComp(PubComp),
    Subscribe(Subscribe),
    SubAck(SubAck),
    Unsubscribe(Unsubscribe),
    UnsubAck(UnsubAck),
    PingReq,
    PingResp,
    Disconnect,
}

impl Packet {
    pub fn packet_type(&self) -> PacketType {
        match self {
            Packet::Connect(_) => PacketType::Connect,
            Packet::ConnAck(_) => PacketType::ConnAck,
            Packet::Publish(_) => PacketType::Publish,
            Packet::PubAck(_) => PacketType::PubAck,
            Packet::PubRec(_) => PacketType::PubRec,
            Packet::PubRel(_) => PacketType::PubRel,
            Packet::PubComp(_) => PacketType::PubComp,
            Packet::Subscribe(_) => PacketType::Subscribe,
            Packet::SubAck(_) => PacketType::SubAck,
            Packet::Unsubscribe(_) => PacketType::Unsubscribe,
            Packet::UnsubAck(_) => PacketType::UnsubAck,
            Packet::PingReq => PacketType::PingReq,
            Packet::PingResp => PacketType::PingResp,
            Packet::Disconnect => PacketType::Disconnect,
        }
    }

    /// The low nibble of the fixed header for this packet.
    pub fn flags(&self) -> u8 {
        match self {
            Packet::Publish(publish) => publish.flags(),
            Packet::PubRel(_) | Packet::Subscribe(_) | Packet::Unsubscribe(_) => FIXED_FLAGS,
            _ => 0,
        }
    }

    /// The packet identifier, if this packet carries one and it has been assigned.
    pub fn packet_id(&self) -> Option<u16> {
        match self {
            Packet::Publish(publish) => publish.packet_id,
            Packet::PubAck(ack) => Some(ack.packet_id()),
            Packet::PubRec(ack) => Some(ack.packet_id()),
            Packet::PubRel(ack) => Some(ack.packet_id()),
            Packet::PubComp(ack) => Some(ack.packet_id()),
            Packet::Subscribe(subscribe) => subscribe.packet_id,
            Packet::SubAck(suback) => Some(suback.packet_id),
            Packet::Unsubscribe(unsubscribe) => unsubscribe.packet_id,
            Packet::UnsubAck(ack) => Some(ack.packet_id()),
            _ => None,
        }
    }

    /// Drops an id that was filled in at encode time, on packets that allocate one.
    pub(crate) fn clear_packet_id(&mut self) {
        match self {
            Packet::Publish(publish) => publish.packet_id = None,
            Packet::Subscribe(subscribe) => subscribe.packet_id = None,
            Packet::Unsubscribe(unsubscribe) => unsubscribe.packet_id = None,
            _ => {}
        }
    }

    /// Decodes a frame body into the packet variant for `packet_type`.
    ///
    /// The variable header is read first, then the payload. Bytes left over once
    /// the variant has read everything it owns make the packet malformed.
    pub fn decode(packet_type: PacketType, flags: u8, mut body: Bytes) -> Result<Packet, MqttError> {
        let packet = match packet_type {
            PacketType::Connect => Packet::Connect(Connect::read(&mut body)?),
            PacketType::ConnAck => Packet::ConnAck(ConnAck::read(&mut body)?),
            PacketType::Publish => Packet::Publish(Publish::read(flags, &mut body)?),
            PacketType::PubAck => Packet::PubAck(PubAck::read(&mut body)?),
            PacketType::PubRec => Packet::PubRec(PubRec::read(&mut body)?),
            PacketType::PubRel => Packet::PubRel(PubRel::read(&mut body)?),
            PacketType::PubComp => Packet::PubComp(PubComp::read(&mut body)?),
            PacketType::Subscribe => Packet::Subscribe(Subscribe::read(&mut body)?),
            PacketType::SubAck => Packet::SubAck(SubAck::read(&mut body)?),
            PacketType::Unsubscribe => Packet::Unsubscribe(Unsubscribe::read(&mut body)?),
            PacketType::UnsubAck => Packet::UnsubAck(UnsubAck::read(&mut body)?),
            PacketType::PingReq => Packet::PingReq,
            PacketType::PingResp => Packet::PingResp,
            PacketType::Disconnect => Packet::Disconnect,
        };

        if body.has_remaining() {
            return Err(MqttError::MalformedField(format!(
                "{} trailing bytes in {:?} packet",
                body.remaining(),
                packet_type
            )));
        }
        Ok(packet)
    }

    /// Encodes the variable header followed by the payload.
    ///
    /// Packets that need an identifier and have none get the next id from `ids`,
    /// stored back into the packet.
    pub fn encode(&mut self, ids: &PacketIdGenerator) -> Result<Bytes, MqttError> {
        let mut buf = BytesMut::new();
        match self {
            Packet::Connect(connect) => connect.write(&mut buf)?,
            Packet::ConnAck(connack) => connack.write(&mut buf),
            Packet::Publish(publish) => publish.write(ids, &mut buf)?,
            Packet::PubAck(ack) => ack.write(&mut buf)?,
            Packet::PubRec(ack) => ack.write(&mut buf)?,
            Packet::PubRel(ack) => ack.write(&mut buf)?,
            Packet::PubComp(ack) => ack.write(&mut buf)?,
            Packet::Subscribe(subscribe) => subscribe.write(ids, &mut buf)?,
            Packet::SubAck(suback) => suback.write(&mut buf)?,
            Packet::Unsubscribe(unsubscribe) => unsubscribe.write(ids, &mut buf)?,
            Packet::UnsubAck(ack) => ack.write(&mut buf)?,
            Packet::PingReq | Packet::PingResp | Packet::Disconnect => {}
        }
        Ok(buf.freeze())
    }
}

macro_rules! impl_from_packet {
    ($($variant:ident),*) => {
        $(
            impl From<$variant> for Packet {
                fn from(packet: $variant) -> Self {
                    Packet::$variant(packet)
                }
            }
        )*
    };
}

impl_from_packet!(
    Connect, ConnAck, Publish, PubAck, PubRec, PubRel, PubComp, Subscribe, SubAck, Unsubscribe,
    UnsubAck
);

pub(crate) fn read_u8(body: &mut Bytes, field: &str) -> Result<u8, MqttError> {
    if body.remaining() < 1 {
        return Err(MqttError::MalformedField(format!("missing {}", field)));
    }
    Ok(body.get_u8())
}

pub(crate) fn read_u16(body: &mut Bytes, field: &str) -> Result<u16, MqttError> {
    if body.remaining() < 2 {
        return Err(MqttError::MalformedField(format!("missing {}", field)));
    }
    Ok(body.get_u16())
}

/// Reads a packet identifier, which must be non-zero.
pub(crate) fn read_packet_id(body: &mut Bytes) -> Result<u16, MqttError> {
    match read_u16(body, "packet id")? {
        0 => Err(MqttError::MalformedField("packet id 0".to_string())),
        id => Ok(id),
    }
}

/// Writes a packet identifier, refusing 0 before anything is written.
pub(crate) fn write_packet_id(buf: &mut BytesMut, packet_id: u16) -> Result<(), MqttError> {
    if packet_id == 0 {
        return Err(MqttError::MalformedField("packet id 0".to_string()));
    }
    buf.put_u16(packet_id);
    Ok(())
}

/// Reads a u16 length-prefixed byte field.
pub(crate) fn read_binary(body: &mut Bytes, field: &str) -> Result<Bytes, MqttError> {
    let len = read_u16(body, field)? as usize;
    if body.remaining() < len {
        return Err(MqttError::MalformedField(format!(
            "{} length {} exceeds remaining {} bytes",
            field,
            len,
            body.remaining()
        )));
    }
    Ok(body.split_to(len))
}

/// Reads a u16 length-prefixed UTF-8 string.
pub(crate) fn read_string(body: &mut Bytes, field: &str) -> Result<String, MqttError> {
    let data = read_binary(body, field)?;
    String::from_utf8(data.to_vec())
        .map_err(|_| MqttError::MalformedField(format!("{} is not valid UTF-8", field)))
}

pub(crate) fn write_binary(buf: &mut BytesMut, data: &[u8], field: &str) -> Result<(), MqttError> {
    let len = u16::try_from(data.len()).map_err(|_| {
        MqttError::MalformedField(format!("{} is {} bytes, longer than 65535", field, data.len()))
    })?;
    buf.put_u16(len);
    buf.put_slice(data);
    Ok(())
}

pub(crate) fn write_string(buf: &mut BytesMut, s: &str, field: &str) -> Result<(), MqttError> {
    write_binary(buf, s.as_bytes(), field)
}

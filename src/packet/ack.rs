use super::{read_packet_id, write_packet_id};
use crate::error::MqttError;
use bytes::{Bytes, BytesMut};

/// Packets whose whole body is a packet identifier.
///
/// Implementors supply construction and the id accessor; the body codec is shared.
pub trait AckPacket: Sized {
    fn new(packet_id: u16) -> Self;

    fn packet_id(&self) -> u16;

    fn read(body: &mut Bytes) -> Result<Self, MqttError> {
        Ok(Self::new(read_packet_id(body)?))
    }

    fn write(&self, buf: &mut BytesMut) -> Result<(), MqttError> {
        write_packet_id(buf, self.packet_id())
    }
}

macro_rules! ack_packet {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name {
            pub packet_id: u16,
        }

        impl AckPacket for $name {
            fn new(packet_id: u16) -> Self {
                $name { packet_id }
            }

            fn packet_id(&self) -> u16 {
                self.packet_id
            }
        }
    };
}

ack_packet!(
    /// Acknowledges a QoS 1 PUBLISH.
    PubAck
);
ack_packet!(
    /// First reply to a QoS 2 PUBLISH.
    PubRec
);
ack_packet!(
    /// Releases a QoS 2 PUBLISH. Always sent with fixed header flags `0b0010`.
    PubRel
);
ack_packet!(
    /// Final step of the QoS 2 exchange.
    PubComp
);
ack_packet!(
    /// Acknowledges an UNSUBSCRIBE.
    UnsubAck
);

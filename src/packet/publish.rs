use super::{read_packet_id, read_string, write_packet_id, write_string};
use crate::error::MqttError;
use crate::packet_id::PacketIdGenerator;
use crate::protocol::QoS;
use bytes::{BufMut, Bytes, BytesMut};

/// Application message. The fixed header flags carry dup, qos and retain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publish {
    pub dup: bool,
    pub qos: QoS,
    pub retain: bool,
    /// Present on the wire only when qos > 0.
    pub packet_id: Option<u16>,
    pub topic: String,
    pub payload: Bytes,
}

impl Publish {
    pub fn new(topic: impl Into<String>, qos: QoS, payload: impl Into<Bytes>) -> Self {
        Publish {
            dup: false,
            qos,
            retain: false,
            packet_id: None,
            topic: topic.into(),
            payload: payload.into(),
        }
    }

    pub fn with_dup(mut self, dup: bool) -> Self {
        self.dup = dup;
        self
    }

    pub fn with_retain(mut self, retain: bool) -> Self {
        self.retain = retain;
        self
    }

    pub fn with_packet_id(mut self, packet_id: u16) -> Self {
        self.packet_id = Some(packet_id);
        self
    }

    /// bit 3 = dup, bits 2-1 = qos, bit 0 = retain
    pub fn flags(&self) -> u8 {
        let mut flags = (self.qos as u8) << 1;
        if self.dup {
            flags |= 0b1000;
        }
        if self.retain {
            flags |= 0b0001;
        }
        flags
    }

    pub(crate) fn read(flags: u8, body: &mut Bytes) -> Result<Self, MqttError> {
        let dup = flags & 0b1000 != 0;
        let qos = QoS::try_from((flags & 0b0110) >> 1)?;
        let retain = flags & 0b0001 != 0;

        let topic = read_string(body, "topic")?;
        let packet_id = if qos > QoS::AtMostOnce {
            Some(read_packet_id(body)?)
        } else {
            None
        };

        // The message is everything left in the frame, possibly nothing.
        let payload = body.split_to(body.len());

        Ok(Publish {
            dup,
            qos,
            retain,
            packet_id,
            topic,
            payload,
        })
    }

    pub(crate) fn write(&mut self, ids: &PacketIdGenerator, buf: &mut BytesMut) -> Result<(), MqttError> {
        write_string(buf, &self.topic, "topic")?;
        if self.qos > QoS::AtMostOnce {
            let packet_id = *self.packet_id.get_or_insert_with(|| ids.next_id());
            write_packet_id(buf, packet_id)?;
        }
        buf.put_slice(&self.payload);
        Ok(())
    }
}

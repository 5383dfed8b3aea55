use super::{read_packet_id, read_string, read_u8, write_packet_id, write_string};
use crate::error::MqttError;
use crate::packet_id::PacketIdGenerator;
use crate::protocol::QoS;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Subscription request. Topic order is preserved on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscribe {
    pub packet_id: Option<u16>,
    pub topics: Vec<(String, QoS)>,
}

impl Subscribe {
    pub fn new(topics: Vec<(String, QoS)>) -> Self {
        Subscribe {
            packet_id: None,
            topics,
        }
    }

    pub fn with_packet_id(mut self, packet_id: u16) -> Self {
        self.packet_id = Some(packet_id);
        self
    }

    pub(crate) fn read(body: &mut Bytes) -> Result<Self, MqttError> {
        let packet_id = read_packet_id(body)?;

        let mut topics = Vec::new();
        while body.has_remaining() {
            let topic = read_string(body, "topic filter")?;
            let qos = QoS::try_from(read_u8(body, "requested QoS")?)?;
            topics.push((topic, qos));
        }
        if topics.is_empty() {
            return Err(MqttError::MalformedField("SUBSCRIBE without topics".to_string()));
        }

        Ok(Subscribe {
            packet_id: Some(packet_id),
            topics,
        })
    }

    pub(crate) fn write(&mut self, ids: &PacketIdGenerator, buf: &mut BytesMut) -> Result<(), MqttError> {
        if self.topics.is_empty() {
            return Err(MqttError::MalformedField("SUBSCRIBE without topics".to_string()));
        }
        let mut payload = BytesMut::new();
        for (topic, qos) in &self.topics {
            write_string(&mut payload, topic, "topic filter")?;
            payload.put_u8(*qos as u8);
        }

        let packet_id = *self.packet_id.get_or_insert_with(|| ids.next_id());
        write_packet_id(buf, packet_id)?;
        buf.put_slice(&payload);
        Ok(())
    }
}

/// Reply to SUBSCRIBE: one granted QoS (or 0x80 failure) per requested topic, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubAck {
    pub packet_id: u16,
    pub granted_qos: Vec<u8>,
}

impl SubAck {
    pub const FAILURE: u8 = 0x80;

    pub fn new(packet_id: u16, granted_qos: Vec<u8>) -> Self {
        SubAck {
            packet_id,
            granted_qos,
        }
    }

    pub(crate) fn read(body: &mut Bytes) -> Result<Self, MqttError> {
        let packet_id = read_packet_id(body)?;
        let granted_qos = body.split_to(body.len()).to_vec();
        Ok(SubAck {
            packet_id,
            granted_qos,
        })
    }

    pub(crate) fn write(&self, buf: &mut BytesMut) -> Result<(), MqttError> {
        write_packet_id(buf, self.packet_id)?;
        buf.put_slice(&self.granted_qos);
        Ok(())
    }
}

/// Unsubscribe request. Topic order is preserved on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unsubscribe {
    pub packet_id: Option<u16>,
    pub topics: Vec<String>,
}

impl Unsubscribe {
    pub fn new(topics: Vec<String>) -> Self {
        Unsubscribe {
            packet_id: None,
            topics,
        }
    }

    pub fn with_packet_id(mut self, packet_id: u16) -> Self {
        self.packet_id = Some(packet_id);
        self
    }

    pub(crate) fn read(body: &mut Bytes) -> Result<Self, MqttError> {
        let packet_id = read_packet_id(body)?;

        let mut topics = Vec::new();
        while body.has_remaining() {
            topics.push(read_string(body, "topic filter")?);
        }
        if topics.is_empty() {
            return Err(MqttError::MalformedField("UNSUBSCRIBE without topics".to_string()));
        }

        Ok(Unsubscribe {
            packet_id: Some(packet_id),
            topics,
        })
    }

    pub(crate) fn write(&mut self, ids: &PacketIdGenerator, buf: &mut BytesMut) -> Result<(), MqttError> {
        if self.topics.is_empty() {
            return Err(MqttError::MalformedField("UNSUBSCRIBE without topics".to_string()));
        }
        let mut payload = BytesMut::new();
        for topic in &self.topics {
            write_string(&mut payload, topic, "topic filter")?;
        }

        let packet_id = *self.packet_id.get_or_insert_with(|| ids.next_id());
        write_packet_id(buf, packet_id)?;
        buf.put_slice(&payload);
        Ok(())
    }
}

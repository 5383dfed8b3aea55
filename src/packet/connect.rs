use super::{read_binary, read_string, read_u16, read_u8, write_binary, write_string};
use crate::error::MqttError;
use crate::protocol::{ProtocolVersion, QoS};
use bytes::{BufMut, Bytes, BytesMut};

const USERNAME_FLAG: u8 = 0x80;
const PASSWORD_FLAG: u8 = 0x40;
const WILL_RETAIN_FLAG: u8 = 0x20;
const WILL_QOS_MASK: u8 = 0x18;
const WILL_FLAG: u8 = 0x04;
const CLEAN_SESSION_FLAG: u8 = 0x02;
const RESERVED_FLAG: u8 = 0x01;

/// Message the server publishes on the client's behalf if it disconnects uncleanly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastWill {
    pub topic: String,
    pub message: Bytes,
    pub qos: QoS,
    pub retain: bool,
}

impl LastWill {
    pub fn new(topic: impl Into<String>, message: impl Into<Bytes>, qos: QoS, retain: bool) -> Self {
        LastWill {
            topic: topic.into(),
            message: message.into(),
            qos,
            retain,
        }
    }
}

/// Connection request, the first packet a client sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connect {
    pub protocol: ProtocolVersion,
    pub client_id: String,
    pub clean_session: bool,
    /// Seconds; 0 disables keep-alive.
    pub keep_alive: u16,
    pub will: Option<LastWill>,
    pub username: Option<String>,
    pub password: Option<Bytes>,
}

impl Connect {
    pub fn new(client_id: impl Into<String>) -> Self {
        Connect {
            protocol: ProtocolVersion::V3_1_1,
            client_id: client_id.into(),
            clean_session: true,
            keep_alive: 60,
            will: None,
            username: None,
            password: None,
        }
    }

    pub fn with_protocol(mut self, protocol: ProtocolVersion) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn with_clean_session(mut self, clean_session: bool) -> Self {
        self.clean_session = clean_session;
        self
    }

    pub fn with_keep_alive(mut self, keep_alive: u16) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn with_will(mut self, will: LastWill) -> Self {
        self.will = Some(will);
        self
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<Bytes>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    fn connect_flags(&self) -> u8 {
        let mut flags = 0;
        if self.clean_session {
            flags |= CLEAN_SESSION_FLAG;
        }
        if let Some(will) = &self.will {
            flags |= WILL_FLAG | ((will.qos as u8) << 3);
            if will.retain {
                flags |= WILL_RETAIN_FLAG;
            }
        }
        if self.username.is_some() {
            flags |= USERNAME_FLAG;
        }
        if self.password.is_some() {
            flags |= PASSWORD_FLAG;
        }
        flags
    }

    pub(crate) fn read(body: &mut Bytes) -> Result<Self, MqttError> {
        let protocol_name = read_string(body, "protocol name")?;
        let level = read_u8(body, "protocol level")?;
        let protocol = ProtocolVersion::from_name_and_level(&protocol_name, level).ok_or_else(|| {
            MqttError::MalformedField(format!(
                "unsupported protocol '{}' level {}",
                protocol_name, level
            ))
        })?;

        let connect_flags = read_u8(body, "connect flags")?;
        if connect_flags & RESERVED_FLAG != 0 {
            return Err(MqttError::MalformedField("reserved connect flag set".to_string()));
        }
        let clean_session = connect_flags & CLEAN_SESSION_FLAG != 0;
        let will_flag = connect_flags & WILL_FLAG != 0;
        let will_qos = QoS::try_from((connect_flags & WILL_QOS_MASK) >> 3)?;
        let will_retain = connect_flags & WILL_RETAIN_FLAG != 0;
        let username_flag = connect_flags & USERNAME_FLAG != 0;
        let password_flag = connect_flags & PASSWORD_FLAG != 0;

        if !will_flag && (will_qos != QoS::AtMostOnce || will_retain) {
            return Err(MqttError::MalformedField(
                "will QoS or retain set without will flag".to_string(),
            ));
        }
        if password_flag && !username_flag {
            return Err(MqttError::MalformedField("password without username".to_string()));
        }

        let keep_alive = read_u16(body, "keep alive")?;

        let client_id = read_string(body, "client id")?;
        let will = if will_flag {
            let topic = read_string(body, "will topic")?;
            let message = read_binary(body, "will message")?;
            Some(LastWill {
                topic,
                message,
                qos: will_qos,
                retain: will_retain,
            })
        } else {
            None
        };
        let username = if username_flag {
            Some(read_string(body, "username")?)
        } else {
            None
        };
        let password = if password_flag {
            Some(read_binary(body, "password")?)
        } else {
            None
        };

        Ok(Connect {
            protocol,
            client_id,
            clean_session,
            keep_alive,
            will,
            username,
            password,
        })
    }

    pub(crate) fn write(&self, buf: &mut BytesMut) -> Result<(), MqttError> {
        if self.password.is_some() && self.username.is_none() {
            return Err(MqttError::MalformedField("password without username".to_string()));
        }

        write_string(buf, self.protocol.protocol_name(), "protocol name")?;
        buf.put_u8(self.protocol.level());
        buf.put_u8(self.connect_flags());
        buf.put_u16(self.keep_alive);

        write_string(buf, &self.client_id, "client id")?;
        if let Some(will) = &self.will {
            write_string(buf, &will.topic, "will topic")?;
            write_binary(buf, &will.message, "will message")?;
        }
        if let Some(username) = &self.username {
            write_string(buf, username, "username")?;
        }
        if let Some(password) = &self.password {
            write_binary(buf, password, "password")?;
        }
        Ok(())
    }
}

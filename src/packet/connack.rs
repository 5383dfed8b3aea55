use super::read_u8;
use crate::error::MqttError;
use bytes::{BufMut, Bytes, BytesMut};

/// Reply to CONNECT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnAck {
    pub session_present: bool,
    pub return_code: u8,
}

impl ConnAck {
    pub const ACCEPTED: u8 = 0;
    pub const UNACCEPTABLE_PROTOCOL_VERSION: u8 = 1;
    pub const IDENTIFIER_REJECTED: u8 = 2;
    pub const SERVER_UNAVAILABLE: u8 = 3;
    pub const BAD_USERNAME_OR_PASSWORD: u8 = 4;
    pub const NOT_AUTHORIZED: u8 = 5;

    pub fn new(session_present: bool, return_code: u8) -> Self {
        ConnAck {
            session_present,
            return_code,
        }
    }

    pub fn accepted(&self) -> bool {
        self.return_code == Self::ACCEPTED
    }

    /// Human-readable reason for a refused connection. `None` when accepted or the code is unknown.
    pub fn error_message(&self) -> Option<&'static str> {
        match self.return_code {
            Self::UNACCEPTABLE_PROTOCOL_VERSION => Some("unacceptable protocol version"),
            Self::IDENTIFIER_REJECTED => Some("identifier rejected"),
            Self::SERVER_UNAVAILABLE => Some("server unavailable"),
            Self::BAD_USERNAME_OR_PASSWORD => Some("bad username or password"),
            Self::NOT_AUTHORIZED => Some("not authorized"),
            _ => None,
        }
    }

    pub(crate) fn read(body: &mut Bytes) -> Result<Self, MqttError> {
        let session_present = read_u8(body, "connect acknowledge flags")? & 0x01 == 1;
        let return_code = read_u8(body, "connect return code")?;
        Ok(ConnAck {
            session_present,
            return_code,
        })
    }

    pub(crate) fn write(&self, buf: &mut BytesMut) {
        buf.put_u8(self.session_present as u8);
        buf.put_u8(self.return_code);
    }
}

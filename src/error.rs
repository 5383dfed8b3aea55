use thiserror::Error;

#[derive(Error, Debug)]
pub enum MqttError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("Malformed remaining length")]
    Framing,
    #[error("Unknown packet type: {0}")]
    UnknownPacketType(u8),
    #[error("Short read: expected {expected} bytes, received {received}")]
    ShortRead { expected: usize, received: usize },
    #[error("Malformed field: {0}")]
    MalformedField(String),
    #[error("Packet too large: {size} bytes exceeds maximum of {max}")]
    PacketTooLarge { size: usize, max: usize },
    #[error("Connection closed")]
    Closed,
}

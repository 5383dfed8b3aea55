//! MQTT 3.1.1 wire codec.
//!
//! Turns a byte stream into typed [`Packet`] values and back. Every frame is a
//! type/flags byte, a variable-length remaining length, then exactly that many
//! body bytes. [`PacketHandler`] owns a stream (TCP, anything implementing
//! tokio's `AsyncRead + AsyncWrite`, or a WebSocket) and exposes `receive` and
//! `send`, writing each frame as one uninterrupted unit.
//!
//! ```no_run
//! use rustie_mqtt_codec::{Connect, MqttError, Packet, PacketHandler};
//! use tokio::net::TcpStream;
//!
//! # async fn run() -> Result<(), MqttError> {
//! let stream = TcpStream::connect("127.0.0.1:1883").await?;
//! let mut handler = PacketHandler::new(stream);
//! handler.send(&mut Packet::Connect(Connect::new("sensor-1"))).await?;
//! if let Packet::ConnAck(connack) = handler.receive().await? {
//!     println!("accepted: {}", connack.accepted());
//! }
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod handler;
mod packet;
mod packet_id;
mod protocol;
mod stream;
pub mod varint;

pub use config::HandlerConfig;
pub use error::MqttError;
pub use handler::{PacketHandler, PacketReader, PacketWriter};
pub use packet::{
    AckPacket, ConnAck, Connect, LastWill, Packet, PubAck, PubComp, PubRec, PubRel, Publish,
    SubAck, Subscribe, UnsubAck, Unsubscribe,
};
pub use packet_id::PacketIdGenerator;
pub use protocol::{PacketType, ProtocolVersion, QoS};
pub use stream::{split_websocket, ReadStream, WriteStream, WsReader, WsWriter};

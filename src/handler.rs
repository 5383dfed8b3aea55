use crate::config::HandlerConfig;
use crate::error::MqttError;
use crate::packet::Packet;
use crate::packet_id::PacketIdGenerator;
use crate::protocol::PacketType;
use crate::stream::{split_websocket, ReadStream, WriteStream, WsReader, WsWriter};
use crate::varint;
use bytes::{BufMut, Bytes, BytesMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::sync::Mutex;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, error, trace, warn};

struct Shared<W> {
    stream: Mutex<W>,
    closed: AtomicBool,
    packet_ids: Arc<PacketIdGenerator>,
    max_packet_size: usize,
}

/// Reads and writes MQTT packets over one duplex byte stream.
///
/// Any failure while receiving, and any transport failure while sending, closes
/// the stream: there is no way to resynchronise on a byte stream after a bad
/// frame. Every later call fails with [`MqttError::Closed`].
///
/// `receive` needs `&mut self` and must only be driven by one task. Writers can
/// be cloned out with [`PacketHandler::writer`] or [`PacketHandler::into_split`].
pub struct PacketHandler<R, W> {
    reader: PacketReader<R, W>,
}

/// Receiving half of a [`PacketHandler`].
pub struct PacketReader<R, W> {
    stream: R,
    writer: PacketWriter<W>,
}

/// Sending half of a [`PacketHandler`]. Clones share the stream and the lock
/// that keeps frames from interleaving.
pub struct PacketWriter<W> {
    shared: Arc<Shared<W>>,
}

impl<W> Clone for PacketWriter<W> {
    fn clone(&self) -> Self {
        PacketWriter {
            shared: self.shared.clone(),
        }
    }
}

impl<S> PacketHandler<ReadHalf<S>, WriteHalf<S>>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wraps a TCP stream (or any other tokio duplex stream) with default settings.
    pub fn new(stream: S) -> Self {
        PacketHandler::with_config(stream, HandlerConfig::default())
    }

    pub fn with_config(stream: S, config: HandlerConfig) -> Self {
        let (read_half, write_half) = tokio::io::split(stream);
        PacketHandler::from_parts(read_half, write_half, config)
    }
}

impl<S> PacketHandler<WsReader<S>, WsWriter<S>>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wraps an established WebSocket connection carrying MQTT in binary messages.
    pub fn websocket(ws_stream: WebSocketStream<S>, config: HandlerConfig) -> Self {
        let (reader, writer) = split_websocket(ws_stream);
        PacketHandler::from_parts(reader, writer, config)
    }
}

impl<R: ReadStream, W: WriteStream> PacketHandler<R, W> {
    /// Builds a handler from an already split stream.
    ///
    /// # Arguments
    /// * `reader` - The half packets are received from.
    /// * `writer` - The half packets are sent on. It is shared by every [`PacketWriter`] clone.
    /// * `config` - Size limit and, optionally, a packet id generator to share.
    ///
    /// # Returns
    /// An open handler.
    pub fn from_parts(reader: R, writer: W, config: HandlerConfig) -> Self {
        let packet_ids = config
            .packet_ids
            .unwrap_or_else(|| Arc::new(PacketIdGenerator::new()));
        let writer = PacketWriter {
            shared: Arc::new(Shared {
                stream: Mutex::new(writer),
                closed: AtomicBool::new(false),
                packet_ids,
                max_packet_size: config.max_packet_size,
            }),
        };
        PacketHandler {
            reader: PacketReader {
                stream: reader,
                writer,
            },
        }
    }

    /// Reads the next packet. See [`PacketReader::receive`].
    ///
    /// # Returns
    /// The decoded packet, or an error after which the stream is closed.
    pub async fn receive(&mut self) -> Result<Packet, MqttError> {
        self.reader.receive().await
    }

    /// Writes one packet. See [`PacketWriter::send`].
    ///
    /// # Arguments
    /// * `packet` - The packet to send. A missing packet id is filled in.
    ///
    /// # Returns
    /// `Ok(())` once the whole frame is written, or the encode or transport error.
    pub async fn send(&self, packet: &mut Packet) -> Result<(), MqttError> {
        self.reader.writer.send(packet).await
    }

    pub async fn close(&self) -> Result<(), MqttError> {
        self.reader.writer.close().await
    }

    pub fn is_closed(&self) -> bool {
        self.reader.writer.is_closed()
    }

    pub fn packet_ids(&self) -> &Arc<PacketIdGenerator> {
        self.reader.writer.packet_ids()
    }

    pub fn writer(&self) -> PacketWriter<W> {
        self.reader.writer.clone()
    }

    pub fn into_split(self) -> (PacketReader<R, W>, PacketWriter<W>) {
        let writer = self.reader.writer.clone();
        (self.reader, writer)
    }
}

impl<R: ReadStream, W: WriteStream> PacketReader<R, W> {
    /// Reads one frame and decodes it.
    ///
    /// The first byte carries the packet type (high nibble) and flags (low
    /// nibble), followed by the remaining length and exactly that many body
    /// bytes. On failure the error is logged and the stream is closed.
    ///
    /// # Returns
    /// The decoded packet, `Closed` if the stream was already closed, or the
    /// framing, decode or transport error that closed it.
    pub async fn receive(&mut self) -> Result<Packet, MqttError> {
        if self.writer.is_closed() {
            return Err(MqttError::Closed);
        }
        match self.read_packet().await {
            Ok(packet) => Ok(packet),
            Err(e) => {
                error!("Exception while receiving: {}", e);
                if let Err(close_err) = self.writer.close().await {
                    warn!("Failed to close stream after receive error: {}", close_err);
                }
                Err(e)
            }
        }
    }

    async fn read_packet(&mut self) -> Result<Packet, MqttError> {
        let first_byte = self.stream.read_byte().await?;
        let packet_type = PacketType::try_from(first_byte >> 4)?;
        let flags = first_byte & 0x0F;

        let remaining_length = varint::read(&mut self.stream).await?;
        let max = self.writer.shared.max_packet_size;
        if remaining_length > max {
            return Err(MqttError::PacketTooLarge {
                size: remaining_length,
                max,
            });
        }
        let body = self.stream.read_bytes(remaining_length).await?;

        debug!("IN - {:?} - flags {:#06b} - {} bytes", packet_type, flags, remaining_length);
        trace!("IN - {:?} - {:?}", packet_type, body);

        Packet::decode(packet_type, flags, body)
    }

    pub fn writer(&self) -> PacketWriter<W> {
        self.writer.clone()
    }
}

impl<W: WriteStream> PacketWriter<W> {
    /// Encodes and writes one packet as a single uninterrupted frame.
    ///
    /// A packet needing an id that has none is given the next one from this
    /// handler's generator. Encode errors are returned without touching the
    /// stream; write errors close it.
    ///
    /// If the send fails, an id filled in by this call is taken off the packet
    /// again so a retry allocates afresh. The generator itself does not rewind,
    /// so that id is skipped.
    ///
    /// # Arguments
    /// * `packet` - The packet to send.
    ///
    /// # Returns
    /// `Ok(())` once the whole frame is written. Otherwise `Closed`,
    /// `PacketTooLarge`, an encode error, or the transport error.
    pub async fn send(&self, packet: &mut Packet) -> Result<(), MqttError> {
        let had_id = packet.packet_id().is_some();
        let result = self.write_packet(packet).await;
        if result.is_err() && !had_id {
            packet.clear_packet_id();
        }
        result
    }

    async fn write_packet(&self, packet: &mut Packet) -> Result<(), MqttError> {
        if self.is_closed() {
            return Err(MqttError::Closed);
        }
        let frame = self.encode_frame(packet)?;

        let mut stream = self.shared.stream.lock().await;
        if self.is_closed() {
            return Err(MqttError::Closed);
        }

        debug!(
            "OUT - {:?} - {:?} - {} bytes",
            packet.packet_type(),
            packet.packet_id(),
            frame.len()
        );
        trace!("OUT - {:?} - {:?}", packet.packet_type(), frame);

        if let Err(e) = write_frame(&mut *stream, &frame).await {
            error!("Exception while sending: {}", e);
            self.shared.closed.store(true, Ordering::SeqCst);
            if let Err(close_err) = stream.close().await {
                warn!("Failed to close stream after send error: {}", close_err);
            }
            return Err(e);
        }
        Ok(())
    }

    /// Closes the underlying stream. Closing twice is a no-op.
    pub async fn close(&self) -> Result<(), MqttError> {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let mut stream = self.shared.stream.lock().await;
        stream.close().await
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    pub fn packet_ids(&self) -> &Arc<PacketIdGenerator> {
        &self.shared.packet_ids
    }

    fn encode_frame(&self, packet: &mut Packet) -> Result<Bytes, MqttError> {
        let body = packet.encode(&self.shared.packet_ids)?;
        let max = self.shared.max_packet_size;
        if body.len() > max {
            return Err(MqttError::PacketTooLarge {
                size: body.len(),
                max,
            });
        }

        let mut frame = BytesMut::with_capacity(1 + varint::encoded_len(body.len()) + body.len());
        frame.put_u8((packet.packet_type().code() << 4) | packet.flags());
        varint::encode(body.len(), &mut frame)?;
        frame.put_slice(&body);
        Ok(frame.freeze())
    }
}

async fn write_frame<W: WriteStream + ?Sized>(stream: &mut W, frame: &[u8]) -> Result<(), MqttError> {
    stream.write_all(frame).await?;
    stream.flush().await
}

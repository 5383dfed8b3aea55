use crate::error::MqttError;
use bytes::{Buf, Bytes, BytesMut};
use futures_util::sink::SinkExt;
use futures_util::stream::{SplitSink, SplitStream, StreamExt};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

/// Trait for streams that MQTT frames can be read from (TCP or WebSocket).
#[async_trait::async_trait]
pub trait ReadStream: Send {
    async fn read_byte(&mut self) -> Result<u8, MqttError>;
    /// Reads exactly `len` bytes, failing with `ShortRead` if the stream ends first.
    async fn read_bytes(&mut self, len: usize) -> Result<Bytes, MqttError>;
}

/// Trait for streams that MQTT frames can be written to (TCP or WebSocket).
#[async_trait::async_trait]
pub trait WriteStream: Send {
    async fn write_all(&mut self, data: &[u8]) -> Result<(), MqttError>;
    async fn flush(&mut self) -> Result<(), MqttError>;
    async fn close(&mut self) -> Result<(), MqttError>;
}

#[async_trait::async_trait]
impl<R: AsyncRead + Unpin + Send> ReadStream for R {
    async fn read_byte(&mut self) -> Result<u8, MqttError> {
        Ok(AsyncReadExt::read_u8(self).await?)
    }

    async fn read_bytes(&mut self, len: usize) -> Result<Bytes, MqttError> {
        let mut buf = BytesMut::zeroed(len);
        let mut received = 0;
        while received < len {
            let n = AsyncReadExt::read(self, &mut buf[received..]).await?;
            if n == 0 {
                return Err(MqttError::ShortRead { expected: len, received });
            }
            received += n;
        }
        Ok(buf.freeze())
    }
}

#[async_trait::async_trait]
impl<W: AsyncWrite + Unpin + Send> WriteStream for W {
    async fn write_all(&mut self, data: &[u8]) -> Result<(), MqttError> {
        AsyncWriteExt::write_all(self, data).await?;
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), MqttError> {
        AsyncWriteExt::flush(self).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), MqttError> {
        AsyncWriteExt::shutdown(self).await?;
        Ok(())
    }
}

/// Read half of a WebSocket connection carrying MQTT as binary messages.
///
/// Message boundaries are not frame boundaries: inbound binary payloads are
/// buffered and handed out as a plain byte stream.
pub struct WsReader<S> {
    stream: SplitStream<WebSocketStream<S>>,
    buffer: BytesMut,
}

/// Write half of a WebSocket connection. Each `write_all` becomes one binary message.
pub struct WsWriter<S> {
    sink: SplitSink<WebSocketStream<S>, Message>,
}

/// Splits an established WebSocket into MQTT byte stream halves.
pub fn split_websocket<S>(ws_stream: WebSocketStream<S>) -> (WsReader<S>, WsWriter<S>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let (sink, stream) = ws_stream.split();
    (
        WsReader {
            stream,
            buffer: BytesMut::new(),
        },
        WsWriter { sink },
    )
}

impl<S> WsReader<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Pulls messages until at least `len` bytes are buffered. Returns false on end of stream.
    async fn fill(&mut self, len: usize) -> Result<bool, MqttError> {
        while self.buffer.len() < len {
            match self.stream.next().await {
                Some(Ok(Message::Binary(data))) => self.buffer.extend_from_slice(&data),
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                Some(Ok(Message::Close(_))) | None => return Ok(false),
                Some(Ok(Message::Text(_))) => {
                    return Err(MqttError::MalformedField(
                        "text frame on MQTT WebSocket".to_string(),
                    ))
                }
                Some(Ok(Message::Frame(_))) => continue,
                Some(Err(e)) => return Err(e.into()),
            }
        }
        Ok(true)
    }
}

#[async_trait::async_trait]
impl<S> ReadStream for WsReader<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn read_byte(&mut self) -> Result<u8, MqttError> {
        if !self.fill(1).await? {
            return Err(MqttError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "WebSocket closed",
            )));
        }
        Ok(self.buffer.get_u8())
    }

    async fn read_bytes(&mut self, len: usize) -> Result<Bytes, MqttError> {
        if !self.fill(len).await? {
            return Err(MqttError::ShortRead {
                expected: len,
                received: self.buffer.len(),
            });
        }
        Ok(self.buffer.split_to(len).freeze())
    }
}

#[async_trait::async_trait]
impl<S> WriteStream for WsWriter<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn write_all(&mut self, data: &[u8]) -> Result<(), MqttError> {
        self.sink.send(Message::Binary(data.to_vec())).await?;
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), MqttError> {
        SinkExt::flush(&mut self.sink).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), MqttError> {
        SinkExt::close(&mut self.sink).await?;
        Ok(())
    }
}

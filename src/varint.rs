//! The MQTT "remaining length" variable-length integer.
//!
//! Seven value bits per byte, least significant group first, bit 7 set on
//! every byte except the last. At most four bytes are allowed.

use crate::error::MqttError;
use crate::stream::ReadStream;
use bytes::BufMut;

/// Largest value that fits in four varint bytes.
pub const MAX_REMAINING_LENGTH: usize = 268_435_455;

const MAX_BYTES: usize = 4;

/// Number of bytes `len` occupies once encoded.
pub fn encoded_len(len: usize) -> usize {
    match len {
        0..=127 => 1,
        128..=16_383 => 2,
        16_384..=2_097_151 => 3,
        _ => 4,
    }
}

/// Appends the varint encoding of `len` to `buf`.
pub fn encode<B: BufMut>(mut len: usize, buf: &mut B) -> Result<usize, MqttError> {
    if len > MAX_REMAINING_LENGTH {
        return Err(MqttError::Framing);
    }
    let mut count = 0;
    loop {
        let mut byte = (len % 128) as u8;
        len /= 128;
        if len > 0 {
            byte |= 0x80;
        }
        buf.put_u8(byte);
        count += 1;
        if len == 0 {
            return Ok(count);
        }
    }
}

/// Reads a varint from the stream, failing with `Framing` when a fourth byte still has
/// its continuation bit set.
pub async fn read<R: ReadStream + ?Sized>(stream: &mut R) -> Result<usize, MqttError> {
    let mut remaining_length = 0usize;
    let mut multiplier = 1usize;

    for _ in 0..MAX_BYTES {
        let byte = stream.read_byte().await?;
        remaining_length += (byte & 0x7F) as usize * multiplier;
        if byte & 0x80 == 0 {
            return Ok(remaining_length);
        }
        multiplier *= 128;
    }

    Err(MqttError::Framing)
}

//! Length-prefixed message framing
//!
//! Every frame is a 5 byte little-endian payload length followed by exactly
//! that many bytes of UTF-8 JSON. A single read on the underlying stream may
//! return less than requested, so both the prefix and the payload are read in
//! a loop until satisfied or the stream ends.

use crate::ProtocolError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Width of the length prefix in bytes
pub const LENGTH_PREFIX_LEN: usize = 5;

/// Largest payload a 5 byte prefix can describe
pub const MAX_PAYLOAD_LEN: u64 = (1 << (8 * LENGTH_PREFIX_LEN as u64)) - 1;

/// Default upper bound on a decoded payload
pub const DEFAULT_MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Serializes a message into a complete frame, prefix included
pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>, ProtocolError> {
    let payload = serde_json::to_vec(message)?;
    let len = payload.len() as u64;
    if len > MAX_PAYLOAD_LEN {
        return Err(ProtocolError::FrameTooLarge {
            len,
            limit: MAX_PAYLOAD_LEN,
        });
    }

    let mut frame = Vec::with_capacity(LENGTH_PREFIX_LEN + payload.len());
    frame.extend_from_slice(&len.to_le_bytes()[..LENGTH_PREFIX_LEN]);
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Reads one frame and parses its payload, using [`DEFAULT_MAX_FRAME_LEN`]
pub async fn decode<T, R>(reader: &mut R) -> Result<T, ProtocolError>
where
    T: DeserializeOwned,
    R: AsyncRead + Unpin,
{
    decode_with_limit(reader, DEFAULT_MAX_FRAME_LEN).await
}

/// Reads one frame and parses its payload.
///
/// A stream that ends cleanly before the first prefix byte yields
/// [`ProtocolError::PeerDisconnected`]. A stream that ends anywhere later in
/// the frame yields [`ProtocolError::Framing`]. A declared length above
/// `max_len` is rejected before any payload is buffered.
pub async fn decode_with_limit<T, R>(reader: &mut R, max_len: usize) -> Result<T, ProtocolError>
where
    T: DeserializeOwned,
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; LENGTH_PREFIX_LEN];
    let received = read_until_full(reader, &mut prefix).await?;
    if received == 0 {
        return Err(ProtocolError::PeerDisconnected);
    }
    if received < LENGTH_PREFIX_LEN {
        return Err(ProtocolError::Framing {
            expected: LENGTH_PREFIX_LEN,
            received,
        });
    }

    let mut len_bytes = [0u8; 8];
    len_bytes[..LENGTH_PREFIX_LEN].copy_from_slice(&prefix);
    let len = u64::from_le_bytes(len_bytes);
    if len > max_len as u64 {
        return Err(ProtocolError::FrameTooLarge {
            len,
            limit: max_len as u64,
        });
    }

    let mut payload = vec![0u8; len as usize];
    let received = read_until_full(reader, &mut payload).await?;
    if received < payload.len() {
        return Err(ProtocolError::Framing {
            expected: payload.len(),
            received,
        });
    }

    Ok(serde_json::from_slice(&payload)?)
}

/// Fills `buf` from the reader, stopping early only at end of stream.
/// Returns how many bytes were written.
async fn read_until_full<R>(reader: &mut R, buf: &mut [u8]) -> Result<usize, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

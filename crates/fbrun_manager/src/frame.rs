//! 0x50 framing.
//!
//! Every frame is `[0x50][u16 big-endian body length][body]`. Responses
//! use one frame; host requests use two (destination, then command).

use bytes::{Buf, BufMut, Bytes, BytesMut};
use fbrun_core::{CoreError, CoreResult};
use tokio_util::codec::{Decoder, Encoder};

/// Tag byte opening every frame
pub const FRAME_TAG: u8 = 0x50;

/// Header size: tag plus 16-bit length
pub const HEADER_LEN: usize = 3;

/// Largest body a frame can carry
pub const MAX_BODY_LEN: usize = u16::MAX as usize;

/// Frame a body
///
/// # Errors
///
/// Returns [`CoreError::FrameTooLarge`] if the body exceeds [`MAX_BODY_LEN`]
pub fn encode_frame(body: &[u8]) -> CoreResult<Bytes> {
    let len = u16::try_from(body.len()).map_err(|_| CoreError::FrameTooLarge { len: body.len() })?;

    let mut frame = BytesMut::with_capacity(HEADER_LEN + body.len());
    frame.put_u8(FRAME_TAG);
    frame.put_u16(len);
    frame.put_slice(body);
    Ok(frame.freeze())
}

/// Body length announced by a frame header, or `None` if `header` is
/// shorter than [`HEADER_LEN`]
///
/// # Errors
///
/// Returns [`FrameError::UnexpectedTag`] if the first byte is not [`FRAME_TAG`]
pub fn decode_header(header: &[u8]) -> Result<Option<usize>, FrameError> {
    match header {
        [FRAME_TAG, hi, lo, ..] => Ok(Some(usize::from(u16::from_be_bytes([*hi, *lo])))),
        [tag, ..] if *tag != FRAME_TAG => Err(FrameError::UnexpectedTag(*tag)),
        _ => Ok(None),
    }
}

/// Error from the frame codec
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// Stream I/O failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A frame did not start with [`FRAME_TAG`]
    #[error("Unexpected frame tag: {0:#04x}")]
    UnexpectedTag(u8),

    /// Body does not fit the length field
    #[error("Frame body too large: {len} bytes")]
    TooLarge {
        /// Body length in bytes
        len: usize,
    },
}

/// `tokio_util` codec for 0x50 frames; items are frame bodies
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameCodec;

impl FrameCodec {
    /// Create a new codec
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Decoder for FrameCodec {
    type Item = Bytes;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(len) = decode_header(src)? else {
            return Ok(None);
        };

        if src.len() < HEADER_LEN + len {
            src.reserve(HEADER_LEN + len - src.len());
            return Ok(None);
        }

        src.advance(HEADER_LEN);
        Ok(Some(src.split_to(len).freeze()))
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = FrameError;

    fn encode(&mut self, body: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let len = u16::try_from(body.len()).map_err(|_| FrameError::TooLarge { len: body.len() })?;
        dst.reserve(HEADER_LEN + body.len());
        dst.put_u8(FRAME_TAG);
        dst.put_u16(len);
        dst.put_slice(&body);
        Ok(())
    }
}

//! Binary codec for frames sent as WebSocket binary messages.
//!
//! Wire format:
//! ```text
//! [magic "GDVF":4][version:1][format:1][reserved:2][seq:8][width:4][height:4][payload_len:4][payload:N]
//! ```
//! Total header size: 28 bytes. All multi-byte integers are big-endian.
//!
//! Raster payloads are `width * height * 4` bytes of RGBA8, row-major, top row
//! first. Vector payloads are a bincode-encoded `Vec<Primitive>`.

use thiserror::Error;

use crate::render::frame::{Frame, FrameContent, FrameFormat, Primitive};
use crate::render::raster::RgbaImage;

/// Leading bytes of every encoded frame.
pub const FRAME_MAGIC: [u8; 4] = *b"GDVF";

/// Current codec version.
pub const FRAME_VERSION: u8 = 0x01;

/// Size of the fixed header in bytes.
pub const FRAME_HEADER_SIZE: usize = 28;

/// Errors that can occur while encoding or decoding a frame.
#[derive(Debug, Error, PartialEq)]
pub enum FrameCodecError {
    /// The byte slice is shorter than the header.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    #[error("bad magic: {0:02X?}")]
    BadMagic([u8; 4]),

    #[error("unsupported frame version: {0}")]
    UnsupportedVersion(u8),

    #[error("unknown frame format: 0x{0:02X}")]
    UnknownFormat(u8),

    /// The payload length field does not match the bytes available.
    #[error("payload length mismatch: header says {declared}, available is {available}")]
    PayloadLengthMismatch { declared: usize, available: usize },

    /// A raster payload is not `width * height * 4` bytes.
    #[error("raster payload for {width}x{height} must be {expected} bytes, got {actual}")]
    RasterSizeMismatch {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    /// The payload does not fit the 32-bit length field.
    #[error("payload too large: {0} bytes")]
    PayloadTooLarge(usize),

    /// Vector payload (de)serialization failed.
    #[error("vector payload: {0}")]
    Vector(String),
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes a frame, header included.
///
/// # Errors
///
/// [`FrameCodecError::PayloadTooLarge`] or [`FrameCodecError::Vector`].
pub fn encode_frame(frame: &Frame) -> Result<Vec<u8>, FrameCodecError> {
    let vector_payload;
    let payload: &[u8] = match &frame.content {
        FrameContent::Raster(image) => image.as_bytes(),
        FrameContent::Vector(primitives) => {
            vector_payload =
                bincode::serialize(primitives).map_err(|e| FrameCodecError::Vector(e.to_string()))?;
            &vector_payload
        }
    };
    let payload_len = u32::try_from(payload.len()).map_err(|_| FrameCodecError::PayloadTooLarge(payload.len()))?;

    let mut buf = Vec::with_capacity(FRAME_HEADER_SIZE + payload.len());
    buf.extend_from_slice(&FRAME_MAGIC);
    buf.push(FRAME_VERSION);
    buf.push(frame.format().wire_id());
    buf.push(0x00); // reserved
    buf.push(0x00); // reserved
    buf.extend_from_slice(&frame.seq.to_be_bytes());
    buf.extend_from_slice(&frame.width.to_be_bytes());
    buf.extend_from_slice(&frame.height.to_be_bytes());
    buf.extend_from_slice(&payload_len.to_be_bytes());
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// Decodes one frame from the start of `bytes`.
///
/// Returns the frame and the number of bytes consumed.
///
/// # Errors
///
/// Any [`FrameCodecError`] variant describing what is wrong with the input.
pub fn decode_frame(bytes: &[u8]) -> Result<(Frame, usize), FrameCodecError> {
    if bytes.len() < FRAME_HEADER_SIZE {
        return Err(FrameCodecError::InsufficientData {
            needed: FRAME_HEADER_SIZE,
            available: bytes.len(),
        });
    }

    let magic = [bytes[0], bytes[1], bytes[2], bytes[3]];
    if magic != FRAME_MAGIC {
        return Err(FrameCodecError::BadMagic(magic));
    }
    if bytes[4] != FRAME_VERSION {
        return Err(FrameCodecError::UnsupportedVersion(bytes[4]));
    }
    let format = FrameFormat::from_wire_id(bytes[5]).ok_or(FrameCodecError::UnknownFormat(bytes[5]))?;
    // bytes[6..8] are reserved – ignored on decode

    let seq = u64::from_be_bytes(array(&bytes[8..16]));
    let width = u32::from_be_bytes(array(&bytes[16..20]));
    let height = u32::from_be_bytes(array(&bytes[20..24]));
    let payload_len = u32::from_be_bytes(array(&bytes[24..28])) as usize;

    let total = FRAME_HEADER_SIZE + payload_len;
    if bytes.len() < total {
        return Err(FrameCodecError::PayloadLengthMismatch {
            declared: payload_len,
            available: bytes.len() - FRAME_HEADER_SIZE,
        });
    }
    let payload = &bytes[FRAME_HEADER_SIZE..total];

    let content = match format {
        FrameFormat::Raster => {
            let expected = width as usize * height as usize * 4;
            let image = RgbaImage::from_raw(width, height, payload.to_vec()).ok_or(
                FrameCodecError::RasterSizeMismatch {
                    width,
                    height,
                    expected,
                    actual: payload.len(),
                },
            )?;
            FrameContent::Raster(image)
        }
        FrameFormat::Vector => {
            let primitives: Vec<Primitive> =
                bincode::deserialize(payload).map_err(|e| FrameCodecError::Vector(e.to_string()))?;
            FrameContent::Vector(primitives)
        }
    };

    Ok((
        Frame {
            seq,
            width,
            height,
            content,
        },
        total,
    ))
}

fn array<const N: usize>(slice: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(slice);
    out
}

// ── Tests ─────────────────────────────────────────────────────────────────────

//! Binary frame codec and frame sequence numbering.

pub mod codec;
pub mod sequence;

pub use codec::{decode_frame, encode_frame, FrameCodecError, FRAME_HEADER_SIZE};
pub use sequence::SequenceCounter;

//! Frames, render requests and the software rasteriser.

pub mod frame;
pub mod raster;

pub use frame::{Frame, FrameContent, FrameFormat, Primitive, RenderRequest};
pub use raster::RgbaImage;

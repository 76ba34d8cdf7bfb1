//! # gdsview-core
//!
//! Shared library for gdsview containing the layout domain model, marker
//! styles, frame rendering primitives, the geometry-engine seam and the
//! binary frame codec.
//!
//! This crate is used by both the bundled engine and the WebSocket server.
//! It has no dependencies on file formats, sockets or async runtimes.
//!
//! # Architecture overview
//!
//! gdsview streams views of chip-layout files to a browser. A client picks a
//! viewport (a layout point and a zoom) and a set of visible layers; the
//! server asks a geometry engine to draw that view, paints design-rule
//! violation markers on top, and ships the result as a binary frame.
//!
//! - **`domain`** – Colors, layers, viewport math, the layout database model
//!   and marker categories / groups.
//!
//! - **`render`** – Frames (raster RGBA or vector primitives), render
//!   requests, marker compositing and a small software rasteriser.
//!
//! - **`engine`** – The [`GeometryEngine`] trait the server talks to.
//!
//! - **`protocol`** – How frames are laid out on the wire (28-byte header +
//!   payload) and how they are numbered.

pub mod domain;
pub mod engine;
pub mod protocol;
pub mod render;

pub use domain::color::{ColorError, Rgba};
pub use domain::geometry::{BBox, Point};
pub use domain::layer::{LayerInfo, LayerKey, LayerStyle, MAX_LINE_WIDTH};
pub use domain::layout::{Cell, CellInfo, Instance, LayoutFile, Library, Shape, Transform};
pub use domain::marker::{CategoryConfig, CategoryError, ItemMarkerGroup, Marker, MarkerCategory, MarkerShape};
pub use domain::viewport::{Canvas, Viewport, ViewportError};
pub use engine::{EngineError, EngineOptions, GeometryEngine};
pub use protocol::codec::{decode_frame, encode_frame, FrameCodecError};
pub use protocol::sequence::SequenceCounter;
pub use render::frame::{Frame, FrameContent, FrameFormat, Primitive, RenderRequest};
pub use render::raster::RgbaImage;

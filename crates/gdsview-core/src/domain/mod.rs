//! Domain entities for gdsview.
//!
//! Everything in here is plain data plus the rules that keep it valid. There
//! is no file access, no networking and no async: the engine crate produces a
//! [`layout::LayoutFile`], the server crate mutates viewports and marker
//! groups, and both rely on the invariants enforced here.

pub mod color;
pub mod geometry;
pub mod layer;
pub mod layout;
pub mod marker;
pub mod viewport;

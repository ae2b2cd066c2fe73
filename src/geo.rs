// PopContext
// copyright zipxing@hotmail.com 2022～2025

//! Minimal geometry engine the context caches against.
//!
//! attrib: point attribute storage, offsets and read/write handles
//! detail: the geometry container (points, attributes, particle primitives)
//! primitive: particle system primitive

mod attrib;
pub use attrib::*;
mod detail;
pub use detail::*;
mod primitive;
pub use primitive::*;

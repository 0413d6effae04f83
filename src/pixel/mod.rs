
//! Pixel-domain pipelines that operate on frame buffers:
//! luminance/chroma encoding, colorimetric conversion,
//! resolution level generation, and environment map projections.

pub mod luma;
pub mod aces;
pub mod levels;
pub mod envmap;


//! Read and write OpenEXR images.
//! This library does not support deep data in combination with lossy compression,
//! and it refuses DWA compressed contents.

#![warn(
    rust_2018_idioms,
    future_incompatible,
    unused_extern_crates,
    unused,

    missing_copy_implementations,
    missing_debug_implementations,
)]

#![deny(
    unused_variables,
    unused_assignments,
    dead_code,
    unused_must_use,
    trivial_numeric_casts,
)]

#![forbid(unsafe_code)]

pub mod io; // public to allow for custom attribute byte parsing

pub mod math;
pub mod error;
pub mod meta;
pub mod block;
pub mod compression;
pub mod frame;
pub mod scanline;
pub mod tiled;
pub mod deep;
pub mod multipart;
pub mod pixel;

#[macro_use]
extern crate smallvec;

/// Re-exports of the types commonly required for reading and writing an exr image.
pub mod prelude {
    pub use crate::meta::{MetaData, Requirements};
    pub use crate::meta::attribute::{
        AttributeValue, ChannelDescription, ChannelList, Chromaticities,
        IntegerBounds, LevelMode, LineOrder, SampleType, Text, TileDescription,
    };
    pub use crate::meta::header::Header;
    pub use crate::compression::Compression;
    pub use crate::frame::{FrameBuffer, Sample, Slice};
    pub use crate::error::{Error, Result};
    pub use crate::math::{RoundingMode, Vec2, Vec3};

    // re-export external stuff
    pub use half::f16;
}

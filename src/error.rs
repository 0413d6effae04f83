
//! Error type definitions.

use std::borrow::Cow;
use std::convert::TryFrom;
use std::fmt;
use std::io;

/// A result that may contain an exr error.
pub type Result<T> = std::result::Result<T, Error>;

/// A result that, if ok, contains nothing, and otherwise contains an exr error.
pub type UnitResult = Result<()>;

/// An error that may happen while reading or writing an exr file.
/// Distinguishes between the structural causes, so that a caller
/// can react to a single broken chunk without discarding the file.
#[derive(Debug)]
pub enum Error {

    /// The bytes are not an exr file: bad magic number,
    /// unsupported version flags, or a truncated header.
    MalformedFile(Cow<'static, str>),

    /// An attribute value did not match its declared size or enumeration range.
    MalformedAttribute(Cow<'static, str>),

    /// The compression method exists in the file format
    /// but this library cannot process it.
    UnsupportedCompression(Cow<'static, str>),

    /// The feature combination is not allowed,
    /// for example deep data with a lossy compression method.
    UnsupportedFeature(Cow<'static, str>),

    /// A slice is missing from the frame buffer, or its layout
    /// does not match the channel description.
    InvalidFrameBuffer(Cow<'static, str>),

    /// A compressed chunk could not be decoded.
    DecompressionError(Cow<'static, str>),

    /// The underlying byte source or sink failed.
    Io(io::Error),

    /// A tile or chunk index lies outside the geometry of the file.
    OutOfRange(Cow<'static, str>),

    /// A time code component exceeds its SMPTE range.
    InvalidTimeCodeComponent(Cow<'static, str>),
}

impl Error {

    /// Create a `MalformedFile` error with the specified message.
    pub fn malformed(message: impl Into<Cow<'static, str>>) -> Self {
        Error::MalformedFile(message.into())
    }

    /// Create a `MalformedAttribute` error with the specified message.
    pub fn attribute(message: impl Into<Cow<'static, str>>) -> Self {
        Error::MalformedAttribute(message.into())
    }

    /// Create an `UnsupportedFeature` error with the specified message.
    pub fn unsupported(message: impl Into<Cow<'static, str>>) -> Self {
        Error::UnsupportedFeature(message.into())
    }

    /// Create a `DecompressionError` with the specified message.
    pub fn decompression(message: impl Into<Cow<'static, str>>) -> Self {
        Error::DecompressionError(message.into())
    }

    /// Create an `InvalidFrameBuffer` error with the specified message.
    pub fn frame_buffer(message: impl Into<Cow<'static, str>>) -> Self {
        Error::InvalidFrameBuffer(message.into())
    }

    /// Create an `OutOfRange` error with the specified message.
    pub fn out_of_range(message: impl Into<Cow<'static, str>>) -> Self {
        Error::OutOfRange(message.into())
    }
}

/// Enable using the `?` operator on `std::io::Result`.
impl From<io::Error> for Error {
    fn from(error: io::Error) -> Self {
        Error::Io(error)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::MalformedFile(message) => write!(formatter, "malformed file: {}", message),
            Error::MalformedAttribute(message) => write!(formatter, "malformed attribute: {}", message),
            Error::UnsupportedCompression(message) => write!(formatter, "unsupported compression: {}", message),
            Error::UnsupportedFeature(message) => write!(formatter, "unsupported feature: {}", message),
            Error::InvalidFrameBuffer(message) => write!(formatter, "invalid frame buffer: {}", message),
            Error::DecompressionError(message) => write!(formatter, "decompression failed: {}", message),
            Error::Io(error) => write!(formatter, "io error: {}", error),
            Error::OutOfRange(message) => write!(formatter, "out of range: {}", message),
            Error::InvalidTimeCodeComponent(message) => write!(formatter, "invalid time code component: {}", message),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(error) => Some(error),
            _ => None,
        }
    }
}


/// Convert a `usize` to `i32`, returning an error on overflow.
#[inline]
pub fn usize_to_i32(value: usize, name: &'static str) -> Result<i32> {
    i32::try_from(value).map_err(|_| Error::out_of_range(name))
}

/// Convert a `usize` to `u16`, returning an error on overflow.
#[inline]
pub fn usize_to_u16(value: usize, name: &'static str) -> Result<u16> {
    u16::try_from(value).map_err(|_| Error::out_of_range(name))
}

/// Convert an `i32` to `usize`, returning an error for negative numbers.
#[inline]
pub fn i32_to_usize(value: i32, name: &'static str) -> Result<usize> {
    usize::try_from(value).map_err(|_| Error::malformed(name))
}

/// Convert an `i64` to `usize`, returning an error for negative numbers.
#[inline]
pub fn i64_to_usize(value: i64, name: &'static str) -> Result<usize> {
    usize::try_from(value).map_err(|_| Error::malformed(name))
}

/// Convert a `u64` to `usize`, returning an error on overflow.
#[inline]
pub fn u64_to_usize(value: u64, name: &'static str) -> Result<usize> {
    usize::try_from(value).map_err(|_| Error::malformed(name))
}


//! All meta data attributes that can appear in a header.
//! Attributes of unknown type are preserved as raw bytes.

use std::convert::TryFrom;

use half::f16;
use smallvec::SmallVec;

use crate::error::*;
use crate::io::*;
use crate::math::{RoundingMode, Vec2};
use crate::meta::sequence_end;

pub use crate::compression::Compression;


/// Contains one of all possible attribute values,
/// including an opaque variant for unknown attribute types.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {

    /// Channel meta data, type name `chlist`.
    ChannelList(ChannelList),

    /// Color space definition, type name `chromaticities`.
    Chromaticities(Chromaticities),

    /// Compression method of this part, type name `compression`.
    Compression(Compression),

    /// How to interpret this image as an environment, type name `envmap`.
    EnvironmentMap(EnvironmentMap),

    /// Film roll information, type name `keycode`.
    KeyCode(KeyCode),

    /// Order of the chunks in the file, type name `lineOrder`.
    LineOrder(LineOrder),

    /// A 3x3 matrix of floats, type name `m33f`.
    Matrix3x3([f32; 9]),

    /// A 3x3 matrix of doubles, type name `m33d`.
    Matrix3x3Double([f64; 9]),

    /// A 4x4 matrix of floats, type name `m44f`.
    Matrix4x4([f32; 16]),

    /// A 4x4 matrix of doubles, type name `m44d`.
    Matrix4x4Double([f64; 16]),

    /// 8-bit rgba preview of the image, type name `preview`.
    Preview(Preview),

    /// An integer dividend and divisor, type name `rational`.
    Rational(Rational),

    /// A list of texts, type name `stringvector`.
    TextVector(Vec<Text>),

    /// A list of floats, type name `floatvector`.
    FloatVector(Vec<f32>),

    /// How the image is divided into tiles, type name `tiledesc`.
    TileDescription(TileDescription),

    /// A timepoint with flags, type name `timecode`.
    TimeCode(TimeCode),

    /// A string of byte-chars, type name `string`.
    Text(Text),

    /// A 64-bit float, type name `double`.
    F64(f64),

    /// A 32-bit float, type name `float`.
    F32(f32),

    /// A 32-bit signed integer, type name `int`.
    I32(i32),

    /// A 2D integer rectangle with inclusive corners, type name `box2i`.
    IntegerBounds(IntegerBounds),

    /// A 2D float rectangle, type name `box2f`.
    FloatRect(FloatRect),

    /// A 2D integer vector, type name `v2i`.
    IntVec2(Vec2<i32>),

    /// A 2D float vector, type name `v2f`.
    FloatVec2(Vec2<f32>),

    /// A 2D double vector, type name `v2d`.
    DoubleVec2(Vec2<f64>),

    /// A 3D integer vector, type name `v3i`.
    IntVec3((i32, i32, i32)),

    /// A 3D float vector, type name `v3f`.
    FloatVec3((f32, f32, f32)),

    /// A 3D double vector, type name `v3d`.
    DoubleVec3((f64, f64, f64)),

    /// An attribute of unknown type.
    /// The bytes are stored and re-emitted verbatim,
    /// so that unknown attributes survive a read-write cycle.
    Opaque {

        /// The type name of the attribute as it appears in the file.
        kind: Text,

        /// The raw little-endian value bytes.
        bytes: Vec<u8>,
    },
}


/// The raw bytes that make up a string in an exr file.
/// Each byte is a single char, which is usually printable ascii.
type TextBytes = SmallVec<[u8; 24]>;

/// A byte string where each byte is a char.
/// This is not utf8, and must be constructed from a standard string.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Default)]
pub struct Text {
    bytes: TextBytes,
}

/// An integer dividend and divisor, together forming a ratio.
pub type Rational = (i32, u32);

/// What kind of samples are stored in a channel.
#[derive(Clone, Debug, Eq, PartialEq, Copy, Hash)]
pub enum SampleType {

    /// This channel contains 32-bit unsigned int values.
    U32,

    /// This channel contains 16-bit float values.
    F16,

    /// This channel contains 32-bit float values.
    F32,
}

/// A single channel in a part.
/// Does not contain the actual pixel data, but instead describes it.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct ChannelDescription {

    /// One of "R", "G", or "B" most of the time.
    pub name: Text,

    /// U32, F16 or F32.
    pub sample_type: SampleType,

    /// Whether the data in this channel is quantized linearly by lossy compression methods.
    /// Should be `false` for colors, and `true` for hue, saturation, or alpha.
    pub quantize_linearly: bool,

    /// How many pixels are skipped between two samples of this channel,
    /// horizontally and vertically. `(1, 1)` means full resolution.
    /// Values other than one are only allowed in flat scan line images.
    pub sampling: Vec2<usize>,
}

/// A list of channels. Iteration order is insertion order;
/// the file always stores channels sorted by name.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ChannelList {

    /// The channels in this list, in insertion order.
    pub list: SmallVec<[ChannelDescription; 5]>,

    /// The number of bytes a full-resolution pixel of all channels needs.
    pub bytes_per_pixel: usize,

    /// The sample type of all channels, if all channels have the same type.
    pub uniform_sample_type: Option<SampleType>,
}

/// A rectangular section anywhere in 2D integer space.
/// The corners stored in a file are inclusive, so `width == max.x - min.x + 1`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Default, Hash)]
pub struct IntegerBounds {

    /// The top left corner of this rectangle.
    /// This pixel is included in the rectangle if the size is not zero.
    pub position: Vec2<i32>,

    /// How many pixels this rectangle includes,
    /// not the coordinate of the corner.
    pub size: Vec2<usize>,
}

/// A rectangular section anywhere in 2D float space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FloatRect {

    /// The lower corner.
    pub min: Vec2<f32>,

    /// The upper corner.
    pub max: Vec2<f32>,
}

/// The color space of the pixels, as locations on the CIE xy chromaticity diagram.
/// Files without this attribute are assumed to match Rec. ITU-R BT.709-3.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Chromaticities {

    /// Red primary.
    pub red: Vec2<f32>,

    /// Green primary.
    pub green: Vec2<f32>,

    /// Blue primary.
    pub blue: Vec2<f32>,

    /// White point.
    pub white: Vec2<f32>,
}

/// If present, describes how this image is projected onto an environment.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum EnvironmentMap {

    /// An equirectangular projection, like a world map.
    LatLong,

    /// The six sides of a cube, stacked vertically.
    Cube,
}

/// Uniquely identifies a motion picture film frame.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct KeyCode {

    /// Identifies a film manufacturer.
    pub film_manufacturer_code: i32,

    /// Identifies a film type.
    pub film_type: i32,

    /// Specifies the film roll prefix.
    pub film_roll_prefix: i32,

    /// Specifies the film count.
    pub count: i32,

    /// Specifies the perforation offset.
    pub perforation_offset: i32,

    /// Specifies the perforation count of each single frame.
    pub perforations_per_frame: i32,

    /// Specifies the perforation count of each single film.
    pub perforations_per_count: i32,
}

/// In what order the chunks of pixel data appear in a file.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum LineOrder {

    /// Chunks appear in the file ordered by ascending rows.
    IncreasingY,

    /// Chunks appear in the file ordered by descending rows.
    DecreasingY,

    /// Chunks appear in any order. Only allowed in tiled parts.
    RandomY,
}

/// A small rgba image that approximates the real image.
#[derive(Clone, Eq, PartialEq)]
pub struct Preview {

    /// The dimensions of the preview image.
    pub size: Vec2<usize>,

    /// An array of `4 * width * height` bytes,
    /// each pixel being the four values red, green, blue, alpha.
    pub pixel_data: Vec<u8>,
}

/// Describes how a part is divided into tiles,
/// and whether it contains multiple resolution levels.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct TileDescription {

    /// The size of each tile, which stays the same across all levels.
    pub tile_size: Vec2<usize>,

    /// Whether to also store smaller versions of the image.
    pub level_mode: LevelMode,

    /// Whether to round down or up when computing level sizes.
    pub rounding_mode: RoundingMode,
}

/// Whether to also store increasingly smaller versions of the original image.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum LevelMode {

    /// Only the full resolution.
    One,

    /// Uniformly scaled smaller versions.
    MipMap,

    /// Smaller versions with all combinations of horizontal and vertical scales.
    RipMap,
}

/// The part type, determining the chunk layout.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum BlockType {

    /// Corresponds to the string value `scanlineimage`.
    ScanLine,

    /// Corresponds to the string value `tiledimage`.
    Tile,

    /// Corresponds to the string value `deepscanline`.
    DeepScanLine,

    /// Corresponds to the string value `deeptile`.
    DeepTile,
}

/// The string literals representing a `BlockType` in a file.
pub mod block_type_strings {

    /// Type attribute text value of flat scan lines.
    pub const SCAN_LINE: &[u8] = b"scanlineimage";

    /// Type attribute text value of flat tiles.
    pub const TILE: &[u8] = b"tiledimage";

    /// Type attribute text value of deep scan lines.
    pub const DEEP_SCAN_LINE: &[u8] = b"deepscanline";

    /// Type attribute text value of deep tiles.
    pub const DEEP_TILE: &[u8] = b"deeptile";
}

/// An SMPTE 12M time code: two 32-bit words, with hours, minutes, seconds
/// and frames stored as binary coded decimals in the first word,
/// and eight four-bit binary groups in the second word.
#[derive(Copy, Debug, Clone, Eq, PartialEq, Hash, Default)]
pub struct TimeCode {
    time_and_flags: u32,
    user_data: u32,
}

/// The three SMPTE layouts of the time-and-flags word.
/// The BCD component fields are identical; the flag bits move.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum TimeCodePacking {

    /// 60 fields per second television packing. This is the in-memory layout.
    Tv60,

    /// 50 fields per second television packing.
    Tv50,

    /// 24 frames per second film packing.
    Film24,
}


fn invalid_type() -> Error {
    Error::attribute("attribute type mismatch")
}


impl Text {

    /// The internal ascii bytes this text is made of.
    pub fn bytes(&self) -> &[u8] {
        self.bytes.as_slice()
    }

    /// Create a `Text` from a `str` reference.
    /// Returns `None` if the string contains chars that cannot be stored in a file.
    pub fn new(text: impl AsRef<str>) -> Option<Self> {
        let bytes: Option<TextBytes> = text.as_ref().chars()
            .map(|character| u8::try_from(character as u64).ok())
            .collect();

        bytes.map(Self::from_bytes_unchecked)
    }

    /// Create a `Text` from a slice of bytes, without checking the bytes.
    pub fn from_slice_unchecked(text: &[u8]) -> Self {
        Self::from_bytes_unchecked(SmallVec::from_slice(text))
    }

    /// Create a `Text` from the specified bytes, without checking the bytes.
    pub fn from_bytes_unchecked(bytes: TextBytes) -> Self {
        Text { bytes }
    }

    /// Check whether this string is valid, adjusting `long_names` if required.
    /// If `long_names` is not provided, the length is not checked.
    pub fn validate(&self, null_terminated: bool, long_names: Option<&mut bool>) -> UnitResult {
        Self::validate_bytes(self.bytes(), null_terminated, long_names)
    }

    /// Check whether the bytes are valid, adjusting `long_names` if required.
    pub fn validate_bytes(text: &[u8], null_terminated: bool, long_names: Option<&mut bool>) -> UnitResult {
        if null_terminated && text.is_empty() {
            return Err(Error::attribute("text must not be empty"));
        }

        if let Some(long) = long_names {
            if text.len() >= 256 { return Err(Error::attribute("text must not be longer than 255")); }
            if text.len() >= 32 { *long = true; }
        }

        Ok(())
    }

    /// The byte count this string occupies if encoded null-terminated.
    pub fn null_terminated_byte_size(&self) -> usize {
        self.bytes.len() + sequence_end::byte_size()
    }

    /// The byte count this string occupies if encoded with a length prefix.
    pub fn i32_sized_byte_size(&self) -> usize {
        self.bytes.len() + i32::BYTE_SIZE
    }

    /// Write the length of the string and then the contents.
    pub fn write_i32_sized<W: Write>(&self, write: &mut W) -> UnitResult {
        i32::write(usize_to_i32(self.bytes.len(), "text length")?, write)?;
        u8::write_slice(write, self.bytes.as_slice())
    }

    /// Read the length of a string and then the contents with that length.
    pub fn read_i32_sized<R: Read>(read: &mut R, max_size: usize) -> Result<Self> {
        let size = i32_to_usize(i32::read(read)?, "vector string length")?;
        let bytes = u8::read_vec(read, size, 1024, Some(max_size), "vector string")?;
        Ok(Text::from_bytes_unchecked(SmallVec::from_vec(bytes)))
    }

    /// Read exactly the specified number of chars.
    pub fn read_sized<R: Read>(read: &mut R, size: usize) -> Result<Self> {
        const SMALL_SIZE: usize = 24;

        // for small strings, read into a small vec without heap allocation
        if size <= SMALL_SIZE {
            let mut buffer = [0_u8; SMALL_SIZE];
            let data = &mut buffer[..size];

            read.read_exact(data)?;
            Ok(Text::from_slice_unchecked(data))
        }
        else {
            let bytes = u8::read_vec(read, size, 1024, None, "attribute string")?;
            Ok(Text::from_bytes_unchecked(SmallVec::from_vec(bytes)))
        }
    }

    /// Write the string contents and a null-terminator.
    pub fn write_null_terminated<W: Write>(&self, write: &mut W) -> UnitResult {
        Self::write_null_terminated_bytes(self.bytes(), write)
    }

    /// Write the bytes and a null-terminator.
    fn write_null_terminated_bytes<W: Write>(bytes: &[u8], write: &mut W) -> UnitResult {
        debug_assert!(!bytes.is_empty(), "empty text would collide with the sequence terminator");

        u8::write_slice(write, bytes)?;
        sequence_end::write(write)?;
        Ok(())
    }

    /// Read chars until a null-terminator is found, then skip the terminator.
    pub fn read_null_terminated<R: Read>(read: &mut R, max_len: usize) -> Result<Self> {
        let first = u8::read(read)?; // null-terminated strings are at least 1 byte
        if first == 0 {
            return Err(Error::attribute("text must not be empty"));
        }

        let mut bytes = smallvec![ first ];

        loop {
            match u8::read(read)? {
                0 => break,
                non_terminator => bytes.push(non_terminator),
            }

            if bytes.len() > max_len {
                return Err(Error::attribute("text too long"));
            }
        }

        Ok(Text { bytes })
    }

    /// Read a sequence of length-prefixed strings until the byte count is exhausted.
    fn read_vec_of_i32_sized(read: &mut impl Read, total_byte_size: usize) -> Result<Vec<Text>> {
        let mut result = Vec::with_capacity(2);

        // the length of the text vector is inferred from the attribute size
        let mut processed_bytes = 0;

        while processed_bytes < total_byte_size {
            let text = Text::read_i32_sized(read, total_byte_size)?;
            processed_bytes += i32::BYTE_SIZE; // the prefix of the text
            processed_bytes += text.bytes.len();
            result.push(text);
        }

        if processed_bytes != total_byte_size {
            return Err(Error::attribute("text array byte size"));
        }

        Ok(result)
    }

    /// Write a sequence of length-prefixed strings.
    fn write_vec_of_i32_sized_texts<W: Write>(write: &mut W, texts: &[Text]) -> UnitResult {
        for text in texts {
            text.write_i32_sized(write)?;
        }

        Ok(())
    }

    /// Iterate over the chars in this text, without heap allocation.
    pub fn chars(&self) -> impl '_ + Iterator<Item = char> {
        self.bytes.iter().map(|&byte| byte as char)
    }

    /// Compare this text with a plain `&str`.
    pub fn eq(&self, string: &str) -> bool {
        string.chars().eq(self.chars())
    }
}

impl<'s> TryFrom<&'s str> for Text {
    type Error = &'static str;

    fn try_from(value: &'s str) -> std::result::Result<Self, Self::Error> {
        Text::new(value).ok_or("exr text does not support unicode characters")
    }
}

impl std::fmt::Debug for Text {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "exr::Text(\"{}\")", self)
    }
}

// automatically implements to_string for us
impl std::fmt::Display for Text {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use std::fmt::Write;

        for &byte in self.bytes.iter() {
            formatter.write_char(byte as char)?;
        }

        Ok(())
    }
}


impl BlockType {

    /// Parse a `BlockType` from the value of a `type` attribute.
    pub fn parse(text: &Text) -> Result<Self> {
        match text.bytes() {
            block_type_strings::SCAN_LINE => Ok(BlockType::ScanLine),
            block_type_strings::TILE => Ok(BlockType::Tile),
            block_type_strings::DEEP_SCAN_LINE => Ok(BlockType::DeepScanLine),
            block_type_strings::DEEP_TILE => Ok(BlockType::DeepTile),
            _ => Err(Error::attribute("block type attribute value")),
        }
    }

    /// The raw text value this type is represented by in a file.
    pub fn to_text(&self) -> Text {
        Text::from_slice_unchecked(match self {
            BlockType::ScanLine => block_type_strings::SCAN_LINE,
            BlockType::Tile => block_type_strings::TILE,
            BlockType::DeepScanLine => block_type_strings::DEEP_SCAN_LINE,
            BlockType::DeepTile => block_type_strings::DEEP_TILE,
        })
    }

    /// Whether this part contains variable sample counts per pixel.
    pub fn is_deep(&self) -> bool {
        match self {
            BlockType::DeepScanLine | BlockType::DeepTile => true,
            _ => false,
        }
    }

    /// Whether this part is divided into tiles instead of scan line chunks.
    pub fn is_tiled(&self) -> bool {
        match self {
            BlockType::Tile | BlockType::DeepTile => true,
            _ => false,
        }
    }
}


impl IntegerBounds {

    /// Create bounds with no size located at `(0, 0)`.
    pub fn zero() -> Self {
        Self::from_dimensions(Vec2(0, 0))
    }

    /// Create bounds of the specified size starting at zero.
    pub fn from_dimensions(size: impl Into<Vec2<usize>>) -> Self {
        Self::new(Vec2(0, 0), size)
    }

    /// Create bounds with a position and a size.
    pub fn new(position: impl Into<Vec2<i32>>, size: impl Into<Vec2<usize>>) -> Self {
        Self { position: position.into(), size: size.into() }
    }

    /// Create bounds from inclusive corners. A lower corner greater
    /// than the upper corner produces empty bounds.
    pub fn from_corners(min: Vec2<i32>, max: Vec2<i32>) -> Self {
        if max.x() < min.x() || max.y() < min.y() {
            Self { position: min, size: Vec2(0, 0) }
        }
        else {
            Self {
                position: min,
                size: Vec2(
                    (i64::from(max.x()) - i64::from(min.x()) + 1) as usize,
                    (i64::from(max.y()) - i64::from(min.y()) + 1) as usize,
                ),
            }
        }
    }

    /// The lower inclusive corner.
    pub fn min(self) -> Vec2<i32> { self.position }

    /// The upper inclusive corner. Only meaningful for non-empty bounds.
    pub fn max(self) -> Vec2<i32> { self.end() - Vec2(1, 1) }

    /// The exclusive upper corner, just like `Vec::len()`.
    pub fn end(self) -> Vec2<i32> {
        self.position + self.size.to_i32()
    }

    /// The number of pixels in a row.
    pub fn width(self) -> usize { self.size.width() }

    /// The number of pixels in a column.
    pub fn height(self) -> usize { self.size.height() }

    /// The number of pixels included in these bounds.
    pub fn area(self) -> usize { self.size.area() }

    /// Whether these bounds contain no pixels at all.
    pub fn is_empty(self) -> bool { self.size.width() == 0 || self.size.height() == 0 }

    /// Validate that this instance does not exceed the possible integer coordinates.
    pub fn validate(&self, max_size: Option<Vec2<usize>>) -> UnitResult {
        if let Some(max_size) = max_size {
            if self.size.width() > max_size.width() || self.size.height() > max_size.height() {
                return Err(Error::attribute("window attribute dimension value"));
            }
        }

        let max_coordinate = i64::from(i32::MAX) / 2;

        let end = Vec2(
            i64::from(self.position.x()) + self.size.width() as i64,
            i64::from(self.position.y()) + self.size.height() as i64,
        );

        if end.x() >= max_coordinate || end.y() >= max_coordinate
            || i64::from(self.position.x()) <= -max_coordinate
            || i64::from(self.position.y()) <= -max_coordinate
        {
            return Err(Error::attribute("window size exceeding integer maximum"));
        }

        Ok(())
    }

    /// Number of bytes these bounds consume in a file.
    pub fn byte_size() -> usize {
        4 * i32::BYTE_SIZE
    }

    /// Without validation, write this instance to the byte stream.
    pub fn write<W: Write>(&self, write: &mut W) -> UnitResult {
        let min = self.min();
        let max = self.max();

        min.x().write(write)?;
        min.y().write(write)?;
        max.x().write(write)?;
        max.y().write(write)?;
        Ok(())
    }

    /// Read the value without validating.
    pub fn read<R: Read>(read: &mut R) -> Result<Self> {
        let min_x = i32::read(read)?;
        let min_y = i32::read(read)?;
        let max_x = i32::read(read)?;
        let max_y = i32::read(read)?;

        let bounds = Self::from_corners(Vec2(min_x, min_y), Vec2(max_x, max_y));
        bounds.validate(None)?;
        Ok(bounds)
    }

    /// A new rectangle which is offset by the specified origin.
    pub fn with_origin(self, origin: Vec2<i32>) -> Self {
        IntegerBounds { position: self.position + origin, ..self }
    }

    /// Whether the specified rectangle is equal to or inside this rectangle.
    pub fn contains(self, subset: Self) -> bool {
        subset.position.x() >= self.position.x()
            && subset.position.y() >= self.position.y()
            && subset.end().x() <= self.end().x()
            && subset.end().y() <= self.end().y()
    }

    /// The intersection of the two rectangles, which may be empty.
    pub fn intersection(self, other: Self) -> Self {
        let min = Vec2(
            self.position.x().max(other.position.x()),
            self.position.y().max(other.position.y()),
        );

        let end = Vec2(
            self.end().x().min(other.end().x()),
            self.end().y().min(other.end().y()),
        );

        Self::from_corners(min, end - Vec2(1, 1))
    }
}


impl FloatRect {

    /// Number of bytes this rectangle consumes in a file.
    pub fn byte_size() -> usize {
        4 * f32::BYTE_SIZE
    }

    /// Without validation, write this instance to the byte stream.
    pub fn write<W: Write>(&self, write: &mut W) -> UnitResult {
        self.min.x().write(write)?;
        self.min.y().write(write)?;
        self.max.x().write(write)?;
        self.max.y().write(write)?;
        Ok(())
    }

    /// Read the value without validating.
    pub fn read<R: Read>(read: &mut R) -> Result<Self> {
        let min_x = f32::read(read)?;
        let min_y = f32::read(read)?;
        let max_x = f32::read(read)?;
        let max_y = f32::read(read)?;

        Ok(FloatRect {
            min: Vec2(min_x, min_y),
            max: Vec2(max_x, max_y),
        })
    }
}


impl SampleType {

    /// How many bytes a single sample takes up.
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            SampleType::F16 => f16::BYTE_SIZE,
            SampleType::F32 => f32::BYTE_SIZE,
            SampleType::U32 => u32::BYTE_SIZE,
        }
    }

    /// Number of bytes this tag consumes in a file.
    pub fn byte_size() -> usize {
        i32::BYTE_SIZE
    }

    /// Without validation, write this instance to the byte stream.
    pub fn write<W: Write>(&self, write: &mut W) -> UnitResult {
        match *self {
            SampleType::U32 => 0_i32,
            SampleType::F16 => 1_i32,
            SampleType::F32 => 2_i32,
        }.write(write)?;

        Ok(())
    }

    /// Read the value without validating.
    pub fn read<R: Read>(read: &mut R) -> Result<Self> {
        Ok(match i32::read(read)? {
            0 => SampleType::U32,
            1 => SampleType::F16,
            2 => SampleType::F32,
            _ => return Err(Error::attribute("pixel type attribute value")),
        })
    }
}


impl ChannelDescription {

    /// Create a new channel with the specified properties and full resolution sampling.
    pub fn new(name: Text, sample_type: SampleType, quantize_linearly: bool) -> Self {
        Self { name, sample_type, quantize_linearly, sampling: Vec2(1, 1) }
    }

    /// The resolution of this channel inside the specified dimensions, respecting subsampling.
    pub fn subsampled_resolution(&self, dimensions: Vec2<usize>) -> Vec2<usize> {
        Vec2(
            RoundingMode::Up.divide(dimensions.x(), self.sampling.x()),
            RoundingMode::Up.divide(dimensions.y(), self.sampling.y()),
        )
    }

    /// The number of samples of this channel inside the specified dimensions.
    pub fn subsampled_pixels(&self, dimensions: Vec2<usize>) -> usize {
        self.subsampled_resolution(dimensions).area()
    }

    /// Number of bytes this channel entry consumes in a file.
    pub fn byte_size(&self) -> usize {
        self.name.null_terminated_byte_size()
            + SampleType::byte_size()
            + 1 // linear flag
            + 3 // reserved bytes
            + 2 * i32::BYTE_SIZE // sampling x, y
    }

    /// Without validation, write this instance to the byte stream.
    pub fn write<W: Write>(&self, write: &mut W) -> UnitResult {
        self.name.write_null_terminated(write)?;
        self.sample_type.write(write)?;

        match self.quantize_linearly {
            false => 0_u8,
            true => 1_u8,
        }.write(write)?;

        u8::write_slice(write, &[0, 0, 0])?;
        i32::write(usize_to_i32(self.sampling.x(), "x sampling")?, write)?;
        i32::write(usize_to_i32(self.sampling.y(), "y sampling")?, write)?;
        Ok(())
    }

    /// Read the value without validating.
    pub fn read<R: Read>(read: &mut R) -> Result<Self> {
        let name = Text::read_null_terminated(read, 256)?;
        let sample_type = SampleType::read(read)?;

        let is_linear = match u8::read(read)? {
            1 => true,
            0 => false,
            _ => return Err(Error::attribute("channel linearity attribute value")),
        };

        let mut reserved = [0_u8; 3];
        u8::read_slice(read, &mut reserved)?;

        let x_sampling = i32_to_usize(i32::read(read)?, "x channel sampling")?;
        let y_sampling = i32_to_usize(i32::read(read)?, "y channel sampling")?;

        Ok(ChannelDescription {
            name, sample_type,
            quantize_linearly: is_linear,
            sampling: Vec2(x_sampling, y_sampling),
        })
    }

    /// Validate this instance.
    pub fn validate(&self, allow_sampling: bool, data_window: IntegerBounds) -> UnitResult {
        self.name.validate(true, None)?;

        if self.sampling.x() == 0 || self.sampling.y() == 0 {
            return Err(Error::attribute("zero sampling factor"));
        }

        if self.sampling != Vec2(1, 1) {
            if !allow_sampling {
                return Err(Error::unsupported("subsampling is only allowed in flat scan line images"));
            }

            if data_window.position.x() % self.sampling.x() as i32 != 0
                || data_window.position.y() % self.sampling.y() as i32 != 0 {
                return Err(Error::attribute("channel sampling factor not dividing data window position"));
            }
        }

        Ok(())
    }
}

impl ChannelList {

    /// Create a new channel list. Does not sort the channels.
    pub fn new(channels: SmallVec<[ChannelDescription; 5]>) -> Self {
        let uniform_sample_type = {
            if let Some(first) = channels.first() {
                let uniform = channels.iter().skip(1)
                    .all(|channel| channel.sample_type == first.sample_type);

                if uniform { Some(first.sample_type) } else { None }
            }
            else { None }
        };

        ChannelList {
            bytes_per_pixel: channels.iter().map(|channel| channel.sample_type.bytes_per_sample()).sum(),
            list: channels,
            uniform_sample_type,
        }
    }

    /// The projection of this channel list used by the file i/o:
    /// the same channels, stably sorted by name.
    pub fn sorted_for_file(&self) -> ChannelList {
        let mut sorted = self.list.clone();
        sorted.sort_by(|a, b| a.name.cmp(&b.name));
        ChannelList::new(sorted)
    }

    /// Whether the channels are already sorted by name.
    pub fn is_sorted(&self) -> bool {
        self.list.windows(2).all(|pair| pair[0].name <= pair[1].name)
    }

    /// Find the channel with the specified name.
    pub fn find(&self, name: &Text) -> Option<&ChannelDescription> {
        self.list.iter().find(|channel| &channel.name == name)
    }

    /// The number of bytes all samples of one chunk rectangle occupy,
    /// respecting subsampling. The rectangle uses absolute pixel coordinates.
    pub fn byte_size_of_rect(&self, rectangle: IntegerBounds) -> usize {
        let mut byte_count = 0;

        for y in rectangle.position.y()..rectangle.end().y() {
            for channel in &self.list {
                if crate::math::mod_p(y, channel.sampling.y() as i32) != 0 { continue; }

                let samples_x = RoundingMode::Up.divide(rectangle.size.width(), channel.sampling.x());
                byte_count += samples_x * channel.sample_type.bytes_per_sample();
            }
        }

        byte_count
    }

    /// Number of bytes all channel entries and the terminator consume in a file.
    pub fn byte_size(&self) -> usize {
        self.list.iter().map(ChannelDescription::byte_size).sum::<usize>() + sequence_end::byte_size()
    }

    /// Without validation, write the channels sorted by name, then the terminator.
    pub fn write(&self, write: &mut impl Write) -> UnitResult {
        debug_assert!(self.is_sorted(), "channels must be sorted before writing");

        for channel in &self.list {
            channel.write(write)?;
        }

        sequence_end::write(write)?;
        Ok(())
    }

    /// Read the value without validating.
    pub fn read(read: &mut PeekRead<impl Read>) -> Result<Self> {
        let mut channels = SmallVec::new();
        while !sequence_end::has_come(read)? {
            channels.push(ChannelDescription::read(read)?);
        }

        Ok(ChannelList::new(channels))
    }

    /// Check that the list is non-empty, the names unique, and each channel valid.
    pub fn validate(&self, allow_sampling: bool, data_window: IntegerBounds) -> UnitResult {
        if self.list.is_empty() {
            return Err(Error::attribute("at least one channel is required"));
        }

        for channel in &self.list {
            channel.validate(allow_sampling, data_window)?;
        }

        let sorted = self.sorted_for_file();
        let duplicates = sorted.list.windows(2).any(|pair| pair[0].name == pair[1].name);
        if duplicates {
            return Err(Error::attribute("channel names are not unique"));
        }

        Ok(())
    }
}


/// Convert a binary number in `0..=99` to its binary coded decimal form.
fn binary_to_bcd(value: u32) -> u32 {
    ((value / 10) << 4) | (value % 10)
}

/// Convert a binary coded decimal to its binary form.
fn bcd_to_binary(bcd: u32) -> u32 {
    (bcd & 0x0f) + 10 * ((bcd >> 4) & 0x0f)
}

impl TimeCode {

    /// Number of bytes a time code consumes in a file.
    pub const BYTE_SIZE: usize = 2 * u32::BYTE_SIZE;

    /// Create a time code with the specified components and no flags.
    /// Validates the SMPTE component ranges.
    pub fn new(hours: u32, minutes: u32, seconds: u32, frames: u32) -> Result<Self> {
        let mut time_code = TimeCode::default();
        time_code.set_hours(hours)?;
        time_code.set_minutes(minutes)?;
        time_code.set_seconds(seconds)?;
        time_code.set_frames(frames)?;
        Ok(time_code)
    }

    /// Create a time code from the two raw words of a file,
    /// reinterpreting the flag bits of the specified packing.
    pub fn from_time_and_flags(word: u32, user_data: u32, packing: TimeCodePacking) -> Self {
        use bit_field::BitField;

        let time = match packing {
            TimeCodePacking::Tv60 => word,

            TimeCodePacking::Tv50 => {
                let mut time = word & !Self::TV60_FLAG_MASK;
                time.set_bit(6, word.get_bit(30));  // drop frame
                time.set_bit(7, word.get_bit(31));  // color frame
                time.set_bit(23, word.get_bit(6));  // bgf0
                time.set_bit(30, word.get_bit(15)); // bgf1
                time.set_bit(31, word.get_bit(23)); // bgf2
                time
            },

            TimeCodePacking::Film24 => word & !((1 << 6) | (1 << 7)),
        };

        TimeCode { time_and_flags: time, user_data }
    }

    const TV60_FLAG_MASK: u32 = (1 << 6) | (1 << 7) | (1 << 15) | (1 << 23) | (1 << 30) | (1 << 31);

    /// The time-and-flags word in the specified packing.
    pub fn time_and_flags(&self, packing: TimeCodePacking) -> u32 {
        use bit_field::BitField;

        match packing {
            TimeCodePacking::Tv60 => self.time_and_flags,

            TimeCodePacking::Tv50 => {
                let mut word = self.time_and_flags & !Self::TV60_FLAG_MASK;
                word.set_bit(6, self.bgf0());
                word.set_bit(15, self.bgf1());
                word.set_bit(23, self.bgf2());
                word.set_bit(30, self.drop_frame());
                word.set_bit(31, self.color_frame());
                word
            },

            TimeCodePacking::Film24 => self.time_and_flags & !((1 << 6) | (1 << 7)),
        }
    }

    /// The raw user data word, containing the eight binary groups.
    pub fn user_data(&self) -> u32 { self.user_data }

    fn component(&self, low_bit: usize, high_bit: usize) -> u32 {
        use bit_field::BitField;
        bcd_to_binary(self.time_and_flags.get_bits(low_bit .. high_bit + 1))
    }

    fn set_component(&mut self, low_bit: usize, high_bit: usize, value: u32, max: u32, name: &'static str) -> UnitResult {
        use bit_field::BitField;

        if value > max {
            return Err(Error::InvalidTimeCodeComponent(name.into()));
        }

        self.time_and_flags.set_bits(low_bit .. high_bit + 1, binary_to_bcd(value));
        Ok(())
    }

    /// The hours component, in `0..=23`. Stored in bits 24 to 29.
    pub fn hours(&self) -> u32 { self.component(24, 29) }

    /// The minutes component, in `0..=59`. Stored in bits 16 to 22.
    pub fn minutes(&self) -> u32 { self.component(16, 22) }

    /// The seconds component, in `0..=59`. Stored in bits 8 to 14.
    pub fn seconds(&self) -> u32 { self.component(8, 14) }

    /// The frames component, in `0..=29`. Stored in bits 0 to 5.
    pub fn frames(&self) -> u32 { self.component(0, 5) }

    /// Overwrite the hours component. Values over 23 are rejected.
    pub fn set_hours(&mut self, value: u32) -> UnitResult { self.set_component(24, 29, value, 23, "hours") }

    /// Overwrite the minutes component. Values over 59 are rejected.
    pub fn set_minutes(&mut self, value: u32) -> UnitResult { self.set_component(16, 22, value, 59, "minutes") }

    /// Overwrite the seconds component. Values over 59 are rejected.
    pub fn set_seconds(&mut self, value: u32) -> UnitResult { self.set_component(8, 14, value, 59, "seconds") }

    /// Overwrite the frames component. Values over 29 are rejected.
    pub fn set_frames(&mut self, value: u32) -> UnitResult { self.set_component(0, 5, value, 29, "frames") }

    /// The drop frame flag, bit 6.
    pub fn drop_frame(&self) -> bool { use bit_field::BitField; self.time_and_flags.get_bit(6) }

    /// The color frame flag, bit 7.
    pub fn color_frame(&self) -> bool { use bit_field::BitField; self.time_and_flags.get_bit(7) }

    /// The field/phase flag, bit 15.
    pub fn field_phase(&self) -> bool { use bit_field::BitField; self.time_and_flags.get_bit(15) }

    /// Binary group flag 0, bit 23.
    pub fn bgf0(&self) -> bool { use bit_field::BitField; self.time_and_flags.get_bit(23) }

    /// Binary group flag 1, bit 30.
    pub fn bgf1(&self) -> bool { use bit_field::BitField; self.time_and_flags.get_bit(30) }

    /// Binary group flag 2, bit 31.
    pub fn bgf2(&self) -> bool { use bit_field::BitField; self.time_and_flags.get_bit(31) }

    /// Overwrite the drop frame flag.
    pub fn set_drop_frame(&mut self, value: bool) { use bit_field::BitField; self.time_and_flags.set_bit(6, value); }

    /// Overwrite the color frame flag.
    pub fn set_color_frame(&mut self, value: bool) { use bit_field::BitField; self.time_and_flags.set_bit(7, value); }

    /// Overwrite the field/phase flag.
    pub fn set_field_phase(&mut self, value: bool) { use bit_field::BitField; self.time_and_flags.set_bit(15, value); }

    /// One of the eight user data groups, each four bits wide. Groups are numbered 1 to 8.
    pub fn binary_group(&self, group: usize) -> Result<u32> {
        use bit_field::BitField;

        if group < 1 || group > 8 {
            return Err(Error::InvalidTimeCodeComponent("binary group index".into()));
        }

        let low_bit = (group - 1) * 4;
        Ok(self.user_data.get_bits(low_bit .. low_bit + 4))
    }

    /// Overwrite one of the eight user data groups. Values over 15 are rejected.
    pub fn set_binary_group(&mut self, group: usize, value: u32) -> UnitResult {
        use bit_field::BitField;

        if group < 1 || group > 8 {
            return Err(Error::InvalidTimeCodeComponent("binary group index".into()));
        }

        if value > 15 {
            return Err(Error::InvalidTimeCodeComponent("binary group value".into()));
        }

        let low_bit = (group - 1) * 4;
        self.user_data.set_bits(low_bit .. low_bit + 4, value);
        Ok(())
    }

    /// Without validation, write this instance to the byte stream.
    pub fn write<W: Write>(&self, write: &mut W) -> UnitResult {
        self.time_and_flags.write(write)?;
        self.user_data.write(write)?;
        Ok(())
    }

    /// Read the value without validating.
    pub fn read<R: Read>(read: &mut R) -> Result<Self> {
        let time_and_flags = u32::read(read)?;
        let user_data = u32::read(read)?;
        Ok(Self { time_and_flags, user_data })
    }
}


impl Chromaticities {

    /// Number of bytes this value consumes in a file.
    pub fn byte_size() -> usize {
        8 * f32::BYTE_SIZE
    }

    /// Without validation, write this instance to the byte stream.
    pub fn write<W: Write>(&self, write: &mut W) -> UnitResult {
        self.red.x().write(write)?;
        self.red.y().write(write)?;

        self.green.x().write(write)?;
        self.green.y().write(write)?;

        self.blue.x().write(write)?;
        self.blue.y().write(write)?;

        self.white.x().write(write)?;
        self.white.y().write(write)?;
        Ok(())
    }

    /// Read the value without validating.
    pub fn read<R: Read>(read: &mut R) -> Result<Self> {
        Ok(Chromaticities {
            red: Vec2(f32::read(read)?, f32::read(read)?),
            green: Vec2(f32::read(read)?, f32::read(read)?),
            blue: Vec2(f32::read(read)?, f32::read(read)?),
            white: Vec2(f32::read(read)?, f32::read(read)?),
        })
    }
}


impl EnvironmentMap {

    /// Number of bytes this value consumes in a file.
    pub fn byte_size() -> usize {
        u8::BYTE_SIZE
    }

    /// Without validation, write this instance to the byte stream.
    pub fn write<W: Write>(self, write: &mut W) -> UnitResult {
        use self::EnvironmentMap::*;
        match self {
            LatLong => 0_u8,
            Cube => 1_u8,
        }.write(write)?;

        Ok(())
    }

    /// Read the value without validating.
    pub fn read<R: Read>(read: &mut R) -> Result<Self> {
        use self::EnvironmentMap::*;
        Ok(match u8::read(read)? {
            0 => LatLong,
            1 => Cube,
            _ => return Err(Error::attribute("environment map attribute value")),
        })
    }
}


impl KeyCode {

    /// Number of bytes this value consumes in a file.
    pub fn byte_size() -> usize {
        7 * i32::BYTE_SIZE
    }

    /// Without validation, write this instance to the byte stream.
    pub fn write<W: Write>(&self, write: &mut W) -> UnitResult {
        self.film_manufacturer_code.write(write)?;
        self.film_type.write(write)?;
        self.film_roll_prefix.write(write)?;
        self.count.write(write)?;
        self.perforation_offset.write(write)?;
        self.perforations_per_frame.write(write)?;
        self.perforations_per_count.write(write)?;
        Ok(())
    }

    /// Read the value without validating.
    pub fn read<R: Read>(read: &mut R) -> Result<Self> {
        Ok(KeyCode {
            film_manufacturer_code: i32::read(read)?,
            film_type: i32::read(read)?,
            film_roll_prefix: i32::read(read)?,
            count: i32::read(read)?,
            perforation_offset: i32::read(read)?,
            perforations_per_frame: i32::read(read)?,
            perforations_per_count: i32::read(read)?,
        })
    }
}


impl LineOrder {

    /// Number of bytes this value consumes in a file.
    pub fn byte_size() -> usize {
        u8::BYTE_SIZE
    }

    /// Without validation, write this instance to the byte stream.
    pub fn write<W: Write>(self, write: &mut W) -> UnitResult {
        use self::LineOrder::*;
        match self {
            IncreasingY => 0_u8,
            DecreasingY => 1_u8,
            RandomY => 2_u8,
        }.write(write)?;

        Ok(())
    }

    /// Read the value without validating.
    pub fn read<R: Read>(read: &mut R) -> Result<Self> {
        use self::LineOrder::*;
        Ok(match u8::read(read)? {
            0 => IncreasingY,
            1 => DecreasingY,
            2 => RandomY,
            _ => return Err(Error::attribute("line order attribute value")),
        })
    }
}


impl Preview {

    /// Number of bytes this value consumes in a file.
    pub fn byte_size(&self) -> usize {
        2 * u32::BYTE_SIZE + self.pixel_data.len()
    }

    /// Without validation, write this instance to the byte stream.
    pub fn write<W: Write>(&self, write: &mut W) -> UnitResult {
        u32::write(self.size.width() as u32, write)?;
        u32::write(self.size.height() as u32, write)?;

        u8::write_slice(write, &self.pixel_data)?;
        Ok(())
    }

    /// Read the value without validating.
    pub fn read<R: Read>(read: &mut R) -> Result<Self> {
        let components_per_pixel = 4;
        let width = u32::read(read)? as usize;
        let height = u32::read(read)? as usize;

        let pixel_data = u8::read_vec(
            read, width * height * components_per_pixel,
            1024 * 1024 * 4, None, "preview attribute pixel count"
        )?;

        Ok(Preview {
            size: Vec2(width, height),
            pixel_data,
        })
    }

    /// Validate that the dimensions match the pixel data length.
    pub fn validate(&self) -> UnitResult {
        if self.size.area() * 4 != self.pixel_data.len() {
            return Err(Error::attribute("preview dimensions do not match content length"));
        }

        Ok(())
    }
}

impl std::fmt::Debug for Preview {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "Preview ({}x{} px)", self.size.width(), self.size.height())
    }
}


impl TileDescription {

    /// Number of bytes this value consumes in a file.
    pub fn byte_size() -> usize {
        2 * u32::BYTE_SIZE + 1 // size x,y + (level mode + rounding mode)
    }

    /// Without validation, write this instance to the byte stream.
    pub fn write<W: Write>(&self, write: &mut W) -> UnitResult {
        u32::write(self.tile_size.width() as u32, write)?;
        u32::write(self.tile_size.height() as u32, write)?;

        let level_mode = match self.level_mode {
            LevelMode::One => 0_u8,
            LevelMode::MipMap => 1_u8,
            LevelMode::RipMap => 2_u8,
        };

        let rounding_mode = match self.rounding_mode {
            RoundingMode::Down => 0_u8,
            RoundingMode::Up => 1_u8,
        };

        // the low nibble is the level mode, the high nibble the rounding mode
        let mode: u8 = level_mode | (rounding_mode << 4);
        mode.write(write)?;
        Ok(())
    }

    /// Read the value without validating.
    pub fn read<R: Read>(read: &mut R) -> Result<Self> {
        let x_size = u32::read(read)? as usize;
        let y_size = u32::read(read)? as usize;

        let mode = u8::read(read)?;
        let level_mode = mode & 0b0000_1111;
        let rounding_mode = mode >> 4;

        let level_mode = match level_mode {
            0 => LevelMode::One,
            1 => LevelMode::MipMap,
            2 => LevelMode::RipMap,
            _ => return Err(Error::attribute("tile description level mode")),
        };

        let rounding_mode = match rounding_mode {
            0 => RoundingMode::Down,
            1 => RoundingMode::Up,
            _ => return Err(Error::attribute("tile description rounding mode")),
        };

        Ok(TileDescription { tile_size: Vec2(x_size, y_size), level_mode, rounding_mode })
    }

    /// Validate that the tile size is positive and small enough.
    pub fn validate(&self) -> UnitResult {
        let max = i64::from(i32::MAX) / 2;

        if self.tile_size.width() == 0 || self.tile_size.height() == 0
            || self.tile_size.width() as i64 >= max || self.tile_size.height() as i64 >= max
        {
            return Err(Error::attribute("tile size"));
        }

        Ok(())
    }
}


/// Number of bytes the attribute record with the specified name and value
/// consumes in a file.
pub fn byte_size(name: &Text, value: &AttributeValue) -> usize {
    name.null_terminated_byte_size()
        + value.kind_name().len() + sequence_end::byte_size()
        + i32::BYTE_SIZE // serialized byte size
        + value.byte_size()
}

/// Without validation, write the attribute record to the byte stream.
pub fn write<W: Write>(name: &[u8], value: &AttributeValue, write: &mut W) -> UnitResult {
    Text::write_null_terminated_bytes(name, write)?;
    Text::write_null_terminated_bytes(value.kind_name(), write)?;
    i32::write(usize_to_i32(value.byte_size(), "attribute size")?, write)?;
    value.write(write)
}

/// Read one attribute record. The value result may be an error even if the byte
/// source is intact, in which case the remaining attributes are still readable.
pub fn read(read: &mut PeekRead<impl Read>, max_size: usize) -> Result<(Text, Result<AttributeValue>)> {
    let name = Text::read_null_terminated(read, max_size)?;
    let kind = Text::read_null_terminated(read, max_size)?;
    let size = i32_to_usize(i32::read(read)?, "attribute size")?;
    let value = AttributeValue::read(read, kind, size)?;
    Ok((name, value))
}

/// Validate this attribute record.
pub fn validate(name: &Text, value: &AttributeValue, long_names: &mut bool, allow_sampling: bool, data_window: IntegerBounds) -> UnitResult {
    name.validate(true, Some(long_names))?; // only attribute names have a length restriction
    value.validate(allow_sampling, data_window)
}


impl AttributeValue {

    /// Number of bytes the value consumes in a file.
    pub fn byte_size(&self) -> usize {
        use self::AttributeValue::*;

        match *self {
            IntegerBounds(_) => self::IntegerBounds::byte_size(),
            FloatRect(_) => self::FloatRect::byte_size(),

            I32(_) => i32::BYTE_SIZE,
            F32(_) => f32::BYTE_SIZE,
            F64(_) => f64::BYTE_SIZE,

            Rational(_) => i32::BYTE_SIZE + u32::BYTE_SIZE,
            TimeCode(_) => self::TimeCode::BYTE_SIZE,

            IntVec2(_) => 2 * i32::BYTE_SIZE,
            FloatVec2(_) => 2 * f32::BYTE_SIZE,
            DoubleVec2(_) => 2 * f64::BYTE_SIZE,
            IntVec3(_) => 3 * i32::BYTE_SIZE,
            FloatVec3(_) => 3 * f32::BYTE_SIZE,
            DoubleVec3(_) => 3 * f64::BYTE_SIZE,

            ChannelList(ref channels) => channels.byte_size(),
            Chromaticities(_) => self::Chromaticities::byte_size(),
            Compression(_) => self::Compression::byte_size(),
            EnvironmentMap(_) => self::EnvironmentMap::byte_size(),

            KeyCode(_) => self::KeyCode::byte_size(),
            LineOrder(_) => self::LineOrder::byte_size(),

            Matrix3x3(ref value) => value.len() * f32::BYTE_SIZE,
            Matrix3x3Double(ref value) => value.len() * f64::BYTE_SIZE,
            Matrix4x4(ref value) => value.len() * f32::BYTE_SIZE,
            Matrix4x4Double(ref value) => value.len() * f64::BYTE_SIZE,

            Preview(ref value) => value.byte_size(),

            // attribute value texts are not null-terminated, as their
            // length is already stored in the attribute size field
            Text(ref value) => value.bytes.len(),

            TextVector(ref value) => value.iter().map(self::Text::i32_sized_byte_size).sum(),
            FloatVector(ref value) => value.len() * f32::BYTE_SIZE,
            TileDescription(_) => self::TileDescription::byte_size(),
            Opaque { ref bytes, .. } => bytes.len(),
        }
    }

    /// The name of the type of this value, as it appears in a file.
    pub fn kind_name(&self) -> &[u8] {
        use self::type_names as ty;
        use self::AttributeValue::*;

        match *self {
            IntegerBounds(_) => ty::I32BOX2,
            FloatRect(_) => ty::F32BOX2,
            I32(_) => ty::I32,
            F32(_) => ty::F32,
            F64(_) => ty::F64,
            Rational(_) => ty::RATIONAL,
            TimeCode(_) => ty::TIME_CODE,
            IntVec2(_) => ty::I32VEC2,
            FloatVec2(_) => ty::F32VEC2,
            DoubleVec2(_) => ty::F64VEC2,
            IntVec3(_) => ty::I32VEC3,
            FloatVec3(_) => ty::F32VEC3,
            DoubleVec3(_) => ty::F64VEC3,
            ChannelList(_) => ty::CHANNEL_LIST,
            Chromaticities(_) => ty::CHROMATICITIES,
            Compression(_) => ty::COMPRESSION,
            EnvironmentMap(_) => ty::ENVIRONMENT_MAP,
            KeyCode(_) => ty::KEY_CODE,
            LineOrder(_) => ty::LINE_ORDER,
            Matrix3x3(_) => ty::F32MATRIX3X3,
            Matrix3x3Double(_) => ty::F64MATRIX3X3,
            Matrix4x4(_) => ty::F32MATRIX4X4,
            Matrix4x4Double(_) => ty::F64MATRIX4X4,
            Preview(_) => ty::PREVIEW,
            Text(_) => ty::TEXT,
            TextVector(_) => ty::TEXT_VECTOR,
            FloatVector(_) => ty::FLOAT_VECTOR,
            TileDescription(_) => ty::TILES,
            Opaque { ref kind, .. } => kind.bytes(),
        }
    }

    /// Without validation, write the value to the byte stream.
    pub fn write<W: Write>(&self, write: &mut W) -> UnitResult {
        use self::AttributeValue::*;

        match *self {
            IntegerBounds(value) => value.write(write)?,
            FloatRect(value) => value.write(write)?,

            I32(value) => value.write(write)?,
            F32(value) => value.write(write)?,
            F64(value) => value.write(write)?,

            Rational((a, b)) => { a.write(write)?; b.write(write)?; },
            TimeCode(value) => value.write(write)?,

            IntVec2(Vec2(x, y)) => { x.write(write)?; y.write(write)?; },
            FloatVec2(Vec2(x, y)) => { x.write(write)?; y.write(write)?; },
            DoubleVec2(Vec2(x, y)) => { x.write(write)?; y.write(write)?; },
            IntVec3((x, y, z)) => { x.write(write)?; y.write(write)?; z.write(write)?; },
            FloatVec3((x, y, z)) => { x.write(write)?; y.write(write)?; z.write(write)?; },
            DoubleVec3((x, y, z)) => { x.write(write)?; y.write(write)?; z.write(write)?; },

            ChannelList(ref channels) => channels.write(write)?,
            Chromaticities(ref value) => value.write(write)?,
            Compression(value) => value.write(write)?,
            EnvironmentMap(value) => value.write(write)?,

            KeyCode(ref value) => value.write(write)?,
            LineOrder(value) => value.write(write)?,

            Matrix3x3(ref value) => f32::write_slice(write, value)?,
            Matrix3x3Double(ref value) => f64::write_slice(write, value)?,
            Matrix4x4(ref value) => f32::write_slice(write, value)?,
            Matrix4x4Double(ref value) => f64::write_slice(write, value)?,

            Preview(ref value) => value.write(write)?,

            Text(ref value) => u8::write_slice(write, value.bytes.as_slice())?,

            TextVector(ref value) => self::Text::write_vec_of_i32_sized_texts(write, value)?,
            FloatVector(ref value) => f32::write_slice(write, value)?,
            TileDescription(ref value) => value.write(write)?,
            Opaque { ref bytes, .. } => u8::write_slice(write, bytes)?,
        };

        Ok(())
    }

    /// Read a value of the specified type and size.
    /// Returns `Ok(Err(_))` for invalid attributes inside a readable byte source,
    /// so one bad attribute does not poison the rest of the header.
    pub fn read(read: &mut PeekRead<impl Read>, kind: Text, byte_size: usize) -> Result<Result<Self>> {
        use self::type_names as ty;
        use self::AttributeValue::*;

        // always read the value bytes, so the stream stays in sync
        let attribute_bytes = u8::read_vec(read, byte_size, 128, None, "attribute value size")?;

        let parse_attribute = move || {
            let reader = &mut attribute_bytes.as_slice();

            let value = match kind.bytes() {
                ty::I32BOX2 => IntegerBounds(self::IntegerBounds::read(reader)?),
                ty::F32BOX2 => FloatRect(self::FloatRect::read(reader)?),

                ty::I32 => I32(i32::read(reader)?),
                ty::F32 => F32(f32::read(reader)?),
                ty::F64 => F64(f64::read(reader)?),

                ty::RATIONAL => Rational({
                    let numerator = i32::read(reader)?;
                    let denominator = u32::read(reader)?;
                    (numerator, denominator)
                }),

                ty::TIME_CODE => TimeCode(self::TimeCode::read(reader)?),

                ty::I32VEC2 => IntVec2(Vec2(i32::read(reader)?, i32::read(reader)?)),
                ty::F32VEC2 => FloatVec2(Vec2(f32::read(reader)?, f32::read(reader)?)),
                ty::F64VEC2 => DoubleVec2(Vec2(f64::read(reader)?, f64::read(reader)?)),

                ty::I32VEC3 => IntVec3((i32::read(reader)?, i32::read(reader)?, i32::read(reader)?)),
                ty::F32VEC3 => FloatVec3((f32::read(reader)?, f32::read(reader)?, f32::read(reader)?)),
                ty::F64VEC3 => DoubleVec3((f64::read(reader)?, f64::read(reader)?, f64::read(reader)?)),

                ty::CHANNEL_LIST => ChannelList(self::ChannelList::read(&mut PeekRead::new(attribute_bytes.as_slice()))?),
                ty::CHROMATICITIES => Chromaticities(self::Chromaticities::read(reader)?),
                ty::COMPRESSION => Compression(self::Compression::read(reader)?),
                ty::ENVIRONMENT_MAP => EnvironmentMap(self::EnvironmentMap::read(reader)?),

                ty::KEY_CODE => KeyCode(self::KeyCode::read(reader)?),
                ty::LINE_ORDER => LineOrder(self::LineOrder::read(reader)?),

                ty::F32MATRIX3X3 => Matrix3x3({
                    let mut result = [0.0_f32; 9];
                    f32::read_slice(reader, &mut result)?;
                    result
                }),

                ty::F64MATRIX3X3 => Matrix3x3Double({
                    let mut result = [0.0_f64; 9];
                    f64::read_slice(reader, &mut result)?;
                    result
                }),

                ty::F32MATRIX4X4 => Matrix4x4({
                    let mut result = [0.0_f32; 16];
                    f32::read_slice(reader, &mut result)?;
                    result
                }),

                ty::F64MATRIX4X4 => Matrix4x4Double({
                    let mut result = [0.0_f64; 16];
                    f64::read_slice(reader, &mut result)?;
                    result
                }),

                ty::PREVIEW => Preview(self::Preview::read(reader)?),
                ty::TEXT => Text(self::Text::read_sized(reader, byte_size)?),

                // the number of strings is inferred from the total attribute size
                ty::TEXT_VECTOR => TextVector(self::Text::read_vec_of_i32_sized(
                    &mut attribute_bytes.as_slice(), byte_size
                )?),

                // the number of floats is inferred from the total attribute size
                ty::FLOAT_VECTOR => FloatVector({
                    if byte_size % f32::BYTE_SIZE != 0 {
                        return Err(Error::attribute("float vector byte size"));
                    }

                    let mut result = vec![ 0.0_f32; byte_size / f32::BYTE_SIZE ];
                    f32::read_slice(reader, &mut result)?;
                    result
                }),

                ty::TILES => TileDescription(self::TileDescription::read(reader)?),

                _ => return Ok(Opaque { kind: kind.clone(), bytes: attribute_bytes.clone() }),
            };

            // the fixed-size kinds must consume the attribute exactly
            match value {
                Text(_) | TextVector(_) | FloatVector(_) | ChannelList(_) | Preview(_) | Opaque { .. } => {},
                _ => if !reader.is_empty() {
                    return Err(Error::attribute("attribute size does not match its type"));
                }
            }

            Ok(value)
        };

        Ok(parse_attribute())
    }

    /// Validate this value.
    pub fn validate(&self, allow_sampling: bool, data_window: IntegerBounds) -> UnitResult {
        use self::AttributeValue::*;

        match *self {
            ChannelList(ref channels) => channels.validate(allow_sampling, data_window)?,
            TileDescription(ref value) => value.validate()?,
            Preview(ref value) => value.validate()?,

            TextVector(ref vec) => if vec.is_empty() {
                return Err(Error::attribute("text vector may not be empty"));
            },

            _ => {}
        };

        Ok(())
    }

    /// Return the `i32` if this attribute is an int.
    pub fn to_i32(&self) -> Result<i32> {
        match *self {
            AttributeValue::I32(value) => Ok(value),
            _ => Err(invalid_type()),
        }
    }

    /// Return the `f32` if this attribute is a float.
    pub fn to_f32(&self) -> Result<f32> {
        match *self {
            AttributeValue::F32(value) => Ok(value),
            _ => Err(invalid_type()),
        }
    }

    /// Return the text if this attribute is a string.
    pub fn to_text(&self) -> Result<&Text> {
        match self {
            AttributeValue::Text(value) => Ok(value),
            _ => Err(invalid_type()),
        }
    }

    /// Return the chromaticities if this attribute contains them.
    pub fn to_chromaticities(&self) -> Result<Chromaticities> {
        match *self {
            AttributeValue::Chromaticities(value) => Ok(value),
            _ => Err(invalid_type()),
        }
    }

    /// Return the time code if this attribute contains one.
    pub fn to_time_code(&self) -> Result<TimeCode> {
        match *self {
            AttributeValue::TimeCode(value) => Ok(value),
            _ => Err(invalid_type()),
        }
    }
}


/// Contains string literals identifying the type of an attribute.
pub mod type_names {
    macro_rules! define_attribute_type_names {
        ( $($name: ident : $value: expr),* ) => {
            $(
                /// The byte-string name of this attribute type as it appears in an exr file.
                pub const $name: &'static [u8] = $value;
            )*
        };
    }

    define_attribute_type_names! {
        I32BOX2:        b"box2i",
        F32BOX2:        b"box2f",
        I32:            b"int",
        F32:            b"float",
        F64:            b"double",
        RATIONAL:       b"rational",
        TIME_CODE:      b"timecode",
        I32VEC2:        b"v2i",
        F32VEC2:        b"v2f",
        F64VEC2:        b"v2d",
        I32VEC3:        b"v3i",
        F32VEC3:        b"v3f",
        F64VEC3:        b"v3d",
        CHANNEL_LIST:   b"chlist",
        CHROMATICITIES: b"chromaticities",
        COMPRESSION:    b"compression",
        ENVIRONMENT_MAP:b"envmap",
        KEY_CODE:       b"keycode",
        LINE_ORDER:     b"lineOrder",
        F32MATRIX3X3:   b"m33f",
        F64MATRIX3X3:   b"m33d",
        F32MATRIX4X4:   b"m44f",
        F64MATRIX4X4:   b"m44d",
        PREVIEW:        b"preview",
        TEXT:           b"string",
        TEXT_VECTOR:    b"stringvector",
        FLOAT_VECTOR:   b"floatvector",
        TILES:          b"tiledesc"
    }
}


#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn text_ord() {
        for _ in 0..1024 {
            let text1 = Text::from_bytes_unchecked((0..4).map(|_| rand::random::<u8>()).collect());
            let text2 = Text::from_bytes_unchecked((0..4).map(|_| rand::random::<u8>()).collect());

            assert_eq!(text1.to_string().cmp(&text2.to_string()), text1.cmp(&text2), "in text {:?} vs {:?}", text1, text2);
        }
    }

    #[test]
    fn bounds_inclusive_corners() {
        let bounds = IntegerBounds::from_corners(Vec2(0, 0), Vec2(1919, 1079));
        assert_eq!(bounds.width(), 1920);
        assert_eq!(bounds.height(), 1080);
        assert_eq!(bounds.area(), 2_073_600);
        assert!(!bounds.is_empty());

        let empty = IntegerBounds::from_corners(Vec2(10, 10), Vec2(5, 5));
        assert!(empty.is_empty());
        assert_eq!(empty.area(), 0);
    }

    #[test]
    fn time_code_bcd() {
        let code = TimeCode::new(12, 34, 56, 29).unwrap();
        assert_eq!(code.time_and_flags(TimeCodePacking::Tv60), 0x12345629);

        let code = TimeCode::new(1, 2, 3, 4).unwrap();
        assert_eq!(code.time_and_flags(TimeCodePacking::Tv60), 0x01020304);

        assert_eq!(code.hours(), 1);
        assert_eq!(code.minutes(), 2);
        assert_eq!(code.seconds(), 3);
        assert_eq!(code.frames(), 4);
    }

    #[test]
    fn time_code_component_ranges() {
        assert!(matches!(TimeCode::new(24, 0, 0, 0), Err(Error::InvalidTimeCodeComponent(_))));
        assert!(matches!(TimeCode::new(0, 60, 0, 0), Err(Error::InvalidTimeCodeComponent(_))));
        assert!(matches!(TimeCode::new(0, 0, 60, 0), Err(Error::InvalidTimeCodeComponent(_))));
        assert!(matches!(TimeCode::new(0, 0, 0, 30), Err(Error::InvalidTimeCodeComponent(_))));
        assert!(TimeCode::new(23, 59, 59, 29).is_ok());
    }

    #[test]
    fn time_code_packings_roundtrip() {
        let mut code = TimeCode::new(7, 15, 3, 12).unwrap();
        code.set_drop_frame(true);
        code.set_field_phase(true);
        code.set_binary_group(3, 9).unwrap();

        for &packing in &[TimeCodePacking::Tv60, TimeCodePacking::Tv50] {
            let word = code.time_and_flags(packing);
            let decoded = TimeCode::from_time_and_flags(word, code.user_data(), packing);
            assert_eq!(decoded, code, "packing {:?}", packing);
        }

        // film packing drops the drop-frame and color-frame bits
        let word = code.time_and_flags(TimeCodePacking::Film24);
        let decoded = TimeCode::from_time_and_flags(word, code.user_data(), TimeCodePacking::Film24);
        assert_eq!(decoded.frames(), code.frames());
        assert!(!decoded.drop_frame());
    }

    #[test]
    fn tile_description_write_read_roundtrip() {
        let tiles = [
            TileDescription {
                tile_size: Vec2(31, 7),
                level_mode: LevelMode::MipMap,
                rounding_mode: RoundingMode::Down,
            },
            TileDescription {
                tile_size: Vec2(16, 16),
                level_mode: LevelMode::One,
                rounding_mode: RoundingMode::Up,
            },
            TileDescription {
                tile_size: Vec2(1, 123),
                level_mode: LevelMode::RipMap,
                rounding_mode: RoundingMode::Down,
            },
        ];

        for tile in &tiles {
            let mut bytes = Vec::new();
            tile.write(&mut bytes).unwrap();

            let new_tile = TileDescription::read(&mut Cursor::new(bytes)).unwrap();
            assert_eq!(*tile, new_tile, "tile round trip");
        }
    }

    #[test]
    fn attribute_write_read_roundtrip_and_byte_size() {
        let attributes = [
            (
                Text::new("greeting").unwrap(),
                AttributeValue::Text(Text::new("hello").unwrap()),
            ),
            (
                Text::new("age").unwrap(),
                AttributeValue::I32(923),
            ),
            (
                Text::new("leg count").unwrap(),
                AttributeValue::F64(9.114939599234),
            ),
            (
                Text::new("rabbit area").unwrap(),
                AttributeValue::FloatRect(FloatRect {
                    min: Vec2(23.4234, 345.23),
                    max: Vec2(68623.0, 3.12425926538),
                }),
            ),
            (
                Text::new("kernel").unwrap(),
                AttributeValue::FloatVector(vec![1.0, 2.0, 1.0]),
            ),
            (
                Text::new("projection").unwrap(),
                AttributeValue::Matrix4x4Double({
                    let mut matrix = [0.0_f64; 16];
                    matrix[0] = 2.0; matrix[5] = 2.0; matrix[10] = 1.0; matrix[15] = 1.0;
                    matrix
                }),
            ),
            (
                Text::new("tests are difficult").unwrap(),
                AttributeValue::TextVector(vec![
                    Text::new("sdoifjpsdv").unwrap(),
                    Text::new("sdoifjpsdvxxxx").unwrap(),
                    Text::new("sdoifj").unwrap(),
                ]),
            ),
            (
                Text::new("a preview").unwrap(),
                AttributeValue::Preview(Preview {
                    size: Vec2(10, 30),
                    pixel_data: vec![31; 10 * 30 * 4],
                }),
            ),
            (
                Text::new("leg count, again").unwrap(),
                AttributeValue::ChannelList(ChannelList::new(smallvec![
                    ChannelDescription {
                        name: Text::new("Green").unwrap(),
                        sample_type: SampleType::F16,
                        quantize_linearly: false,
                        sampling: Vec2(1, 2),
                    },
                    ChannelDescription {
                        name: Text::new("Red").unwrap(),
                        sample_type: SampleType::F32,
                        quantize_linearly: true,
                        sampling: Vec2(1, 2),
                    },
                ])),
            ),
            (
                Text::new("unusual data").unwrap(),
                AttributeValue::Opaque {
                    kind: Text::new("secretType").unwrap(),
                    bytes: vec![92, 1, 34, 29, 1, 50],
                },
            ),
        ];

        for (name, value) in &attributes {
            let mut bytes = Vec::new();
            super::write(name.bytes(), value, &mut bytes).unwrap();
            assert_eq!(super::byte_size(name, value), bytes.len(), "attribute.byte_size() for {:?}", (name, value));

            let new_attribute = super::read(&mut PeekRead::new(Cursor::new(bytes)), 300).unwrap();
            assert_eq!((name.clone(), value.clone()), (new_attribute.0, new_attribute.1.unwrap()), "attribute round trip");
        }

        {
            let (name, value) = (
                Text::new("asdkaspfokpaosdkfpaokswdpoakpsfokaposdkf").unwrap(),
                AttributeValue::I32(0),
            );

            let mut long_names = false;
            super::validate(&name, &value, &mut long_names, false, IntegerBounds::zero()).unwrap();
            assert!(long_names);
        }
    }
}

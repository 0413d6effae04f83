
//! Describes all meta data possible in an exr file.

pub mod attribute;
pub mod header;

use smallvec::SmallVec;

use crate::error::*;
use crate::io::*;
use crate::math::*;
use crate::meta::attribute::{BlockType, LevelMode, TileDescription};
use crate::meta::header::Header;
use crate::compression::Compression;


/// Contains the complete meta data of an exr image.
/// Defines how the image is split up in the file,
/// the number and type of parts and channels,
/// and all attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct MetaData {

    /// Flags summarizing the features that must be supported to decode the file.
    pub requirements: Requirements,

    /// One header to describe each part of this file.
    pub headers: Headers,
}

/// List of `Header`s.
pub type Headers = SmallVec<[Header; 3]>;

/// List of `OffsetTable`s.
pub type OffsetTables = SmallVec<[OffsetTable; 3]>;

/// For each chunk, the byte position of its first byte in the file.
/// Chunk indices are ordered as if the line order was increasing,
/// regardless of the actual line order. A zero offset marks
/// a chunk that has not been written.
pub type OffsetTable = Vec<u64>;


/// A summary of requirements that must be met to read this exr file.
/// Includes the file format version number, which this library supports at `2`.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub struct Requirements {

    /// The file format version number, `2` for all files this library writes.
    pub file_format_version: u8,

    /// If true, this file contains exactly one part, which is tiled.
    pub is_single_layer_and_tiled: bool,

    /// Whether this file has strings longer than 31 bytes.
    /// Strings are never longer than 255 bytes.
    pub has_long_names: bool,

    /// This file contains at least one part with deep data.
    pub has_deep_data: bool,

    /// Whether this file contains multiple parts.
    pub has_multiple_parts: bool,
}


/// The first four bytes of each exr file.
/// Used to abort reading non-exr files early.
pub mod magic_number {
    use super::*;

    /// The first four bytes of each exr file.
    pub const BYTES: [u8; 4] = [0x76, 0x2f, 0x31, 0x01];

    /// Without validation, write the magic number to the byte stream.
    pub fn write(write: &mut impl Write) -> UnitResult {
        u8::write_slice(write, &self::BYTES)
    }

    /// Consume four bytes from the reader and return whether the file may be an exr file.
    pub fn is_exr(read: &mut impl Read) -> Result<bool> {
        let mut magic_num = [0; 4];
        u8::read_slice(read, &mut magic_num)?;
        Ok(magic_num == self::BYTES)
    }

    /// Validate the first four bytes of the byte stream.
    pub fn validate_exr(read: &mut impl Read) -> UnitResult {
        if self::is_exr(read)? {
            Ok(())
        }
        else {
            Err(Error::malformed("file identifier missing"))
        }
    }
}

/// A `0_u8` terminating a sequence of variable length.
pub mod sequence_end {
    use super::*;

    /// Number of bytes the terminator consumes in a file.
    pub fn byte_size() -> usize {
        1
    }

    /// Without validation, write the terminator to the byte stream.
    pub fn write<W: Write>(write: &mut W) -> UnitResult {
        0_u8.write(write)
    }

    /// Peek the next byte. If it is zero, consume it and return true.
    pub fn has_come(read: &mut PeekRead<impl Read>) -> Result<bool> {
        Ok(read.skip_if_eq(0)?)
    }
}


/// Iterates over all mip map level indices of a resolution.
pub fn mip_map_indices(round: RoundingMode, max_resolution: Vec2<usize>) -> impl Iterator<Item = usize> {
    0..compute_level_count(round, max_resolution.width().max(max_resolution.height()))
}

/// Iterates over all mip map levels of a resolution, as `(level_index, level_size)`.
pub fn mip_map_levels(round: RoundingMode, max_resolution: Vec2<usize>) -> impl Iterator<Item = (usize, Vec2<usize>)> {
    mip_map_indices(round, max_resolution).map(move |level_index| {
        let width = compute_level_size(round, max_resolution.width(), level_index);
        let height = compute_level_size(round, max_resolution.height(), level_index);
        (level_index, Vec2(width, height))
    })
}

/// Iterates over all rip map level index pairs of a resolution, with the
/// horizontal index varying fastest. This matches the order of the
/// chunks in the file.
pub fn rip_map_indices(round: RoundingMode, max_resolution: Vec2<usize>) -> impl Iterator<Item = Vec2<usize>> {
    let (width, height) = (
        compute_level_count(round, max_resolution.width()),
        compute_level_count(round, max_resolution.height()),
    );

    (0..height).flat_map(move |y_level| {
        (0..width).map(move |x_level| Vec2(x_level, y_level))
    })
}

/// Iterates over all rip map levels of a resolution, as `(level_indices, level_size)`.
pub fn rip_map_levels(round: RoundingMode, max_resolution: Vec2<usize>) -> impl Iterator<Item = (Vec2<usize>, Vec2<usize>)> {
    rip_map_indices(round, max_resolution).map(move |level_indices| {
        let width = compute_level_size(round, max_resolution.width(), level_indices.x());
        let height = compute_level_size(round, max_resolution.height(), level_indices.y());
        (level_indices, Vec2(width, height))
    })
}

/// The number of chunks a part is divided into.
/// This includes the chunks of all resolution levels.
pub fn compute_chunk_count(compression: Compression, data_size: Vec2<usize>, tiles: Option<TileDescription>) -> usize {
    if let Some(tiles) = tiles {
        let round = tiles.rounding_mode;
        let Vec2(tile_width, tile_height) = tiles.tile_size;

        match tiles.level_mode {
            LevelMode::One => {
                compute_block_count(data_size.width(), tile_width)
                    * compute_block_count(data_size.height(), tile_height)
            }

            LevelMode::MipMap => {
                mip_map_levels(round, data_size).map(|(_, Vec2(level_width, level_height))| {
                    compute_block_count(level_width, tile_width) * compute_block_count(level_height, tile_height)
                }).sum()
            }

            LevelMode::RipMap => {
                rip_map_levels(round, data_size).map(|(_, Vec2(level_width, level_height))| {
                    compute_block_count(level_width, tile_width) * compute_block_count(level_height, tile_height)
                }).sum()
            }
        }
    }
    else {
        // scan line parts never have resolution levels
        compute_block_count(data_size.height(), compression.scan_lines_per_chunk())
    }
}


impl MetaData {

    /// Create meta data, inferring the version requirements from the headers.
    pub fn new(headers: Headers) -> Self {
        MetaData {
            requirements: Requirements::infer(headers.as_slice()),
            headers,
        }
    }

    /// Read the magic number, the version field, and all headers.
    /// Does not read the offset tables.
    pub fn read_from_buffered_peekable(read: &mut PeekRead<impl Read>) -> Result<Self> {
        magic_number::validate_exr(read)?;
        let requirements = Requirements::read(read)?;
        let headers = Header::read_all(read, &requirements)?;

        let meta = MetaData { requirements, headers };
        meta.validate()?;
        Ok(meta)
    }

    /// Validate the headers and write the magic number, the version field, and all headers.
    pub fn write_validating_to_buffered(&self, write: &mut impl Write) -> UnitResult {
        self.validate()?;

        magic_number::write(write)?;
        self.requirements.write(write)?;
        Header::write_all(self.headers.as_slice(), write, self.requirements.has_multiple_parts)?;
        Ok(())
    }

    /// Read one offset table for each header. The tables follow the headers immediately.
    pub fn read_offset_tables(read: &mut impl Read, headers: &Headers) -> Result<OffsetTables> {
        headers.iter()
            .map(|header| u64::read_vec(
                read, header.chunk_count(),
                std::u16::MAX as usize, None, "offset table size"
            ))
            .collect()
    }

    /// Validate the requirements and all headers against each other.
    pub fn validate(&self) -> UnitResult {
        self.requirements.validate()?;

        if self.headers.is_empty() {
            return Err(Error::malformed("at least one part is required"));
        }

        if !self.requirements.has_multiple_parts && self.headers.len() != 1 {
            return Err(Error::malformed("multipart flag does not match part count"));
        }

        for header in &self.headers {
            header.validate(&self.requirements)?;
        }

        if self.requirements.has_multiple_parts {
            // part names must exist and be unique
            for (index, header) in self.headers.iter().enumerate() {
                let name = header.name.as_ref()
                    .ok_or_else(|| Error::malformed("missing part name in multi-part file"))?;

                let duplicate = self.headers.iter().skip(index + 1)
                    .any(|other| other.name.as_ref() == Some(name));

                if duplicate {
                    return Err(Error::malformed("duplicate part name"));
                }
            }
        }

        let tiled_single = self.headers.len() == 1
            && self.headers[0].blocks_are_tiles()
            && !self.headers[0].is_deep();

        if self.requirements.is_single_layer_and_tiled != (tiled_single && !self.requirements.has_multiple_parts) {
            return Err(Error::malformed("tiled version flag does not match header contents"));
        }

        let any_deep = self.headers.iter().any(Header::is_deep);
        if self.requirements.has_deep_data != any_deep {
            return Err(Error::malformed("deep version flag does not match header contents"));
        }

        Ok(())
    }
}


impl Requirements {

    /// Infer version requirements from the headers.
    pub fn infer(headers: &[Header]) -> Self {
        let is_multipart = headers.len() > 1;

        let first_is_flat_tiled = headers.first()
            .map_or(false, |header| header.blocks_are_tiles() && !header.is_deep());

        let any_deep = headers.iter().any(Header::is_deep);
        let has_long_names = headers.iter().any(Header::contains_long_names);

        Requirements {
            file_format_version: 2,
            is_single_layer_and_tiled: !is_multipart && first_is_flat_tiled,
            has_long_names,
            has_deep_data: any_deep,
            has_multiple_parts: is_multipart,
        }
    }

    /// Whether the file is declared to contain multiple parts. Also used for
    /// control flow, as a multi-part file may contain a single part.
    pub fn is_multipart(&self) -> bool {
        self.has_multiple_parts
    }

    /// Read the version field without validating.
    pub fn read<R: Read>(read: &mut R) -> Result<Self> {
        use bit_field::BitField;

        let version_and_flags = u32::read(read)?;

        // take the 8 least significant bits, they contain the file format version number
        let version = (version_and_flags & 0x00ff) as u8;

        // the remaining bits are treated as a set of boolean flags
        let is_single_tile = version_and_flags.get_bit(9);
        let has_long_names = version_and_flags.get_bit(10);
        let has_deep_data = version_and_flags.get_bit(11);
        let has_multiple_parts = version_and_flags.get_bit(12);

        // all other flags are reserved, a set bit means an unsupported feature
        let unknown_flags = version_and_flags >> 13;
        if unknown_flags != 0 || version_and_flags.get_bit(8) {
            return Err(Error::malformed("unknown file feature flags"));
        }

        Ok(Requirements {
            file_format_version: version,
            is_single_layer_and_tiled: is_single_tile,
            has_long_names,
            has_deep_data,
            has_multiple_parts,
        })
    }

    /// Without validation, write the version field to the byte stream.
    pub fn write<W: Write>(self, write: &mut W) -> UnitResult {
        use bit_field::BitField;

        // the 8 least significant bits contain the file format version number
        let mut version_and_flags = u32::from(self.file_format_version);

        version_and_flags.set_bit(9, self.is_single_layer_and_tiled);
        version_and_flags.set_bit(10, self.has_long_names);
        version_and_flags.set_bit(11, self.has_deep_data);
        version_and_flags.set_bit(12, self.has_multiple_parts);

        version_and_flags.write(write)?;
        Ok(())
    }

    /// Validate the flag combination.
    pub fn validate(&self) -> UnitResult {
        if self.file_format_version != 2 {
            return Err(Error::malformed("file format version must be 2"));
        }

        match (self.is_single_layer_and_tiled, self.has_deep_data, self.has_multiple_parts) {
            // single-part scan line or single-part tiled
            (_, false, false) => Ok(()),

            // multi-part, or deep single-part, or both
            (false, _, _) => Ok(()),

            // the single-part tiled flag contradicts deep data and multiple parts
            _ => Err(Error::malformed("file feature flags")),
        }
    }
}


/// Helpers shared by the engines to locate a block type from a header.
impl Header {

    /// Whether this part is divided into tiles.
    pub fn blocks_are_tiles(&self) -> bool {
        self.tiles.is_some() && self.block_type.map_or(true, |block_type| block_type.is_tiled())
    }

    /// Whether this part contains deep data.
    pub fn is_deep(&self) -> bool {
        self.block_type.map_or(false, |block_type| block_type.is_deep())
    }

    /// The block type, inferred from the tile description when the attribute is absent.
    pub fn inferred_block_type(&self) -> BlockType {
        self.block_type.unwrap_or({
            if self.tiles.is_some() { BlockType::Tile }
            else { BlockType::ScanLine }
        })
    }
}


#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn round_trip_requirements() {
        let requirements = Requirements {
            file_format_version: 2,
            is_single_layer_and_tiled: true,
            has_long_names: false,
            has_deep_data: false,
            has_multiple_parts: false,
        };

        let mut data: Vec<u8> = Vec::new();
        requirements.write(&mut data).unwrap();
        let read = Requirements::read(&mut data.as_slice()).unwrap();
        assert_eq!(requirements, read);
    }

    #[test]
    fn chunk_counts() {
        // 64 scan lines with 16 lines per chunk
        assert_eq!(compute_chunk_count(Compression::ZIP16, Vec2(100, 64), None), 4);

        // 64 scan lines with 32 lines per chunk
        assert_eq!(compute_chunk_count(Compression::PIZ, Vec2(100, 64), None), 2);

        // 32x32 at 16x16 tiles, mip mapped rounding down:
        // 4 tiles at level 0, 1 at level 1, 1 at level 2, and so on
        let tiles = TileDescription {
            tile_size: Vec2(16, 16),
            level_mode: LevelMode::MipMap,
            rounding_mode: RoundingMode::Down,
        };

        assert_eq!(compute_chunk_count(Compression::Uncompressed, Vec2(32, 32), Some(tiles)), 4 + 1 + 1 + 1 + 1 + 1);
    }

    #[test]
    fn mip_levels_of_32() {
        let levels: Vec<_> = mip_map_levels(RoundingMode::Down, Vec2(32, 32)).collect();
        assert_eq!(levels.len(), 6);
        assert_eq!(levels[0], (0, Vec2(32, 32)));
        assert_eq!(levels[2], (2, Vec2(8, 8)));
        assert_eq!(levels[5], (5, Vec2(1, 1)));
    }
}

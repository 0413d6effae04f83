
//! Read and write already compressed pixel data chunks.
//! Does not include the compression and decompression process itself.

use crate::error::*;
use crate::io::*;
use crate::math::Vec2;
use crate::meta::header::Header;
use crate::meta::MetaData;


/// A generic chunk of compressed pixel data,
/// annotated with the index of the part it belongs to.
#[derive(Debug, Clone)]
pub struct Chunk {

    /// The index of the part this chunk belongs to.
    /// Chunks of different parts may appear in any order in a file.
    pub part_index: usize,

    /// The compressed pixel contents.
    pub block: Block,
}

/// The compressed pixel data of one chunk, with its positioning information.
#[derive(Debug, Clone)]
pub enum Block {

    /// A scan line band of flat data.
    ScanLine(ScanLineChunk),

    /// One tile of flat data.
    Tile(TileChunk),

    /// A scan line band of deep data.
    DeepScanLine(DeepScanLineChunk),

    /// One tile of deep data.
    DeepTile(DeepTileChunk),
}

/// One or more compressed scan lines. Corresponds to type attribute `scanlineimage`.
#[derive(Debug, Clone)]
pub struct ScanLineChunk {

    /// The absolute pixel y coordinate of the top scan line in this chunk.
    pub y_coordinate: i32,

    /// The compressed pixel bytes: for each line, for each channel
    /// in sorted name order, the samples of that line.
    pub compressed_pixels: Vec<u8>,
}

/// One compressed tile. Corresponds to type attribute `tiledimage`.
#[derive(Debug, Clone)]
pub struct TileChunk {

    /// The position of this tile in the tile grid of its level.
    pub coordinates: TileCoordinates,

    /// The compressed pixel bytes, laid out like a scan line chunk.
    pub compressed_pixels: Vec<u8>,
}

/// The position and resolution level of a tile.
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
pub struct TileCoordinates {

    /// Index of the tile in the tile grid, not a pixel position.
    pub tile_index: Vec2<usize>,

    /// Index of the mip or rip level.
    pub level_index: Vec2<usize>,
}

/// One or more compressed deep scan lines. Corresponds to type attribute `deepscanline`.
#[derive(Debug, Clone)]
pub struct DeepScanLineChunk {

    /// The absolute pixel y coordinate of the top scan line in this chunk.
    pub y_coordinate: i32,

    /// The compressed cumulative sample count table,
    /// one `u32` per pixel of the chunk rectangle, row-major.
    pub compressed_sample_counts: Vec<u8>,

    /// The compressed sample bytes: for each pixel in row-major order,
    /// for each channel in sorted name order, all samples of that pixel.
    pub compressed_sample_data: Vec<u8>,
}

/// One compressed deep tile. Corresponds to type attribute `deeptile`.
#[derive(Debug, Clone)]
pub struct DeepTileChunk {

    /// The position of this tile in the tile grid of its level.
    pub coordinates: TileCoordinates,

    /// The compressed cumulative sample count table of this tile.
    pub compressed_sample_counts: Vec<u8>,

    /// The compressed sample bytes of this tile.
    pub compressed_sample_data: Vec<u8>,
}


impl TileCoordinates {

    /// Without validation, write this instance to the byte stream.
    pub fn write<W: Write>(&self, write: &mut W) -> UnitResult {
        i32::write(usize_to_i32(self.tile_index.x(), "tile x")?, write)?;
        i32::write(usize_to_i32(self.tile_index.y(), "tile y")?, write)?;
        i32::write(usize_to_i32(self.level_index.x(), "level x")?, write)?;
        i32::write(usize_to_i32(self.level_index.y(), "level y")?, write)?;
        Ok(())
    }

    /// Read the value without validating.
    pub fn read(read: &mut impl Read) -> Result<Self> {
        let tile_x = i32::read(read)?;
        let tile_y = i32::read(read)?;

        let level_x = i32::read(read)?;
        let level_y = i32::read(read)?;

        if level_x > 31 || level_y > 31 {
            // the largest level of a 31-level image would already
            // span the entire 32-bit integer coordinate space
            return Err(Error::malformed("level index exceeding integer maximum"));
        }

        Ok(TileCoordinates {
            tile_index: Vec2(tile_x, tile_y).to_usize("tile coordinate index")?,
            level_index: Vec2(level_x, level_y).to_usize("tile coordinate level")?,
        })
    }
}


impl ScanLineChunk {

    /// Without validation, write this instance to the byte stream.
    pub fn write<W: Write>(&self, write: &mut W) -> UnitResult {
        i32::write(self.y_coordinate, write)?;
        u8::write_i32_sized_slice(write, &self.compressed_pixels)?;
        Ok(())
    }

    /// Read the value without validating.
    pub fn read(read: &mut impl Read, max_block_byte_size: usize) -> Result<Self> {
        let y_coordinate = i32::read(read)?;
        let compressed_pixels = u8::read_i32_sized_vec(
            read, max_block_byte_size, Some(max_block_byte_size), "scan line chunk size"
        )?;

        Ok(ScanLineChunk { y_coordinate, compressed_pixels })
    }
}

impl TileChunk {

    /// Without validation, write this instance to the byte stream.
    pub fn write<W: Write>(&self, write: &mut W) -> UnitResult {
        self.coordinates.write(write)?;
        u8::write_i32_sized_slice(write, &self.compressed_pixels)?;
        Ok(())
    }

    /// Read the value without validating.
    pub fn read(read: &mut impl Read, max_block_byte_size: usize) -> Result<Self> {
        let coordinates = TileCoordinates::read(read)?;
        let compressed_pixels = u8::read_i32_sized_vec(
            read, max_block_byte_size, Some(max_block_byte_size), "tile chunk size"
        )?;

        Ok(TileChunk { coordinates, compressed_pixels })
    }
}

/// Write the two sized payloads of a deep chunk.
fn write_deep_payloads<W: Write>(write: &mut W, sample_counts: &[u8], sample_data: &[u8]) -> UnitResult {
    i64::write(sample_counts.len() as i64, write)?;
    i64::write(sample_data.len() as i64, write)?;
    u8::write_slice(write, sample_counts)?;
    u8::write_slice(write, sample_data)?;
    Ok(())
}

/// Read the two sized payloads of a deep chunk.
fn read_deep_payloads(read: &mut impl Read, max_byte_size: usize) -> Result<(Vec<u8>, Vec<u8>)> {
    let counts_size = i64_to_usize(i64::read(read)?, "deep sample count table size")?;
    let data_size = i64_to_usize(i64::read(read)?, "deep sample data size")?;

    let sample_counts = u8::read_vec(
        read, counts_size, 6 * std::u16::MAX as usize,
        Some(max_byte_size), "deep sample count table"
    )?;

    let sample_data = u8::read_vec(
        read, data_size, 6 * std::u16::MAX as usize,
        Some(max_byte_size), "deep sample data"
    )?;

    Ok((sample_counts, sample_data))
}

impl DeepScanLineChunk {

    /// Without validation, write this instance to the byte stream.
    pub fn write<W: Write>(&self, write: &mut W) -> UnitResult {
        i32::write(self.y_coordinate, write)?;
        write_deep_payloads(write, &self.compressed_sample_counts, &self.compressed_sample_data)
    }

    /// Read the value without validating.
    pub fn read(read: &mut impl Read, max_block_byte_size: usize) -> Result<Self> {
        let y_coordinate = i32::read(read)?;
        let (compressed_sample_counts, compressed_sample_data) = read_deep_payloads(read, max_block_byte_size)?;

        Ok(DeepScanLineChunk {
            y_coordinate,
            compressed_sample_counts,
            compressed_sample_data,
        })
    }
}

impl DeepTileChunk {

    /// Without validation, write this instance to the byte stream.
    pub fn write<W: Write>(&self, write: &mut W) -> UnitResult {
        self.coordinates.write(write)?;
        write_deep_payloads(write, &self.compressed_sample_counts, &self.compressed_sample_data)
    }

    /// Read the value without validating.
    pub fn read(read: &mut impl Read, max_block_byte_size: usize) -> Result<Self> {
        let coordinates = TileCoordinates::read(read)?;
        let (compressed_sample_counts, compressed_sample_data) = read_deep_payloads(read, max_block_byte_size)?;

        Ok(DeepTileChunk {
            coordinates,
            compressed_sample_counts,
            compressed_sample_data,
        })
    }
}


impl Chunk {

    /// Without validation, write this chunk to the byte stream.
    /// Multi-part files prefix every chunk with its part number.
    pub fn write(&self, write: &mut impl Write, header_count: usize) -> UnitResult {
        debug_assert!(self.part_index < header_count, "part index out of range");

        if header_count != 1 {
            usize_to_i32(self.part_index, "part index")?.write(write)?;
        }
        else {
            debug_assert_eq!(self.part_index, 0, "invalid part index of single-part file");
        }

        match self.block {
            Block::ScanLine(ref value) => value.write(write),
            Block::Tile(ref value) => value.write(write),
            Block::DeepScanLine(ref value) => value.write(write),
            Block::DeepTile(ref value) => value.write(write),
        }
    }

    /// Read a chunk, deciding the block layout from the corresponding header.
    pub fn read(read: &mut impl Read, meta_data: &MetaData) -> Result<Self> {
        let part_index = i32_to_usize(
            if meta_data.requirements.is_multipart() { i32::read(read)? }
            else { 0_i32 },
            "chunk part number"
        )?;

        let header: &Header = meta_data.headers.get(part_index)
            .ok_or_else(|| Error::malformed("chunk part number"))?;

        let max_block_byte_size = header.max_block_byte_size();

        let block = match (header.blocks_are_tiles(), header.is_deep()) {
            (false, false) => Block::ScanLine(ScanLineChunk::read(read, max_block_byte_size)?),
            (true, false) => Block::Tile(TileChunk::read(read, max_block_byte_size)?),
            (false, true) => Block::DeepScanLine(DeepScanLineChunk::read(read, max_block_byte_size)?),
            (true, true) => Block::DeepTile(DeepTileChunk::read(read, max_block_byte_size)?),
        };

        Ok(Chunk { part_index, block })
    }
}

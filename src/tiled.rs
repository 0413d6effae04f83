
//! Reading and writing of flat tiled images,
//! optionally containing mip map or rip map resolution levels.

use crate::block::chunk::{Chunk, Block, TileChunk, TileCoordinates};
use crate::block::{block_pixel_rect, chunk_index, gather_channel_bytes, level_size, scatter_channel_bytes, tile_count};
use crate::compression::DEFAULT_ZIP_LEVEL;
use crate::error::*;
use crate::frame::FrameBuffer;
use crate::io::*;
use crate::math::Vec2;
use crate::meta::attribute::{BlockType, ChannelList, IntegerBounds};
use crate::meta::header::Header;
use crate::meta::{MetaData, OffsetTable};


/// Writes a single-part flat tiled image.
/// Tiles of any level can be written in any order;
/// the offset table is finalized on `finish`.
#[derive(Debug)]
#[must_use]
pub struct TiledWriter<W: Write + Seek> {
    writer: Tracking<W>,
    header: Header,
    sorted_channels: ChannelList,
    offset_table: OffsetTable,
    offset_table_position: usize,
    zip_level: u8,
}

impl<W: Write + Seek> TiledWriter<W> {

    /// Write the meta data of the specified header and reserve the offset table.
    /// The header must describe a flat tiled part.
    pub fn new(write: W, header: Header) -> Result<Self> {
        if header.tiles.is_none() || header.is_deep() {
            return Err(Error::unsupported("tiled writer requires a flat tiled header"));
        }

        let header = if header.block_type.is_none() { header.with_block_type(BlockType::Tile) }
            else { header };

        let meta = MetaData::new(smallvec![ header ]);
        let mut writer = Tracking::new(write);
        meta.write_validating_to_buffered(&mut writer)?;

        let header = meta.headers.into_iter().next().expect("meta data contains the header");
        let chunk_count = header.chunk_count();

        let offset_table_position = writer.byte_position();
        let offset_table = vec![0_u64; chunk_count];
        u64::write_slice(&mut writer, &offset_table)?;

        Ok(Self {
            sorted_channels: header.channels.sorted_for_file(),
            writer,
            header,
            offset_table,
            offset_table_position,
            zip_level: DEFAULT_ZIP_LEVEL,
        })
    }

    /// The header of the image being written.
    pub fn header(&self) -> &Header { &self.header }

    /// Override the zlib level used by the zip family and pxr24.
    pub fn set_zip_compression_level(&mut self, level: u8) {
        debug_assert!((1..=9).contains(&level), "zlib level out of range");
        self.zip_level = level;
    }

    /// The pixel rectangle of the specified level,
    /// which the level frame buffer must be addressed with.
    pub fn level_bounds(&self, level: Vec2<usize>) -> Result<IntegerBounds> {
        Ok(IntegerBounds::new(self.header.data_window.position, level_size(&self.header, level)?))
    }

    /// Compress and write one tile from the frame buffer of its level.
    pub fn write_tile(&mut self, frame_buffer: &FrameBuffer, coordinates: TileCoordinates) -> UnitResult {
        let rect = block_pixel_rect(&self.header, coordinates)?;
        let uncompressed = gather_channel_bytes(&self.sorted_channels, frame_buffer, rect)?;

        let compressed = self.header.compression.compress_chunk(
            &self.sorted_channels, uncompressed, rect, self.zip_level
        )?;

        let index = chunk_index(&self.header, coordinates)?;

        if self.offset_table[index] != 0 {
            return Err(Error::out_of_range("tile is already written"));
        }

        self.offset_table[index] = self.writer.byte_position() as u64;

        let chunk = Chunk {
            part_index: 0,
            block: Block::Tile(TileChunk {
                coordinates,
                compressed_pixels: compressed,
            }),
        };

        chunk.write(&mut self.writer, 1)
    }

    /// Compress and write all tiles of one level,
    /// row by row from top to bottom.
    pub fn write_level(&mut self, frame_buffer: &FrameBuffer, level: Vec2<usize>) -> UnitResult {
        let tile_count = tile_count(&self.header, level)?;

        for tile_y in 0..tile_count.y() {
            for tile_x in 0..tile_count.x() {
                self.write_tile(frame_buffer, TileCoordinates {
                    tile_index: Vec2(tile_x, tile_y),
                    level_index: level,
                })?;
            }
        }

        Ok(())
    }

    /// Seek back to the reserved space and store the final offset table.
    pub fn finish(mut self) -> Result<W> {
        if self.offset_table.iter().any(|&offset| offset == 0) {
            return Err(Error::malformed("not all tiles have been written"));
        }

        let file_end = self.writer.byte_position();
        self.writer.seek_write_to(self.offset_table_position)?;
        u64::write_slice(&mut self.writer, &self.offset_table)?;

        self.writer.seek_write_to(file_end)?;
        self.writer.flush()?;
        Ok(self.writer.into_inner())
    }
}


/// Reads a single-part flat tiled image.
/// Tiles of any level can be read in any order through the offset table.
#[derive(Debug)]
pub struct TiledReader<R: Read + Seek> {
    reader: Tracking<R>,
    meta: MetaData,
    offset_table: OffsetTable,
}

impl<R: Read + Seek> TiledReader<R> {

    /// Parse the meta data and the offset table.
    /// The file must contain a single flat tiled part.
    pub fn new(read: R) -> Result<Self> {
        let mut reader = Tracking::new(read);

        let mut peekable = PeekRead::new(&mut reader);
        let meta = MetaData::read_from_buffered_peekable(&mut peekable)?;

        if meta.headers.len() != 1 {
            return Err(Error::unsupported("tiled reader requires a single-part file"));
        }

        let header = &meta.headers[0];
        if !header.blocks_are_tiles() || header.is_deep() {
            return Err(Error::unsupported("tiled reader requires a flat tiled part"));
        }

        let mut tables = MetaData::read_offset_tables(&mut peekable, &meta.headers)?;
        let offset_table = tables.pop().expect("one header implies one table");

        Ok(Self { reader, meta, offset_table })
    }

    /// The header of the image being read.
    pub fn header(&self) -> &Header { &self.meta.headers[0] }

    /// The parsed meta data of the file.
    pub fn meta_data(&self) -> &MetaData { &self.meta }

    /// The pixel rectangle of the specified level,
    /// which the level frame buffer must be addressed with.
    pub fn level_bounds(&self, level: Vec2<usize>) -> Result<IntegerBounds> {
        Ok(IntegerBounds::new(self.header().data_window.position, level_size(self.header(), level)?))
    }

    /// The number of tile columns and rows of the specified level.
    pub fn tile_count(&self, level: Vec2<usize>) -> Result<Vec2<usize>> {
        tile_count(self.header(), level)
    }

    /// Read one tile into the frame buffer of its level.
    pub fn read_tile(&mut self, frame_buffer: &mut FrameBuffer, coordinates: TileCoordinates) -> UnitResult {
        let header = &self.meta.headers[0];
        let rect = block_pixel_rect(header, coordinates)?;
        let index = chunk_index(header, coordinates)?;

        let offset = *self.offset_table.get(index)
            .ok_or_else(|| Error::out_of_range("chunk index"))?;

        if offset == 0 {
            return Err(Error::malformed("tile is missing from the file"));
        }

        self.reader.seek_read_to(u64_to_usize(offset, "chunk offset")?)?;
        let chunk = TileChunk::read(&mut self.reader, header.max_block_byte_size())?;

        if chunk.coordinates != coordinates {
            return Err(Error::malformed("tile does not match its offset table entry"));
        }

        let sorted_channels = header.channels.sorted_for_file();
        let decompressed = header.compression.decompress_chunk(
            &sorted_channels, chunk.compressed_pixels, rect
        )?;

        scatter_channel_bytes(&sorted_channels, frame_buffer, rect, &decompressed, None)
    }

    /// Read all tiles of one level into the frame buffer of that level.
    pub fn read_level(&mut self, frame_buffer: &mut FrameBuffer, level: Vec2<usize>) -> UnitResult {
        let tile_count = tile_count(self.header(), level)?;

        for tile_y in 0..tile_count.y() {
            for tile_x in 0..tile_count.x() {
                self.read_tile(frame_buffer, TileCoordinates {
                    tile_index: Vec2(tile_x, tile_y),
                    level_index: level,
                })?;
            }
        }

        Ok(())
    }

    /// The raw offset table of the file.
    pub fn offset_table(&self) -> &[u64] {
        &self.offset_table
    }
}


#[cfg(test)]
mod test {
    use super::*;
    use crate::compression::Compression;
    use crate::math::RoundingMode;
    use crate::meta::attribute::*;
    use std::io::Cursor;

    fn tiled_header(size: Vec2<usize>, tile: usize, mode: LevelMode, compression: Compression) -> Header {
        Header::new(
            ChannelList::new(smallvec![
                ChannelDescription::new(Text::new("G").unwrap(), SampleType::F16, false),
            ]),
            IntegerBounds::from_dimensions(size),
        ).with_tiles(TileDescription {
            tile_size: Vec2(tile, tile),
            level_mode: mode,
            rounding_mode: RoundingMode::Down,
        }).with_compression(compression)
    }

    #[test]
    fn single_level_roundtrip() {
        let header = tiled_header(Vec2(21, 13), 8, LevelMode::One, Compression::ZIP16);

        let mut frame_buffer = FrameBuffer::alloc(&header.channels, header.data_window);
        let green = Text::new("G").unwrap();

        for y in 0..13 { for x in 0..21 {
            frame_buffer.get_mut(&green).unwrap().set(x, y, (x as f32) * 0.125 + (y as f32));
        } }

        let mut writer = TiledWriter::new(Cursor::new(Vec::new()), header).unwrap();
        writer.write_level(&frame_buffer, Vec2(0, 0)).unwrap();
        let bytes = writer.finish().unwrap().into_inner();

        let mut reader = TiledReader::new(Cursor::new(bytes)).unwrap();
        let mut read_buffer = FrameBuffer::alloc(&reader.header().channels, reader.header().data_window);
        reader.read_level(&mut read_buffer, Vec2(0, 0)).unwrap();

        assert_eq!(frame_buffer, read_buffer);
    }

    #[test]
    fn mip_map_level_count_and_deepest_level() {
        let header = tiled_header(Vec2(32, 32), 16, LevelMode::MipMap, Compression::Uncompressed);
        assert_eq!(header.chunk_count(), 4 + 1 + 1 + 1 + 1 + 1);

        let mut writer = TiledWriter::new(Cursor::new(Vec::new()), header).unwrap();

        // write a constant value at every level
        for level in 0..6 {
            let level = Vec2(level, level);
            let bounds = writer.level_bounds(level).unwrap();
            let mut level_buffer = FrameBuffer::alloc(&writer.header().channels, bounds);

            let green = Text::new("G").unwrap();
            for y in bounds.position.y()..bounds.end().y() {
                for x in bounds.position.x()..bounds.end().x() {
                    level_buffer.get_mut(&green).unwrap().set(x, y, 0.5_f32);
                }
            }

            writer.write_level(&level_buffer, level).unwrap();
        }

        let bytes = writer.finish().unwrap().into_inner();

        let mut reader = TiledReader::new(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.offset_table().len(), 9);

        // the deepest level is a single 1x1 tile
        let deepest = Vec2(5, 5);
        let bounds = reader.level_bounds(deepest).unwrap();
        assert_eq!(bounds.size, Vec2(1, 1));

        let mut level_buffer = FrameBuffer::alloc(&reader.header().channels, bounds);
        reader.read_level(&mut level_buffer, deepest).unwrap();

        assert_eq!(level_buffer.get(&Text::new("G").unwrap()).unwrap().get_f32(0, 0), 0.5);
    }

    #[test]
    fn rip_map_roundtrip() {
        let header = tiled_header(Vec2(16, 8), 8, LevelMode::RipMap, Compression::RLE);

        // 5 * 4 level combinations
        let mut writer = TiledWriter::new(Cursor::new(Vec::new()), header).unwrap();

        for level_y in 0..4 {
            for level_x in 0..5 {
                let level = Vec2(level_x, level_y);
                let bounds = writer.level_bounds(level).unwrap();
                let mut level_buffer = FrameBuffer::alloc(&writer.header().channels, bounds);

                let green = Text::new("G").unwrap();
                for y in bounds.position.y()..bounds.end().y() {
                    for x in bounds.position.x()..bounds.end().x() {
                        level_buffer.get_mut(&green).unwrap()
                            .set(x, y, (level_x * 10 + level_y) as f32);
                    }
                }

                writer.write_level(&level_buffer, level).unwrap();
            }
        }

        let bytes = writer.finish().unwrap().into_inner();

        let mut reader = TiledReader::new(Cursor::new(bytes)).unwrap();

        let level = Vec2(2, 1);
        let bounds = reader.level_bounds(level).unwrap();
        assert_eq!(bounds.size, Vec2(4, 4));

        let mut level_buffer = FrameBuffer::alloc(&reader.header().channels, bounds);
        reader.read_level(&mut level_buffer, level).unwrap();

        assert_eq!(level_buffer.get(&Text::new("G").unwrap()).unwrap().get_f32(0, 0), 21.0);
    }

    #[test]
    fn missing_tile_is_detected() {
        let header = tiled_header(Vec2(16, 16), 8, LevelMode::One, Compression::Uncompressed);

        let frame_buffer = FrameBuffer::alloc(&header.channels, header.data_window);
        let mut writer = TiledWriter::new(Cursor::new(Vec::new()), header).unwrap();

        // write only one of the four tiles
        writer.write_tile(&frame_buffer, TileCoordinates {
            tile_index: Vec2(0, 0), level_index: Vec2(0, 0),
        }).unwrap();

        assert!(writer.finish().is_err());
    }
}


//! Reading and writing of flat scan line images.
//! The writer reserves a zeroed offset table and revisits it on `finish`,
//! so an aborted write leaves a file that readers can detect as incomplete.

use crate::block::chunk::{Chunk, Block, ScanLineChunk, TileCoordinates};
use crate::block::{blocks_increasing_y, block_pixel_rect, gather_channel_bytes, scatter_channel_bytes, BlockIndex};
use crate::compression::DEFAULT_ZIP_LEVEL;
use crate::error::*;
use crate::frame::FrameBuffer;
use crate::io::*;
use crate::math::{compute_block_count, div_p, Vec2};
use crate::meta::attribute::{ChannelList, LineOrder};
use crate::meta::header::Header;
use crate::meta::{MetaData, OffsetTable};


/// Writes a single-part flat scan line image.
/// The header and the zeroed offset table are written on construction,
/// the chunks during `write_pixels`, and the final table on `finish`.
#[derive(Debug)]
#[must_use]
pub struct ScanlineWriter<W: Write + Seek> {
    writer: Tracking<W>,
    header: Header,
    sorted_channels: ChannelList,
    offset_table: OffsetTable,
    offset_table_position: usize,
    zip_level: u8,
}

impl<W: Write + Seek> ScanlineWriter<W> {

    /// Write the meta data of the specified header and reserve the offset table.
    /// The header must describe a flat scan line part.
    pub fn new(write: W, header: Header) -> Result<Self> {
        if header.blocks_are_tiles() || header.is_deep() {
            return Err(Error::unsupported("scan line writer requires a flat scan line header"));
        }

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

    /// Compress and write all pixels of the data window.
    /// Chunks are placed in the file following the line order of the header.
    pub fn write_pixels(&mut self, frame_buffer: &FrameBuffer) -> UnitResult {
        frame_buffer.validate_for(&self.header.channels)?;

        let blocks = blocks_increasing_y(&self.header)?;

        let ordered: Vec<BlockIndex> = match self.header.line_order {
            LineOrder::DecreasingY => blocks.into_iter().rev().collect(),
            _ => blocks,
        };

        for block in ordered {
            self.write_block(frame_buffer, block)?;
        }

        Ok(())
    }

    fn write_block(&mut self, frame_buffer: &FrameBuffer, block: BlockIndex) -> UnitResult {
        let uncompressed = gather_channel_bytes(&self.sorted_channels, frame_buffer, block.pixel_rect)?;

        let compressed = self.header.compression.compress_chunk(
            &self.sorted_channels, uncompressed, block.pixel_rect, self.zip_level
        )?;

        let chunk_index = block.coordinates.tile_index.y();
        debug_assert_eq!(self.offset_table[chunk_index], 0, "chunk is already written");
        self.offset_table[chunk_index] = self.writer.byte_position() as u64;

        let chunk = Chunk {
            part_index: 0,
            block: Block::ScanLine(ScanLineChunk {
                y_coordinate: block.pixel_rect.position.y(),
                compressed_pixels: compressed,
            }),
        };

        chunk.write(&mut self.writer, 1)
    }

    /// Seek back to the reserved space and store the final offset table.
    /// Consumes the writer, so the table cannot be finalized twice.
    pub fn finish(mut self) -> Result<W> {
        if self.offset_table.iter().any(|&offset| offset == 0) {
            return Err(Error::malformed("not all chunks have been written"));
        }

        let file_end = self.writer.byte_position();
        self.writer.seek_write_to(self.offset_table_position)?;
        u64::write_slice(&mut self.writer, &self.offset_table)?;

        self.writer.seek_write_to(file_end)?;
        self.writer.flush()?;
        Ok(self.writer.into_inner())
    }
}


/// Reads a single-part flat scan line image.
/// Chunks are located through the offset table, so scan line bands
/// can be read in any order, and one corrupt chunk leaves
/// all other chunks accessible.
#[derive(Debug)]
pub struct ScanlineReader<R: Read + Seek> {
    reader: Tracking<R>,
    meta: MetaData,
    offset_table: OffsetTable,
}

impl<R: Read + Seek> ScanlineReader<R> {

    /// Parse the meta data and the offset table.
    /// The file must contain a single flat scan line part.
    pub fn new(read: R) -> Result<Self> {
        let mut reader = Tracking::new(read);

        let mut peekable = PeekRead::new(&mut reader);
        let meta = MetaData::read_from_buffered_peekable(&mut peekable)?;

        if meta.headers.len() != 1 {
            return Err(Error::unsupported("scan line reader requires a single-part file"));
        }

        let header = &meta.headers[0];
        if header.blocks_are_tiles() || header.is_deep() {
            return Err(Error::unsupported("scan line reader requires a flat scan line part"));
        }

        let mut tables = MetaData::read_offset_tables(&mut peekable, &meta.headers)?;
        let offset_table = tables.pop().expect("one header implies one table");

        Ok(Self { reader, meta, offset_table })
    }

    /// The header of the image being read.
    pub fn header(&self) -> &Header { &self.meta.headers[0] }

    /// The parsed meta data of the file.
    pub fn meta_data(&self) -> &MetaData { &self.meta }

    /// Read all scan lines of the data window into the frame buffer.
    pub fn read_all_pixels(&mut self, frame_buffer: &mut FrameBuffer) -> UnitResult {
        let data_window = self.header().data_window;
        self.read_pixels(frame_buffer, data_window.position.y(), data_window.max().y())
    }

    /// Read all scan lines intersecting the inclusive range `min_y ..= max_y`.
    /// Every intersecting chunk is decompressed in full, and the
    /// relevant lines are stored into the frame buffer.
    pub fn read_pixels(&mut self, frame_buffer: &mut FrameBuffer, min_y: i32, max_y: i32) -> UnitResult {
        let header = &self.meta.headers[0];
        let data_window = header.data_window;

        if min_y > max_y || min_y < data_window.position.y() || max_y > data_window.max().y() {
            return Err(Error::out_of_range("scan line range"));
        }

        let lines_per_chunk = header.compression.scan_lines_per_chunk() as i32;

        let first_chunk = div_p(min_y - data_window.position.y(), lines_per_chunk);
        let last_chunk = div_p(max_y - data_window.position.y(), lines_per_chunk);

        let sorted_channels = header.channels.sorted_for_file();

        for chunk_index in first_chunk..=last_chunk {
            let chunk_index = chunk_index as usize;

            let coordinates = TileCoordinates {
                tile_index: Vec2(0, chunk_index),
                level_index: Vec2(0, 0),
            };

            let rect = block_pixel_rect(header, coordinates)?;

            let offset = *self.offset_table.get(chunk_index)
                .ok_or_else(|| Error::out_of_range("chunk index"))?;

            if offset == 0 {
                // this chunk was never written, other chunks may still be intact
                return Err(Error::malformed("chunk is missing from the file"));
            }

            self.reader.seek_read_to(u64_to_usize(offset, "chunk offset")?)?;
            let chunk = ScanLineChunk::read(&mut self.reader, header.max_block_byte_size())?;

            if chunk.y_coordinate != rect.position.y() {
                return Err(Error::malformed("chunk does not match its offset table entry"));
            }

            let decompressed = header.compression.decompress_chunk(
                &sorted_channels, chunk.compressed_pixels, rect
            )?;

            scatter_channel_bytes(
                &sorted_channels, frame_buffer, rect,
                &decompressed, Some((min_y, max_y))
            )?;
        }

        Ok(())
    }

    /// The number of scan line chunks in this file.
    pub fn chunk_count(&self) -> usize {
        compute_block_count(
            self.header().data_window.size.height(),
            self.header().compression.scan_lines_per_chunk()
        )
    }

    /// The raw offset table of the file.
    pub fn offset_table(&self) -> &[u64] {
        &self.offset_table
    }
}

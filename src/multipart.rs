
//! Reading and writing of files with multiple parts, each part
//! carrying its own header, offset table and chunk stream.

use crate::block::chunk::{Block, Chunk, DeepScanLineChunk, ScanLineChunk, TileChunk, TileCoordinates};
use crate::block::{blocks_increasing_y, block_pixel_rect, chunk_index, level_size, tile_count};
use crate::compression::DEFAULT_ZIP_LEVEL;
use crate::error::*;
use crate::frame::deep::DeepFrameBuffer;
use crate::frame::FrameBuffer;
use crate::io::*;
use crate::math::Vec2;
use crate::meta::attribute::{ChannelList, IntegerBounds, LineOrder, Text};
use crate::meta::header::Header;
use crate::meta::{MetaData, OffsetTable, OffsetTables};


/// The components of a dotted channel name, such as `layer.left.R`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelName {

    /// The layer prefix of the channel, empty for top-level channels.
    pub layer: Option<Text>,

    /// The view the channel belongs to, if the name contains
    /// one of the views of the file.
    pub view: Option<Text>,

    /// The plain component, such as `R` or `Z`.
    pub component: Text,
}

/// Split a dotted channel name into layer, view and component.
/// The view set of the file decides whether the second-to-last
/// segment is a view or part of the layer name.
pub fn parse_channel_name(name: &Text, views: &[Text]) -> ChannelName {
    let bytes = name.bytes();
    let segments: Vec<&[u8]> = bytes.split(|&byte| byte == b'.').collect();

    let component = Text::from_slice_unchecked(segments.last().expect("split yields at least one segment"));

    if segments.len() == 1 {
        return ChannelName { layer: None, view: None, component };
    }

    let candidate_view = Text::from_slice_unchecked(segments[segments.len() - 2]);
    let is_view = views.iter().any(|view| view == &candidate_view);

    let layer_segments = &segments[.. segments.len() - if is_view { 2 } else { 1 }];

    let layer = if layer_segments.is_empty() { None } else {
        Some(Text::from_slice_unchecked(&layer_segments.join(&b'.')))
    };

    ChannelName {
        layer,
        view: if is_view { Some(candidate_view) } else { None },
        component,
    }
}


/// Writes a file with multiple parts. All headers are written up front;
/// the chunks of the parts may then be written in any part order.
#[derive(Debug)]
#[must_use]
pub struct MultiPartWriter<W: Write + Seek> {
    writer: Tracking<W>,
    meta: MetaData,
    sorted_channels: Vec<ChannelList>,
    offset_tables: Vec<OffsetTable>,
    offset_tables_position: usize,
    zip_level: u8,
}

impl<W: Write + Seek> MultiPartWriter<W> {

    /// Write the meta data of all parts and reserve their offset tables.
    /// Every header needs a part type and a unique part name.
    pub fn new(write: W, headers: Vec<Header>) -> Result<Self> {
        let meta = MetaData::new(headers.into_iter().collect());

        let mut writer = Tracking::new(write);
        meta.write_validating_to_buffered(&mut writer)?;

        let offset_tables_position = writer.byte_position();
        let mut offset_tables = Vec::with_capacity(meta.headers.len());

        for header in &meta.headers {
            let table = vec![0_u64; header.chunk_count()];
            u64::write_slice(&mut writer, &table)?;
            offset_tables.push(table);
        }

        Ok(Self {
            sorted_channels: meta.headers.iter().map(|header| header.channels.sorted_for_file()).collect(),
            writer,
            meta,
            offset_tables,
            offset_tables_position,
            zip_level: DEFAULT_ZIP_LEVEL,
        })
    }

    /// The number of parts being written.
    pub fn part_count(&self) -> usize { self.meta.headers.len() }

    /// The header of the specified part.
    pub fn header(&self, part_index: usize) -> &Header { &self.meta.headers[part_index] }

    /// Override the zlib level used by the zip family and pxr24.
    pub fn set_zip_compression_level(&mut self, level: u8) {
        debug_assert!((1..=9).contains(&level), "zlib level out of range");
        self.zip_level = level;
    }

    fn record_chunk_offset(&mut self, part_index: usize, chunk_index: usize) -> UnitResult {
        let slot = self.offset_tables[part_index].get_mut(chunk_index)
            .ok_or_else(|| Error::out_of_range("chunk index"))?;

        if *slot != 0 {
            return Err(Error::out_of_range("chunk is already written"));
        }

        *slot = self.writer.byte_position() as u64;
        Ok(())
    }

    /// Compress and write all pixels of a flat scan line part.
    pub fn write_pixels(&mut self, part_index: usize, frame_buffer: &FrameBuffer) -> UnitResult {
        let header = self.meta.headers.get(part_index)
            .ok_or_else(|| Error::out_of_range("part index"))?
            .clone();

        if header.blocks_are_tiles() || header.is_deep() {
            return Err(Error::unsupported("part is not a flat scan line part"));
        }

        frame_buffer.validate_for(&header.channels)?;

        let blocks = blocks_increasing_y(&header)?;
        let blocks: Vec<_> = match header.line_order {
            LineOrder::DecreasingY => blocks.into_iter().rev().collect(),
            _ => blocks,
        };

        let header_count = self.meta.headers.len();

        for block in blocks {
            let uncompressed = gather_bytes(&self.sorted_channels[part_index], frame_buffer, block.pixel_rect)?;

            let compressed = header.compression.compress_chunk(
                &self.sorted_channels[part_index], uncompressed, block.pixel_rect, self.zip_level
            )?;

            self.record_chunk_offset(part_index, block.coordinates.tile_index.y())?;

            Chunk {
                part_index,
                block: Block::ScanLine(ScanLineChunk {
                    y_coordinate: block.pixel_rect.position.y(),
                    compressed_pixels: compressed,
                }),
            }.write(&mut self.writer, header_count)?;
        }

        Ok(())
    }

    /// Compress and write all tiles of one level of a flat tiled part.
    pub fn write_level(&mut self, part_index: usize, frame_buffer: &FrameBuffer, level: Vec2<usize>) -> UnitResult {
        let header = self.meta.headers.get(part_index)
            .ok_or_else(|| Error::out_of_range("part index"))?
            .clone();

        if !header.blocks_are_tiles() || header.is_deep() {
            return Err(Error::unsupported("part is not a flat tiled part"));
        }

        let tiles = tile_count(&header, level)?;
        let header_count = self.meta.headers.len();

        for tile_y in 0..tiles.y() {
            for tile_x in 0..tiles.x() {
                let coordinates = TileCoordinates { tile_index: Vec2(tile_x, tile_y), level_index: level };
                let rect = block_pixel_rect(&header, coordinates)?;

                let uncompressed = gather_bytes(&self.sorted_channels[part_index], frame_buffer, rect)?;

                let compressed = header.compression.compress_chunk(
                    &self.sorted_channels[part_index], uncompressed, rect, self.zip_level
                )?;

                self.record_chunk_offset(part_index, chunk_index(&header, coordinates)?)?;

                Chunk {
                    part_index,
                    block: Block::Tile(TileChunk {
                        coordinates,
                        compressed_pixels: compressed,
                    }),
                }.write(&mut self.writer, header_count)?;
            }
        }

        Ok(())
    }

    /// Compress and write all deep pixels of a deep scan line part.
    pub fn write_deep_pixels(&mut self, part_index: usize, deep: &DeepFrameBuffer) -> UnitResult {
        let header = self.meta.headers.get(part_index)
            .ok_or_else(|| Error::out_of_range("part index"))?
            .clone();

        if header.blocks_are_tiles() || !header.is_deep() {
            return Err(Error::unsupported("part is not a deep scan line part"));
        }

        if deep.bounds() != header.data_window {
            return Err(Error::frame_buffer("deep frame buffer does not match the data window"));
        }

        let header_count = self.meta.headers.len();

        for block in blocks_increasing_y(&header)? {
            let (counts, samples) = crate::deep::pack_and_compress_deep_chunk(
                &header, &self.sorted_channels[part_index], deep, block.pixel_rect, self.zip_level
            )?;

            self.record_chunk_offset(part_index, block.coordinates.tile_index.y())?;

            Chunk {
                part_index,
                block: Block::DeepScanLine(DeepScanLineChunk {
                    y_coordinate: block.pixel_rect.position.y(),
                    compressed_sample_counts: counts,
                    compressed_sample_data: samples,
                }),
            }.write(&mut self.writer, header_count)?;
        }

        Ok(())
    }

    /// Seek back to the reserved space and store all offset tables.
    pub fn finish(mut self) -> Result<W> {
        if self.offset_tables.iter().flatten().any(|&offset| offset == 0) {
            return Err(Error::malformed("not all chunks have been written"));
        }

        let file_end = self.writer.byte_position();
        self.writer.seek_write_to(self.offset_tables_position)?;

        for table in &self.offset_tables {
            u64::write_slice(&mut self.writer, table)?;
        }

        self.writer.seek_write_to(file_end)?;
        self.writer.flush()?;
        Ok(self.writer.into_inner())
    }
}

fn gather_bytes(sorted_channels: &ChannelList, frame_buffer: &FrameBuffer, rect: IntegerBounds) -> Result<Vec<u8>> {
    crate::block::gather_channel_bytes(sorted_channels, frame_buffer, rect)
}


/// Reads a file with one or more parts.
#[derive(Debug)]
pub struct MultiPartReader<R: Read + Seek> {
    reader: Tracking<R>,
    meta: MetaData,
    offset_tables: OffsetTables,
}

impl<R: Read + Seek> MultiPartReader<R> {

    /// Parse the meta data and the offset tables of all parts.
    pub fn new(read: R) -> Result<Self> {
        let mut reader = Tracking::new(read);

        let mut peekable = PeekRead::new(&mut reader);
        let meta = MetaData::read_from_buffered_peekable(&mut peekable)?;
        let offset_tables = MetaData::read_offset_tables(&mut peekable, &meta.headers)?;

        Ok(Self { reader, meta, offset_tables })
    }

    /// The number of parts in this file.
    pub fn part_count(&self) -> usize { self.meta.headers.len() }

    /// The header of the specified part.
    pub fn header(&self, part_index: usize) -> &Header { &self.meta.headers[part_index] }

    /// The parsed meta data of the file.
    pub fn meta_data(&self) -> &MetaData { &self.meta }

    /// The index of the part with the specified name.
    pub fn find_part(&self, name: &Text) -> Option<usize> {
        self.meta.headers.iter().position(|header| header.name.as_ref() == Some(name))
    }

    /// The view names of a multi-view file: the `multiView` attribute
    /// if present, otherwise the `view` attributes of all parts.
    pub fn views(&self) -> Vec<Text> {
        if let Some(multi_view) = self.meta.headers.iter().find_map(|header| header.multi_view.as_ref()) {
            return multi_view.clone();
        }

        let mut views = Vec::new();
        for header in &self.meta.headers {
            if let Some(view) = &header.view {
                if !views.contains(view) { views.push(view.clone()); }
            }
        }

        views
    }

    /// Whether this file contains more than one view.
    pub fn is_multi_view(&self) -> bool {
        self.views().len() > 1
    }

    /// The pixel rectangle of the specified level of a tiled part.
    pub fn level_bounds(&self, part_index: usize, level: Vec2<usize>) -> Result<IntegerBounds> {
        let header = &self.meta.headers[part_index];
        Ok(IntegerBounds::new(header.data_window.position, level_size(header, level)?))
    }

    fn read_chunk_at(&mut self, part_index: usize, chunk_index: usize) -> Result<Chunk> {
        let offset = *self.offset_tables.get(part_index)
            .and_then(|table| table.get(chunk_index))
            .ok_or_else(|| Error::out_of_range("chunk index"))?;

        if offset == 0 {
            return Err(Error::malformed("chunk is missing from the file"));
        }

        self.reader.seek_read_to(u64_to_usize(offset, "chunk offset")?)?;
        let chunk = Chunk::read(&mut self.reader, &self.meta)?;

        if chunk.part_index != part_index {
            return Err(Error::malformed("chunk belongs to another part"));
        }

        Ok(chunk)
    }

    /// Read all pixels of a flat scan line part.
    pub fn read_pixels(&mut self, part_index: usize, frame_buffer: &mut FrameBuffer) -> UnitResult {
        let header = self.meta.headers.get(part_index)
            .ok_or_else(|| Error::out_of_range("part index"))?
            .clone();

        if header.blocks_are_tiles() || header.is_deep() {
            return Err(Error::unsupported("part is not a flat scan line part"));
        }

        let sorted_channels = header.channels.sorted_for_file();

        for block in blocks_increasing_y(&header)? {
            let chunk = self.read_chunk_at(part_index, block.coordinates.tile_index.y())?;

            let compressed = match chunk.block {
                Block::ScanLine(scan_line) => {
                    if scan_line.y_coordinate != block.pixel_rect.position.y() {
                        return Err(Error::malformed("chunk does not match its offset table entry"));
                    }

                    scan_line.compressed_pixels
                },
                _ => return Err(Error::malformed("chunk layout does not match the part type")),
            };

            let decompressed = header.compression.decompress_chunk(
                &sorted_channels, compressed, block.pixel_rect
            )?;

            crate::block::scatter_channel_bytes(
                &sorted_channels, frame_buffer, block.pixel_rect, &decompressed, None
            )?;
        }

        Ok(())
    }

    /// Read all tiles of one level of a flat tiled part.
    pub fn read_level(&mut self, part_index: usize, frame_buffer: &mut FrameBuffer, level: Vec2<usize>) -> UnitResult {
        let header = self.meta.headers.get(part_index)
            .ok_or_else(|| Error::out_of_range("part index"))?
            .clone();

        if !header.blocks_are_tiles() || header.is_deep() {
            return Err(Error::unsupported("part is not a flat tiled part"));
        }

        let sorted_channels = header.channels.sorted_for_file();
        let tiles = tile_count(&header, level)?;

        for tile_y in 0..tiles.y() {
            for tile_x in 0..tiles.x() {
                let coordinates = TileCoordinates { tile_index: Vec2(tile_x, tile_y), level_index: level };
                let rect = block_pixel_rect(&header, coordinates)?;

                let chunk = self.read_chunk_at(part_index, chunk_index(&header, coordinates)?)?;

                let compressed = match chunk.block {
                    Block::Tile(tile) => {
                        if tile.coordinates != coordinates {
                            return Err(Error::malformed("tile does not match its offset table entry"));
                        }

                        tile.compressed_pixels
                    },
                    _ => return Err(Error::malformed("chunk layout does not match the part type")),
                };

                let decompressed = header.compression.decompress_chunk(&sorted_channels, compressed, rect)?;
                crate::block::scatter_channel_bytes(&sorted_channels, frame_buffer, rect, &decompressed, None)?;
            }
        }

        Ok(())
    }

    /// Read all deep pixels of a deep scan line part.
    /// The frame buffer must already contain the deep channels that should be read.
    pub fn read_deep_pixels(&mut self, part_index: usize, deep: &mut DeepFrameBuffer) -> UnitResult {
        let header = self.meta.headers.get(part_index)
            .ok_or_else(|| Error::out_of_range("part index"))?
            .clone();

        if header.blocks_are_tiles() || !header.is_deep() {
            return Err(Error::unsupported("part is not a deep scan line part"));
        }

        if deep.bounds() != header.data_window {
            return Err(Error::frame_buffer("deep frame buffer does not match the data window"));
        }

        let blocks = blocks_increasing_y(&header)?;
        let mut chunks = Vec::with_capacity(blocks.len());

        for block in &blocks {
            let chunk = self.read_chunk_at(part_index, block.coordinates.tile_index.y())?;

            match chunk.block {
                Block::DeepScanLine(deep_chunk) => {
                    if deep_chunk.y_coordinate != block.pixel_rect.position.y() {
                        return Err(Error::malformed("chunk does not match its offset table entry"));
                    }

                    chunks.push((block.pixel_rect, deep_chunk.compressed_sample_counts, deep_chunk.compressed_sample_data));
                },
                _ => return Err(Error::malformed("chunk layout does not match the part type")),
            }
        }

        crate::deep::decompress_and_unpack_deep_chunks(&header, deep, chunks)
    }
}


#[cfg(test)]
mod test {
    use super::*;
    use crate::compression::Compression;
    use crate::meta::attribute::*;
    use std::io::Cursor;

    fn scan_part(name: &str, compression: Compression) -> Header {
        Header::new(
            ChannelList::new(smallvec![
                ChannelDescription::new(Text::new("G").unwrap(), SampleType::F32, false),
            ]),
            IntegerBounds::from_dimensions(Vec2(6, 6)),
        )
            .with_compression(compression)
            .with_block_type(BlockType::ScanLine)
            .with_name(Text::new(name).unwrap())
    }

    #[test]
    fn two_part_roundtrip() {
        let headers = vec![
            scan_part("first", Compression::ZIP16),
            scan_part("second", Compression::RLE),
        ];

        let green = Text::new("G").unwrap();

        let mut first_buffer = FrameBuffer::alloc(&headers[0].channels, headers[0].data_window);
        let mut second_buffer = FrameBuffer::alloc(&headers[1].channels, headers[1].data_window);

        for y in 0..6 { for x in 0..6 {
            first_buffer.get_mut(&green).unwrap().set(x, y, (x + y) as f32);
            second_buffer.get_mut(&green).unwrap().set(x, y, (x * y) as f32);
        } }

        let mut writer = MultiPartWriter::new(Cursor::new(Vec::new()), headers).unwrap();
        writer.write_pixels(0, &first_buffer).unwrap();
        writer.write_pixels(1, &second_buffer).unwrap();
        let bytes = writer.finish().unwrap().into_inner();

        let mut reader = MultiPartReader::new(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.part_count(), 2);
        assert_eq!(reader.find_part(&Text::new("second").unwrap()), Some(1));

        let mut read_first = FrameBuffer::alloc(&reader.header(0).channels, reader.header(0).data_window);
        let mut read_second = FrameBuffer::alloc(&reader.header(1).channels, reader.header(1).data_window);

        reader.read_pixels(0, &mut read_first).unwrap();
        reader.read_pixels(1, &mut read_second).unwrap();

        assert_eq!(first_buffer, read_first);
        assert_eq!(second_buffer, read_second);
    }

    #[test]
    fn part_names_are_required() {
        let header = scan_part("first", Compression::RLE);
        let mut unnamed = scan_part("second", Compression::RLE);
        unnamed.name = None;

        let result = MultiPartWriter::new(Cursor::new(Vec::new()), vec![header, unnamed]);
        assert!(result.is_err());
    }

    #[test]
    fn stereo_views_are_detected() {
        let mut left = scan_part("leftPart", Compression::RLE);
        left.view = Some(Text::new("left").unwrap());

        let mut right = scan_part("rightPart", Compression::RLE);
        right.view = Some(Text::new("right").unwrap());

        let left_buffer = FrameBuffer::alloc(&left.channels, left.data_window);

        let mut writer = MultiPartWriter::new(Cursor::new(Vec::new()), vec![left, right]).unwrap();
        writer.write_pixels(0, &left_buffer).unwrap();
        writer.write_pixels(1, &left_buffer).unwrap();
        let bytes = writer.finish().unwrap().into_inner();

        let reader = MultiPartReader::new(Cursor::new(bytes)).unwrap();
        assert!(reader.is_multi_view());
        assert_eq!(reader.views().len(), 2);
    }

    #[test]
    fn channel_name_parsing() {
        let views = [Text::new("left").unwrap(), Text::new("right").unwrap()];

        let plain = parse_channel_name(&Text::new("R").unwrap(), &views);
        assert_eq!(plain, ChannelName {
            layer: None, view: None, component: Text::new("R").unwrap(),
        });

        let with_view = parse_channel_name(&Text::new("diffuse.left.R").unwrap(), &views);
        assert_eq!(with_view, ChannelName {
            layer: Some(Text::new("diffuse").unwrap()),
            view: Some(Text::new("left").unwrap()),
            component: Text::new("R").unwrap(),
        });

        let nested_layer = parse_channel_name(&Text::new("light.spot.Z").unwrap(), &views);
        assert_eq!(nested_layer, ChannelName {
            layer: Some(Text::new("light.spot").unwrap()),
            view: None,
            component: Text::new("Z").unwrap(),
        });
    }
}

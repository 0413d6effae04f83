
//! Reading and writing of deep images, where every pixel
//! holds a variable number of samples per channel.
//!
//! Each deep chunk stores two separately compressed payloads: the cumulative
//! sample count table of its pixel rectangle, and the packed sample data.

use crate::block::chunk::{Chunk, Block, DeepScanLineChunk, DeepTileChunk, TileCoordinates};
use crate::block::{blocks_increasing_y, block_pixel_rect, chunk_index, level_size, tile_count, BlockIndex};
use crate::compression::DEFAULT_ZIP_LEVEL;
use crate::error::*;
use crate::frame::deep::DeepFrameBuffer;
use crate::io::*;
use crate::math::Vec2;
use crate::meta::attribute::{BlockType, ChannelList, IntegerBounds};
use crate::meta::header::Header;
use crate::meta::{MetaData, OffsetTable};


/// The packed and still uncompressed payloads of one deep chunk.
struct PackedDeepChunk {
    cumulative_counts: Vec<u8>,
    sample_data: Vec<u8>,
}

/// Pack the sample counts and sample data of one chunk rectangle.
/// Channels missing from the frame buffer are written as zeroes.
fn pack_deep_chunk(
    sorted_channels: &ChannelList,
    deep: &DeepFrameBuffer,
    rect: IntegerBounds,
) -> Result<PackedDeepChunk> {
    let counts = deep.counts_of_rect(rect)?;

    // the count table stores the inclusive prefix sum over the chunk pixels
    let mut cumulative_counts = Vec::with_capacity(counts.len() * 4);
    let mut running = 0_u32;

    for &count in &counts {
        running = running.checked_add(count)
            .ok_or_else(|| Error::out_of_range("deep sample count sum"))?;

        cumulative_counts.extend_from_slice(&running.to_le_bytes());
    }

    let mut sample_data = Vec::new();

    for y in rect.position.y()..rect.end().y() {
        for x in rect.position.x()..rect.end().x() {
            let count = u64::from(deep.sample_count(x, y)?);

            for channel in &sorted_channels.list {
                match deep.get_channel(&channel.name) {
                    Some(slice) => {
                        if slice.sample_type() != channel.sample_type {
                            return Err(Error::frame_buffer(format!(
                                "sample type of deep channel `{}` does not match the file", channel.name
                            )));
                        }

                        let start = deep.sample_offset_of(x, y)?;
                        sample_data.extend_from_slice(slice.bytes_of_samples(start, count));
                    },

                    None => {
                        let byte_count = count as usize * channel.sample_type.bytes_per_sample();
                        sample_data.resize(sample_data.len() + byte_count, 0);
                    },
                }
            }
        }
    }

    Ok(PackedDeepChunk { cumulative_counts, sample_data })
}

/// Recover the per-pixel counts of one chunk from its decompressed cumulative table.
fn counts_from_cumulative(table_bytes: &[u8], rect: IntegerBounds) -> Result<Vec<u32>> {
    if table_bytes.len() != rect.area() * 4 {
        return Err(Error::decompression("deep sample count table size"));
    }

    let mut counts = Vec::with_capacity(rect.area());
    let mut previous = 0_u32;

    for entry in table_bytes.chunks_exact(4) {
        let cumulative = u32::from_le_bytes([entry[0], entry[1], entry[2], entry[3]]);

        if cumulative < previous {
            return Err(Error::decompression("deep sample count table is not cumulative"));
        }

        counts.push(cumulative - previous);
        previous = cumulative;
    }

    Ok(counts)
}

/// The byte count of the packed sample data of one chunk.
fn packed_sample_data_size(sorted_channels: &ChannelList, counts: &[u32]) -> usize {
    let bytes_per_sample: usize = sorted_channels.list.iter()
        .map(|channel| channel.sample_type.bytes_per_sample())
        .sum();

    counts.iter().map(|&count| count as usize * bytes_per_sample).sum()
}

/// Distribute the decompressed sample data of one chunk into the frame buffer.
/// Channels missing from the frame buffer are skipped.
fn unpack_deep_chunk(
    sorted_channels: &ChannelList,
    deep: &mut DeepFrameBuffer,
    rect: IntegerBounds,
    sample_data: &[u8],
) -> UnitResult {
    let mut position = 0;

    for y in rect.position.y()..rect.end().y() {
        for x in rect.position.x()..rect.end().x() {
            let count = u64::from(deep.sample_count(x, y)?);
            let start_sample = deep.sample_offset_of(x, y)?;

            for channel in &sorted_channels.list {
                let byte_count = count as usize * channel.sample_type.bytes_per_sample();

                if position + byte_count > sample_data.len() {
                    return Err(Error::decompression("deep sample data ends before the chunk"));
                }

                if deep.get_channel(&channel.name).is_some() {
                    deep.replace_channel_sample_range(
                        &channel.name, start_sample,
                        &sample_data[position .. position + byte_count]
                    )?;
                }

                position += byte_count;
            }
        }
    }

    if position != sample_data.len() {
        return Err(Error::decompression("deep chunk contains too much data"));
    }

    Ok(())
}


/// Pack one deep chunk rectangle and compress both payloads.
/// Shared by the deep writers and the multi-part writer.
pub(crate) fn pack_and_compress_deep_chunk(
    header: &Header,
    sorted_channels: &ChannelList,
    deep: &DeepFrameBuffer,
    rect: IntegerBounds,
    zip_level: u8,
) -> Result<(Vec<u8>, Vec<u8>)> {
    let packed = pack_deep_chunk(sorted_channels, deep, rect)?;

    let compressed_counts = header.compression.compress_deep_bytes(packed.cumulative_counts, zip_level)?;
    let compressed_samples = header.compression.compress_deep_bytes(packed.sample_data, zip_level)?;

    Ok((compressed_counts, compressed_samples))
}

/// Decompress the payloads of all deep chunks of one part and distribute
/// them into the frame buffer: all count tables first, so the sample
/// stores can be sized, then all sample payloads.
/// Shared by the deep readers and the multi-part reader.
pub(crate) fn decompress_and_unpack_deep_chunks(
    header: &Header,
    deep: &mut DeepFrameBuffer,
    chunks: Vec<(IntegerBounds, Vec<u8>, Vec<u8>)>,
) -> UnitResult {
    let bounds = deep.bounds();
    let sorted_channels = header.channels.sorted_for_file();

    let mut full_counts = vec![0_u32; bounds.area()];
    let mut pending_payloads = Vec::with_capacity(chunks.len());

    for (rect, compressed_counts, compressed_samples) in chunks {
        let count_table = header.compression.decompress_deep_bytes(
            compressed_counts, rect.area() * 4
        )?;

        let counts = counts_from_cumulative(&count_table, rect)?;

        let column_offset = (rect.position.x() - bounds.position.x()) as usize;
        let row_offset = (rect.position.y() - bounds.position.y()) as usize;

        for (row_index, row) in counts.chunks_exact(rect.width()).enumerate() {
            let start = (row_offset + row_index) * bounds.width() + column_offset;
            full_counts[start .. start + row.len()].copy_from_slice(row);
        }

        let expected_data_size = packed_sample_data_size(&sorted_channels, &counts);
        pending_payloads.push((rect, compressed_samples, expected_data_size));
    }

    deep.set_sample_counts(&full_counts)?;

    for (rect, compressed_payload, expected_data_size) in pending_payloads {
        let sample_data = header.compression.decompress_deep_bytes(
            compressed_payload, expected_data_size
        )?;

        unpack_deep_chunk(&sorted_channels, deep, rect, &sample_data)?;
    }

    Ok(())
}


fn validate_deep_header(header: &Header, tiled: bool) -> UnitResult {
    let expected = if tiled { BlockType::DeepTile } else { BlockType::DeepScanLine };

    if header.block_type != Some(expected) {
        return Err(Error::unsupported("header type does not match the deep engine"));
    }

    if !header.compression.supports_deep_data() {
        return Err(Error::unsupported("deep data with a lossy compression method"));
    }

    Ok(())
}


/// Writes a single-part deep scan line image.
#[derive(Debug)]
#[must_use]
pub struct DeepScanlineWriter<W: Write + Seek> {
    writer: Tracking<W>,
    header: Header,
    sorted_channels: ChannelList,
    offset_table: OffsetTable,
    offset_table_position: usize,
    zip_level: u8,
}

impl<W: Write + Seek> DeepScanlineWriter<W> {

    /// Write the meta data of the specified header and reserve the offset table.
    /// The header must describe a deep scan line part.
    pub fn new(write: W, header: Header) -> Result<Self> {
        validate_deep_header(&header, false)?;

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

    /// Override the zlib level used by the zip family.
    pub fn set_zip_compression_level(&mut self, level: u8) {
        debug_assert!((1..=9).contains(&level), "zlib level out of range");
        self.zip_level = level;
    }

    /// Compress and write all deep pixels of the data window.
    pub fn write_pixels(&mut self, deep: &DeepFrameBuffer) -> UnitResult {
        if deep.bounds() != self.header.data_window {
            return Err(Error::frame_buffer("deep frame buffer does not match the data window"));
        }

        for block in blocks_increasing_y(&self.header)? {
            self.write_block(deep, block)?;
        }

        Ok(())
    }

    fn write_block(&mut self, deep: &DeepFrameBuffer, block: BlockIndex) -> UnitResult {
        let (compressed_counts, compressed_samples) = pack_and_compress_deep_chunk(
            &self.header, &self.sorted_channels, deep, block.pixel_rect, self.zip_level
        )?;

        let chunk_index = block.coordinates.tile_index.y();
        debug_assert_eq!(self.offset_table[chunk_index], 0, "chunk is already written");
        self.offset_table[chunk_index] = self.writer.byte_position() as u64;

        let chunk = Chunk {
            part_index: 0,
            block: Block::DeepScanLine(DeepScanLineChunk {
                y_coordinate: block.pixel_rect.position.y(),
                compressed_sample_counts: compressed_counts,
                compressed_sample_data: compressed_samples,
            }),
        };

        chunk.write(&mut self.writer, 1)
    }

    /// Seek back to the reserved space and store the final offset table.
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


/// Reads a single-part deep scan line image.
#[derive(Debug)]
pub struct DeepScanlineReader<R: Read + Seek> {
    reader: Tracking<R>,
    meta: MetaData,
    offset_table: OffsetTable,
}

impl<R: Read + Seek> DeepScanlineReader<R> {

    /// Parse the meta data and the offset table.
    /// The file must contain a single deep scan line part.
    pub fn new(read: R) -> Result<Self> {
        let mut reader = Tracking::new(read);

        let mut peekable = PeekRead::new(&mut reader);
        let meta = MetaData::read_from_buffered_peekable(&mut peekable)?;

        if meta.headers.len() != 1 {
            return Err(Error::unsupported("deep scan line reader requires a single-part file"));
        }

        validate_deep_header(&meta.headers[0], false)?;

        let mut tables = MetaData::read_offset_tables(&mut peekable, &meta.headers)?;
        let offset_table = tables.pop().expect("one header implies one table");

        Ok(Self { reader, meta, offset_table })
    }

    /// The header of the image being read.
    pub fn header(&self) -> &Header { &self.meta.headers[0] }

    /// Read all deep pixels of the data window: first all sample count
    /// tables, which size the sample stores, then all sample payloads.
    /// The frame buffer must be addressed with the data window and
    /// already contain the deep channels that should be read.
    pub fn read_all_pixels(&mut self, deep: &mut DeepFrameBuffer) -> UnitResult {
        let header = self.meta.headers[0].clone();

        if deep.bounds() != header.data_window {
            return Err(Error::frame_buffer("deep frame buffer does not match the data window"));
        }

        let blocks = blocks_increasing_y(&header)?;
        let mut chunks = Vec::with_capacity(blocks.len());

        for block in &blocks {
            let chunk = self.read_chunk(&header, block)?;
            chunks.push((block.pixel_rect, chunk.compressed_sample_counts, chunk.compressed_sample_data));
        }

        decompress_and_unpack_deep_chunks(&header, deep, chunks)
    }

    fn read_chunk(&mut self, header: &Header, block: &BlockIndex) -> Result<DeepScanLineChunk> {
        let chunk_index = block.coordinates.tile_index.y();

        let offset = *self.offset_table.get(chunk_index)
            .ok_or_else(|| Error::out_of_range("chunk index"))?;

        if offset == 0 {
            return Err(Error::malformed("chunk is missing from the file"));
        }

        self.reader.seek_read_to(u64_to_usize(offset, "chunk offset")?)?;
        let chunk = DeepScanLineChunk::read(&mut self.reader, deep_chunk_size_limit(header))?;

        if chunk.y_coordinate != block.pixel_rect.position.y() {
            return Err(Error::malformed("chunk does not match its offset table entry"));
        }

        Ok(chunk)
    }
}


/// Writes a single-part deep tiled image.
#[derive(Debug)]
#[must_use]
pub struct DeepTiledWriter<W: Write + Seek> {
    writer: Tracking<W>,
    header: Header,
    sorted_channels: ChannelList,
    offset_table: OffsetTable,
    offset_table_position: usize,
    zip_level: u8,
}

impl<W: Write + Seek> DeepTiledWriter<W> {

    /// Write the meta data of the specified header and reserve the offset table.
    /// The header must describe a deep tiled part.
    pub fn new(write: W, header: Header) -> Result<Self> {
        validate_deep_header(&header, true)?;

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

    /// The pixel rectangle of the specified level.
    pub fn level_bounds(&self, level: Vec2<usize>) -> Result<IntegerBounds> {
        Ok(IntegerBounds::new(self.header.data_window.position, level_size(&self.header, level)?))
    }

    /// Compress and write one deep tile from the frame buffer of its level.
    pub fn write_tile(&mut self, deep: &DeepFrameBuffer, coordinates: TileCoordinates) -> UnitResult {
        let rect = block_pixel_rect(&self.header, coordinates)?;

        let (compressed_counts, compressed_samples) = pack_and_compress_deep_chunk(
            &self.header, &self.sorted_channels, deep, rect, self.zip_level
        )?;

        let index = chunk_index(&self.header, coordinates)?;

        if self.offset_table[index] != 0 {
            return Err(Error::out_of_range("tile is already written"));
        }

        self.offset_table[index] = self.writer.byte_position() as u64;

        let chunk = Chunk {
            part_index: 0,
            block: Block::DeepTile(DeepTileChunk {
                coordinates,
                compressed_sample_counts: compressed_counts,
                compressed_sample_data: compressed_samples,
            }),
        };

        chunk.write(&mut self.writer, 1)
    }

    /// Compress and write all deep tiles of one level.
    pub fn write_level(&mut self, deep: &DeepFrameBuffer, level: Vec2<usize>) -> UnitResult {
        let tile_count = tile_count(&self.header, level)?;

        for tile_y in 0..tile_count.y() {
            for tile_x in 0..tile_count.x() {
                self.write_tile(deep, TileCoordinates {
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


/// Reads a single-part deep tiled image.
#[derive(Debug)]
pub struct DeepTiledReader<R: Read + Seek> {
    reader: Tracking<R>,
    meta: MetaData,
    offset_table: OffsetTable,
}

impl<R: Read + Seek> DeepTiledReader<R> {

    /// Parse the meta data and the offset table.
    /// The file must contain a single deep tiled part.
    pub fn new(read: R) -> Result<Self> {
        let mut reader = Tracking::new(read);

        let mut peekable = PeekRead::new(&mut reader);
        let meta = MetaData::read_from_buffered_peekable(&mut peekable)?;

        if meta.headers.len() != 1 {
            return Err(Error::unsupported("deep tiled reader requires a single-part file"));
        }

        validate_deep_header(&meta.headers[0], true)?;

        let mut tables = MetaData::read_offset_tables(&mut peekable, &meta.headers)?;
        let offset_table = tables.pop().expect("one header implies one table");

        Ok(Self { reader, meta, offset_table })
    }

    /// The header of the image being read.
    pub fn header(&self) -> &Header { &self.meta.headers[0] }

    /// The pixel rectangle of the specified level.
    pub fn level_bounds(&self, level: Vec2<usize>) -> Result<IntegerBounds> {
        Ok(IntegerBounds::new(self.header().data_window.position, level_size(self.header(), level)?))
    }

    /// Read all deep tiles of one level into the frame buffer of that level.
    /// The frame buffer must be addressed with the level bounds and
    /// already contain the deep channels that should be read.
    pub fn read_level(&mut self, deep: &mut DeepFrameBuffer, level: Vec2<usize>) -> UnitResult {
        let header = self.meta.headers[0].clone();
        let level_bounds = self.level_bounds(level)?;

        if deep.bounds() != level_bounds {
            return Err(Error::frame_buffer("deep frame buffer does not match the level bounds"));
        }

        let tile_count = tile_count(&header, level)?;
        let mut chunks = Vec::with_capacity(tile_count.area());

        for tile_y in 0..tile_count.y() {
            for tile_x in 0..tile_count.x() {
                let coordinates = TileCoordinates {
                    tile_index: Vec2(tile_x, tile_y),
                    level_index: level,
                };

                let rect = block_pixel_rect(&header, coordinates)?;
                let chunk = self.read_chunk(&header, coordinates)?;

                chunks.push((rect, chunk.compressed_sample_counts, chunk.compressed_sample_data));
            }
        }

        decompress_and_unpack_deep_chunks(&header, deep, chunks)
    }

    fn read_chunk(&mut self, header: &Header, coordinates: TileCoordinates) -> Result<DeepTileChunk> {
        let index = chunk_index(header, coordinates)?;

        let offset = *self.offset_table.get(index)
            .ok_or_else(|| Error::out_of_range("chunk index"))?;

        if offset == 0 {
            return Err(Error::malformed("tile is missing from the file"));
        }

        self.reader.seek_read_to(u64_to_usize(offset, "chunk offset")?)?;
        let chunk = DeepTileChunk::read(&mut self.reader, deep_chunk_size_limit(header))?;

        if chunk.coordinates != coordinates {
            return Err(Error::malformed("tile does not match its offset table entry"));
        }

        Ok(chunk)
    }
}

/// An upper bound for the byte size of one deep chunk, to cap allocations.
/// Deep chunks have no fixed size, so this is generous.
fn deep_chunk_size_limit(header: &Header) -> usize {
    header.max_block_byte_size().max(1024 * 1024) * 256
}


#[cfg(test)]
mod test {
    use super::*;
    use crate::compression::Compression;
    use crate::frame::Sample;
    use crate::meta::attribute::*;
    use std::io::Cursor;

    fn deep_header(size: Vec2<usize>, compression: Compression) -> Header {
        Header::new(
            ChannelList::new(smallvec![
                ChannelDescription::new(Text::new("Z").unwrap(), SampleType::F32, false),
            ]),
            IntegerBounds::from_dimensions(size),
        )
            .with_compression(compression)
            .with_block_type(BlockType::DeepScanLine)
            .with_name(Text::new("depth").unwrap())
    }

    fn example_deep_buffer(bounds: IntegerBounds) -> DeepFrameBuffer {
        let mut deep = DeepFrameBuffer::new(bounds);
        let z_name = Text::new("Z").unwrap();
        deep.insert_channel(z_name.clone(), SampleType::F32);

        let width = bounds.width() as i32;
        let counts: Vec<u32> = (0..bounds.area() as i32)
            .map(|index| (index % width + index / width + 1) as u32)
            .collect();

        deep.set_sample_counts(&counts).unwrap();

        for y in 0..bounds.height() as i32 {
            for x in 0..width {
                for sample_index in 0..deep.sample_count(x, y).unwrap() as usize {
                    deep.set_sample(&z_name, x, y, sample_index, sample_index as f32 + 0.25).unwrap();
                }
            }
        }

        deep
    }

    #[test]
    fn roundtrip_with_every_deep_compression() {
        for &compression in &[
            Compression::Uncompressed, Compression::RLE,
            Compression::ZIP1, Compression::ZIP16, Compression::PIZ,
        ] {
            let header = deep_header(Vec2(4, 4), compression);
            let deep = example_deep_buffer(header.data_window);

            let mut writer = DeepScanlineWriter::new(Cursor::new(Vec::new()), header).unwrap();
            writer.write_pixels(&deep).unwrap();
            let bytes = writer.finish().unwrap().into_inner();

            let mut reader = DeepScanlineReader::new(Cursor::new(bytes)).unwrap();

            let mut read_deep = DeepFrameBuffer::new(reader.header().data_window);
            read_deep.insert_channel(Text::new("Z").unwrap(), SampleType::F32);
            reader.read_all_pixels(&mut read_deep).unwrap();

            assert_eq!(deep, read_deep, "{}", compression);
        }
    }

    #[test]
    fn sample_counts_and_values_are_exact() {
        let header = deep_header(Vec2(4, 4), Compression::ZIP1);
        let deep = example_deep_buffer(header.data_window);

        let mut writer = DeepScanlineWriter::new(Cursor::new(Vec::new()), header).unwrap();
        writer.write_pixels(&deep).unwrap();
        let bytes = writer.finish().unwrap().into_inner();

        let mut reader = DeepScanlineReader::new(Cursor::new(bytes)).unwrap();

        let mut read_deep = DeepFrameBuffer::new(reader.header().data_window);
        let z_name = Text::new("Z").unwrap();
        read_deep.insert_channel(z_name.clone(), SampleType::F32);
        reader.read_all_pixels(&mut read_deep).unwrap();

        for y in 0..4 {
            for x in 0..4 {
                assert_eq!(read_deep.sample_count(x, y).unwrap(), (x + y + 1) as u32);

                for sample_index in 0..(x + y + 1) as usize {
                    assert_eq!(
                        read_deep.get_sample(&z_name, x, y, sample_index).unwrap(),
                        Sample::F32(sample_index as f32 + 0.25)
                    );
                }
            }
        }
    }

    #[test]
    fn lossy_compression_is_refused_for_deep_data() {
        let header = deep_header(Vec2(4, 4), Compression::B44);
        let result = DeepScanlineWriter::new(Cursor::new(Vec::new()), header);
        assert!(matches!(result, Err(Error::UnsupportedFeature(_))));
    }

    #[test]
    fn deep_tiles_roundtrip() {
        let header = Header::new(
            ChannelList::new(smallvec![
                ChannelDescription::new(Text::new("A").unwrap(), SampleType::F16, false),
                ChannelDescription::new(Text::new("Z").unwrap(), SampleType::F32, false),
            ]),
            IntegerBounds::from_dimensions(Vec2(10, 6)),
        )
            .with_compression(Compression::ZIP1)
            .with_block_type(BlockType::DeepTile)
            .with_name(Text::new("depth").unwrap())
            .with_tiles(TileDescription {
                tile_size: Vec2(4, 4),
                level_mode: LevelMode::One,
                rounding_mode: crate::math::RoundingMode::Down,
            });

        let bounds = header.data_window;
        let mut deep = DeepFrameBuffer::new(bounds);
        let a_name = Text::new("A").unwrap();
        let z_name = Text::new("Z").unwrap();

        deep.insert_channel(a_name.clone(), SampleType::F16);
        deep.insert_channel(z_name.clone(), SampleType::F32);

        let counts: Vec<u32> = (0..bounds.area()).map(|index| (index % 3) as u32).collect();
        deep.set_sample_counts(&counts).unwrap();

        for y in 0..6 {
            for x in 0..10 {
                for sample_index in 0..deep.sample_count(x, y).unwrap() as usize {
                    deep.set_sample(&z_name, x, y, sample_index, (x * 100 + y) as f32).unwrap();
                    deep.set_sample(&a_name, x, y, sample_index, 0.5_f32).unwrap();
                }
            }
        }

        let mut writer = DeepTiledWriter::new(Cursor::new(Vec::new()), header).unwrap();
        writer.write_level(&deep, Vec2(0, 0)).unwrap();
        let bytes = writer.finish().unwrap().into_inner();

        let mut reader = DeepTiledReader::new(Cursor::new(bytes)).unwrap();

        let mut read_deep = DeepFrameBuffer::new(reader.level_bounds(Vec2(0, 0)).unwrap());
        read_deep.insert_channel(a_name, SampleType::F16);
        read_deep.insert_channel(z_name, SampleType::F32);
        reader.read_level(&mut read_deep, Vec2(0, 0)).unwrap();

        assert_eq!(deep, read_deep);
    }
}


//! The geometry of pixel blocks, and the translation between
//! frame buffer slices and the channel-planar bytes of one chunk.

pub mod chunk;

use crate::block::chunk::TileCoordinates;
use crate::error::*;
use crate::frame::{FrameBuffer, Sample};
use crate::math::*;
use crate::meta::attribute::{ChannelList, IntegerBounds, LevelMode, SampleType};
use crate::meta::header::Header;
use crate::meta::{mip_map_levels, rip_map_levels};


/// Position and pixel rectangle of one block within a part,
/// in the canonical increasing-y file order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockIndex {

    /// Tile grid position and level of this block.
    /// Scan line blocks use the y tile index as their chunk position.
    pub coordinates: TileCoordinates,

    /// The absolute pixel rectangle covered by this block.
    /// Border blocks are already clipped to the data window.
    pub pixel_rect: IntegerBounds,
}


/// The resolution of the specified level of a part.
pub fn level_size(header: &Header, level: Vec2<usize>) -> Result<Vec2<usize>> {
    let data_size = header.data_window.size;

    match header.tiles {
        None => {
            if level != Vec2(0, 0) {
                return Err(Error::out_of_range("scan line parts only have level zero"));
            }

            Ok(data_size)
        },

        Some(tiles) => {
            let round = tiles.rounding_mode;

            let level_count_x = compute_level_count(round, data_size.width());
            let level_count_y = compute_level_count(round, data_size.height());

            let (max_x, max_y) = match tiles.level_mode {
                LevelMode::One => (1, 1),
                LevelMode::MipMap => {
                    let count = level_count_x.max(level_count_y);
                    (count, count)
                },
                LevelMode::RipMap => (level_count_x, level_count_y),
            };

            if level.x() >= max_x || level.y() >= max_y {
                return Err(Error::out_of_range("level index"));
            }

            if tiles.level_mode == LevelMode::MipMap && level.x() != level.y() {
                return Err(Error::out_of_range("mip map levels must be uniform"));
            }

            Ok(Vec2(
                compute_level_size(round, data_size.width(), level.x()),
                compute_level_size(round, data_size.height(), level.y()),
            ))
        }
    }
}

/// The number of tile columns and rows of the specified level.
pub fn tile_count(header: &Header, level: Vec2<usize>) -> Result<Vec2<usize>> {
    let tiles = header.tiles.ok_or_else(|| Error::out_of_range("part is not tiled"))?;
    let level_size = level_size(header, level)?;

    Ok(Vec2(
        compute_block_count(level_size.width(), tiles.tile_size.width()),
        compute_block_count(level_size.height(), tiles.tile_size.height()),
    ))
}

/// The absolute pixel rectangle of the specified block,
/// clipped to the data window at its level.
pub fn block_pixel_rect(header: &Header, coordinates: TileCoordinates) -> Result<IntegerBounds> {
    match header.tiles {
        Some(tiles) => {
            let level_size = level_size(header, coordinates.level_index)?;

            let tile_position = Vec2(
                coordinates.tile_index.x() * tiles.tile_size.width(),
                coordinates.tile_index.y() * tiles.tile_size.height(),
            );

            if tile_position.x() >= level_size.width() || tile_position.y() >= level_size.height() {
                return Err(Error::out_of_range("tile index"));
            }

            let size = Vec2(
                calculate_block_size(level_size.width(), tiles.tile_size.width(), tile_position.x())?,
                calculate_block_size(level_size.height(), tiles.tile_size.height(), tile_position.y())?,
            );

            // levels are addressed from the data window position
            Ok(IntegerBounds::new(
                Vec2(
                    header.data_window.position.x() + usize_to_i32(tile_position.x(), "tile position")?,
                    header.data_window.position.y() + usize_to_i32(tile_position.y(), "tile position")?,
                ),
                size,
            ))
        },

        None => {
            let lines_per_chunk = header.compression.scan_lines_per_chunk();
            let chunk_start = coordinates.tile_index.y() * lines_per_chunk;

            if coordinates.tile_index.x() != 0 || coordinates.level_index != Vec2(0, 0) {
                return Err(Error::out_of_range("scan line chunk index"));
            }

            let height = calculate_block_size(header.data_window.size.height(), lines_per_chunk, chunk_start)?;

            Ok(IntegerBounds::new(
                Vec2(
                    header.data_window.position.x(),
                    header.data_window.position.y() + usize_to_i32(chunk_start, "chunk position")?,
                ),
                Vec2(header.data_window.size.width(), height),
            ))
        }
    }
}

/// The position of the specified block in the offset table of its part.
/// Levels are walked in canonical order: mip maps by ascending level,
/// rip maps row-major over `(level_y, level_x)`.
pub fn chunk_index(header: &Header, coordinates: TileCoordinates) -> Result<usize> {
    match header.tiles {
        None => {
            if coordinates.tile_index.x() != 0 || coordinates.level_index != Vec2(0, 0) {
                return Err(Error::out_of_range("scan line chunk index"));
            }

            let chunk_count = compute_block_count(
                header.data_window.size.height(),
                header.compression.scan_lines_per_chunk()
            );

            if coordinates.tile_index.y() >= chunk_count {
                return Err(Error::out_of_range("scan line chunk index"));
            }

            Ok(coordinates.tile_index.y())
        },

        Some(_) => {
            let mut index = 0;

            for level in level_indices_in_file_order(header) {
                let tile_count = tile_count(header, level)?;

                if level == coordinates.level_index {
                    if coordinates.tile_index.x() >= tile_count.x() || coordinates.tile_index.y() >= tile_count.y() {
                        return Err(Error::out_of_range("tile index"));
                    }

                    return Ok(index + coordinates.tile_index.y() * tile_count.x() + coordinates.tile_index.x());
                }

                index += tile_count.area();
            }

            Err(Error::out_of_range("level index"))
        }
    }
}

/// All level indices of a part, in the order their chunks appear in the file.
pub fn level_indices_in_file_order(header: &Header) -> Vec<Vec2<usize>> {
    match header.tiles {
        None => vec![ Vec2(0, 0) ],

        Some(tiles) => match tiles.level_mode {
            LevelMode::One => vec![ Vec2(0, 0) ],

            LevelMode::MipMap => mip_map_levels(tiles.rounding_mode, header.data_window.size)
                .map(|(level, _)| Vec2(level, level))
                .collect(),

            LevelMode::RipMap => rip_map_levels(tiles.rounding_mode, header.data_window.size)
                .map(|(level, _)| level)
                .collect(),
        }
    }
}

/// Iterate over all blocks of a part in increasing-y order,
/// which is the order of the offset table.
pub fn blocks_increasing_y(header: &Header) -> Result<Vec<BlockIndex>> {
    let mut blocks = Vec::with_capacity(header.chunk_count());

    match header.tiles {
        None => {
            let chunk_count = compute_block_count(
                header.data_window.size.height(),
                header.compression.scan_lines_per_chunk()
            );

            for chunk_y in 0..chunk_count {
                let coordinates = TileCoordinates {
                    tile_index: Vec2(0, chunk_y),
                    level_index: Vec2(0, 0),
                };

                blocks.push(BlockIndex {
                    coordinates,
                    pixel_rect: block_pixel_rect(header, coordinates)?,
                });
            }
        },

        Some(_) => {
            for level in level_indices_in_file_order(header) {
                let tile_count = tile_count(header, level)?;

                for tile_y in 0..tile_count.y() {
                    for tile_x in 0..tile_count.x() {
                        let coordinates = TileCoordinates {
                            tile_index: Vec2(tile_x, tile_y),
                            level_index: level,
                        };

                        blocks.push(BlockIndex {
                            coordinates,
                            pixel_rect: block_pixel_rect(header, coordinates)?,
                        });
                    }
                }
            }
        },
    }

    debug_assert_eq!(blocks.len(), header.chunk_count(), "block iteration does not match chunk count");
    Ok(blocks)
}


/// The first sample position at or after `start` for the specified sampling factor.
fn first_sample_position(start: i32, sampling: usize) -> i32 {
    let sampling = sampling as i32;
    let remainder = mod_p(start, sampling);
    if remainder == 0 { start } else { start + sampling - remainder }
}

/// Collect the bytes of one chunk from the frame buffer slices:
/// for each covered line, for each channel in the given order,
/// the samples of that line, as little-endian bytes.
pub fn gather_channel_bytes(channels: &ChannelList, frame_buffer: &FrameBuffer, rect: IntegerBounds) -> Result<Vec<u8>> {
    let mut bytes = Vec::with_capacity(channels.byte_size_of_rect(rect));

    for y in rect.position.y()..rect.end().y() {
        for channel in &channels.list {
            if mod_p(y, channel.sampling.y() as i32) != 0 { continue; }

            let slice = frame_buffer.expect(&channel.name)?;
            let mut x = first_sample_position(rect.position.x(), channel.sampling.x());

            while x < rect.end().x() {
                let sample = slice.get(x, y).convert_to(channel.sample_type);
                append_sample_bytes(&mut bytes, sample);
                x += channel.sampling.x() as i32;
            }
        }
    }

    Ok(bytes)
}

/// Distribute the bytes of one decompressed chunk into the frame buffer slices.
/// Channels without a slice are skipped. If `clip_y` is present, only lines
/// within that inclusive range are stored, though all bytes are consumed.
pub fn scatter_channel_bytes(
    channels: &ChannelList,
    frame_buffer: &mut FrameBuffer,
    rect: IntegerBounds,
    bytes: &[u8],
    clip_y: Option<(i32, i32)>,
) -> UnitResult {
    let expected_size = channels.byte_size_of_rect(rect);
    if bytes.len() != expected_size {
        return Err(Error::decompression("chunk byte count does not match its rectangle"));
    }

    let mut position = 0;

    for y in rect.position.y()..rect.end().y() {
        for channel in &channels.list {
            if mod_p(y, channel.sampling.y() as i32) != 0 { continue; }

            let samples_x = RoundingMode::Up.divide(rect.size.width(), channel.sampling.x());
            let line_bytes = samples_x * channel.sample_type.bytes_per_sample();

            let skip_line = clip_y.map_or(false, |(min_y, max_y)| y < min_y || y > max_y);

            if skip_line || frame_buffer.get(&channel.name).is_none() {
                position += line_bytes;
                continue;
            }

            let slice = frame_buffer.get_mut(&channel.name).expect("slice presence checked above");
            let mut x = first_sample_position(rect.position.x(), channel.sampling.x());

            while x < rect.end().x() {
                let sample = read_sample_bytes(&bytes[position..], channel.sample_type);
                slice.set(x, y, sample);

                position += channel.sample_type.bytes_per_sample();
                x += channel.sampling.x() as i32;
            }
        }
    }

    debug_assert_eq!(position, bytes.len(), "chunk bytes not fully consumed");
    Ok(())
}

fn append_sample_bytes(bytes: &mut Vec<u8>, sample: Sample) {
    match sample {
        Sample::F16(value) => bytes.extend_from_slice(&value.to_bits().to_le_bytes()),
        Sample::F32(value) => bytes.extend_from_slice(&value.to_bits().to_le_bytes()),
        Sample::U32(value) => bytes.extend_from_slice(&value.to_le_bytes()),
    }
}

fn read_sample_bytes(bytes: &[u8], sample_type: SampleType) -> Sample {
    use half::f16;

    match sample_type {
        SampleType::F16 => Sample::F16(f16::from_bits(u16::from_le_bytes([bytes[0], bytes[1]]))),
        SampleType::F32 => Sample::F32(f32::from_bits(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))),
        SampleType::U32 => Sample::U32(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])),
    }
}


#[cfg(test)]
mod test {
    use super::*;
    use crate::compression::Compression;
    use crate::meta::attribute::*;
    use crate::math::RoundingMode;

    fn tiled_header(size: Vec2<usize>, tile: usize, mode: LevelMode) -> Header {
        Header::new(
            ChannelList::new(smallvec![
                ChannelDescription::new(Text::new("G").unwrap(), SampleType::F16, false),
            ]),
            IntegerBounds::from_dimensions(size),
        ).with_tiles(TileDescription {
            tile_size: Vec2(tile, tile),
            level_mode: mode,
            rounding_mode: RoundingMode::Down,
        }).with_block_type(BlockType::Tile)
    }

    #[test]
    fn mip_map_chunk_indices_walk_levels_in_order() {
        let header = tiled_header(Vec2(32, 32), 16, LevelMode::MipMap);

        // level 0 holds four tiles, all later levels one tile each
        let index = |tx, ty, l| chunk_index(&header, TileCoordinates {
            tile_index: Vec2(tx, ty), level_index: Vec2(l, l),
        }).unwrap();

        assert_eq!(index(0, 0, 0), 0);
        assert_eq!(index(1, 0, 0), 1);
        assert_eq!(index(0, 1, 0), 2);
        assert_eq!(index(1, 1, 0), 3);
        assert_eq!(index(0, 0, 1), 4);
        assert_eq!(index(0, 0, 2), 5);
        assert_eq!(index(0, 0, 5), 8);

        assert_eq!(header.chunk_count(), 9);
    }

    #[test]
    fn partial_border_tiles_are_clipped() {
        let header = tiled_header(Vec2(20, 20), 16, LevelMode::One);

        let border = block_pixel_rect(&header, TileCoordinates {
            tile_index: Vec2(1, 1), level_index: Vec2(0, 0),
        }).unwrap();

        assert_eq!(border.position, Vec2(16, 16));
        assert_eq!(border.size, Vec2(4, 4));
    }

    #[test]
    fn scan_line_blocks_cover_the_data_window() {
        let header = Header::new(
            ChannelList::new(smallvec![
                ChannelDescription::new(Text::new("G").unwrap(), SampleType::F32, false),
            ]),
            IntegerBounds::new(Vec2(0, -3), Vec2(7, 37)),
        ).with_compression(Compression::ZIP16);

        let blocks = blocks_increasing_y(&header).unwrap();
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0].pixel_rect.position.y(), -3);
        assert_eq!(blocks[0].pixel_rect.size.height(), 16);
        assert_eq!(blocks[2].pixel_rect.size.height(), 37 - 32);
    }

    #[test]
    fn gather_scatter_roundtrip() {
        let channels = ChannelList::new(smallvec![
            ChannelDescription::new(Text::new("B").unwrap(), SampleType::F32, false),
            ChannelDescription::new(Text::new("G").unwrap(), SampleType::F16, false),
        ]);

        let rect = IntegerBounds::from_dimensions(Vec2(5, 3));
        let mut frame_buffer = FrameBuffer::alloc(&channels, rect);

        for y in 0..3 { for x in 0..5 {
            frame_buffer.get_mut(&Text::new("B").unwrap()).unwrap().set(x, y, (x + y * 5) as f32);
            frame_buffer.get_mut(&Text::new("G").unwrap()).unwrap().set(x, y, x as f32 * 0.25);
        } }

        let bytes = gather_channel_bytes(&channels, &frame_buffer, rect).unwrap();
        assert_eq!(bytes.len(), channels.byte_size_of_rect(rect));

        let mut target = FrameBuffer::alloc(&channels, rect);
        scatter_channel_bytes(&channels, &mut target, rect, &bytes, None).unwrap();

        assert_eq!(frame_buffer, target);
    }
}

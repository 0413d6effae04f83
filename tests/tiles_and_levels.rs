extern crate exrio;

#[macro_use]
extern crate smallvec;

use std::io::Cursor;

use exrio::block::chunk::TileCoordinates;
use exrio::compression::Compression;
use exrio::frame::FrameBuffer;
use exrio::meta::attribute::*;
use exrio::meta::header::Header;
use exrio::pixel::levels::{generate_mip_levels, LevelFilter, LevelGeneration};
use exrio::prelude::*;
use exrio::tiled::{TiledReader, TiledWriter};

fn green() -> Text { Text::new("G").unwrap() }

fn tiled_header(size: Vec2<usize>, tile: usize, mode: LevelMode) -> Header {
    Header::new(
        ChannelList::new(smallvec![
            ChannelDescription::new(green(), SampleType::F16, false),
        ]),
        IntegerBounds::from_dimensions(size),
    ).with_tiles(TileDescription {
        tile_size: Vec2(tile, tile),
        level_mode: mode,
        rounding_mode: RoundingMode::Down,
    })
}

#[test]
fn mip_map_pyramid_of_a_constant_image() {
    // a constant 32x32 half image, written as a mip mapped
    // tiled file with 16x16 tiles and a box filter
    let header = tiled_header(Vec2(32, 32), 16, LevelMode::MipMap);
    let data_window = header.data_window;

    let mut full_resolution = FrameBuffer::alloc(&header.channels, data_window);
    for y in 0..32 { for x in 0..32 {
        full_resolution.get_mut(&green()).unwrap().set(x, y, 0.5_f32);
    } }

    let levels = generate_mip_levels(&header.channels, &full_resolution, data_window, LevelGeneration {
        filter: LevelFilter::Box,
        rounding_mode: RoundingMode::Down,
        clamp_negative: false,
    }).unwrap();

    assert_eq!(levels.len(), 6); // 32, 16, 8, 4, 2, 1

    let mut writer = TiledWriter::new(Cursor::new(Vec::new()), header).unwrap();

    for (level_index, level) in levels.iter().enumerate() {
        writer.write_level(level, Vec2(level_index, level_index)).unwrap();
    }

    let bytes = writer.finish().unwrap().into_inner();

    let mut reader = TiledReader::new(Cursor::new(bytes)).unwrap();

    // four tiles at full resolution, one tile at each smaller level
    assert_eq!(reader.offset_table().len(), 4 + 1 + 1 + 1 + 1 + 1);

    // the deepest level holds a single pixel, still of value 0.5
    let deepest_level = Vec2(5, 5);
    let bounds = reader.level_bounds(deepest_level).unwrap();
    assert_eq!(bounds.size, Vec2(1, 1));

    let mut smallest = FrameBuffer::alloc(&reader.header().channels, bounds);
    reader.read_tile(&mut smallest, TileCoordinates {
        tile_index: Vec2(0, 0),
        level_index: deepest_level,
    }).unwrap();

    assert_eq!(smallest.get(&green()).unwrap().get_f32(0, 0), 0.5);
}

#[test]
fn mip_map_gradient_with_triangle_filter_roundtrip() {
    let header = tiled_header(Vec2(64, 32), 16, LevelMode::MipMap)
        .with_compression(Compression::ZIP16);

    let data_window = header.data_window;

    let mut full_resolution = FrameBuffer::alloc(&header.channels, data_window);
    for y in 0..32 { for x in 0..64 {
        full_resolution.get_mut(&green()).unwrap().set(x, y, x as f32 / 64.0);
    } }

    let levels = generate_mip_levels(&header.channels, &full_resolution, data_window, LevelGeneration {
        filter: LevelFilter::Triangle,
        rounding_mode: RoundingMode::Down,
        clamp_negative: false,
    }).unwrap();

    assert_eq!(levels.len(), 7); // 64, 32, 16, 8, 4, 2, 1

    let mut writer = TiledWriter::new(Cursor::new(Vec::new()), header).unwrap();
    for (level_index, level) in levels.iter().enumerate() {
        writer.write_level(level, Vec2(level_index, level_index)).unwrap();
    }

    let bytes = writer.finish().unwrap().into_inner();

    let mut reader = TiledReader::new(Cursor::new(bytes)).unwrap();

    // level 2 halves the gradient twice, values stay in the same range
    let bounds = reader.level_bounds(Vec2(2, 2)).unwrap();
    assert_eq!(bounds.size, Vec2(16, 8));

    let mut level_two = FrameBuffer::alloc(&reader.header().channels, bounds);
    reader.read_level(&mut level_two, Vec2(2, 2)).unwrap();

    for x in 0..16 {
        let value = level_two.get(&green()).unwrap().get_f32(x, 4);
        let expected = (x * 4) as f32 / 64.0;
        assert!((value - expected).abs() < 0.1, "column {}: {} vs {}", x, value, expected);
    }
}

#[test]
fn partial_border_tiles_roundtrip() {
    // 20 is not divisible by 16, so the right and bottom tiles are partial
    let header = tiled_header(Vec2(20, 20), 16, LevelMode::One)
        .with_compression(Compression::RLE);

    let data_window = header.data_window;

    let mut frame_buffer = FrameBuffer::alloc(&header.channels, data_window);
    for y in 0..20 { for x in 0..20 {
        frame_buffer.get_mut(&green()).unwrap().set(x, y, (x * 20 + y) as f32);
    } }

    let mut writer = TiledWriter::new(Cursor::new(Vec::new()), header).unwrap();
    writer.write_level(&frame_buffer, Vec2(0, 0)).unwrap();
    let bytes = writer.finish().unwrap().into_inner();

    let mut reader = TiledReader::new(Cursor::new(bytes)).unwrap();
    assert_eq!(reader.offset_table().len(), 4);

    let mut read_buffer = FrameBuffer::alloc(&reader.header().channels, reader.header().data_window);
    reader.read_level(&mut read_buffer, Vec2(0, 0)).unwrap();

    assert_eq!(frame_buffer, read_buffer);
}

#[test]
fn single_tiles_can_be_read_randomly() {
    let header = tiled_header(Vec2(32, 32), 8, LevelMode::One);
    let data_window = header.data_window;

    let mut frame_buffer = FrameBuffer::alloc(&header.channels, data_window);
    for y in 0..32 { for x in 0..32 {
        frame_buffer.get_mut(&green()).unwrap().set(x, y, (x / 8 + (y / 8) * 4) as f32);
    } }

    let mut writer = TiledWriter::new(Cursor::new(Vec::new()), header).unwrap();
    writer.write_level(&frame_buffer, Vec2(0, 0)).unwrap();
    let bytes = writer.finish().unwrap().into_inner();

    let mut reader = TiledReader::new(Cursor::new(bytes)).unwrap();
    let mut read_buffer = FrameBuffer::alloc(&reader.header().channels, reader.header().data_window);

    // read only the tile at grid position (2, 3)
    reader.read_tile(&mut read_buffer, TileCoordinates {
        tile_index: Vec2(2, 3),
        level_index: Vec2(0, 0),
    }).unwrap();

    assert_eq!(read_buffer.get(&green()).unwrap().get_f32(17, 25), (2 + 3 * 4) as f32);

    // pixels of unread tiles stay at their initial value
    assert_eq!(read_buffer.get(&green()).unwrap().get_f32(0, 0), 0.0);
}

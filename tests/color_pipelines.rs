extern crate exrio;

#[macro_use]
extern crate smallvec;

use std::io::Cursor;

use exrio::compression::Compression;
use exrio::frame::{FrameBuffer, Slice};
use exrio::meta::attribute::*;
use exrio::meta::header::Header;
use exrio::pixel::aces::{AcesReader, AcesWriter, ACES_CHROMATICITIES, REC_709_CHROMATICITIES};
use exrio::pixel::luma::{rgb_to_yc, yc_channels, yc_to_rgb};
use exrio::prelude::*;
use exrio::scanline::{ScanlineReader, ScanlineWriter};

fn name(text: &str) -> Text { Text::new(text).unwrap() }

fn rgb_channels() -> ChannelList {
    ChannelList::new(smallvec![
        ChannelDescription::new(name("B"), SampleType::F32, false),
        ChannelDescription::new(name("G"), SampleType::F32, false),
        ChannelDescription::new(name("R"), SampleType::F32, false),
    ])
}

#[test]
fn aces_files_with_aces_colorimetry_pass_through() {
    let channels = rgb_channels();
    let data_window = IntegerBounds::from_dimensions(Vec2(8, 8));
    let header = Header::new(channels.clone(), data_window);

    let mut frame_buffer = FrameBuffer::alloc(&channels, data_window);
    for y in 0..8 { for x in 0..8 {
        frame_buffer.get_mut(&name("R")).unwrap().set(x, y, 0.75_f32);
        frame_buffer.get_mut(&name("G")).unwrap().set(x, y, 0.25_f32);
        frame_buffer.get_mut(&name("B")).unwrap().set(x, y, 0.125_f32);
    } }

    // the aces writer injects the aces chromaticities
    let mut writer = AcesWriter::new(Cursor::new(Vec::new()), header).unwrap();
    writer.write_pixels(&frame_buffer).unwrap();
    let bytes = writer.finish().unwrap().into_inner();

    let mut reader = AcesReader::new(Cursor::new(bytes)).unwrap();
    assert_eq!(reader.header().chromaticities, Some(ACES_CHROMATICITIES));
    assert!(!reader.needs_color_conversion());

    let mut read_buffer = FrameBuffer::alloc(&reader.header().channels, data_window);
    reader.read_all_pixels(&mut read_buffer).unwrap();

    // without conversion, pixel values pass through bit-exactly
    assert_eq!(read_buffer.get(&name("R")).unwrap().get_f32(3, 3), 0.75);
    assert_eq!(read_buffer.get(&name("G")).unwrap().get_f32(3, 3), 0.25);
    assert_eq!(read_buffer.get(&name("B")).unwrap().get_f32(3, 3), 0.125);
}

#[test]
fn rec709_files_are_adapted_to_aces() {
    let channels = rgb_channels();
    let data_window = IntegerBounds::from_dimensions(Vec2(4, 4));

    let mut header = Header::new(channels.clone(), data_window)
        .with_compression(Compression::ZIP16);
    header.chromaticities = Some(REC_709_CHROMATICITIES);

    let mut frame_buffer = FrameBuffer::alloc(&channels, data_window);
    for y in 0..4 { for x in 0..4 {
        frame_buffer.get_mut(&name("R")).unwrap().set(x, y, 1.0_f32);
        frame_buffer.get_mut(&name("G")).unwrap().set(x, y, 0.5_f32);
        frame_buffer.get_mut(&name("B")).unwrap().set(x, y, 0.25_f32);
    } }

    let mut writer = ScanlineWriter::new(Cursor::new(Vec::new()), header).unwrap();
    writer.write_pixels(&frame_buffer).unwrap();
    let bytes = writer.finish().unwrap().into_inner();

    let mut reader = AcesReader::new(Cursor::new(bytes)).unwrap();
    assert!(reader.needs_color_conversion());

    let mut read_buffer = FrameBuffer::alloc(&reader.header().channels, data_window);
    reader.read_all_pixels(&mut read_buffer).unwrap();

    for channel in ["R", "G", "B"] {
        let value = read_buffer.get(&name(channel)).unwrap().get_f32(2, 2);
        assert!(value.is_finite(), "{} is {}", channel, value);
        assert!(value.abs() <= 10.0, "{} is {}", channel, value);
    }

    // converted values differ from the stored ones
    let red = read_buffer.get(&name("R")).unwrap().get_f32(2, 2);
    assert!((red - 1.0).abs() > 1e-4);
}

#[test]
fn aces_writer_refuses_forbidden_compression() {
    let header = Header::new(rgb_channels(), IntegerBounds::from_dimensions(Vec2(4, 4)))
        .with_compression(Compression::ZIP16);

    assert!(AcesWriter::new(Cursor::new(Vec::new()), header).is_err());

    let header = Header::new(rgb_channels(), IntegerBounds::from_dimensions(Vec2(4, 4)))
        .with_compression(Compression::PIZ);

    assert!(AcesWriter::new(Cursor::new(Vec::new()), header).is_ok());
}

#[test]
fn luminance_chroma_file_roundtrip() {
    // encode a 64x64 rgb image as luminance/chroma with 2x2
    // subsampled chroma, write it, read it back and reconstruct rgb
    let data_window = IntegerBounds::from_dimensions(Vec2(64, 64));

    let mut rgb = FrameBuffer::new();
    rgb.insert(name("R"), Slice::new(SampleType::F32, data_window));
    rgb.insert(name("G"), Slice::new(SampleType::F32, data_window));
    rgb.insert(name("B"), Slice::new(SampleType::F32, data_window));

    // left half: smooth colors; right half: grayscale
    for y in 0..64 { for x in 0..64 {
        let (r, g, b) = if x < 32 {
            (x as f32 / 64.0, y as f32 / 64.0, (x + y) as f32 / 128.0)
        } else {
            let gray = y as f32 / 64.0;
            (gray, gray, gray)
        };

        rgb.get_mut(&name("R")).unwrap().set(x, y, r);
        rgb.get_mut(&name("G")).unwrap().set(x, y, g);
        rgb.get_mut(&name("B")).unwrap().set(x, y, b);
    } }

    let yc = rgb_to_yc(&rgb, data_window, SampleType::F32).unwrap();

    let header = Header::new(yc_channels(SampleType::F32), data_window)
        .with_compression(Compression::ZIP16);

    let mut writer = ScanlineWriter::new(Cursor::new(Vec::new()), header).unwrap();
    writer.write_pixels(&yc).unwrap();
    let bytes = writer.finish().unwrap().into_inner();

    let mut reader = ScanlineReader::new(Cursor::new(bytes)).unwrap();
    let mut read_yc = FrameBuffer::alloc(&reader.header().channels, data_window);
    reader.read_all_pixels(&mut read_yc).unwrap();

    let mut reconstructed = FrameBuffer::new();
    reconstructed.insert(name("R"), Slice::new(SampleType::F32, data_window));
    reconstructed.insert(name("G"), Slice::new(SampleType::F32, data_window));
    reconstructed.insert(name("B"), Slice::new(SampleType::F32, data_window));

    yc_to_rgb(&read_yc, &mut reconstructed, data_window).unwrap();

    // mean error stays below 5 percent
    let mut total_error = 0.0;
    let mut count = 0;

    for channel in ["R", "G", "B"] {
        for y in 0..64 { for x in 0..64 {
            let original = rgb.get(&name(channel)).unwrap().get_f32(x, y);
            let lossy = reconstructed.get(&name(channel)).unwrap().get_f32(x, y);
            total_error += (original - lossy).abs();
            count += 1;
        } }
    }

    let mean_error = total_error / count as f32;
    assert!(mean_error < 0.05, "mean error {}", mean_error);

    // grayscale regions must stay gray within one percent
    for y in 1..63 { for x in 34..62 {
        let r = reconstructed.get(&name("R")).unwrap().get_f32(x, y);
        let g = reconstructed.get(&name("G")).unwrap().get_f32(x, y);
        let b = reconstructed.get(&name("B")).unwrap().get_f32(x, y);

        assert!((r - g).abs() < 0.01, "at {},{}: r {} g {}", x, y, r, g);
        assert!((b - g).abs() < 0.01, "at {},{}: b {} g {}", x, y, b, g);
    } }
}

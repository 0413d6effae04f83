extern crate exrio;

#[macro_use]
extern crate smallvec;

use std::io::Cursor;

use exrio::compression::Compression;
use exrio::frame::FrameBuffer;
use exrio::meta::attribute::*;
use exrio::meta::header::Header;
use exrio::prelude::*;
use exrio::scanline::{ScanlineReader, ScanlineWriter};

fn channels_of(sample_type: SampleType) -> ChannelList {
    ChannelList::new(smallvec![
        ChannelDescription::new(Text::new("B").unwrap(), sample_type, false),
        ChannelDescription::new(Text::new("G").unwrap(), sample_type, false),
        ChannelDescription::new(Text::new("R").unwrap(), sample_type, false),
    ])
}

fn noise_frame_buffer(channels: &ChannelList, data_window: IntegerBounds) -> FrameBuffer {
    let mut frame_buffer = FrameBuffer::alloc(channels, data_window);

    for channel in &channels.list {
        let slice = frame_buffer.get_mut(&channel.name).unwrap();

        for y in data_window.position.y()..data_window.end().y() {
            for x in data_window.position.x()..data_window.end().x() {
                match channel.sample_type {
                    // avoid nan bit patterns, which never compare equal
                    SampleType::F16 => slice.set(x, y, f16::from_f32(rand::random::<f32>() * 100.0 - 50.0)),
                    SampleType::F32 => slice.set(x, y, rand::random::<f32>() * 1000.0 - 500.0),
                    SampleType::U32 => slice.set(x, y, rand::random::<u32>()),
                }
            }
        }
    }

    frame_buffer
}

#[test]
fn lossless_file_roundtrip_for_every_type_and_size() {
    let lossless = [
        Compression::Uncompressed, Compression::RLE,
        Compression::ZIP1, Compression::ZIP16, Compression::PIZ,
    ];

    let sizes = [
        Vec2(1_usize, 1_usize), Vec2(3, 2), Vec2(16, 17), Vec2(64, 64),
    ];

    for &compression in &lossless {
        for &sample_type in &[SampleType::F16, SampleType::F32, SampleType::U32] {
            for &size in &sizes {
                let channels = channels_of(sample_type);
                let header = Header::new(channels.clone(), IntegerBounds::from_dimensions(size))
                    .with_compression(compression);

                let frame_buffer = noise_frame_buffer(&channels, header.data_window);

                let mut writer = ScanlineWriter::new(Cursor::new(Vec::new()), header).unwrap();
                writer.write_pixels(&frame_buffer).unwrap();
                let bytes = writer.finish().unwrap().into_inner();

                let mut reader = ScanlineReader::new(Cursor::new(bytes)).unwrap();
                let mut read_buffer = FrameBuffer::alloc(&reader.header().channels, reader.header().data_window);
                reader.read_all_pixels(&mut read_buffer).unwrap();

                assert_eq!(
                    frame_buffer, read_buffer,
                    "{} with {:?} at {:?}", compression, sample_type, size
                );
            }
        }
    }
}

#[test]
fn negative_data_window_roundtrip() {
    let channels = channels_of(SampleType::F32);

    let header = Header::new(channels.clone(), IntegerBounds::new(Vec2(-20, -30), Vec2(40, 25)))
        .with_compression(Compression::ZIP16);

    let frame_buffer = noise_frame_buffer(&channels, header.data_window);

    let mut writer = ScanlineWriter::new(Cursor::new(Vec::new()), header).unwrap();
    writer.write_pixels(&frame_buffer).unwrap();
    let bytes = writer.finish().unwrap().into_inner();

    let mut reader = ScanlineReader::new(Cursor::new(bytes)).unwrap();
    assert_eq!(reader.header().data_window.position, Vec2(-20, -30));

    let mut read_buffer = FrameBuffer::alloc(&reader.header().channels, reader.header().data_window);
    reader.read_all_pixels(&mut read_buffer).unwrap();

    assert_eq!(frame_buffer, read_buffer);
}

#[test]
fn piz_gradient_image_is_close() {
    // a 32x32 half rgba gradient, compressed with piz
    let channels = ChannelList::new(smallvec![
        ChannelDescription::new(Text::new("A").unwrap(), SampleType::F16, false),
        ChannelDescription::new(Text::new("B").unwrap(), SampleType::F16, false),
        ChannelDescription::new(Text::new("G").unwrap(), SampleType::F16, false),
        ChannelDescription::new(Text::new("R").unwrap(), SampleType::F16, false),
    ]);

    let data_window = IntegerBounds::from_dimensions(Vec2(32, 32));
    let header = Header::new(channels.clone(), data_window).with_compression(Compression::PIZ);

    let mut frame_buffer = FrameBuffer::alloc(&channels, data_window);

    let expected = |channel: &str, x: i32, y: i32| -> f32 {
        match channel {
            "R" => x as f32 / 32.0,
            "G" => y as f32 / 32.0,
            "B" => (x + y) as f32 / 64.0,
            _ => 1.0,
        }
    };

    for channel in ["R", "G", "B", "A"] {
        let slice = frame_buffer.get_mut(&Text::new(channel).unwrap()).unwrap();
        for y in 0..32 { for x in 0..32 {
            slice.set(x, y, f16::from_f32(expected(channel, x, y)));
        } }
    }

    let mut writer = ScanlineWriter::new(Cursor::new(Vec::new()), header).unwrap();
    writer.write_pixels(&frame_buffer).unwrap();
    let bytes = writer.finish().unwrap().into_inner();

    let mut reader = ScanlineReader::new(Cursor::new(bytes)).unwrap();
    let mut read_buffer = FrameBuffer::alloc(&reader.header().channels, reader.header().data_window);
    reader.read_all_pixels(&mut read_buffer).unwrap();

    let mut max_error = 0.0_f32;

    for channel in ["R", "G", "B", "A"] {
        let slice = read_buffer.get(&Text::new(channel).unwrap()).unwrap();
        for y in 0..32 { for x in 0..32 {
            let error = (slice.get_f32(x, y) - expected(channel, x, y)).abs();
            max_error = max_error.max(error);
        } }
    }

    // piz is lossless, so the only error is the half precision of the input
    assert!(max_error <= 0.01, "max error {}", max_error);
}

#[test]
fn header_serialization_is_byte_identical() {
    let header = Header::new(
        channels_of(SampleType::F16),
        IntegerBounds::from_dimensions(Vec2(100, 100)),
    )
        .with_compression(Compression::ZIP16)
        .with_attribute(Text::new("zOwner").unwrap(), AttributeValue::Text(Text::new("Test").unwrap()))
        .with_attribute(Text::new("customFloat").unwrap(), AttributeValue::F32(1.5))
        .with_attribute(Text::new("anotherAttr").unwrap(), AttributeValue::I32(42));

    let serialize = |header: &Header| {
        let mut bytes = Vec::new();
        header.write(&mut bytes).unwrap();
        bytes
    };

    let first = serialize(&header);

    for _ in 0..9 {
        assert_eq!(first, serialize(&header), "header serialization must be deterministic");
    }
}

#[test]
fn attributes_survive_a_file_roundtrip() {
    let channels = channels_of(SampleType::F16);

    let mut time_code = TimeCode::new(1, 2, 3, 4).unwrap();
    time_code.set_drop_frame(true);

    let header = Header::new(channels.clone(), IntegerBounds::from_dimensions(Vec2(4, 4)))
        .with_compression(Compression::RLE)
        .with_attribute(Text::new("comment").unwrap(), AttributeValue::Text(Text::new("written by a test").unwrap()))
        .with_attribute(Text::new("sharpness").unwrap(), AttributeValue::F64(0.125))
        .with_attribute(Text::new("region").unwrap(), AttributeValue::IntegerBounds(
            IntegerBounds::new(Vec2(1, 2), Vec2(3, 4))
        ))
        .with_attribute(Text::new("timing").unwrap(), AttributeValue::TimeCode(time_code))
        .with_attribute(Text::new("kernel").unwrap(), AttributeValue::FloatVector(vec![1.0, 2.0, 1.0]))
        .with_attribute(Text::new("mystery").unwrap(), AttributeValue::Opaque {
            kind: Text::new("futureType").unwrap(),
            bytes: vec![1, 2, 3, 4, 5, 6, 7],
        });

    let frame_buffer = FrameBuffer::alloc(&channels, header.data_window);

    let mut writer = ScanlineWriter::new(Cursor::new(Vec::new()), header.clone()).unwrap();
    writer.write_pixels(&frame_buffer).unwrap();
    let bytes = writer.finish().unwrap().into_inner();

    let reader = ScanlineReader::new(Cursor::new(bytes)).unwrap();
    let parsed = reader.header();

    for name in ["comment", "sharpness", "region", "timing", "kernel", "mystery"] {
        let name = Text::new(name).unwrap();
        assert_eq!(
            parsed.custom_attributes.get(&name),
            header.custom_attributes.get(&name),
            "attribute {}", name
        );
    }
}

#[test]
fn zip_level_does_not_affect_decoded_pixels() {
    let channels = channels_of(SampleType::F32);
    let data_window = IntegerBounds::from_dimensions(Vec2(31, 33));

    let frame_buffer = noise_frame_buffer(&channels, data_window);
    let mut decoded_versions = Vec::new();

    for level in [1, 6, 9] {
        let header = Header::new(channels.clone(), data_window).with_compression(Compression::ZIP16);

        let mut writer = ScanlineWriter::new(Cursor::new(Vec::new()), header).unwrap();
        writer.set_zip_compression_level(level);
        writer.write_pixels(&frame_buffer).unwrap();
        let bytes = writer.finish().unwrap().into_inner();

        let mut reader = ScanlineReader::new(Cursor::new(bytes)).unwrap();
        let mut read_buffer = FrameBuffer::alloc(&reader.header().channels, reader.header().data_window);
        reader.read_all_pixels(&mut read_buffer).unwrap();

        decoded_versions.push(read_buffer);
    }

    assert_eq!(decoded_versions[0], frame_buffer);
    assert_eq!(decoded_versions[1], frame_buffer);
    assert_eq!(decoded_versions[2], frame_buffer);
}

#[test]
fn truncated_file_is_rejected() {
    let channels = channels_of(SampleType::F16);
    let header = Header::new(channels.clone(), IntegerBounds::from_dimensions(Vec2(16, 16)))
        .with_compression(Compression::ZIP16);

    let frame_buffer = FrameBuffer::alloc(&channels, header.data_window);

    let mut writer = ScanlineWriter::new(Cursor::new(Vec::new()), header).unwrap();
    writer.write_pixels(&frame_buffer).unwrap();
    let bytes = writer.finish().unwrap().into_inner();

    // magic number damage must be detected immediately
    let mut broken_magic = bytes.clone();
    broken_magic[0] = 0;
    assert!(ScanlineReader::new(Cursor::new(broken_magic)).is_err());

    // truncation within the header must be detected
    let truncated = bytes[..bytes.len().min(40)].to_vec();
    assert!(ScanlineReader::new(Cursor::new(truncated)).is_err());
}

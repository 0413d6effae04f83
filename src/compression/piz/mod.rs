
//! The piz compression method: a reversible wavelet transform
//! over 16-bit lanes, followed by huffman coding. The alphabet is
//! shrunk beforehand with a bitmap of the values that actually occur.

mod huffman;
mod wavelet;

use super::{ByteVec, Bytes};
use crate::error::{usize_to_u16, Error, Result};
use crate::io::Data;
use crate::math::{mod_p, Vec2};
use crate::meta::attribute::{ChannelList, IntegerBounds, SampleType};

const U16_RANGE: usize = 1 << 16;
const BITMAP_SIZE: usize = U16_RANGE >> 3;

#[derive(Debug)]
struct ChannelData {
    tmp_start_index: usize,
    tmp_end_index: usize,

    resolution: Vec2<usize>,
    y_sampling: usize,

    // 32-bit channels are compressed as two interleaved 16-bit lanes
    samples_per_pixel: usize,
}

fn channel_lanes(channels: &ChannelList, rectangle: IntegerBounds) -> (Vec<ChannelData>, usize) {
    let mut channel_data = Vec::with_capacity(channels.list.len());
    let mut tmp_end_index = 0;

    for channel in &channels.list {
        let resolution = channel.subsampled_resolution(rectangle.size);
        let samples_per_pixel = channel.sample_type.bytes_per_sample() / SampleType::F16.bytes_per_sample();

        let channel = ChannelData {
            tmp_start_index: tmp_end_index,
            tmp_end_index,
            resolution,
            y_sampling: channel.sampling.y(),
            samples_per_pixel,
        };

        tmp_end_index += resolution.area() * samples_per_pixel;
        channel_data.push(channel);
    }

    (channel_data, tmp_end_index)
}


pub fn compress(channels: &ChannelList, uncompressed: Bytes<'_>, rectangle: IntegerBounds) -> Result<ByteVec> {
    if uncompressed.is_empty() {
        return Ok(Vec::new());
    }

    let (mut channel_data, value_count) = channel_lanes(channels, rectangle);
    debug_assert_eq!(value_count * 2, uncompressed.len(), "chunk byte count mismatch");

    // rearrange the per-line interleaved bytes into per-channel planes of u16 values
    let mut tmp = vec![0_u16; value_count];
    let mut remaining_bytes = uncompressed;

    for y in rectangle.position.y()..rectangle.end().y() {
        for channel in &mut channel_data {
            if mod_p(y, channel.y_sampling as i32) != 0 { continue; }

            let u16s_per_line = channel.resolution.x() * channel.samples_per_pixel;
            let next_tmp_end_index = channel.tmp_end_index + u16s_per_line;
            let target = &mut tmp[channel.tmp_end_index..next_tmp_end_index];
            channel.tmp_end_index = next_tmp_end_index;

            u16::read_slice(&mut remaining_bytes, target)
                .map_err(|_| Error::decompression("in-memory read failed"))?;
        }
    }

    let (min_non_zero, max_non_zero, bitmap) = bitmap_from_data(&tmp);
    let (max_value, table) = forward_lookup_table_from_bitmap(&bitmap);
    apply_lookup_table(&mut tmp, &table);

    let mut piz_compressed = Vec::with_capacity(uncompressed.len() / 2);
    usize_to_u16(min_non_zero, "bitmap index")?.write(&mut piz_compressed)?;
    usize_to_u16(max_non_zero, "bitmap index")?.write(&mut piz_compressed)?;

    if min_non_zero <= max_non_zero {
        piz_compressed.extend_from_slice(&bitmap[min_non_zero..=max_non_zero]);
    }

    for channel in &channel_data {
        for offset in 0..channel.samples_per_pixel {
            wavelet::encode(
                &mut tmp[channel.tmp_start_index + offset .. channel.tmp_end_index],
                channel.resolution,
                Vec2(channel.samples_per_pixel, channel.resolution.x() * channel.samples_per_pixel),
                max_value,
            );
        }
    }

    let huffman_compressed = huffman::compress(&tmp)?;
    u8::write_i32_sized_slice(&mut piz_compressed, &huffman_compressed)?;

    Ok(piz_compressed)
}

pub fn decompress(channels: &ChannelList, compressed: Bytes<'_>, rectangle: IntegerBounds, expected_byte_size: usize) -> Result<ByteVec> {
    if compressed.is_empty() {
        return Ok(Vec::new());
    }

    let (mut channel_data, value_count) = channel_lanes(channels, rectangle);
    debug_assert_eq!(value_count * 2, expected_byte_size, "chunk byte count mismatch");

    let mut remaining_input = compressed;
    let min_non_zero = u16::read(&mut remaining_input)? as usize;
    let max_non_zero = u16::read(&mut remaining_input)? as usize;

    if max_non_zero >= BITMAP_SIZE || min_non_zero >= BITMAP_SIZE {
        return Err(Error::decompression("piz bitmap range"));
    }

    let mut bitmap = vec![0_u8; BITMAP_SIZE];
    if min_non_zero <= max_non_zero {
        u8::read_slice(&mut remaining_input, &mut bitmap[min_non_zero..=max_non_zero])?;
    }

    let (lookup_table, max_value) = reverse_lookup_table_from_bitmap(&bitmap);

    let length = i32::read(&mut remaining_input)?;
    if length < 0 || length as usize > remaining_input.len() {
        return Err(Error::decompression("piz data length"));
    }

    let mut tmp = huffman::decompress(&remaining_input[..length as usize], value_count)?;

    for channel in &channel_data {
        let u16_count = channel.resolution.area() * channel.samples_per_pixel;
        let u16s = &mut tmp[channel.tmp_start_index .. channel.tmp_start_index + u16_count];

        for offset in 0..channel.samples_per_pixel {
            wavelet::decode(
                &mut u16s[offset..],
                channel.resolution,
                Vec2(channel.samples_per_pixel, channel.resolution.x() * channel.samples_per_pixel),
                max_value,
            );
        }
    }

    // expand the lookup table indices back into the original value range
    apply_lookup_table(&mut tmp, &lookup_table);

    // rearrange the per-channel planes back into the per-line interleaved layout
    let mut out = Vec::with_capacity(expected_byte_size);

    for y in rectangle.position.y()..rectangle.end().y() {
        for channel in &mut channel_data {
            if mod_p(y, channel.y_sampling as i32) != 0 { continue; }

            let u16s_per_line = channel.resolution.x() * channel.samples_per_pixel;
            let next_tmp_end_index = channel.tmp_end_index + u16s_per_line;
            let values = &tmp[channel.tmp_end_index..next_tmp_end_index];
            channel.tmp_end_index = next_tmp_end_index;

            u16::write_slice(&mut out, values)
                .map_err(|_| Error::decompression("in-memory write failed"))?;
        }
    }

    for index in 1..channel_data.len() {
        debug_assert_eq!(channel_data[index - 1].tmp_end_index, channel_data[index].tmp_start_index);
    }

    debug_assert_eq!(out.len(), expected_byte_size);
    Ok(out)
}


/// Compress a flat byte payload as a single 16-bit lane.
/// Used for the payloads of deep chunks, which are always two-byte aligned.
pub fn compress_flat(uncompressed: Bytes<'_>) -> Result<ByteVec> {
    if uncompressed.len() % 2 != 0 {
        return Err(Error::unsupported("piz payloads must contain 16-bit data"));
    }

    let mut tmp = vec![0_u16; uncompressed.len() / 2];
    let mut remaining = uncompressed;
    u16::read_slice(&mut remaining, &mut tmp)
        .map_err(|_| Error::decompression("in-memory read failed"))?;

    let (min_non_zero, max_non_zero, bitmap) = bitmap_from_data(&tmp);
    let (_max_value, table) = forward_lookup_table_from_bitmap(&bitmap);
    apply_lookup_table(&mut tmp, &table);

    let mut piz_compressed = Vec::with_capacity(uncompressed.len() / 2);
    usize_to_u16(min_non_zero, "bitmap index")?.write(&mut piz_compressed)?;
    usize_to_u16(max_non_zero, "bitmap index")?.write(&mut piz_compressed)?;

    if min_non_zero <= max_non_zero {
        piz_compressed.extend_from_slice(&bitmap[min_non_zero..=max_non_zero]);
    }

    let huffman_compressed = huffman::compress(&tmp)?;
    u8::write_i32_sized_slice(&mut piz_compressed, &huffman_compressed)?;

    Ok(piz_compressed)
}

/// Decompress a flat byte payload of a deep chunk.
pub fn decompress_flat(compressed: Bytes<'_>, expected_byte_size: usize) -> Result<ByteVec> {
    if expected_byte_size % 2 != 0 {
        return Err(Error::unsupported("piz payloads must contain 16-bit data"));
    }

    let mut remaining_input = compressed;
    let min_non_zero = u16::read(&mut remaining_input)? as usize;
    let max_non_zero = u16::read(&mut remaining_input)? as usize;

    if max_non_zero >= BITMAP_SIZE || min_non_zero >= BITMAP_SIZE {
        return Err(Error::decompression("piz bitmap range"));
    }

    let mut bitmap = vec![0_u8; BITMAP_SIZE];
    if min_non_zero <= max_non_zero {
        u8::read_slice(&mut remaining_input, &mut bitmap[min_non_zero..=max_non_zero])?;
    }

    let (lookup_table, _max_value) = reverse_lookup_table_from_bitmap(&bitmap);

    let length = i32::read(&mut remaining_input)?;
    if length < 0 || length as usize > remaining_input.len() {
        return Err(Error::decompression("piz data length"));
    }

    let mut tmp = huffman::decompress(&remaining_input[..length as usize], expected_byte_size / 2)?;
    apply_lookup_table(&mut tmp, &lookup_table);

    let mut out = Vec::with_capacity(expected_byte_size);
    u16::write_slice(&mut out, &tmp)
        .map_err(|_| Error::decompression("in-memory write failed"))?;

    Ok(out)
}


/// A bitmap of the 16-bit values that occur in the data.
/// Zero is never marked, as the data is assumed to contain zeroes anyway.
fn bitmap_from_data(data: &[u16]) -> (usize, usize, Vec<u8>) {
    let mut bitmap = vec![0_u8; BITMAP_SIZE];

    for value in data {
        bitmap[*value as usize >> 3] |= 1 << (*value as u8 & 7);
    }

    bitmap[0] &= !1; // zero is not explicitly stored in the bitmap

    let min_index = bitmap.iter().position(|&value| value != 0);
    let max_index = min_index.map(|min| // only if min was found
        min + bitmap[min..].iter().rposition(|&value| value != 0).expect("min was found")
    );

    (min_index.unwrap_or(0), max_index.unwrap_or(0), bitmap)
}

/// Map all occurring values to a compact range, shrinking the huffman alphabet.
fn forward_lookup_table_from_bitmap(bitmap: &[u8]) -> (u16, Vec<u16>) {
    debug_assert_eq!(bitmap.len(), BITMAP_SIZE);

    let mut table = vec![0_u16; U16_RANGE];
    let mut count = 0_usize;

    for (index, entry) in table.iter_mut().enumerate() {
        if index == 0 || bitmap[index >> 3] & (1 << (index as u8 & 7)) != 0 {
            *entry = count as u16;
            count += 1;
        }
    }

    ((count - 1) as u16, table)
}

/// The inverse of the forward table, expanding compact indices back to values.
fn reverse_lookup_table_from_bitmap(bitmap: Bytes<'_>) -> (Vec<u16>, u16) {
    let mut table = Vec::with_capacity(U16_RANGE);

    for index in 0..U16_RANGE {
        if index == 0 || bitmap[index >> 3] & (1 << (index as u8 & 7)) != 0 {
            table.push(index as u16);
        }
    }

    debug_assert!(!table.is_empty());
    let max_value = (table.len() - 1) as u16;

    // fill up to the full range so that malformed input cannot index out of bounds
    table.resize(U16_RANGE, 0);

    (table, max_value)
}

fn apply_lookup_table(data: &mut [u16], table: &[u16]) {
    for value in data {
        *value = table[*value as usize];
    }
}


#[cfg(test)]
mod test {
    use super::*;
    use crate::meta::attribute::{ChannelDescription, Text};

    fn test_roundtrip_noise_with(channels: ChannelList, rectangle: IntegerBounds) {
        let byte_count = channels.byte_size_of_rect(rectangle);
        let pixel_bytes: ByteVec = (0..byte_count).map(|_| rand::random()).collect();

        let compressed = compress(&channels, &pixel_bytes, rectangle).unwrap();
        let decompressed = decompress(&channels, &compressed, rectangle, pixel_bytes.len()).unwrap();

        assert_eq!(pixel_bytes, decompressed);
    }

    #[test]
    fn roundtrip_any_sample_type() {
        for &sample_type in &[SampleType::F16, SampleType::F32, SampleType::U32] {
            let channel = ChannelDescription {
                sample_type,
                name: Text::new("channel").unwrap(),
                quantize_linearly: false,
                sampling: Vec2(1, 1),
            };

            let channels = ChannelList::new(smallvec![channel.clone(), channel]);

            let rectangle = IntegerBounds {
                position: Vec2(-30, 100),
                size: Vec2(322, 91),
            };

            test_roundtrip_noise_with(channels, rectangle);
        }
    }

    #[test]
    fn roundtrip_mixed_channels() {
        let channels = ChannelList::new(smallvec![
            ChannelDescription::new(Text::new("A").unwrap(), SampleType::F16, false),
            ChannelDescription::new(Text::new("B").unwrap(), SampleType::F32, false),
            ChannelDescription::new(Text::new("C").unwrap(), SampleType::U32, false),
        ]);

        let rectangle = IntegerBounds {
            position: Vec2(-3, 1),
            size: Vec2(223, 31),
        };

        test_roundtrip_noise_with(channels, rectangle);
    }

    #[test]
    fn roundtrip_tiny_and_odd_sizes() {
        let channel = ChannelDescription::new(Text::new("G").unwrap(), SampleType::F16, false);
        let channels = ChannelList::new(smallvec![channel]);

        for &(width, height) in &[(1_usize, 1_usize), (1, 32), (32, 1), (13, 17)] {
            test_roundtrip_noise_with(
                channels.clone(),
                IntegerBounds::from_dimensions(Vec2(width, height)),
            );
        }
    }

    #[test]
    fn roundtrip_flat_payload() {
        for length in [2_usize, 64, 4098, 100_000] {
            let payload: ByteVec = (0..length).map(|_| rand::random()).collect();

            let compressed = compress_flat(&payload).unwrap();
            let decompressed = decompress_flat(&compressed, payload.len()).unwrap();

            assert_eq!(payload, decompressed);
        }
    }

    #[test]
    fn constant_image_compresses_well() {
        let channel = ChannelDescription::new(Text::new("G").unwrap(), SampleType::F16, false);
        let channels = ChannelList::new(smallvec![channel]);
        let rectangle = IntegerBounds::from_dimensions(Vec2(64, 32));

        let half_bytes = half::f16::from_f32(0.25).to_bits().to_le_bytes();
        let bytes: ByteVec = std::iter::repeat(half_bytes).take(64 * 32).flatten().collect();

        let compressed = compress(&channels, &bytes, rectangle).unwrap();
        assert!(compressed.len() < bytes.len() / 10);

        let decompressed = decompress(&channels, &compressed, rectangle, bytes.len()).unwrap();
        assert_eq!(decompressed, bytes);
    }
}


//! Lossy 4x4 block compression of f16 channels. Each block packs into
//! 14 bytes; with the flat-field optimization, uniform blocks pack into 3.
//! Channels of other types are stored without compression.

use std::convert::TryInto;
use std::sync::OnceLock;

use half::f16;

use super::{ByteVec, Bytes};
use crate::error::{Error, Result};
use crate::math::{mod_p, Vec2};
use crate::meta::attribute::{ChannelList, IntegerBounds, SampleType};

const BLOCK_SAMPLE_COUNT: usize = 4;

// Number of bytes per packed block.
const BYTES_PER_BLOCK: usize = 14;
const BYTES_PER_FLAT_BLOCK: usize = 3;


/// The table applied to values of channels that quantize linearly, before packing.
fn exp_table() -> &'static [u16; 1 << 16] {
    static TABLE: OnceLock<Box<[u16; 1 << 16]>> = OnceLock::new();

    TABLE.get_or_init(|| {
        let mut table = vec![0_u16; 1 << 16];
        let half_max = f64::from(f16::MAX.to_f32());

        for (bits, entry) in table.iter_mut().enumerate() {
            let value = f64::from(f16::from_bits(bits as u16).to_f32());

            let converted = if !value.is_finite() { 0.0 }
                else if value >= 8.0 * half_max.ln() { half_max }
                else { (value / 8.0).exp() };

            *entry = f16::from_f64(converted).to_bits();
        }

        table.into_boxed_slice().try_into().expect("table length is correct")
    })
}

/// The inverse of `exp_table`, applied after unpacking.
fn log_table() -> &'static [u16; 1 << 16] {
    static TABLE: OnceLock<Box<[u16; 1 << 16]>> = OnceLock::new();

    TABLE.get_or_init(|| {
        let mut table = vec![0_u16; 1 << 16];

        for (bits, entry) in table.iter_mut().enumerate() {
            let value = f64::from(f16::from_bits(bits as u16).to_f32());

            let converted = if !value.is_finite() || value < 0.0 { 0.0 }
                else { 8.0 * value.ln() };

            *entry = f16::from_f64(converted).to_bits();
        }

        table.into_boxed_slice().try_into().expect("table length is correct")
    })
}

fn convert_from_linear(samples: &mut [u16; 16]) {
    let table = exp_table();
    for sample in samples.iter_mut() {
        *sample = table[*sample as usize];
    }
}

fn convert_to_linear(samples: &mut [u16; 16]) {
    let table = log_table();
    for sample in samples.iter_mut() {
        *sample = table[*sample as usize];
    }
}


fn shift_and_round(x: i32, shift: i32) -> i32 {
    let x = x << 1;
    let a = (1 << shift) - 1;
    let shift = shift + 1;
    let b = (x >> shift) & 1;
    (x + a + b) >> shift
}

/// Pack a block of 4 by 4 16-bit pixels (32 bytes)
/// into either 14 or, for uniform blocks, 3 bytes.
fn pack(s: [u16; 16], b: &mut [u8], optimize_flat_fields: bool, exact_max: bool) -> usize {

    // bias the values so that the ordering of the bit patterns
    // matches the ordering of the floating point values
    let mut t = [0_u16; 16];

    for i in 0..16 {
        if (s[i] & 0x7c00) == 0x7c00 {
            t[i] = 0x8000; // infinities and nans quantize to a large value
        } else if (s[i] & 0x8000) != 0 {
            t[i] = !s[i];
        } else {
            t[i] = s[i] | 0x8000;
        }
    }

    let t_max = t.iter().cloned().max().expect("block is never empty");

    // compute a set of running differences r[0] ... r[14], and find a shift
    // value such that after rounding off the rightmost bits, all differences
    // fit between -32 and +31, then bias them to 0 ... 63

    let mut shift = -1_i32;
    let mut d = [0_i32; 16];
    let mut r = [0_i32; 15];
    let mut r_min: i32;
    let mut r_max: i32;

    const BIAS: i32 = 0x20;

    loop {
        shift += 1;

        for i in 0..16 {
            d[i] = shift_and_round(i32::from(t_max - t[i]), shift);
        }

        r[0] = d[0] - d[4] + BIAS;
        r[1] = d[4] - d[8] + BIAS;
        r[2] = d[8] - d[12] + BIAS;

        r[3] = d[0] - d[1] + BIAS;
        r[4] = d[4] - d[5] + BIAS;
        r[5] = d[8] - d[9] + BIAS;
        r[6] = d[12] - d[13] + BIAS;

        r[7] = d[1] - d[2] + BIAS;
        r[8] = d[5] - d[6] + BIAS;
        r[9] = d[9] - d[10] + BIAS;
        r[10] = d[13] - d[14] + BIAS;

        r[11] = d[2] - d[3] + BIAS;
        r[12] = d[6] - d[7] + BIAS;
        r[13] = d[10] - d[11] + BIAS;
        r[14] = d[14] - d[15] + BIAS;

        r_min = r[0];
        r_max = r[0];

        for &difference in r.iter() {
            r_min = r_min.min(difference);
            r_max = r_max.max(difference);
        }

        if r_min >= 0 && r_max <= 0x3f {
            break;
        }
    }

    if r_min == BIAS && r_max == BIAS && optimize_flat_fields {
        // all pixels have the same value; encode them in 3 instead of
        // 14 bytes by storing 0xfc in the third byte, a bit pattern
        // that cannot occur in the 14-byte encoding
        b[0] = (t[0] >> 8) as u8;
        b[1] = t[0] as u8;
        b[2] = 0xfc;

        return BYTES_PER_FLAT_BLOCK;
    }

    if exact_max {
        // adjust t[0] so that the pixel whose value equals
        // t_max is represented as accurately as possible
        t[0] = t_max.wrapping_sub((d[0] << shift) as u16);
    }

    // pack t[0], the shift, and r[0] ... r[14] into 14 bytes
    b[0] = (t[0] >> 8) as u8;
    b[1] = t[0] as u8;

    b[2] = ((shift << 2) | (r[0] >> 4)) as u8;
    b[3] = ((r[0] << 4) | (r[1] >> 2)) as u8;
    b[4] = ((r[1] << 6) | r[2]) as u8;

    b[5] = ((r[3] << 2) | (r[4] >> 4)) as u8;
    b[6] = ((r[4] << 4) | (r[5] >> 2)) as u8;
    b[7] = ((r[5] << 6) | r[6]) as u8;

    b[8] = ((r[7] << 2) | (r[8] >> 4)) as u8;
    b[9] = ((r[8] << 4) | (r[9] >> 2)) as u8;
    b[10] = ((r[9] << 6) | r[10]) as u8;

    b[11] = ((r[11] << 2) | (r[12] >> 4)) as u8;
    b[12] = ((r[12] << 4) | (r[13] >> 2)) as u8;
    b[13] = ((r[13] << 6) | r[14]) as u8;

    BYTES_PER_BLOCK
}

const SIX_BITS: u32 = 0x3f;

/// Unpack a 14-byte block into 4 by 4 16-bit pixels.
fn unpack14(b: &[u8], s: &mut [u16; 16]) {
    debug_assert_eq!(b.len(), BYTES_PER_BLOCK);
    debug_assert_ne!(b[2], 0xfc);

    let b_u32 = |index: usize| u32::from(b[index]);

    s[0] = ((b_u32(0) << 8) | b_u32(1)) as u16;

    let shift = b_u32(2) >> 2;
    let bias = 0x20_u32 << shift;

    let delta = |accumulator: u16, difference: u32| -> u16 {
        (u32::from(accumulator)
            .wrapping_add(difference << shift)
            .wrapping_sub(bias)) as u16
    };

    s[4] = delta(s[0], ((b_u32(2) << 4) | (b_u32(3) >> 4)) & SIX_BITS);
    s[8] = delta(s[4], ((b_u32(3) << 2) | (b_u32(4) >> 6)) & SIX_BITS);
    s[12] = delta(s[8], b_u32(4) & SIX_BITS);

    s[1] = delta(s[0], b_u32(5) >> 2);
    s[5] = delta(s[4], ((b_u32(5) << 4) | (b_u32(6) >> 4)) & SIX_BITS);
    s[9] = delta(s[8], ((b_u32(6) << 2) | (b_u32(7) >> 6)) & SIX_BITS);
    s[13] = delta(s[12], b_u32(7) & SIX_BITS);

    s[2] = delta(s[1], b_u32(8) >> 2);
    s[6] = delta(s[5], ((b_u32(8) << 4) | (b_u32(9) >> 4)) & SIX_BITS);
    s[10] = delta(s[9], ((b_u32(9) << 2) | (b_u32(10) >> 6)) & SIX_BITS);
    s[14] = delta(s[13], b_u32(10) & SIX_BITS);

    s[3] = delta(s[2], b_u32(11) >> 2);
    s[7] = delta(s[6], ((b_u32(11) << 4) | (b_u32(12) >> 4)) & SIX_BITS);
    s[11] = delta(s[10], ((b_u32(12) << 2) | (b_u32(13) >> 6)) & SIX_BITS);
    s[15] = delta(s[14], b_u32(13) & SIX_BITS);

    // unbias the bit patterns back into half floats
    for sample in s.iter_mut() {
        if (*sample & 0x8000) != 0 {
            *sample &= 0x7fff;
        } else {
            *sample = !*sample;
        }
    }
}

/// Unpack a 3-byte block into 4 by 4 identical 16-bit pixels.
fn unpack3(b: &[u8], s: &mut [u16; 16]) {
    debug_assert_eq!(b[2], 0xfc);

    s[0] = ((u32::from(b[0]) << 8) | u32::from(b[1])) as u16;

    if (s[0] & 0x8000) != 0 {
        s[0] &= 0x7fff;
    } else {
        s[0] = !s[0];
    }

    for i in 1..16 {
        s[i] = s[0];
    }
}


#[derive(Debug)]
struct ChannelData {
    plane_start: usize,
    resolution: Vec2<usize>,
    y_sampling: usize,
    sample_type: SampleType,
    quantize_linearly: bool,
}

/// Split the channels of the chunk into per-channel planes,
/// and remember where each plane starts.
fn collect_channel_planes(channels: &ChannelList, rectangle: IntegerBounds) -> (Vec<ChannelData>, usize) {
    let mut channel_data = Vec::with_capacity(channels.list.len());
    let mut plane_start = 0;

    for channel in &channels.list {
        let resolution = channel.subsampled_resolution(rectangle.size);

        channel_data.push(ChannelData {
            plane_start,
            resolution,
            y_sampling: channel.sampling.y(),
            sample_type: channel.sample_type,
            quantize_linearly: channel.quantize_linearly,
        });

        plane_start += resolution.area() * channel.sample_type.bytes_per_sample();
    }

    (channel_data, plane_start)
}

/// Reorder the interleaved per-line chunk bytes into per-channel planes.
fn deinterleave_lines(channel_data: &[ChannelData], rectangle: IntegerBounds, bytes: Bytes<'_>, planes: &mut [u8]) {
    let mut position = 0;
    let mut rows_consumed = vec![0_usize; channel_data.len()];

    for y in rectangle.position.y()..rectangle.end().y() {
        for (channel_index, channel) in channel_data.iter().enumerate() {
            if mod_p(y, channel.y_sampling as i32) != 0 { continue; }

            let line_bytes = channel.resolution.x() * channel.sample_type.bytes_per_sample();
            let target_start = channel.plane_start + rows_consumed[channel_index] * line_bytes;

            planes[target_start .. target_start + line_bytes]
                .copy_from_slice(&bytes[position .. position + line_bytes]);

            rows_consumed[channel_index] += 1;
            position += line_bytes;
        }
    }
}

/// Reorder per-channel planes back into the interleaved per-line chunk layout.
fn interleave_lines(channel_data: &[ChannelData], rectangle: IntegerBounds, planes: &[u8], expected_byte_size: usize) -> ByteVec {
    let mut bytes = Vec::with_capacity(expected_byte_size);
    let mut rows_consumed = vec![0_usize; channel_data.len()];

    for y in rectangle.position.y()..rectangle.end().y() {
        for (channel_index, channel) in channel_data.iter().enumerate() {
            if mod_p(y, channel.y_sampling as i32) != 0 { continue; }

            let line_bytes = channel.resolution.x() * channel.sample_type.bytes_per_sample();
            let source_start = channel.plane_start + rows_consumed[channel_index] * line_bytes;

            bytes.extend_from_slice(&planes[source_start .. source_start + line_bytes]);
            rows_consumed[channel_index] += 1;
        }
    }

    bytes
}


pub fn compress(channels: &ChannelList, uncompressed: Bytes<'_>, rectangle: IntegerBounds, optimize_flat_fields: bool) -> Result<ByteVec> {
    if uncompressed.is_empty() {
        return Ok(Vec::new());
    }

    let (channel_data, total_plane_bytes) = collect_channel_planes(channels, rectangle);
    debug_assert_eq!(total_plane_bytes, uncompressed.len(), "chunk byte count mismatch");

    let mut planes = vec![0_u8; total_plane_bytes];
    deinterleave_lines(&channel_data, rectangle, uncompressed, &mut planes);

    let mut compressed = Vec::with_capacity(uncompressed.len() / 2);

    for channel in &channel_data {
        let plane_bytes = channel.resolution.area() * channel.sample_type.bytes_per_sample();
        let plane = &planes[channel.plane_start .. channel.plane_start + plane_bytes];

        // only f16 channels are packed, all others are stored raw
        if channel.sample_type != SampleType::F16 {
            compressed.extend_from_slice(plane);
            continue;
        }

        let samples: Vec<u16> = plane.chunks_exact(2)
            .map(|bytes| u16::from_le_bytes([bytes[0], bytes[1]]))
            .collect();

        let nx = channel.resolution.x();
        let ny = channel.resolution.y();

        for block_y in (0..ny).step_by(BLOCK_SAMPLE_COUNT) {
            for block_x in (0..nx).step_by(BLOCK_SAMPLE_COUNT) {

                // copy the block, padding by repeating the rightmost
                // column and the bottom row where the resolution
                // is not divisible by four
                let mut block = [0_u16; 16];

                for row in 0..BLOCK_SAMPLE_COUNT {
                    let y = (block_y + row).min(ny - 1);

                    for column in 0..BLOCK_SAMPLE_COUNT {
                        let x = (block_x + column).min(nx - 1);
                        block[row * BLOCK_SAMPLE_COUNT + column] = samples[y * nx + x];
                    }
                }

                if channel.quantize_linearly {
                    convert_from_linear(&mut block);
                }

                let mut packed = [0_u8; BYTES_PER_BLOCK];
                let packed_size = pack(block, &mut packed, optimize_flat_fields, !channel.quantize_linearly);
                compressed.extend_from_slice(&packed[..packed_size]);
            }
        }
    }

    Ok(compressed)
}

pub fn decompress(channels: &ChannelList, compressed: Bytes<'_>, rectangle: IntegerBounds, expected_byte_size: usize) -> Result<ByteVec> {
    if compressed.is_empty() {
        return Ok(Vec::new());
    }

    let (channel_data, total_plane_bytes) = collect_channel_planes(channels, rectangle);
    debug_assert_eq!(total_plane_bytes, expected_byte_size, "chunk byte count mismatch");

    let mut planes = vec![0_u8; total_plane_bytes];
    let mut remaining = compressed;

    for channel in &channel_data {
        let plane_bytes = channel.resolution.area() * channel.sample_type.bytes_per_sample();

        if channel.sample_type != SampleType::F16 {
            if remaining.len() < plane_bytes {
                return Err(Error::decompression("b44 chunk ends before its channels"));
            }

            let (raw, rest) = remaining.split_at(plane_bytes);
            planes[channel.plane_start .. channel.plane_start + plane_bytes].copy_from_slice(raw);
            remaining = rest;
            continue;
        }

        let nx = channel.resolution.x();
        let ny = channel.resolution.y();
        let mut samples = vec![0_u16; nx * ny];

        for block_y in (0..ny).step_by(BLOCK_SAMPLE_COUNT) {
            for block_x in (0..nx).step_by(BLOCK_SAMPLE_COUNT) {
                let mut block = [0_u16; 16];

                if remaining.len() < BYTES_PER_FLAT_BLOCK {
                    return Err(Error::decompression("b44 chunk ends before its blocks"));
                }

                // a shift exponent of 13 or more marks a flat block
                if remaining[2] >= (13 << 2) {
                    unpack3(&remaining[..BYTES_PER_FLAT_BLOCK], &mut block);
                    remaining = &remaining[BYTES_PER_FLAT_BLOCK..];
                }
                else {
                    if remaining.len() < BYTES_PER_BLOCK {
                        return Err(Error::decompression("b44 chunk ends before its blocks"));
                    }

                    unpack14(&remaining[..BYTES_PER_BLOCK], &mut block);
                    remaining = &remaining[BYTES_PER_BLOCK..];
                }

                if channel.quantize_linearly {
                    convert_to_linear(&mut block);
                }

                for row in 0..BLOCK_SAMPLE_COUNT {
                    let y = block_y + row;
                    if y >= ny { break; }

                    for column in 0..BLOCK_SAMPLE_COUNT {
                        let x = block_x + column;
                        if x >= nx { break; }

                        samples[y * nx + x] = block[row * BLOCK_SAMPLE_COUNT + column];
                    }
                }
            }
        }

        let plane = &mut planes[channel.plane_start .. channel.plane_start + plane_bytes];
        for (sample, bytes) in samples.iter().zip(plane.chunks_exact_mut(2)) {
            bytes.copy_from_slice(&sample.to_le_bytes());
        }
    }

    if !remaining.is_empty() {
        return Err(Error::decompression("b44 chunk contains too much data"));
    }

    Ok(interleave_lines(&channel_data, rectangle, &planes, expected_byte_size))
}


#[cfg(test)]
mod test {
    use super::*;
    use crate::meta::attribute::{ChannelDescription, Text};

    fn f16_channels() -> ChannelList {
        ChannelList::new(smallvec![
            ChannelDescription::new(Text::new("B").unwrap(), SampleType::F16, false),
            ChannelDescription::new(Text::new("G").unwrap(), SampleType::F16, false),
        ])
    }

    #[test]
    fn exp_log_tables_invert_each_other() {
        for _ in 0..64 {
            let mut samples = [0_u16; 16];
            for sample in samples.iter_mut() {
                *sample = f16::from_f32(rand::random::<f32>()).to_bits();
            }

            let mut converted = samples;
            convert_from_linear(&mut converted);
            convert_to_linear(&mut converted);

            for (&original, &roundtrip) in samples.iter().zip(&converted) {
                let original = f16::from_bits(original).to_f64();
                let roundtrip = f16::from_bits(roundtrip).to_f64();
                assert!((original - roundtrip).abs() < 0.01);
            }
        }
    }

    #[test]
    fn pack_unpack_roundtrip_is_close() {
        for iteration in 0..256 {
            // a gradient block with a small noise component
            let base = iteration as f32 * 0.01 + 0.5;

            let mut block = [0_u16; 16];
            for (index, sample) in block.iter_mut().enumerate() {
                let value = base + index as f32 * 0.002 + rand::random::<f32>() * 0.001;
                *sample = f16::from_f32(value).to_bits();
            }

            let mut packed = [0_u8; BYTES_PER_BLOCK];
            let size = pack(block, &mut packed, true, true);

            let mut unpacked = [0_u16; 16];
            if size == BYTES_PER_FLAT_BLOCK { unpack3(&packed[..size], &mut unpacked); }
            else { unpack14(&packed, &mut unpacked); }

            for (&original, &lossy) in block.iter().zip(&unpacked) {
                let original = f16::from_bits(original).to_f64();
                let lossy = f16::from_bits(lossy).to_f64();
                assert!((original - lossy).abs() < 0.01, "{} vs {}", original, lossy);
            }
        }
    }

    #[test]
    fn uniform_blocks_shrink_with_flat_field_optimization() {
        let channels = f16_channels();
        let rectangle = IntegerBounds::from_dimensions(Vec2(32, 32));

        let uniform = f16::from_f32(0.5).to_le_bytes();
        let bytes: Vec<u8> = std::iter::repeat(uniform).take(32 * 32 * 2).flatten().collect();

        let b44 = compress(&channels, &bytes, rectangle, false).unwrap();
        let b44a = compress(&channels, &bytes, rectangle, true).unwrap();

        assert!(b44a.len() < b44.len());

        let decompressed = decompress(&channels, &b44a, rectangle, bytes.len()).unwrap();
        assert_eq!(decompressed, bytes);
    }

    #[test]
    fn odd_sized_chunks_roundtrip() {
        let channels = f16_channels();
        let rectangle = IntegerBounds::from_dimensions(Vec2(13, 7));

        // a smooth gradient, so the per-block quantization error stays small
        let mut bytes = Vec::new();
        for y in 0..7 { for _channel in 0..2 { for x in 0..13 {
            let value = f16::from_f32(x as f32 * 0.1 + y as f32 * 0.05);
            bytes.extend_from_slice(&value.to_le_bytes());
        } } }

        let byte_count = channels.byte_size_of_rect(rectangle);
        assert_eq!(bytes.len(), byte_count);

        let compressed = compress(&channels, &bytes, rectangle, true).unwrap();
        let decompressed = decompress(&channels, &compressed, rectangle, byte_count).unwrap();

        assert_eq!(decompressed.len(), bytes.len());

        for (original, lossy) in bytes.chunks_exact(2).zip(decompressed.chunks_exact(2)) {
            let original = f16::from_bits(u16::from_le_bytes([original[0], original[1]])).to_f64();
            let lossy = f16::from_bits(u16::from_le_bytes([lossy[0], lossy[1]])).to_f64();
            assert!((original - lossy).abs() <= 0.02, "{} vs {}", original, lossy);
        }
    }

    #[test]
    fn u32_channels_pass_through_losslessly() {
        let channels = ChannelList::new(smallvec![
            ChannelDescription::new(Text::new("id").unwrap(), SampleType::U32, false),
        ]);

        let rectangle = IntegerBounds::from_dimensions(Vec2(9, 5));
        let byte_count = channels.byte_size_of_rect(rectangle);
        let bytes: Vec<u8> = (0..byte_count).map(|_| rand::random()).collect();

        let compressed = compress(&channels, &bytes, rectangle, true).unwrap();
        let decompressed = decompress(&channels, &compressed, rectangle, byte_count).unwrap();

        assert_eq!(bytes, decompressed);
    }
}

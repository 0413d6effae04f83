
//! Lossy compression for f32 data, but lossless compression for u32 and f16 data.
//
// This compression method preprocesses the pixel data to reduce entropy
// and then calls zlib: 32-bit floats are rounded to 24 bits, differences
// between horizontally adjacent values are computed, and the difference
// bytes are transposed so that all the most significant bytes form one
// contiguous block, followed by the less significant bytes.

use super::{ByteVec, Bytes};
use crate::error::{Error, Result};
use crate::math::mod_p;
use crate::meta::attribute::{ChannelList, IntegerBounds, SampleType};


pub fn compress(channels: &ChannelList, uncompressed: Bytes<'_>, rectangle: IntegerBounds, zip_level: u8) -> Result<ByteVec> {
    if uncompressed.is_empty() {
        return Ok(Vec::new());
    }

    // the transposed buffer is never larger than the input,
    // as f32 values shrink to three bytes and the others keep their size
    let mut raw = vec![0_u8; uncompressed.len()];
    let mut remaining = uncompressed;
    let mut write_index = 0;

    for y in rectangle.position.y()..rectangle.end().y() {
        for channel in &channels.list {
            if mod_p(y, channel.sampling.y() as i32) != 0 { continue; }

            let sample_count_x = channel.subsampled_resolution(rectangle.size).x();
            let mut previous_pixel: u32 = 0;
            let mut planes = [0_usize; 4];

            match channel.sample_type {
                SampleType::F16 => {
                    planes[0] = write_index;
                    planes[1] = planes[0] + sample_count_x;
                    write_index = planes[1] + sample_count_x;

                    for _ in 0..sample_count_x {
                        let pixel = u32::from(u16::from_le_bytes([remaining[0], remaining[1]]));
                        remaining = &remaining[2..];

                        let difference = pixel.wrapping_sub(previous_pixel);
                        previous_pixel = pixel;

                        raw[planes[0]] = (difference >> 8) as u8;
                        raw[planes[1]] = difference as u8;

                        planes[0] += 1;
                        planes[1] += 1;
                    }
                },

                SampleType::U32 => {
                    planes[0] = write_index;
                    planes[1] = planes[0] + sample_count_x;
                    planes[2] = planes[1] + sample_count_x;
                    planes[3] = planes[2] + sample_count_x;
                    write_index = planes[3] + sample_count_x;

                    for _ in 0..sample_count_x {
                        let pixel = u32::from_le_bytes([remaining[0], remaining[1], remaining[2], remaining[3]]);
                        remaining = &remaining[4..];

                        let difference = pixel.wrapping_sub(previous_pixel);
                        previous_pixel = pixel;

                        raw[planes[0]] = (difference >> 24) as u8;
                        raw[planes[1]] = (difference >> 16) as u8;
                        raw[planes[2]] = (difference >> 8) as u8;
                        raw[planes[3]] = difference as u8;

                        for plane in planes.iter_mut() { *plane += 1; }
                    }
                },

                SampleType::F32 => {
                    planes[0] = write_index;
                    planes[1] = planes[0] + sample_count_x;
                    planes[2] = planes[1] + sample_count_x;
                    write_index = planes[2] + sample_count_x;

                    for _ in 0..sample_count_x {
                        let pixel = f32::from_bits(u32::from_le_bytes([remaining[0], remaining[1], remaining[2], remaining[3]]));
                        remaining = &remaining[4..];

                        let pixel = f32_to_f24(pixel);
                        let difference = pixel.wrapping_sub(previous_pixel);
                        previous_pixel = pixel;

                        raw[planes[0]] = (difference >> 16) as u8;
                        raw[planes[1]] = (difference >> 8) as u8;
                        raw[planes[2]] = difference as u8;

                        planes[0] += 1;
                        planes[1] += 1;
                        planes[2] += 1;
                    }
                },
            }
        }
    }

    raw.truncate(write_index);
    Ok(miniz_oxide::deflate::compress_to_vec_zlib(raw.as_slice(), zip_level))
}

pub fn decompress(channels: &ChannelList, compressed: Bytes<'_>, rectangle: IntegerBounds, expected_byte_size: usize) -> Result<ByteVec> {
    if compressed.is_empty() {
        return Ok(Vec::new());
    }

    let raw = zune_inflate::DeflateDecoder::new_with_options(
        compressed,
        zune_inflate::DeflateOptions::default()
            .set_limit(expected_byte_size)
            .set_size_hint(expected_byte_size),
    ).decode_zlib().map_err(|_| Error::decompression("pxr24 zlib stream"))?;

    let mut out = Vec::with_capacity(expected_byte_size);
    let mut read_index = 0;

    for y in rectangle.position.y()..rectangle.end().y() {
        for channel in &channels.list {
            if mod_p(y, channel.sampling.y() as i32) != 0 { continue; }

            let sample_count_x = channel.subsampled_resolution(rectangle.size).x();
            let mut pixel_accumulation: u32 = 0;
            let mut planes = [0_usize; 4];

            match channel.sample_type {
                SampleType::F16 => {
                    planes[0] = read_index;
                    planes[1] = planes[0] + sample_count_x;
                    read_index = planes[1] + sample_count_x;

                    if read_index > raw.len() {
                        return Err(Error::decompression("pxr24 data ends before the chunk"));
                    }

                    for _ in 0..sample_count_x {
                        let difference = (u32::from(raw[planes[0]]) << 8) | u32::from(raw[planes[1]]);
                        planes[0] += 1;
                        planes[1] += 1;

                        pixel_accumulation = pixel_accumulation.wrapping_add(difference);
                        out.extend_from_slice(&(pixel_accumulation as u16).to_le_bytes());
                    }
                },

                SampleType::U32 => {
                    planes[0] = read_index;
                    planes[1] = planes[0] + sample_count_x;
                    planes[2] = planes[1] + sample_count_x;
                    planes[3] = planes[2] + sample_count_x;
                    read_index = planes[3] + sample_count_x;

                    if read_index > raw.len() {
                        return Err(Error::decompression("pxr24 data ends before the chunk"));
                    }

                    for _ in 0..sample_count_x {
                        let difference = (u32::from(raw[planes[0]]) << 24)
                            | (u32::from(raw[planes[1]]) << 16)
                            | (u32::from(raw[planes[2]]) << 8)
                            | u32::from(raw[planes[3]]);

                        for plane in planes.iter_mut() { *plane += 1; }

                        pixel_accumulation = pixel_accumulation.wrapping_add(difference);
                        out.extend_from_slice(&pixel_accumulation.to_le_bytes());
                    }
                },

                SampleType::F32 => {
                    planes[0] = read_index;
                    planes[1] = planes[0] + sample_count_x;
                    planes[2] = planes[1] + sample_count_x;
                    read_index = planes[2] + sample_count_x;

                    if read_index > raw.len() {
                        return Err(Error::decompression("pxr24 data ends before the chunk"));
                    }

                    for _ in 0..sample_count_x {
                        let difference = (u32::from(raw[planes[0]]) << 24)
                            | (u32::from(raw[planes[1]]) << 16)
                            | (u32::from(raw[planes[2]]) << 8);

                        planes[0] += 1;
                        planes[1] += 1;
                        planes[2] += 1;

                        pixel_accumulation = pixel_accumulation.wrapping_add(difference);
                        out.extend_from_slice(&pixel_accumulation.to_le_bytes());
                    }
                },
            }
        }
    }

    if read_index != raw.len() {
        return Err(Error::decompression("pxr24 chunk contains too much data"));
    }

    Ok(out)
}


/// Conversion from 32-bit to 24-bit floating-point numbers, rounding the
/// significand to 15 bits. The reverse conversion is an 8-bit left shift.
pub fn f32_to_f24(float: f32) -> u32 {
    let bits = float.to_bits();

    let sign = bits & 0x8000_0000;
    let exponent = bits & 0x7f80_0000;
    let mantissa = bits & 0x007f_ffff;

    let result = if exponent == 0x7f80_0000 {
        if mantissa != 0 {
            // this is a nan, preserve the sign and the 15 leftmost significand
            // bits, but never produce a zero significand, which would turn
            // the nan into an infinity
            let mantissa = mantissa >> 8;
            (exponent >> 8) | mantissa | if mantissa == 0 { 1 } else { 0 }
        }
        else {
            // this is an infinity
            exponent >> 8
        }
    }
    else {
        // round the finite significand to 15 bits
        let rounded = ((exponent | mantissa) + (mantissa & 0x0000_0080)) >> 8;

        if rounded >= 0x7f_8000 {
            // the value was close to the float maximum and rounding
            // overflowed the exponent, so truncate instead
            (exponent | mantissa) >> 8
        }
        else {
            rounded
        }
    };

    (sign >> 8) | result
}


#[cfg(test)]
mod test {
    use super::*;
    use crate::compression::DEFAULT_ZIP_LEVEL;
    use crate::math::Vec2;
    use crate::meta::attribute::{ChannelDescription, Text};

    #[test]
    fn f24_of_small_values_is_exact_after_expansion() {
        for &value in &[0.0_f32, 1.0, -1.0, 0.5, 256.0] {
            let expanded = f32::from_bits(f32_to_f24(value) << 8);
            assert_eq!(expanded, value);
        }
    }

    #[test]
    fn f24_of_nan_stays_nan() {
        let expanded = f32::from_bits(f32_to_f24(f32::NAN) << 8);
        assert!(expanded.is_nan());

        let expanded = f32::from_bits(f32_to_f24(f32::INFINITY) << 8);
        assert!(expanded.is_infinite());
    }

    #[test]
    fn roundtrip_is_lossless_for_f16_and_u32() {
        let channels = ChannelList::new(smallvec![
            ChannelDescription::new(Text::new("A").unwrap(), SampleType::F16, false),
            ChannelDescription::new(Text::new("B").unwrap(), SampleType::U32, false),
        ]);

        let rectangle = IntegerBounds::new(Vec2(-8, 2), Vec2(19, 10));
        let byte_count = channels.byte_size_of_rect(rectangle);
        let data: Vec<u8> = (0..byte_count).map(|_| rand::random()).collect();

        let compressed = compress(&channels, &data, rectangle, DEFAULT_ZIP_LEVEL).unwrap();
        let decompressed = decompress(&channels, &compressed, rectangle, data.len()).unwrap();

        assert_eq!(data, decompressed);
    }

    #[test]
    fn roundtrip_truncates_f32_mantissa() {
        let channels = ChannelList::new(smallvec![
            ChannelDescription::new(Text::new("Z").unwrap(), SampleType::F32, false),
        ]);

        let rectangle = IntegerBounds::from_dimensions(Vec2(16, 4));

        let values: Vec<f32> = (0..rectangle.area()).map(|index| index as f32 * 0.3718).collect();
        let mut data = Vec::new();
        for value in &values { data.extend_from_slice(&value.to_bits().to_le_bytes()); }

        let compressed = compress(&channels, &data, rectangle, DEFAULT_ZIP_LEVEL).unwrap();
        let decompressed = decompress(&channels, &compressed, rectangle, data.len()).unwrap();

        for (index, value) in values.iter().enumerate() {
            let bytes = &decompressed[index * 4 .. index * 4 + 4];
            let decoded = f32::from_bits(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]));

            assert!((decoded - value).abs() <= value.abs() * 1e-4, "{} vs {}", decoded, value);
        }
    }
}

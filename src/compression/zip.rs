
//! Zip compression of one scan line, or of a block of 16 scan lines.
//! The byte predictor and the planar interleave transform are applied
//! before deflating, which improves the ratio on half float data a lot.

use super::optimize_bytes::*;
use super::{ByteVec, Bytes};
use crate::error::{Error, Result};

pub fn decompress_bytes(compressed: Bytes<'_>, expected_byte_size: usize) -> Result<ByteVec> {
    let mut decompressed = zune_inflate::DeflateDecoder::new_with_options(
        compressed,
        zune_inflate::DeflateOptions::default()
            .set_limit(expected_byte_size)
            .set_size_hint(expected_byte_size),
    ).decode_zlib().map_err(|_| Error::decompression("zlib stream"))?;

    differences_to_samples(&mut decompressed);
    interleave_byte_blocks(&mut decompressed);
    Ok(decompressed)
}

pub fn compress_bytes(uncompressed: Bytes<'_>, level: u8) -> Result<ByteVec> {
    let mut packed = Vec::from(uncompressed);

    separate_bytes_fragments(&mut packed);
    samples_to_differences(&mut packed);

    Ok(miniz_oxide::deflate::compress_to_vec_zlib(packed.as_slice(), level))
}


#[cfg(test)]
mod test {
    use crate::compression::DEFAULT_ZIP_LEVEL;

    #[test]
    fn roundtrip_any_bytes() {
        for length in [0_usize, 1, 2, 7, 127, 4096] {
            let data: Vec<u8> = (0..length).map(|_| rand::random()).collect();

            let compressed = super::compress_bytes(&data, DEFAULT_ZIP_LEVEL).unwrap();
            let decompressed = super::decompress_bytes(&compressed, data.len()).unwrap();

            assert_eq!(data, decompressed);
        }
    }

    #[test]
    fn all_levels_decode_identically() {
        let data: Vec<u8> = (0..2048).map(|index| (index % 7) as u8).collect();

        for level in 1..=9 {
            let compressed = super::compress_bytes(&data, level).unwrap();
            let decompressed = super::decompress_bytes(&compressed, data.len()).unwrap();
            assert_eq!(data, decompressed, "zip level {}", level);
        }
    }
}

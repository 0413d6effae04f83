
//! Contains the compression attribute definition
//! and methods to compress and decompress chunks of pixel data.

mod rle;
mod zip;
mod pxr24;
mod b44;
mod piz;

use crate::error::{Error, Result};
use crate::io::*;
use crate::meta::attribute::{ChannelList, IntegerBounds, SampleType};

/// A byte vector.
pub type ByteVec = Vec<u8>;

/// A byte slice.
pub type Bytes<'s> = &'s [u8];

/// The zlib level used by the zip family when the writer does not override it.
pub const DEFAULT_ZIP_LEVEL: u8 = 6;

/// Specifies which compression method the chunks of a part use.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum Compression {

    /// Store uncompressed values.
    /// Produces large files that can be read and written very quickly.
    Uncompressed,

    /// Run-length encoding of byte differences.
    /// Works best for images with large flat areas. Lossless.
    RLE,

    /// Zip compression of single scan lines. Lossless.
    ZIP1,

    /// Zip compression of blocks of 16 scan lines.
    /// Smaller but slower than `ZIP1`. Lossless.
    ZIP16,

    /// Wavelet transform with huffman coding, in blocks of 32 scan lines.
    /// Works well for noisy and natural images. Lossless.
    PIZ,

    /// Zip compression after reducing 32-bit floats to 24 bits,
    /// in blocks of 16 scan lines. Lossless for f16 and u32 data,
    /// lossy for f32 data.
    PXR24,

    /// Packs blocks of 4 by 4 f16 pixels into a fixed 14 bytes,
    /// in blocks of 32 scan lines. Lossy.
    B44,

    /// Like `B44`, but blocks of identical pixels shrink to 3 bytes,
    /// which helps images with large flat areas. Lossy.
    B44A,

    /// Lossy DCT based compression, in blocks of 32 scan lines.
    /// Neither encoded nor decoded by this library.
    DWAA,

    /// Lossy DCT based compression, in blocks of 256 scan lines.
    /// Neither encoded nor decoded by this library.
    DWAB,
}

impl std::fmt::Display for Compression {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{} compression", match self {
            Compression::Uncompressed => "no",
            Compression::RLE => "rle",
            Compression::ZIP1 => "zip line",
            Compression::ZIP16 => "zip block",
            Compression::PIZ => "piz",
            Compression::PXR24 => "pxr24",
            Compression::B44 => "b44",
            Compression::B44A => "b44a",
            Compression::DWAA => "dwaa",
            Compression::DWAB => "dwab",
        })
    }
}

impl Compression {

    /// Number of bytes this tag consumes in a file.
    pub fn byte_size() -> usize { u8::BYTE_SIZE }

    /// Without validation, write this instance to the byte stream.
    pub fn write<W: Write>(self, write: &mut W) -> crate::error::UnitResult {
        use self::Compression::*;
        match self {
            Uncompressed => 0_u8,
            RLE => 1_u8,
            ZIP1 => 2_u8,
            ZIP16 => 3_u8,
            PIZ => 4_u8,
            PXR24 => 5_u8,
            B44 => 6_u8,
            B44A => 7_u8,
            DWAA => 8_u8,
            DWAB => 9_u8,
        }.write(write)?;
        Ok(())
    }

    /// Read the value without validating.
    pub fn read<R: Read>(read: &mut R) -> Result<Self> {
        use self::Compression::*;
        Ok(match u8::read(read)? {
            0 => Uncompressed,
            1 => RLE,
            2 => ZIP1,
            3 => ZIP16,
            4 => PIZ,
            5 => PXR24,
            6 => B44,
            7 => B44A,
            8 => DWAA,
            9 => DWAB,
            _ => return Err(Error::UnsupportedCompression("unknown compression method".into())),
        })
    }

    /// Compress the channel-planar bytes of one chunk.
    /// If the result would be larger than the input,
    /// the input is stored instead, as the readers detect by size.
    pub fn compress_chunk(
        self,
        channels: &ChannelList,
        uncompressed: ByteVec,
        rectangle: IntegerBounds,
        zip_level: u8,
    ) -> Result<ByteVec> {
        use self::Compression::*;

        if uncompressed.is_empty() {
            return Ok(uncompressed);
        }

        let compressed = match self {
            Uncompressed => return Ok(uncompressed),
            RLE => rle::compress_bytes(&uncompressed)?,
            ZIP1 | ZIP16 => zip::compress_bytes(&uncompressed, zip_level)?,
            PIZ => piz::compress(channels, &uncompressed, rectangle)?,
            PXR24 => pxr24::compress(channels, &uncompressed, rectangle, zip_level)?,
            B44 => b44::compress(channels, &uncompressed, rectangle, false)?,
            B44A => b44::compress(channels, &uncompressed, rectangle, true)?,
            DWAA | DWAB => return Err(Error::UnsupportedCompression(
                "dwa contents cannot be written by this library".into()
            )),
        };

        // only store the compressed form if it actually is smaller than the raw data
        if compressed.len() < uncompressed.len() { Ok(compressed) }
        else { Ok(uncompressed) }
    }

    /// Decompress the channel-planar bytes of one chunk.
    pub fn decompress_chunk(
        self,
        channels: &ChannelList,
        compressed: ByteVec,
        rectangle: IntegerBounds,
    ) -> Result<ByteVec> {
        use self::Compression::*;

        let expected_byte_size = channels.byte_size_of_rect(rectangle);

        if expected_byte_size == 0 {
            return Ok(Vec::new());
        }

        // a chunk of exactly the uncompressed size was stored raw
        if compressed.len() == expected_byte_size {
            return Ok(compressed);
        }

        let bytes = match self {
            Uncompressed => Ok(compressed),
            RLE => rle::decompress_bytes(&compressed, expected_byte_size),
            ZIP1 | ZIP16 => zip::decompress_bytes(&compressed, expected_byte_size),
            PIZ => piz::decompress(channels, &compressed, rectangle, expected_byte_size),
            PXR24 => pxr24::decompress(channels, &compressed, rectangle, expected_byte_size),
            B44 | B44A => b44::decompress(channels, &compressed, rectangle, expected_byte_size),
            DWAA | DWAB => return Err(Error::UnsupportedCompression(
                "dwa contents cannot be read by this library".into()
            )),
        }?;

        if bytes.len() != expected_byte_size {
            return Err(Error::decompression("decompressed size does not match the chunk"));
        }

        Ok(bytes)
    }

    /// Compress a flat byte payload, used for the tables and sample
    /// data of deep chunks. Only lossless byte codecs participate.
    pub fn compress_deep_bytes(self, uncompressed: ByteVec, zip_level: u8) -> Result<ByteVec> {
        use self::Compression::*;

        if !self.supports_deep_data() {
            return Err(Error::unsupported("deep data with a lossy compression method"));
        }

        if uncompressed.is_empty() {
            return Ok(uncompressed);
        }

        let compressed = match self {
            Uncompressed => return Ok(uncompressed),
            RLE => rle::compress_bytes(&uncompressed)?,
            ZIP1 | ZIP16 => zip::compress_bytes(&uncompressed, zip_level)?,
            PIZ => piz::compress_flat(&uncompressed)?,
            _ => unreachable!("deep support checked above"),
        };

        if compressed.len() < uncompressed.len() { Ok(compressed) }
        else { Ok(uncompressed) }
    }

    /// Decompress a flat byte payload of a deep chunk.
    pub fn decompress_deep_bytes(self, compressed: ByteVec, expected_byte_size: usize) -> Result<ByteVec> {
        use self::Compression::*;

        if !self.supports_deep_data() {
            return Err(Error::unsupported("deep data with a lossy compression method"));
        }

        if expected_byte_size == 0 {
            return Ok(Vec::new());
        }

        if compressed.len() == expected_byte_size {
            return Ok(compressed);
        }

        let bytes = match self {
            Uncompressed => Ok(compressed),
            RLE => rle::decompress_bytes(&compressed, expected_byte_size),
            ZIP1 | ZIP16 => zip::decompress_bytes(&compressed, expected_byte_size),
            PIZ => piz::decompress_flat(&compressed, expected_byte_size),
            _ => unreachable!("deep support checked above"),
        }?;

        if bytes.len() != expected_byte_size {
            return Err(Error::decompression("decompressed size does not match the deep chunk"));
        }

        Ok(bytes)
    }

    /// For scan line images and deep scan line images, one or more scan lines
    /// are stored together as one chunk. The number of scan lines per chunk
    /// depends on how the pixel data is compressed.
    pub fn scan_lines_per_chunk(self) -> usize {
        use self::Compression::*;
        match self {
            Uncompressed | RLE | ZIP1        => 1,
            ZIP16        | PXR24             => 16,
            PIZ   | B44  | B44A  | DWAA      => 32,
            DWAB                             => 256,
        }
    }

    /// Whether deep data can be stored with this compression method.
    pub fn supports_deep_data(self) -> bool {
        use self::Compression::*;
        match self {
            Uncompressed | RLE | ZIP1 | ZIP16 | PIZ => true,
            _ => false,
        }
    }

    /// Whether this compression method reconstructs the exact
    /// pixel bytes for the specified sample type.
    pub fn is_lossless_for(self, sample_type: SampleType) -> bool {
        use self::Compression::*;
        match self {
            PXR24 => sample_type != SampleType::F32, // pxr24 reduces f32 to f24
            B44 | B44A => sample_type != SampleType::F16, // b44 only quantizes f16 values
            Uncompressed | RLE | ZIP1 | ZIP16 | PIZ => true,
            DWAA | DWAB => false,
        }
    }

    /// Whether this compression method might throw away some data.
    pub fn may_lose_data(self) -> bool {
        use self::Compression::*;
        match self {
            Uncompressed | RLE | ZIP1 | ZIP16 | PIZ => false,
            PXR24 | B44 | B44A | DWAA | DWAB => true,
        }
    }
}


/// The byte transforms applied before and after the
/// zip family to improve the compression ratio.
pub(crate) mod optimize_bytes {

    /// Integrate over all differences to the previous value
    /// in order to reconstruct the sample bytes.
    pub fn differences_to_samples(buffer: &mut [u8]) {
        for index in 1..buffer.len() {
            buffer[index] = (buffer[index - 1] as i32 + buffer[index] as i32 - 128) as u8;
        }
    }

    /// Derive over all values in order to produce
    /// differences to the previous byte.
    pub fn samples_to_differences(buffer: &mut [u8]) {
        for index in (1..buffer.len()).rev() {
            buffer[index] = (buffer[index] as i32 - buffer[index - 1] as i32 + 128) as u8;
        }
    }

    /// Interleave two half blocks: the first half of the array
    /// becomes the even indices, the second half the odd indices.
    pub fn interleave_byte_blocks(separated: &mut [u8]) {
        let mut interleaved = Vec::with_capacity(separated.len());
        let (first_half, second_half) = separated.split_at((separated.len() + 1) / 2);

        let mut first = first_half.iter();
        let mut second = second_half.iter();

        while interleaved.len() < separated.len() {
            if let Some(&byte) = first.next() { interleaved.push(byte); }
            if interleaved.len() < separated.len() {
                if let Some(&byte) = second.next() { interleaved.push(byte); }
            }
        }

        separated.copy_from_slice(interleaved.as_slice());
    }

    /// Separate the bytes into even and odd indices:
    /// the first half of the result contains the even bytes,
    /// the second half the odd bytes.
    pub fn separate_bytes_fragments(source: &mut [u8]) {
        let mut first_half = Vec::with_capacity((source.len() + 1) / 2);
        let mut second_half = Vec::with_capacity(source.len() / 2);

        for (index, &byte) in source.iter().enumerate() {
            if index % 2 == 0 { first_half.push(byte); }
            else { second_half.push(byte); }
        }

        let mut result = first_half;
        result.append(&mut second_half);
        source.copy_from_slice(result.as_slice());
    }


}

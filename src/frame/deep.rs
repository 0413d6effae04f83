
//! Pixel memory for deep images, where every pixel holds
//! a variable number of samples per channel.
//!
//! All samples of one channel live in a single flat buffer, indexed through
//! the cumulative sample count table. This matches the on-disk layout and
//! avoids one allocation per pixel.

use std::collections::BTreeMap;

use crate::error::{Error, Result, UnitResult};
use crate::frame::Sample;
use crate::meta::attribute::{IntegerBounds, SampleType, Text};


/// The flat sample store of one deep channel.
#[derive(Debug, Clone, PartialEq)]
pub struct DeepSlice {

    /// The type of the samples stored in this channel.
    sample_type: SampleType,

    /// All samples of all pixels, as little-endian bytes,
    /// ordered row-major by pixel.
    data: Vec<u8>,
}

impl DeepSlice {

    /// The type of the samples stored in this channel.
    pub fn sample_type(&self) -> SampleType { self.sample_type }

    /// The raw little-endian sample bytes of all pixels.
    pub fn raw_bytes(&self) -> &[u8] { &self.data }
}


/// Maps channel names to flat deep sample stores, and tracks
/// the per-pixel sample counts shared by all channels.
#[derive(Debug, Clone, PartialEq)]
pub struct DeepFrameBuffer {

    /// The absolute pixel rectangle this buffer is addressed with.
    bounds: IntegerBounds,

    /// The number of samples of each pixel, row-major.
    counts: Vec<u32>,

    /// Exclusive prefix sums of `counts`, used to locate
    /// the samples of a pixel in the flat channel stores.
    sample_offsets: Vec<u64>,

    /// The total number of samples over all pixels.
    total_samples: u64,

    /// The flat sample store of each channel.
    channels: BTreeMap<Text, DeepSlice>,
}

impl DeepFrameBuffer {

    /// Create a deep frame buffer for the specified rectangle,
    /// with zero samples everywhere.
    pub fn new(bounds: IntegerBounds) -> Self {
        let area = bounds.area();

        Self {
            bounds,
            counts: vec![0; area],
            sample_offsets: vec![0; area],
            total_samples: 0,
            channels: BTreeMap::new(),
        }
    }

    /// The rectangle this buffer is addressed with.
    pub fn bounds(&self) -> IntegerBounds { self.bounds }

    /// The total number of samples over all pixels.
    pub fn total_samples(&self) -> u64 { self.total_samples }

    /// Overwrite the per-pixel sample counts, given in row-major order.
    /// This reallocates the sample stores of all channels, zero-filled.
    pub fn set_sample_counts(&mut self, counts: &[u32]) -> UnitResult {
        if counts.len() != self.bounds.area() {
            return Err(Error::frame_buffer("sample count table does not match the data window"));
        }

        self.counts.copy_from_slice(counts);
        self.recompute_offsets();

        let total = self.total_samples as usize;
        for slice in self.channels.values_mut() {
            slice.data = vec![0_u8; total * slice.sample_type.bytes_per_sample()];
        }

        Ok(())
    }

    fn recompute_offsets(&mut self) {
        let mut running = 0_u64;

        for (index, &count) in self.counts.iter().enumerate() {
            self.sample_offsets[index] = running;
            running += u64::from(count);
        }

        self.total_samples = running;
    }

    /// Add a channel with the specified sample type, allocating
    /// space for the current sample counts.
    pub fn insert_channel(&mut self, name: Text, sample_type: SampleType) -> &mut Self {
        let data = vec![0_u8; self.total_samples as usize * sample_type.bytes_per_sample()];
        self.channels.insert(name, DeepSlice { sample_type, data });
        self
    }

    /// The deep slice of the specified channel, if present.
    pub fn get_channel(&self, name: &Text) -> Option<&DeepSlice> {
        self.channels.get(name)
    }

    /// Iterate over all channels, ordered by name.
    pub fn iter_channels(&self) -> impl Iterator<Item = (&Text, &DeepSlice)> {
        self.channels.iter()
    }

    fn pixel_index(&self, x: i32, y: i32) -> Result<usize> {
        if x < self.bounds.position.x() || y < self.bounds.position.y()
            || x >= self.bounds.end().x() || y >= self.bounds.end().y() {
            return Err(Error::out_of_range("deep pixel position"));
        }

        let column = (x - self.bounds.position.x()) as usize;
        let row = (y - self.bounds.position.y()) as usize;
        Ok(row * self.bounds.width() + column)
    }

    /// The number of samples of the specified pixel.
    pub fn sample_count(&self, x: i32, y: i32) -> Result<u32> {
        Ok(self.counts[self.pixel_index(x, y)?])
    }

    /// The per-pixel sample counts, row-major.
    pub fn sample_counts(&self) -> &[u32] { &self.counts }

    fn sample_byte_index(&self, name: &Text, x: i32, y: i32, sample_index: usize) -> Result<(usize, SampleType)> {
        let pixel = self.pixel_index(x, y)?;

        if sample_index >= self.counts[pixel] as usize {
            return Err(Error::out_of_range("deep sample index"));
        }

        let slice = self.channels.get(name).ok_or_else(||
            Error::frame_buffer(format!("missing deep channel `{}`", name))
        )?;

        let flat_index = self.sample_offsets[pixel] as usize + sample_index;
        Ok((flat_index * slice.sample_type.bytes_per_sample(), slice.sample_type))
    }

    /// One sample of one pixel of the specified channel.
    pub fn get_sample(&self, name: &Text, x: i32, y: i32, sample_index: usize) -> Result<Sample> {
        let (byte_index, sample_type) = self.sample_byte_index(name, x, y, sample_index)?;
        let slice = self.channels.get(name).expect("channel presence checked above");
        Ok(read_sample(&slice.data[byte_index..], sample_type))
    }

    /// Overwrite one sample of one pixel of the specified channel,
    /// converting the value to the storage type of the channel.
    pub fn set_sample(&mut self, name: &Text, x: i32, y: i32, sample_index: usize, value: impl Into<Sample>) -> UnitResult {
        let (byte_index, sample_type) = self.sample_byte_index(name, x, y, sample_index)?;
        let converted = value.into().convert_to(sample_type);

        let slice = self.channels.get_mut(name).expect("channel presence checked above");
        write_sample(converted, &mut slice.data[byte_index..]);
        Ok(())
    }

    /// Overwrite the samples of one channel starting at the specified flat
    /// sample position, with raw little-endian bytes of the channel type.
    /// Used by the readers after decompressing a chunk.
    pub(crate) fn replace_channel_sample_range(&mut self, name: &Text, start_sample: u64, bytes: &[u8]) -> UnitResult {
        let total_samples = self.total_samples;

        let slice = self.channels.get_mut(name).ok_or_else(||
            Error::frame_buffer(format!("missing deep channel `{}`", name))
        )?;

        let bytes_per_sample = slice.sample_type.bytes_per_sample();
        debug_assert_eq!(bytes.len() % bytes_per_sample, 0, "partial deep samples");

        let end_sample = start_sample as usize + bytes.len() / bytes_per_sample;
        if end_sample > total_samples as usize {
            return Err(Error::frame_buffer("deep channel byte count mismatch"));
        }

        slice.write_sample_bytes(start_sample, bytes);
        Ok(())
    }

    /// The sample counts of one rectangle within this buffer, row-major.
    pub(crate) fn counts_of_rect(&self, rect: IntegerBounds) -> Result<Vec<u32>> {
        debug_assert!(self.bounds.contains(rect), "rect outside deep frame buffer");

        let mut counts = Vec::with_capacity(rect.area());

        for y in rect.position.y()..rect.end().y() {
            let row_start = self.pixel_index(rect.position.x(), y)?;
            counts.extend_from_slice(&self.counts[row_start .. row_start + rect.width()]);
        }

        Ok(counts)
    }

    /// The flat position of the first sample of the specified pixel.
    pub(crate) fn sample_offset_of(&self, x: i32, y: i32) -> Result<u64> {
        Ok(self.sample_offsets[self.pixel_index(x, y)?])
    }
}

fn read_sample(bytes: &[u8], sample_type: SampleType) -> Sample {
    use half::f16;
    match sample_type {
        SampleType::F16 => Sample::F16(f16::from_bits(u16::from_le_bytes([bytes[0], bytes[1]]))),
        SampleType::F32 => Sample::F32(f32::from_bits(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))),
        SampleType::U32 => Sample::U32(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])),
    }
}

fn write_sample(sample: Sample, bytes: &mut [u8]) {
    match sample {
        Sample::F16(value) => bytes[..2].copy_from_slice(&value.to_bits().to_le_bytes()),
        Sample::F32(value) => bytes[..4].copy_from_slice(&value.to_bits().to_le_bytes()),
        Sample::U32(value) => bytes[..4].copy_from_slice(&value.to_le_bytes()),
    }
}

impl DeepSlice {

    /// The little-endian bytes of the samples in the specified flat range.
    pub(crate) fn bytes_of_samples(&self, start_sample: u64, sample_count: u64) -> &[u8] {
        let bytes_per_sample = self.sample_type.bytes_per_sample() as u64;
        let start = (start_sample * bytes_per_sample) as usize;
        let end = start + (sample_count * bytes_per_sample) as usize;
        &self.data[start..end]
    }

    /// Overwrite the samples in the specified flat range with little-endian bytes.
    pub(crate) fn write_sample_bytes(&mut self, start_sample: u64, bytes: &[u8]) {
        let start = start_sample as usize * self.sample_type.bytes_per_sample();
        self.data[start .. start + bytes.len()].copy_from_slice(bytes);
    }
}


#[cfg(test)]
mod test {
    use super::*;
    use crate::math::Vec2;

    #[test]
    fn counts_and_samples() {
        let bounds = IntegerBounds::from_dimensions(Vec2(4, 4));
        let mut deep = DeepFrameBuffer::new(bounds);
        deep.insert_channel(Text::new("Z").unwrap(), SampleType::F32);

        let counts: Vec<u32> = (0..16).map(|index| (index % 4) + 1).collect();
        deep.set_sample_counts(&counts).unwrap();

        assert_eq!(deep.total_samples(), counts.iter().map(|&count| u64::from(count)).sum());
        assert_eq!(deep.sample_count(3, 0).unwrap(), 4);

        let z_name = Text::new("Z").unwrap();
        deep.set_sample(&z_name, 3, 0, 2, 0.75_f32).unwrap();
        assert_eq!(deep.get_sample(&z_name, 3, 0, 2).unwrap(), Sample::F32(0.75));

        // out of range sample index
        assert!(deep.get_sample(&z_name, 0, 0, 1).is_err());
    }
}


//! Low level binary input and output, with bounded allocations for untrusted sizes.

pub use std::io::{Read, Seek, Write};

use std::io::SeekFrom;

use half::f16;
use half::slice::HalfFloatSliceExt;
use lebe::prelude::*;

use crate::error::{Error, Result, UnitResult};

/// Skip the specified number of bytes without seeking.
pub fn skip_bytes(read: &mut impl Read, count: u64) -> UnitResult {
    let skipped = std::io::copy(
        &mut read.by_ref().take(count),
        &mut std::io::sink()
    )?;

    if skipped != count {
        return Err(Error::malformed("content size"));
    }

    Ok(())
}


/// A reader that remembers a single peeked byte,
/// which is used to detect the zero byte terminating a sequence.
#[derive(Debug)]
pub struct PeekRead<T> {
    inner: T,
    peeked: Option<std::io::Result<u8>>,
}

impl<T: Read> PeekRead<T> {

    /// Wrap the specified reader. It should be buffered.
    pub fn new(inner: T) -> Self {
        Self { inner, peeked: None }
    }

    /// Inspect the next byte without consuming it.
    pub fn peek_u8(&mut self) -> &std::io::Result<u8> {
        self.peeked = self.peeked.take().or_else(|| Some(u8::read_from_little_endian(&mut self.inner)));
        self.peeked.as_ref().expect("peeked byte was just filled")
    }

    /// Consume the next byte if it equals the specified value.
    pub fn skip_if_eq(&mut self, value: u8) -> std::io::Result<bool> {
        match *self.peek_u8() {
            Ok(peeked) if peeked == value => {
                self.peeked = None;
                Ok(true)
            },

            Ok(_) => Ok(false),

            Err(_) => {
                let error = self.peeked.take()
                    .expect("peeked byte was just filled")
                    .err().expect("checked for error");

                Err(error)
            },
        }
    }
}

impl<T: Read> Read for PeekRead<T> {
    fn read(&mut self, target_buffer: &mut [u8]) -> std::io::Result<usize> {
        if target_buffer.is_empty() {
            return Ok(0);
        }

        match self.peeked.take() {
            None => self.inner.read(target_buffer),
            Some(peeked) => {
                target_buffer[0] = peeked?;
                Ok(1 + self.inner.read(&mut target_buffer[1..])?)
            }
        }
    }
}


/// A byte sink or source that tracks its position in the stream,
/// so that chunk offsets can be recorded and revisited.
#[derive(Debug)]
pub struct Tracking<T> {
    inner: T,
    position: usize,
}

impl<T> Tracking<T> {

    /// Wrap the specified stream, considering its current position to be zero.
    pub fn new(inner: T) -> Self {
        Self { inner, position: 0 }
    }

    /// The number of bytes read or written so far.
    pub fn byte_position(&self) -> usize {
        self.position
    }

    /// Return the wrapped byte stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: Write + Seek> Tracking<T> {

    /// Seek to the specified position for writing. Writing past the current
    /// end of the stream fills the gap with zero bytes.
    pub fn seek_write_to(&mut self, target_position: usize) -> UnitResult {
        let current_length = self.inner.seek(SeekFrom::End(0))? as usize;

        if target_position <= current_length {
            self.inner.seek(SeekFrom::Start(target_position as u64))?;
        }
        else {
            // pad with zeroes up to the desired position
            let zeroes = vec![0_u8; target_position - current_length];
            self.inner.write_all(&zeroes)?;
        }

        self.position = target_position;
        Ok(())
    }
}

impl<T: Read + Seek> Tracking<T> {

    /// Seek to the specified position for reading.
    pub fn seek_read_to(&mut self, target_position: usize) -> UnitResult {
        if target_position != self.position {
            self.inner.seek(SeekFrom::Start(target_position as u64))?;
            self.position = target_position;
        }

        Ok(())
    }
}

impl<T: Read> Read for Tracking<T> {
    fn read(&mut self, buffer: &mut [u8]) -> std::io::Result<usize> {
        let count = self.inner.read(buffer)?;
        self.position += count;
        Ok(count)
    }
}

impl<T: Write> Write for Tracking<T> {
    fn write(&mut self, buffer: &[u8]) -> std::io::Result<usize> {
        let count = self.inner.write(buffer)?;
        self.position += count;
        Ok(count)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}


/// Extension trait for reading and writing little-endian primitives and arrays of them.
pub trait Data: Sized + Default + Clone {

    /// The number of bytes one value occupies in a file.
    const BYTE_SIZE: usize = std::mem::size_of::<Self>();

    /// Read a single value.
    fn read(read: &mut impl Read) -> Result<Self>;

    /// Fill the slice with values from the byte stream.
    fn read_slice(read: &mut impl Read, slice: &mut [Self]) -> UnitResult;

    /// Write a single value.
    fn write(self, write: &mut impl Write) -> UnitResult;

    /// Write all values in the slice.
    fn write_slice(write: &mut impl Write, slice: &[Self]) -> UnitResult;

    /// Read a vector of the specified length. Allocation is grown in bounded
    /// steps, so a forged length field cannot exhaust memory before
    /// the stream runs dry. A hard maximum rejects the data immediately.
    fn read_vec(read: &mut impl Read, data_size: usize, soft_max: usize, hard_max: Option<usize>, purpose: &'static str) -> Result<Vec<Self>> {
        if let Some(max) = hard_max {
            if data_size > max {
                return Err(Error::malformed(purpose));
            }
        }

        let mut data = Vec::new();
        let soft_max = hard_max.unwrap_or(soft_max).min(soft_max);

        if data_size <= soft_max {
            data.resize(data_size, Self::default());
            Self::read_slice(read, &mut data)?;
        }
        else {
            // be careful with allocations that are larger than the expected maximum,
            // the length may come from a forged file
            data.resize(soft_max, Self::default());
            Self::read_slice(read, &mut data)?;

            for _ in soft_max..data_size {
                data.push(Self::read(read)?);
            }
        }

        Ok(data)
    }

    /// Write the slice length as `i32` and then the contents.
    fn write_i32_sized_slice<W: Write>(write: &mut W, slice: &[Self]) -> UnitResult {
        crate::error::usize_to_i32(slice.len(), "byte array length")?.write(write)?;
        Self::write_slice(write, slice)
    }

    /// Read an `i32` length and then that many values.
    fn read_i32_sized_vec(read: &mut impl Read, soft_max: usize, hard_max: Option<usize>, purpose: &'static str) -> Result<Vec<Self>> {
        let size = i32::read(read)?;
        let size = crate::error::i32_to_usize(size, purpose)?;
        Self::read_vec(read, size, soft_max, hard_max, purpose)
    }
}


macro_rules! implement_data_for_primitive {
    ($kind: ident) => {
        impl Data for $kind {
            fn read(read: &mut impl Read) -> Result<Self> {
                Ok(read.read_from_little_endian()?)
            }

            fn write(self, write: &mut impl Write) -> UnitResult {
                write.write_as_little_endian(&self)?;
                Ok(())
            }

            fn read_slice(read: &mut impl Read, slice: &mut [Self]) -> UnitResult {
                read.read_from_little_endian_into(slice)?;
                Ok(())
            }

            fn write_slice(write: &mut impl Write, slice: &[Self]) -> UnitResult {
                write.write_as_little_endian(slice)?;
                Ok(())
            }
        }
    };
}

implement_data_for_primitive!(u8);
implement_data_for_primitive!(i8);
implement_data_for_primitive!(i16);
implement_data_for_primitive!(u16);
implement_data_for_primitive!(u32);
implement_data_for_primitive!(i32);
implement_data_for_primitive!(i64);
implement_data_for_primitive!(u64);
implement_data_for_primitive!(f32);
implement_data_for_primitive!(f64);

impl Data for f16 {
    fn read(read: &mut impl Read) -> Result<Self> {
        u16::read(read).map(f16::from_bits)
    }

    fn read_slice(read: &mut impl Read, slice: &mut [Self]) -> UnitResult {
        let bits = slice.reinterpret_cast_mut();
        u16::read_slice(read, bits)
    }

    fn write(self, write: &mut impl Write) -> UnitResult {
        self.to_bits().write(write)
    }

    fn write_slice(write: &mut impl Write, slice: &[Self]) -> UnitResult {
        let bits = slice.reinterpret_cast();
        u16::write_slice(write, bits)
    }
}


#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn peek() {
        let buffer: &[u8] = &[0, 1, 2, 3];
        let mut peek = PeekRead::new(buffer);

        assert_eq!(peek.peek_u8().as_ref().unwrap(), &0);
        assert_eq!(peek.peek_u8().as_ref().unwrap(), &0);
        assert_eq!(u8::read(&mut peek).unwrap(), 0_u8);

        assert!(!peek.skip_if_eq(9).unwrap());
        assert!(peek.skip_if_eq(1).unwrap());

        assert_eq!(u8::read(&mut peek).unwrap(), 2_u8);
        assert_eq!(u8::read(&mut peek).unwrap(), 3_u8);
        assert!(u8::read(&mut peek).is_err());
    }

    #[test]
    fn tracked_seek_write_pads_with_zeroes() {
        let mut write = Tracking::new(Cursor::new(Vec::new()));
        7_u8.write(&mut write).unwrap();
        write.seek_write_to(4).unwrap();
        9_u8.write(&mut write).unwrap();
        assert_eq!(write.byte_position(), 5);

        let bytes = write.inner.into_inner();
        assert_eq!(bytes, [7, 0, 0, 0, 9]);
    }

    #[test]
    fn bounded_vector_read_detects_truncation() {
        let bytes = [1_u8, 2, 3];
        let result = u8::read_vec(&mut bytes.as_slice(), 100, 16, None, "test data");
        assert!(result.is_err());
    }
}

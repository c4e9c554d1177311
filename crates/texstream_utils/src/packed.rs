//! Little endian packed structures
//!
//! Binary containers read by texstream (DDS files, mostly) are flat sequences of little endian
//! integers. [`PackedData`] describes types that can be read from and written to such streams,
//! field by field, with no padding in between.

use crate::{ok, AnyResult};
use anyhow::anyhow;
use byteorder::{ReadBytesExt, WriteBytesExt, LE};
use std::io::{Cursor, Read, Write};

/// Special trait for reading packed data, always assumed to be little endian.
pub trait PackedData: Sized + Clone {
    /// Amount of bytes occupied by the packed representation.
    const PACKED_SIZE: usize;

    fn read_packed<R: Read>(r: &mut R) -> AnyResult<Self>;
    fn write_packed<W: Write>(&self, w: &mut W) -> AnyResult;

    /// Reads the structure from the start of a byte slice.
    ///
    /// ```
    /// # use texstream_utils::packed::PackedData;
    /// let value = u32::from_packed_bytes(&[0x44, 0x44, 0x53, 0x20, 0xFF]).unwrap();
    /// assert_eq!(value, 0x20534444);
    /// assert!(u32::from_packed_bytes(&[1, 2]).is_err());
    /// ```
    fn from_packed_bytes(bytes: &[u8]) -> AnyResult<Self> {
        if bytes.len() < Self::PACKED_SIZE {
            return Err(anyhow!(
                "need {} bytes to read a packed structure, got {}",
                Self::PACKED_SIZE,
                bytes.len()
            ));
        }
        Self::read_packed(&mut Cursor::new(bytes))
    }

    /// Serializes the structure into a new vector.
    fn to_packed_bytes(&self) -> AnyResult<Vec<u8>> {
        let mut result = Vec::with_capacity(Self::PACKED_SIZE);
        self.write_packed(&mut result)?;
        Ok(result)
    }
}

impl<T: PackedData, const N: usize> PackedData for [T; N] {
    const PACKED_SIZE: usize = T::PACKED_SIZE * N;

    fn read_packed<R: Read>(r: &mut R) -> AnyResult<Self> {
        let values = (0..N)
            .map(|_| T::read_packed(r))
            .collect::<AnyResult<Vec<T>>>()?;

        // The length always matches, but Vec -> array conversions are fallible on paper
        values
            .try_into()
            .map_err(|_| anyhow!("packed array length mismatch"))
    }

    fn write_packed<W: Write>(&self, w: &mut W) -> AnyResult {
        for value in self {
            value.write_packed(w)?;
        }
        ok()
    }
}

macro_rules! impl_data {
    ($type:ty, $read:ident, $write:ident) => {
        impl PackedData for $type {
            const PACKED_SIZE: usize = ::std::mem::size_of::<$type>();

            fn read_packed<R: Read>(r: &mut R) -> AnyResult<Self> {
                Ok(r.$read::<LE>()?)
            }

            fn write_packed<W: Write>(&self, w: &mut W) -> AnyResult {
                w.$write::<LE>(*self)?;
                ok()
            }
        }
    };
}

impl_data!(u16, read_u16, write_u16);
impl_data!(u32, read_u32, write_u32);
impl_data!(u64, read_u64, write_u64);

impl PackedData for u8 {
    const PACKED_SIZE: usize = 1;

    fn read_packed<R: Read>(r: &mut R) -> AnyResult<Self> {
        Ok(r.read_u8()?)
    }

    fn write_packed<W: Write>(&self, w: &mut W) -> AnyResult {
        w.write_u8(*self)?;
        ok()
    }
}

/// Trait with a `write_packed` wrapper method for any [`Write`] type, purely for clarity.
pub trait PackedWriteExt {
    /// Writes the specified [`PackedData`] object into this stream.
    fn write_packed(&mut self, t: &impl PackedData) -> AnyResult;
}

impl<T: Write> PackedWriteExt for T {
    fn write_packed(&mut self, t: &impl PackedData) -> AnyResult {
        t.write_packed(self)
    }
}

/// Trait with a `read_packed` wrapper method for any [`Read`] type, purely for clarity.
pub trait PackedReadExt {
    /// Reads the specified [`PackedData`] type from this stream.
    fn read_packed<T: PackedData>(&mut self) -> AnyResult<T>;
}

impl<T: Read> PackedReadExt for T {
    fn read_packed<R: PackedData>(&mut self) -> AnyResult<R> {
        R::read_packed(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    pub fn array_reads_in_order() {
        let bytes = [1u8, 0, 0, 0, 2, 0, 0, 0, 3, 0, 0, 0];
        let values: [u32; 3] = <[u32; 3]>::from_packed_bytes(&bytes).unwrap();
        assert_eq!(values, [1, 2, 3]);
        assert_eq!(<[u32; 3]>::PACKED_SIZE, 12);
    }

    #[test]
    pub fn short_input_is_rejected_before_reading() {
        assert!(<[u32; 11]>::from_packed_bytes(&[0u8; 43]).is_err());
    }

    #[test]
    pub fn write_matches_read() {
        let mut out = vec![];
        out.write_packed(&0xDEADBEEFu32).unwrap();
        out.write_packed(&[7u16, 8u16]).unwrap();
        assert_eq!(out, [0xEF, 0xBE, 0xAD, 0xDE, 7, 0, 8, 0]);

        let mut cursor = Cursor::new(&out);
        assert_eq!(cursor.read_packed::<u32>().unwrap(), 0xDEADBEEF);
        assert_eq!(cursor.read_packed::<[u16; 2]>().unwrap(), [7, 8]);
    }
}

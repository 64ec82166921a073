//! Byte-level writer and reader.
//!
//! The writer appends little-endian scalars to a growable buffer and can
//! patch previously-reserved offsets (archives back-patch their entry
//! offsets this way). [`Serializer::serialize_with`] reserves a region
//! and lets a callback fill it, which is how compressed payloads stream
//! into the buffer without an intermediate copy.

use crate::error::{Result, SerializationError};

/// Little-endian byte writer.
#[derive(Clone, Debug, Default)]
pub struct Serializer {
    data: Vec<u8>,
}

macro_rules! write_scalar {
    ($name:ident, $at_name:ident, $ty:ty) => {
        /// Appends the value; returns the offset it was written at.
        pub fn $name(&mut self, value: $ty) -> usize {
            let offset = self.data.len();
            self.data.extend_from_slice(&value.to_le_bytes());
            offset
        }

        /// Overwrites a previously-written value at `offset`.
        pub fn $at_name(&mut self, offset: usize, value: $ty) {
            let bytes = value.to_le_bytes();
            self.data[offset..offset + bytes.len()].copy_from_slice(&bytes);
        }
    };
}

impl Serializer {
    pub fn new() -> Self {
        Self::default()
    }

    write_scalar!(serialize_u8, serialize_u8_at, u8);
    write_scalar!(serialize_u16, serialize_u16_at, u16);
    write_scalar!(serialize_u32, serialize_u32_at, u32);
    write_scalar!(serialize_u64, serialize_u64_at, u64);
    write_scalar!(serialize_i8, serialize_i8_at, i8);
    write_scalar!(serialize_i16, serialize_i16_at, i16);
    write_scalar!(serialize_i32, serialize_i32_at, i32);
    write_scalar!(serialize_i64, serialize_i64_at, i64);
    write_scalar!(serialize_f32, serialize_f32_at, f32);
    write_scalar!(serialize_f64, serialize_f64_at, f64);

    pub fn serialize_bool(&mut self, value: bool) -> usize {
        self.serialize_u8(u8::from(value))
    }

    /// `u32` length followed by the UTF-8 bytes.
    pub fn serialize_string(&mut self, value: &str) -> usize {
        let offset = self.serialize_u32(value.len() as u32);
        self.data.extend_from_slice(value.as_bytes());
        offset
    }

    pub fn serialize_bytes(&mut self, bytes: &[u8]) -> usize {
        let offset = self.data.len();
        self.data.extend_from_slice(bytes);
        offset
    }

    /// Reserves `size` bytes and lets `fill` write into them; the region
    /// is truncated to the number of bytes the callback reports used.
    /// Returns the region's offset.
    pub fn serialize_with(
        &mut self,
        size: usize,
        fill: impl FnOnce(&mut [u8]) -> Result<usize>,
    ) -> Result<usize> {
        let offset = self.data.len();
        self.data.resize(offset + size, 0);
        let used = fill(&mut self.data[offset..])?;
        debug_assert!(used <= size);
        self.data.truncate(offset + used);
        Ok(offset)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

/// Little-endian byte reader with random access for archives.
#[derive(Clone, Debug)]
pub struct Deserializer<'a> {
    data: &'a [u8],
    position: usize,
}

macro_rules! read_scalar {
    ($name:ident, $ty:ty) => {
        pub fn $name(&mut self) -> Result<$ty> {
            const SIZE: usize = std::mem::size_of::<$ty>();
            let bytes = self.take(SIZE)?;
            Ok(<$ty>::from_le_bytes(bytes.try_into().expect("sized slice")))
        }
    };
}

impl<'a> Deserializer<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    fn take(&mut self, count: usize) -> Result<&'a [u8]> {
        if self.position + count > self.data.len() {
            return Err(SerializationError::UnexpectedEndOfStream);
        }
        let bytes = &self.data[self.position..self.position + count];
        self.position += count;
        Ok(bytes)
    }

    read_scalar!(deserialize_u8, u8);
    read_scalar!(deserialize_u16, u16);
    read_scalar!(deserialize_u32, u32);
    read_scalar!(deserialize_u64, u64);
    read_scalar!(deserialize_i8, i8);
    read_scalar!(deserialize_i16, i16);
    read_scalar!(deserialize_i32, i32);
    read_scalar!(deserialize_i64, i64);
    read_scalar!(deserialize_f32, f32);
    read_scalar!(deserialize_f64, f64);

    pub fn deserialize_bool(&mut self) -> Result<bool> {
        Ok(self.deserialize_u8()? != 0)
    }

    pub fn deserialize_string(&mut self) -> Result<String> {
        let length = self.deserialize_u32()? as usize;
        let bytes = self.take(length)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| SerializationError::InvalidString)
    }

    pub fn deserialize_bytes(&mut self, count: usize) -> Result<&'a [u8]> {
        self.take(count)
    }

    /// Hands `size` bytes to a callback (compression streaming).
    pub fn deserialize_with(
        &mut self,
        size: usize,
        read: impl FnOnce(&[u8]) -> Result<()>,
    ) -> Result<()> {
        let bytes = self.take(size)?;
        read(bytes)
    }

    /// Random access, used by the archive reader.
    pub fn seek_to(&mut self, offset: usize) -> Result<()> {
        if offset > self.data.len() {
            return Err(SerializationError::SeekOutOfBounds(offset));
        }
        self.position = offset;
        Ok(())
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_round_trip() {
        let mut serializer = Serializer::new();
        serializer.serialize_u8(0xAB);
        serializer.serialize_u16(0xCDEF);
        serializer.serialize_u32(0xDEADBEEF);
        serializer.serialize_u64(0x0123456789ABCDEF);
        serializer.serialize_i32(-42);
        serializer.serialize_f32(3.5);
        serializer.serialize_f64(-0.25);
        serializer.serialize_bool(true);

        let data = serializer.into_data();
        let mut deserializer = Deserializer::new(&data);
        assert_eq!(deserializer.deserialize_u8().unwrap(), 0xAB);
        assert_eq!(deserializer.deserialize_u16().unwrap(), 0xCDEF);
        assert_eq!(deserializer.deserialize_u32().unwrap(), 0xDEADBEEF);
        assert_eq!(deserializer.deserialize_u64().unwrap(), 0x0123456789ABCDEF);
        assert_eq!(deserializer.deserialize_i32().unwrap(), -42);
        assert_eq!(deserializer.deserialize_f32().unwrap(), 3.5);
        assert_eq!(deserializer.deserialize_f64().unwrap(), -0.25);
        assert!(deserializer.deserialize_bool().unwrap());
        assert_eq!(deserializer.remaining(), 0);
    }

    #[test]
    fn test_little_endian_layout() {
        let mut serializer = Serializer::new();
        serializer.serialize_u32(0x4E534C42);
        assert_eq!(serializer.data(), &[0x42, 0x4C, 0x53, 0x4E]);
    }

    #[test]
    fn test_string_round_trip() {
        let mut serializer = Serializer::new();
        serializer.serialize_string("héllo");
        let data = serializer.into_data();
        let mut deserializer = Deserializer::new(&data);
        assert_eq!(deserializer.deserialize_string().unwrap(), "héllo");
    }

    #[test]
    fn test_patching() {
        let mut serializer = Serializer::new();
        let offset = serializer.serialize_u32(0);
        serializer.serialize_u32(7);
        serializer.serialize_u32_at(offset, 99);

        let data = serializer.into_data();
        let mut deserializer = Deserializer::new(&data);
        assert_eq!(deserializer.deserialize_u32().unwrap(), 99);
        assert_eq!(deserializer.deserialize_u32().unwrap(), 7);
    }

    #[test]
    fn test_serialize_with_truncates() {
        let mut serializer = Serializer::new();
        serializer
            .serialize_with(16, |region| {
                region[..4].copy_from_slice(&[1, 2, 3, 4]);
                Ok(4)
            })
            .unwrap();
        assert_eq!(serializer.len(), 4);
    }

    #[test]
    fn test_eof_and_seek() {
        let data = [1u8, 2];
        let mut deserializer = Deserializer::new(&data);
        assert!(deserializer.deserialize_u32().is_err());
        assert!(deserializer.seek_to(3).is_err());
        deserializer.seek_to(1).unwrap();
        assert_eq!(deserializer.deserialize_u8().unwrap(), 2);
    }
}

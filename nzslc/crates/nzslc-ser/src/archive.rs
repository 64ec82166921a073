//! Archive container (`nzsla`).
//!
//! Bundles serialized modules under their names:
//! `magic 'NSAF' | version | count | header entries | payloads`, where
//! each header entry is `{name, kind, flags, offset, size}` and offsets
//! are back-patched once the payloads are written. Entries flagged
//! [`ArchiveEntryFlags::COMPRESSED_LZ4`] carry a
//! `{decompressed_size, compressed_size}` header followed by an LZ4 block.

use crate::error::{Result, SerializationError};
use crate::serializer::{Deserializer, Serializer};
use bitflags::bitflags;

/// `'NSAF'`.
const MAGIC: u32 = 0x4E534146;
const CURRENT_VERSION: u32 = 1;

/// Largest payload a single archive entry can hold (LZ4's input bound).
const MAX_MODULE_SIZE: usize = 0x7E000000;

/// What an archive entry contains.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArchiveEntryKind {
    BinaryShaderModule,
}

impl ArchiveEntryKind {
    fn to_u32(self) -> u32 {
        match self {
            ArchiveEntryKind::BinaryShaderModule => 0,
        }
    }

    fn from_u32(value: u32) -> Result<Self> {
        match value {
            0 => Ok(ArchiveEntryKind::BinaryShaderModule),
            _ => Err(SerializationError::InvalidEnum {
                what: "archive entry kind",
                value,
            }),
        }
    }
}

bitflags! {
    /// Per-entry storage flags.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct ArchiveEntryFlags: u32 {
        const COMPRESSED_LZ4 = 1 << 0;
    }
}

/// One stored module: its name and its (possibly compressed) payload.
#[derive(Clone, Debug, PartialEq)]
pub struct ArchiveModule {
    pub name: String,
    pub kind: ArchiveEntryKind,
    pub flags: ArchiveEntryFlags,
    pub data: Vec<u8>,
}

/// A multi-module bundle.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Archive {
    modules: Vec<ArchiveModule>,
}

impl Archive {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a module payload, compressing it if `flags` ask for it.
    pub fn add_module(
        &mut self,
        name: impl Into<String>,
        kind: ArchiveEntryKind,
        module_data: &[u8],
        flags: ArchiveEntryFlags,
    ) -> Result<()> {
        let name = name.into();
        if self.find_module(&name).is_some() {
            return Err(SerializationError::DuplicateModule(name));
        }

        let data = Self::compress_module(module_data, flags)?;
        self.modules.push(ArchiveModule {
            name,
            kind,
            flags,
            data,
        });
        Ok(())
    }

    fn add_raw_module(&mut self, module: ArchiveModule) -> Result<()> {
        if self.find_module(&module.name).is_some() {
            return Err(SerializationError::DuplicateModule(module.name));
        }
        self.modules.push(module);
        Ok(())
    }

    /// Moves every module of `other` into this archive; duplicate names
    /// are an error.
    pub fn merge(&mut self, other: Archive) -> Result<()> {
        for module in other.modules {
            self.add_raw_module(module)?;
        }
        Ok(())
    }

    pub fn modules(&self) -> &[ArchiveModule] {
        &self.modules
    }

    pub fn find_module(&self, name: &str) -> Option<&ArchiveModule> {
        self.modules.iter().find(|module| module.name == name)
    }

    /// Stored payload of a module, decompressed if needed.
    pub fn module_data(&self, name: &str) -> Option<Result<Vec<u8>>> {
        self.find_module(name)
            .map(|module| Self::decompress_module(&module.data, module.flags))
    }

    fn compress_module(module_data: &[u8], flags: ArchiveEntryFlags) -> Result<Vec<u8>> {
        if !flags.contains(ArchiveEntryFlags::COMPRESSED_LZ4) {
            return Ok(module_data.to_vec());
        }

        if module_data.len() > MAX_MODULE_SIZE {
            return Err(SerializationError::ModuleTooLarge(module_data.len()));
        }

        let mut serializer = Serializer::new();
        serializer.serialize_u32(module_data.len() as u32); // decompressed size
        let compressed_size_offset = serializer.serialize_u32(0);

        let bound = lz4_flex::block::get_maximum_output_size(module_data.len());
        let mut compressed_size = 0u32;
        serializer.serialize_with(bound, |region| {
            let written = lz4_flex::block::compress_into(module_data, region)
                .map_err(|_| SerializationError::CompressionFailed)?;
            compressed_size = written as u32;
            Ok(written)
        })?;
        serializer.serialize_u32_at(compressed_size_offset, compressed_size);

        Ok(serializer.into_data())
    }

    fn decompress_module(data: &[u8], flags: ArchiveEntryFlags) -> Result<Vec<u8>> {
        if !flags.contains(ArchiveEntryFlags::COMPRESSED_LZ4) {
            return Ok(data.to_vec());
        }

        let mut deserializer = Deserializer::new(data);
        let decompressed_size = deserializer.deserialize_u32()? as usize;
        let compressed_size = deserializer.deserialize_u32()? as usize;

        let mut decompressed = Vec::new();
        deserializer.deserialize_with(compressed_size, |compressed| {
            decompressed = lz4_flex::block::decompress(compressed, decompressed_size)
                .map_err(|_| SerializationError::DecompressionFailed)?;
            Ok(())
        })?;
        Ok(decompressed)
    }
}

/// Writes an archive: header entries first (offsets zeroed), then the
/// payloads, back-patching each entry's offset.
pub fn serialize_archive(serializer: &mut Serializer, archive: &Archive) {
    serializer.serialize_u32(MAGIC);
    serializer.serialize_u32(CURRENT_VERSION);
    serializer.serialize_u32(archive.modules.len() as u32);

    let mut offset_slots = Vec::with_capacity(archive.modules.len());
    for module in &archive.modules {
        serializer.serialize_string(&module.name);
        serializer.serialize_u32(module.kind.to_u32());
        serializer.serialize_u32(module.flags.bits());
        offset_slots.push(serializer.serialize_u32(0)); // patched below
        serializer.serialize_u32(module.data.len() as u32);
    }

    for (module, offset_slot) in archive.modules.iter().zip(offset_slots) {
        let offset = serializer.serialize_bytes(&module.data);
        serializer.serialize_u32_at(offset_slot, offset as u32);
    }
}

/// Reads an archive written by [`serialize_archive`].
pub fn deserialize_archive(deserializer: &mut Deserializer) -> Result<Archive> {
    if deserializer.deserialize_u32()? != MAGIC {
        return Err(SerializationError::InvalidMagic);
    }
    let version = deserializer.deserialize_u32()?;
    if version > CURRENT_VERSION {
        return Err(SerializationError::UnsupportedBinaryVersion(version));
    }

    let count = deserializer.deserialize_u32()?;

    struct Entry {
        name: String,
        kind: ArchiveEntryKind,
        flags: ArchiveEntryFlags,
        offset: u32,
        size: u32,
    }

    let mut entries = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let name = deserializer.deserialize_string()?;
        let kind = ArchiveEntryKind::from_u32(deserializer.deserialize_u32()?)?;
        let flag_bits = deserializer.deserialize_u32()?;
        let flags =
            ArchiveEntryFlags::from_bits(flag_bits).ok_or(SerializationError::InvalidEnum {
                what: "archive entry flags",
                value: flag_bits,
            })?;
        let offset = deserializer.deserialize_u32()?;
        let size = deserializer.deserialize_u32()?;
        entries.push(Entry {
            name,
            kind,
            flags,
            offset,
            size,
        });
    }

    let mut archive = Archive::new();
    for entry in entries {
        deserializer.seek_to(entry.offset as usize)?;
        let data = deserializer.deserialize_bytes(entry.size as usize)?.to_vec();
        archive.add_raw_module(ArchiveModule {
            name: entry.name,
            kind: entry.kind,
            flags: entry.flags,
            data,
        })?;
    }

    Ok(archive)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(size: usize, seed: u8) -> Vec<u8> {
        // repetitive content so LZ4 actually compresses
        (0..size).map(|i| seed.wrapping_add((i % 16) as u8)).collect()
    }

    #[test]
    fn test_archive_round_trip_uncompressed() {
        let mut archive = Archive::new();
        archive
            .add_module(
                "Engine.A",
                ArchiveEntryKind::BinaryShaderModule,
                &payload(128, 1),
                ArchiveEntryFlags::empty(),
            )
            .unwrap();
        archive
            .add_module(
                "Engine.B",
                ArchiveEntryKind::BinaryShaderModule,
                &payload(256, 2),
                ArchiveEntryFlags::empty(),
            )
            .unwrap();

        let mut serializer = Serializer::new();
        serialize_archive(&mut serializer, &archive);
        let data = serializer.into_data();
        assert_eq!(&data[0..4], &[0x46, 0x41, 0x53, 0x4E]); // 'NSAF'

        let restored = deserialize_archive(&mut Deserializer::new(&data)).unwrap();
        assert_eq!(restored, archive);
        assert_eq!(restored.module_data("Engine.A").unwrap().unwrap(), payload(128, 1));
    }

    #[test]
    fn test_archive_round_trip_compressed() {
        let original = payload(4096, 7);
        let mut archive = Archive::new();
        archive
            .add_module(
                "Engine.C",
                ArchiveEntryKind::BinaryShaderModule,
                &original,
                ArchiveEntryFlags::COMPRESSED_LZ4,
            )
            .unwrap();

        // the stored payload is smaller than the input
        assert!(archive.find_module("Engine.C").unwrap().data.len() < original.len());

        let mut serializer = Serializer::new();
        serialize_archive(&mut serializer, &archive);
        let data = serializer.into_data();

        let restored = deserialize_archive(&mut Deserializer::new(&data)).unwrap();
        assert_eq!(restored.module_data("Engine.C").unwrap().unwrap(), original);
    }

    #[test]
    fn test_duplicate_module_rejected() {
        let mut archive = Archive::new();
        archive
            .add_module(
                "Same",
                ArchiveEntryKind::BinaryShaderModule,
                &[1, 2, 3],
                ArchiveEntryFlags::empty(),
            )
            .unwrap();
        let err = archive
            .add_module(
                "Same",
                ArchiveEntryKind::BinaryShaderModule,
                &[4, 5, 6],
                ArchiveEntryFlags::empty(),
            )
            .unwrap_err();
        assert_eq!(err, SerializationError::DuplicateModule(String::from("Same")));
    }

    #[test]
    fn test_merge() {
        let mut first = Archive::new();
        first
            .add_module(
                "A",
                ArchiveEntryKind::BinaryShaderModule,
                &[1],
                ArchiveEntryFlags::empty(),
            )
            .unwrap();

        let mut second = Archive::new();
        second
            .add_module(
                "B",
                ArchiveEntryKind::BinaryShaderModule,
                &[2],
                ArchiveEntryFlags::empty(),
            )
            .unwrap();

        first.merge(second).unwrap();
        assert_eq!(first.modules().len(), 2);

        let mut duplicate = Archive::new();
        duplicate
            .add_module(
                "A",
                ArchiveEntryKind::BinaryShaderModule,
                &[3],
                ArchiveEntryFlags::empty(),
            )
            .unwrap();
        assert!(first.merge(duplicate).is_err());
    }

    #[test]
    fn test_missing_module() {
        let archive = Archive::new();
        assert!(archive.find_module("missing").is_none());
        assert!(archive.module_data("missing").is_none());
    }

    #[test]
    fn test_invalid_magic() {
        let err = deserialize_archive(&mut Deserializer::new(&[0u8; 16])).unwrap_err();
        assert_eq!(err, SerializationError::InvalidMagic);
    }
}

//! nzslc-ser - Binary serialization
//!
//! Serializes resolved (or freshly-parsed) modules into the compact
//! versioned `nzslb` binary form, and bundles multiple serialized modules
//! into the `nzsla` archive container with optional LZ4 compression.
//!
//! All scalars are written little-endian. Node tags are stable within a
//! major version; readers reject newer major versions.

mod archive;
mod error;
mod module;
mod serializer;

pub use archive::{
    deserialize_archive, serialize_archive, Archive, ArchiveEntryFlags, ArchiveEntryKind,
    ArchiveModule,
};
pub use error::{Result, SerializationError};
pub use module::{deserialize_module, serialize_module, BINARY_VERSION};
pub use serializer::{Deserializer, Serializer};

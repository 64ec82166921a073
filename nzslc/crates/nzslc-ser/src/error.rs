//! Serialization errors.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SerializationError>;

#[derive(Clone, Debug, Error, PartialEq)]
pub enum SerializationError {
    #[error("compression failed")]
    CompressionFailed,

    #[error("decompression failed")]
    DecompressionFailed,

    #[error("module {0} is already registered")]
    DuplicateModule(String),

    #[error("invalid {what} value {value}")]
    InvalidEnum { what: &'static str, value: u32 },

    #[error("invalid magic number")]
    InvalidMagic,

    #[error("invalid node tag {0}")]
    InvalidTag(u8),

    #[error("invalid string payload")]
    InvalidString,

    #[error("module is too large ({0} bytes)")]
    ModuleTooLarge(usize),

    #[error("seek to {0} is out of bounds")]
    SeekOutOfBounds(usize),

    #[error("unexpected end of stream")]
    UnexpectedEndOfStream,

    #[error("unsupported binary version {0}")]
    UnsupportedBinaryVersion(u32),
}

//! Resolver errors.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ResolverError>;

#[derive(Debug, Error)]
pub enum ResolverError {
    #[error(transparent)]
    Compilation(#[from] nzslc_util::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serialization(#[from] nzslc_ser::SerializationError),

    #[error("watch error: {0}")]
    Watch(#[from] notify::Error),
}

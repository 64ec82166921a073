//! nzslc-util - Core Utilities and Foundation Types
//!
//! This crate provides the foundation types shared by every phase of the
//! NZSL compiler:
//!
//! - [`SourceLocation`]: file-aware source spans attached to every token,
//!   AST node and error.
//! - The error taxonomy ([`Error`], [`LexingError`], [`ParsingError`],
//!   [`AstError`], [`CompilationError`]): one closed enum per category,
//!   formatted the way compiler drivers and IDE integrations expect.
//! - [`FieldOffsets`]: the memory-layout calculator used for `std140`,
//!   `std430` and scalar struct layouts. All passes and back-ends agree on
//!   layouts because they all go through this single implementation.

mod error;
mod field_offsets;
mod span;

pub use error::{
    AstError, CompilationError, Error, ErrorCategory, ErrorKind, LexingError, ParsingError, Result,
};
pub use field_offsets::{FieldKind, FieldOffsets, StructLayout};
pub use span::{SourceFile, SourceLocation};

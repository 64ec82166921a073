//! Source location tracking.
//!
//! Every token, AST node and error carries a [`SourceLocation`]: a
//! `(start_line, start_column) .. (end_line, end_column)` range plus a
//! shared handle to the file it came from. File paths are interned once
//! per file and shared by reference counting; a location from a module
//! keeps the path alive for as long as any node referencing it exists.

use std::fmt;
use std::sync::Arc;

/// Shared handle to an interned source-file path.
///
/// Many locations across many modules reference the same file; the handle
/// is a cheap clone and the path lives as long as its longest holder.
pub type SourceFile = Arc<String>;

/// A range of source code, identified by 1-based line/column pairs and an
/// optional file handle.
///
/// The default location is invalid (all zeroes, no file) and formats as
/// `?`; it is used for synthesized nodes that have no source counterpart.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SourceLocation {
    /// Interned path of the file this location points into, if known.
    pub file: Option<SourceFile>,
    /// Line the range starts on (1-based).
    pub start_line: u32,
    /// Column the range starts on (1-based).
    pub start_column: u32,
    /// Line the range ends on (inclusive).
    pub end_line: u32,
    /// Column the range ends on (inclusive).
    pub end_column: u32,
}

impl SourceLocation {
    /// Creates a location covering a single point.
    pub fn new(file: Option<SourceFile>, line: u32, column: u32) -> Self {
        Self {
            file,
            start_line: line,
            start_column: column,
            end_line: line,
            end_column: column,
        }
    }

    /// Creates a location covering an explicit range inside one file.
    pub fn new_range(
        file: Option<SourceFile>,
        start_line: u32,
        start_column: u32,
        end_line: u32,
        end_column: u32,
    ) -> Self {
        Self {
            file,
            start_line,
            start_column,
            end_line,
            end_column,
        }
    }

    /// Builds the smallest location covering both `left` and `right`.
    ///
    /// The file handle is taken from `left` (locations merged this way are
    /// expected to come from the same file).
    pub fn build_from_to(left: &SourceLocation, right: &SourceLocation) -> SourceLocation {
        SourceLocation {
            file: left.file.clone().or_else(|| right.file.clone()),
            start_line: left.start_line,
            start_column: left.start_column,
            end_line: right.end_line,
            end_column: right.end_column,
        }
    }

    /// Widens this location so it starts where `other` starts.
    pub fn extend_to_left(&mut self, other: &SourceLocation) {
        self.start_line = other.start_line;
        self.start_column = other.start_column;
        if self.file.is_none() {
            self.file = other.file.clone();
        }
    }

    /// Widens this location so it ends where `other` ends.
    pub fn extend_to_right(&mut self, other: &SourceLocation) {
        self.end_line = other.end_line;
        self.end_column = other.end_column;
        if self.file.is_none() {
            self.file = other.file.clone();
        }
    }

    /// Returns true if this location points at real source code.
    pub fn is_valid(&self) -> bool {
        self.start_line != 0
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_valid() {
            return write!(f, "?");
        }

        let file = self.file.as_deref().map(String::as_str).unwrap_or("");
        if self.start_line != self.end_line {
            write!(
                f,
                "{}({} -> {},{} -> {})",
                file, self.start_line, self.end_line, self.start_column, self.end_column
            )
        } else if self.start_column != self.end_column {
            write!(
                f,
                "{}({},{} -> {})",
                file, self.start_line, self.start_column, self.end_column
            )
        } else {
            write!(f, "{}({}, {})", file, self.start_line, self.start_column)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file() -> SourceFile {
        Arc::new(String::from("test.nzsl"))
    }

    #[test]
    fn test_default_is_invalid() {
        let loc = SourceLocation::default();
        assert!(!loc.is_valid());
        assert_eq!(loc.to_string(), "?");
    }

    #[test]
    fn test_point_display() {
        let loc = SourceLocation::new(Some(file()), 3, 7);
        assert!(loc.is_valid());
        assert_eq!(loc.to_string(), "test.nzsl(3, 7)");
    }

    #[test]
    fn test_column_range_display() {
        let loc = SourceLocation::new_range(Some(file()), 3, 7, 3, 12);
        assert_eq!(loc.to_string(), "test.nzsl(3,7 -> 12)");
    }

    #[test]
    fn test_line_range_display() {
        let loc = SourceLocation::new_range(Some(file()), 3, 7, 5, 2);
        assert_eq!(loc.to_string(), "test.nzsl(3 -> 5,7 -> 2)");
    }

    #[test]
    fn test_build_from_to() {
        let left = SourceLocation::new_range(Some(file()), 1, 5, 1, 9);
        let right = SourceLocation::new_range(Some(file()), 2, 1, 2, 4);
        let merged = SourceLocation::build_from_to(&left, &right);
        assert_eq!(merged.start_line, 1);
        assert_eq!(merged.start_column, 5);
        assert_eq!(merged.end_line, 2);
        assert_eq!(merged.end_column, 4);
    }

    #[test]
    fn test_extend() {
        let mut loc = SourceLocation::new_range(Some(file()), 2, 4, 2, 8);
        loc.extend_to_left(&SourceLocation::new(None, 1, 1));
        loc.extend_to_right(&SourceLocation::new(None, 3, 2));
        assert_eq!(loc.start_line, 1);
        assert_eq!(loc.start_column, 1);
        assert_eq!(loc.end_line, 3);
        assert_eq!(loc.end_column, 2);
    }

    #[test]
    fn test_file_handle_is_shared() {
        let handle = file();
        let a = SourceLocation::new(Some(handle.clone()), 1, 1);
        let b = SourceLocation::new(Some(handle.clone()), 2, 1);
        assert!(Arc::ptr_eq(a.file.as_ref().unwrap(), b.file.as_ref().unwrap()));
    }
}

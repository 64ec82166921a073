//! Module structure and metadata.

use super::enums::ModuleFeature;
use super::nodes::MultiStatement;
use std::fmt;
use std::sync::Arc;

/// Language version carried by the mandatory `[nzsl_version("x.y[.z]")]`
/// attribute.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u8,
    pub minor: u8,
    pub patch: u16,
}

impl Version {
    pub const fn new(major: u8, minor: u8, patch: u16) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parses `"x.y"` or `"x.y.z"`.
    pub fn parse(text: &str) -> Option<Version> {
        let mut parts = text.split('.');
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next()?.parse().ok()?;
        let patch = match parts.next() {
            Some(part) => part.parse().ok()?,
            None => 0,
        };
        if parts.next().is_some() {
            return None;
        }
        Some(Version {
            major,
            minor,
            patch,
        })
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Module metadata, filled from the header attributes.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Metadata {
    pub lang_version: Version,
    pub module_name: String,
    pub author: String,
    pub description: String,
    pub license: String,
    pub enabled_features: Vec<ModuleFeature>,
}

/// An imported module, stored by the identifier it is known under inside
/// the importer.
#[derive(Clone, Debug, PartialEq)]
pub struct ImportedModule {
    pub identifier: String,
    pub module: Module,
}

/// A compilation unit: metadata, transitively imported modules and the
/// root statement tree.
///
/// Metadata is shared (a resolver may hand the same module to many
/// importers); the statement tree is exclusively owned.
#[derive(Clone, Debug, PartialEq)]
pub struct Module {
    pub metadata: Arc<Metadata>,
    pub imported_modules: Vec<ImportedModule>,
    pub root: MultiStatement,
}

impl Module {
    pub fn new(metadata: Metadata) -> Self {
        Self {
            metadata: Arc::new(metadata),
            imported_modules: Vec::new(),
            root: MultiStatement::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.module_name
    }

    pub fn has_feature(&self, feature: ModuleFeature) -> bool {
        self.metadata.enabled_features.contains(&feature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_parse() {
        assert_eq!(Version::parse("1.0"), Some(Version::new(1, 0, 0)));
        assert_eq!(Version::parse("1.2.3"), Some(Version::new(1, 2, 3)));
        assert_eq!(Version::parse("1"), None);
        assert_eq!(Version::parse("1.2.3.4"), None);
        assert_eq!(Version::parse("a.b"), None);
    }

    #[test]
    fn test_version_display() {
        assert_eq!(Version::new(1, 0, 0).to_string(), "1.0.0");
    }

    #[test]
    fn test_features() {
        let mut metadata = Metadata::default();
        metadata.enabled_features.push(ModuleFeature::Float64);
        let module = Module::new(metadata);
        assert!(module.has_feature(ModuleFeature::Float64));
        assert!(!module.has_feature(ModuleFeature::Texture1D));
    }
}

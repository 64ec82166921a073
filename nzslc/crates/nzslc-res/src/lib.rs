//! nzslc-res - Module resolvers
//!
//! Concrete [`ModuleResolver`] implementations:
//!
//! - [`FilesystemModuleResolver`]: indexes a directory of `.nzsl` /
//!   `.nzslb` files (file stem = module name), parses modules lazily on
//!   first resolution and caches them, watches the directory for changes
//!   and notifies `module_updated` listeners so higher layers can drop
//!   stale compilation caches.
//!
//! Resolution is safe for concurrent callers: the index and cache sit
//! behind read-write locks and are only write-locked on first parse or
//! invalidation.

mod error;
mod filesystem;

pub use error::{ResolverError, Result};
pub use filesystem::FilesystemModuleResolver;

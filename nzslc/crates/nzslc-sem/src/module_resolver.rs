//! Module resolver interface.
//!
//! Resolvers map module names to parsed modules. The resolve pass
//! consults the resolver when it encounters an `import` statement;
//! resolved modules are shared (`Arc`) and cloned into the importer for
//! transformation.
//!
//! Implementations must be safe for concurrent `resolve` calls; listeners
//! registered through [`ModuleResolver::on_module_updated`] must not
//! mutate the resolver synchronously from within the notification.

use nzslc_par::ast::Module;
use std::sync::Arc;

/// Callback invoked when a module's source changes.
pub type ModuleUpdateCallback = Box<dyn Fn(&str) + Send + Sync>;

/// Maps module names to modules.
pub trait ModuleResolver: Send + Sync {
    /// Looks up a module by name; `None` if unknown.
    fn resolve(&self, module_name: &str) -> Option<Arc<Module>>;

    /// Registers a callback fired when a module's source changes on disk.
    /// Resolvers without change detection ignore the registration.
    fn on_module_updated(&self, _callback: ModuleUpdateCallback) {}
}

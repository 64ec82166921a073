//! Filesystem-backed module resolver.

use crate::error::Result;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use nzslc_par::ast::Module;
use nzslc_par::parse_source;
use nzslc_sem::module_resolver::{ModuleResolver, ModuleUpdateCallback};
use nzslc_ser::{deserialize_module, Archive};
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

/// Source-file extensions the resolver indexes.
const SOURCE_EXTENSION: &str = "nzsl";
const BINARY_EXTENSION: &str = "nzslb";

#[derive(Default)]
struct ResolverState {
    /// module name (or file stem) -> source path, filled by directory
    /// scans
    index: FxHashMap<String, PathBuf>,
    /// path -> the module name it was registered under
    registered_paths: FxHashMap<PathBuf, String>,
    /// parsed modules by name
    cache: FxHashMap<String, Arc<Module>>,
}

#[derive(Default)]
struct Inner {
    state: RwLock<ResolverState>,
    callbacks: RwLock<Vec<ModuleUpdateCallback>>,
}

impl Inner {
    fn notify_updated(&self, module_name: &str) {
        // listeners run outside any state lock and must not mutate the
        // resolver from within the notification
        let callbacks = self.callbacks.read();
        for callback in callbacks.iter() {
            callback(module_name);
        }
    }

    fn invalidate_path(&self, path: &Path) {
        let name = {
            let mut state = self.state.write();
            let Some(name) = state.registered_paths.get(path).cloned() else {
                return;
            };
            state.cache.remove(&name);
            name
        };
        self.notify_updated(&name);
    }
}

/// Resolves modules from a directory tree, with change notifications.
pub struct FilesystemModuleResolver {
    inner: Arc<Inner>,
    watcher: Mutex<Option<RecommendedWatcher>>,
}

impl FilesystemModuleResolver {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner::default()),
            watcher: Mutex::new(None),
        }
    }

    /// Indexes every module file under `directory` (recursively); the
    /// file stem names the module until its header says otherwise.
    /// Files are parsed lazily, on first resolution.
    pub fn register_directory(&self, directory: impl AsRef<Path>) -> Result<()> {
        fn scan(directory: &Path, state: &mut ResolverState) -> std::io::Result<()> {
            for entry in std::fs::read_dir(directory)? {
                let entry = entry?;
                let path = entry.path();
                if path.is_dir() {
                    scan(&path, state)?;
                    continue;
                }
                let Some(extension) = path.extension().and_then(|ext| ext.to_str()) else {
                    continue;
                };
                if extension != SOURCE_EXTENSION && extension != BINARY_EXTENSION {
                    continue;
                }
                let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
                    continue;
                };
                state.index.insert(stem.to_owned(), path.clone());
                state.registered_paths.insert(path.clone(), stem.to_owned());
            }
            Ok(())
        }

        let mut state = self.inner.state.write();
        scan(directory.as_ref(), &mut state)?;
        Ok(())
    }

    /// Indexes a directory and watches it for changes; listeners
    /// registered through `on_module_updated` fire when a module file
    /// changes on disk.
    pub fn register_and_watch_directory(&self, directory: impl AsRef<Path>) -> Result<()> {
        self.register_directory(directory.as_ref())?;

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let mut watcher =
            notify::recommended_watcher(move |event: notify::Result<notify::Event>| {
                let Ok(event) = event else { return };
                let Some(inner) = weak.upgrade() else { return };
                if !matches!(
                    event.kind,
                    notify::EventKind::Create(_) | notify::EventKind::Modify(_)
                ) {
                    return;
                }
                for path in event.paths {
                    inner.invalidate_path(&path);
                }
            })?;
        watcher.watch(directory.as_ref(), RecursiveMode::Recursive)?;
        *self.watcher.lock() = Some(watcher);
        Ok(())
    }

    /// Parses and registers a single module file immediately, under its
    /// declared module name (falling back to the file stem).
    pub fn register_file(&self, path: impl AsRef<Path>) -> Result<String> {
        let path = path.as_ref();
        let module = Self::load_module(path)?;
        let name = if module.name().is_empty() {
            path.file_stem()
                .and_then(|stem| stem.to_str())
                .unwrap_or_default()
                .to_owned()
        } else {
            module.name().to_owned()
        };

        let mut state = self.inner.state.write();
        state.index.insert(name.clone(), path.to_owned());
        state
            .registered_paths
            .insert(path.to_owned(), name.clone());
        state.cache.insert(name.clone(), Arc::new(module));
        Ok(name)
    }

    /// Registers an already-parsed module under a name.
    pub fn register_module(&self, name: impl Into<String>, module: Module) {
        let name = name.into();
        self.inner
            .state
            .write()
            .cache
            .insert(name, Arc::new(module));
    }

    /// Registers every module of a serialized archive as a batch source.
    pub fn register_archive(&self, archive: &Archive) -> Result<()> {
        let mut modules = Vec::new();
        for entry in archive.modules() {
            let data = archive
                .module_data(&entry.name)
                .expect("entry exists")?;
            let module = deserialize_module(&data)?;
            modules.push((entry.name.clone(), Arc::new(module)));
        }

        let mut state = self.inner.state.write();
        for (name, module) in modules {
            state.cache.insert(name, module);
        }
        Ok(())
    }

    fn load_module(path: &Path) -> Result<Module> {
        if path.extension().and_then(|ext| ext.to_str()) == Some(BINARY_EXTENSION) {
            let data = std::fs::read(path)?;
            Ok(deserialize_module(&data)?)
        } else {
            let source = std::fs::read_to_string(path)?;
            Ok(parse_source(&source, path.to_str())?)
        }
    }

    fn resolve_impl(&self, module_name: &str) -> Option<Arc<Module>> {
        if let Some(module) = self.inner.state.read().cache.get(module_name) {
            return Some(module.clone());
        }

        // lazily parse an indexed file: the stem matches either the full
        // module name or its last path segment
        let path = {
            let state = self.inner.state.read();
            state
                .index
                .get(module_name)
                .or_else(|| {
                    module_name
                        .rsplit('.')
                        .next()
                        .and_then(|stem| state.index.get(stem))
                })
                .cloned()
        }?;

        let module = Self::load_module(&path).ok()?;
        // a module declaring a different name than the requested one is
        // not a match
        if !module.name().is_empty() && module.name() != module_name {
            let stem_matches = module_name.rsplit('.').next() == Some(module.name());
            if !stem_matches {
                return None;
            }
        }

        let module = Arc::new(module);
        let mut state = self.inner.state.write();
        state
            .registered_paths
            .insert(path, module_name.to_owned());
        state
            .cache
            .insert(module_name.to_owned(), module.clone());
        Some(module)
    }
}

impl Default for FilesystemModuleResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleResolver for FilesystemModuleResolver {
    fn resolve(&self, module_name: &str) -> Option<Arc<Module>> {
        self.resolve_impl(module_name)
    }

    fn on_module_updated(&self, callback: ModuleUpdateCallback) {
        self.inner.callbacks.write().push(callback);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn write_module(directory: &Path, file_name: &str, module_name: &str) {
        let mut file = std::fs::File::create(directory.join(file_name)).unwrap();
        writeln!(file, "[nzsl_version(\"1.0\")]").unwrap();
        writeln!(file, "module {module_name};").unwrap();
        writeln!(file, "[export]\nfn helper() -> f32 {{ return 1.0; }}").unwrap();
    }

    #[test]
    fn test_resolve_by_stem() {
        let dir = tempfile::tempdir().unwrap();
        write_module(dir.path(), "Data.nzsl", "Engine.Data");

        let resolver = FilesystemModuleResolver::new();
        resolver.register_directory(dir.path()).unwrap();

        let module = resolver.resolve("Engine.Data").expect("module resolves");
        assert_eq!(module.name(), "Engine.Data");

        // cached on second resolution
        let again = resolver.resolve("Engine.Data").unwrap();
        assert!(Arc::ptr_eq(&module, &again));
    }

    #[test]
    fn test_resolve_missing_returns_none() {
        let resolver = FilesystemModuleResolver::new();
        assert!(resolver.resolve("missing").is_none());
    }

    #[test]
    fn test_recursive_directory_scan() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("lighting");
        std::fs::create_dir(&nested).unwrap();
        write_module(&nested, "Phong.nzsl", "Engine.Lighting.Phong");

        let resolver = FilesystemModuleResolver::new();
        resolver.register_directory(dir.path()).unwrap();
        assert!(resolver.resolve("Engine.Lighting.Phong").is_some());
    }

    #[test]
    fn test_register_file_uses_declared_name() {
        let dir = tempfile::tempdir().unwrap();
        write_module(dir.path(), "whatever.nzsl", "Engine.Math");

        let resolver = FilesystemModuleResolver::new();
        let name = resolver
            .register_file(dir.path().join("whatever.nzsl"))
            .unwrap();
        assert_eq!(name, "Engine.Math");
        assert!(resolver.resolve("Engine.Math").is_some());
    }

    #[test]
    fn test_register_archive() {
        use nzslc_ser::{serialize_module, ArchiveEntryFlags, ArchiveEntryKind};

        let module = nzslc_par::parse(
            "[nzsl_version(\"1.0\")]\nmodule Engine.FromArchive;\n",
        )
        .unwrap();
        let mut archive = Archive::new();
        archive
            .add_module(
                "Engine.FromArchive",
                ArchiveEntryKind::BinaryShaderModule,
                &serialize_module(&module),
                ArchiveEntryFlags::COMPRESSED_LZ4,
            )
            .unwrap();

        let resolver = FilesystemModuleResolver::new();
        resolver.register_archive(&archive).unwrap();
        let resolved = resolver.resolve("Engine.FromArchive").unwrap();
        assert_eq!(resolved.name(), "Engine.FromArchive");
        assert!(resolver.resolve("missing").is_none());
    }

    #[test]
    fn test_update_notification_on_invalidation() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let dir = tempfile::tempdir().unwrap();
        write_module(dir.path(), "Hot.nzsl", "Hot");

        let resolver = FilesystemModuleResolver::new();
        resolver.register_directory(dir.path()).unwrap();
        resolver.resolve("Hot").unwrap();

        let fired = Arc::new(AtomicUsize::new(0));
        let observed = fired.clone();
        resolver.on_module_updated(Box::new(move |name| {
            assert_eq!(name, "Hot");
            observed.fetch_add(1, Ordering::SeqCst);
        }));

        // simulate the watcher seeing the file change
        resolver.inner.invalidate_path(&dir.path().join("Hot.nzsl"));
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        // the stale cache entry was dropped; resolving re-parses
        assert!(resolver.resolve("Hot").is_some());
    }
}

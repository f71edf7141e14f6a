use std::{
    collections::{HashMap, HashSet},
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use indexmap::IndexSet;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tracing::{debug, trace, warn};
use walkdir::WalkDir;

use crate::{
    definition::ClassDefinition,
    error::{ClassReadError, ResolverError},
    name::ClassName,
    resolver::{BoundedCache, CacheStats, FindResult, Resolver, archive::define},
};

/// Classes stored as `.class` files under a directory root, one directory per
/// package.
///
/// Directories are listed on demand: looking up `a/b/C` only reads the
/// listing of `a/b`. The full name set is walked once, on the first
/// [`Resolver::all_names`] call.
#[derive(Debug)]
pub struct DirectoryResolver {
    root: PathBuf,
    moniker: String,
    // package path -> class file stems in that directory
    listings: Mutex<HashMap<String, Arc<HashSet<String>>>>,
    names: OnceCell<IndexSet<ClassName>>,
    cache: Mutex<BoundedCache<ClassName, Result<Arc<ClassDefinition>, ClassReadError>>>,
}

impl DirectoryResolver {
    pub fn new(root: impl Into<PathBuf>, cache_capacity: usize) -> Result<Self, ResolverError> {
        let root = root.into();
        if !root.is_dir() {
            return Err(ResolverError::UnsupportedLayout(root));
        }
        Ok(DirectoryResolver {
            moniker: root.display().to_string(),
            root,
            listings: Mutex::new(HashMap::new()),
            names: OnceCell::new(),
            cache: Mutex::new(BoundedCache::with_capacity(cache_capacity)),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.lock().stats()
    }

    /// Number of package directories listed so far.
    pub fn listed_directories(&self) -> usize {
        self.listings.lock().len()
    }

    /// Directory of `package`, or `None` when a segment is missing or is a
    /// symbolic link. Links are not followed, the same as the full walk.
    fn package_dir(&self, package: &str) -> Option<PathBuf> {
        let mut dir = self.root.clone();
        for segment in package.split('/').filter(|segment| !segment.is_empty()) {
            dir.push(segment);
            let metadata = fs::symlink_metadata(&dir).ok()?;
            if !metadata.is_dir() {
                return None;
            }
        }
        Some(dir)
    }

    fn listing(&self, package: &str) -> Arc<HashSet<String>> {
        if let Some(listing) = self.listings.lock().get(package) {
            return Arc::clone(listing);
        }
        let mut stems = HashSet::new();
        if let Some(entries) = self.package_dir(package).and_then(|dir| fs::read_dir(dir).ok()) {
            for entry in entries.flatten() {
                if !entry.file_type().is_ok_and(|t| t.is_file()) {
                    continue;
                }
                let file_name = entry.file_name();
                let Some(file_name) = file_name.to_str() else {
                    continue;
                };
                if let Some(stem) = file_name.strip_suffix(".class") {
                    stems.insert(stem.to_string());
                }
            }
        }
        trace!(package, classes = stems.len(), "listed package directory");
        let listing = Arc::new(stems);
        self.listings
            .lock()
            .insert(package.to_string(), Arc::clone(&listing));
        listing
    }

    fn walk(&self) -> IndexSet<ClassName> {
        let mut names = IndexSet::new();
        for entry in WalkDir::new(&self.root).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!(root = %self.root.display(), %err, "cannot list directory");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            let Some(relative) = relative.to_str() else {
                continue;
            };
            if let Some(name) = ClassName::from_entry_path(relative) {
                names.insert(name);
            }
        }
        debug!(root = %self.root.display(), classes = names.len(), "walked class directory");
        names
    }
}

impl Resolver for DirectoryResolver {
    fn find(&self, name: &ClassName) -> FindResult {
        if !self.contains(name) {
            return Ok(None);
        }
        if let Some(parsed) = self.cache.lock().get(name) {
            return parsed.map(Some);
        }
        let path = self.root.join(name.entry_path());
        let parsed = fs::read(&path)
            .map_err(|err| ClassReadError::Io(err.to_string()))
            .and_then(|bytes| define(name, &bytes));
        self.cache.lock().insert(name.clone(), parsed.clone());
        parsed.map(Some)
    }

    fn contains(&self, name: &ClassName) -> bool {
        if let Some(names) = self.names.get() {
            return names.contains(name);
        }
        if name.is_array() {
            return false;
        }
        self.listing(name.package()).contains(name.simple_name())
    }

    fn all_names(&self) -> &IndexSet<ClassName> {
        self.names.get_or_init(|| self.walk())
    }

    fn locate(&self, name: &ClassName) -> Option<&dyn Resolver> {
        self.contains(name).then_some(self as &dyn Resolver)
    }

    /// Checks the root for any entry without walking the tree.
    fn is_empty(&self) -> bool {
        if let Some(names) = self.names.get() {
            return names.is_empty();
        }
        fs::read_dir(&self.root).map_or(true, |mut entries| entries.next().is_none())
    }

    fn close(&self) {
        self.cache.lock().clear();
    }

    fn moniker(&self) -> &str {
        &self.moniker
    }
}

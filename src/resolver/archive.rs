use std::{
    fs::{self, File},
    io::{Cursor, Read, Seek},
    path::{Path, PathBuf},
    sync::Arc,
};

use indexmap::IndexSet;
use parking_lot::Mutex;
use tracing::{debug, trace};
use zip::{ZipArchive, result::ZipError};

use crate::{
    definition::ClassDefinition,
    error::{ClassReadError, ResolverError},
    name::ClassName,
    resolver::{BoundedCache, CacheStats, FindResult, Resolver},
};

pub(crate) const PLUGIN_DESCRIPTOR: &str = "META-INF/plugin.xml";

type Parsed = Result<Arc<ClassDefinition>, ClassReadError>;

/// Classes of one archive (or of one in-memory entry set).
///
/// An eager resolver parses every entry at construction. A lazy one only
/// indexes entry names and parses on first `find`, keeping parses in a
/// bounded cache; an evicted class is parsed again on the next lookup.
#[derive(Debug)]
pub struct ArchiveResolver {
    moniker: String,
    names: IndexSet<ClassName>,
    has_plugin_descriptor: bool,
    storage: Storage,
}

#[derive(Debug)]
enum Storage {
    // aligned with `names`
    Eager(Vec<Parsed>),
    Lazy {
        path: PathBuf,
        // aligned with `names`
        entries: Vec<String>,
        archive: Mutex<Option<ZipArchive<File>>>,
        cache: Mutex<BoundedCache<ClassName, Parsed>>,
    },
}

pub(crate) fn define(name: &ClassName, bytes: &[u8]) -> Parsed {
    let definition = ClassDefinition::parse(bytes)?;
    if definition.name() != name {
        return Err(ClassReadError::NameMismatch {
            expected: name.clone(),
            found: definition.name().clone(),
        });
    }
    Ok(Arc::new(definition))
}

fn read_entry<R: Read + Seek>(archive: &mut ZipArchive<R>, index: usize) -> Result<(String, Vec<u8>), ZipError> {
    let mut file = archive.by_index(index)?;
    let mut bytes = Vec::with_capacity(file.size() as usize);
    file.read_to_end(&mut bytes)?;
    Ok((file.name().to_string(), bytes))
}

impl ArchiveResolver {
    /// Eager resolver over `(entry path, bytes)` pairs; non-class entries are ignored.
    pub fn in_memory(
        moniker: impl Into<String>,
        entries: impl IntoIterator<Item = (String, Vec<u8>)>,
    ) -> Self {
        let moniker = moniker.into();
        let mut names = IndexSet::new();
        let mut parsed = Vec::new();
        let mut has_plugin_descriptor = false;
        for (path, bytes) in entries {
            if path.trim_start_matches('/') == PLUGIN_DESCRIPTOR {
                has_plugin_descriptor = true;
            }
            let Some(name) = ClassName::from_entry_path(&path) else {
                continue;
            };
            let result = define(&name, &bytes);
            if let Err(err) = &result {
                debug!(%moniker, class = %name, %err, "unreadable class entry");
            }
            if names.insert(name) {
                parsed.push(result);
            }
        }
        debug!(%moniker, classes = names.len(), "indexed in-memory archive");
        ArchiveResolver {
            moniker,
            names,
            has_plugin_descriptor,
            storage: Storage::Eager(parsed),
        }
    }

    /// Eager resolver over the archive held in `bytes`, e.g. a jar nested in a plugin zip.
    pub fn from_zip_bytes(moniker: impl Into<String>, bytes: Vec<u8>) -> Result<Self, ResolverError> {
        let moniker = moniker.into();
        let zip_error = |source| ResolverError::Zip {
            moniker: moniker.clone(),
            source,
        };
        let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(zip_error)?;
        let mut entries = Vec::with_capacity(archive.len());
        for index in 0..archive.len() {
            let (path, bytes) = read_entry(&mut archive, index).map_err(zip_error)?;
            if !path.ends_with('/') {
                entries.push((path, bytes));
            }
        }
        Ok(Self::in_memory(moniker, entries))
    }

    pub fn open_eager(path: impl AsRef<Path>) -> Result<Self, ResolverError> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|source| ResolverError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_zip_bytes(path.display().to_string(), bytes)
    }

    /// Indexes the archive's entry names; the handle is opened again on first `find`.
    pub fn open_lazy(path: impl AsRef<Path>, cache_capacity: usize) -> Result<Self, ResolverError> {
        let path = path.as_ref();
        let moniker = path.display().to_string();
        let file = File::open(path).map_err(|source| ResolverError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let archive = ZipArchive::new(file).map_err(|source| ResolverError::Zip {
            moniker: moniker.clone(),
            source,
        })?;

        let mut names = IndexSet::new();
        let mut entries = Vec::new();
        let mut has_plugin_descriptor = false;
        for path in archive.file_names() {
            if path.trim_start_matches('/') == PLUGIN_DESCRIPTOR {
                has_plugin_descriptor = true;
            }
            if let Some(name) = ClassName::from_entry_path(path) {
                if names.insert(name) {
                    entries.push(path.to_string());
                }
            }
        }
        debug!(%moniker, classes = names.len(), "indexed archive");

        Ok(ArchiveResolver {
            moniker,
            names,
            has_plugin_descriptor,
            storage: Storage::Lazy {
                path: path.to_path_buf(),
                entries,
                archive: Mutex::new(None),
                cache: Mutex::new(BoundedCache::with_capacity(cache_capacity)),
            },
        })
    }

    /// Whether the archive carries a plugin descriptor next to its classes.
    pub fn has_plugin_descriptor(&self) -> bool {
        self.has_plugin_descriptor
    }

    pub fn is_lazy(&self) -> bool {
        matches!(self.storage, Storage::Lazy { .. })
    }

    /// Parse cache statistics; `None` for eager resolvers.
    pub fn cache_stats(&self) -> Option<CacheStats> {
        match &self.storage {
            Storage::Eager(_) => None,
            Storage::Lazy { cache, .. } => Some(cache.lock().stats()),
        }
    }

    fn read_lazy(
        &self,
        path: &Path,
        entry: &str,
        archive: &Mutex<Option<ZipArchive<File>>>,
    ) -> Result<Vec<u8>, ClassReadError> {
        let mut archive = archive.lock();
        if archive.is_none() {
            debug!(moniker = %self.moniker, "opening archive");
            let file = File::open(path).map_err(|err| ClassReadError::Io(err.to_string()))?;
            let opened = ZipArchive::new(file).map_err(|err| ClassReadError::Io(err.to_string()))?;
            *archive = Some(opened);
        }
        let Some(archive) = archive.as_mut() else {
            return Err(ClassReadError::Io(format!("{} is closed", self.moniker)));
        };
        let mut file = archive
            .by_name(entry)
            .map_err(|err| ClassReadError::Io(err.to_string()))?;
        let mut bytes = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut bytes)
            .map_err(|err| ClassReadError::Io(err.to_string()))?;
        Ok(bytes)
    }
}

impl Resolver for ArchiveResolver {
    fn find(&self, name: &ClassName) -> FindResult {
        let Some(index) = self.names.get_index_of(name) else {
            return Ok(None);
        };
        match &self.storage {
            Storage::Eager(parsed) => parsed[index].clone().map(Some),
            Storage::Lazy {
                path,
                entries,
                archive,
                cache,
            } => {
                if let Some(parsed) = cache.lock().get(name) {
                    return parsed.map(Some);
                }
                trace!(moniker = %self.moniker, class = %name, "parsing class");
                let parsed = self
                    .read_lazy(path, &entries[index], archive)
                    .and_then(|bytes| define(name, &bytes));
                cache.lock().insert(name.clone(), parsed.clone());
                parsed.map(Some)
            }
        }
    }

    fn all_names(&self) -> &IndexSet<ClassName> {
        &self.names
    }

    fn locate(&self, name: &ClassName) -> Option<&dyn Resolver> {
        self.names.contains(name).then_some(self as &dyn Resolver)
    }

    fn close(&self) {
        if let Storage::Lazy { archive, .. } = &self.storage {
            if archive.lock().take().is_some() {
                debug!(moniker = %self.moniker, "closed archive");
            }
        }
    }

    fn moniker(&self) -> &str {
        &self.moniker
    }
}

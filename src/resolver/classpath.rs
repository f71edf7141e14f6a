//! Builds resolvers from plugin and classpath locations on disk.
//!
//! A plugin comes in one of three layouts:
//! - a directory with `lib/*.jar` and optionally `classes/`,
//! - a `.zip` whose single top-level directory has that same shape,
//! - a bare `.jar`.
//!
//! Jars carrying `META-INF/plugin.xml` hold the plugin's own classes, the
//! other jars are bundled libraries. When no jar carries a descriptor every
//! jar counts as plugin code.

use std::{
    fs::{self, File},
    io::Read,
    path::{Path, PathBuf},
    sync::Arc,
};

use tracing::debug;
use zip::ZipArchive;

use crate::{
    error::ResolverError,
    resolver::{ArchiveResolver, DirectoryResolver, EmptyResolver, Resolver, UnionResolver},
};

/// The two resolvers a plugin contributes.
#[derive(Debug, Clone)]
pub struct PluginClasspath {
    pub classes: Arc<dyn Resolver>,
    pub libraries: Arc<dyn Resolver>,
}

impl PluginClasspath {
    pub fn empty() -> Self {
        PluginClasspath {
            classes: Arc::new(EmptyResolver),
            libraries: Arc::new(EmptyResolver),
        }
    }
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(extension))
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> ResolverError + '_ {
    move |source| ResolverError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn jars_in(dir: &Path) -> Result<Vec<PathBuf>, ResolverError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut jars = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_error(dir))? {
        let path = entry.map_err(io_error(dir))?.path();
        if path.is_file() && has_extension(&path, "jar") {
            jars.push(path);
        }
    }
    jars.sort();
    Ok(jars)
}

fn split_by_descriptor(
    archives: Vec<ArchiveResolver>,
    extra_classes: Option<Arc<dyn Resolver>>,
) -> PluginClasspath {
    let any_descriptor = archives.iter().any(ArchiveResolver::has_plugin_descriptor);
    let mut classes: Vec<Arc<dyn Resolver>> = extra_classes.into_iter().collect();
    let mut libraries: Vec<Arc<dyn Resolver>> = Vec::new();
    for archive in archives {
        if !any_descriptor || archive.has_plugin_descriptor() {
            classes.push(Arc::new(archive));
        } else {
            libraries.push(Arc::new(archive));
        }
    }
    PluginClasspath {
        classes: UnionResolver::of(classes),
        libraries: UnionResolver::of(libraries),
    }
}

/// Resolvers for the plugin at `path`.
pub fn plugin_classpath(
    path: impl AsRef<Path>,
    cache_capacity: usize,
) -> Result<PluginClasspath, ResolverError> {
    let path = path.as_ref();
    if path.is_dir() {
        plugin_directory(path, cache_capacity)
    } else if has_extension(path, "zip") {
        plugin_zip(path)
    } else if has_extension(path, "jar") {
        Ok(PluginClasspath {
            classes: Arc::new(ArchiveResolver::open_lazy(path, cache_capacity)?),
            libraries: Arc::new(EmptyResolver),
        })
    } else {
        Err(ResolverError::UnsupportedLayout(path.to_path_buf()))
    }
}

fn plugin_directory(dir: &Path, cache_capacity: usize) -> Result<PluginClasspath, ResolverError> {
    let classes_dir = dir.join("classes");
    let classes = if classes_dir.is_dir() {
        Some(Arc::new(DirectoryResolver::new(classes_dir, cache_capacity)?) as Arc<dyn Resolver>)
    } else {
        None
    };
    let jars = jars_in(&dir.join("lib"))?;
    if jars.is_empty() && classes.is_none() {
        return Err(ResolverError::UnsupportedLayout(dir.to_path_buf()));
    }
    let archives = jars
        .iter()
        .map(|jar| ArchiveResolver::open_lazy(jar, cache_capacity))
        .collect::<Result<Vec<_>, _>>()?;
    debug!(plugin = %dir.display(), jars = archives.len(), "plugin directory");
    Ok(split_by_descriptor(archives, classes))
}

/// Path of `entry` relative to `marker/`, when the entry sits at most one
/// directory below the archive root.
fn below<'a>(entry: &'a str, marker: &str) -> Option<&'a str> {
    let prefix = format!("{marker}/");
    if let Some(rest) = entry.strip_prefix(&prefix) {
        return Some(rest);
    }
    let (_, rest) = entry.split_once('/')?;
    rest.strip_prefix(&prefix)
}

fn plugin_zip(path: &Path) -> Result<PluginClasspath, ResolverError> {
    let moniker = path.display().to_string();
    let zip_error = |source| ResolverError::Zip {
        moniker: moniker.clone(),
        source,
    };
    let file = File::open(path).map_err(io_error(path))?;
    let mut archive = ZipArchive::new(file).map_err(zip_error)?;

    let mut nested = Vec::new();
    let mut class_entries = Vec::new();
    for index in 0..archive.len() {
        let mut file = archive.by_index(index).map_err(zip_error)?;
        let name = file.name().to_string();
        let jar = below(&name, "lib").filter(|rest| !rest.contains('/') && rest.ends_with(".jar"));
        let class = below(&name, "classes").filter(|rest| rest.ends_with(".class"));
        if jar.is_none() && class.is_none() {
            continue;
        }
        let mut bytes = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut bytes).map_err(io_error(path))?;
        match (jar, class) {
            (Some(_), _) => nested.push((format!("{moniker}!/{name}"), bytes)),
            (_, Some(rest)) => class_entries.push((rest.to_string(), bytes)),
            _ => {}
        }
    }
    if nested.is_empty() && class_entries.is_empty() {
        return Err(ResolverError::UnsupportedLayout(path.to_path_buf()));
    }
    nested.sort_by(|a, b| a.0.cmp(&b.0));

    let archives = nested
        .into_iter()
        .map(|(moniker, bytes)| ArchiveResolver::from_zip_bytes(moniker, bytes))
        .collect::<Result<Vec<_>, _>>()?;
    let classes = (!class_entries.is_empty()).then(|| {
        Arc::new(ArchiveResolver::in_memory(
            format!("{moniker}!/classes"),
            class_entries,
        )) as Arc<dyn Resolver>
    });
    debug!(plugin = %moniker, jars = archives.len(), "plugin zip");
    Ok(split_by_descriptor(archives, classes))
}

/// Resolver for a platform or external classpath entry: a jar, a directory of
/// classes, or an installation directory with `lib/*.jar`.
pub fn classpath_entry(
    path: impl AsRef<Path>,
    cache_capacity: usize,
) -> Result<Arc<dyn Resolver>, ResolverError> {
    let path = path.as_ref();
    if path.is_file() && (has_extension(path, "jar") || has_extension(path, "zip")) {
        return Ok(Arc::new(ArchiveResolver::open_lazy(path, cache_capacity)?));
    }
    if !path.is_dir() {
        return Err(ResolverError::UnsupportedLayout(path.to_path_buf()));
    }
    let jars = jars_in(&path.join("lib"))?;
    if jars.is_empty() {
        return Ok(Arc::new(DirectoryResolver::new(path, cache_capacity)?));
    }
    let archives = jars
        .iter()
        .map(|jar| {
            ArchiveResolver::open_lazy(jar, cache_capacity).map(|a| Arc::new(a) as Arc<dyn Resolver>)
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(UnionResolver::of(archives))
}

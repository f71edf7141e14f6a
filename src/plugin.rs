//! Plugin and platform descriptions consumed by the closure and the verifier.
//!
//! These are produced by manifest parsing and platform discovery, which live
//! outside this crate.

use std::{
    collections::HashMap,
    fmt::{self, Display},
    sync::Arc,
};

use crate::resolver::{EmptyResolver, Resolver, classpath::PluginClasspath};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PluginKey {
    pub id: String,
    pub version: String,
}

impl Display for PluginKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.id, self.version)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PluginDependency {
    pub id: String,
    pub optional: bool,
}

#[derive(Debug, Clone)]
pub struct PluginView {
    id: String,
    version: String,
    dependencies: Vec<PluginDependency>,
    module_dependencies: Vec<String>,
    modules: Vec<String>,
    classes: Arc<dyn Resolver>,
    libraries: Arc<dyn Resolver>,
}

impl PluginView {
    pub fn new(id: impl Into<String>, version: impl Into<String>) -> Self {
        PluginView {
            id: id.into(),
            version: version.into(),
            dependencies: Vec::new(),
            module_dependencies: Vec::new(),
            modules: Vec::new(),
            classes: Arc::new(EmptyResolver),
            libraries: Arc::new(EmptyResolver),
        }
    }

    pub fn with_classes(mut self, classes: Arc<dyn Resolver>) -> Self {
        self.classes = classes;
        self
    }

    pub fn with_libraries(mut self, libraries: Arc<dyn Resolver>) -> Self {
        self.libraries = libraries;
        self
    }

    pub fn with_classpath(self, classpath: PluginClasspath) -> Self {
        self.with_classes(classpath.classes)
            .with_libraries(classpath.libraries)
    }

    pub fn depends_on(mut self, id: impl Into<String>) -> Self {
        self.dependencies.push(PluginDependency {
            id: id.into(),
            optional: false,
        });
        self
    }

    pub fn optionally_depends_on(mut self, id: impl Into<String>) -> Self {
        self.dependencies.push(PluginDependency {
            id: id.into(),
            optional: true,
        });
        self
    }

    pub fn depends_on_module(mut self, module: impl Into<String>) -> Self {
        self.module_dependencies.push(module.into());
        self
    }

    pub fn provides_module(mut self, module: impl Into<String>) -> Self {
        self.modules.push(module.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn key(&self) -> PluginKey {
        PluginKey {
            id: self.id.clone(),
            version: self.version.clone(),
        }
    }

    pub fn dependencies(&self) -> &[PluginDependency] {
        &self.dependencies
    }

    pub fn module_dependencies(&self) -> &[String] {
        &self.module_dependencies
    }

    pub fn modules(&self) -> &[String] {
        &self.modules
    }

    pub fn classes(&self) -> &Arc<dyn Resolver> {
        &self.classes
    }

    pub fn libraries(&self) -> &Arc<dyn Resolver> {
        &self.libraries
    }
}

/// The host a plugin is verified against: its own classes plus the plugins
/// bundled with it.
#[derive(Debug, Clone)]
pub struct PlatformView {
    version: String,
    classes: Arc<dyn Resolver>,
    plugins: Vec<Arc<PluginView>>,
    by_id: HashMap<String, usize>,
    by_module: HashMap<String, usize>,
}

impl PlatformView {
    pub fn new(version: impl Into<String>, classes: Arc<dyn Resolver>) -> Self {
        PlatformView {
            version: version.into(),
            classes,
            plugins: Vec::new(),
            by_id: HashMap::new(),
            by_module: HashMap::new(),
        }
    }

    /// Registers a bundled plugin. The first plugin declaring an id or module keeps it.
    pub fn with_plugin(mut self, plugin: Arc<PluginView>) -> Self {
        let index = self.plugins.len();
        self.by_id.entry(plugin.id().to_string()).or_insert(index);
        for module in plugin.modules() {
            self.by_module.entry(module.clone()).or_insert(index);
        }
        self.plugins.push(plugin);
        self
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn classes(&self) -> &Arc<dyn Resolver> {
        &self.classes
    }

    pub fn plugins(&self) -> &[Arc<PluginView>] {
        &self.plugins
    }

    pub fn plugin_by_id(&self, id: &str) -> Option<Arc<PluginView>> {
        self.by_id.get(id).map(|i| Arc::clone(&self.plugins[*i]))
    }

    pub fn plugin_by_module(&self, module: &str) -> Option<Arc<PluginView>> {
        self.by_module
            .get(module)
            .map(|i| Arc::clone(&self.plugins[*i]))
    }
}

/// Source of plugins that are not bundled with the platform, such as a
/// marketplace client.
pub trait ExternalPluginProvider: Send + Sync {
    fn find(&self, platform_version: &str, plugin_id: &str) -> Option<Arc<PluginView>>;
}

impl<F> ExternalPluginProvider for F
where
    F: Fn(&str, &str) -> Option<Arc<PluginView>> + Send + Sync,
{
    fn find(&self, platform_version: &str, plugin_id: &str) -> Option<Arc<PluginView>> {
        self(platform_version, plugin_id)
    }
}

/// Provider that knows no plugins.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoExternalPlugins;

impl ExternalPluginProvider for NoExternalPlugins {
    fn find(&self, _platform_version: &str, _plugin_id: &str) -> Option<Arc<PluginView>> {
        None
    }
}

/// Fixed set of external plugins, keyed by id regardless of platform version.
#[derive(Debug, Default, Clone)]
pub struct StaticPluginProvider {
    plugins: HashMap<String, Arc<PluginView>>,
}

impl StaticPluginProvider {
    pub fn new(plugins: impl IntoIterator<Item = Arc<PluginView>>) -> Self {
        StaticPluginProvider {
            plugins: plugins
                .into_iter()
                .map(|p| (p.id().to_string(), p))
                .collect(),
        }
    }
}

impl ExternalPluginProvider for StaticPluginProvider {
    fn find(&self, _platform_version: &str, plugin_id: &str) -> Option<Arc<PluginView>> {
        self.plugins.get(plugin_id).cloned()
    }
}

//! Transitive plugin dependencies and the classpath they contribute.

use std::{collections::HashMap, sync::Arc};

use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::{
    error::ClosureError,
    options::CyclePolicy,
    plugin::{ExternalPluginProvider, PlatformView, PluginDependency, PluginKey, PluginView},
    resolver::{Resolver, UnionResolver},
};

#[derive(Debug, Clone)]
enum Transitive {
    Absent,
    InProgress,
    Done(Vec<Arc<PluginView>>),
}

#[derive(Debug)]
struct Descriptor {
    transitive: Transitive,
    cyclic: bool,
    missing: Vec<PluginDependency>,
    resolver: Option<Arc<dyn Resolver>>,
}

impl Default for Descriptor {
    fn default() -> Self {
        Descriptor {
            transitive: Transitive::Absent,
            cyclic: false,
            missing: Vec::new(),
            resolver: None,
        }
    }
}

/// Dependency closure of one plugin on one platform.
#[derive(Debug, Clone)]
pub struct DependencyClosure {
    /// Transitive dependencies in discovery order, each once.
    pub dependencies: Vec<Arc<PluginView>>,
    /// Non-optional dependencies of the plugin itself that could not be found.
    pub missing: Vec<PluginDependency>,
    pub cyclic: bool,
    /// Plugin classes, platform classes, then classes and libraries of every dependency.
    pub resolver: Arc<dyn Resolver>,
}

/// Computes and memoizes dependency closures for one platform.
pub struct DependencyClosureResolver {
    platform: Arc<PlatformView>,
    provider: Arc<dyn ExternalPluginProvider>,
    policy: CyclePolicy,
    descriptors: HashMap<PluginKey, Descriptor>,
    visits: usize,
}

impl DependencyClosureResolver {
    pub fn new(
        platform: Arc<PlatformView>,
        provider: Arc<dyn ExternalPluginProvider>,
        policy: CyclePolicy,
    ) -> Self {
        DependencyClosureResolver {
            platform,
            provider,
            policy,
            descriptors: HashMap::new(),
            visits: 0,
        }
    }

    pub fn platform(&self) -> &Arc<PlatformView> {
        &self.platform
    }

    /// Number of times a plugin's dependencies were expanded.
    pub fn visits(&self) -> usize {
        self.visits
    }

    pub fn is_cyclic(&self, plugin: &PluginKey) -> bool {
        self.descriptors.get(plugin).is_some_and(|d| d.cyclic)
    }

    /// Missing non-optional dependencies recorded the last time `plugin` was expanded.
    pub fn missing_dependencies(&self, plugin: &PluginKey) -> &[PluginDependency] {
        self.descriptors
            .get(plugin)
            .map(|d| d.missing.as_slice())
            .unwrap_or_default()
    }

    pub fn transitive_dependencies(
        &mut self,
        plugin: &Arc<PluginView>,
    ) -> Result<Vec<Arc<PluginView>>, ClosureError> {
        let key = plugin.key();
        let mut stack = Vec::new();
        let result = self.compute(plugin, &mut stack);
        match result {
            Ok(dependencies) => {
                // a root whose branch was degraded is still complete for itself
                let descriptor = self.descriptors.entry(key).or_default();
                if !matches!(descriptor.transitive, Transitive::Done(_)) {
                    descriptor.transitive = Transitive::Done(dependencies.clone());
                }
                Ok(dependencies)
            }
            Err(err) => {
                for descriptor in self.descriptors.values_mut() {
                    if matches!(descriptor.transitive, Transitive::InProgress) {
                        descriptor.transitive = Transitive::Absent;
                    }
                }
                Err(err)
            }
        }
    }

    pub fn resolve(&mut self, plugin: &Arc<PluginView>) -> Result<DependencyClosure, ClosureError> {
        let dependencies = self.transitive_dependencies(plugin)?;
        let key = plugin.key();
        let platform_classes = Arc::clone(self.platform.classes());
        let descriptor = self.descriptors.entry(key).or_default();
        let resolver = descriptor
            .resolver
            .get_or_insert_with(|| {
                let mut layers = vec![Arc::clone(plugin.classes()), platform_classes];
                for dependency in &dependencies {
                    layers.push(Arc::clone(dependency.classes()));
                    layers.push(Arc::clone(dependency.libraries()));
                }
                UnionResolver::of(layers)
            })
            .clone();
        Ok(DependencyClosure {
            dependencies,
            missing: descriptor.missing.clone(),
            cyclic: descriptor.cyclic,
            resolver,
        })
    }

    fn direct_dependencies(&self, plugin: &PluginView) -> (Vec<Arc<PluginView>>, Vec<PluginDependency>) {
        let mut found = Vec::new();
        let mut missing = Vec::new();
        for module in plugin.module_dependencies() {
            match self.platform.plugin_by_module(module) {
                Some(dependency) => found.push(dependency),
                None => missing.push(PluginDependency {
                    id: module.clone(),
                    optional: false,
                }),
            }
        }
        for dependency in plugin.dependencies() {
            let resolved = self
                .platform
                .plugin_by_id(&dependency.id)
                .or_else(|| self.provider.find(self.platform.version(), &dependency.id));
            match resolved {
                Some(resolved) => found.push(resolved),
                None if dependency.optional => {
                    debug!(plugin = %plugin.id(), dependency = %dependency.id, "optional dependency not found");
                }
                None => missing.push(dependency.clone()),
            }
        }
        (found, missing)
    }

    fn compute(
        &mut self,
        plugin: &Arc<PluginView>,
        stack: &mut Vec<PluginKey>,
    ) -> Result<Vec<Arc<PluginView>>, ClosureError> {
        let key = plugin.key();
        // the stack decides cycles; a degraded cycle resets descriptors of
        // plugins that are still being expanded
        if stack.contains(&key) {
            return self.on_cycle(&key, stack);
        }
        let state = self.descriptors.entry(key.clone()).or_default().transitive.clone();
        if let Transitive::Done(dependencies) = state {
            return Ok(dependencies);
        }

        self.visits += 1;
        if let Some(descriptor) = self.descriptors.get_mut(&key) {
            descriptor.transitive = Transitive::InProgress;
        }
        stack.push(key.clone());

        let (direct, missing) = self.direct_dependencies(plugin);
        let mut collected: IndexMap<PluginKey, Arc<PluginView>> = IndexMap::new();
        for dependency in direct {
            let dependency_key = dependency.key();
            if dependency_key == key || collected.contains_key(&dependency_key) {
                continue;
            }
            collected.insert(dependency_key, Arc::clone(&dependency));
            for transitive in self.compute(&dependency, stack)? {
                let transitive_key = transitive.key();
                if transitive_key != key {
                    collected.entry(transitive_key).or_insert(transitive);
                }
            }
        }
        stack.pop();

        let dependencies: Vec<_> = collected.into_values().collect();
        let descriptor = self.descriptors.entry(key).or_default();
        descriptor.missing = missing;
        // reset to Absent by a degraded cycle: the set is partial, do not keep it
        if matches!(descriptor.transitive, Transitive::InProgress) {
            descriptor.transitive = Transitive::Done(dependencies.clone());
        }
        Ok(dependencies)
    }

    fn on_cycle(
        &mut self,
        key: &PluginKey,
        stack: &[PluginKey],
    ) -> Result<Vec<Arc<PluginView>>, ClosureError> {
        let start = stack.iter().position(|k| k == key).unwrap_or(0);
        let cycle: Vec<String> = stack[start..]
            .iter()
            .chain(std::iter::once(key))
            .map(|k| k.id.clone())
            .collect();
        match self.policy {
            CyclePolicy::FailFast => Err(ClosureError::CyclicDependency { cycle }),
            CyclePolicy::Degrade => {
                warn!(cycle = %cycle.join(" -> "), "cyclic plugin dependency");
                for member in &stack[start..] {
                    let descriptor = self.descriptors.entry(member.clone()).or_default();
                    descriptor.cyclic = true;
                    descriptor.transitive = Transitive::Absent;
                }
                Ok(Vec::new())
            }
        }
    }
}

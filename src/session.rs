//! One verification run: the closure caches it owns and the pairs it checks.

use std::{
    collections::HashMap,
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use parking_lot::Mutex;
use tracing::{debug, info, info_span, warn};

use crate::{
    closure::{DependencyClosure, DependencyClosureResolver},
    error::{ClosureError, VerificationError},
    options::VerifierOptions,
    plugin::{ExternalPluginProvider, NoExternalPlugins, PlatformView, PluginView},
    problem::{Problem, ProblemLocation, ProblemSet},
    resolver::{CachingResolver, CloseGuard, EmptyResolver, Resolver, UnionResolver, classpath},
    verifier,
};

/// What a plugin is checked against: a platform plus the JDK and any extra
/// classpath the caller supplies.
#[derive(Debug, Clone)]
pub struct VerificationTarget {
    pub platform: Arc<PlatformView>,
    pub runtime: Arc<dyn Resolver>,
    pub external: Arc<dyn Resolver>,
}

impl VerificationTarget {
    pub fn new(platform: Arc<PlatformView>, runtime: Arc<dyn Resolver>) -> Self {
        VerificationTarget {
            platform,
            runtime,
            external: Arc::new(EmptyResolver),
        }
    }

    pub fn with_external(mut self, external: Arc<dyn Resolver>) -> Self {
        self.external = external;
        self
    }
}

/// Cooperative stop signal, checked between verification pairs.
#[derive(Debug, Clone, Default)]
pub struct Cancellation(Arc<AtomicBool>);

impl Cancellation {
    pub fn new() -> Self {
        Cancellation::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Owns every cache of a verification run. Nothing is shared between sessions.
pub struct VerificationSession {
    options: VerifierOptions,
    provider: Arc<dyn ExternalPluginProvider>,
    // keyed by platform version
    closures: Mutex<HashMap<String, DependencyClosureResolver>>,
}

impl VerificationSession {
    pub fn new(options: VerifierOptions) -> Self {
        VerificationSession {
            options,
            provider: Arc::new(NoExternalPlugins),
            closures: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn ExternalPluginProvider>) -> Self {
        self.provider = provider;
        self
    }

    pub fn options(&self) -> &VerifierOptions {
        &self.options
    }

    /// Builds a plugin view from a plugin directory, zip or jar.
    pub fn load_plugin(
        &self,
        id: &str,
        version: &str,
        path: impl AsRef<Path>,
    ) -> Result<PluginView, VerificationError> {
        let classpath = classpath::plugin_classpath(path, self.options.parsed_class_cache_capacity)
            .map_err(|err| VerificationError::UnreadablePlugin {
                plugin: id.to_string(),
                reason: err.to_string(),
            })?;
        Ok(PluginView::new(id, version).with_classpath(classpath))
    }

    fn closure(
        &self,
        plugin: &Arc<PluginView>,
        platform: &Arc<PlatformView>,
    ) -> Result<DependencyClosure, ClosureError> {
        let mut closures = self.closures.lock();
        let version = platform.version();
        // another platform under the same version string invalidates the cache
        if closures
            .get(version)
            .is_some_and(|c| !Arc::ptr_eq(c.platform(), platform))
        {
            debug!(version, "replacing closure cache for platform");
            closures.remove(version);
        }
        closures
            .entry(version.to_string())
            .or_insert_with(|| {
                DependencyClosureResolver::new(
                    Arc::clone(platform),
                    Arc::clone(&self.provider),
                    self.options.cycle_policy,
                )
            })
            .resolve(plugin)
    }

    /// Verifies one (plugin, platform) pair.
    ///
    /// Only an unbuildable effective classpath is an error; everything found
    /// while checking classes ends up in the returned set.
    pub fn verify(
        &self,
        plugin: &Arc<PluginView>,
        target: &VerificationTarget,
    ) -> Result<ProblemSet, VerificationError> {
        let span = info_span!("verify", plugin = %plugin.key(), platform = %target.platform.version());
        let _entered = span.enter();

        let closure = self.closure(plugin, &target.platform)?;
        if closure.cyclic {
            warn!("dependency closure is incomplete because of a cycle");
        }
        debug!(dependencies = closure.dependencies.len(), "dependency closure resolved");

        let effective = UnionResolver::of([
            Arc::clone(plugin.classes()),
            Arc::clone(plugin.libraries()),
            Arc::clone(&closure.resolver),
            Arc::clone(target.platform.classes()),
            Arc::clone(&target.runtime),
            Arc::clone(&target.external),
        ]);
        let guard = CloseGuard::new(Arc::new(CachingResolver::new(effective)));

        let mut problems =
            verifier::verify_plugin_classes(plugin.classes().as_ref(), guard.resolver().as_ref(), &self.options);
        let location = ProblemLocation::plugin(plugin.id());
        for dependency in &closure.missing {
            problems.add(
                Problem::MissingDependency {
                    dependency: dependency.id.clone(),
                },
                location.clone(),
            );
        }
        info!(problems = problems.len(), "verification finished");
        Ok(problems)
    }

    /// Like [`verify`](Self::verify), recording a fatal condition as a single
    /// plugin-level problem.
    pub fn verify_or_report(&self, plugin: &Arc<PluginView>, target: &VerificationTarget) -> ProblemSet {
        match self.verify(plugin, target) {
            Ok(problems) => problems,
            Err(err) => {
                warn!(plugin = %plugin.key(), %err, "verification aborted");
                let mut problems = ProblemSet::new();
                if let Some(problem) = fatal_problem(err) {
                    problems.add(problem, ProblemLocation::plugin(plugin.id()));
                }
                problems
            }
        }
    }

    /// Verifies `plugin` against every target and merges the results.
    ///
    /// A pair that finishes after cancellation is discarded.
    pub fn verify_all(
        &self,
        plugin: &Arc<PluginView>,
        targets: &[VerificationTarget],
        cancellation: &Cancellation,
    ) -> Result<ProblemSet, VerificationError> {
        let mut merged = ProblemSet::new();
        for target in targets {
            if cancellation.is_cancelled() {
                return Err(VerificationError::Cancelled);
            }
            let problems = self.verify_or_report(plugin, target);
            if cancellation.is_cancelled() {
                return Err(VerificationError::Cancelled);
            }
            merged.merge(problems);
        }
        Ok(merged)
    }
}

/// Plugin-level problem for a fatal error; cancellation is not a problem.
pub fn fatal_problem(err: VerificationError) -> Option<Problem> {
    match err {
        VerificationError::Closure(ClosureError::CyclicDependency { cycle }) => {
            Some(Problem::CyclicDependency { cycle })
        }
        VerificationError::UnreadablePlugin { reason, .. } => {
            Some(Problem::UnreadablePluginClasses { reason })
        }
        VerificationError::Cancelled => None,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::{
        definition::Invocation,
        name::ClassName,
        options::CyclePolicy,
        problem::MemberRef,
        test_support::{ClassBuilder, Insn, PUBLIC, classes, runtime_library},
    };

    fn caller() -> ClassBuilder {
        ClassBuilder::new("p/Main").super_class("d/Api").method(
            PUBLIC,
            "run",
            "()V",
            vec![Insn::InvokeVirtual("d/Api".into(), "go".into(), "()V".into())],
        )
    }

    fn dependency(with_go: bool) -> Arc<PluginView> {
        let mut api = ClassBuilder::new("d/Api");
        if with_go {
            api = api.method(PUBLIC, "go", "()V", vec![]);
        }
        Arc::new(PluginView::new("dep", "1.0").with_classes(classes("dep", vec![api])))
    }

    fn platform(version: &str, with_go: bool) -> Arc<PlatformView> {
        Arc::new(
            PlatformView::new(version, classes("platform", vec![])).with_plugin(dependency(with_go)),
        )
    }

    fn plugin() -> Arc<PluginView> {
        Arc::new(
            PluginView::new("main", "2.0")
                .with_classes(classes("main", vec![caller()]))
                .depends_on("dep")
                .depends_on("absent"),
        )
    }

    fn go_missing() -> Problem {
        Problem::MethodNotFound {
            method: MemberRef::new(ClassName::new("d/Api"), "go", "()V"),
            invocation: Invocation::Virtual,
        }
    }

    #[test]
    fn test_verify_through_dependency_closure() {
        let session = VerificationSession::new(VerifierOptions::default());
        let target = VerificationTarget::new(platform("241", false), runtime_library());
        let problems = session.verify(&plugin(), &target).unwrap();

        assert_eq!(problems.len(), 2);
        assert!(problems.contains(&go_missing()));
        let missing = Problem::MissingDependency {
            dependency: "absent".to_string(),
        };
        assert_eq!(
            problems.locations(&missing).unwrap().first(),
            Some(&ProblemLocation::plugin("main"))
        );
    }

    #[test]
    fn test_fail_fast_cycle_becomes_plugin_problem() {
        let a = Arc::new(PluginView::new("a", "1").depends_on("b"));
        let b = Arc::new(PluginView::new("b", "1").depends_on("a"));
        let platform = Arc::new(
            PlatformView::new("241", classes("platform", vec![]))
                .with_plugin(Arc::clone(&a))
                .with_plugin(b),
        );
        let session = VerificationSession::new(VerifierOptions {
            cycle_policy: CyclePolicy::FailFast,
            ..Default::default()
        });
        let target = VerificationTarget::new(platform, runtime_library());

        assert!(matches!(
            session.verify(&a, &target),
            Err(VerificationError::Closure(_))
        ));
        let problems = session.verify_or_report(&a, &target);
        assert_eq!(problems.len(), 1);
        assert!(problems.contains(&Problem::CyclicDependency {
            cycle: vec!["a".to_string(), "b".to_string(), "a".to_string()],
        }));
    }

    #[test]
    fn test_closure_is_cached_per_platform() {
        let lookups = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&lookups);
        let provider = move |_: &str, _: &str| -> Option<Arc<PluginView>> {
            counter.fetch_add(1, Ordering::Relaxed);
            None
        };
        let session = VerificationSession::new(VerifierOptions::default()).with_provider(Arc::new(provider));
        let plugin = plugin();
        let first = VerificationTarget::new(platform("241", true), runtime_library());

        session.verify(&plugin, &first).unwrap();
        session.verify(&plugin, &first).unwrap();
        assert_eq!(lookups.load(Ordering::Relaxed), 1);

        let second = VerificationTarget::new(platform("242", true), runtime_library());
        session.verify(&plugin, &second).unwrap();
        assert_eq!(lookups.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_verify_all_merges_and_cancels() {
        let session = VerificationSession::new(VerifierOptions::default());
        let plugin = plugin();
        let targets = [
            VerificationTarget::new(platform("241", true), runtime_library()),
            VerificationTarget::new(platform("242", false), runtime_library()),
        ];

        let merged = session
            .verify_all(&plugin, &targets, &Cancellation::new())
            .unwrap();
        assert!(merged.contains(&go_missing()));
        assert_eq!(
            merged
                .locations(&Problem::MissingDependency {
                    dependency: "absent".to_string()
                })
                .map(|l| l.len()),
            Some(1)
        );

        let cancelled = Cancellation::new();
        cancelled.cancel();
        assert_eq!(
            session.verify_all(&plugin, &targets, &cancelled),
            Err(VerificationError::Cancelled)
        );
    }

    #[test]
    fn test_unreadable_plugin() {
        let session = VerificationSession::new(VerifierOptions::default());
        let dir = tempfile::tempdir().unwrap();
        let err = session
            .load_plugin("broken", "1", dir.path().join("missing.jar"))
            .unwrap_err();
        assert!(matches!(&err, VerificationError::UnreadablePlugin { plugin, .. } if plugin == "broken"));
        assert!(matches!(
            fatal_problem(err),
            Some(Problem::UnreadablePluginClasses { .. })
        ));
    }
}

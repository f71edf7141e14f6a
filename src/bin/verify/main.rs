use std::{path::PathBuf, process::ExitCode, sync::Arc};

use clap::{Parser, ValueEnum};
use plugin_verifier::{
    CyclePolicy, PlatformView, VerificationSession, VerificationTarget, VerifierOptions,
    resolver::{DEFAULT_PARSE_CACHE_CAPACITY, EmptyResolver, Resolver, UnionResolver, classpath},
    session::fatal_problem,
};
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum CycleArg {
    /// Abort on the first dependency cycle
    FailFast,
    /// Drop the back edge and mark cycle members as cyclic
    Degrade,
}

impl From<CycleArg> for CyclePolicy {
    fn from(arg: CycleArg) -> Self {
        match arg {
            CycleArg::FailFast => CyclePolicy::FailFast,
            CycleArg::Degrade => CyclePolicy::Degrade,
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "verify",
    about = "Check a plugin's bytecode against a platform classpath",
    version
)]
struct Args {
    /// Plugin archive or class directory
    plugin: PathBuf,

    /// Jars and class directories making up the platform
    classpath: Vec<PathBuf>,

    /// What to do when plugin dependencies form a cycle
    #[arg(long, value_enum, default_value = "degrade")]
    cycle_policy: CycleArg,

    /// Package whose missing classes are not reported (repeatable)
    #[arg(long = "ignore-package", value_name = "PACKAGE")]
    ignored_packages: Vec<String>,

    /// Also report classes named only by generic signatures
    #[arg(long)]
    check_generic_signatures: bool,

    /// Skip the check that concrete classes implement inherited abstract methods
    #[arg(long)]
    skip_method_implementation: bool,

    /// Parsed classes cached per archive or directory
    #[arg(long, default_value_t = DEFAULT_PARSE_CACHE_CAPACITY)]
    class_cache: usize,
}

impl Args {
    fn options(&self) -> VerifierOptions {
        VerifierOptions {
            cycle_policy: self.cycle_policy.into(),
            parsed_class_cache_capacity: self.class_cache,
            ignored_packages: self.ignored_packages.clone(),
            check_generic_signatures: self.check_generic_signatures,
            check_method_implementation: !self.skip_method_implementation,
        }
    }

    fn plugin_id(&self) -> String {
        self.plugin
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "plugin".to_string())
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let options = args.options();

    let mut entries: Vec<Arc<dyn Resolver>> = Vec::new();
    for path in &args.classpath {
        match classpath::classpath_entry(path, options.parsed_class_cache_capacity) {
            Ok(resolver) => entries.push(resolver),
            Err(err) => {
                error!(path = %path.display(), %err, "skipping classpath entry");
            }
        }
    }
    let platform = Arc::new(PlatformView::new("cli", UnionResolver::of(entries)));
    let target = VerificationTarget::new(platform, Arc::new(EmptyResolver));

    let id = args.plugin_id();
    let session = VerificationSession::new(options);
    let problems = match session.load_plugin(&id, "local", &args.plugin) {
        Ok(plugin) => session.verify_or_report(&Arc::new(plugin), &target),
        Err(err) => {
            if let Some(problem) = fatal_problem(err) {
                println!("{}", problem.description());
            }
            return ExitCode::FAILURE;
        }
    };

    info!(plugin = %id, problems = problems.len(), "done");
    for (problem, locations) in problems.iter() {
        println!("{}", problem.description());
        for location in locations {
            println!("    at {location}");
        }
    }
    if problems.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["verify", "plugin.jar"]).unwrap();
        assert!(args.classpath.is_empty());
        assert_eq!(args.plugin_id(), "plugin");
        assert_eq!(args.options(), VerifierOptions::default());
    }

    #[test]
    fn test_options_from_flags() {
        let args = Args::try_parse_from([
            "verify",
            "build/my-plugin.jar",
            "platform/lib/core.jar",
            "platform/classes",
            "--cycle-policy",
            "fail-fast",
            "--ignore-package",
            "com.optional",
            "--ignore-package",
            "org/extra",
            "--check-generic-signatures",
            "--skip-method-implementation",
        ])
        .unwrap();
        assert_eq!(
            args.classpath,
            vec![PathBuf::from("platform/lib/core.jar"), PathBuf::from("platform/classes")]
        );
        assert_eq!(args.plugin_id(), "my-plugin");

        let options = args.options();
        assert_eq!(options.cycle_policy, CyclePolicy::FailFast);
        assert_eq!(options.ignored_packages, vec!["com.optional", "org/extra"]);
        assert!(options.check_generic_signatures);
        assert!(!options.check_method_implementation);
        assert!(options.is_ignored("com/optional/Feature"));
    }

    #[test]
    fn test_rejects_unknown_policy() {
        assert!(Args::try_parse_from(["verify", "p.jar", "--cycle-policy", "ignore"]).is_err());
        assert!(Args::try_parse_from(["verify"]).is_err());
    }
}

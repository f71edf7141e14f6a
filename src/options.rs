use serde::{Deserialize, Serialize};

use crate::resolver::DEFAULT_PARSE_CACHE_CAPACITY;

/// What the dependency closure does when it meets a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CyclePolicy {
    /// Abort with the full cycle path.
    FailFast,
    /// Mark every plugin on the cycle as cyclic and continue without the back edge.
    #[default]
    Degrade,
}

/// Knobs of one verification session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct VerifierOptions {
    pub cycle_policy: CyclePolicy,
    /// Parsed classes kept per lazy archive or directory.
    pub parsed_class_cache_capacity: usize,
    /// Package prefixes (`com/example/` or `com.example.`) whose unresolved
    /// classes are not reported.
    pub ignored_packages: Vec<String>,
    /// Report unresolved classes named only by generic `Signature` attributes.
    pub check_generic_signatures: bool,
    pub check_method_implementation: bool,
}

impl Default for VerifierOptions {
    fn default() -> Self {
        VerifierOptions {
            cycle_policy: CyclePolicy::default(),
            parsed_class_cache_capacity: DEFAULT_PARSE_CACHE_CAPACITY,
            ignored_packages: Vec::new(),
            check_generic_signatures: false,
            check_method_implementation: true,
        }
    }
}

impl VerifierOptions {
    pub fn is_ignored(&self, class_name: &str) -> bool {
        self.ignored_packages.iter().any(|prefix| {
            let prefix = prefix.replace('.', "/");
            let prefix = prefix.trim_end_matches('/');
            !prefix.is_empty()
                && class_name
                    .strip_prefix(prefix)
                    .is_some_and(|rest| rest.starts_with('/'))
        })
    }
}

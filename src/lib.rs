//! Static link-time compatibility checks for JVM plugins.
//!
//! Plugin classes are resolved against a layered classpath made of the plugin
//! itself, its dependency closure, the target platform and the JDK. Every
//! symbolic reference that would fail to link is reported as a [`Problem`].

pub mod class;
pub mod closure;
pub mod consts;
pub mod definition;
pub mod descriptor;
pub mod error;
pub mod name;
pub mod options;
pub mod plugin;
pub mod problem;
pub mod resolver;
pub mod session;
pub mod verifier;

#[cfg(test)]
mod test_support;

pub use closure::{DependencyClosure, DependencyClosureResolver};
pub use definition::ClassDefinition;
pub use error::{ClassReadError, ClosureError, ResolverError, VerificationError};
pub use name::ClassName;
pub use options::{CyclePolicy, VerifierOptions};
pub use plugin::{ExternalPluginProvider, PlatformView, PluginView};
pub use problem::{Problem, ProblemLocation, ProblemSet};
pub use resolver::Resolver;
pub use session::{Cancellation, VerificationSession, VerificationTarget};

//! Layered class namespaces.
//!
//! Every class source (archive, directory, in-memory set) is a [`Resolver`];
//! composition happens by wrapping resolvers in [`UnionResolver`] and
//! [`CachingResolver`].

use std::{fmt::Debug, sync::Arc};

use indexmap::IndexSet;
use once_cell::sync::Lazy;

use crate::{definition::ClassDefinition, error::ClassReadError, name::ClassName};

mod archive;
mod cache;
mod caching;
pub mod classpath;
mod directory;
mod empty;
mod union;

pub use archive::ArchiveResolver;
pub use cache::{BoundedCache, CacheStats};
pub use caching::CachingResolver;
pub use directory::DirectoryResolver;
pub use empty::EmptyResolver;
pub use union::UnionResolver;

/// Capacity of the parse cache held by lazy archive and directory resolvers.
pub const DEFAULT_PARSE_CACHE_CAPACITY: usize = 1024;

/// `Ok(None)` means not found; a present but unreadable class is an error.
pub type FindResult = Result<Option<Arc<ClassDefinition>>, ClassReadError>;

pub trait Resolver: Debug + Send + Sync {
    /// May perform I/O and parsing. Never fails for an absent name.
    fn find(&self, name: &ClassName) -> FindResult;

    /// Presence only; never parses.
    fn contains(&self, name: &ClassName) -> bool {
        self.all_names().contains(name)
    }

    /// Every class name visible through this resolver, fixed at construction.
    fn all_names(&self) -> &IndexSet<ClassName>;

    /// The leaf resolver that owns `name`.
    fn locate(&self, name: &ClassName) -> Option<&dyn Resolver>;

    /// Releases container handles. Idempotent; a closed lazy resolver reopens
    /// its container on the next access.
    fn close(&self);

    fn moniker(&self) -> &str;

    fn is_empty(&self) -> bool {
        self.all_names().is_empty()
    }
}

pub(crate) static NO_NAMES: Lazy<IndexSet<ClassName>> = Lazy::new(IndexSet::new);

/// Identity of the resolver behind an `Arc`, ignoring vtable metadata.
pub fn same_resolver(a: &Arc<dyn Resolver>, b: &Arc<dyn Resolver>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// Closes the wrapped resolver when dropped, on success and error paths alike.
pub struct CloseGuard(Arc<dyn Resolver>);

impl CloseGuard {
    pub fn new(resolver: Arc<dyn Resolver>) -> Self {
        CloseGuard(resolver)
    }

    pub fn resolver(&self) -> &Arc<dyn Resolver> {
        &self.0
    }
}

impl Drop for CloseGuard {
    fn drop(&mut self) {
        self.0.close();
    }
}

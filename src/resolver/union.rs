use std::sync::Arc;

use indexmap::IndexSet;
use tracing::trace;

use crate::{
    name::ClassName,
    resolver::{EmptyResolver, FindResult, Resolver},
};

/// Ordered composition of resolvers where the first-declared child owning a
/// name shadows the others.
#[derive(Debug)]
pub struct UnionResolver {
    moniker: String,
    children: Vec<Arc<dyn Resolver>>,
    names: IndexSet<ClassName>,
    // owning child of `names[i]`
    owners: Vec<usize>,
}

impl UnionResolver {
    /// Composes `children`, dropping empty ones. No children gives an
    /// [`EmptyResolver`]; a single child is returned as is.
    ///
    /// Building the index reads `all_names` of every child, so a lazy
    /// [`DirectoryResolver`](crate::resolver::DirectoryResolver) is walked here.
    pub fn of(children: impl IntoIterator<Item = Arc<dyn Resolver>>) -> Arc<dyn Resolver> {
        let mut children: Vec<_> = children.into_iter().filter(|c| !c.is_empty()).collect();
        match children.len() {
            0 => Arc::new(EmptyResolver),
            1 => children.remove(0),
            _ => Arc::new(Self::build(children)),
        }
    }

    fn build(children: Vec<Arc<dyn Resolver>>) -> Self {
        let capacity = children.iter().map(|c| c.all_names().len()).sum();
        let mut names = IndexSet::with_capacity(capacity);
        let mut owners = Vec::with_capacity(capacity);
        for (index, child) in children.iter().enumerate() {
            for name in child.all_names() {
                // an earlier child already owns it
                if names.insert(name.clone()) {
                    owners.push(index);
                }
            }
        }
        let moniker = format!(
            "union[{}]",
            children
                .iter()
                .map(|c| c.moniker())
                .collect::<Vec<_>>()
                .join(", ")
        );
        trace!(%moniker, classes = names.len(), "built union index");
        UnionResolver {
            moniker,
            children,
            names,
            owners,
        }
    }

    pub fn children(&self) -> &[Arc<dyn Resolver>] {
        &self.children
    }

    fn owner(&self, name: &ClassName) -> Option<&Arc<dyn Resolver>> {
        let index = self.names.get_index_of(name)?;
        Some(&self.children[self.owners[index]])
    }
}

impl Resolver for UnionResolver {
    fn find(&self, name: &ClassName) -> FindResult {
        match self.owner(name) {
            Some(child) => child.find(name),
            None => Ok(None),
        }
    }

    fn contains(&self, name: &ClassName) -> bool {
        self.names.contains(name)
    }

    fn all_names(&self) -> &IndexSet<ClassName> {
        &self.names
    }

    fn locate(&self, name: &ClassName) -> Option<&dyn Resolver> {
        self.owner(name)?.locate(name)
    }

    fn close(&self) {
        for child in &self.children {
            child.close();
        }
    }

    fn moniker(&self) -> &str {
        &self.moniker
    }
}

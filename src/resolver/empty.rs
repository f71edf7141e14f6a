use indexmap::IndexSet;

use crate::{
    name::ClassName,
    resolver::{FindResult, NO_NAMES, Resolver},
};

/// Identity element of resolver composition.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyResolver;

impl Resolver for EmptyResolver {
    fn find(&self, _name: &ClassName) -> FindResult {
        Ok(None)
    }

    fn contains(&self, _name: &ClassName) -> bool {
        false
    }

    fn all_names(&self) -> &IndexSet<ClassName> {
        &NO_NAMES
    }

    fn locate(&self, _name: &ClassName) -> Option<&dyn Resolver> {
        None
    }

    fn close(&self) {}

    fn moniker(&self) -> &str {
        "<empty>"
    }

    fn is_empty(&self) -> bool {
        true
    }
}

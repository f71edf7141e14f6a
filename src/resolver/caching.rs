use std::{collections::HashMap, sync::Arc};

use indexmap::IndexSet;
use parking_lot::Mutex;

use crate::{
    name::ClassName,
    resolver::{FindResult, Resolver},
};

/// Memoizes `find` of its delegate, negative and failed lookups included.
/// Names and ownership are the delegate's.
#[derive(Debug)]
pub struct CachingResolver {
    delegate: Arc<dyn Resolver>,
    memo: Mutex<HashMap<ClassName, FindResult>>,
}

impl CachingResolver {
    pub fn new(delegate: Arc<dyn Resolver>) -> Self {
        CachingResolver {
            delegate,
            memo: Mutex::new(HashMap::new()),
        }
    }

    pub fn delegate(&self) -> &Arc<dyn Resolver> {
        &self.delegate
    }
}

impl Resolver for CachingResolver {
    fn find(&self, name: &ClassName) -> FindResult {
        if let Some(result) = self.memo.lock().get(name) {
            return result.clone();
        }
        // not held across the delegate call
        let result = self.delegate.find(name);
        self.memo
            .lock()
            .entry(name.clone())
            .or_insert(result)
            .clone()
    }

    fn contains(&self, name: &ClassName) -> bool {
        self.delegate.contains(name)
    }

    fn all_names(&self) -> &IndexSet<ClassName> {
        self.delegate.all_names()
    }

    fn locate(&self, name: &ClassName) -> Option<&dyn Resolver> {
        self.delegate.locate(name)
    }

    fn close(&self) {
        self.delegate.close();
    }

    fn moniker(&self) -> &str {
        self.delegate.moniker()
    }

    fn is_empty(&self) -> bool {
        self.delegate.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::test_support::{ClassBuilder, classes};

    #[derive(Debug)]
    struct Counting {
        inner: Arc<dyn Resolver>,
        finds: AtomicUsize,
    }

    impl Resolver for Counting {
        fn find(&self, name: &ClassName) -> FindResult {
            self.finds.fetch_add(1, Ordering::SeqCst);
            self.inner.find(name)
        }

        fn all_names(&self) -> &IndexSet<ClassName> {
            self.inner.all_names()
        }

        fn locate(&self, name: &ClassName) -> Option<&dyn Resolver> {
            self.inner.locate(name)
        }

        fn close(&self) {}

        fn moniker(&self) -> &str {
            "counting"
        }
    }

    #[test]
    fn test_delegate_queried_once_per_name() {
        let counting = Arc::new(Counting {
            inner: classes("lib", vec![ClassBuilder::new("a/A")]),
            finds: AtomicUsize::new(0),
        });
        let caching = CachingResolver::new(counting.clone());

        let first = caching.find(&ClassName::new("a/A")).unwrap().unwrap();
        let second = caching.find(&ClassName::new("a/A")).unwrap().unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        assert!(caching.find(&ClassName::new("a/Missing")).unwrap().is_none());
        assert!(caching.find(&ClassName::new("a/Missing")).unwrap().is_none());

        assert_eq!(counting.finds.load(Ordering::SeqCst), 2);
        assert!(caching.contains(&ClassName::new("a/A")));
        assert_eq!(counting.finds.load(Ordering::SeqCst), 2);
    }
}

//! Internal disposal bag for per-instance cleanup hooks.

use std::future::Future;

use futures::future::BoxFuture;

use crate::error::BoxError;

/// Future type for disposal operations.
pub(crate) type BoxDisposeFuture = BoxFuture<'static, Result<(), BoxError>>;

/// Container for disposal hooks with LIFO execution order.
///
/// Each instance slot owns one bag. Hooks are registered by the builder while
/// it runs and executed before the instance teardown.
#[derive(Default)]
pub(crate) struct DisposeBag {
    hooks: Vec<Box<dyn FnOnce() -> BoxDisposeFuture + Send>>,
}

impl DisposeBag {
    /// Add an asynchronous disposal hook.
    pub(crate) fn push_async<Fut, F>(&mut self, f: F)
    where
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
    {
        self.hooks.push(Box::new(move || Box::pin(f())));
    }

    /// Drain the hooks in reverse registration order.
    pub(crate) fn drain_reverse(&mut self) -> Vec<Box<dyn FnOnce() -> BoxDisposeFuture + Send>> {
        let mut hooks = std::mem::take(&mut self.hooks);
        hooks.reverse();
        hooks
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.hooks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[tokio::test]
    async fn hooks_drain_lifo() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut bag = DisposeBag::default();
        for i in 0..3 {
            let order = order.clone();
            bag.push_async(move || async move {
                order.lock().unwrap().push(i);
                Ok(())
            });
        }
        assert_eq!(bag.len(), 3);
        for hook in bag.drain_reverse() {
            hook().await.unwrap();
        }
        assert_eq!(*order.lock().unwrap(), vec![2, 1, 0]);
        assert_eq!(bag.len(), 0);
    }
}

//! Deferred, memoized sub-loading.
//!
//! Environments and variables are expensive per-repository REST calls;
//! each repository record carries a [`Lazy`] holder that fetches on first
//! access and memoizes the result.

use std::future::Future;
use tokio::sync::RwLock;

/// A memoized async cell: the fetch recipe is supplied at the access
/// site, runs at most once, and the result is cached until invalidated.
pub struct Lazy<T> {
    slot: RwLock<Option<T>>,
}

impl<T: Clone> Lazy<T> {
    /// An empty holder; the first access fetches.
    pub fn new() -> Self {
        Self {
            slot: RwLock::new(None),
        }
    }

    /// A holder already carrying a value (synthetic records, tests).
    pub fn preloaded(value: T) -> Self {
        Self {
            slot: RwLock::new(Some(value)),
        }
    }

    /// Returns the cached value, fetching and memoizing it on first
    /// access. Concurrent callers serialize on the write lock; only one
    /// fetch runs.
    pub async fn get_or_fetch<F, Fut, E>(&self, fetch: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(value) = self.slot.read().await.as_ref() {
            return Ok(value.clone());
        }
        let mut slot = self.slot.write().await;
        if let Some(value) = slot.as_ref() {
            return Ok(value.clone());
        }
        let value = fetch().await?;
        *slot = Some(value.clone());
        Ok(value)
    }

    /// Applies a mutation to the cached value, if one is loaded.
    ///
    /// Returns false when nothing was loaded; an unloaded holder needs no
    /// bookkeeping, the next fetch observes the post-mutation state.
    pub async fn mutate<F: FnOnce(&mut T)>(&self, apply: F) -> bool {
        let mut slot = self.slot.write().await;
        match slot.as_mut() {
            Some(value) => {
                apply(value);
                true
            }
            None => false,
        }
    }

    /// True when a value has been fetched (or preloaded).
    pub async fn is_loaded(&self) -> bool {
        self.slot.read().await.is_some()
    }
}

impl<T: Clone> Default for Lazy<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for Lazy<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lazy").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn fetches_once() {
        let lazy: Lazy<u32> = Lazy::new();
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let value = lazy
                .get_or_fetch(|| async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, ()>(42)
                })
                .await
                .unwrap();
            assert_eq!(value, 42);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fetch_error_is_not_memoized() {
        let lazy: Lazy<u32> = Lazy::new();
        let result = lazy.get_or_fetch(|| async { Err::<u32, &str>("boom") }).await;
        assert!(result.is_err());
        assert!(!lazy.is_loaded().await);

        let value = lazy.get_or_fetch(|| async { Ok::<_, &str>(7) }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn mutate_only_touches_loaded_values() {
        let lazy: Lazy<Vec<u32>> = Lazy::new();
        assert!(!lazy.mutate(|v| v.push(1)).await);

        let preloaded = Lazy::preloaded(vec![1]);
        assert!(preloaded.mutate(|v| v.push(2)).await);
        let value = preloaded
            .get_or_fetch(|| async { Ok::<_, ()>(vec![]) })
            .await
            .unwrap();
        assert_eq!(value, vec![1, 2]);
    }
}

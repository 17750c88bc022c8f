//! Process-wide memoization with single-flight loading.
//!
//! Concurrent first callers of [`OnceCache::get_or_try_load`] share one load;
//! a failed load leaves the cache empty so a later caller can retry.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::OnceCell;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    NotLoaded,
    Loading,
    Loaded,
}

pub struct OnceCache<T> {
    cell: OnceCell<Arc<T>>,
    loading: AtomicBool,
}

/// Clears the loading flag even if the load future is dropped midway.
struct LoadingGuard<'a>(&'a AtomicBool);

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<T> OnceCache<T> {
    pub const fn new() -> Self {
        Self {
            cell: OnceCell::const_new(),
            loading: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> LoadState {
        if self.cell.initialized() {
            LoadState::Loaded
        } else if self.loading.load(Ordering::Acquire) {
            LoadState::Loading
        } else {
            LoadState::NotLoaded
        }
    }

    pub fn get(&self) -> Option<Arc<T>> {
        self.cell.get().cloned()
    }

    pub async fn get_or_try_load<E, F, Fut>(&self, load: F) -> Result<Arc<T>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(value) = self.cell.get() {
            return Ok(Arc::clone(value));
        }

        let value = self
            .cell
            .get_or_try_init(|| async {
                self.loading.store(true, Ordering::Release);
                let _guard = LoadingGuard(&self.loading);
                load().await.map(Arc::new)
            })
            .await?;

        Ok(Arc::clone(value))
    }
}

impl<T> Default for OnceCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

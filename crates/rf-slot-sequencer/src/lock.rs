//! Critical sequence lock
//!
//! Single-holder flag guarding one-shot special effects. Acquisition hands
//! out a guard; dropping the guard releases the lock, so every exit path
//! (success, error, timeout, cancelled task) lets go of it.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::watch;

use crate::error::{SequencerError, SequencerResult};

/// Current holder; `generation` is unique per acquisition
#[derive(Debug, Clone, PartialEq, Eq)]
struct Holder {
    name: String,
    generation: u64,
}

/// Process-wide exclusive flag
#[derive(Debug, Clone)]
pub struct CriticalSequenceLock {
    tx: Arc<watch::Sender<Option<Holder>>>,
    generations: Arc<AtomicU64>,
}

/// Held lock; released on drop
#[derive(Debug)]
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct CriticalGuard {
    lock: CriticalSequenceLock,
    name: String,
    generation: u64,
}

impl CriticalGuard {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for CriticalGuard {
    fn drop(&mut self) {
        // a guard outliving force_release must not free a later holder
        let generation = self.generation;
        self.lock.tx.send_if_modified(|holder| {
            if holder.as_ref().is_some_and(|h| h.generation == generation) {
                *holder = None;
                true
            } else {
                false
            }
        });
    }
}

impl CriticalSequenceLock {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self {
            tx: Arc::new(tx),
            generations: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Acquire if free
    pub fn try_acquire(&self, name: &str) -> Option<CriticalGuard> {
        let generation = self.generations.fetch_add(1, Ordering::Relaxed) + 1;
        let acquired = self.tx.send_if_modified(|holder| {
            if holder.is_some() {
                false
            } else {
                *holder = Some(Holder {
                    name: name.to_string(),
                    generation,
                });
                true
            }
        });
        acquired.then(|| CriticalGuard {
            lock: self.clone(),
            name: name.to_string(),
            generation,
        })
    }

    pub fn is_held(&self) -> bool {
        self.tx.borrow().is_some()
    }

    pub fn holder(&self) -> Option<String> {
        self.tx.borrow().as_ref().map(|h| h.name.clone())
    }

    /// Wait until free; false if `limit` elapsed first
    pub async fn wait_released(&self, limit: Duration) -> bool {
        let mut rx = self.tx.subscribe();
        matches!(
            tokio::time::timeout(limit, rx.wait_for(Option::is_none)).await,
            Ok(Ok(_))
        )
    }

    /// Clear a stuck holder (missed release safety net)
    pub fn force_release(&self) -> Option<String> {
        let previous = self.tx.send_replace(None).map(|h| h.name);
        if let Some(name) = &previous {
            log::warn!("[Round] critical sequence '{name}' force-released");
        }
        previous
    }

    /// Run `fut` holding the lock, bounded by `limit`
    ///
    /// `Ok(None)` means the sequence timed out; the lock is released either way.
    pub async fn run_exclusive<F, T>(&self, name: &str, limit: Duration, fut: F) -> SequencerResult<Option<T>>
    where
        F: Future<Output = T>,
    {
        let guard = self
            .try_acquire(name)
            .ok_or_else(|| SequencerError::CriticalSequenceHeld(self.holder().unwrap_or_default()))?;
        let result = tokio::time::timeout(limit, fut).await.ok();
        drop(guard);
        Ok(result)
    }
}

impl Default for CriticalSequenceLock {
    fn default() -> Self {
        Self::new()
    }
}

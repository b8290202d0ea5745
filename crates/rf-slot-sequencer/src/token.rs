//! One-shot completion token
//!
//! Resolved exactly once; later resolutions are no-ops. Any number of
//! waiters may await it, before or after resolution.

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;

struct TokenInner {
    label: String,
    tx: watch::Sender<bool>,
}

/// Shared, idempotent completion signal
#[derive(Clone)]
pub struct CompletionToken {
    inner: Arc<TokenInner>,
}

impl CompletionToken {
    pub fn new(label: impl Into<String>) -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            inner: Arc::new(TokenInner {
                label: label.into(),
                tx,
            }),
        }
    }

    /// Token that is already complete (instant effects, fallbacks)
    pub fn resolved(label: impl Into<String>) -> Self {
        let token = Self::new(label);
        token.resolve();
        token
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// Resolve; returns false if it was already resolved
    pub fn resolve(&self) -> bool {
        self.inner.tx.send_if_modified(|done| {
            if *done {
                false
            } else {
                *done = true;
                true
            }
        })
    }

    pub fn is_resolved(&self) -> bool {
        *self.inner.tx.borrow()
    }

    /// Wait until resolved
    pub async fn wait(&self) {
        let mut rx = self.inner.tx.subscribe();
        // The sender lives as long as this token, so the channel never closes here
        let _ = rx.wait_for(|done| *done).await;
    }

    /// Same underlying token?
    pub fn same_as(&self, other: &CompletionToken) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for CompletionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionToken")
            .field("label", &self.inner.label)
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

/// Wait for every token (resolution order does not matter)
pub async fn wait_all(tokens: &[CompletionToken]) {
    for token in tokens {
        token.wait().await;
    }
}

//! Shared bearer-token handle.
//!
//! The token is an opaque string supplied by the caller and injected into
//! every client that needs it. A 401 from any upstream clears the cell;
//! re-authentication is the caller's concern.

use parking_lot::RwLock;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct TokenCell {
    inner: Arc<RwLock<Option<String>>>,
}

impl TokenCell {
    /// Create an empty cell (anonymous requests).
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a cell holding a token.
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Some(token.into()))),
        }
    }

    /// Replace the stored token.
    pub fn set(&self, token: impl Into<String>) {
        *self.inner.write() = Some(token.into());
    }

    /// Drop the stored token. All clones of this cell observe the clear.
    pub fn clear(&self) {
        *self.inner.write() = None;
    }

    /// Current token, if any.
    pub fn get(&self) -> Option<String> {
        self.inner.read().clone()
    }

    pub fn is_set(&self) -> bool {
        self.inner.read().is_some()
    }
}

//! In-memory state store
//!
//! Backs tests and simulated runs. The version counter gives the same
//! conditional-put semantics a real document store would provide.

use async_trait::async_trait;
use std::sync::Mutex;

use super::{StateStore, Version};
use crate::error::StoreError;
use crate::types::AccountState;

pub struct MemoryStateStore {
    inner: Mutex<(AccountState, Version)>,
}

impl MemoryStateStore {
    pub fn new(initial: AccountState) -> Self {
        Self {
            inner: Mutex::new((initial, 0)),
        }
    }

    /// Simulate a competing writer by bumping the version out from under a
    /// reader. Test hook only.
    #[cfg(test)]
    pub(crate) fn bump_version_for_test(&self) {
        let mut guard = self.inner.lock().expect("store mutex poisoned");
        guard.1 += 1;
    }
}

impl Default for MemoryStateStore {
    fn default() -> Self {
        Self::new(AccountState::default())
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self) -> Result<(AccountState, Version), StoreError> {
        let guard = self
            .inner
            .lock()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok((guard.0.clone(), guard.1))
    }

    async fn store(&self, state: &AccountState, expected: Version) -> Result<Version, StoreError> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        if guard.1 != expected {
            return Err(StoreError::VersionConflict {
                expected,
                actual: guard.1,
            });
        }
        guard.0 = state.clone();
        guard.1 += 1;
        Ok(guard.1)
    }
}

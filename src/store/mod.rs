//! Versioned account-state store
//!
//! The whole account document lives under one key. Writers never overwrite
//! blindly: every put is conditional on the version they read, so concurrent
//! runners lose the version race instead of silently dropping each other's
//! updates. The analysis lock acquisition rides on the same mechanism.

mod memory;

pub use memory::MemoryStateStore;

use async_trait::async_trait;
use tracing::debug;

use crate::config::DAY_SECS;
use crate::error::StoreError;
use crate::types::{now_unix, AccountState, PriceHistoryEntry, Signal, Timeframe};

/// Monotonic document version used for conditional puts
pub type Version = u64;

/// How many times a read-mutate-put cycle retries a lost version race
const CAS_ATTEMPTS: u32 = 5;

#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load the account document and its current version.
    async fn load(&self) -> Result<(AccountState, Version), StoreError>;

    /// Persist the document if the stored version still equals `expected`.
    /// Returns the new version, or `VersionConflict` if a concurrent writer
    /// got there first.
    async fn store(&self, state: &AccountState, expected: Version) -> Result<Version, StoreError>;
}

/// Apply `mutate` to the current document with conditional-put semantics,
/// retrying a bounded number of times on version conflicts.
pub async fn update_state<F>(store: &dyn StateStore, mut mutate: F) -> Result<AccountState, StoreError>
where
    F: FnMut(&mut AccountState),
{
    for _ in 0..CAS_ATTEMPTS {
        let (mut state, version) = store.load().await?;
        mutate(&mut state);
        state.updated_at = now_unix();
        match store.store(&state, version).await {
            Ok(_) => return Ok(state),
            Err(StoreError::VersionConflict { .. }) => {
                debug!("state update lost version race, retrying");
            }
            Err(e) => return Err(e),
        }
    }
    Err(StoreError::Backend(
        "conditional put retries exhausted".to_string(),
    ))
}

/// Append a freshly ingested signal, pruning entries older than 24 hours
/// (the ingestion-path retention window). A 30min signal also records the
/// trigger timestamp that arms the next full analysis.
pub async fn append_signal(store: &dyn StateStore, signal: Signal) -> Result<(), StoreError> {
    let now = now_unix();
    let cutoff = now - DAY_SECS;
    let is_trigger = signal.timeframe == Timeframe::Min30;
    update_state(store, |state| {
        state.signals.retain(|s| s.timestamp > cutoff);
        state.signals.push(signal.clone());
        if is_trigger {
            state.last_trigger = now;
        }
    })
    .await?;
    Ok(())
}

/// Append a price sample, pruning history beyond the retention window.
pub async fn append_price_entry(
    store: &dyn StateStore,
    entry: PriceHistoryEntry,
    retention_secs: i64,
) -> Result<(), StoreError> {
    let cutoff = now_unix() - retention_secs;
    update_state(store, |state| {
        state.price_history.retain(|p| p.timestamp > cutoff);
        state.price_history.push(entry.clone());
    })
    .await?;
    Ok(())
}

/// Drop signals past their expiry deadline and price history older than the
/// retention window.
pub async fn cleanup_old_data(store: &dyn StateStore, retention_secs: i64) -> Result<(), StoreError> {
    let now = now_unix();
    let cutoff = now - retention_secs;
    let state = update_state(store, |state| {
        state.signals.retain(|s| s.expires_at > now);
        state.price_history.retain(|p| p.timestamp > cutoff);
    })
    .await?;
    debug!(
        "retention cleanup done: {} signals, {} price samples kept",
        state.signals.len(),
        state.price_history.len()
    );
    Ok(())
}

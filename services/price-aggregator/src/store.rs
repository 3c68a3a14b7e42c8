//! Key→multiplier store interface
//!
//! The store is an external collaborator queried synchronously on cache
//! misses. `InMemoryMultiplierStore` backs the binary and the tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use rust_decimal::Decimal;

/// Failure of a multiplier query. Never cached.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("multiplier store unavailable: {0}")]
    Unavailable(String),

    #[error("query for {instrument} failed: {reason}")]
    Query { instrument: String, reason: String },
}

/// Synchronous lookup of a per-instrument price multiplier.
pub trait MultiplierStore: Send + Sync {
    /// `Ok(None)` when the instrument has no multiplier.
    fn multiplier_for(&self, instrument: &str) -> Result<Option<Decimal>, StoreError>;
}

impl<S: MultiplierStore + ?Sized> MultiplierStore for Arc<S> {
    fn multiplier_for(&self, instrument: &str) -> Result<Option<Decimal>, StoreError> {
        (**self).multiplier_for(instrument)
    }
}

/// Multiplier table held in memory.
#[derive(Debug, Default)]
pub struct InMemoryMultiplierStore {
    multipliers: RwLock<HashMap<String, Decimal>>,
    queries: AtomicU64,
}

impl InMemoryMultiplierStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, Decimal)>,
        S: Into<String>,
    {
        let multipliers = pairs.into_iter().map(|(name, m)| (name.into(), m)).collect();
        Self {
            multipliers: RwLock::new(multipliers),
            queries: AtomicU64::new(0),
        }
    }

    /// Insert or replace a multiplier. Cached values are not touched.
    pub fn set(&self, instrument: impl Into<String>, multiplier: Decimal) {
        self.multipliers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(instrument.into(), multiplier);
    }

    pub fn remove(&self, instrument: &str) -> Option<Decimal> {
        self.multipliers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(instrument)
    }

    /// Number of queries answered so far.
    pub fn query_count(&self) -> u64 {
        self.queries.load(Ordering::Relaxed)
    }
}

impl MultiplierStore for InMemoryMultiplierStore {
    fn multiplier_for(&self, instrument: &str) -> Result<Option<Decimal>, StoreError> {
        self.queries.fetch_add(1, Ordering::Relaxed);
        Ok(self
            .multipliers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(instrument)
            .copied())
    }
}

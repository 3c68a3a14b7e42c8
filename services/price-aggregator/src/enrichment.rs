//! Cached multiplier enrichment
//!
//! Each record's price is scaled by the multiplier registered for its
//! instrument, if any. Multipliers come from the external store through a
//! TTL cache; "no multiplier" answers are cached too so instruments without
//! one do not hit the store on every record.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::StreamExt;
use rust_decimal::Decimal;
use tracing::{debug, warn};
use types::record::Record;

use crate::cache::{CacheStats, TtlCache};
use crate::error::PipelineError;
use crate::store::{MultiplierStore, StoreError};
use crate::stream::RecordStream;

/// Expiry of cached multipliers, measured from insertion.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5);

/// Store lookups served through a TTL cache.
pub struct MultiplierProvider {
    store: Arc<dyn MultiplierStore>,
    cache: TtlCache<Option<Decimal>>,
}

impl MultiplierProvider {
    pub fn new(store: Arc<dyn MultiplierStore>) -> Self {
        Self::with_ttl(store, DEFAULT_CACHE_TTL)
    }

    pub fn with_ttl(store: Arc<dyn MultiplierStore>, ttl: Duration) -> Self {
        Self {
            store,
            cache: TtlCache::new(ttl),
        }
    }

    /// Multiplier for `instrument`, from cache or store.
    pub fn multiplier_for(&self, instrument: &str) -> Result<Option<Decimal>, StoreError> {
        self.cache.get_or_load(instrument, |key| {
            debug!(instrument = key, "Multiplier cache miss");
            self.store.multiplier_for(key)
        })
    }

    pub fn invalidate_cached_instrument(&self, instrument: &str) {
        self.cache.invalidate(instrument);
    }

    pub fn invalidate_cache(&self) {
        self.cache.invalidate_all();
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn cache_ttl(&self) -> Duration {
        self.cache.ttl()
    }
}

/// Apply the instrument's multiplier to one record.
pub fn enrich_record(record: Record, provider: &MultiplierProvider) -> Result<Record, PipelineError> {
    let instrument = record.name().as_str();
    let multiplier = match provider.multiplier_for(instrument) {
        Ok(multiplier) => multiplier,
        Err(source) => {
            warn!(instrument, error = %source, "Multiplier lookup failed");
            return Err(PipelineError::Lookup {
                instrument: instrument.to_string(),
                source,
            });
        }
    };

    match multiplier {
        Some(multiplier) => record.multiply(multiplier).ok_or_else(|| PipelineError::EnrichmentOverflow {
            instrument: instrument.to_string(),
        }),
        None => Ok(record),
    }
}

/// Enrich every record of `records`. Upstream failures pass through.
pub fn enrich(records: RecordStream, provider: Arc<MultiplierProvider>) -> RecordStream {
    records
        .map(move |item| item.and_then(|record| enrich_record(record, &provider)))
        .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryMultiplierStore;
    use chrono::NaiveDate;
    use futures::stream;
    use std::sync::atomic::{AtomicBool, Ordering};
    use types::ids::InstrumentName;

    fn record(name: &str, price: Decimal) -> Record {
        Record::new(
            InstrumentName::new(name),
            NaiveDate::from_ymd_opt(2014, 11, 3).unwrap(),
            price,
        )
    }

    fn provider_with(store: &Arc<InMemoryMultiplierStore>) -> MultiplierProvider {
        MultiplierProvider::new(store.clone())
    }

    struct FlakyStore {
        failing: AtomicBool,
    }

    impl MultiplierStore for FlakyStore {
        fn multiplier_for(&self, _instrument: &str) -> Result<Option<Decimal>, StoreError> {
            if self.failing.load(Ordering::SeqCst) {
                Err(StoreError::Unavailable("connection refused".to_string()))
            } else {
                Ok(Some(Decimal::TWO))
            }
        }
    }

    #[test]
    fn test_multiplier_applied() {
        let store = Arc::new(InMemoryMultiplierStore::from_pairs([("INSTRUMENT1", Decimal::new(105, 2))]));
        let provider = provider_with(&store);

        let enriched = enrich_record(record("INSTRUMENT1", Decimal::from(100)), &provider).unwrap();
        assert_eq!(enriched.price(), Decimal::from(105));
        assert_eq!(enriched.name().as_str(), "INSTRUMENT1");
        assert_eq!(enriched.date(), NaiveDate::from_ymd_opt(2014, 11, 3).unwrap());
    }

    #[test]
    fn test_absent_multiplier_passes_through() {
        let store = Arc::new(InMemoryMultiplierStore::new());
        let provider = provider_with(&store);

        let original = record("INSTRUMENT9", Decimal::new(1234, 2));
        let enriched = enrich_record(original.clone(), &provider).unwrap();
        assert_eq!(enriched.price(), original.price());
    }

    #[test]
    fn test_absent_multiplier_is_cached() {
        let store = Arc::new(InMemoryMultiplierStore::new());
        let provider = provider_with(&store);

        for _ in 0..5 {
            enrich_record(record("INSTRUMENT9", Decimal::ONE), &provider).unwrap();
        }
        assert_eq!(store.query_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_requeried_after_ttl() {
        let store = Arc::new(InMemoryMultiplierStore::from_pairs([("INSTRUMENT5", Decimal::TWO)]));
        let provider = provider_with(&store);

        assert_eq!(provider.multiplier_for("INSTRUMENT5").unwrap(), Some(Decimal::TWO));
        store.set("INSTRUMENT5", Decimal::TEN);

        tokio::time::advance(Duration::from_secs(4)).await;
        assert_eq!(provider.multiplier_for("INSTRUMENT5").unwrap(), Some(Decimal::TWO));
        assert_eq!(store.query_count(), 1);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(provider.multiplier_for("INSTRUMENT5").unwrap(), Some(Decimal::TEN));
        assert_eq!(store.query_count(), 2);
    }

    #[test]
    fn test_invalidation_picks_up_new_multiplier() {
        let store = Arc::new(InMemoryMultiplierStore::from_pairs([("INSTRUMENT1", Decimal::ONE)]));
        let provider = provider_with(&store);

        provider.multiplier_for("INSTRUMENT1").unwrap();
        store.set("INSTRUMENT1", Decimal::TWO);
        provider.invalidate_cached_instrument("INSTRUMENT1");
        assert_eq!(provider.multiplier_for("INSTRUMENT1").unwrap(), Some(Decimal::TWO));

        store.set("INSTRUMENT1", Decimal::TEN);
        provider.invalidate_cache();
        provider.invalidate_cache();
        assert_eq!(provider.multiplier_for("INSTRUMENT1").unwrap(), Some(Decimal::TEN));
    }

    #[test]
    fn test_lookup_failure_not_cached() {
        let store = Arc::new(FlakyStore {
            failing: AtomicBool::new(true),
        });
        let provider = MultiplierProvider::new(store.clone());

        let err = enrich_record(record("INSTRUMENT1", Decimal::ONE), &provider).unwrap_err();
        assert_eq!(err.kind(), "lookup");
        assert_eq!(provider.cache_stats().misses, 1);

        store.failing.store(false, Ordering::SeqCst);
        let enriched = enrich_record(record("INSTRUMENT1", Decimal::ONE), &provider).unwrap();
        assert_eq!(enriched.price(), Decimal::TWO);
        assert_eq!(provider.cache_stats().misses, 2);
    }

    #[test]
    fn test_overflow_reported() {
        let store = Arc::new(InMemoryMultiplierStore::from_pairs([("BIG", Decimal::MAX)]));
        let provider = provider_with(&store);

        let err = enrich_record(record("BIG", Decimal::MAX), &provider).unwrap_err();
        assert!(matches!(err, PipelineError::EnrichmentOverflow { .. }));
    }

    #[tokio::test]
    async fn test_enrich_stream_keeps_order() {
        let store = Arc::new(InMemoryMultiplierStore::from_pairs([
            ("INSTRUMENT1", Decimal::new(105, 2)),
            ("INSTRUMENT2", Decimal::new(110, 2)),
        ]));
        let provider = Arc::new(provider_with(&store));

        let items = vec![
            Ok(record("INSTRUMENT1", Decimal::from(10))),
            Ok(record("INSTRUMENT2", Decimal::from(10))),
            Ok(record("INSTRUMENT4", Decimal::from(10))),
        ];
        let prices: Vec<Decimal> = enrich(stream::iter(items).boxed(), provider)
            .map(|item| item.unwrap().price())
            .collect()
            .await;

        assert_eq!(
            prices,
            vec![Decimal::new(1050, 2), Decimal::new(1100, 2), Decimal::from(10)]
        );
    }
}

//! Speed-limit cache keyed by coordinate bucket.
//!
//! Nearby GPS fixes land in the same bucket so jitter does not cause
//! extra lookups. Each bucket holds a [`OnceCell`]: the first caller
//! performs the lookup and concurrent callers for the same bucket wait
//! for its result instead of issuing their own.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use log::{debug, warn};
use tokio::sync::OnceCell;

use crate::road_data::RoadDataProvider;

/// Buckets are 1e-4 degree (about 11 m of latitude) on each axis.
const BUCKET_SCALE: f64 = 10_000.0;

/// Default number of buckets kept before the oldest is evicted.
pub const DEFAULT_CAPACITY: usize = 4096;

/// Quantized coordinate used as cache key.
pub type BucketKey = (i64, i64);

/// Bucket a coordinate.
pub fn bucket(lat: f64, lon: f64) -> BucketKey {
    (
        (lat * BUCKET_SCALE).round() as i64,
        (lon * BUCKET_SCALE).round() as i64,
    )
}

type Cell = Arc<OnceCell<Option<f64>>>;

#[derive(Default)]
struct Entries {
    cells: HashMap<BucketKey, Cell>,
    /// Insertion order, oldest first.
    order: VecDeque<BucketKey>,
}

pub struct SpeedLimitCache<P> {
    provider: Arc<P>,
    entries: Mutex<Entries>,
    capacity: usize,
}

impl<P: RoadDataProvider> SpeedLimitCache<P> {
    pub fn new(provider: Arc<P>) -> Self {
        Self::with_capacity(provider, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(provider: Arc<P>, capacity: usize) -> Self {
        Self {
            provider,
            entries: Mutex::new(Entries::default()),
            capacity: capacity.max(1),
        }
    }

    /// Speed limit at a coordinate, in km/h.
    ///
    /// Returns the cached value when the bucket is known. Otherwise one
    /// lookup is made and its result stored. A failed lookup is not
    /// cached and yields None.
    pub async fn get(&self, lat: f64, lon: f64) -> Option<f64> {
        let key = bucket(lat, lon);
        let cell = self.cell(key);

        let result = cell
            .get_or_try_init(|| async {
                debug!("Speed limit lookup for bucket {:?}", key);
                self.provider.speed_limit(lat, lon).await
            })
            .await;

        match result {
            Ok(limit) => *limit,
            Err(e) => {
                warn!("Speed limit lookup failed at ({lat:.5}, {lon:.5}): {e}");
                None
            }
        }
    }

    /// Number of buckets currently held.
    pub fn len(&self) -> usize {
        self.lock().cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every bucket.
    pub fn clear(&self) {
        let mut entries = self.lock();
        entries.cells.clear();
        entries.order.clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Entries> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Cell for a bucket, created (and the oldest evicted) when missing.
    fn cell(&self, key: BucketKey) -> Cell {
        let mut entries = self.lock();

        if let Some(cell) = entries.cells.get(&key) {
            return Arc::clone(cell);
        }

        while entries.cells.len() >= self.capacity {
            match entries.order.pop_front() {
                Some(oldest) => {
                    entries.cells.remove(&oldest);
                }
                None => break,
            }
        }

        let cell: Cell = Arc::new(OnceCell::new());
        entries.cells.insert(key, Arc::clone(&cell));
        entries.order.push_back(key);
        cell
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::road_data::mock::MockRoadData;

    #[test]
    fn nearby_fixes_share_a_bucket() {
        assert_eq!(bucket(48.85661, 2.35222), bucket(48.85659, 2.35218));
        assert_ne!(bucket(48.8566, 2.3522), bucket(48.8576, 2.3522));
    }

    #[tokio::test]
    async fn second_lookup_is_served_from_cache() {
        let provider = Arc::new(MockRoadData::new(true, Some(50.0)));
        let cache = SpeedLimitCache::new(Arc::clone(&provider));

        assert_eq!(cache.get(48.8566, 2.3522).await, Some(50.0));
        assert_eq!(provider.speed_limit_calls(), 1);

        assert_eq!(cache.get(48.8566, 2.3522).await, Some(50.0));
        assert_eq!(provider.speed_limit_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_lookups_single_flight() {
        let provider = Arc::new(
            MockRoadData::new(true, Some(90.0)).with_delay(Duration::from_millis(200)),
        );
        let cache = SpeedLimitCache::new(Arc::clone(&provider));

        let (a, b, c) = tokio::join!(
            cache.get(48.8566, 2.3522),
            cache.get(48.85661, 2.35221),
            cache.get(48.8566, 2.3522),
        );

        assert_eq!((a, b, c), (Some(90.0), Some(90.0), Some(90.0)));
        assert_eq!(provider.speed_limit_calls(), 1);
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let provider = Arc::new(MockRoadData::new(true, Some(70.0)));
        let cache = SpeedLimitCache::new(Arc::clone(&provider));

        provider.set_failing(true);
        assert_eq!(cache.get(48.0, 16.0).await, None);

        provider.set_failing(false);
        assert_eq!(cache.get(48.0, 16.0).await, Some(70.0));
        assert_eq!(provider.speed_limit_calls(), 2);
    }

    #[tokio::test]
    async fn unknown_limit_is_cached_as_none() {
        let provider = Arc::new(MockRoadData::new(true, None));
        let cache = SpeedLimitCache::new(Arc::clone(&provider));

        assert_eq!(cache.get(48.0, 16.0).await, None);
        assert_eq!(cache.get(48.0, 16.0).await, None);
        assert_eq!(provider.speed_limit_calls(), 1);
    }

    #[tokio::test]
    async fn oldest_bucket_is_evicted() {
        let provider = Arc::new(MockRoadData::new(true, Some(50.0)));
        let cache = SpeedLimitCache::with_capacity(Arc::clone(&provider), 2);

        cache.get(48.0, 16.0).await;
        cache.get(48.1, 16.0).await;
        cache.get(48.2, 16.0).await;
        assert_eq!(cache.len(), 2);

        // First bucket was evicted and needs a new lookup
        cache.get(48.0, 16.0).await;
        assert_eq!(provider.speed_limit_calls(), 4);

        cache.clear();
        assert!(cache.is_empty());
    }
}

//! Region directory and per-region buckets.
//!
//! The directory lock is only taken for writing when a region is touched
//! for the first time. Everything else happens under the bucket's own
//! lock.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::info;

use crate::rank::RankIndex;
use crate::types::{AgentRecord, GatewayKey, GatewayRecord};

/// Maps, index and lock for one region.
pub struct RegionBucket {
    name: String,
    data: RwLock<RegionData>,
}

/// Contents of a bucket. The ranking index must always hold exactly one
/// `(score, address)` pair per gateway in `gateways`.
#[derive(Default)]
pub(crate) struct RegionData {
    pub gateways: HashMap<GatewayKey, GatewayRecord>,
    pub agents: HashMap<String, AgentRecord>,
    pub ranked: RankIndex<GatewayKey>,
}

impl RegionBucket {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            data: RwLock::new(RegionData::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, RegionData> {
        self.data.read().expect("region lock")
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, RegionData> {
        self.data.write().expect("region lock")
    }
}

/// Region name → bucket. Regions are created on first write and never
/// removed.
#[derive(Default)]
pub struct RegionStore {
    regions: RwLock<HashMap<String, Arc<RegionBucket>>>,
}

impl RegionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the bucket for `region`, creating it if needed.
    ///
    /// Double-checked: a read-locked lookup first, then a write-locked
    /// re-check before inserting, so concurrent first touches create one
    /// bucket.
    pub fn bucket(&self, region: &str) -> Arc<RegionBucket> {
        if let Some(bucket) = self.find(region) {
            return bucket;
        }

        let mut regions = self.regions.write().expect("region directory lock");
        if let Some(bucket) = regions.get(region) {
            return Arc::clone(bucket);
        }
        let bucket = Arc::new(RegionBucket::new(region));
        regions.insert(region.to_string(), Arc::clone(&bucket));
        info!(region, "region created");
        bucket
    }

    /// Get the bucket for `region` without creating it.
    pub fn find(&self, region: &str) -> Option<Arc<RegionBucket>> {
        let regions = self.regions.read().expect("region directory lock");
        regions.get(region).cloned()
    }

    /// All buckets, sorted by region name.
    pub fn buckets(&self) -> Vec<Arc<RegionBucket>> {
        let regions = self.regions.read().expect("region directory lock");
        let mut buckets: Vec<_> = regions.values().cloned().collect();
        buckets.sort_by(|a, b| a.name.cmp(&b.name));
        buckets
    }

    pub fn len(&self) -> usize {
        self.regions.read().expect("region directory lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn bucket_is_created_once() {
        let store = RegionStore::new();
        let a = store.bucket("us-east");
        let b = store.bucket("us-east");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn find_does_not_create() {
        let store = RegionStore::new();
        assert!(store.find("eu-west").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn concurrent_first_touch_yields_one_bucket() {
        let store = Arc::new(RegionStore::new());
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || store.bucket("ap-south"))
            })
            .collect();
        let buckets: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(store.len(), 1);
        for bucket in &buckets[1..] {
            assert!(Arc::ptr_eq(&buckets[0], bucket));
        }
    }

    #[test]
    fn buckets_are_sorted() {
        let store = RegionStore::new();
        store.bucket("us-west");
        store.bucket("eu-central");
        store.bucket("global");
        let names: Vec<_> = store.buckets().iter().map(|b| b.name().to_string()).collect();
        assert_eq!(names, vec!["eu-central", "global", "us-west"]);
    }
}

//! Registry — gateway/agent operations over the region store.
//!
//! Every mutation takes the region's write lock once and holds it across
//! lookup, map write and ranking update. Reads take the read lock only.
//! Lookups never create regions; only a successful write does.

use std::collections::BTreeMap;
use std::collections::hash_map::Entry;

use serde::Serialize;
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::rank::RankOrder;
use crate::region::RegionStore;
use crate::types::*;

/// Region-sharded store of gateways and agents.
#[derive(Default)]
pub struct Registry {
    regions: RegionStore,
    rank_order: RankOrder,
}

/// Per-region record counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegionSummary {
    pub region: String,
    pub gateways: usize,
    pub agents: usize,
}

/// Deterministic view of one region, comparable across stores.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionSnapshot {
    pub region: String,
    pub gateways: BTreeMap<GatewayKey, GatewayRecord>,
    pub agents: BTreeMap<String, AgentRecord>,
    /// Gateway keys in ascending rank order.
    pub ranking: Vec<GatewayKey>,
}

/// Deterministic view of the whole registry, regions sorted by name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegistrySnapshot {
    pub regions: Vec<RegionSnapshot>,
}

impl Registry {
    /// Empty registry ranking in ascending order.
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty registry ranking in the given order.
    pub fn with_rank_order(rank_order: RankOrder) -> Self {
        Self {
            regions: RegionStore::new(),
            rank_order,
        }
    }

    pub fn rank_order(&self) -> RankOrder {
        self.rank_order
    }

    /// Register or update a gateway.
    ///
    /// Re-registering an existing address keeps the stored identity,
    /// replaces the remaining fields and moves the gateway to its new
    /// position in the ranking.
    pub fn add_gateway(&self, region: &str, registration: GatewayRegistration) -> StateResult<GatewayRecord> {
        let region = region_or_default(region);
        let mut record = registration.into_record()?;

        let bucket = self.regions.bucket(region);
        let mut guard = bucket.write();
        let data = &mut *guard;

        let new_score = record.rank_score();
        if let Some(existing) = data.gateways.get(&record.address) {
            record.id = existing.id.clone();
            data.ranked.remove(&record.address, existing.rank_score());
        }
        data.ranked.insert(record.address.clone(), new_score);
        data.gateways.insert(record.address.clone(), record.clone());

        debug!(region, address = %record.address, score = new_score, "gateway registered");
        Ok(record)
    }

    /// Register or rebind an agent.
    ///
    /// Fails with [`StateError::GatewayNotFound`] unless the gateway
    /// already exists in the same region. Re-registering a domain updates
    /// only its gateway binding.
    pub fn add_agent(
        &self,
        region: &str,
        registration: AgentRegistration,
    ) -> StateResult<(AgentRecord, GatewayRecord)> {
        let region = region_or_default(region);
        registration.validate()?;

        let missing = || StateError::GatewayNotFound {
            key: registration.gateway_key.clone(),
            region: region.to_string(),
        };
        let bucket = self.regions.find(region).ok_or_else(missing)?;
        let mut guard = bucket.write();
        let data = &mut *guard;

        let gateway = data
            .gateways
            .get(&registration.gateway_key)
            .cloned()
            .ok_or_else(missing)?;

        let agent = match data.agents.entry(registration.domain.clone()) {
            Entry::Occupied(mut entry) => {
                let existing = entry.get_mut();
                existing.gateway_id = gateway.id.clone();
                existing.gateway_ip = gateway.ip.clone();
                existing.gateway_address = gateway.address.clone();
                existing.clone()
            }
            Entry::Vacant(entry) => entry.insert(registration.bind(&gateway)).clone(),
        };

        debug!(region, domain = %agent.domain, gateway = %gateway.address, "agent bound");
        Ok((agent, gateway))
    }

    /// Look up a gateway by address.
    pub fn get_gateway(&self, region: &str, key: &str) -> Option<GatewayRecord> {
        let bucket = self.regions.find(region_or_default(region))?;
        let data = bucket.read();
        data.gateways.get(key).cloned()
    }

    /// Look up an agent by domain.
    pub fn get_agent(&self, region: &str, domain: &str) -> Option<AgentRecord> {
        let bucket = self.regions.find(region_or_default(region))?;
        let data = bucket.read();
        data.agents.get(domain).cloned()
    }

    /// Up to `k` gateways in the configured rank order.
    pub fn top_k_gateways(&self, region: &str, k: usize) -> Vec<GatewayRecord> {
        let Some(bucket) = self.regions.find(region_or_default(region)) else {
            return Vec::new();
        };
        let data = bucket.read();
        data.ranked
            .iter(self.rank_order)
            .take(k)
            .filter_map(|item| data.gateways.get(&item.key).cloned())
            .collect()
    }

    /// Gateway and agent counts per region, sorted by name.
    pub fn regions(&self) -> Vec<RegionSummary> {
        self.regions
            .buckets()
            .iter()
            .map(|bucket| {
                let data = bucket.read();
                RegionSummary {
                    region: bucket.name().to_string(),
                    gateways: data.gateways.len(),
                    agents: data.agents.len(),
                }
            })
            .collect()
    }

    /// Copy of the full store. Each region is read under its own lock, so
    /// the snapshot is consistent per region, not across regions.
    pub fn snapshot(&self) -> RegistrySnapshot {
        let regions = self
            .regions
            .buckets()
            .iter()
            .map(|bucket| {
                let data = bucket.read();
                RegionSnapshot {
                    region: bucket.name().to_string(),
                    gateways: data.gateways.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
                    agents: data.agents.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
                    ranking: data.ranked.top_k(usize::MAX, RankOrder::Ascending),
                }
            })
            .collect();
        RegistrySnapshot { regions }
    }

    #[cfg(test)]
    pub(crate) fn bucket(&self, region: &str) -> std::sync::Arc<crate::region::RegionBucket> {
        self.regions.bucket(region)
    }
}

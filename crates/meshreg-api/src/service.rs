//! Registry call surface.
//!
//! Every mutation follows the same write-ahead-then-apply sequence:
//!
//! ```text
//! validate ──► take WAL lock ──► append + flush ──► apply to Registry ──► release
//! ```
//!
//! Holding the WAL lock across the apply step keeps the in-memory apply
//! order identical to the log order. Region locks are taken only inside
//! the WAL lock and never across disk I/O.

use std::sync::Arc;

use meshreg_state::{
    AgentRecord, AgentRegistration, DEFAULT_REGION, ErrorCode, GatewayRecord, GatewayRegistration,
    RegionSummary, Registry, region_or_default,
};
use meshreg_wal::{Wal, WalRecord};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::error::{ApiError, ApiResult};

/// Top-K used when the caller does not give one.
pub const DEFAULT_TOP_K: usize = 10;

/// An agent registration together with the gateway it is bound to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentBinding {
    pub agent: AgentRecord,
    pub gateway: GatewayRecord,
}

/// Result of a proxy lookup. `agent` is set when the key named an agent
/// domain rather than a gateway address.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProxyResolution {
    pub gateway: GatewayRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<AgentRecord>,
}

/// Registry plus its write-ahead log.
#[derive(Clone)]
pub struct RegistryService {
    registry: Arc<Registry>,
    wal: Arc<Wal>,
    default_top_k: usize,
    default_region: String,
}

impl RegistryService {
    pub fn new(registry: Arc<Registry>, wal: Arc<Wal>) -> Self {
        Self {
            registry,
            wal,
            default_top_k: DEFAULT_TOP_K,
            default_region: DEFAULT_REGION.to_string(),
        }
    }

    /// Override the top-K used when a list call omits `k`.
    pub fn with_default_top_k(mut self, k: usize) -> Self {
        self.default_top_k = k.max(1);
        self
    }

    /// Override the region used when a call names none.
    pub fn with_default_region(mut self, region: impl Into<String>) -> Self {
        let region = region.into();
        self.default_region = region_or_default(&region).to_string();
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn wal(&self) -> &Wal {
        &self.wal
    }

    fn region<'a>(&'a self, region: &'a str) -> &'a str {
        if region.is_empty() { &self.default_region } else { region }
    }

    /// RegisterGateway: log, then upsert.
    pub fn register_gateway(&self, region: &str, registration: GatewayRegistration) -> ApiResult<GatewayRecord> {
        let region = self.region(region);
        let address = registration.address().inspect_err(|e| {
            warn!(region, error = %e, "gateway registration rejected");
        })?;

        let mut wal = self.wal.lock();
        wal.append(&WalRecord::put_gateway(region, &address, &registration))
            .inspect_err(|e| error!(region, %address, error = %e, "wal append failed"))?;
        let record = self
            .registry
            .add_gateway(region, registration)
            .map_err(|e| self.applied_after_log(region, e.into()))?;
        drop(wal);

        info!(region, address = %record.address, id = %record.id, "gateway registered");
        Ok(record)
    }

    /// RegisterAgent: check the gateway exists, log, then bind.
    pub fn register_agent(&self, region: &str, registration: AgentRegistration) -> ApiResult<AgentBinding> {
        let region = self.region(region);
        registration.validate().inspect_err(|e| {
            warn!(region, error = %e, "agent registration rejected");
        })?;

        let mut wal = self.wal.lock();
        if self.registry.get_gateway(region, &registration.gateway_key).is_none() {
            warn!(region, gateway = %registration.gateway_key, domain = %registration.domain, "agent references unknown gateway");
            return Err(ApiError::not_found(format!(
                "gateway {} not found in region {region}",
                registration.gateway_key
            )));
        }
        wal.append(&WalRecord::put_agent(region, &registration))
            .inspect_err(|e| error!(region, domain = %registration.domain, error = %e, "wal append failed"))?;
        let (agent, gateway) = self
            .registry
            .add_agent(region, registration)
            .map_err(|e| self.applied_after_log(region, e.into()))?;
        drop(wal);

        info!(region, domain = %agent.domain, gateway = %gateway.address, "agent registered");
        Ok(AgentBinding { agent, gateway })
    }

    /// ResolveGatewayForAgent / ListTopGateways.
    pub fn list_top_gateways(&self, region: &str, k: Option<usize>) -> ApiResult<Vec<GatewayRecord>> {
        let region = self.region(region);
        let k = k.unwrap_or(self.default_top_k);
        if k == 0 {
            return Err(ApiError::validation("k must be at least 1"));
        }
        let gateways = self.registry.top_k_gateways(region, k);
        if gateways.is_empty() {
            return Err(ApiError::not_found(format!("no gateway found in region {region}")));
        }
        Ok(gateways)
    }

    /// ResolveGatewayForProxy: `key` is a gateway address or an agent
    /// domain. An agent resolves to its bound gateway's current record.
    pub fn resolve_gateway_for_proxy(&self, region: &str, key: &str) -> ApiResult<ProxyResolution> {
        let region = self.region(region);
        if key.is_empty() {
            return Err(ApiError::validation("lookup key must not be empty"));
        }
        if let Some(gateway) = self.registry.get_gateway(region, key) {
            return Ok(ProxyResolution { gateway, agent: None });
        }

        let agent = self
            .registry
            .get_agent(region, key)
            .ok_or_else(|| ApiError::not_found(format!("no gateway or agent {key} in region {region}")))?;
        let gateway = self
            .registry
            .get_gateway(region, &agent.gateway_address)
            .ok_or_else(|| ApiError::not_found(format!("gateway {} not found in region {region}", agent.gateway_address)))?;
        Ok(ProxyResolution {
            gateway,
            agent: Some(agent),
        })
    }

    pub fn regions(&self) -> Vec<RegionSummary> {
        self.registry.regions()
    }

    /// The record is durable but did not apply. Replay will hit the same
    /// failure, so surface it loudly.
    fn applied_after_log(&self, region: &str, e: ApiError) -> ApiError {
        error!(region, error = %e, path = %self.wal.path().display(), "logged record failed to apply");
        ApiError::new(ErrorCode::Internal, e.message)
    }
}

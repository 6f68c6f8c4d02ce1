//! Logical WAL records.
//!
//! A record carries every caller-supplied field needed to rebuild the
//! store entry. Derived identities are not logged; replay recomputes
//! them.

use serde::{Deserialize, Serialize};

use meshreg_state::{AgentRegistration, Capacity, GatewayRegistration, region_or_default};

/// Frame op codes. Values are persisted and must never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Op {
    PutGateway = 1,
    PutAgent = 2,
}

impl Op {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::PutGateway),
            2 => Some(Self::PutAgent),
            _ => None,
        }
    }
}

/// Payload of a `PUT_GATEWAY` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayEntry {
    pub region: String,
    pub ip: String,
    pub port: u16,
    /// Composed address at log time. Informational; replay recomputes it.
    pub address: String,
    pub capacity: Capacity,
    pub credential_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wss_port: Option<u16>,
}

/// Payload of a `PUT_AGENT` frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentEntry {
    pub region: String,
    pub domain: String,
    pub gateway_key: String,
    pub credential_hash: String,
}

/// One logged mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum WalRecord {
    PutGateway(GatewayEntry),
    PutAgent(AgentEntry),
}

impl WalRecord {
    /// Record for a gateway registration. `address` is the validated
    /// composed address.
    pub fn put_gateway(region: &str, address: &str, registration: &GatewayRegistration) -> Self {
        Self::PutGateway(GatewayEntry {
            region: region_or_default(region).to_string(),
            ip: registration.ip.clone(),
            port: registration.port,
            address: address.to_string(),
            capacity: registration.capacity,
            credential_hash: registration.credential_hash.clone(),
            wss_port: registration.wss_port,
        })
    }

    /// Record for an agent registration.
    pub fn put_agent(region: &str, registration: &AgentRegistration) -> Self {
        Self::PutAgent(AgentEntry {
            region: region_or_default(region).to_string(),
            domain: registration.domain.clone(),
            gateway_key: registration.gateway_key.clone(),
            credential_hash: registration.credential_hash.clone(),
        })
    }

    pub fn op(&self) -> Op {
        match self {
            Self::PutGateway(_) => Op::PutGateway,
            Self::PutAgent(_) => Op::PutAgent,
        }
    }

    pub fn region(&self) -> &str {
        match self {
            Self::PutGateway(entry) => &entry.region,
            Self::PutAgent(entry) => &entry.region,
        }
    }

    pub(crate) fn encode_payload(&self) -> serde_json::Result<Vec<u8>> {
        match self {
            Self::PutGateway(entry) => serde_json::to_vec(entry),
            Self::PutAgent(entry) => serde_json::to_vec(entry),
        }
    }

    pub(crate) fn decode_payload(op: Op, payload: &[u8]) -> serde_json::Result<Self> {
        match op {
            Op::PutGateway => serde_json::from_slice(payload).map(Self::PutGateway),
            Op::PutAgent => serde_json::from_slice(payload).map(Self::PutAgent),
        }
    }
}

impl GatewayEntry {
    pub fn registration(&self) -> GatewayRegistration {
        GatewayRegistration {
            ip: self.ip.clone(),
            port: self.port,
            capacity: self.capacity,
            credential_hash: self.credential_hash.clone(),
            wss_port: self.wss_port,
        }
    }
}

impl AgentEntry {
    pub fn registration(&self) -> AgentRegistration {
        AgentRegistration {
            domain: self.domain.clone(),
            gateway_key: self.gateway_key.clone(),
            credential_hash: self.credential_hash.clone(),
        }
    }
}

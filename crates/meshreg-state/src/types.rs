//! Domain types for the registry.
//!
//! Records are what the store holds; registrations are what callers (and
//! WAL replay) hand in. Identities are derived from caller-supplied fields
//! so that replaying the same registrations always yields the same records.

use std::net::{IpAddr, SocketAddr};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{StateError, StateResult};

/// Region used when a caller does not name one.
pub const DEFAULT_REGION: &str = "global";

/// Key of a gateway within its region: the composed `ip:port` address.
pub type GatewayKey = String;

/// Map an empty region name to [`DEFAULT_REGION`].
pub fn region_or_default(region: &str) -> &str {
    if region.is_empty() {
        DEFAULT_REGION
    } else {
        region
    }
}

/// Stable identity: hex SHA-256 of `{credential_hash}|{subject}`.
///
/// The subject is the gateway address or the agent domain.
pub fn derive_identity(credential_hash: &str, subject: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(credential_hash.as_bytes());
    hasher.update(b"|");
    hasher.update(subject.as_bytes());
    hex::encode(hasher.finalize())
}

// ── Capacity ──────────────────────────────────────────────────────

/// Declared resources of a gateway. Missing dimensions count as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Capacity {
    pub cpu: u32,
    /// Memory in MiB.
    pub memory: u32,
    /// Storage in MiB.
    pub storage: u32,
    /// Bandwidth in Mbit/s.
    pub bandwidth: u32,
}

impl Capacity {
    /// Collapse the four dimensions onto one axis.
    ///
    /// `cpu + memory/1024 + storage/10240 + bandwidth/1024`
    pub fn rank_score(&self) -> f64 {
        f64::from(self.cpu)
            + f64::from(self.memory) / 1024.0
            + f64::from(self.storage) / 10240.0
            + f64::from(self.bandwidth) / 1024.0
    }
}

// ── Gateway ───────────────────────────────────────────────────────

/// A registered egress gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayRecord {
    pub id: String,
    pub ip: String,
    pub port: u16,
    /// Composed `ip:port`; the key of this record within its region.
    pub address: GatewayKey,
    pub capacity: Capacity,
    pub credential_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wss_port: Option<u16>,
}

impl GatewayRecord {
    pub fn rank_score(&self) -> f64 {
        self.capacity.rank_score()
    }
}

/// Caller-supplied fields of a gateway registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayRegistration {
    pub ip: String,
    pub port: u16,
    #[serde(default)]
    pub capacity: Capacity,
    pub credential_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wss_port: Option<u16>,
}

impl GatewayRegistration {
    /// Validate the required fields and return the socket address.
    fn socket_addr(&self) -> StateResult<SocketAddr> {
        if self.ip.is_empty() {
            return Err(StateError::validation("ip", "must not be empty"));
        }
        let ip: IpAddr = self
            .ip
            .parse()
            .map_err(|_| StateError::validation("ip", format!("{:?} is not an IP address", self.ip)))?;
        if self.port == 0 {
            return Err(StateError::validation("port", "must not be zero"));
        }
        if self.credential_hash.is_empty() {
            return Err(StateError::validation("credential_hash", "must not be empty"));
        }
        Ok(SocketAddr::new(ip, self.port))
    }

    /// Validate the required fields and return the composed address.
    ///
    /// IPv6 addresses are bracketed (`[::1]:9000`).
    pub fn address(&self) -> StateResult<GatewayKey> {
        Ok(self.socket_addr()?.to_string())
    }

    /// Build the record this registration produces for a fresh key.
    ///
    /// `ip` is stored in canonical form so it always matches `address`.
    pub fn into_record(self) -> StateResult<GatewayRecord> {
        let socket = self.socket_addr()?;
        let address = socket.to_string();
        let id = derive_identity(&self.credential_hash, &address);
        Ok(GatewayRecord {
            id,
            ip: socket.ip().to_string(),
            port: self.port,
            address,
            capacity: self.capacity,
            credential_hash: self.credential_hash,
            wss_port: self.wss_port,
        })
    }
}

// ── Agent ─────────────────────────────────────────────────────────

/// A client bound to one gateway.
///
/// The gateway fields are a snapshot taken at bind time so reads need no
/// join against the gateway map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub id: String,
    pub domain: String,
    pub credential_hash: String,
    pub gateway_id: String,
    pub gateway_ip: String,
    pub gateway_address: GatewayKey,
}

/// Caller-supplied fields of an agent registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRegistration {
    pub domain: String,
    /// Address key of the gateway to bind to.
    pub gateway_key: GatewayKey,
    pub credential_hash: String,
}

impl AgentRegistration {
    pub fn validate(&self) -> StateResult<()> {
        if self.domain.is_empty() {
            return Err(StateError::validation("domain", "must not be empty"));
        }
        if self.gateway_key.is_empty() {
            return Err(StateError::validation("gateway_key", "must not be empty"));
        }
        if self.credential_hash.is_empty() {
            return Err(StateError::validation("credential_hash", "must not be empty"));
        }
        Ok(())
    }

    /// Build the agent record bound to `gateway`.
    pub(crate) fn bind(self, gateway: &GatewayRecord) -> AgentRecord {
        AgentRecord {
            id: derive_identity(&self.credential_hash, &self.domain),
            domain: self.domain,
            credential_hash: self.credential_hash,
            gateway_id: gateway.id.clone(),
            gateway_ip: gateway.ip.clone(),
            gateway_address: gateway.address.clone(),
        }
    }
}

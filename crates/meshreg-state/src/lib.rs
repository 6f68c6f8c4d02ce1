//! meshreg-state — in-memory registry of gateways and agents.
//!
//! State is partitioned by region. Each region bucket owns a gateway map,
//! an agent map and a capacity ranking index behind its own reader/writer
//! lock, so traffic for different regions never contends.
//!
//! # Architecture
//!
//! ```text
//! Registry
//!   └── RegionStore (RwLock<HashMap<region, Arc<RegionBucket>>>)
//!       └── RegionBucket (RwLock<RegionData>)
//!           ├── gateways: address → GatewayRecord
//!           ├── agents:   domain  → AgentRecord
//!           └── ranked:   RankIndex<address>
//! ```
//!
//! The crate performs no I/O. Durability is layered on top by
//! `meshreg-wal`, which drives the same [`Registry`] operations on replay.

pub mod error;
pub mod rank;
pub mod region;
pub mod store;
pub mod types;

pub use error::{ErrorCode, StateError, StateResult};
pub use rank::{RankIndex, RankItem, RankOrder, Score};
pub use region::{RegionBucket, RegionStore};
pub use store::{RegionSnapshot, RegionSummary, Registry, RegistrySnapshot};
pub use types::*;

//! meshreg-wal — write-ahead log for the meshreg registry.
//!
//! Every accepted mutation is framed, checksummed and flushed to an
//! append-only file before it becomes visible. On startup the log is read
//! back from the beginning and each record is re-applied through the same
//! [`Registry`](meshreg_state::Registry) operations live traffic uses.
//!
//! # Frame layout
//!
//! ```text
//! [magic u16 BE = 0xCAFE][version u8 = 1][op u8][len u32 BE]
//! [payload: len bytes of JSON]
//! [crc32 u32 BE over payload, IEEE]
//! ```
//!
//! Op codes are `PUT_GATEWAY = 1` and `PUT_AGENT = 2`.

pub mod error;
pub mod frame;
pub mod record;
pub mod replay;
pub mod writer;

pub use error::{WalError, WalResult};
pub use record::{AgentEntry, GatewayEntry, Op, WalRecord};
pub use replay::{ReplayStats, apply_record, replay_reader};
pub use writer::{LogFile, Wal, WalGuard, WalOptions};

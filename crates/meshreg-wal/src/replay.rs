//! Startup recovery.
//!
//! Replay walks the log front to back and stops at the first frame that
//! fails to read or apply. There is no rollback: records before the
//! failure remain applied, and the caller decides whether to continue.

use std::io::Read;

use meshreg_state::{Registry, StateResult};
use tracing::debug;

use crate::error::{WalError, WalResult};
use crate::frame::FrameReader;
use crate::record::WalRecord;

/// Outcome of a successful replay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    /// Records read and applied.
    pub records: u64,
    /// Bytes consumed, which is the offset of the end of the last frame.
    pub bytes: u64,
}

/// Feed every record in `reader` to `apply` in log order.
pub fn replay_reader<R, F>(reader: R, mut apply: F) -> WalResult<ReplayStats>
where
    R: Read,
    F: FnMut(WalRecord) -> StateResult<()>,
{
    let mut frames = FrameReader::new(reader);
    let mut stats = ReplayStats::default();

    while let Some((offset, record)) = frames.next_frame()? {
        debug!(offset, op = ?record.op(), region = record.region(), "replaying wal record");
        apply(record).map_err(|source| WalError::Apply { offset, source })?;
        stats.records += 1;
    }

    stats.bytes = frames.offset();
    Ok(stats)
}

/// Apply one record through the registry's public write path.
pub fn apply_record(registry: &Registry, record: WalRecord) -> StateResult<()> {
    match record {
        WalRecord::PutGateway(entry) => {
            registry.add_gateway(&entry.region, entry.registration())?;
        }
        WalRecord::PutAgent(entry) => {
            registry.add_agent(&entry.region, entry.registration())?;
        }
    }
    Ok(())
}

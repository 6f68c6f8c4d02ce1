//! WAL error types.

use std::io;

use meshreg_state::StateError;
use thiserror::Error;

/// Result type alias for WAL operations.
pub type WalResult<T> = Result<T, WalError>;

/// Errors raised while appending to or replaying the log.
#[derive(Debug, Error)]
pub enum WalError {
    #[error("wal i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("failed to encode wal record: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("wal payload of {len} bytes exceeds the frame limit")]
    PayloadTooLarge { len: usize },

    #[error("wal corruption at offset {offset}: {reason}")]
    Corrupt { offset: u64, reason: String },

    #[error("unsupported wal frame version {version} at offset {offset}")]
    UnsupportedVersion { offset: u64, version: u8 },

    #[error("unknown wal op code {op} at offset {offset}")]
    UnknownOp { offset: u64, op: u8 },

    #[error("truncated wal frame at offset {offset}")]
    Truncated { offset: u64 },

    #[error("wal is closed")]
    Closed,

    #[error("failed to apply wal record at offset {offset}: {source}")]
    Apply {
        offset: u64,
        #[source]
        source: StateError,
    },
}

impl WalError {
    /// Whether the on-disk log cannot be read past this point and needs an
    /// operator.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::Corrupt { .. }
                | Self::UnsupportedVersion { .. }
                | Self::UnknownOp { .. }
                | Self::Truncated { .. }
        )
    }

    /// Byte offset of the offending frame, for replay errors.
    pub fn offset(&self) -> Option<u64> {
        match self {
            Self::Corrupt { offset, .. }
            | Self::UnsupportedVersion { offset, .. }
            | Self::UnknownOp { offset, .. }
            | Self::Truncated { offset }
            | Self::Apply { offset, .. } => Some(*offset),
            Self::Io(_) | Self::Encode(_) | Self::PayloadTooLarge { .. } | Self::Closed => None,
        }
    }
}

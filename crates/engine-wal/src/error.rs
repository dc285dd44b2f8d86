use std::io;

use thiserror::Error;

/// Errors from reading, writing or repairing a WAL file.
///
/// Offsets are the byte position of the start of the offending record.
#[derive(Debug, Error)]
pub enum WalError {
    #[error("wal i/o: {0}")]
    Io(#[from] io::Error),

    /// Stored CRC does not match the payload: the file is corrupt.
    #[error("wal: checksum mismatch in record at offset {offset}")]
    ChecksumMismatch { offset: u64 },

    #[error("wal: payload of {len} bytes at offset {offset} exceeds limit {max}")]
    PayloadTooLarge { offset: u64, len: usize, max: usize },

    /// File ends inside a record header.
    #[error("wal: truncated header at offset {offset}")]
    TruncatedHeader { offset: u64 },

    /// File ends inside a record payload.
    #[error("wal: truncated payload at offset {offset}")]
    TruncatedPayload { offset: u64 },
}

impl WalError {
    /// `true` for the errors a crash mid-append can leave behind.
    pub fn is_truncation(&self) -> bool {
        matches!(
            self,
            WalError::TruncatedHeader { .. } | WalError::TruncatedPayload { .. }
        )
    }

    /// `true` if the file being opened does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, WalError::Io(e) if e.kind() == io::ErrorKind::NotFound)
    }
}

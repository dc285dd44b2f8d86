//! engine-wal
//!
//! Generic write-ahead log used for both the command log and the event
//! outbox. Payloads are opaque; each record on disk is
//!
//! ```text
//! [u32 LE payload length][u32 LE CRC-32 (IEEE) of payload][payload]
//! ```
//!
//! - [`writer`] : buffered appends, group-commit `flush` (+ fsync)
//! - [`reader`] : streaming reader from any record boundary
//! - [`replay`] : one-shot scan of a whole file
//! - [`truncate_to`] : cut a file back to a verified boundary

pub mod error;
pub mod frame;
pub mod reader;
pub mod replay;
pub mod writer;

use std::fs::OpenOptions;
use std::io;
use std::path::Path;

use tracing::info;

pub use error::WalError;
pub use frame::{DEFAULT_MAX_PAYLOAD, HEADER_SIZE};
pub use reader::{ReaderOptions, WalReader};
pub use replay::{replay, ReplayStats};
pub use writer::WalWriter;

/// Shrink the file at `path` to `offset` bytes and fsync it.
///
/// No-op if the file does not exist or is already at most `offset` long.
pub fn truncate_to(path: &Path, offset: u64) -> Result<(), WalError> {
    let len = match std::fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    if offset >= len {
        return Ok(());
    }

    let file = OpenOptions::new().write(true).open(path)?;
    file.set_len(offset)?;
    file.sync_all()?;

    info!(path = %path.display(), from = len, to = offset, "wal truncated");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_missing_file_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.wal");
        truncate_to(&path, 0).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn truncate_never_grows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.wal");
        std::fs::write(&path, b"0123456789").unwrap();

        truncate_to(&path, 20).unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 10);

        truncate_to(&path, 4).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"0123");
    }
}

//! Whole-file replay.

use std::path::Path;

use crate::error::WalError;
use crate::reader::{ReaderOptions, WalReader};

/// What a replay saw.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    /// Records handed to the callback successfully.
    pub records: u64,
    /// End of the last verified record.
    pub last_good_offset: u64,
    /// A torn final record was found (and tolerated).
    pub truncated_tail: bool,
}

/// Feed every record of `path` to `on_record(payload, end_offset)` in order.
///
/// A missing file replays zero records. A checksum mismatch or oversized
/// length aborts with the error; a torn tail aborts too unless
/// `opts.allow_truncated_tail` is set. An error from the callback aborts
/// the replay and is returned as-is.
pub fn replay<F, E>(path: &Path, opts: ReaderOptions, mut on_record: F) -> Result<ReplayStats, E>
where
    F: FnMut(&[u8], u64) -> Result<(), E>,
    E: From<WalError>,
{
    let mut stats = ReplayStats::default();

    let mut reader = match WalReader::open(path, 0, opts) {
        Ok(r) => r,
        Err(e) if e.is_not_found() => return Ok(stats),
        Err(e) => return Err(e.into()),
    };

    while let Some((payload, end)) = reader.next_record()? {
        on_record(&payload, end)?;
        stats.records += 1;
        stats.last_good_offset = end;
    }

    stats.truncated_tail = reader.truncated_tail();
    Ok(stats)
}

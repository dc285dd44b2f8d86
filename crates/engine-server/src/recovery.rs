//! Startup recovery of one symbol.
//!
//! Order matters:
//! 1. cut the outbox back to its last `CmdEnd` (drops dangling events);
//! 2. replay the command WAL into a fresh book; commands the outbox already
//!    completed are applied silently, later ones regenerate their events
//!    and `CmdEnd` into the outbox;
//! 3. cut a torn command-WAL tail so new appends start on a boundary;
//! 4. reopen the command WAL for appends.

use std::fs;
use std::path::Path;

use engine_core::{apply_command, NoopEmitter, OrderBook};
use engine_protocol::RecordCodec;
use engine_wal::{replay, truncate_to, ReaderOptions, WalWriter};
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::error::RecoveryError;
use crate::outbox::{scan_and_repair, EventOutbox, Outbox, OutboxEmitter, OutboxScan};
use crate::types::SymbolPaths;

/// Recovered state, ready to hand to an actor.
#[derive(Debug)]
pub struct Recovered<C> {
    /// Highest sequence known to be logged; the actor continues after it.
    pub last_seq: u64,
    pub log: WalWriter,
    pub outbox: EventOutbox<C>,
    pub report: RecoveryReport,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    pub outbox: OutboxScan,
    /// Commands replayed from the WAL.
    pub replayed: u64,
    /// Commands whose events were written again.
    pub backfilled: u64,
    /// Bytes cut off a torn command-WAL tail.
    pub wal_truncated_bytes: u64,
}

/// Rebuild `book` from disk and reconcile the outbox with it.
pub fn recover_symbol<B, C>(
    symbol: &str,
    paths: &SymbolPaths,
    cfg: &EngineConfig,
    codec: &C,
    book: &mut B,
) -> Result<Recovered<C>, RecoveryError>
where
    B: OrderBook + ?Sized,
    C: RecordCodec,
{
    if let Some(dir) = paths.wal.parent() {
        fs::create_dir_all(dir)?;
    }

    let scan = scan_and_repair(codec, &paths.outbox, cfg.max_payload)?;
    let mut outbox = EventOutbox::open(&paths.outbox, cfg.outbox_buf_size, codec.clone())?;

    let mut report = RecoveryReport {
        outbox: scan,
        ..RecoveryReport::default()
    };
    let mut last_seq = scan.last_complete_seq;

    let opts = ReaderOptions::default()
        .tolerate_tail()
        .with_max_payload(cfg.max_payload);
    let stats = replay(&paths.wal, opts, |payload, end| {
        let (seq, cmd) = codec
            .decode_command(payload)
            .map_err(|source| RecoveryError::Decode {
                file: "command wal",
                offset: end,
                source,
            })?;

        if seq <= scan.last_complete_seq {
            apply_command(book, &cmd, &mut NoopEmitter);
        } else {
            let mut emit = OutboxEmitter::new(&mut outbox, seq, cmd.req_id);
            apply_command(book, &cmd, &mut emit);
            emit.finish()?;
            report.backfilled += 1;
        }
        report.replayed += 1;
        last_seq = last_seq.max(seq);
        Ok::<(), RecoveryError>(())
    })?;
    outbox.flush()?;

    if stats.truncated_tail {
        report.wal_truncated_bytes = file_len(&paths.wal)?.saturating_sub(stats.last_good_offset);
        warn!(
            symbol,
            to = stats.last_good_offset,
            dropped_bytes = report.wal_truncated_bytes,
            "command wal has a torn tail; truncating"
        );
        truncate_to(&paths.wal, stats.last_good_offset)?;
    }

    let log = WalWriter::open(&paths.wal, cfg.wal_buf_size)?;

    info!(
        symbol,
        replayed = report.replayed,
        backfilled = report.backfilled,
        last_complete_seq = scan.last_complete_seq,
        start_seq = last_seq,
        "symbol recovered"
    );

    Ok(Recovered {
        last_seq,
        log,
        outbox,
        report,
    })
}

fn file_len(path: &Path) -> Result<u64, RecoveryError> {
    Ok(fs::metadata(path)?.len())
}

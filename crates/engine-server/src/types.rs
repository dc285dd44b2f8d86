//! Shared types for the engine runtime.
//!
//! This module defines:
//! - channel aliases between callers and symbol actors
//! - `PublishedEvent`: what the outbox publisher puts on the bus
//! - `SymbolPaths`: where a symbol's files live

use std::path::{Path, PathBuf};
use std::sync::Arc;

use engine_core::{Command, Event};
use tokio::sync::mpsc;

/// Commands flowing from callers into one symbol's actor.
pub type MailboxTx = mpsc::Sender<Command>;
pub type MailboxRx = mpsc::Receiver<Command>;

/// An outbox event republished to the bus.
///
/// Delivery is at-least-once; `(symbol, event.seq, event.idx)` identifies
/// an event for deduplication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedEvent {
    pub symbol: Arc<str>,
    pub event: Event,
}

impl PublishedEvent {
    pub fn dedup_key(&self) -> (&str, u64, u16) {
        (&self.symbol, self.event.seq, self.event.idx)
    }
}

/// On-disk locations for one symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolPaths {
    /// Command WAL: `<symbol>.wal`
    pub wal: PathBuf,
    /// Event outbox: `<symbol>.ev.wal`
    pub outbox: PathBuf,
    /// Publisher cursor: `<symbol>.ev.cursor`
    pub cursor: PathBuf,
}

impl SymbolPaths {
    pub fn new(dir: &Path, symbol: &str) -> Self {
        let base = sanitize_symbol(symbol);
        SymbolPaths {
            wal: dir.join(format!("{base}.wal")),
            outbox: dir.join(format!("{base}.ev.wal")),
            cursor: dir.join(format!("{base}.ev.cursor")),
        }
    }
}

/// File-name form of a symbol: anything outside `[A-Za-z0-9_-]` becomes `_`.
pub fn sanitize_symbol(symbol: &str) -> String {
    symbol
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

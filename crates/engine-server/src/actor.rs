//! Symbol actor.
//!
//! One actor owns one symbol's book, command log and outbox, and is the
//! only code that touches them. It runs on its own OS thread:
//!
//! 1. block for one command (or the shutdown token), then drain whatever else is already queued
//!    (up to `batch_max`) without blocking;
//! 2. assign sequence numbers, append every command to the command log and
//!    flush once (group commit);
//! 3. only then apply each command to the book, writing its events and a
//!    `CmdEnd` to the outbox; flush the outbox once and wake the publisher.
//!
//! Any log failure stops the actor (fail closed). The mailbox closes with
//! it, so later submissions see `Halted`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use engine_core::{apply_command, Command, OrderBook};
use engine_protocol::CommandCodec;
use engine_wal::{WalError, WalWriter};
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::ActorError;
use crate::outbox::{Outbox, OutboxEmitter};
use crate::types::{MailboxRx, MailboxTx};

/// Durable command log as seen by the actor.
pub trait CommandLog: Send {
    fn append(&mut self, payload: &[u8]) -> Result<(), WalError>;
    /// Flush and fsync everything appended so far.
    fn flush(&mut self) -> Result<(), WalError>;
}

impl CommandLog for WalWriter {
    fn append(&mut self, payload: &[u8]) -> Result<(), WalError> {
        WalWriter::append(self, payload).map(|_| ())
    }

    fn flush(&mut self) -> Result<(), WalError> {
        WalWriter::flush(self)
    }
}

/// Counters shared between an actor and its handle.
#[derive(Debug, Default)]
pub struct ActorStats {
    mailbox_full: AtomicU64,
    commands: AtomicU64,
    batches: AtomicU64,
    last_seq: AtomicU64,
}

impl ActorStats {
    pub fn mailbox_full(&self) -> u64 {
        self.mailbox_full.load(Ordering::Relaxed)
    }

    pub fn commands(&self) -> u64 {
        self.commands.load(Ordering::Relaxed)
    }

    pub fn batches(&self) -> u64 {
        self.batches.load(Ordering::Relaxed)
    }

    /// Sequence of the last command durably logged.
    pub fn last_seq(&self) -> u64 {
        self.last_seq.load(Ordering::Relaxed)
    }

    pub(crate) fn record_mailbox_full(&self) {
        self.mailbox_full.fetch_add(1, Ordering::Relaxed);
    }
}

/// Why the run loop ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorExit {
    /// Every sender was dropped and the mailbox drained.
    MailboxClosed,
    /// The shared shutdown token fired.
    Cancelled,
}

enum Wake {
    Command(Command),
    Closed,
    Cancelled,
}

pub struct SymbolActor<B, C, L, O> {
    symbol: Arc<str>,
    book: B,
    codec: C,
    log: L,
    outbox: O,
    /// Last sequence assigned.
    seq: u64,
    batch_max: usize,
    rx: MailboxRx,
    notify: Option<Arc<Notify>>,
    token: CancellationToken,
    stats: Arc<ActorStats>,
    batch: Vec<Command>,
    scratch: Vec<u8>,
}

/// Everything an actor needs besides its book and logs.
pub struct ActorParts {
    pub symbol: Arc<str>,
    /// Sequence of the last command already in the log.
    pub last_seq: u64,
    pub batch_max: usize,
    pub mailbox_size: usize,
    pub notify: Option<Arc<Notify>>,
    pub token: CancellationToken,
}

impl<B, C, L, O> SymbolActor<B, C, L, O>
where
    B: OrderBook + Send,
    C: CommandCodec + Send,
    L: CommandLog,
    O: Outbox,
{
    /// Build an actor and the sending half of its mailbox.
    pub fn new(parts: ActorParts, book: B, codec: C, log: L, outbox: O) -> (Self, MailboxTx, Arc<ActorStats>) {
        let (tx, rx) = mpsc::channel(parts.mailbox_size.max(1));
        let stats = Arc::new(ActorStats::default());
        stats.last_seq.store(parts.last_seq, Ordering::Relaxed);
        let batch_max = parts.batch_max.max(1);

        let actor = SymbolActor {
            symbol: parts.symbol,
            book,
            codec,
            log,
            outbox,
            seq: parts.last_seq,
            batch_max,
            rx,
            notify: parts.notify,
            token: parts.token,
            stats: Arc::clone(&stats),
            batch: Vec::with_capacity(batch_max),
            scratch: Vec::with_capacity(128),
        };
        (actor, tx, stats)
    }

    /// Process commands until the mailbox closes, the token fires, or a
    /// log fails.
    pub fn run(mut self) -> Result<ActorExit, ActorError> {
        let exit = loop {
            if self.token.is_cancelled() {
                break ActorExit::Cancelled;
            }

            let first = match self.next_command() {
                Wake::Command(cmd) => cmd,
                Wake::Closed => break ActorExit::MailboxClosed,
                Wake::Cancelled => break ActorExit::Cancelled,
            };
            self.batch.push(first);
            while self.batch.len() < self.batch_max {
                match self.rx.try_recv() {
                    Ok(cmd) => self.batch.push(cmd),
                    Err(_) => break,
                }
            }

            if let Err(e) = self.process_batch() {
                error!(symbol = %self.symbol, error = %e, seq = self.seq, "actor stopping after durability failure");
                return Err(e);
            }
        };

        // Everything applied is already flushed; this only surfaces
        // errors from the final sync.
        self.log.flush().map_err(ActorError::CommandFlush)?;
        self.outbox.flush().map_err(ActorError::OutboxFlush)?;
        info!(symbol = %self.symbol, seq = self.seq, reason = ?exit, "actor stopped");
        Ok(exit)
    }

    /// Block this thread until a command arrives, the mailbox closes, or
    /// the token fires. Cancellation wins over queued commands.
    fn next_command(&mut self) -> Wake {
        let token = &self.token;
        let rx = &mut self.rx;
        futures::executor::block_on(async {
            tokio::select! {
                biased;
                _ = token.cancelled() => Wake::Cancelled,
                cmd = rx.recv() => match cmd {
                    Some(cmd) => Wake::Command(cmd),
                    None => Wake::Closed,
                },
            }
        })
    }

    fn process_batch(&mut self) -> Result<(), ActorError> {
        let mut batch = std::mem::take(&mut self.batch);
        let first_seq = self.seq + 1;

        for (i, cmd) in batch.iter().enumerate() {
            self.scratch.clear();
            self.codec
                .encode_command(first_seq + i as u64, cmd, &mut self.scratch);
            self.log
                .append(&self.scratch)
                .map_err(ActorError::CommandAppend)?;
        }
        self.log.flush().map_err(ActorError::CommandFlush)?;

        self.seq += batch.len() as u64;
        self.stats.last_seq.store(self.seq, Ordering::Relaxed);

        for (i, cmd) in batch.iter().enumerate() {
            let seq = first_seq + i as u64;
            let mut emit = OutboxEmitter::new(&mut self.outbox, seq, cmd.req_id);
            apply_command(&mut self.book, cmd, &mut emit);
            emit.finish().map_err(ActorError::OutboxAppend)?;
        }
        self.outbox.flush().map_err(ActorError::OutboxFlush)?;

        if let Some(notify) = &self.notify {
            notify.notify_one();
        }

        debug!(symbol = %self.symbol, first_seq, count = batch.len(), "batch committed");
        self.stats
            .commands
            .fetch_add(batch.len() as u64, Ordering::Relaxed);
        self.stats.batches.fetch_add(1, Ordering::Relaxed);

        batch.clear();
        self.batch = batch;
        Ok(())
    }
}

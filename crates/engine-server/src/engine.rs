//! Symbol registry.
//!
//! The engine maps each symbol to its running actor (and publisher). A
//! symbol's state is created on first use: build a book, recover it from
//! disk, then start the actor thread and the publisher task.
//!
//! Lookups take the read lock; creation re-checks under the write lock, so
//! a symbol is recovered exactly once even when many callers race on it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use engine_core::{Command, OrderBook};
use engine_protocol::RecordCodec;
use parking_lot::RwLock;
use tokio::runtime::{Handle, TryCurrentError};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::actor::{ActorExit, ActorParts, ActorStats, SymbolActor};
use crate::bus::EventBus;
use crate::config::EngineConfig;
use crate::error::{ActorError, RecoveryError, SubmitError};
use crate::publisher::OutboxPublisher;
use crate::recovery::recover_symbol;
use crate::types::{sanitize_symbol, MailboxTx, SymbolPaths};

/// Builds an empty book for a symbol; `None` means the symbol is not traded.
pub type BookFactory<B> = Arc<dyn Fn(&str) -> Option<B> + Send + Sync>;

struct SymbolHandle {
    tx: MailboxTx,
    stats: Arc<ActorStats>,
    actor: thread::JoinHandle<Result<ActorExit, ActorError>>,
    publisher: Option<JoinHandle<u64>>,
}

pub struct Engine<B, C, E> {
    cfg: EngineConfig,
    codec: C,
    bus: Arc<E>,
    factory: BookFactory<B>,
    symbols: RwLock<HashMap<String, SymbolHandle>>,
    token: CancellationToken,
    runtime: Handle,
    closed: AtomicBool,
}

impl<B, C, E> Engine<B, C, E>
where
    B: OrderBook + Send + 'static,
    C: RecordCodec,
    E: EventBus,
{
    /// Create an engine bound to the current tokio runtime (publishers run
    /// there; actors get their own threads).
    pub fn new<F>(cfg: EngineConfig, codec: C, bus: Arc<E>, factory: F) -> Result<Self, TryCurrentError>
    where
        F: Fn(&str) -> Option<B> + Send + Sync + 'static,
    {
        Ok(Engine {
            cfg,
            codec,
            bus,
            factory: Arc::new(factory),
            symbols: RwLock::new(HashMap::new()),
            token: CancellationToken::new(),
            runtime: Handle::try_current()?,
            closed: AtomicBool::new(false),
        })
    }

    /// Enqueue a limit order. Never blocks: a full mailbox is `Busy`.
    pub fn submit(&self, symbol: &str, cmd: Command) -> Result<(), SubmitError> {
        if !cmd.is_submit() {
            return Err(SubmitError::BadCommand);
        }
        self.enqueue(symbol, cmd)
    }

    /// Enqueue a cancel. Never blocks: a full mailbox is `Busy`.
    pub fn cancel(&self, symbol: &str, cmd: Command) -> Result<(), SubmitError> {
        if !cmd.is_cancel() {
            return Err(SubmitError::BadCommand);
        }
        self.enqueue(symbol, cmd)
    }

    fn enqueue(&self, symbol: &str, cmd: Command) -> Result<(), SubmitError> {
        let (tx, stats) = self.mailbox(symbol)?;
        match tx.try_send(cmd) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                stats.record_mailbox_full();
                debug!(symbol, "mailbox full; rejecting");
                Err(SubmitError::Busy)
            }
            Err(TrySendError::Closed(_)) => Err(SubmitError::Halted),
        }
    }

    fn mailbox(&self, symbol: &str) -> Result<(MailboxTx, Arc<ActorStats>), SubmitError> {
        if symbol.is_empty() {
            return Err(SubmitError::UnknownSymbol);
        }
        if self.closed.load(Ordering::Acquire) {
            return Err(SubmitError::Halted);
        }

        if let Some(h) = self.symbols.read().get(symbol) {
            return Ok((h.tx.clone(), Arc::clone(&h.stats)));
        }

        let mut symbols = self.symbols.write();
        if let Some(h) = symbols.get(symbol) {
            return Ok((h.tx.clone(), Arc::clone(&h.stats)));
        }
        // Re-check under the lock: shutdown drains the map while holding it.
        if self.closed.load(Ordering::Acquire) {
            return Err(SubmitError::Halted);
        }
        let handle = self.start_symbol(symbol)?;
        let out = (handle.tx.clone(), Arc::clone(&handle.stats));
        symbols.insert(symbol.to_owned(), handle);
        Ok(out)
    }

    fn start_symbol(&self, symbol: &str) -> Result<SymbolHandle, SubmitError> {
        let mut book = (self.factory)(symbol).ok_or(SubmitError::UnknownSymbol)?;
        let paths = SymbolPaths::new(&self.cfg.wal_dir, symbol);
        let rec = recover_symbol(symbol, &paths, &self.cfg, &self.codec, &mut book)?;

        let name: Arc<str> = Arc::from(symbol);
        let notify = self.cfg.enable_publisher.then(|| Arc::new(Notify::new()));
        let parts = ActorParts {
            symbol: Arc::clone(&name),
            last_seq: rec.last_seq,
            batch_max: self.cfg.batch_max,
            mailbox_size: self.cfg.mailbox_size,
            notify: notify.clone(),
            token: self.token.clone(),
        };
        let (actor, tx, stats) = SymbolActor::new(parts, book, self.codec.clone(), rec.log, rec.outbox);

        let actor = thread::Builder::new()
            .name(format!("actor-{}", sanitize_symbol(symbol)))
            .spawn(move || actor.run())
            .map_err(RecoveryError::Io)?;

        let publisher = notify.map(|notify| {
            let publisher = OutboxPublisher::new(
                Arc::clone(&name),
                &paths,
                self.codec.clone(),
                Arc::clone(&self.bus),
                notify,
                self.cfg.publisher_poll,
                self.cfg.max_payload,
                self.token.clone(),
            );
            self.runtime.spawn(publisher.run())
        });

        info!(
            symbol,
            start_seq = rec.last_seq,
            publisher = publisher.is_some(),
            "symbol started"
        );
        Ok(SymbolHandle {
            tx,
            stats,
            actor,
            publisher,
        })
    }

    /// Counters of a running symbol.
    pub fn stats(&self, symbol: &str) -> Option<Arc<ActorStats>> {
        self.symbols
            .read()
            .get(symbol)
            .map(|h| Arc::clone(&h.stats))
    }

    /// Mailbox-full rejections across all symbols.
    pub fn mailbox_full(&self) -> u64 {
        self.symbols
            .read()
            .values()
            .map(|h| h.stats.mailbox_full())
            .sum()
    }

    /// Symbols with running state, sorted.
    pub fn symbols(&self) -> Vec<String> {
        let mut out: Vec<String> = self.symbols.read().keys().cloned().collect();
        out.sort();
        out
    }

    /// Stop every symbol.
    ///
    /// Mailboxes close first so actors commit what was already queued and
    /// close their logs; then the token fires and publishers drain the
    /// outbox and exit.
    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::Release);
        let handles: Vec<(String, SymbolHandle)> = self.symbols.write().drain().collect();

        let mut publishers = Vec::with_capacity(handles.len());
        for (symbol, h) in handles {
            drop(h.tx);
            let actor = h.actor;
            match tokio::task::spawn_blocking(move || actor.join()).await {
                Ok(Ok(Ok(exit))) => debug!(symbol = %symbol, ?exit, "actor joined"),
                Ok(Ok(Err(e))) => error!(symbol = %symbol, error = %e, "actor had failed"),
                Ok(Err(_)) => error!(symbol = %symbol, "actor thread panicked"),
                Err(e) => warn!(symbol = %symbol, error = %e, "could not join actor"),
            }
            if let Some(p) = h.publisher {
                publishers.push((symbol, p));
            }
        }

        self.token.cancel();
        for (symbol, p) in publishers {
            match p.await {
                Ok(committed) => debug!(symbol = %symbol, committed, "publisher joined"),
                Err(e) => warn!(symbol = %symbol, error = %e, "publisher task failed"),
            }
        }
        info!("engine stopped");
    }
}

impl<B, C, E> Drop for Engine<B, C, E> {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

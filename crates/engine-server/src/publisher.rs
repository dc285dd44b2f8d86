//! Outbox publisher.
//!
//! Tails one symbol's outbox and republishes business events to the bus.
//! The cursor file holds the offset just past the last `CmdEnd` whose
//! events were all published; it only moves on `CmdEnd`, so a restart
//! resumes on a command boundary. Events between the cursor and a crash
//! are published again (at-least-once).

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use engine_protocol::EventCodec;
use engine_wal::{ReaderOptions, WalError, WalReader};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::bus::EventBus;
use crate::outbox::{load_cursor, store_cursor};
use crate::types::{PublishedEvent, SymbolPaths};

/// The reader is reopened on every idle wake-up, so keep it small.
const READ_BUF: usize = 64 * 1024;

/// Records pulled per blocking read.
const READ_CHUNK: usize = 256;

pub struct OutboxPublisher<C, E: ?Sized> {
    symbol: Arc<str>,
    outbox: PathBuf,
    cursor: PathBuf,
    codec: C,
    bus: Arc<E>,
    notify: Arc<Notify>,
    poll: Duration,
    max_payload: usize,
    token: CancellationToken,
}

/// Records read off the outbox in one blocking call.
struct Chunk {
    records: Vec<(Vec<u8>, u64)>,
    end: ChunkEnd,
}

enum ChunkEnd {
    /// The chunk filled up; the reader has more.
    More(WalReader),
    /// Nothing more right now.
    Idle,
    /// Drop the reader and resume from the last cursor.
    Failed(WalError),
}

/// Read up to [`READ_CHUNK`] records. A torn record at the live end means
/// the actor is mid-write and is treated as the end.
fn read_chunk(mut reader: WalReader) -> Chunk {
    let mut records = Vec::new();
    while records.len() < READ_CHUNK {
        let end = match reader.next_record() {
            Ok(Some(rec)) => {
                records.push(rec);
                continue;
            }
            Ok(None) => ChunkEnd::Idle,
            Err(e) if e.is_truncation() => ChunkEnd::Idle,
            Err(e) => ChunkEnd::Failed(e),
        };
        return Chunk { records, end };
    }
    Chunk {
        records,
        end: ChunkEnd::More(reader),
    }
}

/// Run file work on the blocking pool.
async fn blocking<T, F>(f: F) -> io::Result<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(io::Error::other)
}

impl<C, E> OutboxPublisher<C, E>
where
    C: EventCodec + Send + Sync + 'static,
    E: EventBus + ?Sized,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        symbol: Arc<str>,
        paths: &SymbolPaths,
        codec: C,
        bus: Arc<E>,
        notify: Arc<Notify>,
        poll: Duration,
        max_payload: usize,
        token: CancellationToken,
    ) -> Self {
        OutboxPublisher {
            symbol,
            outbox: paths.outbox.clone(),
            cursor: paths.cursor.clone(),
            codec,
            bus,
            notify,
            poll: if poll.is_zero() {
                Duration::from_millis(50)
            } else {
                poll
            },
            max_payload,
            token,
        }
    }

    /// Run until the token fires. Once cancelled, the publisher drains what
    /// is already in the outbox and then returns its committed offset (0 if
    /// the cursor file never became readable).
    ///
    /// All file access goes through the blocking pool; only publishing
    /// runs on the async worker.
    pub async fn run(self) -> u64 {
        let Some(mut committed) = self.initial_cursor().await else {
            return 0;
        };
        let mut stored = committed;
        let mut offset = committed;
        let mut reader: Option<WalReader> = None;

        loop {
            let draining = self.token.is_cancelled();

            let r = match reader.take() {
                Some(r) => r,
                None => match self.open_reader(offset).await {
                    Ok(r) => r,
                    Err(e) => {
                        if !e.is_not_found() {
                            warn!(symbol = %self.symbol, error = %e, "outbox open failed; retrying");
                        }
                        if draining {
                            break;
                        }
                        self.wait().await;
                        continue;
                    }
                },
            };

            let chunk = match blocking(move || read_chunk(r)).await {
                Ok(chunk) => chunk,
                Err(e) => Chunk {
                    records: Vec::new(),
                    end: ChunkEnd::Failed(WalError::Io(e)),
                },
            };

            let mut rewind = false;
            for (payload, end) in &chunk.records {
                if !self.handle(payload, *end, &mut offset, &mut committed).await {
                    rewind = true;
                    break;
                }
            }

            if committed != stored {
                match self.store(committed).await {
                    Ok(()) => stored = committed,
                    // Retried after the next read.
                    Err(e) => warn!(symbol = %self.symbol, error = %e, committed, "cursor store failed"),
                }
            }

            let end = if rewind { ChunkEnd::Idle } else { chunk.end };
            match end {
                ChunkEnd::More(r) => {
                    reader = Some(r);
                    continue;
                }
                // Reopen at the in-memory offset: a partially visible
                // record must be re-read from its start.
                ChunkEnd::Idle => {}
                ChunkEnd::Failed(e) => {
                    warn!(symbol = %self.symbol, error = %e, offset, "outbox read failed; rewinding");
                    rewind = true;
                }
            }
            if rewind {
                offset = committed;
            }
            if draining {
                break;
            }
            self.wait().await;
        }

        debug!(symbol = %self.symbol, committed, stored, "publisher stopped");
        committed
    }

    /// Publish one record. `false` means rewind to the cursor.
    async fn handle(&self, payload: &[u8], end: u64, offset: &mut u64, committed: &mut u64) -> bool {
        let ev = match self.codec.decode_event(payload) {
            Ok(ev) => ev,
            Err(e) => {
                warn!(symbol = %self.symbol, error = %e, offset = *offset, "outbox decode failed; rewinding");
                return false;
            }
        };

        if ev.is_cmd_end() {
            *committed = end;
            *offset = end;
            return true;
        }

        let published = PublishedEvent {
            symbol: Arc::clone(&self.symbol),
            event: ev,
        };
        if let Err(e) = self.bus.publish(published).await {
            warn!(symbol = %self.symbol, error = %e, seq = ev.seq, idx = ev.idx, "publish failed; rewinding");
            return false;
        }
        *offset = end;
        true
    }

    /// Stored cursor, clamped to the outbox length (the outbox may have
    /// been repaired below it). An unreadable cursor is retried until it
    /// reads or the token fires; starting from 0 instead would republish
    /// the whole outbox.
    async fn initial_cursor(&self) -> Option<u64> {
        loop {
            let cursor = self.cursor.clone();
            let outbox = self.outbox.clone();
            let res = blocking(move || {
                let stored = load_cursor(&cursor)?;
                let len = std::fs::metadata(&outbox).map(|m| m.len()).ok();
                Ok::<_, io::Error>((stored, len))
            })
            .await
            .and_then(|r| r);

            match res {
                Ok((stored, Some(len))) if stored > len => {
                    info!(symbol = %self.symbol, stored, clamped = len, "publish cursor past end of outbox; clamping");
                    if let Err(e) = self.store(len).await {
                        warn!(symbol = %self.symbol, error = %e, "cursor store failed");
                    }
                    return Some(len);
                }
                Ok((stored, _)) => return Some(stored),
                Err(e) => {
                    error!(symbol = %self.symbol, error = %e, cursor = %self.cursor.display(), "publish cursor unreadable");
                    if self.token.is_cancelled() {
                        return None;
                    }
                    self.wait().await;
                }
            }
        }
    }

    async fn open_reader(&self, offset: u64) -> Result<WalReader, WalError> {
        let path = self.outbox.clone();
        let opts = self.reader_options();
        blocking(move || WalReader::open(&path, offset, opts)).await?
    }

    async fn store(&self, offset: u64) -> io::Result<()> {
        let cursor = self.cursor.clone();
        blocking(move || store_cursor(&cursor, offset)).await?
    }

    fn reader_options(&self) -> ReaderOptions {
        ReaderOptions {
            buffer_size: READ_BUF,
            ..ReaderOptions::default().with_max_payload(self.max_payload)
        }
    }

    async fn wait(&self) {
        tokio::select! {
            _ = self.notify.notified() => {}
            _ = tokio::time::sleep(self.poll) => {}
            _ = self.token.cancelled() => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::ChanBus;
    use crate::error::PublishError;
    use crate::outbox::{EventOutbox, Outbox, OutboxEmitter};
    use async_trait::async_trait;
    use engine_core::{Emitter, EventKind};
    use engine_protocol::BinaryCodec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn write_commands(paths: &SymbolPaths, seqs: std::ops::RangeInclusive<u64>, complete: bool) -> u64 {
        let mut out = EventOutbox::open(&paths.outbox, 0, BinaryCodec).unwrap();
        for seq in seqs {
            let mut em = OutboxEmitter::new(&mut out, seq, seq);
            em.emit(EventKind::Accepted {
                order_id: seq,
                user_id: 1,
            });
            em.emit(EventKind::Added {
                order_id: seq,
                user_id: 1,
            });
            if complete {
                em.finish().unwrap();
            }
        }
        out.flush().unwrap();
        out.offset()
    }

    fn publisher<E: EventBus>(paths: &SymbolPaths, bus: Arc<E>, token: CancellationToken) -> OutboxPublisher<BinaryCodec, E> {
        OutboxPublisher::new(
            Arc::from("BTC"),
            paths,
            BinaryCodec,
            bus,
            Arc::new(Notify::new()),
            Duration::from_millis(5),
            0,
            token,
        )
    }

    #[tokio::test]
    async fn publishes_business_events_and_commits_on_cmd_end() {
        let dir = tempfile::tempdir().unwrap();
        let paths = SymbolPaths::new(dir.path(), "BTC");
        let end = write_commands(&paths, 1..=2, true);

        let bus = Arc::new(ChanBus::new(16));
        let mut rx = bus.subscribe().unwrap();
        let token = CancellationToken::new();
        token.cancel();

        let committed = publisher(&paths, bus, token).run().await;
        assert_eq!(committed, end);
        assert_eq!(load_cursor(&paths.cursor).unwrap(), end);

        let mut keys = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            assert!(!ev.event.is_cmd_end());
            keys.push((ev.event.seq, ev.event.idx));
        }
        assert_eq!(keys, vec![(1, 0), (1, 1), (2, 0), (2, 1)]);
    }

    #[tokio::test]
    async fn resumes_from_cursor() {
        let dir = tempfile::tempdir().unwrap();
        let paths = SymbolPaths::new(dir.path(), "BTC");
        write_commands(&paths, 1..=3, true);

        let bus = Arc::new(ChanBus::new(16));
        let mut rx = bus.subscribe().unwrap();
        let token = CancellationToken::new();
        token.cancel();
        let first = publisher(&paths, Arc::clone(&bus), token.clone()).run().await;
        while rx.try_recv().is_ok() {}

        // More commands after the restart point.
        let end = write_commands(&paths, 4..=4, true);
        let second = publisher(&paths, bus, token).run().await;
        assert!(second > first);
        assert_eq!(second, end);

        let seqs: Vec<u64> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|e| e.event.seq)
            .collect();
        assert_eq!(seqs, vec![4, 4]);
    }

    #[tokio::test]
    async fn incomplete_command_does_not_move_cursor() {
        let dir = tempfile::tempdir().unwrap();
        let paths = SymbolPaths::new(dir.path(), "BTC");
        let boundary = write_commands(&paths, 1..=1, true);
        write_commands(&paths, 2..=2, false);

        let bus = Arc::new(ChanBus::new(16));
        let _rx = bus.subscribe().unwrap();
        let token = CancellationToken::new();
        token.cancel();
        let committed = publisher(&paths, bus, token).run().await;
        assert_eq!(committed, boundary);
        assert_eq!(load_cursor(&paths.cursor).unwrap(), boundary);
    }

    #[tokio::test]
    async fn cursor_past_end_is_clamped() {
        let dir = tempfile::tempdir().unwrap();
        let paths = SymbolPaths::new(dir.path(), "BTC");
        let end = write_commands(&paths, 1..=1, true);
        store_cursor(&paths.cursor, end + 1000).unwrap();

        let bus = Arc::new(ChanBus::new(16));
        let mut rx = bus.subscribe().unwrap();
        let token = CancellationToken::new();
        token.cancel();
        assert_eq!(publisher(&paths, bus, token).run().await, end);
        assert_eq!(load_cursor(&paths.cursor).unwrap(), end);
        assert!(rx.try_recv().is_err());
    }

    /// Rejects exactly one publish attempt (the `fail_at`-th, from 0).
    struct FlakyBus {
        fail_at: usize,
        attempts: AtomicUsize,
        inner: ChanBus,
    }

    #[async_trait]
    impl EventBus for FlakyBus {
        async fn publish(&self, ev: PublishedEvent) -> Result<(), PublishError> {
            if self.attempts.fetch_add(1, Ordering::SeqCst) == self.fail_at {
                return Err(PublishError::Rejected("injected".into()));
            }
            self.inner.publish(ev).await
        }
    }

    #[tokio::test]
    async fn publish_failure_rewinds_to_cursor_and_redelivers() {
        let dir = tempfile::tempdir().unwrap();
        let paths = SymbolPaths::new(dir.path(), "BTC");
        let end = write_commands(&paths, 1..=1, true);

        // The second event fails once; the retry restarts at the command
        // boundary, so event (1, 0) is delivered twice.
        let bus = Arc::new(FlakyBus {
            fail_at: 1,
            attempts: AtomicUsize::new(0),
            inner: ChanBus::new(16),
        });
        let mut rx = bus.inner.subscribe().unwrap();

        let token = CancellationToken::new();
        let handle = tokio::spawn(publisher(&paths, bus, token.clone()).run());

        let mut got = Vec::new();
        while got.len() < 3 {
            let ev = rx.recv().await.unwrap();
            got.push((ev.event.seq, ev.event.idx));
        }
        token.cancel();
        assert_eq!(handle.await.unwrap(), end);
        assert_eq!(got, vec![(1, 0), (1, 0), (1, 1)]);
    }

    #[tokio::test]
    async fn waits_for_outbox_to_appear() {
        let dir = tempfile::tempdir().unwrap();
        let paths = SymbolPaths::new(dir.path(), "LATE");

        let bus = Arc::new(ChanBus::new(16));
        let mut rx = bus.subscribe().unwrap();
        let token = CancellationToken::new();
        let handle = tokio::spawn(publisher(&paths, bus, token.clone()).run());

        tokio::time::sleep(Duration::from_millis(20)).await;
        write_commands(&paths, 1..=1, true);

        let ev = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!((ev.event.seq, ev.event.idx), (1, 0));
        token.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn publishes_across_read_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let paths = SymbolPaths::new(dir.path(), "BTC");
        // Three records per command, several chunks in all.
        let end = write_commands(&paths, 1..=200, true);

        let bus = Arc::new(ChanBus::new(1024));
        let mut rx = bus.subscribe().unwrap();
        let token = CancellationToken::new();
        token.cancel();
        assert_eq!(publisher(&paths, bus, token).run().await, end);
        assert_eq!(load_cursor(&paths.cursor).unwrap(), end);

        let keys: Vec<(u64, u16)> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|e| (e.event.seq, e.event.idx))
            .collect();
        let expected: Vec<(u64, u16)> = (1..=200).flat_map(|seq| [(seq, 0), (seq, 1)]).collect();
        assert_eq!(keys, expected);
    }

    #[tokio::test]
    async fn unreadable_cursor_publishes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let paths = SymbolPaths::new(dir.path(), "BTC");
        write_commands(&paths, 1..=1, true);
        std::fs::create_dir(&paths.cursor).unwrap();

        let bus = Arc::new(ChanBus::new(16));
        let mut rx = bus.subscribe().unwrap();
        let token = CancellationToken::new();
        token.cancel();
        assert_eq!(publisher(&paths, bus, token).run().await, 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn unreadable_cursor_is_retried() {
        let dir = tempfile::tempdir().unwrap();
        let paths = SymbolPaths::new(dir.path(), "BTC");
        let end = write_commands(&paths, 1..=1, true);
        std::fs::create_dir(&paths.cursor).unwrap();

        let bus = Arc::new(ChanBus::new(16));
        let mut rx = bus.subscribe().unwrap();
        let token = CancellationToken::new();
        let handle = tokio::spawn(publisher(&paths, bus, token.clone()).run());

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(rx.try_recv().is_err());
        std::fs::remove_dir(&paths.cursor).unwrap();

        let ev = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!((ev.event.seq, ev.event.idx), (1, 0));
        token.cancel();
        assert_eq!(handle.await.unwrap(), end);
    }
}

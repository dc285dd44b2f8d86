//! Event outbox: the durable log of every event a symbol produced.
//!
//! After the events of each command the actor writes a `CmdEnd` record.
//! A command whose `CmdEnd` is on disk is complete; anything after the
//! last `CmdEnd` is dangling and is cut off at startup, then regenerated
//! from the command WAL.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use engine_core::{Emitter, Event, EventKind};
use engine_protocol::EventCodec;
use engine_wal::{replay, truncate_to, ReaderOptions, WalError, WalWriter};
use tracing::{error, info, warn};

use crate::error::RecoveryError;

/// Where the actor's events go.
pub trait Outbox: Send {
    /// Buffer one event.
    fn append(&mut self, ev: &Event) -> Result<(), WalError>;
    /// Make everything appended so far durable.
    fn flush(&mut self) -> Result<(), WalError>;
}

/// Outbox backed by a WAL file.
#[derive(Debug)]
pub struct EventOutbox<C> {
    writer: WalWriter,
    codec: C,
    scratch: Vec<u8>,
}

impl<C: EventCodec> EventOutbox<C> {
    pub fn open(path: &Path, buf_size: usize, codec: C) -> Result<Self, WalError> {
        Ok(EventOutbox {
            writer: WalWriter::open(path, buf_size)?,
            codec,
            scratch: Vec::with_capacity(128),
        })
    }

    pub fn offset(&self) -> u64 {
        self.writer.offset()
    }
}

impl<C: EventCodec + Send> Outbox for EventOutbox<C> {
    fn append(&mut self, ev: &Event) -> Result<(), WalError> {
        self.scratch.clear();
        self.codec.encode_event(ev, &mut self.scratch);
        self.writer.append(&self.scratch).map(|_| ())
    }

    fn flush(&mut self) -> Result<(), WalError> {
        self.writer.flush()
    }
}

/// Emitter that stamps each event with its command coordinates and
/// appends it to an outbox.
///
/// The first append error is kept and later events are dropped;
/// [`finish`](Self::finish) reports it.
pub struct OutboxEmitter<'a, O: ?Sized> {
    out: &'a mut O,
    seq: u64,
    req_id: u64,
    idx: u16,
    err: Option<WalError>,
}

impl<'a, O: Outbox + ?Sized> OutboxEmitter<'a, O> {
    pub fn new(out: &'a mut O, seq: u64, req_id: u64) -> Self {
        OutboxEmitter {
            out,
            seq,
            req_id,
            idx: 0,
            err: None,
        }
    }

    /// Events emitted so far (excluding `CmdEnd`).
    pub fn emitted(&self) -> u16 {
        self.idx
    }

    /// Write the command's `CmdEnd` and surface the first failure, if any.
    pub fn finish(mut self) -> Result<u16, WalError> {
        if let Some(err) = self.err.take() {
            return Err(err);
        }
        let count = self.idx;
        self.out
            .append(&Event::cmd_end(self.seq, count, self.req_id))?;
        Ok(count)
    }
}

impl<O: Outbox + ?Sized> Emitter for OutboxEmitter<'_, O> {
    fn emit(&mut self, kind: EventKind) {
        if self.err.is_some() {
            return;
        }
        let Some(next) = self.idx.checked_add(1) else {
            error!(seq = self.seq, "event index overflow; failing command");
            self.err = Some(WalError::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                "too many events in one command",
            )));
            return;
        };
        let ev = Event::new(self.seq, self.idx, self.req_id, kind);
        self.idx = next;
        if let Err(e) = self.out.append(&ev) {
            self.err = Some(e);
        }
    }
}

/// Result of the startup scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutboxScan {
    /// Sequence of the last command whose `CmdEnd` is on disk (0 if none).
    pub last_complete_seq: u64,
    /// End of that `CmdEnd` record; the file now ends here.
    pub last_complete_offset: u64,
    /// Records read, `CmdEnd`s included.
    pub records: u64,
    /// Bytes cut off the end of the file.
    pub truncated_bytes: u64,
}

/// Scan the outbox end to end and cut it back to the last `CmdEnd`.
///
/// A torn final record is tolerated; a checksum mismatch or an
/// undecodable record is corruption and aborts.
pub fn scan_and_repair<C: EventCodec>(
    codec: &C,
    path: &Path,
    max_payload: usize,
) -> Result<OutboxScan, RecoveryError> {
    let mut scan = OutboxScan::default();
    let opts = ReaderOptions::default()
        .tolerate_tail()
        .with_max_payload(max_payload);

    let stats = replay(path, opts, |payload, end| {
        let ev = codec
            .decode_event(payload)
            .map_err(|source| RecoveryError::Decode {
                file: "outbox",
                offset: end,
                source,
            })?;
        if ev.is_cmd_end() {
            scan.last_complete_seq = ev.seq;
            scan.last_complete_offset = end;
        }
        scan.records += 1;
        Ok::<(), RecoveryError>(())
    })?;

    let len = match fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => 0,
        Err(e) => return Err(e.into()),
    };
    if len > scan.last_complete_offset {
        scan.truncated_bytes = len - scan.last_complete_offset;
        if stats.truncated_tail {
            warn!(path = %path.display(), last_good = stats.last_good_offset, "outbox has a torn tail");
        }
        info!(
            path = %path.display(),
            to = scan.last_complete_offset,
            dropped_bytes = scan.truncated_bytes,
            "outbox repaired to last command boundary"
        );
        truncate_to(path, scan.last_complete_offset)?;
    }

    Ok(scan)
}

// -----------------------------------------------------------------------------
// Publisher cursor
// -----------------------------------------------------------------------------

/// Read the publish cursor. A missing file reads as 0; anything else that
/// cannot be read is an error.
pub fn load_cursor(path: &Path) -> io::Result<u64> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };
    let raw: [u8; 8] = bytes.get(..8).and_then(|b| b.try_into().ok()).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("cursor file {} holds {} bytes", path.display(), bytes.len()),
        )
    })?;
    Ok(u64::from_le_bytes(raw))
}

/// Durably replace the publish cursor (write temp, fsync, rename, fsync
/// the directory).
pub fn store_cursor(path: &Path, offset: u64) -> io::Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp = Path::new(&tmp_name);

    let mut f = fs::File::create(tmp)?;
    f.write_all(&offset.to_le_bytes())?;
    f.sync_all()?;
    drop(f);
    fs::rename(tmp, path)?;
    fs::File::open(dir)?.sync_all()
}

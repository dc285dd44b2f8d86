//! Buffered append-only writer.
//!
//! `append` only copies into the in-memory buffer. Durability is a
//! separate step: `flush` pushes the buffer to the file and fsyncs, so a
//! caller can append a whole batch and pay for one sync (group commit).

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::WalError;
use crate::frame::{encode_header, HEADER_SIZE};

/// Buffer size used when the caller passes 0 (1 MiB).
pub const DEFAULT_WRITE_BUF: usize = 1 << 20;

#[derive(Debug)]
pub struct WalWriter {
    path: PathBuf,
    out: BufWriter<File>,
    /// Logical end of the log, including buffered records.
    offset: u64,
}

impl WalWriter {
    /// Open (creating if needed) `path` for appending.
    pub fn open(path: impl AsRef<Path>, buf_size: usize) -> Result<Self, WalError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(&path)?;
        let offset = file.metadata()?.len();
        let buf_size = if buf_size == 0 { DEFAULT_WRITE_BUF } else { buf_size };

        Ok(WalWriter {
            path,
            out: BufWriter::with_capacity(buf_size, file),
            offset,
        })
    }

    /// Buffer one framed record. Returns the offset just past it.
    pub fn append(&mut self, payload: &[u8]) -> Result<u64, WalError> {
        if payload.len() > u32::MAX as usize {
            return Err(WalError::PayloadTooLarge {
                offset: self.offset,
                len: payload.len(),
                max: u32::MAX as usize,
            });
        }
        self.out.write_all(&encode_header(payload))?;
        self.out.write_all(payload)?;
        self.offset += (HEADER_SIZE + payload.len()) as u64;
        Ok(self.offset)
    }

    /// Write out buffered records and fsync.
    pub fn flush(&mut self) -> Result<(), WalError> {
        self.out.flush()?;
        self.out.get_ref().sync_all()?;
        Ok(())
    }

    /// Flush, fsync and close.
    pub fn close(mut self) -> Result<(), WalError> {
        self.flush()
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

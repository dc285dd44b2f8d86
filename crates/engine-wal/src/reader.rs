//! Streaming reader.
//!
//! Reads records one at a time from a given record boundary, verifying
//! each checksum. A record torn by a crash mid-append is either an error
//! or, with `allow_truncated_tail`, a clean end of stream; in both cases
//! `last_good_offset` is the end of the last fully verified record, which
//! is where the file should be truncated.

use std::fs::File;
use std::io::{BufReader, Seek, SeekFrom};
use std::path::Path;

use crate::error::WalError;
use crate::frame::{checksum_ok, decode_header, read_full, DEFAULT_MAX_PAYLOAD, HEADER_SIZE};

/// Read buffer used when `buffer_size` is 0 (1 MiB).
pub const DEFAULT_READ_BUF: usize = 1 << 20;

#[derive(Debug, Clone, Copy)]
pub struct ReaderOptions {
    /// Largest accepted payload; 0 means [`DEFAULT_MAX_PAYLOAD`].
    pub max_payload: usize,
    /// Report a torn final record as end of stream instead of an error.
    pub allow_truncated_tail: bool,
    /// 0 means [`DEFAULT_READ_BUF`].
    pub buffer_size: usize,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        ReaderOptions {
            max_payload: DEFAULT_MAX_PAYLOAD,
            allow_truncated_tail: false,
            buffer_size: DEFAULT_READ_BUF,
        }
    }
}

impl ReaderOptions {
    pub fn tolerate_tail(mut self) -> Self {
        self.allow_truncated_tail = true;
        self
    }

    pub fn with_max_payload(mut self, max_payload: usize) -> Self {
        self.max_payload = max_payload;
        self
    }
}

#[derive(Debug)]
pub struct WalReader {
    input: BufReader<File>,
    offset: u64,
    max_payload: usize,
    allow_tail: bool,
    truncated_tail: bool,
    last_good_offset: u64,
}

impl WalReader {
    /// Open `path` positioned at `offset`, which must be a record boundary.
    ///
    /// A missing file is an `Io(NotFound)` error; see
    /// [`WalError::is_not_found`].
    pub fn open(path: impl AsRef<Path>, offset: u64, opts: ReaderOptions) -> Result<Self, WalError> {
        let mut file = File::open(path)?;
        if offset > 0 {
            file.seek(SeekFrom::Start(offset))?;
        }
        let buf_size = if opts.buffer_size == 0 {
            DEFAULT_READ_BUF
        } else {
            opts.buffer_size
        };
        let max_payload = if opts.max_payload == 0 {
            DEFAULT_MAX_PAYLOAD
        } else {
            opts.max_payload
        };

        Ok(WalReader {
            input: BufReader::with_capacity(buf_size, file),
            offset,
            max_payload,
            allow_tail: opts.allow_truncated_tail,
            truncated_tail: false,
            last_good_offset: offset,
        })
    }

    /// Next verified payload and the offset just past it.
    ///
    /// `Ok(None)` at a clean end of file (or a tolerated torn tail).
    pub fn next_record(&mut self) -> Result<Option<(Vec<u8>, u64)>, WalError> {
        let mut hdr = [0u8; HEADER_SIZE];
        match read_full(&mut self.input, &mut hdr)? {
            0 => return Ok(None),
            n if n < HEADER_SIZE => {
                return self.torn(WalError::TruncatedHeader {
                    offset: self.offset,
                })
            }
            _ => {}
        }

        let (len, crc) = decode_header(&hdr);
        if len > self.max_payload {
            return Err(WalError::PayloadTooLarge {
                offset: self.offset,
                len,
                max: self.max_payload,
            });
        }

        let mut payload = vec![0u8; len];
        if read_full(&mut self.input, &mut payload)? < len {
            return self.torn(WalError::TruncatedPayload {
                offset: self.offset,
            });
        }
        if !checksum_ok(&payload, crc) {
            return Err(WalError::ChecksumMismatch {
                offset: self.offset,
            });
        }

        self.offset += (HEADER_SIZE + len) as u64;
        self.last_good_offset = self.offset;
        Ok(Some((payload, self.offset)))
    }

    /// A torn tail was seen.
    pub fn truncated_tail(&self) -> bool {
        self.truncated_tail
    }

    /// End of the last fully verified record.
    pub fn last_good_offset(&self) -> u64 {
        self.last_good_offset
    }

    /// Position of the next record to read.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    fn torn(&mut self, err: WalError) -> Result<Option<(Vec<u8>, u64)>, WalError> {
        self.truncated_tail = true;
        if self.allow_tail {
            Ok(None)
        } else {
            Err(err)
        }
    }
}

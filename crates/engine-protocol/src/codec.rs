//! Codec seam used by the WAL-facing parts of the server.
//!
//! Exactly two implementations exist: [`BinaryCodec`] (production) and
//! [`CsvCodec`] (human-readable, for tests). The server is generic over
//! [`RecordCodec`], so the choice is made once at construction.

use engine_core::{Command, Event};

use crate::binary_codec::{self, ProtocolError};
use crate::csv_codec;

pub trait CommandCodec {
    /// Append the payload for `cmd` (logged as `seq`) to `out`.
    fn encode_command(&self, seq: u64, cmd: &Command, out: &mut Vec<u8>);
    fn decode_command(&self, payload: &[u8]) -> Result<(u64, Command), ProtocolError>;
}

pub trait EventCodec {
    fn encode_event(&self, ev: &Event, out: &mut Vec<u8>);
    fn decode_event(&self, payload: &[u8]) -> Result<Event, ProtocolError>;
}

/// Both halves, plus the bounds the server needs to move a codec between
/// threads.
pub trait RecordCodec: CommandCodec + EventCodec + Clone + Send + Sync + 'static {}

impl<T> RecordCodec for T where T: CommandCodec + EventCodec + Clone + Send + Sync + 'static {}

/// Fixed-layout little-endian records.
#[derive(Debug, Default, Clone, Copy)]
pub struct BinaryCodec;

impl CommandCodec for BinaryCodec {
    fn encode_command(&self, seq: u64, cmd: &Command, out: &mut Vec<u8>) {
        binary_codec::encode_command(seq, cmd, out);
    }

    fn decode_command(&self, payload: &[u8]) -> Result<(u64, Command), ProtocolError> {
        binary_codec::decode_command(payload)
    }
}

impl EventCodec for BinaryCodec {
    fn encode_event(&self, ev: &Event, out: &mut Vec<u8>) {
        binary_codec::encode_event(ev, out);
    }

    fn decode_event(&self, payload: &[u8]) -> Result<Event, ProtocolError> {
        binary_codec::decode_event(payload)
    }
}

/// One CSV line per record, UTF-8, no trailing newline.
#[derive(Debug, Default, Clone, Copy)]
pub struct CsvCodec;

impl CsvCodec {
    fn text(payload: &[u8]) -> Result<&str, ProtocolError> {
        std::str::from_utf8(payload).map_err(|_| ProtocolError::InvalidField("utf-8"))
    }
}

impl CommandCodec for CsvCodec {
    fn encode_command(&self, seq: u64, cmd: &Command, out: &mut Vec<u8>) {
        out.extend_from_slice(csv_codec::format_command(seq, cmd).as_bytes());
    }

    fn decode_command(&self, payload: &[u8]) -> Result<(u64, Command), ProtocolError> {
        csv_codec::parse_command(Self::text(payload)?)
    }
}

impl EventCodec for CsvCodec {
    fn encode_event(&self, ev: &Event, out: &mut Vec<u8>) {
        out.extend_from_slice(csv_codec::format_event(ev).as_bytes());
    }

    fn decode_event(&self, payload: &[u8]) -> Result<Event, ProtocolError> {
        csv_codec::parse_event(Self::text(payload)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_core::{EventKind, Side};

    fn check<C: RecordCodec>(codec: C) {
        let cmd = Command::submit_limit(1, 2, 3, Side::Buy, 4, 5);
        let mut buf = Vec::new();
        codec.encode_command(6, &cmd, &mut buf);
        assert_eq!(codec.decode_command(&buf), Ok((6, cmd)));

        let ev = Event::new(6, 0, 1, EventKind::Added { order_id: 2, user_id: 3 });
        buf.clear();
        codec.encode_event(&ev, &mut buf);
        assert_eq!(codec.decode_event(&buf), Ok(ev));
    }

    #[test]
    fn both_codecs_satisfy_the_seam() {
        check(BinaryCodec);
        check(CsvCodec);
    }

    #[test]
    fn csv_rejects_non_utf8() {
        assert_eq!(
            CsvCodec.decode_event(&[0xff, 0xfe]),
            Err(ProtocolError::InvalidField("utf-8"))
        );
    }
}

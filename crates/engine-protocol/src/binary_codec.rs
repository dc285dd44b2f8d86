//! Binary encoding/decoding for engine-core commands and events.
//!
//! This module converts between:
//! - fixed-length payloads (`&[u8]`) as stored inside WAL frames
//! - logical `engine_core::Command` (+ its sequence) / `engine_core::Event`
//!
//! Record layouts (all integers little-endian, signed values stored as
//! their two's-complement `u64`):
//!
//! ```text
//! Command (67 bytes)
//! ------------------
//! [0]      version (CMD_RECORD_VERSION)
//! [1]      type (1=SubmitLimit, 2=Cancel)
//! [2..10]  seq
//! [10..18] req_id
//! [18..26] client_ts (i64)
//! [26..34] order_id      (0 for Cancel)
//! [34..42] user_id       (0 for Cancel)
//! [42]     side (1=Buy, 2=Sell, 0 for Cancel)
//! [43..51] price (i64)   (0 for Cancel)
//! [51..59] qty (i64)     (0 for Cancel)
//! [59..67] cancel_id     (0 for SubmitLimit)
//!
//! Event (68 bytes)
//! ----------------
//! [0]      version (EVENT_RECORD_VERSION)
//! [1]      type (1=Accepted 2=Rejected 3=Added 4=Cancelled 5=Trade 250=CmdEnd)
//! [2..10]  seq
//! [10..12] idx (u16)
//! [12..20] req_id
//! [20..28] order_id
//! [28..36] user_id
//! [36..44] maker_id      (Rejected: reject reason code)
//! [44..52] taker_id
//! [52..60] price (i64)
//! [60..68] qty (i64)
//! ```
//!
//! Fields a record type does not use are written as zero.
//!
//! NOTE: This module encodes/decodes **one record per buffer**. Framing
//! (length + checksum) is the WAL's job.

use thiserror::Error;

use engine_core::{
    CancelOrder, Command, CommandKind, Event, EventKind, RejectReason, SubmitLimit, Trade,
};

use crate::wire_types::{
    cmd_off, ev_off, side_from_u8, side_to_u8, WireCommandType, WireEventType, CMD_RECORD_LEN,
    CMD_RECORD_VERSION, EVENT_RECORD_LEN, EVENT_RECORD_VERSION,
};

/// Errors that can arise when encoding/decoding a record.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// Payload is not exactly one record long.
    #[error("bad record length: got {got}, expected {expected}")]
    BadLength { got: usize, expected: usize },

    /// Unsupported layout version.
    #[error("record version mismatch: got {got}, expected {expected}")]
    VersionMismatch { got: u8, expected: u8 },

    #[error("unknown command type: {0}")]
    UnknownCommandType(u8),

    #[error("unknown event type: {0}")]
    UnknownEventType(u8),

    /// A field holds a value its type cannot represent.
    #[error("invalid field: {0}")]
    InvalidField(&'static str),

    /// A textual record could not be parsed.
    #[error("malformed csv record {line:?}: {reason}")]
    Csv { line: String, reason: &'static str },
}

// ============================================================================
// COMMANDS
// ============================================================================

/// Encode `cmd` with sequence number `seq`, appending exactly
/// `CMD_RECORD_LEN` bytes to `out`.
pub fn encode_command(seq: u64, cmd: &Command, out: &mut Vec<u8>) {
    let start = out.len();
    out.resize(start + CMD_RECORD_LEN, 0);
    let rec = &mut out[start..];

    rec[cmd_off::VER] = CMD_RECORD_VERSION;
    put_u64(rec, cmd_off::SEQ, seq);
    put_u64(rec, cmd_off::REQ_ID, cmd.req_id);
    put_i64(rec, cmd_off::CLIENT_TS, cmd.client_ts);

    match &cmd.kind {
        CommandKind::SubmitLimit(o) => {
            rec[cmd_off::TYPE] = WireCommandType::SubmitLimit as u8;
            put_u64(rec, cmd_off::ORDER_ID, o.order_id);
            put_u64(rec, cmd_off::USER_ID, o.user_id);
            rec[cmd_off::SIDE] = side_to_u8(o.side);
            put_i64(rec, cmd_off::PRICE, o.price);
            put_i64(rec, cmd_off::QTY, o.qty);
        }
        CommandKind::Cancel(c) => {
            rec[cmd_off::TYPE] = WireCommandType::Cancel as u8;
            put_u64(rec, cmd_off::CANCEL_ID, c.order_id);
        }
    }
}

/// Decode one command record, returning its sequence number and command.
pub fn decode_command(buf: &[u8]) -> Result<(u64, Command), ProtocolError> {
    check_header(buf, CMD_RECORD_LEN, CMD_RECORD_VERSION)?;

    let ty = buf[cmd_off::TYPE];
    let wire_type = WireCommandType::from_u8(ty).ok_or(ProtocolError::UnknownCommandType(ty))?;

    let seq = get_u64(buf, cmd_off::SEQ);
    let req_id = get_u64(buf, cmd_off::REQ_ID);
    let client_ts = get_i64(buf, cmd_off::CLIENT_TS);

    let kind = match wire_type {
        WireCommandType::SubmitLimit => {
            let side =
                side_from_u8(buf[cmd_off::SIDE]).ok_or(ProtocolError::InvalidField("side"))?;
            CommandKind::SubmitLimit(SubmitLimit {
                order_id: get_u64(buf, cmd_off::ORDER_ID),
                user_id: get_u64(buf, cmd_off::USER_ID),
                side,
                price: get_i64(buf, cmd_off::PRICE),
                qty: get_i64(buf, cmd_off::QTY),
            })
        }
        WireCommandType::Cancel => CommandKind::Cancel(CancelOrder {
            order_id: get_u64(buf, cmd_off::CANCEL_ID),
        }),
    };

    Ok((
        seq,
        Command {
            req_id,
            client_ts,
            kind,
        },
    ))
}

// ============================================================================
// EVENTS
// ============================================================================

/// Encode `ev`, appending exactly `EVENT_RECORD_LEN` bytes to `out`.
pub fn encode_event(ev: &Event, out: &mut Vec<u8>) {
    let start = out.len();
    out.resize(start + EVENT_RECORD_LEN, 0);
    let rec = &mut out[start..];

    rec[ev_off::VER] = EVENT_RECORD_VERSION;
    put_u64(rec, ev_off::SEQ, ev.seq);
    rec[ev_off::IDX..ev_off::IDX + 2].copy_from_slice(&ev.idx.to_le_bytes());
    put_u64(rec, ev_off::REQ_ID, ev.req_id);

    let ty = match ev.kind {
        EventKind::Accepted { order_id, user_id } => {
            put_u64(rec, ev_off::ORDER_ID, order_id);
            put_u64(rec, ev_off::USER_ID, user_id);
            WireEventType::Accepted
        }
        EventKind::Rejected {
            order_id,
            user_id,
            reason,
        } => {
            put_u64(rec, ev_off::ORDER_ID, order_id);
            put_u64(rec, ev_off::USER_ID, user_id);
            put_u64(rec, ev_off::MAKER_ID, reason.code());
            WireEventType::Rejected
        }
        EventKind::Added { order_id, user_id } => {
            put_u64(rec, ev_off::ORDER_ID, order_id);
            put_u64(rec, ev_off::USER_ID, user_id);
            WireEventType::Added
        }
        EventKind::Cancelled { order_id } => {
            put_u64(rec, ev_off::ORDER_ID, order_id);
            WireEventType::Cancelled
        }
        EventKind::Trade(t) => {
            put_u64(rec, ev_off::MAKER_ID, t.maker_id);
            put_u64(rec, ev_off::TAKER_ID, t.taker_id);
            put_i64(rec, ev_off::PRICE, t.price);
            put_i64(rec, ev_off::QTY, t.qty);
            WireEventType::Trade
        }
        EventKind::CmdEnd => WireEventType::CmdEnd,
    };
    rec[ev_off::TYPE] = ty as u8;
}

/// Decode one event record.
pub fn decode_event(buf: &[u8]) -> Result<Event, ProtocolError> {
    check_header(buf, EVENT_RECORD_LEN, EVENT_RECORD_VERSION)?;

    let ty = buf[ev_off::TYPE];
    let wire_type = WireEventType::from_u8(ty).ok_or(ProtocolError::UnknownEventType(ty))?;

    let order_id = get_u64(buf, ev_off::ORDER_ID);
    let user_id = get_u64(buf, ev_off::USER_ID);

    let kind = match wire_type {
        WireEventType::Accepted => EventKind::Accepted { order_id, user_id },
        WireEventType::Rejected => {
            let reason = RejectReason::from_code(get_u64(buf, ev_off::MAKER_ID))
                .ok_or(ProtocolError::InvalidField("reject reason"))?;
            EventKind::Rejected {
                order_id,
                user_id,
                reason,
            }
        }
        WireEventType::Added => EventKind::Added { order_id, user_id },
        WireEventType::Cancelled => EventKind::Cancelled { order_id },
        WireEventType::Trade => EventKind::Trade(Trade {
            maker_id: get_u64(buf, ev_off::MAKER_ID),
            taker_id: get_u64(buf, ev_off::TAKER_ID),
            price: get_i64(buf, ev_off::PRICE),
            qty: get_i64(buf, ev_off::QTY),
        }),
        WireEventType::CmdEnd => EventKind::CmdEnd,
    };

    let mut idx = [0u8; 2];
    idx.copy_from_slice(&buf[ev_off::IDX..ev_off::IDX + 2]);

    Ok(Event {
        seq: get_u64(buf, ev_off::SEQ),
        idx: u16::from_le_bytes(idx),
        req_id: get_u64(buf, ev_off::REQ_ID),
        kind,
    })
}

// -----------------------------------------------------------------------------
// Helpers
// -----------------------------------------------------------------------------

fn check_header(buf: &[u8], len: usize, version: u8) -> Result<(), ProtocolError> {
    if buf.len() != len {
        return Err(ProtocolError::BadLength {
            got: buf.len(),
            expected: len,
        });
    }
    if buf[0] != version {
        return Err(ProtocolError::VersionMismatch {
            got: buf[0],
            expected: version,
        });
    }
    Ok(())
}

fn put_u64(rec: &mut [u8], off: usize, v: u64) {
    rec[off..off + 8].copy_from_slice(&v.to_le_bytes());
}

fn put_i64(rec: &mut [u8], off: usize, v: i64) {
    rec[off..off + 8].copy_from_slice(&v.to_le_bytes());
}

fn get_u64(buf: &[u8], off: usize) -> u64 {
    let mut arr = [0u8; 8];
    arr.copy_from_slice(&buf[off..off + 8]);
    u64::from_le_bytes(arr)
}

fn get_i64(buf: &[u8], off: usize) -> i64 {
    get_u64(buf, off) as i64
}

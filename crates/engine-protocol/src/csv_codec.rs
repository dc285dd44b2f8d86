// crates/engine-protocol/src/csv_codec.rs

//! CSV codec.
//!
//! A readable one-line form of the same records the binary codec writes,
//! used by tests (a WAL written with it can be inspected with `cat`) and by
//! the stdin driver of `engine-server`.
//!
//! Record format (`Command` / `Event` ↔ line):
//!
//! - SubmitLimit:
//!   `N, seq, reqId, clientTs, orderId, userId, side(B or S), price, qty`
//! - Cancel:
//!   `C, seq, reqId, clientTs, orderId`
//!
//! - Accepted:  `A, seq, idx, reqId, orderId, userId`
//! - Rejected:  `R, seq, idx, reqId, orderId, userId, reasonCode`
//! - Added:     `D, seq, idx, reqId, orderId, userId`
//! - Cancelled: `X, seq, idx, reqId, orderId`
//! - Trade:     `T, seq, idx, reqId, makerId, takerId, price, qty`
//! - CmdEnd:    `E, seq, idx, reqId`
//!
//! Driver input format (lines → `(symbol, Command)`):
//!
//! - New limit order:
//!   `N, symbol, reqId, orderId, userId, side(B or S), price, qty`
//! - Cancel:
//!   `C, symbol, reqId, orderId`

use std::str::FromStr;

use engine_core::{Command, CommandKind, Event, EventKind, RejectReason, Side, Trade};

use crate::binary_codec::ProtocolError;

// -----------------------------------------------------------------------------
// Commands
// -----------------------------------------------------------------------------

pub fn format_command(seq: u64, cmd: &Command) -> String {
    match &cmd.kind {
        CommandKind::SubmitLimit(o) => format!(
            "N, {}, {}, {}, {}, {}, {}, {}, {}",
            seq,
            cmd.req_id,
            cmd.client_ts,
            o.order_id,
            o.user_id,
            o.side.as_char(),
            o.price,
            o.qty
        ),
        CommandKind::Cancel(c) => format!(
            "C, {}, {}, {}, {}",
            seq, cmd.req_id, cmd.client_ts, c.order_id
        ),
    }
}

pub fn parse_command(line: &str) -> Result<(u64, Command), ProtocolError> {
    let tokens = split_and_trim(line, ',');
    let malformed = |reason| ProtocolError::Csv {
        line: line.to_string(),
        reason,
    };

    match tokens.first().copied() {
        Some("N") => {
            if tokens.len() != 9 {
                return Err(malformed("expected 9 fields"));
            }
            let seq = parse_num(&tokens[1]).ok_or_else(|| malformed("seq"))?;
            let req_id = parse_num(&tokens[2]).ok_or_else(|| malformed("req id"))?;
            let client_ts = parse_num(&tokens[3]).ok_or_else(|| malformed("client ts"))?;
            let order_id = parse_num(&tokens[4]).ok_or_else(|| malformed("order id"))?;
            let user_id = parse_num(&tokens[5]).ok_or_else(|| malformed("user id"))?;
            let side = parse_side(tokens[6]).ok_or_else(|| malformed("side"))?;
            let price = parse_num(&tokens[7]).ok_or_else(|| malformed("price"))?;
            let qty = parse_num(&tokens[8]).ok_or_else(|| malformed("qty"))?;
            let cmd = Command::submit_limit(req_id, order_id, user_id, side, price, qty)
                .with_client_ts(client_ts);
            Ok((seq, cmd))
        }
        Some("C") => {
            if tokens.len() != 5 {
                return Err(malformed("expected 5 fields"));
            }
            let seq = parse_num(&tokens[1]).ok_or_else(|| malformed("seq"))?;
            let req_id = parse_num(&tokens[2]).ok_or_else(|| malformed("req id"))?;
            let client_ts = parse_num(&tokens[3]).ok_or_else(|| malformed("client ts"))?;
            let order_id = parse_num(&tokens[4]).ok_or_else(|| malformed("order id"))?;
            Ok((seq, Command::cancel(req_id, order_id).with_client_ts(client_ts)))
        }
        _ => Err(malformed("unknown command tag")),
    }
}

// -----------------------------------------------------------------------------
// Events
// -----------------------------------------------------------------------------

pub fn format_event(ev: &Event) -> String {
    let head = |tag: char| format!("{}, {}, {}, {}", tag, ev.seq, ev.idx, ev.req_id);
    match ev.kind {
        EventKind::Accepted { order_id, user_id } => {
            format!("{}, {}, {}", head('A'), order_id, user_id)
        }
        EventKind::Rejected {
            order_id,
            user_id,
            reason,
        } => format!("{}, {}, {}, {}", head('R'), order_id, user_id, reason.code()),
        EventKind::Added { order_id, user_id } => {
            format!("{}, {}, {}", head('D'), order_id, user_id)
        }
        EventKind::Cancelled { order_id } => format!("{}, {}", head('X'), order_id),
        EventKind::Trade(t) => format!(
            "{}, {}, {}, {}, {}",
            head('T'),
            t.maker_id,
            t.taker_id,
            t.price,
            t.qty
        ),
        EventKind::CmdEnd => head('E'),
    }
}

pub fn parse_event(line: &str) -> Result<Event, ProtocolError> {
    let tokens = split_and_trim(line, ',');
    let malformed = |reason| ProtocolError::Csv {
        line: line.to_string(),
        reason,
    };

    let expected = match tokens.first().copied() {
        Some("A") | Some("D") => 6,
        Some("R") => 7,
        Some("X") => 5,
        Some("T") => 8,
        Some("E") => 4,
        _ => return Err(malformed("unknown event tag")),
    };
    if tokens.len() != expected {
        return Err(malformed("wrong field count"));
    }

    let seq = parse_num(&tokens[1]).ok_or_else(|| malformed("seq"))?;
    let idx = parse_num(&tokens[2]).ok_or_else(|| malformed("idx"))?;
    let req_id = parse_num(&tokens[3]).ok_or_else(|| malformed("req id"))?;
    let field = |i: usize, name| parse_num::<u64>(&tokens[i]).ok_or_else(|| malformed(name));

    let kind = match tokens[0] {
        "A" => EventKind::Accepted {
            order_id: field(4, "order id")?,
            user_id: field(5, "user id")?,
        },
        "R" => EventKind::Rejected {
            order_id: field(4, "order id")?,
            user_id: field(5, "user id")?,
            reason: RejectReason::from_code(field(6, "reason")?)
                .ok_or_else(|| malformed("reason"))?,
        },
        "D" => EventKind::Added {
            order_id: field(4, "order id")?,
            user_id: field(5, "user id")?,
        },
        "X" => EventKind::Cancelled {
            order_id: field(4, "order id")?,
        },
        "T" => EventKind::Trade(Trade {
            maker_id: field(4, "maker id")?,
            taker_id: field(5, "taker id")?,
            price: parse_num(&tokens[6]).ok_or_else(|| malformed("price"))?,
            qty: parse_num(&tokens[7]).ok_or_else(|| malformed("qty"))?,
        }),
        _ => EventKind::CmdEnd,
    };

    Ok(Event::new(seq, idx, req_id, kind))
}

/// A published event as one line: `symbol, <event>`.
pub fn format_published(symbol: &str, ev: &Event) -> String {
    format!("{}, {}", symbol, format_event(ev))
}

// -----------------------------------------------------------------------------
// Driver input
// -----------------------------------------------------------------------------

/// Parse one driver line into `(symbol, command)`.
///
/// Returns `Ok(None)` for blank lines or comments (starting with `#`).
pub fn parse_input_line(line: &str) -> Result<Option<(String, Command)>, ProtocolError> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }

    let tokens = split_and_trim(trimmed, ',');
    let malformed = |reason| ProtocolError::Csv {
        line: trimmed.to_string(),
        reason,
    };

    match tokens.first().copied() {
        Some("N") => {
            // N, symbol, req, order, user, side, price, qty
            if tokens.len() != 8 {
                return Err(malformed("expected 8 fields"));
            }
            let symbol = tokens[1].to_string();
            let req_id = parse_num(&tokens[2]).ok_or_else(|| malformed("req id"))?;
            let order_id = parse_num(&tokens[3]).ok_or_else(|| malformed("order id"))?;
            let user_id = parse_num(&tokens[4]).ok_or_else(|| malformed("user id"))?;
            let side = parse_side(tokens[5]).ok_or_else(|| malformed("side"))?;
            let price = parse_num(&tokens[6]).ok_or_else(|| malformed("price"))?;
            let qty = parse_num(&tokens[7]).ok_or_else(|| malformed("qty"))?;
            Ok(Some((
                symbol,
                Command::submit_limit(req_id, order_id, user_id, side, price, qty),
            )))
        }
        Some("C") => {
            // C, symbol, req, order
            if tokens.len() != 4 {
                return Err(malformed("expected 4 fields"));
            }
            let symbol = tokens[1].to_string();
            let req_id = parse_num(&tokens[2]).ok_or_else(|| malformed("req id"))?;
            let order_id = parse_num(&tokens[3]).ok_or_else(|| malformed("order id"))?;
            Ok(Some((symbol, Command::cancel(req_id, order_id))))
        }
        _ => Err(malformed("unknown command tag")),
    }
}

// -----------------------------------------------------------------------------
// Helpers
// -----------------------------------------------------------------------------

fn split_and_trim(s: &str, delimiter: char) -> Vec<&str> {
    s.split(delimiter).map(str::trim).collect()
}

fn parse_num<T: FromStr>(s: &str) -> Option<T> {
    s.parse::<T>().ok()
}

fn parse_side(s: &str) -> Option<Side> {
    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Side::from_char(c),
        _ => None,
    }
}

//! Message types used by the matching core.
//!
//! These are **transport-agnostic** logical messages:
//! - [`Command`]: what a symbol actor consumes (and logs to its command WAL).
//! - [`Event`]: what applying a command produces (and lands in the outbox).
//!
//! Binary / CSV encoders live in the `engine-protocol` crate;
//! this module is purely logical.

use crate::order::{OrderId, Price, Qty, Trade, UserId};
use crate::side::Side;

/// A request into a symbol actor.
///
/// `req_id` is caller-supplied (idempotency / tracing); the command
/// sequence number is assigned by the actor when the command is logged
/// and is therefore not part of this type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub req_id: u64,
    /// Optional client timestamp, carried for audit only.
    pub client_ts: i64,
    pub kind: CommandKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandKind {
    SubmitLimit(SubmitLimit),
    Cancel(CancelOrder),
}

/// New limit order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitLimit {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub side: Side,
    pub price: Price,
    pub qty: Qty,
}

/// Cancel a resting order by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CancelOrder {
    pub order_id: OrderId,
}

impl Command {
    pub fn submit_limit(
        req_id: u64,
        order_id: OrderId,
        user_id: UserId,
        side: Side,
        price: Price,
        qty: Qty,
    ) -> Self {
        Command {
            req_id,
            client_ts: 0,
            kind: CommandKind::SubmitLimit(SubmitLimit {
                order_id,
                user_id,
                side,
                price,
                qty,
            }),
        }
    }

    pub fn cancel(req_id: u64, order_id: OrderId) -> Self {
        Command {
            req_id,
            client_ts: 0,
            kind: CommandKind::Cancel(CancelOrder { order_id }),
        }
    }

    pub fn with_client_ts(mut self, client_ts: i64) -> Self {
        self.client_ts = client_ts;
        self
    }

    pub fn is_submit(&self) -> bool {
        matches!(self.kind, CommandKind::SubmitLimit(_))
    }

    pub fn is_cancel(&self) -> bool {
        matches!(self.kind, CommandKind::Cancel(_))
    }
}

/// Why a command was rejected without touching the book (or, for
/// `OrderNotFound`, without changing it).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum RejectReason {
    /// Missing order id, or non-positive price / quantity.
    BadSubmit,
    /// Missing cancel target.
    BadCancel,
    /// Cancel target is not resting in the book.
    OrderNotFound,
    /// Submit reuses the id of an order that is still resting.
    DuplicateOrderId,
    /// The book cannot hold another resting order.
    BookFull,
}

impl RejectReason {
    pub fn code(self) -> u64 {
        match self {
            RejectReason::BadSubmit => 1,
            RejectReason::BadCancel => 2,
            RejectReason::OrderNotFound => 3,
            RejectReason::DuplicateOrderId => 4,
            RejectReason::BookFull => 5,
        }
    }

    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            1 => Some(RejectReason::BadSubmit),
            2 => Some(RejectReason::BadCancel),
            3 => Some(RejectReason::OrderNotFound),
            4 => Some(RejectReason::DuplicateOrderId),
            5 => Some(RejectReason::BookFull),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RejectReason::BadSubmit => "bad submit",
            RejectReason::BadCancel => "bad cancel",
            RejectReason::OrderNotFound => "order not found",
            RejectReason::DuplicateOrderId => "duplicate order id",
            RejectReason::BookFull => "book full",
        }
    }
}

/// What happened, without the command coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Accepted {
        order_id: OrderId,
        user_id: UserId,
    },
    Rejected {
        order_id: OrderId,
        user_id: UserId,
        reason: RejectReason,
    },
    /// The unfilled remainder of a submit now rests in the book.
    Added {
        order_id: OrderId,
        user_id: UserId,
    },
    Cancelled {
        order_id: OrderId,
    },
    Trade(Trade),
    /// Synthetic boundary: every event of this command sequence is durable.
    CmdEnd,
}

/// An event as recorded in the outbox.
///
/// `(seq, idx)` orders events totally within one symbol: `seq` is the
/// originating command's sequence number, `idx` the position of the event
/// among that command's events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub seq: u64,
    pub idx: u16,
    pub req_id: u64,
    pub kind: EventKind,
}

impl Event {
    pub fn new(seq: u64, idx: u16, req_id: u64, kind: EventKind) -> Self {
        Event {
            seq,
            idx,
            req_id,
            kind,
        }
    }

    /// Boundary marker written after the last event of command `seq`.
    pub fn cmd_end(seq: u64, idx: u16, req_id: u64) -> Self {
        Event::new(seq, idx, req_id, EventKind::CmdEnd)
    }

    pub fn is_cmd_end(&self) -> bool {
        matches!(self.kind, EventKind::CmdEnd)
    }
}

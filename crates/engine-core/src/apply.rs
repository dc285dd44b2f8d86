//! Validate a command and apply it to a book.
//!
//! This is the only path by which commands reach a book, both live and
//! during WAL replay, so a replayed command produces exactly the events it
//! produced (or would have produced) the first time.

use crate::book::{Emitter, OrderBook};
use crate::messages::{Command, CommandKind, EventKind, RejectReason, SubmitLimit};

/// Why a command cannot be handed to the book.
pub fn validate(cmd: &Command) -> Result<(), RejectReason> {
    match &cmd.kind {
        CommandKind::SubmitLimit(o) => {
            if o.order_id == 0 || o.price <= 0 || o.qty <= 0 {
                Err(RejectReason::BadSubmit)
            } else {
                Ok(())
            }
        }
        CommandKind::Cancel(c) => {
            if c.order_id == 0 {
                Err(RejectReason::BadCancel)
            } else {
                Ok(())
            }
        }
    }
}

/// Apply `cmd` to `book`, reporting every resulting event to `emit`.
///
/// Invalid commands never reach the book: they produce a single
/// `Rejected`. The command-end marker is not emitted here; that is the
/// caller's framing concern.
pub fn apply_command<B>(book: &mut B, cmd: &Command, emit: &mut dyn Emitter)
where
    B: OrderBook + ?Sized,
{
    if let Err(reason) = validate(cmd) {
        emit.emit(rejection(cmd, reason));
        return;
    }

    match &cmd.kind {
        CommandKind::SubmitLimit(order) => book.submit_limit(order, emit),
        CommandKind::Cancel(c) => {
            book.cancel(c.order_id, emit);
        }
    }
}

fn rejection(cmd: &Command, reason: RejectReason) -> EventKind {
    match &cmd.kind {
        CommandKind::SubmitLimit(SubmitLimit {
            order_id, user_id, ..
        }) => EventKind::Rejected {
            order_id: *order_id,
            user_id: *user_id,
            reason,
        },
        CommandKind::Cancel(_) => EventKind::Rejected {
            order_id: 0,
            user_id: 0,
            reason,
        },
    }
}

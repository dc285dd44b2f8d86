//! The seam between a symbol actor and its book.
//!
//! An actor only ever talks to a book through [`OrderBook`], and a book
//! only ever reports what happened through an [`Emitter`]. The actor
//! decides where emitted events go (outbox, nowhere during replay, a
//! `Vec` in tests).

use crate::messages::{EventKind, RejectReason, SubmitLimit};
use crate::order::{Order, OrderId};
use crate::order_book::LevelBook;

/// Sink for the events produced while applying one command.
pub trait Emitter {
    fn emit(&mut self, kind: EventKind);
}

/// Discards everything. Used when replaying commands whose events are
/// already durable.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEmitter;

impl Emitter for NoopEmitter {
    fn emit(&mut self, _kind: EventKind) {}
}

impl Emitter for Vec<EventKind> {
    fn emit(&mut self, kind: EventKind) {
        self.push(kind);
    }
}

/// A single-symbol book as seen by the actor.
///
/// Inputs are already validated (positive price and quantity, non-zero
/// ids); see [`crate::apply::apply_command`].
pub trait OrderBook {
    /// Match a limit order and rest any remainder.
    ///
    /// Emits `Accepted`, then one `Trade` per execution, then `Added` if a
    /// remainder now rests.
    fn submit_limit(&mut self, order: &SubmitLimit, emit: &mut dyn Emitter);

    /// Cancel a resting order.
    ///
    /// Emits exactly one of `Cancelled` or `Rejected(OrderNotFound)` and
    /// returns whether the order was removed.
    fn cancel(&mut self, order_id: OrderId, emit: &mut dyn Emitter) -> bool;
}

impl OrderBook for LevelBook {
    fn submit_limit(&mut self, order: &SubmitLimit, emit: &mut dyn Emitter) {
        if self.contains(order.order_id) {
            emit.emit(EventKind::Rejected {
                order_id: order.order_id,
                user_id: order.user_id,
                reason: RejectReason::DuplicateOrderId,
            });
            return;
        }
        // Checked before matching so an accepted remainder can always rest.
        if self.is_full() {
            emit.emit(EventKind::Rejected {
                order_id: order.order_id,
                user_id: order.user_id,
                reason: RejectReason::BookFull,
            });
            return;
        }

        emit.emit(EventKind::Accepted {
            order_id: order.order_id,
            user_id: order.user_id,
        });

        let mut taker = Order::new(
            order.order_id,
            order.user_id,
            order.side,
            order.price,
            order.qty,
        );
        let rest = self.match_limit(&mut taker, |t| emit.emit(EventKind::Trade(t)));

        if rest > 0 && self.add(taker) {
            emit.emit(EventKind::Added {
                order_id: order.order_id,
                user_id: order.user_id,
            });
        }
    }

    fn cancel(&mut self, order_id: OrderId, emit: &mut dyn Emitter) -> bool {
        if LevelBook::cancel(self, order_id) {
            emit.emit(EventKind::Cancelled { order_id });
            true
        } else {
            emit.emit(EventKind::Rejected {
                order_id,
                user_id: 0,
                reason: RejectReason::OrderNotFound,
            });
            false
        }
    }
}

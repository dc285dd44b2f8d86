//! Resting order and trade representation used inside the book.
//!
//! These are **not** wire types; the book owns `Order` values through
//! its node arena and hands out `Trade` values to an emitter callback.

use crate::side::Side;

pub type OrderId = u64;
pub type UserId = u64;
/// Limit price in integer ticks.
pub type Price = i64;
/// Quantity in integer lots.
pub type Qty = i64;

/// A single order in the book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub side: Side,
    pub price: Price,
    /// Remaining (unfilled) quantity.
    pub qty: Qty,
}

impl Order {
    pub fn new(id: OrderId, user_id: UserId, side: Side, price: Price, qty: Qty) -> Self {
        Order {
            id,
            user_id,
            side,
            price,
            qty,
        }
    }

    /// Returns `true` if the order is fully filled.
    pub fn is_filled(&self) -> bool {
        self.qty <= 0
    }

    /// Fill the order by up to `qty` units.
    ///
    /// Returns the quantity that was actually filled (which will be
    /// `<= qty` and `<= self.qty`).
    pub fn fill(&mut self, qty: Qty) -> Qty {
        let filled = qty.min(self.qty).max(0);
        self.qty -= filled;
        filled
    }
}

/// A single execution between a resting maker and an incoming taker.
///
/// `price` is always the maker's resting price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trade {
    pub maker_id: OrderId,
    pub taker_id: OrderId,
    pub price: Price,
    pub qty: Qty,
}

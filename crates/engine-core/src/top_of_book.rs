//! Helper types for representing top-of-book state.

use crate::order::{Price, Qty};

/// Best price on one side and the total resting quantity there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelSummary {
    pub price: Price,
    pub qty: Qty,
    /// Number of resting orders at `price`.
    pub orders: usize,
}

/// A simple snapshot of top-of-book for a single symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TopOfBookSnapshot {
    pub bid: Option<LevelSummary>,
    pub ask: Option<LevelSummary>,
}

impl TopOfBookSnapshot {
    pub fn new(bid: Option<LevelSummary>, ask: Option<LevelSummary>) -> Self {
        TopOfBookSnapshot { bid, ask }
    }

    /// Returns `true` if there is *no* bid and *no* ask.
    pub fn is_empty(&self) -> bool {
        self.bid.is_none() && self.ask.is_none()
    }

    /// `ask - bid` when both sides are present.
    pub fn spread(&self) -> Option<Price> {
        match (self.bid, self.ask) {
            (Some(b), Some(a)) => Some(a.price - b.price),
            _ => None,
        }
    }
}

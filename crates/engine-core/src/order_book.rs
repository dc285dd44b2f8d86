//! Single-symbol order book with price-time priority.
//!
//! Layout:
//! - Bids / asks: `price -> PriceLevel`, where each level is a FIFO
//!   doubly-linked queue of arena nodes plus running counters.
//! - Best price: a max-heap of bid prices and a min-heap of ask prices.
//!   Levels are removed from the maps eagerly but their heap entries are
//!   left behind (lazy deletion); a heap top is trusted only after it is
//!   checked against the authoritative map, otherwise it is popped.
//! - `order id -> node` index for O(1) cancels.
//!
//! Invariants:
//! - every price present in a map has a non-empty level;
//! - every live level's price is reachable from its side's heap.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use crate::order::{Order, OrderId, Price, Qty, Trade};
use crate::pool::{NodeId, NodePool};
use crate::side::Side;
use crate::top_of_book::{LevelSummary, TopOfBookSnapshot};

/// Heaps are rebuilt from the maps once stale entries outnumber live
/// levels by this factor (plus a floor), bounding their growth under
/// churn far from the top of book.
const HEAP_STALE_FACTOR: usize = 4;
const HEAP_STALE_FLOOR: usize = 1024;

/// FIFO queue of orders resting at one price.
#[derive(Debug)]
struct PriceLevel {
    head: Option<NodeId>,
    tail: Option<NodeId>,
    len: usize,
    total_qty: Qty,
}

impl PriceLevel {
    fn new() -> Self {
        PriceLevel {
            head: None,
            tail: None,
            len: 0,
            total_qty: 0,
        }
    }

    fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Append at the tail: same-price arrivals queue behind earlier ones.
    fn push_back(&mut self, pool: &mut NodePool, id: NodeId) {
        let qty = pool.order(id).map_or(0, |o| o.qty);
        let tail = self.tail;
        {
            let node = pool.node_mut(id);
            node.prev = tail;
            node.next = None;
        }
        match tail {
            Some(t) => pool.node_mut(t).next = Some(id),
            None => self.head = Some(id),
        }
        self.tail = Some(id);
        self.len += 1;
        self.total_qty += qty;
    }

    /// Unlink `id` from anywhere in the queue. The node keeps its order;
    /// the caller releases it to the pool.
    fn unlink(&mut self, pool: &mut NodePool, id: NodeId) {
        let (prev, next) = {
            let node = pool.node(id);
            (node.prev, node.next)
        };
        match prev {
            Some(p) => pool.node_mut(p).next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => pool.node_mut(n).prev = prev,
            None => self.tail = prev,
        }
        let node = pool.node_mut(id);
        node.prev = None;
        node.next = None;

        self.len -= 1;
        self.total_qty -= pool.order(id).map_or(0, |o| o.qty);
    }
}

/// Price-level order book for one symbol.
#[derive(Debug, Default)]
pub struct LevelBook {
    bids: HashMap<Price, PriceLevel>,
    asks: HashMap<Price, PriceLevel>,
    by_id: HashMap<OrderId, NodeId>,
    bid_heap: BinaryHeap<Price>,
    ask_heap: BinaryHeap<Reverse<Price>>,
    pool: NodePool,
}

impl LevelBook {
    pub fn new() -> Self {
        LevelBook::default()
    }

    /// Pre-size the maps and arena for `capacity` resting orders.
    pub fn with_capacity(capacity: usize) -> Self {
        LevelBook {
            bids: HashMap::with_capacity(capacity.min(1024)),
            asks: HashMap::with_capacity(capacity.min(1024)),
            by_id: HashMap::with_capacity(capacity),
            bid_heap: BinaryHeap::new(),
            ask_heap: BinaryHeap::new(),
            pool: NodePool::with_capacity(capacity),
        }
    }

    /// Book that holds at most `max_orders` resting orders.
    pub fn bounded(max_orders: usize) -> Self {
        LevelBook {
            pool: NodePool::new().with_limit(max_orders),
            ..LevelBook::default()
        }
    }

    /// `true` if no further order can rest.
    pub fn is_full(&self) -> bool {
        self.pool.is_full()
    }

    /// Rest `order` at the tail of its price level.
    ///
    /// Returns `false` (and leaves the book unchanged) for a non-positive
    /// quantity, an id that is already resting, or a full book.
    pub fn add(&mut self, order: Order) -> bool {
        if order.qty <= 0 || self.by_id.contains_key(&order.id) {
            return false;
        }

        let (side, price, id) = (order.side, order.price, order.id);
        let Some(node) = self.pool.acquire(order) else {
            return false;
        };

        let Self {
            bids,
            asks,
            bid_heap,
            ask_heap,
            pool,
            ..
        } = self;
        let level = match side {
            Side::Buy => bids.entry(price).or_insert_with(|| {
                bid_heap.push(price);
                PriceLevel::new()
            }),
            Side::Sell => asks.entry(price).or_insert_with(|| {
                ask_heap.push(Reverse(price));
                PriceLevel::new()
            }),
        };
        level.push_back(pool, node);
        self.by_id.insert(id, node);

        self.maybe_compact_heaps();
        true
    }

    /// Remove a resting order by id.
    ///
    /// Returns `false` if the id is unknown; the book is then unchanged.
    pub fn cancel(&mut self, order_id: OrderId) -> bool {
        let Some(node) = self.by_id.remove(&order_id) else {
            return false;
        };
        let Some((side, price)) = self.pool.order(node).map(|o| (o.side, o.price)) else {
            return false;
        };

        let Self {
            bids, asks, pool, ..
        } = self;
        let levels = match side {
            Side::Buy => bids,
            Side::Sell => asks,
        };
        if let Some(level) = levels.get_mut(&price) {
            level.unlink(pool, node);
            if level.is_empty() {
                // Heap entry goes stale and is dropped lazily.
                levels.remove(&price);
            }
        }
        pool.release(node);
        true
    }

    /// Match `taker` against the opposite side without resting any remainder.
    ///
    /// Consumes liquidity best price first and FIFO within a price, calling
    /// `emit` once per execution. Stops when the taker is filled or the best
    /// opposing price no longer satisfies its limit. The unfilled quantity is
    /// left in `taker.qty` and returned, so callers can choose
    /// immediate-or-cancel semantics.
    pub fn match_limit<F>(&mut self, taker: &mut Order, mut emit: F) -> Qty
    where
        F: FnMut(Trade),
    {
        if taker.qty <= 0 {
            return 0;
        }
        let maker_side = taker.side.opposite();

        while taker.qty > 0 {
            let Some(best) = self.best_price(maker_side) else {
                break;
            };
            let crosses = match taker.side {
                Side::Buy => best <= taker.price,
                Side::Sell => best >= taker.price,
            };
            if !crosses {
                break;
            }
            self.consume_level(maker_side, best, taker, &mut emit);
        }

        taker.qty
    }

    /// Match `taker`, then rest whatever is left as a new order.
    ///
    /// Returns the quantity that was rested (0 if fully filled).
    pub fn submit_limit<F>(&mut self, mut taker: Order, emit: F) -> Qty
    where
        F: FnMut(Trade),
    {
        let rest = self.match_limit(&mut taker, emit);
        if rest > 0 && self.add(taker) {
            rest
        } else {
            0
        }
    }

    /// Highest resting bid.
    pub fn best_bid(&mut self) -> Option<Price> {
        self.best_price(Side::Buy)
    }

    /// Lowest resting ask.
    pub fn best_ask(&mut self) -> Option<Price> {
        self.best_price(Side::Sell)
    }

    /// Summary of the level at `price` on `side`, if one exists.
    pub fn level(&self, side: Side, price: Price) -> Option<LevelSummary> {
        self.levels(side).get(&price).map(|lv| LevelSummary {
            price,
            qty: lv.total_qty,
            orders: lv.len,
        })
    }

    /// Resting order ids at `price`, in time priority.
    pub fn level_order_ids(&self, side: Side, price: Price) -> Vec<OrderId> {
        let mut ids = Vec::new();
        let mut cur = self.levels(side).get(&price).and_then(|lv| lv.head);
        while let Some(id) = cur {
            if let Some(o) = self.pool.order(id) {
                ids.push(o.id);
            }
            cur = self.pool.node(id).next;
        }
        ids
    }

    pub fn order(&self, order_id: OrderId) -> Option<&Order> {
        self.by_id
            .get(&order_id)
            .and_then(|node| self.pool.order(*node))
    }

    pub fn contains(&self, order_id: OrderId) -> bool {
        self.by_id.contains_key(&order_id)
    }

    /// Number of resting orders.
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Number of distinct price levels on `side`.
    pub fn depth(&self, side: Side) -> usize {
        self.levels(side).len()
    }

    pub fn pool(&self) -> &NodePool {
        &self.pool
    }

    pub fn top_of_book(&mut self) -> TopOfBookSnapshot {
        let bid = self
            .best_price(Side::Buy)
            .and_then(|p| self.level(Side::Buy, p));
        let ask = self
            .best_price(Side::Sell)
            .and_then(|p| self.level(Side::Sell, p));
        TopOfBookSnapshot::new(bid, ask)
    }

    // -------------------------------------------------------------------------
    // Internal helpers
    // -------------------------------------------------------------------------

    fn levels(&self, side: Side) -> &HashMap<Price, PriceLevel> {
        match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        }
    }

    /// Best live price on `side`, discarding stale heap entries on the way.
    fn best_price(&mut self, side: Side) -> Option<Price> {
        match side {
            Side::Buy => {
                while let Some(&p) = self.bid_heap.peek() {
                    if self.bids.get(&p).is_some_and(|lv| !lv.is_empty()) {
                        return Some(p);
                    }
                    self.bid_heap.pop();
                }
                None
            }
            Side::Sell => {
                while let Some(&Reverse(p)) = self.ask_heap.peek() {
                    if self.asks.get(&p).is_some_and(|lv| !lv.is_empty()) {
                        return Some(p);
                    }
                    self.ask_heap.pop();
                }
                None
            }
        }
    }

    /// Fill `taker` against the level at `price` on `maker_side`, FIFO.
    fn consume_level<F>(&mut self, maker_side: Side, price: Price, taker: &mut Order, emit: &mut F)
    where
        F: FnMut(Trade),
    {
        let Self {
            bids,
            asks,
            by_id,
            pool,
            ..
        } = self;
        let levels = match maker_side {
            Side::Buy => bids,
            Side::Sell => asks,
        };
        let Some(level) = levels.get_mut(&price) else {
            return;
        };

        while taker.qty > 0 {
            let Some(head) = level.head else {
                break;
            };
            let Some(maker) = pool.order_mut(head) else {
                break;
            };

            let exec = taker.qty.min(maker.qty);
            emit(Trade {
                maker_id: maker.id,
                taker_id: taker.id,
                price,
                qty: exec,
            });
            taker.fill(exec);
            maker.fill(exec);
            level.total_qty -= exec;

            if maker.is_filled() {
                let maker_id = maker.id;
                level.unlink(pool, head);
                by_id.remove(&maker_id);
                pool.release(head);
            }
        }

        if level.is_empty() {
            levels.remove(&price);
        }
    }

    fn maybe_compact_heaps(&mut self) {
        if self.bid_heap.len() > self.bids.len() * HEAP_STALE_FACTOR + HEAP_STALE_FLOOR {
            self.bid_heap = self.bids.keys().copied().collect();
        }
        if self.ask_heap.len() > self.asks.len() * HEAP_STALE_FACTOR + HEAP_STALE_FLOOR {
            self.ask_heap = self.asks.keys().copied().map(Reverse).collect();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buy(id: u64, price: i64, qty: i64) -> Order {
        Order::new(id, 100 + id, Side::Buy, price, qty)
    }

    fn sell(id: u64, price: i64, qty: i64) -> Order {
        Order::new(id, 100 + id, Side::Sell, price, qty)
    }

    fn submit(book: &mut LevelBook, order: Order) -> Vec<Trade> {
        let mut trades = Vec::new();
        book.submit_limit(order, |t| trades.push(t));
        trades
    }

    #[test]
    fn full_cross_empties_book() {
        let mut book = LevelBook::new();
        assert!(submit(&mut book, buy(1, 100, 10)).is_empty());
        let trades = submit(&mut book, sell(2, 100, 10));

        assert_eq!(
            trades,
            vec![Trade {
                maker_id: 1,
                taker_id: 2,
                price: 100,
                qty: 10
            }]
        );
        assert!(book.is_empty());
        assert_eq!(book.best_bid(), None);
        assert_eq!(book.best_ask(), None);
    }

    #[test]
    fn walks_levels_in_price_order() {
        let mut book = LevelBook::new();
        submit(&mut book, sell(1, 100, 1));
        submit(&mut book, sell(2, 101, 1));

        let trades = submit(&mut book, buy(3, 101, 2));
        assert_eq!(trades.len(), 2);
        assert_eq!((trades[0].price, trades[0].qty, trades[0].maker_id), (100, 1, 1));
        assert_eq!((trades[1].price, trades[1].qty, trades[1].maker_id), (101, 1, 2));
        assert!(book.is_empty());
    }

    #[test]
    fn fifo_within_a_level() {
        let mut book = LevelBook::new();
        submit(&mut book, sell(1, 100, 2));
        submit(&mut book, sell(2, 100, 2));
        submit(&mut book, sell(3, 100, 2));
        assert_eq!(book.level_order_ids(Side::Sell, 100), vec![1, 2, 3]);

        let trades = submit(&mut book, buy(9, 100, 3));
        assert_eq!(trades[0].maker_id, 1);
        assert_eq!(trades[1].maker_id, 2);
        assert_eq!(trades[1].qty, 1);
        assert_eq!(book.level_order_ids(Side::Sell, 100), vec![2, 3]);
        assert_eq!(book.order(2).map(|o| o.qty), Some(1));
        assert_eq!(book.level(Side::Sell, 100).map(|l| l.qty), Some(3));
    }

    #[test]
    fn stops_at_limit_and_rests_remainder() {
        let mut book = LevelBook::new();
        submit(&mut book, sell(1, 100, 1));
        submit(&mut book, sell(2, 105, 1));

        let mut trades = Vec::new();
        let rested = book.submit_limit(buy(3, 102, 5), |t| trades.push(t));
        assert_eq!(trades.len(), 1);
        assert_eq!(rested, 4);
        assert_eq!(book.best_bid(), Some(102));
        assert_eq!(book.best_ask(), Some(105));
        assert_eq!(book.order(3).map(|o| o.qty), Some(4));
    }

    #[test]
    fn match_only_never_rests() {
        let mut book = LevelBook::new();
        submit(&mut book, sell(1, 100, 1));

        let mut taker = buy(2, 100, 3);
        let rest = book.match_limit(&mut taker, |_| {});
        assert_eq!(rest, 2);
        assert!(!book.contains(2));
        assert!(book.is_empty());
    }

    #[test]
    fn cancel_is_idempotent() {
        let mut book = LevelBook::new();
        submit(&mut book, sell(1, 100, 1));
        assert!(book.cancel(1));
        assert!(!book.cancel(1));
        assert!(!book.cancel(42));
        assert!(book.is_empty());

        // The cancelled ask must not match.
        let trades = submit(&mut book, buy(2, 100, 1));
        assert!(trades.is_empty());
        assert_eq!(book.best_bid(), Some(100));
    }

    #[test]
    fn cancel_middle_of_queue_keeps_links() {
        let mut book = LevelBook::new();
        for id in 1..=3 {
            submit(&mut book, buy(id, 50, 1));
        }
        assert!(book.cancel(2));
        assert_eq!(book.level_order_ids(Side::Buy, 50), vec![1, 3]);
        assert!(book.cancel(3));
        assert_eq!(book.level_order_ids(Side::Buy, 50), vec![1]);
        submit(&mut book, buy(4, 50, 1));
        assert_eq!(book.level_order_ids(Side::Buy, 50), vec![1, 4]);
    }

    #[test]
    fn stale_heap_entries_are_skipped() {
        let mut book = LevelBook::new();
        submit(&mut book, buy(1, 105, 1));
        submit(&mut book, buy(2, 100, 1));
        assert!(book.cancel(1));
        // 105 is still in the heap, but no longer a live level.
        assert_eq!(book.best_bid(), Some(100));

        // Re-creating a level at a stale price works.
        submit(&mut book, buy(3, 105, 2));
        assert_eq!(book.best_bid(), Some(105));
        assert_eq!(book.level(Side::Buy, 105).map(|l| l.qty), Some(2));
    }

    #[test]
    fn duplicate_and_empty_orders_are_ignored() {
        let mut book = LevelBook::new();
        assert!(book.add(buy(1, 100, 1)));
        assert!(!book.add(buy(1, 101, 1)));
        assert!(!book.add(buy(2, 100, 0)));
        assert_eq!(book.len(), 1);
    }

    #[test]
    fn filled_makers_return_nodes_to_pool() {
        let mut book = LevelBook::new();
        submit(&mut book, sell(1, 100, 1));
        submit(&mut book, sell(2, 100, 1));
        submit(&mut book, buy(3, 100, 2));
        assert_eq!(book.pool().live(), 0);
        assert_eq!(book.pool().free_len(), 2);

        submit(&mut book, sell(4, 100, 1));
        assert_eq!(book.pool().allocated(), 2, "arena should reuse freed nodes");
    }

    #[test]
    fn top_of_book_reports_best_levels() {
        let mut book = LevelBook::new();
        submit(&mut book, buy(1, 99, 3));
        submit(&mut book, buy(2, 99, 2));
        submit(&mut book, sell(3, 101, 4));
        let tob = book.top_of_book();
        assert_eq!(
            tob.bid,
            Some(LevelSummary {
                price: 99,
                qty: 5,
                orders: 2
            })
        );
        assert_eq!(tob.ask.map(|l| l.price), Some(101));
        assert_eq!(tob.spread(), Some(2));
    }

    #[test]
    fn heaps_are_compacted_under_churn() {
        let mut book = LevelBook::new();
        submit(&mut book, buy(1, 1, 1));
        for i in 0..5_000u64 {
            let id = 10 + i;
            assert!(book.add(buy(id, 2 + i as i64, 1)));
            assert!(book.cancel(id));
        }
        assert!(book.bid_heap.len() <= HEAP_STALE_FLOOR + 2 * HEAP_STALE_FACTOR);
        assert_eq!(book.best_bid(), Some(1));
    }
}

//! Index-keyed node arena for the price-level FIFO queues.
//!
//! Nodes are addressed by [`NodeId`] (a slot index) rather than by
//! pointer, so the doubly-linked level queues can be expressed without
//! `unsafe` or reference counting. Released slots go on a free list and
//! are handed out again by the next [`NodePool::acquire`], which keeps the
//! hot insert/remove path allocation-free once the arena has warmed up.
//!
//! A released node has every owning reference cleared (`prev`, `next`,
//! and the order itself) before it becomes reusable.

use crate::order::Order;

/// Most slots a pool can address with a [`NodeId`].
pub const MAX_NODES: usize = u32::MAX as usize;

/// Handle to a slot in a [`NodePool`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

impl NodeId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// One queue entry: links to its neighbours at the same price plus the
/// resting order it owns.
#[derive(Debug, Default)]
pub(crate) struct Node {
    pub(crate) prev: Option<NodeId>,
    pub(crate) next: Option<NodeId>,
    pub(crate) order: Option<Order>,
}

impl Node {
    fn is_cleared(&self) -> bool {
        self.prev.is_none() && self.next.is_none() && self.order.is_none()
    }
}

#[derive(Debug)]
pub struct NodePool {
    nodes: Vec<Node>,
    free: Vec<NodeId>,
    limit: usize,
}

impl Default for NodePool {
    fn default() -> Self {
        NodePool {
            nodes: Vec::new(),
            free: Vec::new(),
            limit: MAX_NODES,
        }
    }
}

impl NodePool {
    pub fn new() -> Self {
        NodePool::default()
    }

    /// Pre-size the arena for `capacity` resting orders.
    pub fn with_capacity(capacity: usize) -> Self {
        NodePool {
            nodes: Vec::with_capacity(capacity),
            ..NodePool::default()
        }
    }

    /// Cap the number of slots (live plus free) at `limit`.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.min(MAX_NODES);
        self
    }

    /// `true` if the next [`acquire`](Self::acquire) would fail.
    pub fn is_full(&self) -> bool {
        self.free.is_empty() && self.nodes.len() >= self.limit
    }

    /// Take a slot (reusing a released one when available) and store `order` in it.
    ///
    /// `None` once the pool is full; `order` is dropped.
    pub fn acquire(&mut self, order: Order) -> Option<NodeId> {
        if let Some(id) = self.free.pop() {
            let node = &mut self.nodes[id.index()];
            debug_assert!(node.is_cleared(), "free-listed node still holds references");
            node.order = Some(order);
            return Some(id);
        }
        if self.nodes.len() >= self.limit {
            return None;
        }
        let id = NodeId(u32::try_from(self.nodes.len()).ok()?);
        self.nodes.push(Node {
            prev: None,
            next: None,
            order: Some(order),
        });
        Some(id)
    }

    /// Return a slot to the pool, handing back the order it held.
    pub fn release(&mut self, id: NodeId) -> Option<Order> {
        let node = &mut self.nodes[id.index()];
        node.prev = None;
        node.next = None;
        let order = node.order.take();
        if order.is_some() {
            self.free.push(id);
        }
        order
    }

    pub fn order(&self, id: NodeId) -> Option<&Order> {
        self.nodes.get(id.index()).and_then(|n| n.order.as_ref())
    }

    pub fn order_mut(&mut self, id: NodeId) -> Option<&mut Order> {
        self.nodes.get_mut(id.index()).and_then(|n| n.order.as_mut())
    }

    pub(crate) fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    /// Slots currently holding an order.
    pub fn live(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    /// Slots waiting on the free list.
    pub fn free_len(&self) -> usize {
        self.free.len()
    }

    /// Total slots ever allocated.
    pub fn allocated(&self) -> usize {
        self.nodes.len()
    }

    /// `true` if the slot is on the free list with every reference cleared.
    pub fn is_vacant(&self, id: NodeId) -> bool {
        self.free.contains(&id) && self.node(id).is_cleared()
    }
}

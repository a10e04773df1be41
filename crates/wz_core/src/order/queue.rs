//! Order queue.
//!
//! Orders given with the queue modifier wait here until the current order
//! runs out. Entries up to `list_size` are live and run in insertion order;
//! entries past it are pending and wait for [`OrderQueue::synchronise_pending`].

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::{order_droid_base, OrderKind, OrderOutcome, OrderRequest, RejectReason};
use crate::droid::Droid;
use crate::environment::Environment;
use crate::object::ObjectId;
use crate::world::World;

/// Orders waiting to run.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OrderQueue {
    list: Vec<OrderRequest>,
    list_size: usize,
}

impl OrderQueue {
    /// Number of live (runnable) entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.list_size
    }

    /// True when nothing is waiting to run.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.list_size == 0
    }

    /// Number of entries waiting for synchronisation.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.list.len() - self.list_size
    }

    /// Live entries in run order.
    pub fn iter(&self) -> impl Iterator<Item = &OrderRequest> {
        self.list[..self.list_size].iter()
    }

    /// Every entry, live and pending, in order.
    #[must_use]
    pub fn entries(&self) -> &[OrderRequest] {
        &self.list
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.list.clear();
        self.list_size = 0;
    }

    /// Append a live entry, ahead of any pending ones.
    pub fn push(&mut self, request: OrderRequest) {
        self.list.insert(self.list_size, request);
        self.list_size += 1;
    }

    /// Append an entry that waits for synchronisation.
    pub fn push_pending(&mut self, request: OrderRequest) {
        self.list.push(request);
    }

    /// Make every pending entry live.
    pub fn synchronise_pending(&mut self) {
        self.list_size = self.list.len();
    }

    /// Take the first live entry.
    pub fn pop_front(&mut self) -> Option<OrderRequest> {
        if self.list_size == 0 {
            return None;
        }
        self.list_size -= 1;
        Some(self.list.remove(0))
    }

    /// Remove entries `begin..end`, keeping the live/pending split in step.
    pub fn erase_range(&mut self, begin: usize, end: usize) {
        let end = end.min(self.list.len());
        if begin >= end {
            return;
        }
        let live_removed = self.list_size.min(end).saturating_sub(begin);
        self.list.drain(begin..end);
        self.list_size -= live_removed;
    }

    /// Remove entries whose target is `id`.
    pub fn clear_target(&mut self, id: ObjectId) {
        let mut i = 0;
        while i < self.list.len() {
            if self.list[i].target == Some(id) {
                self.erase_range(i, i + 1);
            } else {
                i += 1;
            }
        }
    }

    /// Remove entries whose target is gone.
    pub fn check_list(&mut self, world: &World) {
        let mut i = 0;
        while i < self.list.len() {
            let entry = &self.list[i];
            let dead = entry.kind.needs_target() && !entry.target.is_some_and(|t| world.is_alive(t));
            if dead {
                trace!(order = entry.kind.name(), "queued order lost its target");
                self.erase_range(i, i + 1);
            } else {
                i += 1;
            }
        }
    }
}

/// Queue an order behind the current one.
///
/// An idle droid with an otherwise empty queue starts the order at once.
pub fn order_droid_add(
    world: &mut World,
    env: &mut Environment,
    droid: &mut Droid,
    request: &OrderRequest,
) -> OrderOutcome {
    if !request.kind.queueable() {
        debug!(droid = droid.id.0, order = request.kind.name(), "order cannot be queued");
        return OrderOutcome::Rejected(RejectReason::NotQueueable);
    }
    let located = request.pos.is_some() && request.target.is_none() && request.template.is_none();
    if located && !matches!(request.kind, OrderKind::Move | OrderKind::Scout | OrderKind::Disembark) {
        return OrderOutcome::Rejected(RejectReason::NotQueueable);
    }
    if request.kind.needs_target() && !request.target.is_some_and(|t| world.is_alive(t)) {
        return OrderOutcome::Rejected(RejectReason::DeadTarget);
    }

    droid.order_queue.push(request.clone());
    trace!(droid = droid.id.0, order = request.kind.name(), len = droid.order_queue.len(), "order queued");

    let idle = matches!(
        droid.order.kind(),
        OrderKind::None | OrderKind::Guard | OrderKind::Patrol | OrderKind::Circle | OrderKind::TempHold
    );
    if droid.order_queue.len() <= 1 && idle {
        order_droid_list(world, env, droid);
        return OrderOutcome::Accepted;
    }
    OrderOutcome::Queued
}

/// Start the next queued order. Returns false if the queue was empty.
pub fn order_droid_list(world: &mut World, env: &mut Environment, droid: &mut Droid) -> bool {
    let Some(request) = droid.order_queue.pop_front() else {
        return false;
    };
    debug!(droid = droid.id.0, order = request.kind.name(), "next queued order");
    order_droid_base(world, env, droid, &request);
    true
}

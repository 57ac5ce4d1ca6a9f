//! Per-node I/O queues and the fairness scheduler that drains them.
//!
//! Only the queue itself is locked. The scheduler polls emptiness one node at
//! a time and holds no lock across the walk, so the queue it points at may
//! already be empty (or fuller) when the caller locks it to pop. Callers
//! re-check under [IoQueue::lock].

use alloc::{collections::vec_deque::VecDeque, vec::Vec};
use spin::mutex::MutexGuard;
use utils::sync::SpinLock;

use crate::{error::TopologyError, node::NodeId, tree::Topology};

#[derive(Debug)]
pub struct IoQueue<Io> {
    queue: SpinLock<VecDeque<Io>>,
}

impl<Io> Default for IoQueue<Io> {
    fn default() -> Self {
        IoQueue::new()
    }
}

impl<Io> IoQueue<Io> {
    pub const fn new() -> IoQueue<Io> {
        IoQueue {
            queue: SpinLock::new(VecDeque::new()),
        }
    }

    /// Append `io`; it is handed back if the queue cannot grow.
    pub fn push(&self, io: Io) -> Result<(), Io> {
        let mut queue = self.queue.lock();
        if queue.try_reserve(1).is_err() {
            return Err(io);
        }
        queue.push_back(io);
        Ok(())
    }

    pub fn pop(&self) -> Option<Io> {
        self.queue.lock().pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    /// Hold the queue lock for a check-then-pop sequence.
    pub fn lock(&self) -> MutexGuard<'_, VecDeque<Io>> {
        self.queue.lock()
    }

    /// Take everything that is queued, oldest first.
    pub fn drain(&self) -> Vec<Io> {
        self.queue.with(|queue| queue.drain(..).collect())
    }
}

enum Walk {
    Done(Option<NodeId>),
    Exhausted,
}

impl<Io> Topology<Io> {
    pub fn io_queue_push(&self, id: NodeId, io: Io) -> Result<(), TopologyError> {
        let node = self.node(id).ok_or(TopologyError::NodeNotFound(id))?;
        node.io_queue.push(io).map_err(|_| TopologyError::OutOfMemory)
    }

    pub fn io_queue_pop(&self, id: NodeId) -> Option<Io> {
        self.node(id)?.io_queue.pop()
    }

    /// A missing node has nothing queued.
    pub fn io_queue_is_empty(&self, id: NodeId) -> bool {
        self.node(id).is_none_or(|node| node.io_queue.is_empty())
    }

    pub fn lock_io_queue(&self, id: NodeId) -> Option<MutexGuard<'_, VecDeque<Io>>> {
        Some(self.node(id)?.io_queue.lock())
    }

    /// Find a node under `id` with queued I/O, rotating across children.
    ///
    /// The walk resumes after the child recorded in `id`'s cursor and wraps
    /// around to the first child. A child with an empty queue but children of
    /// its own ends the walk here: whatever the search inside it returns is
    /// the answer for this call. Every child visited moves the cursor, so
    /// repeated calls spread attention over siblings.
    pub fn get_first_device_with_io(&self, id: NodeId) -> Option<NodeId> {
        let node = self.node(id)?;
        if let Some(cursor) = node.last_io_id()
            && self.parent(cursor) == Some(id)
        {
            let next = self.get_next_child(id, cursor);
            if let Walk::Done(found) = self.walk_for_io(id, next) {
                return found;
            }
        }
        if let Walk::Done(found) = self.walk_for_io(id, self.get_first_child(id)) {
            return found;
        }
        node.set_last_io_id(None);
        None
    }

    fn walk_for_io(&self, id: NodeId, start: Option<NodeId>) -> Walk {
        let Some(node) = self.node(id) else {
            return Walk::Exhausted;
        };
        let mut candidate = start;
        node.set_last_io_id(candidate);
        while let Some(current) = candidate {
            if !self.io_queue_is_empty(current) {
                return Walk::Done(Some(current));
            }
            if self.get_child_count(current) != 0 {
                return Walk::Done(self.get_first_device_with_io(current));
            }
            candidate = self.get_next_child(id, current);
            node.set_last_io_id(candidate);
        }
        Walk::Exhausted
    }
}

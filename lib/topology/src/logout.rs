//! Flat list of nodes being logged out, built without touching tree links.

use alloc::collections::vec_deque::{self, VecDeque};

use crate::{
    error::TopologyError,
    node::NodeId,
    state::ComponentState,
    tree::Topology,
};

/// One node reported as logging out. Holds the id only; the node may be gone
/// by the time the element is consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogoutQueueElement {
    pub device: NodeId,
}

#[derive(Debug, Default)]
pub struct LogoutQueue {
    elements: VecDeque<LogoutQueueElement>,
}

impl LogoutQueue {
    pub const fn new() -> LogoutQueue {
        LogoutQueue {
            elements: VecDeque::new(),
        }
    }

    pub fn push(&mut self, device: NodeId) -> Result<(), TopologyError> {
        self.elements
            .try_reserve(1)
            .map_err(|_| TopologyError::OutOfMemory)?;
        self.elements.push_back(LogoutQueueElement { device });
        Ok(())
    }

    pub fn pop(&mut self) -> Option<NodeId> {
        self.elements.pop_front().map(|element| element.device)
    }

    pub fn front(&self) -> Option<NodeId> {
        self.elements.front().map(|element| element.device)
    }

    /// The element queued right after the first occurrence of `device`.
    pub fn next_after(&self, device: NodeId) -> Option<NodeId> {
        let position = self
            .elements
            .iter()
            .position(|element| element.device == device)?;
        self.elements.get(position + 1).map(|element| element.device)
    }

    /// Drop every element that refers to `device`.
    pub fn remove(&mut self, device: NodeId) -> usize {
        let before = self.elements.len();
        self.elements.retain(|element| element.device != device);
        before - self.elements.len()
    }

    pub fn contains(&self, device: NodeId) -> bool {
        self.elements.iter().any(|element| element.device == device)
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn iter(&self) -> vec_deque::Iter<'_, LogoutQueueElement> {
        self.elements.iter()
    }
}

impl<Io> Topology<Io> {
    /// Append every descendant of `id` to `queue` and mark it `LogoutPending`.
    ///
    /// Children are taken in order; a child's own descendants are appended
    /// before the child. On failure the elements already queued and the
    /// states already changed stay as they are.
    pub fn add_all_children_to_logout_queue(
        &mut self,
        id: NodeId,
        queue: &mut LogoutQueue,
    ) -> Result<(), TopologyError> {
        if !self.contains(id) {
            return Err(TopologyError::NodeNotFound(id));
        }
        let mut index = 0;
        while let Some(child) = self.child_at(id, index) {
            if self.get_child_count(child) != 0 {
                self.add_all_children_to_logout_queue(child, queue)?;
            }
            queue.push(child)?;
            if let Some(node) = self.node_mut(child) {
                node.set_state(ComponentState::LogoutPending);
            }
            index += 1;
        }
        Ok(())
    }
}

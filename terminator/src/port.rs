use core::sync::atomic::{AtomicU64, Ordering};
use topology::{LogoutQueue, NodeId};
use utils::sync::SpinLock;

/// Per-port bookkeeping kept next to the component tree.
#[derive(Debug)]
pub struct Port {
    node: NodeId,
    pub(crate) logout_queue: SpinLock<LogoutQueue>,
    completed_io: AtomicU64,
}

impl Port {
    pub fn new(node: NodeId) -> Port {
        Port {
            node,
            logout_queue: SpinLock::new(LogoutQueue::new()),
            completed_io: AtomicU64::new(0),
        }
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn completed_io(&self) -> u64 {
        self.completed_io.load(Ordering::Relaxed)
    }

    pub(crate) fn count_completion(&self) {
        self.completed_io.fetch_add(1, Ordering::Relaxed);
    }
}

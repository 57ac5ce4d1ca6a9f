//! Login/logout state of a component.
//!
//! The external scheduler announces presence changes upstream and moves
//! nodes through these states. Every transition is a plain overwrite except
//! `LogoutComplete`, which is refused while the node is `LoginPending`: a
//! device that already started logging back in must not be reported as gone.

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::{error::TopologyError, node::{ComponentNode, NodeId}, tree::Topology};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u32)]
pub enum ComponentState {
    Initialized = 0,
    LoginPending = 1,
    LoginComplete = 2,
    LogoutPending = 3,
    LogoutComplete = 4,
}

// A `#[default]` variant would also become the `TryFromPrimitive` fallback.
impl Default for ComponentState {
    fn default() -> Self {
        ComponentState::Initialized
    }
}

impl<Io> ComponentNode<Io> {
    pub fn state(&self) -> ComponentState {
        self.state
    }

    pub fn set_state(&mut self, requested: ComponentState) {
        match requested {
            ComponentState::LogoutComplete => {
                if self.state != ComponentState::LoginPending {
                    self.state = ComponentState::LogoutComplete;
                }
            }
            other => self.state = other,
        }
    }

    /// Set the state from its raw code. Unknown codes reset to `Initialized`.
    pub fn set_state_code(&mut self, code: u32) {
        let requested = ComponentState::try_from(code).unwrap_or(ComponentState::Initialized);
        self.set_state(requested);
    }

    pub fn set_login_pending(&mut self, pending: bool) {
        if pending {
            self.set_state(ComponentState::LoginPending);
        } else {
            self.set_state(ComponentState::LoginComplete);
        }
    }

    pub fn is_login_pending(&self) -> bool {
        self.state == ComponentState::LoginPending
    }

    /// Only `true` has an effect; leaving `LogoutComplete` happens by logging in again.
    pub fn set_logout_complete(&mut self, complete: bool) {
        if complete {
            self.set_state(ComponentState::LogoutComplete);
        }
    }

    pub fn is_logout_complete(&self) -> bool {
        self.state == ComponentState::LogoutComplete
    }
}

impl<Io> Topology<Io> {
    /// Apply `set_login_pending(pending)` to every descendant of `id`, each
    /// child's own subtree before the child.
    pub fn set_all_children_login_pending(
        &mut self,
        id: NodeId,
        pending: bool,
    ) -> Result<(), TopologyError> {
        self.for_each_descendant(id, &mut |node| node.set_login_pending(pending))
    }

    /// Same walk as [Topology::set_all_children_login_pending]. Descendants
    /// that are `LoginPending` keep their state.
    pub fn set_all_children_logout_complete(
        &mut self,
        id: NodeId,
        complete: bool,
    ) -> Result<(), TopologyError> {
        self.for_each_descendant(id, &mut |node| node.set_logout_complete(complete))
    }

    fn for_each_descendant(
        &mut self,
        id: NodeId,
        apply: &mut dyn FnMut(&mut ComponentNode<Io>),
    ) -> Result<(), TopologyError> {
        if !self.contains(id) {
            return Err(TopologyError::NodeNotFound(id));
        }
        let mut index = 0;
        while let Some(child) = self.child_at(id, index) {
            self.for_each_descendant(child, apply)?;
            if let Some(node) = self.node_mut(child) {
                apply(node);
            }
            index += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [ComponentState; 5] = [
        ComponentState::Initialized,
        ComponentState::LoginPending,
        ComponentState::LoginComplete,
        ComponentState::LogoutPending,
        ComponentState::LogoutComplete,
    ];

    fn node_in(state: ComponentState) -> ComponentNode<()> {
        let mut node = ComponentNode::new();
        node.state = state;
        node
    }

    #[test]
    fn plain_transitions_always_apply() {
        for from in ALL {
            for to in &ALL[..4] {
                let mut node = node_in(from);
                node.set_state(*to);
                assert_eq!(node.state(), *to);
            }
        }
    }

    #[test]
    fn logout_complete_is_refused_while_login_pending() {
        let mut node = node_in(ComponentState::LoginPending);
        node.set_logout_complete(true);
        assert!(!node.is_logout_complete());
        assert!(node.is_login_pending());

        for from in ALL.into_iter().filter(|s| *s != ComponentState::LoginPending) {
            let mut node = node_in(from);
            node.set_logout_complete(true);
            assert!(node.is_logout_complete(), "from {:?}", from);
        }
    }

    #[test]
    fn logout_complete_false_is_a_no_op() {
        let mut node = node_in(ComponentState::LogoutComplete);
        node.set_logout_complete(false);
        assert!(node.is_logout_complete());
        node.set_login_pending(true);
        assert!(!node.is_logout_complete());
    }

    #[test]
    fn login_pending_helpers() {
        let mut node = node_in(ComponentState::Initialized);
        node.set_login_pending(true);
        assert!(node.is_login_pending());
        node.set_login_pending(false);
        assert_eq!(node.state(), ComponentState::LoginComplete);
    }

    #[test]
    fn unknown_codes_fall_back_to_initialized() {
        let mut node = node_in(ComponentState::LoginComplete);
        node.set_state_code(3);
        assert_eq!(node.state(), ComponentState::LogoutPending);
        node.set_state_code(99);
        assert_eq!(node.state(), ComponentState::Initialized);
        assert!(ComponentState::try_from(99u32).is_err());
        assert_eq!(ComponentState::default(), ComponentState::Initialized);

        let mut pending = node_in(ComponentState::LoginPending);
        pending.set_state_code(u32::from(ComponentState::LogoutComplete));
        assert!(pending.is_login_pending());
    }

    #[test]
    fn bulk_helpers_cover_the_subtree_only() {
        let mut topology: Topology<()> = Topology::new();
        let root = topology.create_node().unwrap();
        let mid = topology.create_node().unwrap();
        let leaf = topology.create_node().unwrap();
        let other = topology.create_node().unwrap();
        topology.add_child(root, mid).unwrap();
        topology.add_child(mid, leaf).unwrap();
        topology.add_child(root, other).unwrap();

        topology.set_all_children_login_pending(root, true).unwrap();
        assert!(!topology.node(root).unwrap().is_login_pending());
        for id in [mid, leaf, other] {
            assert!(topology.node(id).unwrap().is_login_pending());
        }

        // Still pending: the guard drops every request.
        topology.set_all_children_logout_complete(root, true).unwrap();
        assert!(topology.node(leaf).unwrap().is_login_pending());

        topology.set_all_children_login_pending(root, false).unwrap();
        topology.set_all_children_logout_complete(mid, true).unwrap();
        assert!(topology.node(leaf).unwrap().is_logout_complete());
        assert_eq!(
            topology.node(other).unwrap().state(),
            ComponentState::LoginComplete
        );
    }
}

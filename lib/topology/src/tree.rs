use alloc::boxed::Box;
use log::{debug, error, warn};
use registry::DeviceRegistry;
use slotmap::SlotMap;

use crate::{
    MAX_COMPONENTS,
    attributes::{AttributeDestroyer, DefaultAttributeDestroyer},
    error::TopologyError,
    node::{ComponentNode, ComponentType, NodeId},
};

/// Arena owning every component node.
pub struct Topology<Io> {
    nodes: SlotMap<NodeId, ComponentNode<Io>>,
    limit: usize,
    destroyer: Box<dyn AttributeDestroyer + Send + Sync>,
}

impl<Io> Default for Topology<Io> {
    fn default() -> Self {
        Topology::new()
    }
}

impl<Io> Topology<Io> {
    pub fn new() -> Topology<Io> {
        Topology::with_destroyer(Box::new(DefaultAttributeDestroyer))
    }

    pub fn with_destroyer(destroyer: Box<dyn AttributeDestroyer + Send + Sync>) -> Topology<Io> {
        Topology::with_limit(MAX_COMPONENTS, destroyer)
    }

    pub fn with_limit(
        limit: usize,
        destroyer: Box<dyn AttributeDestroyer + Send + Sync>,
    ) -> Topology<Io> {
        Topology {
            nodes: SlotMap::with_key(),
            limit: limit.min(MAX_COMPONENTS),
            destroyer,
        }
    }

    /// Allocate an initialized, unlinked node.
    pub fn create_node(&mut self) -> Result<NodeId, TopologyError> {
        if self.nodes.len() >= self.limit {
            return Err(TopologyError::ArenaFull);
        }
        Ok(self.nodes.insert(ComponentNode::new()))
    }

    /// Re-initialize a node in place. It must not be linked to anything.
    pub fn init_node(&mut self, id: NodeId) -> Result<(), TopologyError> {
        let node = self.node_ref(id)?;
        if node.parent.is_some() {
            return Err(TopologyError::AlreadyLinked(id));
        }
        if !node.children.is_empty() {
            return Err(TopologyError::HasChildren {
                node: id,
                count: node.children.len(),
            });
        }
        self.node_mut_ref(id)?.init();
        Ok(())
    }

    pub fn node(&self, id: NodeId) -> Option<&ComponentNode<Io>> {
        self.nodes.get(id)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut ComponentNode<Io>> {
        self.nodes.get_mut(id)
    }

    fn node_ref(&self, id: NodeId) -> Result<&ComponentNode<Io>, TopologyError> {
        self.node(id).ok_or(TopologyError::NodeNotFound(id))
    }

    fn node_mut_ref(&mut self, id: NodeId) -> Result<&mut ComponentNode<Io>, TopologyError> {
        self.node_mut(id).ok_or(TopologyError::NodeNotFound(id))
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Ids of all live nodes, in arena order.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys()
    }

    /// Live nodes without a parent.
    pub fn roots(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .iter()
            .filter(|(_, node)| node.parent.is_none())
            .map(|(id, _)| id)
    }

    pub fn component_type(&self, id: NodeId) -> Option<ComponentType> {
        self.node(id).map(ComponentNode::component_type)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id)?.parent
    }

    /// Nearest ancestor of `id` (itself included) of the given type.
    pub fn find_ancestor(&self, id: NodeId, component_type: ComponentType) -> Option<NodeId> {
        let mut current = Some(id);
        while let Some(node_id) = current {
            let node = self.node(node_id)?;
            if node.component_type == component_type {
                return Some(node_id);
            }
            current = node.parent;
        }
        None
    }

    pub fn add_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), TopologyError> {
        self.check_link(parent, child)?;
        self.reserve_child(parent)?;
        self.node_mut_ref(parent)?.children.push(child);
        self.node_mut_ref(child)?.parent = Some(parent);
        Ok(())
    }

    /// Like [Topology::add_child], but the child goes ahead of its siblings.
    pub fn add_child_to_front(
        &mut self,
        parent: NodeId,
        child: NodeId,
    ) -> Result<(), TopologyError> {
        self.check_link(parent, child)?;
        self.reserve_child(parent)?;
        self.node_mut_ref(parent)?.children.insert(0, child);
        self.node_mut_ref(child)?.parent = Some(parent);
        Ok(())
    }

    fn check_link(&self, parent: NodeId, child: NodeId) -> Result<(), TopologyError> {
        self.node_ref(parent)?;
        if let Some(current) = self.node_ref(child)?.parent {
            debug!(
                "node {:#x} is already linked under {:#x}",
                child.to_raw(),
                current.to_raw()
            );
            return Err(TopologyError::AlreadyLinked(child));
        }
        let mut ancestor = Some(parent);
        while let Some(node) = ancestor {
            if node == child {
                return Err(TopologyError::CycleDetected { parent, child });
            }
            ancestor = self.parent(node);
        }
        Ok(())
    }

    fn reserve_child(&mut self, parent: NodeId) -> Result<(), TopologyError> {
        self.node_mut_ref(parent)?
            .children
            .try_reserve(1)
            .map_err(|_| TopologyError::OutOfMemory)
    }

    /// Unlink `child` from its parent. The child itself stays allocated.
    pub fn remove_child(&mut self, child: NodeId) -> Result<(), TopologyError> {
        let parent = self
            .node_ref(child)?
            .parent
            .ok_or(TopologyError::NotLinked(child))?;
        if let Some(parent_node) = self.node_mut(parent) {
            parent_node.children.retain(|id| *id != child);
        }
        self.node_mut_ref(child)?.parent = None;
        Ok(())
    }

    pub fn get_child_count(&self, id: NodeId) -> usize {
        self.node(id).map_or(0, |node| node.children.len())
    }

    /// Last child of `id` with the given type.
    pub fn get_child_by_type(&self, id: NodeId, component_type: ComponentType) -> Option<NodeId> {
        let mut found = None;
        for child in &self.node(id)?.children {
            if self.component_type(*child) == Some(component_type) {
                found = Some(*child);
            }
        }
        found
    }

    pub fn get_first_child(&self, id: NodeId) -> Option<NodeId> {
        self.child_at(id, 0)
    }

    /// Sibling after `child` under `id`; `None` when `child` is not linked there.
    pub fn get_next_child(&self, id: NodeId, child: NodeId) -> Option<NodeId> {
        if self.parent(child) != Some(id) {
            return None;
        }
        let children = &self.node(id)?.children;
        let position = children.iter().position(|current| *current == child)?;
        children.get(position + 1).copied()
    }

    pub(crate) fn child_at(&self, id: NodeId, index: usize) -> Option<NodeId> {
        self.node(id)?.children.get(index).copied()
    }

    /// Destroy the whole subtree below `id`, deepest nodes first.
    ///
    /// Stops at the first failure. Children removed before that stay removed.
    pub fn remove_all_children(
        &mut self,
        id: NodeId,
        registry: &mut DeviceRegistry<NodeId>,
    ) -> Result<(), TopologyError> {
        self.node_ref(id)?;
        while let Some(child) = self.get_first_child(id) {
            self.remove_all_children(child, registry)?;
            self.remove_child(child)?;
            self.destroy(child, registry, true)?;
        }
        Ok(())
    }

    /// Tear a childless node down.
    ///
    /// Releases its attributes through the destroyer, drops its registry
    /// entry and its queued I/O. With `free_self` the node also leaves the
    /// arena (and its parent's child list); otherwise it stays allocated,
    /// empty, for the caller to re-initialize. The destroyer's result is
    /// returned once the teardown is done.
    pub fn destroy(
        &mut self,
        id: NodeId,
        registry: &mut DeviceRegistry<NodeId>,
        free_self: bool,
    ) -> Result<(), TopologyError> {
        let node = self.node_mut_ref(id)?;
        let count = node.children.len();
        if count != 0 {
            if node.component_type == ComponentType::Drive {
                warn!(
                    "drive {:#x} destroyed with {} children attached, they leak",
                    id.to_raw(),
                    count
                );
            }
            return Err(TopologyError::HasChildren { node: id, count });
        }
        let component_type = node.component_type;
        let attributes = node.attributes.take();
        let dropped = node.io_queue.drain().len();
        node.set_last_io_id(None);
        if dropped != 0 {
            debug!(
                "dropped {} queued I/O of {:?} node {:#x}",
                dropped,
                component_type,
                id.to_raw()
            );
        }

        let status = self.destroyer.destroy(component_type, attributes);
        if let Err(err) = &status {
            error!(
                "failed to release attributes of {:?} node {:#x}: {:?}",
                component_type,
                id.to_raw(),
                err
            );
        }

        if let Err(err) = registry.remove_device_by_ptr(id) {
            warn!(
                "{:?} node {:#x} not deregistered: {:?}",
                component_type,
                id.to_raw(),
                err
            );
        }

        if free_self {
            if self.parent(id).is_some() {
                self.remove_child(id)?;
            }
            self.nodes.remove(id);
        }
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        attributes::{Attributes, DriveAttributes},
        state::ComponentState,
    };

    fn registry() -> DeviceRegistry<NodeId> {
        DeviceRegistry::init(64).unwrap()
    }

    #[test]
    fn child_count_accounting() {
        let mut topology: Topology<()> = Topology::new();
        let parent = topology.create_node().unwrap();
        let children: Vec<_> = (0..6)
            .map(|_| {
                let child = topology.create_node().unwrap();
                topology.add_child(parent, child).unwrap();
                child
            })
            .collect();
        assert_eq!(topology.get_child_count(parent), 6);
        for child in &children[..4] {
            topology.remove_child(*child).unwrap();
            assert_eq!(topology.parent(*child), None);
        }
        assert_eq!(topology.get_child_count(parent), 2);
        assert_eq!(
            topology.remove_child(children[0]),
            Err(TopologyError::NotLinked(children[0]))
        );
    }

    #[test]
    fn ordered_traversal() {
        let mut topology: Topology<()> = Topology::new();
        let parent = topology.create_node().unwrap();
        let a = topology.create_node().unwrap();
        let b = topology.create_node().unwrap();
        let front = topology.create_node().unwrap();
        topology.add_child(parent, a).unwrap();
        topology.add_child(parent, b).unwrap();
        topology.add_child_to_front(parent, front).unwrap();

        assert_eq!(topology.get_first_child(parent), Some(front));
        assert_eq!(topology.get_next_child(parent, front), Some(a));
        assert_eq!(topology.get_next_child(parent, a), Some(b));
        assert_eq!(topology.get_next_child(parent, b), None);

        topology.remove_child(a).unwrap();
        assert_eq!(topology.get_next_child(parent, a), None);
        assert_eq!(topology.get_next_child(parent, front), Some(b));
    }

    #[test]
    fn linking_rules() {
        let mut topology: Topology<()> = Topology::new();
        let root = topology.create_node().unwrap();
        let mid = topology.create_node().unwrap();
        let leaf = topology.create_node().unwrap();
        topology.add_child(root, mid).unwrap();
        topology.add_child(mid, leaf).unwrap();
        assert_eq!(
            topology.add_child(root, leaf),
            Err(TopologyError::AlreadyLinked(leaf))
        );
        assert_eq!(
            topology.add_child(leaf, root),
            Err(TopologyError::CycleDetected {
                parent: leaf,
                child: root
            })
        );
        assert_eq!(
            topology.add_child(root, root),
            Err(TopologyError::CycleDetected {
                parent: root,
                child: root
            })
        );
        assert_eq!(topology.roots().collect::<Vec<_>>(), vec![root]);
        assert_eq!(topology.find_ancestor(leaf, ComponentType::Invalid), Some(leaf));
    }

    #[test]
    fn child_by_type_returns_last_match() {
        let mut topology: Topology<()> = Topology::new();
        let enclosure = topology.create_node().unwrap();
        let mut drives = Vec::new();
        for slot in 0..3 {
            let drive = topology.create_node().unwrap();
            topology
                .node_mut(drive)
                .unwrap()
                .assign_attributes(Attributes::Drive(DriveAttributes {
                    slot_number: slot,
                    ..Default::default()
                }))
                .unwrap();
            topology.add_child(enclosure, drive).unwrap();
            drives.push(drive);
        }
        let untyped = topology.create_node().unwrap();
        topology.add_child(enclosure, untyped).unwrap();

        assert_eq!(
            topology.get_child_by_type(enclosure, ComponentType::Drive),
            Some(drives[2])
        );
        assert_eq!(
            topology.get_child_by_type(enclosure, ComponentType::VirtualPhy),
            None
        );
    }

    #[test]
    fn destroy_with_children_fails_and_changes_nothing() {
        let mut topology: Topology<()> = Topology::new();
        let mut registry = registry();
        let drive = topology.create_node().unwrap();
        topology
            .node_mut(drive)
            .unwrap()
            .set_component_type(ComponentType::Drive);
        let child = topology.create_node().unwrap();
        topology.add_child(drive, child).unwrap();
        let handle = registry
            .add_device(ComponentType::Drive.into(), drive)
            .unwrap();

        assert_eq!(
            topology.destroy(drive, &mut registry, true),
            Err(TopologyError::HasChildren {
                node: drive,
                count: 1
            })
        );
        assert!(topology.contains(drive));
        assert_eq!(topology.get_child_count(drive), 1);
        assert_eq!(topology.parent(child), Some(drive));
        assert_eq!(registry.get_device_ptr(handle), Ok(drive));
    }

    #[test]
    fn destroy_deregisters_and_frees() {
        let mut topology: Topology<u8> = Topology::new();
        let mut registry = registry();
        let parent = topology.create_node().unwrap();
        let node = topology.create_node().unwrap();
        topology.add_child(parent, node).unwrap();
        topology.io_queue_push(node, 1).unwrap();
        let handle = registry.add_device(ComponentType::Port.into(), node).unwrap();

        topology.destroy(node, &mut registry, true).unwrap();
        assert!(!topology.contains(node));
        assert_eq!(topology.get_child_count(parent), 0);
        assert!(registry.get_device_ptr(handle).is_err());

        // Unregistered node: deregistration failure is not fatal.
        topology.destroy(parent, &mut registry, false).unwrap();
        assert!(topology.contains(parent));
    }

    #[test]
    fn remove_all_children_is_bottom_up() {
        let mut topology: Topology<()> = Topology::new();
        let mut registry = registry();
        let port = topology.create_node().unwrap();
        let mut descendants = Vec::new();
        for _ in 0..2 {
            let enclosure = topology.create_node().unwrap();
            topology.add_child(port, enclosure).unwrap();
            registry.add_device(ComponentType::Enclosure.into(), enclosure).unwrap();
            descendants.push(enclosure);
            for _ in 0..3 {
                let drive = topology.create_node().unwrap();
                topology.add_child(enclosure, drive).unwrap();
                registry.add_device(ComponentType::Drive.into(), drive).unwrap();
                descendants.push(drive);
            }
        }
        topology.remove_all_children(port, &mut registry).unwrap();
        assert_eq!(topology.get_child_count(port), 0);
        assert!(descendants.iter().all(|id| !topology.contains(*id)));
        assert_eq!(registry.get_device_count(), 0);
        assert_eq!(topology.len(), 1);
    }

    #[test]
    fn init_node_requires_unlinked_node() {
        let mut topology: Topology<()> = Topology::new();
        let parent = topology.create_node().unwrap();
        let child = topology.create_node().unwrap();
        topology.add_child(parent, child).unwrap();
        assert_eq!(
            topology.init_node(child),
            Err(TopologyError::AlreadyLinked(child))
        );
        topology.remove_child(child).unwrap();
        topology.node_mut(child).unwrap().set_state(ComponentState::LoginComplete);
        topology.init_node(child).unwrap();
        assert_eq!(
            topology.node(child).unwrap().state(),
            ComponentState::Initialized
        );
    }

    #[test]
    fn arena_limit() {
        let mut topology: Topology<()> =
            Topology::with_limit(2, Box::new(DefaultAttributeDestroyer));
        let first = topology.create_node().unwrap();
        topology.create_node().unwrap();
        assert_eq!(topology.create_node(), Err(TopologyError::ArenaFull));

        topology.destroy(first, &mut registry(), true).unwrap();
        let again = topology.create_node().unwrap();
        assert_ne!(again, first);
        assert!(!topology.contains(first));
        assert_eq!(topology.create_node(), Err(TopologyError::ArenaFull));
    }
}

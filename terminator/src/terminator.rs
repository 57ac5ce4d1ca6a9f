//! Device-level facade over the registry and the component tree.
//!
//! Callers name devices by [DeviceHandle]. Internally a handle resolves to a
//! [NodeId] through the registry, and the tree is guarded by one
//! reader/writer lock. Lock order, outermost first: topology, ports map, a
//! port's logout queue, registry.

use std::{collections::BTreeMap, sync::Arc, thread, time::Duration};
use log::{info, warn};
use registry::{DeviceHandle, DeviceRegistry};
use spin::RwLock;
use topology::{
    Attributes, ComponentNode, ComponentState, ComponentType, NodeId, ResetFunction, ResetHost,
    Topology, TopologyError, attributes::DriveFlags, reset::reset_common_action,
};
use utils::sync::SpinLock;

use crate::{
    debug_ex,
    error::TerminatorError,
    io::TerminatorIo,
    port::Port,
};

pub struct Terminator {
    topology: RwLock<Topology<TerminatorIo>>,
    ports: RwLock<BTreeMap<NodeId, Arc<Port>>>,
    registry: SpinLock<DeviceRegistry<NodeId>>,
}

impl Terminator {
    /// Empty simulator able to register `capacity` devices.
    pub fn new(capacity: usize) -> Result<Terminator, TerminatorError> {
        let registry = DeviceRegistry::init(capacity)?;
        info!("terminator started, {} device slots", capacity);
        Ok(Terminator {
            topology: RwLock::new(Topology::new()),
            ports: RwLock::new(BTreeMap::new()),
            registry: SpinLock::new(registry),
        })
    }

    /// Remove every device, then release the registry.
    pub fn destroy(self) -> Result<(), TerminatorError> {
        let mut topology = self.topology.into_inner();
        let mut registry = self.registry.into_inner();
        let roots: Vec<_> = topology.roots().collect();
        let mut status = Ok(());
        for root in roots {
            let result = topology
                .remove_all_children(root, &mut registry)
                .and_then(|()| topology.destroy(root, &mut registry, true));
            if let Err(err) = result {
                warn!("teardown of node {:#x} failed: {:?}", root.to_raw(), err);
                status = Err(err.into());
            }
        }
        registry.destroy();
        info!("terminator stopped");
        status
    }

    fn resolve(&self, handle: DeviceHandle) -> Result<NodeId, TerminatorError> {
        Ok(self.registry.lock().get_device_ptr(handle)?)
    }

    fn handle_of(&self, id: NodeId) -> Option<DeviceHandle> {
        self.registry.lock().get_device_handle(id).ok()
    }

    /// Allocate a device node for `attributes` and register it under the
    /// component type code. The device is not linked anywhere yet.
    pub fn create_device(&self, attributes: Attributes) -> Result<DeviceHandle, TerminatorError> {
        let component_type = attributes.component_type();
        let mut topology = self.topology.write();
        let id = topology.create_node()?;
        let node = topology.node_mut(id).ok_or(TopologyError::NodeNotFound(id))?;
        node.assign_attributes(attributes)?;
        if component_type == ComponentType::Drive {
            node.set_reset_function(Some(reset_common_action));
        }

        let registered = self.registry.lock().add_device(component_type.into(), id);
        let handle = match registered {
            Ok(handle) => handle,
            Err(err) => {
                let mut registry = self.registry.lock();
                if let Err(cleanup) = topology.destroy(id, &mut registry, true) {
                    warn!("leaked {:?} node {:#x}: {:?}", component_type, id.to_raw(), cleanup);
                }
                return Err(err.into());
            }
        };
        if component_type == ComponentType::Port {
            self.ports.write().insert(id, Arc::new(Port::new(id)));
        }
        debug_ex!("created {:?} device {:#x}", component_type, handle.into_const());
        Ok(handle)
    }

    pub fn insert_device(
        &self,
        parent: DeviceHandle,
        child: DeviceHandle,
    ) -> Result<(), TerminatorError> {
        let (parent, child) = (self.resolve(parent)?, self.resolve(child)?);
        self.topology.write().add_child(parent, child)?;
        Ok(())
    }

    /// Insert ahead of the existing children. Enclosures keep their
    /// virtual phy in front of the drives this way.
    pub fn insert_device_at_front(
        &self,
        parent: DeviceHandle,
        child: DeviceHandle,
    ) -> Result<(), TerminatorError> {
        let (parent, child) = (self.resolve(parent)?, self.resolve(child)?);
        self.topology.write().add_child_to_front(parent, child)?;
        Ok(())
    }

    /// Destroy the device and everything below it.
    pub fn remove_device(&self, handle: DeviceHandle) -> Result<(), TerminatorError> {
        let id = self.resolve(handle)?;
        let mut topology = self.topology.write();
        {
            let mut registry = self.registry.lock();
            topology.remove_all_children(id, &mut registry)?;
            if topology.parent(id).is_some() {
                topology.remove_child(id)?;
            }
            topology.destroy(id, &mut registry, true)?;
        }
        self.ports.write().retain(|port, _| topology.contains(*port));
        info!("removed device {:#x}", handle.into_const());
        Ok(())
    }

    /// Detach the device from its parent but keep it, and its subtree, alive.
    /// A drive is marked pulled until it is inserted again.
    pub fn unmount_device(&self, handle: DeviceHandle) -> Result<(), TerminatorError> {
        let id = self.resolve(handle)?;
        let mut topology = self.topology.write();
        topology.remove_child(id)?;
        if let Some(drive) = topology
            .node_mut(id)
            .and_then(|node| node.attributes_mut())
            .and_then(|attributes| attributes.as_drive_mut())
        {
            drive.flags.insert(DriveFlags::PULLED);
        }
        debug_ex!("unmounted device {:#x}", handle.into_const());
        Ok(())
    }

    /// Put a pulled drive back under `parent`.
    pub fn reinsert_drive(
        &self,
        parent: DeviceHandle,
        drive: DeviceHandle,
    ) -> Result<(), TerminatorError> {
        let (parent, id) = (self.resolve(parent)?, self.resolve(drive)?);
        let mut topology = self.topology.write();
        topology.add_child(parent, id)?;
        if let Some(drive) = topology
            .node_mut(id)
            .and_then(|node| node.attributes_mut())
            .and_then(|attributes| attributes.as_drive_mut())
        {
            drive.flags.remove(DriveFlags::PULLED);
        }
        Ok(())
    }

    fn port_of(
        &self,
        topology: &Topology<TerminatorIo>,
        id: NodeId,
    ) -> Result<Arc<Port>, TerminatorError> {
        topology
            .find_ancestor(id, ComponentType::Port)
            .and_then(|port| self.ports.read().get(&port).cloned())
            .ok_or(TerminatorError::NoPort(id))
    }

    fn port_by_handle(&self, handle: DeviceHandle) -> Result<Arc<Port>, TerminatorError> {
        let id = self.resolve(handle)?;
        self.ports
            .read()
            .get(&id)
            .cloned()
            .ok_or(TerminatorError::NotAPort(handle))
    }

    /// Nearest port at or above the device.
    pub fn get_port(&self, handle: DeviceHandle) -> Result<DeviceHandle, TerminatorError> {
        let id = self.resolve(handle)?;
        let port = self.port_of(&self.topology.read(), id)?;
        Ok(self.registry.lock().get_device_handle(port.node())?)
    }

    fn logout_node(&self, id: NodeId) -> Result<(), TerminatorError> {
        let mut topology = self.topology.write();
        let port = self.port_of(&topology, id)?;
        let mut queue = port.logout_queue.lock();
        let children = topology.add_all_children_to_logout_queue(id, &mut queue);
        if let Err(err) = &children {
            warn!("logout of node {:#x} left children out: {:?}", id.to_raw(), err);
        }
        // The device itself is queued even when its subtree was cut short.
        queue.push(id)?;
        if let Some(node) = topology.node_mut(id) {
            node.set_state(ComponentState::LogoutPending);
        }
        debug_ex!("node {:#x} queued for logout, {} pending", id.to_raw(), queue.len());
        children.map_err(Into::into)
    }

    fn login_node(&self, id: NodeId) -> Result<(), TerminatorError> {
        let mut topology = self.topology.write();
        topology.set_all_children_login_pending(id, true)?;
        topology
            .node_mut(id)
            .ok_or(TopologyError::NodeNotFound(id))?
            .set_login_pending(true);
        Ok(())
    }

    /// Queue the device's descendants, then the device itself, on its
    /// port's logout queue. Everything queued becomes `LogoutPending`.
    pub fn logout_device(&self, handle: DeviceHandle) -> Result<(), TerminatorError> {
        self.logout_node(self.resolve(handle)?)
    }

    /// Mark the device and its subtree `LoginPending`.
    pub fn login_device(&self, handle: DeviceHandle) -> Result<(), TerminatorError> {
        self.login_node(self.resolve(handle)?)
    }

    /// Take the oldest pending logout of `port`. Entries whose device has
    /// been removed since are skipped.
    pub fn pop_logout_device(
        &self,
        port: DeviceHandle,
    ) -> Result<Option<DeviceHandle>, TerminatorError> {
        let port = self.port_by_handle(port)?;
        let mut queue = port.logout_queue.lock();
        while let Some(id) = queue.pop() {
            if let Some(handle) = self.handle_of(id) {
                return Ok(Some(handle));
            }
        }
        Ok(None)
    }

    pub fn front_logout_device(
        &self,
        port: DeviceHandle,
    ) -> Result<Option<DeviceHandle>, TerminatorError> {
        let port = self.port_by_handle(port)?;
        let queue = port.logout_queue.lock();
        Ok(queue.iter().find_map(|element| self.handle_of(element.device)))
    }

    /// The live entry queued after `device` on `port`'s logout queue.
    pub fn get_next_logout_device(
        &self,
        port: DeviceHandle,
        device: DeviceHandle,
    ) -> Result<Option<DeviceHandle>, TerminatorError> {
        let port = self.port_by_handle(port)?;
        let id = self.resolve(device)?;
        let queue = port.logout_queue.lock();
        Ok(queue
            .iter()
            .skip_while(|element| element.device != id)
            .skip(1)
            .find_map(|element| self.handle_of(element.device)))
    }

    /// Whether `device` has an entry on `port`'s logout queue.
    pub fn is_device_logout_pending(
        &self,
        port: DeviceHandle,
        device: DeviceHandle,
    ) -> Result<bool, TerminatorError> {
        let port = self.port_by_handle(port)?;
        let id = self.resolve(device)?;
        let queue = port.logout_queue.lock();
        Ok(queue.contains(id))
    }

    /// True when no live device is left on `port`'s logout queue.
    pub fn is_logout_queue_empty(&self, port: DeviceHandle) -> Result<bool, TerminatorError> {
        let port = self.port_by_handle(port)?;
        let queue = port.logout_queue.lock();
        Ok(queue
            .iter()
            .all(|element| self.handle_of(element.device).is_none()))
    }

    fn with_node<R>(
        &self,
        handle: DeviceHandle,
        f: impl FnOnce(&ComponentNode<TerminatorIo>) -> R,
    ) -> Result<R, TerminatorError> {
        let id = self.resolve(handle)?;
        let topology = self.topology.read();
        let node = topology.node(id).ok_or(TopologyError::NodeNotFound(id))?;
        Ok(f(node))
    }

    fn with_node_mut<R>(
        &self,
        handle: DeviceHandle,
        f: impl FnOnce(&mut ComponentNode<TerminatorIo>) -> R,
    ) -> Result<R, TerminatorError> {
        let id = self.resolve(handle)?;
        let mut topology = self.topology.write();
        let node = topology.node_mut(id).ok_or(TopologyError::NodeNotFound(id))?;
        Ok(f(node))
    }

    pub fn device_state(&self, handle: DeviceHandle) -> Result<ComponentState, TerminatorError> {
        self.with_node(handle, |node| node.state())
    }

    pub fn set_login_pending(
        &self,
        handle: DeviceHandle,
        pending: bool,
    ) -> Result<(), TerminatorError> {
        self.with_node_mut(handle, |node| node.set_login_pending(pending))
    }

    pub fn is_login_pending(&self, handle: DeviceHandle) -> Result<bool, TerminatorError> {
        self.with_node(handle, |node| node.is_login_pending())
    }

    pub fn set_logout_complete(
        &self,
        handle: DeviceHandle,
        complete: bool,
    ) -> Result<(), TerminatorError> {
        self.with_node_mut(handle, |node| node.set_logout_complete(complete))
    }

    pub fn is_logout_complete(&self, handle: DeviceHandle) -> Result<bool, TerminatorError> {
        self.with_node(handle, |node| node.is_logout_complete())
    }

    pub fn set_all_children_logout_complete(
        &self,
        handle: DeviceHandle,
        complete: bool,
    ) -> Result<(), TerminatorError> {
        let id = self.resolve(handle)?;
        self.topology
            .write()
            .set_all_children_logout_complete(id, complete)?;
        Ok(())
    }

    /// Copy of the device's attribute payload.
    pub fn attributes(&self, handle: DeviceHandle) -> Result<Option<Attributes>, TerminatorError> {
        self.with_node(handle, |node| node.attributes().cloned())
    }

    pub fn component_type(&self, handle: DeviceHandle) -> Result<ComponentType, TerminatorError> {
        let device_type = self.registry.lock().get_device_type(handle)?;
        Ok(ComponentType::try_from(device_type)?)
    }

    pub fn enqueue_io(
        &self,
        handle: DeviceHandle,
        io: TerminatorIo,
    ) -> Result<(), TerminatorError> {
        let id = self.resolve(handle)?;
        let topology = self.topology.read();
        let pulled = topology
            .node(id)
            .and_then(|node| node.attributes())
            .and_then(|attributes| attributes.as_drive())
            .is_some_and(|drive| drive.flags.contains(DriveFlags::PULLED));
        if pulled {
            return Err(TerminatorError::DevicePulled(handle));
        }
        topology.io_queue_push(id, io)?;
        Ok(())
    }

    /// Complete one queued request below `port`, chosen by the fairness
    /// scheduler. `None` when the scheduler found nothing this round, or the
    /// queue it picked was drained in the meantime.
    pub fn process_next_io(
        &self,
        port: DeviceHandle,
    ) -> Result<Option<(DeviceHandle, TerminatorIo)>, TerminatorError> {
        let port = self.port_by_handle(port)?;
        let topology = self.topology.read();
        let Some(id) = topology.get_first_device_with_io(port.node()) else {
            return Ok(None);
        };
        let Some(mut io) = topology.lock_io_queue(id).and_then(|mut queue| queue.pop_front()) else {
            return Ok(None);
        };
        let capacity = topology
            .node(id)
            .and_then(|node| node.attributes())
            .and_then(|attributes| attributes.as_drive())
            .map(|drive| drive.capacity_blocks);
        io.complete(capacity);
        port.count_completion();
        let handle = self.handle_of(id).ok_or(TopologyError::NodeNotFound(id))?;
        Ok(Some((handle, io)))
    }

    /// Drop everything queued on the device and hand it back, marked aborted.
    pub fn abort_device_io(
        &self,
        handle: DeviceHandle,
    ) -> Result<Vec<TerminatorIo>, TerminatorError> {
        let mut aborted = self.with_node(handle, |node| node.io_queue().drain())?;
        for io in &mut aborted {
            io.abort();
        }
        if !aborted.is_empty() {
            info!("aborted {} requests on device {:#x}", aborted.len(), handle.into_const());
        }
        Ok(aborted)
    }

    pub fn set_reset_function(
        &self,
        handle: DeviceHandle,
        reset_function: Option<ResetFunction>,
    ) -> Result<(), TerminatorError> {
        self.with_node_mut(handle, |node| node.set_reset_function(reset_function))
    }

    pub fn get_reset_function(
        &self,
        handle: DeviceHandle,
    ) -> Result<Option<ResetFunction>, TerminatorError> {
        self.with_node(handle, |node| node.reset_function())
    }

    pub fn set_reset_delay(
        &self,
        handle: DeviceHandle,
        delay_ms: u32,
    ) -> Result<(), TerminatorError> {
        self.with_node_mut(handle, |node| node.set_reset_delay(delay_ms))
    }

    pub fn get_reset_delay(&self, handle: DeviceHandle) -> Result<u32, TerminatorError> {
        self.with_node(handle, |node| node.reset_delay())
    }

    fn mark_resetting(&self, handle: DeviceHandle, resetting: bool) -> Result<(), TerminatorError> {
        self.with_node_mut(handle, |node| {
            if let Some(drive) = node
                .attributes_mut()
                .and_then(|attributes| attributes.as_drive_mut())
            {
                drive.flags.set(DriveFlags::RESETTING, resetting);
                if resetting {
                    drive.reset_count += 1;
                }
            }
        })
    }

    /// Run the device's reset function with its configured delay. No lock
    /// is held while it runs.
    pub fn reset_device(&self, handle: DeviceHandle) -> Result<(), TerminatorError> {
        let id = self.resolve(handle)?;
        let (reset, delay_ms) =
            self.with_node(handle, |node| (node.reset_function(), node.reset_delay()))?;
        let reset = reset.ok_or(TerminatorError::NoResetFunction(handle))?;
        info!("resetting device {:#x}, delay {} ms", handle.into_const(), delay_ms);
        self.mark_resetting(handle, true)?;
        let result = reset(self, id, delay_ms);
        if let Err(err) = self.mark_resetting(handle, false) {
            warn!(
                "device {:#x} still flagged as resetting: {:?}",
                handle.into_const(),
                err
            );
        }
        result.map_err(|err| {
            warn!("reset of device {:#x} failed: {:?}", handle.into_const(), err);
            err.into()
        })
    }

    /// Handles of all devices of one type.
    pub fn enumerate_devices(
        &self,
        component_type: ComponentType,
    ) -> Result<Vec<DeviceHandle>, TerminatorError> {
        let registry = self.registry.lock();
        let device_type = component_type.into();
        let count = registry.get_device_count_by_type(device_type);
        let mut handles = vec![DeviceHandle::INVALID; count];
        let count = registry.enumerate_devices_by_type(&mut handles, device_type)?;
        handles.truncate(count);
        Ok(handles)
    }

    pub fn device_count(&self) -> usize {
        self.registry.lock().get_device_count()
    }

    /// Last child of the device with the given type.
    pub fn get_child_by_type(
        &self,
        handle: DeviceHandle,
        component_type: ComponentType,
    ) -> Result<Option<DeviceHandle>, TerminatorError> {
        let id = self.resolve(handle)?;
        let child = self.topology.read().get_child_by_type(id, component_type);
        Ok(child.and_then(|child| self.handle_of(child)))
    }

    pub fn get_virtual_phy(
        &self,
        enclosure: DeviceHandle,
    ) -> Result<Option<DeviceHandle>, TerminatorError> {
        self.get_child_by_type(enclosure, ComponentType::VirtualPhy)
    }

    pub fn get_parent(
        &self,
        handle: DeviceHandle,
    ) -> Result<Option<DeviceHandle>, TerminatorError> {
        let id = self.resolve(handle)?;
        let parent = self.topology.read().parent(id);
        Ok(parent.and_then(|parent| self.handle_of(parent)))
    }

    pub fn get_child_count(&self, handle: DeviceHandle) -> Result<usize, TerminatorError> {
        let id = self.resolve(handle)?;
        Ok(self.topology.read().get_child_count(id))
    }
}

impl ResetHost for Terminator {
    fn logout(&self, node: NodeId) -> Result<(), TopologyError> {
        self.logout_node(node).map_err(|err| {
            warn!("reset logout of node {:#x}: {:?}", node.to_raw(), err);
            TopologyError::ResetFailed(node)
        })
    }

    fn login(&self, node: NodeId) -> Result<(), TopologyError> {
        self.login_node(node).map_err(|err| {
            warn!("reset login of node {:#x}: {:?}", node.to_raw(), err);
            TopologyError::ResetFailed(node)
        })
    }

    fn wait(&self, delay_ms: u32) {
        thread::sleep(Duration::from_millis(u64::from(delay_ms)));
    }
}

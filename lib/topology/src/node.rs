use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, Ordering};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use registry::DeviceType;
use slotmap::{Key, KeyData, new_key_type};

use crate::{
    DEFAULT_RESET_DELAY_MS,
    attributes::Attributes,
    error::TopologyError,
    io::IoQueue,
    reset::ResetFunction,
    state::ComponentState,
};

new_key_type! {
    /// Arena key of a node. Ids of destroyed nodes never resolve again.
    pub struct NodeId;
}

const CURSOR_INVALID: u64 = 0;

impl NodeId {
    /// Packed as `(version << 32) | index`.
    pub fn to_raw(self) -> u64 {
        self.data().as_ffi()
    }
    /// Raw value `0` is never issued and maps to `None`.
    pub fn from_raw(raw: u64) -> Option<NodeId> {
        if raw == CURSOR_INVALID {
            None
        } else {
            Some(NodeId::from(KeyData::from_ffi(raw)))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u64)]
pub enum ComponentType {
    Invalid = 0,
    Board = 1,
    Port = 2,
    Enclosure = 3,
    Drive = 4,
    VirtualPhy = 5,
}

// A `#[default]` variant would also become the `TryFromPrimitive` fallback.
impl Default for ComponentType {
    fn default() -> Self {
        ComponentType::Invalid
    }
}

impl From<ComponentType> for DeviceType {
    fn from(value: ComponentType) -> Self {
        DeviceType::from(u64::from(value))
    }
}

impl TryFrom<DeviceType> for ComponentType {
    type Error = TopologyError;

    fn try_from(value: DeviceType) -> Result<Self, Self::Error> {
        ComponentType::try_from(value.into_const())
            .map_err(|err| TopologyError::UnknownComponentType(err.number))
    }
}

/// One simulated component.
#[derive(Debug)]
pub struct ComponentNode<Io> {
    pub(crate) component_type: ComponentType,
    pub(crate) state: ComponentState,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) attributes: Option<Attributes>,
    pub(crate) io_queue: IoQueue<Io>,
    last_io_id: AtomicU64,
    reset_function: Option<ResetFunction>,
    reset_delay: u32,
}

impl<Io> Default for ComponentNode<Io> {
    fn default() -> Self {
        ComponentNode::new()
    }
}

impl<Io> ComponentNode<Io> {
    pub const fn new() -> ComponentNode<Io> {
        ComponentNode {
            component_type: ComponentType::Invalid,
            state: ComponentState::Initialized,
            parent: None,
            children: Vec::new(),
            attributes: None,
            io_queue: IoQueue::new(),
            last_io_id: AtomicU64::new(CURSOR_INVALID),
            reset_function: None,
            reset_delay: DEFAULT_RESET_DELAY_MS,
        }
    }

    /// Put the node back into its freshly allocated state.
    /// Attributes and queued I/O are dropped without going through a destroyer.
    pub fn init(&mut self) {
        *self = ComponentNode::new();
    }

    pub fn component_type(&self) -> ComponentType {
        self.component_type
    }

    pub fn set_component_type(&mut self, component_type: ComponentType) {
        self.component_type = component_type;
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn attributes(&self) -> Option<&Attributes> {
        self.attributes.as_ref()
    }

    pub fn attributes_mut(&mut self) -> Option<&mut Attributes> {
        self.attributes.as_mut()
    }

    /// Attach the payload. An untyped node takes the payload's type; a typed
    /// node only accepts a payload of its own type.
    pub fn assign_attributes(&mut self, attributes: Attributes) -> Result<(), TopologyError> {
        if self.attributes.is_some() {
            return Err(TopologyError::AttributesAssigned);
        }
        let found = attributes.component_type();
        match self.component_type {
            ComponentType::Invalid => self.component_type = found,
            expected if expected != found => {
                return Err(TopologyError::AttributeMismatch { expected, found });
            }
            _ => {}
        }
        self.attributes = Some(attributes);
        Ok(())
    }

    pub fn io_queue(&self) -> &IoQueue<Io> {
        &self.io_queue
    }

    pub fn reset_function(&self) -> Option<ResetFunction> {
        self.reset_function
    }

    pub fn set_reset_function(&mut self, reset_function: Option<ResetFunction>) {
        self.reset_function = reset_function;
    }

    pub fn reset_delay(&self) -> u32 {
        self.reset_delay
    }

    pub fn set_reset_delay(&mut self, delay_ms: u32) {
        self.reset_delay = delay_ms;
    }

    /// Child the fairness scheduler looked at last. May name a child that
    /// has since been removed.
    pub fn last_io_id(&self) -> Option<NodeId> {
        NodeId::from_raw(self.last_io_id.load(Ordering::Acquire))
    }

    pub(crate) fn set_last_io_id(&self, cursor: Option<NodeId>) {
        let raw = cursor.map_or(CURSOR_INVALID, NodeId::to_raw);
        self.last_io_id.store(raw, Ordering::Release);
    }
}

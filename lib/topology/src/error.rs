use core::fmt::Write;
use utils::error::MessageError;

use crate::node::{ComponentType, NodeId};

/// Tree failures. Callers treat every variant as a generic failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopologyError {
    NodeNotFound(NodeId),
    /// The arena reached its node limit.
    ArenaFull,
    /// Backing storage could not grow.
    OutOfMemory,
    /// Destroy was called on a node that still has children.
    HasChildren { node: NodeId, count: usize },
    /// The child is already linked under a parent.
    AlreadyLinked(NodeId),
    /// The node is not linked under any parent.
    NotLinked(NodeId),
    /// Linking would make a node its own ancestor.
    CycleDetected { parent: NodeId, child: NodeId },
    /// The node already holds a payload.
    AttributesAssigned,
    AttributeMismatch {
        expected: ComponentType,
        found: ComponentType,
    },
    UnknownComponentType(u64),
    ResetFailed(NodeId),
}

impl MessageError for TopologyError {
    fn print_to_writer(&self, f: &mut dyn Write) {
        let _ = match self {
            TopologyError::NodeNotFound(node) => {
                f.write_fmt(format_args!("node {:#x} not found", node.to_raw()))
            }
            TopologyError::ArenaFull => f.write_str("component arena is full"),
            TopologyError::OutOfMemory => f.write_str("out of memory"),
            TopologyError::HasChildren { node, count } => f.write_fmt(format_args!(
                "node {:#x} still has {} children",
                node.to_raw(),
                count
            )),
            TopologyError::AlreadyLinked(node) => {
                f.write_fmt(format_args!("node {:#x} already has a parent", node.to_raw()))
            }
            TopologyError::NotLinked(node) => {
                f.write_fmt(format_args!("node {:#x} has no parent", node.to_raw()))
            }
            TopologyError::CycleDetected { parent, child } => f.write_fmt(format_args!(
                "node {:#x} is an ancestor of {:#x}",
                child.to_raw(),
                parent.to_raw()
            )),
            TopologyError::AttributesAssigned => f.write_str("attributes already assigned"),
            TopologyError::AttributeMismatch { expected, found } => f.write_fmt(format_args!(
                "expected {:?} attributes, found {:?}",
                expected, found
            )),
            TopologyError::UnknownComponentType(code) => {
                f.write_fmt(format_args!("unknown component type {}", code))
            }
            TopologyError::ResetFailed(node) => {
                f.write_fmt(format_args!("reset of node {:#x} failed", node.to_raw()))
            }
        };
    }
}

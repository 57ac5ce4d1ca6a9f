//! Component tree of the simulated backplane.
//!
//! Nodes (boards, ports, enclosures, drives, virtual phys) live in an arena
//! owned by [Topology] and are addressed by [NodeId]. A node keeps its parent
//! as a plain id and its children as an ordered list of ids; nothing else
//! links nodes together.
//!
//! Besides structure, each node carries:
//! - a login/logout state ([ComponentState]) with a guarded
//!   `LogoutComplete` transition,
//! - a type-tagged attribute payload ([Attributes]) released through an
//!   [AttributeDestroyer] when the node is destroyed,
//! - an I/O queue behind its own lock, drained across siblings by
//!   [Topology::get_first_device_with_io],
//! - reset configuration ([ResetFunction] and a delay).
//!
//! Structural operations take `&mut self`; serializing them is up to the
//! owner. I/O queue access and the fairness scheduler only need `&self`.

#![cfg_attr(not(test), no_std)]
extern crate alloc;

pub mod attributes;
pub mod error;
pub mod io;
pub mod logout;
pub mod node;
pub mod reset;
pub mod state;
mod tree;

pub use attributes::{AttributeDestroyer, Attributes, DefaultAttributeDestroyer};
pub use error::TopologyError;
pub use io::IoQueue;
pub use logout::{LogoutQueue, LogoutQueueElement};
pub use node::{ComponentNode, ComponentType, NodeId};
pub use reset::{ResetFunction, ResetHost};
pub use state::ComponentState;
pub use tree::Topology;

/// Reset delay given to freshly initialized nodes.
pub const DEFAULT_RESET_DELAY_MS: u32 = config::component::DEFAULT_RESET_DELAY_MS as u32;
/// Upper bound on live nodes in one [Topology].
pub const MAX_COMPONENTS: usize = config::component::MAX_COMPONENTS;

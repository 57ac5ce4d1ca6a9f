//! Simulated hardware reset.
//!
//! A node stores a [ResetFunction] and a delay. The function is run by
//! whoever owns the topology, through the [ResetHost] seam, so it can log
//! the device out and back in without the tree knowing about ports or
//! logout queues.

use crate::{error::TopologyError, node::NodeId};

pub trait ResetHost {
    fn logout(&self, node: NodeId) -> Result<(), TopologyError>;
    fn login(&self, node: NodeId) -> Result<(), TopologyError>;
    fn wait(&self, delay_ms: u32);
}

pub type ResetFunction = fn(&dyn ResetHost, NodeId, u32) -> Result<(), TopologyError>;

/// Log the device out, hold it down for `delay_ms`, then log it back in.
pub fn reset_common_action(
    host: &dyn ResetHost,
    node: NodeId,
    delay_ms: u32,
) -> Result<(), TopologyError> {
    host.logout(node)?;
    host.wait(delay_ms);
    host.login(node)
}

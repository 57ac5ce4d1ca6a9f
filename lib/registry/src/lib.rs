//! Device registry: a bounded table of simulated devices addressed by
//! generation-checked handles.
//!
//! The registry never owns the devices it indexes. A [DeviceRegistry] maps a
//! [DeviceHandle] to the pair `(DeviceType, P)` where `P` is whatever the
//! caller uses to reach the device (an arena index, a pointer-like id, ...).
//! Handles embed the generation of their slot; once a slot is freed and
//! reused, every handle issued for the previous occupant stops resolving.

#![cfg_attr(not(test), no_std)]
extern crate alloc;

pub mod error;
pub mod handle;
mod registry;

pub use error::RegistryError;
pub use handle::{DeviceHandle, DeviceType};
pub use registry::DeviceRegistry;

/// Upper bound on the capacity of any registry.
pub const MAX_DEVICES: usize = config::registry::MAX_DEVICES;

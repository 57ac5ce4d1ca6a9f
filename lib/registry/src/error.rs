use core::fmt::Write;
use utils::error::MessageError;

use crate::handle::{DeviceHandle, DeviceType};

/// Registry failures. Callers treat every variant as a generic failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryError {
    /// Requested capacity is zero or above [crate::MAX_DEVICES].
    InvalidCapacity(usize),
    /// Every slot is occupied.
    Full,
    /// The invalid device type cannot be registered.
    InvalidDeviceType,
    /// Handle is invalid, out of range, or from an older generation.
    HandleNotFound(DeviceHandle),
    /// No slot references the requested device.
    DeviceNotFound,
    /// Caller storage holds fewer entries than there are matches.
    InsufficientCapacity { required: usize, provided: usize },
}

impl MessageError for RegistryError {
    fn print_to_writer(&self, f: &mut dyn Write) {
        let _ = match self {
            RegistryError::InvalidCapacity(capacity) => {
                f.write_fmt(format_args!("invalid registry capacity {}", capacity))
            }
            RegistryError::Full => f.write_str("device registry is full"),
            RegistryError::InvalidDeviceType => f.write_fmt(format_args!(
                "device type {:#x} is reserved",
                DeviceType::INVALID.into_const()
            )),
            RegistryError::HandleNotFound(handle) => {
                f.write_fmt(format_args!("handle {:#018x} not found", handle.into_const()))
            }
            RegistryError::DeviceNotFound => f.write_str("device is not registered"),
            RegistryError::InsufficientCapacity { required, provided } => f.write_fmt(
                format_args!("need room for {} handles, got {}", required, provided),
            ),
        };
    }
}

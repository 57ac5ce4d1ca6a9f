use core::fmt::Write;
use registry::{DeviceHandle, RegistryError};
use topology::{NodeId, TopologyError};
use utils::error::MessageError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminatorError {
    Registry(RegistryError),
    Topology(TopologyError),
    /// The device is not below any port.
    NoPort(NodeId),
    /// The handle does not name a port.
    NotAPort(DeviceHandle),
    /// The drive was pulled from its slot and takes no I/O.
    DevicePulled(DeviceHandle),
    /// The device has no reset function configured.
    NoResetFunction(DeviceHandle),
    UnsupportedOpcode(u8),
}

impl From<RegistryError> for TerminatorError {
    fn from(err: RegistryError) -> Self {
        TerminatorError::Registry(err)
    }
}

impl From<TopologyError> for TerminatorError {
    fn from(err: TopologyError) -> Self {
        TerminatorError::Topology(err)
    }
}

impl MessageError for TerminatorError {
    fn print_to_writer(&self, f: &mut dyn Write) {
        let _ = match self {
            TerminatorError::Registry(err) => {
                err.print_to_writer(f);
                Ok(())
            }
            TerminatorError::Topology(err) => {
                err.print_to_writer(f);
                Ok(())
            }
            TerminatorError::NoPort(node) => {
                f.write_fmt(format_args!("node {:#x} is not attached to a port", node.to_raw()))
            }
            TerminatorError::NotAPort(handle) => {
                f.write_fmt(format_args!("device {:#x} is not a port", handle.into_const()))
            }
            TerminatorError::DevicePulled(handle) => {
                f.write_fmt(format_args!("device {:#x} is pulled", handle.into_const()))
            }
            TerminatorError::NoResetFunction(handle) => f.write_fmt(format_args!(
                "device {:#x} has no reset function",
                handle.into_const()
            )),
            TerminatorError::UnsupportedOpcode(opcode) => {
                f.write_fmt(format_args!("unsupported opcode {:#04x}", opcode))
            }
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lower_errors_print_through() {
        let err: TerminatorError = RegistryError::Full.into();
        let message = format!("{}", &err as &dyn MessageError);
        assert_eq!(message, "device registry is full");

        let err = TerminatorError::UnsupportedOpcode(0x12);
        assert_eq!(
            format!("{}", &err as &dyn MessageError),
            "unsupported opcode 0x12"
        );
    }
}

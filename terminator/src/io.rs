//! I/O requests queued on simulated devices.

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::error::TerminatorError;

/// SCSI operation codes the simulator understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum IoOpcode {
    TestUnitReady = 0x00,
    Read = 0x28,
    Write = 0x2a,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IoStatus {
    #[default]
    Pending,
    Good,
    /// The block range runs past the end of the drive.
    OutOfRange,
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminatorIo {
    pub tag: u64,
    pub opcode: IoOpcode,
    pub lba: u64,
    pub blocks: u32,
    pub status: IoStatus,
}

impl TerminatorIo {
    pub fn new(tag: u64, opcode: IoOpcode, lba: u64, blocks: u32) -> TerminatorIo {
        TerminatorIo {
            tag,
            opcode,
            lba,
            blocks,
            status: IoStatus::Pending,
        }
    }

    /// Build a request from a raw operation code.
    pub fn from_cdb(
        tag: u64,
        opcode: u8,
        lba: u64,
        blocks: u32,
    ) -> Result<TerminatorIo, TerminatorError> {
        let opcode = IoOpcode::try_from(opcode)
            .map_err(|err| TerminatorError::UnsupportedOpcode(err.number))?;
        Ok(TerminatorIo::new(tag, opcode, lba, blocks))
    }

    /// Finish the request against a device of `capacity_blocks` blocks.
    /// `None` means the target has no block range to check.
    pub(crate) fn complete(&mut self, capacity_blocks: Option<u64>) {
        let in_range = match (self.opcode, capacity_blocks) {
            (IoOpcode::TestUnitReady, _) | (_, None) => true,
            (_, Some(capacity)) => self
                .lba
                .checked_add(u64::from(self.blocks))
                .is_some_and(|end| end <= capacity),
        };
        self.status = if in_range {
            IoStatus::Good
        } else {
            IoStatus::OutOfRange
        };
    }

    pub(crate) fn abort(&mut self) {
        self.status = IoStatus::Aborted;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_opcodes() {
        let io = TerminatorIo::from_cdb(1, 0x28, 0, 8).unwrap();
        assert_eq!(io.opcode, IoOpcode::Read);
        assert_eq!(io.status, IoStatus::Pending);
        assert_eq!(
            TerminatorIo::from_cdb(2, 0x12, 0, 0),
            Err(TerminatorError::UnsupportedOpcode(0x12))
        );
    }

    #[test]
    fn completion_checks_the_block_range() {
        let mut io = TerminatorIo::new(1, IoOpcode::Write, 96, 4);
        io.complete(Some(100));
        assert_eq!(io.status, IoStatus::Good);

        let mut io = TerminatorIo::new(2, IoOpcode::Read, 98, 4);
        io.complete(Some(100));
        assert_eq!(io.status, IoStatus::OutOfRange);

        let mut io = TerminatorIo::new(3, IoOpcode::Read, u64::MAX, 1);
        io.complete(None);
        assert_eq!(io.status, IoStatus::Good);
        io.complete(Some(100));
        assert_eq!(io.status, IoStatus::OutOfRange);

        let mut io = TerminatorIo::new(4, IoOpcode::TestUnitReady, 500, 0);
        io.complete(Some(100));
        assert_eq!(io.status, IoStatus::Good);
    }
}

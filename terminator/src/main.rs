//! Builds a small backplane, pushes I/O through it and tears it down again.

use log::{error, info};
use terminator::{IoOpcode, Terminator, TerminatorError, TerminatorIo, logging};
use topology::{
    Attributes, ComponentType,
    attributes::{
        BoardAttributes, DriveAttributes, EnclosureAttributes, PortAttributes,
        VirtualPhyAttributes,
    },
};
use utils::error::MessageError;

const ENCLOSURES: u32 = 2;
const DRIVES_PER_ENCLOSURE: u32 = 4;
const DRIVE_BLOCKS: u64 = 0x10_0000;
const DEMO_RESET_DELAY_MS: u32 = 50;

fn run() -> Result<(), TerminatorError> {
    let terminator = Terminator::new(registry::MAX_DEVICES)?;

    let board = terminator.create_device(Attributes::Board(BoardAttributes {
        platform: "simulated".into(),
        sp_id: 0,
    }))?;
    let port = terminator.create_device(Attributes::Port(PortAttributes {
        sas_address: 0x5000_0970_0000_0000,
        ..Default::default()
    }))?;
    terminator.insert_device(board, port)?;

    let mut enclosures = Vec::new();
    let mut tag = 0;
    for enclosure_number in 0..ENCLOSURES {
        let sas_base = 0x5000_0970_0001_0000 + u64::from(enclosure_number) * 0x100;
        let enclosure = terminator.create_device(Attributes::Enclosure(EnclosureAttributes {
            enclosure_number,
            sas_address: sas_base,
            uid: format!("ENCL{:04}", enclosure_number).into(),
            ..Default::default()
        }))?;
        terminator.insert_device(port, enclosure)?;
        enclosures.push(enclosure);

        for slot_number in 0..DRIVES_PER_ENCLOSURE {
            let drive = terminator.create_device(Attributes::Drive(DriveAttributes {
                slot_number,
                sas_address: sas_base + 1 + u64::from(slot_number),
                capacity_blocks: DRIVE_BLOCKS,
                block_size: 520,
                serial_number: format!("SIM{:02}{:02}", enclosure_number, slot_number).into(),
                ..Default::default()
            }))?;
            terminator.insert_device(enclosure, drive)?;
            for lba in [0, DRIVE_BLOCKS - 4] {
                terminator.enqueue_io(drive, TerminatorIo::new(tag, IoOpcode::Read, lba, 8))?;
                tag += 1;
            }
        }

        let phy = terminator.create_device(Attributes::VirtualPhy(VirtualPhyAttributes {
            sas_address: sas_base + 0x80,
            phy_count: DRIVES_PER_ENCLOSURE as u8,
            status_pages: vec![vec![0u8; 64].into_boxed_slice()],
        }))?;
        terminator.insert_device_at_front(enclosure, phy)?;
    }
    info!(
        "{} devices, {} drives",
        terminator.device_count(),
        terminator.enumerate_devices(ComponentType::Drive)?.len()
    );

    let mut idle_rounds = 0;
    while idle_rounds < 2 {
        match terminator.process_next_io(port)? {
            Some((device, io)) => {
                idle_rounds = 0;
                info!(
                    "device {:#x} completed {:?} lba {:#x}: {:?}",
                    device.into_const(),
                    io.opcode,
                    io.lba,
                    io.status
                );
            }
            None => idle_rounds += 1,
        }
    }

    if let Some(drive) = terminator.get_child_by_type(enclosures[0], ComponentType::Drive)? {
        terminator.set_reset_delay(drive, DEMO_RESET_DELAY_MS)?;
        terminator.reset_device(drive)?;
        // The reset queued a logout and then started logging the drive back in.
        if let Some(device) = terminator.pop_logout_device(port)? {
            terminator.set_logout_complete(device, true)?;
        }
        info!(
            "drive {:#x} after reset: {:?}",
            drive.into_const(),
            terminator.device_state(drive)?
        );
        terminator.set_login_pending(drive, false)?;
    }

    terminator.logout_device(enclosures[1])?;
    while let Some(device) = terminator.pop_logout_device(port)? {
        terminator.set_logout_complete(device, true)?;
        info!(
            "device {:#x} ({:?}) logged out",
            device.into_const(),
            terminator.component_type(device)?
        );
    }
    terminator.remove_device(enclosures[1])?;
    info!("{} devices left", terminator.device_count());

    terminator.destroy()
}

fn main() {
    if let Err(err) = logging::init(logging::default_level()) {
        eprintln!("logger unavailable: {}", err);
    }
    if let Err(err) = run() {
        error!("terminator demo failed: {}", &err as &dyn MessageError);
        std::process::exit(1);
    }
}

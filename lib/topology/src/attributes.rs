//! Type-tagged payloads carried by component nodes, and the strategy that
//! releases them when a node is destroyed.

use alloc::{boxed::Box, vec::Vec};
use bitflags::bitflags;
use log::{debug, error};

use crate::{error::TopologyError, node::ComponentType};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoardAttributes {
    pub platform: Box<str>,
    pub sp_id: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PortType {
    #[default]
    Sas,
    Fc,
    Iscsi,
    Fcoe,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortAttributes {
    pub port_type: PortType,
    pub backend_number: u32,
    pub io_port_number: u32,
    pub sas_address: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EnclosureType {
    #[default]
    Viper,
    Derringer,
    Voyager,
    Bunker,
    Citadel,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnclosureAttributes {
    pub enclosure_type: EnclosureType,
    pub enclosure_number: u32,
    pub sas_address: u64,
    pub uid: Box<str>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DriveType {
    #[default]
    Sas,
    Sata,
    SasFlash,
    SataFlash,
}

bitflags! {
    /// Simulated physical condition of a drive.
    #[derive(Default)]
    pub struct DriveFlags: u32 {
        /// Removed from its slot but not destroyed.
        const PULLED    = 0b0001;
        /// A reset is in progress.
        const RESETTING = 0b0010;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriveAttributes {
    pub drive_type: DriveType,
    pub slot_number: u32,
    pub sas_address: u64,
    pub capacity_blocks: u64,
    pub block_size: u32,
    pub serial_number: Box<str>,
    pub flags: DriveFlags,
    pub reset_count: u32,
    pub error_count: u32,
}

/// Expander-side phy of an enclosure. The status pages are opaque; their
/// layout belongs to the page encoder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VirtualPhyAttributes {
    pub sas_address: u64,
    pub phy_count: u8,
    pub status_pages: Vec<Box<[u8]>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attributes {
    Board(BoardAttributes),
    Port(PortAttributes),
    Enclosure(EnclosureAttributes),
    Drive(DriveAttributes),
    VirtualPhy(VirtualPhyAttributes),
}

impl Attributes {
    pub fn component_type(&self) -> ComponentType {
        match self {
            Attributes::Board(_) => ComponentType::Board,
            Attributes::Port(_) => ComponentType::Port,
            Attributes::Enclosure(_) => ComponentType::Enclosure,
            Attributes::Drive(_) => ComponentType::Drive,
            Attributes::VirtualPhy(_) => ComponentType::VirtualPhy,
        }
    }

    pub fn as_drive(&self) -> Option<&DriveAttributes> {
        match self {
            Attributes::Drive(drive) => Some(drive),
            _ => None,
        }
    }

    pub fn as_drive_mut(&mut self) -> Option<&mut DriveAttributes> {
        match self {
            Attributes::Drive(drive) => Some(drive),
            _ => None,
        }
    }

    pub fn as_port(&self) -> Option<&PortAttributes> {
        match self {
            Attributes::Port(port) => Some(port),
            _ => None,
        }
    }

    pub fn sas_address(&self) -> Option<u64> {
        match self {
            Attributes::Board(_) => None,
            Attributes::Port(port) => Some(port.sas_address),
            Attributes::Enclosure(enclosure) => Some(enclosure.sas_address),
            Attributes::Drive(drive) => Some(drive.sas_address),
            Attributes::VirtualPhy(phy) => Some(phy.sas_address),
        }
    }
}

/// Releases a node's payload. Called exactly once per destroyed node, with
/// the node's type and whatever payload it still held.
pub trait AttributeDestroyer {
    fn destroy(
        &self,
        component_type: ComponentType,
        attributes: Option<Attributes>,
    ) -> Result<(), TopologyError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultAttributeDestroyer;

impl AttributeDestroyer for DefaultAttributeDestroyer {
    fn destroy(
        &self,
        component_type: ComponentType,
        attributes: Option<Attributes>,
    ) -> Result<(), TopologyError> {
        let Some(attributes) = attributes else {
            return Ok(());
        };
        let found = attributes.component_type();
        if found != component_type {
            error!(
                "cannot release {:?} attributes of a {:?} node",
                found, component_type
            );
            return Err(TopologyError::AttributeMismatch {
                expected: component_type,
                found,
            });
        }
        match attributes {
            Attributes::VirtualPhy(phy) => release_virtual_phy(phy),
            _ => Ok(()),
        }
    }
}

fn release_virtual_phy(mut phy: VirtualPhyAttributes) -> Result<(), TopologyError> {
    let pages = phy.status_pages.len();
    let bytes: usize = phy.status_pages.iter().map(|page| page.len()).sum();
    phy.status_pages.clear();
    debug!(
        "released virtual phy {:#x}: {} phys, {} status pages ({} bytes)",
        phy.sas_address, phy.phy_count, pages, bytes
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn payload_type_tags() {
        assert_eq!(
            Attributes::Board(BoardAttributes::default()).component_type(),
            ComponentType::Board
        );
        let drive = Attributes::Drive(DriveAttributes {
            sas_address: 0x5000,
            ..Default::default()
        });
        assert_eq!(drive.component_type(), ComponentType::Drive);
        assert_eq!(drive.sas_address(), Some(0x5000));
        assert!(drive.as_drive().is_some());
        assert!(drive.as_port().is_none());
    }

    #[test]
    fn default_destroyer_releases_matching_payloads() {
        let destroyer = DefaultAttributeDestroyer;
        assert_eq!(destroyer.destroy(ComponentType::Invalid, None), Ok(()));
        let phy = VirtualPhyAttributes {
            sas_address: 0x10,
            phy_count: 12,
            status_pages: vec![Box::from([0u8; 8].as_slice())],
        };
        assert_eq!(
            destroyer.destroy(ComponentType::VirtualPhy, Some(Attributes::VirtualPhy(phy))),
            Ok(())
        );
        assert_eq!(
            destroyer.destroy(
                ComponentType::Port,
                Some(Attributes::Enclosure(EnclosureAttributes::default()))
            ),
            Err(TopologyError::AttributeMismatch {
                expected: ComponentType::Port,
                found: ComponentType::Enclosure
            })
        );
    }

    #[test]
    fn drive_flags() {
        let mut flags = DriveFlags::default();
        assert!(flags.is_empty());
        flags.insert(DriveFlags::PULLED);
        assert!(flags.contains(DriveFlags::PULLED));
        assert!(!flags.contains(DriveFlags::RESETTING));
    }
}

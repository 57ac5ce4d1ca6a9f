use log::{debug, warn};
use slotmap::SlotMap;

use crate::{
    MAX_DEVICES,
    error::RegistryError,
    handle::{DeviceHandle, DeviceType, SlotKey},
};

#[derive(Debug, Clone, Copy)]
struct DeviceRecord<P> {
    device_type: DeviceType,
    device_ptr: P,
}

/// Bounded table of `(DeviceType, P)` records addressed by [DeviceHandle].
///
/// Freed slots are reused most-recently-freed first, each reuse bumping the
/// slot version; callers must not rely on any particular slot assignment
/// order.
#[derive(Debug)]
pub struct DeviceRegistry<P> {
    slots: SlotMap<SlotKey, DeviceRecord<P>>,
    capacity: usize,
}

impl<P: Copy + PartialEq> DeviceRegistry<P> {
    /// Set up an empty table with room for `capacity` devices.
    pub fn init(capacity: usize) -> Result<DeviceRegistry<P>, RegistryError> {
        if capacity == 0 || capacity > MAX_DEVICES {
            return Err(RegistryError::InvalidCapacity(capacity));
        }
        debug!("device registry initialized with {} slots", capacity);
        Ok(DeviceRegistry {
            slots: SlotMap::with_capacity_and_key(capacity),
            capacity,
        })
    }

    /// Release the table. Registered devices are not touched.
    pub fn destroy(self) {
        if !self.slots.is_empty() {
            debug!(
                "device registry destroyed with {} devices still registered",
                self.slots.len()
            );
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn add_device(
        &mut self,
        device_type: DeviceType,
        device_ptr: P,
    ) -> Result<DeviceHandle, RegistryError> {
        if !device_type.is_valid() {
            return Err(RegistryError::InvalidDeviceType);
        }
        let record = DeviceRecord {
            device_type,
            device_ptr,
        };
        if self.slots.len() >= self.capacity {
            warn!(
                "device registry full ({} slots), cannot add device of type {:#x}",
                self.capacity, *device_type
            );
            return Err(RegistryError::Full);
        }
        Ok(DeviceHandle::from(self.slots.insert(record)))
    }

    pub fn remove_device_by_handle(&mut self, handle: DeviceHandle) -> Result<(), RegistryError> {
        self.check_handle(handle)?;
        self.slots
            .remove(handle.key())
            .map(|_| ())
            .ok_or(RegistryError::HandleNotFound(handle))
    }

    /// Remove the first slot, in table order, that references `device_ptr`.
    /// Returns the handle the slot was registered under.
    pub fn remove_device_by_ptr(&mut self, device_ptr: P) -> Result<DeviceHandle, RegistryError> {
        let handle = self.get_device_handle(device_ptr)?;
        self.slots.remove(handle.key());
        Ok(handle)
    }

    /// Write every registered handle into `out` and return how many were written.
    pub fn enumerate_all_devices(&self, out: &mut [DeviceHandle]) -> Result<usize, RegistryError> {
        self.enumerate_matching(out, |_| true)
    }

    pub fn enumerate_devices_by_type(
        &self,
        out: &mut [DeviceHandle],
        device_type: DeviceType,
    ) -> Result<usize, RegistryError> {
        self.enumerate_matching(out, |record| record.device_type == device_type)
    }

    fn enumerate_matching(
        &self,
        out: &mut [DeviceHandle],
        filter: impl Fn(&DeviceRecord<P>) -> bool,
    ) -> Result<usize, RegistryError> {
        let required = self.slots.iter().filter(|(_, record)| filter(record)).count();
        if required > out.len() {
            return Err(RegistryError::InsufficientCapacity {
                required,
                provided: out.len(),
            });
        }
        let matches = self.slots.iter().filter(|(_, record)| filter(record));
        for (slot, (key, _)) in out.iter_mut().zip(matches) {
            *slot = DeviceHandle::from(key);
        }
        Ok(required)
    }

    pub fn get_device_type(&self, handle: DeviceHandle) -> Result<DeviceType, RegistryError> {
        Ok(self.record(handle)?.device_type)
    }

    pub fn get_device_ptr(&self, handle: DeviceHandle) -> Result<P, RegistryError> {
        Ok(self.record(handle)?.device_ptr)
    }

    pub fn get_device_handle(&self, device_ptr: P) -> Result<DeviceHandle, RegistryError> {
        self.slots
            .iter()
            .find(|(_, record)| record.device_ptr == device_ptr)
            .map(|(key, _)| DeviceHandle::from(key))
            .ok_or(RegistryError::DeviceNotFound)
    }

    pub fn get_device_count(&self) -> usize {
        self.slots.len()
    }

    pub fn get_device_count_by_type(&self, device_type: DeviceType) -> usize {
        self.slots
            .iter()
            .filter(|(_, record)| record.device_type == device_type)
            .count()
    }

    /// Registered devices in table order.
    pub fn devices(&self) -> impl Iterator<Item = (DeviceHandle, DeviceType, P)> + '_ {
        self.slots
            .iter()
            .map(|(key, record)| (DeviceHandle::from(key), record.device_type, record.device_ptr))
    }

    fn check_handle(&self, handle: DeviceHandle) -> Result<(), RegistryError> {
        let index = handle.registry_index() as usize;
        if !handle.is_valid() || index == 0 || index > self.capacity {
            return Err(RegistryError::HandleNotFound(handle));
        }
        Ok(())
    }

    fn record(&self, handle: DeviceHandle) -> Result<&DeviceRecord<P>, RegistryError> {
        self.check_handle(handle)?;
        self.slots
            .get(handle.key())
            .ok_or(RegistryError::HandleNotFound(handle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DRIVE: DeviceType = DeviceType::from_const(4);
    const ENCLOSURE: DeviceType = DeviceType::from_const(3);

    #[test]
    fn init_rejects_bad_capacity() {
        assert_eq!(
            DeviceRegistry::<u32>::init(0).unwrap_err(),
            RegistryError::InvalidCapacity(0)
        );
        assert_eq!(
            DeviceRegistry::<u32>::init(MAX_DEVICES + 1).unwrap_err(),
            RegistryError::InvalidCapacity(MAX_DEVICES + 1)
        );
        assert!(DeviceRegistry::<u32>::init(MAX_DEVICES).is_ok());
    }

    #[test]
    fn lookups_round_trip_until_removed() {
        let mut registry = DeviceRegistry::init(16).unwrap();
        let handles: Vec<_> = (0..10u32)
            .map(|ptr| {
                let device_type = if ptr % 2 == 0 { DRIVE } else { ENCLOSURE };
                (registry.add_device(device_type, ptr).unwrap(), device_type, ptr)
            })
            .collect();
        for (handle, device_type, ptr) in &handles {
            assert!(handle.is_valid());
            assert_eq!(registry.get_device_type(*handle), Ok(*device_type));
            assert_eq!(registry.get_device_ptr(*handle), Ok(*ptr));
            assert_eq!(registry.get_device_handle(*ptr), Ok(*handle));
        }
        let (removed, _, ptr) = handles[3];
        registry.remove_device_by_handle(removed).unwrap();
        assert_eq!(
            registry.get_device_ptr(removed),
            Err(RegistryError::HandleNotFound(removed))
        );
        assert_eq!(registry.get_device_handle(ptr), Err(RegistryError::DeviceNotFound));
        assert_eq!(registry.get_device_count(), 9);
    }

    #[test]
    fn stale_handle_is_rejected_after_reuse() {
        let mut registry = DeviceRegistry::init(1).unwrap();
        let old = registry.add_device(DRIVE, 1u32).unwrap();
        registry.remove_device_by_handle(old).unwrap();
        let new = registry.add_device(DRIVE, 2u32).unwrap();
        assert_eq!(old.registry_index(), new.registry_index());
        assert_ne!(old.generation(), new.generation());
        assert_eq!(
            registry.get_device_ptr(old),
            Err(RegistryError::HandleNotFound(old))
        );
        assert_eq!(
            registry.remove_device_by_handle(old),
            Err(RegistryError::HandleNotFound(old))
        );
        assert_eq!(registry.get_device_ptr(new), Ok(2));
    }

    #[test]
    fn insert_past_capacity_fails() {
        let capacity = 8;
        let mut registry = DeviceRegistry::init(capacity).unwrap();
        for ptr in 0..capacity {
            registry.add_device(DRIVE, ptr).unwrap();
        }
        assert_eq!(registry.add_device(DRIVE, capacity), Err(RegistryError::Full));
        assert_eq!(registry.get_device_count(), capacity);
    }

    #[test]
    fn invalid_handles_and_types() {
        let mut registry = DeviceRegistry::init(4).unwrap();
        assert_eq!(
            registry.add_device(DeviceType::INVALID, 0u8),
            Err(RegistryError::InvalidDeviceType)
        );
        assert!(registry.get_device_type(DeviceHandle::INVALID).is_err());
        for out_of_range in [DeviceHandle::from_parts(1, 0), DeviceHandle::from_parts(1, 5)] {
            assert_eq!(
                registry.get_device_type(out_of_range),
                Err(RegistryError::HandleNotFound(out_of_range))
            );
        }
        let handle = registry.add_device(DRIVE, 1u8).unwrap();
        assert_eq!(handle.registry_index(), 1);
        assert_eq!(handle.generation() % 2, 1);
    }

    #[test]
    fn remove_by_ptr_takes_first_match() {
        let mut registry = DeviceRegistry::init(4).unwrap();
        let first = registry.add_device(DRIVE, 7u32).unwrap();
        let second = registry.add_device(ENCLOSURE, 7u32).unwrap();
        assert_eq!(registry.remove_device_by_ptr(7), Ok(first));
        assert_eq!(registry.get_device_handle(7), Ok(second));
        assert_eq!(registry.remove_device_by_ptr(7), Ok(second));
        assert_eq!(registry.remove_device_by_ptr(7), Err(RegistryError::DeviceNotFound));
    }

    #[test]
    fn enumeration_and_counts() {
        let mut registry = DeviceRegistry::init(8).unwrap();
        let drives: Vec<_> = (0..3u32)
            .map(|ptr| registry.add_device(DRIVE, ptr).unwrap())
            .collect();
        registry.add_device(ENCLOSURE, 100).unwrap();

        assert_eq!(registry.get_device_count(), 4);
        assert_eq!(registry.get_device_count_by_type(DRIVE), 3);
        assert_eq!(registry.get_device_count_by_type(ENCLOSURE), 1);

        let mut small = [DeviceHandle::INVALID; 2];
        assert_eq!(
            registry.enumerate_devices_by_type(&mut small, DRIVE),
            Err(RegistryError::InsufficientCapacity {
                required: 3,
                provided: 2
            })
        );

        let mut out = [DeviceHandle::INVALID; 8];
        let count = registry.enumerate_devices_by_type(&mut out, DRIVE).unwrap();
        assert_eq!(count, 3);
        let mut found = out[..count].to_vec();
        found.sort();
        let mut expected = drives.clone();
        expected.sort();
        assert_eq!(found, expected);

        assert_eq!(registry.enumerate_all_devices(&mut out), Ok(4));
        assert!(registry.enumerate_all_devices(&mut out[..3]).is_err());
        assert_eq!(registry.devices().count(), 4);
        registry.destroy();
    }
}

use slotmap::{Key, KeyData, new_key_type};
use utils::define_struct;

new_key_type! {
    /// Slot of the registry table.
    pub struct SlotKey;
}

define_struct!(
    id,
    /// Opaque device handle: `(generation << 32) | registry_index`.
    DeviceHandle,
    u64
);

define_struct!(
    id,
    /// Caller-defined device kind tag. `0` is reserved.
    DeviceType,
    u64
);

impl DeviceHandle {
    pub const INVALID: DeviceHandle = DeviceHandle::from_const(0);

    pub const fn from_parts(generation: u32, index: u32) -> DeviceHandle {
        DeviceHandle::from_const(((generation as u64) << 32) | index as u64)
    }
    /// Slot version. Occupied slots always carry an odd version.
    pub const fn generation(&self) -> u32 {
        (self.inner >> 32) as u32
    }
    /// Slot number, starting at 1.
    pub const fn registry_index(&self) -> u32 {
        self.inner as u32
    }
    pub const fn is_valid(&self) -> bool {
        self.inner != 0
    }
    pub(crate) fn key(&self) -> SlotKey {
        SlotKey::from(KeyData::from_ffi(self.inner))
    }
}

impl From<SlotKey> for DeviceHandle {
    fn from(key: SlotKey) -> Self {
        DeviceHandle::from_const(key.data().as_ffi())
    }
}

impl Default for DeviceHandle {
    fn default() -> Self {
        DeviceHandle::INVALID
    }
}

impl DeviceType {
    pub const INVALID: DeviceType = DeviceType::from_const(0);

    pub const fn is_valid(&self) -> bool {
        self.inner != 0
    }
}

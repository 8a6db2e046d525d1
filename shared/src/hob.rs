//! PI hand-off block record layouts.
//!
//! Every record starts with a [`HobHeader`] and spans a multiple of eight
//! bytes. The structures below are `repr(C)` mirrors of the PI layouts and
//! are only ever copied in and out of the list bytes through `zerocopy`, so
//! nothing holds a reference into a possibly unaligned record.

use uefi::table::boot::MemoryType;
use uuid::{uuid, Uuid};
use zerocopy::{AsBytes, FromBytes};

pub const HOB_TYPE_HANDOFF: u16 = 0x0001;
pub const HOB_TYPE_MEMORY_ALLOCATION: u16 = 0x0002;
pub const HOB_TYPE_RESOURCE_DESCRIPTOR: u16 = 0x0003;
pub const HOB_TYPE_GUID_EXTENSION: u16 = 0x0004;
pub const HOB_TYPE_FV: u16 = 0x0005;
pub const HOB_TYPE_CPU: u16 = 0x0006;
pub const HOB_TYPE_MEMORY_POOL: u16 = 0x0007;
pub const HOB_TYPE_UNUSED: u16 = 0xFFFE;
pub const HOB_TYPE_END_OF_HOB_LIST: u16 = 0xFFFF;

/// Records are padded to this boundary.
pub const HOB_ALIGNMENT: usize = 8;

/// PHIT revision written by [`crate::HobListBuilder`].
pub const HANDOFF_INFO_TABLE_VERSION: u32 = 0x0009;

/// Name of the memory allocation record that describes the BSP stack.
pub const STACK_ALLOCATION_GUID: Uuid = uuid!("4ED4BF27-4092-42E9-807D-527B1D00C9BD");

/// Resource types carried by resource descriptor records.
pub const RESOURCE_SYSTEM_MEMORY: u32 = 0x0000_0000;
pub const RESOURCE_MEMORY_MAPPED_IO: u32 = 0x0000_0001;
pub const RESOURCE_MEMORY_RESERVED: u32 = 0x0000_0005;

/// Common header of every record.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromBytes, AsBytes)]
pub struct HobHeader {
    pub hob_type: u16,
    pub length: u16,
    pub reserved: u32,
}

impl HobHeader {
    pub const SIZE: usize = core::mem::size_of::<HobHeader>();

    pub const fn new(hob_type: u16, length: u16) -> Self {
        Self { hob_type, length, reserved: 0 }
    }

    #[inline]
    pub fn is_end(&self) -> bool {
        self.hob_type == HOB_TYPE_END_OF_HOB_LIST
    }
}

/// Phase Handoff Information Table. Always the first record of a list.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromBytes, AsBytes)]
pub struct HandoffInfoTable {
    pub header: HobHeader,
    pub version: u32,
    pub boot_mode: u32,
    pub memory_top: u64,
    pub memory_bottom: u64,
    pub free_memory_top: u64,
    pub free_memory_bottom: u64,
    pub end_of_hob_list: u64,
}

/// Body of a memory allocation record.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromBytes, AsBytes)]
pub struct MemoryAllocationDescriptor {
    /// EFI GUID bytes (mixed endian, as laid out in memory).
    pub name: [u8; 16],
    pub memory_base_address: u64,
    pub memory_length: u64,
    pub memory_type: u32,
    pub reserved: [u8; 4],
}

impl MemoryAllocationDescriptor {
    pub fn new(name: Uuid, base: u64, length: u64, memory_type: MemoryType) -> Self {
        Self {
            name: name.to_bytes_le(),
            memory_base_address: base,
            memory_length: length,
            memory_type: memory_type.0,
            reserved: [0; 4],
        }
    }

    /// Descriptor for a BSP stack record.
    pub fn stack(base: u64, length: u64) -> Self {
        Self::new(STACK_ALLOCATION_GUID, base, length, MemoryType::BOOT_SERVICES_DATA)
    }

    pub fn name(&self) -> Uuid {
        Uuid::from_bytes_le(self.name)
    }

    pub fn memory_type(&self) -> MemoryType {
        MemoryType(self.memory_type)
    }

    pub fn is_stack(&self) -> bool {
        self.name() == STACK_ALLOCATION_GUID
    }
}

/// Full memory allocation record (header + descriptor).
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromBytes, AsBytes)]
pub struct MemoryAllocationHob {
    pub header: HobHeader,
    pub descriptor: MemoryAllocationDescriptor,
}

impl MemoryAllocationHob {
    pub const SIZE: usize = core::mem::size_of::<MemoryAllocationHob>();
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromBytes, AsBytes)]
pub struct ResourceDescriptorHob {
    pub header: HobHeader,
    pub owner: [u8; 16],
    pub resource_type: u32,
    pub resource_attribute: u32,
    pub physical_start: u64,
    pub resource_length: u64,
}

/// Fixed part of a GUID extension record; opaque data follows.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromBytes, AsBytes)]
pub struct GuidExtensionHeader {
    pub header: HobHeader,
    pub name: [u8; 16],
}

/// Round `len` up to the record alignment.
#[inline]
pub const fn align_record(len: usize) -> usize {
    (len + HOB_ALIGNMENT - 1) & !(HOB_ALIGNMENT - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_sizes_match_pi_layout() {
        assert_eq!(HobHeader::SIZE, 8);
        assert_eq!(core::mem::size_of::<HandoffInfoTable>(), 56);
        assert_eq!(core::mem::size_of::<MemoryAllocationDescriptor>(), 40);
        assert_eq!(MemoryAllocationHob::SIZE, 48);
        assert_eq!(core::mem::size_of::<ResourceDescriptorHob>(), 48);
        assert_eq!(core::mem::size_of::<GuidExtensionHeader>(), 24);
    }

    #[test]
    fn stack_guid_uses_efi_byte_order() {
        let expected = [
            0x27, 0xBF, 0xD4, 0x4E, 0x92, 0x40, 0xE9, 0x42,
            0x80, 0x7D, 0x52, 0x7B, 0x1D, 0x00, 0xC9, 0xBD,
        ];
        assert_eq!(STACK_ALLOCATION_GUID.to_bytes_le(), expected);
        assert!(MemoryAllocationDescriptor::stack(0x1000, 0x2000).is_stack());
    }

    #[test]
    fn descriptor_keeps_memory_type() {
        let d = MemoryAllocationDescriptor::new(Uuid::nil(), 0, 0, MemoryType::LOADER_DATA);
        assert_eq!(d.memory_type(), MemoryType::LOADER_DATA);
        assert!(!d.is_stack());
    }

    #[test]
    fn align_record_rounds_to_eight() {
        assert_eq!(align_record(0), 0);
        assert_eq!(align_record(1), 8);
        assert_eq!(align_record(24), 24);
        assert_eq!(align_record(27), 32);
    }
}

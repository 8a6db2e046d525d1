//! Producer side of the hand-off block list.
//!
//! Earlier boot stages (and test fixtures) append records into a caller
//! provided buffer. Room for the end marker is reserved up front, so a list
//! that was accepted record-by-record can always be terminated.

use uuid::Uuid;
use zerocopy::AsBytes;

use crate::error::HobError;
use crate::hob::{
    align_record, GuidExtensionHeader, HandoffInfoTable, HobHeader, MemoryAllocationDescriptor,
    MemoryAllocationHob, ResourceDescriptorHob, HANDOFF_INFO_TABLE_VERSION,
    HOB_TYPE_END_OF_HOB_LIST, HOB_TYPE_GUID_EXTENSION, HOB_TYPE_HANDOFF,
    HOB_TYPE_MEMORY_ALLOCATION, HOB_TYPE_RESOURCE_DESCRIPTOR,
};
use crate::list::HobList;

pub struct HobListBuilder<'a> {
    buf: &'a mut [u8],
    len: usize,
    has_handoff_info: bool,
}

impl<'a> HobListBuilder<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, len: 0, has_handoff_info: false }
    }

    /// Bytes written so far (end marker not included).
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// PHIT record. Only valid as the first record.
    pub fn push_handoff_info(
        &mut self,
        boot_mode: u32,
        memory_bottom: u64,
        memory_top: u64,
        free_memory_bottom: u64,
        free_memory_top: u64,
    ) -> Result<&mut Self, HobError> {
        if self.len != 0 {
            return Err(HobError::HandoffNotFirst);
        }
        let record = HandoffInfoTable {
            header: header::<HandoffInfoTable>(HOB_TYPE_HANDOFF),
            version: HANDOFF_INFO_TABLE_VERSION,
            boot_mode,
            memory_top,
            memory_bottom,
            free_memory_top,
            free_memory_bottom,
            // patched by `finish`
            end_of_hob_list: 0,
        };
        self.append(&[record.as_bytes()])?;
        self.has_handoff_info = true;
        Ok(self)
    }

    pub fn push_memory_allocation(
        &mut self,
        descriptor: MemoryAllocationDescriptor,
    ) -> Result<&mut Self, HobError> {
        let record = MemoryAllocationHob {
            header: header::<MemoryAllocationHob>(HOB_TYPE_MEMORY_ALLOCATION),
            descriptor,
        };
        self.append(&[record.as_bytes()])?;
        Ok(self)
    }

    pub fn push_resource_descriptor(
        &mut self,
        owner: Uuid,
        resource_type: u32,
        resource_attribute: u32,
        physical_start: u64,
        resource_length: u64,
    ) -> Result<&mut Self, HobError> {
        let record = ResourceDescriptorHob {
            header: header::<ResourceDescriptorHob>(HOB_TYPE_RESOURCE_DESCRIPTOR),
            owner: owner.to_bytes_le(),
            resource_type,
            resource_attribute,
            physical_start,
            resource_length,
        };
        self.append(&[record.as_bytes()])?;
        Ok(self)
    }

    /// GUID-named opaque payload, zero padded to the record alignment.
    pub fn push_guid_extension(&mut self, name: Uuid, data: &[u8]) -> Result<&mut Self, HobError> {
        let fixed = core::mem::size_of::<GuidExtensionHeader>();
        let length = align_record(fixed + data.len());
        let length16 = u16::try_from(length).map_err(|_| HobError::RecordTooLarge { length })?;

        let head = GuidExtensionHeader {
            header: HobHeader::new(HOB_TYPE_GUID_EXTENSION, length16),
            name: name.to_bytes_le(),
        };
        let padding = [0u8; 8];
        let pad = length - fixed - data.len();
        self.append(&[head.as_bytes(), data, &padding[..pad]])?;
        Ok(self)
    }

    /// Write the end marker and hand back a validated view.
    ///
    /// When the list starts with a PHIT, its end-of-list pointer is set to the
    /// address of the end marker.
    pub fn finish(self) -> Result<HobList<'a>, HobError> {
        let HobListBuilder { buf, len, has_handoff_info } = self;
        let end = HobHeader::new(HOB_TYPE_END_OF_HOB_LIST, HobHeader::SIZE as u16);
        end.write_to_prefix(&mut buf[len..])
            .ok_or(HobError::NoSpace { needed: HobHeader::SIZE, available: buf.len() - len })?;

        if has_handoff_info {
            let end_address = buf.as_ptr() as u64 + len as u64;
            let field = core::mem::size_of::<HandoffInfoTable>() - core::mem::size_of::<u64>();
            end_address
                .write_to_prefix(&mut buf[field..])
                .ok_or(HobError::Truncated { offset: 0 })?;
        }

        HobList::new(buf)
    }

    fn append(&mut self, parts: &[&[u8]]) -> Result<(), HobError> {
        let needed: usize = parts.iter().map(|p| p.len()).sum();
        let available = self.buf.len().saturating_sub(self.len + HobHeader::SIZE);
        if needed > available {
            return Err(HobError::NoSpace { needed, available });
        }
        for part in parts {
            self.buf[self.len..self.len + part.len()].copy_from_slice(part);
            self.len += part.len();
        }
        Ok(())
    }
}

fn header<T>(hob_type: u16) -> HobHeader {
    HobHeader::new(hob_type, core::mem::size_of::<T>() as u16)
}

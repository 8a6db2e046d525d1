//! Validated view over a hand-off block list.
//!
//! A [`HobList`] owns the `&mut` handle to the list bytes for as long as the
//! current stage works on them. Construction walks the whole chain once, so
//! every later accessor can rely on well-formed headers up to and including
//! the end marker. The only mutation offered is [`HobList::update_stack_allocation`],
//! which rewrites two fields of one record and leaves every other byte alone.

use uuid::Uuid;
use zerocopy::{AsBytes, FromBytes};

use crate::error::HobError;
use crate::hob::{
    GuidExtensionHeader, HandoffInfoTable, HobHeader, MemoryAllocationDescriptor,
    MemoryAllocationHob, ResourceDescriptorHob, HOB_ALIGNMENT, HOB_TYPE_GUID_EXTENSION,
    HOB_TYPE_HANDOFF, HOB_TYPE_MEMORY_ALLOCATION, HOB_TYPE_RESOURCE_DESCRIPTOR,
    STACK_ALLOCATION_GUID,
};

pub struct HobList<'a> {
    bytes: &'a mut [u8],
}

impl<'a> HobList<'a> {
    /// Walk `bytes` from offset 0 and keep everything up to the end marker.
    pub fn new(bytes: &'a mut [u8]) -> Result<Self, HobError> {
        let len = scan(bytes)?;
        Ok(Self { bytes: &mut bytes[..len] })
    }

    /// Adopt a list that an earlier stage left in memory.
    ///
    /// The walk never reads more than `limit` bytes past `base`.
    ///
    /// # Safety
    /// `base` must point to a hand-off block list that is readable and writable
    /// for `limit` bytes (or up to its end marker, whichever comes first) and is
    /// not aliased for `'a`.
    pub unsafe fn from_raw(base: *mut u8, limit: usize) -> Result<Self, HobError> {
        let mut offset = 0;
        loop {
            if offset + HobHeader::SIZE > limit {
                return Err(HobError::Truncated { offset });
            }
            let header = core::ptr::read_unaligned(base.add(offset) as *const HobHeader);
            let next = advance(offset, &header, limit)?;
            if header.is_end() {
                return Self::new(core::slice::from_raw_parts_mut(base, next));
            }
            offset = next;
        }
    }

    /// Physical address handed to the next stage.
    #[inline]
    pub fn address(&self) -> u64 {
        self.bytes.as_ptr() as u64
    }

    /// Size in bytes, end marker included.
    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.len() <= HobHeader::SIZE
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        self.bytes
    }

    /// Records in list order, end marker excluded.
    pub fn iter(&self) -> HobIter<'_> {
        HobIter { bytes: self.bytes, offset: 0 }
    }

    pub fn handoff_info(&self) -> Option<HandoffInfoTable> {
        self.iter().next().and_then(|r| r.as_handoff_info())
    }

    /// First memory allocation record named `name`, with its byte offset.
    pub fn find_memory_allocation(&self, name: &Uuid) -> Option<(usize, MemoryAllocationDescriptor)> {
        self.iter().find_map(|record| {
            record
                .as_memory_allocation()
                .filter(|d| d.name() == *name)
                .map(|d| (record.offset, d))
        })
    }

    pub fn stack_allocation(&self) -> Option<MemoryAllocationDescriptor> {
        self.find_memory_allocation(&STACK_ALLOCATION_GUID).map(|(_, d)| d)
    }

    /// Point the stack record at `[base, base + length)`.
    ///
    /// Returns the descriptor as it was before the update.
    pub fn update_stack_allocation(
        &mut self,
        base: u64,
        length: u64,
    ) -> Result<MemoryAllocationDescriptor, HobError> {
        let (offset, previous) = self
            .find_memory_allocation(&STACK_ALLOCATION_GUID)
            .ok_or(HobError::StackRecordNotFound)?;

        let mut updated = previous;
        updated.memory_base_address = base;
        updated.memory_length = length;

        let body = offset + HobHeader::SIZE;
        updated
            .write_to_prefix(&mut self.bytes[body..])
            .ok_or(HobError::Truncated { offset })?;
        Ok(previous)
    }
}

/// One record of a validated list.
#[derive(Clone, Copy, Debug)]
pub struct HobRecord<'l> {
    pub offset: usize,
    pub header: HobHeader,
    /// Whole record, header included.
    pub bytes: &'l [u8],
}

impl<'l> HobRecord<'l> {
    #[inline]
    pub fn body(&self) -> &'l [u8] {
        &self.bytes[HobHeader::SIZE..]
    }

    pub fn as_handoff_info(&self) -> Option<HandoffInfoTable> {
        self.typed(HOB_TYPE_HANDOFF)
    }

    pub fn as_memory_allocation(&self) -> Option<MemoryAllocationDescriptor> {
        self.typed::<MemoryAllocationHob>(HOB_TYPE_MEMORY_ALLOCATION)
            .map(|hob| hob.descriptor)
    }

    pub fn as_resource_descriptor(&self) -> Option<ResourceDescriptorHob> {
        self.typed(HOB_TYPE_RESOURCE_DESCRIPTOR)
    }

    /// GUID extension name and its opaque payload (padding included).
    pub fn as_guid_extension(&self) -> Option<(Uuid, &'l [u8])> {
        let head: GuidExtensionHeader = self.typed(HOB_TYPE_GUID_EXTENSION)?;
        let data = &self.bytes[core::mem::size_of::<GuidExtensionHeader>()..];
        Some((Uuid::from_bytes_le(head.name), data))
    }

    fn typed<T: FromBytes>(&self, hob_type: u16) -> Option<T> {
        if self.header.hob_type != hob_type {
            return None;
        }
        T::read_from_prefix(self.bytes)
    }
}

pub struct HobIter<'l> {
    bytes: &'l [u8],
    offset: usize,
}

impl<'l> Iterator for HobIter<'l> {
    type Item = HobRecord<'l>;

    fn next(&mut self) -> Option<Self::Item> {
        let header = read_header(self.bytes, self.offset).ok()?;
        if header.is_end() {
            return None;
        }
        let start = self.offset;
        let end = advance(start, &header, self.bytes.len()).ok()?;
        self.offset = end;
        Some(HobRecord { offset: start, header, bytes: &self.bytes[start..end] })
    }
}

fn read_header(bytes: &[u8], offset: usize) -> Result<HobHeader, HobError> {
    bytes
        .get(offset..)
        .and_then(|tail| HobHeader::read_from_prefix(tail))
        .ok_or(HobError::Truncated { offset })
}

/// Offset of the record following the one at `offset`.
fn advance(offset: usize, header: &HobHeader, limit: usize) -> Result<usize, HobError> {
    let length = header.length as usize;
    if length < HobHeader::SIZE || length % HOB_ALIGNMENT != 0 {
        return Err(HobError::BadLength { offset, length: header.length });
    }
    let next = offset + length;
    if next > limit {
        return Err(HobError::Truncated { offset });
    }
    Ok(next)
}

/// Length of the list in `bytes`, end marker included.
fn scan(bytes: &[u8]) -> Result<usize, HobError> {
    let mut offset = 0;
    loop {
        let header = read_header(bytes, offset)?;
        let next = advance(offset, &header, bytes.len())?;
        if header.is_end() {
            return Ok(next);
        }
        offset = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::HobListBuilder;
    use crate::hob::{HOB_TYPE_END_OF_HOB_LIST, HOB_TYPE_MEMORY_POOL, RESOURCE_SYSTEM_MEMORY};
    use uefi::table::boot::MemoryType;
    use uuid::uuid;

    const FIRMWARE_TABLE: Uuid = uuid!("9e9f374b-8f16-4230-9824-5846ee766a97");

    fn sample(buf: &mut [u8]) -> HobList<'_> {
        let mut builder = HobListBuilder::new(buf);
        builder
            .push_handoff_info(0, 0x0010_0000, 0x8000_0000, 0x0200_0000, 0x0400_0000)
            .unwrap()
            .push_resource_descriptor(Uuid::nil(), RESOURCE_SYSTEM_MEMORY, 0x7, 0, 0x8000_0000)
            .unwrap()
            .push_memory_allocation(MemoryAllocationDescriptor::new(
                Uuid::nil(),
                0x0300_0000,
                0x4000,
                MemoryType::BOOT_SERVICES_CODE,
            ))
            .unwrap()
            .push_memory_allocation(MemoryAllocationDescriptor::stack(0x0009_0000, 0x1_0000))
            .unwrap()
            .push_guid_extension(FIRMWARE_TABLE, &[0xAA, 0xBB, 0xCC])
            .unwrap();
        builder.finish().unwrap()
    }

    #[test]
    fn walks_records_in_order() {
        let mut buf = [0u8; 512];
        let list = sample(&mut buf);
        let types: Vec<u16> = list.iter().map(|r| r.header.hob_type).collect();
        assert_eq!(
            types,
            [
                HOB_TYPE_HANDOFF,
                HOB_TYPE_RESOURCE_DESCRIPTOR,
                HOB_TYPE_MEMORY_ALLOCATION,
                HOB_TYPE_MEMORY_ALLOCATION,
                HOB_TYPE_GUID_EXTENSION,
            ]
        );
        assert!(list.handoff_info().is_some());
    }

    #[test]
    fn finds_the_stack_record() {
        let mut buf = [0u8; 512];
        let list = sample(&mut buf);
        let stack = list.stack_allocation().unwrap();
        assert_eq!(stack.memory_base_address, 0x0009_0000);
        assert_eq!(stack.memory_length, 0x1_0000);
    }

    #[test]
    fn update_touches_only_the_stack_fields() {
        let mut buf = [0u8; 512];
        let mut list = sample(&mut buf);
        let before = list.as_bytes().to_vec();
        let (offset, _) = list.find_memory_allocation(&STACK_ALLOCATION_GUID).unwrap();

        let previous = list.update_stack_allocation(0x7FE0_0000, 0x2_0000).unwrap();
        assert_eq!(previous.memory_base_address, 0x0009_0000);

        let after = list.as_bytes();
        assert_eq!(before.len(), after.len());
        // base and length live at +16..+32 of the descriptor
        let patched = offset + HobHeader::SIZE + 16..offset + HobHeader::SIZE + 32;
        for (i, (a, b)) in before.iter().zip(after.iter()).enumerate() {
            if !patched.contains(&i) {
                assert_eq!(a, b, "byte {:#x} changed", i);
            }
        }

        let stack = list.stack_allocation().unwrap();
        assert_eq!(stack.memory_base_address, 0x7FE0_0000);
        assert_eq!(stack.memory_length, 0x2_0000);
        assert_eq!(stack.memory_type(), MemoryType::BOOT_SERVICES_DATA);
    }

    #[test]
    fn missing_stack_record_is_reported() {
        let mut buf = [0u8; 128];
        let mut builder = HobListBuilder::new(&mut buf);
        builder.push_handoff_info(0, 0, 0x1000_0000, 0, 0x1000_0000).unwrap();
        let mut list = builder.finish().unwrap();
        assert_eq!(
            list.update_stack_allocation(0x1000, 0x1000),
            Err(HobError::StackRecordNotFound)
        );
    }

    #[test]
    fn guid_extension_payload_is_exposed() {
        let mut buf = [0u8; 512];
        let list = sample(&mut buf);
        let (name, data) = list.iter().find_map(|r| r.as_guid_extension()).unwrap();
        assert_eq!(name, FIRMWARE_TABLE);
        assert_eq!(&data[..3], &[0xAA, 0xBB, 0xCC]);
        assert_eq!(data.len(), 8);
    }

    #[test]
    fn rejects_list_without_end_marker() {
        let mut buf = [0u8; 16];
        HobHeader::new(HOB_TYPE_MEMORY_POOL, 16).write_to_prefix(&mut buf[..]).unwrap();
        assert_eq!(HobList::new(&mut buf).err(), Some(HobError::Truncated { offset: 16 }));
    }

    #[test]
    fn rejects_zero_length_record() {
        let mut buf = [0u8; 32];
        HobHeader::new(HOB_TYPE_HANDOFF, 0).write_to_prefix(&mut buf[..]).unwrap();
        assert_eq!(
            HobList::new(&mut buf).err(),
            Some(HobError::BadLength { offset: 0, length: 0 })
        );
    }

    #[test]
    fn from_raw_stops_at_end_marker() {
        let mut buf = [0u8; 512];
        let expected = sample(&mut buf).len();
        let list = unsafe { HobList::from_raw(buf.as_mut_ptr(), buf.len()) }.unwrap();
        assert_eq!(list.len(), expected);
        assert_eq!(list.address(), buf.as_ptr() as u64);
    }

    #[test]
    fn from_raw_respects_limit() {
        let mut buf = [0u8; 512];
        let len = sample(&mut buf).len();
        let err = unsafe { HobList::from_raw(buf.as_mut_ptr(), len - HobHeader::SIZE) }.err();
        assert!(matches!(err, Some(HobError::Truncated { .. })));
    }

    #[test]
    fn end_marker_only_list_is_empty() {
        let mut buf = [0u8; 8];
        HobHeader::new(HOB_TYPE_END_OF_HOB_LIST, 8).write_to_prefix(&mut buf[..]).unwrap();
        let list = HobList::new(&mut buf).unwrap();
        assert!(list.is_empty());
        assert_eq!(list.iter().count(), 0);
    }
}

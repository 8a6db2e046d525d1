//! NØNOS Hand-off Block Format: shared between boot stages
//!
//! The hand-off block list is the single structure one boot stage passes to
//! the next: a packed chain of PI HOB records (PHIT, memory allocations,
//! resource descriptors, GUID extensions) closed by an end marker.
//!
//! # Contract
//! - Layout is `repr(C)`, little-endian, records 8-byte granular
//! - Readers never reorder, drop or resize records
//! - The only in-place edit is the BSP stack allocation record
//!   ([`HobList::update_stack_allocation`])

#![cfg_attr(not(test), no_std)]

pub mod builder;
pub mod error;
pub mod hob;
pub mod list;

pub use builder::HobListBuilder;
pub use error::HobError;
pub use hob::{
    HandoffInfoTable, HobHeader, MemoryAllocationDescriptor, MemoryAllocationHob,
    ResourceDescriptorHob, STACK_ALLOCATION_GUID,
};
pub use list::{HobIter, HobList, HobRecord};

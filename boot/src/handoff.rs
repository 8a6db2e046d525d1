//! NØNOS Boot Handoff Interface: hand-off block as seen by the launcher
//!
//! The hand-off block is produced by earlier stages and consumed by the next
//! one. This stage holds the only `&mut` handle while it runs and performs a
//! single edit: the stack record is pointed at the stack the next stage will
//! actually start on. Every other record stays byte-for-byte identical.
//!
//! # Architecture Notes
//! - The handle is threaded explicitly; there is no global list pointer
//! - Tables are identity mapped, so the block's address survives the CR3 load
//! - A list without a stack record is passed on unchanged (with a warning)

use nonos_hob::{HobError, HobList};
use x86_64::PhysAddr;

use crate::error::HandoffError;
use crate::stack::StackRegion;

pub trait HandoffBlock {
    /// Address passed to the next stage as its first argument.
    fn address(&self) -> u64;

    /// Overwrite base and length of the stack record.
    fn update_stack_region(&mut self, base: PhysAddr, size: u64) -> Result<(), HandoffError>;
}

impl HandoffBlock for HobList<'_> {
    fn address(&self) -> u64 {
        HobList::address(self)
    }

    fn update_stack_region(&mut self, base: PhysAddr, size: u64) -> Result<(), HandoffError> {
        let previous = self.update_stack_allocation(base.as_u64(), size)?;
        log::debug!(
            target: "hob",
            "stack record 0x{:x}+0x{:x} -> 0x{:x}+0x{:x}",
            previous.memory_base_address,
            previous.memory_length,
            base.as_u64(),
            size
        );
        Ok(())
    }
}

/// Publish the final stack in the hand-off block.
///
/// A missing stack record is not fatal; the block goes out as it came in.
pub fn publish_stack(block: &mut dyn HandoffBlock, stack: &StackRegion) -> Result<(), HandoffError> {
    match block.update_stack_region(stack.base, stack.size()) {
        Ok(()) => {
            log::info!(target: "hob", "[✓] stack record updated");
            Ok(())
        }
        Err(HandoffError::HandoffBlock(HobError::StackRecordNotFound)) => {
            log::warn!(target: "hob", "no stack record in hand-off block; left as is");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

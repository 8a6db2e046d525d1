//! Hardware access capability.
//!
//! Every privileged operation the handoff performs goes through [`Hardware`]
//! so the sequencing above it can run against a recording fake. The real
//! implementation lives in [`crate::arch`].

use x86_64::structures::paging::PhysFrame;
use x86_64::VirtAddr;

use crate::error::HandoffError;

/// 8259 interrupt mask registers.
pub const LEGACY_8259_MASK_REGISTER_MASTER: u16 = 0x21;
pub const LEGACY_8259_MASK_REGISTER_SLAVE: u16 = 0xA1;

/// Address of the next stage's entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NextStageEntry(u64);

impl NextStageEntry {
    pub const fn new(addr: u64) -> Self {
        Self(addr)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

/// Arguments of the next stage's entry point.
///
/// The two reserved slots are always zero so nothing from this stage's
/// registers leaks into the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferArgs {
    pub handoff_block: u64,
    pub reserved: [u64; 2],
}

impl TransferArgs {
    pub const fn new(handoff_block: u64) -> Self {
        Self { handoff_block, reserved: [0, 0] }
    }
}

pub trait Hardware {
    fn read_port(&mut self, port: u16) -> u8;

    fn write_port(&mut self, port: u16, value: u8);

    /// Put x87 and SSE into the state UEFI expects at DXE entry.
    fn init_fpu(&mut self);

    /// Load CR3.
    ///
    /// # Safety
    /// `root` must map everything executed and touched after the load,
    /// including the caller's own code and stack.
    unsafe fn load_translation_root(&mut self, root: PhysFrame);

    /// Move to `stack_top` and call `entry(args)`. Never comes back.
    fn switch_stack(&mut self, entry: NextStageEntry, args: TransferArgs, stack_top: VirtAddr) -> !;

    /// Stop the processor after an unrecoverable error.
    fn halt(&mut self, error: &HandoffError) -> !;
}

/// Mask every legacy 8259 interrupt source.
pub fn mask_legacy_pic(hw: &mut dyn Hardware) {
    let master = hw.read_port(LEGACY_8259_MASK_REGISTER_MASTER);
    let slave = hw.read_port(LEGACY_8259_MASK_REGISTER_SLAVE);
    hw.write_port(LEGACY_8259_MASK_REGISTER_MASTER, 0xFF);
    hw.write_port(LEGACY_8259_MASK_REGISTER_SLAVE, 0xFF);
    log::debug!(target: "cpu", "8259 masks {:02x}/{:02x} -> ff/ff", master, slave);
}

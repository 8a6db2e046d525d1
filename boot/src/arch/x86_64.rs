//! x86_64 hardware capability
//!
//! # Transfer ABI
//! The next stage is an EFIAPI (Win64) entry: `entry(hob, 0, 0)` with the
//! arguments in RCX/RDX/R8. The stack pointer is set to the prepared top,
//! 0x20 bytes of shadow space are carved below it and RBP is cleared so stack
//! walkers stop there. The jump is a `call`: if the entry ever returns it
//! lands in [`next_stage_returned`], which logs and halts.

use core::arch::asm;

use x86_64::instructions::port::Port;
use x86_64::instructions::{hlt, interrupts};
use x86_64::registers::control::{Cr3, Cr3Flags, Cr4, Cr4Flags};
use x86_64::structures::paging::PhysFrame;
use x86_64::VirtAddr;

use crate::error::HandoffError;
use crate::hw::{Hardware, NextStageEntry, TransferArgs};

/// x87 control word: all exceptions masked, 64-bit precision, round to nearest.
const FPU_CONTROL_WORD: u16 = 0x037F;
/// MXCSR reset value: all SSE exceptions masked.
const MXCSR_DEFAULT: u32 = 0x1F80;

pub struct X64Cpu {
    _private: (),
}

impl X64Cpu {
    /// # Safety
    /// Only one instance may exist, and only while running at CPL0.
    pub unsafe fn new() -> Self {
        X64Cpu { _private: () }
    }
}

impl Hardware for X64Cpu {
    fn read_port(&mut self, port: u16) -> u8 {
        unsafe { Port::<u8>::new(port).read() }
    }

    fn write_port(&mut self, port: u16, value: u8) {
        unsafe { Port::<u8>::new(port).write(value) }
    }

    fn init_fpu(&mut self) {
        unsafe {
            Cr4::update(|flags| flags.insert(Cr4Flags::OSFXSR | Cr4Flags::OSXMMEXCPT_ENABLE));
            asm!(
                "fninit",
                "fldcw [{cw}]",
                "ldmxcsr [{mxcsr}]",
                cw = in(reg) &FPU_CONTROL_WORD as *const u16,
                mxcsr = in(reg) &MXCSR_DEFAULT as *const u32,
                options(nostack, readonly),
            );
        }
        log::debug!(target: "cpu", "x87/SSE initialised (fcw={:#06x}, mxcsr={:#06x})", FPU_CONTROL_WORD, MXCSR_DEFAULT);
    }

    unsafe fn load_translation_root(&mut self, root: PhysFrame) {
        Cr3::write(root, Cr3Flags::empty());
    }

    fn switch_stack(&mut self, entry: NextStageEntry, args: TransferArgs, stack_top: VirtAddr) -> ! {
        unsafe { switch_stack(entry.as_u64(), args, stack_top.as_u64()) }
    }

    fn halt(&mut self, _error: &HandoffError) -> ! {
        halt_forever()
    }
}

/// # Safety
/// `stack_top` must be 16-byte aligned writable memory mapped in the active
/// tables, and `entry` the address of an EFIAPI function that never returns.
unsafe fn switch_stack(entry: u64, args: TransferArgs, stack_top: u64) -> ! {
    asm!(
        "mov rsp, {stack}",
        "sub rsp, 0x20",
        "xor ebp, ebp",
        "call {entry}",
        "call {returned}",
        "ud2",
        stack = in(reg) stack_top,
        entry = in(reg) entry,
        returned = sym next_stage_returned,
        in("rcx") args.handoff_block,
        in("rdx") args.reserved[0],
        in("r8") args.reserved[1],
        options(noreturn),
    )
}

extern "C" fn next_stage_returned() -> ! {
    log::error!(target: "handoff", "[×] {}", HandoffError::NextStageReturned);
    halt_forever()
}

fn halt_forever() -> ! {
    interrupts::disable();
    loop {
        hlt();
    }
}

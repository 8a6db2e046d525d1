//! NØNOS Stage Handoff: fresh stack, optional identity tables, one-way jump
//!
//! Order of work (each step only after the previous one completed):
//! 1. quiesce: x87/SSE init, mask every 8259 source
//! 2. check the switch set (hardening needs `build-page-tables`)
//! 3. allocate the stack and compute its top
//! 4. build identity tables when enabled
//! 5. load CR3 when tables were built
//! 6. publish the final stack in the hand-off block
//! 7. switch stacks and call the next stage with `(hob, 0, 0)`
//!
//! Every failure is fatal: it is logged and the processor halts. There is no
//! caller left to return an error to.

use x86_64::VirtAddr;

use crate::config::{check_consistency, Feature, FeatureQuery, StackLayout};
use crate::error::HandoffError;
use crate::handoff::{publish_stack, HandoffBlock};
use crate::hw::{mask_legacy_pic, Hardware, NextStageEntry, TransferArgs};
use crate::paging::{prepare_translation, PageTableBuilder, PhysRange, TranslationRoot};
use crate::phase::{Phase, PhaseTracker};
use crate::stack::{allocate_stack, PageAllocator, StackRegion};

/// Collaborators the handoff sequences. All are borrowed for the one run.
pub struct HandoffEnv<'a> {
    pub allocator: &'a mut dyn PageAllocator,
    pub tables: &'a mut dyn PageTableBuilder,
    pub features: &'a dyn FeatureQuery,
    pub hw: &'a mut dyn Hardware,
    /// GHCB pages, when the platform provides them.
    pub secure_buffer: Option<PhysRange>,
}

/// Environment ready for activation and transfer.
#[derive(Debug, Clone)]
pub struct PreparedHandoff {
    pub stack: StackRegion,
    pub root: TranslationRoot,
    phases: PhaseTracker,
}

impl PreparedHandoff {
    pub fn phases(&self) -> &PhaseTracker {
        &self.phases
    }
}

/// Steps 2-4: validate switches, allocate the stack, build tables.
pub fn prepare_environment(
    allocator: &mut dyn PageAllocator,
    tables: &mut dyn PageTableBuilder,
    features: &dyn FeatureQuery,
    layout: &StackLayout,
    secure_buffer: Option<PhysRange>,
) -> Result<PreparedHandoff, HandoffError> {
    check_consistency(features)?;

    let mut phases = PhaseTracker::new(features.is_enabled(Feature::BuildPageTables));

    let stack = allocate_stack(allocator, layout)?;
    phases.advance(Phase::StackAllocated)?;

    let root = prepare_translation(features, tables, &stack, secure_buffer)?;
    if !root.is_unused() {
        phases.advance(Phase::TablesBuilt)?;
    }

    Ok(PreparedHandoff { stack, root, phases })
}

/// Step 5: load CR3 iff tables were built.
pub fn activate_address_space(
    hw: &mut dyn Hardware,
    prepared: &mut PreparedHandoff,
) -> Result<(), HandoffError> {
    if let TranslationRoot::Root(frame) = prepared.root {
        // SAFETY: the builder contract covers this code, its stack and the new stack.
        unsafe { hw.load_translation_root(frame) };
        prepared.phases.advance(Phase::TranslationActive)?;
        log::info!(target: "paging", "[✓] CR3 <- 0x{:x}", frame.start_address().as_u64());
    }
    Ok(())
}

/// Step 6.
pub fn update_handoff_block(
    block: &mut dyn HandoffBlock,
    prepared: &mut PreparedHandoff,
) -> Result<(), HandoffError> {
    publish_stack(block, &prepared.stack)?;
    prepared.phases.advance(Phase::HandoffUpdated)
}

/// Step 7.
pub fn transfer_control(
    hw: &mut dyn Hardware,
    entry: NextStageEntry,
    block: &dyn HandoffBlock,
    mut prepared: PreparedHandoff,
) -> ! {
    if let Err(e) = prepared.phases.advance(Phase::Transferred) {
        fatal(hw, &e);
    }
    let args = TransferArgs::new(block.address());
    let top: VirtAddr = prepared.stack.top;
    log::info!(
        target: "handoff",
        "⤴️ jumping to 0x{:x} (hob 0x{:x}, rsp 0x{:x})",
        entry.as_u64(),
        args.handoff_block,
        top.as_u64()
    );
    hw.switch_stack(entry, args, top)
}

/// Run the whole handoff. Never returns.
///
/// The switch set is checked right after quiescing, inside
/// [`prepare_environment`] and before the allocator is asked for anything.
pub fn hand_off_to_next_stage(
    env: HandoffEnv<'_>,
    layout: &StackLayout,
    entry: NextStageEntry,
    block: &mut dyn HandoffBlock,
) -> ! {
    let HandoffEnv { allocator, tables, features, hw, secure_buffer } = env;

    hw.init_fpu();
    mask_legacy_pic(hw);

    let mut prepared = match prepare_environment(allocator, tables, features, layout, secure_buffer) {
        Ok(p) => p,
        Err(e) => fatal(hw, &e),
    };
    if let Err(e) = activate_address_space(hw, &mut prepared) {
        fatal(hw, &e);
    }
    if let Err(e) = update_handoff_block(block, &mut prepared) {
        fatal(hw, &e);
    }
    transfer_control(hw, entry, block, prepared)
}

/// Log `error` and stop the processor.
pub fn fatal(hw: &mut dyn Hardware, error: &HandoffError) -> ! {
    log::error!(target: "handoff", "[×] handoff aborted: {}", error);
    hw.halt(error)
}

//! Translation tables for the next stage.
//!
//! This stage never walks or writes page tables itself. It describes what
//! must stay reachable once CR3 changes (the new stack, the GHCB when the
//! platform has one) and asks a [`PageTableBuilder`] for a root.
//!
//! # Builder contract
//! The returned root must identity-map every byte the processor touches right
//! after the CR3 load: the requested ranges *and* the code, data and current
//! stack of this stage. Nothing here verifies that; a short mapping faults or
//! silently corrupts memory on the very next instruction.

use x86_64::structures::paging::PhysFrame;
use x86_64::PhysAddr;

use crate::config::{Feature, FeatureQuery};
use crate::error::HandoffError;
use crate::stack::StackRegion;

/// Half-open physical range `[start, start + size)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhysRange {
    pub start: PhysAddr,
    pub size: u64,
}

impl PhysRange {
    pub const fn new(start: PhysAddr, size: u64) -> Self {
        Self { start, size }
    }

    pub fn end(&self) -> PhysAddr {
        self.start + self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn contains(&self, addr: PhysAddr) -> bool {
        addr >= self.start && addr < self.end()
    }
}

/// What the builder must cover, and how the stack is to be protected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentityMapRequest {
    pub stack: PhysRange,
    /// Secure-communication (GHCB) pages, mapped unencrypted when present.
    pub ghcb: Option<PhysRange>,
    pub nx_stack: bool,
    pub stack_guard: bool,
}

pub trait PageTableBuilder {
    /// Build identity tables satisfying `request`; `None` if that is impossible.
    fn build_identity_map(&mut self, request: &IdentityMapRequest) -> Option<PhysFrame>;
}

/// Value destined for CR3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranslationRoot {
    /// Translation stays as firmware left it.
    Unused,
    Root(PhysFrame),
}

impl TranslationRoot {
    /// Raw register value; 0 for [`TranslationRoot::Unused`].
    pub fn as_u64(&self) -> u64 {
        match self {
            TranslationRoot::Unused => 0,
            TranslationRoot::Root(frame) => frame.start_address().as_u64(),
        }
    }

    pub fn is_unused(&self) -> bool {
        matches!(self, TranslationRoot::Unused)
    }
}

/// Ask for identity tables when `build-page-tables` is on.
///
/// With the switch off the hardening switches must be off too; that is
/// checked up front by [`crate::config::check_consistency`] and the root
/// stays [`TranslationRoot::Unused`].
pub fn prepare_translation(
    features: &dyn FeatureQuery,
    builder: &mut dyn PageTableBuilder,
    stack: &StackRegion,
    ghcb: Option<PhysRange>,
) -> Result<TranslationRoot, HandoffError> {
    if !features.is_enabled(Feature::BuildPageTables) {
        log::debug!(target: "paging", "page table build disabled; translation untouched");
        return Ok(TranslationRoot::Unused);
    }

    let request = IdentityMapRequest {
        stack: PhysRange::new(stack.base, stack.size()),
        ghcb: ghcb.filter(|r| !r.is_empty()),
        nx_stack: features.is_enabled(Feature::NxForStack),
        stack_guard: features.is_enabled(Feature::StackGuard),
    };
    let root = builder
        .build_identity_map(&request)
        .ok_or(HandoffError::TableBuildFailed)?;

    log::info!(
        target: "paging",
        "[✓] identity tables at 0x{:x} (nx-stack={}, stack-guard={}, ghcb={})",
        root.start_address().as_u64(),
        request.nx_stack,
        request.stack_guard,
        request.ghcb.is_some()
    );
    Ok(TranslationRoot::Root(root))
}

//! Handoff error type.
//!
//! Nothing here is returned to a caller in the end: the launch sequence
//! funnels every error into [`crate::launch::fatal`], which logs it and halts
//! the processor. The type exists so each step can use `?` and so tests can
//! assert on the exact failure.

use core::fmt;

use nonos_hob::HobError;

use crate::config::{Feature, StackLayout};
use crate::phase::Phase;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandoffError {
    /// The page allocator could not supply the stack.
    OutOfResources { pages: usize },
    /// The page allocator returned memory that is not page aligned.
    MisalignedAllocation { base: u64 },
    /// Stack geometry that cannot yield a usable stack.
    InvalidStackLayout(StackLayout),
    /// A hardening switch is on while `build-page-tables` is off.
    ConfigViolation(Feature),
    /// The table builder produced no usable root.
    TableBuildFailed,
    /// The hand-off block could not be read or patched.
    HandoffBlock(HobError),
    /// A step ran out of order.
    PhaseOrder { from: Phase, to: Phase },
    /// The next stage's entry point returned.
    NextStageReturned,
}

impl HandoffError {
    pub fn message(&self) -> &'static str {
        match self {
            HandoffError::OutOfResources { .. } => "stack allocation failed",
            HandoffError::MisalignedAllocation { .. } => "allocator returned unaligned pages",
            HandoffError::InvalidStackLayout(_) => "stack layout leaves no usable stack",
            HandoffError::ConfigViolation(_) => "hardening switch requires build-page-tables",
            HandoffError::TableBuildFailed => "identity page table construction failed",
            HandoffError::HandoffBlock(e) => e.message(),
            HandoffError::PhaseOrder { .. } => "handoff step out of order",
            HandoffError::NextStageReturned => "next stage returned to the handoff routine",
        }
    }
}

impl From<HobError> for HandoffError {
    fn from(e: HobError) -> Self {
        HandoffError::HandoffBlock(e)
    }
}

impl fmt::Display for HandoffError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandoffError::OutOfResources { pages } => write!(f, "{} ({} pages)", self.message(), pages),
            HandoffError::MisalignedAllocation { base } => write!(f, "{} (0x{:x})", self.message(), base),
            HandoffError::InvalidStackLayout(l) => write!(
                f,
                "{} (size 0x{:x}, alignment {}, margin 0x{:x})",
                self.message(),
                l.size,
                l.alignment,
                l.safety_margin
            ),
            HandoffError::ConfigViolation(feature) => write!(f, "{}: {}", self.message(), feature.name()),
            HandoffError::HandoffBlock(e) => write!(f, "hand-off block: {}", e),
            HandoffError::PhaseOrder { from, to } => write!(f, "{}: {:?} -> {:?}", self.message(), from, to),
            _ => f.write_str(self.message()),
        }
    }
}

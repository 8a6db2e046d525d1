//! NØNOS Handoff Configuration Surface
//!
//! Build-time switches that decide how the next stage's environment is
//! prepared. They come from Cargo features and are read-only at runtime:
//!
//! - `build-page-tables`: build identity tables and load CR3 before the jump
//! - `nx-stack`: the new stack is mapped no-execute
//! - `stack-guard`: a not-present guard page sits below the new stack
//!
//! Both hardening switches only mean something once translation tables are
//! built by this stage. Enabling either without `build-page-tables` is a
//! misconfigured build and halts the handoff (see [`check_consistency`]).

use bitflags::bitflags;

use crate::error::HandoffError;

/// Standard 4 KiB page.
pub const PAGE_SIZE: u64 = 0x1000;

/// Stack handed to the next stage (128 KiB).
pub const STACK_SIZE: u64 = 0x2_0000;

/// x86_64 ABI stack alignment.
pub const CPU_STACK_ALIGNMENT: u64 = 16;

/// A named boolean switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    BuildPageTables,
    NxForStack,
    StackGuard,
}

impl Feature {
    pub const ALL: [Feature; 3] = [Feature::BuildPageTables, Feature::NxForStack, Feature::StackGuard];

    /// Features that only apply when translation tables are built here.
    pub const HARDENING: [Feature; 2] = [Feature::NxForStack, Feature::StackGuard];

    pub const fn name(self) -> &'static str {
        match self {
            Feature::BuildPageTables => "build-page-tables",
            Feature::NxForStack => "nx-stack",
            Feature::StackGuard => "stack-guard",
        }
    }

    pub fn from_name(name: &str) -> Option<Feature> {
        Feature::ALL.into_iter().find(|f| f.name() == name)
    }
}

/// Read-only query surface for boolean switches.
pub trait FeatureQuery {
    fn is_enabled(&self, feature: Feature) -> bool;

    fn is_enabled_by_name(&self, name: &str) -> Option<bool> {
        Feature::from_name(name).map(|f| self.is_enabled(f))
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PayloadFeatures: u32 {
        const BUILD_PAGE_TABLES = 1 << 0;
        const NX_FOR_STACK      = 1 << 1;
        const STACK_GUARD       = 1 << 2;
    }
}

impl PayloadFeatures {
    /// Switches selected by the Cargo features of this build.
    pub fn from_build() -> Self {
        let mut flags = PayloadFeatures::empty();
        flags.set(PayloadFeatures::BUILD_PAGE_TABLES, cfg!(feature = "build-page-tables"));
        flags.set(PayloadFeatures::NX_FOR_STACK, cfg!(feature = "nx-stack"));
        flags.set(PayloadFeatures::STACK_GUARD, cfg!(feature = "stack-guard"));
        flags
    }

    const fn flag(feature: Feature) -> PayloadFeatures {
        match feature {
            Feature::BuildPageTables => PayloadFeatures::BUILD_PAGE_TABLES,
            Feature::NxForStack => PayloadFeatures::NX_FOR_STACK,
            Feature::StackGuard => PayloadFeatures::STACK_GUARD,
        }
    }
}

impl FeatureQuery for PayloadFeatures {
    fn is_enabled(&self, feature: Feature) -> bool {
        self.contains(PayloadFeatures::flag(feature))
    }
}

/// Geometry of the stack prepared for the next stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackLayout {
    /// Requested size in bytes; rounded up to whole pages on allocation.
    pub size: u64,
    /// Required alignment of the initial stack pointer.
    pub alignment: u64,
    /// Bytes kept free above the initial stack pointer.
    pub safety_margin: u64,
}

impl StackLayout {
    pub const X64: StackLayout = StackLayout {
        size: STACK_SIZE,
        alignment: CPU_STACK_ALIGNMENT,
        safety_margin: CPU_STACK_ALIGNMENT,
    };

    pub const fn pages(&self) -> usize {
        size_to_pages(self.size)
    }

    /// Non-empty, power-of-two alignment, margin smaller than the page run.
    pub fn validate(&self) -> Result<(), HandoffError> {
        let run = (self.pages() as u64).saturating_mul(PAGE_SIZE);
        if self.size == 0 || !self.alignment.is_power_of_two() || self.safety_margin >= run {
            return Err(HandoffError::InvalidStackLayout(*self));
        }
        Ok(())
    }
}

impl Default for StackLayout {
    fn default() -> Self {
        StackLayout::X64
    }
}

#[inline]
pub const fn size_to_pages(size: u64) -> usize {
    size.div_ceil(PAGE_SIZE) as usize
}

/// Hardening switches require `build-page-tables`.
pub fn check_consistency(features: &dyn FeatureQuery) -> Result<(), HandoffError> {
    if features.is_enabled(Feature::BuildPageTables) {
        return Ok(());
    }
    match Feature::HARDENING.into_iter().find(|f| features.is_enabled(*f)) {
        Some(offending) => Err(HandoffError::ConfigViolation(offending)),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for f in Feature::ALL {
            assert_eq!(Feature::from_name(f.name()), Some(f));
        }
        assert_eq!(Feature::from_name("kaslr"), None);
    }

    #[test]
    fn query_by_name() {
        let flags = PayloadFeatures::BUILD_PAGE_TABLES | PayloadFeatures::STACK_GUARD;
        assert_eq!(flags.is_enabled_by_name("build-page-tables"), Some(true));
        assert_eq!(flags.is_enabled_by_name("nx-stack"), Some(false));
        assert_eq!(flags.is_enabled_by_name("stack-guard"), Some(true));
        assert_eq!(flags.is_enabled_by_name("smap"), None);
    }

    #[test]
    fn build_features_follow_cargo() {
        let flags = PayloadFeatures::from_build();
        assert_eq!(flags.is_enabled(Feature::BuildPageTables), cfg!(feature = "build-page-tables"));
        assert_eq!(flags.is_enabled(Feature::NxForStack), cfg!(feature = "nx-stack"));
        assert_eq!(flags.is_enabled(Feature::StackGuard), cfg!(feature = "stack-guard"));
    }

    #[test]
    fn hardening_without_tables_is_rejected() {
        assert_eq!(
            check_consistency(&PayloadFeatures::NX_FOR_STACK),
            Err(HandoffError::ConfigViolation(Feature::NxForStack))
        );
        assert_eq!(
            check_consistency(&PayloadFeatures::STACK_GUARD),
            Err(HandoffError::ConfigViolation(Feature::StackGuard))
        );
    }

    #[test]
    fn consistent_sets_pass() {
        assert!(check_consistency(&PayloadFeatures::empty()).is_ok());
        assert!(check_consistency(&PayloadFeatures::all()).is_ok());
        assert!(check_consistency(&PayloadFeatures::BUILD_PAGE_TABLES).is_ok());
    }

    #[test]
    fn default_layout_is_128k() {
        let layout = StackLayout::default();
        assert_eq!(layout.size, 0x20000);
        assert_eq!(layout.pages(), 32);
        assert_eq!(size_to_pages(1), 1);
        assert_eq!(size_to_pages(0x1001), 2);
        assert_eq!(size_to_pages(u64::MAX), (u64::MAX / PAGE_SIZE + 1) as usize);
        assert!(layout.validate().is_ok());
    }

    #[test]
    fn degenerate_layouts_fail_validation() {
        for layout in [
            StackLayout { size: 0, ..StackLayout::X64 },
            StackLayout { alignment: 0, ..StackLayout::X64 },
            StackLayout { alignment: 12, ..StackLayout::X64 },
            StackLayout { safety_margin: STACK_SIZE, ..StackLayout::X64 },
        ] {
            assert_eq!(layout.validate(), Err(HandoffError::InvalidStackLayout(layout)));
        }
    }
}

//! Next-stage stack allocation.
//!
//! The stack is a run of whole pages from the page allocator. Its initial
//! pointer is computed by first reserving the safety margin below the end of
//! the run and only then rounding down to the ABI alignment, so the pointer
//! can never rise above `end - margin`.

use x86_64::{PhysAddr, VirtAddr};

use crate::config::{StackLayout, PAGE_SIZE};
use crate::error::HandoffError;

/// Source of zeroed, page-aligned physical pages.
pub trait PageAllocator {
    /// `pages` contiguous 4 KiB pages, or `None` when memory is exhausted.
    fn allocate_pages(&mut self, pages: usize) -> Option<PhysAddr>;
}

/// The stack the next stage starts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackRegion {
    pub base: PhysAddr,
    pub pages: usize,
    /// Initial stack pointer (identity mapped, so VA == PA).
    pub top: VirtAddr,
}

impl StackRegion {
    /// Size of the allocated run in bytes.
    pub fn size(&self) -> u64 {
        self.pages as u64 * PAGE_SIZE
    }

    /// One past the last byte of the run.
    pub fn end(&self) -> PhysAddr {
        self.base + self.size()
    }
}

#[inline]
pub const fn align_down(value: u64, align: u64) -> u64 {
    value & !(align - 1)
}

/// Initial stack pointer for a run of `size` bytes at `base`.
///
/// `None` unless the result is aligned, above `base` and at least the safety
/// margin below `base + size`.
pub const fn top_of_stack(base: u64, size: u64, layout: &StackLayout) -> Option<u64> {
    if !layout.alignment.is_power_of_two() {
        return None;
    }
    let end = match base.checked_add(size) {
        Some(end) => end,
        None => return None,
    };
    let limit = match end.checked_sub(layout.safety_margin) {
        Some(limit) => limit,
        None => return None,
    };
    let top = align_down(limit, layout.alignment);
    if top > base {
        Some(top)
    } else {
        None
    }
}

/// Allocate and lay out the next stage's stack.
pub fn allocate_stack(
    allocator: &mut dyn PageAllocator,
    layout: &StackLayout,
) -> Result<StackRegion, HandoffError> {
    layout.validate()?;

    let pages = layout.pages();
    let base = allocator
        .allocate_pages(pages)
        .ok_or(HandoffError::OutOfResources { pages })?;
    if !base.is_aligned(PAGE_SIZE) {
        return Err(HandoffError::MisalignedAllocation { base: base.as_u64() });
    }

    let size = (pages as u64)
        .checked_mul(PAGE_SIZE)
        .ok_or(HandoffError::InvalidStackLayout(*layout))?;
    let top = top_of_stack(base.as_u64(), size, layout)
        .and_then(|top| VirtAddr::try_new(top).ok())
        .ok_or(HandoffError::InvalidStackLayout(*layout))?;
    let region = StackRegion { base, pages, top };

    log::info!(
        target: "stack",
        "[✓] stack 0x{:x}..0x{:x} ({} pages), top 0x{:x}",
        base.as_u64(),
        region.end().as_u64(),
        pages,
        top.as_u64()
    );
    Ok(region)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Option<u64>);

    impl PageAllocator for Fixed {
        fn allocate_pages(&mut self, _pages: usize) -> Option<PhysAddr> {
            self.0.take().map(PhysAddr::new)
        }
    }

    #[test]
    fn reference_scenario() {
        let base = 0x7FE0_0000;
        let region = allocate_stack(&mut Fixed(Some(base)), &StackLayout::X64).unwrap();
        assert_eq!(region.pages, 32);
        assert_eq!(region.size(), 0x2_0000);
        assert_eq!(region.top.as_u64(), align_down(base + 0x2_0000 - 16, 16));
    }

    #[test]
    fn top_is_aligned_and_below_margin_for_all_page_multiples() {
        let layout = StackLayout { size: 0, alignment: 16, safety_margin: 24 };
        for pages in 1..=64u64 {
            for base in [0x1000u64, 0x9_F000, 0x7FFF_F000, 0x1_0000_0000] {
                let size = pages * PAGE_SIZE;
                let top = top_of_stack(base, size, &layout).unwrap();
                assert_eq!(top % layout.alignment, 0);
                assert!(top <= base + size - layout.safety_margin);
                assert!(top > base);
            }
        }
    }

    #[test]
    fn margin_is_taken_before_alignment() {
        // aligning first (0x2000) and then subtracting 8 would leave 0x1ff8
        let layout = StackLayout { size: 0x1000, alignment: 16, safety_margin: 8 };
        assert_eq!(top_of_stack(0x1000, 0x1000, &layout), Some(0x1ff0));
    }

    #[test]
    fn odd_sizes_round_up_to_pages() {
        let layout = StackLayout { size: 0x1800, ..StackLayout::X64 };
        let region = allocate_stack(&mut Fixed(Some(0x4000)), &layout).unwrap();
        assert_eq!(region.pages, 2);
        assert_eq!(region.end().as_u64(), 0x6000);
        assert_eq!(region.top.as_u64(), 0x5ff0);
    }

    #[test]
    fn exhausted_allocator_is_fatal() {
        assert_eq!(
            allocate_stack(&mut Fixed(None), &StackLayout::X64),
            Err(HandoffError::OutOfResources { pages: 32 })
        );
    }

    struct Counting(usize);

    impl PageAllocator for Counting {
        fn allocate_pages(&mut self, _pages: usize) -> Option<PhysAddr> {
            self.0 += 1;
            Some(PhysAddr::new(0x4000))
        }
    }

    fn rejected(layout: StackLayout) {
        let mut allocator = Counting(0);
        assert_eq!(
            allocate_stack(&mut allocator, &layout),
            Err(HandoffError::InvalidStackLayout(layout))
        );
        assert_eq!(allocator.0, 0, "allocator called for {:?}", layout);
    }

    #[test]
    fn empty_stack_is_rejected() {
        rejected(StackLayout { size: 0, ..StackLayout::X64 });
    }

    #[test]
    fn alignment_must_be_a_power_of_two() {
        rejected(StackLayout { alignment: 0, ..StackLayout::X64 });
        rejected(StackLayout { alignment: 24, ..StackLayout::X64 });
    }

    #[test]
    fn margin_must_leave_room_in_the_run() {
        rejected(StackLayout { size: 0x1000, safety_margin: 0x1000, ..StackLayout::X64 });
        rejected(StackLayout { size: 0x1800, safety_margin: 0x3000, ..StackLayout::X64 });
    }

    #[test]
    fn top_never_leaves_the_run() {
        let layout = StackLayout::X64;
        assert_eq!(top_of_stack(0x4000, 0, &layout), None);
        assert_eq!(top_of_stack(0, 0, &layout), None);
        assert_eq!(top_of_stack(u64::MAX - 0xFFF, 0x2000, &layout), None);
        let wide = StackLayout { alignment: 0x4000, ..StackLayout::X64 };
        assert_eq!(top_of_stack(0x5000, 0x1000, &wide), None);
    }

    #[test]
    fn unaligned_pages_are_rejected() {
        assert_eq!(
            allocate_stack(&mut Fixed(Some(0x1008)), &StackLayout::X64),
            Err(HandoffError::MisalignedAllocation { base: 0x1008 })
        );
    }
}

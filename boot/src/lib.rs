//! NØNOS Stage Handoff
//!
//! Final step of the payload stage: build a clean execution environment for
//! the next boot stage and transfer control to it, exactly once.
//!
//! - x87/SSE brought to a known state, legacy 8259 sources masked
//! - a fresh 128 KiB stack, its top aligned below a safety margin
//! - identity translation tables and CR3 load (`build-page-tables`)
//! - the hand-off block's stack record pointed at the new stack
//! - `entry(hob, 0, 0)` on the new stack, never returning
//!
//! Collaborators (page allocator, table builder, hand-off block, hardware)
//! are traits so the sequencing can be driven by test doubles. The firmware
//! side wires in the real ones and calls [`hand_off_to_next_stage`].

#![cfg_attr(not(test), no_std)]

pub mod arch;
pub mod config;
pub mod error;
pub mod handoff;
pub mod hw;
pub mod launch;
#[cfg(all(feature = "logging", target_arch = "x86_64"))]
pub mod logger;
pub mod paging;
pub mod phase;
pub mod stack;

pub use config::{Feature, FeatureQuery, PayloadFeatures, StackLayout};
pub use error::HandoffError;
pub use handoff::HandoffBlock;
pub use hw::{Hardware, NextStageEntry, TransferArgs};
pub use launch::{fatal, hand_off_to_next_stage, HandoffEnv};
pub use paging::{IdentityMapRequest, PageTableBuilder, PhysRange, TranslationRoot};
pub use phase::{Phase, PhaseTracker};
pub use stack::{PageAllocator, StackRegion};

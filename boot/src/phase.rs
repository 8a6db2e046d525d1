//! Handoff state machine.
//!
//! ```text
//! Unstarted → StackAllocated → [TablesBuilt → TranslationActive] → HandoffUpdated → Transferred
//! ```
//!
//! The bracketed pair exists only when this stage builds translation tables,
//! and then neither step may be skipped. There is no way back.

use arrayvec::ArrayVec;

use crate::error::HandoffError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Unstarted,
    StackAllocated,
    TablesBuilt,
    TranslationActive,
    HandoffUpdated,
    Transferred,
}

const MAX_PHASES: usize = 6;

#[derive(Debug, Clone)]
pub struct PhaseTracker {
    translation: bool,
    history: ArrayVec<Phase, MAX_PHASES>,
}

impl PhaseTracker {
    /// `translation` selects whether the table/activation pair is part of the run.
    pub fn new(translation: bool) -> Self {
        let mut history = ArrayVec::new();
        history.push(Phase::Unstarted);
        Self { translation, history }
    }

    pub fn current(&self) -> Phase {
        self.history.last().copied().unwrap_or(Phase::Unstarted)
    }

    pub fn history(&self) -> &[Phase] {
        &self.history
    }

    pub fn expected_next(&self) -> Option<Phase> {
        match self.current() {
            Phase::Unstarted => Some(Phase::StackAllocated),
            Phase::StackAllocated if self.translation => Some(Phase::TablesBuilt),
            Phase::StackAllocated => Some(Phase::HandoffUpdated),
            Phase::TablesBuilt => Some(Phase::TranslationActive),
            Phase::TranslationActive => Some(Phase::HandoffUpdated),
            Phase::HandoffUpdated => Some(Phase::Transferred),
            Phase::Transferred => None,
        }
    }

    pub fn advance(&mut self, to: Phase) -> Result<(), HandoffError> {
        let from = self.current();
        if self.expected_next() != Some(to) {
            return Err(HandoffError::PhaseOrder { from, to });
        }
        self.history
            .try_push(to)
            .map_err(|_| HandoffError::PhaseOrder { from, to })?;
        log::trace!(target: "handoff", "phase {:?} -> {:?}", from, to);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_path_with_translation() {
        let mut t = PhaseTracker::new(true);
        for p in [
            Phase::StackAllocated,
            Phase::TablesBuilt,
            Phase::TranslationActive,
            Phase::HandoffUpdated,
            Phase::Transferred,
        ] {
            t.advance(p).unwrap();
        }
        assert_eq!(t.history().len(), 6);
        assert_eq!(t.expected_next(), None);
    }

    #[test]
    fn translation_pair_is_elided_without_tables() {
        let mut t = PhaseTracker::new(false);
        t.advance(Phase::StackAllocated).unwrap();
        assert_eq!(
            t.advance(Phase::TablesBuilt),
            Err(HandoffError::PhaseOrder { from: Phase::StackAllocated, to: Phase::TablesBuilt })
        );
        t.advance(Phase::HandoffUpdated).unwrap();
        t.advance(Phase::Transferred).unwrap();
        assert_eq!(
            t.history(),
            &[Phase::Unstarted, Phase::StackAllocated, Phase::HandoffUpdated, Phase::Transferred]
        );
    }

    #[test]
    fn activation_cannot_be_skipped() {
        let mut t = PhaseTracker::new(true);
        t.advance(Phase::StackAllocated).unwrap();
        t.advance(Phase::TablesBuilt).unwrap();
        assert!(t.advance(Phase::HandoffUpdated).is_err());
        assert_eq!(t.current(), Phase::TablesBuilt);
    }

    #[test]
    fn no_way_back() {
        let mut t = PhaseTracker::new(false);
        t.advance(Phase::StackAllocated).unwrap();
        assert!(t.advance(Phase::Unstarted).is_err());
        assert!(t.advance(Phase::StackAllocated).is_err());
    }
}

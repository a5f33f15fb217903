//! Writer state machine.

use crate::error::{WriteError, WriteResult};
use tracing::{debug, info};

/// Phase of a single snapshot write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    /// Validating configuration and planning batches.
    Planning,
    /// Committing the root batch.
    RootPhase,
    /// Dispatching child batches.
    ChildPhase,
    /// The deadline passed before any child batch could start.
    Aborted,
    /// Building the report.
    Finalizing,
    /// Terminal.
    Done,
}

impl WriterState {
    /// Returns true if `next` is a legal successor.
    pub fn can_transition_to(&self, next: WriterState) -> bool {
        use WriterState::*;
        matches!(
            (self, next),
            (Planning, RootPhase)
                | (RootPhase, ChildPhase)
                | (RootPhase, Aborted)
                | (RootPhase, Finalizing)
                | (ChildPhase, Finalizing)
                | (Aborted, Finalizing)
                | (Finalizing, Done)
        )
    }

    /// Returns true for the terminal state.
    pub fn is_terminal(&self) -> bool {
        *self == WriterState::Done
    }
}

/// Tracks the state of one write and logs each transition.
#[derive(Debug)]
pub(crate) struct StateMachine {
    snapshot_id: String,
    state: WriterState,
}

impl StateMachine {
    pub(crate) fn new(snapshot_id: &str) -> Self {
        Self {
            snapshot_id: snapshot_id.to_string(),
            state: WriterState::Planning,
        }
    }

    pub(crate) fn state(&self) -> WriterState {
        self.state
    }

    pub(crate) fn transition(&mut self, next: WriterState) -> WriteResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(WriteError::InvalidStateTransition {
                from: format!("{:?}", self.state),
                to: format!("{next:?}"),
            });
        }
        match next {
            WriterState::Finalizing | WriterState::Done => {
                debug!(snapshot = %self.snapshot_id, from = ?self.state, to = ?next, "writer state")
            }
            _ => info!(snapshot = %self.snapshot_id, from = ?self.state, to = ?next, "writer state"),
        }
        self.state = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legal_paths() {
        let mut sm = StateMachine::new("s");
        for next in [
            WriterState::RootPhase,
            WriterState::ChildPhase,
            WriterState::Finalizing,
            WriterState::Done,
        ] {
            sm.transition(next).unwrap();
        }
        assert!(sm.state().is_terminal());

        let mut sm = StateMachine::new("s");
        sm.transition(WriterState::RootPhase).unwrap();
        sm.transition(WriterState::Finalizing).unwrap();

        let mut sm = StateMachine::new("s");
        sm.transition(WriterState::RootPhase).unwrap();
        sm.transition(WriterState::Aborted).unwrap();
        sm.transition(WriterState::Finalizing).unwrap();
    }

    #[test]
    fn illegal_transition_is_rejected() {
        let mut sm = StateMachine::new("s");
        let err = sm.transition(WriterState::ChildPhase).unwrap_err();
        assert!(matches!(err, WriteError::InvalidStateTransition { .. }));
        assert_eq!(sm.state(), WriterState::Planning);
    }

    #[test]
    fn state_checks() {
        assert!(WriterState::Done.is_terminal());
        assert!(!WriterState::Finalizing.is_terminal());
        assert!(!WriterState::Done.can_transition_to(WriterState::Planning));
        assert!(!WriterState::Aborted.can_transition_to(WriterState::ChildPhase));
    }
}

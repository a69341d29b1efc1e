//! Per-interaction state machine and the shared cancellation flag.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Lifecycle of one automated interaction with a native window.
///
/// `Searching → Found → Ready → (Busy ⇄ Ready)* → Closed`. A window may be
/// closed from any phase once it has been found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionPhase {
    Searching,
    Found,
    Ready,
    Busy,
    Closed,
}

impl InteractionPhase {
    pub fn can_transition_to(self, next: InteractionPhase) -> bool {
        use InteractionPhase::*;
        matches!(
            (self, next),
            (Searching, Found)
                | (Found, Ready)
                | (Ready, Busy)
                | (Busy, Ready)
                | (Found, Closed)
                | (Ready, Closed)
                | (Busy, Closed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            InteractionPhase::Searching => "searching",
            InteractionPhase::Found => "found",
            InteractionPhase::Ready => "ready",
            InteractionPhase::Busy => "busy",
            InteractionPhase::Closed => "closed",
        }
    }
}

impl fmt::Display for InteractionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejected phase change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IllegalTransition {
    pub from: InteractionPhase,
    pub to: InteractionPhase,
}

impl fmt::Display for IllegalTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "illegal transition {} -> {}", self.from, self.to)
    }
}

impl std::error::Error for IllegalTransition {}

/// Tracks the current phase and rejects illegal transitions.
#[derive(Debug, Clone)]
pub struct PhaseTracker {
    phase: InteractionPhase,
}

impl Default for PhaseTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl PhaseTracker {
    pub fn new() -> Self {
        Self {
            phase: InteractionPhase::Searching,
        }
    }

    pub fn phase(&self) -> InteractionPhase {
        self.phase
    }

    pub fn advance(&mut self, next: InteractionPhase) -> Result<(), IllegalTransition> {
        if !self.phase.can_transition_to(next) {
            return Err(IllegalTransition {
                from: self.phase,
                to: next,
            });
        }
        self.phase = next;
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.phase == InteractionPhase::Closed
    }
}

/// Cooperative cancellation flag shared between the run loop and its caller.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use InteractionPhase::*;

    #[test]
    fn test_happy_path_transitions() {
        let mut tracker = PhaseTracker::new();
        assert_eq!(tracker.phase(), Searching);
        tracker.advance(Found).unwrap();
        tracker.advance(Ready).unwrap();
        tracker.advance(Busy).unwrap();
        tracker.advance(Ready).unwrap();
        tracker.advance(Busy).unwrap();
        tracker.advance(Ready).unwrap();
        tracker.advance(Closed).unwrap();
        assert!(tracker.is_closed());
    }

    #[test]
    fn test_rejects_skipping_found() {
        let mut tracker = PhaseTracker::new();
        let err = tracker.advance(Ready).unwrap_err();
        assert_eq!(err.from, Searching);
        assert_eq!(err.to, Ready);
        assert_eq!(tracker.phase(), Searching);
        assert_eq!(err.to_string(), "illegal transition searching -> ready");
    }

    #[test]
    fn test_closed_is_terminal() {
        for next in [Searching, Found, Ready, Busy, Closed] {
            assert!(!Closed.can_transition_to(next));
        }
    }

    #[test]
    fn test_busy_cannot_reenter_found() {
        assert!(!Busy.can_transition_to(Found));
        assert!(!Ready.can_transition_to(Searching));
        assert!(!Searching.can_transition_to(Closed));
    }

    #[test]
    fn test_cancel_flag_is_shared_between_clones() {
        let flag = CancelFlag::new();
        let other = flag.clone();
        assert!(!other.is_cancelled());
        flag.cancel();
        assert!(other.is_cancelled());
    }
}

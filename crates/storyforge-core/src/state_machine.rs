//! The canonical job state machine (§4.H): legal `StoryStatus` transitions.
//!
//! This module is pure and side-effect free; [`crate::repository`] is
//! responsible for enforcing it atomically against the database.

use crate::domain::StoryStatus;

/// Returns `true` if moving a `Story` from `from` to `to` is a legal
/// transition per §4.H:
///
/// ```text
/// PENDING    -> PROCESSING   (claim)
/// PENDING    -> FAILED       (enqueue failure, pre-claim fatal error)
/// PROCESSING -> PROCESSING   (attempt-count increment; no-op)
/// PROCESSING -> COMPLETED    (all scenes persisted with URLs)
/// PROCESSING -> FAILED       (attempts exhausted or non-retriable stage-1 error)
/// ```
///
/// `COMPLETED` and `FAILED` are terminal: no transition out of either is
/// legal, including into itself.
pub fn is_legal_transition(from: StoryStatus, to: StoryStatus) -> bool {
    use StoryStatus::{Completed, Failed, Pending, Processing};

    matches!(
        (from, to),
        (Pending, Processing)
            | (Pending, Failed)
            | (Processing, Processing)
            | (Processing, Completed)
            | (Processing, Failed)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use StoryStatus::{Completed, Failed, Pending, Processing};

    #[test]
    fn allows_documented_transitions() {
        assert!(is_legal_transition(Pending, Processing));
        assert!(is_legal_transition(Pending, Failed));
        assert!(is_legal_transition(Processing, Processing));
        assert!(is_legal_transition(Processing, Completed));
        assert!(is_legal_transition(Processing, Failed));
    }

    #[test]
    fn rejects_transitions_out_of_terminal_states() {
        for to in [Pending, Processing, Completed, Failed] {
            assert!(!is_legal_transition(Completed, to));
            assert!(!is_legal_transition(Failed, to));
        }
    }

    #[test]
    fn rejects_skipping_processing() {
        assert!(!is_legal_transition(Pending, Completed));
    }

    #[test]
    fn rejects_backwards_transitions() {
        assert!(!is_legal_transition(Processing, Pending));
        assert!(!is_legal_transition(Completed, Processing));
    }
}

//! Submission FSM states

use std::fmt;

/// Form submission states
///
/// `Idle -> Validating -> Submitting -> {Success, Error}`; a failed
/// validation goes straight from `Validating` to `Error`. Editing a field in
/// any settled state returns to `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SubmissionState {
    #[default]
    Idle,
    Validating,
    Submitting,
    Success,
    Error,
}

impl SubmissionState {
    /// A result banner is showing.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, SubmissionState::Success | SubmissionState::Error)
    }

    /// Submit is allowed from here.
    #[inline]
    pub fn accepts_submit(&self) -> bool {
        matches!(
            self,
            SubmissionState::Idle | SubmissionState::Error | SubmissionState::Success
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionState::Idle => "IDLE",
            SubmissionState::Validating => "VALIDATING",
            SubmissionState::Submitting => "SUBMITTING",
            SubmissionState::Success => "SUCCESS",
            SubmissionState::Error => "ERROR",
        }
    }
}

impl fmt::Display for SubmissionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(SubmissionState::Success.is_terminal());
        assert!(SubmissionState::Error.is_terminal());
        assert!(!SubmissionState::Idle.is_terminal());
        assert!(!SubmissionState::Submitting.is_terminal());
    }

    #[test]
    fn test_accepts_submit() {
        assert!(SubmissionState::Idle.accepts_submit());
        assert!(SubmissionState::Error.accepts_submit());
        assert!(!SubmissionState::Validating.accepts_submit());
        assert!(!SubmissionState::Submitting.accepts_submit());
    }

    #[test]
    fn test_display() {
        assert_eq!(SubmissionState::Submitting.to_string(), "SUBMITTING");
        assert_eq!(SubmissionState::default(), SubmissionState::Idle);
    }
}

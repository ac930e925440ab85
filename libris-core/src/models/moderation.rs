//! Moderation states
//!
//! Numeric codes are persisted in `works.moderation_state` and in the
//! moderation log, so they must never be renumbered.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModerationState {
    Pending,
    Approved,
    Rejected,
    /// Processing failed irrecoverably; no transition leads here yet
    Error,
    /// Flagged as a likely duplicate by a moderator, awaiting confirmation
    PendingDuplicate,
    /// Fuzzy duplicate found at creation, awaiting confirmation
    DuplicateFound,
}

impl ModerationState {
    pub fn code(self) -> i64 {
        match self {
            ModerationState::Pending => 0,
            ModerationState::Approved => 1,
            ModerationState::Rejected => 2,
            ModerationState::Error => 3,
            ModerationState::PendingDuplicate => 19,
            ModerationState::DuplicateFound => 20,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        Some(match code {
            0 => ModerationState::Pending,
            1 => ModerationState::Approved,
            2 => ModerationState::Rejected,
            3 => ModerationState::Error,
            19 => ModerationState::PendingDuplicate,
            20 => ModerationState::DuplicateFound,
            _ => return None,
        })
    }

    /// No further moderation transition leaves this state
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ModerationState::Approved | ModerationState::Rejected | ModerationState::Error
        )
    }

    /// States an activation link can promote to Approved
    pub fn is_confirmable(self) -> bool {
        matches!(
            self,
            ModerationState::DuplicateFound | ModerationState::PendingDuplicate
        )
    }

    /// States a moderator can approve or reject
    pub fn is_moderatable(self) -> bool {
        matches!(
            self,
            ModerationState::Pending
                | ModerationState::DuplicateFound
                | ModerationState::PendingDuplicate
        )
    }

    /// Visibility that goes with entering this state
    pub fn enables(self) -> bool {
        self == ModerationState::Approved
    }
}

impl std::fmt::Display for ModerationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ModerationState::Pending => "PENDING",
            ModerationState::Approved => "APPROVED",
            ModerationState::Rejected => "REJECTED",
            ModerationState::Error => "ERROR",
            ModerationState::PendingDuplicate => "PENDING_DUPLICATE",
            ModerationState::DuplicateFound => "DUPLICATE_FOUND",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [ModerationState; 6] = [
        ModerationState::Pending,
        ModerationState::Approved,
        ModerationState::Rejected,
        ModerationState::Error,
        ModerationState::PendingDuplicate,
        ModerationState::DuplicateFound,
    ];

    #[test]
    fn test_codes_are_stable() {
        let codes: Vec<i64> = ALL.iter().map(|s| s.code()).collect();
        assert_eq!(codes, vec![0, 1, 2, 3, 19, 20]);
        for state in ALL {
            assert_eq!(ModerationState::from_code(state.code()), Some(state));
        }
        assert_eq!(ModerationState::from_code(4), None);
    }

    #[test]
    fn test_only_approved_enables() {
        for state in ALL {
            assert_eq!(state.enables(), state == ModerationState::Approved);
        }
    }

    #[test]
    fn test_confirmable_states() {
        assert!(ModerationState::DuplicateFound.is_confirmable());
        assert!(ModerationState::PendingDuplicate.is_confirmable());
        assert!(!ModerationState::Pending.is_confirmable());
        assert!(!ModerationState::Approved.is_confirmable());
    }
}

//! Manuscript status state machine
//!
//! State transitions:
//! ```text
//! Draft → Submitted → UnderReview → Accepted → Published
//!             ↑            ↓    ↖      ↕
//!             │            ↓      Rejected
//!          Revised ← RevisionRequested
//! ```
//!
//! The decision states (UnderReview, RevisionRequested, Accepted, Rejected)
//! are re-derived from the full review set on every review change, so they are
//! mutually reachable. Published is terminal.

use serde::{Deserialize, Serialize};

use crate::error::{Result, ReviewError};

/// The editorial status of a manuscript
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManuscriptStatus {
    /// Created but not yet submitted
    Draft,
    /// Submitted, awaiting reviewer assignment
    Submitted,
    /// At least one reviewer assigned, decision pending
    UnderReview,
    /// Reviewers asked for changes
    RevisionRequested,
    /// Author has revised, about to resubmit
    Revised,
    /// Accepted for publication
    Accepted,
    /// Rejected
    Rejected,
    /// Published in an issue
    Published,
}

impl ManuscriptStatus {
    pub const ALL: [ManuscriptStatus; 8] = [
        ManuscriptStatus::Draft,
        ManuscriptStatus::Submitted,
        ManuscriptStatus::UnderReview,
        ManuscriptStatus::RevisionRequested,
        ManuscriptStatus::Revised,
        ManuscriptStatus::Accepted,
        ManuscriptStatus::Rejected,
        ManuscriptStatus::Published,
    ];

    /// Check if a state transition is valid
    pub fn can_transition_to(&self, target: ManuscriptStatus) -> bool {
        use ManuscriptStatus::*;

        match (self, target) {
            (Draft, Submitted) => true,

            // First assignment, or a decision derived from reviews of a
            // resubmitted manuscript
            (Submitted, UnderReview | RevisionRequested | Accepted | Rejected) => true,

            // Re-derivation between decision states
            (UnderReview, RevisionRequested | Accepted | Rejected) => true,
            (RevisionRequested, UnderReview | Accepted | Rejected | Revised) => true,
            (Accepted, UnderReview | RevisionRequested | Rejected | Published) => true,
            (Rejected, UnderReview | RevisionRequested | Accepted) => true,

            (Revised, Submitted) => true,

            // Published is terminal
            (Published, _) => false,

            _ => false,
        }
    }

    /// Get valid next states from current state
    pub fn valid_transitions(&self) -> Vec<ManuscriptStatus> {
        Self::ALL
            .into_iter()
            .filter(|target| self.can_transition_to(*target))
            .collect()
    }

    /// Check if the manuscript is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, ManuscriptStatus::Published)
    }

    /// Check if reviewers may be assigned and reviews written or changed
    pub fn accepts_reviews(&self) -> bool {
        matches!(
            self,
            ManuscriptStatus::Submitted
                | ManuscriptStatus::UnderReview
                | ManuscriptStatus::RevisionRequested
                | ManuscriptStatus::Accepted
                | ManuscriptStatus::Rejected
        )
    }

    /// Canonical wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            ManuscriptStatus::Draft => "draft",
            ManuscriptStatus::Submitted => "submitted",
            ManuscriptStatus::UnderReview => "under_review",
            ManuscriptStatus::RevisionRequested => "revision_requested",
            ManuscriptStatus::Revised => "revised",
            ManuscriptStatus::Accepted => "accepted",
            ManuscriptStatus::Rejected => "rejected",
            ManuscriptStatus::Published => "published",
        }
    }

    /// Label shown by the journal's UI. The four review-facing states have
    /// dedicated labels; the rest fall back to the canonical name.
    pub fn ui_label(&self) -> &'static str {
        match self {
            ManuscriptStatus::UnderReview => "На розгляді",
            ManuscriptStatus::Accepted => "Прийнято",
            ManuscriptStatus::Rejected => "Відхилено",
            ManuscriptStatus::RevisionRequested => "Потребує доопрацювання",
            other => other.as_str(),
        }
    }
}

impl Default for ManuscriptStatus {
    fn default() -> Self {
        ManuscriptStatus::Submitted
    }
}

impl std::fmt::Display for ManuscriptStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ManuscriptStatus {
    type Err = ReviewError;

    /// Accepts the canonical names as well as the UI labels
    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s || status.ui_label() == s)
            .ok_or_else(|| ReviewError::Validation(format!("unknown manuscript status '{}'", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ManuscriptStatus::*;

    #[test]
    fn test_draft_transitions() {
        assert!(Draft.can_transition_to(Submitted));
        assert!(!Draft.can_transition_to(UnderReview));
        assert!(!Draft.can_transition_to(Accepted));
        assert!(!Draft.can_transition_to(Published));
    }

    #[test]
    fn test_publish_only_from_accepted() {
        for status in ManuscriptStatus::ALL {
            assert_eq!(
                status.can_transition_to(Published),
                status == Accepted,
                "{} -> published",
                status
            );
        }
    }

    #[test]
    fn test_published_is_terminal() {
        assert!(Published.is_terminal());
        assert!(Published.valid_transitions().is_empty());
        assert!(!Published.accepts_reviews());
    }

    #[test]
    fn test_revision_cycle() {
        assert!(UnderReview.can_transition_to(RevisionRequested));
        assert!(RevisionRequested.can_transition_to(Revised));
        assert!(Revised.can_transition_to(Submitted));
        assert!(!Revised.can_transition_to(UnderReview));
        assert!(!UnderReview.can_transition_to(Revised));
    }

    #[test]
    fn test_decisions_rederivable() {
        assert!(Rejected.can_transition_to(Accepted));
        assert!(Accepted.can_transition_to(Rejected));
        assert!(Rejected.can_transition_to(UnderReview));
    }

    #[test]
    fn test_no_self_transitions() {
        for status in ManuscriptStatus::ALL {
            assert!(!status.can_transition_to(status), "{}", status);
        }
    }

    #[test]
    fn test_parse_accepts_ui_labels() {
        assert_eq!("under_review".parse::<ManuscriptStatus>().unwrap(), UnderReview);
        assert_eq!("Прийнято".parse::<ManuscriptStatus>().unwrap(), Accepted);
        assert_eq!(
            "Потребує доопрацювання".parse::<ManuscriptStatus>().unwrap(),
            RevisionRequested
        );
        assert!("lost".parse::<ManuscriptStatus>().is_err());
    }

    #[test]
    fn test_display_matches_serde() {
        for status in ManuscriptStatus::ALL {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status));
        }
    }
}

//! Imreview Core - Peer-review workflow engine for journal manuscripts
//!
//! This crate provides the editorial decision logic of the imreview system:
//!
//! - **Principal**: The acting user (id + role), passed explicitly to every operation
//! - **Authorization**: A single decision table mapping (principal, action, resource) to allow/deny
//! - **Manuscript**: Status state machine (Draft→Submitted→UnderReview→Accepted/Rejected/...→Published)
//! - **Review**: Pending assignments and completed assessments as one tagged type
//! - **Aggregation**: Deterministic derivation of a manuscript's status from all of its reviews
//! - **Workflow**: Aggregate root and commands (create, assign, submit review, publish, ...)
//! - **Event**: Append-only log of every change, used for status history
//! - **Persistence**: SQLite-based storage for users, manuscripts, reviews, and events
//! - **Config**: Service configuration (timeouts, validation limits, seeded identities)
//!
//! # Decision flow
//!
//! ```text
//! Command → authorize → validate → mutate review set → aggregate → Manuscript::apply
//! ```
//!
//! Every command validates before it writes; a failed command leaves the
//! workflow state untouched.

pub mod authz;
pub mod config;
pub mod error;
pub mod event;
pub mod id;
pub mod manuscript;
pub mod persistence;
pub mod principal;
pub mod review;
pub mod user;
pub mod workflow;

pub use authz::{authorize, can, Action, Resource, Roles};
pub use config::{
    ConcurrencyConfig, ConfigError, IdentityConfig, ReviewConfig, ServerConfig, StorageConfig,
    ValidationLimits,
};
pub use error::{AssignmentError, ErrorKind, ManuscriptError, PersistenceError, Result, ReviewError};
pub use event::{EntityType, EventId, EventLog, EventPayload, WorkflowEvent};
pub use id::{JournalId, ManuscriptId, ReviewId, UserId};
pub use manuscript::{
    Manuscript, ManuscriptChanges, ManuscriptMetadata, ManuscriptStatus, StatusChange, Transition,
};
pub use persistence::{Repository, Schema};
pub use principal::{Principal, Role};
pub use review::{
    aggregate, Assessment, Recommendation, Review, ReviewBody, ReviewChanges, ReviewSubmission,
    Score, Verdict,
};
pub use user::{User, UserDirectory};
pub use workflow::{Checkpoint, Command, WorkflowState};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manuscript_status_transitions() {
        let mut status = ManuscriptStatus::Draft;

        assert!(status.can_transition_to(ManuscriptStatus::Submitted));
        status = ManuscriptStatus::Submitted;

        assert!(status.can_transition_to(ManuscriptStatus::UnderReview));
        status = ManuscriptStatus::UnderReview;

        assert!(status.can_transition_to(ManuscriptStatus::Accepted));
        assert!(!status.can_transition_to(ManuscriptStatus::Published));
        status = ManuscriptStatus::Accepted;

        assert!(status.can_transition_to(ManuscriptStatus::Published));
        status = ManuscriptStatus::Published;
        assert!(status.is_terminal());
    }

    #[test]
    fn test_reject_outranks_accept() {
        let manuscript = ManuscriptId::new();
        let reviews = vec![
            Review::completed_for_test(manuscript, Recommendation::Accept),
            Review::completed_for_test(manuscript, Recommendation::Accept),
            Review::completed_for_test(manuscript, Recommendation::Reject),
        ];

        assert_eq!(aggregate(&reviews), Verdict::Reject);
    }
}

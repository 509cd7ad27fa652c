//! Manuscript struct and the transition operation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ManuscriptStatus;
use crate::config::ValidationLimits;
use crate::error::{ManuscriptError, Result, ReviewError};
use crate::id::{JournalId, ManuscriptId, UserId};

/// Descriptive metadata for a manuscript
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManuscriptMetadata {
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub keywords: Vec<String>,
    /// Journal section the manuscript is submitted to
    pub section: String,
}

impl ManuscriptMetadata {
    /// Trim fields and enforce required/length constraints
    pub fn validated(mut self, limits: &ValidationLimits) -> Result<Self> {
        self.title = self.title.trim().to_string();
        self.section = self.section.trim().to_string();
        self.keywords = self
            .keywords
            .into_iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();

        if self.title.is_empty() {
            return Err(ReviewError::Validation("title is required".to_string()));
        }
        if self.title.chars().count() > limits.max_title_len {
            return Err(ReviewError::Validation(format!(
                "title cannot exceed {} characters",
                limits.max_title_len
            )));
        }
        if self.abstract_text.trim().is_empty() {
            return Err(ReviewError::Validation("abstract is required".to_string()));
        }
        if self.abstract_text.chars().count() > limits.max_abstract_len {
            return Err(ReviewError::Validation(format!(
                "abstract cannot exceed {} characters",
                limits.max_abstract_len
            )));
        }
        if self.section.is_empty() {
            return Err(ReviewError::Validation("section is required".to_string()));
        }
        Ok(self)
    }
}

/// Partial update of manuscript metadata
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManuscriptChanges {
    pub title: Option<String>,
    pub abstract_text: Option<String>,
    pub keywords: Option<Vec<String>>,
    pub section: Option<String>,
}

impl ManuscriptChanges {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.abstract_text.is_none()
            && self.keywords.is_none()
            && self.section.is_none()
    }

    /// Produce the merged metadata without touching the original
    pub fn merged_into(&self, current: &ManuscriptMetadata) -> ManuscriptMetadata {
        ManuscriptMetadata {
            title: self.title.clone().unwrap_or_else(|| current.title.clone()),
            abstract_text: self
                .abstract_text
                .clone()
                .unwrap_or_else(|| current.abstract_text.clone()),
            keywords: self
                .keywords
                .clone()
                .unwrap_or_else(|| current.keywords.clone()),
            section: self.section.clone().unwrap_or_else(|| current.section.clone()),
        }
    }
}

/// A requested change of manuscript status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Author submits a draft
    Submit,
    /// First reviewer assigned
    StartReview,
    /// Outcome of review aggregation
    Derive(ManuscriptStatus),
    /// Author has revised after a revision request
    MarkRevised,
    /// Revised manuscript goes back to the submission queue
    Resubmit,
    /// Editor publishes an accepted manuscript
    Publish,
    /// Explicit editor/admin status change
    Override(ManuscriptStatus),
}

impl Transition {
    /// Target status of this transition
    pub fn target(&self) -> ManuscriptStatus {
        match self {
            Transition::Submit | Transition::Resubmit => ManuscriptStatus::Submitted,
            Transition::StartReview => ManuscriptStatus::UnderReview,
            Transition::MarkRevised => ManuscriptStatus::Revised,
            Transition::Publish => ManuscriptStatus::Published,
            Transition::Derive(status) | Transition::Override(status) => *status,
        }
    }

    /// Short name recorded in the status history
    pub fn cause(&self) -> &'static str {
        match self {
            Transition::Submit => "submitted",
            Transition::StartReview => "reviewer_assigned",
            Transition::Derive(_) => "reviews_aggregated",
            Transition::MarkRevised => "revised",
            Transition::Resubmit => "resubmitted",
            Transition::Publish => "published",
            Transition::Override(_) => "editor_override",
        }
    }
}

/// A status change that was applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub from: ManuscriptStatus,
    pub to: ManuscriptStatus,
}

/// A manuscript under editorial handling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manuscript {
    /// Unique identifier
    pub id: ManuscriptId,
    /// Submitting author
    pub author_id: UserId,
    /// Journal the manuscript is submitted to
    pub journal_id: JournalId,
    /// Current status; written only through [`Manuscript::apply`]
    pub(crate) status: ManuscriptStatus,
    /// Descriptive metadata
    pub metadata: ManuscriptMetadata,
    /// Number of resubmissions after revision requests
    pub revision_count: u32,
    /// Most recent submission time
    pub submitted_at: Option<DateTime<Utc>>,
    /// Publication time
    pub published_at: Option<DateTime<Utc>>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp
    pub updated_at: DateTime<Utc>,
    /// Write counter for optimistic concurrency
    pub version: u64,
}

impl Manuscript {
    /// Create a new manuscript, either as a draft or already submitted
    pub fn new(
        author_id: UserId,
        journal_id: JournalId,
        metadata: ManuscriptMetadata,
        as_draft: bool,
    ) -> Self {
        let now = Utc::now();
        let (status, submitted_at) = if as_draft {
            (ManuscriptStatus::Draft, None)
        } else {
            (ManuscriptStatus::Submitted, Some(now))
        };
        Self {
            id: ManuscriptId::new(),
            author_id,
            journal_id,
            status,
            metadata,
            revision_count: 0,
            submitted_at,
            published_at: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    /// Current status
    pub fn status(&self) -> ManuscriptStatus {
        self.status
    }

    /// Apply a status transition.
    ///
    /// Returns `Ok(None)` when the manuscript is already in the target
    /// status. An illegal transition fails with `InvalidTransition` and
    /// leaves the manuscript unchanged.
    pub fn apply(&mut self, transition: Transition) -> Result<Option<StatusChange>> {
        let target = transition.target();
        if target == self.status {
            return Ok(None);
        }
        if !self.status.can_transition_to(target) {
            return Err(ManuscriptError::InvalidTransition {
                from: self.status.to_string(),
                to: target.to_string(),
            }
            .into());
        }

        let now = Utc::now();
        let change = StatusChange {
            from: self.status,
            to: target,
        };
        self.status = target;
        match transition {
            Transition::Submit => self.submitted_at = Some(now),
            Transition::Resubmit => {
                self.submitted_at = Some(now);
                self.revision_count += 1;
            }
            Transition::Publish => self.published_at = Some(now),
            _ => {}
        }
        self.touch_at(now);

        tracing::info!(
            manuscript = %self.id,
            from = %change.from,
            to = %change.to,
            cause = transition.cause(),
            "manuscript status changed"
        );
        Ok(Some(change))
    }

    /// Replace metadata (already validated by the caller)
    pub fn set_metadata(&mut self, metadata: ManuscriptMetadata) {
        self.metadata = metadata;
        self.touch_at(Utc::now());
    }

    fn touch_at(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
        self.version += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> ManuscriptMetadata {
        ManuscriptMetadata {
            title: "On the Stability of Review Queues".to_string(),
            abstract_text: "We study queues.".to_string(),
            keywords: vec!["queues".to_string()],
            section: "Methods".to_string(),
        }
    }

    fn manuscript() -> Manuscript {
        Manuscript::new(UserId::new(), JournalId::new(), metadata(), false)
    }

    #[test]
    fn test_new_is_submitted() {
        let m = manuscript();
        assert_eq!(m.status(), ManuscriptStatus::Submitted);
        assert!(m.submitted_at.is_some());

        let draft = Manuscript::new(UserId::new(), JournalId::new(), metadata(), true);
        assert_eq!(draft.status(), ManuscriptStatus::Draft);
        assert!(draft.submitted_at.is_none());
    }

    #[test]
    fn test_apply_valid_transition() {
        let mut m = manuscript();
        let change = m.apply(Transition::StartReview).unwrap().unwrap();
        assert_eq!(change.from, ManuscriptStatus::Submitted);
        assert_eq!(change.to, ManuscriptStatus::UnderReview);
        assert_eq!(m.version, 1);
    }

    #[test]
    fn test_apply_same_status_is_noop() {
        let mut m = manuscript();
        m.apply(Transition::StartReview).unwrap();
        let version = m.version;
        assert!(m.apply(Transition::StartReview).unwrap().is_none());
        assert_eq!(m.version, version);
    }

    #[test]
    fn test_invalid_transition_leaves_state() {
        let mut m = manuscript();
        let before = m.clone();
        let err = m.apply(Transition::Publish).unwrap_err();
        assert!(matches!(
            err,
            ReviewError::Manuscript(ManuscriptError::InvalidTransition { .. })
        ));
        assert_eq!(m.status(), before.status());
        assert_eq!(m.version, before.version);
        assert!(m.published_at.is_none());
    }

    #[test]
    fn test_resubmit_increments_revision_count() {
        let mut m = manuscript();
        m.apply(Transition::StartReview).unwrap();
        m.apply(Transition::Derive(ManuscriptStatus::RevisionRequested))
            .unwrap();
        m.apply(Transition::MarkRevised).unwrap();
        m.apply(Transition::Resubmit).unwrap();
        assert_eq!(m.status(), ManuscriptStatus::Submitted);
        assert_eq!(m.revision_count, 1);
    }

    #[test]
    fn test_metadata_validation() {
        let limits = ValidationLimits::default();
        assert!(metadata().validated(&limits).is_ok());

        let mut blank_title = metadata();
        blank_title.title = "   ".to_string();
        assert!(blank_title.validated(&limits).is_err());

        let mut long_title = metadata();
        long_title.title = "x".repeat(limits.max_title_len + 1);
        assert!(long_title.validated(&limits).is_err());

        let mut no_section = metadata();
        no_section.section = String::new();
        assert!(no_section.validated(&limits).is_err());
    }

    #[test]
    fn test_changes_merge() {
        let changes = ManuscriptChanges {
            title: Some("New title".to_string()),
            ..Default::default()
        };
        let merged = changes.merged_into(&metadata());
        assert_eq!(merged.title, "New title");
        assert_eq!(merged.section, "Methods");
        assert!(ManuscriptChanges::default().is_empty());
    }
}

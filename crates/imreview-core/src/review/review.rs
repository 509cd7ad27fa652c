//! Review struct and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ReviewError};
use crate::id::{ManuscriptId, ReviewId, UserId};

/// Wire name of a review that has not been completed yet
pub const PENDING: &str = "pending";

/// A reviewer's verdict on a completed review
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    Accept,
    AcceptMinor,
    ReviseResubmit,
    Reject,
}

impl Recommendation {
    pub const ALL: [Recommendation; 4] = [
        Recommendation::Accept,
        Recommendation::AcceptMinor,
        Recommendation::ReviseResubmit,
        Recommendation::Reject,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Recommendation::Accept => "accept",
            Recommendation::AcceptMinor => "accept_minor",
            Recommendation::ReviseResubmit => "revise_resubmit",
            Recommendation::Reject => "reject",
        }
    }

    /// Label used by the journal's review form
    pub fn ui_label(&self) -> &'static str {
        match self {
            Recommendation::Accept => "Прийняти без змін",
            Recommendation::AcceptMinor => "Прийняти з незначними змінами",
            Recommendation::ReviseResubmit => "Переробити та надіслати повторно",
            Recommendation::Reject => "Відхилити",
        }
    }

    /// Whether this verdict counts toward acceptance
    pub fn is_accepting(&self) -> bool {
        matches!(self, Recommendation::Accept | Recommendation::AcceptMinor)
    }
}

impl std::fmt::Display for Recommendation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Recommendation {
    type Err = ReviewError;

    fn from_str(s: &str) -> Result<Self> {
        if s == PENDING {
            return Err(ReviewError::Validation(
                "'pending' is reserved for reviewer assignments".to_string(),
            ));
        }
        Self::ALL
            .into_iter()
            .find(|r| r.as_str() == s || r.ui_label() == s)
            .ok_or_else(|| ReviewError::Validation(format!("unknown recommendation '{}'", s)))
    }
}

/// Review score in the range 1..=10
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct Score(u8);

impl Score {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 10;

    pub fn new(value: i64) -> Result<Self> {
        if (i64::from(Self::MIN)..=i64::from(Self::MAX)).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(ReviewError::Validation(format!(
                "score must be between {} and {}, got {}",
                Self::MIN,
                Self::MAX,
                value
            )))
        }
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for Score {
    type Error = ReviewError;

    fn try_from(value: i64) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Score> for u8 {
    fn from(score: Score) -> Self {
        score.0
    }
}

/// The content of a completed review
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assessment {
    pub content: String,
    pub score: Score,
    pub recommendation: Recommendation,
    pub comments: Option<String>,
}

/// A review is either an open assignment or a completed assessment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ReviewBody {
    /// Reviewer assigned, verdict not yet given
    Pending,
    /// Reviewer submitted a verdict
    Completed(Assessment),
}

impl ReviewBody {
    pub fn is_pending(&self) -> bool {
        matches!(self, ReviewBody::Pending)
    }

    pub fn assessment(&self) -> Option<&Assessment> {
        match self {
            ReviewBody::Pending => None,
            ReviewBody::Completed(assessment) => Some(assessment),
        }
    }

    pub fn recommendation(&self) -> Option<Recommendation> {
        self.assessment().map(|a| a.recommendation)
    }

    /// Wire name of the recommendation, `pending` for open assignments
    pub fn recommendation_label(&self) -> &'static str {
        self.recommendation()
            .map(|r| r.as_str())
            .unwrap_or(PENDING)
    }
}

/// A full review submitted by a reviewer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewSubmission {
    pub content: String,
    pub score: i64,
    pub recommendation: Recommendation,
    pub comments: Option<String>,
    pub is_confidential: bool,
}

impl ReviewSubmission {
    /// Validate into an assessment
    pub fn assessment(&self) -> Result<Assessment> {
        let content = self.content.trim();
        if content.is_empty() {
            return Err(ReviewError::Validation(
                "review content is required".to_string(),
            ));
        }
        Ok(Assessment {
            content: content.to_string(),
            score: Score::new(self.score)?,
            recommendation: self.recommendation,
            comments: self.comments.clone(),
        })
    }
}

/// Partial update of a review
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReviewChanges {
    pub content: Option<String>,
    pub score: Option<i64>,
    pub recommendation: Option<Recommendation>,
    pub comments: Option<String>,
    pub is_confidential: Option<bool>,
}

impl ReviewChanges {
    /// Compute the body after applying these changes.
    ///
    /// A pending review can only be completed by supplying content, score,
    /// and recommendation together.
    pub fn apply_to(&self, body: &ReviewBody) -> Result<ReviewBody> {
        match body {
            ReviewBody::Completed(current) => {
                let submission = ReviewSubmission {
                    content: self.content.clone().unwrap_or_else(|| current.content.clone()),
                    score: self
                        .score
                        .unwrap_or_else(|| i64::from(current.score.value())),
                    recommendation: self.recommendation.unwrap_or(current.recommendation),
                    comments: self.comments.clone().or_else(|| current.comments.clone()),
                    is_confidential: false,
                };
                Ok(ReviewBody::Completed(submission.assessment()?))
            }
            ReviewBody::Pending => {
                if self.content.is_none() && self.score.is_none() && self.recommendation.is_none()
                {
                    return Ok(ReviewBody::Pending);
                }
                match (&self.content, self.score, self.recommendation) {
                    (Some(content), Some(score), Some(recommendation)) => {
                        let submission = ReviewSubmission {
                            content: content.clone(),
                            score,
                            recommendation,
                            comments: self.comments.clone(),
                            is_confidential: false,
                        };
                        Ok(ReviewBody::Completed(submission.assessment()?))
                    }
                    _ => Err(ReviewError::Validation(
                        "completing a pending review requires content, score, and recommendation"
                            .to_string(),
                    )),
                }
            }
        }
    }
}

/// A review of a manuscript, or a pending reviewer assignment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    /// Unique identifier
    pub id: ReviewId,
    /// Reviewed manuscript
    pub manuscript_id: ManuscriptId,
    /// Reviewer
    pub reviewer_id: UserId,
    /// Pending assignment or completed assessment
    pub body: ReviewBody,
    /// Hidden from the manuscript's author when set
    pub is_confidential: bool,
    /// When the reviewer was assigned (absent for unsolicited reviews)
    pub assigned_at: Option<DateTime<Utc>>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp
    pub updated_at: DateTime<Utc>,
}

impl Review {
    /// Create a pending assignment
    pub fn assignment(manuscript_id: ManuscriptId, reviewer_id: UserId) -> Self {
        let now = Utc::now();
        Self {
            id: ReviewId::new(),
            manuscript_id,
            reviewer_id,
            body: ReviewBody::Pending,
            is_confidential: false,
            assigned_at: Some(now),
            created_at: now,
            updated_at: now,
        }
    }

    /// Create a completed review without a prior assignment
    pub fn completed(
        manuscript_id: ManuscriptId,
        reviewer_id: UserId,
        assessment: Assessment,
        is_confidential: bool,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: ReviewId::new(),
            manuscript_id,
            reviewer_id,
            body: ReviewBody::Completed(assessment),
            is_confidential,
            assigned_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.body.is_pending()
    }

    pub fn recommendation(&self) -> Option<Recommendation> {
        self.body.recommendation()
    }

    /// Replace the body, keeping identity and assignment time
    pub fn set_body(&mut self, body: ReviewBody, is_confidential: bool) {
        self.body = body;
        self.is_confidential = is_confidential;
        self.updated_at = Utc::now();
    }

    #[cfg(test)]
    pub(crate) fn completed_for_test(
        manuscript_id: ManuscriptId,
        recommendation: Recommendation,
    ) -> Self {
        Self::completed(
            manuscript_id,
            UserId::new(),
            Assessment {
                content: "Looks fine".to_string(),
                score: Score(7),
                recommendation,
                comments: None,
            },
            false,
        )
    }
}

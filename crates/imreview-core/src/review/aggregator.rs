//! Derivation of a manuscript's status from its full review set

use serde::{Deserialize, Serialize};

use super::{Recommendation, Review};
use crate::error::Result;
use crate::manuscript::{Manuscript, ManuscriptStatus, StatusChange, Transition};

/// Outcome of aggregating every review of a manuscript
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Only pending assignments (or nothing at all)
    NoCompletedReviews,
    /// Every completed review accepts, but assignments are still open
    AwaitingReviewers,
    /// Every review is completed and accepts
    Accept,
    /// At least one revise_resubmit, no reject
    ReviseResubmit,
    /// At least one reject
    Reject,
}

impl Verdict {
    /// Status this verdict resolves to, if any
    pub fn target(&self) -> Option<ManuscriptStatus> {
        match self {
            Verdict::NoCompletedReviews => None,
            Verdict::AwaitingReviewers => Some(ManuscriptStatus::UnderReview),
            Verdict::Accept => Some(ManuscriptStatus::Accepted),
            Verdict::ReviseResubmit => Some(ManuscriptStatus::RevisionRequested),
            Verdict::Reject => Some(ManuscriptStatus::Rejected),
        }
    }
}

/// Aggregate a review set.
///
/// Reject outranks revise_resubmit, which outranks acceptance. The result
/// depends only on the multiset of review bodies, never on their order.
pub fn aggregate<'a>(reviews: impl IntoIterator<Item = &'a Review>) -> Verdict {
    let mut completed = 0usize;
    let mut pending = 0usize;
    let mut revise = false;

    for review in reviews {
        match review.recommendation() {
            None => pending += 1,
            Some(Recommendation::Reject) => return Verdict::Reject,
            Some(r) if r.is_accepting() => completed += 1,
            Some(_) => {
                completed += 1;
                revise = true;
            }
        }
    }

    if completed == 0 {
        Verdict::NoCompletedReviews
    } else if revise {
        Verdict::ReviseResubmit
    } else if pending > 0 {
        Verdict::AwaitingReviewers
    } else {
        Verdict::Accept
    }
}

/// Recompute and apply the derived status of `manuscript`.
///
/// `reviews` must be the manuscript's entire current review set. Manuscripts
/// outside the reviewable states keep their status.
pub fn recompute<'a>(
    manuscript: &mut Manuscript,
    reviews: impl IntoIterator<Item = &'a Review>,
) -> Result<Option<StatusChange>> {
    if !manuscript.status().accepts_reviews() {
        return Ok(None);
    }

    let verdict = aggregate(reviews);
    tracing::debug!(manuscript = %manuscript.id, ?verdict, "reviews aggregated");

    match verdict.target() {
        Some(target) => manuscript.apply(Transition::Derive(target)),
        None => Ok(None),
    }
}

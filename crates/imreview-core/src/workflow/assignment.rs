//! Reviewer assignment

use crate::authz::{authorize, Action, Resource};
use crate::error::{AssignmentError, ManuscriptError, Result};
use crate::event::{EventPayload, WorkflowEvent};
use crate::id::{ManuscriptId, UserId};
use crate::manuscript::{ManuscriptStatus, Transition};
use crate::principal::{Principal, Role};
use crate::review::{recompute, Review};

use super::WorkflowState;

/// Assign `reviewer_id` to a manuscript.
///
/// Checks run in a fixed order so that callers get the most specific error:
/// permission, existence, role, self-review, duplicate, then status. The
/// first assignment of a submitted manuscript starts the review.
pub(crate) fn assign_reviewer(
    state: &mut WorkflowState,
    principal: &Principal,
    manuscript_id: ManuscriptId,
    reviewer_id: UserId,
) -> Result<Vec<WorkflowEvent>> {
    authorize(principal, Action::AssignReviewer, &Resource::none())?;

    let manuscript = state.require_manuscript(&manuscript_id)?;
    let reviewer = state.users().require(&reviewer_id)?;

    if reviewer.role != Role::Reviewer {
        return Err(AssignmentError::InvalidRole {
            user: reviewer_id.to_string(),
            role: reviewer.role.to_string(),
        }
        .into());
    }
    if reviewer_id == manuscript.author_id {
        return Err(AssignmentError::SelfAssignment(reviewer_id.to_string()).into());
    }
    if state.review_by(&manuscript_id, &reviewer_id).is_some() {
        return Err(AssignmentError::AlreadyAssigned {
            manuscript: manuscript_id.to_string(),
            reviewer: reviewer_id.to_string(),
        }
        .into());
    }
    if !manuscript.status().accepts_reviews() {
        return Err(ManuscriptError::NotOpenForReview {
            id: manuscript_id.to_string(),
            status: manuscript.status().to_string(),
        }
        .into());
    }

    let review = Review::assignment(manuscript_id, reviewer_id);

    // A new open assignment holds back acceptance, so the decision is
    // re-derived over the enlarged review set.
    let mut manuscript = manuscript.clone();
    let mut changes = Vec::new();
    if manuscript.status() == ManuscriptStatus::Submitted {
        if let Some(change) = manuscript.apply(Transition::StartReview)? {
            changes.push((change, Transition::StartReview.cause()));
        }
    }
    let reviews = state
        .reviews_for(&manuscript_id)
        .into_iter()
        .chain(std::iter::once(&review));
    if let Some(change) = recompute(&mut manuscript, reviews)? {
        changes.push((change, Transition::Derive(change.to).cause()));
    }

    let mut events = vec![WorkflowEvent::review(
        review.id,
        EventPayload::ReviewerAssigned {
            manuscript_id,
            reviewer_id,
        },
    )
    .with_actor(principal.id)];
    for (change, cause) in changes {
        events.push(
            WorkflowEvent::manuscript(
                manuscript_id,
                EventPayload::ManuscriptStatusChanged {
                    from: change.from,
                    to: change.to,
                    cause: cause.to_string(),
                },
            )
            .with_actor(principal.id),
        );
    }

    tracing::info!(
        manuscript = %manuscript_id,
        reviewer = %reviewer_id,
        review = %review.id,
        "reviewer assigned"
    );

    state.insert_review(review);
    state.insert_manuscript(manuscript);
    Ok(events.into_iter().map(|e| state.record(e)).collect())
}

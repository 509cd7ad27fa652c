//! Workflow state aggregate root

use std::collections::HashMap;

use crate::authz::{authorize, can, Action, Resource};
use crate::config::ValidationLimits;
use crate::error::{Result, ReviewError};
use crate::event::{EventLog, EventPayload, WorkflowEvent};
use crate::id::{ManuscriptId, ReviewId, UserId};
use crate::manuscript::{Manuscript, StatusChange};
use crate::principal::Principal;
use crate::review::{self, Review};
use crate::user::{User, UserDirectory};

use super::Command;

/// The aggregate root for manuscripts, reviews, and users.
///
/// A command that still has to be persisted is bracketed by
/// [`WorkflowState::checkpoint`] and, on failure, [`WorkflowState::rollback`].
#[derive(Debug, Clone, Default)]
pub struct WorkflowState {
    manuscripts: HashMap<ManuscriptId, Manuscript>,
    reviews: HashMap<ReviewId, Review>,
    users: UserDirectory,
    events: EventLog,
    limits: ValidationLimits,
}

/// Pre-images of the entities one command may modify
#[derive(Debug, Clone)]
pub struct Checkpoint {
    event_len: usize,
    manuscript: Option<ManuscriptSnapshot>,
    user: Option<(UserId, Option<User>)>,
}

#[derive(Debug, Clone)]
struct ManuscriptSnapshot {
    id: ManuscriptId,
    manuscript: Option<Manuscript>,
    reviews: Vec<Review>,
}

impl WorkflowState {
    /// Create an empty state
    pub fn new(limits: ValidationLimits) -> Self {
        Self {
            limits,
            ..Self::default()
        }
    }

    /// Rebuild a state from loaded records
    pub fn restore(
        limits: ValidationLimits,
        users: impl IntoIterator<Item = User>,
        manuscripts: impl IntoIterator<Item = Manuscript>,
        reviews: impl IntoIterator<Item = Review>,
        events: impl IntoIterator<Item = WorkflowEvent>,
    ) -> Self {
        let mut state = Self::new(limits);
        for user in users {
            state.users.insert(user);
        }
        state.manuscripts = manuscripts.into_iter().map(|m| (m.id, m)).collect();
        state.reviews = reviews.into_iter().map(|r| (r.id, r)).collect();
        state.events.restore(events);
        state
    }

    /// Load the full state from a repository
    #[cfg(feature = "sqlite")]
    pub fn load_from_repository(
        repo: &crate::persistence::Repository,
        limits: ValidationLimits,
    ) -> Result<Self> {
        let state = Self::restore(
            limits,
            repo.load_users()?,
            repo.load_manuscripts()?,
            repo.load_reviews()?,
            repo.load_events()?,
        );
        tracing::info!(
            manuscripts = state.manuscripts.len(),
            reviews = state.reviews.len(),
            users = state.users.len(),
            "workflow state loaded"
        );
        Ok(state)
    }

    pub fn limits(&self) -> &ValidationLimits {
        &self.limits
    }

    // ==================== Events ====================

    /// Record an event in the log
    pub fn record(&mut self, event: WorkflowEvent) -> WorkflowEvent {
        self.events.append(event)
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    // ==================== Users ====================

    pub fn users(&self) -> &UserDirectory {
        &self.users
    }

    pub fn users_mut(&mut self) -> &mut UserDirectory {
        &mut self.users
    }

    /// Add or replace a user (identity seeding)
    pub fn upsert_user(&mut self, user: User) {
        self.users.insert(user);
    }

    // ==================== Manuscripts ====================

    pub fn manuscript(&self, id: &ManuscriptId) -> Option<&Manuscript> {
        self.manuscripts.get(id)
    }

    /// Look up a manuscript, failing with `NotFound`
    pub fn require_manuscript(&self, id: &ManuscriptId) -> Result<&Manuscript> {
        self.manuscripts
            .get(id)
            .ok_or_else(|| ReviewError::NotFound(format!("manuscript {}", id)))
    }

    pub(crate) fn insert_manuscript(&mut self, manuscript: Manuscript) {
        self.manuscripts.insert(manuscript.id, manuscript);
    }

    /// Remove a manuscript together with its reviews
    pub(crate) fn remove_manuscript(&mut self, id: &ManuscriptId) -> Option<(Manuscript, Vec<Review>)> {
        let manuscript = self.manuscripts.remove(id)?;
        let review_ids: Vec<ReviewId> = self
            .reviews
            .values()
            .filter(|r| r.manuscript_id == *id)
            .map(|r| r.id)
            .collect();
        let reviews = review_ids
            .iter()
            .filter_map(|rid| self.reviews.remove(rid))
            .collect();
        Some((manuscript, reviews))
    }

    /// Read a single manuscript on behalf of `principal`
    pub fn read_manuscript(&self, principal: &Principal, id: &ManuscriptId) -> Result<&Manuscript> {
        let manuscript = self.require_manuscript(id)?;
        authorize(
            principal,
            Action::ReadManuscript,
            &Resource::manuscript(manuscript.author_id),
        )?;
        Ok(manuscript)
    }

    /// Manuscripts visible to `principal`, most recently submitted first.
    ///
    /// Editorial staff see everything; everyone else sees what they authored.
    pub fn visible_manuscripts(&self, principal: &Principal) -> Vec<&Manuscript> {
        let see_all = can(principal, Action::ListAllManuscripts, &Resource::none());
        let mut manuscripts: Vec<&Manuscript> = self
            .manuscripts
            .values()
            .filter(|m| see_all || m.author_id == principal.id)
            .collect();
        manuscripts.sort_by(|a, b| {
            b.submitted_at
                .cmp(&a.submitted_at)
                .then(b.created_at.cmp(&a.created_at))
        });
        manuscripts
    }

    /// Status history of a manuscript on behalf of `principal`
    pub fn manuscript_history(
        &self,
        principal: &Principal,
        id: &ManuscriptId,
    ) -> Result<Vec<&WorkflowEvent>> {
        self.read_manuscript(principal, id)?;
        Ok(self.events.status_history(&id.to_string()))
    }

    // ==================== Reviews ====================

    pub fn review(&self, id: &ReviewId) -> Option<&Review> {
        self.reviews.get(id)
    }

    /// Look up a review, failing with `NotFound`
    pub fn require_review(&self, id: &ReviewId) -> Result<&Review> {
        self.reviews
            .get(id)
            .ok_or_else(|| ReviewError::NotFound(format!("review {}", id)))
    }

    pub(crate) fn insert_review(&mut self, review: Review) {
        self.reviews.insert(review.id, review);
    }

    pub(crate) fn remove_review(&mut self, id: &ReviewId) -> Option<Review> {
        self.reviews.remove(id)
    }

    pub fn review_count(&self) -> usize {
        self.reviews.len()
    }

    /// All reviews of a manuscript, including pending assignments
    pub fn reviews_for(&self, manuscript_id: &ManuscriptId) -> Vec<&Review> {
        let mut reviews: Vec<&Review> = self
            .reviews
            .values()
            .filter(|r| r.manuscript_id == *manuscript_id)
            .collect();
        reviews.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        reviews
    }

    /// The review or assignment a reviewer holds for a manuscript
    pub fn review_by(&self, manuscript_id: &ManuscriptId, reviewer_id: &UserId) -> Option<&Review> {
        self.reviews
            .values()
            .find(|r| r.manuscript_id == *manuscript_id && r.reviewer_id == *reviewer_id)
    }

    /// Ownership facts for a review
    pub(crate) fn review_resource(&self, review: &Review) -> Result<Resource> {
        let manuscript = self.require_manuscript(&review.manuscript_id)?;
        Ok(Resource::review(
            manuscript.author_id,
            review.reviewer_id,
            review.is_confidential,
        ))
    }

    fn can_read_review(&self, principal: &Principal, review: &Review) -> bool {
        self.review_resource(review)
            .map(|res| can(principal, Action::ReadReview, &res))
            .unwrap_or(false)
    }

    /// Read a single review on behalf of `principal`.
    ///
    /// A confidential review is reported as missing to the manuscript's
    /// author, so its existence is not revealed.
    pub fn read_review(&self, principal: &Principal, id: &ReviewId) -> Result<&Review> {
        let review = self.require_review(id)?;
        let resource = self.review_resource(review)?;
        if can(principal, Action::ReadReview, &resource) {
            return Ok(review);
        }
        if resource.confidential && resource.manuscript_author == Some(principal.id) {
            return Err(ReviewError::NotFound(format!("review {}", id)));
        }
        Err(ReviewError::forbidden(Action::ReadReview))
    }

    /// Reviews visible to `principal`, newest first
    pub fn visible_reviews(&self, principal: &Principal) -> Vec<&Review> {
        let mut reviews: Vec<&Review> = self
            .reviews
            .values()
            .filter(|r| self.can_read_review(principal, r))
            .collect();
        reviews.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        reviews
    }

    /// Reviews of one manuscript visible to `principal`
    pub fn visible_reviews_for(
        &self,
        principal: &Principal,
        manuscript_id: &ManuscriptId,
    ) -> Result<Vec<&Review>> {
        self.require_manuscript(manuscript_id)?;
        Ok(self
            .reviews_for(manuscript_id)
            .into_iter()
            .filter(|r| self.can_read_review(principal, r))
            .collect())
    }

    // ==================== Undo ====================

    /// Capture what `command` can touch: the locked manuscript with its
    /// reviews, the targeted user, and the current end of the event log.
    pub fn checkpoint(&self, command: &Command) -> Checkpoint {
        let manuscript = command.lock_key(self).map(|id| ManuscriptSnapshot {
            id,
            manuscript: self.manuscripts.get(&id).cloned(),
            reviews: self.reviews_for(&id).into_iter().cloned().collect(),
        });
        let user = command
            .user_key()
            .map(|id| (id, self.users.get(&id).cloned()));
        Checkpoint {
            event_len: self.events.len(),
            manuscript,
            user,
        }
    }

    /// Undo everything recorded since `checkpoint` was taken
    pub fn rollback(&mut self, checkpoint: Checkpoint) {
        let undone = self.events.truncate(checkpoint.event_len);
        for event in &undone {
            if let EventPayload::ManuscriptCreated { .. } = event.payload {
                if let Ok(id) = ManuscriptId::parse(&event.entity_id) {
                    self.remove_manuscript(&id);
                }
            }
        }

        if let Some(snapshot) = checkpoint.manuscript {
            self.reviews.retain(|_, r| r.manuscript_id != snapshot.id);
            self.manuscripts.remove(&snapshot.id);
            if let Some(manuscript) = snapshot.manuscript {
                self.insert_manuscript(manuscript);
            }
            for review in snapshot.reviews {
                self.insert_review(review);
            }
        }
        if let Some((id, user)) = checkpoint.user {
            self.users.remove(&id);
            if let Some(user) = user {
                self.users.insert(user);
            }
        }
        tracing::warn!(events = undone.len(), "workflow changes rolled back");
    }

    /// Derive the manuscript's status as it would be after swapping one
    /// review for another, without touching the state.
    ///
    /// `replaced` is removed from the review set and `added` (if any) is
    /// inserted in its place. Returns the updated manuscript for the caller
    /// to commit.
    pub(crate) fn derive_status(
        &self,
        manuscript_id: &ManuscriptId,
        replaced: Option<ReviewId>,
        added: Option<&Review>,
    ) -> Result<(Manuscript, Option<StatusChange>)> {
        let mut manuscript = self.require_manuscript(manuscript_id)?.clone();
        let reviews = self
            .reviews_for(manuscript_id)
            .into_iter()
            .filter(|r| Some(r.id) != replaced)
            .chain(added);
        let change = review::recompute(&mut manuscript, reviews)?;
        Ok((manuscript, change))
    }
}

//! Commands against the workflow state

use crate::authz::{authorize, Action, Resource};
use crate::error::{ManuscriptError, Result, ReviewError};
use crate::event::{EventPayload, WorkflowEvent};
use crate::id::{JournalId, ManuscriptId, ReviewId, UserId};
use crate::manuscript::{
    Manuscript, ManuscriptChanges, ManuscriptMetadata, ManuscriptStatus, StatusChange, Transition,
};
use crate::principal::{Principal, Role};
use crate::review::{Review, ReviewBody, ReviewChanges, ReviewSubmission};

use super::{assignment, WorkflowState};

/// Commands that can be executed on the workflow state
#[derive(Debug, Clone)]
pub enum Command {
    /// Create a manuscript, submitted unless `as_draft` is set
    CreateManuscript {
        journal_id: JournalId,
        metadata: ManuscriptMetadata,
        as_draft: bool,
    },

    /// Change metadata and/or override the status
    UpdateManuscript {
        manuscript_id: ManuscriptId,
        changes: ManuscriptChanges,
        status: Option<ManuscriptStatus>,
    },

    /// Delete a manuscript and its reviews
    DeleteManuscript { manuscript_id: ManuscriptId },

    /// Submit a draft
    SubmitManuscript { manuscript_id: ManuscriptId },

    /// Resubmit after a revision request, optionally with revised metadata
    ResubmitManuscript {
        manuscript_id: ManuscriptId,
        changes: ManuscriptChanges,
    },

    /// Publish an accepted manuscript
    PublishManuscript { manuscript_id: ManuscriptId },

    /// Assign a reviewer
    AssignReviewer {
        manuscript_id: ManuscriptId,
        reviewer_id: UserId,
    },

    /// Submit a review as the acting principal
    SubmitReview {
        manuscript_id: ManuscriptId,
        submission: ReviewSubmission,
    },

    /// Update a review
    UpdateReview {
        review_id: ReviewId,
        changes: ReviewChanges,
    },

    /// Delete a review
    DeleteReview { review_id: ReviewId },

    /// Change a user's role
    ChangeUserRole { user_id: UserId, role: Role },

    /// Remove a user from the directory
    DeleteUser { user_id: UserId },
}

impl Command {
    /// Short name for logging
    pub fn name(&self) -> &'static str {
        match self {
            Command::CreateManuscript { .. } => "create_manuscript",
            Command::UpdateManuscript { .. } => "update_manuscript",
            Command::DeleteManuscript { .. } => "delete_manuscript",
            Command::SubmitManuscript { .. } => "submit_manuscript",
            Command::ResubmitManuscript { .. } => "resubmit_manuscript",
            Command::PublishManuscript { .. } => "publish_manuscript",
            Command::AssignReviewer { .. } => "assign_reviewer",
            Command::SubmitReview { .. } => "submit_review",
            Command::UpdateReview { .. } => "update_review",
            Command::DeleteReview { .. } => "delete_review",
            Command::ChangeUserRole { .. } => "change_user_role",
            Command::DeleteUser { .. } => "delete_user",
        }
    }

    /// The manuscript whose lock must be held while this command runs
    pub fn lock_key(&self, state: &WorkflowState) -> Option<ManuscriptId> {
        match self {
            Command::UpdateManuscript { manuscript_id, .. }
            | Command::DeleteManuscript { manuscript_id }
            | Command::SubmitManuscript { manuscript_id }
            | Command::ResubmitManuscript { manuscript_id, .. }
            | Command::PublishManuscript { manuscript_id }
            | Command::AssignReviewer { manuscript_id, .. }
            | Command::SubmitReview { manuscript_id, .. } => Some(*manuscript_id),
            Command::UpdateReview { review_id, .. } | Command::DeleteReview { review_id } => {
                state.review(review_id).map(|r| r.manuscript_id)
            }
            Command::CreateManuscript { .. }
            | Command::ChangeUserRole { .. }
            | Command::DeleteUser { .. } => None,
        }
    }

    /// The user whose directory entry this command changes
    pub fn user_key(&self) -> Option<UserId> {
        match self {
            Command::ChangeUserRole { user_id, .. } | Command::DeleteUser { user_id } => {
                Some(*user_id)
            }
            _ => None,
        }
    }

    /// Execute the command on the given state.
    ///
    /// Every check runs before the first write, so an error leaves `state`
    /// exactly as it was. Returns the recorded events.
    pub fn execute(
        self,
        principal: &Principal,
        state: &mut WorkflowState,
    ) -> Result<Vec<WorkflowEvent>> {
        let events = match self {
            Command::CreateManuscript {
                journal_id,
                metadata,
                as_draft,
            } => {
                authorize(principal, Action::CreateManuscript, &Resource::none())?;
                let metadata = metadata.validated(state.limits())?;
                let manuscript = Manuscript::new(principal.id, journal_id, metadata, as_draft);
                let event = WorkflowEvent::manuscript(
                    manuscript.id,
                    EventPayload::ManuscriptCreated {
                        author_id: principal.id,
                        status: manuscript.status(),
                    },
                );
                tracing::info!(manuscript = %manuscript.id, status = %manuscript.status(), "manuscript created");
                state.insert_manuscript(manuscript);
                vec![event]
            }

            Command::UpdateManuscript {
                manuscript_id,
                changes,
                status,
            } => {
                let current = state.require_manuscript(&manuscript_id)?;
                let resource = Resource::manuscript(current.author_id);
                if changes.is_empty() && status.is_none() {
                    return Err(ReviewError::Validation("nothing to update".to_string()));
                }
                if !changes.is_empty() {
                    authorize(principal, Action::UpdateManuscript, &resource)?;
                }
                if status.is_some() {
                    authorize(principal, Action::OverrideStatus, &resource)?;
                }

                let mut manuscript = current.clone();
                let mut events = Vec::new();
                if !changes.is_empty() {
                    let metadata = changes
                        .merged_into(&manuscript.metadata)
                        .validated(state.limits())?;
                    manuscript.set_metadata(metadata);
                    events.push(WorkflowEvent::manuscript(
                        manuscript_id,
                        EventPayload::ManuscriptUpdated {
                            fields: changed_fields(&changes),
                        },
                    ));
                }
                if let Some(target) = status {
                    let transition = Transition::Override(target);
                    if let Some(change) = manuscript.apply(transition)? {
                        events.push(status_event(manuscript_id, change, transition));
                    }
                }
                state.insert_manuscript(manuscript);
                events
            }

            Command::DeleteManuscript { manuscript_id } => {
                let manuscript = state.require_manuscript(&manuscript_id)?;
                authorize(
                    principal,
                    Action::DeleteManuscript,
                    &Resource::manuscript(manuscript.author_id),
                )?;
                if manuscript.status() == ManuscriptStatus::Published {
                    return Err(ManuscriptError::Published(manuscript_id.to_string()).into());
                }
                let reviews_removed = state
                    .remove_manuscript(&manuscript_id)
                    .map(|(_, reviews)| reviews.into_iter().map(|r| r.id).collect())
                    .unwrap_or_default();
                tracing::info!(manuscript = %manuscript_id, "manuscript deleted");
                vec![WorkflowEvent::manuscript(
                    manuscript_id,
                    EventPayload::ManuscriptDeleted { reviews_removed },
                )]
            }

            Command::SubmitManuscript { manuscript_id } => {
                let current = state.require_manuscript(&manuscript_id)?;
                authorize(
                    principal,
                    Action::SubmitManuscript,
                    &Resource::manuscript(current.author_id),
                )?;
                let mut manuscript = current.clone();
                let events = manuscript
                    .apply(Transition::Submit)?
                    .map(|change| status_event(manuscript_id, change, Transition::Submit))
                    .into_iter()
                    .collect();
                state.insert_manuscript(manuscript);
                events
            }

            Command::ResubmitManuscript {
                manuscript_id,
                changes,
            } => {
                let current = state.require_manuscript(&manuscript_id)?;
                authorize(
                    principal,
                    Action::SubmitManuscript,
                    &Resource::manuscript(current.author_id),
                )?;
                if current.status() != ManuscriptStatus::RevisionRequested
                    && current.status() != ManuscriptStatus::Revised
                {
                    return Err(ManuscriptError::InvalidTransition {
                        from: current.status().to_string(),
                        to: ManuscriptStatus::Revised.to_string(),
                    }
                    .into());
                }

                let mut manuscript = current.clone();
                let mut events = Vec::new();
                if !changes.is_empty() {
                    let metadata = changes
                        .merged_into(&manuscript.metadata)
                        .validated(state.limits())?;
                    manuscript.set_metadata(metadata);
                    events.push(WorkflowEvent::manuscript(
                        manuscript_id,
                        EventPayload::ManuscriptUpdated {
                            fields: changed_fields(&changes),
                        },
                    ));
                }
                for transition in [Transition::MarkRevised, Transition::Resubmit] {
                    if let Some(change) = manuscript.apply(transition)? {
                        events.push(status_event(manuscript_id, change, transition));
                    }
                }
                state.insert_manuscript(manuscript);
                events
            }

            Command::PublishManuscript { manuscript_id } => {
                let current = state.require_manuscript(&manuscript_id)?;
                authorize(principal, Action::PublishManuscript, &Resource::none())?;
                if current.status() != ManuscriptStatus::Accepted {
                    return Err(ManuscriptError::InvalidTransition {
                        from: current.status().to_string(),
                        to: ManuscriptStatus::Published.to_string(),
                    }
                    .into());
                }
                let mut manuscript = current.clone();
                let events = manuscript
                    .apply(Transition::Publish)?
                    .map(|change| status_event(manuscript_id, change, Transition::Publish))
                    .into_iter()
                    .collect();
                state.insert_manuscript(manuscript);
                events
            }

            Command::AssignReviewer {
                manuscript_id,
                reviewer_id,
            } => return assignment::assign_reviewer(state, principal, manuscript_id, reviewer_id),

            Command::SubmitReview {
                manuscript_id,
                submission,
            } => {
                let manuscript = state.require_manuscript(&manuscript_id)?;
                authorize(
                    principal,
                    Action::CreateReview,
                    &Resource::manuscript(manuscript.author_id),
                )?;
                ensure_open_for_review(manuscript)?;
                let assessment = submission.assessment()?;

                let review = match state.review_by(&manuscript_id, &principal.id) {
                    Some(existing) if existing.is_pending() => {
                        let mut upgraded = existing.clone();
                        upgraded.set_body(
                            ReviewBody::Completed(assessment.clone()),
                            submission.is_confidential,
                        );
                        upgraded
                    }
                    Some(_) => {
                        return Err(ReviewError::Conflict(format!(
                            "reviewer {} has already reviewed manuscript {}",
                            principal.id, manuscript_id
                        )))
                    }
                    None => Review::completed(
                        manuscript_id,
                        principal.id,
                        assessment.clone(),
                        submission.is_confidential,
                    ),
                };

                let (manuscript, change) =
                    state.derive_status(&manuscript_id, Some(review.id), Some(&review))?;

                let mut events = vec![WorkflowEvent::review(
                    review.id,
                    EventPayload::ReviewSubmitted {
                        manuscript_id,
                        reviewer_id: principal.id,
                        recommendation: assessment.recommendation,
                    },
                )];
                if let Some(change) = change {
                    events.push(status_event(
                        manuscript_id,
                        change,
                        Transition::Derive(change.to),
                    ));
                }
                tracing::info!(
                    manuscript = %manuscript_id,
                    review = %review.id,
                    recommendation = %assessment.recommendation,
                    "review submitted"
                );
                state.insert_review(review);
                state.insert_manuscript(manuscript);
                events
            }

            Command::UpdateReview { review_id, changes } => {
                let current = state.require_review(&review_id)?;
                authorize(principal, Action::UpdateReview, &state.review_resource(current)?)?;
                let manuscript_id = current.manuscript_id;
                ensure_open_for_review(state.require_manuscript(&manuscript_id)?)?;

                let body = changes.apply_to(&current.body)?;
                let completed_now = current.is_pending() && !body.is_pending();
                let mut review = current.clone();
                review.set_body(
                    body,
                    changes.is_confidential.unwrap_or(current.is_confidential),
                );

                let (manuscript, change) =
                    state.derive_status(&manuscript_id, Some(review_id), Some(&review))?;

                let payload = match review.recommendation() {
                    Some(recommendation) if completed_now => EventPayload::ReviewSubmitted {
                        manuscript_id,
                        reviewer_id: review.reviewer_id,
                        recommendation,
                    },
                    _ => EventPayload::ReviewUpdated { manuscript_id },
                };
                let mut events = vec![WorkflowEvent::review(review_id, payload)];
                if let Some(change) = change {
                    events.push(status_event(
                        manuscript_id,
                        change,
                        Transition::Derive(change.to),
                    ));
                }
                state.insert_review(review);
                state.insert_manuscript(manuscript);
                events
            }

            Command::DeleteReview { review_id } => {
                let current = state.require_review(&review_id)?;
                authorize(principal, Action::DeleteReview, &state.review_resource(current)?)?;
                let manuscript_id = current.manuscript_id;
                ensure_open_for_review(state.require_manuscript(&manuscript_id)?)?;

                let (manuscript, change) =
                    state.derive_status(&manuscript_id, Some(review_id), None)?;

                let mut events = vec![WorkflowEvent::review(
                    review_id,
                    EventPayload::ReviewDeleted { manuscript_id },
                )];
                if let Some(change) = change {
                    events.push(status_event(
                        manuscript_id,
                        change,
                        Transition::Derive(change.to),
                    ));
                }
                tracing::info!(manuscript = %manuscript_id, review = %review_id, "review deleted");
                state.remove_review(&review_id);
                state.insert_manuscript(manuscript);
                events
            }

            Command::ChangeUserRole { user_id, role } => {
                authorize(principal, Action::ChangeUserRole, &Resource::none())?;
                let previous = state.users_mut().set_role(&user_id, role)?;
                if previous == role {
                    Vec::new()
                } else {
                    tracing::info!(user = %user_id, from = %previous, to = %role, "user role changed");
                    vec![WorkflowEvent::user(
                        user_id,
                        EventPayload::UserRoleChanged {
                            from: previous,
                            to: role,
                        },
                    )]
                }
            }

            Command::DeleteUser { user_id } => {
                authorize(principal, Action::DeleteUser, &Resource::none())?;
                state.users().require(&user_id)?;
                state.users_mut().remove(&user_id);
                tracing::info!(user = %user_id, "user deleted");
                vec![WorkflowEvent::user(user_id, EventPayload::UserDeleted)]
            }
        };

        Ok(events
            .into_iter()
            .map(|event| state.record(event.with_actor(principal.id)))
            .collect())
    }
}

fn ensure_open_for_review(manuscript: &Manuscript) -> Result<()> {
    if manuscript.status().accepts_reviews() {
        Ok(())
    } else {
        Err(ManuscriptError::NotOpenForReview {
            id: manuscript.id.to_string(),
            status: manuscript.status().to_string(),
        }
        .into())
    }
}

fn status_event(
    manuscript_id: ManuscriptId,
    change: StatusChange,
    transition: Transition,
) -> WorkflowEvent {
    WorkflowEvent::manuscript(
        manuscript_id,
        EventPayload::ManuscriptStatusChanged {
            from: change.from,
            to: change.to,
            cause: transition.cause().to_string(),
        },
    )
}

fn changed_fields(changes: &ManuscriptChanges) -> Vec<String> {
    [
        ("title", changes.title.is_some()),
        ("abstract", changes.abstract_text.is_some()),
        ("keywords", changes.keywords.is_some()),
        ("section", changes.section.is_some()),
    ]
    .into_iter()
    .filter(|(_, changed)| *changed)
    .map(|(name, _)| name.to_string())
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AssignmentError, ErrorKind};
    use crate::review::Recommendation;
    use crate::user::User;

    struct Fixture {
        state: WorkflowState,
        author: Principal,
        editor: Principal,
        admin: Principal,
        r1: Principal,
        r2: Principal,
    }

    impl Fixture {
        fn new() -> Self {
            let mut state = WorkflowState::default();
            let mut add = |name: &str, role: Role| {
                let user = User::new(name, format!("{}@example.org", name), role);
                let principal = user.principal();
                state.upsert_user(user);
                principal
            };
            let author = add("author", Role::Author);
            let editor = add("editor", Role::Editor);
            let admin = add("admin", Role::Admin);
            let r1 = add("r1", Role::Reviewer);
            let r2 = add("r2", Role::Reviewer);
            Self {
                state,
                author,
                editor,
                admin,
                r1,
                r2,
            }
        }

        fn create(&mut self) -> ManuscriptId {
            let events = Command::CreateManuscript {
                journal_id: JournalId::new(),
                metadata: ManuscriptMetadata {
                    title: "Stable matchings in review pools".to_string(),
                    abstract_text: "We describe a matching.".to_string(),
                    keywords: vec!["matching".to_string()],
                    section: "Theory".to_string(),
                },
                as_draft: false,
            }
            .execute(&self.author, &mut self.state)
            .unwrap();
            ManuscriptId::parse(&events[0].entity_id).unwrap()
        }

        fn assign(&mut self, id: ManuscriptId, reviewer: Principal) -> Result<Vec<WorkflowEvent>> {
            Command::AssignReviewer {
                manuscript_id: id,
                reviewer_id: reviewer.id,
            }
            .execute(&self.editor, &mut self.state)
        }

        fn review(
            &mut self,
            id: ManuscriptId,
            reviewer: Principal,
            recommendation: Recommendation,
        ) -> Result<Vec<WorkflowEvent>> {
            Command::SubmitReview {
                manuscript_id: id,
                submission: ReviewSubmission {
                    content: "Careful and convincing.".to_string(),
                    score: 8,
                    recommendation,
                    comments: None,
                    is_confidential: false,
                },
            }
            .execute(&reviewer, &mut self.state)
        }

        fn status(&self, id: ManuscriptId) -> ManuscriptStatus {
            self.state.manuscript(&id).unwrap().status()
        }
    }

    #[test]
    fn test_create_manuscript_command() {
        let mut f = Fixture::new();
        let id = f.create();
        assert_eq!(f.status(id), ManuscriptStatus::Submitted);
        assert_eq!(f.state.manuscript(&id).unwrap().author_id, f.author.id);

        let err = Command::CreateManuscript {
            journal_id: JournalId::new(),
            metadata: ManuscriptMetadata::default(),
            as_draft: false,
        }
        .execute(&f.r1, &mut f.state)
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }

    #[test]
    fn test_draft_then_submit() {
        let mut f = Fixture::new();
        let events = Command::CreateManuscript {
            journal_id: JournalId::new(),
            metadata: ManuscriptMetadata {
                title: "Draft".to_string(),
                abstract_text: "Abstract".to_string(),
                keywords: vec![],
                section: "Notes".to_string(),
            },
            as_draft: true,
        }
        .execute(&f.author, &mut f.state)
        .unwrap();
        let id = ManuscriptId::parse(&events[0].entity_id).unwrap();
        assert_eq!(f.status(id), ManuscriptStatus::Draft);

        // Reviewers cannot be assigned to drafts
        let err = f.assign(id, f.r1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        Command::SubmitManuscript { manuscript_id: id }
            .execute(&f.author, &mut f.state)
            .unwrap();
        assert_eq!(f.status(id), ManuscriptStatus::Submitted);
    }

    #[test]
    fn test_first_assignment_starts_review() {
        let mut f = Fixture::new();
        let id = f.create();

        let events = f.assign(id, f.r1).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(f.status(id), ManuscriptStatus::UnderReview);

        let events = f.assign(id, f.r2).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(f.state.reviews_for(&id).len(), 2);
        assert!(f.state.reviews_for(&id).iter().all(|r| r.is_pending()));
    }

    #[test]
    fn test_assignment_errors() {
        let mut f = Fixture::new();
        let id = f.create();

        let err = Command::AssignReviewer {
            manuscript_id: id,
            reviewer_id: f.r1.id,
        }
        .execute(&f.author, &mut f.state)
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        let err = f.assign(ManuscriptId::new(), f.r1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let ghost = Principal::new(UserId::new(), Role::Reviewer);
        let err = f.assign(id, ghost).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = f.assign(id, f.admin).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRole);

        f.assign(id, f.r1).unwrap();
        let err = f.assign(id, f.r1).unwrap_err();
        assert!(matches!(
            err,
            ReviewError::Assignment(AssignmentError::AlreadyAssigned { .. })
        ));
        assert_eq!(f.state.reviews_for(&id).len(), 1);
    }

    #[test]
    fn test_self_assignment_rejected() {
        let mut f = Fixture::new();
        // A reviewer who also writes manuscripts
        let dual = f.r1;
        f.state.users_mut().set_role(&dual.id, Role::Author).unwrap();
        let events = Command::CreateManuscript {
            journal_id: JournalId::new(),
            metadata: ManuscriptMetadata {
                title: "Own work".to_string(),
                abstract_text: "Abstract".to_string(),
                keywords: vec![],
                section: "Notes".to_string(),
            },
            as_draft: false,
        }
        .execute(&Principal::new(dual.id, Role::Author), &mut f.state)
        .unwrap();
        let id = ManuscriptId::parse(&events[0].entity_id).unwrap();
        f.state.users_mut().set_role(&dual.id, Role::Reviewer).unwrap();

        let err = f.assign(id, dual).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SelfAssignment);
        assert_eq!(f.status(id), ManuscriptStatus::Submitted);
    }

    #[test]
    fn test_accept_and_minor_accepts() {
        let mut f = Fixture::new();
        let id = f.create();
        f.assign(id, f.r1).unwrap();
        f.assign(id, f.r2).unwrap();

        f.review(id, f.r1, Recommendation::Accept).unwrap();
        // One assignment still open
        assert_eq!(f.status(id), ManuscriptStatus::UnderReview);

        f.review(id, f.r2, Recommendation::AcceptMinor).unwrap();
        assert_eq!(f.status(id), ManuscriptStatus::Accepted);
        assert!(f.state.reviews_for(&id).iter().all(|r| !r.is_pending()));
    }

    #[test]
    fn test_reject_wins_in_any_order() {
        for order in [
            [Recommendation::Accept, Recommendation::Reject],
            [Recommendation::Reject, Recommendation::Accept],
        ] {
            let mut f = Fixture::new();
            let id = f.create();
            f.review(id, f.r1, order[0]).unwrap();
            f.review(id, f.r2, order[1]).unwrap();
            assert_eq!(f.status(id), ManuscriptStatus::Rejected);
        }
    }

    #[test]
    fn test_author_cannot_review_own_manuscript() {
        let mut f = Fixture::new();
        let id = f.create();
        let author = f.author;
        let err = f.review(id, author, Recommendation::Accept).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        assert_eq!(f.state.review_count(), 0);
        assert_eq!(f.status(id), ManuscriptStatus::Submitted);
    }

    #[test]
    fn test_second_review_by_same_reviewer_conflicts() {
        let mut f = Fixture::new();
        let id = f.create();
        f.review(id, f.r1, Recommendation::Accept).unwrap();
        let err = f.review(id, f.r1, Recommendation::Reject).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(f.status(id), ManuscriptStatus::Accepted);
    }

    #[test]
    fn test_invalid_score_changes_nothing() {
        let mut f = Fixture::new();
        let id = f.create();
        f.assign(id, f.r1).unwrap();
        let r1 = f.r1;
        let err = Command::SubmitReview {
            manuscript_id: id,
            submission: ReviewSubmission {
                content: "Fine".to_string(),
                score: 11,
                recommendation: Recommendation::Accept,
                comments: None,
                is_confidential: false,
            },
        }
        .execute(&r1, &mut f.state)
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(f.state.reviews_for(&id)[0].is_pending());
    }

    #[test]
    fn test_deleting_reject_rederives_accept() {
        let mut f = Fixture::new();
        let id = f.create();
        f.review(id, f.r1, Recommendation::Accept).unwrap();
        let events = f.review(id, f.r2, Recommendation::Reject).unwrap();
        assert_eq!(f.status(id), ManuscriptStatus::Rejected);

        let reject_id = ReviewId(uuid::Uuid::parse_str(&events[0].entity_id).unwrap());
        let r2 = f.r2;
        Command::DeleteReview {
            review_id: reject_id,
        }
        .execute(&r2, &mut f.state)
        .unwrap();
        assert_eq!(f.status(id), ManuscriptStatus::Accepted);
    }

    #[test]
    fn test_update_review_rederives() {
        let mut f = Fixture::new();
        let id = f.create();
        let events = f.review(id, f.r1, Recommendation::Accept).unwrap();
        let review_id = ReviewId(uuid::Uuid::parse_str(&events[0].entity_id).unwrap());

        // Only the reviewer or an admin may change it
        let editor = f.editor;
        let err = Command::UpdateReview {
            review_id,
            changes: ReviewChanges {
                recommendation: Some(Recommendation::Reject),
                ..Default::default()
            },
        }
        .execute(&editor, &mut f.state)
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        let r1 = f.r1;
        Command::UpdateReview {
            review_id,
            changes: ReviewChanges {
                recommendation: Some(Recommendation::ReviseResubmit),
                ..Default::default()
            },
        }
        .execute(&r1, &mut f.state)
        .unwrap();
        assert_eq!(f.status(id), ManuscriptStatus::RevisionRequested);
    }

    #[test]
    fn test_revision_cycle_keeps_reviews() {
        let mut f = Fixture::new();
        let id = f.create();
        f.review(id, f.r1, Recommendation::ReviseResubmit).unwrap();
        assert_eq!(f.status(id), ManuscriptStatus::RevisionRequested);

        let events = Command::ResubmitManuscript {
            manuscript_id: id,
            changes: ManuscriptChanges {
                title: Some("Stable matchings, revised".to_string()),
                ..Default::default()
            },
        }
        .execute(&f.author, &mut f.state)
        .unwrap();
        assert_eq!(events.len(), 3);

        let manuscript = f.state.manuscript(&id).unwrap();
        assert_eq!(manuscript.status(), ManuscriptStatus::Submitted);
        assert_eq!(manuscript.revision_count, 1);
        assert_eq!(manuscript.metadata.title, "Stable matchings, revised");
        assert_eq!(f.state.reviews_for(&id).len(), 1);
    }

    #[test]
    fn test_resubmit_requires_revision_request() {
        let mut f = Fixture::new();
        let id = f.create();
        let err = Command::ResubmitManuscript {
            manuscript_id: id,
            changes: ManuscriptChanges::default(),
        }
        .execute(&f.author, &mut f.state)
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTransition);
    }

    #[test]
    fn test_publish_and_delete_rules() {
        let mut f = Fixture::new();
        let id = f.create();

        let err = Command::PublishManuscript { manuscript_id: id }
            .execute(&f.editor, &mut f.state)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTransition);

        f.review(id, f.r1, Recommendation::Accept).unwrap();
        let err = Command::PublishManuscript { manuscript_id: id }
            .execute(&f.author, &mut f.state)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        Command::PublishManuscript { manuscript_id: id }
            .execute(&f.editor, &mut f.state)
            .unwrap();
        assert_eq!(f.status(id), ManuscriptStatus::Published);
        assert!(f.state.manuscript(&id).unwrap().published_at.is_some());

        // Reviews are frozen once published
        let err = f.review(id, f.r2, Recommendation::Reject).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let err = Command::DeleteManuscript { manuscript_id: id }
            .execute(&f.admin, &mut f.state)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn test_late_assignment_reopens_accepted_manuscript() {
        let mut f = Fixture::new();
        let id = f.create();
        f.assign(id, f.r1).unwrap();
        f.review(id, f.r1, Recommendation::Accept).unwrap();
        assert_eq!(f.status(id), ManuscriptStatus::Accepted);

        let events = f.assign(id, f.r2).unwrap();
        assert_eq!(f.status(id), ManuscriptStatus::UnderReview);
        assert!(events.iter().any(|e| matches!(
            &e.payload,
            EventPayload::ManuscriptStatusChanged {
                from: ManuscriptStatus::Accepted,
                to: ManuscriptStatus::UnderReview,
                ..
            }
        )));

        let err = Command::PublishManuscript { manuscript_id: id }
            .execute(&f.editor, &mut f.state)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTransition);

        f.review(id, f.r2, Recommendation::AcceptMinor).unwrap();
        assert_eq!(f.status(id), ManuscriptStatus::Accepted);
        Command::PublishManuscript { manuscript_id: id }
            .execute(&f.editor, &mut f.state)
            .unwrap();
        assert_eq!(f.status(id), ManuscriptStatus::Published);
    }

    #[test]
    fn test_late_assignment_keeps_rejection() {
        let mut f = Fixture::new();
        let id = f.create();
        f.review(id, f.r1, Recommendation::Reject).unwrap();
        assert_eq!(f.status(id), ManuscriptStatus::Rejected);

        f.assign(id, f.r2).unwrap();
        assert_eq!(f.status(id), ManuscriptStatus::Rejected);
    }

    #[test]
    fn test_delete_manuscript_permissions() {
        let mut f = Fixture::new();
        let id = f.create();
        f.review(id, f.r1, Recommendation::Accept).unwrap();

        let err = Command::DeleteManuscript { manuscript_id: id }
            .execute(&f.editor, &mut f.state)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        Command::DeleteManuscript { manuscript_id: id }
            .execute(&f.author, &mut f.state)
            .unwrap();
        assert!(f.state.manuscript(&id).is_none());
        assert_eq!(f.state.review_count(), 0);
    }

    #[test]
    fn test_status_override() {
        let mut f = Fixture::new();
        let id = f.create();

        // Editors may change status but not metadata
        let err = Command::UpdateManuscript {
            manuscript_id: id,
            changes: ManuscriptChanges {
                title: Some("Edited".to_string()),
                ..Default::default()
            },
            status: None,
        }
        .execute(&f.editor, &mut f.state)
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        Command::UpdateManuscript {
            manuscript_id: id,
            changes: ManuscriptChanges::default(),
            status: Some(ManuscriptStatus::UnderReview),
        }
        .execute(&f.editor, &mut f.state)
        .unwrap();
        assert_eq!(f.status(id), ManuscriptStatus::UnderReview);

        // Authors may not override
        let err = Command::UpdateManuscript {
            manuscript_id: id,
            changes: ManuscriptChanges::default(),
            status: Some(ManuscriptStatus::Accepted),
        }
        .execute(&f.author, &mut f.state)
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        let err = Command::UpdateManuscript {
            manuscript_id: id,
            changes: ManuscriptChanges::default(),
            status: Some(ManuscriptStatus::Published),
        }
        .execute(&f.admin, &mut f.state)
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTransition);
        assert_eq!(f.status(id), ManuscriptStatus::UnderReview);
    }

    #[test]
    fn test_history_records_transitions() {
        let mut f = Fixture::new();
        let id = f.create();
        f.assign(id, f.r1).unwrap();
        f.review(id, f.r1, Recommendation::Accept).unwrap();

        let history = f.state.manuscript_history(&f.author, &id).unwrap();
        let causes: Vec<String> = history
            .iter()
            .filter_map(|e| match &e.payload {
                EventPayload::ManuscriptStatusChanged { cause, .. } => Some(cause.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(causes, vec!["reviewer_assigned", "reviews_aggregated"]);
        assert!(history.iter().all(|e| e.actor_id.is_some()));
    }

    #[test]
    fn test_user_management_admin_only() {
        let mut f = Fixture::new();
        let target = f.r2.id;

        let err = Command::ChangeUserRole {
            user_id: target,
            role: Role::Editor,
        }
        .execute(&f.editor, &mut f.state)
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        let events = Command::ChangeUserRole {
            user_id: target,
            role: Role::Editor,
        }
        .execute(&f.admin, &mut f.state)
        .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(f.state.users().get(&target).unwrap().role, Role::Editor);

        Command::DeleteUser { user_id: target }
            .execute(&f.admin, &mut f.state)
            .unwrap();
        assert!(f.state.users().get(&target).is_none());

        let err = Command::DeleteUser { user_id: target }
            .execute(&f.admin, &mut f.state)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_rollback_restores_reviews_and_status() {
        let mut f = Fixture::new();
        let id = f.create();
        f.assign(id, f.r1).unwrap();
        f.assign(id, f.r2).unwrap();
        f.review(id, f.r1, Recommendation::Accept).unwrap();
        let sequence = f.state.events().current_sequence();

        let command = Command::SubmitReview {
            manuscript_id: id,
            submission: ReviewSubmission {
                content: "Fatal flaw in the proof.".to_string(),
                score: 2,
                recommendation: Recommendation::Reject,
                comments: None,
                is_confidential: false,
            },
        };
        let checkpoint = f.state.checkpoint(&command);
        command.execute(&f.r2, &mut f.state).unwrap();
        assert_eq!(f.status(id), ManuscriptStatus::Rejected);

        f.state.rollback(checkpoint);
        assert_eq!(f.status(id), ManuscriptStatus::UnderReview);
        assert!(f.state.review_by(&id, &f.r2.id).unwrap().is_pending());
        assert_eq!(f.state.reviews_for(&id).len(), 2);
        assert_eq!(f.state.events().current_sequence(), sequence);
    }

    #[test]
    fn test_rollback_removes_created_manuscript() {
        let mut f = Fixture::new();
        let command = Command::CreateManuscript {
            journal_id: JournalId::new(),
            metadata: ManuscriptMetadata {
                title: "Short-lived".to_string(),
                abstract_text: "Never stored.".to_string(),
                keywords: vec![],
                section: "Notes".to_string(),
            },
            as_draft: true,
        };
        let checkpoint = f.state.checkpoint(&command);
        let events = command.execute(&f.author, &mut f.state).unwrap();
        let id = ManuscriptId::parse(&events[0].entity_id).unwrap();

        f.state.rollback(checkpoint);
        assert!(f.state.manuscript(&id).is_none());
        assert!(f.state.events().is_empty());
    }

    #[test]
    fn test_rollback_restores_deleted_manuscript_and_user() {
        let mut f = Fixture::new();
        let id = f.create();
        f.assign(id, f.r1).unwrap();

        let delete = Command::DeleteManuscript { manuscript_id: id };
        let checkpoint = f.state.checkpoint(&delete);
        delete.execute(&f.author, &mut f.state).unwrap();
        f.state.rollback(checkpoint);
        assert_eq!(f.status(id), ManuscriptStatus::UnderReview);
        assert_eq!(f.state.reviews_for(&id).len(), 1);

        let delete_user = Command::DeleteUser { user_id: f.r2.id };
        let checkpoint = f.state.checkpoint(&delete_user);
        delete_user.execute(&f.admin, &mut f.state).unwrap();
        f.state.rollback(checkpoint);
        assert_eq!(f.state.users().get(&f.r2.id).unwrap().role, Role::Reviewer);
    }

    #[test]
    fn test_lock_key_follows_review() {
        let mut f = Fixture::new();
        let id = f.create();
        let events = f.review(id, f.r1, Recommendation::Accept).unwrap();
        let review_id = ReviewId(uuid::Uuid::parse_str(&events[0].entity_id).unwrap());

        assert_eq!(Command::DeleteReview { review_id }.lock_key(&f.state), Some(id));
        assert_eq!(
            Command::DeleteReview {
                review_id: ReviewId::new()
            }
            .lock_key(&f.state),
            None
        );
        assert_eq!(
            Command::DeleteUser { user_id: f.r1.id }.lock_key(&f.state),
            None
        );
    }
}

//! Authorization gate.
//!
//! One decision table for every action in the workflow. Each action grants a
//! set of roles unconditionally and may additionally grant (or, for review
//! creation, forbid) access based on ownership facts about the resource.
//! The gate is pure: it never reads or writes workflow state.

use bitflags::bitflags;

use crate::error::{Result, ReviewError};
use crate::id::UserId;
use crate::principal::Principal;

bitflags! {
    /// Set of roles granted an action regardless of ownership.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct Roles: u8 {
        const AUTHOR = 0b0001;
        const REVIEWER = 0b0010;
        const EDITOR = 0b0100;
        const ADMIN = 0b1000;
    }
}

impl Roles {
    /// Editorial staff
    pub const STAFF: Roles = Roles::EDITOR.union(Roles::ADMIN);

    /// Anyone allowed to write a review, subject to the not-the-author rule
    pub const REVIEWING: Roles = Roles::REVIEWER.union(Roles::STAFF);
}

/// An operation subject to authorization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    CreateManuscript,
    ReadManuscript,
    UpdateManuscript,
    OverrideStatus,
    DeleteManuscript,
    SubmitManuscript,
    PublishManuscript,
    UploadFile,
    DownloadFile,
    CreateReview,
    ReadReview,
    UpdateReview,
    DeleteReview,
    AssignReviewer,
    ListAllManuscripts,
    ListAllReviews,
    ListUsers,
    ChangeUserRole,
    DeleteUser,
}

/// How ownership of the resource affects the decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ownership {
    /// Ownership is irrelevant
    Ignored,
    /// The manuscript's author is also allowed
    ManuscriptAuthor,
    /// The review's own reviewer is also allowed
    ReviewOwner,
    /// The review's reviewer, or the manuscript's author for non-confidential reviews
    ReviewReader,
    /// The manuscript's author is denied even when their role qualifies
    NotManuscriptAuthor,
}

impl Action {
    fn rule(&self) -> (Roles, Ownership) {
        match self {
            Action::CreateManuscript => (Roles::AUTHOR | Roles::ADMIN, Ownership::Ignored),
            Action::ReadManuscript => (Roles::STAFF, Ownership::ManuscriptAuthor),
            Action::UpdateManuscript => (Roles::ADMIN, Ownership::ManuscriptAuthor),
            Action::OverrideStatus => (Roles::STAFF, Ownership::Ignored),
            Action::DeleteManuscript => (Roles::ADMIN, Ownership::ManuscriptAuthor),
            Action::SubmitManuscript => (Roles::ADMIN, Ownership::ManuscriptAuthor),
            Action::PublishManuscript => (Roles::STAFF, Ownership::Ignored),
            Action::UploadFile => (Roles::STAFF, Ownership::ManuscriptAuthor),
            Action::DownloadFile => (Roles::REVIEWING, Ownership::ManuscriptAuthor),
            Action::CreateReview => (Roles::REVIEWING, Ownership::NotManuscriptAuthor),
            Action::ReadReview => (Roles::STAFF, Ownership::ReviewReader),
            Action::UpdateReview | Action::DeleteReview => (Roles::ADMIN, Ownership::ReviewOwner),
            Action::AssignReviewer => (Roles::STAFF, Ownership::Ignored),
            Action::ListAllManuscripts | Action::ListAllReviews => {
                (Roles::STAFF, Ownership::Ignored)
            }
            Action::ListUsers | Action::ChangeUserRole | Action::DeleteUser => {
                (Roles::ADMIN, Ownership::Ignored)
            }
        }
    }

    /// Human-readable verb phrase used in denial messages
    pub fn describe(&self) -> &'static str {
        match self {
            Action::CreateManuscript => "create manuscripts",
            Action::ReadManuscript => "read this manuscript",
            Action::UpdateManuscript => "update this manuscript",
            Action::OverrideStatus => "change the manuscript status",
            Action::DeleteManuscript => "delete this manuscript",
            Action::SubmitManuscript => "submit this manuscript",
            Action::PublishManuscript => "publish manuscripts",
            Action::UploadFile => "upload files for this manuscript",
            Action::DownloadFile => "download files for this manuscript",
            Action::CreateReview => "review this manuscript",
            Action::ReadReview => "read this review",
            Action::UpdateReview => "update this review",
            Action::DeleteReview => "delete this review",
            Action::AssignReviewer => "assign reviewers",
            Action::ListAllManuscripts => "list all manuscripts",
            Action::ListAllReviews => "list all reviews",
            Action::ListUsers => "list users",
            Action::ChangeUserRole => "change user roles",
            Action::DeleteUser => "delete users",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.describe())
    }
}

/// Ownership facts about the resource an action targets
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Resource {
    pub manuscript_author: Option<UserId>,
    pub review_owner: Option<UserId>,
    pub confidential: bool,
}

impl Resource {
    /// No resource (collection-level actions)
    pub fn none() -> Self {
        Self::default()
    }

    /// A manuscript authored by `author`
    pub fn manuscript(author: UserId) -> Self {
        Self {
            manuscript_author: Some(author),
            ..Self::default()
        }
    }

    /// A review written by `reviewer` on a manuscript authored by `author`
    pub fn review(author: UserId, reviewer: UserId, confidential: bool) -> Self {
        Self {
            manuscript_author: Some(author),
            review_owner: Some(reviewer),
            confidential,
        }
    }
}

/// Decide whether `principal` may perform `action` on `resource`
pub fn can(principal: &Principal, action: Action, resource: &Resource) -> bool {
    let (roles, ownership) = action.rule();
    let role_granted = roles.contains(principal.role.flag());
    let is_author = resource.manuscript_author == Some(principal.id);
    let is_reviewer = resource.review_owner == Some(principal.id);

    match ownership {
        Ownership::Ignored => role_granted,
        Ownership::ManuscriptAuthor => role_granted || is_author,
        Ownership::ReviewOwner => role_granted || is_reviewer,
        Ownership::ReviewReader => {
            role_granted || is_reviewer || (is_author && !resource.confidential)
        }
        Ownership::NotManuscriptAuthor => role_granted && !is_author,
    }
}

/// Like [`can`], but returns `Forbidden` on denial
pub fn authorize(principal: &Principal, action: Action, resource: &Resource) -> Result<()> {
    if can(principal, action, resource) {
        Ok(())
    } else {
        tracing::debug!(
            user = %principal.id,
            role = %principal.role,
            ?action,
            "authorization denied"
        );
        Err(ReviewError::forbidden(action))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::principal::Role;

    fn principal(role: Role) -> Principal {
        Principal::new(UserId::new(), role)
    }

    #[test]
    fn test_create_manuscript_roles() {
        let none = Resource::none();
        assert!(can(&principal(Role::Author), Action::CreateManuscript, &none));
        assert!(can(&principal(Role::Admin), Action::CreateManuscript, &none));
        assert!(!can(&principal(Role::Reviewer), Action::CreateManuscript, &none));
        assert!(!can(&principal(Role::Editor), Action::CreateManuscript, &none));
    }

    #[test]
    fn test_manuscript_ownership() {
        let owner = principal(Role::Author);
        let stranger = principal(Role::Author);
        let editor = principal(Role::Editor);
        let admin = principal(Role::Admin);
        let res = Resource::manuscript(owner.id);

        assert!(can(&owner, Action::ReadManuscript, &res));
        assert!(can(&owner, Action::UpdateManuscript, &res));
        assert!(can(&owner, Action::DeleteManuscript, &res));
        assert!(!can(&owner, Action::OverrideStatus, &res));

        assert!(!can(&stranger, Action::ReadManuscript, &res));
        assert!(!can(&stranger, Action::DeleteManuscript, &res));

        assert!(can(&editor, Action::ReadManuscript, &res));
        assert!(can(&editor, Action::OverrideStatus, &res));
        assert!(!can(&editor, Action::UpdateManuscript, &res));
        assert!(!can(&editor, Action::DeleteManuscript, &res));

        assert!(can(&admin, Action::DeleteManuscript, &res));
        assert!(can(&admin, Action::OverrideStatus, &res));
    }

    #[test]
    fn test_file_access() {
        let owner = principal(Role::Author);
        let res = Resource::manuscript(owner.id);
        let reviewer = principal(Role::Reviewer);

        assert!(can(&owner, Action::UploadFile, &res));
        assert!(can(&principal(Role::Editor), Action::UploadFile, &res));
        assert!(!can(&reviewer, Action::UploadFile, &res));
        assert!(can(&reviewer, Action::DownloadFile, &res));
        assert!(!can(&principal(Role::Author), Action::DownloadFile, &res));
    }

    #[test]
    fn test_author_cannot_review_own_manuscript() {
        // Even an admin who wrote the manuscript is denied
        let admin_author = principal(Role::Admin);
        let res = Resource::manuscript(admin_author.id);
        assert!(!can(&admin_author, Action::CreateReview, &res));

        let reviewer = principal(Role::Reviewer);
        assert!(can(&reviewer, Action::CreateReview, &res));
        assert!(!can(&principal(Role::Author), Action::CreateReview, &res));
    }

    #[test]
    fn test_review_mutation_limited_to_owner_and_admin() {
        let author = principal(Role::Author);
        let reviewer = principal(Role::Reviewer);
        let other_reviewer = principal(Role::Reviewer);
        let res = Resource::review(author.id, reviewer.id, false);

        assert!(can(&reviewer, Action::UpdateReview, &res));
        assert!(can(&reviewer, Action::DeleteReview, &res));
        assert!(!can(&other_reviewer, Action::UpdateReview, &res));
        assert!(!can(&principal(Role::Editor), Action::UpdateReview, &res));
        assert!(can(&principal(Role::Admin), Action::DeleteReview, &res));
    }

    #[test]
    fn test_confidential_review_hidden_from_author() {
        let author = principal(Role::Author);
        let reviewer = principal(Role::Reviewer);

        let open = Resource::review(author.id, reviewer.id, false);
        let confidential = Resource::review(author.id, reviewer.id, true);

        assert!(can(&author, Action::ReadReview, &open));
        assert!(!can(&author, Action::ReadReview, &confidential));
        assert!(can(&reviewer, Action::ReadReview, &confidential));
        assert!(can(&principal(Role::Editor), Action::ReadReview, &confidential));
    }

    #[test]
    fn test_admin_only_user_management() {
        let none = Resource::none();
        for role in [Role::Author, Role::Reviewer, Role::Editor] {
            assert!(!can(&principal(role), Action::ChangeUserRole, &none));
            assert!(!can(&principal(role), Action::DeleteUser, &none));
        }
        assert!(can(&principal(Role::Admin), Action::ChangeUserRole, &none));
        assert!(can(&principal(Role::Admin), Action::DeleteUser, &none));
    }

    #[test]
    fn test_authorize_returns_forbidden() {
        let err = authorize(&principal(Role::Author), Action::AssignReviewer, &Resource::none())
            .unwrap_err();
        assert!(matches!(err, ReviewError::Forbidden(_)));
    }
}

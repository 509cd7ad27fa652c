//! The acting principal for a request

use serde::{Deserialize, Serialize};

use crate::authz::Roles;
use crate::error::{Result, ReviewError};
use crate::id::UserId;

/// Role of a user in the editorial process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Author,
    Reviewer,
    Editor,
    Admin,
}

impl Role {
    /// All roles
    pub const ALL: [Role; 4] = [Role::Author, Role::Reviewer, Role::Editor, Role::Admin];

    /// Wire name of the role
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Author => "author",
            Role::Reviewer => "reviewer",
            Role::Editor => "editor",
            Role::Admin => "admin",
        }
    }

    /// The single-role flag for the authorization table
    pub fn flag(&self) -> Roles {
        match self {
            Role::Author => Roles::AUTHOR,
            Role::Reviewer => Roles::REVIEWER,
            Role::Editor => Roles::EDITOR,
            Role::Admin => Roles::ADMIN,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = ReviewError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "author" => Ok(Role::Author),
            "reviewer" => Ok(Role::Reviewer),
            "editor" => Ok(Role::Editor),
            "admin" => Ok(Role::Admin),
            other => Err(ReviewError::Validation(format!("unknown role '{}'", other))),
        }
    }
}

/// The authenticated actor performing an operation.
///
/// Resolved by the identity collaborator once per request and passed by
/// reference into every core call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: UserId,
    pub role: Role,
}

impl Principal {
    pub fn new(id: UserId, role: Role) -> Self {
        Self { id, role }
    }
}

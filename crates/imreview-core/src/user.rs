//! User directory
//!
//! Profile management lives elsewhere. The workflow only needs to know that
//! a user exists and which role it holds.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ReviewError};
use crate::id::UserId;
use crate::principal::{Principal, Role};

/// A directory entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub role: Role,
}

impl User {
    pub fn new(name: impl Into<String>, email: impl Into<String>, role: Role) -> Self {
        Self {
            id: UserId::new(),
            name: name.into(),
            email: email.into(),
            role,
        }
    }

    /// The principal this user acts as
    pub fn principal(&self) -> Principal {
        Principal::new(self.id, self.role)
    }
}

/// In-memory index of known users
#[derive(Debug, Clone, Default)]
pub struct UserDirectory {
    users: HashMap<UserId, User>,
}

impl UserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a user
    pub fn insert(&mut self, user: User) {
        self.users.insert(user.id, user);
    }

    pub fn get(&self, id: &UserId) -> Option<&User> {
        self.users.get(id)
    }

    /// Look up a user, failing with `NotFound`
    pub fn require(&self, id: &UserId) -> Result<&User> {
        self.users
            .get(id)
            .ok_or_else(|| ReviewError::NotFound(format!("user {}", id)))
    }

    pub fn remove(&mut self, id: &UserId) -> Option<User> {
        self.users.remove(id)
    }

    /// Change a user's role, returning the previous one
    pub fn set_role(&mut self, id: &UserId, role: Role) -> Result<Role> {
        let user = self
            .users
            .get_mut(id)
            .ok_or_else(|| ReviewError::NotFound(format!("user {}", id)))?;
        Ok(std::mem::replace(&mut user.role, role))
    }

    /// All users, sorted by name
    pub fn all(&self) -> Vec<&User> {
        let mut users: Vec<&User> = self.users.values().collect();
        users.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        users
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

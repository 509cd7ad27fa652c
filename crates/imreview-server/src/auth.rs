//! Authentication
//!
//! Tokens are issued elsewhere. This module only maps a bearer token to a
//! user and resolves that user's current role into a [`Principal`].

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, Request},
    middleware::Next,
    response::Response,
};

use imreview_core::{ConfigError, IdentityConfig, Principal, ReviewError, UserId};

use crate::response::ApiError;
use crate::AppState;

/// Resolves bearer tokens to users
pub trait IdentityProvider: Send + Sync {
    /// The user a token belongs to, if it is valid
    fn user_for_token(&self, token: &str) -> Option<UserId>;
}

/// Fixed token table loaded from configuration
#[derive(Debug, Default, Clone)]
pub struct StaticIdentityProvider {
    tokens: HashMap<String, UserId>,
}

impl StaticIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_identities(identities: &[IdentityConfig]) -> Result<Self, ConfigError> {
        let mut provider = Self::new();
        for identity in identities {
            let user = identity.user()?;
            provider.insert(identity.token.clone(), user.id);
        }
        Ok(provider)
    }

    pub fn insert(&mut self, token: impl Into<String>, user: UserId) {
        self.tokens.insert(token.into(), user);
    }
}

impl IdentityProvider for StaticIdentityProvider {
    fn user_for_token(&self, token: &str) -> Option<UserId> {
        self.tokens.get(token).copied()
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Token-based authentication middleware.
///
/// The role comes from the user directory rather than the token table, so
/// role changes apply to the next request and deleted users are locked out.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let user_id = bearer_token(request.headers())
        .and_then(|token| state.identities.user_for_token(token))
        .ok_or(ReviewError::Unauthenticated)?;

    let principal = {
        let workflow = state.workflow.read().await;
        workflow.users().get(&user_id).map(|user| user.principal())
    }
    .ok_or(ReviewError::Unauthenticated)?;

    tracing::debug!(user = %principal.id, role = %principal.role, "request authenticated");
    request.extensions_mut().insert::<Principal>(principal);
    Ok(next.run(request).await)
}

//! imreview server - peer-review HTTP API
//!
//! Axum router over the workflow engine in `imreview-core`.

pub mod auth;
pub mod http;
pub mod locks;
pub mod response;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use imreview_core::{Command, Principal, ReviewConfig, ReviewError, WorkflowEvent, WorkflowState};

use crate::auth::{IdentityProvider, StaticIdentityProvider};
use crate::locks::ManuscriptLocks;

/// Shared application state
pub struct AppState {
    pub workflow: RwLock<WorkflowState>,
    pub identities: Box<dyn IdentityProvider>,
    pub locks: ManuscriptLocks,
    #[cfg(feature = "sqlite")]
    pub repository: Option<std::sync::Mutex<imreview_core::Repository>>,
}

impl AppState {
    /// In-memory state seeded with the configured identities
    pub fn new(config: &ReviewConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let mut workflow = WorkflowState::new(config.validation.clone());
        seed_users(&mut workflow, config)?;

        Ok(Self {
            workflow: RwLock::new(workflow),
            identities: Box::new(StaticIdentityProvider::from_identities(&config.identities)?),
            locks: ManuscriptLocks::from_config(&config.concurrency),
            #[cfg(feature = "sqlite")]
            repository: None,
        })
    }

    /// Create with persistence enabled
    ///
    /// Loads the full state from the database, then seeds configured
    /// identities that are not stored yet.
    #[cfg(feature = "sqlite")]
    pub fn with_persistence(
        config: &ReviewConfig,
        db_path: impl AsRef<std::path::Path>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let repository = imreview_core::Repository::new(&db_path)?;
        let mut workflow =
            WorkflowState::load_from_repository(&repository, config.validation.clone())?;
        for user in seed_users(&mut workflow, config)? {
            repository.save_user(&user)?;
        }
        tracing::info!("Loaded persisted state from {:?}", db_path.as_ref());

        Ok(Self {
            workflow: RwLock::new(workflow),
            identities: Box::new(StaticIdentityProvider::from_identities(&config.identities)?),
            locks: ManuscriptLocks::from_config(&config.concurrency),
            repository: Some(std::sync::Mutex::new(repository)),
        })
    }

    /// Build the state the configuration asks for
    pub fn from_config(config: &ReviewConfig) -> Result<Self, Box<dyn std::error::Error>> {
        match config.storage.database_path.as_deref() {
            #[cfg(feature = "sqlite")]
            Some(path) => Self::with_persistence(config, path),
            #[cfg(not(feature = "sqlite"))]
            Some(_) => {
                tracing::warn!("database_path set but sqlite support is disabled, running in memory");
                Self::new(config)
            }
            None => Self::new(config),
        }
    }

    /// Run a command under the manuscript lock and persist its effects.
    pub async fn execute(
        &self,
        principal: &Principal,
        command: Command,
    ) -> Result<Vec<WorkflowEvent>, ReviewError> {
        self.execute_with(principal, command, |_, events| Ok(events.to_vec()))
            .await
    }

    /// Like [`AppState::execute`], then build a result with `view` before the
    /// write lock is released, so it sees exactly what the command produced.
    pub async fn execute_with<T>(
        &self,
        principal: &Principal,
        command: Command,
        view: impl FnOnce(&WorkflowState, &[WorkflowEvent]) -> Result<T, ReviewError>,
    ) -> Result<T, ReviewError> {
        let key = {
            let workflow = self.workflow.read().await;
            command.lock_key(&workflow)
        };
        let _guard = match key {
            Some(id) => Some(self.locks.acquire(id).await?),
            None => None,
        };

        let mut workflow = self.workflow.write().await;
        let events = self.apply(principal, command, &mut workflow)?;
        view(&*workflow, &events)
    }

    /// Execute and persist. When persistence fails the command's changes are
    /// rolled back, so memory and storage never disagree.
    fn apply(
        &self,
        principal: &Principal,
        command: Command,
        workflow: &mut WorkflowState,
    ) -> Result<Vec<WorkflowEvent>, ReviewError> {
        let name = command.name();

        #[cfg(feature = "sqlite")]
        if let Some(repo) = &self.repository {
            let checkpoint = workflow.checkpoint(&command);
            let events = command.execute(principal, workflow)?;
            let persisted = repo
                .lock()
                .map_err(|e| {
                    ReviewError::from(imreview_core::PersistenceError::Database(format!(
                        "Mutex poisoned: {}",
                        e
                    )))
                })
                .and_then(|repo| repo.persist(&events, workflow));
            if let Err(e) = persisted {
                workflow.rollback(checkpoint);
                return Err(e);
            }
            tracing::debug!(command = name, events = events.len(), "command persisted");
            return Ok(events);
        }

        let events = command.execute(principal, workflow)?;
        tracing::debug!(command = name, events = events.len(), "command executed");
        Ok(events)
    }
}

/// Insert configured users missing from the directory, returning them
fn seed_users(
    workflow: &mut WorkflowState,
    config: &ReviewConfig,
) -> Result<Vec<imreview_core::User>, imreview_core::ConfigError> {
    let mut seeded = Vec::new();
    for identity in &config.identities {
        let user = identity.user()?;
        if workflow.users().get(&user.id).is_none() {
            workflow.upsert_user(user.clone());
            seeded.push(user);
        }
    }
    Ok(seeded)
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        // Manuscript endpoints
        .route(
            "/manuscripts",
            get(http::list_manuscripts).post(http::create_manuscript),
        )
        .route(
            "/manuscripts/{id}",
            get(http::get_manuscript)
                .put(http::update_manuscript)
                .delete(http::delete_manuscript),
        )
        .route("/manuscripts/{id}/history", get(http::get_history))
        .route("/manuscripts/{id}/submit", post(http::submit_manuscript))
        .route("/manuscripts/{id}/resubmit", post(http::resubmit_manuscript))
        .route("/manuscripts/{id}/publish", post(http::publish_manuscript))
        .route(
            "/manuscripts/{id}/assign-reviewer/{user_id}",
            post(http::assign_reviewer),
        )
        .route(
            "/manuscripts/{id}/reviews",
            get(http::list_manuscript_reviews).post(http::create_review),
        )
        // Review endpoints
        .route("/reviews", get(http::list_reviews))
        .route(
            "/reviews/{id}",
            get(http::get_review)
                .put(http::update_review)
                .delete(http::delete_review),
        )
        // User endpoints
        .route("/auth/me", get(http::me))
        .route("/users", get(http::list_users))
        .route("/users/{id}", axum::routing::delete(http::delete_user))
        .route("/users/{id}/role", put(http::change_role))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ));

    Router::new()
        .route("/", get(http::health))
        .nest("/api/v1", api)
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the server
pub async fn serve(addr: &str, state: Arc<AppState>) -> Result<(), Box<dyn std::error::Error>> {
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("imreview server listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

//! HTTP endpoint handlers

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Path, State},
    response::IntoResponse,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use imreview_core::{
    authorize, Action, Command, EntityType, EventPayload, JournalId, Manuscript,
    ManuscriptChanges, ManuscriptId, ManuscriptMetadata, ManuscriptStatus, Principal,
    Recommendation, Resource, Review, ReviewChanges, ReviewError, ReviewId, ReviewSubmission,
    Role, User, UserId, WorkflowEvent, WorkflowState,
};

use crate::response::{created, ok, ApiError, ApiResponse, ApiResult};
use crate::AppState;

// ==================== DTOs ====================

/// Manuscript as returned by the API
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManuscriptDto {
    pub id: String,
    pub author_id: String,
    pub journal_id: String,
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub keywords: Vec<String>,
    pub section: String,
    pub status: String,
    pub status_label: String,
    pub revision_count: u32,
    pub submitted_at: Option<DateTime<Utc>>,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Manuscript> for ManuscriptDto {
    fn from(m: &Manuscript) -> Self {
        let status = m.status();
        Self {
            id: m.id.to_string(),
            author_id: m.author_id.to_string(),
            journal_id: m.journal_id.to_string(),
            title: m.metadata.title.clone(),
            abstract_text: m.metadata.abstract_text.clone(),
            keywords: m.metadata.keywords.clone(),
            section: m.metadata.section.clone(),
            status: status.to_string(),
            status_label: status.ui_label().to_string(),
            revision_count: m.revision_count,
            submitted_at: m.submitted_at,
            published_at: m.published_at,
            created_at: m.created_at,
            updated_at: m.updated_at,
        }
    }
}

/// Review as returned by the API; open assignments report `pending`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewDto {
    pub id: String,
    pub manuscript_id: String,
    pub reviewer_id: String,
    pub state: &'static str,
    pub content: Option<String>,
    pub score: Option<u8>,
    pub recommendation: &'static str,
    pub comments: Option<String>,
    pub is_confidential: bool,
    pub assigned_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Review> for ReviewDto {
    fn from(r: &Review) -> Self {
        let assessment = r.body.assessment();
        Self {
            id: r.id.to_string(),
            manuscript_id: r.manuscript_id.to_string(),
            reviewer_id: r.reviewer_id.to_string(),
            state: if r.is_pending() { "pending" } else { "completed" },
            content: assessment.map(|a| a.content.clone()),
            score: assessment.map(|a| a.score.value()),
            recommendation: r.body.recommendation_label(),
            comments: assessment.and_then(|a| a.comments.clone()),
            is_confidential: r.is_confidential,
            assigned_at: r.assigned_at,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDto {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
}

impl From<&User> for UserDto {
    fn from(u: &User) -> Self {
        Self {
            id: u.id.to_string(),
            name: u.name.clone(),
            email: u.email.clone(),
            role: u.role,
        }
    }
}

/// One status-history entry
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub from: Option<ManuscriptStatus>,
    pub to: ManuscriptStatus,
    pub cause: String,
    pub actor_id: Option<String>,
}

impl HistoryEntry {
    fn from_event(event: &WorkflowEvent) -> Option<Self> {
        let (from, to, cause) = match &event.payload {
            EventPayload::ManuscriptCreated { status, .. } => (None, *status, "created".to_string()),
            EventPayload::ManuscriptStatusChanged { from, to, cause } => {
                (Some(*from), *to, cause.clone())
            }
            _ => return None,
        };
        Some(Self {
            sequence: event.sequence,
            timestamp: event.timestamp,
            from,
            to,
            cause,
            actor_id: event.actor_id.map(|id| id.to_string()),
        })
    }
}

// ==================== Requests ====================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateManuscriptRequest {
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub section: String,
    pub journal_id: String,
    #[serde(default)]
    pub as_draft: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateManuscriptRequest {
    pub title: Option<String>,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    pub keywords: Option<Vec<String>>,
    pub section: Option<String>,
    pub status: Option<String>,
}

impl UpdateManuscriptRequest {
    fn changes(&self) -> ManuscriptChanges {
        ManuscriptChanges {
            title: self.title.clone(),
            abstract_text: self.abstract_text.clone(),
            keywords: self.keywords.clone(),
            section: self.section.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitReviewRequest {
    pub content: String,
    pub score: i64,
    pub recommendation: String,
    pub comments: Option<String>,
    #[serde(default)]
    pub is_confidential: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateReviewRequest {
    pub content: Option<String>,
    pub score: Option<i64>,
    pub recommendation: Option<String>,
    pub comments: Option<String>,
    pub is_confidential: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct ChangeRoleRequest {
    pub role: String,
}

// ==================== Helpers ====================

fn manuscript_id(raw: &str) -> Result<ManuscriptId, ApiError> {
    Ok(ManuscriptId::parse(raw)?)
}

fn review_id(raw: &str) -> Result<ReviewId, ApiError> {
    Ok(ReviewId::parse(raw)?)
}

fn user_id(raw: &str) -> Result<UserId, ApiError> {
    Ok(UserId::parse(raw)?)
}

/// Id of the first manuscript an event batch touched
fn created_manuscript(events: &[WorkflowEvent]) -> Result<ManuscriptId, ReviewError> {
    events
        .iter()
        .find(|e| e.entity_type == EntityType::Manuscript)
        .ok_or_else(|| ReviewError::Conflict("command produced no manuscript".to_string()))
        .and_then(|e| ManuscriptId::parse(&e.entity_id))
}

fn manuscript_view(workflow: &WorkflowState, id: &ManuscriptId) -> Result<ManuscriptDto, ReviewError> {
    workflow.require_manuscript(id).map(ManuscriptDto::from)
}

/// The review a reviewer holds after an assignment or submission
fn review_view(
    workflow: &WorkflowState,
    manuscript_id: &ManuscriptId,
    reviewer_id: &UserId,
) -> Result<ReviewDto, ReviewError> {
    workflow
        .review_by(manuscript_id, reviewer_id)
        .map(ReviewDto::from)
        .ok_or_else(|| ReviewError::NotFound(format!("review by {}", reviewer_id)))
}

// ==================== System ====================

/// Health banner
pub async fn health() -> impl IntoResponse {
    ok(ApiResponse::message("imreview API is running"))
}

/// The resolved principal
pub async fn me(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<impl IntoResponse> {
    let workflow = state.workflow.read().await;
    let user = workflow.users().require(&principal.id)?;
    Ok(ok(ApiResponse::data(UserDto::from(user))))
}

// ==================== Manuscripts ====================

/// List manuscripts visible to the caller
pub async fn list_manuscripts(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<impl IntoResponse> {
    let workflow = state.workflow.read().await;
    let items: Vec<ManuscriptDto> = workflow
        .visible_manuscripts(&principal)
        .into_iter()
        .map(ManuscriptDto::from)
        .collect();
    Ok(ok(ApiResponse::list(items)))
}

pub async fn get_manuscript(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let id = manuscript_id(&id)?;
    let workflow = state.workflow.read().await;
    let manuscript = workflow.read_manuscript(&principal, &id)?;
    Ok(ok(ApiResponse::data(ManuscriptDto::from(manuscript))))
}

/// Create a manuscript owned by the caller
pub async fn create_manuscript(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    payload: Result<Json<CreateManuscriptRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(request) = payload?;
    let command = Command::CreateManuscript {
        journal_id: JournalId::parse(&request.journal_id)?,
        metadata: ManuscriptMetadata {
            title: request.title,
            abstract_text: request.abstract_text,
            keywords: request.keywords,
            section: request.section,
        },
        as_draft: request.as_draft,
    };
    let dto = state
        .execute_with(&principal, command, |workflow, events| {
            manuscript_view(workflow, &created_manuscript(events)?)
        })
        .await?;
    Ok(created(dto))
}

/// Update metadata and optionally override the status
pub async fn update_manuscript(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    payload: Result<Json<UpdateManuscriptRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let id = manuscript_id(&id)?;
    let Json(request) = payload?;
    let status = request
        .status
        .as_deref()
        .map(str::parse::<ManuscriptStatus>)
        .transpose()?;
    let command = Command::UpdateManuscript {
        manuscript_id: id,
        changes: request.changes(),
        status,
    };
    let dto = state
        .execute_with(&principal, command, |workflow, _| manuscript_view(workflow, &id))
        .await?;
    Ok(ok(ApiResponse::data(dto)))
}

pub async fn delete_manuscript(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let manuscript_id = manuscript_id(&id)?;
    state
        .execute(&principal, Command::DeleteManuscript { manuscript_id })
        .await?;
    Ok(ok(ApiResponse::message("Manuscript deleted")))
}

/// Status-change history
pub async fn get_history(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let id = manuscript_id(&id)?;
    let workflow = state.workflow.read().await;
    let entries: Vec<HistoryEntry> = workflow
        .manuscript_history(&principal, &id)?
        .into_iter()
        .filter_map(HistoryEntry::from_event)
        .collect();
    Ok(ok(ApiResponse::list(entries)))
}

pub async fn submit_manuscript(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let manuscript_id = manuscript_id(&id)?;
    let dto = state
        .execute_with(
            &principal,
            Command::SubmitManuscript { manuscript_id },
            |workflow, _| manuscript_view(workflow, &manuscript_id),
        )
        .await?;
    Ok(ok(ApiResponse::data(dto)))
}

/// Resubmit after revision; the body with revised metadata is optional
pub async fn resubmit_manuscript(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let manuscript_id = manuscript_id(&id)?;
    let request: UpdateManuscriptRequest = if body.iter().all(u8::is_ascii_whitespace) {
        UpdateManuscriptRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::bad_request(format!("Validation error: {}", e)))?
    };
    let command = Command::ResubmitManuscript {
        manuscript_id,
        changes: request.changes(),
    };
    let dto = state
        .execute_with(&principal, command, |workflow, _| {
            manuscript_view(workflow, &manuscript_id)
        })
        .await?;
    Ok(ok(ApiResponse::data(dto)))
}

pub async fn publish_manuscript(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let manuscript_id = manuscript_id(&id)?;
    let dto = state
        .execute_with(
            &principal,
            Command::PublishManuscript { manuscript_id },
            |workflow, _| manuscript_view(workflow, &manuscript_id),
        )
        .await?;
    Ok(ok(ApiResponse::data(dto)))
}

/// Assign a reviewer; answers with the pending review
pub async fn assign_reviewer(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path((id, reviewer)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    let manuscript_id = manuscript_id(&id)?;
    let reviewer_id = user_id(&reviewer)?;
    let dto = state
        .execute_with(
            &principal,
            Command::AssignReviewer {
                manuscript_id,
                reviewer_id,
            },
            |workflow, _| review_view(workflow, &manuscript_id, &reviewer_id),
        )
        .await?;
    Ok(created(dto))
}

// ==================== Reviews ====================

/// Submit the caller's review of a manuscript
pub async fn create_review(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    payload: Result<Json<SubmitReviewRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let manuscript_id = manuscript_id(&id)?;
    let Json(request) = payload?;
    let submission = ReviewSubmission {
        content: request.content,
        score: request.score,
        recommendation: request.recommendation.parse::<Recommendation>()?,
        comments: request.comments,
        is_confidential: request.is_confidential,
    };
    let dto = state
        .execute_with(
            &principal,
            Command::SubmitReview {
                manuscript_id,
                submission,
            },
            |workflow, _| review_view(workflow, &manuscript_id, &principal.id),
        )
        .await?;
    Ok(created(dto))
}

/// Reviews of one manuscript visible to the caller
pub async fn list_manuscript_reviews(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let id = manuscript_id(&id)?;
    let workflow = state.workflow.read().await;
    let items: Vec<ReviewDto> = workflow
        .visible_reviews_for(&principal, &id)?
        .into_iter()
        .map(ReviewDto::from)
        .collect();
    Ok(ok(ApiResponse::list(items)))
}

pub async fn list_reviews(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<impl IntoResponse> {
    let workflow = state.workflow.read().await;
    let items: Vec<ReviewDto> = workflow
        .visible_reviews(&principal)
        .into_iter()
        .map(ReviewDto::from)
        .collect();
    Ok(ok(ApiResponse::list(items)))
}

pub async fn get_review(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let id = review_id(&id)?;
    let workflow = state.workflow.read().await;
    let review = workflow.read_review(&principal, &id)?;
    Ok(ok(ApiResponse::data(ReviewDto::from(review))))
}

pub async fn update_review(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    payload: Result<Json<UpdateReviewRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let review_id = review_id(&id)?;
    let Json(request) = payload?;
    let changes = ReviewChanges {
        content: request.content,
        score: request.score,
        recommendation: request
            .recommendation
            .as_deref()
            .map(str::parse::<Recommendation>)
            .transpose()?,
        comments: request.comments,
        is_confidential: request.is_confidential,
    };
    let dto = state
        .execute_with(
            &principal,
            Command::UpdateReview { review_id, changes },
            |workflow, _| workflow.require_review(&review_id).map(ReviewDto::from),
        )
        .await?;
    Ok(ok(ApiResponse::data(dto)))
}

pub async fn delete_review(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let review_id = review_id(&id)?;
    state
        .execute(&principal, Command::DeleteReview { review_id })
        .await?;
    Ok(ok(ApiResponse::message("Review deleted")))
}

// ==================== Users ====================

/// All users (admin only)
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<impl IntoResponse> {
    authorize(&principal, Action::ListUsers, &Resource::none())?;
    let workflow = state.workflow.read().await;
    let items: Vec<UserDto> = workflow.users().all().into_iter().map(UserDto::from).collect();
    Ok(ok(ApiResponse::list(items)))
}

pub async fn change_role(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    payload: Result<Json<ChangeRoleRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let user_id = user_id(&id)?;
    let Json(request) = payload?;
    let role: Role = request.role.parse()?;
    let dto = state
        .execute_with(
            &principal,
            Command::ChangeUserRole { user_id, role },
            |workflow, _| workflow.users().require(&user_id).map(UserDto::from),
        )
        .await?;
    Ok(ok(ApiResponse::data(dto)))
}

pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let user_id = user_id(&id)?;
    state
        .execute(&principal, Command::DeleteUser { user_id })
        .await?;
    Ok(ok(ApiResponse::message("User deleted")))
}

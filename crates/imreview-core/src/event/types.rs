//! Event types for the workflow log

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::id::{ManuscriptId, ReviewId, UserId};
use crate::manuscript::ManuscriptStatus;
use crate::principal::Role;
use crate::review::Recommendation;

/// Unique identifier for an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub Uuid);

impl EventId {
    /// Create a new random event ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A recorded change to the workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowEvent {
    /// Unique event ID
    pub id: EventId,
    /// Sequence number for ordering
    pub sequence: u64,
    /// Event timestamp
    pub timestamp: DateTime<Utc>,
    /// ID of the entity this event affects
    pub entity_id: String,
    /// Type of entity
    pub entity_type: EntityType,
    /// Event payload
    pub payload: EventPayload,
    /// User that triggered this event
    pub actor_id: Option<UserId>,
}

impl WorkflowEvent {
    /// Create a new event
    pub fn new(entity_id: String, entity_type: EntityType, payload: EventPayload) -> Self {
        Self {
            id: EventId::new(),
            sequence: 0, // Set by EventLog
            timestamp: Utc::now(),
            entity_id,
            entity_type,
            payload,
            actor_id: None,
        }
    }

    pub fn manuscript(id: ManuscriptId, payload: EventPayload) -> Self {
        Self::new(id.to_string(), EntityType::Manuscript, payload)
    }

    pub fn review(id: ReviewId, payload: EventPayload) -> Self {
        Self::new(id.to_string(), EntityType::Review, payload)
    }

    pub fn user(id: UserId, payload: EventPayload) -> Self {
        Self::new(id.to_string(), EntityType::User, payload)
    }

    /// Set the actor ID
    pub fn with_actor(mut self, actor_id: UserId) -> Self {
        self.actor_id = Some(actor_id);
        self
    }
}

/// Type of entity an event affects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Manuscript,
    Review,
    User,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Manuscript => "manuscript",
            EntityType::Review => "review",
            EntityType::User => "user",
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "manuscript" => Ok(EntityType::Manuscript),
            "review" => Ok(EntityType::Review),
            "user" => Ok(EntityType::User),
            other => Err(format!("unknown entity type '{}'", other)),
        }
    }
}

/// Event payload containing the actual event data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventPayload {
    // Manuscript events
    ManuscriptCreated {
        author_id: UserId,
        status: ManuscriptStatus,
    },
    ManuscriptUpdated {
        fields: Vec<String>,
    },
    ManuscriptStatusChanged {
        from: ManuscriptStatus,
        to: ManuscriptStatus,
        cause: String,
    },
    ManuscriptDeleted {
        reviews_removed: Vec<ReviewId>,
    },

    // Review events
    ReviewerAssigned {
        manuscript_id: ManuscriptId,
        reviewer_id: UserId,
    },
    ReviewSubmitted {
        manuscript_id: ManuscriptId,
        reviewer_id: UserId,
        recommendation: Recommendation,
    },
    ReviewUpdated {
        manuscript_id: ManuscriptId,
    },
    ReviewDeleted {
        manuscript_id: ManuscriptId,
    },

    // User events
    UserRoleChanged {
        from: Role,
        to: Role,
    },
    UserDeleted,
}

impl EventPayload {
    /// Short name of the event kind
    pub fn kind(&self) -> &'static str {
        match self {
            EventPayload::ManuscriptCreated { .. } => "manuscript_created",
            EventPayload::ManuscriptUpdated { .. } => "manuscript_updated",
            EventPayload::ManuscriptStatusChanged { .. } => "manuscript_status_changed",
            EventPayload::ManuscriptDeleted { .. } => "manuscript_deleted",
            EventPayload::ReviewerAssigned { .. } => "reviewer_assigned",
            EventPayload::ReviewSubmitted { .. } => "review_submitted",
            EventPayload::ReviewUpdated { .. } => "review_updated",
            EventPayload::ReviewDeleted { .. } => "review_deleted",
            EventPayload::UserRoleChanged { .. } => "user_role_changed",
            EventPayload::UserDeleted => "user_deleted",
        }
    }
}

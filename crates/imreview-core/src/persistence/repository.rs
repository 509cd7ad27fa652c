//! Repository for users, manuscripts, reviews, and events

#[cfg(feature = "sqlite")]
use std::path::Path;

#[cfg(feature = "sqlite")]
use chrono::{DateTime, Utc};
#[cfg(feature = "sqlite")]
use rusqlite::{params, types::Type, Connection, OptionalExtension, Row};
#[cfg(feature = "sqlite")]
use uuid::Uuid;

#[cfg(feature = "sqlite")]
use super::schema::{Schema, SCHEMA_VERSION};
use crate::error::{PersistenceError, Result};
#[cfg(feature = "sqlite")]
use crate::event::{EntityType, EventId, EventPayload, WorkflowEvent};
#[cfg(feature = "sqlite")]
use crate::id::{JournalId, ManuscriptId, ReviewId, UserId};
#[cfg(feature = "sqlite")]
use crate::manuscript::{Manuscript, ManuscriptMetadata};
#[cfg(feature = "sqlite")]
use crate::review::{Assessment, Review, ReviewBody, Score, PENDING};
#[cfg(feature = "sqlite")]
use crate::user::User;
#[cfg(feature = "sqlite")]
use crate::workflow::WorkflowState;

#[cfg(feature = "sqlite")]
const MANUSCRIPT_COLUMNS: &str = "id, author_id, journal_id, status, title, abstract, keywords, section, revision_count, submitted_at, published_at, created_at, updated_at, version";

#[cfg(feature = "sqlite")]
const REVIEW_COLUMNS: &str = "id, manuscript_id, reviewer_id, state, content, score, recommendation, comments, is_confidential, assigned_at, created_at, updated_at";

/// Repository for persisting imreview state
#[cfg(feature = "sqlite")]
pub struct Repository {
    conn: Connection,
}

#[cfg(feature = "sqlite")]
impl Repository {
    /// Create a new repository with the given database path
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        let repo = Self { conn };
        repo.initialize()?;
        Ok(repo)
    }

    /// Create an in-memory repository (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let repo = Self { conn };
        repo.initialize()?;
        Ok(repo)
    }

    /// Initialize the database schema
    fn initialize(&self) -> Result<()> {
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        let current_version = self.get_schema_version().unwrap_or(0);

        if current_version == 0 {
            self.conn.execute_batch(Schema::create_tables())?;
            self.set_schema_version(SCHEMA_VERSION)?;
        } else if current_version < SCHEMA_VERSION {
            for version in current_version..SCHEMA_VERSION {
                if let Some(migration) = Schema::migration(version, version + 1) {
                    self.conn.execute_batch(migration).map_err(|e| {
                        PersistenceError::Migration(format!("{} -> {}: {}", version, version + 1, e))
                    })?;
                }
            }
            self.set_schema_version(SCHEMA_VERSION)?;
        }

        Ok(())
    }

    fn get_schema_version(&self) -> Option<u32> {
        self.conn
            .query_row(
                "SELECT version FROM schema_version ORDER BY version DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .ok()
    }

    fn set_schema_version(&self, version: u32) -> Result<()> {
        self.conn
            .execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
        Ok(())
    }

    // ==================== Commands ====================

    /// Write the effects of one command atomically.
    ///
    /// Every entity named by `events` is re-read from `state` and upserted,
    /// or deleted when the event removed it, and the events are appended to
    /// the log. Either everything is written or nothing is.
    pub fn persist(&self, events: &[WorkflowEvent], state: &WorkflowState) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }

        let tx = self.conn.unchecked_transaction()?;
        // Entity rows go in event order so a manuscript precedes its reviews
        for event in events {
            let entity = parse_entity_id(&event.entity_id)?;
            match (event.entity_type, &event.payload) {
                (EntityType::Manuscript, EventPayload::ManuscriptDeleted { .. }) => {
                    delete_manuscript(&tx, ManuscriptId(entity))?;
                }
                (EntityType::Manuscript, _) => {
                    if let Some(manuscript) = state.manuscript(&ManuscriptId(entity)) {
                        save_manuscript(&tx, manuscript)?;
                    }
                }
                (EntityType::Review, EventPayload::ReviewDeleted { .. }) => {
                    delete_review(&tx, ReviewId(entity))?;
                }
                (EntityType::Review, _) => {
                    if let Some(review) = state.review(&ReviewId(entity)) {
                        save_review(&tx, review)?;
                    }
                }
                (EntityType::User, EventPayload::UserDeleted) => {
                    delete_user(&tx, UserId(entity))?;
                }
                (EntityType::User, _) => {
                    if let Some(user) = state.users().get(&UserId(entity)) {
                        save_user(&tx, user)?;
                    }
                }
            }
        }
        for event in events {
            append_event(&tx, event)?;
        }
        tx.commit()?;
        Ok(())
    }

    // ==================== User Operations ====================

    /// Save a user to the database
    pub fn save_user(&self, user: &User) -> Result<()> {
        save_user(&self.conn, user)
    }

    /// Get all users
    pub fn load_users(&self) -> Result<Vec<User>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, email, role FROM users ORDER BY name")?;
        let users = stmt
            .query_map([], row_to_user)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(users)
    }

    // ==================== Manuscript Operations ====================

    /// Save a manuscript to the database
    pub fn save_manuscript(&self, manuscript: &Manuscript) -> Result<()> {
        save_manuscript(&self.conn, manuscript)
    }

    /// Get a manuscript by ID
    pub fn get_manuscript(&self, id: &ManuscriptId) -> Result<Option<Manuscript>> {
        let sql = format!("SELECT {} FROM manuscripts WHERE id = ?1", MANUSCRIPT_COLUMNS);
        let manuscript = self
            .conn
            .query_row(&sql, [id.to_string()], row_to_manuscript)
            .optional()?;
        Ok(manuscript)
    }

    /// Get all manuscripts
    pub fn load_manuscripts(&self) -> Result<Vec<Manuscript>> {
        let sql = format!(
            "SELECT {} FROM manuscripts ORDER BY created_at",
            MANUSCRIPT_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let manuscripts = stmt
            .query_map([], row_to_manuscript)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(manuscripts)
    }

    // ==================== Review Operations ====================

    /// Save a review to the database
    pub fn save_review(&self, review: &Review) -> Result<()> {
        save_review(&self.conn, review)
    }

    /// Get all reviews
    pub fn load_reviews(&self) -> Result<Vec<Review>> {
        let sql = format!("SELECT {} FROM reviews ORDER BY created_at", REVIEW_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        let reviews = stmt
            .query_map([], row_to_review)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(reviews)
    }

    /// Get the reviews of one manuscript
    pub fn reviews_for(&self, manuscript_id: &ManuscriptId) -> Result<Vec<Review>> {
        let sql = format!(
            "SELECT {} FROM reviews WHERE manuscript_id = ?1 ORDER BY created_at",
            REVIEW_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let reviews = stmt
            .query_map([manuscript_id.to_string()], row_to_review)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(reviews)
    }

    // ==================== Event Operations ====================

    /// Get all events in sequence order
    pub fn load_events(&self) -> Result<Vec<WorkflowEvent>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, sequence, timestamp, entity_id, entity_type, payload, actor_id FROM events ORDER BY sequence",
        )?;
        let events = stmt
            .query_map([], row_to_event)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(events)
    }

    /// Get the highest stored sequence number
    pub fn current_sequence(&self) -> Result<u64> {
        let sequence: Option<i64> =
            self.conn
                .query_row("SELECT MAX(sequence) FROM events", [], |row| row.get(0))?;
        Ok(sequence.unwrap_or(0) as u64)
    }
}

#[cfg(feature = "sqlite")]
fn save_user(conn: &Connection, user: &User) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO users (id, name, email, role) VALUES (?1, ?2, ?3, ?4)",
        params![user.id.to_string(), user.name, user.email, user.role.as_str()],
    )?;
    Ok(())
}

#[cfg(feature = "sqlite")]
fn delete_user(conn: &Connection, id: UserId) -> Result<()> {
    conn.execute("DELETE FROM users WHERE id = ?1", [id.to_string()])?;
    Ok(())
}

#[cfg(feature = "sqlite")]
fn save_manuscript(conn: &Connection, manuscript: &Manuscript) -> Result<()> {
    let keywords = serde_json::to_string(&manuscript.metadata.keywords)?;
    // REPLACE would delete the row and cascade to its reviews
    conn.execute(
        r#"
        INSERT INTO manuscripts
        (id, author_id, journal_id, status, title, abstract, keywords, section, revision_count, submitted_at, published_at, created_at, updated_at, version)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
        ON CONFLICT(id) DO UPDATE SET
            status = excluded.status,
            title = excluded.title,
            abstract = excluded.abstract,
            keywords = excluded.keywords,
            section = excluded.section,
            revision_count = excluded.revision_count,
            submitted_at = excluded.submitted_at,
            published_at = excluded.published_at,
            updated_at = excluded.updated_at,
            version = excluded.version
        "#,
        params![
            manuscript.id.to_string(),
            manuscript.author_id.to_string(),
            manuscript.journal_id.to_string(),
            manuscript.status().as_str(),
            manuscript.metadata.title,
            manuscript.metadata.abstract_text,
            keywords,
            manuscript.metadata.section,
            manuscript.revision_count,
            manuscript.submitted_at.map(|t| t.to_rfc3339()),
            manuscript.published_at.map(|t| t.to_rfc3339()),
            manuscript.created_at.to_rfc3339(),
            manuscript.updated_at.to_rfc3339(),
            manuscript.version as i64,
        ],
    )?;
    Ok(())
}

#[cfg(feature = "sqlite")]
fn delete_manuscript(conn: &Connection, id: ManuscriptId) -> Result<()> {
    conn.execute(
        "DELETE FROM reviews WHERE manuscript_id = ?1",
        [id.to_string()],
    )?;
    conn.execute("DELETE FROM manuscripts WHERE id = ?1", [id.to_string()])?;
    Ok(())
}

#[cfg(feature = "sqlite")]
fn save_review(conn: &Connection, review: &Review) -> Result<()> {
    let (state, content, score, recommendation, comments) = match &review.body {
        ReviewBody::Pending => ("pending", "", 0u8, PENDING, None),
        ReviewBody::Completed(a) => (
            "completed",
            a.content.as_str(),
            a.score.value(),
            a.recommendation.as_str(),
            a.comments.as_deref(),
        ),
    };
    conn.execute(
        r#"
        INSERT OR REPLACE INTO reviews
        (id, manuscript_id, reviewer_id, state, content, score, recommendation, comments, is_confidential, assigned_at, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
        "#,
        params![
            review.id.to_string(),
            review.manuscript_id.to_string(),
            review.reviewer_id.to_string(),
            state,
            content,
            score,
            recommendation,
            comments,
            review.is_confidential,
            review.assigned_at.map(|t| t.to_rfc3339()),
            review.created_at.to_rfc3339(),
            review.updated_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

#[cfg(feature = "sqlite")]
fn delete_review(conn: &Connection, id: ReviewId) -> Result<()> {
    conn.execute("DELETE FROM reviews WHERE id = ?1", [id.to_string()])?;
    Ok(())
}

#[cfg(feature = "sqlite")]
fn append_event(conn: &Connection, event: &WorkflowEvent) -> Result<()> {
    let payload = serde_json::to_string(&event.payload)?;
    conn.execute(
        r#"
        INSERT INTO events (id, sequence, timestamp, entity_id, entity_type, payload, actor_id)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
        params![
            event.id.to_string(),
            event.sequence as i64,
            event.timestamp.to_rfc3339(),
            event.entity_id,
            event.entity_type.as_str(),
            payload,
            event.actor_id.map(|id| id.to_string()),
        ],
    )?;
    Ok(())
}

// ==================== Row Mapping ====================

#[cfg(feature = "sqlite")]
fn parse_entity_id(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| {
        PersistenceError::Serialization(format!("invalid entity id '{}': {}", s, e)).into()
    })
}

#[cfg(feature = "sqlite")]
fn conversion_error(
    idx: usize,
    err: impl Into<Box<dyn std::error::Error + Send + Sync>>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, err.into())
}

#[cfg(feature = "sqlite")]
fn uuid_at(row: &Row, idx: usize) -> rusqlite::Result<Uuid> {
    let s: String = row.get(idx)?;
    Uuid::parse_str(&s).map_err(|e| conversion_error(idx, e))
}

#[cfg(feature = "sqlite")]
fn time_at(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let s: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

#[cfg(feature = "sqlite")]
fn opt_time_at(row: &Row, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let s: Option<String> = row.get(idx)?;
    s.map(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| conversion_error(idx, e))
    })
    .transpose()
}

#[cfg(feature = "sqlite")]
fn parsed_at<T>(row: &Row, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr,
    T::Err: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let s: String = row.get(idx)?;
    s.parse::<T>().map_err(|e| conversion_error(idx, e))
}

#[cfg(feature = "sqlite")]
fn row_to_user(row: &Row) -> rusqlite::Result<User> {
    Ok(User {
        id: UserId(uuid_at(row, 0)?),
        name: row.get(1)?,
        email: row.get(2)?,
        role: parsed_at(row, 3)?,
    })
}

#[cfg(feature = "sqlite")]
fn row_to_manuscript(row: &Row) -> rusqlite::Result<Manuscript> {
    let keywords: String = row.get(6)?;
    let keywords: Vec<String> =
        serde_json::from_str(&keywords).map_err(|e| conversion_error(6, e))?;
    let version: i64 = row.get(13)?;

    Ok(Manuscript {
        id: ManuscriptId(uuid_at(row, 0)?),
        author_id: UserId(uuid_at(row, 1)?),
        journal_id: JournalId(uuid_at(row, 2)?),
        status: parsed_at(row, 3)?,
        metadata: ManuscriptMetadata {
            title: row.get(4)?,
            abstract_text: row.get(5)?,
            keywords,
            section: row.get(7)?,
        },
        revision_count: row.get(8)?,
        submitted_at: opt_time_at(row, 9)?,
        published_at: opt_time_at(row, 10)?,
        created_at: time_at(row, 11)?,
        updated_at: time_at(row, 12)?,
        version: version as u64,
    })
}

#[cfg(feature = "sqlite")]
fn row_to_review(row: &Row) -> rusqlite::Result<Review> {
    let state: String = row.get(3)?;
    let body = match state.as_str() {
        "pending" => ReviewBody::Pending,
        "completed" => {
            let score: i64 = row.get(5)?;
            ReviewBody::Completed(Assessment {
                content: row.get(4)?,
                score: Score::new(score).map_err(|e| conversion_error(5, e))?,
                recommendation: parsed_at(row, 6)?,
                comments: row.get(7)?,
            })
        }
        other => {
            return Err(conversion_error(
                3,
                format!("unknown review state '{}'", other),
            ))
        }
    };

    Ok(Review {
        id: ReviewId(uuid_at(row, 0)?),
        manuscript_id: ManuscriptId(uuid_at(row, 1)?),
        reviewer_id: UserId(uuid_at(row, 2)?),
        body,
        is_confidential: row.get(8)?,
        assigned_at: opt_time_at(row, 9)?,
        created_at: time_at(row, 10)?,
        updated_at: time_at(row, 11)?,
    })
}

#[cfg(feature = "sqlite")]
fn row_to_event(row: &Row) -> rusqlite::Result<WorkflowEvent> {
    let sequence: i64 = row.get(1)?;
    let payload: String = row.get(5)?;
    let actor: Option<String> = row.get(6)?;

    Ok(WorkflowEvent {
        id: EventId(uuid_at(row, 0)?),
        sequence: sequence as u64,
        timestamp: time_at(row, 2)?,
        entity_id: row.get(3)?,
        entity_type: parsed_at(row, 4)?,
        payload: serde_json::from_str::<EventPayload>(&payload)
            .map_err(|e| conversion_error(5, e))?,
        actor_id: actor
            .map(|s| Uuid::parse_str(&s).map(UserId).map_err(|e| conversion_error(6, e)))
            .transpose()?,
    })
}

/// Placeholder when SQLite support is compiled out
#[cfg(not(feature = "sqlite"))]
pub struct Repository;

#[cfg(not(feature = "sqlite"))]
impl Repository {
    pub fn new(_path: impl AsRef<std::path::Path>) -> Result<Self> {
        Err(PersistenceError::Unavailable(
            "SQLite support not enabled. Enable the 'sqlite' feature.".to_string(),
        )
        .into())
    }

    pub fn in_memory() -> Result<Self> {
        Err(PersistenceError::Unavailable(
            "SQLite support not enabled. Enable the 'sqlite' feature.".to_string(),
        )
        .into())
    }
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use super::*;
    use crate::config::ValidationLimits;
    use crate::principal::{Principal, Role};
    use crate::review::{Recommendation, ReviewSubmission};
    use crate::workflow::Command;

    fn seeded_state() -> (WorkflowState, Vec<WorkflowEvent>, ManuscriptId) {
        let mut state = WorkflowState::default();
        let author = User::new("author", "author@example.org", Role::Author);
        let editor = User::new("editor", "editor@example.org", Role::Editor);
        let reviewer = User::new("reviewer", "reviewer@example.org", Role::Reviewer);
        let (author_p, editor_p, reviewer_p) =
            (author.principal(), editor.principal(), reviewer.principal());
        for user in [author, editor, reviewer] {
            state.upsert_user(user);
        }

        let mut events = Command::CreateManuscript {
            journal_id: JournalId::new(),
            metadata: ManuscriptMetadata {
                title: "Persistent title".to_string(),
                abstract_text: "Abstract".to_string(),
                keywords: vec!["sqlite".to_string(), "journals".to_string()],
                section: "Systems".to_string(),
            },
            as_draft: false,
        }
        .execute(&author_p, &mut state)
        .unwrap();
        let id = ManuscriptId::parse(&events[0].entity_id).unwrap();

        events.extend(
            Command::AssignReviewer {
                manuscript_id: id,
                reviewer_id: reviewer_p.id,
            }
            .execute(&editor_p, &mut state)
            .unwrap(),
        );
        events.extend(
            Command::SubmitReview {
                manuscript_id: id,
                submission: ReviewSubmission {
                    content: "Publishable.".to_string(),
                    score: 9,
                    recommendation: Recommendation::AcceptMinor,
                    comments: Some("Fix the figure labels.".to_string()),
                    is_confidential: true,
                },
            }
            .execute(&reviewer_p, &mut state)
            .unwrap(),
        );
        (state, events, id)
    }

    fn save_all_users(repo: &Repository, state: &WorkflowState) {
        for user in state.users().all() {
            repo.save_user(user).unwrap();
        }
    }

    #[test]
    fn test_repository_creation() {
        let repo = Repository::in_memory().unwrap();
        assert!(repo.load_manuscripts().unwrap().is_empty());
        assert!(repo.load_events().unwrap().is_empty());
        assert_eq!(repo.current_sequence().unwrap(), 0);
    }

    #[test]
    fn test_persist_and_reload() {
        let repo = Repository::in_memory().unwrap();
        let (state, events, id) = seeded_state();
        save_all_users(&repo, &state);
        repo.persist(&events, &state).unwrap();

        let stored = repo.get_manuscript(&id).unwrap().unwrap();
        let live = state.manuscript(&id).unwrap();
        assert_eq!(stored.status(), live.status());
        assert_eq!(stored.metadata, live.metadata);
        assert_eq!(stored.version, live.version);

        let reviews = repo.reviews_for(&id).unwrap();
        assert_eq!(reviews.len(), 1);
        assert_eq!(reviews[0].recommendation(), Some(Recommendation::AcceptMinor));
        assert!(reviews[0].is_confidential);
        assert!(reviews[0].assigned_at.is_some());

        let restored = WorkflowState::load_from_repository(&repo, ValidationLimits::default()).unwrap();
        assert_eq!(restored.manuscript(&id).unwrap().status(), live.status());
        assert_eq!(restored.users().len(), 3);
        assert_eq!(restored.events().current_sequence(), state.events().current_sequence());
    }

    #[test]
    fn test_delete_cascades_reviews() {
        let repo = Repository::in_memory().unwrap();
        let (mut state, events, id) = seeded_state();
        repo.persist(&events, &state).unwrap();

        let author = state.manuscript(&id).unwrap().author_id;
        let deleted = Command::DeleteManuscript { manuscript_id: id }
            .execute(&Principal::new(author, Role::Author), &mut state)
            .unwrap();
        repo.persist(&deleted, &state).unwrap();

        assert!(repo.get_manuscript(&id).unwrap().is_none());
        assert!(repo.reviews_for(&id).unwrap().is_empty());
    }

    #[test]
    fn test_failed_persist_rolls_back() {
        let repo = Repository::in_memory().unwrap();
        let (state, events, id) = seeded_state();
        repo.persist(&events, &state).unwrap();

        // Replaying the same events violates the unique sequence constraint
        assert!(repo.persist(&events, &state).is_err());
        assert_eq!(repo.load_events().unwrap().len(), events.len());
        assert_eq!(repo.reviews_for(&id).unwrap().len(), 1);
    }

    #[test]
    fn test_on_disk_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("imreview.db");
        let (state, events, id) = seeded_state();
        {
            let repo = Repository::new(&path).unwrap();
            save_all_users(&repo, &state);
            repo.persist(&events, &state).unwrap();
        }

        let repo = Repository::new(&path).unwrap();
        assert_eq!(repo.load_users().unwrap().len(), 3);
        assert!(repo.get_manuscript(&id).unwrap().is_some());
        assert_eq!(repo.current_sequence().unwrap(), state.events().current_sequence());
    }
}

//! Append-only event log

use std::collections::HashMap;

use super::types::{EntityType, EventId, EventPayload, WorkflowEvent};

/// In-memory event log with per-entity indices
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Vec<WorkflowEvent>,
    index_by_id: HashMap<EventId, usize>,
    index_by_entity: HashMap<(String, EntityType), Vec<usize>>,
    sequence: u64,
}

impl EventLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event, assigning the next sequence number
    pub fn append(&mut self, mut event: WorkflowEvent) -> WorkflowEvent {
        self.sequence += 1;
        event.sequence = self.sequence;
        self.insert(event.clone());
        event
    }

    /// Re-insert previously persisted events, keeping their sequence numbers
    pub fn restore(&mut self, events: impl IntoIterator<Item = WorkflowEvent>) {
        let mut events: Vec<WorkflowEvent> = events.into_iter().collect();
        events.sort_by_key(|e| e.sequence);
        for event in events {
            self.sequence = self.sequence.max(event.sequence);
            self.insert(event);
        }
    }

    fn insert(&mut self, event: WorkflowEvent) {
        let idx = self.events.len();
        self.index_by_id.insert(event.id, idx);
        self.index_by_entity
            .entry((event.entity_id.clone(), event.entity_type))
            .or_default()
            .push(idx);
        self.events.push(event);
    }

    /// Get an event by ID
    pub fn get(&self, id: &EventId) -> Option<&WorkflowEvent> {
        self.index_by_id
            .get(id)
            .and_then(|&idx| self.events.get(idx))
    }

    /// Get all events for an entity
    pub fn events_for_entity(&self, entity_id: &str, entity_type: EntityType) -> Vec<&WorkflowEvent> {
        self.index_by_entity
            .get(&(entity_id.to_string(), entity_type))
            .map(|indices| {
                indices
                    .iter()
                    .filter_map(|&idx| self.events.get(idx))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Status changes of a manuscript, oldest first
    pub fn status_history(&self, manuscript_id: &str) -> Vec<&WorkflowEvent> {
        self.events_for_entity(manuscript_id, EntityType::Manuscript)
            .into_iter()
            .filter(|e| {
                matches!(
                    e.payload,
                    EventPayload::ManuscriptCreated { .. }
                        | EventPayload::ManuscriptStatusChanged { .. }
                )
            })
            .collect()
    }

    /// Drop every event past the first `len`, returning them oldest first.
    ///
    /// The sequence counter falls back to the last kept event, so the next
    /// append reuses the numbers of the discarded ones.
    pub fn truncate(&mut self, len: usize) -> Vec<WorkflowEvent> {
        if len >= self.events.len() {
            return Vec::new();
        }
        let removed = self.events.split_off(len);
        for event in &removed {
            self.index_by_id.remove(&event.id);
            let key = (event.entity_id.clone(), event.entity_type);
            if let Some(indices) = self.index_by_entity.get_mut(&key) {
                indices.retain(|&idx| idx < len);
                if indices.is_empty() {
                    self.index_by_entity.remove(&key);
                }
            }
        }
        self.sequence = self.events.last().map(|e| e.sequence).unwrap_or(0);
        removed
    }

    /// Get the current sequence number
    pub fn current_sequence(&self) -> u64 {
        self.sequence
    }

    pub fn all(&self) -> &[WorkflowEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

//! Workflow event log
//!
//! Every command records what it changed as immutable events. The log backs
//! the status history and tells persistence which entities a command touched.

mod log;
mod types;

pub use log::EventLog;
pub use types::{EntityType, EventId, EventPayload, WorkflowEvent};
